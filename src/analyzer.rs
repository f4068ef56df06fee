/// Detection run orchestration
///
/// One `analyze` call takes a video from "unknown" to either applied segments
/// or a terminal status. The cache is consulted first. A fresh result is written
/// back only when the run gets as far as a verdict.
use crate::cache::{CacheEntry, DetectionCache};
use crate::collaborators::{
    summarize_links, AiProvider, DetectionRequest, LinkSummary, MetadataProvider, TopComment, Transcriber,
    WhitelistProvider,
};
use crate::config::DetectionConfig;
use crate::detection::{DetectionError, IntervalReconciler, ResultSanitizer};
use crate::player::{format_ranges, PlaybackClock};
use crate::segments::SegmentModel;
use crate::session::DetectionSession;
use crate::transcription::TimingTable;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a run ended, when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Extension switched off; everything was torn down
    Disabled,
    /// A cached verdict was applied
    CacheHit { segments: usize, auto_skip: bool },
    /// Uploader is whitelisted; nothing was analyzed or cached
    Whitelisted,
    /// Restricted mode found no official product link
    NoAdConditions,
    /// Neither captions nor a transcription were available
    NoTimingSource,
    /// The model found no ad
    NoAd,
    /// Fresh ad segments were applied
    Detected {
        segments: usize,
        confident: bool,
        auto_skip: bool,
    },
}

/// Runs detections against the configured collaborators
pub struct Analyzer {
    config: DetectionConfig,
    cache: DetectionCache,
    metadata: Arc<dyn MetadataProvider>,
    ai: Arc<dyn AiProvider>,
    whitelist: Arc<dyn WhitelistProvider>,
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl Analyzer {
    pub fn new(
        config: DetectionConfig,
        cache: DetectionCache,
        metadata: Arc<dyn MetadataProvider>,
        ai: Arc<dyn AiProvider>,
        whitelist: Arc<dyn WhitelistProvider>,
    ) -> Self {
        Self {
            config,
            cache,
            metadata,
            ai,
            whitelist,
            transcriber: None,
        }
    }

    /// Add the speech-to-text fallback used when a video has no captions
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn cache(&self) -> &DetectionCache {
        &self.cache
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Run detection for `video_id`, applying the result to `session`.
    ///
    /// Failures are also recorded in the session status as
    /// `AI analysis failed: <message>`; auto-skip is stopped and the cache is
    /// left untouched.
    pub async fn analyze(
        &self,
        session: &mut DetectionSession,
        video_id: &str,
        player: Option<&dyn PlaybackClock>,
    ) -> Result<RunOutcome, DetectionError> {
        if !self.config.enable_extension {
            info!("🚫 Extension disabled, skipping ad detection");
            session.teardown();
            session.status_mut().push("Extension disabled");
            return Ok(RunOutcome::Disabled);
        }

        session.reset(video_id);
        self.cache.clean_expired().await;

        if let Some(entry) = self.cache.get(video_id).await {
            return Ok(self.apply_cached(session, entry, player));
        }

        match self.detect(session, video_id, player).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!("AI analysis failed for {}: {}", video_id, e);
                session.status_mut().push(format!("AI analysis failed: {}", e));
                session.scheduler_mut().detach();
                Err(e)
            }
        }
    }

    /// Persist the session's edited segment bounds to the cache
    pub async fn sync_segments(&self, session: &DetectionSession) {
        let Some(video_id) = session.video_id() else {
            return;
        };
        self.cache
            .update_ad_time_ranges(video_id, session.segments().all_ranges())
            .await;
    }

    fn apply_cached(
        &self,
        session: &mut DetectionSession,
        entry: CacheEntry,
        player: Option<&dyn PlaybackClock>,
    ) -> RunOutcome {
        let duration = player
            .map(|p| p.duration())
            .filter(|d| *d > 0.0)
            .unwrap_or_else(|| entry.ad_time_ranges.iter().map(|r| r.1).fold(0.0, f64::max));

        let model = SegmentModel::from_ranges(&entry.ad_time_ranges, duration, self.cache.now_ms());
        let count = model.len();
        session.set_segments(model);

        if !entry.exist || count == 0 {
            session.status_mut().push("No ad content (cached)");
            return RunOutcome::CacheHit {
                segments: 0,
                auto_skip: false,
            };
        }

        session.status_mut().push(format!(
            "Found {} ad(s) (cached): {}",
            count,
            format_ranges(&entry.ad_time_ranges)
        ));

        let auto_skip = player.is_some() && self.config.auto_skip_ad && entry.is_detection_confident;
        if auto_skip {
            session.scheduler_mut().attach();
        }

        RunOutcome::CacheHit {
            segments: count,
            auto_skip,
        }
    }

    async fn detect(
        &self,
        session: &mut DetectionSession,
        video_id: &str,
        player: Option<&dyn PlaybackClock>,
    ) -> Result<RunOutcome, DetectionError> {
        let video = self
            .metadata
            .get_video_info(video_id)
            .await
            .map_err(DetectionError::collaborator)?;

        if self.whitelist.is_whitelisted(&video.owner_id).await {
            info!("🤝 Uploader {} is whitelisted, skipping detection", video.owner_id);
            session.status_mut().push("Uploader whitelisted, detection skipped");
            return Ok(RunOutcome::Whitelisted);
        }

        let top_comment = self
            .metadata
            .get_top_comment(video_id)
            .await
            .map_err(DetectionError::collaborator)?;
        let link_messages = summarize_links(top_comment.as_ref());

        let mut good_names = None;
        if self.config.restricted_mode {
            let names = self.official_product_names(top_comment.as_ref(), &link_messages).await;
            if names.is_empty() {
                info!("🔒 Restricted mode: no official product link, skipping model");
                session.status_mut().push("No ad conditions detected");
                session.scheduler_mut().detach();
                self.cache
                    .save(video_id, CacheEntry::no_ad(self.cache.now_ms()))
                    .await;
                return Ok(RunOutcome::NoAdConditions);
            }
            good_names = Some(names);
        }

        let Some(timing) = self.timing_source(session, video_id).await? else {
            info!("No captions or transcription for {}", video_id);
            session.status_mut().push("No captions available, cannot detect");
            return Ok(RunOutcome::NoTimingSource);
        };

        let request = DetectionRequest {
            title: video.title,
            top_comment: top_comment.map(|comment| comment.message),
            link_messages,
            captions: timing.captions_by_index(),
            good_names,
        };

        info!("🤖 Running AI ad detection on {} caption lines", timing.len());
        let raw = self
            .ai
            .detect(&request)
            .await
            .map_err(DetectionError::collaborator)?;

        let report = ResultSanitizer::inspect(&raw, timing.len());
        if let Some(violation) = report.shape_violation() {
            return Err(DetectionError::StructurallyInvalid(violation));
        }
        let detection = report.detection;

        if !detection.exist {
            info!("✅ No ad content in {}", video_id);
            session.status_mut().push("No ad content");
            session.scheduler_mut().detach();
            self.cache
                .save(video_id, CacheEntry::no_ad(self.cache.now_ms()))
                .await;
            return Ok(RunOutcome::NoAd);
        }

        let player = player.ok_or(DetectionError::MissingPlayer)?;
        let duration = player.duration();
        let reconciliation = IntervalReconciler::reconcile(&detection.index_lists, &timing, duration);
        let now = self.cache.now_ms();

        let model = SegmentModel::from_ranges(&reconciliation.ranges, duration, now);
        let count = model.len();
        let ranges = model.all_ranges();
        session.set_segments(model);
        session
            .status_mut()
            .push(format!("Found {} ad(s): {}", count, format_ranges(&ranges)));

        self.cache
            .save(
                video_id,
                CacheEntry::new(
                    true,
                    detection.good_name,
                    ranges,
                    reconciliation.confident,
                    now,
                ),
            )
            .await;

        let auto_skip = self.config.auto_skip_ad && reconciliation.confident;
        if auto_skip {
            session.scheduler_mut().attach();
        }

        Ok(RunOutcome::Detected {
            segments: count,
            confident: reconciliation.confident,
            auto_skip,
        })
    }

    /// Product names for every official product link; the raw ad text stands in
    /// when extraction fails
    async fn official_product_names(
        &self,
        top_comment: Option<&TopComment>,
        link_messages: &BTreeMap<String, LinkSummary>,
    ) -> Vec<String> {
        let message = top_comment.map(|c| c.message.as_str()).unwrap_or_default();
        let mut names = Vec::new();

        for summary in link_messages.values() {
            if summary.is_official_product_link != Some(true) {
                continue;
            }

            let ad_text = format!(
                "Pinned comment: {} Link title: {}",
                message,
                summary.title.as_deref().unwrap_or_default()
            );

            match self.ai.extract_product_name(&ad_text).await {
                Ok(name) => {
                    debug!("Extracted product name: {}", name);
                    names.push(name);
                }
                Err(e) => {
                    warn!("Failed to extract product name: {:#}", e);
                    names.push(ad_text);
                }
            }
        }

        names
    }

    /// Official captions, else a deduplicated transcription when enabled
    async fn timing_source(
        &self,
        session: &mut DetectionSession,
        video_id: &str,
    ) -> Result<Option<TimingTable>, DetectionError> {
        let captions = self
            .metadata
            .get_captions(video_id)
            .await
            .map_err(DetectionError::collaborator)?;

        if let Some(table) = captions.filter(|table| !table.is_empty()) {
            debug!("Using {} official caption lines", table.len());
            return Ok(Some(table));
        }

        if !self.config.enable_audio_transcription {
            debug!("Audio transcription disabled");
            return Ok(None);
        }

        let Some(transcriber) = &self.transcriber else {
            warn!("Audio transcription enabled but no transcriber configured");
            return Ok(None);
        };

        info!("🎙️ No captions, falling back to audio transcription");
        match transcriber.transcribe(video_id).await {
            Ok(segments) => {
                let table = TimingTable::from_transcription(&segments);
                Ok((!table.is_empty()).then_some(table))
            }
            Err(e) => {
                warn!("Audio transcription failed: {:#}", e);
                session
                    .status_mut()
                    .push(format!("Audio analysis failed: {}", e));
                Ok(None)
            }
        }
    }
}
