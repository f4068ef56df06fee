use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use video_ad_guard::collaborators::{
    AiProvider, DetectionRequest, MetadataProvider, StaticWhitelist, TopComment, VideoInfo,
};
use video_ad_guard::config::{Config, SchedulerConfig};
use video_ad_guard::player::{format_ranges, simulate_playback, PlaybackClock, SchedulerEvent};
use video_ad_guard::transcription::{parse_srt, TimingTable};
use video_ad_guard::{
    Analyzer, AutoSkipScheduler, DetectionCache, DetectionSession, FileStore, LlmAdDetector,
    ResultSanitizer, RunOutcome, SegmentModel, SimulatedPlayer, TimeRange,
};

#[derive(Parser)]
#[command(name = "video-ad-guard")]
#[command(version, about = "Detect, cache and auto-skip sponsored segments in videos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the standard search paths)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sanitize a raw model reply and print the detection
    Parse {
        /// File holding the raw reply
        response: PathBuf,
        /// Number of caption lines, used to clamp indices
        #[arg(long, default_value_t = 0)]
        captions: usize,
    },
    /// Run a full detection for one video from local files
    Detect(DetectArgs),
    /// Play a video with the given ad ranges and print scheduler events
    Simulate {
        /// Ad range as `start:end` in seconds, repeatable
        #[arg(long = "range", value_parser = parse_range, required = true)]
        ranges: Vec<TimeRange>,
        /// Video length in seconds
        #[arg(long)]
        duration: f64,
        /// Playback step per tick in seconds
        #[arg(long, default_value_t = 0.25)]
        step: f64,
    },
}

#[derive(Args)]
struct DetectArgs {
    /// Video page URL or BV id
    video: String,
    /// Captions as SRT or official caption JSON
    #[arg(long)]
    captions: Option<PathBuf>,
    /// Video title sent to the model
    #[arg(long, default_value = "")]
    title: String,
    /// Uploader id, checked against the whitelist
    #[arg(long, default_value = "0")]
    owner: String,
    /// Pinned comment as JSON (`{"message": ..., "jump_links": [...]}`)
    #[arg(long)]
    comment: Option<PathBuf>,
    /// Use a canned model reply instead of calling the configured LLM
    #[arg(long)]
    response: Option<PathBuf>,
    /// Video length in seconds
    #[arg(long)]
    duration: f64,
    /// Simulate playback after detection
    #[arg(long)]
    simulate: bool,
}

fn parse_range(value: &str) -> Result<TimeRange, String> {
    let (start, end) = value
        .split_once(':')
        .ok_or_else(|| format!("expected start:end, got {}", value))?;
    let start: f64 = start.trim().parse().map_err(|e| format!("bad start: {}", e))?;
    let end: f64 = end.trim().parse().map_err(|e| format!("bad end: {}", e))?;
    if end < start {
        return Err(format!("range end {} is before start {}", end, start));
    }
    Ok((start, end))
}

/// Metadata read from local files
struct LocalMetadata {
    video: VideoInfo,
    comment: Option<TopComment>,
    captions: Option<TimingTable>,
}

#[async_trait]
impl MetadataProvider for LocalMetadata {
    async fn get_video_info(&self, _video_id: &str) -> Result<VideoInfo> {
        Ok(self.video.clone())
    }

    async fn get_top_comment(&self, _video_id: &str) -> Result<Option<TopComment>> {
        Ok(self.comment.clone())
    }

    async fn get_captions(&self, _video_id: &str) -> Result<Option<TimingTable>> {
        Ok(self.captions.clone())
    }
}

/// Model stand-in that always returns the same reply
struct CannedReply(String);

#[async_trait]
impl AiProvider for CannedReply {
    async fn detect(&self, _request: &DetectionRequest) -> Result<String> {
        Ok(self.0.clone())
    }

    async fn extract_product_name(&self, ad_text: &str) -> Result<String> {
        Ok(ad_text.to_string())
    }
}

async fn load_captions(path: &Path) -> Result<TimingTable> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read captions {}", path.display()))?;

    let is_srt = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("srt"));

    if is_srt {
        parse_srt(&content)
    } else {
        TimingTable::from_official_json(&content)
    }
}

fn print_events(events: &[SchedulerEvent]) {
    if events.is_empty() {
        info!("📭 No scheduler events");
    }
    for event in events {
        match event {
            SchedulerEvent::Notified { range, .. } => {
                info!("  🔔 notify  {}", format_ranges(&[*range]))
            }
            SchedulerEvent::Skipped { range, target, .. } => {
                info!("  ⏭️ skip    {} -> {:.1}s", format_ranges(&[*range]), target)
            }
        }
    }
}

fn run_simulation(config: &SchedulerConfig, model: &SegmentModel, duration: f64, step: f64) -> Vec<SchedulerEvent> {
    let mut scheduler = AutoSkipScheduler::new(config.clone());
    scheduler.attach();
    let mut player = SimulatedPlayer::new(duration);
    let step_ms = (step * 1000.0).round() as i64;
    simulate_playback(&mut scheduler, model, &mut player, 0, step, step_ms)
}

async fn run_detect(config: Config, args: DetectArgs) -> Result<()> {
    let video_id = video_ad_guard::extract_video_id(&args.video).unwrap_or_else(|_| args.video.clone());

    let captions = match &args.captions {
        Some(path) => Some(load_captions(path).await?),
        None => None,
    };

    let comment = match &args.comment {
        Some(path) => {
            let content = tokio::fs::read_to_string(path).await?;
            Some(serde_json::from_str::<TopComment>(&content)?)
        }
        None => None,
    };

    let metadata = Arc::new(LocalMetadata {
        video: VideoInfo {
            title: args.title.clone(),
            owner_id: args.owner.clone(),
        },
        comment,
        captions,
    });

    let ai: Arc<dyn AiProvider> = match &args.response {
        Some(path) => Arc::new(CannedReply(tokio::fs::read_to_string(path).await?)),
        None => Arc::new(LlmAdDetector::new(&config.llm)?),
    };

    let store = Arc::new(FileStore::new(config.cache.path.clone()));
    let cache = DetectionCache::new(store, config.cache.ttl());
    let whitelist = Arc::new(StaticWhitelist::new(config.whitelist.owners.clone()));

    let analyzer = Analyzer::new(config.detection.clone(), cache, metadata, ai, whitelist);
    let mut session = DetectionSession::new(config.scheduler.clone());
    let player = SimulatedPlayer::new(args.duration);

    info!("🚀 Detecting ads in {}", video_id);
    let outcome = analyzer
        .analyze(&mut session, &video_id, Some(&player as &dyn PlaybackClock))
        .await;
    info!("📋 Status: {}", session.status().text());

    match outcome {
        Ok(RunOutcome::Detected { .. }) | Ok(RunOutcome::CacheHit { .. }) => {
            for segment in session.segments().segments() {
                info!("  {} {}", segment.id, format_ranges(&[segment.range()]));
            }

            if args.simulate {
                if !session.scheduler().is_attached() {
                    warn!("Auto-skip is not active for this result, simulating anyway");
                }
                let events = run_simulation(&config.scheduler, session.segments(), args.duration, 0.25);
                print_events(&events);
            }
            Ok(())
        }
        Ok(other) => {
            info!("Run finished: {:?}", other);
            Ok(())
        }
        Err(e) => {
            error!("❌ Detection failed: {}", e);
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };

    let filter = if cli.verbose {
        EnvFilter::new("video_ad_guard=debug,info")
    } else {
        EnvFilter::new(&config.logging.level)
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!("{}", config.summary());
    if let Err(e) = config.validate() {
        warn!("⚠️ Configuration issue: {}", e);
    }

    match cli.command {
        Commands::Parse { response, captions } => {
            let raw = tokio::fs::read_to_string(&response)
                .await
                .with_context(|| format!("Failed to read {}", response.display()))?;

            let report = ResultSanitizer::inspect(&raw, captions);
            println!("{}", serde_json::to_string_pretty(&report.detection)?);
            if let Some(violation) = report.shape_violation() {
                warn!("⚠️ Malformed detection: {}", violation);
            }
        }

        Commands::Detect(args) => run_detect(config, args).await?,

        Commands::Simulate { ranges, duration, step } => {
            if step <= 0.0 {
                return Err(anyhow!("step must be positive"));
            }
            let model = SegmentModel::from_ranges(&ranges, duration, chrono::Utc::now().timestamp_millis());
            info!("▶️ Simulating {:.1}s of playback with {} ad range(s)", duration, model.len());
            let events = run_simulation(&config.scheduler, &model, duration, step);
            print_events(&events);
        }
    }

    Ok(())
}
