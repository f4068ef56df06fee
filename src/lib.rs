/// Video Ad Guard
///
/// Turns untrusted language-model verdicts about sponsored video segments into
/// validated ad time ranges, caches them per video with a time-to-live, and
/// drives notify/skip decisions while the video plays.

pub mod analyzer;
pub mod cache;
pub mod collaborators;
pub mod config;
pub mod detection;
pub mod llm;
pub mod player;
pub mod segments;
pub mod session;
pub mod transcription;
pub mod video_id;

// Re-export main types for easy access
pub use crate::analyzer::{Analyzer, RunOutcome};
pub use crate::cache::{CacheEntry, CacheStats, DetectionCache, FileStore, KeyValueStore, MemoryStore};
pub use crate::config::Config;
pub use crate::detection::{
    DetectionError, IndexInterval, IntervalReconciler, RawDetection, ResultSanitizer, TimeRange,
};
pub use crate::llm::{LLMConfig, LLMProvider, LlmAdDetector};
pub use crate::player::{AutoSkipScheduler, PlaybackClock, SchedulerEvent, SimulatedPlayer};
pub use crate::segments::{AdSegment, SegmentModel};
pub use crate::session::{DetectionSession, StatusLog};
pub use crate::transcription::{CaptionEntry, TimingTable};
pub use crate::video_id::extract_video_id;
