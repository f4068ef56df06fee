use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use video_ad_guard::cache::{DetectionCache, FileStore};
use video_ad_guard::config::Config;
use video_ad_guard::player::format_ranges;

#[derive(Parser)]
#[command(name = "cache-manager")]
#[command(about = "Detection cache management utility")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Cache file (defaults to the configured path)
    #[arg(long)]
    cache_file: Option<PathBuf>,

    /// Entry lifetime in hours (defaults to the configured TTL)
    #[arg(long)]
    ttl_hours: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all cached videos
    List,
    /// Get cache statistics
    Stats,
    /// Invalidate the cached result for one video
    Invalidate {
        /// Video id, e.g. BV17x411w7KC
        video_id: String,
    },
    /// Clear all cache entries
    Clear,
    /// Clean up expired cache entries
    Cleanup {
        /// Sweep even if the last sweep was less than one TTL ago
        #[arg(long)]
        force: bool,
    },
}

fn format_millis(ms: i64) -> String {
    if ms <= 0 {
        return "never".to_string();
    }
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().unwrap_or_default();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.logging.level))
        .init();

    let cli = Cli::parse();

    let cache_file = cli.cache_file.unwrap_or_else(|| config.cache.path.clone());
    let mut cache_config = config.cache.clone();
    if let Some(ttl_hours) = cli.ttl_hours {
        cache_config.ttl_hours = ttl_hours;
    }

    info!("📂 Cache file: {}", cache_file.display());
    let cache = DetectionCache::new(Arc::new(FileStore::new(cache_file)), cache_config.ttl());

    match cli.command {
        Commands::List => {
            let videos = cache.entries().await;

            if videos.is_empty() {
                info!("📭 No cached videos found");
                return Ok(());
            }

            info!("📚 Found {} cached videos:", videos.len());

            for video in videos {
                let status = if video.is_valid { "✅ Valid" } else { "❌ Expired" };
                let verdict = if video.entry.exist {
                    format_ranges(&video.entry.ad_time_ranges)
                } else {
                    "no ad".to_string()
                };
                info!(
                    "  {} - {}, {} hours old, confident: {}, {}",
                    video.video_id, verdict, video.age_hours, video.entry.is_detection_confident, status
                );
                if !video.entry.good_name.is_empty() {
                    info!("    Products: {}", video.entry.good_name.join(", "));
                }
            }
        }

        Commands::Stats => {
            let stats = cache.stats().await;
            info!("📊 Cache Statistics:");
            info!("  Total entries: {}", stats.total);
            info!("  Valid entries: {}", stats.valid);
            info!("  Expired entries: {}", stats.expired);
            info!("  Size: {} bytes", stats.size);
            info!("  Last cleanup: {}", format_millis(stats.last_cleanup));
            info!("  Next cleanup: {}", format_millis(stats.next_cleanup));
        }

        Commands::Invalidate { video_id } => {
            if cache.delete(&video_id).await {
                info!("✅ Successfully invalidated cache for: {}", video_id);
            } else {
                warn!("⚠️ Video not found in cache: {}", video_id);
            }
        }

        Commands::Clear => {
            let count = cache.stats().await.total;
            cache.clear_all().await;
            info!("🧹 Cleared {} cache entries", count);
        }

        Commands::Cleanup { force } => {
            let count = if force {
                cache.force_clean_expired().await
            } else {
                cache.clean_expired().await
            };
            info!("🗑️ Cleaned up {} expired cache entries", count);
        }
    }

    Ok(())
}
