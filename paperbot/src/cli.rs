///
/// This module implements the CLI interface for paperbot: argument parsing,
/// settings resolution, wiring of the real feed source and publisher, and the
/// user-visible summary of a run.
///
/// All deduplication and publishing logic lives in [`paperbot-core`].
///
/// ## How To Use
/// - From the shell: `paperbot cs.CL` (see `--help`).
/// - Programmatically or from integration tests: call [`run`] with a constructed [`Cli`].
///
/// [`paperbot-core`]: ../../paperbot-core/
use crate::load_config::load_settings;
use crate::publish::BlueskyClient;
use anyhow::Result;
use clap::Parser;
use paperbot_core::feed::HttpFeedSource;
use paperbot_core::synchronise::{synchronise, SyncReport};
use std::path::PathBuf;

/// CLI for paperbot: announce new arXiv submissions on Bluesky.
#[derive(Parser, Debug)]
#[clap(
    name = "paperbot",
    version,
    about = "Post new arXiv submissions for a subject to Bluesky, skipping anything already posted"
)]
pub struct Cli {
    /// arXiv subject to follow, e.g. cs.CL or math.AG
    pub subject: String,

    /// Path to an optional YAML settings file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Ledger file recording what has been posted (overrides the settings file)
    #[clap(long)]
    pub ledger: Option<PathBuf>,

    /// Seconds to wait between posts (overrides the settings file)
    #[clap(long)]
    pub delay_secs: Option<u64>,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<SyncReport> {
    tracing::info!(subject = %cli.subject, "paperbot run starting");

    let mut settings = load_settings(cli.config.as_deref())?;
    settings.apply_overrides(cli.ledger, cli.delay_secs);

    // credentials are checked before any network traffic
    let publisher = BlueskyClient::new_from_env(&settings.bluesky_service)?;
    let feed = HttpFeedSource::new(settings.feed_base_url.as_str())?;

    let sync_config = settings.sync_config();
    sync_config.trace_loaded();

    match synchronise(&cli.subject, &sync_config, &feed, &publisher).await {
        Ok(report) => {
            for failed in &report.failed {
                eprintln!("[WARN] Not posted, will retry: {} ({})", failed.guid, failed.error);
            }
            for skipped in &report.skipped {
                eprintln!("[WARN] Skipped invalid entry {:?}: {}", skipped.guid, skipped.reason);
            }
            println!(
                "{}: {} in feed, {} new, {} posted, {} failed, {} skipped",
                report.subject,
                report.fetched,
                report.new,
                report.published.len(),
                report.failed.len(),
                report.skipped.len()
            );
            tracing::info!(subject = %report.subject, "Synchronisation complete");
            Ok(report)
        }
        Err(e) => {
            tracing::error!(error = %e, "Synchronisation failed");
            Err(anyhow::Error::new(e))
        }
    }
}
