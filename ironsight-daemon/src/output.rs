//! Report writer -- turns OUTPUT events into timestamped report lines.
//!
//! Upstream already guarantees each name appears at most once, so the
//! writer performs no deduplication of its own. Lines are flushed as
//! they are written so a killed enumeration keeps everything emitted
//! so far.

use std::io::Write;

use tokio_util::sync::CancellationToken;

use ironsight_core::bus::Subscription;
use ironsight_core::event::OutputRecord;

/// Spawn the background task writing OUTPUT records as report lines.
///
/// Line format: `<rfc3339 timestamp> <name> <addr>[,<addr>...]`.
pub fn spawn_report_writer(
    mut sub: Subscription<OutputRecord>,
    mut writer: Box<dyn Write + Send>,
    quit: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = quit.cancelled() => break,
                record = sub.recv() => {
                    let Some(record) = record else { break };
                    let line = format!("{} {}", chrono::Utc::now().to_rfc3339(), record);
                    if let Err(e) = writeln!(writer, "{line}").and_then(|()| writer.flush()) {
                        tracing::warn!(error = %e, "failed to write report line");
                    }
                }
            }
        }
        tracing::debug!("report writer exited");
    })
}

/// Open the report target from configuration.
///
/// An empty path means stdout; anything else is opened in append mode.
pub fn open_report_target(path: &str) -> std::io::Result<Box<dyn Write + Send>> {
    if path.is_empty() {
        return Ok(Box::new(std::io::stdout()));
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(Box::new(file))
}
