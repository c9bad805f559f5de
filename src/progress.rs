//! Progress observation for file downloads.

/// Receives progress events while files are materialized.
///
/// Observers are informational only: nothing they do affects whether a
/// download succeeds. All methods default to no-ops.
pub trait ProgressObserver: Send + Sync {
    /// A download is starting. `total` is the size in bytes if known.
    fn on_start(&self, _name: &str, _total: Option<u64>) {}

    /// Percentage (0-100) of the current download completed so far.
    fn on_progress(&self, _name: &str, _percent: u8) {}

    fn on_complete(&self, _name: &str, _bytes: u64) {}

    fn on_error(&self, _name: &str, _error: &str) {}
}

/// Ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

/// Forwards events to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_start(&self, name: &str, total: Option<u64>) {
        match total {
            Some(total) => log::debug!("{} starting ({} bytes)", name, total),
            None => log::debug!("{} starting", name),
        }
    }

    fn on_progress(&self, name: &str, percent: u8) {
        log::debug!("{} is downloading {}%", name, percent);
    }

    fn on_complete(&self, name: &str, bytes: u64) {
        log::info!("Saved {} ({})", name, crate::models::format_size(bytes));
    }

    fn on_error(&self, name: &str, error: &str) {
        log::warn!("{} failed: {}", name, error);
    }
}

/// Percentage of `received` out of `total`, clamped to 100. Unknown totals
/// report 0 until the transfer completes.
pub fn percent(received: u64, total: Option<u64>) -> u8 {
    match total {
        Some(0) => 100,
        Some(total) => ((received.min(total) * 100) / total) as u8,
        None => 0,
    }
}
