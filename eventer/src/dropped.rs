//! Handling of events the kernel could not deliver

use anyhow::Result;
use log::warn;

/// Called with the number of events lost because the perf buffer was full
pub trait DropHandler: Send + Sync {
    fn handle(&self, dropped_events: u64) -> Result<()>;
}

/// Logs dropped event counts
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDropHandler;

impl DropHandler for LoggingDropHandler {
    fn handle(&self, dropped_events: u64) -> Result<()> {
        // Nothing can be recovered here; a larger perf buffer is a deployment decision
        warn!("Dropped events occurred: {}", dropped_events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_drop_handler_never_fails() {
        let _ = env_logger::builder().is_test(true).try_init();

        assert!(LoggingDropHandler.handle(0).is_ok());
        assert!(LoggingDropHandler.handle(u64::MAX).is_ok());
    }
}
