//! Eventer configuration
//!
//! Queue capacities and the perf ring size are fixed once the eventer is
//! built. The defaults match those used by the libbpf tools.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default capacity of the queue carrying raw event records
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;

/// Default capacity of the queue carrying dropped event counts
pub const DEFAULT_DROP_COUNT_QUEUE_CAPACITY: usize = 64;

/// Default per-CPU perf buffer size, in pages
pub const DEFAULT_PERF_BUFFER_PAGES: usize = 16;

/// Tunables for building an [`Eventer`](crate::Eventer)
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EventerConfig {
    /// Capacity of the event queue
    pub event_queue_capacity: usize,
    /// Capacity of the dropped event count queue
    pub drop_count_queue_capacity: usize,
    /// Per-CPU perf buffer size in pages (power of two)
    pub perf_buffer_pages: usize,
    /// Path to the BPF object file. If None, uses the embedded object.
    pub object_path: Option<PathBuf>,
}

impl Default for EventerConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            drop_count_queue_capacity: DEFAULT_DROP_COUNT_QUEUE_CAPACITY,
            perf_buffer_pages: DEFAULT_PERF_BUFFER_PAGES,
            object_path: None,
        }
    }
}

impl EventerConfig {
    /// Check the configuration before anything is loaded into the kernel
    pub fn validate(&self) -> Result<()> {
        if self.event_queue_capacity == 0 {
            bail!("Event queue capacity must be >= 1");
        }

        if self.drop_count_queue_capacity == 0 {
            bail!("Drop count queue capacity must be >= 1");
        }

        if !self.perf_buffer_pages.is_power_of_two() {
            bail!(
                "Perf buffer size must be a power of two number of pages, got {}",
                self.perf_buffer_pages
            );
        }

        Ok(())
    }
}
