//! Event reading from BPF perf buffers
//!
//! Reads records from the per-CPU perf buffers and forwards them, along
//! with lost-record counts, onto bounded queues.

use crate::{
    module::{PerfBuffer, ReaderTasks},
    types::kernel::PERF_RECORD_LEN,
};
use anyhow::{Context, Result};
use aya::maps::{perf::AsyncPerfEventArrayBuffer, MapData};
use bytes::{Bytes, BytesMut};
use log::{debug, info, warn};
use std::sync::PoisonError;
use tokio::{runtime::Handle, sync::mpsc::Sender};

/// Records read from a perf buffer in one batch
const READ_BATCH: usize = 10;

/// Handle on the Tokio runtime driving the perf buffers
///
/// Opening an async perf buffer registers it with the runtime's reactor,
/// so this must be checked before any buffer is opened.
pub(crate) fn runtime_handle() -> Result<Handle> {
    Handle::try_current().context("Perf buffer polling requires a Tokio runtime")
}

/// Per-CPU perf buffers waiting to be polled
pub struct PerfEventReader {
    runtime: Handle,
    buffers: Vec<(u32, AsyncPerfEventArrayBuffer<MapData>)>,
    events: Sender<Bytes>,
    drop_counts: Sender<u64>,
    readers: ReaderTasks,
}

impl PerfEventReader {
    pub(crate) fn new(
        runtime: Handle,
        buffers: Vec<(u32, AsyncPerfEventArrayBuffer<MapData>)>,
        events: Sender<Bytes>,
        drop_counts: Sender<u64>,
        readers: ReaderTasks,
    ) -> Self {
        Self {
            runtime,
            buffers,
            events,
            drop_counts,
            readers,
        }
    }
}

impl PerfBuffer for PerfEventReader {
    /// Spawn one reader task per CPU on the runtime the buffers were opened on
    fn start(self: Box<Self>) -> Result<()> {
        let Self {
            runtime,
            buffers,
            events,
            drop_counts,
            readers,
        } = *self;

        info!("Spawning event readers for {} CPUs", buffers.len());

        let mut readers = readers.lock().unwrap_or_else(PoisonError::into_inner);
        for (cpu_id, buf) in buffers {
            readers.push(runtime.spawn(forward_events(
                cpu_id,
                buf,
                events.clone(),
                drop_counts.clone(),
            )));
        }

        Ok(())
    }
}

/// Forward records from one CPU's buffer until a queue is closed
async fn forward_events(
    cpu_id: u32,
    mut buf: AsyncPerfEventArrayBuffer<MapData>,
    events: Sender<Bytes>,
    drop_counts: Sender<u64>,
) {
    // Pre-allocate buffers for reading events
    let mut buffers = (0..READ_BATCH)
        .map(|_| BytesMut::with_capacity(PERF_RECORD_LEN))
        .collect::<Vec<_>>();

    loop {
        let batch = match buf.read_events(&mut buffers).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Error reading events from CPU {}, stopping reader: {}", cpu_id, e);
                return;
            }
        };

        if batch.lost > 0 && drop_counts.send(batch.lost as u64).await.is_err() {
            break;
        }

        for data in buffers.iter_mut().take(batch.read) {
            if events.send(data.split().freeze()).await.is_err() {
                debug!("Event queue closed, stopping reader for CPU {}", cpu_id);
                return;
            }
        }
    }

    debug!("Drop count queue closed, stopping reader for CPU {}", cpu_id);
}
