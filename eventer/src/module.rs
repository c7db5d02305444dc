//! Handle on a BPF object loaded with aya
//!
//! The module owns every program, map and perf reader derived from it;
//! closing it detaches the programs and frees the kernel resources.

use crate::{
    error::LoadError,
    events::{runtime_handle, PerfEventReader},
    program::{AyaProgram, Program},
};
use anyhow::{anyhow, Context, Result};
use aya::{
    maps::perf::AsyncPerfEventArray,
    programs::{self, TracePoint},
    util::online_cpus,
    Bpf,
};
use bytes::Bytes;
use log::{debug, info};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::{sync::mpsc::Sender, task::JoinHandle};

/// A collection of BPF programs and maps
///
/// Calling anything other than `close` after `close` is an error.
pub trait Module: Send {
    /// Load every program in the module into the kernel
    fn load_object(&mut self) -> Result<()>;

    /// Look up a program by name
    fn program(&mut self, name: &str) -> Result<Box<dyn Program + '_>>;

    /// Bind the named perf buffer map to the event and drop-count queues
    ///
    /// `page_count` is the per-CPU ring size and must be a power of two.
    fn init_perf_buffer(
        &mut self,
        name: &str,
        events: Sender<Bytes>,
        drop_counts: Sender<u64>,
        page_count: usize,
    ) -> Result<Box<dyn PerfBuffer>>;

    /// Detach all programs and release all kernel resources
    fn close(&mut self);
}

/// A perf buffer bound to its queues but not yet polled
pub trait PerfBuffer: Send {
    /// Start polling; records are delivered until the module is closed
    fn start(self: Box<Self>) -> Result<()>;
}

/// Shared list of reader tasks so the module can stop them on close
pub(crate) type ReaderTasks = Arc<Mutex<Vec<JoinHandle<()>>>>;

/// Module backed by an aya [`Bpf`] object
pub struct AyaModule {
    name: String,
    bpf: Option<Bpf>,
    readers: ReaderTasks,
}

impl AyaModule {
    pub(crate) fn new(name: &str, bpf: Bpf) -> Self {
        Self {
            name: name.to_string(),
            bpf: Some(bpf),
            readers: ReaderTasks::default(),
        }
    }

    fn bpf(&mut self) -> Result<&mut Bpf> {
        let name = &self.name;
        self.bpf
            .as_mut()
            .ok_or_else(|| anyhow!("BPF module {} has been closed", name))
    }
}

impl Module for AyaModule {
    fn load_object(&mut self) -> Result<()> {
        info!("Loading BPF programs of module {}...", self.name);

        for (name, program) in self.bpf()?.programs_mut() {
            match program {
                programs::Program::TracePoint(program) => {
                    program
                        .load()
                        .with_context(|| format!("Failed to load {}", name))?;
                }
                _ => return Err(LoadError::UnsupportedProgram(name.to_string()).into()),
            }
            debug!("  ✓ Loaded {}", name);
        }

        Ok(())
    }

    fn program(&mut self, name: &str) -> Result<Box<dyn Program + '_>> {
        let program: &mut TracePoint = self
            .bpf()?
            .program_mut(name)
            .ok_or_else(|| LoadError::ProgramNotFound(name.to_string()))?
            .try_into()
            .map_err(|_| LoadError::NotATracepoint(name.to_string()))?;

        Ok(Box::new(AyaProgram::new(name, program)))
    }

    fn init_perf_buffer(
        &mut self,
        name: &str,
        events: Sender<Bytes>,
        drop_counts: Sender<u64>,
        page_count: usize,
    ) -> Result<Box<dyn PerfBuffer>> {
        // Buffers register with the reactor as they are opened
        let runtime = runtime_handle()?;

        let map = self
            .bpf()?
            .take_map(name)
            .ok_or_else(|| LoadError::MapNotFound(name.to_string()))?;

        let mut perf_array = AsyncPerfEventArray::try_from(map)
            .with_context(|| format!("Failed to create AsyncPerfEventArray from {} map", name))?;

        let cpus = online_cpus().context("Failed to list online CPUs")?;
        let mut buffers = Vec::with_capacity(cpus.len());
        for cpu_id in cpus {
            let buf = perf_array
                .open(cpu_id, Some(page_count))
                .with_context(|| format!("Failed to open {} perf buffer on CPU {}", name, cpu_id))?;
            buffers.push((cpu_id, buf));
        }
        debug!("  ✓ Opened {} perf buffers of {} pages", buffers.len(), page_count);

        Ok(Box::new(PerfEventReader::new(
            runtime,
            buffers,
            events,
            drop_counts,
            Arc::clone(&self.readers),
        )))
    }

    fn close(&mut self) {
        let readers = std::mem::take(
            &mut *self.readers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for reader in readers {
            reader.abort();
        }

        // Dropping the object detaches the programs and closes the maps
        if self.bpf.take().is_some() {
            info!("BPF module {} unloaded", self.name);
        }
    }
}

impl Drop for AyaModule {
    fn drop(&mut self) {
        self.close();
    }
}
