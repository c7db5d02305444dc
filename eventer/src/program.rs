//! Handle on a single BPF program within a loaded module

use crate::error::LoadError;
use anyhow::{Context, Result};
use aya::programs::TracePoint;
use log::debug;

/// A loaded BPF program that can be attached to kernel hooks
///
/// Attachments last as long as the owning module; there is no way to
/// detach a single program short of closing the module.
pub trait Program {
    /// Attach to a tracepoint given as `subsystem:event`
    fn attach_tracepoint(&mut self, tracepoint: &str) -> Result<()>;
}

/// Tracepoint program owned by an aya [`Bpf`](aya::Bpf) object
pub struct AyaProgram<'a> {
    name: String,
    program: &'a mut TracePoint,
}

impl<'a> AyaProgram<'a> {
    pub(crate) fn new(name: &str, program: &'a mut TracePoint) -> Self {
        Self {
            name: name.to_string(),
            program,
        }
    }
}

impl Program for AyaProgram<'_> {
    fn attach_tracepoint(&mut self, tracepoint: &str) -> Result<()> {
        let (category, name) = parse_tracepoint(tracepoint)?;

        self.program
            .attach(category, name)
            .with_context(|| format!("Failed to attach {} to {}", self.name, tracepoint))?;
        debug!("  ✓ Attached {} to {} tracepoint", self.name, tracepoint);

        Ok(())
    }
}

/// Split `subsystem:event` into its two parts
pub(crate) fn parse_tracepoint(tracepoint: &str) -> Result<(&str, &str), LoadError> {
    match tracepoint.split_once(':') {
        Some((category, name)) if !category.is_empty() && !name.is_empty() && !name.contains(':') => {
            Ok((category, name))
        }
        _ => Err(LoadError::InvalidTracepoint(tracepoint.to_string())),
    }
}
