//! Sources of the compiled BPF object
//!
//! The ELF object is produced by a separate build step. It is either
//! embedded in the binary (`embedded` feature) or read from disk.

use crate::error::LoadError;
use anyhow::{Context, Result};
use log::info;
use std::{borrow::Cow, path::PathBuf};

/// Supplies the bytes of the BPF ELF object
pub trait ObjectSource: Send + Sync {
    fn load(&self) -> Result<Cow<'_, [u8]>>;
}

#[cfg(feature = "embedded")]
static EMBEDDED_OBJECT: &[u8] = aya::include_bytes_aligned!(env!("TCP_AUDIT_BPF_OBJECT"));

#[cfg(not(feature = "embedded"))]
static EMBEDDED_OBJECT: &[u8] = &[];

/// The object embedded in the binary at build time
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedObjectSource;

impl ObjectSource for EmbeddedObjectSource {
    fn load(&self) -> Result<Cow<'_, [u8]>> {
        // Guard against a build that did not embed the object
        if EMBEDDED_OBJECT.is_empty() {
            return Err(LoadError::NoObjectAvailable.into());
        }

        Ok(Cow::Borrowed(EMBEDDED_OBJECT))
    }
}

/// An object file read from disk on each load
#[derive(Debug, Clone)]
pub struct FileObjectSource {
    path: PathBuf,
}

impl FileObjectSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ObjectSource for FileObjectSource {
    fn load(&self) -> Result<Cow<'_, [u8]>> {
        info!("Loading BPF object from: {:?}", self.path);

        let data = std::fs::read(&self.path)
            .with_context(|| format!("Failed to read BPF object file: {:?}", self.path))?;

        if data.is_empty() {
            return Err(LoadError::NoObjectAvailable.into());
        }

        Ok(Cow::Owned(data))
    }
}
