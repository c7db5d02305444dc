//! Error types
//!
//! Bring-up and teardown failures travel as `anyhow::Error` with context
//! naming the phase. The leaf conditions below are typed so callers can
//! tell them apart with `downcast_ref`/`is`.

use std::fmt;
use thiserror::Error;

/// Failures locating or loading parts of the BPF object
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("no BPF object available")]
    NoObjectAvailable,

    #[error("program {0:?} not found in BPF object")]
    ProgramNotFound(String),

    #[error("map {0:?} not found in BPF object")]
    MapNotFound(String),

    #[error("program {0:?} is not a tracepoint program")]
    NotATracepoint(String),

    #[error("program {0:?} has an unsupported program type")]
    UnsupportedProgram(String),

    #[error("invalid tracepoint {0:?}, expected \"subsystem:event\"")]
    InvalidTracepoint(String),
}

/// Which TCP state field of a record failed to convert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateField {
    Old,
    New,
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Old => f.write_str("old"),
            Self::New => f.write_str("new"),
        }
    }
}

/// Failures decoding a single record
///
/// Scoped to the record that produced it; the stream stays usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("decoding event data: expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("converting kernel {field} TCP state: illegal kernel TCP state: {code}")]
    TcpState { field: StateField, code: i32 },

    #[error("converting socket state: illegal socket state: {0}")]
    SocketState(u8),
}

/// Returned by every read from an eventer after it has been closed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("read from closed eventer")]
pub struct EventerClosed;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_names_field() {
        let err = DecodeError::TcpState {
            field: StateField::New,
            code: 0xBAD,
        };
        assert_eq!(
            err.to_string(),
            "converting kernel new TCP state: illegal kernel TCP state: 2989"
        );
    }

    #[test]
    fn test_closed_is_distinguishable_through_context() {
        use anyhow::Context;

        let err = Err::<(), _>(EventerClosed)
            .context("reading event")
            .unwrap_err();
        assert!(err.is::<EventerClosed>());
        assert!(err.downcast_ref::<DecodeError>().is_none());
    }
}
