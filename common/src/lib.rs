//! Wire format shared between the TCP state-change BPF program and userspace
//!
//! The BPF object that emits these records is built separately; anything
//! changed here must be changed in the kernel program in lock-step.

#![no_std]

pub mod constants;
pub mod types;

// Re-export commonly used types
pub use constants::*;
pub use types::{RawEvent, PERF_RECORD_LEN, RAW_EVENT_LEN};
