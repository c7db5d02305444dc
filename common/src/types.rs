//! Record layout emitted by the kernel program
//!
//! Must be repr(C) so the field offsets and tail padding match
//! `struct event_data` in the BPF C exactly.

use crate::constants::TASK_COMM_LEN;

/// TCP state-change event as written to the `events` perf buffer
///
/// Integer fields are in the host's native byte order. Ports are as the
/// tracepoint reports them (host order); addresses are raw network-order
/// octets.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawEvent {
    /// Command of the task on CPU, NUL padded
    pub comm_on_cpu: [u8; TASK_COMM_LEN],
    /// Kernel address of the `struct sock`
    pub sock_addr: u64,
    /// Process ID on CPU when the state changed
    pub pid_on_cpu: u32,
    /// Inode of the socket file
    pub sock_inode: u32,
    /// Owner UID of the socket file
    pub sock_uid: u32,
    /// Owner GID of the socket file
    pub sock_gid: u32,
    /// Kernel TCP state before the transition (see TCP_* constants)
    pub old_state: i32,
    /// Kernel TCP state after the transition (see TCP_* constants)
    pub new_state: i32,
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// Source IPv4 address (network byte order)
    pub src_addr: [u8; 4],
    /// Destination IPv4 address (network byte order)
    pub dst_addr: [u8; 4],
    /// `socket_state` of the owning socket (see SS_* constants)
    pub sock_state: u8,
}

/// Size in bytes of the C struct, including tail padding
pub const RAW_EVENT_LEN: usize = core::mem::size_of::<RawEvent>();

/// Size in bytes of one record as read from the perf buffer
///
/// The kernel pads raw samples so that the sample plus its `u32` size
/// header ends on an 8-byte boundary.
pub const PERF_RECORD_LEN: usize =
    round_up_u64(RAW_EVENT_LEN + PERF_SIZE_HEADER_LEN) - PERF_SIZE_HEADER_LEN;

const PERF_SIZE_HEADER_LEN: usize = core::mem::size_of::<u32>();

const fn round_up_u64(len: usize) -> usize {
    let align = core::mem::size_of::<u64>();
    (len + align - 1) / align * align
}

// Compile-time layout checks
// These will fail to compile if the layout drifts from the BPF C
const _: () = {
    assert!(RAW_EVENT_LEN == 64);
    assert!(core::mem::align_of::<RawEvent>() == 8);
    assert!(RAW_EVENT_LEN % core::mem::align_of::<RawEvent>() == 0);
    assert!(PERF_RECORD_LEN == 68);
};
