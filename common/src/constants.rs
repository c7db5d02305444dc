//! Constants shared with the kernel program
//!
//! Names must match the symbols in the compiled BPF object, and state
//! codes must match the kernel headers they are copied from.

// ============================================================================
// BPF Object Symbols
// ============================================================================

/// Name under which the BPF module is created
pub const MODULE_NAME: &str = "tcp-audit";

/// Tracepoint program inside the BPF object
pub const PROGRAM_NAME: &str = "tracepoint__sock_inet_sock_set_state";

/// Kernel tracepoint the program is attached to, as `subsystem:event`
pub const TRACEPOINT: &str = "sock:inet_sock_set_state";

/// Perf event array map carrying `RawEvent` records
pub const PERF_BUFFER_NAME: &str = "events";

// ============================================================================
// Record Sizes
// ============================================================================

/// Length of a task command name (linux/sched.h)
pub const TASK_COMM_LEN: usize = 16;

// ============================================================================
// Kernel TCP States (net/tcp_states.h)
// ============================================================================

pub const TCP_ESTABLISHED: i32 = 1;
pub const TCP_SYN_SENT: i32 = 2;
pub const TCP_SYN_RECV: i32 = 3;
pub const TCP_FIN_WAIT1: i32 = 4;
pub const TCP_FIN_WAIT2: i32 = 5;
pub const TCP_TIME_WAIT: i32 = 6;
pub const TCP_CLOSE: i32 = 7;
pub const TCP_CLOSE_WAIT: i32 = 8;
pub const TCP_LAST_ACK: i32 = 9;
pub const TCP_LISTEN: i32 = 10;
pub const TCP_CLOSING: i32 = 11;
/// Request socket state, reported for SYN-RECV on newer kernels
pub const TCP_NEW_SYN_RECV: i32 = 12;

// ============================================================================
// Socket States (linux/net.h, enum socket_state)
// ============================================================================

/// Not allocated
pub const SS_FREE: u8 = 0;
/// Unconnected to any socket
pub const SS_UNCONNECTED: u8 = 1;
/// In process of connecting
pub const SS_CONNECTING: u8 = 2;
/// Connected to socket
pub const SS_CONNECTED: u8 = 3;
/// In process of disconnecting
pub const SS_DISCONNECTING: u8 = 4;
