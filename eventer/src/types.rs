//! Userspace type definitions
//!
//! Defines the domain events handed to the host process.
//!
//! ## Organization
//!
//! This module separates kernel and userspace types:
//! - **Kernel Types**: the record layout shared with the BPF program (from tcp_audit_common)
//! - **Userspace Types**: decoded, validated events owned by the caller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, net::Ipv4Addr};

// ============================================================================
// Kernel Types (from the BPF program)
// ============================================================================

pub mod kernel {
    //! Types shared between the kernel BPF program and userspace
    //!
    //! These are re-exported from the tcp-audit-common crate and must
    //! maintain binary compatibility with the BPF program.

    pub use tcp_audit_common::constants;
    pub use tcp_audit_common::types::{RawEvent, PERF_RECORD_LEN, RAW_EVENT_LEN};
}

pub use kernel::RawEvent;

use kernel::constants::*;

// ============================================================================
// Userspace Types
// ============================================================================

/// TCP connection state as named in RFC 793
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TcpState {
    #[serde(rename = "ESTABLISHED")]
    Established,
    #[serde(rename = "SYN-SENT")]
    SynSent,
    #[serde(rename = "SYN-RECEIVED")]
    SynReceived,
    #[serde(rename = "FIN-WAIT-1")]
    FinWait1,
    #[serde(rename = "FIN-WAIT-2")]
    FinWait2,
    #[serde(rename = "TIME-WAIT")]
    TimeWait,
    #[serde(rename = "CLOSED")]
    Closed,
    #[serde(rename = "CLOSE-WAIT")]
    CloseWait,
    #[serde(rename = "LAST-ACK")]
    LastAck,
    #[serde(rename = "LISTEN")]
    Listen,
    #[serde(rename = "CLOSING")]
    Closing,
}

impl TcpState {
    /// Convert a kernel TCP state code
    ///
    /// Both SYN-RECV and NEW-SYN-RECV map to SYN-RECEIVED: the latter is
    /// the kernel's request-socket representation of the same state.
    pub fn from_kernel(code: i32) -> Option<Self> {
        let state = match code {
            TCP_ESTABLISHED => Self::Established,
            TCP_SYN_SENT => Self::SynSent,
            TCP_SYN_RECV | TCP_NEW_SYN_RECV => Self::SynReceived,
            TCP_FIN_WAIT1 => Self::FinWait1,
            TCP_FIN_WAIT2 => Self::FinWait2,
            TCP_TIME_WAIT => Self::TimeWait,
            TCP_CLOSE => Self::Closed,
            TCP_CLOSE_WAIT => Self::CloseWait,
            TCP_LAST_ACK => Self::LastAck,
            TCP_LISTEN => Self::Listen,
            TCP_CLOSING => Self::Closing,
            _ => return None,
        };

        Some(state)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Established => "ESTABLISHED",
            Self::SynSent => "SYN-SENT",
            Self::SynReceived => "SYN-RECEIVED",
            Self::FinWait1 => "FIN-WAIT-1",
            Self::FinWait2 => "FIN-WAIT-2",
            Self::TimeWait => "TIME-WAIT",
            Self::Closed => "CLOSED",
            Self::CloseWait => "CLOSE-WAIT",
            Self::LastAck => "LAST-ACK",
            Self::Listen => "LISTEN",
            Self::Closing => "CLOSING",
        }
    }
}

impl fmt::Display for TcpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State of the `struct socket` owning the connection
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketState {
    #[serde(rename = "FREE")]
    Free,
    #[serde(rename = "UNCONNECTED")]
    Unconnected,
    #[serde(rename = "CONNECTING")]
    Connecting,
    #[serde(rename = "CONNECTED")]
    Connected,
    #[serde(rename = "DISCONNECTING")]
    Disconnecting,
}

impl SocketState {
    /// Convert a kernel `socket_state` code
    pub fn from_kernel(code: u8) -> Option<Self> {
        let state = match code {
            SS_FREE => Self::Free,
            SS_UNCONNECTED => Self::Unconnected,
            SS_CONNECTING => Self::Connecting,
            SS_CONNECTED => Self::Connected,
            SS_DISCONNECTING => Self::Disconnecting,
            _ => return None,
        };

        Some(state)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Unconnected => "UNCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Disconnecting => "DISCONNECTING",
        }
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identity and ownership of the socket behind an event
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SocketInfo {
    /// Kernel address of the socket in lowercase hex
    ///
    /// Addresses are reused once a socket is freed, so this only
    /// correlates events that are close together in time.
    pub id: String,
    /// Inode of the socket file
    pub inode: u32,
    /// Owner UID of the socket file
    pub uid: u32,
    /// Owner GID of the socket file
    pub gid: u32,
    /// State of the socket
    pub socket_state: SocketState,
}

/// A TCP state change observed in the kernel
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// When the event was decoded (the kernel record carries no timestamp)
    pub time: DateTime<Utc>,
    /// Process ID on CPU when the state changed
    pub pid_on_cpu: u32,
    /// Command on CPU when the state changed
    pub command_on_cpu: String,
    pub source_ip: Ipv4Addr,
    pub dest_ip: Ipv4Addr,
    pub source_port: u16,
    pub dest_port: u16,
    pub old_state: TcpState,
    pub new_state: TcpState,
    pub socket_info: SocketInfo,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} -> {}:{} {} -> {} (pid {} {:?}, socket {} {})",
            self.time.to_rfc3339(),
            self.source_ip,
            self.source_port,
            self.dest_ip,
            self.dest_port,
            self.old_state,
            self.new_state,
            self.pid_on_cpu,
            self.command_on_cpu,
            self.socket_info.id,
            self.socket_info.socket_state,
        )
    }
}
