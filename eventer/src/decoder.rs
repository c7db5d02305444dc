//! Decoding of kernel records into events
//!
//! Records are the C struct `event_data` as delivered by the perf buffer:
//! native byte order, tail padding included.

use crate::{
    endian::ByteOrder,
    error::{DecodeError, StateField},
    types::{
        kernel::{constants::TASK_COMM_LEN, PERF_RECORD_LEN},
        Event, RawEvent, SocketInfo, SocketState, TcpState,
    },
};
use bytes::Buf;
use chrono::Utc;
use std::net::Ipv4Addr;

/// Converts one raw record into an [`Event`]
pub trait Decoder: Send + Sync {
    fn to_event(&self, data: &[u8]) -> Result<Event, DecodeError>;
}

/// Decodes records laid out as the BPF C struct
#[derive(Debug, Clone, Copy)]
pub struct CStructDecoder {
    byte_order: ByteOrder,
}

impl CStructDecoder {
    pub fn new(byte_order: ByteOrder) -> Self {
        Self { byte_order }
    }

    /// Read the struct fields in declaration order, ignoring tail padding
    fn read_raw(&self, mut data: &[u8]) -> Result<RawEvent, DecodeError> {
        if data.len() != PERF_RECORD_LEN {
            return Err(DecodeError::Length {
                expected: PERF_RECORD_LEN,
                actual: data.len(),
            });
        }

        let order = self.byte_order;
        let mut raw = RawEvent::default();

        data.copy_to_slice(&mut raw.comm_on_cpu);
        raw.sock_addr = order.get_u64(&mut data);
        raw.pid_on_cpu = order.get_u32(&mut data);
        raw.sock_inode = order.get_u32(&mut data);
        raw.sock_uid = order.get_u32(&mut data);
        raw.sock_gid = order.get_u32(&mut data);
        raw.old_state = order.get_i32(&mut data);
        raw.new_state = order.get_i32(&mut data);
        raw.src_port = order.get_u16(&mut data);
        raw.dst_port = order.get_u16(&mut data);
        data.copy_to_slice(&mut raw.src_addr);
        data.copy_to_slice(&mut raw.dst_addr);
        raw.sock_state = data.get_u8();

        Ok(raw)
    }
}

impl Decoder for CStructDecoder {
    fn to_event(&self, data: &[u8]) -> Result<Event, DecodeError> {
        let time = Utc::now();
        let raw = self.read_raw(data)?;

        let old_state = TcpState::from_kernel(raw.old_state).ok_or(DecodeError::TcpState {
            field: StateField::Old,
            code: raw.old_state,
        })?;

        let new_state = TcpState::from_kernel(raw.new_state).ok_or(DecodeError::TcpState {
            field: StateField::New,
            code: raw.new_state,
        })?;

        let socket_state = SocketState::from_kernel(raw.sock_state)
            .ok_or(DecodeError::SocketState(raw.sock_state))?;

        let socket_info = SocketInfo {
            id: format!("{:x}", raw.sock_addr),
            inode: raw.sock_inode,
            uid: raw.sock_uid,
            gid: raw.sock_gid,
            socket_state,
        };

        Ok(Event {
            time,
            pid_on_cpu: raw.pid_on_cpu,
            command_on_cpu: comm_to_string(&raw.comm_on_cpu),
            source_ip: Ipv4Addr::from(raw.src_addr),
            dest_ip: Ipv4Addr::from(raw.dst_addr),
            source_port: raw.src_port,
            dest_port: raw.dst_port,
            old_state,
            new_state,
            socket_info,
        })
    }
}

/// Text up to the first NUL (or the whole buffer if there is none)
fn comm_to_string(comm: &[u8; TASK_COMM_LEN]) -> String {
    let len = comm.iter().position(|&b| b == 0).unwrap_or(comm.len());
    String::from_utf8_lossy(&comm[..len]).into_owned()
}
