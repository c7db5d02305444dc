//! Byte order used to decode kernel records

use bytes::Buf;

/// Byte order of the integer fields in a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the host, which is the order the kernel writes in
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }

    pub(crate) fn get_u16(self, buf: &mut impl Buf) -> u16 {
        match self {
            Self::Little => buf.get_u16_le(),
            Self::Big => buf.get_u16(),
        }
    }

    pub(crate) fn get_u32(self, buf: &mut impl Buf) -> u32 {
        match self {
            Self::Little => buf.get_u32_le(),
            Self::Big => buf.get_u32(),
        }
    }

    pub(crate) fn get_i32(self, buf: &mut impl Buf) -> i32 {
        match self {
            Self::Little => buf.get_i32_le(),
            Self::Big => buf.get_i32(),
        }
    }

    pub(crate) fn get_u64(self, buf: &mut impl Buf) -> u64 {
        match self {
            Self::Little => buf.get_u64_le(),
            Self::Big => buf.get_u64(),
        }
    }
}
