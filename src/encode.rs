//! Wire-format primitives: varints, little-endian integers, var-slices
//!
//! All readers fail with `MalformedInput` on truncation rather than
//! truncating silently.

use crate::error::{Result, TxError};

/// Encode a number as a Bitcoin varint
pub fn encode_varint(value: u64) -> Vec<u8> {
    if value < 0xfd {
        vec![value as u8]
    } else if value <= 0xffff {
        let mut out = vec![0xfd];
        out.extend_from_slice(&(value as u16).to_le_bytes());
        out
    } else if value <= 0xffff_ffff {
        let mut out = vec![0xfe];
        out.extend_from_slice(&(value as u32).to_le_bytes());
        out
    } else {
        let mut out = vec![0xff];
        out.extend_from_slice(&value.to_le_bytes());
        out
    }
}

/// Number of bytes `encode_varint` produces for `value`
pub fn varint_len(value: u64) -> usize {
    if value < 0xfd {
        1
    } else if value <= 0xffff {
        3
    } else if value <= 0xffff_ffff {
        5
    } else {
        9
    }
}

/// Sequential reader over a byte slice with position tracking
pub struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        SliceReader { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(TxError::MalformedInput(format!(
                "Unexpected end of buffer: need {} bytes, have {}",
                n,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_slice(1)?[0])
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        Ok(self.read_u32_le()? as i32)
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        let bytes = self.read_slice(8)?;
        let mut le = [0u8; 8];
        le.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(le))
    }

    pub fn read_hash(&mut self) -> Result<[u8; 32]> {
        let bytes = self.read_slice(32)?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(bytes);
        Ok(hash)
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        let first = self.read_u8()?;
        match first {
            0xfd => {
                let bytes = self.read_slice(2)?;
                Ok(u16::from_le_bytes([bytes[0], bytes[1]]) as u64)
            }
            0xfe => Ok(self.read_u32_le()? as u64),
            0xff => self.read_u64_le(),
            n => Ok(n as u64),
        }
    }

    /// varint-prefixed byte string
    pub fn read_var_slice(&mut self) -> Result<Vec<u8>> {
        let len = self.read_varint()?;
        if len > self.remaining() as u64 {
            return Err(TxError::MalformedInput(format!(
                "Var-slice length {} exceeds remaining buffer {}",
                len,
                self.remaining()
            )));
        }
        Ok(self.read_slice(len as usize)?.to_vec())
    }

    /// varint-prefixed vector of varint-prefixed byte strings
    pub fn read_vector(&mut self) -> Result<Vec<Vec<u8>>> {
        let count = self.read_varint()?;
        let mut items = Vec::new();
        for _ in 0..count {
            items.push(self.read_var_slice()?);
        }
        Ok(items)
    }
}

pub fn write_u32_le(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_i32_le(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_u64_le(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn write_varint(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&encode_varint(value));
}

pub fn write_var_slice(out: &mut Vec<u8>, slice: &[u8]) {
    write_varint(out, slice.len() as u64);
    out.extend_from_slice(slice);
}

pub fn write_vector(out: &mut Vec<u8>, items: &[Vec<u8>]) {
    write_varint(out, items.len() as u64);
    for item in items {
        write_var_slice(out, item);
    }
}
