//! Bounds-checked byte arena
//!
//! `ByteBuffer` owns a contiguous block of bytes with a hard capacity fixed at
//! construction. Its length only grows: writes past the current end zero-fill
//! the gap, writes past the capacity fail with a capacity error naming the
//! buffer.

use crate::error::{PatchError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ByteBuffer {
    name: &'static str,
    data: Vec<u8>,
    capacity: usize,
}

impl ByteBuffer {
    /// Create an empty buffer that may grow up to `capacity` bytes
    pub fn new(name: &'static str, capacity: usize) -> Self {
        ByteBuffer {
            name,
            data: Vec::new(),
            capacity,
        }
    }

    /// Create a buffer whose whole capacity is already in use, filled with `fill`
    pub fn filled(name: &'static str, capacity: usize, fill: u8) -> Self {
        ByteBuffer {
            name,
            data: vec![fill; capacity],
            capacity,
        }
    }

    /// Wrap existing bytes; the capacity must cover them
    pub fn from_vec(name: &'static str, data: Vec<u8>, capacity: usize) -> Result<Self> {
        if data.len() > capacity {
            return Err(PatchError::CapacityExceeded {
                what: name,
                attempted: data.len(),
                limit: capacity,
            });
        }
        Ok(ByteBuffer {
            name,
            data,
            capacity,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Grow to `new_len` bytes, zero-filling. Never shrinks.
    pub fn grow_to(&mut self, new_len: usize) -> Result<()> {
        if new_len > self.capacity {
            return Err(PatchError::CapacityExceeded {
                what: self.name,
                attempted: new_len,
                limit: self.capacity,
            });
        }
        if new_len > self.data.len() {
            self.data.resize(new_len, 0);
        }
        Ok(())
    }

    pub fn get(&self, offset: usize) -> Result<u8> {
        self.data
            .get(offset)
            .copied()
            .ok_or(PatchError::OutOfBounds {
                offset,
                len: self.data.len(),
            })
    }

    /// Read a little-endian word
    pub fn get_word(&self, offset: usize) -> Result<u16> {
        let bytes = self.slice(offset, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset.checked_add(len).ok_or(PatchError::OutOfBounds {
            offset,
            len: self.data.len(),
        })?;
        self.data.get(offset..end).ok_or(PatchError::OutOfBounds {
            offset: end,
            len: self.data.len(),
        })
    }

    pub fn set(&mut self, offset: usize, value: u8) -> Result<()> {
        self.write_at(offset, &[value])
    }

    /// Write a little-endian word
    pub fn set_word(&mut self, offset: usize, value: u16) -> Result<()> {
        self.write_at(offset, &value.to_le_bytes())
    }

    /// Copy `bytes` to `offset`, growing the buffer when the write ends past it
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(bytes.len())
            .ok_or(PatchError::CapacityExceeded {
                what: self.name,
                attempted: usize::MAX,
                limit: self.capacity,
            })?;
        self.grow_to(end)?;
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    pub fn push(&mut self, value: u8) -> Result<()> {
        let end = self.data.len();
        self.write_at(end, &[value])
    }

    pub fn fill(&mut self, value: u8) {
        self.data.iter_mut().for_each(|b| *b = value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_writes_grow_and_zero_fill() {
        let mut buf = ByteBuffer::new("scratch", 16);
        buf.write_at(4, &[0xAA, 0xBB]).unwrap();

        assert_eq!(buf.len(), 6);
        assert_eq!(buf.as_slice(), &[0, 0, 0, 0, 0xAA, 0xBB]);
    }

    #[test]
    fn test_write_past_capacity_fails() {
        let mut buf = ByteBuffer::new("scratch", 4);
        let err = buf.write_at(3, &[1, 2]).unwrap_err();

        assert_eq!(
            err,
            PatchError::CapacityExceeded {
                what: "scratch",
                attempted: 5,
                limit: 4
            }
        );
        // Nothing was written
        assert!(buf.is_empty());
    }

    #[test]
    fn test_never_shrinks() {
        let mut buf = ByteBuffer::filled("scratch", 8, 0xFF);
        buf.grow_to(2).unwrap();
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn test_checked_reads() {
        let mut buf = ByteBuffer::new("scratch", 8);
        buf.set_word(0, 0x1234).unwrap();

        assert_eq!(buf.get_word(0).unwrap(), 0x1234);
        assert_eq!(buf.get(0).unwrap(), 0x34);
        assert!(buf.get(2).is_err());
        assert!(buf.slice(1, 2).is_err());
    }
}
