use serde::Deserialize;
use std::fmt;

use crate::mapper::INVALID_ADDRESS;
use crate::rom::Rom;

/// A 24-bit SNES pointer stored low/high/bank.
///
/// The default value points at an `RTL` in bank 01 and marks the pointer as
/// unset; the game can jump through it safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "u32")]
pub struct Pointer {
    pub low: u8,
    pub high: u8,
    pub bank: u8,
}

impl Pointer {
    pub const RTL_LOW: u8 = 0x21;
    pub const RTL_HIGH: u8 = 0x80;
    pub const RTL_BANK: u8 = 0x01;
    pub const SIZE: usize = 3;

    pub const fn empty() -> Self {
        Pointer {
            low: Self::RTL_LOW,
            high: Self::RTL_HIGH,
            bank: Self::RTL_BANK,
        }
    }

    pub const fn from_snes(addr: usize) -> Self {
        Pointer {
            low: (addr & 0xFF) as u8,
            high: ((addr >> 8) & 0xFF) as u8,
            bank: ((addr >> 16) & 0xFF) as u8,
        }
    }

    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Pointer {
            low: bytes[0],
            high: bytes[1],
            bank: bytes[2],
        }
    }

    /// Unset pointers are the RTL sentinel in all three bytes
    pub fn is_empty(&self) -> bool {
        self.low == Self::RTL_LOW && self.high == Self::RTL_HIGH && self.bank == Self::RTL_BANK
    }

    pub fn addr(&self) -> usize {
        ((self.bank as usize) << 16) | ((self.high as usize) << 8) | (self.low as usize)
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        [self.low, self.high, self.bank]
    }

    /// Header-less PC offset the pointer refers to, if the ROM maps it
    pub fn offset(&self, rom: &Rom) -> Option<usize> {
        match rom.snes_to_pc(self.addr(), false) {
            INVALID_ADDRESS => None,
            pc => Some(pc),
        }
    }
}

impl Default for Pointer {
    fn default() -> Self {
        Pointer::empty()
    }
}

impl From<u32> for Pointer {
    fn from(addr: u32) -> Self {
        Pointer::from_snes(addr as usize)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:02X}:{:02X}{:02X}", self.bank, self.high, self.low)
    }
}
