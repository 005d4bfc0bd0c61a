//! SNES memory mappers
//!
//! Translation between SNES (logical) addresses and PC (linear file) offsets
//! for the three mappers the patcher supports. All translations here ignore
//! the copier header; `Rom` applies it on request.

use std::fmt;

/// Returned by every translation that falls outside the mapper's windows.
/// Never index with it.
pub const INVALID_ADDRESS: usize = usize::MAX;

/// Header-less offsets of the bytes used to detect the mapper
pub const MAP_MODE_OFFSET: usize = 0x7FD5;
pub const CHIPSET_OFFSET: usize = 0x7FD7;

/// Address translation for one mapping scheme
pub trait AddressMap {
    /// SNES address to PC offset
    fn to_linear(&self, snes: usize) -> usize;
    /// PC offset to SNES address
    fn to_logical(&self, pc: usize) -> usize;
}

/// Plain LoRom: 32 KiB banks mirrored in the upper half of each bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoRom;

impl AddressMap for LoRom {
    fn to_linear(&self, snes: usize) -> usize {
        // WRAM, lower bank halves and SRAM
        if (snes & 0xFE0000) == 0x7E0000
            || (snes & 0x408000) == 0x000000
            || (snes & 0x708000) == 0x700000
        {
            return INVALID_ADDRESS;
        }
        ((snes & 0x7F0000) >> 1) | (snes & 0x7FFF)
    }

    fn to_logical(&self, pc: usize) -> usize {
        ((pc << 1) & 0x7F0000) | (pc & 0x7FFF) | 0x8000
    }
}

/// SA-1 with the default bank registers: 8 slots of 1 MiB, half of them unmapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sa1Rom;

impl Sa1Rom {
    pub const BANKS: [usize; 8] = [
        0 << 20,
        1 << 20,
        INVALID_ADDRESS,
        INVALID_ADDRESS,
        2 << 20,
        3 << 20,
        INVALID_ADDRESS,
        INVALID_ADDRESS,
    ];

    fn bank_or_invalid(slot: usize, rest: usize) -> usize {
        match Self::BANKS[slot] {
            INVALID_ADDRESS => INVALID_ADDRESS,
            base => base | rest,
        }
    }
}

impl AddressMap for Sa1Rom {
    fn to_linear(&self, snes: usize) -> usize {
        if (snes & 0x408000) == 0x008000 {
            Self::bank_or_invalid(
                (snes & 0xE00000) >> 21,
                ((snes & 0x1F0000) >> 1) | (snes & 0x007FFF),
            )
        } else if (snes & 0xC00000) == 0xC00000 {
            Self::bank_or_invalid(
                ((snes & 0x100000) >> 20) | ((snes & 0x200000) >> 19),
                snes & 0x0FFFFF,
            )
        } else {
            INVALID_ADDRESS
        }
    }

    fn to_logical(&self, pc: usize) -> usize {
        Self::BANKS
            .iter()
            .position(|&base| base == (pc & 0x700000))
            .map(|slot| 0x008000 | (slot << 21) | ((pc & 0x0F8000) << 1) | (pc & 0x7FFF))
            .unwrap_or(INVALID_ADDRESS)
    }
}

/// SA-1 with the full 8 MiB map: HiRom-style C0-FF plus two LoRom windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullSa1Rom;

impl AddressMap for FullSa1Rom {
    fn to_linear(&self, snes: usize) -> usize {
        match snes & 0xC00000 {
            0xC00000 => (snes & 0x3FFFFF) | 0x400000,
            0x000000 | 0x800000 => {
                if (snes & 0x008000) == 0 {
                    return INVALID_ADDRESS;
                }
                ((snes & 0x800000) >> 2) | ((snes & 0x3F0000) >> 1) | (snes & 0x7FFF)
            }
            _ => INVALID_ADDRESS,
        }
    }

    fn to_logical(&self, pc: usize) -> usize {
        if (pc & 0x400000) == 0x400000 {
            return pc | 0xC00000;
        }
        match pc & 0x600000 {
            0x000000 => ((pc << 1) & 0x3F0000) | 0x8000 | (pc & 0x7FFF),
            0x200000 => 0x800000 | ((pc << 1) & 0x3F0000) | 0x8000 | (pc & 0x7FFF),
            _ => INVALID_ADDRESS,
        }
    }
}

/// The mapper of a loaded image, selected once at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapper {
    LoRom(LoRom),
    Sa1Rom(Sa1Rom),
    FullSa1Rom(FullSa1Rom),
}

impl Mapper {
    /// Pick the mapper from the map mode and chipset bytes of the internal header
    pub fn detect(map_mode: u8, chipset: u8) -> Mapper {
        match (map_mode, chipset) {
            (0x23, 0x0D) => Mapper::FullSa1Rom(FullSa1Rom),
            (0x23, _) => Mapper::Sa1Rom(Sa1Rom),
            _ => Mapper::LoRom(LoRom),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mapper::LoRom(_) => "LoRom",
            Mapper::Sa1Rom(_) => "SA1Rom",
            Mapper::FullSa1Rom(_) => "FullSA1Rom",
        }
    }

    /// Whether the SA-1 define file should switch the sprite tables over
    pub fn is_sa1(&self) -> bool {
        !matches!(self, Mapper::LoRom(_))
    }

    fn map(&self) -> &dyn AddressMap {
        match self {
            Mapper::LoRom(m) => m,
            Mapper::Sa1Rom(m) => m,
            Mapper::FullSa1Rom(m) => m,
        }
    }
}

impl AddressMap for Mapper {
    fn to_linear(&self, snes: usize) -> usize {
        self.map().to_linear(snes)
    }

    fn to_logical(&self, pc: usize) -> usize {
        self.map().to_logical(pc)
    }
}

impl fmt::Display for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
