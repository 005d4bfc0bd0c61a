//! Cartridge image
//!
//! `Rom` owns the image bytes (copier header included), the detected header
//! size and the mapper. Offsets passed to the `read_*` helpers are header-less
//! PC offsets; `write`/`at` take raw file offsets; `snes_to_pc`/`pc_to_snes`
//! apply the header only when asked to.

use log::debug;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::buffer::ByteBuffer;
use crate::error::{PatchError, Result};
use crate::mapper::{AddressMap, Mapper, CHIPSET_OFFSET, INVALID_ADDRESS, MAP_MODE_OFFSET};
use crate::pointer::Pointer;

pub const MAX_ROM_SIZE: usize = 16 * 1024 * 1024;
pub const HEADER_SIZE: usize = 0x200;
pub const PAGE_SIZE: usize = 0x8000;

#[derive(Clone)]
pub struct Rom {
    name: String,
    data: ByteBuffer,
    header_offset: usize,
    mapper: Mapper,
}

impl Rom {
    /// Build an image from raw file bytes
    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Result<Self> {
        let header_offset = match bytes.len() % PAGE_SIZE {
            0 => 0,
            HEADER_SIZE => HEADER_SIZE,
            other => {
                return Err(PatchError::ConfigError(format!(
                    "ROM {} has an unexpected size 0x{:X} (0x{:X} bytes past a bank boundary)",
                    name,
                    bytes.len(),
                    other
                )))
            }
        };
        if bytes.len() < header_offset + PAGE_SIZE {
            return Err(PatchError::ConfigError(format!(
                "ROM {} is too small to contain an internal header",
                name
            )));
        }

        let mapper = Mapper::detect(
            bytes[header_offset + MAP_MODE_OFFSET],
            bytes[header_offset + CHIPSET_OFFSET],
        );
        let data = ByteBuffer::from_vec("ROM image", bytes, MAX_ROM_SIZE)?;

        debug!(
            "Correctly instantiated rom \"{}\" with mapper {}",
            name, mapper
        );

        Ok(Rom {
            name: name.to_string(),
            data,
            header_offset,
            mapper,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| {
            PatchError::IOError(format!("Unable to load ROM {}: {}", path.display(), e))
        })?;
        Rom::from_bytes(&path.display().to_string(), bytes)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.data.as_slice()).map_err(|e| {
            PatchError::IOError(format!("Unable to save ROM {}: {}", path.display(), e))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mapper(&self) -> Mapper {
        self.mapper
    }

    pub fn header_offset(&self) -> usize {
        self.header_offset
    }

    /// Size without the copier header
    pub fn size(&self) -> usize {
        self.data.len() - self.header_offset
    }

    /// Image bytes without the copier header
    pub fn data(&self) -> &[u8] {
        &self.data.as_slice()[self.header_offset..]
    }

    /// Whole file, header included
    pub fn raw(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Mutable access for the assembler collaborator
    pub fn image_mut(&mut self) -> &mut ByteBuffer {
        &mut self.data
    }

    /// Byte at a raw file offset
    pub fn at(&self, offset: usize) -> Result<u8> {
        self.data.get(offset)
    }

    pub fn at_snes(&self, address: usize) -> Result<u8> {
        let offset = self.checked_snes_to_pc(address, true)?;
        self.data.get(offset)
    }

    /// Write at a raw file offset
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.data.write_at(offset, bytes)
    }

    pub fn write_snes(&mut self, address: usize, bytes: &[u8]) -> Result<()> {
        let offset = self.checked_snes_to_pc(address, true)?;
        self.data.write_at(offset, bytes)
    }

    pub fn read_byte(&self, offset: usize) -> Result<u8> {
        self.data.get(offset + self.header_offset)
    }

    pub fn read_word(&self, offset: usize) -> Result<u16> {
        self.data.get_word(offset + self.header_offset)
    }

    pub fn read_long(&self, offset: usize) -> Result<usize> {
        let bytes = self.data.slice(offset + self.header_offset, 3)?;
        Ok(Pointer::from_bytes([bytes[0], bytes[1], bytes[2]]).addr())
    }

    /// Header-less slice starting at `offset`, `len` bytes long
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.slice(offset + self.header_offset, len)
    }

    /// PC offset to SNES address; with `header` the offset counts the copier header
    pub fn pc_to_snes(&self, offset: usize, header: bool) -> usize {
        let offset = if header {
            match offset.checked_sub(self.header_offset) {
                Some(o) => o,
                None => return INVALID_ADDRESS,
            }
        } else {
            offset
        };
        self.mapper.to_logical(offset)
    }

    /// SNES address to PC offset; with `header` the result counts the copier header
    pub fn snes_to_pc(&self, address: usize, header: bool) -> usize {
        match self.mapper.to_linear(address) {
            INVALID_ADDRESS => INVALID_ADDRESS,
            pc if header => pc + self.header_offset,
            pc => pc,
        }
    }

    pub fn checked_snes_to_pc(&self, address: usize, header: bool) -> Result<usize> {
        match self.snes_to_pc(address, header) {
            INVALID_ADDRESS => Err(PatchError::InvalidAddress(address)),
            pc => Ok(pc),
        }
    }

    /// Read a `size`-byte pointer stored at a SNES address. Two byte pointers
    /// take their bank from `bank`.
    pub fn pointer_snes(&self, address: usize, size: usize, bank: u8) -> Result<Pointer> {
        let offset = self.checked_snes_to_pc(address, true)?;
        let bytes = self.data.slice(offset, size.clamp(1, Pointer::SIZE))?;
        let low = bytes[0];
        let high = bytes.get(1).copied().unwrap_or(0);
        let bank = bytes.get(2).copied().unwrap_or(bank);
        Ok(Pointer { low, high, bank })
    }
}

impl fmt::Display for Rom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "
ROM:                      {}
Mapper:                   {}
Header:                   {:#06x}
Size:                     {:#08x}
",
            self.name,
            self.mapper,
            self.header_offset,
            self.size(),
        )
    }
}
