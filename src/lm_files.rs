//! Lunar Magic side files
//!
//! Lunar Magic picks up sprite display and collection information from four
//! files named after the ROM:
//!
//! - `.ssc`: display lines (description and tiles) per sprite
//! - `.mwt`: collection names
//! - `.mw2`: collection sprite data, `0xFF` terminated
//! - `.s16`: map16 blocks used by the displays
//!
//! Each can start from a base file supplied by the user.

use log::debug;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ExtensionsConfig;
use crate::error::{PatchError, Result};
use crate::sprite::{Map16Block, Sprite, PER_LEVEL_FIRST, PER_LEVEL_LAST};
use crate::table::SpriteTables;

/// Map16 blocks available in the sprite map16 page
pub const MAP16_CAPACITY: usize = 0x700;
/// Tiles from this number on live in the sprite map16 page
pub const MAP16_TILE_BASE: u32 = 0x300;

const MW2_HEADER: u8 = 0x79;
const MW2_EXTRA_BIT: u8 = 0x04;
const MW2_POSITION: u8 = 0x70;
const MW2_END: u8 = 0xFF;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LmFiles {
    pub ssc: String,
    pub mwt: String,
    pub mw2: Vec<u8>,
    map16: Vec<Map16Block>,
}

impl LmFiles {
    /// Start from optional base file contents
    pub fn from_bases(
        ssc: Option<&str>,
        mwt: Option<&str>,
        mw2: Option<&[u8]>,
        s16: Option<&[u8]>,
    ) -> Result<Self> {
        let mut files = LmFiles::default();

        for line in ssc.unwrap_or("").lines() {
            writeln!(files.ssc, "{}", line).ok();
        }
        for line in mwt.unwrap_or("").lines() {
            writeln!(files.mwt, "{}", line).ok();
        }

        // The base's own terminator is dropped; an empty base still needs the
        // leading zero byte Lunar Magic expects
        match mw2 {
            Some(bytes) if !bytes.is_empty() => {
                files.mw2.extend_from_slice(&bytes[..bytes.len() - 1])
            }
            _ => files.mw2.push(0x00),
        }

        if let Some(bytes) = s16 {
            if bytes.len() % Map16Block::SIZE != 0 {
                return Err(PatchError::ConfigError(format!(
                    "s16 base file has size 0x{:X}, not a multiple of {}",
                    bytes.len(),
                    Map16Block::SIZE
                )));
            }
            let blocks = bytes.len() / Map16Block::SIZE;
            if blocks > MAP16_CAPACITY {
                return Err(PatchError::CapacityExceeded {
                    what: "map16 blocks",
                    attempted: blocks,
                    limit: MAP16_CAPACITY,
                });
            }
            for chunk in bytes.chunks_exact(Map16Block::SIZE) {
                let mut block = [0u8; Map16Block::SIZE];
                block.copy_from_slice(chunk);
                files.map16.push(Map16Block(block));
            }
        }

        Ok(files)
    }

    /// Load the base files named by the configuration
    pub fn load_bases(extensions: &ExtensionsConfig) -> Result<Self> {
        let text = |path: &Option<PathBuf>| -> Result<Option<String>> {
            path.as_ref()
                .map(|p| {
                    fs::read_to_string(p).map_err(|e| {
                        PatchError::IOError(format!("Unable to read {}: {}", p.display(), e))
                    })
                })
                .transpose()
        };
        let binary = |path: &Option<PathBuf>| -> Result<Option<Vec<u8>>> {
            path.as_ref()
                .map(|p| {
                    fs::read(p).map_err(|e| {
                        PatchError::IOError(format!("Unable to read {}: {}", p.display(), e))
                    })
                })
                .transpose()
        };

        let ssc = text(&extensions.ssc)?;
        let mwt = text(&extensions.mwt)?;
        let mw2 = binary(&extensions.mw2)?;
        let s16 = binary(&extensions.s16)?;
        LmFiles::from_bases(ssc.as_deref(), mwt.as_deref(), mw2.as_deref(), s16.as_deref())
    }

    pub fn map16_len(&self) -> usize {
        self.map16.len()
    }

    /// Add one global sprite's display, collection and map16 data
    pub fn add_sprite(&mut self, index: usize, spr: &Sprite) -> Result<()> {
        if self.map16.len() + spr.map_data.len() > MAP16_CAPACITY {
            return Err(PatchError::CapacityExceeded {
                what: "map16 blocks",
                attempted: self.map16.len() + spr.map_data.len(),
                limit: MAP16_CAPACITY,
            });
        }
        let map_offset = self.map16.len() as u32;
        self.map16.extend_from_slice(&spr.map_data);

        for display in &spr.displays {
            let reference = display.y as usize * 0x1000
                + display.x as usize * 0x100
                + 0x20
                + if display.extra_bit { 0x10 } else { 0 };
            let description = if display.description.is_empty() {
                spr.asm_file.as_deref().unwrap_or("")
            } else {
                display.description.as_str()
            };
            writeln!(self.ssc, "{:02X} {:04X} {}", index, reference, description).ok();

            write!(self.ssc, "{:02X} {:04X}", index, reference + 2).ok();
            for tile in &display.tiles {
                if let Some(text) = &tile.text {
                    write!(self.ssc, " 0,0,*{}*", text).ok();
                    break;
                }
                let mut tile_number = tile.tile_number;
                if tile_number >= MAP16_TILE_BASE {
                    tile_number += 0x100 + map_offset;
                }
                write!(
                    self.ssc,
                    " {},{},{:X}",
                    tile.x_offset, tile.y_offset, tile_number
                )
                .ok();
            }
            self.ssc.push('\n');
        }

        for (j, collection) in spr.collections.iter().enumerate() {
            let (header, count) = if collection.extra_bit {
                (MW2_HEADER + MW2_EXTRA_BIT, spr.extra_byte_count)
            } else {
                (MW2_HEADER, spr.byte_count)
            };
            self.mw2
                .extend_from_slice(&[header, MW2_POSITION, spr.number as u8]);
            self.mw2
                .extend_from_slice(&collection.prop[..count.min(collection.prop.len())]);

            if j == 0 {
                writeln!(self.mwt, "{:02X}\t{}", spr.number, collection.name).ok();
            } else {
                writeln!(self.mwt, "\t{}", collection.name).ok();
            }
        }
        Ok(())
    }

    /// Add every populated global sprite, skipping the per-level numbers
    pub fn add_tables(&mut self, tables: &SpriteTables) -> Result<()> {
        for (i, spr) in tables.global_window().iter().enumerate() {
            if tables.per_level() && (PER_LEVEL_FIRST..=PER_LEVEL_LAST).contains(&i) {
                continue;
            }
            if spr.is_populated() {
                self.add_sprite(i, spr)?;
            }
        }
        Ok(())
    }

    /// Terminated `.mw2` contents
    pub fn mw2_bytes(&self) -> Vec<u8> {
        let mut out = self.mw2.clone();
        out.push(MW2_END);
        out
    }

    /// `.s16` contents, padded with blank blocks to the full page
    pub fn s16_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MAP16_CAPACITY * Map16Block::SIZE);
        for block in &self.map16 {
            out.extend_from_slice(&block.0);
        }
        out.resize(MAP16_CAPACITY * Map16Block::SIZE, 0);
        out
    }

    /// Write the four files next to `rom_path`
    pub fn write(&self, rom_path: &Path) -> Result<()> {
        let outputs: [(&str, Vec<u8>); 4] = [
            ("ssc", self.ssc.clone().into_bytes()),
            ("mwt", self.mwt.clone().into_bytes()),
            ("mw2", self.mw2_bytes()),
            ("s16", self.s16_bytes()),
        ];
        for (extension, bytes) in outputs {
            let path = rom_path.with_extension(extension);
            fs::write(&path, bytes).map_err(|e| {
                PatchError::IOError(format!("Unable to write {}: {}", path.display(), e))
            })?;
            debug!("Wrote {}", path.display());
        }
        Ok(())
    }
}
