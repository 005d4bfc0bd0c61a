use serde::Deserialize;
use std::fmt::{Display, Error, Formatter};

use crate::error::{PatchError, Result};
use crate::pointer::Pointer;

/// Level value of sprites that are not bound to a level
pub const GLOBAL_LEVEL: usize = 0x200;
/// Normal list size when per-level sprites are enabled
pub const MAX_SPRITE_COUNT: usize = 0x2100;
/// Size of the cluster and extended lists
pub const SPRITE_COUNT: usize = 0x80;
/// Size of the normal list without per-level sprites
pub const GLOBAL_SPRITE_COUNT: usize = 0x100;
/// Vanilla init/main pointer tables used by tweak-only sprites
pub const INIT_PTR: usize = 0x01817D;
pub const MAIN_PTR: usize = 0x0185CC;
/// Largest number of extra property bytes a sprite may declare
pub const MAX_EXTRA_BYTES: usize = 15;
/// Numbers reserved for per-level sprites
pub const PER_LEVEL_FIRST: usize = 0xB0;
pub const PER_LEVEL_LAST: usize = 0xBF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    #[default]
    Sprite,
    Extended,
    Cluster,
}

impl ListType {
    pub fn capacity(&self, per_level: bool) -> usize {
        match self {
            ListType::Sprite if per_level => MAX_SPRITE_COUNT,
            ListType::Sprite => GLOBAL_SPRITE_COUNT,
            ListType::Extended | ListType::Cluster => SPRITE_COUNT,
        }
    }
}

/// The 16-byte block the game indexes by sprite number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct SpriteTable {
    #[serde(rename = "type")]
    pub sprite_type: u8,
    pub actlike: u8,
    pub tweak: [u8; 6],
    pub init: Pointer,
    pub main: Pointer,
    pub extra: [u8; 2],
}

impl SpriteTable {
    pub const SIZE: usize = 0x10;

    pub fn to_bytes(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0] = self.sprite_type;
        bytes[1] = self.actlike;
        bytes[2..8].copy_from_slice(&self.tweak);
        bytes[8..11].copy_from_slice(&self.init.to_bytes());
        bytes[11..14].copy_from_slice(&self.main.to_bytes());
        bytes[14..16].copy_from_slice(&self.extra);
        bytes
    }
}

/// Routines run while the sprite is in one of the special statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct StatusPointers {
    pub pointers: [Pointer; 5],
}

impl StatusPointers {
    pub const SIZE: usize = 15;

    pub fn carriable(&mut self) -> &mut Pointer {
        &mut self.pointers[0]
    }

    pub fn kicked(&mut self) -> &mut Pointer {
        &mut self.pointers[1]
    }

    pub fn carried(&mut self) -> &mut Pointer {
        &mut self.pointers[2]
    }

    pub fn mouth(&mut self) -> &mut Pointer {
        &mut self.pointers[3]
    }

    pub fn goal(&mut self) -> &mut Pointer {
        &mut self.pointers[4]
    }

    pub fn to_bytes(&self) -> [u8; 15] {
        let mut bytes = [0u8; 15];
        for (chunk, ptr) in bytes.chunks_exact_mut(Pointer::SIZE).zip(&self.pointers) {
            chunk.copy_from_slice(&ptr.to_bytes());
        }
        bytes
    }
}

/// One tile of a Lunar Magic display, or a text label when `text` is set
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Tile {
    pub x_offset: i32,
    pub y_offset: i32,
    pub tile_number: u32,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct SpriteDisplay {
    pub description: String,
    pub tiles: Vec<Tile>,
    pub extra_bit: bool,
    pub x: u8,
    pub y: u8,
}

/// Lunar Magic sprite collection entry
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct Collection {
    pub name: String,
    pub extra_bit: bool,
    pub prop: [u8; 12],
}

/// A 16x16 block: four 8x8 corners, each stored as (prop, tile)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(transparent)]
pub struct Map16Block(pub [u8; 8]);

impl Map16Block {
    pub const SIZE: usize = 8;
}

/// A normalized sprite record
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Sprite {
    /// Manifest line the record came from, 0 while the slot is unused
    pub line: usize,
    pub number: usize,
    pub level: usize,
    pub list: ListType,
    pub table: SpriteTable,
    pub ptrs: StatusPointers,
    pub extended_cape_ptr: Pointer,
    pub byte_count: usize,
    pub extra_byte_count: usize,
    pub asm_file: Option<String>,
    pub displays: Vec<SpriteDisplay>,
    pub collections: Vec<Collection>,
    pub map_data: Vec<Map16Block>,
}

impl Default for Sprite {
    fn default() -> Self {
        Sprite {
            line: 0,
            number: 0,
            level: GLOBAL_LEVEL,
            list: ListType::Sprite,
            table: SpriteTable::default(),
            ptrs: StatusPointers::default(),
            extended_cape_ptr: Pointer::default(),
            byte_count: 0,
            extra_byte_count: 0,
            asm_file: None,
            displays: Vec::new(),
            collections: Vec::new(),
            map_data: Vec::new(),
        }
    }
}

impl Sprite {
    pub fn is_populated(&self) -> bool {
        self.line != 0
    }

    pub fn is_per_level(&self) -> bool {
        self.level < GLOBAL_LEVEL
    }

    /// Total record size in level data with the extra bit clear / set
    pub fn record_sizes(&self) -> (u8, u8) {
        ((3 + self.byte_count) as u8, (3 + self.extra_byte_count) as u8)
    }

    pub fn validate_byte_counts(&self) -> Result<()> {
        for count in [self.byte_count, self.extra_byte_count] {
            if count > MAX_EXTRA_BYTES {
                return Err(PatchError::ByteCountOutOfRange {
                    number: self.number,
                    line: self.line,
                    count,
                });
            }
        }
        Ok(())
    }

    /// Tweak-only sprites run the vanilla routine of the sprite they act like
    pub fn apply_vanilla_pointers(&mut self) {
        if self.list == ListType::Sprite && self.table.sprite_type == 0 {
            self.table.init = Pointer::from_snes(INIT_PTR + 2 * self.number);
            self.table.main = Pointer::from_snes(MAIN_PTR + 2 * self.number);
        }
    }

    /// Take over the routines another sprite assembled from the same file
    pub fn share_pointers_from(&mut self, other: &Sprite) {
        self.table.init = other.table.init;
        self.table.main = other.table.main;
        self.extended_cape_ptr = other.extended_cape_ptr;
        self.ptrs = other.ptrs;
    }
}

impl Display for Sprite {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::result::Result<(), Error> {
        if self.is_per_level() {
            writeln!(f, "Number {:02X} for level {:03X}", self.number, self.level)?;
        } else {
            writeln!(f, "Number {:02X}", self.number)?;
        }
        writeln!(f, "Type:       {:02X}", self.table.sprite_type)?;
        writeln!(f, "ActLike:    {:02X}", self.table.actlike)?;
        let t = &self.table.tweak;
        writeln!(
            f,
            "Tweak:      {:02X}, {:02X}, {:02X}, {:02X}, {:02X}, {:02X}",
            t[0], t[1], t[2], t[3], t[4], t[5]
        )?;

        if self.table.sprite_type != 0 {
            writeln!(
                f,
                "Extra:      {:02X}, {:02X}",
                self.table.extra[0], self.table.extra[1]
            )?;
            writeln!(f, "ASM File:   {}", self.asm_file.as_deref().unwrap_or(""))?;
            writeln!(
                f,
                "Byte Count: {}, {}",
                self.byte_count, self.extra_byte_count
            )?;
        }

        if !self.displays.is_empty() {
            writeln!(f, "Displays:")?;
        }
        for display in &self.displays {
            writeln!(
                f,
                "\tX: {}, Y: {}, Extra-Bit: {}",
                display.x, display.y, display.extra_bit
            )?;
            writeln!(f, "\tDescription: {}", display.description)?;
            for tile in &display.tiles {
                match &tile.text {
                    Some(text) => writeln!(f, "\t\t{},{},*{}*", tile.x_offset, tile.y_offset, text)?,
                    None => writeln!(
                        f,
                        "\t\t{},{},{:X}",
                        tile.x_offset, tile.y_offset, tile.tile_number
                    )?,
                }
            }
        }

        if !self.collections.is_empty() {
            writeln!(f, "Collections:")?;
        }
        for collection in &self.collections {
            let count = if collection.extra_bit {
                self.extra_byte_count
            } else {
                self.byte_count
            };
            write!(
                f,
                "\tExtra-Bit: {}, Property Bytes: ( ",
                collection.extra_bit
            )?;
            for b in collection.prop.iter().take(count) {
                write!(f, "{:02X} ", b)?;
            }
            writeln!(f, ") Name: {}", collection.name)?;
        }
        Ok(())
    }
}
