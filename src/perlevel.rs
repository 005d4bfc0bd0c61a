//! Per-level sprite allocation
//!
//! Level-scoped sprites (B0-BF bound to a level) are reached through two
//! indirections: a word per level points into a table of slot pointers, and
//! each slot pointer leads to a 16-byte sprite table in the payload area with
//! its status pointers stored at the same offset of a parallel area.
//!
//! Every stored pointer is offset by one so that zero means "unallocated".

use log::debug;

use crate::buffer::ByteBuffer;
use crate::error::{PatchError, Result};
use crate::sprite::{SpriteTable, StatusPointers, GLOBAL_LEVEL, PER_LEVEL_FIRST, PER_LEVEL_LAST};
use crate::table::{SpriteTables, LEVEL_SLOTS};

pub const LEVEL_PTRS_SIZE: usize = 0x400;
pub const SPRITE_PTRS_SIZE: usize = 0x4000;
pub const DATA_SIZE: usize = 0x8000;
/// Slot pointers reserved for a level the first time it is seen
pub const CHUNK_SIZE: usize = 0x20;
/// Payload bytes consumed per sprite
pub const ENTRY_SIZE: usize = 0x10;

pub struct PerLevelAllocator {
    level_ptrs: ByteBuffer,
    sprite_ptrs: ByteBuffer,
    data: ByteBuffer,
    status_ptrs: ByteBuffer,
    sprite_ptrs_addr: usize,
    data_addr: usize,
}

impl Default for PerLevelAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl PerLevelAllocator {
    pub fn new() -> Self {
        PerLevelAllocator {
            level_ptrs: ByteBuffer::filled("per-level level pointers", LEVEL_PTRS_SIZE, 0),
            sprite_ptrs: ByteBuffer::new("per-level sprite pointers", SPRITE_PTRS_SIZE),
            data: ByteBuffer::new("per-level sprite tables", DATA_SIZE),
            status_ptrs: ByteBuffer::new("per-level status pointers", DATA_SIZE),
            sprite_ptrs_addr: 0,
            data_addr: 0,
        }
    }

    /// Allocate every populated level-scoped sprite of `tables`, in slot order
    pub fn from_tables(tables: &SpriteTables) -> Result<Self> {
        let mut allocator = PerLevelAllocator::new();
        for spr in tables.per_level_sprites() {
            allocator.allocate(spr.level, spr.number, &spr.table, &spr.ptrs)?;
        }
        if !allocator.is_empty() {
            debug!(
                "Per-level sprites data size : 0x400+0x{:04X}+2*0x{:04X} = {:04X}",
                allocator.sprite_ptrs_addr,
                allocator.data_addr,
                LEVEL_PTRS_SIZE + allocator.sprite_ptrs_addr + 2 * allocator.data_addr
            );
        }
        Ok(allocator)
    }

    /// Store a level-scoped sprite and return the offset of its slot pointer
    pub fn allocate(
        &mut self,
        level: usize,
        number: usize,
        table: &SpriteTable,
        ptrs: &StatusPointers,
    ) -> Result<usize> {
        if level >= LEVEL_PTRS_SIZE / 2 {
            return Err(PatchError::CapacityExceeded {
                what: "per-level level pointers",
                attempted: level.saturating_mul(2).saturating_add(2),
                limit: LEVEL_PTRS_SIZE,
            });
        }
        if !(PER_LEVEL_FIRST..=PER_LEVEL_LAST).contains(&number) || level >= GLOBAL_LEVEL {
            return Err(PatchError::InvalidSlot(
                format!(
                    "Sprite {:02X} for level {:03X} is not a per-level sprite",
                    number, level
                ),
                0,
            ));
        }

        let mut level_addr = self.level_ptrs.get_word(level * 2)? as usize;
        if level_addr == 0 {
            let chunk_end = self.sprite_ptrs_addr + CHUNK_SIZE;
            self.sprite_ptrs.grow_to(chunk_end)?;
            level_addr = self.sprite_ptrs_addr + 1;
            self.level_ptrs.set_word(level * 2, level_addr as u16)?;
            self.sprite_ptrs_addr = chunk_end;
        }
        let slot = level_addr - 1 + (number - PER_LEVEL_FIRST) * 2;

        let data_end = self.data_addr + ENTRY_SIZE;
        if data_end > DATA_SIZE {
            return Err(PatchError::CapacityExceeded {
                what: "per-level sprite tables",
                attempted: data_end,
                limit: DATA_SIZE,
            });
        }

        self.sprite_ptrs.set_word(slot, (self.data_addr + 1) as u16)?;
        self.data.write_at(self.data_addr, &table.to_bytes())?;
        self.status_ptrs.write_at(self.data_addr, &ptrs.to_bytes())?;
        self.status_ptrs.set(self.data_addr + StatusPointers::SIZE, 0xFF)?;
        self.data_addr = data_end;
        Ok(slot)
    }

    /// True when no level-scoped sprite was allocated
    pub fn is_empty(&self) -> bool {
        self.data_addr == 0
    }

    pub fn level_count(&self) -> usize {
        self.sprite_ptrs_addr / CHUNK_SIZE
    }

    pub fn sprite_count(&self) -> usize {
        self.data_addr / ENTRY_SIZE
    }

    pub fn level_pointers(&self) -> &[u8] {
        self.level_ptrs.as_slice()
    }

    pub fn sprite_pointers(&self) -> &[u8] {
        &self.sprite_ptrs.as_slice()[..self.sprite_ptrs_addr]
    }

    pub fn tables(&self) -> &[u8] {
        &self.data.as_slice()[..self.data_addr]
    }

    pub fn status_pointers(&self) -> &[u8] {
        &self.status_ptrs.as_slice()[..self.data_addr]
    }
}

// One chunk holds the B0-BF slot pointers of a level
const _: () = assert!(CHUNK_SIZE == LEVEL_SLOTS * 2);
