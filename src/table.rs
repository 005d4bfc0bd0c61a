//! Sprite tables
//!
//! Fixed-capacity lists of sprite records indexed by sprite number. With
//! per-level sprites enabled the normal list holds 16 slots per level
//! (numbers B0-BF) followed by the 256 global slots at `0x2000`.

use log::debug;

use crate::error::{PatchError, Result};
use crate::sprite::{
    ListType, Sprite, GLOBAL_LEVEL, GLOBAL_SPRITE_COUNT, PER_LEVEL_FIRST, PER_LEVEL_LAST,
};

/// First global slot of the normal list when per-level sprites are enabled
pub const GLOBAL_WINDOW_START: usize = 0x2000;
/// Slots reserved for each level
pub const LEVEL_SLOTS: usize = 0x10;

#[derive(Debug, Clone)]
pub struct SpriteTables {
    per_level: bool,
    normal: Vec<Sprite>,
    cluster: Vec<Sprite>,
    extended: Vec<Sprite>,
}

impl SpriteTables {
    pub fn new(per_level: bool) -> Self {
        let blank = |list: ListType| vec![Sprite::default(); list.capacity(per_level)];
        SpriteTables {
            per_level,
            normal: blank(ListType::Sprite),
            cluster: blank(ListType::Cluster),
            extended: blank(ListType::Extended),
        }
    }

    /// Build tables from a batch of records, rejecting lists that cannot fit
    pub fn from_records(per_level: bool, records: Vec<Sprite>) -> Result<Self> {
        for list in [ListType::Sprite, ListType::Cluster, ListType::Extended] {
            let count = records.iter().filter(|s| s.list == list).count();
            let limit = list.capacity(per_level);
            if count > limit {
                return Err(PatchError::CapacityExceeded {
                    what: list_name(list),
                    attempted: count,
                    limit,
                });
            }
        }

        let mut tables = SpriteTables::new(per_level);
        for sprite in records {
            tables.insert(sprite)?;
        }
        Ok(tables)
    }

    pub fn per_level(&self) -> bool {
        self.per_level
    }

    /// Slot of `number` in `list`. `level` is `GLOBAL_LEVEL` for global sprites.
    pub fn slot_index(&self, list: ListType, level: usize, number: usize, line: usize) -> Result<usize> {
        if list != ListType::Sprite {
            if number >= list.capacity(self.per_level) {
                return Err(PatchError::InvalidSlot(
                    format!("Sprite number must be less than {:X}", list.capacity(false)),
                    line,
                ));
            }
            return Ok(number);
        }

        if number >= GLOBAL_SPRITE_COUNT {
            return Err(PatchError::InvalidSlot(
                "Sprite number must be less than 0x100".to_string(),
                line,
            ));
        }
        if !self.per_level {
            if level != GLOBAL_LEVEL {
                return Err(PatchError::InvalidSlot(
                    format!(
                        "Trying to insert a sprite for level {:03X} without per-level sprites enabled",
                        level
                    ),
                    line,
                ));
            }
            return Ok(number);
        }

        let reserved = (PER_LEVEL_FIRST..=PER_LEVEL_LAST).contains(&number);
        if level > GLOBAL_LEVEL {
            Err(PatchError::InvalidSlot(
                "Level must range from 000-1FF".to_string(),
                line,
            ))
        } else if level == GLOBAL_LEVEL {
            if reserved {
                return Err(PatchError::InvalidSlot(
                    "Sprites B0-BF must be assigned a level".to_string(),
                    line,
                ));
            }
            Ok(GLOBAL_WINDOW_START + number)
        } else if reserved {
            Ok(level * LEVEL_SLOTS + (number - PER_LEVEL_FIRST))
        } else {
            Err(PatchError::InvalidSlot(
                "Only sprites B0-BF can be assigned a level".to_string(),
                line,
            ))
        }
    }

    /// Store a record in its slot. Occupied slots are a hard error.
    pub fn insert(&mut self, mut sprite: Sprite) -> Result<usize> {
        if sprite.line == 0 {
            return Err(PatchError::MalformedRecord(
                format!("sprite {:02X} has no source line", sprite.number),
                0,
            ));
        }
        sprite.validate_byte_counts()?;

        let index = self.slot_index(sprite.list, sprite.level, sprite.number, sprite.line)?;
        let slot = &mut self.list_mut(sprite.list)[index];
        if slot.is_populated() {
            return Err(PatchError::DuplicateSprite {
                number: sprite.number,
                level: sprite.level,
                line: sprite.line,
            });
        }

        sprite.apply_vanilla_pointers();
        debug!(
            "Read from line {}\n{}\n--------------------------------------",
            sprite.line, sprite
        );
        *slot = sprite;
        Ok(index)
    }

    pub fn get(&self, list: ListType, level: usize, number: usize) -> Result<&Sprite> {
        let index = self.slot_index(list, level, number, 0)?;
        Ok(&self.list(list)[index])
    }

    pub fn get_mut(&mut self, list: ListType, level: usize, number: usize) -> Result<&mut Sprite> {
        let index = self.slot_index(list, level, number, 0)?;
        Ok(&mut self.list_mut(list)[index])
    }

    pub fn list(&self, list: ListType) -> &[Sprite] {
        match list {
            ListType::Sprite => &self.normal,
            ListType::Cluster => &self.cluster,
            ListType::Extended => &self.extended,
        }
    }

    pub fn list_mut(&mut self, list: ListType) -> &mut [Sprite] {
        match list {
            ListType::Sprite => &mut self.normal,
            ListType::Cluster => &mut self.cluster,
            ListType::Extended => &mut self.extended,
        }
    }

    pub fn normal(&self) -> &[Sprite] {
        &self.normal
    }

    pub fn cluster(&self) -> &[Sprite] {
        &self.cluster
    }

    pub fn extended(&self) -> &[Sprite] {
        &self.extended
    }

    /// The 256 global slots of the normal list
    pub fn global_window(&self) -> &[Sprite] {
        let start = if self.per_level { GLOBAL_WINDOW_START } else { 0 };
        &self.normal[start..start + GLOBAL_SPRITE_COUNT]
    }

    /// Populated level-scoped records in slot order
    pub fn per_level_sprites(&self) -> impl Iterator<Item = &Sprite> {
        let end = if self.per_level { GLOBAL_WINDOW_START } else { 0 };
        self.normal[..end].iter().filter(|s| s.is_populated())
    }
}

fn list_name(list: ListType) -> &'static str {
    match list {
        ListType::Sprite => "normal sprite list",
        ListType::Cluster => "cluster sprite list",
        ListType::Extended => "extended sprite list",
    }
}
