//! Binary table artifacts
//!
//! Packs the sprite tables into the fixed-name blobs the main patches pull
//! in with `incbin`. The result is an ordered name → bytes map that can be
//! handed to the assembler as virtual files or written to the asm directory.

use indexmap::IndexMap;
use log::debug;
use std::fs;
use std::path::Path;

use crate::error::{PatchError, Result};
use crate::perlevel::PerLevelAllocator;
use crate::pointer::Pointer;
use crate::sprite::{
    Sprite, SpriteTable, StatusPointers, GLOBAL_SPRITE_COUNT, PER_LEVEL_FIRST,
    PER_LEVEL_LAST, SPRITE_COUNT,
};
use crate::table::SpriteTables;

/// Tool version written to the version flag and checked by version guards
pub const VERSION: u8 = 0x32;

/// Record size used for slots without a sprite
pub const DEFAULT_RECORD_SIZE: u8 = 3;
/// Record size reported for the per-level numbers B0-BF
pub const PER_LEVEL_RECORD_SIZE: u8 = 7;

pub const VERSION_FLAG_FILE: &str = "_versionflag.bin";
pub const DEFAULT_TABLES_FILE: &str = "_DefaultTables.bin";
pub const CUSTOM_STATUS_FILE: &str = "_CustomStatusPtr.bin";
pub const CLUSTER_PTR_FILE: &str = "_ClusterPtr.bin";
pub const EXTENDED_PTR_FILE: &str = "_ExtendedPtr.bin";
pub const EXTENDED_CAPE_PTR_FILE: &str = "_ExtendedCapePtr.bin";
pub const CUSTOM_SIZE_FILE: &str = "_CustomSize.bin";
pub const PER_LEVEL_LVL_PTRS_FILE: &str = "_PerLevelLvlPtrs.bin";
pub const PER_LEVEL_SPR_PTRS_FILE: &str = "_PerLevelSprPtrs.bin";
pub const PER_LEVEL_TABLES_FILE: &str = "_PerLevelT.bin";
pub const PER_LEVEL_CUSTOM_PTR_FILE: &str = "_PerLevelCustomPtrTable.bin";

pub type Artifacts = IndexMap<String, Vec<u8>>;

pub fn version_flag(per_level: bool) -> [u8; 4] {
    [VERSION, 0, 0, per_level as u8]
}

/// True when no slot carries a real init or main routine
pub fn is_empty_table(sprites: &[Sprite]) -> bool {
    sprites
        .iter()
        .all(|s| s.table.init.is_empty() && s.table.main.is_empty())
}

/// The 256 sprite tables, or 16 `0xFF` bytes when every pointer is unset
pub fn default_tables(sprites: &[Sprite]) -> Result<Vec<u8>> {
    check_count("default tables", sprites, GLOBAL_SPRITE_COUNT)?;
    if is_empty_table(sprites) {
        return Ok(vec![0xFF; SpriteTable::SIZE]);
    }
    let mut out = vec![0u8; GLOBAL_SPRITE_COUNT * SpriteTable::SIZE];
    for (chunk, spr) in out.chunks_exact_mut(SpriteTable::SIZE).zip(sprites) {
        chunk.copy_from_slice(&spr.table.to_bytes());
    }
    Ok(out)
}

/// One pointer per slot, picked from each record by `pick`
pub fn pointer_table(
    what: &'static str,
    sprites: &[Sprite],
    count: usize,
    pick: impl Fn(&Sprite) -> Pointer,
) -> Result<Vec<u8>> {
    check_count(what, sprites, count)?;
    let mut out = Vec::with_capacity(count * Pointer::SIZE);
    for i in 0..count {
        let ptr = sprites.get(i).map(&pick).unwrap_or_default();
        out.extend_from_slice(&ptr.to_bytes());
    }
    Ok(out)
}

/// Five status pointers for each of the 256 global slots
pub fn custom_status_pointers(window: &[Sprite]) -> Result<Vec<u8>> {
    check_count("custom status pointers", window, GLOBAL_SPRITE_COUNT)?;
    let mut out = vec![0u8; GLOBAL_SPRITE_COUNT * StatusPointers::SIZE];
    for (chunk, spr) in out.chunks_exact_mut(StatusPointers::SIZE).zip(window) {
        chunk.copy_from_slice(&spr.ptrs.to_bytes());
    }
    Ok(out)
}

/// Record sizes with the extra bit clear (first half) and set (second half)
pub fn custom_size_table(tables: &SpriteTables) -> Result<[u8; 0x200]> {
    let mut sizes = [DEFAULT_RECORD_SIZE; 0x200];
    for (i, spr) in tables.global_window().iter().enumerate() {
        let (clear, set) = if tables.per_level() && (PER_LEVEL_FIRST..=PER_LEVEL_LAST).contains(&i) {
            (PER_LEVEL_RECORD_SIZE, PER_LEVEL_RECORD_SIZE)
        } else if spr.is_populated() {
            spr.validate_byte_counts()?;
            spr.record_sizes()
        } else {
            continue;
        };
        sizes[i] = clear;
        sizes[i + GLOBAL_SPRITE_COUNT] = set;
    }
    Ok(sizes)
}

/// Produce every table artifact, in the order the main patches expect
pub fn serialize(tables: &SpriteTables) -> Result<Artifacts> {
    debug!("Try create binary tables");
    let mut artifacts = Artifacts::new();
    artifacts.insert(
        VERSION_FLAG_FILE.to_string(),
        version_flag(tables.per_level()).to_vec(),
    );

    if tables.per_level() {
        let allocator = PerLevelAllocator::from_tables(tables)?;
        artifacts.extend(per_level_artifacts(&allocator));
    }

    artifacts.insert(
        DEFAULT_TABLES_FILE.to_string(),
        default_tables(tables.global_window())?,
    );
    artifacts.insert(
        CUSTOM_STATUS_FILE.to_string(),
        custom_status_pointers(tables.global_window())?,
    );
    artifacts.insert(
        CLUSTER_PTR_FILE.to_string(),
        pointer_table("cluster pointers", tables.cluster(), SPRITE_COUNT, |s| s.table.main)?,
    );
    artifacts.insert(
        EXTENDED_PTR_FILE.to_string(),
        pointer_table("extended pointers", tables.extended(), SPRITE_COUNT, |s| s.table.main)?,
    );
    artifacts.insert(
        EXTENDED_CAPE_PTR_FILE.to_string(),
        pointer_table("extended cape pointers", tables.extended(), SPRITE_COUNT, |s| {
            s.extended_cape_ptr
        })?,
    );
    artifacts.insert(
        CUSTOM_SIZE_FILE.to_string(),
        custom_size_table(tables)?.to_vec(),
    );
    debug!("Binary tables created");
    Ok(artifacts)
}

fn per_level_artifacts(allocator: &PerLevelAllocator) -> Vec<(String, Vec<u8>)> {
    let used = |bytes: &[u8]| {
        if allocator.is_empty() {
            vec![0xFF]
        } else {
            bytes.to_vec()
        }
    };
    vec![
        (
            PER_LEVEL_LVL_PTRS_FILE.to_string(),
            allocator.level_pointers().to_vec(),
        ),
        (
            PER_LEVEL_SPR_PTRS_FILE.to_string(),
            used(allocator.sprite_pointers()),
        ),
        (PER_LEVEL_TABLES_FILE.to_string(), used(allocator.tables())),
        (
            PER_LEVEL_CUSTOM_PTR_FILE.to_string(),
            used(allocator.status_pointers()),
        ),
    ]
}

/// Write every artifact under `dir`
pub fn write_artifacts(artifacts: &Artifacts, dir: &Path) -> Result<()> {
    for (name, bytes) in artifacts {
        let path = dir.join(name);
        fs::write(&path, bytes).map_err(|e| {
            PatchError::IOError(format!("Unable to write {}: {}", path.display(), e))
        })?;
        debug!("Wrote {} (0x{:X} bytes)", path.display(), bytes.len());
    }
    Ok(())
}

fn check_count(what: &'static str, sprites: &[Sprite], limit: usize) -> Result<()> {
    if sprites.len() > limit {
        return Err(PatchError::CapacityExceeded {
            what,
            attempted: sprites.len(),
            limit,
        });
    }
    Ok(())
}
