//! Sprite data remapping
//!
//! Level sprite data stores a variable number of extra bytes after each
//! 3-byte sprite record, as declared by the ROM's extra byte table. When a
//! patch run changes that table, every level whose data mentions an affected
//! sprite must be rewritten so the records line up with the new sizes.
//!
//! The engine snapshots the table before anything is patched, compares it with
//! the table of the patched image, repacks the sprite data of every affected
//! level and relocates it with a small patch per level.

use bitvec::prelude::*;
use log::{debug, info, warn};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::assembler::{apply_checked, escape_defines, Assembler, PatchRequest};
use crate::buffer::ByteBuffer;
use crate::config::RemapConfig;
use crate::error::{PatchError, Result};
use crate::rom::Rom;

/// The extra byte table is only present when this byte holds `EXTRA_BYTES_MARKER`
pub const EXTRA_BYTES_FLAG: usize = 0x07730F;
pub const EXTRA_BYTES_MARKER: u8 = 0x42;
/// Long pointer to the extra byte table
pub const EXTRA_BYTES_POINTER: usize = 0x07730C;
pub const EXTRA_BYTES_ENTRIES: usize = 0x400;

pub const LEVEL_COUNT: usize = 0x200;
/// Bank byte of each level's sprite data pointer
pub const LEVEL_BANK_TABLE: usize = 0x077100;
/// Low word of each level's sprite data pointer
pub const LEVEL_WORD_TABLE: usize = 0x02EC00;
/// Repacked sprite data must stay below this size
pub const SPRITE_DATA_LIMIT: usize = 0x800;

const RECORD_HEADER: usize = 3;
const EXTENDED_FORMAT: u8 = 0x20;
const END_OF_DATA: u8 = 0xFF;
const END_OF_EXTENDED: u8 = 0xFE;

/// Total record size (header included) of every sprite number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraByteCounts {
    counts: Vec<u8>,
    present: bool,
}

impl ExtraByteCounts {
    pub fn zeroed() -> Self {
        ExtraByteCounts {
            counts: vec![0; EXTRA_BYTES_ENTRIES],
            present: false,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != EXTRA_BYTES_ENTRIES {
            return Err(PatchError::OutOfBounds {
                offset: EXTRA_BYTES_ENTRIES,
                len: bytes.len(),
            });
        }
        Ok(ExtraByteCounts {
            counts: bytes.to_vec(),
            present: true,
        })
    }

    /// Read the table of `rom`, or an all-zero table if the ROM has none
    pub fn read_from(rom: &Rom) -> Result<Self> {
        if rom.read_byte(EXTRA_BYTES_FLAG)? != EXTRA_BYTES_MARKER {
            return Ok(ExtraByteCounts::zeroed());
        }
        let address = rom.read_long(EXTRA_BYTES_POINTER)?;
        let offset = rom.checked_snes_to_pc(address, false)?;
        ExtraByteCounts::from_bytes(rom.read_bytes(offset, EXTRA_BYTES_ENTRIES)?)
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn get(&self, number: usize) -> usize {
        self.counts[number % EXTRA_BYTES_ENTRIES] as usize
    }

    /// First sprite number whose size differs, with both sizes
    pub fn first_difference(&self, other: &ExtraByteCounts) -> Option<(usize, u8, u8)> {
        self.counts
            .iter()
            .zip(&other.counts)
            .enumerate()
            .find(|(_, (a, b))| a != b)
            .map(|(i, (a, b))| (i, *a, *b))
    }
}

/// Sprite data of one level after repacking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepackedLevel {
    pub data: Vec<u8>,
    /// Some record changed size
    pub dirty: bool,
    /// Bytes read from the original data
    pub consumed: usize,
}

/// Rewrite one level's sprite data for the sizes in `after`. `stream` starts
/// at the level's header byte and may run past the end of the data.
pub fn repack_level(
    stream: &[u8],
    before: &ExtraByteCounts,
    after: &ExtraByteCounts,
) -> Result<RepackedLevel> {
    let byte = |i: usize| {
        stream.get(i).copied().ok_or(PatchError::OutOfBounds {
            offset: i,
            len: stream.len(),
        })
    };
    let mut out = ByteBuffer::new("level sprite data", SPRITE_DATA_LIMIT - 1);

    let header = byte(0)?;
    out.push(header)?;
    let extended = header & EXTENDED_FORMAT != 0;
    let mut src = 1;
    let mut dirty = false;

    loop {
        if out.len() >= SPRITE_DATA_LIMIT - RECORD_HEADER {
            return Err(PatchError::CapacityExceeded {
                what: "level sprite data",
                attempted: out.len() + RECORD_HEADER,
                limit: SPRITE_DATA_LIMIT,
            });
        }

        let mut first = byte(src)?;
        if first == END_OF_DATA {
            out.push(END_OF_DATA)?;
            if !extended {
                src += 1;
                break;
            }
            let marker = byte(src + 1)?;
            out.push(marker)?;
            src += 2;
            if marker == END_OF_EXTENDED {
                break;
            }
            // A lone 0xFF in extended data escapes the byte after it; a
            // regular record follows
            first = byte(src)?;
        }

        let second = byte(src + 1)?;
        let third = byte(src + 2)?;
        for b in [first, second, third] {
            out.push(b)?;
        }

        // YYYYEEsy XXXXSSSS NNNNNNNN
        let number = ((first as usize & 0x0C) << 6) | third as usize;
        let old_size = before.get(number);
        let new_size = after.get(number);
        if old_size != new_size {
            dirty = true;
        }

        let old_trailing = old_size.saturating_sub(RECORD_HEADER);
        let new_trailing = new_size.saturating_sub(RECORD_HEADER);
        let kept = old_trailing.min(new_trailing);
        for i in 0..kept {
            out.push(byte(src + RECORD_HEADER + i)?)?;
        }
        for _ in kept..new_trailing {
            out.push(0x00)?;
        }

        src += old_size.max(RECORD_HEADER);
    }

    Ok(RepackedLevel {
        data: out.into_vec(),
        dirty,
        consumed: src,
    })
}

/// Relocation patch for one level's repacked sprite data
#[derive(Debug, Clone, PartialEq)]
pub struct LevelPatch {
    pub level: usize,
    pub bin_name: String,
    pub asm_name: String,
    pub source: String,
    pub data: Vec<u8>,
}

impl LevelPatch {
    pub fn new(rom: &Rom, level: usize, sa1def: &str, data: Vec<u8>) -> Self {
        let bin_name = format!("_tmp_bin_{:X}.bin", level);
        let asm_name = format!("_tmp_{:X}.asm", level);
        let label = format!("SpriteData{:X}", level);
        let bank_address = format!("{:06X}", rom.pc_to_snes(LEVEL_BANK_TABLE + level, false));
        let word_address = format!(
            "{:06X}",
            rom.pc_to_snes(LEVEL_WORD_TABLE + level * 2, false)
        );

        let mut source = String::new();
        writeln!(source, "incsrc \"{}\"\n", sa1def).ok();
        writeln!(
            source,
            "!oldDataPointer = read2(${})|(read1(${})<<16)",
            word_address, bank_address
        )
        .ok();
        writeln!(
            source,
            "!oldDataSize = read2(pctosnes(snestopc(!oldDataPointer)-4))+1"
        )
        .ok();
        writeln!(source, "autoclean !oldDataPointer\n").ok();
        writeln!(source, "org ${}", bank_address).ok();
        writeln!(source, "\tdb {}>>16\n", label).ok();
        writeln!(source, "org ${}", word_address).ok();
        writeln!(source, "\tdw {}\n", label).ok();
        writeln!(source, "freedata cleaned").ok();
        writeln!(source, "{}:", label).ok();
        writeln!(source, "\t!newDataPointer = {}", label).ok();
        writeln!(source, "\tincbin {}", bin_name).ok();
        writeln!(source, "{}_end:", label).ok();
        writeln!(
            source,
            "\tprint \"Data pointer  $\",hex(!oldDataPointer),\" : $\",hex(!newDataPointer)"
        )
        .ok();
        writeln!(
            source,
            "\tprint \"Data size     $\",hex(!oldDataSize),\" : $\",hex({}_end-{}-1)",
            label, label
        )
        .ok();

        LevelPatch {
            level,
            bin_name,
            asm_name,
            source,
            data,
        }
    }

    pub fn request(&self) -> PatchRequest {
        PatchRequest::new(&self.asm_name, self.source.clone())
            .with_file(&self.bin_name, self.data.clone())
    }

    /// Keep the patch and its data on disk under `dir`
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        for (name, bytes) in [
            (&self.bin_name, self.data.as_slice()),
            (&self.asm_name, self.source.as_bytes()),
        ] {
            let path = dir.join(name);
            fs::write(&path, bytes).map_err(|e| {
                PatchError::IOError(format!("Unable to write {}: {}", path.display(), e))
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemapOutcome {
    /// No size changed and remapping was not forced
    Unchanged,
    /// Levels whose sprite data was relocated
    Remapped(Vec<usize>),
}

/// Sprite data pointer of `level`
pub fn level_data_pointer(rom: &Rom, level: usize) -> Result<usize> {
    let bank = rom.read_byte(LEVEL_BANK_TABLE + level)? as usize;
    let word = rom.read_word(LEVEL_WORD_TABLE + level * 2)? as usize;
    Ok((bank << 16) | word)
}

pub struct RemapEngine {
    config: RemapConfig,
    before: ExtraByteCounts,
    backup: Rom,
    sa1def: String,
    temp_dir: PathBuf,
}

impl RemapEngine {
    /// Snapshot `rom` before any patch is applied to it
    pub fn new(rom: &Rom, config: RemapConfig, sa1def: &Path, temp_dir: &Path) -> Result<Self> {
        let before = ExtraByteCounts::read_from(rom)?;
        Ok(RemapEngine {
            config,
            before,
            backup: rom.clone(),
            sa1def: escape_defines(&sa1def.to_string_lossy()),
            temp_dir: temp_dir.to_path_buf(),
        })
    }

    pub fn before(&self) -> &ExtraByteCounts {
        &self.before
    }

    pub fn run(&self, rom: &mut Rom, assembler: &mut dyn Assembler) -> Result<RemapOutcome> {
        let after = if self.before.is_present() {
            ExtraByteCounts::read_from(rom)?
        } else {
            ExtraByteCounts::zeroed()
        };

        let changed = match self.before.first_difference(&after) {
            Some((number, old, new)) => {
                debug!(
                    "Extra byte counts changed: 0x{:X} {:X} {:X}",
                    number, old, new
                );
                info!("Extra bytes change detected");
                true
            }
            None => false,
        };
        if !changed && !self.config.always_remap {
            return Ok(RemapOutcome::Unchanged);
        }

        // Levels are read from the image as it was before any level patch
        let now = rom.clone();
        let mut remapped = bitvec![0; LEVEL_COUNT];

        for level in 0..LEVEL_COUNT {
            let address = level_data_pointer(&now, level)?;
            let offset = now.checked_snes_to_pc(address, false)?;
            let stream = now.data().get(offset..).ok_or(PatchError::OutOfBounds {
                offset,
                len: now.size(),
            })?;

            let repacked = repack_level(stream, &self.before, &after)?;
            if !repacked.dirty {
                continue;
            }

            let patch = LevelPatch::new(&now, level, &self.sa1def, repacked.data);
            if self.config.keep_temp {
                patch.write_to(&self.temp_dir)?;
            }
            if self.config.debug {
                info!("__________________________________");
                info!("Fixing sprite data for level {:X}", level);
            }

            let prints = apply_checked(assembler, rom, &patch.request(), self.config.debug)?;
            if self.config.debug {
                for print in &prints {
                    info!("\t{}", print);
                }
                info!("Done!");
            }
            remapped.set(level, true);
        }

        info!("Sprite data remapped successfully.");
        Ok(RemapOutcome::Remapped(remapped.iter_ones().collect()))
    }

    /// Run, restoring `rom` to the snapshot taken by `new` on any failure
    pub fn run_or_revert(
        &self,
        rom: &mut Rom,
        assembler: &mut dyn Assembler,
    ) -> Result<RemapOutcome> {
        match self.run(rom, assembler) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                *rom = self.backup.clone();
                warn!("Error occurred while remapping sprite data: {}", err);
                warn!("Your rom has reverted to before the insertion.");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::tests::ScriptedAssembler;
    use crate::assembler::AssemblyResult;
    use crate::mapper::AddressMap;
    use crate::rom::tests::blank_rom;
    use test_log::test;

    fn counts(entries: &[(usize, u8)]) -> ExtraByteCounts {
        let mut bytes = vec![3u8; EXTRA_BYTES_ENTRIES];
        for &(number, size) in entries {
            bytes[number] = size;
        }
        ExtraByteCounts::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_shrinking_record() {
        // One sprite 0x20 with five extra bytes, then a plain sprite 0x21
        let stream = [
            0x00, 0x10, 0x20, 0x20, 1, 2, 3, 4, 5, 0x30, 0x40, 0x21, 0xFF,
        ];
        let before = counts(&[(0x20, 8)]);
        let after = counts(&[(0x20, 5)]);

        let repacked = repack_level(&stream, &before, &after).unwrap();
        assert!(repacked.dirty);
        assert_eq!(repacked.consumed, stream.len());
        assert_eq!(repacked.data.len(), stream.len() - 3);
        assert_eq!(
            repacked.data,
            vec![0x00, 0x10, 0x20, 0x20, 1, 2, 0x30, 0x40, 0x21, 0xFF]
        );
    }

    #[test]
    fn test_growing_record_zero_fills() {
        let stream = [0x00, 0x10, 0x20, 0x20, 0xAA, 0xFF];
        let before = counts(&[(0x20, 4)]);
        let after = counts(&[(0x20, 6)]);

        let repacked = repack_level(&stream, &before, &after).unwrap();
        assert_eq!(
            repacked.data,
            vec![0x00, 0x10, 0x20, 0x20, 0xAA, 0x00, 0x00, 0xFF]
        );
    }

    #[test]
    fn test_identical_tables_are_clean() {
        let stream = [0x00, 0x10, 0x20, 0x20, 0xAA, 0xFF];
        let table = counts(&[(0x20, 4)]);

        let repacked = repack_level(&stream, &table, &table).unwrap();
        assert!(!repacked.dirty);
        assert_eq!(repacked.data, stream.to_vec());
    }

    #[test]
    fn test_high_sprite_numbers() {
        // Bits 2-3 of the first byte select the upper sprite page
        let stream = [0x00, 0x0C, 0x00, 0x05, 0xFF];
        let before = counts(&[]);
        let after = counts(&[(0x305, 4)]);

        let repacked = repack_level(&stream, &before, &after).unwrap();
        assert!(repacked.dirty);
        assert_eq!(repacked.data, vec![0x00, 0x0C, 0x00, 0x05, 0x00, 0xFF]);
    }

    #[test]
    fn test_extended_format() {
        // 0xFF 0x01 is an escape followed by a record; 0xFF 0xFE ends the data
        let stream = [
            0x20, 0x10, 0x20, 0x20, 0xFF, 0x01, 0x10, 0x30, 0x20, 0xFF, 0xFE, 0x99,
        ];
        let table = counts(&[]);

        let repacked = repack_level(&stream, &table, &table).unwrap();
        assert_eq!(repacked.data, stream[..11].to_vec());
        assert_eq!(repacked.consumed, 11);
    }

    #[test]
    fn test_oversized_level() {
        let mut stream = vec![0x00];
        for _ in 0..0x300 {
            stream.extend_from_slice(&[0x10, 0x20, 0x20]);
        }
        stream.push(0xFF);
        let before = counts(&[(0x20, 3)]);
        let after = counts(&[(0x20, 4)]);

        assert!(matches!(
            repack_level(&stream, &before, &after),
            Err(PatchError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_truncated_stream() {
        let table = counts(&[]);
        assert!(matches!(
            repack_level(&[0x00, 0x10, 0x20], &table, &table),
            Err(PatchError::OutOfBounds { .. })
        ));
    }

    const TABLE_PC: usize = 0x080000;
    const EMPTY_LEVEL_PC: usize = 0x090000;
    const BUSY_LEVEL_PC: usize = 0x090100;
    const BUSY_LEVEL: usize = 0x105;

    /// ROM with an extra byte table and every level pointing at valid data
    fn remap_rom() -> Rom {
        let mut rom = blank_rom(32, false);
        let mapper = rom.mapper();
        let table_snes = mapper.to_logical(TABLE_PC);
        rom.write(EXTRA_BYTES_POINTER, &table_snes.to_le_bytes()[..3])
            .unwrap();
        rom.write(EXTRA_BYTES_FLAG, &[EXTRA_BYTES_MARKER]).unwrap();
        rom.write(TABLE_PC, &[3u8; EXTRA_BYTES_ENTRIES]).unwrap();

        rom.write(EMPTY_LEVEL_PC, &[0x00, 0xFF]).unwrap();
        rom.write(BUSY_LEVEL_PC, &[0x00, 0x10, 0x20, 0x20, 0xFF])
            .unwrap();
        for level in 0..LEVEL_COUNT {
            let pc = if level == BUSY_LEVEL {
                BUSY_LEVEL_PC
            } else {
                EMPTY_LEVEL_PC
            };
            let snes = mapper.to_logical(pc);
            rom.write(LEVEL_BANK_TABLE + level, &[(snes >> 16) as u8])
                .unwrap();
            rom.write(LEVEL_WORD_TABLE + level * 2, &(snes as u16).to_le_bytes())
                .unwrap();
        }
        rom
    }

    fn engine(rom: &Rom, always_remap: bool) -> RemapEngine {
        let config = RemapConfig {
            always_remap,
            ..Default::default()
        };
        RemapEngine::new(rom, config, Path::new("asm/sa1def.asm"), Path::new(".")).unwrap()
    }

    #[test]
    fn test_reads_extra_byte_table() {
        let rom = remap_rom();
        let table = ExtraByteCounts::read_from(&rom).unwrap();
        assert!(table.is_present());
        assert_eq!(table.get(0x20), 3);

        assert!(!ExtraByteCounts::read_from(&blank_rom(32, false))
            .unwrap()
            .is_present());
    }

    #[test]
    fn test_no_change_is_a_no_op() {
        let mut rom = remap_rom();
        let engine = engine(&rom, false);
        let mut asm = ScriptedAssembler::succeeding();

        assert_eq!(
            engine.run(&mut rom, &mut asm).unwrap(),
            RemapOutcome::Unchanged
        );
        assert!(asm.requests.is_empty());
    }

    #[test]
    fn test_forced_remap_without_changes() {
        let mut rom = remap_rom();
        let engine = engine(&rom, true);
        let mut asm = ScriptedAssembler::succeeding();

        assert_eq!(
            engine.run(&mut rom, &mut asm).unwrap(),
            RemapOutcome::Remapped(vec![])
        );
        assert!(asm.requests.is_empty());
    }

    #[test]
    fn test_changed_sprite_remaps_its_level() {
        let mut rom = remap_rom();
        let engine = engine(&rom, false);
        rom.write(TABLE_PC + 0x20, &[5]).unwrap();
        let mut asm = ScriptedAssembler::succeeding();

        assert_eq!(
            engine.run(&mut rom, &mut asm).unwrap(),
            RemapOutcome::Remapped(vec![BUSY_LEVEL])
        );
        assert_eq!(asm.requests.len(), 1);
        let request = &asm.requests[0];
        assert_eq!(request.patch_name, "_tmp_105.asm");
        assert_eq!(
            request.virtual_files["_tmp_bin_105.bin"],
            vec![0x00, 0x10, 0x20, 0x20, 0x00, 0x00, 0xFF]
        );
        assert!(request.source.starts_with("incsrc \"asm/sa1def.asm\"\n"));
        assert!(request.source.contains("org $0EF205\n\tdb SpriteData105>>16\n"));
        assert!(request.source.contains("org $05EE0A\n\tdw SpriteData105\n"));
        assert!(request.source.contains("\tincbin _tmp_bin_105.bin\n"));
    }

    #[test]
    fn test_failure_reverts_image() {
        let mut rom = remap_rom();
        let pristine = rom.raw().to_vec();
        let engine = engine(&rom, false);
        rom.write(TABLE_PC + 0x20, &[5]).unwrap();
        let mut asm = ScriptedAssembler::new(|rom, _| {
            rom.write(0, &[0xEA]).unwrap();
            AssemblyResult::failed(vec!["freedata: no space".to_string()])
        });

        let err = engine.run_or_revert(&mut rom, &mut asm).unwrap_err();
        assert!(matches!(err, PatchError::AssemblerFailed { .. }));
        assert_eq!(rom.raw(), pristine.as_slice());
    }

    #[test]
    fn test_invalid_level_pointer() {
        let mut rom = remap_rom();
        let engine = engine(&rom, true);
        rom.write(LEVEL_BANK_TABLE + 3, &[0x7E]).unwrap();
        let mut asm = ScriptedAssembler::succeeding();

        assert!(matches!(
            engine.run(&mut rom, &mut asm),
            Err(PatchError::InvalidAddress(_))
        ));
    }
}
