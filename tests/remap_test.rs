/// Level sprite data repacking against a headered image
use sprite_patcher::assembler::AssemblyResult;
use sprite_patcher::config::RemapConfig;
use sprite_patcher::remap::{ExtraByteCounts, RemapEngine, RemapOutcome};
use sprite_patcher::PatchError;
use std::path::Path;
use test_log::test;

mod common;
use common::{blank_rom, install_level_data, point_level_at, set_record_size, ScriptedAssembler};

const LEVEL: usize = 0x00C;
const LEVEL_PC: usize = 0x090100;

/// Level 00C holds sprite 20 with two extra bytes followed by sprite 21
fn headered_rom() -> sprite_patcher::Rom {
    let mut rom = blank_rom(32, true, None);
    install_level_data(&mut rom);
    set_record_size(&mut rom, 0x20, 5);
    let header = rom.header_offset();
    rom.write(
        header + LEVEL_PC,
        &[0x00, 0x10, 0x20, 0x20, 0xAA, 0xBB, 0x10, 0x30, 0x21, 0xFF],
    )
    .unwrap();
    point_level_at(&mut rom, LEVEL, LEVEL_PC);
    rom
}

fn engine(rom: &sprite_patcher::Rom, always_remap: bool) -> RemapEngine {
    let config = RemapConfig {
        always_remap,
        ..Default::default()
    };
    RemapEngine::new(rom, config, Path::new("asm/sa1def.asm"), Path::new(".")).unwrap()
}

#[test]
fn test_header_does_not_shift_table() {
    let rom = headered_rom();
    assert_eq!(rom.header_offset(), 0x200);
    let table = ExtraByteCounts::read_from(&rom).unwrap();
    assert!(table.is_present());
    assert_eq!(table.get(0x20), 5);
    assert_eq!(table.get(0x21), 3);
}

#[test]
fn test_shrinking_drops_extra_bytes() {
    let mut rom = headered_rom();
    let engine = engine(&rom, false);
    set_record_size(&mut rom, 0x20, 2);
    let mut asm = ScriptedAssembler::new(|_, _| AssemblyResult::ok(vec![]));

    let outcome = engine.run_or_revert(&mut rom, &mut asm).unwrap();
    assert_eq!(outcome, RemapOutcome::Remapped(vec![LEVEL]));
    assert_eq!(asm.requests.len(), 1);
    assert_eq!(
        asm.requests[0].virtual_files["_tmp_bin_C.bin"],
        vec![0x00, 0x10, 0x20, 0x20, 0x10, 0x30, 0x21, 0xFF]
    );
}

#[test]
fn test_unchanged_sizes_skip_assembly() {
    let mut rom = headered_rom();
    let engine = engine(&rom, false);
    let mut asm = ScriptedAssembler::new(|_, _| AssemblyResult::ok(vec![]));

    assert_eq!(
        engine.run_or_revert(&mut rom, &mut asm).unwrap(),
        RemapOutcome::Unchanged
    );
    assert!(asm.requests.is_empty());
}

#[test]
fn test_level_patches_see_original_data() {
    let mut rom = headered_rom();
    let engine = engine(&rom, false);
    set_record_size(&mut rom, 0x21, 4);
    // Second busy level sharing the same data
    point_level_at(&mut rom, 0x1FF, LEVEL_PC);

    // Each patch scribbles over the shared data; later levels must not notice
    let header = rom.header_offset();
    let mut asm = ScriptedAssembler::new(move |rom, _| {
        rom.write(header + LEVEL_PC + 1, &[0xFF]).unwrap();
        AssemblyResult::ok(vec![])
    });

    let outcome = engine.run(&mut rom, &mut asm).unwrap();
    assert_eq!(outcome, RemapOutcome::Remapped(vec![LEVEL, 0x1FF]));
    let expected = vec![0x00, 0x10, 0x20, 0x20, 0xAA, 0xBB, 0x10, 0x30, 0x21, 0x00, 0xFF];
    assert_eq!(asm.requests[0].virtual_files["_tmp_bin_C.bin"], expected);
    assert_eq!(asm.requests[1].virtual_files["_tmp_bin_1FF.bin"], expected);
}

#[test]
fn test_failed_level_reverts_everything() {
    let mut rom = headered_rom();
    let pristine = rom.raw().to_vec();
    let engine = engine(&rom, false);
    set_record_size(&mut rom, 0x20, 6);

    let mut asm = ScriptedAssembler::new(|rom, _| {
        rom.write(0x200, &[0x5C]).unwrap();
        AssemblyResult::failed(vec!["no freespace".to_string()])
    });
    let err = engine.run_or_revert(&mut rom, &mut asm).unwrap_err();

    assert!(matches!(err, PatchError::AssemblerFailed { .. }));
    assert_eq!(rom.raw(), pristine.as_slice());
}
