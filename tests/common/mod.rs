#![allow(dead_code)]

use sprite_patcher::assembler::{Assembler, AssemblyResult, PatchRequest};
use sprite_patcher::mapper::{AddressMap, CHIPSET_OFFSET, MAP_MODE_OFFSET};
use sprite_patcher::remap::{
    EXTRA_BYTES_ENTRIES, EXTRA_BYTES_FLAG, EXTRA_BYTES_MARKER, EXTRA_BYTES_POINTER,
    LEVEL_BANK_TABLE, LEVEL_COUNT, LEVEL_WORD_TABLE,
};
use sprite_patcher::rom::PAGE_SIZE;
use sprite_patcher::Rom;

pub const TABLE_PC: usize = 0x080000;
pub const EMPTY_LEVEL_PC: usize = 0x090000;

/// Assembler double that records requests and answers from a closure
pub struct ScriptedAssembler {
    pub requests: Vec<PatchRequest>,
    respond: Box<dyn FnMut(&mut Rom, &PatchRequest) -> AssemblyResult>,
}

impl ScriptedAssembler {
    pub fn new(respond: impl FnMut(&mut Rom, &PatchRequest) -> AssemblyResult + 'static) -> Self {
        ScriptedAssembler {
            requests: Vec::new(),
            respond: Box::new(respond),
        }
    }
}

impl Assembler for ScriptedAssembler {
    fn apply(&mut self, rom: &mut Rom, request: &PatchRequest) -> AssemblyResult {
        self.requests.push(request.clone());
        (self.respond)(rom, request)
    }
}

pub fn blank_rom(banks: usize, header: bool, sa1: Option<u8>) -> Rom {
    let header_len = if header { 0x200 } else { 0 };
    let mut bytes = vec![0u8; header_len + banks * PAGE_SIZE];
    if let Some(chipset) = sa1 {
        bytes[header_len + MAP_MODE_OFFSET] = 0x23;
        bytes[header_len + CHIPSET_OFFSET] = chipset;
    }
    Rom::from_bytes("integration.smc", bytes).unwrap()
}

/// Install an extra byte table of all 3s and point every level at empty data.
/// Offsets are header-less.
pub fn install_level_data(rom: &mut Rom) {
    let mapper = rom.mapper();
    let header = rom.header_offset();
    let table_snes = mapper.to_logical(TABLE_PC);
    rom.write(header + EXTRA_BYTES_POINTER, &table_snes.to_le_bytes()[..3])
        .unwrap();
    rom.write(header + EXTRA_BYTES_FLAG, &[EXTRA_BYTES_MARKER])
        .unwrap();
    rom.write(header + TABLE_PC, &[3u8; EXTRA_BYTES_ENTRIES])
        .unwrap();
    rom.write(header + EMPTY_LEVEL_PC, &[0x00, 0xFF]).unwrap();
    for level in 0..LEVEL_COUNT {
        point_level_at(rom, level, EMPTY_LEVEL_PC);
    }
}

pub fn point_level_at(rom: &mut Rom, level: usize, pc: usize) {
    let header = rom.header_offset();
    let snes = rom.mapper().to_logical(pc);
    rom.write(header + LEVEL_BANK_TABLE + level, &[(snes >> 16) as u8])
        .unwrap();
    rom.write(
        header + LEVEL_WORD_TABLE + level * 2,
        &(snes as u16).to_le_bytes(),
    )
    .unwrap();
}

pub fn set_record_size(rom: &mut Rom, number: usize, size: u8) {
    let header = rom.header_offset();
    rom.write(header + TABLE_PC + number, &[size]).unwrap();
}
