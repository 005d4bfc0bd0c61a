//! Sprite assembly
//!
//! Generates a small wrapper patch for every sprite that has an assembly
//! file, hands it to the assembler and stores the routine addresses the
//! patch printed back into the sprite record. Sprites that share an
//! assembly file with an earlier sprite of the same list reuse its routines
//! instead of being assembled twice.

use indexmap::IndexMap;
use log::{debug, info};
use std::fmt::Write as _;

use crate::assembler::{apply_checked, escape_defines, Assembler, PatchRequest};
use crate::config::PatcherConfig;
use crate::diagnostics;
use crate::error::Result;
use crate::rom::Rom;
use crate::sprite::{ListType, Sprite};
use crate::table::SpriteTables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatchSummary {
    /// Sprites sent to the assembler
    pub assembled: usize,
    /// Sprites that reused the routines of an earlier sprite
    pub shared: usize,
}

pub struct SpritePatcher<'a> {
    assembler: &'a mut dyn Assembler,
    config: &'a PatcherConfig,
    shared_files: IndexMap<String, Vec<u8>>,
}

impl<'a> SpritePatcher<'a> {
    pub fn new(assembler: &'a mut dyn Assembler, config: &'a PatcherConfig) -> Self {
        SpritePatcher {
            assembler,
            config,
            shared_files: IndexMap::new(),
        }
    }

    /// Make `bytes` available to every sprite patch under `name`
    pub fn with_shared_file(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.shared_files.insert(name.to_string(), bytes);
        self
    }

    /// Wrapper patch for one sprite
    pub fn patch_source(&self, spr: &Sprite) -> String {
        let mut source = String::new();
        for define in &self.config.paths.extra_defines {
            let path = escape_defines(&define.to_string_lossy());
            writeln!(source, "incsrc \"{}\"", path).ok();
        }
        writeln!(source, "!sprite_num = ${:02X}", spr.number).ok();
        writeln!(source, "!sprite_level = ${:03X}", spr.level).ok();
        source.push('\n');
        source.push_str("namespace nested on\n");
        writeln!(source, "namespace SPRITE_{:03X}_{:02X}", spr.level, spr.number).ok();
        source.push_str("freecode cleaned\n");
        writeln!(source, "SPRITE_ENTRY_{:X}:", spr.number).ok();
        if let Some(asm) = &spr.asm_file {
            writeln!(source, "\tincsrc \"{}\"", escape_defines(asm)).ok();
        }
        source.push_str("namespace off\n");
        source.push_str("namespace nested off\n");
        source
    }

    /// Assemble one sprite and store the routine addresses it reports
    pub fn patch_sprite(&mut self, rom: &mut Rom, spr: &mut Sprite) -> Result<()> {
        let patch_name = match &spr.asm_file {
            Some(asm) => asm.clone(),
            None => format!("sprite_{:02X}.asm", spr.number),
        };
        let request = PatchRequest {
            patch_name,
            source: self.patch_source(spr),
            virtual_files: self.shared_files.clone(),
        };
        let prints = apply_checked(&mut *self.assembler, rom, &request, self.config.warnings)?;
        diagnostics::apply_to_sprite(&prints, spr, self.config.debug)?;
        debug!(
            "Sprite {:02X} inserted: init {}, main {}",
            spr.number, spr.table.init, spr.table.main
        );
        Ok(())
    }

    /// Assemble every sprite of one list, in slot order
    pub fn patch_list(
        &mut self,
        rom: &mut Rom,
        tables: &mut SpriteTables,
        list: ListType,
    ) -> Result<PatchSummary> {
        let mut summary = PatchSummary::default();
        let sprites = tables.list_mut(list);

        for i in 0..sprites.len() {
            let asm = match &sprites[i].asm_file {
                Some(asm) => asm.clone(),
                None => continue,
            };

            let earlier = sprites[..i]
                .iter()
                .rev()
                .find(|s| s.asm_file.as_deref() == Some(asm.as_str()))
                .cloned();
            if let Some(earlier) = earlier {
                debug!(
                    "Sprite {:02X} shares {} with sprite {:02X}",
                    sprites[i].number, asm, earlier.number
                );
                sprites[i].share_pointers_from(&earlier);
                summary.shared += 1;
                continue;
            }

            self.patch_sprite(rom, &mut sprites[i])?;
            summary.assembled += 1;
        }
        Ok(summary)
    }

    /// Assemble the normal, cluster and extended lists
    pub fn patch_all(&mut self, rom: &mut Rom, tables: &mut SpriteTables) -> Result<PatchSummary> {
        let mut total = PatchSummary::default();
        for list in [ListType::Sprite, ListType::Cluster, ListType::Extended] {
            let summary = self.patch_list(rom, tables, list)?;
            total.assembled += summary.assembled;
            total.shared += summary.shared;
        }
        info!(
            "Sprites successfully patched ({} assembled, {} shared)",
            total.assembled, total.shared
        );
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::tests::ScriptedAssembler;
    use crate::assembler::AssemblyResult;
    use crate::error::PatchError;
    use crate::rom::tests::blank_rom;
    use crate::sprite::{SpriteTable, GLOBAL_LEVEL};
    use std::cell::Cell;
    use std::path::PathBuf;
    use std::rc::Rc;
    use test_log::test;

    fn custom(line: usize, number: usize, asm: &str) -> Sprite {
        Sprite {
            line,
            number,
            asm_file: Some(asm.to_string()),
            table: SpriteTable {
                sprite_type: 1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Reports init/main addresses that grow with every patch applied
    fn counting_assembler() -> ScriptedAssembler {
        let next = Rc::new(Cell::new(0x1A8000usize));
        ScriptedAssembler::new(move |_, _| {
            let init = next.get();
            next.set(init + 0x100);
            AssemblyResult::ok(vec![
                format!("INIT ${:06X}", init),
                format!("MAIN ${:06X}", init + 0x10),
                format!("KICKED ${:06X}", init + 0x20),
            ])
        })
    }

    #[test]
    fn test_patch_source() {
        let mut config = PatcherConfig::default();
        config.paths.extra_defines = vec![PathBuf::from("extra!/defines.asm")];
        let mut asm = ScriptedAssembler::succeeding();
        let patcher = SpritePatcher::new(&mut asm, &config);

        let source = patcher.patch_source(&custom(1, 0x1C, "sprites/bullet.asm"));
        assert!(source.starts_with("incsrc \"extra\\!/defines.asm\"\n!sprite_num = $1C\n"));
        assert!(source.contains("!sprite_level = $200\n"));
        assert!(source.contains("SPRITE_ENTRY_1C:\n\tincsrc \"sprites/bullet.asm\"\n"));
        assert!(source.ends_with("namespace nested off\n"));
    }

    #[test]
    fn test_pointers_written_back() {
        let config = PatcherConfig::default();
        let mut asm = counting_assembler();
        let mut rom = blank_rom(4, false);
        let mut tables = SpriteTables::new(false);
        tables.insert(custom(1, 0x10, "a.asm")).unwrap();
        tables.insert(custom(2, 0x11, "b.asm")).unwrap();

        let summary = SpritePatcher::new(&mut asm, &config)
            .patch_all(&mut rom, &mut tables)
            .unwrap();

        assert_eq!(summary.assembled, 2);
        let first = tables.get(ListType::Sprite, GLOBAL_LEVEL, 0x10).unwrap();
        assert_eq!(first.table.init.addr(), 0x1A8000);
        assert_eq!(first.table.main.addr(), 0x1A8010);
        let second = tables.get(ListType::Sprite, GLOBAL_LEVEL, 0x11).unwrap();
        assert_eq!(second.table.init.addr(), 0x1A8100);
        assert_eq!(asm.requests.len(), 2);
    }

    #[test]
    fn test_shared_files_reuse_every_pointer() {
        let config = PatcherConfig::default();
        let mut asm = counting_assembler();
        let mut rom = blank_rom(4, false);
        let mut tables = SpriteTables::new(false);
        tables.insert(custom(1, 0x10, "shell.asm")).unwrap();
        tables.insert(custom(2, 0x11, "shell.asm")).unwrap();
        // Sprites after a shared one are still assembled
        tables.insert(custom(3, 0x12, "other.asm")).unwrap();

        let summary = SpritePatcher::new(&mut asm, &config)
            .patch_all(&mut rom, &mut tables)
            .unwrap();
        assert_eq!(
            summary,
            PatchSummary {
                assembled: 2,
                shared: 1
            }
        );

        let normal = tables.normal();
        assert_eq!(normal[0x11].table.init, normal[0x10].table.init);
        assert_eq!(normal[0x11].table.main, normal[0x10].table.main);
        assert_eq!(normal[0x11].ptrs, normal[0x10].ptrs);
        assert_eq!(normal[0x12].table.init.addr(), 0x1A8100);
    }

    #[test]
    fn test_assembler_failure_stops_patching() {
        let config = PatcherConfig::default();
        let mut asm =
            ScriptedAssembler::new(|_, _| AssemblyResult::failed(vec!["bad".to_string()]));
        let mut rom = blank_rom(4, false);
        let mut tables = SpriteTables::new(false);
        tables.insert(custom(1, 0x10, "a.asm")).unwrap();
        tables.insert(custom(2, 0x11, "b.asm")).unwrap();

        let err = SpritePatcher::new(&mut asm, &config)
            .patch_all(&mut rom, &mut tables)
            .unwrap_err();
        assert!(matches!(err, PatchError::AssemblerFailed { ref patch, .. } if patch == "a.asm"));
        assert_eq!(asm.requests.len(), 1);
    }

    #[test]
    fn test_shared_virtual_files() {
        let config = PatcherConfig::default();
        let mut asm = ScriptedAssembler::succeeding();
        let mut rom = blank_rom(4, false);
        let mut spr = custom(1, 0x10, "a.asm");

        SpritePatcher::new(&mut asm, &config)
            .with_shared_file("config.asm", b"!PerLevel = 0".to_vec())
            .patch_sprite(&mut rom, &mut spr)
            .unwrap();
        assert!(asm.requests[0].virtual_files.contains_key("config.asm"));
    }
}
