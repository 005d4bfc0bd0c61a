//! Full insertion run
//!
//! Snapshots the extra byte table, assembles every sprite, serializes the
//! tables, applies the main patches with the tables as virtual files and
//! finally repacks level sprite data unless remapping is disabled.

use log::{debug, info};

use crate::assembler::{apply_checked, escape_defines, Assembler, PatchRequest};
use crate::config::PatcherConfig;
use crate::error::Result;
use crate::patcher::{PatchSummary, SpritePatcher};
use crate::remap::{RemapEngine, RemapOutcome};
use crate::rom::Rom;
use crate::serialize::{serialize, Artifacts};
use crate::table::SpriteTables;

pub const CONFIG_FILE: &str = "config.asm";
/// Main patches, in the order they are applied
pub const MAIN_PATCHES: [&str; 3] = ["main.asm", "cluster.asm", "extended.asm"];

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub patched: PatchSummary,
    pub artifacts: Artifacts,
    /// `None` when remapping is disabled
    pub remap: Option<RemapOutcome>,
}

/// Request applying the main patch `name` from the asm directory
pub fn main_patch_request(config: &PatcherConfig, name: &str, artifacts: &Artifacts) -> PatchRequest {
    let path = escape_defines(&config.paths.asm.join(name).to_string_lossy());
    let mut request = PatchRequest::new(name, format!("incsrc \"{}\"\n", path))
        .with_file(CONFIG_FILE, config.config_asm().into_bytes());
    for (file, bytes) in artifacts {
        request = request.with_file(file, bytes.clone());
    }
    request
}

pub fn run(
    rom: &mut Rom,
    assembler: &mut dyn Assembler,
    config: &PatcherConfig,
    tables: &mut SpriteTables,
) -> Result<RunReport> {
    // Taken before any patch touches the image
    let engine = if config.disable_remap {
        None
    } else {
        Some(RemapEngine::new(
            rom,
            config.remap_settings(),
            &config.paths.sa1def(),
            &config.paths.temp,
        )?)
    };

    let patched = SpritePatcher::new(&mut *assembler, config)
        .with_shared_file(CONFIG_FILE, config.config_asm().into_bytes())
        .patch_all(rom, tables)?;

    let artifacts = serialize(tables)?;
    for name in MAIN_PATCHES {
        let request = main_patch_request(config, name, &artifacts);
        let prints = apply_checked(&mut *assembler, rom, &request, config.warnings)?;
        for print in prints {
            if config.debug {
                info!("\tFrom file \"{}\": {}", name, print);
            } else {
                debug!("\tFrom file \"{}\": {}", name, print);
            }
        }
    }
    info!("All sprites applied successfully");

    let remap = match engine {
        Some(engine) => Some(engine.run_or_revert(rom, assembler)?),
        None => None,
    };
    Ok(RunReport {
        patched,
        artifacts,
        remap,
    })
}
