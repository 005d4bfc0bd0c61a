//! Patcher configuration
//!
//! Read from a TOML file in the layout of `pixi_conf.toml`. Every field has a
//! default so an empty file (or no file) is a valid configuration.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PatchError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "pixi_conf.toml";
pub const SA1_DEFINE_FILE: &str = "sa1def.asm";

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct PatcherConfig {
    #[serde(rename = "keeptemp")]
    pub keep_temp: bool,
    #[serde(rename = "perlevel")]
    pub per_level: bool,
    #[serde(rename = "disablemeimei", alias = "disable_remap")]
    pub disable_remap: bool,
    /// Keep the per-level sprite limit of the original game
    #[serde(rename = "disable255sprites")]
    pub disable_255_sprites: bool,
    pub debug: bool,
    pub warnings: bool,
    pub paths: PathsConfig,
    #[serde(alias = "meimei")]
    pub remap: RemapConfig,
    pub extensions: ExtensionsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the main patches and receiving the table artifacts
    pub asm: PathBuf,
    /// Directory for temporary files kept with `keeptemp`
    pub temp: PathBuf,
    /// Define files included before every sprite patch
    #[serde(rename = "extradefines")]
    pub extra_defines: Vec<PathBuf>,
    /// External assembler executable
    pub assembler: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            asm: PathBuf::from("asm"),
            temp: PathBuf::from("."),
            extra_defines: Vec::new(),
            assembler: PathBuf::from("asar"),
        }
    }
}

impl PathsConfig {
    pub fn sa1def(&self) -> PathBuf {
        self.asm.join(SA1_DEFINE_FILE)
    }
}

/// Settings of the sprite data remapper
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct RemapConfig {
    /// Repack every level even when no extra byte count changed
    #[serde(rename = "alwaysremap", alias = "always")]
    pub always_remap: bool,
    #[serde(rename = "debuginfo", alias = "debug")]
    pub debug: bool,
    #[serde(rename = "keeptemp", alias = "keep")]
    pub keep_temp: bool,
}

/// Base files for the Lunar Magic side files
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    pub ssc: Option<PathBuf>,
    pub mwt: Option<PathBuf>,
    pub mw2: Option<PathBuf>,
    pub s16: Option<PathBuf>,
}

impl PatcherConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            PatchError::ConfigError(format!("Unable to read {}: {}", path.display(), e))
        })?;
        PatcherConfig::from_toml_str(&text)
    }

    /// Load `path` when given, else the default file when present, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => PatcherConfig::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                PatcherConfig::load(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(PatcherConfig::default()),
        }
    }

    /// Contents of the generated `config.asm` every patch can include
    pub fn config_asm(&self) -> String {
        format!(
            "!PerLevel = {}\n!Disable255SpritesPerLevel = {}",
            self.per_level as u8, self.disable_255_sprites as u8
        )
    }

    /// Remapper settings with the global debug and keep-temp switches folded in
    pub fn remap_settings(&self) -> RemapConfig {
        RemapConfig {
            always_remap: self.remap.always_remap,
            debug: self.remap.debug || self.debug,
            keep_temp: self.remap.keep_temp || self.keep_temp,
        }
    }
}
