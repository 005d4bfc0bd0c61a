//! Record manifest
//!
//! Normalized sprite records in TOML, one `[[sprite]]` table per record, as
//! produced by whatever front end parsed the user's sprite descriptors.
//! Records without an explicit `line` are numbered by their position.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{PatchError, Result};
use crate::sprite::Sprite;
use crate::table::SpriteTables;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    #[serde(rename = "sprite")]
    pub sprites: Vec<Sprite>,
}

impl Manifest {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let mut manifest: Manifest = toml::from_str(text).map_err(|e| {
            PatchError::MalformedRecord(e.to_string(), 0)
        })?;
        for (i, spr) in manifest.sprites.iter_mut().enumerate() {
            if spr.line == 0 {
                spr.line = i + 1;
            }
        }
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            PatchError::IOError(format!("Unable to read {}: {}", path.display(), e))
        })?;
        Manifest::from_toml_str(&text)
    }

    pub fn into_tables(self, per_level: bool) -> Result<SpriteTables> {
        SpriteTables::from_records(per_level, self.sprites)
    }
}
