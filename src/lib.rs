//! Sprite insertion core for SNES ROM images
//!
//! Translates between SNES and file addresses for LoRom and SA-1 images,
//! packs sprite records into the binary tables the main patches include,
//! drives an external assembler over per-sprite patches and repacks level
//! sprite data when the extra byte counts of sprites change.

pub mod assembler;
pub mod buffer;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod lm_files;
pub mod manifest;
pub mod mapper;
pub mod patcher;
pub mod perlevel;
pub mod pipeline;
pub mod pointer;
pub mod remap;
pub mod rom;
pub mod serialize;
pub mod sprite;
pub mod table;

pub use error::{PatchError, Result};
pub use rom::Rom;
