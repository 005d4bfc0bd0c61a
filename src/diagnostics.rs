//! Assembler print parsing
//!
//! Sprite patches report where their routines ended up by printing lines
//! such as `MAIN $1A8000`. Those lines are turned into `Diagnostic` values
//! here; nothing else in the crate looks at raw print strings.

use log::{debug, info};

use crate::error::{PatchError, Result};
use crate::pointer::Pointer;
use crate::serialize::VERSION;
use crate::sprite::Sprite;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Init,
    Main,
    Cape,
    Carriable,
    Carried,
    Kicked,
    Mouth,
    Goal,
}

impl DiagnosticKind {
    const PREFIXES: [(&'static str, DiagnosticKind); 8] = [
        ("INIT", DiagnosticKind::Init),
        ("MAIN", DiagnosticKind::Main),
        ("CAPE", DiagnosticKind::Cape),
        ("CARRIABLE", DiagnosticKind::Carriable),
        ("CARRIED", DiagnosticKind::Carried),
        ("KICKED", DiagnosticKind::Kicked),
        ("MOUTH", DiagnosticKind::Mouth),
        ("GOAL", DiagnosticKind::Goal),
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A routine address reported by the patch
    Pointer(DiagnosticKind, Pointer),
    /// Minimum tool version the sprite needs
    VersionGuard(u32),
    /// Anything else the patch printed
    Print(String),
}

fn parse_hex(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits = text
        .strip_prefix('$')
        .or_else(|| text.strip_prefix("0x"))
        .unwrap_or(text);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// Match a print line against the known prefixes. The address may follow the
/// prefix directly or after whitespace.
pub fn parse_print(line: &str) -> Diagnostic {
    let trimmed = line.trim_start();

    if let Some(version) = trimmed.strip_prefix("VERG").and_then(parse_hex) {
        return Diagnostic::VersionGuard(version);
    }
    for (prefix, kind) in DiagnosticKind::PREFIXES.iter() {
        let addr = match trimmed.strip_prefix(prefix).and_then(parse_hex) {
            Some(addr) => addr,
            None => continue,
        };
        if addr <= 0xFFFFFF {
            return Diagnostic::Pointer(*kind, Pointer::from_snes(addr as usize));
        }
    }
    Diagnostic::Print(line.to_string())
}

/// Store the reported addresses in `spr`. Plain prints are logged, at info
/// level when `debug` is set.
pub fn apply_to_sprite(prints: &[String], spr: &mut Sprite, debug: bool) -> Result<()> {
    for line in prints {
        match parse_print(line) {
            Diagnostic::Pointer(kind, ptr) => {
                debug!("Sprite {:02X}: {:?} at {}", spr.number, kind, ptr);
                match kind {
                    DiagnosticKind::Init => spr.table.init = ptr,
                    DiagnosticKind::Main => spr.table.main = ptr,
                    DiagnosticKind::Cape => spr.extended_cape_ptr = ptr,
                    DiagnosticKind::Carriable => *spr.ptrs.carriable() = ptr,
                    DiagnosticKind::Carried => *spr.ptrs.carried() = ptr,
                    DiagnosticKind::Kicked => *spr.ptrs.kicked() = ptr,
                    DiagnosticKind::Mouth => *spr.ptrs.mouth() = ptr,
                    DiagnosticKind::Goal => *spr.ptrs.goal() = ptr,
                }
            }
            Diagnostic::VersionGuard(required) => {
                if required > VERSION as u32 {
                    return Err(PatchError::VersionGuard {
                        required,
                        current: VERSION as u32,
                    });
                }
            }
            Diagnostic::Print(text) => {
                if debug {
                    info!("\tFrom sprite {:02X}: {}", spr.number, text);
                } else {
                    debug!("\tFrom sprite {:02X}: {}", spr.number, text);
                }
            }
        }
    }
    Ok(())
}
