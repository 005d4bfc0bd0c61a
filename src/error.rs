// Patcher Error Handling

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum PatchError {
    // Format errors
    MalformedRecord(String, usize), // message, line
    ByteCountOutOfRange {
        number: usize,
        line: usize,
        count: usize,
    },
    DuplicateSprite {
        number: usize,
        level: usize,
        line: usize,
    },
    InvalidSlot(String, usize), // message, line
    VersionGuard {
        required: u32,
        current: u32,
    },

    // Capacity errors
    CapacityExceeded {
        what: &'static str,
        attempted: usize,
        limit: usize,
    },

    // Translation errors
    InvalidAddress(usize),
    OutOfBounds {
        offset: usize,
        len: usize,
    },

    // Collaborator failures
    AssemblerFailed {
        patch: String,
        diagnostics: Vec<String>,
    },

    // Configuration and IO errors
    ConfigError(String),
    IOError(String),
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PatchError::MalformedRecord(msg, line) => {
                write!(f, "Malformed record on line {}: {}", line, msg)
            }
            PatchError::ByteCountOutOfRange {
                number,
                line,
                count,
            } => {
                write!(
                    f,
                    "Extra byte count {} of sprite {:02X} (line {}) out of range, valid range is 0-15",
                    count, number, line
                )
            }
            PatchError::DuplicateSprite {
                number,
                level,
                line,
            } => {
                if *level == crate::sprite::GLOBAL_LEVEL {
                    write!(f, "Error on line {}: Sprite number {:X} already used", line, number)
                } else {
                    write!(
                        f,
                        "Error on line {}: Sprite number {:X} already used for level {:03X}",
                        line, number, level
                    )
                }
            }
            PatchError::InvalidSlot(msg, line) => {
                write!(f, "Error on line {}: {}", line, msg)
            }
            PatchError::VersionGuard { required, current } => {
                write!(
                    f,
                    "Version guard failed: sprite requires tool version {:X}, this is version {:X}",
                    required, current
                )
            }
            PatchError::CapacityExceeded {
                what,
                attempted,
                limit,
            } => {
                write!(
                    f,
                    "Capacity exceeded for {}: attempted 0x{:X}, limit is 0x{:X}",
                    what, attempted, limit
                )
            }
            PatchError::InvalidAddress(addr) => {
                write!(f, "Address ${:06X} is not mapped by the ROM", addr)
            }
            PatchError::OutOfBounds { offset, len } => {
                write!(
                    f,
                    "Offset 0x{:X} is out of bounds of buffer of size 0x{:X}",
                    offset, len
                )
            }
            PatchError::AssemblerFailed { patch, diagnostics } => {
                write!(f, "An error occurred when applying patch {}", patch)?;
                for line in diagnostics {
                    write!(f, "\n\t{}", line)?;
                }
                Ok(())
            }
            PatchError::ConfigError(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            PatchError::IOError(msg) => {
                write!(f, "IO error: {}", msg)
            }
        }
    }
}

impl std::error::Error for PatchError {}

impl From<std::io::Error> for PatchError {
    fn from(e: std::io::Error) -> Self {
        PatchError::IOError(e.to_string())
    }
}

impl From<toml::de::Error> for PatchError {
    fn from(e: toml::de::Error) -> Self {
        PatchError::ConfigError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PatchError>;
