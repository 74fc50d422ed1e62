// dgml-bundle - Reader and tree materializer for compiled DGML dialog bundles
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Error types for bundle loading.

use std::fmt;

/// Result type for bundle loading.
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors that can occur while loading a bundle.
#[derive(Debug)]
pub enum LoadError {
    /// I/O error while reading the bundle file.
    Io(std::io::Error),
    /// The file does not start with the DGMLB magic.
    BadMagic,
    /// The header declares more bytes than the buffer holds.
    Truncated { declared: u32, actual: usize },
    /// A record or span reaches past the end of the file.
    OutOfBounds { offset: u32, len: usize },
    /// A string handle does not point at a well-formed string record.
    BadStringHandle(u32),
    /// A string payload is not valid UTF-8.
    InvalidUtf8(u32),
    /// A node carries an unknown type discriminant.
    InvalidNodeType(u32),
    /// An env var carries an unknown type discriminant.
    InvalidVarType(u32),
    /// A rand node has an empty target set.
    EmptyRand { section: u32, node: u32 },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(err) => write!(f, "I/O error: {}", err),
            LoadError::BadMagic => write!(f, "wrong magic"),
            LoadError::Truncated { declared, actual } => {
                write!(
                    f,
                    "file truncated: header declares {} bytes, got {}",
                    declared, actual
                )
            }
            LoadError::OutOfBounds { offset, len } => {
                write!(f, "record at offset {} ({} bytes) is out of bounds", offset, len)
            }
            LoadError::BadStringHandle(handle) => {
                write!(f, "invalid string handle {:#x}", handle)
            }
            LoadError::InvalidUtf8(handle) => {
                write!(f, "string at handle {:#x} is not valid UTF-8", handle)
            }
            LoadError::InvalidNodeType(raw) => write!(f, "invalid node type: {}", raw),
            LoadError::InvalidVarType(raw) => write!(f, "invalid env var type: {}", raw),
            LoadError::EmptyRand { section, node } => {
                write!(f, "rand node {} in section {} has no targets", node, section)
            }
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        LoadError::Io(err)
    }
}
