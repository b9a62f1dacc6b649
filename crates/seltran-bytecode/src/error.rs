//! Bytecode errors

use thiserror::Error;

/// Errors from decoding a single instruction word.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Opcode number outside the Lua 5.3 set
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
}

/// Errors from reading a precompiled chunk.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("{0}: not a precompiled chunk")]
    NotBinary(String),

    #[error("{0}: version mismatch")]
    Version(String),

    #[error("{0}: format mismatch")]
    Format(String),

    #[error("{0}: corrupted chunk")]
    Corrupted(String),

    /// A size byte in the header differs from the 64-bit host layout
    #[error("{name}: {what} size mismatch")]
    SizeMismatch { name: String, what: &'static str },

    #[error("{0}: endianness mismatch")]
    Endianness(String),

    #[error("{0}: float format mismatch")]
    FloatFormat(String),

    #[error("{0}: truncated chunk")]
    Truncated(String),

    #[error("{name}: unknown constant type {tag}")]
    UnknownConstant { name: String, tag: u8 },
}
