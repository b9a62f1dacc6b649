//! Seltran bytecode: the Lua 5.3 side of the translator.
//!
//! Opcode tables and instruction encoding, the operand decoder, the
//! prototype tree, and the precompiled chunk reader/writer.

pub mod chunk;
pub mod decode;
pub mod disasm;
pub mod error;
pub mod number;
pub mod opcode;
pub mod proto;

pub use decode::{decode, Arg, Decoded, Operands};
pub use error::{ChunkError, DecodeError};
pub use opcode::{Instruction, OpCode};
pub use proto::{Constant, Proto};
