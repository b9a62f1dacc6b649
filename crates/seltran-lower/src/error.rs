//! Lowering errors

use seltran_bytecode::OpCode;
use thiserror::Error;

/// A translation error. Lowering stops at the first one; no partial output exists.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LowerError {
    #[error("unknown opcode {opcode} at pc {pc}")]
    UnknownOpcode { opcode: u8, pc: usize },

    /// An instruction that only works as the first half of a fixed pair
    /// is not followed by its partner.
    #[error("{op} at pc {pc} must be followed by {expected}")]
    MissingPair {
        op: &'static str,
        pc: usize,
        expected: &'static str,
    },

    #[error("{op} at pc {pc} jumps to {target}, outside 0..={len}")]
    TargetOutOfRange {
        op: &'static str,
        pc: usize,
        target: i64,
        len: usize,
    },

    /// A NEWTABLE size hint whose decoded value does not fit in 32 bits.
    #[error("NEWTABLE at pc {pc} has size hint {hint} out of range")]
    SizeHintOutOfRange { pc: usize, hint: u16 },

    #[error("{op} at pc {pc} uses constant {index}, but the function has {len}")]
    ConstantOutOfRange {
        op: &'static str,
        pc: usize,
        index: u32,
        len: usize,
    },

    #[error("{op} at pc {pc} uses nested function {index}, but the function has {len}")]
    ProtoOutOfRange {
        op: &'static str,
        pc: usize,
        index: u32,
        len: usize,
    },

    /// The target is the extra-argument word of a fused instruction.
    #[error("{op} at pc {pc} jumps into the middle of the instruction at {head}")]
    TargetInAbsorbedWord {
        op: &'static str,
        pc: usize,
        head: usize,
    },
}

impl LowerError {
    pub(crate) fn missing_pair(op: OpCode, pc: usize, expected: &'static str) -> Self {
        LowerError::MissingPair {
            op: op.name(),
            pc,
            expected,
        }
    }
}
