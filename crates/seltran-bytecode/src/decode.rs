//! Instruction decoder: raw words to typed operand sets.
//!
//! Operand addressing is resolved here once, so later passes never look at
//! `BITRK` or field positions again.

use crate::error::DecodeError;
use crate::opcode::{is_constant, ArgMode, Instruction, InstructionFormat, OpCode, BITRK};

/// A decoded B or C field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arg {
    /// The opcode does not use this field.
    Unused,
    /// A plain number (count, flag, upvalue index).
    Value(u16),
    /// A register, relative to the frame base.
    Register(u16),
    /// An index into the prototype's constant pool.
    Constant(u32),
}

impl Arg {
    /// Decode a 9-bit field according to its addressing mode.
    pub fn from_field(field: u16, mode: ArgMode) -> Arg {
        match mode {
            ArgMode::Unused => Arg::Unused,
            ArgMode::Value => Arg::Value(field),
            ArgMode::Register => Arg::Register(field),
            ArgMode::RegisterOrConstant if is_constant(field) => {
                Arg::Constant(field as u32 & !BITRK)
            }
            ArgMode::RegisterOrConstant => Arg::Register(field),
        }
    }

    /// The numeric payload, whatever the kind.
    pub fn raw(&self) -> u32 {
        match *self {
            Arg::Unused => 0,
            Arg::Value(v) | Arg::Register(v) => v as u32,
            Arg::Constant(k) => k,
        }
    }
}

/// Typed operands, one variant per instruction format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operands {
    ABC { a: u8, b: Arg, c: Arg },
    ABx { a: u8, bx: u32 },
    AsBx { a: u8, sbx: i32 },
    Ax { ax: u32 },
}

/// An instruction with its opcode and resolved operands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decoded {
    pub op: OpCode,
    pub operands: Operands,
}

impl Decoded {
    /// Field A (0 for iAx instructions).
    pub fn a(&self) -> u8 {
        match self.operands {
            Operands::ABC { a, .. } | Operands::ABx { a, .. } | Operands::AsBx { a, .. } => a,
            Operands::Ax { .. } => 0,
        }
    }

    /// Field B; `Arg::Unused` outside iABC.
    pub fn b(&self) -> Arg {
        match self.operands {
            Operands::ABC { b, .. } => b,
            _ => Arg::Unused,
        }
    }

    /// Field C; `Arg::Unused` outside iABC.
    pub fn c(&self) -> Arg {
        match self.operands {
            Operands::ABC { c, .. } => c,
            _ => Arg::Unused,
        }
    }

    /// Field Bx; 0 outside iABx.
    pub fn bx(&self) -> u32 {
        match self.operands {
            Operands::ABx { bx, .. } => bx,
            _ => 0,
        }
    }

    /// Field sBx; 0 outside iAsBx.
    pub fn sbx(&self) -> i32 {
        match self.operands {
            Operands::AsBx { sbx, .. } => sbx,
            _ => 0,
        }
    }

    /// Field Ax; 0 outside iAx.
    pub fn ax(&self) -> u32 {
        match self.operands {
            Operands::Ax { ax } => ax,
            _ => 0,
        }
    }
}

/// Decode one instruction word.
pub fn decode(inst: Instruction) -> Result<Decoded, DecodeError> {
    let op = inst
        .opcode()
        .ok_or(DecodeError::UnknownOpcode(inst.raw_opcode()))?;
    let mode = op.mode();
    let operands = match mode.format {
        InstructionFormat::IABC => Operands::ABC {
            a: inst.a(),
            b: Arg::from_field(inst.b(), mode.b),
            c: Arg::from_field(inst.c(), mode.c),
        },
        InstructionFormat::IABx => Operands::ABx {
            a: inst.a(),
            bx: inst.bx(),
        },
        InstructionFormat::IAsBx => Operands::AsBx {
            a: inst.a(),
            sbx: inst.sbx(),
        },
        InstructionFormat::IAx => Operands::Ax {
            ax: inst.ax_field(),
        },
    };
    Ok(Decoded { op, operands })
}
