//! Arithmetic operators and the order in which their fast paths are tried.
//!
//! Every arithmetic instruction is lowered to a chain of guarded tiers. The
//! generated code takes the first tier whose guard accepts both operands;
//! the metamethod tier always accepts and may raise a runtime error.

use seltran_bytecode::OpCode;

/// Binary and unary arithmetic operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Mod,
    Pow,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Unm,
    BNot,
}

/// One guarded evaluation strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tier {
    /// Both operands already hold integers; wraps on overflow.
    Integer,
    /// Both operands convert to integers without loss (integral floats and
    /// numeric strings included).
    IntegerCoercible,
    /// Both operands convert to floats.
    Float,
    /// The host's generic binary-operation protocol.
    Metamethod,
}

/// What a run-time operand holds, as far as tier selection cares.
#[cfg(test)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    /// A float with an exact integer value, e.g. `3.0`.
    IntegralFloat,
    Float,
    /// A string the host converts to a number.
    NumericString { integral: bool },
    /// Anything without a numeric conversion (tables, nil, "abc").
    Other,
}

#[cfg(test)]
impl Tier {
    /// Does this tier's guard accept an operand of this kind?
    pub fn accepts(self, kind: ValueKind) -> bool {
        use ValueKind::*;
        match self {
            Tier::Integer => kind == Integer,
            Tier::IntegerCoercible => matches!(
                kind,
                Integer | IntegralFloat | NumericString { integral: true }
            ),
            Tier::Float => !matches!(kind, Other),
            Tier::Metamethod => true,
        }
    }
}

const INT_FLOAT_TM: &[Tier] = &[Tier::Integer, Tier::Float, Tier::Metamethod];
const FLOAT_TM: &[Tier] = &[Tier::Float, Tier::Metamethod];
const BITWISE_TM: &[Tier] = &[Tier::IntegerCoercible, Tier::Metamethod];

impl ArithOp {
    /// The operator of an arithmetic opcode, `None` for everything else.
    pub fn from_opcode(op: OpCode) -> Option<ArithOp> {
        Some(match op {
            OpCode::Add => ArithOp::Add,
            OpCode::Sub => ArithOp::Sub,
            OpCode::Mul => ArithOp::Mul,
            OpCode::Mod => ArithOp::Mod,
            OpCode::Pow => ArithOp::Pow,
            OpCode::Div => ArithOp::Div,
            OpCode::IDiv => ArithOp::IDiv,
            OpCode::BAnd => ArithOp::BAnd,
            OpCode::BOr => ArithOp::BOr,
            OpCode::BXor => ArithOp::BXor,
            OpCode::Shl => ArithOp::Shl,
            OpCode::Shr => ArithOp::Shr,
            OpCode::Unm => ArithOp::Unm,
            OpCode::BNot => ArithOp::BNot,
            _ => return None,
        })
    }

    pub fn is_unary(self) -> bool {
        matches!(self, ArithOp::Unm | ArithOp::BNot)
    }

    /// Fast paths in evaluation order, ending with the metamethod fallback.
    pub fn tiers(self) -> &'static [Tier] {
        use ArithOp::*;
        match self {
            Add | Sub | Mul | Mod | IDiv | Unm => INT_FLOAT_TM,
            Pow | Div => FLOAT_TM,
            BAnd | BOr | BXor | Shl | Shr | BNot => BITWISE_TM,
        }
    }

    /// The tier the generated code takes for these operand kinds.
    /// For unary operators pass the operand twice.
    #[cfg(test)]
    pub fn select(self, lhs: ValueKind, rhs: ValueKind) -> Tier {
        self.tiers()
            .iter()
            .copied()
            .find(|tier| tier.accepts(lhs) && tier.accepts(rhs))
            .unwrap_or(Tier::Metamethod)
    }

    /// Host tag-method event name.
    pub fn event(self) -> &'static str {
        use ArithOp::*;
        match self {
            Add => "TM_ADD",
            Sub => "TM_SUB",
            Mul => "TM_MUL",
            Mod => "TM_MOD",
            Pow => "TM_POW",
            Div => "TM_DIV",
            IDiv => "TM_IDIV",
            BAnd => "TM_BAND",
            BOr => "TM_BOR",
            BXor => "TM_BXOR",
            Shl => "TM_SHL",
            Shr => "TM_SHR",
            Unm => "TM_UNM",
            BNot => "TM_BNOT",
        }
    }
}
