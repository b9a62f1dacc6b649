//! Per-opcode lowering rules.
//!
//! Each logical instruction becomes one [`Block`]: fetch, debug-hook check,
//! the opcode's statements, and an exit. Conditional opcodes share a single
//! shape: fall through to `pc + 1` or skip to `pc + 2`.

use seltran_bytecode::opcode::fb2int;
use seltran_bytecode::{Arg, Decoded, OpCode, Proto};
use tracing::debug;

use crate::arith::ArithOp;
use crate::error::LowerError;
use crate::fuse::{fuse, Word};
use crate::ir::{Block, CompareOp, Cond, Exit, LoweredFunction, Operand, Place, Reg, Stmt};

/// Lower every instruction of one prototype.
pub fn lower(proto: &Proto) -> Result<LoweredFunction, LowerError> {
    let words = fuse(&proto.code)?;
    let lowerer = Lowerer {
        proto,
        words: &words,
        code_len: proto.code.len(),
        close_upvalues: !proto.protos.is_empty(),
    };

    let mut blocks = Vec::with_capacity(words.len());
    for (pc, word) in words.iter().enumerate() {
        let (head, extra) = match *word {
            Word::Single(head) => (head, None),
            Word::Fused { head, extra } => (head, Some(extra)),
            Word::Absorbed => continue,
        };
        blocks.push(lowerer.lower_word(pc, head, extra)?);
    }

    let mut reaches_end = false;
    for block in &blocks {
        for target in block.successors() {
            if target == lowerer.code_len {
                reaches_end = true;
            } else if words[target].is_absorbed() {
                return Err(LowerError::TargetInAbsorbedWord {
                    op: lowerer.op_name(block.pc),
                    pc: block.pc,
                    head: target - 1,
                });
            }
        }
    }
    if reaches_end {
        blocks.push(lowerer.end_block());
    }

    debug!(
        instructions = lowerer.code_len,
        blocks = blocks.len(),
        end_block = reaches_end,
        "lowered prototype"
    );
    Ok(LoweredFunction {
        blocks,
        code_len: lowerer.code_len,
    })
}

struct Lowerer<'a> {
    proto: &'a Proto,
    words: &'a [Word],
    code_len: usize,
    /// Returns must close upvalues when child closures may capture registers.
    close_upvalues: bool,
}

/// Statements of the block under construction.
struct BlockBuilder {
    pc: usize,
    width: usize,
    stmts: Vec<Stmt>,
}

impl BlockBuilder {
    fn new(pc: usize, width: usize) -> Self {
        let mut stmts = vec![Stmt::Fetch, Stmt::HookCheck, Stmt::RefreshBase];
        if width == 2 {
            stmts.push(Stmt::ConsumeExtraArg);
        }
        BlockBuilder { pc, width, stmts }
    }

    fn push(&mut self, stmt: Stmt) {
        self.stmts.push(stmt);
    }

    /// Push a safepoint statement and re-derive the frame base after it.
    fn protect(&mut self, stmt: Stmt) {
        debug_assert!(stmt.is_safepoint());
        self.stmts.push(stmt);
        self.stmts.push(Stmt::RefreshBase);
    }

    fn finish(self, exit: Exit) -> Block {
        Block {
            pc: self.pc,
            width: self.width,
            stmts: self.stmts,
            exit,
        }
    }
}

fn reg(arg: Arg) -> Reg {
    arg.raw() as Reg
}


/// Decode a count field where 0 means "variable, up to the stack top".
fn count(field: Arg) -> Option<u16> {
    match field.raw() {
        0 => None,
        n => Some(n as u16 - 1),
    }
}

impl Lowerer<'_> {
    fn op_name(&self, pc: usize) -> &'static str {
        match self.words.get(pc) {
            Some(Word::Single(d)) | Some(Word::Fused { head: d, .. }) => d.op.name(),
            _ => "?",
        }
    }

    /// Resolve a jump destination, which may be one past the last instruction.
    fn target(&self, op: OpCode, pc: usize, to: i64) -> Result<usize, LowerError> {
        if (0..=self.code_len as i64).contains(&to) {
            Ok(to as usize)
        } else {
            Err(LowerError::TargetOutOfRange {
                op: op.name(),
                pc,
                target: to,
                len: self.code_len,
            })
        }
    }

    fn skip_next(&self, op: OpCode, pc: usize) -> Result<usize, LowerError> {
        self.target(op, pc, pc as i64 + 2)
    }

    fn relative(&self, d: &Decoded, pc: usize) -> Result<usize, LowerError> {
        self.target(d.op, pc, pc as i64 + 1 + d.sbx() as i64)
    }

    fn constant(&self, op: OpCode, pc: usize, index: u32) -> Result<u32, LowerError> {
        let len = self.proto.constants.len();
        if (index as usize) < len {
            Ok(index)
        } else {
            Err(LowerError::ConstantOutOfRange {
                op: op.name(),
                pc,
                index,
                len,
            })
        }
    }

    fn rk(&self, d: &Decoded, pc: usize, arg: Arg) -> Result<Operand, LowerError> {
        Ok(match arg {
            Arg::Constant(k) => Operand::Const(self.constant(d.op, pc, k)?),
            other => Operand::Reg(other.raw() as Reg),
        })
    }

    fn size_hint(&self, pc: usize, arg: Arg) -> Result<u32, LowerError> {
        let hint = arg.raw() as u16;
        fb2int(hint).ok_or(LowerError::SizeHintOutOfRange { pc, hint })
    }

    fn single_at(&self, pc: usize) -> Option<&Decoded> {
        match self.words.get(pc) {
            Some(Word::Single(d)) => Some(d),
            _ => None,
        }
    }

    fn end_block(&self) -> Block {
        Block {
            pc: self.code_len,
            width: 0,
            stmts: vec![Stmt::Return {
                first: 0,
                count: Some(0),
                close_upvalues: self.close_upvalues,
            }],
            exit: Exit::Return,
        }
    }

    fn lower_word(&self, pc: usize, d: Decoded, extra: Option<u32>) -> Result<Block, LowerError> {
        use OpCode::*;

        let width = if extra.is_some() { 2 } else { 1 };
        let mut b = BlockBuilder::new(pc, width);
        let a = d.a() as Reg;

        let exit = match d.op {
            Move => {
                b.push(Stmt::Move { dst: a, src: reg(d.b()) });
                Exit::Next
            }
            LoadK => {
                let index = self.constant(d.op, pc, d.bx())?;
                b.push(Stmt::LoadConst { dst: a, index });
                Exit::Next
            }
            LoadKX => {
                let index = self.constant(d.op, pc, extra.unwrap_or_default())?;
                b.push(Stmt::LoadConst { dst: a, index });
                Exit::Next
            }
            LoadBool => {
                b.push(Stmt::LoadBool {
                    dst: a,
                    value: d.b().raw() != 0,
                });
                if d.c().raw() != 0 {
                    Exit::Goto {
                        target: self.skip_next(d.op, pc)?,
                    }
                } else {
                    Exit::Next
                }
            }
            LoadNil => {
                b.push(Stmt::LoadNil {
                    dst: a,
                    extra: d.b().raw() as u16,
                });
                Exit::Next
            }
            GetUpval => {
                b.push(Stmt::GetUpval {
                    dst: a,
                    upval: d.b().raw() as u16,
                });
                Exit::Next
            }
            GetTabUp => {
                b.protect(Stmt::GetTable {
                    dst: a,
                    table: Place::Upval(d.b().raw() as u16),
                    key: self.rk(&d, pc, d.c())?,
                });
                Exit::Next
            }
            GetTable => {
                b.protect(Stmt::GetTable {
                    dst: a,
                    table: Place::Reg(reg(d.b())),
                    key: self.rk(&d, pc, d.c())?,
                });
                Exit::Next
            }
            SetTabUp => {
                b.protect(Stmt::SetTable {
                    table: Place::Upval(a),
                    key: self.rk(&d, pc, d.b())?,
                    value: self.rk(&d, pc, d.c())?,
                });
                Exit::Next
            }
            SetUpval => {
                b.push(Stmt::SetUpval {
                    src: a,
                    upval: d.b().raw() as u16,
                });
                Exit::Next
            }
            SetTable => {
                b.protect(Stmt::SetTable {
                    table: Place::Reg(a),
                    key: self.rk(&d, pc, d.b())?,
                    value: self.rk(&d, pc, d.c())?,
                });
                Exit::Next
            }
            NewTable => {
                b.protect(Stmt::NewTable {
                    dst: a,
                    array: self.size_hint(pc, d.b())?,
                    hash: self.size_hint(pc, d.c())?,
                });
                b.protect(Stmt::CheckGc { limit: a + 1 });
                Exit::Next
            }
            Self_ => {
                b.protect(Stmt::SelfLookup {
                    dst: a,
                    object: reg(d.b()),
                    key: self.rk(&d, pc, d.c())?,
                });
                Exit::Next
            }
            Add | Sub | Mul | Mod | Pow | Div | IDiv | BAnd | BOr | BXor | Shl | Shr => {
                let op = ArithOp::from_opcode(d.op).ok_or(LowerError::UnknownOpcode {
                    opcode: d.op as u8,
                    pc,
                })?;
                b.protect(Stmt::Arith {
                    op,
                    dst: a,
                    lhs: self.rk(&d, pc, d.b())?,
                    rhs: self.rk(&d, pc, d.c())?,
                });
                Exit::Next
            }
            Unm | BNot => {
                let op = if d.op == Unm { ArithOp::Unm } else { ArithOp::BNot };
                b.protect(Stmt::Unary {
                    op,
                    dst: a,
                    src: reg(d.b()),
                });
                Exit::Next
            }
            Not => {
                b.push(Stmt::Not { dst: a, src: reg(d.b()) });
                Exit::Next
            }
            Len => {
                b.protect(Stmt::Len { dst: a, src: reg(d.b()) });
                Exit::Next
            }
            Concat => {
                let (first, last) = (reg(d.b()), reg(d.c()));
                b.protect(Stmt::Concat { first, last });
                b.push(Stmt::Move { dst: a, src: first });
                let limit = if a >= first { a + 1 } else { first };
                b.protect(Stmt::CheckGc { limit });
                b.push(Stmt::RestoreTop);
                Exit::Next
            }
            Jmp => {
                if a != 0 {
                    b.push(Stmt::CloseUpvals { from: a - 1 });
                }
                Exit::Goto {
                    target: self.relative(&d, pc)?,
                }
            }
            Eq | Lt | Le => {
                let op = match d.op {
                    Eq => CompareOp::Eq,
                    Lt => CompareOp::Lt,
                    _ => CompareOp::Le,
                };
                b.protect(Stmt::Compare {
                    op,
                    lhs: self.rk(&d, pc, d.b())?,
                    rhs: self.rk(&d, pc, d.c())?,
                });
                Exit::Branch {
                    cond: Cond::CompareDiffers { expected: a != 0 },
                    target: self.skip_next(d.op, pc)?,
                    on_taken: Vec::new(),
                    otherwise: Vec::new(),
                }
            }
            Test => Exit::Branch {
                cond: truth_test(a, d.c()),
                target: self.skip_next(d.op, pc)?,
                on_taken: Vec::new(),
                otherwise: Vec::new(),
            },
            TestSet => {
                let src = reg(d.b());
                Exit::Branch {
                    cond: truth_test(src, d.c()),
                    target: self.skip_next(d.op, pc)?,
                    on_taken: Vec::new(),
                    otherwise: vec![Stmt::Move { dst: a, src }],
                }
            }
            Call => {
                b.protect(Stmt::Call {
                    func: a,
                    args: count(d.b()),
                    results: count(d.c()),
                });
                Exit::Next
            }
            TailCall => {
                // Lowered as a plain call whose results the following RETURN hands back.
                match self.single_at(pc + 1) {
                    Some(next) if next.op == Return && next.b().raw() == 0 => {}
                    _ => return Err(LowerError::missing_pair(d.op, pc, "RETURN with B=0")),
                }
                b.protect(Stmt::Call {
                    func: a,
                    args: count(d.b()),
                    results: None,
                });
                Exit::Next
            }
            Return => {
                b.push(Stmt::Return {
                    first: a,
                    count: count(d.b()),
                    close_upvalues: self.close_upvalues,
                });
                Exit::Return
            }
            ForLoop => {
                b.push(Stmt::ForStep { base: a });
                Exit::Branch {
                    cond: Cond::LoopContinues,
                    target: self.relative(&d, pc)?,
                    on_taken: Vec::new(),
                    otherwise: Vec::new(),
                }
            }
            ForPrep => {
                b.push(Stmt::ForPrep { base: a });
                Exit::Goto {
                    target: self.relative(&d, pc)?,
                }
            }
            TForCall => {
                if !self.single_at(pc + 1).is_some_and(|next| next.op == TForLoop) {
                    return Err(LowerError::missing_pair(d.op, pc, "TFORLOOP"));
                }
                b.protect(Stmt::IterCall {
                    base: a,
                    results: d.c().raw() as u16,
                });
                b.push(Stmt::RestoreTop);
                Exit::Next
            }
            TForLoop => Exit::Branch {
                cond: Cond::NotNil(a + 1),
                target: self.relative(&d, pc)?,
                on_taken: vec![Stmt::Move { dst: a, src: a + 1 }],
                otherwise: Vec::new(),
            },
            SetList => {
                let count = match d.b().raw() {
                    0 => None,
                    n => Some(n as u16),
                };
                let batch = extra.unwrap_or(d.c().raw());
                b.protect(Stmt::SetList {
                    table: a,
                    count,
                    batch,
                });
                b.push(Stmt::RestoreTop);
                Exit::Next
            }
            Closure => {
                let (index, len) = (d.bx(), self.proto.protos.len());
                if index as usize >= len {
                    return Err(LowerError::ProtoOutOfRange {
                        op: d.op.name(),
                        pc,
                        index,
                        len,
                    });
                }
                b.protect(Stmt::Closure { dst: a, index });
                b.protect(Stmt::CheckGc { limit: a + 1 });
                Exit::Next
            }
            VarArg => {
                b.protect(Stmt::VarArg {
                    dst: a,
                    wanted: count(d.b()),
                    num_params: self.proto.num_params,
                });
                Exit::Next
            }
            // Only reachable for an EXTRAARG no instruction claimed.
            ExtraArg => Exit::Next,
        };
        Ok(b.finish(exit))
    }
}

/// TEST/TESTSET skip the next instruction when the value's truth differs from C.
fn truth_test(reg: Reg, c: Arg) -> Cond {
    if c.raw() != 0 {
        Cond::Falsy(reg)
    } else {
        Cond::Truthy(reg)
    }
}
