//! Statement IR: what one lowered instruction does, independent of how it is
//! written out.
//!
//! Registers are frame-relative slot numbers. Every statement that can run
//! user code, reallocate the stack or collect garbage is a safepoint and is
//! always followed by [`Stmt::RefreshBase`] in a lowered block.

use crate::arith::ArithOp;

/// A frame-relative register.
pub type Reg = u16;

/// A constant-or-register operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Reg(Reg),
    Const(u32),
}

/// Something that holds a table: a register or an upvalue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Place {
    Reg(Reg),
    Upval(u16),
}

/// Comparison operators; all dispatch through the host with metamethods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Le,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    /// Advance the saved instruction pointer past the head word.
    Fetch,
    /// Advance the saved instruction pointer past a fused extra-argument word.
    ConsumeExtraArg,
    /// Run the line/count debug hook if one is active.
    HookCheck,
    /// Re-read the frame base after a safepoint.
    RefreshBase,
    /// Reset the stack top to the frame's ceiling.
    RestoreTop,

    Move { dst: Reg, src: Reg },
    LoadConst { dst: Reg, index: u32 },
    LoadBool { dst: Reg, value: bool },
    /// Set `dst ..= dst + extra` to nil.
    LoadNil { dst: Reg, extra: u16 },
    GetUpval { dst: Reg, upval: u16 },
    SetUpval { src: Reg, upval: u16 },
    GetTable { dst: Reg, table: Place, key: Operand },
    SetTable { table: Place, key: Operand, value: Operand },
    /// Allocate a table with decoded size hints.
    NewTable { dst: Reg, array: u32, hash: u32 },
    /// `dst + 1 = object; dst = object[key]`
    SelfLookup { dst: Reg, object: Reg, key: Operand },
    Arith { op: ArithOp, dst: Reg, lhs: Operand, rhs: Operand },
    Unary { op: ArithOp, dst: Reg, src: Reg },
    Not { dst: Reg, src: Reg },
    Len { dst: Reg, src: Reg },
    /// Concatenate `first ..= last` in place; the result lands in `first`.
    Concat { first: Reg, last: Reg },
    /// Close upvalues at or above `from`.
    CloseUpvals { from: Reg },
    /// `None` counts mean "up to the stack top" / "all results".
    Call { func: Reg, args: Option<u16>, results: Option<u16> },
    Return { first: Reg, count: Option<u16>, close_upvalues: bool },
    ForPrep { base: Reg },
    /// Step a numeric loop and record whether it continues.
    ForStep { base: Reg },
    /// Call the generic-for iterator at `base` with its state and control.
    IterCall { base: Reg, results: u16 },
    /// Store a batch of list items into the table at `table`.
    SetList { table: Reg, count: Option<u16>, batch: u32 },
    /// Create (or reuse a cached) closure of child prototype `index`.
    Closure { dst: Reg, index: u32 },
    VarArg { dst: Reg, wanted: Option<u16>, num_params: u8 },
    /// Compare and record the outcome for the block's branch.
    Compare { op: CompareOp, lhs: Operand, rhs: Operand },
    /// Give the collector a chance to run; live values end below `limit`.
    CheckGc { limit: Reg },
}

impl Stmt {
    /// Can this statement run user code, move the stack or collect garbage?
    pub fn is_safepoint(&self) -> bool {
        matches!(
            self,
            Stmt::HookCheck
                | Stmt::GetTable { .. }
                | Stmt::SetTable { .. }
                | Stmt::NewTable { .. }
                | Stmt::SelfLookup { .. }
                | Stmt::Arith { .. }
                | Stmt::Unary { .. }
                | Stmt::Len { .. }
                | Stmt::Concat { .. }
                | Stmt::Call { .. }
                | Stmt::IterCall { .. }
                | Stmt::SetList { .. }
                | Stmt::Closure { .. }
                | Stmt::VarArg { .. }
                | Stmt::Compare { .. }
                | Stmt::CheckGc { .. }
        )
    }
}

/// The condition under which a branch is taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    /// The preceding comparison's outcome differs from `expected`.
    CompareDiffers { expected: bool },
    /// The register holds `nil` or `false`.
    Falsy(Reg),
    /// The register holds anything but `nil` or `false`.
    Truthy(Reg),
    /// The preceding loop step decided to continue.
    LoopContinues,
    NotNil(Reg),
}

/// How control leaves a block.
#[derive(Clone, Debug, PartialEq)]
pub enum Exit {
    /// Fall through to the next block.
    Next,
    Goto { target: usize },
    /// Jump to `target` when `cond` holds (after `on_taken`), otherwise run
    /// `otherwise` and fall through.
    Branch {
        cond: Cond,
        target: usize,
        on_taken: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    /// The block's statements return from the function.
    Return,
}

/// The lowering of one logical instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// Position of the (head) instruction; also the block's label.
    pub pc: usize,
    /// Instruction words consumed: 1, 2 for fused pairs, 0 for the end block.
    pub width: usize,
    pub stmts: Vec<Stmt>,
    pub exit: Exit,
}

impl Block {
    /// Position control falls through to.
    pub fn next_pc(&self) -> usize {
        self.pc + self.width
    }

    /// Successor positions; fallthrough first.
    pub fn successors(&self) -> Vec<usize> {
        match &self.exit {
            Exit::Next => vec![self.next_pc()],
            Exit::Goto { target } => vec![*target],
            Exit::Branch { target, .. } => vec![self.next_pc(), *target],
            Exit::Return => Vec::new(),
        }
    }

    /// Saved-pointer adjustment needed when jumping to `target`.
    pub fn pc_delta(&self, target: usize) -> i64 {
        target as i64 - self.next_pc() as i64
    }

    /// Is this the synthetic block for falling off the end of the code?
    pub fn is_end(&self) -> bool {
        self.width == 0
    }
}

/// A prototype's lowered body.
#[derive(Clone, Debug, PartialEq)]
pub struct LoweredFunction {
    /// Blocks in instruction order, then the end block if anything reaches it.
    pub blocks: Vec<Block>,
    pub code_len: usize,
}

impl LoweredFunction {
    pub fn block_at(&self, pc: usize) -> Option<&Block> {
        self.blocks.iter().find(|b| b.pc == pc)
    }

    /// Does any path fall off the end of the code?
    pub fn has_end_block(&self) -> bool {
        self.blocks.last().is_some_and(Block::is_end)
    }

    /// Does any branch go to an earlier or the same position?
    pub fn has_backward_jump(&self) -> bool {
        self.blocks.iter().any(|b| match &b.exit {
            Exit::Goto { target } | Exit::Branch { target, .. } => *target <= b.pc,
            _ => false,
        })
    }
}
