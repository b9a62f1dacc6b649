//! Seltran lowering engine.
//!
//! Turns each prototype's bytecode into labeled blocks of [`ir::Stmt`]s:
//! fused two-word instructions become one block, every jump target is
//! resolved and range checked, and safepoints carry an explicit base refresh.

pub mod arith;
pub mod error;
pub mod fuse;
pub mod ir;
pub mod lower;

pub use arith::{ArithOp, Tier};
pub use error::LowerError;
pub use ir::{Block, Cond, Exit, LoweredFunction, Operand, Place, Reg, Stmt};
pub use lower::lower;
