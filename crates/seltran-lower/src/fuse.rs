//! Fusion pre-pass: decode the code vector and pair each wide-operand
//! instruction with the `EXTRAARG` word that carries its operand.

use seltran_bytecode::{decode, DecodeError, Decoded, Instruction, OpCode};
use tracing::trace;

use crate::error::LowerError;

/// One position of the code vector after fusion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Word {
    Single(Decoded),
    /// A head instruction together with the `Ax` of the word after it.
    Fused { head: Decoded, extra: u32 },
    /// The extra-argument word of the fused instruction just before it.
    Absorbed,
}

impl Word {
    pub fn is_absorbed(&self) -> bool {
        matches!(self, Word::Absorbed)
    }
}

/// Does this instruction take its real operand from a following `EXTRAARG`?
fn wants_extra_arg(d: &Decoded) -> bool {
    match d.op {
        OpCode::LoadKX => true,
        OpCode::SetList => d.c().raw() == 0,
        _ => false,
    }
}

/// Decode and fuse a whole code vector. The result has one entry per word.
pub fn fuse(code: &[Instruction]) -> Result<Vec<Word>, LowerError> {
    let mut words = Vec::with_capacity(code.len());
    let mut pc = 0;
    while pc < code.len() {
        let head = decode_at(code, pc)?;
        if !wants_extra_arg(&head) {
            words.push(Word::Single(head));
            pc += 1;
            continue;
        }

        let extra = match code.get(pc + 1).map(|_| decode_at(code, pc + 1)) {
            Some(Ok(next)) if next.op == OpCode::ExtraArg => next.ax(),
            Some(Err(e)) => return Err(e),
            _ => return Err(LowerError::missing_pair(head.op, pc, "EXTRAARG")),
        };
        trace!(pc, op = head.op.name(), extra, "fused extra argument");
        words.push(Word::Fused { head, extra });
        words.push(Word::Absorbed);
        pc += 2;
    }
    Ok(words)
}

fn decode_at(code: &[Instruction], pc: usize) -> Result<Decoded, LowerError> {
    decode(code[pc]).map_err(|e| match e {
        DecodeError::UnknownOpcode(opcode) => LowerError::UnknownOpcode { opcode, pc },
    })
}
