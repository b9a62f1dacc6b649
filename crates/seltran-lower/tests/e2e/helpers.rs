use seltran_bytecode::opcode::rk_constant;
use seltran_bytecode::proto::{Capture, UpvalDesc};
use seltran_bytecode::{Constant, Instruction, OpCode, Proto};
use seltran_lower::{lower, LoweredFunction, Stmt};

pub use OpCode::*;

/// Build a main-chunk prototype with an `_ENV` upvalue.
pub fn chunk(code: &[Instruction], constants: &[Constant]) -> Proto {
    let mut p = Proto::new();
    p.source = Some(b"@test.lua".to_vec());
    p.is_vararg = true;
    p.upvalues.push(UpvalDesc {
        name: Some(b"_ENV".to_vec()),
        capture: Capture::Local(0),
    });
    for (i, inst) in code.iter().enumerate() {
        p.emit(*inst, i as u32 + 1);
    }
    p.constants.extend_from_slice(constants);
    p
}

pub fn abc(op: OpCode, a: u8, b: u16, c: u16) -> Instruction {
    Instruction::abc(op, a, b, c)
}

pub fn abx(op: OpCode, a: u8, bx: u32) -> Instruction {
    Instruction::abx(op, a, bx)
}

pub fn asbx(op: OpCode, a: u8, sbx: i32) -> Instruction {
    Instruction::asbx(op, a, sbx)
}

pub fn k(index: u32) -> u16 {
    rk_constant(index)
}

pub fn str_k(s: &str) -> Constant {
    Constant::String(s.as_bytes().to_vec())
}

/// Lower, panicking with the error on failure.
pub fn lower_ok(p: &Proto) -> LoweredFunction {
    lower(p).unwrap_or_else(|e| panic!("lowering failed: {e}"))
}

/// Statements of the block at `pc` after the fetch/hook prologue.
pub fn body(f: &LoweredFunction, pc: usize) -> &[Stmt] {
    let block = f
        .block_at(pc)
        .unwrap_or_else(|| panic!("no block at pc {pc}"));
    let skip = block
        .stmts
        .iter()
        .position(|s| !matches!(s, Stmt::Fetch | Stmt::HookCheck | Stmt::RefreshBase | Stmt::ConsumeExtraArg))
        .unwrap_or(block.stmts.len());
    &block.stmts[skip..]
}

/// A prototype touching every opcode, as a stress input for invariant checks.
pub fn every_opcode() -> Proto {
    let code = [
        abx(LoadK, 0, 0),                 // 0
        abx(LoadKX, 1, 0),                // 1
        Instruction::ax(ExtraArg, 1),     // 2
        abc(LoadBool, 2, 1, 1),           // 3 -> 5
        abc(LoadBool, 2, 0, 0),           // 4
        abc(LoadNil, 3, 2, 0),            // 5
        abc(GetUpval, 4, 0, 0),           // 6
        abc(GetTabUp, 5, 0, k(2)),        // 7
        abc(GetTable, 6, 5, 0),           // 8
        abc(SetTabUp, 0, k(2), 6),        // 9
        abc(SetUpval, 6, 0, 0),           // 10
        abc(SetTable, 5, k(0), k(1)),     // 11
        abc(NewTable, 7, 2, 1),           // 12
        abc(Self_, 8, 7, k(2)),           // 13
        abc(Add, 9, 0, k(0)),             // 14
        abc(Sub, 9, 9, 0),                // 15
        abc(Mul, 9, 9, 0),                // 16
        abc(Mod, 9, 9, 0),                // 17
        abc(Pow, 9, 9, 0),                // 18
        abc(Div, 9, 9, 0),                // 19
        abc(IDiv, 9, 9, 0),               // 20
        abc(BAnd, 9, 9, 0),               // 21
        abc(BOr, 9, 9, 0),                // 22
        abc(BXor, 9, 9, 0),               // 23
        abc(Shl, 9, 9, 0),                // 24
        abc(Shr, 9, 9, 0),                // 25
        abc(Unm, 9, 9, 0),                // 26
        abc(BNot, 9, 9, 0),               // 27
        abc(Not, 10, 9, 0),               // 28
        abc(Len, 10, 7, 0),               // 29
        abc(Concat, 10, 0, 1),            // 30
        abc(Eq, 1, 0, k(0)),              // 31
        asbx(Jmp, 0, 1),                  // 32 -> 34
        abc(Lt, 0, 0, 1),                 // 33
        asbx(Jmp, 0, 0),                  // 34
        abc(Le, 1, k(0), 0),              // 35
        asbx(Jmp, 0, 0),                  // 36
        abc(Test, 0, 0, 1),               // 37
        asbx(Jmp, 0, 0),                  // 38
        abc(TestSet, 1, 0, 0),            // 39
        asbx(Jmp, 0, 0),                  // 40
        abc(Call, 5, 1, 2),               // 41
        abx(LoadK, 11, 0),                // 42
        abx(LoadK, 12, 1),                // 43
        abx(LoadK, 13, 0),                // 44
        asbx(ForPrep, 11, 0),             // 45 -> 46
        asbx(ForLoop, 11, -1),            // 46 -> 46
        asbx(Jmp, 0, 1),                  // 47 -> 49
        abc(TForCall, 5, 0, 2),           // 48
        asbx(TForLoop, 7, -2),            // 49 -> 48
        abc(VarArg, 8, 0, 0),             // 50
        abc(SetList, 7, 0, 0),            // 51
        Instruction::ax(ExtraArg, 3),     // 52
        abx(Closure, 9, 0),               // 53
        abc(TailCall, 5, 2, 0),           // 54
        abc(Return, 5, 0, 0),             // 55
        abc(Return, 0, 1, 0),             // 56
    ];
    let mut p = chunk(
        &code,
        &[Constant::Integer(1), Constant::Integer(10), str_k("x")],
    );
    p.max_stack_size = 20;
    p.protos.push(Proto::new());
    p
}
