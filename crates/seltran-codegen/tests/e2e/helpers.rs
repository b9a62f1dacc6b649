use seltran_bytecode::opcode::rk_constant;
use seltran_bytecode::proto::{Capture, UpvalDesc};
use seltran_bytecode::{Constant, Instruction, OpCode, Proto};
use seltran_codegen::{emit_module, EmitOptions, GeneratedModule, ModuleName};

pub use OpCode::*;

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

fn with_code(mut p: Proto, code: &[Instruction], first_line: u32) -> Proto {
    for (i, inst) in code.iter().enumerate() {
        p.emit(*inst, first_line + i as u32);
    }
    p
}

/// A main chunk with an `_ENV` upvalue.
pub fn chunk(code: &[Instruction], constants: &[Constant]) -> Proto {
    let mut p = Proto::new();
    p.source = Some(b"@test.lua".to_vec());
    p.is_vararg = true;
    p.upvalues.push(UpvalDesc {
        name: Some(b"_ENV".to_vec()),
        capture: Capture::Local(0),
    });
    p.constants.extend_from_slice(constants);
    with_code(p, code, 1)
}

/// A nested function defined at `line` that returns nothing.
pub fn function(line: u32, children: Vec<Proto>) -> Proto {
    let mut p = Proto::new();
    p.linedefined = line;
    p.lastlinedefined = line + 1;
    p.protos = children;
    let closures: Vec<Instruction> = (0..p.protos.len() as u32)
        .map(|i| abx(Closure, 0, i))
        .collect();
    let mut code = closures;
    code.push(abc(Return, 0, 1, 0));
    with_code(p, &code, line)
}

/// `return 1+2` as luac 5.3 compiles it.
pub fn return_sum() -> Proto {
    chunk(
        &[abx(LoadK, 0, 0), abc(Return, 0, 2, 0), abc(Return, 0, 1, 0)],
        &[Constant::Integer(3)],
    )
}

/// Main chunk whose children form the tree
/// `main(f1(f2, f3), f4(f5))`, each defined on a distinct line.
pub fn nested_tree() -> Proto {
    let f1 = function(10, vec![function(11, vec![]), function(12, vec![])]);
    let f4 = function(20, vec![function(21, vec![])]);
    let mut main = chunk(
        &[
            abx(Closure, 0, 0),
            abx(Closure, 1, 1),
            abc(Return, 0, 1, 0),
        ],
        &[],
    );
    main.protos = vec![f1, f4];
    main
}

pub fn module_name(name: &str) -> ModuleName {
    ModuleName::new(name).unwrap_or_else(|e| panic!("bad module name: {e}"))
}

pub fn emit(p: &Proto, source: &[u8]) -> GeneratedModule {
    emit_module(p, source, &module_name("test"), &EmitOptions::default())
        .unwrap_or_else(|e| panic!("emission failed: {e}"))
}
