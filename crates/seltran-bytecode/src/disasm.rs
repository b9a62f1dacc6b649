/// Bytecode disassembler (luac -l style output).
use crate::opcode::{is_constant, ArgMode, Instruction, InstructionFormat, OpCode, BITRK};
use crate::proto::{Capture, Constant, Proto};
use std::fmt::{self, Write};

/// Disassemble a complete Proto tree into a human-readable string.
pub fn listing(proto: &Proto) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = listing_proto(&mut out, proto, 0);
    out
}

/// One-line description of the instruction at `pc`: line, opcode, operands
/// and a note resolving constants, upvalue names and jump targets.
///
/// Jump targets are 0-based pcs.
pub fn describe(proto: &Proto, pc: usize) -> String {
    let mut out = String::new();
    let _ = describe_into(&mut out, proto, pc);
    out
}

fn listing_proto(out: &mut String, proto: &Proto, level: usize) -> fmt::Result {
    let indent = "  ".repeat(level);

    // Header
    let vararg = if proto.is_vararg { "+" } else { "" };
    writeln!(
        out,
        "{indent}{} <{}:{},{}> ({} instructions)",
        proto.kind().name(),
        proto.source_name(),
        proto.linedefined,
        proto.lastlinedefined,
        proto.code.len(),
    )?;
    writeln!(
        out,
        "{indent}{}{vararg} params, {} slots, {} upvalues, {} locals, {} constants, {} functions",
        proto.num_params,
        proto.max_stack_size,
        proto.upvalues.len(),
        proto.local_vars.len(),
        proto.constants.len(),
        proto.protos.len(),
    )?;

    // Instructions
    for pc in 0..proto.code.len() {
        writeln!(out, "{indent}\t{pc}\t{}", describe(proto, pc))?;
    }

    // Constants
    if !proto.constants.is_empty() {
        writeln!(out, "{indent}constants ({}):", proto.constants.len())?;
        for (i, k) in proto.constants.iter().enumerate() {
            write!(out, "{indent}\t{i}\t")?;
            write_constant(out, k)?;
            writeln!(out)?;
        }
    }

    // Locals
    if !proto.local_vars.is_empty() {
        writeln!(out, "{indent}locals ({}):", proto.local_vars.len())?;
        for (i, lv) in proto.local_vars.iter().enumerate() {
            writeln!(
                out,
                "{indent}\t{i}\t{}\t{}\t{}",
                String::from_utf8_lossy(&lv.name),
                lv.start_pc,
                lv.end_pc
            )?;
        }
    }

    // Upvalues
    if !proto.upvalues.is_empty() {
        writeln!(out, "{indent}upvalues ({}):", proto.upvalues.len())?;
        for (i, up) in proto.upvalues.iter().enumerate() {
            let (in_stack, index) = match up.capture {
                Capture::Local(r) => (1, r),
                Capture::Upvalue(u) => (0, u),
            };
            writeln!(
                out,
                "{indent}\t{i}\t{}\t{in_stack}\t{index}",
                upvalue_name(proto, i)
            )?;
        }
    }

    // Nested protos
    for (i, p) in proto.protos.iter().enumerate() {
        writeln!(out, "{indent}function [{i}]:")?;
        listing_proto(out, p, level + 1)?;
    }
    Ok(())
}

fn describe_into(out: &mut String, proto: &Proto, pc: usize) -> fmt::Result {
    let Some(&inst) = proto.code.get(pc) else {
        return write!(out, "[-]\t<pc {pc} out of range>");
    };

    let line = proto.line(pc);
    if line > 0 {
        write!(out, "[{line}]\t")?;
    } else {
        write!(out, "[-]\t")?;
    }

    let Some(op) = inst.opcode() else {
        return write!(out, "<opcode {}>", inst.raw_opcode());
    };
    write!(out, "{:<9}\t", op.name())?;
    write_operands(out, op, inst)?;
    write_note(out, proto, op, inst, pc)
}

/// Operands as luac prints them: constants as `-1 - index`.
fn write_operands(out: &mut String, op: OpCode, inst: Instruction) -> fmt::Result {
    let mode = op.mode();
    let rk = |field: u16| -> i64 {
        if is_constant(field) {
            -1 - (field as u32 & !BITRK) as i64
        } else {
            field as i64
        }
    };
    match mode.format {
        InstructionFormat::IABC => {
            write!(out, "{}", inst.a())?;
            if mode.b != ArgMode::Unused {
                write!(out, " {}", rk(inst.b()))?;
            }
            if mode.c != ArgMode::Unused {
                write!(out, " {}", rk(inst.c()))?;
            }
        }
        InstructionFormat::IABx => {
            write!(out, "{}", inst.a())?;
            match mode.b {
                ArgMode::RegisterOrConstant => write!(out, " {}", -1 - inst.bx() as i64)?,
                ArgMode::Value => write!(out, " {}", inst.bx())?,
                _ => {}
            }
        }
        InstructionFormat::IAsBx => write!(out, "{} {}", inst.a(), inst.sbx())?,
        InstructionFormat::IAx => write!(out, "{}", -1 - inst.ax_field() as i64)?,
    }
    Ok(())
}

fn write_note(
    out: &mut String,
    proto: &Proto,
    op: OpCode,
    inst: Instruction,
    pc: usize,
) -> fmt::Result {
    use OpCode::*;
    let constant = |out: &mut String, field: u16| -> fmt::Result {
        let index = (field as u32 & !BITRK) as usize;
        write_constant_at(out, proto, index)
    };
    match op {
        LoadK => {
            write!(out, "\t; ")?;
            write_constant_at(out, proto, inst.bx() as usize)?;
        }
        GetUpval | SetUpval => {
            write!(out, "\t; {}", upvalue_name(proto, inst.b() as usize))?;
        }
        GetTabUp => {
            write!(out, "\t; {}", upvalue_name(proto, inst.b() as usize))?;
            if is_constant(inst.c()) {
                write!(out, " ")?;
                constant(out, inst.c())?;
            }
        }
        SetTabUp => {
            write!(out, "\t; {}", upvalue_name(proto, inst.a() as usize))?;
            for field in [inst.b(), inst.c()] {
                if is_constant(field) {
                    write!(out, " ")?;
                    constant(out, field)?;
                }
            }
        }
        GetTable | Self_ => {
            if is_constant(inst.c()) {
                write!(out, "\t; ")?;
                constant(out, inst.c())?;
            }
        }
        SetTable | Add | Sub | Mul | Mod | Pow | Div | IDiv | BAnd | BOr | BXor | Shl | Shr
        | Eq | Lt | Le => {
            if is_constant(inst.b()) || is_constant(inst.c()) {
                write!(out, "\t; ")?;
                if is_constant(inst.b()) {
                    constant(out, inst.b())?;
                } else {
                    write!(out, "-")?;
                }
                write!(out, " ")?;
                if is_constant(inst.c()) {
                    constant(out, inst.c())?;
                } else {
                    write!(out, "-")?;
                }
            }
        }
        Jmp | ForLoop | ForPrep | TForLoop => {
            write!(out, "\t; to {}", pc as i64 + 1 + inst.sbx() as i64)?;
        }
        Closure => write!(out, "\t; function [{}]", inst.bx())?,
        SetList => {
            if inst.c() == 0 {
                match proto.code.get(pc + 1) {
                    Some(next) => write!(out, "\t; {}", next.ax_field())?,
                    None => write!(out, "\t; ?")?,
                }
            } else {
                write!(out, "\t; {}", inst.c())?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn upvalue_name(proto: &Proto, index: usize) -> String {
    proto
        .upvalues
        .get(index)
        .and_then(|uv| uv.name.as_deref())
        .map(|n| String::from_utf8_lossy(n).into_owned())
        .unwrap_or_else(|| "-".to_string())
}

fn write_constant_at(out: &mut String, proto: &Proto, index: usize) -> fmt::Result {
    match proto.constants.get(index) {
        Some(k) => write_constant(out, k),
        None => write!(out, "<constant {index}?>"),
    }
}

fn write_constant(out: &mut String, k: &Constant) -> fmt::Result {
    match k {
        Constant::Nil => write!(out, "nil"),
        Constant::Boolean(b) => write!(out, "{b}"),
        Constant::Integer(i) => write!(out, "{i}"),
        Constant::Float(f) => write!(out, "{}", crate::number::format_float(*f)),
        Constant::String(bytes) => write_quoted(out, bytes),
    }
}

/// Quote a Lua string with C escapes so it is safe inside a comment line.
fn write_quoted(out: &mut String, bytes: &[u8]) -> fmt::Result {
    out.push('"');
    for &c in bytes {
        match c {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x07 => out.push_str("\\a"),
            0x08 => out.push_str("\\b"),
            0x0c => out.push_str("\\f"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x0b => out.push_str("\\v"),
            c if c == b' ' || c.is_ascii_graphic() => out.push(c as char),
            c => write!(out, "\\{c:03}")?,
        }
    }
    out.push('"');
    Ok(())
}
