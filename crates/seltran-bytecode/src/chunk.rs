//! Lua 5.3 precompiled chunk serialization (dump) and deserialization (undump).
//!
//! Format follows PUC Lua 5.3 `ldump.c`/`lundump.c` for a 64-bit little-endian
//! host, so chunks written by `luac5.3` load here and chunks dumped here load
//! in the host interpreter.

use crate::error::ChunkError;
use crate::opcode::Instruction;
use crate::proto::{Capture, Constant, LocalVar, Proto, UpvalDesc};

// Lua 5.3 binary header constants
pub const LUA_SIGNATURE: &[u8; 4] = b"\x1bLua";
const LUAC_VERSION: u8 = 0x53;
const LUAC_FORMAT: u8 = 0;
const LUAC_DATA: &[u8; 6] = b"\x19\x93\r\n\x1a\n";
const INT_SIZE: u8 = 4;
const SIZE_T_SIZE: u8 = 8;
const INSTRUCTION_SIZE: u8 = 4;
const LUA_INTEGER_SIZE: u8 = 8;
const LUA_NUMBER_SIZE: u8 = 8;
const LUAC_INT: i64 = 0x5678;
const LUAC_NUM: f64 = 370.5;

/// Strings up to this length are dumped as short strings.
const MAX_SHORT_LEN: usize = 40;

// Lua constant type tags
const LUA_TNIL: u8 = 0;
const LUA_TBOOLEAN: u8 = 1;
const LUA_TNUMFLT: u8 = 3;
const LUA_TNUMINT: u8 = 3 | (1 << 4); // 0x13
const LUA_TSHRSTR: u8 = 4;
const LUA_TLNGSTR: u8 = 4 | (1 << 4); // 0x14

/// Does this buffer start with the precompiled-chunk signature?
pub fn is_binary(data: &[u8]) -> bool {
    data.starts_with(LUA_SIGNATURE)
}

// ─── Dumper ─────────────────────────────────────────────────────────────

/// Serialize a Proto and all its children into Lua 5.3 binary format.
pub fn dump(proto: &Proto, strip: bool) -> Vec<u8> {
    let mut out = Vec::new();
    write_header(&mut out);
    // Number of upvalues for the main closure
    out.push(proto.upvalues.len() as u8);
    write_function(&mut out, proto, strip, None);
    out
}

fn write_header(out: &mut Vec<u8>) {
    out.extend_from_slice(LUA_SIGNATURE);
    out.push(LUAC_VERSION);
    out.push(LUAC_FORMAT);
    out.extend_from_slice(LUAC_DATA);
    out.push(INT_SIZE);
    out.push(SIZE_T_SIZE);
    out.push(INSTRUCTION_SIZE);
    out.push(LUA_INTEGER_SIZE);
    out.push(LUA_NUMBER_SIZE);
    out.extend_from_slice(&LUAC_INT.to_le_bytes());
    out.extend_from_slice(&LUAC_NUM.to_le_bytes());
}

fn write_int(out: &mut Vec<u8>, n: usize) {
    out.extend_from_slice(&(n as i32).to_le_bytes());
}

fn write_string(out: &mut Vec<u8>, s: Option<&[u8]>) {
    match s {
        None => out.push(0),
        Some(bytes) => {
            // Lua stores length + 1 so that 0 can mean "no string".
            let size = bytes.len() + 1;
            if size < 0xFF {
                out.push(size as u8);
            } else {
                out.push(0xFF);
                out.extend_from_slice(&(size as u64).to_le_bytes());
            }
            out.extend_from_slice(bytes);
        }
    }
}

fn write_function(out: &mut Vec<u8>, proto: &Proto, strip: bool, parent_source: Option<&[u8]>) {
    let source = proto.source.as_deref();
    if strip || source == parent_source {
        write_string(out, None);
    } else {
        write_string(out, source);
    }

    write_int(out, proto.linedefined as usize);
    write_int(out, proto.lastlinedefined as usize);
    out.push(proto.num_params);
    out.push(proto.is_vararg as u8);
    out.push(proto.max_stack_size);

    // Code
    write_int(out, proto.code.len());
    for inst in &proto.code {
        out.extend_from_slice(&inst.0.to_le_bytes());
    }

    // Constants
    write_int(out, proto.constants.len());
    for k in &proto.constants {
        match k {
            Constant::Nil => out.push(LUA_TNIL),
            Constant::Boolean(b) => {
                out.push(LUA_TBOOLEAN);
                out.push(*b as u8);
            }
            Constant::Float(f) => {
                out.push(LUA_TNUMFLT);
                out.extend_from_slice(&f.to_le_bytes());
            }
            Constant::Integer(i) => {
                out.push(LUA_TNUMINT);
                out.extend_from_slice(&i.to_le_bytes());
            }
            Constant::String(bytes) => {
                out.push(if bytes.len() <= MAX_SHORT_LEN {
                    LUA_TSHRSTR
                } else {
                    LUA_TLNGSTR
                });
                write_string(out, Some(bytes));
            }
        }
    }

    // Upvalues
    write_int(out, proto.upvalues.len());
    for uv in &proto.upvalues {
        let (in_stack, index) = match uv.capture {
            Capture::Local(reg) => (1, reg),
            Capture::Upvalue(idx) => (0, idx),
        };
        out.push(in_stack);
        out.push(index);
    }

    // Protos (child functions)
    write_int(out, proto.protos.len());
    for child in &proto.protos {
        write_function(out, child, strip, source);
    }

    // Debug info
    if strip {
        write_int(out, 0); // line info
        write_int(out, 0); // local vars
        write_int(out, 0); // upvalue names
        return;
    }

    write_int(out, proto.line_info.len());
    for &line in &proto.line_info {
        write_int(out, line as usize);
    }

    write_int(out, proto.local_vars.len());
    for lv in &proto.local_vars {
        write_string(out, Some(&lv.name));
        write_int(out, lv.start_pc as usize);
        write_int(out, lv.end_pc as usize);
    }

    write_int(out, proto.upvalues.len());
    for uv in &proto.upvalues {
        write_string(out, uv.name.as_deref());
    }
}

// ─── Undumper ───────────────────────────────────────────────────────────

/// Deepest function nesting accepted, matching the host's `LUAI_MAXCCALLS`.
pub const MAX_NESTING: usize = 200;

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    name: &'a str,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], name: &'a str) -> Self {
        Reader {
            data,
            pos: 0,
            name,
            depth: 0,
        }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn truncated(&self) -> ChunkError {
        ChunkError::Truncated(self.name.to_string())
    }

    fn read_byte(&mut self) -> Result<u8, ChunkError> {
        let b = *self.data.get(self.pos).ok_or_else(|| self.truncated())?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ChunkError> {
        if n > self.remaining() {
            return Err(self.truncated());
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ChunkError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.read_bytes(N)?);
        Ok(buf)
    }

    fn read_int(&mut self) -> Result<i32, ChunkError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Read an element count, rejecting counts the remaining input cannot hold.
    fn read_count(&mut self, min_element_size: usize) -> Result<usize, ChunkError> {
        let n = self.read_int()?;
        let n = usize::try_from(n).map_err(|_| ChunkError::Corrupted(self.name.to_string()))?;
        if n.saturating_mul(min_element_size) > self.remaining() {
            return Err(self.truncated());
        }
        Ok(n)
    }

    fn read_u32(&mut self) -> Result<u32, ChunkError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    fn read_i64(&mut self) -> Result<i64, ChunkError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    fn read_f64(&mut self) -> Result<f64, ChunkError> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    fn read_string(&mut self) -> Result<Option<Vec<u8>>, ChunkError> {
        let mut size = self.read_byte()? as u64;
        if size == 0xFF {
            size = u64::from_le_bytes(self.read_array()?);
        }
        if size == 0 {
            return Ok(None);
        }
        let len = usize::try_from(size - 1).map_err(|_| self.truncated())?;
        Ok(Some(self.read_bytes(len)?.to_vec()))
    }
}

/// Deserialize a Lua 5.3 binary chunk into a Proto.
pub fn undump(data: &[u8], name: &str) -> Result<Proto, ChunkError> {
    let mut reader = Reader::new(data, name);
    verify_header(&mut reader)?;
    let _num_upvalues = reader.read_byte()?;
    read_function(&mut reader, None)
}

fn verify_header(reader: &mut Reader) -> Result<(), ChunkError> {
    let chunk_name = reader.name;
    let name = || chunk_name.to_string();

    if reader.read_bytes(4).ok() != Some(&LUA_SIGNATURE[..]) {
        return Err(ChunkError::NotBinary(name()));
    }
    if reader.read_byte()? != LUAC_VERSION {
        return Err(ChunkError::Version(name()));
    }
    if reader.read_byte()? != LUAC_FORMAT {
        return Err(ChunkError::Format(name()));
    }
    if reader.read_bytes(6)? != LUAC_DATA {
        return Err(ChunkError::Corrupted(name()));
    }

    for (expected, what) in [
        (INT_SIZE, "int"),
        (SIZE_T_SIZE, "size_t"),
        (INSTRUCTION_SIZE, "Instruction"),
        (LUA_INTEGER_SIZE, "lua_Integer"),
        (LUA_NUMBER_SIZE, "lua_Number"),
    ] {
        if reader.read_byte()? != expected {
            return Err(ChunkError::SizeMismatch { name: name(), what });
        }
    }

    if reader.read_i64()? != LUAC_INT {
        return Err(ChunkError::Endianness(name()));
    }
    if reader.read_f64()? != LUAC_NUM {
        return Err(ChunkError::FloatFormat(name()));
    }
    Ok(())
}

fn read_function(reader: &mut Reader, parent_source: Option<&[u8]>) -> Result<Proto, ChunkError> {
    let mut proto = Proto::new();

    proto.source = reader
        .read_string()?
        .or_else(|| parent_source.map(<[u8]>::to_vec));
    proto.linedefined = reader.read_int()? as u32;
    proto.lastlinedefined = reader.read_int()? as u32;
    proto.num_params = reader.read_byte()?;
    proto.is_vararg = reader.read_byte()? != 0;
    proto.max_stack_size = reader.read_byte()?;

    // Code
    let code_size = reader.read_count(4)?;
    proto.code = (0..code_size)
        .map(|_| reader.read_u32().map(Instruction))
        .collect::<Result<_, _>>()?;

    // Constants
    let const_size = reader.read_count(1)?;
    proto.constants = Vec::with_capacity(const_size);
    for _ in 0..const_size {
        let tag = reader.read_byte()?;
        let k = match tag {
            LUA_TNIL => Constant::Nil,
            LUA_TBOOLEAN => Constant::Boolean(reader.read_byte()? != 0),
            LUA_TNUMFLT => Constant::Float(reader.read_f64()?),
            LUA_TNUMINT => Constant::Integer(reader.read_i64()?),
            LUA_TSHRSTR | LUA_TLNGSTR => {
                Constant::String(reader.read_string()?.unwrap_or_default())
            }
            _ => {
                return Err(ChunkError::UnknownConstant {
                    name: reader.name.to_string(),
                    tag,
                })
            }
        };
        proto.constants.push(k);
    }

    // Upvalues
    let upval_size = reader.read_count(2)?;
    proto.upvalues = Vec::with_capacity(upval_size);
    for _ in 0..upval_size {
        let in_stack = reader.read_byte()? != 0;
        let index = reader.read_byte()?;
        let capture = if in_stack {
            Capture::Local(index)
        } else {
            Capture::Upvalue(index)
        };
        proto.upvalues.push(UpvalDesc {
            name: None, // filled in debug section
            capture,
        });
    }

    // Protos (child functions)
    let proto_size = reader.read_count(1)?;
    if proto_size > 0 && reader.depth >= MAX_NESTING {
        return Err(ChunkError::Corrupted(reader.name.to_string()));
    }
    proto.protos = Vec::with_capacity(proto_size);
    reader.depth += 1;
    for _ in 0..proto_size {
        let child = read_function(reader, proto.source.as_deref())?;
        proto.protos.push(child);
    }
    reader.depth -= 1;

    // Debug info - line info
    let line_info_size = reader.read_count(4)?;
    proto.line_info = (0..line_info_size)
        .map(|_| reader.read_int().map(|l| l as u32))
        .collect::<Result<_, _>>()?;

    // Debug info - local vars
    let local_size = reader.read_count(9)?;
    proto.local_vars = Vec::with_capacity(local_size);
    for _ in 0..local_size {
        let name = reader.read_string()?.unwrap_or_default();
        let start_pc = reader.read_int()? as u32;
        let end_pc = reader.read_int()? as u32;
        proto.local_vars.push(LocalVar {
            name,
            start_pc,
            end_pc,
        });
    }

    // Debug info - upvalue names
    let upval_name_size = reader.read_count(1)?;
    for i in 0..upval_name_size {
        let name = reader.read_string()?;
        if let Some(uv) = proto.upvalues.get_mut(i) {
            uv.name = name;
        }
    }

    Ok(proto)
}
