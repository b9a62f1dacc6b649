/// Function prototype: holds compiled bytecode, constants, and debug info.
use crate::opcode::Instruction;

/// A constant value in the constant pool.
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(Vec<u8>),
}

/// Where a closure finds one of its upvalues when it is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capture {
    /// A register of the enclosing function's frame.
    Local(u8),
    /// An upvalue of the enclosing closure.
    Upvalue(u8),
}

/// Description of an upvalue.
#[derive(Clone, Debug, PartialEq)]
pub struct UpvalDesc {
    /// Name of the upvalue (for debug info).
    pub name: Option<Vec<u8>>,
    pub capture: Capture,
}

/// A local variable debug entry.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalVar {
    pub name: Vec<u8>,
    /// First PC where the variable is active.
    pub start_pc: u32,
    /// First PC where the variable is dead.
    pub end_pc: u32,
}

/// Whether a prototype is a chunk's main function or a nested one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtoKind {
    Main,
    Lua,
}

impl ProtoKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProtoKind::Main => "main",
            ProtoKind::Lua => "Lua",
        }
    }
}

/// A compiled function prototype.
#[derive(Clone, Debug, PartialEq)]
pub struct Proto {
    /// Bytecode instructions.
    pub code: Vec<Instruction>,
    /// Constant pool.
    pub constants: Vec<Constant>,
    /// Nested function prototypes, in declaration order.
    pub protos: Vec<Proto>,
    /// Upvalue descriptors.
    pub upvalues: Vec<UpvalDesc>,
    /// Number of fixed parameters.
    pub num_params: u8,
    /// Whether this function accepts varargs.
    pub is_vararg: bool,
    /// Maximum stack size needed.
    pub max_stack_size: u8,
    /// Source name (for error messages).
    pub source: Option<Vec<u8>>,
    pub linedefined: u32,
    pub lastlinedefined: u32,

    // --- Debug info ---
    /// Source line of each instruction (empty when stripped).
    pub line_info: Vec<u32>,
    /// Local variable debug info.
    pub local_vars: Vec<LocalVar>,
}

impl Proto {
    /// Create a new empty prototype.
    pub fn new() -> Self {
        Proto {
            code: Vec::new(),
            constants: Vec::new(),
            protos: Vec::new(),
            upvalues: Vec::new(),
            num_params: 0,
            is_vararg: false,
            max_stack_size: 2, // minimum
            source: None,
            linedefined: 0,
            lastlinedefined: 0,
            line_info: Vec::new(),
            local_vars: Vec::new(),
        }
    }

    /// Emit an instruction at the given source line.
    pub fn emit(&mut self, inst: Instruction, line: u32) -> usize {
        let pc = self.code.len();
        self.code.push(inst);
        self.line_info.push(line);
        pc
    }

    /// Add a constant to the pool, returning its index. Deduplicates.
    pub fn add_constant(&mut self, k: Constant) -> usize {
        if let Some(i) = self.constants.iter().position(|c| constants_equal(c, &k)) {
            return i;
        }
        self.constants.push(k);
        self.constants.len() - 1
    }

    /// Get the line number for a given PC (0 when stripped).
    pub fn line(&self, pc: usize) -> u32 {
        self.line_info.get(pc).copied().unwrap_or(0)
    }

    /// Get the number of instructions.
    pub fn code_len(&self) -> usize {
        self.code.len()
    }

    pub fn kind(&self) -> ProtoKind {
        if self.linedefined == 0 {
            ProtoKind::Main
        } else {
            ProtoKind::Lua
        }
    }

    /// Number of prototypes in this tree, this one included.
    pub fn tree_size(&self) -> usize {
        1 + self.protos.iter().map(Proto::tree_size).sum::<usize>()
    }

    /// Source name as text, with the loader's `@`/`=` prefix kept.
    pub fn source_name(&self) -> String {
        match &self.source {
            Some(s) => String::from_utf8_lossy(s).into_owned(),
            None => "=?".to_string(),
        }
    }
}

impl Default for Proto {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if two constants are equal (same bit pattern for floats, so NaNs dedup).
fn constants_equal(a: &Constant, b: &Constant) -> bool {
    match (a, b) {
        (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
        (Constant::Float(_), _) | (_, Constant::Float(_)) => false,
        _ => a == b,
    }
}
