/// Lua 5.3 opcodes and instruction encoding.
///
/// Instruction format (32 bits):
/// - Bits 0-5: OpCode (6 bits)
/// - Bits 6-13: A (8 bits)
/// - For iABC format:
///   - Bits 14-22: C (9 bits)
///   - Bits 23-31: B (9 bits)
/// - For iABx: Bx = bits 14-31 (unsigned 18 bits)
/// - For iAsBx: sBx = Bx - offset (signed interpretation)
/// - For iAx: Ax = bits 6-31 (26 bits, unsigned)
///
/// B and C fields in "RK" mode name a constant when bit 8 (`BITRK`) is set.
use std::fmt;

/// Size constants for instruction fields.
const SIZE_OP: u32 = 6;
const SIZE_A: u32 = 8;
const SIZE_B: u32 = 9;
const SIZE_C: u32 = 9;
const SIZE_BX: u32 = SIZE_B + SIZE_C; // 18
const SIZE_AX: u32 = SIZE_A + SIZE_B + SIZE_C; // 26

/// Position constants.
const POS_OP: u32 = 0;
const POS_A: u32 = POS_OP + SIZE_OP; // 6
const POS_C: u32 = POS_A + SIZE_A; // 14
const POS_B: u32 = POS_C + SIZE_C; // 23
const POS_BX: u32 = POS_C;
const POS_AX: u32 = POS_A;

/// Mask helpers.
const fn mask(n: u32) -> u32 {
    (1 << n) - 1
}

pub const MAX_A: u32 = mask(SIZE_A); // 255
pub const MAX_B: u32 = mask(SIZE_B); // 511
pub const MAX_C: u32 = mask(SIZE_C); // 511
pub const MAX_BX: u32 = mask(SIZE_BX); // 262143
pub const MAX_SBX: i32 = (MAX_BX >> 1) as i32; // 131071
pub const MIN_SBX: i32 = -MAX_SBX;
pub const MAX_AX: u32 = mask(SIZE_AX);

/// Bit that marks a B/C field as a constant index.
pub const BITRK: u32 = 1 << (SIZE_B - 1);
/// Largest constant index addressable through an RK field.
pub const MAX_INDEX_RK: u32 = BITRK - 1;

/// Number of list items flushed per SETLIST batch.
pub const FIELDS_PER_FLUSH: u32 = 50;

const OFFSET_SBX: i32 = MAX_SBX;

/// All 47 Lua 5.3 opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Move = 0,
    LoadK,
    LoadKX,
    LoadBool,
    LoadNil,
    GetUpval,
    GetTabUp,
    GetTable,
    SetTabUp,
    SetUpval,
    SetTable,
    NewTable,
    Self_,
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
    Not,
    Len,
    Concat,
    Jmp,
    Eq,
    Lt,
    Le,
    Test,
    TestSet,
    Call,
    TailCall,
    Return,
    ForLoop,
    ForPrep,
    TForCall,
    TForLoop,
    SetList,
    Closure,
    VarArg,
    ExtraArg,
}

impl OpCode {
    /// Number of opcodes.
    pub const COUNT: usize = 47;

    const ALL: [OpCode; Self::COUNT] = {
        use OpCode::*;
        [
            Move, LoadK, LoadKX, LoadBool, LoadNil, GetUpval, GetTabUp, GetTable, SetTabUp,
            SetUpval, SetTable, NewTable, Self_, Add, Sub, Mul, Mod, Pow, Div, IDiv, BAnd, BOr,
            BXor, Shl, Shr, Unm, BNot, Not, Len, Concat, Jmp, Eq, Lt, Le, Test, TestSet, Call,
            TailCall, Return, ForLoop, ForPrep, TForCall, TForLoop, SetList, Closure, VarArg,
            ExtraArg,
        ]
    };

    /// Get the opcode from a u8 value.
    pub fn from_u8(val: u8) -> Option<OpCode> {
        Self::ALL.get(val as usize).copied()
    }

    /// Addressing mode of this opcode (lopcodes.c `luaP_opmodes`).
    pub fn mode(&self) -> OpMode {
        use ArgMode::*;
        use InstructionFormat::*;
        use OpCode::*;
        let (test, b, c, format) = match self {
            Move => (false, Register, Unused, IABC),
            LoadK => (false, RegisterOrConstant, Unused, IABx),
            LoadKX => (false, Unused, Unused, IABx),
            LoadBool => (false, Value, Value, IABC),
            LoadNil => (false, Value, Unused, IABC),
            GetUpval => (false, Value, Unused, IABC),
            GetTabUp => (false, Value, RegisterOrConstant, IABC),
            GetTable => (false, Register, RegisterOrConstant, IABC),
            SetTabUp => (false, RegisterOrConstant, RegisterOrConstant, IABC),
            SetUpval => (false, Value, Unused, IABC),
            SetTable => (false, RegisterOrConstant, RegisterOrConstant, IABC),
            NewTable => (false, Value, Value, IABC),
            Self_ => (false, Register, RegisterOrConstant, IABC),
            Add | Sub | Mul | Mod | Pow | Div | IDiv | BAnd | BOr | BXor | Shl | Shr => {
                (false, RegisterOrConstant, RegisterOrConstant, IABC)
            }
            Unm | BNot | Not | Len => (false, Register, Unused, IABC),
            Concat => (false, Register, Register, IABC),
            Jmp => (false, Register, Unused, IAsBx),
            Eq | Lt | Le => (true, RegisterOrConstant, RegisterOrConstant, IABC),
            Test => (true, Unused, Value, IABC),
            TestSet => (true, Register, Value, IABC),
            Call | TailCall => (false, Value, Value, IABC),
            Return => (false, Value, Unused, IABC),
            ForLoop | ForPrep | TForLoop => (false, Register, Unused, IAsBx),
            TForCall => (false, Unused, Value, IABC),
            SetList => (false, Value, Value, IABC),
            Closure => (false, Value, Unused, IABx),
            VarArg => (false, Value, Unused, IABC),
            ExtraArg => (false, Value, Value, IAx),
        };
        OpMode { format, b, c, test }
    }

    /// Get the instruction format for this opcode.
    pub fn format(&self) -> InstructionFormat {
        self.mode().format
    }

    /// Get the name of this opcode.
    pub fn name(&self) -> &'static str {
        use OpCode::*;
        match self {
            Move => "MOVE",
            LoadK => "LOADK",
            LoadKX => "LOADKX",
            LoadBool => "LOADBOOL",
            LoadNil => "LOADNIL",
            GetUpval => "GETUPVAL",
            GetTabUp => "GETTABUP",
            GetTable => "GETTABLE",
            SetTabUp => "SETTABUP",
            SetUpval => "SETUPVAL",
            SetTable => "SETTABLE",
            NewTable => "NEWTABLE",
            Self_ => "SELF",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Mod => "MOD",
            Pow => "POW",
            Div => "DIV",
            IDiv => "IDIV",
            BAnd => "BAND",
            BOr => "BOR",
            BXor => "BXOR",
            Shl => "SHL",
            Shr => "SHR",
            Unm => "UNM",
            BNot => "BNOT",
            Not => "NOT",
            Len => "LEN",
            Concat => "CONCAT",
            Jmp => "JMP",
            Eq => "EQ",
            Lt => "LT",
            Le => "LE",
            Test => "TEST",
            TestSet => "TESTSET",
            Call => "CALL",
            TailCall => "TAILCALL",
            Return => "RETURN",
            ForLoop => "FORLOOP",
            ForPrep => "FORPREP",
            TForCall => "TFORCALL",
            TForLoop => "TFORLOOP",
            SetList => "SETLIST",
            Closure => "CLOSURE",
            VarArg => "VARARG",
            ExtraArg => "EXTRAARG",
        }
    }

    /// Returns true if this opcode is a test (conditional skip of the next instruction).
    pub fn is_test(&self) -> bool {
        self.mode().test
    }
}

/// Instruction format types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstructionFormat {
    IABC,
    IABx,
    IAsBx,
    IAx,
}

/// How an instruction uses its B or C field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgMode {
    /// Field is not used.
    Unused,
    /// Field is a plain number (count, flag, index).
    Value,
    /// Field is a register.
    Register,
    /// Field is a register or, with `BITRK` set, a constant index.
    RegisterOrConstant,
}

/// Full addressing description of an opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpMode {
    pub format: InstructionFormat,
    pub b: ArgMode,
    pub c: ArgMode,
    /// Next instruction is a jump that this one may skip.
    pub test: bool,
}

/// A 32-bit Lua bytecode instruction.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Instruction(pub u32);

impl Instruction {
    // ---- Constructors ----

    /// Create an iABC instruction.
    pub fn abc(op: OpCode, a: u8, b: u16, c: u16) -> Self {
        debug_assert!(b as u32 <= MAX_B, "B out of range: {b}");
        debug_assert!(c as u32 <= MAX_C, "C out of range: {c}");
        let mut i = (op as u32) << POS_OP;
        i |= (a as u32) << POS_A;
        i |= (b as u32) << POS_B;
        i |= (c as u32) << POS_C;
        Instruction(i)
    }

    /// Create an iABx instruction.
    pub fn abx(op: OpCode, a: u8, bx: u32) -> Self {
        debug_assert!(bx <= MAX_BX, "Bx out of range: {bx}");
        let mut i = (op as u32) << POS_OP;
        i |= (a as u32) << POS_A;
        i |= bx << POS_BX;
        Instruction(i)
    }

    /// Create an iAsBx instruction (signed Bx).
    pub fn asbx(op: OpCode, a: u8, sbx: i32) -> Self {
        debug_assert!(
            (MIN_SBX..=MAX_SBX).contains(&sbx),
            "sBx out of range: {sbx}"
        );
        let bx = (sbx + OFFSET_SBX) as u32;
        Self::abx(op, a, bx)
    }

    /// Create an iAx instruction.
    pub fn ax(op: OpCode, ax: u32) -> Self {
        debug_assert!(ax <= MAX_AX, "Ax out of range: {ax}");
        let mut i = (op as u32) << POS_OP;
        i |= ax << POS_AX;
        Instruction(i)
    }

    // ---- Decoders ----

    /// Raw opcode number (may be outside the known set).
    pub fn raw_opcode(&self) -> u8 {
        ((self.0 >> POS_OP) & mask(SIZE_OP)) as u8
    }

    /// Get the opcode, `None` when the number is not a Lua 5.3 opcode.
    pub fn opcode(&self) -> Option<OpCode> {
        OpCode::from_u8(self.raw_opcode())
    }

    /// Get field A.
    pub fn a(&self) -> u8 {
        ((self.0 >> POS_A) & mask(SIZE_A)) as u8
    }

    /// Get field B.
    pub fn b(&self) -> u16 {
        ((self.0 >> POS_B) & mask(SIZE_B)) as u16
    }

    /// Get field C.
    pub fn c(&self) -> u16 {
        ((self.0 >> POS_C) & mask(SIZE_C)) as u16
    }

    /// Get field Bx (unsigned).
    pub fn bx(&self) -> u32 {
        (self.0 >> POS_BX) & mask(SIZE_BX)
    }

    /// Get field sBx (signed).
    pub fn sbx(&self) -> i32 {
        self.bx() as i32 - OFFSET_SBX
    }

    /// Get field Ax (unsigned).
    pub fn ax_field(&self) -> u32 {
        (self.0 >> POS_AX) & mask(SIZE_AX)
    }
}

/// Encode a constant index as an RK field.
pub const fn rk_constant(index: u32) -> u16 {
    (index | BITRK) as u16
}

/// Does this RK field name a constant?
pub const fn is_constant(field: u16) -> bool {
    field as u32 & BITRK != 0
}

/// Convert a "floating point byte" (`eeeeexxx`) back to an integer.
///
/// NEWTABLE stores its size hints in this encoding. Returns `None` when the
/// decoded size does not fit in 32 bits.
pub fn fb2int(x: u16) -> Option<u32> {
    let x = u32::from(x);
    if x < 8 {
        return Some(x);
    }
    let shift = (x >> 3) - 1;
    // The mantissa is at most four bits wide.
    if shift > 28 {
        None
    } else {
        Some(((x & 7) + 8) << shift)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(op) = self.opcode() else {
            return write!(f, "<opcode {}>", self.raw_opcode());
        };
        write!(f, "{}", op.name())?;
        match op.format() {
            InstructionFormat::IABC => {
                write!(f, " A={} B={} C={}", self.a(), self.b(), self.c())?;
            }
            InstructionFormat::IABx => {
                write!(f, " A={} Bx={}", self.a(), self.bx())?;
            }
            InstructionFormat::IAsBx => {
                write!(f, " A={} sBx={}", self.a(), self.sbx())?;
            }
            InstructionFormat::IAx => {
                write!(f, " Ax={}", self.ax_field())?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
