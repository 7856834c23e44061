//! The stable opcode enumeration. Values are a closed, fixed set; unknown
//! bytes are rejected rather than silently tolerated at runtime (ahead-of-time
//! tooling built on [`crate::instruction`] may choose to tolerate them).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    InitStack = 1,
    Call = 2,
    Syscall = 3,
    Ret = 4,
    RetV = 5,
    Jmp = 6,
    Jz = 7,
    PushNil = 8,
    PushTrue = 9,
    PushI32 = 10,
    PushI16 = 11,
    PushI8 = 12,
    PushF32 = 13,
    PushString = 14,
    PushGlobal = 15,
    PushLocal = 16,
    PushGlobalTable = 17,
    PushLocalTable = 18,
    PushTop = 19,
    PushReturn = 20,
    PopGlobal = 21,
    PopLocal = 22,
    PopGlobalTable = 23,
    PopLocalTable = 24,
    Neg = 25,
    Add = 26,
    Sub = 27,
    Mul = 28,
    Div = 29,
    Mod = 30,
    BitTest = 31,
    And = 32,
    Or = 33,
    SetEq = 34,
    SetNe = 35,
    SetGt = 36,
    SetLe = 37,
    SetLt = 38,
    SetGe = 39,
}

impl Opcode {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Nop => "nop",
            Opcode::InitStack => "init_stack",
            Opcode::Call => "call",
            Opcode::Syscall => "syscall",
            Opcode::Ret => "ret",
            Opcode::RetV => "retv",
            Opcode::Jmp => "jmp",
            Opcode::Jz => "jz",
            Opcode::PushNil => "push_nil",
            Opcode::PushTrue => "push_true",
            Opcode::PushI32 => "push_i32",
            Opcode::PushI16 => "push_i16",
            Opcode::PushI8 => "push_i8",
            Opcode::PushF32 => "push_f32",
            Opcode::PushString => "push_string",
            Opcode::PushGlobal => "push_global",
            Opcode::PushLocal => "push_local",
            Opcode::PushGlobalTable => "push_global_table",
            Opcode::PushLocalTable => "push_local_table",
            Opcode::PushTop => "push_top",
            Opcode::PushReturn => "push_return",
            Opcode::PopGlobal => "pop_global",
            Opcode::PopLocal => "pop_local",
            Opcode::PopGlobalTable => "pop_global_table",
            Opcode::PopLocalTable => "pop_local_table",
            Opcode::Neg => "neg",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::Mod => "mod",
            Opcode::BitTest => "bittest",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::SetEq => "sete",
            Opcode::SetNe => "setne",
            Opcode::SetGt => "setg",
            Opcode::SetLe => "setle",
            Opcode::SetLt => "setl",
            Opcode::SetGe => "setge",
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Opcode::*;
        Ok(match value {
            0 => Nop,
            1 => InitStack,
            2 => Call,
            3 => Syscall,
            4 => Ret,
            5 => RetV,
            6 => Jmp,
            7 => Jz,
            8 => PushNil,
            9 => PushTrue,
            10 => PushI32,
            11 => PushI16,
            12 => PushI8,
            13 => PushF32,
            14 => PushString,
            15 => PushGlobal,
            16 => PushLocal,
            17 => PushGlobalTable,
            18 => PushLocalTable,
            19 => PushTop,
            20 => PushReturn,
            21 => PopGlobal,
            22 => PopLocal,
            23 => PopGlobalTable,
            24 => PopLocalTable,
            25 => Neg,
            26 => Add,
            27 => Sub,
            28 => Mul,
            29 => Div,
            30 => Mod,
            31 => BitTest,
            32 => And,
            33 => Or,
            34 => SetEq,
            35 => SetNe,
            36 => SetGt,
            37 => SetLe,
            38 => SetLt,
            39 => SetGe,
            other => return Err(other),
        })
    }
}
