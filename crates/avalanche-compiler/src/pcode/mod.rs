//! P-Code model (C6): the instruction set, typed registers, and the
//! global/executable program structure.
//!
//! Two layered builders assemble this model (see `builder`): a global
//! builder accumulating top-level items, and per-function executable
//! builders attached to it. The builders construct instruction records but
//! do not validate them; validation is X-Code's job (`crate::xcode`).

pub mod builder;
pub mod sexp;
pub mod serialize;

use std::fmt;

/// Register type letters, matching the original runtime's register-stack
/// model: disjoint index spaces per type. Var registers are function-local
/// named variables; the rest are pushed/popped as lexical stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterType {
    Var,
    Data,
    Int,
    List,
    Parm,
    Function,
}

impl RegisterType {
    pub fn letter(self) -> char {
        match self {
            RegisterType::Var => 'v',
            RegisterType::Data => 'd',
            RegisterType::Int => 'i',
            RegisterType::List => 'l',
            RegisterType::Parm => 'p',
            RegisterType::Function => 'f',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'v' => Some(RegisterType::Var),
            'd' => Some(RegisterType::Data),
            'i' => Some(RegisterType::Int),
            'l' => Some(RegisterType::List),
            'p' => Some(RegisterType::Parm),
            'f' => Some(RegisterType::Function),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub reg_type: RegisterType,
    pub index: u32,
}

impl Register {
    pub fn new(reg_type: RegisterType, index: u32) -> Self {
        Register { reg_type, index }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.reg_type.letter(), self.index)
    }
}

impl std::str::FromStr for Register {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let letter = chars.next().ok_or_else(|| "empty register".to_string())?;
        let reg_type =
            RegisterType::from_letter(letter).ok_or_else(|| format!("bad register type {letter:?}"))?;
        let index: u32 = chars
            .as_str()
            .parse()
            .map_err(|_| format!("bad register index in {s:?}"))?;
        Ok(Register::new(reg_type, index))
    }
}

/// The closed instruction set named in §3. New operations require validator
/// updates in `crate::xcode`.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Push(RegisterType),
    Pop(RegisterType),
    Label(u32),
    /// Unconditional jump; `fallthrough` distinguishes a terminal branch
    /// from one whose block also falls through (never both at once).
    Branch { target: u32 },
    CondBranch { cond: Register, target: u32 },
    Try { landing_pad: u32 },
    Yrt,
    Rethrow,
    RequireEmptyException,
    RequireCaughtException,
    LdImmInt { dst: Register, value: i64 },
    LdImmStr { dst: Register, value: String },
    LdReg { dst: Register, src: Register },
    LdGlob { dst: Register, global: u32 },
    SetGlob { global: u32, src: Register },
    LEmpty { dst: Register },
    LAppend { dst: Register, list: Register, value: Register },
    LCat { dst: Register, a: Register, b: Register },
    LHead { dst: Register, list: Register },
    LBehead { dst: Register, list: Register },
    LFlatten { dst: Register, list: Register },
    LIndex { dst: Register, list: Register, index: Register },
    LLength { dst: Register, list: Register },
    IAdd { dst: Register, a: Register, b: Register },
    IAddImm { dst: Register, a: Register, imm: i64 },
    ICmp { dst: Register, a: Register, b: Register },
    Bool { dst: Register, value: bool },
    InvokeSs { dst: Register, function_global: u32, args: Vec<Register> },
    InvokeSd { dst: Register, function_global: u32, args_start: Register, args_count: u32 },
    InvokeDd { dst: Register, function_reg: Register, args_start: Register, args_count: u32 },
    Partial { dst: Register, function_global: u32, bound_args: Vec<Register> },
    Ret { value: Option<Register> },
}

impl Instruction {
    /// A terminal instruction ends its basic block with no fallthrough.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Instruction::Branch { .. } | Instruction::Ret { .. } | Instruction::Rethrow)
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Instruction::Label(_))
    }

    /// Instructions that may transfer control to a landing pad when one is
    /// in scope (X-Code pass 5).
    pub fn may_throw(&self) -> bool {
        matches!(
            self,
            Instruction::InvokeSs { .. }
                | Instruction::InvokeSd { .. }
                | Instruction::InvokeDd { .. }
                | Instruction::LIndex { .. }
        )
    }

    pub fn branch_target(&self) -> Option<u32> {
        match self {
            Instruction::Branch { target } | Instruction::CondBranch { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// The "with-field" combinator (§4.6): produces a new instruction with
    /// its jump target renumbered, without mutating the original.
    pub fn with_branch_target(&self, new_target: u32) -> Instruction {
        match self {
            Instruction::Branch { .. } => Instruction::Branch { target: new_target },
            Instruction::CondBranch { cond, .. } => Instruction::CondBranch {
                cond: *cond,
                target: new_target,
            },
            other => other.clone(),
        }
    }

    /// Registers read by this instruction (used by the φ-dataflow pass).
    pub fn reads(&self) -> Vec<Register> {
        match self {
            Instruction::CondBranch { cond, .. } => vec![*cond],
            Instruction::LdReg { src, .. } => vec![*src],
            Instruction::SetGlob { src, .. } => vec![*src],
            Instruction::LAppend { list, value, .. } => vec![*list, *value],
            Instruction::LCat { a, b, .. } => vec![*a, *b],
            Instruction::LHead { list, .. }
            | Instruction::LBehead { list, .. }
            | Instruction::LFlatten { list, .. }
            | Instruction::LLength { list, .. } => vec![*list],
            Instruction::LIndex { list, index, .. } => vec![*list, *index],
            Instruction::IAdd { a, b, .. } | Instruction::ICmp { a, b, .. } => vec![*a, *b],
            Instruction::IAddImm { a, .. } => vec![*a],
            Instruction::InvokeSs { args, .. } => args.clone(),
            Instruction::InvokeSd { args_start, .. } => vec![*args_start],
            Instruction::InvokeDd {
                function_reg,
                args_start,
                ..
            } => vec![*function_reg, *args_start],
            Instruction::Partial { bound_args, .. } => bound_args.clone(),
            Instruction::Ret { value: Some(r) } => vec![*r],
            _ => Vec::new(),
        }
    }

    /// Registers written by this instruction.
    pub fn writes(&self) -> Vec<Register> {
        match self {
            Instruction::LdImmInt { dst, .. }
            | Instruction::LdImmStr { dst, .. }
            | Instruction::LdReg { dst, .. }
            | Instruction::LdGlob { dst, .. }
            | Instruction::LEmpty { dst }
            | Instruction::LAppend { dst, .. }
            | Instruction::LCat { dst, .. }
            | Instruction::LHead { dst, .. }
            | Instruction::LBehead { dst, .. }
            | Instruction::LFlatten { dst, .. }
            | Instruction::LIndex { dst, .. }
            | Instruction::LLength { dst, .. }
            | Instruction::IAdd { dst, .. }
            | Instruction::IAddImm { dst, .. }
            | Instruction::ICmp { dst, .. }
            | Instruction::Bool { dst, .. }
            | Instruction::InvokeSs { dst, .. }
            | Instruction::InvokeSd { dst, .. }
            | Instruction::InvokeDd { dst, .. }
            | Instruction::Partial { dst, .. } => vec![*dst],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Private,
    Internal,
    Public,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SrcPos {
    pub filename: String,
    pub line: u32,
    pub col: u32,
}

/// One global item, each headed by a type tag at append time and assigned a
/// stable 0-based index used by cross-references.
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalItem {
    SrcPos(SrcPos),
    ExtVar { name: String },
    ExtFun { name: String, prototype: String },
    Var { name: String, visibility: Visibility },
    Fun {
        name: String,
        prototype: String,
        captures: Vec<String>,
        body: Vec<Instruction>,
    },
    Init { fun_ref: u32 },
    Macro {
        name: String,
        macro_type: String,
        precedence: u32,
        body: Vec<Instruction>,
    },
    Keysym { name: String },
    StructDef { name: String, fields: Vec<(String, String)> },
    ImportAlias { alias: String, target: String },
}

impl GlobalItem {
    pub fn tag(&self) -> &'static str {
        match self {
            GlobalItem::SrcPos(_) => "src-pos",
            GlobalItem::ExtVar { .. } => "ext-var",
            GlobalItem::ExtFun { .. } => "ext-fun",
            GlobalItem::Var { .. } => "var",
            GlobalItem::Fun { .. } => "fun",
            GlobalItem::Init { .. } => "init",
            GlobalItem::Macro { .. } => "macro",
            GlobalItem::Keysym { .. } => "keysym",
            GlobalItem::StructDef { .. } => "struct-def",
            GlobalItem::ImportAlias { .. } => "import-alias",
        }
    }
}

/// An ordered list of global items, with indices fixed by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub items: Vec<GlobalItem>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    pub fn index_of_name(&self, name: &str) -> Option<u32> {
        self.items
            .iter()
            .position(|item| match item {
                GlobalItem::ExtVar { name: n }
                | GlobalItem::ExtFun { name: n, .. }
                | GlobalItem::Var { name: n, .. }
                | GlobalItem::Fun { name: n, .. }
                | GlobalItem::Keysym { name: n }
                | GlobalItem::StructDef { name: n, .. } => n == name,
                _ => false,
            })
            .map(|i| i as u32)
    }
}
