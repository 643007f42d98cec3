//! Textual serialisation of the P-Code model (§4.6, §6): the whole program
//! as a list of globals, each a list headed by its type tag. This is the
//! round-trip contract exercised in §8: `parse(serialise(p)) == p`.

use super::sexp::{self, Sexp};
use super::{GlobalItem, Instruction, Program, Register, SrcPos, Visibility};
use std::fmt;
use std::str::FromStr;

#[derive(Debug)]
pub enum PcodeError {
    Malformed(String),
}

impl fmt::Display for PcodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PcodeError::Malformed(s) => write!(f, "malformed P-Code: {s}"),
        }
    }
}

impl std::error::Error for PcodeError {}

impl From<String> for PcodeError {
    fn from(s: String) -> Self {
        PcodeError::Malformed(s)
    }
}

impl From<sexp::SexpParseError> for PcodeError {
    fn from(e: sexp::SexpParseError) -> Self {
        PcodeError::Malformed(e.to_string())
    }
}

fn reg(r: Register) -> Sexp {
    Sexp::atom(r.to_string())
}

fn parse_reg(s: &Sexp) -> Result<Register, PcodeError> {
    Register::from_str(s.as_atom().ok_or_else(|| "expected register atom".to_string())?)
        .map_err(PcodeError::Malformed)
}

fn regs(rs: &[Register]) -> Sexp {
    Sexp::list(rs.iter().map(|r| reg(*r)).collect())
}

fn parse_regs(s: &Sexp) -> Result<Vec<Register>, PcodeError> {
    s.as_list()
        .ok_or_else(|| PcodeError::Malformed("expected register list".into()))?
        .iter()
        .map(parse_reg)
        .collect()
}

fn atom_str(s: &Sexp) -> Result<String, PcodeError> {
    Ok(s.as_atom()
        .ok_or_else(|| PcodeError::Malformed("expected atom".to_string()))?
        .to_string())
}

fn atom_u32(s: &Sexp) -> Result<u32, PcodeError> {
    atom_str(s)?
        .parse()
        .map_err(|_| PcodeError::Malformed("expected integer atom".into()))
}

fn atom_i64(s: &Sexp) -> Result<i64, PcodeError> {
    atom_str(s)?
        .parse()
        .map_err(|_| PcodeError::Malformed("expected integer atom".into()))
}

impl Instruction {
    pub fn to_sexp(&self) -> Sexp {
        use Instruction::*;
        let parts: Vec<Sexp> = match self {
            Push(t) => vec![Sexp::atom("push"), Sexp::atom(t.letter().to_string())],
            Pop(t) => vec![Sexp::atom("pop"), Sexp::atom(t.letter().to_string())],
            Label(n) => vec![Sexp::atom("label"), Sexp::atom(n.to_string())],
            Branch { target } => vec![Sexp::atom("branch"), Sexp::atom(target.to_string())],
            CondBranch { cond, target } => vec![
                Sexp::atom("cbranch"),
                reg(*cond),
                Sexp::atom(target.to_string()),
            ],
            Try { landing_pad } => vec![Sexp::atom("try"), Sexp::atom(landing_pad.to_string())],
            Yrt => vec![Sexp::atom("yrt")],
            Rethrow => vec![Sexp::atom("rethrow")],
            RequireEmptyException => vec![Sexp::atom("require-empty-exception")],
            RequireCaughtException => vec![Sexp::atom("require-caught-exception")],
            LdImmInt { dst, value } => vec![Sexp::atom("ld-imm-int"), reg(*dst), Sexp::atom(value.to_string())],
            LdImmStr { dst, value } => vec![Sexp::atom("ld-imm-str"), reg(*dst), Sexp::atom(value.clone())],
            LdReg { dst, src } => vec![Sexp::atom("ld-reg"), reg(*dst), reg(*src)],
            LdGlob { dst, global } => vec![Sexp::atom("ld-glob"), reg(*dst), Sexp::atom(global.to_string())],
            SetGlob { global, src } => vec![Sexp::atom("set-glob"), Sexp::atom(global.to_string()), reg(*src)],
            LEmpty { dst } => vec![Sexp::atom("lempty"), reg(*dst)],
            LAppend { dst, list, value } => vec![Sexp::atom("lappend"), reg(*dst), reg(*list), reg(*value)],
            LCat { dst, a, b } => vec![Sexp::atom("lcat"), reg(*dst), reg(*a), reg(*b)],
            LHead { dst, list } => vec![Sexp::atom("lhead"), reg(*dst), reg(*list)],
            LBehead { dst, list } => vec![Sexp::atom("lbehead"), reg(*dst), reg(*list)],
            LFlatten { dst, list } => vec![Sexp::atom("lflatten"), reg(*dst), reg(*list)],
            LIndex { dst, list, index } => vec![Sexp::atom("lindex"), reg(*dst), reg(*list), reg(*index)],
            LLength { dst, list } => vec![Sexp::atom("llength"), reg(*dst), reg(*list)],
            IAdd { dst, a, b } => vec![Sexp::atom("iadd"), reg(*dst), reg(*a), reg(*b)],
            IAddImm { dst, a, imm } => vec![Sexp::atom("iadd-imm"), reg(*dst), reg(*a), Sexp::atom(imm.to_string())],
            ICmp { dst, a, b } => vec![Sexp::atom("icmp"), reg(*dst), reg(*a), reg(*b)],
            Bool { dst, value } => vec![Sexp::atom("bool"), reg(*dst), Sexp::atom(value.to_string())],
            InvokeSs { dst, function_global, args } => vec![
                Sexp::atom("invoke-ss"),
                reg(*dst),
                Sexp::atom(function_global.to_string()),
                regs(args),
            ],
            InvokeSd {
                dst,
                function_global,
                args_start,
                args_count,
            } => vec![
                Sexp::atom("invoke-sd"),
                reg(*dst),
                Sexp::atom(function_global.to_string()),
                reg(*args_start),
                Sexp::atom(args_count.to_string()),
            ],
            InvokeDd {
                dst,
                function_reg,
                args_start,
                args_count,
            } => vec![
                Sexp::atom("invoke-dd"),
                reg(*dst),
                reg(*function_reg),
                reg(*args_start),
                Sexp::atom(args_count.to_string()),
            ],
            Partial {
                dst,
                function_global,
                bound_args,
            } => vec![
                Sexp::atom("partial"),
                reg(*dst),
                Sexp::atom(function_global.to_string()),
                regs(bound_args),
            ],
            Ret { value } => {
                let mut v = vec![Sexp::atom("ret")];
                if let Some(r) = value {
                    v.push(reg(*r));
                }
                v
            }
        };
        Sexp::list(parts)
    }

    pub fn from_sexp(s: &Sexp) -> Result<Instruction, PcodeError> {
        let items = s
            .as_list()
            .ok_or_else(|| PcodeError::Malformed("instruction must be a list".into()))?;
        let (tag, rest) = items
            .split_first()
            .ok_or_else(|| PcodeError::Malformed("empty instruction".into()))?;
        let tag = tag.as_atom().ok_or_else(|| PcodeError::Malformed("tag must be atom".into()))?;
        use Instruction::*;
        Ok(match tag {
            "push" => Push(
                super::RegisterType::from_letter(atom_str(&rest[0])?.chars().next().unwrap())
                    .ok_or_else(|| PcodeError::Malformed("bad register type".into()))?,
            ),
            "pop" => Pop(
                super::RegisterType::from_letter(atom_str(&rest[0])?.chars().next().unwrap())
                    .ok_or_else(|| PcodeError::Malformed("bad register type".into()))?,
            ),
            "label" => Label(atom_u32(&rest[0])?),
            "branch" => Branch { target: atom_u32(&rest[0])? },
            "cbranch" => CondBranch {
                cond: parse_reg(&rest[0])?,
                target: atom_u32(&rest[1])?,
            },
            "try" => Try { landing_pad: atom_u32(&rest[0])? },
            "yrt" => Yrt,
            "rethrow" => Rethrow,
            "require-empty-exception" => RequireEmptyException,
            "require-caught-exception" => RequireCaughtException,
            "ld-imm-int" => LdImmInt {
                dst: parse_reg(&rest[0])?,
                value: atom_i64(&rest[1])?,
            },
            "ld-imm-str" => LdImmStr {
                dst: parse_reg(&rest[0])?,
                value: atom_str(&rest[1])?,
            },
            "ld-reg" => LdReg {
                dst: parse_reg(&rest[0])?,
                src: parse_reg(&rest[1])?,
            },
            "ld-glob" => LdGlob {
                dst: parse_reg(&rest[0])?,
                global: atom_u32(&rest[1])?,
            },
            "set-glob" => SetGlob {
                global: atom_u32(&rest[0])?,
                src: parse_reg(&rest[1])?,
            },
            "lempty" => LEmpty { dst: parse_reg(&rest[0])? },
            "lappend" => LAppend {
                dst: parse_reg(&rest[0])?,
                list: parse_reg(&rest[1])?,
                value: parse_reg(&rest[2])?,
            },
            "lcat" => LCat {
                dst: parse_reg(&rest[0])?,
                a: parse_reg(&rest[1])?,
                b: parse_reg(&rest[2])?,
            },
            "lhead" => LHead {
                dst: parse_reg(&rest[0])?,
                list: parse_reg(&rest[1])?,
            },
            "lbehead" => LBehead {
                dst: parse_reg(&rest[0])?,
                list: parse_reg(&rest[1])?,
            },
            "lflatten" => LFlatten {
                dst: parse_reg(&rest[0])?,
                list: parse_reg(&rest[1])?,
            },
            "lindex" => LIndex {
                dst: parse_reg(&rest[0])?,
                list: parse_reg(&rest[1])?,
                index: parse_reg(&rest[2])?,
            },
            "llength" => LLength {
                dst: parse_reg(&rest[0])?,
                list: parse_reg(&rest[1])?,
            },
            "iadd" => IAdd {
                dst: parse_reg(&rest[0])?,
                a: parse_reg(&rest[1])?,
                b: parse_reg(&rest[2])?,
            },
            "iadd-imm" => IAddImm {
                dst: parse_reg(&rest[0])?,
                a: parse_reg(&rest[1])?,
                imm: atom_i64(&rest[2])?,
            },
            "icmp" => ICmp {
                dst: parse_reg(&rest[0])?,
                a: parse_reg(&rest[1])?,
                b: parse_reg(&rest[2])?,
            },
            "bool" => Bool {
                dst: parse_reg(&rest[0])?,
                value: atom_str(&rest[1])? == "true",
            },
            "invoke-ss" => InvokeSs {
                dst: parse_reg(&rest[0])?,
                function_global: atom_u32(&rest[1])?,
                args: parse_regs(&rest[2])?,
            },
            "invoke-sd" => InvokeSd {
                dst: parse_reg(&rest[0])?,
                function_global: atom_u32(&rest[1])?,
                args_start: parse_reg(&rest[2])?,
                args_count: atom_u32(&rest[3])?,
            },
            "invoke-dd" => InvokeDd {
                dst: parse_reg(&rest[0])?,
                function_reg: parse_reg(&rest[1])?,
                args_start: parse_reg(&rest[2])?,
                args_count: atom_u32(&rest[3])?,
            },
            "partial" => Partial {
                dst: parse_reg(&rest[0])?,
                function_global: atom_u32(&rest[1])?,
                bound_args: parse_regs(&rest[2])?,
            },
            "ret" => Ret {
                value: match rest.first() {
                    Some(s) => Some(parse_reg(s)?),
                    None => None,
                },
            },
            other => return Err(PcodeError::Malformed(format!("unknown instruction tag {other:?}"))),
        })
    }
}

fn body_to_sexp(body: &[Instruction]) -> Sexp {
    Sexp::list(body.iter().map(Instruction::to_sexp).collect())
}

fn body_from_sexp(s: &Sexp) -> Result<Vec<Instruction>, PcodeError> {
    s.as_list()
        .ok_or_else(|| PcodeError::Malformed("expected instruction list".into()))?
        .iter()
        .map(Instruction::from_sexp)
        .collect()
}

impl GlobalItem {
    pub fn to_sexp(&self) -> Sexp {
        match self {
            GlobalItem::SrcPos(p) => Sexp::list(vec![
                Sexp::atom("src-pos"),
                Sexp::atom(p.filename.clone()),
                Sexp::atom(p.line.to_string()),
                Sexp::atom(p.col.to_string()),
            ]),
            GlobalItem::ExtVar { name } => Sexp::list(vec![Sexp::atom("ext-var"), Sexp::atom(name.clone())]),
            GlobalItem::ExtFun { name, prototype } => Sexp::list(vec![
                Sexp::atom("ext-fun"),
                Sexp::atom(name.clone()),
                Sexp::atom(prototype.clone()),
            ]),
            GlobalItem::Var { name, visibility } => Sexp::list(vec![
                Sexp::atom("var"),
                Sexp::atom(name.clone()),
                Sexp::atom(visibility_tag(*visibility)),
            ]),
            GlobalItem::Fun {
                name,
                prototype,
                captures,
                body,
            } => Sexp::list(vec![
                Sexp::atom("fun"),
                Sexp::atom(name.clone()),
                Sexp::atom(prototype.clone()),
                Sexp::list(captures.iter().map(|c| Sexp::atom(c.clone())).collect()),
                body_to_sexp(body),
            ]),
            GlobalItem::Init { fun_ref } => {
                Sexp::list(vec![Sexp::atom("init"), Sexp::atom(fun_ref.to_string())])
            }
            GlobalItem::Macro {
                name,
                macro_type,
                precedence,
                body,
            } => Sexp::list(vec![
                Sexp::atom("macro"),
                Sexp::atom(name.clone()),
                Sexp::atom(macro_type.clone()),
                Sexp::atom(precedence.to_string()),
                body_to_sexp(body),
            ]),
            GlobalItem::Keysym { name } => Sexp::list(vec![Sexp::atom("keysym"), Sexp::atom(name.clone())]),
            GlobalItem::StructDef { name, fields } => Sexp::list(vec![
                Sexp::atom("struct-def"),
                Sexp::atom(name.clone()),
                Sexp::list(
                    fields
                        .iter()
                        .map(|(n, k)| Sexp::list(vec![Sexp::atom(n.clone()), Sexp::atom(k.clone())]))
                        .collect(),
                ),
            ]),
            GlobalItem::ImportAlias { alias, target } => Sexp::list(vec![
                Sexp::atom("import-alias"),
                Sexp::atom(alias.clone()),
                Sexp::atom(target.clone()),
            ]),
        }
    }

    pub fn from_sexp(s: &Sexp) -> Result<GlobalItem, PcodeError> {
        let items = s
            .as_list()
            .ok_or_else(|| PcodeError::Malformed("global item must be a list".into()))?;
        let (tag, rest) = items
            .split_first()
            .ok_or_else(|| PcodeError::Malformed("empty global item".into()))?;
        let tag = tag.as_atom().ok_or_else(|| PcodeError::Malformed("tag must be atom".into()))?;
        Ok(match tag {
            "src-pos" => GlobalItem::SrcPos(SrcPos {
                filename: atom_str(&rest[0])?,
                line: atom_u32(&rest[1])?,
                col: atom_u32(&rest[2])?,
            }),
            "ext-var" => GlobalItem::ExtVar { name: atom_str(&rest[0])? },
            "ext-fun" => GlobalItem::ExtFun {
                name: atom_str(&rest[0])?,
                prototype: atom_str(&rest[1])?,
            },
            "var" => GlobalItem::Var {
                name: atom_str(&rest[0])?,
                visibility: visibility_from_tag(&atom_str(&rest[1])?)?,
            },
            "fun" => GlobalItem::Fun {
                name: atom_str(&rest[0])?,
                prototype: atom_str(&rest[1])?,
                captures: rest[2]
                    .as_list()
                    .ok_or_else(|| PcodeError::Malformed("captures must be a list".into()))?
                    .iter()
                    .map(atom_str)
                    .collect::<Result<_, _>>()?,
                body: body_from_sexp(&rest[3])?,
            },
            "init" => GlobalItem::Init { fun_ref: atom_u32(&rest[0])? },
            "macro" => GlobalItem::Macro {
                name: atom_str(&rest[0])?,
                macro_type: atom_str(&rest[1])?,
                precedence: atom_u32(&rest[2])?,
                body: body_from_sexp(&rest[3])?,
            },
            "keysym" => GlobalItem::Keysym { name: atom_str(&rest[0])? },
            "struct-def" => GlobalItem::StructDef {
                name: atom_str(&rest[0])?,
                fields: rest[1]
                    .as_list()
                    .ok_or_else(|| PcodeError::Malformed("fields must be a list".into()))?
                    .iter()
                    .map(|f| {
                        let pair = f.as_list().ok_or_else(|| PcodeError::Malformed("field must be a pair".into()))?;
                        Ok((atom_str(&pair[0])?, atom_str(&pair[1])?))
                    })
                    .collect::<Result<_, PcodeError>>()?,
            },
            "import-alias" => GlobalItem::ImportAlias {
                alias: atom_str(&rest[0])?,
                target: atom_str(&rest[1])?,
            },
            other => return Err(PcodeError::Malformed(format!("unknown global tag {other:?}"))),
        })
    }
}

fn visibility_tag(v: Visibility) -> &'static str {
    match v {
        Visibility::Private => "private",
        Visibility::Internal => "internal",
        Visibility::Public => "public",
    }
}

fn visibility_from_tag(s: &str) -> Result<Visibility, PcodeError> {
    Ok(match s {
        "private" => Visibility::Private,
        "internal" => Visibility::Internal,
        "public" => Visibility::Public,
        other => return Err(PcodeError::Malformed(format!("unknown visibility {other:?}"))),
    })
}

pub fn serialize_program(program: &Program) -> String {
    program
        .items
        .iter()
        .map(|item| item.to_sexp().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn parse_program(text: &str) -> Result<Program, PcodeError> {
    let sexps = sexp::parse_many(text)?;
    let items = sexps.iter().map(GlobalItem::from_sexp).collect::<Result<_, _>>()?;
    Ok(Program { items })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcode::{Register, RegisterType};

    #[test]
    fn round_trips_constant_expression_program() {
        let d0 = Register::new(RegisterType::Data, 0);
        let program = Program {
            items: vec![
                GlobalItem::Var {
                    name: "m:Foo".into(),
                    visibility: Visibility::Public,
                },
                GlobalItem::Fun {
                    name: "m:init".into(),
                    prototype: "0".into(),
                    captures: vec![],
                    body: vec![
                        Instruction::LdImmInt { dst: d0, value: 13 },
                        Instruction::SetGlob { global: 0, src: d0 },
                        Instruction::Ret { value: None },
                    ],
                },
                GlobalItem::Init { fun_ref: 1 },
            ],
        };
        let text = serialize_program(&program);
        let parsed = parse_program(&text).unwrap();
        assert_eq!(parsed, program);
    }

    #[test]
    fn register_display_and_parse_round_trip() {
        let r = Register::new(RegisterType::Int, 2);
        assert_eq!(r.to_string(), "i2");
        assert_eq!(Register::from_str("i2").unwrap(), r);
    }
}
