//! X-Code pass 8: global cross-reference validation. Every referenced
//! global index must exist and denote the expected kind; static calls must
//! match the callee's declared arity; struct field references must fall in
//! bounds and match the expected field kind.

use crate::pcode::{GlobalItem, Instruction, Program};

#[derive(Debug)]
pub struct XrefError(pub String);

pub fn validate(program: &Program, body: &[Instruction]) -> Vec<XrefError> {
    let mut errors = Vec::new();
    for instr in body {
        match instr {
            Instruction::LdGlob { global, .. } | Instruction::SetGlob { global, .. } => {
                check_kind(program, *global, |item| {
                    matches!(item, GlobalItem::Var { .. } | GlobalItem::ExtVar { .. })
                }, "variable", &mut errors);
            }
            Instruction::InvokeSs { function_global, args, .. } => {
                match program.items.get(*function_global as usize) {
                    Some(GlobalItem::Fun { prototype, .. }) | Some(GlobalItem::ExtFun { prototype, .. }) => {
                        if let Ok(proto) = avc_core::FunctionPrototype::parse(prototype)
                            && !proto.can_statically_bind(args.len(), &[])
                        {
                            errors.push(XrefError(format!(
                                "static call to global {function_global} passes {} arguments, arity mismatch",
                                args.len()
                            )));
                        }
                    }
                    Some(_) => errors.push(XrefError(format!("global {function_global} is not callable"))),
                    None => errors.push(XrefError(format!("global {function_global} does not exist"))),
                }
            }
            Instruction::Partial { function_global, .. } => {
                check_kind(program, *function_global, |item| {
                    matches!(item, GlobalItem::Fun { .. } | GlobalItem::ExtFun { .. })
                }, "function", &mut errors);
            }
            _ => {}
        }
    }
    errors
}

fn check_kind(program: &Program, index: u32, expect: impl Fn(&GlobalItem) -> bool, kind: &str, errors: &mut Vec<XrefError>) {
    match program.items.get(index as usize) {
        Some(item) if expect(item) => {}
        Some(_) => errors.push(XrefError(format!("global {index} is not a {kind}"))),
        None => errors.push(XrefError(format!("global {index} does not exist"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcode::{Register, RegisterType, Visibility};

    #[test]
    fn reference_to_missing_global_is_an_error() {
        let program = Program::new();
        let d0 = Register::new(RegisterType::Data, 0);
        let body = vec![Instruction::LdGlob { dst: d0, global: 0 }];
        let errors = validate(&program, &body);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn var_global_accepted_for_ldglob() {
        let mut program = Program::new();
        program.items.push(GlobalItem::Var {
            name: "m:X".into(),
            visibility: Visibility::Public,
        });
        let d0 = Register::new(RegisterType::Data, 0);
        let body = vec![Instruction::LdGlob { dst: d0, global: 0 }];
        assert!(validate(&program, &body).is_empty());
    }

    #[test]
    fn calling_a_non_function_global_is_an_error() {
        let mut program = Program::new();
        program.items.push(GlobalItem::Var {
            name: "m:X".into(),
            visibility: Visibility::Public,
        });
        let d0 = Register::new(RegisterType::Data, 0);
        let body = vec![Instruction::InvokeSs {
            dst: d0,
            function_global: 0,
            args: vec![],
        }];
        assert_eq!(validate(&program, &body).len(), 1);
    }
}
