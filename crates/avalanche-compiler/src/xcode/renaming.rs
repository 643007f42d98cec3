//! X-Code pass 4: register renaming. Each `(push, pop)` pair is
//! SSA-flattened into a position-independent identifier local to the
//! function so later dataflow passes can use one bitset per block. Var
//! registers keep their original indices, since a variable's identity must
//! outlive a single push/pop cycle.

use super::blocks::BasicBlock;
use crate::pcode::{Instruction, Register, RegisterType};
use std::collections::HashMap;

/// Renames every non-var register occurrence across `blocks` to a globally
/// unique index per (type, lexical occurrence), using a per-type counter
/// that advances on every `push`. Returns the highest index issued per
/// type, needed to size the φ-dataflow bitsets.
pub fn rename(blocks: &mut [BasicBlock]) -> HashMap<RegisterType, u32> {
    let mut next_id: HashMap<RegisterType, u32> = HashMap::new();
    let mut max_id: HashMap<RegisterType, u32> = HashMap::new();
    // Maps a block-local (type, stack depth at time of push) to its renamed id.
    let mut stacks: HashMap<RegisterType, Vec<u32>> = HashMap::new();

    let remap = |reg: Register, stacks: &HashMap<RegisterType, Vec<u32>>| -> Register {
        if reg.reg_type == RegisterType::Var {
            return reg;
        }
        match stacks.get(&reg.reg_type).and_then(|s| s.get(reg.index as usize)) {
            Some(id) => Register::new(reg.reg_type, *id),
            None => reg,
        }
    };

    for block in blocks.iter_mut() {
        for instr in block.instructions.iter_mut() {
            match instr {
                Instruction::Push(ty) => {
                    let id = next_id.entry(*ty).or_insert(0);
                    stacks.entry(*ty).or_default().push(*id);
                    max_id.entry(*ty).and_modify(|m| *m = (*m).max(*id)).or_insert(*id);
                    *id += 1;
                }
                Instruction::Pop(ty) => {
                    stacks.entry(*ty).or_default().pop();
                }
                other => rewrite_operands(other, &stacks, &remap),
            }
        }
    }
    max_id
}

fn rewrite_operands(
    instr: &mut Instruction,
    stacks: &HashMap<RegisterType, Vec<u32>>,
    remap: &impl Fn(Register, &HashMap<RegisterType, Vec<u32>>) -> Register,
) {
    macro_rules! r {
        ($reg:expr) => {
            *$reg = remap(*$reg, stacks)
        };
    }
    match instr {
        Instruction::LdImmInt { dst, .. } | Instruction::LdImmStr { dst, .. } => r!(dst),
        Instruction::LdReg { dst, src } => {
            r!(dst);
            r!(src);
        }
        Instruction::LdGlob { dst, .. } => r!(dst),
        Instruction::SetGlob { src, .. } => r!(src),
        Instruction::LEmpty { dst } => r!(dst),
        Instruction::LAppend { dst, list, value } => {
            r!(dst);
            r!(list);
            r!(value);
        }
        Instruction::LCat { dst, a, b } => {
            r!(dst);
            r!(a);
            r!(b);
        }
        Instruction::LHead { dst, list } | Instruction::LBehead { dst, list } | Instruction::LFlatten { dst, list } | Instruction::LLength { dst, list } => {
            r!(dst);
            r!(list);
        }
        Instruction::LIndex { dst, list, index } => {
            r!(dst);
            r!(list);
            r!(index);
        }
        Instruction::IAdd { dst, a, b } | Instruction::ICmp { dst, a, b } => {
            r!(dst);
            r!(a);
            r!(b);
        }
        Instruction::IAddImm { dst, a, .. } => {
            r!(dst);
            r!(a);
        }
        Instruction::Bool { dst, .. } => r!(dst),
        Instruction::CondBranch { cond, .. } => r!(cond),
        Instruction::InvokeSs { dst, args, .. } => {
            r!(dst);
            for a in args {
                r!(a);
            }
        }
        Instruction::InvokeSd { dst, args_start, .. } => {
            r!(dst);
            r!(args_start);
        }
        Instruction::InvokeDd { dst, function_reg, args_start, .. } => {
            r!(dst);
            r!(function_reg);
            r!(args_start);
        }
        Instruction::Partial { dst, bound_args, .. } => {
            r!(dst);
            for a in bound_args {
                r!(a);
            }
        }
        Instruction::Ret { value: Some(v) } => r!(v),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xcode::blocks::partition;

    #[test]
    fn sequential_push_pop_cycles_reuse_no_identity_across_cycles() {
        let body = vec![
            Instruction::Push(RegisterType::Data),
            Instruction::Pop(RegisterType::Data),
            Instruction::Push(RegisterType::Data),
            Instruction::Pop(RegisterType::Data),
        ];
        let mut blocks = partition(&body).unwrap();
        let max = rename(&mut blocks);
        assert_eq!(*max.get(&RegisterType::Data).unwrap(), 1);
    }

    #[test]
    fn var_registers_are_never_renamed() {
        let v0 = Register::new(RegisterType::Var, 0);
        let body = vec![Instruction::LdGlob { dst: v0, global: 0 }];
        let mut blocks = partition(&body).unwrap();
        rename(&mut blocks);
        assert_eq!(blocks[0].instructions[0], Instruction::LdGlob { dst: v0, global: 0 });
    }
}
