//! X-Code pass 7: φ-dataflow initialisation check. Per block, tracks which
//! renamed registers are in scope and which are definitely initialised at
//! entry/exit, converging to a fixed point, then checks every instruction's
//! reads against the converged initialisation set.

use super::blocks::BasicBlock;
use super::linking::Successors;
use crate::pcode::{Register, RegisterType};
use std::collections::HashSet;

#[derive(Debug, Default, Clone)]
struct BlockFacts {
    iexist: HashSet<Register>,
    oexist: HashSet<Register>,
    effect: HashSet<Register>,
    iinit: HashSet<Register>,
    oinit: HashSet<Register>,
}

#[derive(Debug)]
pub struct PhiError(pub String);

/// Runs the fixed point and reports the first uninitialised read found in
/// block order, one diagnostic per occurrence (collected, not just the
/// first, so the caller can push every one into the shared error list).
pub fn check(blocks: &[BasicBlock], successors: &[Successors]) -> Vec<PhiError> {
    let n = blocks.len();
    let mut facts: Vec<BlockFacts> = (0..n)
        .map(|i| {
            let mut f = BlockFacts::default();
            for reg in all_registers(blocks[i].instructions.iter().flat_map(|ins| ins.reads().into_iter().chain(ins.writes()))) {
                f.oexist.insert(reg);
                f.iexist.insert(reg);
            }
            for ins in &blocks[i].instructions {
                for w in ins.writes() {
                    f.effect.insert(w);
                }
            }
            f
        })
        .collect();

    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, succ) in successors.iter().enumerate() {
        for s in succ.as_vec() {
            preds[s as usize].push(i);
        }
    }

    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..n {
            let new_iinit: HashSet<Register> = if preds[i].is_empty() {
                HashSet::new()
            } else {
                let mut iter = preds[i].iter();
                let first = *iter.next().unwrap();
                let mut acc = facts[first].oinit.clone();
                for &p in iter {
                    acc = acc.intersection(&facts[p].oinit).cloned().collect();
                }
                acc
            };
            if new_iinit != facts[i].iinit {
                facts[i].iinit = new_iinit;
                changed = true;
            }
            let new_oinit: HashSet<Register> = facts[i]
                .effect
                .union(&facts[i].iinit)
                .cloned()
                .collect::<HashSet<_>>()
                .intersection(&facts[i].oexist)
                .cloned()
                .collect();
            if new_oinit != facts[i].oinit {
                facts[i].oinit = new_oinit;
                changed = true;
            }
        }
    }

    let mut errors = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        let mut live = facts[i].iinit.clone();
        for instr in &block.instructions {
            for r in instr.reads() {
                if r.reg_type != RegisterType::Var && !live.contains(&r) {
                    errors.push(PhiError(format!("read of uninitialised register {r} in block {i}")));
                }
            }
            for w in instr.writes() {
                live.insert(w);
            }
        }
    }
    errors
}

fn all_registers(it: impl Iterator<Item = Register>) -> HashSet<Register> {
    it.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcode::Instruction;
    use crate::xcode::blocks::partition;
    use crate::xcode::linking::link;
    use std::collections::HashMap;

    #[test]
    fn read_after_write_is_initialised() {
        let d0 = Register::new(RegisterType::Data, 0);
        let body = vec![
            Instruction::Push(RegisterType::Data),
            Instruction::LdImmInt { dst: d0, value: 1 },
            Instruction::Ret { value: Some(d0) },
        ];
        let mut blocks = partition(&body).unwrap();
        let succ = link(&mut blocks, &HashMap::new()).unwrap();
        assert!(check(&blocks, &succ).is_empty());
    }

    #[test]
    fn read_before_any_write_is_flagged() {
        let d0 = Register::new(RegisterType::Data, 0);
        let body = vec![Instruction::Push(RegisterType::Data), Instruction::Ret { value: Some(d0) }];
        let mut blocks = partition(&body).unwrap();
        let succ = link(&mut blocks, &HashMap::new()).unwrap();
        assert_eq!(check(&blocks, &succ).len(), 1);
    }
}
