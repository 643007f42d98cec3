//! X-Code passes 1-2: block partitioning and register-count tallying.

use crate::pcode::Instruction;
use std::collections::HashMap;

/// One basic block: its instructions (still carrying label-indexed jump
/// targets; [`super::linking`] rewrites these to block indices) plus the
/// register-stack height on entry, recorded per type.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: Option<u32>,
    pub instructions: Vec<Instruction>,
    pub entry_heights: HashMap<crate::pcode::RegisterType, u32>,
    pub exit_heights: HashMap<crate::pcode::RegisterType, u32>,
}

#[derive(Debug)]
pub struct PartitionError(pub String);

/// Splits a flat instruction stream into basic blocks: a new block starts
/// at each `label` and immediately after any terminal or throwing
/// instruction. Duplicate labels are an error.
pub fn partition(body: &[Instruction]) -> Result<Vec<BasicBlock>, PartitionError> {
    let mut blocks = Vec::new();
    let mut seen_labels = std::collections::HashSet::new();
    let mut current_label = None;
    let mut current: Vec<Instruction> = Vec::new();

    let flush = |label: Option<u32>, instrs: Vec<Instruction>, out: &mut Vec<BasicBlock>| {
        if !instrs.is_empty() || label.is_some() {
            out.push(BasicBlock {
                label,
                instructions: instrs,
                entry_heights: HashMap::new(),
                exit_heights: HashMap::new(),
            });
        }
    };

    for instr in body {
        if let Instruction::Label(id) = instr {
            if !seen_labels.insert(*id) {
                return Err(PartitionError(format!("duplicate label {id}")));
            }
            flush(current_label.take(), std::mem::take(&mut current), &mut blocks);
            current_label = Some(*id);
            continue;
        }
        let was_terminal_or_throw = current
            .last()
            .map(|prev| prev.is_terminal() || prev.may_throw())
            .unwrap_or(false);
        if was_terminal_or_throw {
            flush(current_label.take(), std::mem::take(&mut current), &mut blocks);
        }
        current.push(instr.clone());
    }
    flush(current_label, current, &mut blocks);
    Ok(blocks)
}

#[derive(Debug)]
pub struct TallyError(pub String);

type Heights = HashMap<crate::pcode::RegisterType, u32>;

/// Advances `heights` through one block's pushes/pops only, with no
/// range validation. Used during the fixed-point join below, where
/// intermediate entry heights for a loop body are not yet final and
/// would otherwise report spurious out-of-range errors.
fn simulate(heights: &Heights, block: &BasicBlock) -> Heights {
    let mut h = heights.clone();
    for instr in &block.instructions {
        match instr {
            Instruction::Push(ty) => {
                *h.entry(*ty).or_insert(0) += 1;
            }
            Instruction::Pop(ty) => {
                let e = h.entry(*ty).or_insert(0);
                *e = e.saturating_sub(1);
            }
            _ => {}
        }
    }
    h
}

/// Replays one block's instructions against final, stable entry heights,
/// validating every push/pop and register reference.
fn validate_block(heights: &Heights, block: &BasicBlock) -> Result<Heights, TallyError> {
    let mut h = heights.clone();
    for instr in &block.instructions {
        match instr {
            Instruction::Push(ty) => {
                *h.entry(*ty).or_insert(0) += 1;
            }
            Instruction::Pop(ty) => {
                let e = h.entry(*ty).or_insert(0);
                if *e == 0 {
                    return Err(TallyError(format!("pop of {ty:?} below zero height")));
                }
                *e -= 1;
            }
            _ => {}
        }
        for reg in instr.reads().into_iter().chain(instr.writes()) {
            if reg.reg_type == crate::pcode::RegisterType::Var {
                continue;
            }
            let height = *h.get(&reg.reg_type).unwrap_or(&0);
            if reg.index >= height {
                return Err(TallyError(format!(
                    "register {reg} referenced out of the current stack height ({height})"
                )));
            }
        }
    }
    Ok(h)
}

/// Tracks per-type stack height across the whole function via a
/// per-predecessor CFG join: a block's entry height is the height its
/// predecessors all agree on exiting with, found by fixed-point
/// iteration over [`super::linking::Successors`] (same shape as
/// [`super::exceptions::infer`]). A block reached by two predecessors
/// that disagree on height is a hard error, since that is exactly the
/// mismatch-across-a-branch-merge this pass exists to catch. Every
/// non-var stack must end the function at height 0 at every block with
/// no successors.
pub fn tally_heights(blocks: &mut [BasicBlock], successors: &[super::linking::Successors]) -> Result<(), TallyError> {
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); blocks.len()];
    for (i, succ) in successors.iter().enumerate() {
        for s in succ.as_vec() {
            preds[s as usize].push(i);
        }
    }

    let mut entry: Vec<Heights> = vec![Heights::new(); blocks.len()];
    let mut exit: Vec<Heights> = vec![Heights::new(); blocks.len()];

    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..blocks.len() {
            if !preds[i].is_empty() {
                let mut candidate: Option<Heights> = None;
                for &p in &preds[i] {
                    match &candidate {
                        None => candidate = Some(exit[p].clone()),
                        Some(existing) if *existing != exit[p] => {
                            return Err(TallyError(format!(
                                "block {i} inherits inconsistent register-stack heights from its predecessors"
                            )));
                        }
                        Some(_) => {}
                    }
                }
                let candidate = candidate.unwrap();
                if candidate != entry[i] {
                    entry[i] = candidate;
                    changed = true;
                }
            }
            let computed_exit = simulate(&entry[i], &blocks[i]);
            if computed_exit != exit[i] {
                exit[i] = computed_exit;
                changed = true;
            }
        }
    }

    for (i, block) in blocks.iter_mut().enumerate() {
        let validated_exit = validate_block(&entry[i], block)?;
        block.entry_heights = entry[i].clone();
        block.exit_heights = validated_exit;
    }

    for (i, succ) in successors.iter().enumerate() {
        if succ.as_vec().is_empty() {
            for (ty, h) in &blocks[i].exit_heights {
                if *ty != crate::pcode::RegisterType::Var && *h != 0 {
                    return Err(TallyError(format!(
                        "function ends with non-zero {ty:?} stack height ({h}) at block {i}"
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcode::{Register, RegisterType};
    use crate::xcode::linking::{self, Successors};

    #[test]
    fn partitions_on_label_and_terminal() {
        let d0 = Register::new(RegisterType::Data, 0);
        let body = vec![
            Instruction::LdImmInt { dst: d0, value: 1 },
            Instruction::Ret { value: Some(d0) },
            Instruction::Label(0),
            Instruction::Ret { value: None },
        ];
        let blocks = partition(&body).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].label, Some(0));
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let body = vec![Instruction::Label(0), Instruction::Label(0)];
        assert!(partition(&body).is_err());
    }

    #[test]
    fn pop_below_zero_height_is_an_error() {
        let d0 = Register::new(RegisterType::Data, 0);
        let mut blocks = vec![BasicBlock {
            label: None,
            instructions: vec![Instruction::Pop(RegisterType::Data)],
            entry_heights: HashMap::new(),
            exit_heights: HashMap::new(),
        }];
        let _ = d0;
        let succ = vec![Successors::default()];
        assert!(tally_heights(&mut blocks, &succ).is_err());
    }

    #[test]
    fn balanced_push_pop_ends_at_zero_height() {
        let mut blocks = vec![BasicBlock {
            label: None,
            instructions: vec![Instruction::Push(RegisterType::Data), Instruction::Pop(RegisterType::Data)],
            entry_heights: HashMap::new(),
            exit_heights: HashMap::new(),
        }];
        let succ = vec![Successors::default()];
        assert!(tally_heights(&mut blocks, &succ).is_ok());
    }

    #[test]
    fn branch_merge_with_mismatched_heights_is_an_error() {
        // Block B pushes a Data register before jumping to the merge block;
        // block C jumps to the same merge block having pushed nothing. The
        // merge block's two predecessors disagree on Data height.
        let i0 = Register::new(RegisterType::Int, 0);
        let body = vec![
            Instruction::Push(RegisterType::Int),
            Instruction::CondBranch { cond: i0, target: 10 },
            Instruction::Label(1),
            Instruction::Push(RegisterType::Data),
            Instruction::Branch { target: 2 },
            Instruction::Label(10),
            Instruction::Branch { target: 2 },
            Instruction::Label(2),
            Instruction::Pop(RegisterType::Data),
            Instruction::Ret { value: None },
        ];
        let mut blocks = partition(&body).unwrap();
        let succ = linking::link(&mut blocks, &HashMap::new()).unwrap();
        assert!(tally_heights(&mut blocks, &succ).is_err());
    }
}
