//! X-Code pass 3: block linking. Each block gets up to `N_SUCC` successors
//! (fallthrough, explicit jump, exception landing pad) and jump targets are
//! rewritten from label indices to block indices.

use super::blocks::BasicBlock;
use crate::pcode::Instruction;
use std::collections::HashMap;

pub const N_SUCC: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct Successors {
    pub fallthrough: Option<u32>,
    pub jump: Option<u32>,
    pub landing_pad: Option<u32>,
}

impl Successors {
    pub fn as_vec(&self) -> Vec<u32> {
        [self.fallthrough, self.jump, self.landing_pad]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[derive(Debug)]
pub struct LinkError(pub String);

/// Rewrites each block's jump-carrying instructions in place (label index ->
/// block index, via the "with-field" combinator) and returns one
/// [`Successors`] per block, indexed the same way as `blocks`.
pub fn link(blocks: &mut [BasicBlock], landing_pads: &HashMap<u32, u32>) -> Result<Vec<Successors>, LinkError> {
    let block_of_label: HashMap<u32, u32> = blocks
        .iter()
        .enumerate()
        .filter_map(|(i, b)| b.label.map(|l| (l, i as u32)))
        .collect();

    let resolve = |label: u32| -> Result<u32, LinkError> {
        block_of_label
            .get(&label)
            .copied()
            .ok_or_else(|| LinkError(format!("jump target label {label} does not exist")))
    };

    let mut result = Vec::with_capacity(blocks.len());
    for (i, block) in blocks.iter_mut().enumerate() {
        let mut succ = Successors::default();

        for instr in block.instructions.iter_mut() {
            if let Some(label) = instr.branch_target() {
                let target_block = resolve(label)?;
                *instr = instr.with_branch_target(target_block);
            }
        }

        let last = block.instructions.last();
        let is_terminal = last.map(|i| i.is_terminal()).unwrap_or(false);
        if !is_terminal {
            succ.fallthrough = (i + 1 < blocks.len()).then(|| (i + 1) as u32);
        }
        if let Some(target) = last.and_then(|i| i.branch_target()) {
            succ.jump = Some(target);
        }
        if last.map(|i| i.may_throw()).unwrap_or(false) {
            if let Some(pad_label) = landing_pads.get(&(i as u32)) {
                succ.landing_pad = Some(resolve(*pad_label)?);
            }
        }

        result.push(succ);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xcode::blocks::partition;

    #[test]
    fn fallthrough_links_to_next_block() {
        let body = vec![Instruction::Label(0), Instruction::Label(1)];
        let mut blocks = partition(&body).unwrap();
        let succ = link(&mut blocks, &HashMap::new()).unwrap();
        assert_eq!(succ[0].fallthrough, Some(1));
    }

    #[test]
    fn branch_target_is_rewritten_to_block_index() {
        let body = vec![
            Instruction::Branch { target: 7 },
            Instruction::Label(7),
            Instruction::Ret { value: None },
        ];
        let mut blocks = partition(&body).unwrap();
        let succ = link(&mut blocks, &HashMap::new()).unwrap();
        assert_eq!(succ[0].jump, Some(1));
        assert!(matches!(blocks[0].instructions[0], Instruction::Branch { target: 1 }));
    }

    #[test]
    fn unresolved_label_is_an_error() {
        let body = vec![Instruction::Branch { target: 99 }];
        let mut blocks = partition(&body).unwrap();
        assert!(link(&mut blocks, &HashMap::new()).is_err());
    }
}
