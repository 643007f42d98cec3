//! X-Code passes 5-6: exception-stack inference and validation.

use super::blocks::BasicBlock;
use super::linking::Successors;
use crate::pcode::Instruction;

/// The exception-handling state at a block boundary: current caught-depth,
/// the innermost landing-pad block (if any), and whether this frame is
/// cleanup-only (a `finally`, entered only via unwind).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionStack {
    pub depth: u32,
    pub landing_pad: Option<u32>,
    pub cleanup_only: bool,
}

impl ExceptionStack {
    pub fn empty() -> Self {
        ExceptionStack {
            depth: 0,
            landing_pad: None,
            cleanup_only: false,
        }
    }
}

#[derive(Debug)]
pub struct ExceptionError(pub String);

/// Walks blocks to a fixed point (ascending block index per iteration, per
/// §5's determinism rule), inferring each block's entry exception stack
/// from its predecessors. A `try landing_pad` instruction pushes; `yrt`
/// and `rethrow` pop. Successors must inherit a consistent stack; a
/// mismatch is an error.
pub fn infer(blocks: &[BasicBlock], successors: &[Successors]) -> Result<Vec<ExceptionStack>, ExceptionError> {
    let mut entry = vec![ExceptionStack::empty(); blocks.len()];
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); blocks.len()];
    for (i, succ) in successors.iter().enumerate() {
        for s in succ.as_vec() {
            preds[s as usize].push(i);
        }
    }

    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..blocks.len() {
            if preds[i].is_empty() {
                continue;
            }
            let mut candidate: Option<ExceptionStack> = None;
            for &p in &preds[i] {
                let exit = exit_stack(&entry[p], &blocks[p])?;
                match &candidate {
                    None => candidate = Some(exit),
                    Some(existing) if *existing != exit => {
                        return Err(ExceptionError(format!(
                            "block {i} inherits inconsistent exception stacks from its predecessors"
                        )));
                    }
                    Some(_) => {}
                }
            }
            if let Some(candidate) = candidate
                && candidate != entry[i]
            {
                entry[i] = candidate;
                changed = true;
            }
        }
    }

    // A fixed-point over predecessor-reachable blocks never revisits a
    // block with no predecessors (e.g. the entry block); walk every block
    // once more so an underflowing `yrt`/`rethrow` is always caught.
    for (i, block) in blocks.iter().enumerate() {
        exit_stack(&entry[i], block)?;
    }
    Ok(entry)
}

fn exit_stack(entry: &ExceptionStack, block: &BasicBlock) -> Result<ExceptionStack, ExceptionError> {
    let mut stack = entry.clone();
    for instr in &block.instructions {
        match instr {
            Instruction::Try { landing_pad } => {
                stack = ExceptionStack {
                    depth: stack.depth + 1,
                    landing_pad: Some(*landing_pad),
                    cleanup_only: false,
                };
            }
            Instruction::Yrt | Instruction::Rethrow => {
                if stack.depth == 0 {
                    return Err(ExceptionError("yrt/rethrow with no enclosing try".into()));
                }
                stack.depth -= 1;
            }
            _ => {}
        }
    }
    Ok(stack)
}

/// Validates `require-empty-exception` and `require-caught-exception`
/// against the inferred entry stacks, and that the final block ends with
/// an empty exception stack (or terminates).
pub fn validate(blocks: &[BasicBlock], entry_stacks: &[ExceptionStack]) -> Result<(), ExceptionError> {
    for (i, block) in blocks.iter().enumerate() {
        let mut stack = entry_stacks[i].clone();
        for instr in &block.instructions {
            match instr {
                Instruction::RequireEmptyException if stack.depth != 0 => {
                    return Err(ExceptionError("require-empty-exception failed".into()));
                }
                Instruction::RequireCaughtException if stack.depth == 0 => {
                    return Err(ExceptionError("require-caught-exception failed".into()));
                }
                Instruction::Try { landing_pad } => {
                    stack = ExceptionStack {
                        depth: stack.depth + 1,
                        landing_pad: Some(*landing_pad),
                        cleanup_only: false,
                    };
                }
                Instruction::Yrt | Instruction::Rethrow => stack.depth = stack.depth.saturating_sub(1),
                _ => {}
            }
        }
        let is_last = i + 1 == blocks.len();
        let terminates = block.instructions.last().map(|i| i.is_terminal()).unwrap_or(false);
        if is_last && !terminates && stack.depth != 0 {
            return Err(ExceptionError("function ends with a non-empty exception stack".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xcode::blocks::partition;
    use crate::xcode::linking::link;
    use std::collections::HashMap;

    #[test]
    fn yrt_without_try_is_an_error() {
        let body = vec![Instruction::Yrt, Instruction::Ret { value: None }];
        let mut blocks = partition(&body).unwrap();
        let succ = link(&mut blocks, &HashMap::new()).unwrap();
        assert!(infer(&blocks, &succ).is_err());
    }

    #[test]
    fn require_empty_exception_fails_inside_try() {
        let body = vec![
            Instruction::Try { landing_pad: 0 },
            Instruction::RequireEmptyException,
            Instruction::Yrt,
            Instruction::Ret { value: None },
            Instruction::Label(0),
            Instruction::Rethrow,
        ];
        let mut blocks = partition(&body).unwrap();
        let succ = link(&mut blocks, &HashMap::new()).unwrap();
        let entry = infer(&blocks, &succ).unwrap();
        assert!(validate(&blocks, &entry).is_err());
    }
}
