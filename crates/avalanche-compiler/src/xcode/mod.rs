//! X-Code structurer/validator (C8): turns one P-Code function body into a
//! graph of basic blocks with dataflow facts, running the eight passes in
//! §4.8. Each pass assumes the previous passes' invariants hold, so the
//! pipeline stops at the first failing pass.

pub mod blocks;
pub mod exceptions;
pub mod linking;
pub mod phi;
pub mod renaming;
pub mod xref;

use crate::error::{ErrorList, SourceLocation};
use crate::pcode::{Instruction, Program};
use blocks::BasicBlock;
use linking::Successors;
use std::collections::HashMap;

pub struct XFunction {
    pub blocks: Vec<BasicBlock>,
    pub successors: Vec<Successors>,
    pub exception_stacks: Vec<exceptions::ExceptionStack>,
}

/// Runs passes 1-8 against one function body, landing every failure into
/// `errors` at `location`. Returns `None` once a pass fails, since later
/// passes assume earlier invariants (§4.8's stated failure mode).
pub fn validate_function(
    program: &Program,
    body: &[Instruction],
    landing_pads: &HashMap<u32, u32>,
    errors: &mut ErrorList,
    location: &SourceLocation,
) -> Option<XFunction> {
    let mut blocks = match blocks::partition(body) {
        Ok(b) => b,
        Err(e) => {
            errors.push(e.0, location.clone());
            return None;
        }
    };

    let successors = match linking::link(&mut blocks, landing_pads) {
        Ok(s) => s,
        Err(e) => {
            errors.push(e.0, location.clone());
            return None;
        }
    };

    if let Err(e) = blocks::tally_heights(&mut blocks, &successors) {
        errors.push(e.0, location.clone());
        return None;
    }

    renaming::rename(&mut blocks);

    let exception_stacks = match exceptions::infer(&blocks, &successors) {
        Ok(s) => s,
        Err(e) => {
            errors.push(e.0, location.clone());
            return None;
        }
    };
    if let Err(e) = exceptions::validate(&blocks, &exception_stacks) {
        errors.push(e.0, location.clone());
        return None;
    }

    let phi_errors = phi::check(&blocks, &successors);
    if !phi_errors.is_empty() {
        for e in phi_errors {
            errors.push(e.0, location.clone());
        }
        return None;
    }

    let xref_errors = xref::validate(program, body);
    if !xref_errors.is_empty() {
        for e in xref_errors {
            errors.push(e.0, location.clone());
        }
        return None;
    }

    Some(XFunction {
        blocks,
        successors,
        exception_stacks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcode::{Register, RegisterType};

    #[test]
    fn well_formed_function_validates_cleanly() {
        let program = Program::new();
        let d0 = Register::new(RegisterType::Data, 0);
        let body = vec![
            Instruction::Push(RegisterType::Data),
            Instruction::LdImmInt { dst: d0, value: 42 },
            Instruction::Pop(RegisterType::Data),
            Instruction::Ret { value: None },
        ];
        let mut errors = ErrorList::new();
        let loc = SourceLocation::new("m.ava", "f", 1, 1);
        let result = validate_function(&program, &body, &HashMap::new(), &mut errors, &loc);
        assert!(result.is_some());
        assert!(errors.is_empty());
    }

    #[test]
    fn unbalanced_stack_height_fails_and_stops_the_pipeline() {
        let program = Program::new();
        let body = vec![Instruction::Push(RegisterType::Data), Instruction::Ret { value: None }];
        let mut errors = ErrorList::new();
        let loc = SourceLocation::new("m.ava", "f", 1, 1);
        let result = validate_function(&program, &body, &HashMap::new(), &mut errors, &loc);
        assert!(result.is_none());
        assert_eq!(errors.len(), 1);
    }
}
