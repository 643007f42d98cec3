//! Codegen context (C9): per-function state threaded through AST
//! `cg_*` operations — register-stack height tracking, the label generator,
//! current-source-location de-duplication, and the jump-protection stack
//! used by `try`/`finally`/`defer`.

use crate::cgerror::CodeGenError;
use crate::error::SourceLocation;
use crate::pcode::builder::ExecutableBuilder;
use crate::pcode::{Instruction, Register, RegisterType};
use std::collections::HashMap;

/// A jump-protection entry. `OnExit` runs cleanup code when control leaves
/// its region via `goto`/`ret`/loop control; `Barrier` rejects any attempt
/// to transfer control out of its region (the `finally`-block invariant:
/// "jump out of finally").
pub enum Jprot {
    OnExit { cleanup_label: u32 },
    Barrier { reason: &'static str },
}

pub struct CodegenContext {
    builder: ExecutableBuilder,
    heights: HashMap<RegisterType, u32>,
    next_label: u32,
    current_location: Option<SourceLocation>,
    jprot_stack: Vec<Jprot>,
    /// Innermost-last stack of the `catch` labels currently in scope, set
    /// by `try`/`catch` codegen ([`astnode::TryCatch`]).
    try_stack: Vec<u32>,
    /// One entry per instruction emitted via [`Self::emit_throwing`], in
    /// emission order: the active landing pad at that point, if any. The
    /// caller zips this against [`crate::xcode::blocks::partition`]'s
    /// throwing-block boundaries to build a real `landing_pads` map.
    throw_sites: Vec<Option<u32>>,
}

impl CodegenContext {
    pub fn new() -> Self {
        CodegenContext {
            builder: ExecutableBuilder::new(),
            heights: HashMap::new(),
            next_label: 0,
            current_location: None,
            jprot_stack: Vec::new(),
            try_stack: Vec::new(),
            throw_sites: Vec::new(),
        }
    }

    pub fn push_try(&mut self, catch_label: u32) {
        self.try_stack.push(catch_label);
    }

    pub fn pop_try(&mut self) -> Option<u32> {
        self.try_stack.pop()
    }

    /// Emits a may-throw instruction, recording the currently active
    /// `try` landing pad (if any) alongside it for later derivation of
    /// the function's `landing_pads` map.
    pub fn emit_throwing(&mut self, instr: Instruction) {
        debug_assert!(instr.may_throw(), "emit_throwing called with a non-throwing instruction");
        self.throw_sites.push(self.try_stack.last().copied());
        self.builder.emit(instr);
    }

    /// Takes the accumulated throw-site list, leaving it empty. Call
    /// before [`Self::finish`] consumes `self`.
    pub fn take_throw_sites(&mut self) -> Vec<Option<u32>> {
        std::mem::take(&mut self.throw_sites)
    }

    pub fn genlabel(&mut self) -> u32 {
        let l = self.next_label;
        self.next_label += 1;
        l
    }

    pub fn height(&self, reg_type: RegisterType) -> u32 {
        *self.heights.get(&reg_type).unwrap_or(&0)
    }

    /// Pushes a fresh register of `reg_type`, returning it. Var registers
    /// are excluded from stack-height bookkeeping; they are named, not
    /// pushed/popped.
    pub fn push_reg(&mut self, reg_type: RegisterType) -> Register {
        if reg_type == RegisterType::Var {
            panic!("var registers are not pushed/popped");
        }
        let h = self.heights.entry(reg_type).or_insert(0);
        let r = Register::new(reg_type, *h);
        *h += 1;
        self.builder.emit(Instruction::Push(reg_type));
        r
    }

    pub fn pop_reg(&mut self, reg_type: RegisterType) -> Result<(), CodeGenError> {
        let h = self.heights.entry(reg_type).or_insert(0);
        if *h == 0 {
            return Err(CodeGenError::Logic(format!(
                "register stack underflow popping {reg_type:?}"
            )));
        }
        *h -= 1;
        self.builder.emit(Instruction::Pop(reg_type));
        Ok(())
    }

    /// Emits `instr`, first emitting a `src-pos`-equivalent marker via
    /// `set_location` when the location differs from the last one emitted.
    /// P-Code itself has no per-instruction location field here (locations
    /// live in the `src-pos` global item); this only tracks de-duplication
    /// for callers that attach diagnostics to the current instruction.
    pub fn set_location(&mut self, location: &SourceLocation) -> bool {
        let changed = self.current_location.as_ref() != Some(location);
        if changed {
            self.current_location = Some(location.clone());
        }
        changed
    }

    pub fn emit(&mut self, instr: Instruction) {
        self.builder.emit(instr);
    }

    pub fn label(&mut self, label: u32) {
        self.builder.emit(Instruction::Label(label));
    }

    pub fn push_jprot(&mut self, entry: Jprot) {
        self.jprot_stack.push(entry);
    }

    pub fn pop_jprot(&mut self) -> Option<Jprot> {
        self.jprot_stack.pop()
    }

    /// Checks an attempted transfer of control against every jprot entry
    /// currently in scope, innermost first. Any `Barrier` in the way is a
    /// hard error (`jump out of finally`); `OnExit` entries are returned so
    /// the caller can splice in their cleanup before the real jump.
    pub fn check_jump_out(&self) -> Result<Vec<u32>, CodeGenError> {
        let mut cleanups = Vec::new();
        for entry in self.jprot_stack.iter().rev() {
            match entry {
                Jprot::Barrier { reason } => {
                    return Err(CodeGenError::Logic(format!("jump out of {reason}")));
                }
                Jprot::OnExit { cleanup_label } => cleanups.push(*cleanup_label),
            }
        }
        Ok(cleanups)
    }

    pub fn finish(self) -> Vec<Instruction> {
        self.builder.finish()
    }
}

impl Default for CodegenContext {
    fn default() -> Self {
        CodegenContext::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_balances_height() {
        let mut cx = CodegenContext::new();
        cx.push_reg(RegisterType::Data);
        cx.push_reg(RegisterType::Data);
        assert_eq!(cx.height(RegisterType::Data), 2);
        cx.pop_reg(RegisterType::Data).unwrap();
        assert_eq!(cx.height(RegisterType::Data), 1);
    }

    #[test]
    fn pop_below_zero_is_an_error() {
        let mut cx = CodegenContext::new();
        assert!(cx.pop_reg(RegisterType::Data).is_err());
    }

    #[test]
    fn genlabel_is_monotonic() {
        let mut cx = CodegenContext::new();
        assert_eq!(cx.genlabel(), 0);
        assert_eq!(cx.genlabel(), 1);
    }

    #[test]
    fn barrier_rejects_jump_out_of_finally() {
        let mut cx = CodegenContext::new();
        cx.push_jprot(Jprot::Barrier { reason: "finally" });
        assert!(cx.check_jump_out().is_err());
    }

    #[test]
    fn throw_sites_record_the_active_try_landing_pad() {
        let mut cx = CodegenContext::new();
        let d0 = Register::new(RegisterType::Data, 0);
        cx.emit_throwing(Instruction::InvokeSs { dst: d0, function_global: 0, args: vec![] });
        cx.push_try(7);
        cx.emit_throwing(Instruction::InvokeSs { dst: d0, function_global: 0, args: vec![] });
        cx.pop_try();
        assert_eq!(cx.take_throw_sites(), vec![None, Some(7)]);
    }

    #[test]
    fn on_exit_entries_are_collected_innermost_first() {
        let mut cx = CodegenContext::new();
        cx.push_jprot(Jprot::OnExit { cleanup_label: 1 });
        cx.push_jprot(Jprot::OnExit { cleanup_label: 2 });
        assert_eq!(cx.check_jump_out().unwrap(), vec![2, 1]);
    }
}
