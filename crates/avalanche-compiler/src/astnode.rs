//! AST node framework (C5): a polymorphic node type whose vtable operations
//! are individually optional. Each unimplemented operation has a specific
//! default ("does not produce a value", "is pure but would discard", ...)
//! rather than aborting compilation, matching the accumulate-and-continue
//! error-handling design (§7).

use crate::cgctx::CodegenContext;
use crate::cgerror::CodeGenError;
use crate::error::{ErrorList, SourceLocation};
use crate::parseunit::Statement;
use crate::pcode::{Instruction, Register, RegisterType};
use crate::symtab::SymbolTable;
use crate::varscope::Varscope;
use std::cell::RefCell;
use std::rc::Rc;

pub type NodeRef = Rc<dyn AstNode>;

#[derive(Debug, Clone, PartialEq)]
pub enum ConstExpr {
    Int(i64),
    Str(String),
}

/// State threaded through `postprocess`: name resolution deferred past the
/// first substitution pass, so forward references within a scope resolve.
pub struct PostprocessContext<'a> {
    pub symtab: Rc<RefCell<SymbolTable>>,
    pub varscope: &'a mut Varscope,
    pub errors: &'a mut ErrorList,
}

/// Each operation is optional; the default is a specific, named failure
/// rather than a panic, so a caller can substitute the error-placeholder
/// node and keep going.
pub trait AstNode: std::fmt::Debug {
    fn location(&self) -> &SourceLocation;

    fn to_string_form(&self) -> String;

    /// Converts this rvalue node to an lvalue that writes the value produced
    /// by `producer` when code-generated, returning a paired `reader` node
    /// that evaluates to the *old* value (needed for `#update#` and
    /// subscript chains). The default means "not an lvalue"; the caller
    /// (never this method) is responsible for substituting an
    /// `ErrorPlaceholder` plus a self-reader so substitution can continue.
    fn to_lvalue(&self, _producer: NodeRef) -> Result<NodeRef, String> {
        Err(format!("{} cannot be used as an lvalue", self.to_string_form()))
    }

    /// Idempotent; every node is postprocessed exactly once before codegen.
    fn postprocess(&self, _ctx: &mut PostprocessContext) {}

    fn get_constexpr(&self) -> Option<ConstExpr> {
        None
    }

    fn get_constexpr_spread(&self) -> Option<Vec<ConstExpr>> {
        None
    }

    fn get_funname(&self) -> Option<Rc<str>> {
        None
    }

    fn cg_evaluate(&self, _cx: &mut CodegenContext, _dst: Register) -> Result<(), CodeGenError> {
        Err(CodeGenError::Logic(format!(
            "{} does not produce a value",
            self.to_string_form()
        )))
    }

    fn cg_spread(&self, _cx: &mut CodegenContext, _dst_list: Register) -> Result<(), CodeGenError> {
        Err(CodeGenError::Logic(format!(
            "{} cannot be spread",
            self.to_string_form()
        )))
    }

    fn cg_discard(&self, cx: &mut CodegenContext) -> Result<(), CodeGenError> {
        let tmp = cx.push_reg(RegisterType::Data);
        let result = self.cg_evaluate(cx, tmp);
        cx.pop_reg(RegisterType::Data)?;
        result
    }

    fn cg_force(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        self.cg_evaluate(cx, dst)
    }

    fn cg_define(&self, _cx: &mut CodegenContext) -> Result<(), CodeGenError> {
        Err(CodeGenError::Logic(format!(
            "{} cannot be used as a definition",
            self.to_string_form()
        )))
    }

    fn cg_set_up(&self, _cx: &mut CodegenContext) -> Result<(), CodeGenError> {
        Ok(())
    }

    fn cg_tear_down(&self, _cx: &mut CodegenContext) -> Result<(), CodeGenError> {
        Ok(())
    }

    /// Top-level statements that declare a function body rather than
    /// evaluate to a value identify themselves here so the compiler can
    /// route them to their own P-Code function instead of folding them
    /// into the module's init body.
    fn as_defun(&self) -> Option<&Defun> {
        None
    }

    /// Top-level statements that declare an external symbol identify
    /// themselves here for the same reason as [`AstNode::as_defun`].
    fn as_extern_decl(&self) -> Option<&ExternDecl> {
        None
    }
}

/// Accepts every operation and lowers to a no-op emitting the empty string,
/// so downstream passes run to completion and can surface more diagnostics
/// in one compile.
#[derive(Debug)]
pub struct ErrorPlaceholder {
    pub location: SourceLocation,
    pub reason: String,
}

impl ErrorPlaceholder {
    pub fn new(location: SourceLocation, reason: impl Into<String>) -> Self {
        ErrorPlaceholder {
            location,
            reason: reason.into(),
        }
    }
}

impl AstNode for ErrorPlaceholder {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        String::new()
    }

    fn to_lvalue(&self, _producer: NodeRef) -> Result<NodeRef, String> {
        Ok(Rc::new(ErrorPlaceholder::new(self.location.clone(), self.reason.clone())))
    }

    fn get_constexpr(&self) -> Option<ConstExpr> {
        Some(ConstExpr::Str(String::new()))
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        cx.emit(Instruction::LdImmStr {
            dst,
            value: String::new(),
        });
        Ok(())
    }

    fn cg_discard(&self, _cx: &mut CodegenContext) -> Result<(), CodeGenError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct IntLiteral {
    pub value: i64,
    pub location: SourceLocation,
}

impl AstNode for IntLiteral {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        self.value.to_string()
    }

    fn get_constexpr(&self) -> Option<ConstExpr> {
        Some(ConstExpr::Int(self.value))
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        cx.emit(Instruction::LdImmInt {
            dst,
            value: self.value,
        });
        Ok(())
    }

    fn cg_discard(&self, _cx: &mut CodegenContext) -> Result<(), CodeGenError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct StrLiteral {
    pub value: String,
    pub location: SourceLocation,
}

impl AstNode for StrLiteral {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        self.value.clone()
    }

    fn get_constexpr(&self) -> Option<ConstExpr> {
        Some(ConstExpr::Str(self.value.clone()))
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        cx.emit(Instruction::LdImmStr {
            dst,
            value: self.value.clone(),
        });
        Ok(())
    }

    fn cg_discard(&self, _cx: &mut CodegenContext) -> Result<(), CodeGenError> {
        Ok(())
    }
}

/// Reads a resolved global variable by its P-Code global index.
#[derive(Debug)]
pub struct GlobalVarRead {
    pub full_name: Rc<str>,
    pub global_index: u32,
    pub location: SourceLocation,
}

impl AstNode for GlobalVarRead {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        self.full_name.to_string()
    }

    fn to_lvalue(&self, producer: NodeRef) -> Result<NodeRef, String> {
        Ok(Rc::new(GlobalVarWrite {
            full_name: self.full_name.clone(),
            global_index: self.global_index,
            producer,
            location: self.location.clone(),
        }))
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        cx.emit(Instruction::LdGlob {
            dst,
            global: self.global_index,
        });
        Ok(())
    }

    fn cg_discard(&self, _cx: &mut CodegenContext) -> Result<(), CodeGenError> {
        // Reading a global has no side effect worth keeping; discard is free.
        Ok(())
    }
}

/// Writes `producer`'s value to a resolved global variable (the `#set#`
/// lowering of a bareword target, §4.4.1).
#[derive(Debug)]
pub struct GlobalVarWrite {
    pub full_name: Rc<str>,
    pub global_index: u32,
    pub producer: NodeRef,
    pub location: SourceLocation,
}

impl AstNode for GlobalVarWrite {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        format!("{} = {}", self.full_name, self.producer.to_string_form())
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        self.producer.cg_evaluate(cx, dst)?;
        cx.emit(Instruction::SetGlob {
            global: self.global_index,
            src: dst,
        });
        Ok(())
    }

    fn cg_discard(&self, cx: &mut CodegenContext) -> Result<(), CodeGenError> {
        let tmp = cx.push_reg(RegisterType::Data);
        self.producer.cg_evaluate(cx, tmp)?;
        cx.emit(Instruction::SetGlob {
            global: self.global_index,
            src: tmp,
        });
        cx.pop_reg(RegisterType::Data)
    }
}

/// Integer addition, the lowering target of the built-in `+` operator
/// macro.
#[derive(Debug)]
pub struct IntAdd {
    pub left: NodeRef,
    pub right: NodeRef,
    pub location: SourceLocation,
}

impl AstNode for IntAdd {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        format!("({} + {})", self.left.to_string_form(), self.right.to_string_form())
    }

    fn get_constexpr(&self) -> Option<ConstExpr> {
        match (self.left.get_constexpr(), self.right.get_constexpr()) {
            (Some(ConstExpr::Int(a)), Some(ConstExpr::Int(b))) => Some(ConstExpr::Int(a + b)),
            _ => None,
        }
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        self.left.cg_evaluate(cx, dst)?;
        let rhs = cx.push_reg(RegisterType::Data);
        self.right.cg_evaluate(cx, rhs)?;
        cx.emit(Instruction::IAdd { dst, a: dst, b: rhs });
        cx.pop_reg(RegisterType::Data)
    }

    fn cg_discard(&self, cx: &mut CodegenContext) -> Result<(), CodeGenError> {
        self.left.cg_discard(cx)?;
        self.right.cg_discard(cx)
    }
}

/// A sequence of statements (the lowering of a `block`/substitution body):
/// evaluates the last statement's node for its value, discarding the rest.
#[derive(Debug)]
pub struct Seq {
    pub statements: Vec<NodeRef>,
    pub location: SourceLocation,
}

impl AstNode for Seq {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        self.statements
            .last()
            .map(|n| n.to_string_form())
            .unwrap_or_default()
    }

    fn postprocess(&self, ctx: &mut PostprocessContext) {
        for s in &self.statements {
            s.postprocess(ctx);
        }
    }

    fn get_constexpr(&self) -> Option<ConstExpr> {
        match self.statements.as_slice() {
            [] => Some(ConstExpr::Str(String::new())),
            [.., last] => last.get_constexpr(),
        }
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        match self.statements.split_last() {
            None => {
                cx.emit(Instruction::LdImmStr {
                    dst,
                    value: String::new(),
                });
                Ok(())
            }
            Some((last, init)) => {
                for s in init {
                    s.cg_discard(cx)?;
                }
                last.cg_evaluate(cx, dst)
            }
        }
    }

    fn cg_discard(&self, cx: &mut CodegenContext) -> Result<(), CodeGenError> {
        for s in &self.statements {
            s.cg_discard(cx)?;
        }
        Ok(())
    }
}

/// A static call to a resolved global function by its P-Code index.
#[derive(Debug)]
pub struct Funcall {
    pub function_name: Rc<str>,
    pub function_global: u32,
    pub args: Vec<NodeRef>,
    pub location: SourceLocation,
}

impl AstNode for Funcall {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        format!(
            "{}({})",
            self.function_name,
            self.args
                .iter()
                .map(|a| a.to_string_form())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }

    fn get_funname(&self) -> Option<Rc<str>> {
        Some(self.function_name.clone())
    }

    fn postprocess(&self, ctx: &mut PostprocessContext) {
        for a in &self.args {
            a.postprocess(ctx);
        }
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        // Evaluate positional args in source order (funcall's defined cg
        // sequence, §5 ordering rule).
        let mut arg_regs = Vec::with_capacity(self.args.len());
        for a in &self.args {
            let r = cx.push_reg(RegisterType::Data);
            a.cg_evaluate(cx, r)?;
            arg_regs.push(r);
        }
        cx.emit_throwing(Instruction::InvokeSs {
            dst,
            function_global: self.function_global,
            args: arg_regs,
        });
        for _ in &self.args {
            cx.pop_reg(RegisterType::Data)?;
        }
        Ok(())
    }

    fn cg_discard(&self, cx: &mut CodegenContext) -> Result<(), CodeGenError> {
        let tmp = cx.push_reg(RegisterType::Data);
        let r = self.cg_evaluate(cx, tmp);
        cx.pop_reg(RegisterType::Data)?;
        r
    }
}

/// Reads a function-local variable by its stable `Varscope` index.
#[derive(Debug)]
pub struct LocalVarRead {
    pub name: Rc<str>,
    pub varscope_index: usize,
    pub location: SourceLocation,
}

impl AstNode for LocalVarRead {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        self.name.to_string()
    }

    fn to_lvalue(&self, producer: NodeRef) -> Result<NodeRef, String> {
        Ok(Rc::new(LocalVarWrite {
            name: self.name.clone(),
            varscope_index: self.varscope_index,
            producer,
            location: self.location.clone(),
        }))
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        cx.emit(Instruction::LdReg {
            dst,
            src: Register::new(RegisterType::Var, self.varscope_index as u32),
        });
        Ok(())
    }

    fn cg_discard(&self, _cx: &mut CodegenContext) -> Result<(), CodeGenError> {
        Ok(())
    }
}

/// Writes `producer`'s value into a function-local variable's `Varscope`
/// slot (the local-variable counterpart to [`GlobalVarWrite`]).
#[derive(Debug)]
pub struct LocalVarWrite {
    pub name: Rc<str>,
    pub varscope_index: usize,
    pub producer: NodeRef,
    pub location: SourceLocation,
}

impl AstNode for LocalVarWrite {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        format!("{} = {}", self.name, self.producer.to_string_form())
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        self.producer.cg_evaluate(cx, dst)?;
        cx.emit(Instruction::LdReg {
            dst: Register::new(RegisterType::Var, self.varscope_index as u32),
            src: dst,
        });
        Ok(())
    }

    fn cg_discard(&self, cx: &mut CodegenContext) -> Result<(), CodeGenError> {
        let tmp = cx.push_reg(RegisterType::Data);
        self.producer.cg_evaluate(cx, tmp)?;
        cx.emit(Instruction::LdReg {
            dst: Register::new(RegisterType::Var, self.varscope_index as u32),
            src: tmp,
        });
        cx.pop_reg(RegisterType::Data)
    }
}

/// `if cond { then } else { else }` (the `else` arm is optional; its
/// absence lowers to the empty string, matching [`Seq`]'s empty case).
///
/// Both arms must leave the register-stack heights their branch point
/// shares equal, so the condition register is popped once on the
/// fallthrough path and once, via a manually emitted `Pop`, on the
/// jump-taken path — see the `tally_heights` CFG join this mirrors.
#[derive(Debug)]
pub struct IfExpr {
    pub cond: NodeRef,
    pub then_branch: NodeRef,
    pub else_branch: Option<NodeRef>,
    pub location: SourceLocation,
}

impl AstNode for IfExpr {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        format!(
            "if {} {{ {} }} else {{ {} }}",
            self.cond.to_string_form(),
            self.then_branch.to_string_form(),
            self.else_branch.as_ref().map(|e| e.to_string_form()).unwrap_or_default()
        )
    }

    fn postprocess(&self, ctx: &mut PostprocessContext) {
        self.cond.postprocess(ctx);
        self.then_branch.postprocess(ctx);
        if let Some(e) = &self.else_branch {
            e.postprocess(ctx);
        }
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        let cond_reg = cx.push_reg(RegisterType::Data);
        self.cond.cg_evaluate(cx, cond_reg)?;

        let then_label = cx.genlabel();
        let else_label = cx.genlabel();
        let end_label = cx.genlabel();

        cx.emit(Instruction::CondBranch {
            cond: cond_reg,
            target: else_label,
        });
        cx.label(then_label);
        cx.pop_reg(RegisterType::Data)?;
        self.then_branch.cg_evaluate(cx, dst)?;
        cx.emit(Instruction::Branch { target: end_label });

        cx.label(else_label);
        cx.emit(Instruction::Pop(RegisterType::Data));
        match &self.else_branch {
            Some(e) => e.cg_evaluate(cx, dst)?,
            None => cx.emit(Instruction::LdImmStr { dst, value: String::new() }),
        }

        cx.label(end_label);
        Ok(())
    }
}

/// `loop cond { body }`: a while-style loop re-evaluating `cond` on every
/// iteration. `break`/`continue` are not implemented (§9's "a lone unit
/// never expands" rule leaves no bareword-statement shape to hang them
/// on without contradicting that decision).
#[derive(Debug)]
pub struct WhileLoop {
    pub cond: NodeRef,
    pub body: NodeRef,
    pub location: SourceLocation,
}

impl AstNode for WhileLoop {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        format!("loop {} {{ {} }}", self.cond.to_string_form(), self.body.to_string_form())
    }

    fn postprocess(&self, ctx: &mut PostprocessContext) {
        self.cond.postprocess(ctx);
        self.body.postprocess(ctx);
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        let top_label = cx.genlabel();
        let body_label = cx.genlabel();
        let end_label = cx.genlabel();

        cx.label(top_label);
        let cond_reg = cx.push_reg(RegisterType::Data);
        self.cond.cg_evaluate(cx, cond_reg)?;
        cx.emit(Instruction::CondBranch {
            cond: cond_reg,
            target: end_label,
        });
        cx.label(body_label);
        cx.pop_reg(RegisterType::Data)?;
        self.body.cg_discard(cx)?;
        cx.emit(Instruction::Branch { target: top_label });

        cx.label(end_label);
        cx.emit(Instruction::Pop(RegisterType::Data));
        cx.emit(Instruction::LdImmStr { dst, value: String::new() });
        Ok(())
    }
}

/// `throw expr`: lowers to a call of the auto-registered `builtin:throw`
/// external function, the only way this instruction set can transfer
/// control to a landing pad outside of `LIndex`.
#[derive(Debug)]
pub struct Throw {
    pub value: NodeRef,
    pub throw_global: u32,
    pub location: SourceLocation,
}

impl AstNode for Throw {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        format!("throw {}", self.value.to_string_form())
    }

    fn postprocess(&self, ctx: &mut PostprocessContext) {
        self.value.postprocess(ctx);
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        let arg = cx.push_reg(RegisterType::Data);
        self.value.cg_evaluate(cx, arg)?;
        cx.emit_throwing(Instruction::InvokeSs {
            dst,
            function_global: self.throw_global,
            args: vec![arg],
        });
        cx.pop_reg(RegisterType::Data)
    }
}

/// `try { body } catch { handler }`. The caught value is not bound to a
/// name in this build (`catch` handlers see no exception-value
/// placeholder); `finally`/`defer` are not implemented.
#[derive(Debug)]
pub struct TryCatch {
    pub body: NodeRef,
    pub handler: NodeRef,
    pub location: SourceLocation,
}

impl AstNode for TryCatch {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        format!(
            "try {{ {} }} catch {{ {} }}",
            self.body.to_string_form(),
            self.handler.to_string_form()
        )
    }

    fn postprocess(&self, ctx: &mut PostprocessContext) {
        self.body.postprocess(ctx);
        self.handler.postprocess(ctx);
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        let catch_label = cx.genlabel();
        let end_label = cx.genlabel();

        cx.emit(Instruction::Try { landing_pad: catch_label });
        cx.push_try(catch_label);
        let body_result = self.body.cg_evaluate(cx, dst);
        cx.pop_try();
        body_result?;
        cx.emit(Instruction::Yrt);
        cx.emit(Instruction::Branch { target: end_label });

        cx.label(catch_label);
        cx.emit(Instruction::RequireCaughtException);
        self.handler.cg_evaluate(cx, dst)?;

        cx.label(end_label);
        Ok(())
    }
}

/// `fun name (params) { body }`, captured raw for the caller
/// (`compile_module`) to code-generate into its own P-Code function
/// rather than folding into the module's init body.
#[derive(Debug)]
pub struct Defun {
    pub full_name: Rc<str>,
    pub params: Vec<Rc<str>>,
    pub body: Vec<Statement>,
    pub symtab: Rc<RefCell<SymbolTable>>,
    pub location: SourceLocation,
}

impl AstNode for Defun {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        format!("fun {}({})", self.full_name, self.params.join(", "))
    }

    fn as_defun(&self) -> Option<&Defun> {
        Some(self)
    }
}

/// `extern-var name` / `extern-fun name "prototype"`.
#[derive(Debug)]
pub struct ExternDecl {
    pub full_name: Rc<str>,
    pub prototype: Option<String>,
    pub location: SourceLocation,
}

impl AstNode for ExternDecl {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        match &self.prototype {
            Some(p) => format!("extern-fun {} \"{}\"", self.full_name, p),
            None => format!("extern-var {}", self.full_name),
        }
    }

    fn as_extern_decl(&self) -> Option<&ExternDecl> {
        Some(self)
    }
}

/// Subscript-get: `list[index]`, lowering to `LIndex`. Subscript-`with`
/// and spread-subscript forms are not implemented.
#[derive(Debug)]
pub struct SubscriptGet {
    pub list: NodeRef,
    pub index: NodeRef,
    pub location: SourceLocation,
}

impl AstNode for SubscriptGet {
    fn location(&self) -> &SourceLocation {
        &self.location
    }

    fn to_string_form(&self) -> String {
        format!("{}[{}]", self.list.to_string_form(), self.index.to_string_form())
    }

    fn postprocess(&self, ctx: &mut PostprocessContext) {
        self.list.postprocess(ctx);
        self.index.postprocess(ctx);
    }

    fn cg_evaluate(&self, cx: &mut CodegenContext, dst: Register) -> Result<(), CodeGenError> {
        let list_reg = cx.push_reg(RegisterType::List);
        self.list.cg_evaluate(cx, list_reg)?;
        let index_reg = cx.push_reg(RegisterType::Int);
        self.index.cg_evaluate(cx, index_reg)?;
        cx.emit_throwing(Instruction::LIndex {
            dst,
            list: list_reg,
            index: index_reg,
        });
        cx.pop_reg(RegisterType::Int)?;
        cx.pop_reg(RegisterType::List)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcode::RegisterType;

    fn loc() -> SourceLocation {
        SourceLocation::new("m.ava", "Foo = 6 + 7", 1, 1)
    }

    #[test]
    fn error_placeholder_evaluates_to_empty_string_without_failing() {
        let node = ErrorPlaceholder::new(loc(), "boom");
        let mut cx = CodegenContext::new();
        let dst = cx.push_reg(RegisterType::Data);
        assert!(node.cg_evaluate(&mut cx, dst).is_ok());
    }

    #[test]
    fn int_add_constant_folds() {
        let left = Rc::new(IntLiteral { value: 6, location: loc() });
        let right = Rc::new(IntLiteral { value: 7, location: loc() });
        let add = IntAdd { left, right, location: loc() };
        assert_eq!(add.get_constexpr(), Some(ConstExpr::Int(13)));
    }

    #[test]
    fn seq_evaluates_last_statement_and_discards_rest() {
        let mut cx = CodegenContext::new();
        let a = Rc::new(IntLiteral { value: 1, location: loc() }) as NodeRef;
        let b = Rc::new(IntLiteral { value: 2, location: loc() }) as NodeRef;
        let seq = Seq {
            statements: vec![a, b],
            location: loc(),
        };
        let dst = cx.push_reg(RegisterType::Data);
        seq.cg_evaluate(&mut cx, dst).unwrap();
        assert_eq!(seq.get_constexpr(), Some(ConstExpr::Int(2)));
    }

    #[test]
    fn global_var_read_converts_to_a_write_of_the_same_global() {
        let read = GlobalVarRead {
            full_name: "m:Foo".into(),
            global_index: 3,
            location: loc(),
        };
        let producer = Rc::new(IntLiteral { value: 6, location: loc() }) as NodeRef;
        let write = read.to_lvalue(producer).unwrap();
        assert_eq!(write.to_string_form(), "m:Foo = 6");
    }

    #[test]
    fn default_cg_evaluate_names_the_node_in_its_error() {
        #[derive(Debug)]
        struct Opaque(SourceLocation);
        impl AstNode for Opaque {
            fn location(&self) -> &SourceLocation {
                &self.0
            }
            fn to_string_form(&self) -> String {
                "opaque".into()
            }
        }
        let node = Opaque(loc());
        let mut cx = CodegenContext::new();
        let dst = cx.push_reg(RegisterType::Data);
        let err = node.cg_evaluate(&mut cx, dst).unwrap_err();
        assert!(err.to_string().contains("does not produce a value"));
    }
}
