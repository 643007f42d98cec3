//! Avalanche Compiler Core
//!
//! The core compilation pipeline for the Avalanche language: parsing
//! collaborates externally ([`parser`]), then macro substitution
//! ([`macros`]) drives AST construction ([`astnode`]) against the symbol
//! table ([`symtab`]) and lexical scope ([`varscope`]); codegen
//! ([`cgctx`], [`pcode`]) lowers the AST to P-Code, and the validator
//! ([`xcode`]) checks the result before it is handed back to the caller.
//!
//! # Extending the compiler
//!
//! Embedding programs register symbols the module may reference without a
//! local `extern` declaration via [`CompilerConfig`]:
//!
//! ```rust,ignore
//! use avalanche_compiler::{CompilerConfig, config::ExternalSymbol};
//!
//! let config = CompilerConfig::new().with_external_symbol(ExternalSymbol {
//!     full_name: "host:log".into(),
//!     prototype: Some("1 message".into()),
//! });
//! ```

pub mod astnode;
pub mod cgctx;
pub mod cgerror;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod macros;
pub mod parseunit;
pub mod parser;
pub mod pcode;
pub mod symtab;
pub mod varscope;
pub mod xcode;

pub use astnode::{AstNode, NodeRef};
pub use cgctx::CodegenContext;
pub use config::CompilerConfig;
pub use error::{CompileError, ErrorList, SourceLocation};
pub use macros::{
    register_builtin_control_macros, register_builtin_operators, register_builtin_throw, substitute, GensymGenerator,
};
pub use parseunit::{ParseUnit, ParseUnitKind, Statement};
pub use pcode::{builder::GlobalBuilder, Program};
pub use symtab::SymbolTable;
pub use varscope::Varscope;

use parseunit::ParseUnitKind as PUK;
use pcode::{Instruction, Register, RegisterType};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use symtab::{FunctionData, LocalData, Symbol, SymbolTable as Symtab, SymbolType, SymbolVariant, Visibility};

/// One declared function's compiled body, pending validation until the
/// whole module's [`Program`] exists (forward references mean a function
/// may call another one appended after it).
struct CompiledFunction {
    index: u32,
    body: Vec<Instruction>,
    throw_sites: Vec<Option<u32>>,
    location: SourceLocation,
}

/// Compiles one module's source text to a validated [`pcode::Program`].
///
/// Runs the full pipeline: parse, pre-scan top-level `fun`/`extern-var`/
/// `extern-fun` declarations so forward references resolve, substitute
/// every top-level statement to an AST node, code-generate each declared
/// function into its own P-Code function and everything else into the
/// module's `init` body, then validate every function body through
/// X-Code. Errors accumulate into the returned [`ErrorList`] rather than
/// aborting, matching the accumulate-and-continue error-handling design;
/// callers should treat a non-empty list as failure regardless of whether
/// a [`pcode::Program`] was also produced.
pub fn compile_module(source: &str, filename: &str, config: &CompilerConfig) -> (Option<Program>, ErrorList) {
    let mut errors = ErrorList::new();

    let statements = match parser::parse(filename, source) {
        Ok(s) => s,
        Err(e) => {
            errors.push(e.to_string(), SourceLocation::new(filename, source, 1, 1));
            return (None, errors);
        }
    };

    let root = Symtab::new_root();
    register_builtin_operators(&root);
    register_builtin_control_macros(&root);

    let mut builder = GlobalBuilder::new();
    register_external_symbols(&root, config, &mut builder);
    register_builtin_throw(&root, &mut builder);

    prescan_declarations(&statements, &root, filename, &mut builder);

    let mut gensym = GensymGenerator::new();
    let mut init_nodes: Vec<NodeRef> = Vec::new();
    let mut compiled_functions: Vec<CompiledFunction> = Vec::new();

    for statement in statements {
        let location = statement_location(&statement, filename, source);
        let node = substitute(statement, &root, &mut errors, &location, &mut gensym);

        if let Some(defun) = node.as_defun() {
            if let Some(compiled) = compile_defun(defun, &root, filename, &mut builder, &mut errors, &mut gensym) {
                compiled_functions.push(compiled);
            }
            continue;
        }
        if let Some(extern_decl) = node.as_extern_decl() {
            declare_extern(extern_decl, &root, &mut builder, &mut errors);
            continue;
        }
        init_nodes.push(node);
    }

    if !errors.is_empty() {
        return (None, errors);
    }

    let mut init_cx = CodegenContext::new();
    let dst = init_cx.push_reg(RegisterType::Data);
    if init_nodes.is_empty() {
        init_cx.emit(Instruction::LdImmStr { dst, value: String::new() });
    }
    for (i, node) in init_nodes.iter().enumerate() {
        let is_last = i + 1 == init_nodes.len();
        let result = if is_last {
            node.cg_evaluate(&mut init_cx, dst)
        } else {
            node.cg_discard(&mut init_cx)
        };
        if let Err(e) = result {
            errors.push(e.to_string(), node.location().clone());
            return (None, errors);
        }
    }
    init_cx.emit(Instruction::Ret { value: Some(dst) });
    if let Err(e) = init_cx.pop_reg(RegisterType::Data) {
        errors.push(e.to_string(), SourceLocation::new(filename, source, 1, 1));
        return (None, errors);
    }
    let init_throw_sites = init_cx.take_throw_sites();
    let init_body = init_cx.finish();

    let init_index = builder.append(pcode::GlobalItem::Fun {
        name: format!("{filename}:init"),
        prototype: "0".to_string(),
        captures: Vec::new(),
        body: init_body.clone(),
    });
    builder.append(pcode::GlobalItem::Init { fun_ref: init_index });

    let program = builder.finish();
    let module_location = SourceLocation::new(filename, source, 1, 1);

    let init_landing_pads = build_landing_pads(&init_body, &init_throw_sites);
    if xcode::validate_function(&program, &init_body, &init_landing_pads, &mut errors, &module_location).is_none() {
        return (None, errors);
    }

    for compiled in &compiled_functions {
        let landing_pads = build_landing_pads(&compiled.body, &compiled.throw_sites);
        if xcode::validate_function(&program, &compiled.body, &landing_pads, &mut errors, &compiled.location).is_none() {
            return (None, errors);
        }
    }

    (Some(program), errors)
}

fn statement_location(statement: &Statement, filename: &str, source: &str) -> SourceLocation {
    statement
        .first()
        .map(|u| u.location.clone())
        .unwrap_or_else(|| SourceLocation::new(filename, source, 1, 1))
}

/// Pre-registers every top-level `fun`/`extern-var`/`extern-fun`
/// declaration's global symbol and P-Code index by sniffing each
/// statement's raw shape, without invoking macro substitution. The real
/// substitution pass below processes statements in the same order and
/// appends exactly one [`pcode::GlobalItem`] per such declaration, so the
/// index it assigns always lands on the slot reserved here — letting a
/// function reference another declared later in the source.
fn prescan_declarations(statements: &[Statement], root: &Rc<RefCell<Symtab>>, filename: &str, builder: &GlobalBuilder) {
    let mut next_index = builder.program().items.len() as u32;
    for statement in statements {
        let Some(tag) = statement.first().and_then(|u| u.bareword()) else {
            continue;
        };
        match tag {
            "fun" => {
                let (Some(name), Some(PUK::SemiLiteral(params))) =
                    (statement.get(1).and_then(|u| u.bareword()), statement.get(2).map(|u| &u.kind))
                else {
                    continue;
                };
                let mut sym = Symbol::new(SymbolType::GlobalFunction, 0, Visibility::Public, name, filename);
                sym.pcode_index = Some(next_index);
                sym.variant = SymbolVariant::Function(FunctionData {
                    prototype_spec: prototype_spec(params.iter().filter_map(|p| p.bareword())),
                    varscope_id: None,
                });
                root.borrow_mut().put(sym);
                next_index += 1;
            }
            "extern-var" => {
                let Some(name) = statement.get(1).and_then(|u| u.bareword()) else {
                    continue;
                };
                let mut sym = Symbol::new(SymbolType::GlobalVariable, 0, Visibility::Public, name, filename);
                sym.pcode_index = Some(next_index);
                root.borrow_mut().put(sym);
                next_index += 1;
            }
            "extern-fun" => {
                let (Some(name), Some(PUK::AString(proto))) =
                    (statement.get(1).and_then(|u| u.bareword()), statement.get(2).map(|u| &u.kind))
                else {
                    continue;
                };
                let mut sym = Symbol::new(SymbolType::GlobalFunction, 0, Visibility::Public, name, filename);
                sym.pcode_index = Some(next_index);
                sym.variant = SymbolVariant::Function(FunctionData {
                    prototype_spec: proto.to_string(),
                    varscope_id: None,
                });
                root.borrow_mut().put(sym);
                next_index += 1;
            }
            _ => {}
        }
    }
}

fn prototype_spec<'a>(params: impl Iterator<Item = &'a str>) -> String {
    let names: Vec<&str> = params.collect();
    let mut spec = names.len().to_string();
    for name in names {
        spec.push(' ');
        spec.push_str(name);
    }
    spec
}

/// Code-generates one `fun` declaration into its own P-Code function,
/// binding its parameters into a child scope via [`Varscope`] and the
/// `Parm` register file the calling convention delivers arguments in.
fn compile_defun(
    defun: &astnode::Defun,
    root: &Rc<RefCell<Symtab>>,
    filename: &str,
    builder: &mut GlobalBuilder,
    errors: &mut ErrorList,
    gensym: &mut GensymGenerator,
) -> Option<CompiledFunction> {
    let mut varscope = Varscope::new();
    let child = Symtab::new_child(&defun.symtab, 1);
    for param in &defun.params {
        let varscope_index = varscope.ref_var(param);
        let mut sym = Symbol::new(SymbolType::LocalVariable, 1, Visibility::Private, param.clone(), filename);
        sym.variant = SymbolVariant::Local(LocalData { varscope_index });
        child.borrow_mut().put(sym);
    }

    let mut cx = CodegenContext::new();
    for (i, _) in defun.params.iter().enumerate() {
        cx.emit(Instruction::LdReg {
            dst: Register::new(RegisterType::Var, i as u32),
            src: Register::new(RegisterType::Parm, i as u32),
        });
    }

    let mut body_nodes = Vec::with_capacity(defun.body.len());
    for statement in &defun.body {
        let location = statement_location(statement, filename, &defun.location.source_text);
        let node = substitute(statement.clone(), &child, errors, &location, gensym);
        body_nodes.push(node);
    }

    let dst = cx.push_reg(RegisterType::Data);
    if body_nodes.is_empty() {
        cx.emit(Instruction::LdImmStr { dst, value: String::new() });
    }
    for (i, node) in body_nodes.iter().enumerate() {
        let is_last = i + 1 == body_nodes.len();
        let result = if is_last { node.cg_evaluate(&mut cx, dst) } else { node.cg_discard(&mut cx) };
        if let Err(e) = result {
            errors.push(e.to_string(), node.location().clone());
            return None;
        }
    }
    cx.emit(Instruction::Ret { value: Some(dst) });
    if let Err(e) = cx.pop_reg(RegisterType::Data) {
        errors.push(e.to_string(), defun.location.clone());
        return None;
    }

    let throw_sites = cx.take_throw_sites();
    let body = cx.finish();

    let reserved_index = Symtab::get(root, &defun.full_name)
        .into_iter()
        .find(|s| s.symbol_type == SymbolType::GlobalFunction)
        .and_then(|s| s.pcode_index);

    let index = builder.append(pcode::GlobalItem::Fun {
        name: defun.full_name.to_string(),
        prototype: prototype_spec(defun.params.iter().map(|p| p.as_ref())),
        captures: Vec::new(),
        body: body.clone(),
    });
    debug_assert_eq!(
        Some(index),
        reserved_index,
        "fun declaration codegen appended to a different global index than its prescan reservation"
    );

    Some(CompiledFunction {
        index,
        body,
        throw_sites,
        location: defun.location.clone(),
    })
}

/// Appends an `extern-var`/`extern-fun` declaration's global item at its
/// prescan-reserved index.
fn declare_extern(
    extern_decl: &astnode::ExternDecl,
    root: &Rc<RefCell<Symtab>>,
    builder: &mut GlobalBuilder,
    errors: &mut ErrorList,
) {
    let reserved = Symtab::get(root, &extern_decl.full_name).into_iter().next();
    let Some(reserved) = reserved else {
        errors.push(
            format!("`{}` was not pre-declared during the declaration scan", extern_decl.full_name),
            extern_decl.location.clone(),
        );
        return;
    };

    let item = match &extern_decl.prototype {
        Some(proto) => pcode::GlobalItem::ExtFun {
            name: extern_decl.full_name.to_string(),
            prototype: proto.clone(),
        },
        None => pcode::GlobalItem::ExtVar {
            name: extern_decl.full_name.to_string(),
        },
    };
    let index = builder.append(item);
    debug_assert_eq!(
        Some(index),
        reserved.pcode_index,
        "extern declaration codegen appended to a different global index than its prescan reservation"
    );
}

/// Derives a function body's `landing_pads` map (as consumed by
/// [`xcode::linking::link`]) from the active-`try`-label recorded per
/// throwing instruction during codegen. `blocks::partition` always
/// flushes a new block immediately after a throwing instruction, so the
/// blocks whose last instruction may throw correspond 1:1, in order, to
/// the entries `CodegenContext::take_throw_sites` recorded.
fn build_landing_pads(body: &[Instruction], throw_sites: &[Option<u32>]) -> HashMap<u32, u32> {
    let mut landing_pads = HashMap::new();
    let Ok(blocks) = xcode::blocks::partition(body) else {
        return landing_pads;
    };
    let throwing_blocks = blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.instructions.last().map(|i| i.may_throw()).unwrap_or(false))
        .map(|(i, _)| i as u32);

    for (block_index, site) in throwing_blocks.zip(throw_sites.iter()) {
        if let Some(catch_label) = site {
            landing_pads.insert(block_index, *catch_label);
        }
    }
    landing_pads
}

fn register_external_symbols(root: &Rc<RefCell<Symtab>>, config: &CompilerConfig, builder: &mut GlobalBuilder) {
    for ext in &config.external_symbols {
        let symbol_type = if ext.prototype.is_some() {
            SymbolType::GlobalFunction
        } else {
            SymbolType::GlobalVariable
        };
        let index = match &ext.prototype {
            Some(proto) => builder.append(pcode::GlobalItem::ExtFun {
                name: ext.full_name.clone(),
                prototype: proto.clone(),
            }),
            None => builder.append(pcode::GlobalItem::ExtVar { name: ext.full_name.clone() }),
        };
        let mut symbol = Symbol::new(symbol_type, 0, Visibility::Public, ext.full_name.as_str(), "<external>");
        symbol.pcode_index = Some(index);
        if let Some(proto) = &ext.prototype {
            symbol.variant = SymbolVariant::Function(FunctionData {
                prototype_spec: proto.clone(),
                varscope_id: None,
            });
        }
        root.borrow_mut().put(symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_constant_expression_module() {
        let config = CompilerConfig::default();
        let (program, errors) = compile_module("6", "scenario1.ava", &config);
        assert!(errors.is_empty(), "{}", errors.render(50, false));
        assert!(program.is_some());
    }

    #[test]
    fn compiles_an_assignment_of_an_arithmetic_expression() {
        let config = CompilerConfig::new().with_external_symbol(config::ExternalSymbol {
            full_name: "Foo".into(),
            prototype: None,
        });
        let (program, errors) = compile_module("Foo = 6 + 7", "scenario1.ava", &config);
        assert!(errors.is_empty(), "{}", errors.render(50, false));
        assert!(program.is_some());
    }

    #[test]
    fn undefined_reference_is_reported_without_panicking() {
        let config = CompilerConfig::default();
        let (program, errors) = compile_module("nope", "bad.ava", &config);
        assert!(program.is_none());
        assert!(!errors.is_empty());
    }

    #[test]
    fn if_else_constant_condition_compiles_cleanly() {
        let config = CompilerConfig::default();
        let (program, errors) = compile_module("if [1] {2} else {3}", "scenario_if.ava", &config);
        assert!(errors.is_empty(), "{}", errors.render(50, false));
        assert!(program.is_some());
    }

    #[test]
    fn while_loop_compiles_cleanly() {
        let config = CompilerConfig::default();
        let (program, errors) = compile_module("loop [0] {1}", "scenario_loop.ava", &config);
        assert!(errors.is_empty(), "{}", errors.render(50, false));
        assert!(program.is_some());
    }

    #[test]
    fn try_catch_around_a_throw_compiles_cleanly() {
        let config = CompilerConfig::default();
        let (program, errors) = compile_module("try {throw 1} catch {2}", "scenario_try.ava", &config);
        assert!(errors.is_empty(), "{}", errors.render(50, false));
        assert!(program.is_some());
    }

    #[test]
    fn a_function_declared_after_its_caller_resolves_via_the_prescan() {
        let config = CompilerConfig::default();
        let source = "m-main; fun m-main () {m-helper}; fun m-helper () {1}";
        let (program, errors) = compile_module(source, "scenario_forward.ava", &config);
        assert!(errors.is_empty(), "{}", errors.render(50, false));
        assert!(program.is_some());
    }

    #[test]
    fn extern_fun_declaration_is_callable_from_the_init_body() {
        let config = CompilerConfig::default();
        let source = "extern-fun host-log \"1 message\"; host-log 6";
        let (program, errors) = compile_module(source, "scenario_extern.ava", &config);
        assert!(errors.is_empty(), "{}", errors.render(50, false));
        assert!(program.is_some());
    }
}
