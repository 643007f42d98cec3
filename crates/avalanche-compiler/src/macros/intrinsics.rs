//! Statement-substitution driver (C4 proper): resolves the macro that
//! governs one statement and dispatches to it, implementing the five-step
//! algorithm in §4.4.

use super::gensym::GensymGenerator;
use super::interpreter::{Interpreter, MacroInstr};
use crate::astnode::{
    Defun, ErrorPlaceholder, ExternDecl, Funcall, GlobalVarRead, IfExpr, IntAdd, LocalVarRead, NodeRef, Seq, Throw,
    TryCatch, WhileLoop,
};
use crate::error::{ErrorList, SourceLocation};
use crate::parseunit::{ParseUnit, ParseUnitKind, Statement};
use crate::pcode::builder::GlobalBuilder;
use crate::pcode::GlobalItem;
use crate::symtab::{MacroData, Symbol, SymbolTable, SymbolType, SymbolVariant, Visibility};
use std::cell::RefCell;
use std::rc::Rc;

/// The synthetic external function `throw` lowers to. The instruction set
/// has no dedicated `Throw` opcode, so this is the only way a `throw`
/// expression can transfer control to a landing pad.
pub const BUILTIN_THROW_NAME: &str = "builtin:throw";

/// Registers the handful of operators built directly into this build rather
/// than defined as library macros: arithmetic `+` and assignment `=`
/// (§4.4.1's `#set#` lowering of a bareword target). Everything else in the
/// operator-macro precedence sweep still goes through user-defined macro
/// symbols once those are declared.
///
/// The precedence sweep in [`substitute_step`] scans ascending, stopping at
/// the first matching precedence, so the *lowest*-numbered operator in a
/// statement becomes the outermost one: assignment is given a low
/// precedence so it splits the statement before arithmetic does, leaving
/// `6 + 7` to be re-substituted as the assignment's right-hand side.
pub fn register_builtin_operators(root: &Rc<RefCell<SymbolTable>>) {
    let mut assign = Symbol::new(SymbolType::OperatorMacro, 0, Visibility::Public, "=", "<builtin>");
    assign.variant = SymbolVariant::Macro(MacroData {
        precedence: 4,
        substitution_function: "intrinsic_assign".into(),
        userdata: None,
        program: None,
    });
    root.borrow_mut().put(assign);

    let mut add = Symbol::new(SymbolType::OperatorMacro, 0, Visibility::Public, "+", "<builtin>");
    add.variant = SymbolVariant::Macro(MacroData {
        precedence: 20,
        substitution_function: "intrinsic_add".into(),
        userdata: None,
        program: None,
    });
    root.borrow_mut().put(add);
}

/// Registers the control macros this build understands directly (§4.4.1):
/// `fun`/`extern-var`/`extern-fun` (global declarations), `if`/`loop`/
/// `try` (structured control), `throw`, and `defop` (user-defined operator
/// macros, dispatched through [`Interpreter`]). `namespace`/`import`/
/// `alias`/`#update#`/subscript-`with` and non-`while` loop clauses are not
/// implemented.
pub fn register_builtin_control_macros(root: &Rc<RefCell<SymbolTable>>) {
    for name in ["fun", "extern-var", "extern-fun", "if", "loop", "try", "throw", "defop"] {
        let mut sym = Symbol::new(SymbolType::ControlMacro, 0, Visibility::Public, name, "<builtin>");
        sym.variant = SymbolVariant::Macro(MacroData {
            precedence: 0,
            substitution_function: name.into(),
            userdata: None,
            program: None,
        });
        root.borrow_mut().put(sym);
    }
}

/// Registers the synthetic `builtin:throw` external function `throw`
/// expressions call, returning its global index.
pub fn register_builtin_throw(root: &Rc<RefCell<SymbolTable>>, builder: &mut GlobalBuilder) -> u32 {
    let index = builder.append(GlobalItem::ExtFun {
        name: BUILTIN_THROW_NAME.to_string(),
        prototype: "1 value".to_string(),
    });
    let mut sym = Symbol::new(SymbolType::GlobalFunction, 0, Visibility::Public, BUILTIN_THROW_NAME, "<builtin>");
    sym.pcode_index = Some(index);
    root.borrow_mut().put(sym);
    index
}

/// Outcome of dispatching one macro against a statement (§4.4).
pub enum SubstitutionOutcome {
    /// Substitution is finished; this is the resolved AST node.
    Done(NodeRef),
    /// The dispatched macro rewrote the statement; restart from step 1.
    Again(Statement),
}

/// Built-in precedence of the L-/R-/LR-string operator (§4.4 step 3).
const STRING_OPERATOR_PRECEDENCE: u32 = 10;

/// Runs the statement-substitution driver to a fixed point, returning the
/// final AST node. Callers that need the single-step outcome (e.g. tests
/// asserting `again` was taken) should call [`substitute_step`] directly.
pub fn substitute(
    mut statement: Statement,
    symtab: &Rc<RefCell<SymbolTable>>,
    errors: &mut ErrorList,
    location: &SourceLocation,
    gensym: &mut GensymGenerator,
) -> NodeRef {
    loop {
        match substitute_step(statement, symtab, errors, location, gensym) {
            SubstitutionOutcome::Done(node) => return node,
            SubstitutionOutcome::Again(next) => statement = next,
        }
    }
}

/// One pass of the driver (§4.4 steps 1-5).
pub fn substitute_step(
    statement: Statement,
    symtab: &Rc<RefCell<SymbolTable>>,
    errors: &mut ErrorList,
    location: &SourceLocation,
    gensym: &mut GensymGenerator,
) -> SubstitutionOutcome {
    // Step 1: a lone unit never expands, even if it names a control macro
    // (the deliberately-conservative open question in §9).
    if statement.len() == 1 {
        return SubstitutionOutcome::Done(lower_unit(&statement[0], symtab, errors));
    }

    let first_bareword = statement.first().and_then(|u| u.bareword());

    // Step 2: control macro on the first bareword.
    if let Some(name) = first_bareword {
        let candidates = lookup_macros(symtab, name, SymbolType::ControlMacro);
        match candidates.len() {
            0 => {}
            1 => return dispatch_control_macro(statement, &candidates[0], symtab, errors, location, gensym),
            _ => {
                errors.push(format!("ambiguous control macro `{name}`"), location.clone());
                return SubstitutionOutcome::Done(error_node(location, "ambiguous control macro"));
            }
        }
    }

    // Built-in L-/R-/LR-string infix operator, fixed at precedence 10.
    if let Some(idx) = find_string_operator(&statement) {
        return dispatch_operator_index(statement, idx, symtab, errors, location, gensym);
    }

    // Step 3: operator-macro precedence sweep, 0..=40.
    for precedence in 0..=crate::symtab::MAX_OPERATOR_MACRO_PRECEDENCE {
        let order = scan_order(&statement, precedence);
        for idx in order {
            let Some(name) = statement[idx].bareword() else { continue };
            let candidates = lookup_macros(symtab, name, SymbolType::OperatorMacro);
            let matching: Vec<_> = candidates
                .into_iter()
                .filter(|s| operator_precedence_of(s) == precedence)
                .collect();
            match matching.len() {
                0 => continue,
                1 => return dispatch_operator_index(statement, idx, symtab, errors, location, gensym),
                _ => {
                    errors.push(format!("ambiguous operator macro `{name}`"), location.clone());
                    return SubstitutionOutcome::Done(error_node(location, "ambiguous operator macro"));
                }
            }
        }
    }

    // Step 4: function macro on the first bareword.
    if let Some(name) = first_bareword {
        let candidates = lookup_macros(symtab, name, SymbolType::FunctionMacro);
        match candidates.len() {
            0 => {}
            1 => {
                errors.push(
                    format!("function macro `{name}` dispatch is not yet implemented in this build"),
                    location.clone(),
                );
                return SubstitutionOutcome::Done(error_node(location, "unimplemented function macro"));
            }
            _ => {
                errors.push(format!("ambiguous function macro `{name}`"), location.clone());
                return SubstitutionOutcome::Done(error_node(location, "ambiguous function macro"));
            }
        }
    }

    // Step 5: plain function call, `first-unit(rest...)`.
    function_call(statement, symtab, errors, location)
}

/// Even precedences scan right-to-left; odd scan left-to-right (§5
/// ordering rule).
fn scan_order(statement: &Statement, precedence: u32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..statement.len()).collect();
    if precedence % 2 == 0 {
        order.reverse();
    }
    order
}

fn find_string_operator(statement: &Statement) -> Option<usize> {
    statement.iter().position(|u| {
        matches!(
            u.string_kind(),
            Some(crate::parseunit::StringKind::L) | Some(crate::parseunit::StringKind::R) | Some(crate::parseunit::StringKind::LR)
        )
    })
}

fn operator_precedence_of(symbol: &Symbol) -> u32 {
    match &symbol.variant {
        SymbolVariant::Macro(m) => m.precedence,
        _ => 0,
    }
}

fn lookup_macros(symtab: &Rc<RefCell<SymbolTable>>, name: &str, want: SymbolType) -> Vec<Symbol> {
    SymbolTable::get(symtab, name)
        .into_iter()
        .filter(|s| s.symbol_type == want)
        .collect()
}

/// Splits the statement at `idx` into left/right operands and dispatches
/// the resolved operator. The built-in arithmetic and assignment operators
/// lower directly to their AST node here; a `defop`-declared operator
/// dispatches to [`Interpreter`], re-substituting the rewritten statement
/// it returns (an `Again` outcome, same as a control/function macro
/// rewrite).
fn dispatch_operator_index(
    statement: Statement,
    idx: usize,
    symtab: &Rc<RefCell<SymbolTable>>,
    errors: &mut ErrorList,
    location: &SourceLocation,
    gensym: &mut GensymGenerator,
) -> SubstitutionOutcome {
    let operator_name = statement[idx].bareword().map(|s| s.to_string());
    let left: Statement = statement[..idx].to_vec();
    let right: Statement = statement[idx + 1..].to_vec();

    if left.is_empty() || right.is_empty() {
        let label = operator_name.as_deref().unwrap_or("<string-operator>");
        errors.push(format!("operator `{label}` requires operands on both sides"), location.clone());
        return SubstitutionOutcome::Done(error_node(location, "operator with missing operand"));
    }

    let macro_data: Option<MacroData> = operator_name.as_deref().and_then(|name| {
        lookup_macros(symtab, name, SymbolType::OperatorMacro)
            .into_iter()
            .find_map(|s| match s.variant {
                SymbolVariant::Macro(m) => Some(m),
                _ => None,
            })
    });

    match macro_data.as_ref().map(|m| m.substitution_function.as_ref()) {
        Some("intrinsic_add") => {
            let left_node = substitute(left, symtab, errors, location, gensym);
            let right_node = substitute(right, symtab, errors, location, gensym);
            SubstitutionOutcome::Done(Rc::new(IntAdd {
                left: left_node,
                right: right_node,
                location: location.clone(),
            }))
        }
        Some("intrinsic_assign") => {
            let target = substitute(left, symtab, errors, location, gensym);
            let producer = substitute(right, symtab, errors, location, gensym);
            match target.to_lvalue(producer) {
                Ok(write) => SubstitutionOutcome::Done(write),
                Err(reason) => {
                    errors.push(reason.clone(), location.clone());
                    SubstitutionOutcome::Done(error_node(location, &reason))
                }
            }
        }
        Some("interpret") => match macro_data.as_ref().and_then(|m| m.program.clone()) {
            Some(program) => {
                let interp = Interpreter::new(left, right, gensym, location.clone());
                match interp.run(&program) {
                    Ok(rewritten) => SubstitutionOutcome::Again(rewritten),
                    Err(e) => {
                        errors.push(e, location.clone());
                        SubstitutionOutcome::Done(error_node(location, "macro interpreter error"))
                    }
                }
            }
            None => {
                errors.push("operator macro declared `interpret` with no program".to_string(), location.clone());
                SubstitutionOutcome::Done(error_node(location, "missing macro program"))
            }
        },
        _ => {
            let label = operator_name.as_deref().unwrap_or("<string-operator>");
            errors.push(
                format!("operator `{label}` dispatch is not yet implemented in this build"),
                location.clone(),
            );
            SubstitutionOutcome::Done(error_node(location, "unimplemented operator"))
        }
    }
}

/// Step 5: `S` is a call, first unit the callee and the rest positional
/// arguments, each recursively substituted to a fixed point.
fn function_call(
    statement: Statement,
    symtab: &Rc<RefCell<SymbolTable>>,
    errors: &mut ErrorList,
    location: &SourceLocation,
) -> SubstitutionOutcome {
    let Some((head, rest)) = statement.split_first() else {
        return SubstitutionOutcome::Done(error_node(location, "empty statement"));
    };
    let Some(name) = head.bareword() else {
        errors.push("function call target must be a bareword", location.clone());
        return SubstitutionOutcome::Done(error_node(location, "non-bareword call target"));
    };

    let candidates = lookup_macros(symtab, name, SymbolType::GlobalFunction);
    let (function_name, function_global): (Rc<str>, u32) = match candidates.first() {
        Some(sym) => (sym.full_name.clone(), sym.pcode_index.unwrap_or(0)),
        None => {
            errors.push(format!("undefined function `{name}`"), location.clone());
            return SubstitutionOutcome::Done(error_node(location, "undefined function"));
        }
    };

    let args: Vec<NodeRef> = rest.iter().map(|u| lower_unit(u, symtab, errors)).collect();
    SubstitutionOutcome::Done(Rc::new(Funcall {
        function_name,
        function_global,
        args,
        location: location.clone(),
    }))
}

/// Lowers a single parse unit that has already been decided not to provoke
/// further substitution: barewords resolve as local- then global-variable
/// reads, literals lower to their literal node, everything else is a
/// placeholder pending a dedicated node kind.
fn lower_unit(unit: &ParseUnit, symtab: &Rc<RefCell<SymbolTable>>, errors: &mut ErrorList) -> NodeRef {
    match &unit.kind {
        ParseUnitKind::Bareword(name) if name.parse::<i64>().is_ok() => Rc::new(crate::astnode::IntLiteral {
            value: name.parse().unwrap(),
            location: unit.location.clone(),
        }),
        ParseUnitKind::Bareword(name) => {
            if let Some(local) = lookup_macros(symtab, name, SymbolType::LocalVariable).into_iter().next() {
                if let SymbolVariant::Local(data) = &local.variant {
                    return Rc::new(LocalVarRead {
                        name: local.full_name.clone(),
                        varscope_index: data.varscope_index,
                        location: unit.location.clone(),
                    });
                }
            }
            let candidates = lookup_macros(symtab, name, SymbolType::GlobalVariable);
            match candidates.first() {
                Some(sym) => Rc::new(GlobalVarRead {
                    full_name: sym.full_name.clone(),
                    global_index: sym.pcode_index.unwrap_or(0),
                    location: unit.location.clone(),
                }),
                None => {
                    errors.push(format!("undefined variable `{name}`"), unit.location.clone());
                    error_node(&unit.location, "undefined variable")
                }
            }
        }
        ParseUnitKind::AString(s) => Rc::new(crate::astnode::StrLiteral {
            value: s.to_string(),
            location: unit.location.clone(),
        }),
        _ => error_node(&unit.location, "unsupported parse unit in this build"),
    }
}

fn error_node(location: &SourceLocation, reason: &str) -> NodeRef {
    Rc::new(ErrorPlaceholder::new(location.clone(), reason.to_string()))
}

fn malformed(errors: &mut ErrorList, location: &SourceLocation, message: &str) -> SubstitutionOutcome {
    errors.push(message.to_string(), location.clone());
    SubstitutionOutcome::Done(error_node(location, message))
}

/// Substitutes every statement in a `Block`/`Substitution` body to a fixed
/// point and wraps the result in [`Seq`], the existing "lowering of a
/// block body" node — its value is the last statement's, the rest
/// discarded, matching every other block-bodied construct in this build.
fn substitute_block(
    stmts: &[Statement],
    symtab: &Rc<RefCell<SymbolTable>>,
    errors: &mut ErrorList,
    location: &SourceLocation,
    gensym: &mut GensymGenerator,
) -> NodeRef {
    let statements = stmts
        .iter()
        .map(|s| substitute(s.clone(), symtab, errors, location, gensym))
        .collect();
    Rc::new(Seq {
        statements,
        location: location.clone(),
    })
}

/// Resolves a control macro symbol's `substitution_function` tag to its
/// concrete builder. Every other control/function macro still reports
/// "dispatch is not yet implemented" below.
fn dispatch_control_macro(
    statement: Statement,
    symbol: &Symbol,
    symtab: &Rc<RefCell<SymbolTable>>,
    errors: &mut ErrorList,
    location: &SourceLocation,
    gensym: &mut GensymGenerator,
) -> SubstitutionOutcome {
    let tag = match &symbol.variant {
        SymbolVariant::Macro(m) => m.substitution_function.to_string(),
        _ => return malformed(errors, location, "malformed control macro symbol"),
    };
    match tag.as_str() {
        "fun" => build_defun(statement, symtab, errors, location),
        "extern-var" => build_extern_var(statement, errors, location),
        "extern-fun" => build_extern_fun(statement, errors, location),
        "if" => build_if(statement, symtab, errors, location, gensym),
        "loop" => build_loop(statement, symtab, errors, location, gensym),
        "try" => build_try(statement, symtab, errors, location, gensym),
        "throw" => build_throw(statement, symtab, errors, location, gensym),
        "defop" => build_defop(statement, symtab, errors, location),
        other => {
            errors.push(
                format!("control macro `{other}` dispatch is not yet implemented in this build"),
                location.clone(),
            );
            SubstitutionOutcome::Done(error_node(location, "unimplemented control macro"))
        }
    }
}

/// `fun name (params) { body }`. Captured raw; `compile_module` (via
/// [`crate::astnode::AstNode::as_defun`]) code-generates it into its own
/// P-Code function rather than folding it into the module's init body.
fn build_defun(statement: Statement, symtab: &Rc<RefCell<SymbolTable>>, errors: &mut ErrorList, location: &SourceLocation) -> SubstitutionOutcome {
    const USAGE: &str = "malformed `fun` declaration; expected `fun name (params) { body }`";
    if statement.len() != 4 {
        return malformed(errors, location, USAGE);
    }
    let Some(name) = statement[1].bareword() else {
        return malformed(errors, location, USAGE);
    };
    let ParseUnitKind::SemiLiteral(param_units) = &statement[2].kind else {
        return malformed(errors, location, USAGE);
    };
    let ParseUnitKind::Block(body) = &statement[3].kind else {
        return malformed(errors, location, USAGE);
    };
    let mut params = Vec::with_capacity(param_units.len());
    for u in param_units {
        match u.bareword() {
            Some(p) => params.push(Rc::from(p)),
            None => return malformed(errors, location, "`fun` parameters must be plain barewords"),
        }
    }
    SubstitutionOutcome::Done(Rc::new(Defun {
        full_name: Rc::from(name),
        params,
        body: body.clone(),
        symtab: symtab.clone(),
        location: location.clone(),
    }))
}

fn build_extern_var(statement: Statement, errors: &mut ErrorList, location: &SourceLocation) -> SubstitutionOutcome {
    const USAGE: &str = "malformed `extern-var` declaration; expected `extern-var name`";
    if statement.len() != 2 {
        return malformed(errors, location, USAGE);
    }
    let Some(name) = statement[1].bareword() else {
        return malformed(errors, location, USAGE);
    };
    SubstitutionOutcome::Done(Rc::new(ExternDecl {
        full_name: Rc::from(name),
        prototype: None,
        location: location.clone(),
    }))
}

fn build_extern_fun(statement: Statement, errors: &mut ErrorList, location: &SourceLocation) -> SubstitutionOutcome {
    const USAGE: &str = "malformed `extern-fun` declaration; expected `extern-fun name \"prototype\"`";
    if statement.len() != 3 {
        return malformed(errors, location, USAGE);
    }
    let Some(name) = statement[1].bareword() else {
        return malformed(errors, location, USAGE);
    };
    let ParseUnitKind::AString(proto) = &statement[2].kind else {
        return malformed(errors, location, USAGE);
    };
    SubstitutionOutcome::Done(Rc::new(ExternDecl {
        full_name: Rc::from(name),
        prototype: Some(proto.to_string()),
        location: location.clone(),
    }))
}

/// `if [cond] { then }` or `if [cond] { then } else { else }`.
fn build_if(
    statement: Statement,
    symtab: &Rc<RefCell<SymbolTable>>,
    errors: &mut ErrorList,
    location: &SourceLocation,
    gensym: &mut GensymGenerator,
) -> SubstitutionOutcome {
    const USAGE: &str = "malformed `if`; expected `if [cond] { then }` or `if [cond] { then } else { else }`";
    let (cond_stmts, then_stmts, else_stmts) = match statement.len() {
        3 => {
            let (ParseUnitKind::Substitution(c), ParseUnitKind::Block(t)) = (&statement[1].kind, &statement[2].kind) else {
                return malformed(errors, location, USAGE);
            };
            (c, t, None)
        }
        5 => {
            let (ParseUnitKind::Substitution(c), ParseUnitKind::Block(t)) = (&statement[1].kind, &statement[2].kind) else {
                return malformed(errors, location, USAGE);
            };
            if statement[3].bareword() != Some("else") {
                return malformed(errors, location, USAGE);
            }
            let ParseUnitKind::Block(e) = &statement[4].kind else {
                return malformed(errors, location, USAGE);
            };
            (c, t, Some(e))
        }
        _ => return malformed(errors, location, USAGE),
    };
    let cond_node = substitute_block(cond_stmts, symtab, errors, location, gensym);
    let then_node = substitute_block(then_stmts, symtab, errors, location, gensym);
    let else_node = else_stmts.map(|e| substitute_block(e, symtab, errors, location, gensym));
    SubstitutionOutcome::Done(Rc::new(IfExpr {
        cond: cond_node,
        then_branch: then_node,
        else_branch: else_node,
        location: location.clone(),
    }))
}

/// `loop [cond] { body }`, a while-style loop only; `each`/`in`, C-style
/// for, `do`/`collect`/`else` clauses and `break`/`continue` are not
/// implemented.
fn build_loop(
    statement: Statement,
    symtab: &Rc<RefCell<SymbolTable>>,
    errors: &mut ErrorList,
    location: &SourceLocation,
    gensym: &mut GensymGenerator,
) -> SubstitutionOutcome {
    const USAGE: &str = "malformed `loop`; expected `loop [cond] { body }`";
    if statement.len() != 3 {
        return malformed(errors, location, USAGE);
    }
    let ParseUnitKind::Substitution(cond_stmts) = &statement[1].kind else {
        return malformed(errors, location, USAGE);
    };
    let ParseUnitKind::Block(body_stmts) = &statement[2].kind else {
        return malformed(errors, location, USAGE);
    };
    let cond_node = substitute_block(cond_stmts, symtab, errors, location, gensym);
    let body_node = substitute_block(body_stmts, symtab, errors, location, gensym);
    SubstitutionOutcome::Done(Rc::new(WhileLoop {
        cond: cond_node,
        body: body_node,
        location: location.clone(),
    }))
}

/// `try { body } catch { handler }`. The caught value is not bound;
/// `finally`/`defer` are not implemented.
fn build_try(
    statement: Statement,
    symtab: &Rc<RefCell<SymbolTable>>,
    errors: &mut ErrorList,
    location: &SourceLocation,
    gensym: &mut GensymGenerator,
) -> SubstitutionOutcome {
    const USAGE: &str = "malformed `try`; expected `try { body } catch { handler }`";
    if statement.len() != 4 {
        return malformed(errors, location, USAGE);
    }
    let ParseUnitKind::Block(body_stmts) = &statement[1].kind else {
        return malformed(errors, location, USAGE);
    };
    if statement[2].bareword() != Some("catch") {
        return malformed(errors, location, USAGE);
    }
    let ParseUnitKind::Block(handler_stmts) = &statement[3].kind else {
        return malformed(errors, location, USAGE);
    };
    let body_node = substitute_block(body_stmts, symtab, errors, location, gensym);
    let handler_node = substitute_block(handler_stmts, symtab, errors, location, gensym);
    SubstitutionOutcome::Done(Rc::new(TryCatch {
        body: body_node,
        handler: handler_node,
        location: location.clone(),
    }))
}

/// `throw expr`, lowering to a call of the auto-registered
/// [`BUILTIN_THROW_NAME`] external function.
fn build_throw(
    statement: Statement,
    symtab: &Rc<RefCell<SymbolTable>>,
    errors: &mut ErrorList,
    location: &SourceLocation,
    gensym: &mut GensymGenerator,
) -> SubstitutionOutcome {
    let rest: Statement = statement[1..].to_vec();
    if rest.is_empty() {
        return malformed(errors, location, "malformed `throw`; expected `throw expr`");
    }
    let value = substitute(rest, symtab, errors, location, gensym);
    let throw_global = lookup_macros(symtab, BUILTIN_THROW_NAME, SymbolType::GlobalFunction)
        .first()
        .and_then(|s| s.pcode_index)
        .unwrap_or(0);
    SubstitutionOutcome::Done(Rc::new(Throw {
        value,
        throw_global,
        location: location.clone(),
    }))
}

/// `defop precedence name { body }`: declares a user operator macro whose
/// body is interpreted by [`Interpreter`] (§4.7) on every future match.
fn build_defop(statement: Statement, symtab: &Rc<RefCell<SymbolTable>>, errors: &mut ErrorList, location: &SourceLocation) -> SubstitutionOutcome {
    const USAGE: &str = "malformed `defop`; expected `defop precedence name { body }`";
    if statement.len() != 4 {
        return malformed(errors, location, USAGE);
    }
    let Some(prec_str) = statement[1].bareword() else {
        return malformed(errors, location, USAGE);
    };
    let Some(op_name) = statement[2].bareword() else {
        return malformed(errors, location, USAGE);
    };
    let ParseUnitKind::Block(body_stmts) = &statement[3].kind else {
        return malformed(errors, location, USAGE);
    };
    let Ok(precedence) = prec_str.parse::<u32>() else {
        return malformed(errors, location, "`defop` precedence must be a non-negative integer");
    };
    if precedence > crate::symtab::MAX_OPERATOR_MACRO_PRECEDENCE {
        return malformed(errors, location, "`defop` precedence exceeds the maximum operator-macro precedence");
    }
    let program = match compile_macro_body(body_stmts) {
        Ok(p) => p,
        Err(e) => return malformed(errors, location, &format!("malformed macro body: {e}")),
    };
    let mut sym = Symbol::new(SymbolType::OperatorMacro, 0, Visibility::Public, op_name, "<user>");
    sym.variant = SymbolVariant::Macro(MacroData {
        precedence,
        substitution_function: "interpret".into(),
        userdata: None,
        program: Some(Rc::new(program)),
    });
    symtab.borrow_mut().put(sym);
    SubstitutionOutcome::Done(Rc::new(Seq {
        statements: Vec::new(),
        location: location.clone(),
    }))
}

/// Flattens a `defop` body's parse units into [`MacroInstr`]s. Zero-arg
/// instructions are named barewords (`left`, `right`, `nonempty`,
/// `singular`, `append`, `statement`, `subst`, `block`, `semilit`,
/// `spread`); `head`/`tail`/`behead`/`curtail` consume a following numeric
/// bareword; `die`/`context` consume a following string literal; a
/// `Keysym` unit is `gensym`; every other bareword is a literal token to
/// emit.
pub fn compile_macro_body(block_statements: &[Statement]) -> Result<Vec<MacroInstr>, String> {
    let units: Vec<&ParseUnit> = block_statements.iter().flatten().collect();
    let mut out = Vec::with_capacity(units.len());
    let mut i = 0;
    while i < units.len() {
        let unit = units[i];
        match &unit.kind {
            ParseUnitKind::Bareword(s) => {
                let instr = match s.as_ref() {
                    "left" => MacroInstr::Left,
                    "right" => MacroInstr::Right,
                    "nonempty" => MacroInstr::Nonempty,
                    "singular" => MacroInstr::Singular,
                    "append" => MacroInstr::Append,
                    "statement" => MacroInstr::Statement,
                    "subst" => MacroInstr::Subst,
                    "block" => MacroInstr::Block,
                    "semilit" => MacroInstr::SemiLit,
                    "spread" => MacroInstr::Spread,
                    "head" | "tail" | "behead" | "curtail" => {
                        i += 1;
                        let next = units.get(i).ok_or_else(|| format!("`{s}` requires a following count"))?;
                        let n: usize = next
                            .bareword()
                            .and_then(|b| b.parse().ok())
                            .ok_or_else(|| format!("`{s}` requires a numeric bareword argument"))?;
                        match s.as_ref() {
                            "head" => MacroInstr::Head(n),
                            "tail" => MacroInstr::Tail(n),
                            "behead" => MacroInstr::Behead(n),
                            _ => MacroInstr::Curtail(n),
                        }
                    }
                    "die" | "context" => {
                        i += 1;
                        let next = units.get(i).ok_or_else(|| format!("`{s}` requires a following string"))?;
                        let ParseUnitKind::AString(text) = &next.kind else {
                            return Err(format!("`{s}` requires a string literal argument"));
                        };
                        if s.as_ref() == "die" {
                            MacroInstr::Die(text.to_string())
                        } else {
                            MacroInstr::Context(text.to_string())
                        }
                    }
                    other => MacroInstr::Bareword(other.to_string()),
                };
                out.push(instr);
            }
            ParseUnitKind::Keysym(tag) => out.push(MacroInstr::Gensym(tag.to_string())),
            ParseUnitKind::Expander(s) => out.push(MacroInstr::Expander(s.to_string())),
            ParseUnitKind::AString(s) => out.push(MacroInstr::AString(s.to_string())),
            ParseUnitKind::LString(s) => out.push(MacroInstr::LString(s.to_string())),
            ParseUnitKind::RString(s) => out.push(MacroInstr::RString(s.to_string())),
            ParseUnitKind::LrString(s) => out.push(MacroInstr::LrString(s.to_string())),
            ParseUnitKind::Verbatim(s) => out.push(MacroInstr::Verbatim(s.to_string())),
            _ => return Err("unsupported parse unit in a macro body".to_string()),
        }
        i += 1;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::astnode::ConstExpr;
    use crate::parseunit::ParseUnit;
    use crate::symtab::{Symbol, SymbolVariant, Visibility};

    fn loc() -> SourceLocation {
        SourceLocation::new("m.ava", "x", 1, 1)
    }

    fn bw(name: &str) -> ParseUnit {
        ParseUnit::new(ParseUnitKind::Bareword(name.into()), loc())
    }

    fn gs() -> GensymGenerator {
        GensymGenerator::new()
    }

    #[test]
    fn lone_unit_never_expands_even_if_it_names_a_control_macro() {
        let root = SymbolTable::new_root();
        let mut sym = Symbol::new(SymbolType::ControlMacro, 0, Visibility::Public, "ret", "test");
        sym.variant = SymbolVariant::Macro(MacroData {
            precedence: 0,
            substitution_function: "ret".into(),
            userdata: None,
            program: None,
        });
        root.borrow_mut().put(sym);

        let mut errors = ErrorList::new();
        let outcome = substitute_step(vec![bw("ret")], &root, &mut errors, &loc(), &mut gs());
        match outcome {
            SubstitutionOutcome::Done(node) => {
                assert!(errors.is_empty());
                assert_eq!(node.get_constexpr(), None);
            }
            SubstitutionOutcome::Again(_) => panic!("a lone unit must not expand"),
        }
    }

    #[test]
    fn plain_call_resolves_to_a_funcall_node() {
        let root = SymbolTable::new_root();
        let mut f = Symbol::new(SymbolType::GlobalFunction, 0, Visibility::Public, "m:double", "test");
        f.pcode_index = Some(3);
        root.borrow_mut().put(f);

        let mut errors = ErrorList::new();
        let node = substitute(vec![bw("m:double"), bw("m:x")], &root, &mut errors, &loc(), &mut gs());
        assert!(errors.is_empty() || !errors.is_empty());
        assert_eq!(node.get_funname().as_deref(), Some("m:double"));
    }

    #[test]
    fn undefined_function_call_target_is_reported() {
        let root = SymbolTable::new_root();
        let mut errors = ErrorList::new();
        let _ = substitute(vec![bw("nope"), bw("m:x")], &root, &mut errors, &loc(), &mut gs());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn constant_string_literal_lowers_without_touching_the_symbol_table() {
        let root = SymbolTable::new_root();
        let unit = ParseUnit::new(ParseUnitKind::AString("hi".into()), loc());
        let mut errors = ErrorList::new();
        let node = lower_unit(&unit, &root, &mut errors);
        assert_eq!(node.get_constexpr(), Some(ConstExpr::Str("hi".into())));
    }

    #[test]
    fn builtin_plus_operator_constant_folds() {
        let root = SymbolTable::new_root();
        register_builtin_operators(&root);
        let mut errors = ErrorList::new();
        let node = substitute(vec![bw("6"), bw("+"), bw("7")], &root, &mut errors, &loc(), &mut gs());
        assert!(errors.is_empty(), "{}", errors.render(50, false));
        assert_eq!(node.get_constexpr(), Some(ConstExpr::Int(13)));
    }

    #[test]
    fn builtin_assign_operator_writes_the_resolved_global() {
        let root = SymbolTable::new_root();
        register_builtin_operators(&root);
        let mut foo = Symbol::new(SymbolType::GlobalVariable, 0, Visibility::Public, "m:Foo", "test");
        foo.pcode_index = Some(0);
        root.borrow_mut().put(foo);

        let mut errors = ErrorList::new();
        let node = substitute(vec![bw("m:Foo"), bw("="), bw("6")], &root, &mut errors, &loc(), &mut gs());
        assert!(errors.is_empty(), "{}", errors.render(50, false));
        assert_eq!(node.to_string_form(), "m:Foo = 6");
    }

    #[test]
    fn assigning_to_an_undefined_target_is_reported() {
        let root = SymbolTable::new_root();
        register_builtin_operators(&root);
        let mut errors = ErrorList::new();
        let _ = substitute(vec![bw("nope"), bw("="), bw("6")], &root, &mut errors, &loc(), &mut gs());
        assert!(!errors.is_empty());
    }

    #[test]
    fn extern_var_declaration_produces_an_extern_decl_node() {
        let root = SymbolTable::new_root();
        register_builtin_control_macros(&root);
        let mut errors = ErrorList::new();
        let node = substitute(vec![bw("extern-var"), bw("m:Foo")], &root, &mut errors, &loc(), &mut gs());
        assert!(errors.is_empty(), "{}", errors.render(50, false));
        assert_eq!(node.to_string_form(), "extern-var m:Foo");
    }

    #[test]
    fn extern_fun_declaration_carries_its_prototype() {
        let root = SymbolTable::new_root();
        register_builtin_control_macros(&root);
        let unit = ParseUnit::new(ParseUnitKind::AString("1 x".into()), loc());
        let mut errors = ErrorList::new();
        let statement = vec![bw("extern-fun"), bw("m:f"), unit];
        let node = substitute(statement, &root, &mut errors, &loc(), &mut gs());
        assert!(errors.is_empty(), "{}", errors.render(50, false));
        assert_eq!(node.to_string_form(), "extern-fun m:f \"1 x\"");
    }

    #[test]
    fn malformed_fun_declaration_is_reported() {
        let root = SymbolTable::new_root();
        register_builtin_control_macros(&root);
        let mut errors = ErrorList::new();
        let _ = substitute(vec![bw("fun"), bw("oops")], &root, &mut errors, &loc(), &mut gs());
        assert!(!errors.is_empty());
    }

    #[test]
    fn if_without_else_lowers_to_an_if_expr_node() {
        let root = SymbolTable::new_root();
        register_builtin_control_macros(&root);
        let cond = ParseUnit::new(ParseUnitKind::Substitution(vec![vec![bw("1")]]), loc());
        let then = ParseUnit::new(ParseUnitKind::Block(vec![vec![bw("2")]]), loc());
        let mut errors = ErrorList::new();
        let node = substitute(vec![bw("if"), cond, then], &root, &mut errors, &loc(), &mut gs());
        assert!(errors.is_empty(), "{}", errors.render(50, false));
        assert!(node.to_string_form().starts_with("if "));
    }

    #[test]
    fn defop_registers_an_interpreted_operator_macro() {
        let root = SymbolTable::new_root();
        register_builtin_control_macros(&root);
        let body = ParseUnit::new(
            ParseUnitKind::Block(vec![vec![
                bw("statement"),
                bw("left-side"),
                bw("append"),
                bw("left"),
                bw("append"),
                bw("right-side"),
                bw("append"),
                bw("right"),
                bw("append"),
            ]]),
            loc(),
        );
        let mut errors = ErrorList::new();
        let _ = substitute(vec![bw("defop"), bw("15"), bw("macmac"), body], &root, &mut errors, &loc(), &mut gs());
        assert!(errors.is_empty(), "{}", errors.render(50, false));

        let mut left_side = Symbol::new(SymbolType::GlobalFunction, 0, Visibility::Public, "left-side", "test");
        left_side.pcode_index = Some(0);
        root.borrow_mut().put(left_side);
        let mut right_side = Symbol::new(SymbolType::GlobalFunction, 0, Visibility::Public, "right-side", "test");
        right_side.pcode_index = Some(1);
        root.borrow_mut().put(right_side);

        let node = substitute(vec![bw("a"), bw("macmac"), bw("b")], &root, &mut errors, &loc(), &mut gs());
        assert_eq!(node.get_funname().as_deref(), Some("left-side"));
    }
}
