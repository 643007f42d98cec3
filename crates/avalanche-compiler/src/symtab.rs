//! Symbol table (C2): a tree of lexical scope frames with visibility,
//! strong/weak import aliasing, and ambiguity detection.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Visibility {
    Private,
    Internal,
    Public,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    GlobalVariable,
    GlobalFunction,
    LocalVariable,
    LocalFunction,
    Struct,
    ControlMacro,
    OperatorMacro,
    FunctionMacro,
    Other,
}

/// Variant data carried by macro symbols. Operator macros alone may have a
/// non-zero precedence (`AVA_MAX_OPERATOR_MACRO_PRECEDENCE` in the original
/// runtime is 40).
pub const MAX_OPERATOR_MACRO_PRECEDENCE: u32 = 40;

#[derive(Debug, Clone)]
pub struct MacroData {
    pub precedence: u32,
    pub substitution_function: Rc<str>,
    pub userdata: Option<String>,
    /// A user-authored macro body (`defop`, §4.7), run by
    /// `macros::interpreter::Interpreter` when `substitution_function`
    /// is `"interpret"`. `None` for the built-in operators, which lower
    /// straight to an AST node instead of interpreting a program.
    pub program: Option<Rc<Vec<crate::macros::MacroInstr>>>,
}

#[derive(Debug, Clone)]
pub struct FunctionData {
    /// Unparsed prototype spec; parsed lazily via `avc_core::FunctionPrototype`.
    pub prototype_spec: String,
    pub varscope_id: Option<usize>,
}

/// A function-local variable's binding, resolved through `Varscope`.
#[derive(Debug, Clone)]
pub struct LocalData {
    pub varscope_index: usize,
}

#[derive(Debug, Clone)]
pub enum SymbolVariant {
    None,
    Macro(MacroData),
    Function(FunctionData),
    Local(LocalData),
}

/// `{type, level, visibility, pcode-index, definer, full-name, variant-data}`.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub symbol_type: SymbolType,
    pub level: u32,
    pub visibility: Visibility,
    pub pcode_index: Option<u32>,
    pub definer: Rc<str>,
    pub full_name: Rc<str>,
    pub variant: SymbolVariant,
}

impl Symbol {
    pub fn new(symbol_type: SymbolType, level: u32, visibility: Visibility, full_name: impl Into<Rc<str>>, definer: impl Into<Rc<str>>) -> Self {
        Symbol {
            symbol_type,
            level,
            visibility,
            pcode_index: None,
            definer: definer.into(),
            full_name: full_name.into(),
            variant: SymbolVariant::None,
        }
    }
}

#[derive(Debug, Clone)]
struct Import {
    old_prefix: String,
    new_prefix: String,
    absolute: bool,
    strong: bool,
}

pub struct SymbolTable {
    parent: Option<Weak<RefCell<SymbolTable>>>,
    level: u32,
    symbols: HashMap<Rc<str>, Symbol>,
    /// Insertion-ordered; reverse order is searched during lookup so the
    /// most recently added import shadows earlier ones.
    imports: Vec<Import>,
}

/// Result of `put`: `None` on success, `Some(prior)` when a symbol with the
/// same full name already existed in this frame.
pub type PutResult = Option<Symbol>;

impl SymbolTable {
    pub fn new_root() -> Rc<RefCell<SymbolTable>> {
        Rc::new(RefCell::new(SymbolTable {
            parent: None,
            level: 0,
            symbols: HashMap::new(),
            imports: Vec::new(),
        }))
    }

    pub fn new_child(parent: &Rc<RefCell<SymbolTable>>, level: u32) -> Rc<RefCell<SymbolTable>> {
        Rc::new(RefCell::new(SymbolTable {
            parent: Some(Rc::downgrade(parent)),
            level,
            symbols: HashMap::new(),
            imports: Vec::new(),
        }))
    }

    /// Inserts `symbol` into this frame. The symbol's level must match this
    /// frame's level. Returns the prior symbol if a conflict exists; the new
    /// symbol is inserted regardless (substitution continues past the error,
    /// as the error-accumulator contract requires downstream passes to keep
    /// running).
    pub fn put(&mut self, symbol: Symbol) -> PutResult {
        debug_assert_eq!(
            symbol.level, self.level,
            "symbol inserted into a frame whose level does not match"
        );
        let prior = self.symbols.insert(symbol.full_name.clone(), symbol);
        if prior.is_some() {
            tracing::debug!("symbol table conflict on duplicate full name");
        }
        prior
    }

    pub fn import(&mut self, old_prefix: impl Into<String>, new_prefix: impl Into<String>, absolute: bool, strong: bool) {
        self.imports.push(Import {
            old_prefix: old_prefix.into(),
            new_prefix: new_prefix.into(),
            absolute,
            strong,
        });
    }

    /// Looks up `name`, applying this frame's imports (most-recent first)
    /// and then the parent frame's, returning every distinct candidate so
    /// ambiguity is visible to the caller.
    pub fn get(table: &Rc<RefCell<SymbolTable>>, name: &str) -> Vec<Symbol> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        Self::get_into(table, name, &mut seen, &mut out);
        out
    }

    fn get_into(
        table: &Rc<RefCell<SymbolTable>>,
        name: &str,
        seen: &mut std::collections::HashSet<Rc<str>>,
        out: &mut Vec<Symbol>,
    ) {
        let this = table.borrow();

        if let Some(sym) = this.symbols.get(name) {
            if seen.insert(sym.full_name.clone()) {
                out.push(sym.clone());
            }
        }

        for import in this.imports.iter().rev() {
            let candidate_name = Self::rewrite(name, import);
            if let Some(candidate) = candidate_name {
                if let Some(sym) = this.symbols.get(candidate.as_str()) {
                    if seen.insert(sym.full_name.clone()) {
                        out.push(sym.clone());
                    }
                }
            }
            if import.absolute {
                // Absolute imports stop the search: once one matches (or is
                // eligible to match), weaker ancestor-scope candidates are
                // not considered for this name.
                if Self::rewrite(name, import).is_some() {
                    return;
                }
            }
        }

        if let Some(parent) = this.parent.as_ref().and_then(|p| p.upgrade()) {
            drop(this);
            Self::get_into(&parent, name, seen, out);
        }
    }

    /// Rewrites `query` by replacing `new_prefix` with `old_prefix` when the
    /// query begins with `new_prefix`.
    fn rewrite(query: &str, import: &Import) -> Option<String> {
        query
            .strip_prefix(import.new_prefix.as_str())
            .map(|rest| format!("{}{}", import.old_prefix, rest))
    }

    /// The `alias-more-visible-than-target` diagnostic (§9 open question):
    /// an alias symbol may not claim a visibility wider than the symbol it
    /// re-exports. Execution continues past the error once emitted.
    pub fn check_alias_visibility(alias: &Symbol, target: &Symbol) -> Option<String> {
        if alias.visibility > target.visibility {
            Some(format!(
                "alias `{}` is more visible ({:?}) than its target `{}` ({:?})",
                alias.full_name, alias.visibility, target.full_name, target.visibility
            ))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str, level: u32) -> Symbol {
        Symbol::new(SymbolType::GlobalVariable, level, Visibility::Public, name, "test")
    }

    #[test]
    fn put_then_get_returns_the_symbol() {
        let root = SymbolTable::new_root();
        root.borrow_mut().put(sym("m:Foo", 0));
        let found = SymbolTable::get(&root, "m:Foo");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].full_name.as_ref(), "m:Foo");
    }

    #[test]
    fn put_conflict_returns_prior_but_still_inserts() {
        let root = SymbolTable::new_root();
        let prior = root.borrow_mut().put(sym("m:Foo", 0));
        assert!(prior.is_none());
        let prior2 = root.borrow_mut().put(sym("m:Foo", 0));
        assert!(prior2.is_some());
        assert_eq!(SymbolTable::get(&root, "m:Foo").len(), 1);
    }

    #[test]
    fn child_scope_inherits_and_can_shadow() {
        let root = SymbolTable::new_root();
        root.borrow_mut().put(sym("m:Foo", 0));
        let child = SymbolTable::new_child(&root, 1);
        assert_eq!(SymbolTable::get(&child, "m:Foo").len(), 1);
        child.borrow_mut().put(sym("m:Bar", 1));
        assert_eq!(SymbolTable::get(&child, "m:Bar").len(), 1);
        assert_eq!(SymbolTable::get(&root, "m:Bar").len(), 0);
    }

    #[test]
    fn weak_import_ambiguity_surfaces_two_candidates() {
        let root = SymbolTable::new_root();
        root.borrow_mut().put(sym("a:x", 0));
        root.borrow_mut().put(sym("b:x", 0));
        root.borrow_mut().import("a:", "", false, false);
        root.borrow_mut().import("b:", "", false, false);
        let found = SymbolTable::get(&root, "x");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn alias_more_visible_than_target_is_flagged() {
        let alias = Symbol::new(SymbolType::Other, 0, Visibility::Public, "a", "t");
        let target = Symbol::new(SymbolType::GlobalVariable, 0, Visibility::Private, "b", "t");
        assert!(SymbolTable::check_alias_visibility(&alias, &target).is_some());
    }

    #[test]
    fn alias_no_more_visible_than_target_is_fine() {
        let alias = Symbol::new(SymbolType::Other, 0, Visibility::Private, "a", "t");
        let target = Symbol::new(SymbolType::GlobalVariable, 0, Visibility::Public, "b", "t");
        assert!(SymbolTable::check_alias_visibility(&alias, &target).is_none());
    }
}
