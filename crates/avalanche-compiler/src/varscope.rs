//! Varscope (C3): tracks which local variables a function body touches,
//! including transitive captures from nested functions, for closure
//! lowering.
//!
//! An ordered set of `(symbol name, is_capture_from_outer)` with a stable
//! index per variable. Captures are materialised as a prefix of implicit
//! positional parameters on the prototype at code-gen time.

use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct VarscopeEntry {
    pub name: Rc<str>,
    pub is_capture: bool,
}

#[derive(Debug, Default)]
pub struct Varscope {
    entries: Vec<VarscopeEntry>,
    index_of: std::collections::HashMap<Rc<str>, usize>,
}

impl Varscope {
    pub fn new() -> Self {
        Varscope::default()
    }

    fn intern(&mut self, name: &str, is_capture: bool) -> usize {
        if let Some(&idx) = self.index_of.get(name) {
            if is_capture {
                self.entries[idx].is_capture = true;
            }
            return idx;
        }
        let idx = self.entries.len();
        let rc: Rc<str> = Rc::from(name);
        self.entries.push(VarscopeEntry {
            name: rc.clone(),
            is_capture,
        });
        self.index_of.insert(rc, idx);
        idx
    }

    /// Reading a local variable owned by this function's own scope.
    pub fn ref_var(&mut self, name: &str) -> usize {
        self.intern(name, false)
    }

    /// Reading a variable from an enclosing function: records it as a
    /// capture so it is materialised as an implicit prototype prefix.
    pub fn ref_capture(&mut self, name: &str) -> usize {
        self.intern(name, true)
    }

    /// Unions a nested function's capture set into this (the caller's)
    /// varscope: any variable the callee captured from *its* enclosing scope
    /// that is owned here becomes a capture of this function too, unless it
    /// is already present as an ordinary local.
    pub fn ref_scope(&mut self, callee: &Varscope) {
        for entry in &callee.entries {
            if entry.is_capture {
                self.intern(&entry.name, true);
            }
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index_of.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The capture prefix, in stable index order, for prototype lowering.
    pub fn capture_prefix(&self) -> Vec<Rc<str>> {
        self.entries
            .iter()
            .filter(|e| e.is_capture)
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn entries(&self) -> &[VarscopeEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_var_assigns_stable_index() {
        let mut vs = Varscope::new();
        let a = vs.ref_var("x");
        let b = vs.ref_var("x");
        assert_eq!(a, b);
    }

    #[test]
    fn ref_capture_marks_entry_and_appears_in_prefix() {
        let mut vs = Varscope::new();
        vs.ref_capture("outer");
        assert_eq!(vs.capture_prefix(), vec![Rc::from("outer")]);
    }

    #[test]
    fn ref_scope_unions_callee_captures_into_caller() {
        let mut callee = Varscope::new();
        callee.ref_capture("grandparent_var");
        callee.ref_var("own_local");

        let mut caller = Varscope::new();
        caller.ref_scope(&callee);

        assert_eq!(caller.capture_prefix(), vec![Rc::from("grandparent_var")]);
        assert!(caller.index_of("own_local").is_none());
    }
}
