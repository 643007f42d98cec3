//! User-macro interpreter (C7): a tiny stack machine that executes a macro
//! body (itself a list of macro instructions) to rewrite the statement that
//! provoked it.
//!
//! The stack holds elements that are either parse statements or parse
//! units, discriminated explicitly (§4.7). Execution starts with one empty
//! statement on the stack, plus the `left`/`right` context (units before
//! and after the provoker in the invoking statement). It terminates
//! successfully when exactly one non-empty statement remains.

use super::gensym::GensymGenerator;
use crate::error::SourceLocation;
use crate::parseunit::{ParseUnit, ParseUnitKind, Statement};

#[derive(Debug, Clone)]
pub enum StackElem {
    Statement(Statement),
    Unit(ParseUnit),
}

impl StackElem {
    fn as_statement_mut(&mut self) -> Result<&mut Statement, String> {
        match self {
            StackElem::Statement(s) => Ok(s),
            StackElem::Unit(_) => Err("expected a statement on top of stack, found a unit".into()),
        }
    }
}

/// One macro instruction (§4.7). The concrete sigil-driven textual encoding
/// a macro body is authored in (`parse_source`) compiles down to this set.
#[derive(Debug, Clone)]
pub enum MacroInstr {
    Statement,
    Subst,
    Block,
    SemiLit,
    Spread,
    Bareword(String),
    HashBareword(String),
    ContextVar,
    Expander(String),
    AString(String),
    LString(String),
    RString(String),
    LrString(String),
    Verbatim(String),
    Gensym(String),
    Left,
    Right,
    Head(usize),
    Tail(usize),
    Behead(usize),
    Curtail(usize),
    Nonempty,
    Singular,
    Append,
    Die(String),
    Context(String),
}

pub struct Interpreter<'a> {
    stack: Vec<StackElem>,
    left: Statement,
    right: Statement,
    gensym: &'a mut GensymGenerator,
    location: SourceLocation,
    diagnostic_label: Option<String>,
}

impl<'a> Interpreter<'a> {
    pub fn new(left: Statement, right: Statement, gensym: &'a mut GensymGenerator, location: SourceLocation) -> Self {
        Interpreter {
            stack: vec![StackElem::Statement(Vec::new())],
            left,
            right,
            gensym,
            location,
            diagnostic_label: None,
        }
    }

    pub fn run(mut self, program: &[MacroInstr]) -> Result<Statement, String> {
        for instr in program {
            self.step(instr)?;
        }
        match self.stack.len() {
            1 => match self.stack.pop().unwrap() {
                StackElem::Statement(s) if !s.is_empty() => Ok(s),
                StackElem::Statement(_) => Err("macro body left an empty statement".into()),
                StackElem::Unit(_) => Err("macro body left a bare unit, not a statement".into()),
            },
            n => Err(format!("macro body left {n} elements on the stack, expected 1")),
        }
    }

    fn unit(&self, kind: ParseUnitKind) -> ParseUnit {
        ParseUnit::new(kind, self.location.clone())
    }

    fn step(&mut self, instr: &MacroInstr) -> Result<(), String> {
        match instr {
            MacroInstr::Statement => self.stack.push(StackElem::Statement(Vec::new())),
            MacroInstr::Subst => self.stack.push(StackElem::Unit(self.unit(ParseUnitKind::Substitution(Vec::new())))),
            MacroInstr::Block => self.stack.push(StackElem::Unit(self.unit(ParseUnitKind::Block(Vec::new())))),
            MacroInstr::SemiLit => self.stack.push(StackElem::Unit(self.unit(ParseUnitKind::SemiLiteral(Vec::new())))),
            MacroInstr::Spread => {
                let top = self.pop_unit()?;
                self.stack.push(StackElem::Unit(self.unit(ParseUnitKind::Spread(Box::new(top)))));
            }
            MacroInstr::Bareword(s) => self.stack.push(StackElem::Unit(self.unit(ParseUnitKind::Bareword(s.as_str().into())))),
            MacroInstr::HashBareword(s) => {
                self.stack
                    .push(StackElem::Unit(self.unit(ParseUnitKind::Bareword(format!("#{s}#").into()))));
            }
            MacroInstr::ContextVar => self.stack.push(StackElem::Unit(self.unit(ParseUnitKind::Bareword("$".into())))),
            MacroInstr::Expander(s) => self.stack.push(StackElem::Unit(self.unit(ParseUnitKind::Expander(s.as_str().into())))),
            MacroInstr::AString(s) => self.stack.push(StackElem::Unit(self.unit(ParseUnitKind::AString(s.as_str().into())))),
            MacroInstr::LString(s) => self.stack.push(StackElem::Unit(self.unit(ParseUnitKind::LString(s.as_str().into())))),
            MacroInstr::RString(s) => self.stack.push(StackElem::Unit(self.unit(ParseUnitKind::RString(s.as_str().into())))),
            MacroInstr::LrString(s) => self.stack.push(StackElem::Unit(self.unit(ParseUnitKind::LrString(s.as_str().into())))),
            MacroInstr::Verbatim(s) => self.stack.push(StackElem::Unit(self.unit(ParseUnitKind::Verbatim(s.as_str().into())))),
            MacroInstr::Gensym(tag) => {
                let name = self.gensym.gensym(&self.location, tag);
                self.stack.push(StackElem::Unit(self.unit(ParseUnitKind::Bareword(name.into()))));
            }
            MacroInstr::Left => self.stack.push(StackElem::Statement(self.left.clone())),
            MacroInstr::Right => self.stack.push(StackElem::Statement(self.right.clone())),
            MacroInstr::Head(n) => {
                let s = self.top_statement_mut()?;
                s.truncate((*n).min(s.len()));
            }
            MacroInstr::Tail(n) => {
                let s = self.top_statement_mut()?;
                let start = s.len().saturating_sub(*n);
                *s = s.split_off(start);
            }
            MacroInstr::Behead(n) => {
                let s = self.top_statement_mut()?;
                let n = (*n).min(s.len());
                *s = s.split_off(n);
            }
            MacroInstr::Curtail(n) => {
                let s = self.top_statement_mut()?;
                s.truncate(s.len().saturating_sub(*n));
            }
            MacroInstr::Nonempty => {
                let s = self.top_statement_mut()?;
                if s.is_empty() {
                    return Err(self.missing_argument_message());
                }
            }
            MacroInstr::Singular => {
                let s = self.pop_statement()?;
                if s.len() != 1 {
                    return Err(format!("expected a single-unit statement, found {}", s.len()));
                }
                self.stack.push(StackElem::Unit(s.into_iter().next().unwrap()));
            }
            MacroInstr::Append => self.append()?,
            MacroInstr::Die(msg) => return Err(msg.clone()),
            MacroInstr::Context(label) => self.diagnostic_label = Some(label.clone()),
        }
        Ok(())
    }

    fn missing_argument_message(&self) -> String {
        match &self.diagnostic_label {
            Some(label) => format!("missing argument: {label}"),
            None => "missing argument".to_string(),
        }
    }

    fn pop_unit(&mut self) -> Result<ParseUnit, String> {
        match self.stack.pop() {
            Some(StackElem::Unit(u)) => Ok(u),
            Some(StackElem::Statement(_)) => Err("expected a unit on top of stack, found a statement".into()),
            None => Err("stack underflow".into()),
        }
    }

    fn pop_statement(&mut self) -> Result<Statement, String> {
        match self.stack.pop() {
            Some(StackElem::Statement(s)) => Ok(s),
            Some(StackElem::Unit(_)) => Err("expected a statement on top of stack, found a unit".into()),
            None => Err("stack underflow".into()),
        }
    }

    fn top_statement_mut(&mut self) -> Result<&mut Statement, String> {
        self.stack.last_mut().ok_or_else(|| "stack underflow".to_string())?.as_statement_mut()
    }

    /// Pops the source element and appends it into the container now on
    /// top, per the per-container-type rules in §4.7: a statement
    /// concatenates a source statement or accepts a unit; a block or
    /// substitution unit accepts a source statement (as one of its child
    /// statements); a semi-literal unit accepts either, flattening a source
    /// statement's units in.
    fn append(&mut self) -> Result<(), String> {
        let source = self.stack.pop().ok_or("stack underflow appending")?;
        let container = self.stack.last_mut().ok_or("stack underflow appending")?;
        match container {
            StackElem::Statement(dst) => match source {
                StackElem::Statement(s) => dst.extend(s),
                StackElem::Unit(u) => dst.push(u),
            },
            StackElem::Unit(u) => match &mut u.kind {
                ParseUnitKind::Block(stmts) | ParseUnitKind::Substitution(stmts) => match source {
                    StackElem::Statement(s) => stmts.push(s),
                    StackElem::Unit(_) => return Err("block/substitution only accepts a statement".into()),
                },
                ParseUnitKind::SemiLiteral(units) => match source {
                    StackElem::Statement(s) => units.extend(s),
                    StackElem::Unit(u) => units.push(u),
                },
                _ => return Err("this unit kind does not accept append".into()),
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> SourceLocation {
        SourceLocation::new("m.ava", "a macmac b c", 1, 1)
    }

    fn bw(name: &str) -> ParseUnit {
        ParseUnit::new(ParseUnitKind::Bareword(name.into()), loc())
    }

    /// Models the §8 scenario 5 example: a macro `op 30 \macmac
    /// { %left-side >+ %right-side }` expanded between `a macmac b c`
    /// rewrites to `left-side a right-side b c`. Here `left-side`/
    /// `right-side` stand for the resolved operator-function barewords;
    /// `>+` takes the first unit of the right side and prepends it.
    #[test]
    fn slicing_example_rewrites_infix_to_prefix_form() {
        let mut gensym = GensymGenerator::new();
        let left = vec![bw("a")];
        let right = vec![bw("b"), bw("c")];
        let program = vec![
            MacroInstr::Statement,
            MacroInstr::Bareword("left-side".into()),
            MacroInstr::Append,
            MacroInstr::Left,
            MacroInstr::Append,
            MacroInstr::Bareword("right-side".into()),
            MacroInstr::Append,
            MacroInstr::Right,
            MacroInstr::Append,
        ];
        let interp = Interpreter::new(left, right, &mut gensym, loc());
        let result = interp.run(&program).unwrap();
        let names: Vec<&str> = result.iter().map(|u| u.bareword().unwrap()).collect();
        assert_eq!(names, vec!["left-side", "a", "right-side", "b", "c"]);
    }

    #[test]
    fn nonempty_fails_with_context_label_on_empty_statement() {
        let mut gensym = GensymGenerator::new();
        let program = vec![MacroInstr::Context("who".into()), MacroInstr::Nonempty];
        let interp = Interpreter::new(Vec::new(), Vec::new(), &mut gensym, loc());
        let err = interp.run(&program).unwrap_err();
        assert!(err.contains("who"));
    }

    #[test]
    fn terminates_with_error_when_more_than_one_element_remains() {
        let mut gensym = GensymGenerator::new();
        let program = vec![MacroInstr::Statement];
        let interp = Interpreter::new(Vec::new(), Vec::new(), &mut gensym, loc());
        assert!(interp.run(&program).is_err());
    }

    #[test]
    fn singular_unwraps_a_one_element_statement() {
        let mut gensym = GensymGenerator::new();
        let program = vec![
            MacroInstr::Statement,
            MacroInstr::Bareword("only".into()),
            MacroInstr::Append,
            MacroInstr::Singular,
            MacroInstr::Statement,
            MacroInstr::Append,
        ];
        let interp = Interpreter::new(Vec::new(), Vec::new(), &mut gensym, loc());
        let result = interp.run(&program).unwrap();
        assert_eq!(result[0].bareword(), Some("only"));
    }
}
