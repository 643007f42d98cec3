//! Minimal parser collaborator.
//!
//! Spec.md treats the parser as an external collaborator that the macro
//! engine never reinvokes; this module exists only to produce concrete
//! `ParseUnit`/`Statement` trees from an Avalanche-like surface syntax so the
//! rest of the pipeline (C4-C9) has something real to build and test
//! against. It is deliberately small: bareword/string/numeric tokens,
//! blocks, substitutions, semi-literals. Matching Avalanche's full concrete
//! grammar is not a goal.

use crate::error::SourceLocation;
use crate::parseunit::{ParseUnit, ParseUnitKind, Statement};
use std::rc::Rc;

pub struct Parser<'a> {
    filename: Rc<str>,
    source: Rc<str>,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    line: u32,
    col: u32,
}

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub col: u32,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for ParseError {}

type PResult<T> = Result<T, ParseError>;

impl<'a> Parser<'a> {
    pub fn new(filename: impl Into<Rc<str>>, text: &'a str) -> Self {
        Parser {
            filename: filename.into(),
            source: Rc::from(text),
            chars: text.char_indices().peekable(),
            line: 1,
            col: 1,
        }
    }

    /// Parses the whole source as a sequence of statements.
    pub fn parse_program(mut self) -> PResult<Vec<Statement>> {
        self.parse_statements(None)
    }

    fn loc(&self) -> SourceLocation {
        SourceLocation::new(self.filename.clone(), self.source.clone(), self.line, self.col)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn skip_inline_space(&mut self) {
        while matches!(self.peek(), Some(c) if c == ' ' || c == '\t') {
            self.bump();
        }
    }

    fn skip_space_and_terminators(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace() || c == ';') {
            self.bump();
        }
    }

    /// Parses statements until EOF or, when `closing` is set, until that
    /// delimiter is encountered (the delimiter is *not* consumed here).
    fn parse_statements(&mut self, closing: Option<char>) -> PResult<Vec<Statement>> {
        let mut statements = Vec::new();
        loop {
            self.skip_space_and_terminators();
            match self.peek() {
                None => break,
                Some(c) if Some(c) == closing => break,
                _ => {}
            }
            let stmt = self.parse_statement(closing)?;
            if !stmt.is_empty() {
                statements.push(stmt);
            }
        }
        Ok(statements)
    }

    fn parse_statement(&mut self, closing: Option<char>) -> PResult<Statement> {
        let mut units = Vec::new();
        loop {
            self.skip_inline_space();
            match self.peek() {
                None => break,
                Some('\n') | Some(';') => break,
                Some(c) if Some(c) == closing => break,
                _ => {}
            }
            units.push(self.parse_unit()?);
        }
        Ok(units)
    }

    fn parse_unit(&mut self) -> PResult<ParseUnit> {
        let start = self.loc();
        match self.peek() {
            Some('*') => {
                self.bump();
                let inner = self.parse_unit()?;
                Ok(ParseUnit::new(ParseUnitKind::Spread(Box::new(inner)), start))
            }
            Some(':') => {
                self.bump();
                let word = self.read_ident();
                Ok(ParseUnit::new(ParseUnitKind::Keysym(word.into()), start))
            }
            Some('%') => {
                self.bump();
                let word = self.read_ident();
                Ok(ParseUnit::new(ParseUnitKind::Expander(word.into()), start))
            }
            Some('`') => {
                self.bump();
                let text = self.read_delimited('`')?;
                Ok(ParseUnit::new(ParseUnitKind::Verbatim(text.into()), start))
            }
            Some('{') => {
                self.bump();
                let stmts = self.parse_statements(Some('}'))?;
                self.expect('}')?;
                Ok(ParseUnit::new(ParseUnitKind::Block(stmts), start))
            }
            Some('[') => {
                self.bump();
                let stmts = self.parse_statements(Some(']'))?;
                self.expect(']')?;
                Ok(ParseUnit::new(ParseUnitKind::Substitution(stmts), start))
            }
            Some('(') => {
                self.bump();
                let mut units = Vec::new();
                loop {
                    self.skip_space_and_terminators();
                    if self.peek() == Some(')') {
                        break;
                    }
                    if self.peek().is_none() {
                        return Err(self.err("unterminated semi-literal"));
                    }
                    units.push(self.parse_unit()?);
                }
                self.expect(')')?;
                Ok(ParseUnit::new(ParseUnitKind::SemiLiteral(units), start))
            }
            Some('"') => self.parse_quoted(start, ParseUnitKind::AString as fn(Rc<str>) -> ParseUnitKind),
            Some(c) if c.is_alphabetic() && self.looks_like_string_prefix() => {
                self.parse_prefixed_string(start)
            }
            Some(_) => {
                let word = self.read_ident();
                if word.is_empty() {
                    let bad = self.bump().unwrap();
                    return Err(ParseError {
                        message: format!("unexpected character {bad:?}"),
                        line: start.start_line,
                        col: start.start_col,
                    });
                }
                Ok(ParseUnit::new(ParseUnitKind::Bareword(word.into()), start))
            }
            None => Err(self.err("unexpected end of input")),
        }
    }

    /// A run of uppercase L/R letters immediately followed by a quote, e.g.
    /// `L"..."`, `R"..."`, `LR"..."`.
    fn looks_like_string_prefix(&mut self) -> bool {
        let mut iter = self.chars.clone();
        let mut saw_letter = false;
        loop {
            match iter.peek() {
                Some((_, 'L')) | Some((_, 'R')) => {
                    saw_letter = true;
                    iter.next();
                }
                Some((_, '"')) => return saw_letter,
                _ => return false,
            }
        }
    }

    fn parse_prefixed_string(&mut self, start: SourceLocation) -> PResult<ParseUnit> {
        let prefix = self.read_ident();
        let kind_fn: fn(Rc<str>) -> ParseUnitKind = match prefix.as_str() {
            "L" => ParseUnitKind::LString,
            "R" => ParseUnitKind::RString,
            "LR" => ParseUnitKind::LrString,
            other => {
                return Err(ParseError {
                    message: format!("unknown string prefix {other:?}"),
                    line: start.start_line,
                    col: start.start_col,
                });
            }
        };
        self.parse_quoted(start, kind_fn)
    }

    fn parse_quoted(&mut self, start: SourceLocation, kind_fn: fn(Rc<str>) -> ParseUnitKind) -> PResult<ParseUnit> {
        self.expect('"')?;
        let text = self.read_delimited('"')?;
        Ok(ParseUnit::new(kind_fn(text.into()), start))
    }

    fn read_delimited(&mut self, close: char) -> PResult<String> {
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.err("unterminated literal")),
                Some(c) if c == close => return Ok(text),
                Some('\\') => {
                    if let Some(escaped) = self.bump() {
                        text.push(escaped);
                    }
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn read_ident(&mut self) -> String {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == '$' || c == '.' {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn expect(&mut self, c: char) -> PResult<()> {
        if self.peek() == Some(c) {
            self.bump();
            Ok(())
        } else {
            Err(self.err(&format!("expected {c:?}")))
        }
    }

    fn err(&self, message: &str) -> ParseError {
        ParseError {
            message: message.to_string(),
            line: self.line,
            col: self.col,
        }
    }
}

pub fn parse(filename: impl Into<Rc<str>>, text: &str) -> PResult<Vec<Statement>> {
    Parser::new(filename, text).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bareword_statement() {
        let stmts = parse("m.ava", "Foo = 6 + 7").unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].len(), 4);
        assert_eq!(stmts[0][0].bareword(), Some("Foo"));
    }

    #[test]
    fn parses_block_and_substitution() {
        let stmts = parse("m.ava", "fun f { ret [1] }").unwrap();
        assert_eq!(stmts[0].len(), 3);
        assert!(matches!(stmts[0][2].kind, ParseUnitKind::Block(_)));
    }

    #[test]
    fn parses_prefixed_strings() {
        let stmts = parse("m.ava", r#"x = L"left""#).unwrap();
        assert!(matches!(stmts[0][2].kind, ParseUnitKind::LString(_)));
    }

    #[test]
    fn parses_semi_literal_and_spread() {
        let stmts = parse("m.ava", "f (a b) *c").unwrap();
        assert!(matches!(stmts[0][1].kind, ParseUnitKind::SemiLiteral(_)));
        assert!(stmts[0][2].is_spread());
    }

    #[test]
    fn multiple_statements_split_on_newline() {
        let stmts = parse("m.ava", "a = 1\nb = 2").unwrap();
        assert_eq!(stmts.len(), 2);
    }
}
