//! Minimal S-expression reader/writer used as the textual substrate for the
//! P-Code list-of-lists form (§3, §4.6). Keeping the tokeniser generic
//! means `Instruction`/`GlobalItem` only need a conversion to and from
//! `Sexp`, not a hand-rolled lexer each.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Sexp {
    Atom(String),
    List(Vec<Sexp>),
}

impl Sexp {
    pub fn atom(s: impl Into<String>) -> Sexp {
        Sexp::Atom(s.into())
    }

    pub fn list(items: Vec<Sexp>) -> Sexp {
        Sexp::List(items)
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Sexp::Atom(s) => Some(s),
            Sexp::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sexp]> {
        match self {
            Sexp::List(items) => Some(items),
            Sexp::Atom(_) => None,
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(s) => {
                if s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '(' || c == ')' || c == '"') {
                    write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
                } else {
                    write!(f, "{s}")
                }
            }
            Sexp::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[derive(Debug)]
pub struct SexpParseError(pub String);

impl fmt::Display for SexpParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed s-expression: {}", self.0)
    }
}

impl std::error::Error for SexpParseError {}

pub fn parse(text: &str) -> Result<Sexp, SexpParseError> {
    let mut chars = text.chars().peekable();
    let result = parse_one(&mut chars)?;
    skip_ws(&mut chars);
    Ok(result)
}

pub fn parse_many(text: &str) -> Result<Vec<Sexp>, SexpParseError> {
    let mut chars = text.chars().peekable();
    let mut out = Vec::new();
    loop {
        skip_ws(&mut chars);
        if chars.peek().is_none() {
            break;
        }
        out.push(parse_one(&mut chars)?);
    }
    Ok(out)
}

fn skip_ws(chars: &mut std::iter::Peekable<std::str::Chars>) {
    while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
        chars.next();
    }
}

fn parse_one(chars: &mut std::iter::Peekable<std::str::Chars>) -> Result<Sexp, SexpParseError> {
    skip_ws(chars);
    match chars.peek() {
        Some('(') => {
            chars.next();
            let mut items = Vec::new();
            loop {
                skip_ws(chars);
                match chars.peek() {
                    Some(')') => {
                        chars.next();
                        return Ok(Sexp::List(items));
                    }
                    None => return Err(SexpParseError("unterminated list".into())),
                    _ => items.push(parse_one(chars)?),
                }
            }
        }
        Some('"') => {
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    None => return Err(SexpParseError("unterminated string atom".into())),
                    Some('"') => break,
                    Some('\\') => {
                        if let Some(escaped) = chars.next() {
                            s.push(escaped);
                        }
                    }
                    Some(c) => s.push(c),
                }
            }
            Ok(Sexp::Atom(s))
        }
        Some(_) => {
            let mut s = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '(' || c == ')' {
                    break;
                }
                s.push(c);
                chars.next();
            }
            if s.is_empty() {
                Err(SexpParseError("expected atom or list".into()))
            } else {
                Ok(Sexp::Atom(s))
            }
        }
        None => Err(SexpParseError("unexpected end of input".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_nested_list() {
        let s = Sexp::list(vec![
            Sexp::atom("fun"),
            Sexp::atom("m:Foo"),
            Sexp::list(vec![Sexp::atom("a"), Sexp::atom("b")]),
        ]);
        let printed = s.to_string();
        let parsed = parse(&printed).unwrap();
        assert_eq!(parsed, s);
    }

    #[test]
    fn quotes_atoms_with_special_characters() {
        let s = Sexp::atom("has space");
        let printed = s.to_string();
        assert_eq!(parse(&printed).unwrap(), s);
    }
}
