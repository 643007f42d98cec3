//! Function-prototype parsing: the argument-binding spec attached to a
//! symbol's variant data for functions.
//!
//! The textual form is `"<min-arity> <binding> <binding> ..."`. Each binding
//! token is a plain name (positional), `-name` (named), `\*name` (varargs),
//! or `--` (empty marker, used to close off positional binding before named
//! arguments begin). A binding may be followed by a bracketed default,
//! `[literal]`, which turns it into the `-with-default` variant of its kind.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Positional,
    PositionalWithDefault,
    Named,
    NamedWithDefault,
    Varargs,
    EmptyMarker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentBinding {
    pub kind: BindingKind,
    pub name: String,
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionPrototype {
    pub min_arity: u32,
    pub bindings: Vec<ArgumentBinding>,
}

#[derive(Debug)]
pub enum PrototypeError {
    Malformed(String),
}

impl fmt::Display for PrototypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrototypeError::Malformed(s) => write!(f, "malformed function prototype: {s}"),
        }
    }
}

impl std::error::Error for PrototypeError {}

impl From<String> for PrototypeError {
    fn from(s: String) -> Self {
        PrototypeError::Malformed(s)
    }
}

impl FunctionPrototype {
    /// Parses a prototype spec such as `"1 arg1 -greeting [Hello] \*rest"`.
    pub fn parse(spec: &str) -> Result<Self, PrototypeError> {
        let mut tokens = spec.split_whitespace().peekable();

        let min_arity: u32 = tokens
            .next()
            .ok_or_else(|| PrototypeError::Malformed("empty prototype".into()))?
            .parse()
            .map_err(|_| PrototypeError::Malformed("arity is not an integer".into()))?;

        let mut bindings = Vec::new();
        while let Some(tok) = tokens.next() {
            let (mut kind, name) = if let Some(rest) = tok.strip_prefix('-') {
                if rest.is_empty() {
                    (BindingKind::EmptyMarker, String::new())
                } else {
                    (BindingKind::Named, rest.to_string())
                }
            } else if let Some(rest) = tok.strip_prefix('\\') {
                let rest = rest.strip_prefix('*').ok_or_else(|| {
                    PrototypeError::Malformed(format!("unrecognised varargs token {tok:?}"))
                })?;
                (BindingKind::Varargs, rest.to_string())
            } else {
                (BindingKind::Positional, tok.to_string())
            };

            let mut default_value = None;
            if let Some(peeked) = tokens.peek() {
                if peeked.starts_with('[') {
                    let raw = tokens.next().unwrap();
                    let inner = raw
                        .strip_prefix('[')
                        .and_then(|s| s.strip_suffix(']'))
                        .ok_or_else(|| {
                            PrototypeError::Malformed(format!("unterminated default {raw:?}"))
                        })?;
                    default_value = Some(inner.to_string());
                    kind = match kind {
                        BindingKind::Positional => BindingKind::PositionalWithDefault,
                        BindingKind::Named => BindingKind::NamedWithDefault,
                        other => other,
                    };
                }
            }

            bindings.push(ArgumentBinding {
                kind,
                name,
                default_value,
            });
        }

        Ok(FunctionPrototype {
            min_arity,
            bindings,
        })
    }

    /// Whether a static call supplying `positional_count` unnamed arguments
    /// and `named` argument names can possibly bind, ignoring varargs spread.
    pub fn can_statically_bind(&self, positional_count: usize, named: &[&str]) -> bool {
        let required_positional = self
            .bindings
            .iter()
            .filter(|b| b.kind == BindingKind::Positional)
            .count();
        if positional_count < required_positional.min(self.min_arity as usize) {
            return false;
        }
        named.iter().all(|n| {
            self.bindings.iter().any(|b| {
                b.name == *n
                    && matches!(b.kind, BindingKind::Named | BindingKind::NamedWithDefault)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positional_and_named_with_default() {
        let p = FunctionPrototype::parse(r#"1 who -greeting [Hello]"#).unwrap();
        assert_eq!(p.min_arity, 1);
        assert_eq!(p.bindings[0].kind, BindingKind::Positional);
        assert_eq!(p.bindings[1].kind, BindingKind::NamedWithDefault);
        assert_eq!(p.bindings[1].default_value.as_deref(), Some("Hello"));
    }

    #[test]
    fn parses_varargs() {
        let p = FunctionPrototype::parse(r"0 \*rest").unwrap();
        assert_eq!(p.bindings[0].kind, BindingKind::Varargs);
        assert_eq!(p.bindings[0].name, "rest");
    }

    #[test]
    fn rejects_non_integer_arity() {
        assert!(FunctionPrototype::parse("x arg1").is_err());
    }

    #[test]
    fn static_binding_rejects_unknown_named_argument() {
        let p = FunctionPrototype::parse("1 who").unwrap();
        assert!(!p.can_statically_bind(1, &["greeting"]));
    }
}
