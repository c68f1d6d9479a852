//! Route templates: `{name}` variables, `{*name}` catch-alls, `{{` / `}}`
//! escapes. The same syntax `matchit` accepts.
//!
//! Matching is matchit's job; this module only reads a template back so
//! URLs can be built from it.

use std::collections::HashMap;

use crate::error::Error;

#[derive(Clone, Debug, PartialEq)]
enum Piece {
    Literal(String),
    Var { name: String, catch_all: bool },
}

#[derive(Clone, Debug)]
pub(crate) struct Template {
    raw: String,
    pieces: Vec<Piece>,
}

impl Template {
    pub(crate) fn parse(raw: &str) -> Result<Self, Error> {
        let invalid = |reason| Error::Template { template: raw.to_owned(), reason };

        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(invalid("unmatched `}`")),
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') => return Err(invalid("nested `{`")),
                            Some(c) => name.push(c),
                            None => return Err(invalid("unclosed variable")),
                        }
                    }
                    let (name, catch_all) = match name.strip_prefix('*') {
                        Some(rest) => (rest.to_owned(), true),
                        None => (name, false),
                    };
                    if name.is_empty() {
                        return Err(invalid("empty variable name"));
                    }
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(Piece::Var { name, catch_all });
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }

        Ok(Self { raw: raw.to_owned(), pieces })
    }

    pub(crate) fn raw(&self) -> &str {
        &self.raw
    }

    pub(crate) fn has_catch_all(&self) -> bool {
        self.pieces.iter().any(|p| matches!(p, Piece::Var { catch_all: true, .. }))
    }

    /// Fills every variable from `vars`.
    pub(crate) fn expand(&self, vars: &HashMap<String, String>) -> Result<String, Error> {
        let mut out = String::with_capacity(self.raw.len());
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Var { name, .. } => {
                    let value =
                        vars.get(name).ok_or_else(|| Error::MissingVariable(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn expands_variables() {
        let t = Template::parse("/users/{id}/posts/{post}").unwrap();
        let expanded = t.expand(&vars(&[("post", "7"), ("id", "42")])).unwrap();
        assert_eq!(expanded, "/users/42/posts/7");
    }

    #[test]
    fn catch_all_and_escapes() {
        let t = Template::parse("/static/{{v}}/{*path}").unwrap();
        assert!(t.has_catch_all());
        let expanded = t.expand(&vars(&[("path", "css/site.css")])).unwrap();
        assert_eq!(expanded, "/static/{v}/css/site.css");
    }

    #[test]
    fn missing_variable_is_reported() {
        let t = Template::parse("/users/{id}").unwrap();
        let err = t.expand(&HashMap::new()).unwrap_err();
        assert!(matches!(err, Error::MissingVariable(name) if name == "id"));
    }

    #[test]
    fn rejects_malformed_templates() {
        for raw in ["/users/{id", "/users/id}", "/users/{}", "/a/{b{c}}", "/{*}"] {
            assert!(Template::parse(raw).is_err(), "{raw} should be rejected");
        }
    }
}
