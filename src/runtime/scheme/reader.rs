#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Reader turning Scheme source text into data.

use super::value::Value;
use crate::error::SchemeError;

/// Wraps `datum` as `(name datum)`, for the quote shorthands.
fn wrap(name: &str, datum: Value) -> Value {
    Value::list(vec![Value::symbol(name), datum])
}

/// Classifies a bare token as a number, boolean, or symbol.
fn classify(token: &str) -> Result<Value, &'static str> {
    if token == "." {
        return Err("datum");
    }
    match token {
        "#t" | "true" => return Ok(Value::Bool(true)),
        "#f" | "false" => return Ok(Value::Bool(false)),
        _ => {}
    }

    let numeric = token
        .trim_start_matches(['+', '-'])
        .trim_start_matches('.')
        .starts_with(|c: char| c.is_ascii_digit());
    if numeric {
        if let Ok(i) = token.parse::<i64>() {
            return Ok(Value::Int(i));
        }
        if let Ok(f) = token.parse::<f64>() {
            return Ok(Value::Float(f));
        }
    }
    Ok(Value::symbol(&token.to_lowercase()))
}

peg::parser! {
    /// Grammar for Scheme source text.
    grammar scheme() for str {
        /// Whitespace and `;` comments.
        rule _ = quiet!{ ([' ' | '\t' | '\r' | '\n'] / ";" [^'\n']*)* }

        /// Skips leading whitespace and comments, returning where the next
        /// datum starts.
        pub rule skip() -> usize
            = _ p:position!() [_]* { p }

        /// The datum at the start of the input, and where it ends.
        pub rule leading() -> (Value, usize)
            = d:datum() p:position!() [_]* { (d, p) }

        /// One datum.
        rule datum() -> Value
            = quoted() / list() / string() / atom()

        /// Quote shorthands.
        rule quoted() -> Value
            = "'" _ d:datum() { wrap("quote", d) }
            / "`" _ d:datum() { wrap("quasiquote", d) }
            / ",@" _ d:datum() { wrap("unquote-splicing", d) }
            / "," _ d:datum() { wrap("unquote", d) }

        /// Proper or dotted list.
        rule list() -> Value
            = "(" _ items:(datum() ** _) _ tail:dotted()? ")" {
                Value::list_with_tail(items, tail.unwrap_or(Value::Nil))
            }

        /// The `. tail` of a dotted list.
        rule dotted() -> Value
            = "." _ d:datum() _ { d }

        /// Double-quoted string with backslash escapes.
        rule string() -> Value
            = "\"" chars:string_char()* "\"" { Value::string(chars.into_iter().collect::<String>()) }

        /// One character inside a string literal.
        rule string_char() -> char
            = "\\n" { '\n' }
            / "\\t" { '\t' }
            / "\\\\" { '\\' }
            / "\\\"" { '"' }
            / c:[^'"' | '\\'] { c }

        /// Number, boolean, or symbol.
        rule atom() -> Value
            = token:$(atom_char()+) {? classify(token) }

        /// Characters that may appear in a bare token.
        rule atom_char()
            = [^' ' | '\t' | '\r' | '\n' | '(' | ')' | '"' | ';' | '\'' | '`' | ',']
    }
}

/// Reads data from source text one at a time, so each can be evaluated
/// before the next is read.
pub struct Forms<'a> {
    /// Text not yet read.
    rest: &'a str,
}

impl<'a> Forms<'a> {
    /// Starts reading `source`.
    pub fn new(source: &'a str) -> Self {
        Self { rest: source }
    }
}

impl Iterator for Forms<'_> {
    type Item = Result<Value, SchemeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = scheme::skip(self.rest).unwrap_or(self.rest.len());
        if start >= self.rest.len() {
            self.rest = "";
            return None;
        }
        let rest = &self.rest[start..];
        match scheme::leading(rest) {
            Ok((datum, end)) => {
                self.rest = &rest[end..];
                Some(Ok(datum))
            }
            Err(e) => {
                self.rest = "";
                Some(Err(SchemeError::Syntax(e.to_string())))
            }
        }
    }
}

/// Reads every datum in `source`.
pub fn read_program(source: &str) -> Result<Vec<Value>, SchemeError> {
    Forms::new(source).collect()
}
