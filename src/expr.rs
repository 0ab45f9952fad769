//! Placeholder interpolation and embedded-data literals.
//!
//! Two small languages live here. `{name}` placeholders in attribute values
//! and hrefs interpolate against the current object or model; tokenization is
//! cached globally since templates repeat heavily across blocks. Embedded
//! data like `action="Comment(author: {id}, status: 'new')"` is parsed by a
//! sandboxed literal parser that accepts maps, lists, strings, numbers, and
//! booleans and nothing else. Markup can never execute code.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::WeftError;
use crate::object::Object;
use crate::schema::Model;

// ─────────────────────────────────────────────────────────────
// Placeholder interpolation
// ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Byte range of literal text in the source template.
    Literal(Range<usize>),
    /// Placeholder name, braces stripped.
    Placeholder(String),
}

static TOKEN_CACHE: Lazy<DashMap<String, Arc<Vec<Token>>>> = Lazy::new(DashMap::new);

fn tokenize(template: &str) -> Arc<Vec<Token>> {
    if let Some(cached) = TOKEN_CACHE.get(template) {
        return cached.clone();
    }

    let mut tokens = Vec::new();
    let bytes = template.as_bytes();
    let mut lit_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(close) = template[i + 1..].find('}') {
                let name = &template[i + 1..i + 1 + close];
                // A brace pair with no name or inner braces is literal text.
                if !name.is_empty() && !name.contains('{') {
                    if lit_start < i {
                        tokens.push(Token::Literal(lit_start..i));
                    }
                    tokens.push(Token::Placeholder(name.to_string()));
                    i += close + 2;
                    lit_start = i;
                    continue;
                }
            }
        }
        i += 1;
    }
    if lit_start < bytes.len() {
        tokens.push(Token::Literal(lit_start..bytes.len()));
    }

    let tokens = Arc::new(tokens);
    TOKEN_CACHE.insert(template.to_string(), tokens.clone());
    tokens
}

/// What a placeholder resolves against.
pub enum Scope<'a> {
    None,
    Object(&'a Object),
    Model(&'a Model),
    Values(&'a HashMap<String, Value>),
}

impl Scope<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        match self {
            Scope::None => None,
            Scope::Object(obj) => match name {
                "id" => Some(obj.id.clone()),
                "model" => Some(obj.model.clone()),
                _ => obj.get(name).and_then(|v| v.first()).map(|e| e.as_str()),
            },
            Scope::Model(model) => match name {
                "model" | "name" => Some(model.name.clone()),
                "href" => Some(model.href.clone()),
                _ => None,
            },
            Scope::Values(map) => map.get(name).map(|v| match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            }),
        }
    }
}

/// Replace `{name}` placeholders with values from the scope. Placeholders the
/// scope cannot resolve are left intact so a later pass (or the reader) can
/// see what was asked for.
pub fn interpolate(template: &str, scope: &Scope<'_>) -> String {
    if !template.contains('{') {
        return template.to_string();
    }
    let tokens = tokenize(template);
    let mut out = String::with_capacity(template.len());
    for token in tokens.iter() {
        match token {
            Token::Literal(range) => out.push_str(&template[range.clone()]),
            Token::Placeholder(name) => match scope.lookup(name) {
                Some(val) => out.push_str(&val),
                None => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
            },
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────
// Literal parser
// ─────────────────────────────────────────────────────────────

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
        }
    }

    fn err(&self, details: impl Into<String>) -> WeftError {
        WeftError::ExpressionParse {
            position: self.pos,
            details: details.into(),
        }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn expect(&mut self, b: u8) -> Result<(), WeftError> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.err(format!("expected '{}'", b as char)))
        }
    }

    fn value(&mut self) -> Result<Value, WeftError> {
        self.skip_ws();
        match self.peek() {
            Some(b'{') => self.map(),
            Some(b'[') => self.list(),
            Some(b'\'') | Some(b'"') => self.quoted(),
            Some(b) if b == b'-' || b.is_ascii_digit() => self.number(),
            Some(_) => self.bare_word(),
            None => Err(self.err("unexpected end of input")),
        }
    }

    fn map(&mut self) -> Result<Value, WeftError> {
        self.expect(b'{')?;
        let mut map = Map::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::Object(map));
        }
        loop {
            self.skip_ws();
            let key = match self.peek() {
                Some(b'\'') | Some(b'"') => match self.quoted()? {
                    Value::String(s) => s,
                    _ => unreachable!(),
                },
                _ => self.ident()?,
            };
            self.skip_ws();
            self.expect(b':')?;
            let val = self.value()?;
            map.insert(key, val);
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b'}') => return Ok(Value::Object(map)),
                _ => return Err(self.err("expected ',' or '}' in map")),
            }
        }
    }

    fn list(&mut self) -> Result<Value, WeftError> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b']') => return Ok(Value::Array(items)),
                _ => return Err(self.err("expected ',' or ']' in list")),
            }
        }
    }

    fn quoted(&mut self) -> Result<Value, WeftError> {
        let quote = self.bump().ok_or_else(|| self.err("expected quote"))?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(b'\\') => match self.bump() {
                    Some(b'n') => out.push('\n'),
                    Some(b't') => out.push('\t'),
                    Some(b) => out.push(b as char),
                    None => return Err(self.err("unterminated escape")),
                },
                Some(b) if b == quote => return Ok(Value::String(out)),
                Some(b) => {
                    // Re-slice on char boundaries for multibyte input.
                    if b < 0x80 {
                        out.push(b as char);
                    } else {
                        let start = self.pos - 1;
                        let mut end = self.pos;
                        while end < self.bytes.len() && !self.src.is_char_boundary(end) {
                            end += 1;
                        }
                        out.push_str(&self.src[start..end]);
                        self.pos = end;
                    }
                }
                None => return Err(self.err("unterminated string")),
            }
        }
    }

    fn number(&mut self) -> Result<Value, WeftError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        let mut saw_dot = false;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.pos += 1;
            } else if b == b'.' && !saw_dot {
                saw_dot = true;
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        if saw_dot {
            text.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| self.err("bad number"))
        } else {
            text.parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .map_err(|_| self.err("bad number"))
        }
    }

    fn ident(&mut self) -> Result<String, WeftError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if start == self.pos {
            return Err(self.err("expected identifier"));
        }
        Ok(self.src[start..self.pos].to_string())
    }

    fn bare_word(&mut self) -> Result<Value, WeftError> {
        let word = self.ident()?;
        Ok(match word.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            _ => Value::String(word),
        })
    }
}

/// Parse a self-contained literal: `{k: v}`, `[..]`, quoted strings, numbers,
/// `true`/`false`/`null`, or a bare word (treated as a string).
pub fn parse_literal(src: &str) -> Result<Value, WeftError> {
    let mut parser = Parser::new(src);
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != parser.bytes.len() {
        return Err(parser.err("trailing input after literal"));
    }
    Ok(value)
}

/// Parse embedded directive data: interpolate placeholders against the scope,
/// then parse as a map literal. Malformed data is logged and ignored rather
/// than failing the whole block.
pub fn parse_embedded_data(src: &str, scope: &Scope<'_>) -> Option<Map<String, Value>> {
    let interpolated = interpolate(src, scope);
    let wrapped = if interpolated.trim_start().starts_with('{') {
        interpolated
    } else {
        format!("{{{interpolated}}}")
    };
    match parse_literal(&wrapped) {
        Ok(Value::Object(map)) => Some(map),
        Ok(other) => {
            warn!(got = %other, "embedded data is not a key/value literal");
            None
        }
        Err(e) => {
            warn!(error = %e, data = %src, "ignoring malformed embedded data");
            None
        }
    }
}
