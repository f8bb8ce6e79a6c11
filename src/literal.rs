//! Loose literal parsing for model output.
//!
//! Stage prompts ask the model to answer with a Python-style literal, most
//! often a list such as `[["question", "table"]]`. Responses arrive wrapped in
//! markdown fences, use either quote style, and are sometimes surrounded by
//! prose. Nothing here falls back silently: every function returns a
//! `Result` and the caller picks its own fallback value.

use lazy_static::lazy_static;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;
use thiserror::Error;

/// Deepest nesting accepted before parsing gives up.
pub const MAX_DEPTH: usize = 128;

lazy_static! {
    static ref FENCE: Regex = Regex::new(r"(?i)```[a-z]*").expect("fence pattern is valid");
}

/// A literal value as produced by the model.
///
/// Tuples are folded into `List`; dict keys keep their insertion order.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Literal>),
    Dict(Vec<(Literal, Literal)>),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("empty input")]
    Empty,

    #[error("unexpected character '{found}' at offset {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("trailing content at offset {0}")]
    TrailingContent(usize),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),

    #[error("no bracketed list found")]
    NoList,

    #[error("nesting deeper than {0} levels")]
    TooDeep(usize),
}

impl Literal {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Literal]> {
        match self {
            Literal::List(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a string key in a dict literal.
    pub fn get(&self, key: &str) -> Option<&Literal> {
        match self {
            Literal::Dict(entries) => entries
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// Text form used when a literal is spliced back into a prompt or a
    /// description: strings are unquoted, everything else uses `Display`.
    pub fn to_plain_string(&self) -> String {
        match self {
            Literal::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::None => write!(f, "None"),
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{:?}", x),
            Literal::Str(s) => {
                write!(f, "'")?;
                for c in s.chars() {
                    match c {
                        '\'' => write!(f, "\\'")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "'")
            }
            Literal::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Literal::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Serialize for Literal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Literal::None => serializer.serialize_none(),
            Literal::Bool(b) => serializer.serialize_bool(*b),
            Literal::Int(i) => serializer.serialize_i64(*i),
            Literal::Float(x) => serializer.serialize_f64(*x),
            Literal::Str(s) => serializer.serialize_str(s),
            Literal::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Literal::Dict(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(&k.to_plain_string(), v)?;
                }
                map.end()
            }
        }
    }
}

/// Remove markdown code fence markers (with or without a language tag).
pub fn strip_fences(text: &str) -> String {
    FENCE.replace_all(text, "").trim().to_string()
}

/// Evaluate the whole (fence-stripped) text as one literal.
pub fn parse_literal(text: &str) -> Result<Literal, ParseError> {
    let cleaned = strip_fences(text);
    let chars: Vec<char> = cleaned.chars().collect();
    if chars.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parser = Parser::new(&chars, 0);
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos < chars.len() {
        return Err(ParseError::TrailingContent(parser.pos));
    }
    Ok(value)
}

/// Return the first well-formed bracketed list literal found in `text`.
///
/// The whole text is tried first; after that every `[` is tried as the start
/// of a list, left to right.
pub fn extract_list(text: &str) -> Result<Vec<Literal>, ParseError> {
    if let Ok(Literal::List(items)) = parse_literal(text) {
        return Ok(items);
    }

    let cleaned = strip_fences(text);
    let chars: Vec<char> = cleaned.chars().collect();
    for start in (0..chars.len()).filter(|&i| chars[i] == '[') {
        let mut parser = Parser::new(&chars, start);
        if let Ok(Literal::List(items)) = parser.value() {
            return Ok(items);
        }
    }

    Err(ParseError::NoList)
}

struct Parser<'a> {
    chars: &'a [char],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(chars: &'a [char], pos: usize) -> Self {
        Self { chars, pos, depth: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn unexpected(&self) -> ParseError {
        match self.peek() {
            Some(found) => ParseError::Unexpected {
                found,
                offset: self.pos,
            },
            None => ParseError::UnexpectedEnd,
        }
    }

    fn value(&mut self) -> Result<Literal, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let value = self.value_inner();
        self.depth -= 1;
        value
    }

    fn value_inner(&mut self) -> Result<Literal, ParseError> {
        self.skip_ws();
        match self.peek() {
            None => Err(ParseError::UnexpectedEnd),
            Some('[') => {
                self.pos += 1;
                let (items, _) = self.sequence(']')?;
                Ok(Literal::List(items))
            }
            Some('(') => {
                self.pos += 1;
                let (mut items, trailing_comma) = self.sequence(')')?;
                // `(x)` is a parenthesized value, `(x,)` is a one-tuple
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Literal::List(items))
                }
            }
            Some('{') => {
                self.pos += 1;
                self.dict()
            }
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                self.string(quote).map(Literal::Str)
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(c) if c.is_alphabetic() => self.keyword(),
            Some(_) => Err(self.unexpected()),
        }
    }

    /// Comma-separated values up to `close`. Returns whether the last item
    /// was followed by a comma.
    fn sequence(&mut self, close: char) -> Result<(Vec<Literal>, bool), ParseError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(ParseError::UnexpectedEnd),
                Some(c) if c == close => {
                    self.pos += 1;
                    return Ok((items, trailing_comma));
                }
                _ => {}
            }

            items.push(self.value()?);

            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                    trailing_comma = true;
                }
                Some(c) if c == close => {
                    self.pos += 1;
                    return Ok((items, false));
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn dict(&mut self) -> Result<Literal, ParseError> {
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(ParseError::UnexpectedEnd),
                Some('}') => {
                    self.pos += 1;
                    return Ok(Literal::Dict(entries));
                }
                _ => {}
            }

            let key = self.value()?;
            self.skip_ws();
            if self.peek() != Some(':') {
                return Err(self.unexpected());
            }
            self.pos += 1;
            let value = self.value()?;
            entries.push((key, value));

            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {
                    self.pos += 1;
                    return Ok(Literal::Dict(entries));
                }
                _ => return Err(self.unexpected()),
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<String, ParseError> {
        let mut out = String::new();
        loop {
            let c = self.peek().ok_or(ParseError::UnexpectedEnd)?;
            self.pos += 1;
            if c == quote {
                return Ok(out);
            }
            if c != '\\' {
                out.push(c);
                continue;
            }

            let escape_at = self.pos - 1;
            let e = self.peek().ok_or(ParseError::UnexpectedEnd)?;
            self.pos += 1;
            match e {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                '\n' => {}
                'x' => out.push(self.hex_escape(2, escape_at)?),
                'u' => out.push(self.hex_escape(4, escape_at)?),
                other => {
                    // unknown escapes keep the backslash
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn hex_escape(&mut self, digits: usize, escape_at: usize) -> Result<char, ParseError> {
        let end = self.pos + digits;
        if end > self.chars.len() {
            return Err(ParseError::InvalidEscape(escape_at));
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        let code = u32::from_str_radix(&hex, 16).map_err(|_| ParseError::InvalidEscape(escape_at))?;
        self.pos = end;
        char::from_u32(code).ok_or(ParseError::InvalidEscape(escape_at))
    }

    fn number(&mut self) -> Result<Literal, ParseError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            let sign_ok = (c == '-' || c == '+')
                && (self.pos == start || matches!(self.chars[self.pos - 1], 'e' | 'E'));
            if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '_') || sign_ok {
                self.pos += 1;
            } else {
                break;
            }
        }

        let raw: String = self.chars[start..self.pos].iter().collect();
        let digits = raw.replace('_', "");
        let is_float = digits.contains(|c| matches!(c, '.' | 'e' | 'E'));
        let parsed = if is_float {
            digits.parse::<f64>().ok().map(Literal::Float)
        } else {
            digits.parse::<i64>().ok().map(Literal::Int)
        };
        parsed.ok_or(ParseError::InvalidNumber(raw))
    }

    fn keyword(&mut self) -> Result<Literal, ParseError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" => Ok(Literal::Bool(true)),
            "False" => Ok(Literal::Bool(false)),
            "None" => Ok(Literal::None),
            _ => Err(ParseError::Unexpected {
                found: self.chars[start],
                offset: start,
            }),
        }
    }
}
