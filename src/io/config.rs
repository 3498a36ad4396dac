//! Basic `.ini` configuration files holding literal values.
//!
//! Every value is written in literal form: integers, floats, quoted strings, `True`/`False`,
//! `None`, and tuples, lists and dictionaries of these. Reading a file collects the keys of every
//! section, including `[DEFAULT]`, into one map. Values that are not valid literals are rejected
//! rather than kept as raw text.
use eyre::{eyre, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter, Write as _};
use std::path::Path;

/// Name of the section keys are stored in.
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// A literal value of a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
    Tuple(Vec<ConfigValue>),
    List(Vec<ConfigValue>),
    Dict(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// The value as a float, converting integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// The items of a tuple or list.
    pub fn as_list(&self) -> Option<&[ConfigValue]> {
        match self {
            Self::Tuple(items) | Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            Self::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// The items of a tuple or list as floats, if all of them are numbers.
    pub fn as_float_list(&self) -> Option<Vec<f64>> {
        self.as_list()?.iter().map(Self::as_float).collect()
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<ConfigValue>> From<Option<T>> for ConfigValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::None, Into::into)
    }
}

impl From<Vec<f64>> for ConfigValue {
    fn from(values: Vec<f64>) -> Self {
        Self::List(values.into_iter().map(Self::Float).collect())
    }
}

fn write_quoted(f: &mut Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('\'')?;
    for c in s.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '\'' => f.write_str("\\'")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('\'')
}

fn write_items(f: &mut Formatter<'_>, items: &[ConfigValue]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

/// Literal form of the value, readable again by [`parse_value`].
impl Display for ConfigValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) if x.is_nan() => f.write_str("float('nan')"),
            Self::Float(x) if x.is_infinite() => {
                write!(f, "float('{}inf')", if *x < 0.0 { "-" } else { "" })
            }
            // Debug formatting always keeps a decimal point or exponent
            Self::Float(x) => write!(f, "{:?}", x),
            Self::Str(s) => write_quoted(f, s),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::None => f.write_str("None"),
            Self::Tuple(items) => {
                f.write_char('(')?;
                write_items(f, items)?;
                if items.len() == 1 {
                    f.write_char(',')?;
                }
                f.write_char(')')
            }
            Self::List(items) => {
                f.write_char('[')?;
                write_items(f, items)?;
                f.write_char(']')
            }
            Self::Dict(map) => {
                f.write_char('{')?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_quoted(f, key)?;
                    write!(f, ": {}", value)?;
                }
                f.write_char('}')
            }
        }
    }
}

/// Failure to read a literal value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    error: String,
    position: usize,
}

impl ParseError {
    fn new(position: usize, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            position,
        }
    }

    /// Character offset into the value text.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} at position {}", self.error, self.position)
    }
}

impl std::error::Error for ParseError {}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    text: &'a str,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
            text,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.get(self.pos).map_or(false, |c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.get(self.pos).copied()
    }

    fn expect(&mut self, c: char) -> Result<(), ParseError> {
        match self.peek() {
            Some(found) if found == c => {
                self.pos += 1;
                Ok(())
            }
            Some(found) => Err(ParseError::new(self.pos, format!("expected {:?}, found {:?}", c, found))),
            None => Err(ParseError::new(self.pos, format!("expected {:?}, found end of input", c))),
        }
    }

    fn value(&mut self) -> Result<ConfigValue, ParseError> {
        match self.peek() {
            None => Err(ParseError::new(self.pos, "unexpected end of input")),
            Some('\'') | Some('"') => self.string().map(ConfigValue::Str),
            Some('[') => self.sequence('[', ']').map(|(items, _)| ConfigValue::List(items)),
            Some('(') => {
                let (items, trailing_comma) = self.sequence('(', ')')?;
                match items.len() {
                    // A parenthesized single value without a comma is not a tuple
                    1 if !trailing_comma => Ok(items.into_iter().next().unwrap_or(ConfigValue::None)),
                    _ => Ok(ConfigValue::Tuple(items)),
                }
            }
            Some('{') => self.dict(),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            Some(c) if c.is_alphabetic() => self.word(),
            Some(c) => Err(ParseError::new(self.pos, format!("unexpected character {:?}", c))),
        }
    }

    fn string(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        let quote = self.chars[self.pos];
        self.pos += 1;
        let mut result = String::new();
        loop {
            let c = *self
                .chars
                .get(self.pos)
                .ok_or_else(|| ParseError::new(start, "unterminated string"))?;
            self.pos += 1;
            match c {
                c if c == quote => return Ok(result),
                '\\' => {
                    let escaped = *self
                        .chars
                        .get(self.pos)
                        .ok_or_else(|| ParseError::new(start, "unterminated string"))?;
                    self.pos += 1;
                    result.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        '0' => '\0',
                        other => other,
                    });
                }
                c => result.push(c),
            }
        }
    }

    /// Items up to `close`, and whether the last item was followed by a comma.
    fn sequence(&mut self, open: char, close: char) -> Result<(Vec<ConfigValue>, bool), ParseError> {
        self.expect(open)?;
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok((items, trailing_comma));
            }
            items.push(self.value()?);
            trailing_comma = false;
            match self.peek() {
                Some(',') => {
                    self.pos += 1;
                    trailing_comma = true;
                }
                Some(c) if c == close => {}
                _ => return Err(ParseError::new(self.pos, format!("expected ',' or {:?}", close))),
            }
        }
    }

    fn dict(&mut self) -> Result<ConfigValue, ParseError> {
        self.expect('{')?;
        let mut map = BTreeMap::new();
        loop {
            match self.peek() {
                Some('}') => {
                    self.pos += 1;
                    return Ok(ConfigValue::Dict(map));
                }
                Some('\'') | Some('"') => {}
                _ => return Err(ParseError::new(self.pos, "dictionary keys must be strings")),
            }
            let key = self.string()?;
            self.expect(':')?;
            let value = self.value()?;
            map.insert(key, value);
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                _ => return Err(ParseError::new(self.pos, "expected ',' or '}'")),
            }
        }
    }

    fn number(&mut self) -> Result<ConfigValue, ParseError> {
        let start = self.pos;
        while let Some(&c) = self.chars.get(self.pos) {
            let exponent_sign = (c == '-' || c == '+')
                && self.pos > start
                && matches!(self.chars[self.pos - 1], 'e' | 'E');
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || c == '_' || exponent_sign || self.pos == start {
                self.pos += 1;
            } else {
                break;
            }
        }
        let token: String = self.chars[start..self.pos].iter().filter(|&&c| c != '_').collect();
        if let Ok(i) = token.parse::<i64>() {
            Ok(ConfigValue::Int(i))
        } else {
            token
                .parse::<f64>()
                .map(ConfigValue::Float)
                .map_err(|err| ParseError::new(start, format!("failed to parse {:?} as a number: {}", token, err)))
        }
    }

    fn word(&mut self) -> Result<ConfigValue, ParseError> {
        let start = self.pos;
        while self.chars.get(self.pos).map_or(false, |c| c.is_alphanumeric() || *c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" => Ok(ConfigValue::Bool(true)),
            "False" => Ok(ConfigValue::Bool(false)),
            "None" => Ok(ConfigValue::None),
            "float" => {
                self.expect('(')?;
                if !matches!(self.peek(), Some('\'') | Some('"')) {
                    return Err(ParseError::new(self.pos, "expected a quoted float"));
                }
                let inner = self.string()?;
                self.expect(')')?;
                inner
                    .trim()
                    .parse::<f64>()
                    .map(ConfigValue::Float)
                    .map_err(|err| ParseError::new(start, format!("invalid float {:?}: {}", inner, err)))
            }
            _ => Err(ParseError::new(start, format!("{:?} is not a literal", word))),
        }
    }

    fn finish(mut self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(c) => Err(ParseError::new(
                self.pos,
                format!("unexpected {:?} after value in {:?}", c, self.text),
            )),
        }
    }
}

/// Parses one literal value.
pub fn parse_value(text: &str) -> Result<ConfigValue, ParseError> {
    let mut parser = Parser::new(text);
    let value = parser.value()?;
    parser.finish()?;
    Ok(value)
}

/// Parses the text of a configuration file.
///
/// Lines are `key = value` or `key: value`; indented lines continue the previous value. Section
/// headers are accepted and their keys merged, later keys replacing earlier ones.
pub fn parse_basic_config(text: &str) -> eyre::Result<BTreeMap<String, ConfigValue>> {
    let mut entries: Vec<(String, String, usize)> = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            let (_, value, _) = entries
                .last_mut()
                .ok_or_else(|| eyre!("Line {}: continuation without a key", lineno + 1))?;
            value.push('\n');
            value.push_str(trimmed);
            continue;
        }
        if trimmed.starts_with('[') {
            if !trimmed.ends_with(']') {
                return Err(eyre!("Line {}: malformed section header {:?}", lineno + 1, trimmed));
            }
            continue;
        }

        let split = trimmed
            .find(|c| c == '=' || c == ':')
            .ok_or_else(|| eyre!("Line {}: expected 'key = value', found {:?}", lineno + 1, trimmed))?;
        let key = trimmed[..split].trim();
        if key.is_empty() {
            return Err(eyre!("Line {}: empty key", lineno + 1));
        }
        entries.push((key.to_string(), trimmed[split + 1..].trim().to_string(), lineno + 1));
    }

    entries
        .into_iter()
        .map(|(key, value, lineno)| {
            let parsed = parse_value(&value).wrap_err_with(|| format!("Line {}: invalid value for {:?}", lineno, key))?;
            Ok((key, parsed))
        })
        .collect()
}

/// Reads the configuration file `path` into a map of keys to values.
pub fn read_basic_config(path: impl AsRef<Path>) -> eyre::Result<BTreeMap<String, ConfigValue>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).wrap_err_with(|| format!("Cannot read config file {:?}", path))?;
    parse_basic_config(&text).wrap_err_with(|| format!("Cannot parse config file {:?}", path))
}

/// Text of a configuration file with every entry of `values` in the default section, keys sorted.
pub fn format_basic_config(values: &BTreeMap<String, ConfigValue>) -> String {
    let mut text = format!("[{}]\n", DEFAULT_SECTION);
    for (key, value) in values {
        let _ = writeln!(text, "{} = {}", key, value);
    }
    text.push('\n');
    text
}

/// Writes `values` to the configuration file `path`, replacing it.
pub fn store_basic_config(path: impl AsRef<Path>, values: &BTreeMap<String, ConfigValue>) -> eyre::Result<()> {
    let path = path.as_ref();
    for key in values.keys() {
        if key.is_empty() || key.contains(|c: char| c == '=' || c == ':' || c == '\n') || key.starts_with('[') {
            return Err(eyre!("Invalid config key {:?}", key));
        }
    }
    std::fs::write(path, format_basic_config(values)).wrap_err_with(|| format!("Cannot write config file {:?}", path))
}
