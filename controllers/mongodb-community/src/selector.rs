//! Kubernetes label selectors.
//!
//! Parses the textual selector syntax accepted by the API server
//! (`app=mongodb,tier in (db,cache),!canary`) into a list of requirements
//! that can be evaluated against an object's labels and rendered back into
//! the canonical form passed to list/watch calls.
//!
//! A selector is the conjunction of its requirements; the empty selector
//! matches every object.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_NAME_LENGTH: usize = 63;
const MAX_PREFIX_LENGTH: usize = 253;

/// Errors produced while parsing a label selector.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectorParseError {
    /// A token appeared where something else was required
    #[error("found '{found}', expected: {expected}")]
    UnexpectedToken {
        /// Token that was found
        found: String,
        /// What the parser was looking for
        expected: &'static str,
    },

    /// The input ended in the middle of a requirement
    #[error("unexpected end of selector, expected: {expected}")]
    UnexpectedEnd {
        /// What the parser was looking for
        expected: &'static str,
    },

    /// A key is not a valid qualified name
    #[error("invalid label key {key:?}: {reason}")]
    InvalidKey {
        /// Offending key
        key: String,
        /// Why it was rejected
        reason: String,
    },

    /// A value is not a valid label value
    #[error("invalid label value {value:?}: {reason}")]
    InvalidValue {
        /// Offending value
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// `>` / `<` requires an integer operand
    #[error("for 'gt', 'lt' operators, the value of {key:?} must be an integer, got {value:?}")]
    InvalidInteger {
        /// Key of the requirement
        key: String,
        /// Non-integer operand
        value: String,
    },
}

/// Operator and operand(s) of a single requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    /// `key=value` / `key==value`
    Equals(String),
    /// `key!=value`
    NotEquals(String),
    /// `key in (a,b)`
    In(BTreeSet<String>),
    /// `key notin (a,b)`
    NotIn(BTreeSet<String>),
    /// `key`
    Exists,
    /// `!key`
    DoesNotExist,
    /// `key>N`
    GreaterThan(i64),
    /// `key<N`
    LessThan(i64),
}

/// One `key <op> value(s)` clause of a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
}

impl Requirement {
    /// Whether `labels` satisfies this requirement.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match &self.operator {
            Operator::Equals(expected) => value == Some(expected),
            Operator::NotEquals(expected) => value != Some(expected),
            Operator::In(values) => value.is_some_and(|v| values.contains(v)),
            Operator::NotIn(values) => value.is_none_or(|v| !values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
            Operator::GreaterThan(bound) => parsed_integer(value).is_some_and(|v| v > *bound),
            Operator::LessThan(bound) => parsed_integer(value).is_some_and(|v| v < *bound),
        }
    }
}

fn parsed_integer(value: Option<&String>) -> Option<i64> {
    value.and_then(|v| v.parse().ok())
}

fn join_values(values: &BTreeSet<String>) -> String {
    values.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = &self.key;
        match &self.operator {
            Operator::Equals(value) => write!(f, "{key}={value}"),
            Operator::NotEquals(value) => write!(f, "{key}!={value}"),
            Operator::In(values) => write!(f, "{key} in ({})", join_values(values)),
            Operator::NotIn(values) => write!(f, "{key} notin ({})", join_values(values)),
            Operator::Exists => write!(f, "{key}"),
            Operator::DoesNotExist => write!(f, "!{key}"),
            Operator::GreaterThan(bound) => write!(f, "{key}>{bound}"),
            Operator::LessThan(bound) => write!(f, "{key}<{bound}"),
        }
    }
}

/// Parsed label selector: the conjunction of its requirements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Parse a selector string. The empty string selects everything.
    pub fn parse(input: &str) -> Result<Self, SelectorParseError> {
        let tokens = tokenize(input);
        let mut requirements = Parser { tokens, position: 0 }.parse()?;
        requirements.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(Self { requirements })
    }

    /// Requirements in canonical (key-sorted) order.
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// True for the match-everything selector.
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Whether an object carrying `labels` is selected.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl FromStr for LabelSelector {
    type Err = SelectorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.requirements.iter().peekable();
        while let Some(requirement) = iter.next() {
            write!(f, "{requirement}")?;
            if iter.peek().is_some() {
                write!(f, ",")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Identifier(String),
    Not,
    NotEquals,
    Equals,
    DoubleEquals,
    In,
    NotIn,
    OpenParen,
    CloseParen,
    Comma,
    GreaterThan,
    LessThan,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(s) => f.write_str(s),
            Self::Not => f.write_str("!"),
            Self::NotEquals => f.write_str("!="),
            Self::Equals => f.write_str("="),
            Self::DoubleEquals => f.write_str("=="),
            Self::In => f.write_str("in"),
            Self::NotIn => f.write_str("notin"),
            Self::OpenParen => f.write_str("("),
            Self::CloseParen => f.write_str(")"),
            Self::Comma => f.write_str(","),
            Self::GreaterThan => f.write_str(">"),
            Self::LessThan => f.write_str("<"),
        }
    }
}

fn is_special(c: char) -> bool {
    matches!(c, '!' | '=' | '<' | '>' | '(' | ')' | ',')
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if is_special(c) {
            chars.next();
            let token = match c {
                '!' if chars.next_if_eq(&'=').is_some() => Token::NotEquals,
                '!' => Token::Not,
                '=' if chars.next_if_eq(&'=').is_some() => Token::DoubleEquals,
                '=' => Token::Equals,
                '<' => Token::LessThan,
                '>' => Token::GreaterThan,
                '(' => Token::OpenParen,
                ')' => Token::CloseParen,
                _ => Token::Comma,
            };
            tokens.push(token);
            continue;
        }
        let mut word = String::new();
        while let Some(c) = chars.next_if(|c| !c.is_whitespace() && !is_special(*c)) {
            word.push(c);
        }
        tokens.push(match word.as_str() {
            "in" => Token::In,
            "notin" => Token::NotIn,
            _ => Token::Identifier(word),
        });
    }
    tokens
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn parse(&mut self) -> Result<Vec<Requirement>, SelectorParseError> {
        let mut requirements = Vec::new();
        if self.peek().is_none() {
            return Ok(requirements);
        }
        loop {
            requirements.push(self.parse_requirement()?);
            match self.next() {
                None => return Ok(requirements),
                Some(Token::Comma) => {}
                Some(other) => return Err(unexpected(&other, "','")),
            }
        }
    }

    fn parse_requirement(&mut self) -> Result<Requirement, SelectorParseError> {
        const KEY: &str = "'!', identifier";
        let negated = self.peek() == Some(&Token::Not);
        if negated {
            self.next();
        }
        let key = match self.next() {
            Some(Token::Identifier(key)) => key,
            Some(other) => return Err(unexpected(&other, if negated { "identifier" } else { KEY })),
            None => return Err(SelectorParseError::UnexpectedEnd { expected: KEY }),
        };
        validate_key(&key)?;

        if negated {
            return match self.peek() {
                None | Some(Token::Comma) => Ok(Requirement { key, operator: Operator::DoesNotExist }),
                Some(other) => Err(unexpected(other, "',' after '!key'")),
            };
        }
        if matches!(self.peek(), None | Some(Token::Comma)) {
            return Ok(Requirement { key, operator: Operator::Exists });
        }

        let operator = match self.next() {
            Some(Token::Equals | Token::DoubleEquals) => Operator::Equals(self.parse_exact_value()?),
            Some(Token::NotEquals) => Operator::NotEquals(self.parse_exact_value()?),
            Some(Token::In) => Operator::In(self.parse_value_set()?),
            Some(Token::NotIn) => Operator::NotIn(self.parse_value_set()?),
            Some(Token::GreaterThan) => Operator::GreaterThan(self.parse_integer(&key)?),
            Some(Token::LessThan) => Operator::LessThan(self.parse_integer(&key)?),
            Some(other) => {
                return Err(unexpected(&other, "'=', '==', '!=', 'in', 'notin', '>', '<'"));
            }
            None => return Err(SelectorParseError::UnexpectedEnd { expected: "operator" }),
        };
        Ok(Requirement { key, operator })
    }

    /// Value after `=`, `==` or `!=`; may be empty (`key=`).
    fn parse_exact_value(&mut self) -> Result<String, SelectorParseError> {
        match self.peek() {
            None | Some(Token::Comma) => Ok(String::new()),
            Some(Token::Identifier(value)) => {
                let value = value.clone();
                self.position += 1;
                validate_value(&value)?;
                Ok(value)
            }
            Some(other) => Err(unexpected(other, "identifier")),
        }
    }

    /// `(a,b,...)`; `()` and empty slots contribute the empty value.
    fn parse_value_set(&mut self) -> Result<BTreeSet<String>, SelectorParseError> {
        match self.next() {
            Some(Token::OpenParen) => {}
            Some(other) => return Err(unexpected(&other, "'('")),
            None => return Err(SelectorParseError::UnexpectedEnd { expected: "'('" }),
        }
        let mut values = BTreeSet::new();
        loop {
            let value = match self.peek() {
                Some(Token::Identifier(value)) => {
                    let value = value.clone();
                    self.next();
                    validate_value(&value)?;
                    value
                }
                _ => String::new(),
            };
            values.insert(value);
            match self.next() {
                Some(Token::Comma) => {}
                Some(Token::CloseParen) => return Ok(values),
                Some(other) => return Err(unexpected(&other, "',', ')'")),
                None => return Err(SelectorParseError::UnexpectedEnd { expected: "',', ')'" }),
            }
        }
    }

    fn parse_integer(&mut self, key: &str) -> Result<i64, SelectorParseError> {
        match self.next() {
            Some(Token::Identifier(value)) => value.parse().map_err(|_| SelectorParseError::InvalidInteger {
                key: key.to_string(),
                value,
            }),
            Some(other) => Err(unexpected(&other, "integer")),
            None => Err(SelectorParseError::UnexpectedEnd { expected: "integer" }),
        }
    }
}

fn unexpected(token: &Token, expected: &'static str) -> SelectorParseError {
    SelectorParseError::UnexpectedToken {
        found: token.to_string(),
        expected,
    }
}

/// `[A-Za-z0-9]([-A-Za-z0-9_.]*[A-Za-z0-9])?`, at most 63 characters.
fn check_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name part must be non-empty".to_string());
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(format!("name part must be no more than {MAX_NAME_LENGTH} characters"));
    }
    let alphanumeric_ends = name.starts_with(|c: char| c.is_ascii_alphanumeric())
        && name.ends_with(|c: char| c.is_ascii_alphanumeric());
    let allowed = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !alphanumeric_ends || !allowed {
        return Err(
            "must consist of alphanumeric characters, '-', '_' or '.', and must start and end with an alphanumeric character"
                .to_string(),
        );
    }
    Ok(())
}

/// Lowercase RFC 1123 subdomain, at most 253 characters.
fn check_prefix(prefix: &str) -> Result<(), String> {
    if prefix.is_empty() || prefix.len() > MAX_PREFIX_LENGTH {
        return Err(format!("prefix part must be 1 to {MAX_PREFIX_LENGTH} characters"));
    }
    let label_ok = |label: &str| {
        !label.is_empty()
            && label.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
            && label.ends_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    };
    if prefix.split('.').all(label_ok) {
        Ok(())
    } else {
        Err("prefix part must be a lowercase RFC 1123 subdomain".to_string())
    }
}

fn validate_key(key: &str) -> Result<(), SelectorParseError> {
    let result = match key.split_once('/') {
        Some((prefix, name)) => check_prefix(prefix).and_then(|()| check_name(name)),
        None => check_name(key),
    };
    result.map_err(|reason| SelectorParseError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}

fn validate_value(value: &str) -> Result<(), SelectorParseError> {
    if value.is_empty() {
        return Ok(());
    }
    check_name(value).map_err(|reason| SelectorParseError::InvalidValue {
        value: value.to_string(),
        reason,
    })
}
