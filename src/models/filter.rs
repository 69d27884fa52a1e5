//! Typed filter predicates
//!
//! A filter chain is an ordered list of `field operator value` predicates
//! linked by `&&` / `||`. Chains are folded strictly left to right with no
//! operator precedence: `a && b || c` means `(a && b) || c`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unknown filter field: {0}")]
    UnknownField(String),
    #[error("unknown operator: {0}")]
    UnknownOperator(String),
    #[error("operator {operator} is not valid for field {field}")]
    IllegalOperator { field: String, operator: String },
    #[error("field {0} requires a unit")]
    MissingUnit(String),
    #[error("unit {unit} is not valid for field {field}")]
    IllegalUnit { field: String, unit: String },
    #[error("syntax error: {0}")]
    Syntax(String),
}

/// Value type of a filter field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    NumericWithUnit,
}

/// Filterable field of a captured request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterField {
    Status,
    Path,
    Method,
    Duration,
    ResponseSize,
    /// Request header, looked up case-insensitively
    Header(String),
}

const TEXT_OPERATORS: &[Operator] = &[
    Operator::Eq,
    Operator::NotEq,
    Operator::Match,
    Operator::NotMatch,
];
const NUMERIC_OPERATORS: &[Operator] = &[Operator::Gt, Operator::Lt, Operator::Ge, Operator::Le];
const DURATION_UNITS: &[Unit] = &[Unit::Ms, Unit::S, Unit::M, Unit::H, Unit::D];
const SIZE_UNITS: &[Unit] = &[Unit::B, Unit::Kb, Unit::Mb];

impl FilterField {
    pub fn kind(&self) -> FieldKind {
        match self {
            FilterField::Duration | FilterField::ResponseSize => FieldKind::NumericWithUnit,
            _ => FieldKind::Text,
        }
    }

    /// Operators legal for this field
    pub fn operators(&self) -> &'static [Operator] {
        match self.kind() {
            FieldKind::Text => TEXT_OPERATORS,
            FieldKind::NumericWithUnit => NUMERIC_OPERATORS,
        }
    }

    /// Units legal for this field; empty for text fields
    pub fn units(&self) -> &'static [Unit] {
        match self {
            FilterField::Duration => DURATION_UNITS,
            FilterField::ResponseSize => SIZE_UNITS,
            _ => &[],
        }
    }

    /// Unit that numeric literals are converted into
    pub fn canonical_unit(&self) -> Option<Unit> {
        match self {
            FilterField::Duration => Some(Unit::Ms),
            FilterField::ResponseSize => Some(Unit::B),
            _ => None,
        }
    }

    pub fn key(&self) -> String {
        match self {
            FilterField::Status => "status".to_string(),
            FilterField::Path => "path".to_string(),
            FilterField::Method => "method".to_string(),
            FilterField::Duration => "duration".to_string(),
            FilterField::ResponseSize => "response_size".to_string(),
            FilterField::Header(name) => format!("header.{}", name.to_ascii_lowercase()),
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for FilterField {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        match key.as_str() {
            "status" => Ok(FilterField::Status),
            "path" => Ok(FilterField::Path),
            "method" => Ok(FilterField::Method),
            "duration" => Ok(FilterField::Duration),
            "response_size" => Ok(FilterField::ResponseSize),
            _ => match key.strip_prefix("header.") {
                Some(name) if !name.is_empty() => Ok(FilterField::Header(name.to_string())),
                _ => Err(FilterError::UnknownField(s.to_string())),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    NotEq,
    Match,
    NotMatch,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::NotEq => "!=",
            Operator::Match => "match",
            Operator::NotMatch => "!match",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "==" => Ok(Operator::Eq),
            "!=" => Ok(Operator::NotEq),
            "match" => Ok(Operator::Match),
            "!match" => Ok(Operator::NotMatch),
            ">" => Ok(Operator::Gt),
            "<" => Ok(Operator::Lt),
            ">=" => Ok(Operator::Ge),
            "<=" => Ok(Operator::Le),
            _ => Err(FilterError::UnknownOperator(s.to_string())),
        }
    }
}

/// Unit attached to a numeric literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Ms,
    S,
    M,
    H,
    D,
    B,
    Kb,
    Mb,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Ms => "ms",
            Unit::S => "s",
            Unit::M => "m",
            Unit::H => "h",
            Unit::D => "d",
            Unit::B => "b",
            Unit::Kb => "kb",
            Unit::Mb => "mb",
        }
    }

    /// Multiplier into the canonical unit (milliseconds or bytes)
    pub fn factor(&self) -> f64 {
        match self {
            Unit::Ms | Unit::B => 1.0,
            Unit::S => 1_000.0,
            Unit::M => 60.0 * 1_000.0,
            Unit::H => 60.0 * 60.0 * 1_000.0,
            Unit::D => 24.0 * 60.0 * 60.0 * 1_000.0,
            Unit::Kb => 1024.0,
            Unit::Mb => 1024.0 * 1024.0,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Unit {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ms" => Ok(Unit::Ms),
            "s" => Ok(Unit::S),
            "m" => Ok(Unit::M),
            "h" => Ok(Unit::H),
            "d" => Ok(Unit::D),
            "b" => Ok(Unit::B),
            "kb" => Ok(Unit::Kb),
            "mb" => Ok(Unit::Mb),
            _ => Err(FilterError::Syntax(format!("unknown unit: {s}"))),
        }
    }
}

/// Link between a filter and the one after it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "&&",
            LogicalOperator::Or => "||",
        }
    }
}

impl FromStr for LogicalOperator {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "&&" | "and" => Ok(LogicalOperator::And),
            "||" | "or" => Ok(LogicalOperator::Or),
            _ => Err(FilterError::Syntax(format!(
                "expected && or || but found {s}"
            ))),
        }
    }
}

/// A single validated predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: FilterField,
    pub operator: Operator,
    pub unit: Option<Unit>,
    /// Raw literal as typed; numeric fields parse it at evaluation time
    pub value: String,
    /// Links this filter to the next one in the chain
    pub logical: LogicalOperator,
}

impl Filter {
    pub fn new(
        field: FilterField,
        operator: Operator,
        unit: Option<Unit>,
        value: impl Into<String>,
    ) -> Result<Self, FilterError> {
        if !field.operators().contains(&operator) {
            return Err(FilterError::IllegalOperator {
                field: field.key(),
                operator: operator.to_string(),
            });
        }
        match (field.kind(), unit) {
            (FieldKind::NumericWithUnit, None) => return Err(FilterError::MissingUnit(field.key())),
            (FieldKind::NumericWithUnit, Some(u)) if !field.units().contains(&u) => {
                return Err(FilterError::IllegalUnit {
                    field: field.key(),
                    unit: u.to_string(),
                })
            }
            (FieldKind::Text, Some(u)) => {
                return Err(FilterError::IllegalUnit {
                    field: field.key(),
                    unit: u.to_string(),
                })
            }
            _ => {}
        }
        Ok(Self {
            field,
            operator,
            unit,
            value: value.into(),
            logical: LogicalOperator::And,
        })
    }

    /// Shorthand for a text-field filter
    pub fn text(
        field: FilterField,
        operator: Operator,
        value: impl Into<String>,
    ) -> Result<Self, FilterError> {
        Self::new(field, operator, None, value)
    }

    pub fn then(mut self, logical: LogicalOperator) -> Self {
        self.logical = logical;
        self
    }

    /// Literal converted into the field's canonical unit, if it parses
    pub fn canonical_value(&self) -> Option<f64> {
        let number: f64 = self.value.trim().parse().ok()?;
        let factor = self.unit.map(|u| u.factor()).unwrap_or(1.0);
        Some(number * factor)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.field, self.operator)?;
        match self.unit {
            Some(unit) if self.value.trim().parse::<f64>().is_ok() => {
                write!(f, "{}{}", self.value.trim(), unit)
            }
            _ => write_value(f, &self.value),
        }
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let needs_quotes = value.is_empty()
        || value.starts_with('"')
        || value.chars().any(char::is_whitespace)
        || LogicalOperator::from_str(value).is_ok();
    if !needs_quotes {
        return f.write_str(value);
    }
    f.write_str("\"")?;
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            f.write_str("\\")?;
        }
        write!(f, "{ch}")?;
    }
    f.write_str("\"")
}

/// Ordered sequence of filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }
}

impl From<Vec<Filter>> for FilterChain {
    fn from(filters: Vec<Filter>) -> Self {
        Self { filters }
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                let link = self.filters[i - 1].logical;
                write!(f, " {} ", link.as_str())?;
            }
            write!(f, "{filter}")?;
        }
        Ok(())
    }
}

struct Token {
    text: String,
    quoted: bool,
}

fn tokenize(input: &str) -> Result<Vec<Token>, FilterError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        if ch == '"' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            text.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    _ => text.push(c),
                }
            }
            if !closed {
                return Err(FilterError::Syntax("unterminated quoted value".into()));
            }
            tokens.push(Token { text, quoted: true });
            continue;
        }
        let mut text = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            text.push(c);
            chars.next();
        }
        tokens.push(Token {
            text,
            quoted: false,
        });
    }
    Ok(tokens)
}

/// Split `1.5s` into (`1.5`, s). Literals without a recognised suffix keep
/// their full text and use the canonical unit.
fn split_unit(field: &FilterField, text: &str) -> (String, Option<Unit>) {
    let canonical = field.canonical_unit();
    let suffix_start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_alphabetic())
        .last()
        .map(|(i, _)| i);
    if let Some(start) = suffix_start {
        if start > 0 {
            if let Ok(unit) = text[start..].parse::<Unit>() {
                if field.units().contains(&unit) {
                    return (text[..start].to_string(), Some(unit));
                }
            }
        }
    }
    (text.to_string(), canonical)
}

impl FromStr for FilterChain {
    type Err = FilterError;

    /// Parse `status == 200 && duration > 1s || header.accept == ""`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = tokenize(s)?;
        let mut chain = FilterChain::new();
        let mut iter = tokens.into_iter();

        while let Some(field_token) = iter.next() {
            let field: FilterField = field_token.text.parse()?;
            let operator: Operator = iter
                .next()
                .ok_or_else(|| FilterError::Syntax(format!("missing operator after {field}")))?
                .text
                .parse()?;
            let value_token = iter
                .next()
                .ok_or_else(|| FilterError::Syntax(format!("missing value after {field} {operator}")))?;

            let (value, unit) = match field.kind() {
                FieldKind::Text => (value_token.text, None),
                FieldKind::NumericWithUnit if value_token.quoted => {
                    (value_token.text, field.canonical_unit())
                }
                FieldKind::NumericWithUnit => split_unit(&field, &value_token.text),
            };
            let mut filter = Filter::new(field, operator, unit, value)?;

            if let Some(link) = iter.next() {
                filter.logical = link.text.parse()?;
                chain.push(filter);
                if iter.len() == 0 {
                    return Err(FilterError::Syntax(format!(
                        "dangling {} at end of filter",
                        link.text
                    )));
                }
            } else {
                chain.push(filter);
            }
        }

        Ok(chain)
    }
}

/// Entry in the field picker
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub field: FilterField,
}

const COMMON_HEADERS: &[&str] = &[
    "Accept",
    "Accept-Charset",
    "Accept-Datetime",
    "Accept-Encoding",
    "Accept-Language",
    "A-IM",
    "Authorization",
    "Cache-Control",
    "Connection",
    "Content-Length",
    "Content-MD5",
    "Content-Type",
    "Cookie",
    "Date",
    "Expect",
    "From",
    "Host",
    "Max-Forwards",
    "Origin",
    "Pragma",
    "Proxy-Authorization",
    "Range",
    "Referer",
    "TE",
    "Upgrade",
    "User-Agent",
    "Via",
    "Warning",
    "If-Match",
    "If-Modified-Since",
    "If-None-Match",
    "If-Range",
    "If-Unmodified-Since",
    "Forwarded",
    "X-Forwarded-For",
    "X-Forwarded-Host",
    "X-Forwarded-Proto",
    "Access-Control-Request-Headers",
    "Access-Control-Request-Method",
    "Server",
];

/// Fields offered by the filter builder, in display order
pub static FILTER_FIELDS: Lazy<Vec<FieldSpec>> = Lazy::new(|| {
    let mut fields = vec![
        FieldSpec {
            name: "Duration".to_string(),
            field: FilterField::Duration,
        },
        FieldSpec {
            name: "Method".to_string(),
            field: FilterField::Method,
        },
        FieldSpec {
            name: "Path".to_string(),
            field: FilterField::Path,
        },
        FieldSpec {
            name: "ResponseSize".to_string(),
            field: FilterField::ResponseSize,
        },
        FieldSpec {
            name: "StatusCode".to_string(),
            field: FilterField::Status,
        },
    ];
    fields.extend(COMMON_HEADERS.iter().map(|header| FieldSpec {
        name: format!("Headers.{header}"),
        field: FilterField::Header(header.to_ascii_lowercase()),
    }));
    fields
});

/// Catalog entries whose display name or key contains `query`
pub fn search_fields(query: &str) -> Vec<&'static FieldSpec> {
    let query = query.to_ascii_lowercase();
    FILTER_FIELDS
        .iter()
        .filter(|spec| {
            query.is_empty()
                || spec.name.to_ascii_lowercase().contains(&query)
                || spec.field.key().contains(&query)
        })
        .collect()
}
