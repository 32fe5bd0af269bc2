use std::fmt;

use crate::consts::FITS_CARD_SIZE;
use crate::error::{Result, ScubesError};

/// Keywords that describe HDU structure. They are regenerated by the writer
/// and never copied between headers.
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SIMPLE", "XTENSION", "BITPIX", "NAXIS", "EXTEND", "PCOUNT", "GCOUNT", "TFIELDS", "END",
];

const STRUCTURAL_PREFIXES: &[&str] = &["NAXIS", "TTYPE", "TFORM", "TUNIT", "TDIM"];

/// Value of a header card.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Logical(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Logical(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Logical(b) => Some(*b),
            _ => None,
        }
    }

    /// Free-format FITS representation of the value.
    fn render(&self) -> String {
        match self {
            Value::Logical(b) => format!("{:>20}", if *b { "T" } else { "F" }),
            Value::Integer(v) => format!("{v:>20}"),
            Value::Float(v) => format!("{:>20}", format_float(*v)),
            Value::Text(s) => {
                let escaped: String = s.replace('\'', "''").chars().take(68).collect();
                format!("'{escaped:<8}'")
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Logical(b) => write!(f, "{}", if *b { "T" } else { "F" }),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{}", format_float(*v)),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Logical(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Shortest round-trip decimal with an upper-case exponent, always carrying
/// a decimal point or exponent so readers parse it as a float.
fn format_float(v: f64) -> String {
    let s = format!("{v:?}").to_uppercase();
    if s.contains('.') || s.contains('E') || s.contains("INF") || s.contains("NAN") {
        s
    } else {
        format!("{s}.0")
    }
}

/// One 80-column header record.
#[derive(Clone, Debug, PartialEq)]
pub struct Card {
    pub keyword: String,
    pub value: Option<Value>,
    pub comment: Option<String>,
}

impl Card {
    pub fn new(keyword: &str, value: impl Into<Value>) -> Self {
        Self {
            keyword: keyword.to_uppercase(),
            value: Some(value.into()),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    fn is_commentary(&self) -> bool {
        self.value.is_none()
    }

    pub(crate) fn is_structural(&self) -> bool {
        STRUCTURAL_KEYWORDS.contains(&self.keyword.as_str())
            || STRUCTURAL_PREFIXES.iter().any(|p| {
                self.keyword
                    .strip_prefix(p)
                    .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
            })
    }

    /// Render the card as one 80-column header record.
    pub fn to_record(&self) -> String {
        let mut line = if self.is_commentary() {
            format!("{:<8}{}", self.keyword, self.comment.as_deref().unwrap_or(""))
        } else {
            let value = self.value.as_ref().map(Value::render).unwrap_or_default();
            let head = if self.keyword.len() > 8 || self.keyword.contains(' ') {
                format!("HIERARCH {} = {}", self.keyword, value.trim_start())
            } else {
                format!("{:<8}= {}", self.keyword, value)
            };
            match &self.comment {
                Some(c) if !c.is_empty() => format!("{head} / {c}"),
                _ => head,
            }
        };
        line.retain(|c| c.is_ascii() && !c.is_ascii_control());
        line.truncate(FITS_CARD_SIZE);
        format!("{line:<80}")
    }

    /// Parse one header record.
    pub fn from_record(raw: &str) -> Result<Self> {
        let raw = raw.trim_end();
        if let Some(rest) = raw.strip_prefix("HIERARCH ") {
            let (key, value_part) = rest
                .split_once('=')
                .ok_or_else(|| ScubesError::InvalidFits(format!("malformed HIERARCH card: {raw}")))?;
            let (value, comment) = parse_value(value_part)?;
            return Ok(Self {
                keyword: key.trim().to_uppercase(),
                value: Some(value),
                comment,
            });
        }

        let keyword = raw.get(..8).unwrap_or(raw).trim().to_uppercase();
        let has_value = raw.len() >= 10 && &raw[8..10] == "= ";
        if !has_value || keyword == "COMMENT" || keyword == "HISTORY" {
            let text = raw.get(8..).unwrap_or("");
            return Ok(Self {
                keyword,
                value: None,
                comment: Some(text.to_string()),
            });
        }

        let (value, comment) = parse_value(&raw[10..])?;
        Ok(Self {
            keyword,
            value: Some(value),
            comment,
        })
    }
}

/// Parse the value field of a card, returning the value and optional comment.
fn parse_value(field: &str) -> Result<(Value, Option<String>)> {
    let field = field.trim_start();
    if let Some(body) = field.strip_prefix('\'') {
        // Quoted string; '' is an escaped quote.
        let mut text = String::new();
        let mut chars = body.char_indices().peekable();
        let mut end = None;
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    text.push('\'');
                    chars.next();
                } else {
                    end = Some(i + 1);
                    break;
                }
            } else {
                text.push(c);
            }
        }
        let end = end.ok_or_else(|| ScubesError::InvalidFits(format!("unterminated string: {field}")))?;
        let comment = extract_comment(&body[end..]);
        return Ok((Value::Text(text.trim_end().to_string()), comment));
    }

    let (literal, comment) = match field.split_once('/') {
        Some((v, c)) => (v.trim(), Some(c.trim().to_string())),
        None => (field.trim(), None),
    };
    let value = match literal {
        "T" => Value::Logical(true),
        "F" => Value::Logical(false),
        _ => {
            if let Ok(i) = literal.parse::<i64>() {
                Value::Integer(i)
            } else if let Ok(f) = literal.replace('D', "E").parse::<f64>() {
                Value::Float(f)
            } else {
                Value::Text(literal.to_string())
            }
        }
    };
    Ok((value, comment))
}

fn extract_comment(rest: &str) -> Option<String> {
    rest.split_once('/')
        .map(|(_, c)| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

/// Ordered collection of header cards for one HDU.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    fn position(&self, keyword: &str) -> Option<usize> {
        let key = keyword.to_uppercase();
        self.cards
            .iter()
            .position(|c| c.value.is_some() && c.keyword == key)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.position(keyword).is_some()
    }

    pub fn get(&self, keyword: &str) -> Option<&Value> {
        self.position(keyword).and_then(|i| self.cards[i].value.as_ref())
    }

    pub fn comment(&self, keyword: &str) -> Option<&str> {
        self.position(keyword).and_then(|i| self.cards[i].comment.as_deref())
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(Value::as_f64)
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(Value::as_i64)
    }

    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).and_then(Value::as_str)
    }

    /// Set a keyword, replacing the value (and keeping the comment) of an
    /// existing card, or appending a new one.
    pub fn set(&mut self, keyword: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.position(keyword) {
            Some(i) => self.cards[i].value = Some(value),
            None => self.cards.push(Card {
                keyword: keyword.to_uppercase(),
                value: Some(value),
                comment: None,
            }),
        }
    }

    pub fn set_with_comment(&mut self, keyword: &str, value: impl Into<Value>, comment: &str) {
        self.set(keyword, value);
        if let Some(i) = self.position(keyword) {
            self.cards[i].comment = Some(comment.to_string());
        }
    }

    pub fn remove(&mut self, keyword: &str) -> Option<Card> {
        self.position(keyword).map(|i| self.cards.remove(i))
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    /// Copy of this header without structural keywords, suitable as the
    /// user part of a new HDU.
    pub fn without_structure(&self) -> Header {
        Header {
            cards: self
                .cards
                .iter()
                .filter(|c| !c.is_structural())
                .cloned()
                .collect(),
        }
    }

    /// Merge all value cards of `other` into this header.
    pub fn update(&mut self, other: &Header) {
        for card in other.cards.iter().filter(|c| c.value.is_some()) {
            match self.position(&card.keyword) {
                Some(i) => self.cards[i] = card.clone(),
                None => self.cards.push(card.clone()),
            }
        }
    }

    /// Build a header from raw 80-column records, skipping blank ones and
    /// stopping at `END`.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a str>) -> Result<Header> {
        let mut cards = Vec::new();
        for raw in records {
            if raw.starts_with("END") && raw[3..].trim().is_empty() {
                break;
            }
            if raw.trim().is_empty() {
                continue;
            }
            if !raw.is_ascii() {
                return Err(ScubesError::InvalidFits("non-ASCII header card".into()));
            }
            cards.push(Card::from_record(raw)?);
        }
        Ok(Header { cards })
    }
}
