//! Attribute and parameter data-type rules.
//!
//! Rules are short text declarations attached to attributes and parameters:
//!
//! ```text
//! unconstrained
//! bool
//! string
//! [0 .. 100]                     closed span
//! (0 .. unconstrained] at 0.01   open lower end, precision tail
//! enum of low, medium, high
//! ordered enum of draft, review, published
//! {1..5} unique of enum of red, green
//! {many} of [0 .. 10]
//! ```
//!
//! The span bounds are exact rationals, so `0.1` compares exactly.

use std::fmt;
use std::sync::OnceLock;

use num::rational::Rational64;
use num::traits::{CheckedAdd, CheckedDiv, CheckedSub};
use num::{One, Zero};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::simulation::SimRng;
use crate::value::Value;

/// Upper edge used when sampling a span with no declared upper bound.
const SAMPLE_WIDTH: i64 = 1_000;

/// A data-type rule failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid data type '{rules}': {reason}")]
pub struct DataTypeError {
    pub rules: String,
    pub reason: String,
}

impl DataTypeError {
    fn new(rules: &str, reason: impl Into<String>) -> Self {
        Self {
            rules: rules.to_string(),
            reason: reason.into(),
        }
    }
}

/// One end of a numeric span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanBound {
    Unbounded,
    Closed(Rational64),
    Open(Rational64),
}

/// A numeric range with optional precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub lower: SpanBound,
    pub upper: SpanBound,
    pub precision: Option<Rational64>,
    pub unit: Option<String>,
}

impl Span {
    /// Returns true if `v` lies within both bounds and on the precision grid.
    #[must_use]
    pub fn contains(&self, v: Rational64) -> bool {
        let above = match self.lower {
            SpanBound::Unbounded => true,
            SpanBound::Closed(lo) => v >= lo,
            SpanBound::Open(lo) => v > lo,
        };
        let below = match self.upper {
            SpanBound::Unbounded => true,
            SpanBound::Closed(hi) => v <= hi,
            SpanBound::Open(hi) => v < hi,
        };
        let on_grid = match self.precision {
            Some(step) if !step.is_zero() => (v / step).is_integer(),
            _ => true,
        };
        above && below && on_grid
    }

    /// Smallest and largest whole numbers inside the span, if any.
    fn integer_range(&self) -> Option<(i64, i64)> {
        let lo = match self.lower {
            SpanBound::Unbounded => 0,
            SpanBound::Closed(lo) => ceil_int(lo)?,
            SpanBound::Open(lo) => floor_int(lo).checked_add(1)?,
        };
        let hi = match self.upper {
            SpanBound::Unbounded => lo.checked_add(SAMPLE_WIDTH)?,
            SpanBound::Closed(hi) => floor_int(hi),
            SpanBound::Open(hi) => ceil_int(hi)?.checked_sub(1)?,
        };
        (lo <= hi).then_some((lo, hi))
    }
}

/// Parsed data-type rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataType {
    Unconstrained,
    Bool,
    Text,
    Span(Span),
    Enumeration {
        values: Vec<String>,
        ordered: bool,
    },
    Collection {
        min: u32,
        max: Option<u32>,
        unique: bool,
        ordered: bool,
        element: Box<DataType>,
    },
}

fn cached(
    cell: &'static OnceLock<Result<Regex, regex::Error>>,
    pattern: &str,
) -> Result<&'static Regex, DataTypeError> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| DataTypeError::new(pattern, e.to_string()))
}

fn span_regex() -> Result<&'static Regex, DataTypeError> {
    static CELL: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    cached(
        &CELL,
        r"^([\[(])\s*(-?\d+(?:\.\d+)?|unconstrained)\s*\.\.\s*(-?\d+(?:\.\d+)?|unconstrained)\s*([\])])(?:\s+at\s+(\d+(?:\.\d+)?)(?:\s+(\S+))?)?$",
    )
}

fn enum_regex() -> Result<&'static Regex, DataTypeError> {
    static CELL: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    cached(&CELL, r"^(ordered\s+)?enum\s+of\s+(.+)$")
}

fn collection_regex() -> Result<&'static Regex, DataTypeError> {
    static CELL: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    cached(
        &CELL,
        r"^\{\s*(?:(\d+)\s*(?:\.\.\s*(\d+|many|\*))?|many|\*)\s*\}((?:\s+(?:unique|ordered))*)\s+of\s+(.+)$",
    )
}

fn parse_decimal(rules: &str, text: &str) -> Result<Rational64, DataTypeError> {
    let invalid = || DataTypeError::new(rules, format!("'{text}' is not a number"));
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    let scale = 10_i64.checked_pow(u32::try_from(frac.len()).map_err(|_| invalid())?);
    let scale = scale.ok_or_else(invalid)?;
    let whole: i64 = whole.parse().map_err(|_| invalid())?;
    let frac: i64 = if frac.is_empty() {
        0
    } else {
        frac.parse().map_err(|_| invalid())?
    };
    let numer = whole
        .checked_mul(scale)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(invalid)?;
    let numer = if negative { -numer } else { numer };
    Ok(Rational64::new(numer, scale))
}

fn parse_bound(rules: &str, text: &str, open: bool) -> Result<SpanBound, DataTypeError> {
    if text == "unconstrained" {
        return Ok(SpanBound::Unbounded);
    }
    let v = parse_decimal(rules, text)?;
    Ok(if open {
        SpanBound::Open(v)
    } else {
        SpanBound::Closed(v)
    })
}

impl DataType {
    /// Parses a data-type rule.
    pub fn parse(rules: &str) -> Result<Self, DataTypeError> {
        let text = rules.trim();
        match text.to_ascii_lowercase().as_str() {
            "" => return Err(DataTypeError::new(rules, "empty rule")),
            "unconstrained" | "any" => return Ok(Self::Unconstrained),
            "bool" | "boolean" => return Ok(Self::Bool),
            "string" | "text" => return Ok(Self::Text),
            _ => {}
        }

        if let Some(caps) = span_regex()?.captures(text) {
            let lower = parse_bound(rules, &caps[2], &caps[1] == "(")?;
            let upper = parse_bound(rules, &caps[3], &caps[4] == ")")?;
            let precision = caps
                .get(5)
                .map(|m| parse_decimal(rules, m.as_str()))
                .transpose()?;
            if let (Some(lo), Some(hi)) = (bound_value(lower), bound_value(upper)) {
                if lo > hi {
                    return Err(DataTypeError::new(rules, "span lower bound exceeds upper bound"));
                }
            }
            return Ok(Self::Span(Span {
                lower,
                upper,
                precision,
                unit: caps.get(6).map(|m| m.as_str().to_string()),
            }));
        }

        if let Some(caps) = enum_regex()?.captures(text) {
            let values: Vec<String> = caps[2]
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect();
            if values.is_empty() {
                return Err(DataTypeError::new(rules, "enumeration has no values"));
            }
            return Ok(Self::Enumeration {
                values,
                ordered: caps.get(1).is_some(),
            });
        }

        if let Some(caps) = collection_regex()?.captures(text) {
            let min = match caps.get(1) {
                Some(m) => m
                    .as_str()
                    .parse()
                    .map_err(|_| DataTypeError::new(rules, "collection bound too large"))?,
                None => 0,
            };
            let max = match (caps.get(1), caps.get(2)) {
                (Some(_), Some(m)) if matches!(m.as_str(), "many" | "*") => None,
                (Some(_), Some(m)) => Some(
                    m.as_str()
                        .parse()
                        .map_err(|_| DataTypeError::new(rules, "collection bound too large"))?,
                ),
                (Some(_), None) => Some(min),
                (None, _) => None,
            };
            if matches!(max, Some(max) if max < min) {
                return Err(DataTypeError::new(rules, "collection upper bound below lower bound"));
            }
            let flags = &caps[3];
            return Ok(Self::Collection {
                min,
                max,
                unique: flags.contains("unique"),
                ordered: flags.contains("ordered"),
                element: Box::new(Self::parse(&caps[4])?),
            });
        }

        Err(DataTypeError::new(rules, "unrecognized rule"))
    }

    /// Checks a non-nil value against the rule; the error is a human-readable reason.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Self::Unconstrained => Ok(()),
            Self::Bool if value.is_bool() => Ok(()),
            Self::Text if value.is_string() => Ok(()),
            Self::Bool | Self::Text => Err(format!("expected {self}, found {}", value.type_name())),
            Self::Span(span) => {
                let v = value
                    .as_rational()
                    .ok_or_else(|| format!("expected a number, found {}", value.type_name()))?;
                if span.contains(v) {
                    Ok(())
                } else {
                    Err(format!("{value} is outside {self}"))
                }
            }
            Self::Enumeration { values, .. } => match value.as_str() {
                Some(s) if values.iter().any(|v| v == s) => Ok(()),
                _ => Err(format!("{value} is not one of {}", values.join(", "))),
            },
            Self::Collection {
                min,
                max,
                unique,
                element,
                ..
            } => {
                let items: Vec<&Value> = match value {
                    Value::Set(items) => items.iter().collect(),
                    Value::Tuple(items) => items.iter().collect(),
                    other => return Err(format!("expected a collection, found {}", other.type_name())),
                };
                let len = items.len();
                if len < *min as usize || max.is_some_and(|max| len > max as usize) {
                    return Err(format!("collection size {len} is outside {self}"));
                }
                if *unique {
                    let distinct: std::collections::BTreeSet<&Value> = items.iter().copied().collect();
                    if distinct.len() != len {
                        return Err("collection elements are not unique".to_string());
                    }
                }
                for item in items {
                    if !item.is_nil() {
                        element.check(item).map_err(|reason| format!("element {item}: {reason}"))?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Draws a random value that satisfies the rule.
    pub fn sample(&self, rng: &mut SimRng) -> Value {
        match self {
            Self::Unconstrained => Value::Int(rng.range_i64(0, SAMPLE_WIDTH)),
            Self::Bool => Value::Bool(rng.coin()),
            Self::Text => Value::String(format!("text-{}", rng.range_i64(0, 999_999))),
            Self::Span(span) => match span.integer_range() {
                Some((lo, hi)) => {
                    let candidate = Value::Int(rng.range_i64(lo, hi));
                    match candidate.as_rational() {
                        Some(v) if span.contains(v) => candidate,
                        _ => span_fallback(span),
                    }
                }
                None => span_fallback(span),
            },
            Self::Enumeration { values, .. } => rng
                .choose(values)
                .map_or(Value::Nil, |v| Value::String(v.clone())),
            Self::Collection { min, element, ordered, .. } => {
                let items: Vec<Value> = (0..*min).map(|_| element.sample(rng)).collect();
                if *ordered {
                    Value::Tuple(items)
                } else {
                    Value::Set(items.into_iter().collect())
                }
            }
        }
    }

    /// The `n`-th value of a deterministic enumeration of the rule, if it has one.
    #[must_use]
    pub fn nth_value(&self, n: u64) -> Option<Value> {
        match self {
            Self::Unconstrained => i64::try_from(n).ok().map(Value::Int),
            Self::Bool => (n < 2).then_some(Value::Bool(n == 1)),
            Self::Text => Some(Value::String(format!("value-{n}"))),
            Self::Span(span) => {
                let (lo, hi) = span.integer_range()?;
                let v = lo.checked_add(i64::try_from(n).ok()?)?;
                let in_range = v <= hi || span.upper == SpanBound::Unbounded;
                (in_range && span.contains(Rational64::from_integer(v))).then_some(Value::Int(v))
            }
            Self::Enumeration { values, .. } => usize::try_from(n)
                .ok()
                .and_then(|i| values.get(i))
                .map(|v| Value::String(v.clone())),
            Self::Collection { .. } => None,
        }
    }
}

fn bound_value(bound: SpanBound) -> Option<Rational64> {
    match bound {
        SpanBound::Unbounded => None,
        SpanBound::Closed(v) | SpanBound::Open(v) => Some(v),
    }
}

// `Ratio::floor`/`ceil` overflow at the ends of the i64 range; the
// denominator of a reduced ratio is always positive.
fn floor_int(v: Rational64) -> i64 {
    v.numer().div_euclid(*v.denom())
}

fn ceil_int(v: Rational64) -> Option<i64> {
    let floor = floor_int(v);
    if v.numer().rem_euclid(*v.denom()) == 0 {
        Some(floor)
    } else {
        floor.checked_add(1)
    }
}

/// A value inside a span that holds no whole number, such as `(0 .. 1)`.
///
/// NIL when the value is not representable.
fn span_fallback(span: &Span) -> Value {
    let one = Rational64::one();
    let value = match (bound_value(span.lower), bound_value(span.upper)) {
        (Some(lo), Some(hi)) => hi
            .checked_sub(&lo)
            .and_then(|width| width.checked_div(&Rational64::from_integer(2)))
            .and_then(|half| lo.checked_add(&half)),
        (Some(lo), None) => lo.checked_add(&one),
        (None, Some(hi)) => hi.checked_sub(&one),
        (None, None) => Some(Rational64::zero()),
    };
    value.map_or(Value::Nil, Value::rational)
}

fn fmt_bound(f: &mut fmt::Formatter<'_>, bound: SpanBound) -> fmt::Result {
    match bound {
        SpanBound::Unbounded => write!(f, "unconstrained"),
        SpanBound::Closed(v) | SpanBound::Open(v) => write!(f, "{}", Value::rational(v)),
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconstrained => write!(f, "unconstrained"),
            Self::Bool => write!(f, "bool"),
            Self::Text => write!(f, "string"),
            Self::Span(span) => {
                let open_lo = matches!(span.lower, SpanBound::Open(_));
                let open_hi = matches!(span.upper, SpanBound::Open(_));
                write!(f, "{}", if open_lo { "(" } else { "[" })?;
                fmt_bound(f, span.lower)?;
                write!(f, " .. ")?;
                fmt_bound(f, span.upper)?;
                write!(f, "{}", if open_hi { ")" } else { "]" })
            }
            Self::Enumeration { values, ordered } => {
                if *ordered {
                    write!(f, "ordered ")?;
                }
                write!(f, "enum of {}", values.join(", "))
            }
            Self::Collection {
                min,
                max,
                unique,
                ordered,
                element,
            } => {
                match max {
                    Some(max) => write!(f, "{{{min}..{max}}}")?,
                    None => write!(f, "{{{min}..many}}")?,
                }
                if *unique {
                    write!(f, " unique")?;
                }
                if *ordered {
                    write!(f, " ordered")?;
                }
                write!(f, " of {element}")
            }
        }
    }
}
