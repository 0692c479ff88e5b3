//! Runtime values that attributes, parameters and expressions can hold.
//!
//! The value domain is a closed tagged union. Numbers are exact: integers stay
//! integers and any non-integral result is carried as a normalized rational,
//! so span bounds and equality never suffer from floating point drift.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use num::rational::Rational64;
use serde::{Deserialize, Serialize};

use crate::simulation::InstanceId;

/// Possible values an attribute, parameter or expression result can hold.
///
/// # Examples
///
/// ```
/// use modelsim::Value;
///
/// let amount = Value::Int(10);
/// let label = Value::from("open");
///
/// assert!(amount.is_numeric());
/// assert_eq!(label.as_str(), Some("open"));
/// assert_ne!(Value::Int(42), Value::from("42"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Rational(Rational64),
    String(String),
    Set(BTreeSet<Value>),
    Tuple(Vec<Value>),
    Record(BTreeMap<String, Value>),
    Instance(InstanceId),
}

impl Value {
    /// Builds a numeric value from a rational, collapsing whole numbers to `Int`.
    #[must_use]
    pub fn rational(r: Rational64) -> Self {
        if r.is_integer() {
            Self::Int(r.to_integer())
        } else {
            Self::Rational(r)
        }
    }

    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Rational(_))
    }

    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn is_instance(&self) -> bool {
        matches!(self, Self::Instance(_))
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to rationals.
    pub fn as_rational(&self) -> Option<Rational64> {
        match self {
            Self::Int(v) => Some(Rational64::from_integer(*v)),
            Self::Rational(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_set(&self) -> Option<&BTreeSet<Value>> {
        match self {
            Self::Set(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_instance(&self) -> Option<InstanceId> {
        match self {
            Self::Instance(v) => Some(*v),
            _ => None,
        }
    }

    /// Number of elements for collection-shaped values.
    pub fn collection_len(&self) -> Option<usize> {
        match self {
            Self::Set(v) => Some(v.len()),
            Self::Tuple(v) => Some(v.len()),
            Self::String(v) => Some(v.chars().count()),
            _ => None,
        }
    }

    /// Orders two numeric values exactly; `None` when either side is not a number.
    pub fn compare_numeric(&self, other: &Self) -> Option<Ordering> {
        Some(self.as_rational()?.cmp(&other.as_rational()?))
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Rational(_) => "rational",
            Self::String(_) => "string",
            Self::Set(_) => "set",
            Self::Tuple(_) => "tuple",
            Self::Record(_) => "record",
            Self::Instance(_) => "instance",
        }
    }

    /// Canonical `(type-tag, rendering)` pair used to compare indexed values.
    ///
    /// Two values share a key only when they have the same dynamic type and the
    /// same rendering, so `Int(42)` and `String("42")` never collide.
    #[must_use]
    pub fn canonical_key(&self) -> (&'static str, String) {
        let tag = match self {
            Self::Int(_) | Self::Rational(_) => "number",
            other => other.type_name(),
        };
        (tag, self.to_string())
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Nil
    }
}

fn write_joined<'a, I>(f: &mut fmt::Formatter<'_>, items: I) -> fmt::Result
where
    I: IntoIterator<Item = &'a Value>,
{
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "NIL"),
            Self::Bool(true) => write!(f, "TRUE"),
            Self::Bool(false) => write!(f, "FALSE"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Rational(v) => write!(f, "{}/{}", v.numer(), v.denom()),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Set(v) => {
                write!(f, "{{")?;
                write_joined(f, v)?;
                write!(f, "}}")
            }
            Self::Tuple(v) => {
                write!(f, "<<")?;
                write_joined(f, v)?;
                write!(f, ">>")
            }
            Self::Record(v) => {
                write!(f, "[")?;
                for (i, (k, item)) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} |-> {item}")?;
                }
                write!(f, "]")
            }
            Self::Instance(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<Rational64> for Value {
    fn from(v: Rational64) -> Self {
        Self::rational(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<InstanceId> for Value {
    fn from(v: InstanceId) -> Self {
        Self::Instance(v)
    }
}

impl From<BTreeSet<Value>> for Value {
    fn from(v: BTreeSet<Value>) -> Self {
        Self::Set(v)
    }
}
