//! Guarded variable store with expiration and zone scoping.
//!
//! Variables are the engine's boolean/numeric guard state: triggers and
//! activities read them through AND-predicates and mutate them through
//! declarative `set` blocks. Every variable carries an optional expiration
//! instant and a zone tag that bounds its lifetime to the current game area.

mod store;

pub use store::{VariableStore, VariableView};

use serde::{Deserialize, Serialize};

/// Zone tag marking a variable as visible in every zone and immune to
/// zone-change purges.
pub const GLOBAL_ZONE: &str = "{GLOBAL}";

/// A typed variable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Default for VarValue {
    fn default() -> Self {
        Self::Bool(true)
    }
}

impl VarValue {
    /// Coerce to bool: numbers are true when non-zero, text when non-empty.
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Text(s) => !s.is_empty(),
        }
    }

    /// Coerce to integer: bools are 0/1, unparseable text is 0.
    pub fn as_int(&self) -> i64 {
        match self {
            Self::Bool(b) => *b as i64,
            Self::Int(i) => *i,
            Self::Text(s) => s.trim().parse().unwrap_or(0),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Compare against an expected value, coercing to the expected value's
    /// type. An absent/expired variable compares as the expected type's zero
    /// value via [`VarValue::zero_like`].
    pub fn matches(&self, expected: &VarValue) -> bool {
        match expected {
            Self::Bool(b) => self.as_bool() == *b,
            Self::Int(i) => self.as_int() == *i,
            Self::Text(s) => self.as_text() == *s,
        }
    }

    /// The zero value of `expected`'s type (false / 0 / "").
    pub fn zero_like(expected: &VarValue) -> VarValue {
        match expected {
            Self::Bool(_) => Self::Bool(false),
            Self::Int(_) => Self::Int(0),
            Self::Text(_) => Self::Text(String::new()),
        }
    }
}

/// One clause of a guard predicate: the named variable must match `expect`,
/// or when `count` is given, its integer reading must equal `count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarPredicate {
    pub name: String,
    #[serde(default)]
    pub expect: VarValue,
    #[serde(default)]
    pub count: Option<i64>,
}

/// Counter operand: a bare number assigns, a signed string (`"+2"`, `"-1"`)
/// adjusts the current value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CountSpec {
    Number(i64),
    Text(String),
}

impl CountSpec {
    /// Resolve to `(relative, amount)`. Returns `None` for unparseable text.
    pub fn resolve(&self) -> Option<(bool, i64)> {
        match self {
            Self::Number(n) => Some((false, *n)),
            Self::Text(s) => {
                let s = s.trim();
                let relative = s.starts_with('+') || s.starts_with('-');
                s.parse::<i64>().ok().map(|n| (relative, n))
            }
        }
    }
}

/// A declarative variable mutation attached to a trigger or activity.
///
/// Exactly one of `toggle`, `count`, or `value` applies, checked in that
/// order. `ttl_secs` bounds the new value's lifetime; `zone` overrides the
/// owning timeline's zone tag (empty string = ephemeral).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarSet {
    pub name: String,
    #[serde(default)]
    pub value: Option<VarValue>,
    #[serde(default)]
    pub toggle: bool,
    #[serde(default)]
    pub count: Option<CountSpec>,
    #[serde(default)]
    pub ttl_secs: Option<f64>,
    #[serde(default)]
    pub zone: Option<String>,
}
