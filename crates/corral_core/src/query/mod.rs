//! Predicate, sort and aggregate descriptions.
//!
//! # Responsibility
//! - Describe record filters, multi-key sort orders and aggregate functions
//!   in store-agnostic form.
//! - Evaluate predicates and sort orders in memory, so map-backed stores and
//!   pending-view overlays agree with the SQL translation.
//!
//! # Invariants
//! - Predicate evaluation and the SQLite translation produce the same
//!   matches for the same committed rows.
//! - Sorting is stable; ties are broken by sort-key declaration order and
//!   then by input order.

use crate::model::value::{AttributeMap, Value};
use std::cmp::Ordering;

/// Comparison operator for attribute predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Record filter evaluated against attribute maps.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every record.
    All,
    /// Compares one attribute against a constant value.
    Compare {
        attribute: String,
        op: CompareOp,
        value: Value,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Eq, value)
    }

    pub fn ne(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Ne, value)
    }

    pub fn lt(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Lt, value)
    }

    pub fn le(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Le, value)
    }

    pub fn gt(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Gt, value)
    }

    pub fn ge(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, CompareOp::Ge, value)
    }

    fn compare(attribute: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            attribute: attribute.into(),
            op,
            value: value.into(),
        }
    }

    /// Evaluates this predicate against one attribute map.
    ///
    /// Missing attributes are treated as `Null`. Comparisons against
    /// incomparable values are false, matching the SQL translation.
    pub fn matches(&self, attributes: &AttributeMap) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Compare {
                attribute,
                op,
                value,
            } => {
                let actual = attributes.get(attribute).unwrap_or(&Value::Null);
                // Null equality is the one comparison defined across the gap,
                // mirroring `IS NULL` / `IS NOT NULL` in the SQL rendering.
                if value.is_null() {
                    return match op {
                        CompareOp::Eq => actual.is_null(),
                        CompareOp::Ne => !actual.is_null(),
                        _ => false,
                    };
                }
                match actual.compare(value) {
                    Some(ordering) => match op {
                        CompareOp::Eq => ordering == Ordering::Equal,
                        CompareOp::Ne => ordering != Ordering::Equal,
                        CompareOp::Lt => ordering == Ordering::Less,
                        CompareOp::Le => ordering != Ordering::Greater,
                        CompareOp::Gt => ordering == Ordering::Greater,
                        CompareOp::Ge => ordering != Ordering::Less,
                    },
                    None => false,
                }
            }
            Predicate::And(parts) => parts.iter().all(|part| part.matches(attributes)),
            Predicate::Or(parts) => parts.iter().any(|part| part.matches(attributes)),
            Predicate::Not(inner) => !inner.matches(attributes),
        }
    }
}

/// One sort key of a multi-key sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub attribute: String,
    pub ascending: bool,
}

impl SortKey {
    pub fn asc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ascending: true,
        }
    }

    pub fn desc(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ascending: false,
        }
    }
}

/// Compares two attribute maps under a multi-key sort order.
///
/// Keys are applied in declaration order; the first non-equal key decides.
pub fn compare_by_sort_keys(a: &AttributeMap, b: &AttributeMap, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let left = a.get(&key.attribute).unwrap_or(&Value::Null);
        let right = b.get(&key.attribute).unwrap_or(&Value::Null);
        let ordering = if key.ascending {
            left.sort_cmp(right)
        } else {
            right.sort_cmp(left)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Aggregate function evaluated server-side by engine-backed stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Sum,
    Count,
    Min,
    Max,
    Average,
}

impl AggregateFunction {
    /// Returns whether the result is a 64-bit integer (`sum`, `count`,
    /// `min`, `max`) rather than floating point (`average`).
    pub fn integer_result(&self) -> bool {
        !matches!(self, AggregateFunction::Average)
    }

    /// Stable lowercase name used in log events.
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "sum",
            AggregateFunction::Count => "count",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Average => "average",
        }
    }
}
