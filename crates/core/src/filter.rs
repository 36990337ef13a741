//! Metadata filter predicates
//!
//! A small closed grammar: equality, range, set membership, existence,
//! conjunction and disjunction over top-level record fields.
//!
//! A field missing from a record is *absent*, not null: every comparison
//! against it is false. Comparisons between values of different schema
//! types are also false.

use crate::value::{Record, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::Bound;

/// Boolean predicate over a metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// `field == value`
    Eq {
        /// Field name
        field: String,
        /// Expected value
        value: Value,
    },
    /// `lower <=/< field <=/< upper`
    Range {
        /// Field name
        field: String,
        /// Lower bound
        lower: Bound<Value>,
        /// Upper bound
        upper: Bound<Value>,
    },
    /// `field` equals one of `values`
    In {
        /// Field name
        field: String,
        /// Accepted values
        values: Vec<Value>,
    },
    /// `field` is present
    Exists {
        /// Field name
        field: String,
    },
    /// All sub-filters match (empty = true)
    And(Vec<Filter>),
    /// Any sub-filter matches (empty = false)
    Or(Vec<Filter>),
}

impl Filter {
    /// `field == value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// `field > value`
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::range(field, Bound::Excluded(value.into()), Bound::Unbounded)
    }

    /// `field >= value`
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::range(field, Bound::Included(value.into()), Bound::Unbounded)
    }

    /// `field < value`
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::range(field, Bound::Unbounded, Bound::Excluded(value.into()))
    }

    /// `field <= value`
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::range(field, Bound::Unbounded, Bound::Included(value.into()))
    }

    /// `low <= field <= high`
    pub fn between(
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Filter::range(
            field,
            Bound::Included(low.into()),
            Bound::Included(high.into()),
        )
    }

    /// Arbitrary range
    pub fn range(field: impl Into<String>, lower: Bound<Value>, upper: Bound<Value>) -> Self {
        Filter::Range {
            field: field.into(),
            lower,
            upper,
        }
    }

    /// `field` in `values`
    pub fn one_of<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `field` is present
    pub fn exists(field: impl Into<String>) -> Self {
        Filter::Exists {
            field: field.into(),
        }
    }

    /// `self AND other`, flattening nested conjunctions
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// `self OR other`, flattening nested disjunctions
    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    /// Evaluate against a record
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::Eq { field, value } => record.get(field).is_some_and(|v| v.matches(value)),
            Filter::Range {
                field,
                lower,
                upper,
            } => record
                .get(field)
                .is_some_and(|v| above(v, lower) && below(v, upper)),
            Filter::In { field, values } => record
                .get(field)
                .is_some_and(|v| values.iter().any(|candidate| v.matches(candidate))),
            Filter::Exists { field } => record.contains_key(field),
            Filter::And(parts) => parts.iter().all(|f| f.matches(record)),
            Filter::Or(parts) => parts.iter().any(|f| f.matches(record)),
        }
    }
}

fn above(v: &Value, lower: &Bound<Value>) -> bool {
    match lower {
        Bound::Unbounded => true,
        Bound::Included(b) => matches!(v.compare(b), Some(Ordering::Greater | Ordering::Equal)),
        Bound::Excluded(b) => matches!(v.compare(b), Some(Ordering::Greater)),
    }
}

fn below(v: &Value, upper: &Bound<Value>) -> bool {
    match upper {
        Bound::Unbounded => true,
        Bound::Included(b) => matches!(v.compare(b), Some(Ordering::Less | Ordering::Equal)),
        Bound::Excluded(b) => matches!(v.compare(b), Some(Ordering::Less)),
    }
}
