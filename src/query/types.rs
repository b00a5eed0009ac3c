use crate::model::FieldPath;
use crate::value::{Value, hash_value, values_equal};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

// Safety limits
pub(crate) const MAX_DISJUNCTION_VALUES: usize = 30;
pub(crate) const MAX_ORDER_BYS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayContains,
    ArrayContainsAny,
    In,
    NotIn,
}

impl FilterOperator {
    /// Operators taking a list of values.
    #[must_use]
    pub fn is_array_operator(self) -> bool {
        matches!(self, Self::ArrayContainsAny | Self::In | Self::NotIn)
    }

    #[must_use]
    pub fn is_inequality(self) -> bool {
        matches!(
            self,
            Self::NotEqual
                | Self::LessThan
                | Self::LessThanOrEqual
                | Self::GreaterThan
                | Self::GreaterThanOrEqual
                | Self::NotIn
        )
    }

    pub(crate) fn is_array_contains_family(self) -> bool {
        matches!(self, Self::ArrayContains | Self::ArrayContainsAny)
    }

    pub(crate) fn is_disjunctive(self) -> bool {
        matches!(self, Self::In | Self::ArrayContainsAny | Self::NotIn)
    }
}

#[derive(Debug, Clone)]
pub enum FilterValue {
    Single(Value),
    Many(Vec<Value>),
}

impl FilterValue {
    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        match self {
            Self::Single(v) => std::slice::from_ref(v),
            Self::Many(vs) => vs,
        }
    }
}

impl PartialEq for FilterValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Single(a), Self::Single(b)) => values_equal(a, b),
            (Self::Many(a), Self::Many(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
            }
            _ => false,
        }
    }
}

impl Eq for FilterValue {}

impl Hash for FilterValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Single(v) => {
                0u8.hash(state);
                hash_value(v, state);
            }
            Self::Many(vs) => {
                1u8.hash(state);
                vs.len().hash(state);
                for v in vs {
                    hash_value(v, state);
                }
            }
        }
    }
}

/// A single field filter. Build one with [`crate::query::make_filter`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter {
    pub(crate) field: FieldPath,
    pub(crate) op: FilterOperator,
    pub(crate) value: FilterValue,
}

impl Filter {
    #[must_use]
    pub fn field(&self) -> &FieldPath {
        &self.field
    }

    #[must_use]
    pub fn op(&self) -> FilterOperator {
        self.op
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        self.value.as_slice()
    }

    #[must_use]
    pub fn value(&self) -> &FilterValue {
        &self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: FieldPath,
    pub direction: Direction,
}

impl OrderBy {
    #[must_use]
    pub fn new(field: FieldPath, direction: Direction) -> Self {
        Self { field, direction }
    }

    #[must_use]
    pub fn flipped(&self) -> Self {
        Self { field: self.field.clone(), direction: self.direction.flipped() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundPosition {
    StartAt,
    StartAfter,
    EndBefore,
    EndAt,
}

impl BoundPosition {
    /// Start bounds sit before the results; end bounds after.
    #[must_use]
    pub fn is_before(self) -> bool {
        matches!(self, Self::StartAt | Self::StartAfter)
    }

    #[must_use]
    pub fn is_inclusive(self) -> bool {
        matches!(self, Self::StartAt | Self::EndAt)
    }
}

/// A cursor position: values aligned with the query's orderings.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) values: Vec<Value>,
    pub(crate) inclusive: bool,
}

impl Bound {
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn inclusive(&self) -> bool {
        self.inclusive
    }
}

impl PartialEq for Bound {
    fn eq(&self, other: &Self) -> bool {
        self.inclusive == other.inclusive
            && self.values.len() == other.values.len()
            && self.values.iter().zip(&other.values).all(|(a, b)| values_equal(a, b))
    }
}

impl Eq for Bound {}

impl Hash for Bound {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inclusive.hash(state);
        self.values.len().hash(state);
        for v in &self.values {
            hash_value(v, state);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitType {
    FromStart,
    FromLast,
}
