use crate::errors::{QueryError, QueryResult};
use crate::model::{FieldPath, ResourcePath};
use std::hash::{DefaultHasher, Hash, Hasher};

use super::builder::combine_ordering_for_bound;
use super::types::{Bound, Direction, Filter, FilterOperator, LimitType, MAX_ORDER_BYS, OrderBy};

/// Immutable description of a query. Every `with_*` method returns a new
/// descriptor and leaves the receiver untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryDescriptor {
    path: ResourcePath,
    filters: Vec<Filter>,
    explicit_order_bys: Vec<OrderBy>,
    limit: Option<(u32, LimitType)>,
    start_at: Option<Bound>,
    end_at: Option<Bound>,
}

impl QueryDescriptor {
    /// A query returning every document of the collection at `path`.
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `path` is not a collection path.
    pub fn for_collection(path: ResourcePath) -> QueryResult<Self> {
        if !path.is_collection() {
            return Err(QueryError::InvalidArgument(format!(
                "'{path}' is not a collection path"
            )));
        }
        Ok(Self {
            path,
            filters: Vec::new(),
            explicit_order_bys: Vec::new(),
            limit: None,
            start_at: None,
            end_at: None,
        })
    }

    #[must_use]
    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    #[must_use]
    pub fn explicit_order_bys(&self) -> &[OrderBy] {
        &self.explicit_order_bys
    }

    #[must_use]
    pub fn limit(&self) -> Option<u32> {
        self.limit.map(|(n, _)| n)
    }

    #[must_use]
    pub fn limit_type(&self) -> Option<LimitType> {
        self.limit.map(|(_, t)| t)
    }

    #[must_use]
    pub fn start_at(&self) -> Option<&Bound> {
        self.start_at.as_ref()
    }

    #[must_use]
    pub fn end_at(&self) -> Option<&Bound> {
        self.end_at.as_ref()
    }

    /// The field every inequality filter targets, if any.
    #[must_use]
    pub fn inequality_field(&self) -> Option<&FieldPath> {
        self.filters.iter().find(|f| f.op.is_inequality()).map(|f| &f.field)
    }

    /// Orderings the query actually sorts by: explicit ones, else the
    /// inequality field, followed by the document-identity tie-break.
    #[must_use]
    pub fn normalized_order_bys(&self) -> Vec<OrderBy> {
        if self.explicit_order_bys.is_empty()
            && let Some(field) = self.inequality_field()
        {
            return combine_ordering_for_bound(&[OrderBy::new(field.clone(), Direction::Ascending)]);
        }
        combine_ordering_for_bound(&self.explicit_order_bys)
    }

    /// Adds a filter; an identical filter already present is a no-op.
    pub fn with_filter(&self, filter: Filter) -> QueryResult<Self> {
        if self.filters.contains(&filter) {
            return Ok(self.clone());
        }
        self.validate_new_filter(&filter)?;
        let mut next = self.clone();
        next.filters.push(filter);
        Ok(next)
    }

    fn validate_new_filter(&self, filter: &Filter) -> QueryResult<()> {
        let op = filter.op;
        if op.is_inequality() {
            if let Some(existing) = self.inequality_field()
                && existing != &filter.field
            {
                return Err(QueryError::InvalidArgument(format!(
                    "all inequality filters must target the same field: '{existing}' and '{}'",
                    filter.field
                )));
            }
            if let Some(first) = self.explicit_order_bys.first()
                && first.field != filter.field
            {
                return Err(QueryError::InvalidArgument(format!(
                    "inequality filter on '{}' requires the first ordering to be on that field, not '{}'",
                    filter.field, first.field
                )));
            }
        }
        for existing in &self.filters {
            let other = existing.op;
            if op.is_array_contains_family() && other.is_array_contains_family() {
                return Err(QueryError::invalid(
                    "a query supports at most one ArrayContains or ArrayContainsAny filter",
                ));
            }
            if op.is_disjunctive() && other.is_disjunctive() {
                return Err(QueryError::InvalidArgument(format!(
                    "{op:?} cannot be combined with an existing {other:?} filter"
                )));
            }
            let not_in_mix = |a: FilterOperator, b: FilterOperator| {
                a == FilterOperator::NotIn && b == FilterOperator::NotEqual
            };
            if not_in_mix(op, other) || not_in_mix(other, op) {
                return Err(QueryError::invalid("NotIn cannot be combined with NotEqual"));
            }
        }
        Ok(())
    }

    /// Appends an ordering.
    ///
    /// # Errors
    /// `InvalidArgument` if a bound is already set, the field is already
    /// ordered, or the first ordering would not match the inequality field.
    pub fn with_order_by(&self, order: OrderBy) -> QueryResult<Self> {
        if self.start_at.is_some() || self.end_at.is_some() {
            return Err(QueryError::invalid(
                "orderings must be added before StartAt, StartAfter, EndBefore or EndAt",
            ));
        }
        if self.explicit_order_bys.iter().any(|o| o.field == order.field) {
            return Err(QueryError::InvalidArgument(format!(
                "query is already ordered by '{}'",
                order.field
            )));
        }
        if self.explicit_order_bys.len() >= MAX_ORDER_BYS {
            return Err(QueryError::InvalidArgument(format!(
                "a query supports at most {MAX_ORDER_BYS} orderings"
            )));
        }
        if self.explicit_order_bys.is_empty()
            && let Some(field) = self.inequality_field()
            && field != &order.field
        {
            return Err(QueryError::InvalidArgument(format!(
                "first ordering must be on the inequality field '{field}', not '{}'",
                order.field
            )));
        }
        let mut next = self.clone();
        next.explicit_order_bys.push(order);
        Ok(next)
    }

    pub fn with_limit(&self, n: i64, limit_type: LimitType) -> QueryResult<Self> {
        if n <= 0 {
            return Err(QueryError::InvalidArgument(format!(
                "limit must be positive, got {n}"
            )));
        }
        let n = u32::try_from(n)
            .map_err(|_| QueryError::InvalidArgument(format!("limit {n} is too large")))?;
        let mut next = self.clone();
        next.limit = Some((n, limit_type));
        Ok(next)
    }

    pub fn with_start_at(&self, bound: Bound) -> QueryResult<Self> {
        self.check_bound(&bound)?;
        let mut next = self.clone();
        next.start_at = Some(bound);
        Ok(next)
    }

    pub fn with_end_at(&self, bound: Bound) -> QueryResult<Self> {
        self.check_bound(&bound)?;
        let mut next = self.clone();
        next.end_at = Some(bound);
        Ok(next)
    }

    fn check_bound(&self, bound: &Bound) -> QueryResult<()> {
        let orderings = self.normalized_order_bys().len();
        if bound.values.len() > orderings {
            return Err(QueryError::CardinalityMismatch { values: bound.values.len(), orderings });
        }
        Ok(())
    }

    /// Plan to hand to an executor: a `FromLast` query becomes the reversed
    /// `FromStart` query whose results must be reversed after limiting.
    #[must_use]
    pub fn to_execution_target(&self) -> ExecutionTarget {
        let order_bys = self.normalized_order_bys();
        match self.limit {
            Some((n, LimitType::FromLast)) => ExecutionTarget {
                path: self.path.clone(),
                filters: self.filters.clone(),
                order_bys: order_bys.iter().map(OrderBy::flipped).collect(),
                limit: Some(n),
                start_at: self.end_at.clone(),
                end_at: self.start_at.clone(),
                reverse_results: true,
            },
            other => ExecutionTarget {
                path: self.path.clone(),
                filters: self.filters.clone(),
                order_bys,
                limit: other.map(|(n, _)| n),
                start_at: self.start_at.clone(),
                end_at: self.end_at.clone(),
                reverse_results: false,
            },
        }
    }

    /// Stable structural hash.
    #[must_use]
    pub fn hash_value(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.hash(&mut h);
        h.finish()
    }
}

/// A descriptor lowered to forward-only execution.
#[derive(Debug, Clone)]
pub struct ExecutionTarget {
    pub path: ResourcePath,
    pub filters: Vec<Filter>,
    pub order_bys: Vec<OrderBy>,
    pub limit: Option<u32>,
    pub start_at: Option<Bound>,
    pub end_at: Option<Bound>,
    pub reverse_results: bool,
}
