//! Pure constructors for filters and bounds.

use crate::errors::{QueryError, QueryResult};
use crate::model::{DocumentKey, FieldPath, ResourcePath};
use crate::snapshot::SnapshotFields;
use crate::value::{Value, is_nan};

use super::types::{
    Bound, BoundPosition, Direction, Filter, FilterOperator, FilterValue, MAX_DISJUNCTION_VALUES,
    OrderBy,
};

/// Builds a filter, checking the value count against the operator's arity.
///
/// # Errors
/// `InvalidArgument` when an array operator gets no values (or more than 30), a
/// scalar operator gets anything other than exactly one value, or `NotIn` is
/// given `null`/`NaN`.
pub fn make_filter(field: FieldPath, op: FilterOperator, values: Vec<Value>) -> QueryResult<Filter> {
    let value = if op.is_array_operator() {
        if values.is_empty() {
            return Err(QueryError::InvalidArgument(format!(
                "{op:?} filter on '{field}' requires a non-empty list of values"
            )));
        }
        if values.len() > MAX_DISJUNCTION_VALUES {
            return Err(QueryError::InvalidArgument(format!(
                "{op:?} filter on '{field}' supports at most {MAX_DISJUNCTION_VALUES} values, got {}",
                values.len()
            )));
        }
        if op == FilterOperator::NotIn && values.iter().any(|v| matches!(v, Value::Null) || is_nan(v)) {
            return Err(QueryError::invalid("NotIn filters cannot contain null or NaN"));
        }
        FilterValue::Many(values)
    } else {
        let mut values = values;
        if values.len() != 1 {
            return Err(QueryError::InvalidArgument(format!(
                "{op:?} filter on '{field}' requires exactly one value, got {}",
                values.len()
            )));
        }
        FilterValue::Single(values.remove(0))
    };
    Ok(Filter { field, op, value })
}

/// Builds a filter for a query over `collection`, converting bare document ids
/// when the filter targets the document-identity field.
pub fn make_query_filter(
    collection: &ResourcePath,
    field: FieldPath,
    op: FilterOperator,
    values: Vec<Value>,
) -> QueryResult<Filter> {
    if !field.is_document_id() {
        return make_filter(field, op, values);
    }
    if op.is_array_contains_family() {
        return Err(QueryError::InvalidArgument(format!(
            "{op:?} cannot be used on the document id field"
        )));
    }
    let values = values
        .into_iter()
        .map(|v| convert_document_id(collection, v))
        .collect::<QueryResult<Vec<_>>>()?;
    make_filter(field, op, values)
}

/// Turns a bare document id into the key value used when comparing `__name__`.
pub(crate) fn convert_document_id(collection: &ResourcePath, value: Value) -> QueryResult<Value> {
    match value {
        Value::String(id) => {
            if id.is_empty() {
                return Err(QueryError::invalid("document id must not be empty"));
            }
            if id.contains('/') {
                return Err(QueryError::InvalidArgument(format!(
                    "document id '{id}' must be a plain id, not a path"
                )));
            }
            Ok(DocumentKey::in_collection(collection, &id)?.to_value())
        }
        other => Err(QueryError::InvalidArgument(format!(
            "document id values must be strings, got {other}"
        ))),
    }
}

/// Appends the implicit document-identity ordering so every bound compares
/// against an unambiguous sort key.
#[must_use]
pub fn combine_ordering_for_bound(orderings: &[OrderBy]) -> Vec<OrderBy> {
    let mut out = orderings.to_vec();
    if out.iter().any(|o| o.field.is_document_id()) {
        return out;
    }
    let direction = out.last().map_or(Direction::Ascending, |o| o.direction);
    out.push(OrderBy::new(FieldPath::document_id(), direction));
    out
}

/// Builds a bound from explicit values matched positionally with `orderings`.
///
/// # Errors
/// `InvalidArgument` on an empty value list or malformed document id,
/// `CardinalityMismatch` when there are more values than orderings.
pub fn make_bound_from_values(
    position: BoundPosition,
    collection: &ResourcePath,
    orderings: &[OrderBy],
    values: Vec<Value>,
) -> QueryResult<Bound> {
    if values.is_empty() {
        return Err(QueryError::InvalidArgument(format!(
            "{position:?} requires at least one value"
        )));
    }
    if values.len() > orderings.len() {
        return Err(QueryError::CardinalityMismatch {
            values: values.len(),
            orderings: orderings.len(),
        });
    }
    let values = values
        .into_iter()
        .zip(orderings)
        .map(|(v, o)| if o.field.is_document_id() { convert_document_id(collection, v) } else { Ok(v) })
        .collect::<QueryResult<Vec<_>>>()?;
    Ok(Bound { values, inclusive: position.is_inclusive() })
}

/// Builds a bound from a document snapshot, reading one value per ordering.
///
/// `orderings` should already be normalized (see [`combine_ordering_for_bound`]).
///
/// # Errors
/// `InvalidArgument` if the snapshot's document does not exist or lacks one of
/// the ordered fields.
pub fn make_bound_from_snapshot<S: SnapshotFields + ?Sized>(
    position: BoundPosition,
    orderings: &[OrderBy],
    snapshot: &S,
) -> QueryResult<Bound> {
    if !snapshot.exists() {
        return Err(QueryError::invalid(
            "cannot create a bound from a snapshot of a missing document",
        ));
    }
    let mut values = Vec::with_capacity(orderings.len());
    for o in orderings {
        if o.field.is_document_id() {
            values.push(snapshot.identity_key());
        } else {
            let v = snapshot.field_value(&o.field).ok_or_else(|| {
                QueryError::InvalidArgument(format!(
                    "snapshot has no value for ordered field '{}'",
                    o.field
                ))
            })?;
            values.push(v);
        }
    }
    Ok(Bound { values, inclusive: position.is_inclusive() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::Bson;

    fn fp(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn arity_is_checked() {
        assert!(make_filter(fp("a"), FilterOperator::In, vec![]).is_err());
        assert!(make_filter(fp("a"), FilterOperator::Equal, vec![]).is_err());
        assert!(make_filter(fp("a"), FilterOperator::Equal, vec![1.into(), 2.into()]).is_err());
        let f = make_filter(fp("a"), FilterOperator::In, vec![1.into(), 2.into()]).unwrap();
        assert_eq!(f.values().len(), 2);
        let too_many: Vec<Bson> = (0..31).map(Bson::Int32).collect();
        assert!(make_filter(fp("a"), FilterOperator::In, too_many).is_err());
        assert!(make_filter(fp("a"), FilterOperator::NotIn, vec![Bson::Null]).is_err());
    }

    #[test]
    fn document_id_filters_are_converted() {
        let col = ResourcePath::parse("users").unwrap();
        let f = make_query_filter(&col, FieldPath::document_id(), FilterOperator::Equal, vec!["bob".into()])
            .unwrap();
        assert_eq!(f.values(), &[Bson::String("users/bob".into())]);
        assert!(make_query_filter(&col, FieldPath::document_id(), FilterOperator::Equal, vec!["a/b".into()]).is_err());
        assert!(make_query_filter(&col, FieldPath::document_id(), FilterOperator::Equal, vec![1.into()]).is_err());
        assert!(make_query_filter(&col, FieldPath::document_id(), FilterOperator::ArrayContains, vec!["x".into()]).is_err());
    }

    #[test]
    fn implicit_key_ordering_follows_last_direction() {
        let combined = combine_ordering_for_bound(&[]);
        assert_eq!(combined, vec![OrderBy::new(FieldPath::document_id(), Direction::Ascending)]);
        let combined = combine_ordering_for_bound(&[OrderBy::new(fp("age"), Direction::Descending)]);
        assert_eq!(combined[1], OrderBy::new(FieldPath::document_id(), Direction::Descending));
        let explicit = vec![OrderBy::new(FieldPath::document_id(), Direction::Ascending)];
        assert_eq!(combine_ordering_for_bound(&explicit), explicit);
    }

    #[test]
    fn value_bounds_check_cardinality() {
        let col = ResourcePath::parse("users").unwrap();
        let orderings = vec![OrderBy::new(fp("age"), Direction::Ascending)];
        let err = make_bound_from_values(BoundPosition::StartAt, &col, &orderings, vec![1.into(), 2.into()])
            .unwrap_err();
        assert!(matches!(err, QueryError::CardinalityMismatch { values: 2, orderings: 1 }));
        let b = make_bound_from_values(BoundPosition::StartAfter, &col, &orderings, vec![1.into()]).unwrap();
        assert!(!b.inclusive());
        assert!(make_bound_from_values(BoundPosition::EndAt, &col, &orderings, vec![]).is_err());
    }
}
