use bson::{Bson, Document as BsonDocument};
use std::borrow::Cow;
use std::cmp::Ordering;

use crate::model::{DocumentKey, FieldPath};
use crate::value::{compare_values, get_field, values_equal};

use super::types::{Bound, Direction, Filter, FilterOperator, OrderBy};

/// Reads a field for query purposes; `__name__` yields the document key.
pub fn query_field<'a>(key: &DocumentKey, doc: &'a BsonDocument, path: &FieldPath) -> Option<Cow<'a, Bson>> {
    if path.is_document_id() {
        return Some(Cow::Owned(key.to_value()));
    }
    get_field(doc, path).map(Cow::Borrowed)
}

fn is_number(v: &Bson) -> bool {
    matches!(v, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

// Range comparisons only apply within one type class.
fn comparable(a: &Bson, b: &Bson) -> bool {
    if is_number(a) && is_number(b) {
        return true;
    }
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

fn contains(list: &[Bson], v: &Bson) -> bool {
    list.iter().any(|x| values_equal(x, v))
}

pub fn eval_filter(key: &DocumentKey, doc: &BsonDocument, filter: &Filter) -> bool {
    let Some(v) = query_field(key, doc, &filter.field) else {
        return false;
    };
    let v = v.as_ref();
    let values = filter.values();
    match filter.op {
        FilterOperator::Equal => values_equal(v, &values[0]),
        FilterOperator::NotEqual => !matches!(v, Bson::Null) && !values_equal(v, &values[0]),
        FilterOperator::LessThan => comparable(v, &values[0]) && compare_values(v, &values[0]) == Ordering::Less,
        FilterOperator::LessThanOrEqual => {
            comparable(v, &values[0]) && compare_values(v, &values[0]) != Ordering::Greater
        }
        FilterOperator::GreaterThan => {
            comparable(v, &values[0]) && compare_values(v, &values[0]) == Ordering::Greater
        }
        FilterOperator::GreaterThanOrEqual => {
            comparable(v, &values[0]) && compare_values(v, &values[0]) != Ordering::Less
        }
        FilterOperator::ArrayContains => matches!(v, Bson::Array(items) if contains(items, &values[0])),
        FilterOperator::ArrayContainsAny => {
            matches!(v, Bson::Array(items) if items.iter().any(|i| contains(values, i)))
        }
        FilterOperator::In => contains(values, v),
        FilterOperator::NotIn => !matches!(v, Bson::Null) && !contains(values, v),
    }
}

/// Compares two documents under the given orderings.
pub fn compare_docs(
    a: (&DocumentKey, &BsonDocument),
    b: (&DocumentKey, &BsonDocument),
    order_bys: &[OrderBy],
) -> Ordering {
    for o in order_bys {
        let va = query_field(a.0, a.1, &o.field);
        let vb = query_field(b.0, b.1, &o.field);
        let ord = match (va, vb) {
            (Some(x), Some(y)) => compare_values(&x, &y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if o.direction == Direction::Ascending { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

// Position of the document relative to the bound, in sort order.
fn compare_to_bound(key: &DocumentKey, doc: &BsonDocument, bound: &Bound, order_bys: &[OrderBy]) -> Ordering {
    for (value, o) in bound.values.iter().zip(order_bys) {
        let Some(field) = query_field(key, doc, &o.field) else {
            return Ordering::Less;
        };
        let ord = compare_values(&field, value);
        if ord != Ordering::Equal {
            return if o.direction == Direction::Ascending { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

pub fn after_start(key: &DocumentKey, doc: &BsonDocument, bound: &Bound, order_bys: &[OrderBy]) -> bool {
    match compare_to_bound(key, doc, bound, order_bys) {
        Ordering::Greater => true,
        Ordering::Equal => bound.inclusive,
        Ordering::Less => false,
    }
}

pub fn before_end(key: &DocumentKey, doc: &BsonDocument, bound: &Bound, order_bys: &[OrderBy]) -> bool {
    match compare_to_bound(key, doc, bound, order_bys) {
        Ordering::Less => true,
        Ordering::Equal => bound.inclusive,
        Ordering::Greater => false,
    }
}

/// Documents missing an ordered field never match an ordered query.
pub fn has_order_fields(key: &DocumentKey, doc: &BsonDocument, order_bys: &[OrderBy]) -> bool {
    order_bys.iter().all(|o| query_field(key, doc, &o.field).is_some())
}
