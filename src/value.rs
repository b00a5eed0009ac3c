//! Value model: document values are BSON values.
//!
//! Queries need a single total ordering across every BSON type (for sorting and
//! cursor bounds), an equality that agrees with that ordering, and a hash that
//! agrees with the equality so descriptors can be used as map keys. Numbers of
//! different BSON widths compare by numeric value, so `Int32(1)`, `Int64(1)`
//! and `Double(1.0)` are equal and hash identically. `NaN` equals itself and
//! sorts before every other number.

use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::model::FieldPath;

/// The value type carried by filters, bounds and documents.
pub type Value = Bson;

// Safety limit on nested field lookups.
pub(crate) const MAX_PATH_DEPTH: usize = 32;

fn type_rank(v: &Bson) -> u8 {
    use bson::Bson as T;
    match v {
        T::MinKey => 0,
        T::Null | T::Undefined => 1,
        T::Boolean(_) => 2,
        T::Int32(_) | T::Int64(_) | T::Double(_) | T::Decimal128(_) => 3,
        T::DateTime(_) | T::Timestamp(_) => 4,
        T::String(_) | T::Symbol(_) => 5,
        T::Binary(_) => 6,
        T::ObjectId(_) => 7,
        T::RegularExpression(_) => 8,
        T::JavaScriptCode(_) | T::JavaScriptCodeWithScope(_) => 9,
        T::DbPointer(_) => 10,
        T::Array(_) => 11,
        T::Document(_) => 12,
        T::MaxKey => 13,
    }
}

enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(v: &Bson) -> Option<Num> {
    match v {
        Bson::Int32(i) => Some(Num::Int(i64::from(*i))),
        Bson::Int64(i) => Some(Num::Int(*i)),
        Bson::Double(f) => Some(Num::Float(*f)),
        Bson::Decimal128(d) => Some(Num::Float(d.to_string().parse::<f64>().unwrap_or(f64::NAN))),
        _ => None,
    }
}

// 2^63 as f64, the first float above i64::MAX.
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

fn cmp_int_float(i: i64, f: f64) -> Ordering {
    if f.is_nan() {
        return Ordering::Greater;
    }
    if f >= TWO_POW_63 {
        return Ordering::Less;
    }
    if f < -TWO_POW_63 {
        return Ordering::Greater;
    }
    let t = f.trunc();
    #[allow(clippy::cast_possible_truncation)]
    let ti = t as i64;
    match i.cmp(&ti) {
        Ordering::Equal => {
            let frac = f - t;
            if frac > 0.0 {
                Ordering::Less
            } else if frac < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        other => other,
    }
}

fn cmp_float(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        // -0.0 == 0.0 here, unlike total_cmp
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

fn cmp_num(a: &Num, b: &Num) -> Ordering {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x.cmp(y),
        (Num::Int(x), Num::Float(y)) => cmp_int_float(*x, *y),
        (Num::Float(x), Num::Int(y)) => cmp_int_float(*y, *x).reverse(),
        (Num::Float(x), Num::Float(y)) => cmp_float(*x, *y),
    }
}

fn sorted_entries(d: &BsonDocument) -> Vec<(&String, &Bson)> {
    let mut entries: Vec<(&String, &Bson)> = d.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

/// Total ordering across all values used for sorting and bound comparison.
pub fn compare_values(a: &Bson, b: &Bson) -> Ordering {
    use bson::Bson as T;
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    if let (Some(x), Some(y)) = (as_num(a), as_num(b)) {
        return cmp_num(&x, &y);
    }
    match (a, b) {
        (T::Boolean(x), T::Boolean(y)) => x.cmp(y),
        (T::String(x) | T::Symbol(x), T::String(y) | T::Symbol(y)) => x.cmp(y),
        (T::DateTime(x), T::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        (T::Timestamp(x), T::Timestamp(y)) => (x.time, x.increment).cmp(&(y.time, y.increment)),
        (T::DateTime(_), T::Timestamp(_)) => Ordering::Less,
        (T::Timestamp(_), T::DateTime(_)) => Ordering::Greater,
        (T::Binary(x), T::Binary(y)) => x.bytes.cmp(&y.bytes),
        (T::ObjectId(x), T::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (T::Array(x), T::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let c = compare_values(l, r);
                if c != Ordering::Equal {
                    return c;
                }
            }
            x.len().cmp(&y.len())
        }
        (T::Document(x), T::Document(y)) => compare_documents(x, y),
        (T::MinKey, T::MinKey) | (T::MaxKey, T::MaxKey) => Ordering::Equal,
        (T::Null | T::Undefined, T::Null | T::Undefined) => Ordering::Equal,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn compare_documents(x: &BsonDocument, y: &BsonDocument) -> Ordering {
    let (ex, ey) = (sorted_entries(x), sorted_entries(y));
    for ((kl, vl), (kr, vr)) in ex.iter().zip(ey.iter()) {
        let c = kl.cmp(kr).then_with(|| compare_values(vl, vr));
        if c != Ordering::Equal {
            return c;
        }
    }
    ex.len().cmp(&ey.len())
}

/// Document equality under [`values_equal`]; key order and NaN do not matter.
pub fn documents_equal(a: &BsonDocument, b: &BsonDocument) -> bool {
    compare_documents(a, b) == Ordering::Equal
}

/// Equality consistent with [`compare_values`].
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    compare_values(a, b) == Ordering::Equal
}

/// Hashes a value consistently with [`values_equal`].
pub fn hash_value<H: Hasher>(v: &Bson, state: &mut H) {
    use bson::Bson as T;
    type_rank(v).hash(state);
    if let Some(n) = as_num(v) {
        match n {
            Num::Int(i) => i.hash(state),
            Num::Float(f) if f.is_nan() => u64::MAX.hash(state),
            Num::Float(f) if f.fract() == 0.0 && (-TWO_POW_63..TWO_POW_63).contains(&f) => {
                #[allow(clippy::cast_possible_truncation)]
                (f as i64).hash(state);
            }
            Num::Float(f) => f.to_bits().hash(state),
        }
        return;
    }
    match v {
        T::Boolean(b) => b.hash(state),
        T::String(s) | T::Symbol(s) => s.hash(state),
        T::DateTime(d) => d.timestamp_millis().hash(state),
        T::Timestamp(t) => (t.time, t.increment).hash(state),
        T::Binary(b) => b.bytes.hash(state),
        T::ObjectId(o) => o.bytes().hash(state),
        T::Array(items) => {
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        T::Document(d) => {
            let entries = sorted_entries(d);
            entries.len().hash(state);
            for (k, item) in entries {
                k.hash(state);
                hash_value(item, state);
            }
        }
        T::MinKey | T::MaxKey | T::Null | T::Undefined => {}
        other => other.to_string().hash(state),
    }
}

pub(crate) fn is_nan(v: &Bson) -> bool {
    matches!(as_num(v), Some(Num::Float(f)) if f.is_nan())
}

/// Reads a (possibly nested) field from a document.
pub fn get_field<'a>(doc: &'a BsonDocument, path: &FieldPath) -> Option<&'a Bson> {
    let segments = path.segments();
    if segments.is_empty() || segments.len() > MAX_PATH_DEPTH {
        return None;
    }
    let (last, parents) = segments.split_last()?;
    let mut cur = doc;
    for part in parents {
        match cur.get(part) {
            Some(Bson::Document(d)) => cur = d,
            _ => return None,
        }
    }
    cur.get(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn h(v: &Bson) -> u64 {
        let mut s = DefaultHasher::new();
        hash_value(v, &mut s);
        s.finish()
    }

    #[test]
    fn numbers_compare_across_widths() {
        assert!(values_equal(&Bson::Int32(1), &Bson::Int64(1)));
        assert!(values_equal(&Bson::Int64(1), &Bson::Double(1.0)));
        assert_eq!(compare_values(&Bson::Int32(2), &Bson::Double(2.5)), Ordering::Less);
        assert_eq!(compare_values(&Bson::Double(-0.5), &Bson::Int64(-1)), Ordering::Greater);
        assert_eq!(h(&Bson::Int32(7)), h(&Bson::Double(7.0)));
    }

    #[test]
    fn nan_and_signed_zero() {
        assert!(values_equal(&Bson::Double(f64::NAN), &Bson::Double(f64::NAN)));
        assert!(values_equal(&Bson::Double(-0.0), &Bson::Double(0.0)));
        assert_eq!(h(&Bson::Double(-0.0)), h(&Bson::Int32(0)));
        assert_eq!(compare_values(&Bson::Double(f64::NAN), &Bson::Int64(i64::MIN)), Ordering::Less);
    }

    #[test]
    fn large_integers_do_not_collapse() {
        let a = Bson::Int64(i64::MAX);
        let b = Bson::Int64(i64::MAX - 1);
        assert!(!values_equal(&a, &b));
        assert_eq!(compare_values(&a, &Bson::Double(TWO_POW_63)), Ordering::Less);
    }

    #[test]
    fn type_order() {
        let ordered = [
            Bson::Null,
            Bson::Boolean(false),
            Bson::Int32(10),
            Bson::String("a".into()),
            Bson::Array(vec![]),
            Bson::Document(bson::doc! {}),
        ];
        for w in ordered.windows(2) {
            assert_eq!(compare_values(&w[0], &w[1]), Ordering::Less);
        }
    }

    #[test]
    fn documents_ignore_key_order() {
        let a = Bson::Document(bson::doc! {"x": 1, "y": 2});
        let b = Bson::Document(bson::doc! {"y": 2, "x": 1});
        assert!(values_equal(&a, &b));
        assert_eq!(h(&a), h(&b));
    }

    #[test]
    fn nested_field_lookup() {
        let d = bson::doc! {"a": {"b": {"c": 5}}, "top": true};
        let p = FieldPath::parse("a.b.c").unwrap();
        assert_eq!(get_field(&d, &p), Some(&Bson::Int32(5)));
        assert!(get_field(&d, &FieldPath::parse("a.x").unwrap()).is_none());
        assert!(get_field(&d, &FieldPath::parse("top.x").unwrap()).is_none());
    }
}
