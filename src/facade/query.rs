use crate::errors::{QueryError, QueryResult};
use crate::listener::{ListenerRegistration, ListenerSet, SnapshotSink};
use crate::model::FieldPath;
use crate::promise::{AsyncResult, Begun, Owner};
use crate::query::{
    BoundPosition, Direction, FilterOperator, LimitType, OrderBy, QueryDescriptor,
    make_bound_from_snapshot, make_bound_from_values, make_query_filter,
};
use crate::snapshot::{MetadataChanges, QuerySnapshot, SnapshotFields, Source};
use crate::value::Value;
use std::sync::Arc;

use super::{AsyncApis, Database};

/// Anything that names a field: a dotted string or a parsed [`FieldPath`].
pub trait IntoFieldPath {
    /// # Errors
    /// `InvalidArgument` for a malformed dotted path.
    fn into_field_path(self) -> QueryResult<FieldPath>;
}

impl IntoFieldPath for FieldPath {
    fn into_field_path(self) -> QueryResult<FieldPath> {
        Ok(self)
    }
}

impl IntoFieldPath for &FieldPath {
    fn into_field_path(self) -> QueryResult<FieldPath> {
        Ok(self.clone())
    }
}

impl IntoFieldPath for &str {
    fn into_field_path(self) -> QueryResult<FieldPath> {
        FieldPath::parse(self)
    }
}

impl IntoFieldPath for String {
    fn into_field_path(self) -> QueryResult<FieldPath> {
        FieldPath::parse(&self)
    }
}

/// A chainable, immutable query.
///
/// Every `where_*`, ordering, limit and bound method returns a new `Query`
/// and leaves `self` usable. Each `Query` owns its own slot owner: dropping it
/// abandons its pending `get` and removes its listeners.
pub struct Query {
    descriptor: QueryDescriptor,
    db: Database,
    owner: Owner<AsyncApis>,
    listeners: Arc<ListenerSet>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("owner", &self.owner.id())
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

impl Query {
    pub(crate) fn new(descriptor: QueryDescriptor, db: Database) -> Self {
        let owner = db.promises().new_owner();
        Self { descriptor, db, owner, listeners: Arc::new(ListenerSet::default()) }
    }

    fn derive(&self, descriptor: QueryDescriptor) -> Self {
        Self::new(descriptor, self.db.clone())
    }

    pub(crate) fn owner(&self) -> &Owner<AsyncApis> {
        &self.owner
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    #[must_use]
    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }

    /// Structural hash of the descriptor; equal queries hash equal.
    #[must_use]
    pub fn hash_value(&self) -> u64 {
        self.descriptor.hash_value()
    }

    fn where_op<F: IntoFieldPath>(&self, field: F, op: FilterOperator, values: Vec<Value>) -> QueryResult<Self> {
        let filter = make_query_filter(self.descriptor.path(), field.into_field_path()?, op, values)?;
        Ok(self.derive(self.descriptor.with_filter(filter)?))
    }

    // Filters fail with InvalidArgument for a malformed field or a filter the
    // query cannot combine with its existing ones.

    pub fn where_equal_to<F: IntoFieldPath>(&self, field: F, value: impl Into<Value>) -> QueryResult<Self> {
        self.where_op(field, FilterOperator::Equal, vec![value.into()])
    }

    pub fn where_not_equal_to<F: IntoFieldPath>(&self, field: F, value: impl Into<Value>) -> QueryResult<Self> {
        self.where_op(field, FilterOperator::NotEqual, vec![value.into()])
    }

    pub fn where_less_than<F: IntoFieldPath>(&self, field: F, value: impl Into<Value>) -> QueryResult<Self> {
        self.where_op(field, FilterOperator::LessThan, vec![value.into()])
    }

    pub fn where_less_than_or_equal_to<F: IntoFieldPath>(
        &self,
        field: F,
        value: impl Into<Value>,
    ) -> QueryResult<Self> {
        self.where_op(field, FilterOperator::LessThanOrEqual, vec![value.into()])
    }

    pub fn where_greater_than<F: IntoFieldPath>(&self, field: F, value: impl Into<Value>) -> QueryResult<Self> {
        self.where_op(field, FilterOperator::GreaterThan, vec![value.into()])
    }

    pub fn where_greater_than_or_equal_to<F: IntoFieldPath>(
        &self,
        field: F,
        value: impl Into<Value>,
    ) -> QueryResult<Self> {
        self.where_op(field, FilterOperator::GreaterThanOrEqual, vec![value.into()])
    }

    pub fn where_array_contains<F: IntoFieldPath>(&self, field: F, value: impl Into<Value>) -> QueryResult<Self> {
        self.where_op(field, FilterOperator::ArrayContains, vec![value.into()])
    }

    /// Takes between 1 and 30 values.
    pub fn where_array_contains_any<F: IntoFieldPath>(&self, field: F, values: Vec<Value>) -> QueryResult<Self> {
        self.where_op(field, FilterOperator::ArrayContainsAny, values)
    }

    pub fn where_in<F: IntoFieldPath>(&self, field: F, values: Vec<Value>) -> QueryResult<Self> {
        self.where_op(field, FilterOperator::In, values)
    }

    pub fn where_not_in<F: IntoFieldPath>(&self, field: F, values: Vec<Value>) -> QueryResult<Self> {
        self.where_op(field, FilterOperator::NotIn, values)
    }

    pub fn order_by<F: IntoFieldPath>(&self, field: F, direction: Direction) -> QueryResult<Self> {
        let order = OrderBy::new(field.into_field_path()?, direction);
        Ok(self.derive(self.descriptor.with_order_by(order)?))
    }

    pub fn limit(&self, n: i64) -> QueryResult<Self> {
        Ok(self.derive(self.descriptor.with_limit(n, LimitType::FromStart)?))
    }

    /// Keeps the last `n` results in query order.
    pub fn limit_to_last(&self, n: i64) -> QueryResult<Self> {
        Ok(self.derive(self.descriptor.with_limit(n, LimitType::FromLast)?))
    }

    fn bound_from_values(&self, position: BoundPosition, values: Vec<Value>) -> QueryResult<Self> {
        let bound = make_bound_from_values(
            position,
            self.descriptor.path(),
            self.descriptor.explicit_order_bys(),
            values,
        )?;
        self.with_bound(position, bound)
    }

    fn bound_from_snapshot<S: SnapshotFields + ?Sized>(
        &self,
        position: BoundPosition,
        snapshot: &S,
    ) -> QueryResult<Self> {
        let orderings = self.descriptor.normalized_order_bys();
        let bound = make_bound_from_snapshot(position, &orderings, snapshot)?;
        self.with_bound(position, bound)
    }

    fn with_bound(&self, position: BoundPosition, bound: crate::query::Bound) -> QueryResult<Self> {
        let descriptor = if position.is_before() {
            self.descriptor.with_start_at(bound)?
        } else {
            self.descriptor.with_end_at(bound)?
        };
        Ok(self.derive(descriptor))
    }

    /// Values match the explicit orderings positionally; more values than
    /// orderings is a `CardinalityMismatch`.
    pub fn start_at(&self, values: Vec<Value>) -> QueryResult<Self> {
        self.bound_from_values(BoundPosition::StartAt, values)
    }

    pub fn start_after(&self, values: Vec<Value>) -> QueryResult<Self> {
        self.bound_from_values(BoundPosition::StartAfter, values)
    }

    pub fn end_before(&self, values: Vec<Value>) -> QueryResult<Self> {
        self.bound_from_values(BoundPosition::EndBefore, values)
    }

    pub fn end_at(&self, values: Vec<Value>) -> QueryResult<Self> {
        self.bound_from_values(BoundPosition::EndAt, values)
    }

    /// Starts at `snapshot`, reading one value per normalized ordering
    /// (including the implicit document-id ordering).
    pub fn start_at_snapshot<S: SnapshotFields + ?Sized>(&self, snapshot: &S) -> QueryResult<Self> {
        self.bound_from_snapshot(BoundPosition::StartAt, snapshot)
    }

    pub fn start_after_snapshot<S: SnapshotFields + ?Sized>(&self, snapshot: &S) -> QueryResult<Self> {
        self.bound_from_snapshot(BoundPosition::StartAfter, snapshot)
    }

    pub fn end_before_snapshot<S: SnapshotFields + ?Sized>(&self, snapshot: &S) -> QueryResult<Self> {
        self.bound_from_snapshot(BoundPosition::EndBefore, snapshot)
    }

    pub fn end_at_snapshot<S: SnapshotFields + ?Sized>(&self, snapshot: &S) -> QueryResult<Self> {
        self.bound_from_snapshot(BoundPosition::EndAt, snapshot)
    }

    /// Runs the query once. Returns immediately; a call made while an earlier
    /// `get` on this query is still pending observes that same result.
    pub fn get(&self, source: Source) -> AsyncResult<QuerySnapshot> {
        match self.owner.begin::<QuerySnapshot>(AsyncApis::Get) {
            Ok(Begun::Fresh(result, resolver)) => {
                self.db.executor().execute(&self.descriptor, source, resolver);
                result
            }
            Ok(Begun::Joined(result)) => result,
            Err(e) => AsyncResult::failed(e),
        }
    }

    /// Delivers a snapshot now and again whenever the results change, until
    /// the registration is removed or this query is dropped.
    ///
    /// # Errors
    /// Whatever the executor reports when it refuses the subscription.
    pub fn add_snapshot_listener<F>(
        &self,
        metadata_changes: MetadataChanges,
        callback: F,
    ) -> QueryResult<ListenerRegistration>
    where
        F: FnMut(Result<QuerySnapshot, QueryError>) + Send + 'static,
    {
        let sink = SnapshotSink::new(metadata_changes, Box::new(callback));
        let executor = Arc::clone(self.db.executor());
        let id = executor.subscribe(&self.descriptor, Arc::clone(&sink))?;
        let registration = ListenerRegistration::new(id, sink, executor);
        self.listeners.track(registration.clone());
        Ok(registration)
    }
}

impl Clone for Query {
    /// Same descriptor and database, fresh owner and no listeners.
    fn clone(&self) -> Self {
        self.derive(self.descriptor.clone())
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.descriptor == other.descriptor && self.db.same_as(&other.db)
    }
}

impl Eq for Query {}

impl std::hash::Hash for Query {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(&self.descriptor, state);
    }
}

impl Drop for Query {
    fn drop(&mut self) {
        self.listeners.remove_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppOptions, AppRegistry};
    use crate::executor::MemoryExecutor;
    use crate::promise::SlotStatus;
    use bson::doc;

    fn db() -> (Database, Arc<MemoryExecutor>) {
        let app = AppRegistry::default().create(AppOptions::default(), "t");
        let exec = MemoryExecutor::with_defaults().unwrap();
        (Database::new(app, exec.clone()), exec)
    }

    #[test]
    fn chaining_leaves_receiver_untouched() {
        let (db, _exec) = db();
        let base = db.collection("people").unwrap();
        let before = base.hash_value();
        let q = base.where_greater_than("age", 18).unwrap().order_by("age", Direction::Descending).unwrap();
        assert_eq!(base.hash_value(), before);
        assert!(base.descriptor().filters().is_empty());
        assert_eq!(q.descriptor().filters().len(), 1);
        assert_ne!(q.hash_value(), before);
    }

    #[test]
    fn derived_queries_get_their_own_owner() {
        let (db, _exec) = db();
        let base = db.collection("people").unwrap();
        let q = base.limit(2).unwrap();
        let copy = q.clone();
        assert_ne!(q.owner().id(), base.owner().id());
        assert_ne!(q.owner().id(), copy.owner().id());
        assert_eq!(q, copy);
    }

    #[test]
    fn invalid_calls_fail_synchronously() {
        let (db, _exec) = db();
        let base = db.collection("people").unwrap();
        assert!(matches!(base.limit(0), Err(QueryError::InvalidArgument(_))));
        assert!(matches!(base.where_in("a", vec![]), Err(QueryError::InvalidArgument(_))));
        assert!(matches!(base.where_equal_to("a..b", 1), Err(QueryError::InvalidArgument(_))));
        assert!(matches!(
            base.start_at(vec![Value::Int32(1)]),
            Err(QueryError::CardinalityMismatch { values: 1, orderings: 0 })
        ));
    }

    #[test]
    fn get_resolves_with_matching_documents() {
        let (db, exec) = db();
        exec.insert("people", "a", doc! {"age": 30}).unwrap();
        exec.insert("people", "b", doc! {"age": 12}).unwrap();
        let adults = db.collection("people").unwrap().where_greater_than_or_equal_to("age", 18).unwrap();
        let snap = adults.get(Source::Default).wait().unwrap();
        assert_eq!(snap.ids(), vec!["a".to_string()]);
        assert_eq!(adults.owner().status(AsyncApis::Get), Some(SlotStatus::Resolved));
    }

    #[test]
    fn document_id_filters_take_bare_ids() {
        let (db, exec) = db();
        exec.insert("people", "a", doc! {}).unwrap();
        exec.insert("people", "b", doc! {}).unwrap();
        let q = db.collection("people").unwrap().where_equal_to(FieldPath::document_id(), "b").unwrap();
        assert_eq!(q.get(Source::Default).wait().unwrap().ids(), vec!["b".to_string()]);
        assert!(db.collection("people").unwrap().where_equal_to(FieldPath::document_id(), "x/y").is_err());
    }
}
