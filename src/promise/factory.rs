//! Per-owner registry of in-flight operation slots.
//!
//! Every facade object owns one [`Owner`] allocated from a shared
//! [`PromiseFactory`]. A second `begin` for a kind that is still pending joins
//! the existing slot instead of starting new work. Non-idempotent operations
//! use `start`, which always opens a new slot. Dropping the owner abandons all
//! of its pending slots before `drop` returns.

use crate::errors::{QueryError, QueryResult};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::slot::{AsyncResult, Resolver, Slot, SlotStatus};

/// Identity of one owner within its factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

trait ErasedSlot: Send + Sync {
    fn status(&self) -> SlotStatus;
    fn abandon(&self) -> bool;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Clone + Send + 'static> ErasedSlot for Slot<T> {
    fn status(&self) -> SlotStatus {
        Slot::status(self)
    }

    fn abandon(&self) -> bool {
        Slot::abandon(self)
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

struct OwnerSlots<K> {
    id: OwnerId,
    slots: Mutex<HashMap<K, Vec<Arc<dyn ErasedSlot>>>>,
}

/// Outcome of [`Owner::begin`].
pub enum Begun<T> {
    /// A new slot was created; the caller must start the work and complete
    /// it through the resolver.
    Fresh(AsyncResult<T>, Resolver<T>),
    /// A slot for this kind is already pending; no new work must be started.
    Joined(AsyncResult<T>),
}

impl<T> Begun<T> {
    /// The observer handle, regardless of how the slot was obtained.
    pub fn result(&self) -> &AsyncResult<T> {
        match self {
            Self::Fresh(r, _) | Self::Joined(r) => r,
        }
    }

    #[must_use]
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(..))
    }
}

/// Allocates owners and keeps a weak index of them for diagnostics.
pub struct PromiseFactory<K> {
    next_id: AtomicU64,
    owners: RwLock<HashMap<OwnerId, Weak<OwnerSlots<K>>>>,
}

impl<K> Default for PromiseFactory<K> {
    fn default() -> Self {
        Self { next_id: AtomicU64::new(1), owners: RwLock::new(HashMap::new()) }
    }
}

impl<K> PromiseFactory<K>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a new owner.
    #[must_use]
    pub fn new_owner(self: &Arc<Self>) -> Owner<K> {
        let id = OwnerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let slots = Arc::new(OwnerSlots { id, slots: Mutex::new(HashMap::new()) });
        self.owners.write().insert(id, Arc::downgrade(&slots));
        Owner { factory: Arc::clone(self), slots }
    }

    /// Number of live owners.
    #[must_use]
    pub fn owner_count(&self) -> usize {
        self.owners.read().values().filter(|w| w.strong_count() > 0).count()
    }

    /// Number of pending slots across every live owner.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        let owners: Vec<Arc<OwnerSlots<K>>> =
            self.owners.read().values().filter_map(Weak::upgrade).collect();
        owners
            .iter()
            .map(|o| {
                o.slots
                    .lock()
                    .values()
                    .flatten()
                    .filter(|s| s.status() == SlotStatus::Pending)
                    .count()
            })
            .sum()
    }
}

/// One owner's view of the factory. Not `Clone`: exactly one facade object
/// owns it, and dropping it abandons the owner's pending slots.
pub struct Owner<K>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
{
    factory: Arc<PromiseFactory<K>>,
    slots: Arc<OwnerSlots<K>>,
}

impl<K> Owner<K>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
{
    #[must_use]
    pub fn id(&self) -> OwnerId {
        self.slots.id
    }

    #[must_use]
    pub fn factory(&self) -> &Arc<PromiseFactory<K>> {
        &self.factory
    }

    /// Starts an operation of `kind`, or joins the one already pending.
    ///
    /// # Errors
    /// `InvalidArgument` if `kind` is pending with a different result type.
    pub fn begin<T: Clone + Send + 'static>(&self, kind: K) -> QueryResult<Begun<T>> {
        let mut slots = self.slots.slots.lock();
        let list = slots.entry(kind).or_default();
        list.retain(|s| s.status() == SlotStatus::Pending);
        if let Some(existing) = list.last() {
            let slot = Arc::clone(existing).into_any().downcast::<Slot<T>>().map_err(|_| {
                QueryError::InvalidArgument(format!(
                    "operation {kind:?} is already pending with a different result type"
                ))
            })?;
            log::debug!("{}: joined pending {kind:?}", self.slots.id);
            crate::dev6!("slot joined {} {:?}", self.slots.id, kind);
            return Ok(Begun::Joined(AsyncResult::from_slot(slot)));
        }
        let slot = Slot::<T>::new(format!("{}/{kind:?}", self.slots.id));
        list.push(Arc::clone(&slot) as Arc<dyn ErasedSlot>);
        drop(slots);
        log::debug!("{}: started {kind:?}", self.slots.id);
        crate::dev6!("slot started {} {:?}", self.slots.id, kind);
        let resolver = Resolver::for_slot(&slot);
        Ok(Begun::Fresh(AsyncResult::from_slot(slot), resolver))
    }

    /// Opens a new slot for `kind` even if others are pending. Later `begin`
    /// calls join the newest one.
    pub fn start<T: Clone + Send + 'static>(&self, kind: K) -> (AsyncResult<T>, Resolver<T>) {
        let slot = Slot::<T>::new(format!("{}/{kind:?}", self.slots.id));
        {
            let mut slots = self.slots.slots.lock();
            let list = slots.entry(kind).or_default();
            list.retain(|s| s.status() == SlotStatus::Pending);
            list.push(Arc::clone(&slot) as Arc<dyn ErasedSlot>);
        }
        log::debug!("{}: started {kind:?}", self.slots.id);
        crate::dev6!("slot started {} {:?}", self.slots.id, kind);
        let resolver = Resolver::for_slot(&slot);
        (AsyncResult::from_slot(slot), resolver)
    }

    /// Status of the most recent slot for `kind`, if one is still tracked.
    #[must_use]
    pub fn status(&self, kind: K) -> Option<SlotStatus> {
        self.slots.slots.lock().get(&kind).and_then(|l| l.last()).map(|s| s.status())
    }

    /// Number of pending slots held by this owner.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.slots
            .slots
            .lock()
            .values()
            .flatten()
            .filter(|s| s.status() == SlotStatus::Pending)
            .count()
    }
}

impl<K> Drop for Owner<K>
where
    K: Copy + Eq + Hash + Debug + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let slots: Vec<Arc<dyn ErasedSlot>> =
            self.slots.slots.lock().drain().flat_map(|(_, list)| list).collect();
        let mut abandoned = 0usize;
        for slot in slots {
            if slot.abandon() {
                abandoned += 1;
            }
        }
        self.factory.owners.write().remove(&self.slots.id);
        if abandoned > 0 {
            log::debug!("{} destroyed; abandoned {abandoned} pending operation(s)", self.slots.id);
        }
    }
}
