//! Single-assignment result slots and their observer/writer handles.

use crate::errors::QueryError;
use parking_lot::{Condvar, Mutex};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

/// Observable lifecycle of a slot. Every state but `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Pending,
    Resolved,
    Failed,
    Abandoned,
}

pub(crate) enum State<T> {
    Pending,
    Resolved(T),
    Failed(QueryError),
    Abandoned,
}

impl<T: Clone> State<T> {
    fn status(&self) -> SlotStatus {
        match self {
            Self::Pending => SlotStatus::Pending,
            Self::Resolved(_) => SlotStatus::Resolved,
            Self::Failed(_) => SlotStatus::Failed,
            Self::Abandoned => SlotStatus::Abandoned,
        }
    }

    fn outcome(&self) -> Option<Result<T, QueryError>> {
        match self {
            Self::Pending => None,
            Self::Resolved(v) => Some(Ok(v.clone())),
            Self::Failed(e) => Some(Err(e.clone())),
            Self::Abandoned => Some(Err(QueryError::Abandoned)),
        }
    }
}

type Callback<T> = Box<dyn FnOnce(Result<T, QueryError>) + Send>;

struct Inner<T> {
    state: State<T>,
    callbacks: Vec<Callback<T>>,
    wakers: Vec<Waker>,
}

pub(crate) struct Slot<T> {
    label: String,
    inner: Mutex<Inner<T>>,
    done: Condvar,
}

/// What `complete` found when it tried to write.
pub(crate) enum Completion {
    Written,
    AlreadyAbandoned,
    AlreadyCompleted,
}

impl<T: Clone + Send + 'static> Slot<T> {
    pub(crate) fn new(label: String) -> Arc<Self> {
        Arc::new(Self {
            label,
            inner: Mutex::new(Inner { state: State::Pending, callbacks: Vec::new(), wakers: Vec::new() }),
            done: Condvar::new(),
        })
    }

    pub(crate) fn status(&self) -> SlotStatus {
        self.inner.lock().state.status()
    }

    pub(crate) fn complete(&self, next: State<T>) -> Completion {
        let mut guard = self.inner.lock();
        match guard.state {
            State::Pending => {}
            State::Abandoned => return Completion::AlreadyAbandoned,
            _ => return Completion::AlreadyCompleted,
        }
        guard.state = next;
        let outcome = guard.state.outcome();
        let callbacks = std::mem::take(&mut guard.callbacks);
        let wakers = std::mem::take(&mut guard.wakers);
        drop(guard);
        self.done.notify_all();
        if let Some(outcome) = outcome {
            for cb in callbacks {
                cb(outcome.clone());
            }
        }
        for w in wakers {
            w.wake();
        }
        Completion::Written
    }

    pub(crate) fn abandon(&self) -> bool {
        let abandoned = matches!(self.complete(State::Abandoned), Completion::Written);
        if abandoned {
            log::debug!("slot {} abandoned", self.label);
        }
        abandoned
    }
}

/// Read side of a slot. Cloning yields another observer of the same result.
pub struct AsyncResult<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for AsyncResult<T> {
    fn clone(&self) -> Self {
        Self { slot: Arc::clone(&self.slot) }
    }
}

impl<T> std::fmt::Debug for AsyncResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncResult").field("slot", &self.slot.label).finish()
    }
}

impl<T: Clone + Send + 'static> AsyncResult<T> {
    pub(crate) fn from_slot(slot: Arc<Slot<T>>) -> Self {
        Self { slot }
    }

    /// An already-failed result, for errors detected before any work starts.
    #[must_use]
    pub fn failed(error: QueryError) -> Self {
        let slot = Slot::new("failed".into());
        slot.complete(State::Failed(error));
        Self { slot }
    }

    #[must_use]
    pub fn status(&self) -> SlotStatus {
        self.slot.status()
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status() == SlotStatus::Pending
    }

    /// The outcome, if the slot has left `Pending`.
    #[must_use]
    pub fn result(&self) -> Option<Result<T, QueryError>> {
        self.slot.inner.lock().state.outcome()
    }

    /// Blocks the calling thread until the slot completes.
    ///
    /// # Errors
    /// The failure the slot completed with, or `Abandoned`.
    pub fn wait(&self) -> Result<T, QueryError> {
        let mut guard = self.slot.inner.lock();
        loop {
            if let Some(outcome) = guard.state.outcome() {
                return outcome;
            }
            self.slot.done.wait(&mut guard);
        }
    }

    /// Like [`Self::wait`], giving up after `timeout`.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, QueryError>> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.slot.inner.lock();
        loop {
            if let Some(outcome) = guard.state.outcome() {
                return Some(outcome);
            }
            if self.slot.done.wait_until(&mut guard, deadline).timed_out() {
                return guard.state.outcome();
            }
        }
    }

    /// Runs `callback` once with the outcome: immediately when already
    /// complete, otherwise on the completing thread.
    pub fn on_completion<F>(&self, callback: F)
    where
        F: FnOnce(Result<T, QueryError>) + Send + 'static,
    {
        let mut guard = self.slot.inner.lock();
        match guard.state.outcome() {
            Some(outcome) => {
                drop(guard);
                callback(outcome);
            }
            None => guard.callbacks.push(Box::new(callback)),
        }
    }

    /// True when both handles observe the same slot.
    #[must_use]
    pub fn same_slot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T: Clone + Send + 'static> Future for AsyncResult<T> {
    type Output = Result<T, QueryError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut guard = self.slot.inner.lock();
        if let Some(outcome) = guard.state.outcome() {
            return Poll::Ready(outcome);
        }
        if !guard.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            guard.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

/// Write side of a slot, handed to whoever performs the work.
///
/// Holds the slot weakly: once the owner and every observer are gone, a late
/// completion has nothing to write into.
pub struct Resolver<T> {
    slot: Weak<Slot<T>>,
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self { slot: Weak::clone(&self.slot) }
    }
}

impl<T> std::fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").field("live", &(self.slot.strong_count() > 0)).finish()
    }
}

impl<T: Clone + Send + 'static> Resolver<T> {
    pub(crate) fn for_slot(slot: &Arc<Slot<T>>) -> Self {
        Self { slot: Arc::downgrade(slot) }
    }

    /// Completes the slot successfully.
    pub fn resolve(&self, value: T) {
        self.write(State::Resolved(value));
    }

    /// Completes the slot with an error.
    pub fn fail(&self, error: QueryError) {
        self.write(State::Failed(error));
    }

    /// Completes the slot from a `Result`.
    pub fn complete(&self, outcome: Result<T, QueryError>) {
        match outcome {
            Ok(v) => self.resolve(v),
            Err(e) => self.fail(e),
        }
    }

    /// Whether anyone could still observe a completion.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.slot.upgrade().is_some_and(|s| s.status() == SlotStatus::Pending)
    }

    fn write(&self, next: State<T>) {
        let Some(slot) = self.slot.upgrade() else {
            log::debug!("late completion discarded: slot already released");
            return;
        };
        match slot.complete(next) {
            Completion::Written => {}
            Completion::AlreadyAbandoned => {
                log::debug!("late completion discarded: slot {} was abandoned", slot.label);
            }
            Completion::AlreadyCompleted => {
                log::warn!("slot {} resolved twice; second result ignored", slot.label);
                debug_assert!(false, "slot {} resolved twice", slot.label);
            }
        }
    }
}

/// Creates a standalone slot not tied to any owner.
#[must_use]
pub fn channel<T: Clone + Send + 'static>(label: &str) -> (AsyncResult<T>, Resolver<T>) {
    let slot = Slot::new(label.to_string());
    let resolver = Resolver::for_slot(&slot);
    (AsyncResult::from_slot(slot), resolver)
}
