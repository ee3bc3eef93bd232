//! Cache Entry Module
//!
//! Defines cached values (ready or still being computed) and the per-entry
//! bookkeeping used for eviction and age checks.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

static NEXT_PENDING_ID: AtomicU64 = AtomicU64::new(1);

// == Cached Value ==
/// A value held by the cache.
///
/// `Pending` values represent an in-flight computation. They live only in
/// memory: they are never serialized, never written to storage and never
/// listed in the manifest.
#[derive(Debug, Clone)]
pub enum Cached<V> {
    Ready(V),
    Pending(Pending<V>),
}

impl<V> Cached<V> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Cached::Pending(_))
    }

    /// Returns the value if it is ready.
    pub fn ready(&self) -> Option<&V> {
        match self {
            Cached::Ready(value) => Some(value),
            Cached::Pending(_) => None,
        }
    }

    pub fn into_ready(self) -> Option<V> {
        match self {
            Cached::Ready(value) => Some(value),
            Cached::Pending(_) => None,
        }
    }
}

// == Pending Value ==
/// Handle on a value that is still being computed.
///
/// Created together with a [`Resolver`] by [`pending`]. Clones observe the
/// same computation and compare equal through [`Pending::same`].
pub struct Pending<V> {
    id: u64,
    rx: watch::Receiver<Option<V>>,
}

/// Completes a [`Pending`] value.
pub struct Resolver<V> {
    tx: watch::Sender<Option<V>>,
}

/// Creates a linked resolver/pending pair.
pub fn pending<V>() -> (Resolver<V>, Pending<V>) {
    let (tx, rx) = watch::channel(None);
    let id = NEXT_PENDING_ID.fetch_add(1, Ordering::Relaxed);
    (Resolver { tx }, Pending { id, rx })
}

impl<V> Pending<V> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True when both handles observe the same computation.
    pub fn same(&self, other: &Pending<V>) -> bool {
        self.id == other.id
    }

    pub fn is_resolved(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

impl<V: Clone> Pending<V> {
    /// Returns the value if it has already been resolved.
    pub fn peek(&self) -> Option<V> {
        self.rx.borrow().clone()
    }

    /// Waits for the value.
    ///
    /// Returns `None` if the resolver was dropped without resolving.
    pub async fn wait(&self) -> Option<V> {
        let mut rx = self.rx.clone();
        let value = match rx.wait_for(|value| value.is_some()).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        value
    }
}

impl<V> Clone for Pending<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            rx: self.rx.clone(),
        }
    }
}

impl<V> fmt::Debug for Pending<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("id", &self.id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl<V> Resolver<V> {
    /// Publishes the value to every waiting [`Pending`] handle.
    pub fn resolve(self, value: V) {
        self.tx.send_replace(Some(value));
    }
}

// == Entry ==
/// Engine-side record of one resident key.
#[derive(Debug)]
pub(crate) struct Entry<V> {
    pub value: Cached<V>,
    /// Bound-consuming cost of this entry
    pub weight: usize,
    /// Position in the recency order
    pub seq: u64,
    /// Creation/touch timestamp (Unix milliseconds)
    pub stamp: i64,
}

impl<V> Entry<V> {
    // == Is Stale ==
    /// Checks whether the entry outlived `max_age_ms`.
    ///
    /// An entry is stale once strictly more than `max_age_ms` milliseconds
    /// passed since it was stamped; without a max age nothing goes stale.
    pub fn is_stale(&self, now: i64, max_age_ms: Option<i64>) -> bool {
        match max_age_ms {
            Some(max_age) => now.saturating_sub(self.stamp) > max_age,
            None => false,
        }
    }
}
