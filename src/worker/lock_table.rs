//! Index-granularity locking for the shared-memory model.
//!
//! The table owns the items while a pool is running: every access goes
//! through a guard obtained from [`ItemLockTable::acquire`], and the guard
//! releases on drop, including on early returns and unwinding.

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::ItemStore;

/// How many consecutive indices share one guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LockGranularity {
    /// One guard per item
    #[default]
    PerItem,
    /// One guard per run of `n` consecutive items
    PerChunk(usize),
}

impl LockGranularity {
    pub fn width(&self) -> usize {
        match self {
            Self::PerItem => 1,
            Self::PerChunk(n) => (*n).max(1),
        }
    }
}

impl fmt::Display for LockGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerItem => f.write_str("per-item"),
            Self::PerChunk(n) => write!(f, "per-chunk({})", n),
        }
    }
}

/// Exclusive access to one item slot.
pub type ItemGuard<'a, T> = MappedMutexGuard<'a, Option<T>>;

pub struct ItemLockTable<T> {
    stripes: Vec<Mutex<Vec<Option<T>>>>,
    width: usize,
    base: usize,
    len: usize,
    granularity: LockGranularity,
}

impl<T> ItemLockTable<T> {
    /// Table of empty slots for `0..len`
    pub fn new(len: usize, granularity: LockGranularity) -> Self {
        Self::from_store(ItemStore::new(len), granularity)
    }

    /// Moves every slot of `store` behind a guard.
    pub fn from_store(store: ItemStore<T>, granularity: LockGranularity) -> Self {
        let (base, slots) = store.into_slots();
        let len = slots.len();
        let width = granularity.width();

        let mut stripes = Vec::with_capacity(len.div_ceil(width));
        let mut slots = slots.into_iter();
        loop {
            let stripe: Vec<Option<T>> = slots.by_ref().take(width).collect();
            if stripe.is_empty() {
                break;
            }
            stripes.push(Mutex::new(stripe));
        }

        Self {
            stripes,
            width,
            base,
            len,
            granularity,
        }
    }

    /// Releases the table back into plain storage once no guards remain.
    pub fn into_store(self) -> ItemStore<T> {
        let slots = self
            .stripes
            .into_iter()
            .flat_map(|stripe| stripe.into_inner())
            .collect();
        ItemStore::from_slots(self.base, slots)
    }

    fn locate(&self, index: usize) -> Option<(usize, usize)> {
        let offset = index.checked_sub(self.base).filter(|o| *o < self.len)?;
        Some((offset / self.width, offset % self.width))
    }

    /// Blocks until `index` is exclusively held. `None` if out of range.
    pub fn acquire(&self, index: usize) -> Option<ItemGuard<'_, T>> {
        let (stripe, slot) = self.locate(index)?;
        let guard = self.stripes[stripe].lock();
        Some(MutexGuard::map(guard, |items| &mut items[slot]))
    }

    /// Non-blocking [`acquire`](Self::acquire); `None` if out of range or held.
    pub fn try_acquire(&self, index: usize) -> Option<ItemGuard<'_, T>> {
        let (stripe, slot) = self.locate(index)?;
        let guard = self.stripes[stripe].try_lock()?;
        Some(MutexGuard::map(guard, |items| &mut items[slot]))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of distinct guards
    pub fn guard_count(&self) -> usize {
        self.stripes.len()
    }

    pub fn granularity(&self) -> LockGranularity {
        self.granularity
    }
}
