//! Tracking of statements created outside the cache.

use std::sync::Mutex;

use crate::pool::holder::cache::CachedStatement;

/// Token minted by the uncached registry when a statement is inserted.
/// Redeeming it removes exactly that statement, even after its slot has
/// been reused for another one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatementToken {
    index: usize,
    generation: u32,
}

/// Statements created outside the cache, tracked so the holder can
/// force-close whatever is still open when it changes state.
///
/// Caller threads insert and remove concurrently with the owner thread.
/// Draining for close-out snapshots the contents, so closing never races
/// insertion.
#[derive(Default)]
pub(crate) struct UncachedStatements {
    inner: Mutex<Slots>,
}

#[derive(Default)]
struct Slots {
    values: Vec<Entry>,
    free: Vec<usize>,
}

struct Entry {
    generation: u32,
    value: Option<CachedStatement>,
}

impl UncachedStatements {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, stmt: CachedStatement) -> StatementToken {
        let mut slots = self.inner.lock().unwrap();
        let value = Some(stmt);
        if let Some(index) = slots.free.pop() {
            let generation = slots.values[index].generation + 1;
            slots.values[index] = Entry { generation, value };
            StatementToken { index, generation }
        } else {
            slots.values.push(Entry {
                generation: 0,
                value,
            });
            StatementToken {
                index: slots.values.len() - 1,
                generation: 0,
            }
        }
    }

    /// Removes the statement `token` was minted for, handing it back so the
    /// caller can close it. Stale tokens are ignored.
    pub(crate) fn remove(&self, token: &StatementToken) -> Option<CachedStatement> {
        let mut slots = self.inner.lock().unwrap();
        let entry = slots.values.get_mut(token.index)?;
        if entry.generation != token.generation {
            return None;
        }
        let value = entry.value.take()?;
        slots.free.push(token.index);
        Some(value)
    }

    /// Snapshots and clears the registry, handing back every open
    /// statement.
    ///
    /// Every slot's generation is bumped, so tokens minted before the drain
    /// can never alias a statement inserted after it.
    pub(crate) fn drain(&self) -> Vec<CachedStatement> {
        let mut slots = self.inner.lock().unwrap();
        let slots = &mut *slots;
        slots.free.clear();
        let mut drained = Vec::new();
        for (index, entry) in slots.values.iter_mut().enumerate() {
            entry.generation += 1;
            if let Some(value) = entry.value.take() {
                drained.push(value);
            }
            slots.free.push(index);
        }
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .values
            .iter()
            .filter(|e| e.value.is_some())
            .count()
    }
}
