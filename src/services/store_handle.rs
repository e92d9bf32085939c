//! Process-wide, set-once access to the chunk store.
//!
//! The store is built after the database connection opens, on a background
//! task, so the HTTP listener can come up first. Handlers hold a
//! `StoreHandle` and must check it before every request.

use super::chunk_store::ChunkStore;
use serde::Serialize;
use std::sync::{Arc, OnceLock};

/// Readiness of the shared store. Only `Uninitialized -> Ready` exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreState {
    Uninitialized,
    Ready,
}

#[derive(Clone, Default)]
pub struct StoreHandle {
    inner: Arc<OnceLock<ChunkStore>>,
}

impl StoreHandle {
    /// A handle with no store behind it yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that is ready from the start.
    pub fn ready_with(store: ChunkStore) -> Self {
        let handle = Self::new();
        handle.mark_ready(store);
        handle
    }

    /// Publish the initialized store. Returns `false` if it was already set,
    /// in which case `store` is dropped.
    pub fn mark_ready(&self, store: ChunkStore) -> bool {
        self.inner.set(store).is_ok()
    }

    /// The store, if initialization has completed.
    pub fn get(&self) -> Option<&ChunkStore> {
        self.inner.get()
    }

    pub fn state(&self) -> StoreState {
        if self.inner.get().is_some() {
            StoreState::Ready
        } else {
            StoreState::Uninitialized
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{services::chunk_store::DEFAULT_BUCKET, test_utils::memory_pool};

    #[tokio::test]
    async fn transitions_once_and_is_shared_between_clones() {
        let handle = StoreHandle::new();
        let clone = handle.clone();
        assert_eq!(clone.state(), StoreState::Uninitialized);
        assert!(clone.get().is_none());

        let store = ChunkStore::initialize(memory_pool().await, DEFAULT_BUCKET, 8)
            .await
            .unwrap();
        assert!(handle.mark_ready(store.clone()));
        assert_eq!(clone.state(), StoreState::Ready);
        assert_eq!(clone.get().map(ChunkStore::bucket), Some(DEFAULT_BUCKET));

        // a second initialization is ignored
        let other = ChunkStore::initialize(memory_pool().await, "other", 8)
            .await
            .unwrap();
        assert!(!handle.mark_ready(other));
        assert_eq!(clone.get().map(ChunkStore::bucket), Some(DEFAULT_BUCKET));
    }
}
