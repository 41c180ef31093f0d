use std::{
    collections::HashMap,
    io::Cursor,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;

use crate::{
    error::{Result, SpoolError},
    store::{BodyStream, MessageStore},
    types::SpooledMessageId,
};

/// In-memory backing store.
///
/// Bodies live in a `HashMap` behind an `RwLock`. Primarily intended for
/// tests and transient setups; it additionally journals every deletion
/// so callers can inspect terminal outcomes.
///
/// # Concurrency
/// Poisoned locks are recovered by taking the inner data: a panicking
/// reader cannot corrupt a map of immutable bodies.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    bodies: Arc<RwLock<HashMap<SpooledMessageId, Arc<[u8]>>>>,
    deletions: Arc<RwLock<Vec<SpooledMessageId>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a body under `id`, replacing any previous one.
    pub fn insert(&self, id: SpooledMessageId, body: impl Into<Vec<u8>>) {
        self.bodies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::from(body.into()));
    }

    /// The ids deleted so far, in deletion order.
    #[must_use]
    pub fn deletions(&self) -> Vec<SpooledMessageId> {
        self.deletions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The number of messages currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn open_body(&self, id: &SpooledMessageId) -> Result<BodyStream> {
        let body = self
            .bodies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(Arc::clone)
            .ok_or_else(|| SpoolError::NotFound(id.clone()))?;

        Ok(Box::new(Cursor::new(body)))
    }

    async fn delete(&self, id: &SpooledMessageId) -> Result<()> {
        self.bodies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .ok_or_else(|| SpoolError::NotFound(id.clone()))?;

        self.deletions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id.clone());

        Ok(())
    }
}
