//! Connection registry
//!
//! The shared set of live client records, keyed by `ClientId`. A single
//! exclusive lock guards the table; it is held for O(1) mutations and for
//! copying a snapshot, never across a network write.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::client::ClientRecord;
use crate::error::RelayError;
use crate::types::ClientId;

/// Concurrency-safe set of connected clients
///
/// Cheap to clone; all clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    clients: Arc<Mutex<HashMap<ClientId, ClientRecord>>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record
    ///
    /// Fails with `DuplicateIdentity` if the id is already registered.
    pub fn add(&self, record: ClientRecord) -> Result<(), RelayError> {
        let mut clients = self.clients.lock();
        if clients.contains_key(&record.id) {
            return Err(RelayError::DuplicateIdentity(record.id));
        }
        clients.insert(record.id, record);
        debug!("Total clients: {}", clients.len());
        Ok(())
    }

    /// Remove a record
    ///
    /// Idempotent: returns `None` if the id was not present.
    pub fn remove(&self, id: ClientId) -> Option<ClientRecord> {
        let mut clients = self.clients.lock();
        let removed = clients.remove(&id);
        if removed.is_some() {
            debug!("Total clients: {}", clients.len());
        }
        removed
    }

    /// Point-in-time copy of every registered record
    pub fn snapshot(&self) -> Vec<ClientRecord> {
        self.clients.lock().values().cloned().collect()
    }

    /// Set a client's group
    ///
    /// `None` clears the group. Fails with `UnknownIdentity` if the record
    /// was removed concurrently.
    pub fn update_group(&self, id: ClientId, group: Option<String>) -> Result<(), RelayError> {
        let mut clients = self.clients.lock();
        let record = clients
            .get_mut(&id)
            .ok_or(RelayError::UnknownIdentity(id))?;
        record.group = group;
        Ok(())
    }

    /// Copy of one record
    pub fn get(&self, id: ClientId) -> Option<ClientRecord> {
        self.clients.lock().get(&id).cloned()
    }

    /// Check if an id is registered
    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.lock().contains_key(&id)
    }

    /// Number of registered clients
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    /// Check if no clients are registered
    pub fn is_empty(&self) -> bool {
        self.clients.lock().is_empty()
    }
}
