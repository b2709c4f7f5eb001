use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::SrError;
use crate::fetch::{FetchError, SchemaFetcher};
use crate::schema::{Schema, SchemaId};

/// Schema ID → schema memo for one guest instance.
///
/// Registry schemas are immutable once an ID is assigned, so entries are
/// never evicted or invalidated. Failed fetches are not cached.
pub struct SchemaCache {
    fetcher: Box<dyn SchemaFetcher>,
    schemas: RefCell<HashMap<SchemaId, Arc<Schema>>>,
    /// IDs with a fetch in flight.
    pending: RefCell<HashSet<SchemaId>>,
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("cached", &self.schemas.borrow().len())
            .field("pending", &self.pending.borrow().len())
            .finish()
    }
}

/// Clears the pending mark for an ID when the fetch finishes, including on
/// early return.
struct PendingGuard<'a> {
    pending: &'a RefCell<HashSet<SchemaId>>,
    id: SchemaId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.borrow_mut().remove(&self.id);
    }
}

impl SchemaCache {
    pub fn new(fetcher: Box<dyn SchemaFetcher>) -> Self {
        Self {
            fetcher,
            schemas: RefCell::new(HashMap::new()),
            pending: RefCell::new(HashSet::new()),
        }
    }

    /// Resolve `id`, fetching it from the host at most once.
    pub fn get(&self, id: SchemaId) -> Result<Arc<Schema>, SrError> {
        if let Some(schema) = self.schemas.borrow().get(&id) {
            return Ok(Arc::clone(schema));
        }

        if !self.pending.borrow_mut().insert(id) {
            return Err(SrError::RegistryUnavailable(format!(
                "fetch for schema {id} is already in flight"
            )));
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };

        tracing::debug!(schema_id = %id, "fetching schema from host");
        let schema = match self.fetcher.fetch(id) {
            Ok(schema) => Arc::new(schema),
            Err(FetchError::NotFound) => return Err(SrError::SchemaNotFound(id)),
            Err(FetchError::Unavailable(reason)) => {
                tracing::warn!(schema_id = %id, %reason, "schema fetch failed");
                return Err(SrError::RegistryUnavailable(reason));
            }
        };

        self.schemas.borrow_mut().insert(id, Arc::clone(&schema));
        Ok(schema)
    }

    pub fn contains(&self, id: SchemaId) -> bool {
        self.schemas.borrow().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.schemas.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.borrow().is_empty()
    }
}
