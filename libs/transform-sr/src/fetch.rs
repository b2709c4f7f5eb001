use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::schema::{Schema, SchemaId};

/// Host status code: call succeeded (non-negative values carry a length).
pub const HOST_STATUS_OK: i32 = 0;
/// Host status code: the registry has no schema with this ID.
pub const HOST_STATUS_NOT_FOUND: i32 = -1;

/// Failure of a single fetch. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("schema not found")]
    NotFound,

    #[error("{0}")]
    Unavailable(String),
}

/// "Fetch schema by ID" capability exposed by the host.
///
/// Calls block until the host has an answer. The guest never talks to the
/// registry directly.
pub trait SchemaFetcher {
    fn fetch(&self, id: SchemaId) -> Result<Schema, FetchError>;
}

/// Map a host status code to a length or a fetch error.
pub fn host_status(rc: i32) -> Result<usize, FetchError> {
    match rc {
        n if n >= HOST_STATUS_OK => Ok(n as usize),
        HOST_STATUS_NOT_FOUND => Err(FetchError::NotFound),
        other => Err(FetchError::Unavailable(format!(
            "host schema lookup failed with status {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Host-backed fetcher (WASM guest only)
// ---------------------------------------------------------------------------

#[cfg(target_arch = "wasm32")]
mod host_abi {
    #[link(wasm_import_module = "schema_registry")]
    unsafe extern "C" {
        pub fn get_schema_definition_len(id: u32, len_out: *mut u32) -> i32;
        pub fn get_schema_definition(id: u32, buf: *mut u8, len: u32) -> i32;
    }
}

/// Fetches schemas through the `schema_registry` host module.
#[cfg(target_arch = "wasm32")]
#[derive(Debug, Default, Clone, Copy)]
pub struct HostSchemaFetcher;

#[cfg(target_arch = "wasm32")]
impl SchemaFetcher for HostSchemaFetcher {
    fn fetch(&self, id: SchemaId) -> Result<Schema, FetchError> {
        let mut len: u32 = 0;
        host_status(unsafe { host_abi::get_schema_definition_len(id.get(), &mut len) })?;

        let mut buf = vec![0u8; len as usize];
        let written =
            host_status(unsafe { host_abi::get_schema_definition(id.get(), buf.as_mut_ptr(), len) })?;
        buf.truncate(written);

        Schema::from_registry_json(id, &buf).map_err(|e| FetchError::Unavailable(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// In-memory fetcher
// ---------------------------------------------------------------------------

#[derive(Default)]
struct InMemoryState {
    schemas: HashMap<SchemaId, Schema>,
    unavailable: Option<String>,
    fetches: HashMap<SchemaId, usize>,
}

/// Registry stand-in for native harnesses and tests.
///
/// Clones share state, so a handle kept outside a client still observes
/// the fetches the client issues.
#[derive(Clone, Default)]
pub struct InMemoryFetcher {
    state: Rc<RefCell<InMemoryState>>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(self, schema: Schema) -> Self {
        self.insert(schema);
        self
    }

    pub fn insert(&self, schema: Schema) {
        self.state.borrow_mut().schemas.insert(schema.id, schema);
    }

    /// Make every subsequent fetch fail as a transport error (`Some`) or
    /// restore normal behaviour (`None`).
    pub fn set_unavailable(&self, reason: Option<&str>) {
        self.state.borrow_mut().unavailable = reason.map(str::to_owned);
    }

    /// Number of fetches issued for `id`, successful or not.
    pub fn fetch_count(&self, id: SchemaId) -> usize {
        self.state.borrow().fetches.get(&id).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.state.borrow().fetches.values().sum()
    }
}

impl SchemaFetcher for InMemoryFetcher {
    fn fetch(&self, id: SchemaId) -> Result<Schema, FetchError> {
        let mut state = self.state.borrow_mut();
        *state.fetches.entry(id).or_default() += 1;
        if let Some(reason) = &state.unavailable {
            return Err(FetchError::Unavailable(reason.clone()));
        }
        state.schemas.get(&id).cloned().ok_or(FetchError::NotFound)
    }
}
