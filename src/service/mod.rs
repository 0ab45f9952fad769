//! Data service abstraction.
//!
//! The resolution engine is backend-agnostic: every fetch, follow, and
//! mutation goes through [`DataService`]. The in-memory implementation in
//! [`memory`] backs the test suite and small embedders.

pub mod memory;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::object::{FieldMap, Object, PropertyValue};

pub use memory::MemoryService;

/// Backend failure surfaced to the resolution engine.
///
/// `NotFound` is a normal outcome (the property renders as absent);
/// `Transient` is logged and leaves the node untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient service failure: {0}")]
    Transient(String),
}

/// Options accompanying a reference/query fetch.
#[derive(Debug, Clone, Default)]
pub struct RefOptions {
    /// Equality filter parsed from the node's `filter` attribute.
    pub filter: Option<Value>,
    /// Return a placeholder object instead of fetching; the nested block
    /// renders from values already present in the page.
    pub dummy: bool,
    /// Bypass any service-side caching.
    pub no_cache: bool,
}

/// Backend interface the engine resolves against.
#[async_trait]
pub trait DataService: Send + Sync {
    /// Fetch one object by model and id.
    async fn get(&self, model: &str, id: &str, opt: &RefOptions) -> Result<Object, ServiceError>;

    /// Fetch a single on-demand property (`no_store` scalars, blobs).
    async fn load(&self, model: &str, id: &str, prop: &str)
        -> Result<PropertyValue, ServiceError>;

    /// Resolve a reference or query property to its target objects.
    async fn load_refs(
        &self,
        obj: &Object,
        prop: &str,
        opt: &RefOptions,
    ) -> Result<Vec<Object>, ServiceError>;

    /// Follow a relation from `obj` without rendering the targets inline;
    /// used by the relation directive to feed search-result widgets.
    async fn follow(
        &self,
        obj: &Object,
        prop: &str,
        opt: &RefOptions,
    ) -> Result<Vec<Object>, ServiceError>;

    /// Persist field changes. `force` skips optimistic-concurrency checks.
    async fn update(
        &self,
        model: &str,
        id: &str,
        fields: &FieldMap,
        force: bool,
    ) -> Result<Object, ServiceError>;

    /// Create a new object from field values.
    async fn create(&self, model: &str, fields: &FieldMap) -> Result<Object, ServiceError>;

    /// Delete by model and id.
    async fn delete(&self, model: &str, id: &str) -> Result<(), ServiceError>;
}
