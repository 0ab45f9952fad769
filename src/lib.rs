//! weft: a directive-driven template-to-document binding engine.
//!
//! Templates are plain markup annotated with directive attributes
//! (`attribute`, `link`, `condition`, `action`, ...). The engine resolves a
//! fragment against typed data objects fetched through an async service
//! trait: markers are consumed in a fixed handler order, data loads run
//! concurrently between passes, and resolution terminates when no marker
//! remains. The output is ordinary markup plus a record of the editable
//! fields and interactions discovered along the way.
//!
//! ```no_run
//! use std::sync::Arc;
//! use weft::{Engine, EngineConfig, MemoryService, Model, ModelRegistry,
//!            PropertyDescriptor, PropertyKind};
//!
//! # async fn demo() -> Result<(), weft::WeftError> {
//! let mut models = ModelRegistry::new();
//! models.insert(Model::new("Widget")
//!     .with_prop("name", PropertyDescriptor::new(PropertyKind::Text)));
//!
//! let engine = Engine::new(EngineConfig::new(), Arc::new(MemoryService::new()), models);
//! let block = engine.render(r#"<span attribute="name"/>"#, "Widget", "w-1").await?;
//! println!("{}", block.to_xml());
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod config;
pub mod directive;
pub mod dom;
pub mod engine;
pub mod error;
pub mod event_log;
pub mod expr;
pub mod fields;
mod handlers;
pub mod object;
pub mod schema;
pub mod service;
pub mod util;
pub mod widget;

pub use block::{Block, BlockOptions, NodeAction, MAX_RESOLUTION_PASSES};
pub use config::{CachePolicy, DenyAllCache, EngineConfig, StaticCacheSet};
pub use dom::{Fragment, NodeId};
pub use engine::Engine;
pub use error::{FixSuggestion, WeftError};
pub use event_log::{Event, EventKind, EventLog};
pub use fields::Field;
pub use object::{FieldMap, Object, PropEntry, PropertyValue};
pub use schema::{Model, ModelRegistry, PropertyDescriptor, PropertyKind};
pub use service::{DataService, MemoryService, RefOptions, ServiceError};
pub use widget::{NullWidgets, WidgetHost};
