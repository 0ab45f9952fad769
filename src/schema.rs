//! Model schema descriptors.
//!
//! A `Model` maps property names to typed descriptors; the attribute
//! resolver consults it to decide how a property is rendered, whether it can
//! be edited, and whether its value must be fetched on demand.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::WeftError;

/// Property type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    /// Scalar text (default rendering).
    Text,
    /// Date-time value with sortable rendering.
    DateTime,
    /// Binary/long-form content, fetched on demand.
    Blob,
    /// Single referenced object.
    Reference,
    /// Query producing referenced objects.
    Query,
    /// List of scalar values.
    List,
    /// Key/value mapping rendered as table rows.
    Complex,
}

impl PropertyKind {
    /// Reference and query properties resolve to nested objects and spawn
    /// child rendering blocks.
    pub fn is_object_ref(self) -> bool {
        matches!(self, PropertyKind::Reference | PropertyKind::Query)
    }
}

/// Type and capability metadata for one schema field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub kind: PropertyKind,

    /// Property may be rendered.
    #[serde(default = "default_true")]
    pub read: bool,

    /// Property may be edited.
    #[serde(default)]
    pub write: bool,

    /// Value is not part of the initial object payload and must be fetched
    /// on demand.
    #[serde(default)]
    pub no_store: bool,

    /// Target model for reference/query properties.
    #[serde(default)]
    pub item_model: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Schema descriptor: display name, canonical href segment, property map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub href: String,
    #[serde(default)]
    pub props: HashMap<String, PropertyDescriptor>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let href = name.to_ascii_lowercase();
        Self {
            name,
            href,
            props: HashMap::new(),
        }
    }

    /// Builder-style property registration.
    pub fn with_prop(mut self, name: &str, mut prop: PropertyDescriptor) -> Self {
        prop.name = name.to_string();
        self.props.insert(name.to_string(), prop);
        self
    }

    pub fn prop(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.props.get(name)
    }

    /// A property that exists and is flagged readable.
    pub fn readable_prop(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.props.get(name).filter(|p| p.read)
    }
}

impl PropertyDescriptor {
    pub fn new(kind: PropertyKind) -> Self {
        Self {
            name: String::new(),
            kind,
            read: true,
            write: false,
            no_store: false,
            item_model: None,
        }
    }

    pub fn writable(mut self) -> Self {
        self.write = true;
        self
    }

    pub fn no_store(mut self) -> Self {
        self.no_store = true;
        self
    }

    pub fn item_model(mut self, model: &str) -> Self {
        self.item_model = Some(model.to_string());
        self
    }
}

/// Registry of known models, keyed by name.
#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<Model>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, mut model: Model) {
        if model.href.is_empty() {
            model.href = model.name.to_ascii_lowercase();
        }
        for (name, prop) in model.props.iter_mut() {
            if prop.name.is_empty() {
                prop.name = name.clone();
            }
        }
        self.models.insert(model.name.clone(), Arc::new(model));
    }

    pub fn get(&self, name: &str) -> Option<Arc<Model>> {
        self.models.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Load a registry from a YAML mapping of model name to model spec.
    ///
    /// ```yaml
    /// Widget:
    ///   href: widget
    ///   props:
    ///     name: { type: text, write: true }
    ///     owner: { type: reference, item_model: User }
    /// ```
    pub fn from_yaml(input: &str) -> Result<Self, WeftError> {
        let raw: HashMap<String, Model> = serde_yaml::from_str(input)?;
        let mut registry = Self::new();
        for (name, mut model) in raw {
            model.name = name;
            registry.insert(model);
        }
        Ok(registry)
    }
}
