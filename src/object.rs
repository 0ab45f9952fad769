//! Data objects returned by the service layer.
//!
//! An `Object` is a loosely-typed record: an id, a model name, and a map of
//! property values. Each property holds zero or more entries so that list,
//! complex, and query properties share one representation with scalars.

use std::collections::HashMap;

use serde_json::Value;

/// One entry of a property value. Complex properties carry a key; everything
/// else leaves it empty.
#[derive(Debug, Clone, PartialEq)]
pub struct PropEntry {
    pub key: Option<String>,
    pub val: Value,
}

impl PropEntry {
    pub fn scalar(val: impl Into<Value>) -> Self {
        Self {
            key: None,
            val: val.into(),
        }
    }

    pub fn keyed(key: impl Into<String>, val: impl Into<Value>) -> Self {
        Self {
            key: Some(key.into()),
            val: val.into(),
        }
    }

    /// Render the entry value as display text. Strings pass through, null
    /// renders empty, everything else uses its JSON form.
    pub fn as_str(&self) -> String {
        match &self.val {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Reference entries carry a `$ref` envelope naming the target.
    pub fn as_ref_target(&self) -> Option<(&str, &str)> {
        let env = self.val.get("$ref")?;
        let model = env.get("model")?.as_str()?;
        let id = env.get("id")?.as_str()?;
        Some((model, id))
    }

    /// Build a reference entry pointing at `model`/`id`.
    pub fn reference(model: &str, id: &str) -> Self {
        Self {
            key: None,
            val: serde_json::json!({ "$ref": { "model": model, "id": id } }),
        }
    }
}

/// A (possibly multi-valued) property value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyValue {
    pub entries: Vec<PropEntry>,
}

impl PropertyValue {
    pub fn single(val: impl Into<Value>) -> Self {
        Self {
            entries: vec![PropEntry::scalar(val)],
        }
    }

    pub fn from_values<I, V>(vals: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            entries: vals.into_iter().map(PropEntry::scalar).collect(),
        }
    }

    pub fn first(&self) -> Option<&PropEntry> {
        self.entries.first()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Join all entry values with a separator, for scalar display.
    pub fn join(&self, sep: &str) -> String {
        self.entries
            .iter()
            .map(|e| e.as_str())
            .collect::<Vec<_>>()
            .join(sep)
    }
}

/// Field values keyed by property name, used for update/create payloads.
pub type FieldMap = HashMap<String, PropertyValue>;

/// A record fetched from (or destined for) the data service.
#[derive(Debug, Clone, Default)]
pub struct Object {
    pub id: String,
    pub model: String,
    pub data: FieldMap,
}

impl Object {
    pub fn new(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            data: FieldMap::new(),
        }
    }

    /// A placeholder object carrying only identity, with no property data.
    /// Produced when a cached-reference policy lets a nested block render
    /// from values already present in the page.
    pub fn dummy(model: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(model, id)
    }

    /// Builder-style property assignment.
    pub fn with(mut self, prop: &str, value: PropertyValue) -> Self {
        self.data.insert(prop.to_string(), value);
        self
    }

    pub fn get(&self, prop: &str) -> Option<&PropertyValue> {
        self.data.get(prop)
    }

    /// Whether a value for this property is present locally. A `no_store`
    /// property is not loaded until the service has been asked for it.
    pub fn is_loaded(&self, prop: &str) -> bool {
        self.data.contains_key(prop)
    }

    pub fn set(&mut self, prop: &str, value: PropertyValue) {
        self.data.insert(prop.to_string(), value);
    }
}
