//! Editable fields collected during resolution.

use serde_json::Value;

use crate::dom::Fragment;
use crate::object::PropertyValue;
use crate::schema::PropertyKind;

/// One editable property discovered while resolving an editable block. The
/// engine collects these; form construction belongs to the embedder.
#[derive(Debug, Clone)]
pub struct Field {
    /// Property name on the model.
    pub name: String,
    pub kind: PropertyKind,
    /// Whether the schema permits writing.
    pub write: bool,
    /// Default value seeded from block options or embedded action data.
    pub def: Option<Value>,
    /// Current value(s) at the time the field was built.
    pub values: Option<PropertyValue>,
    /// Markup to render the editor with, when the template supplied one via
    /// an `edit_template`-classed child.
    pub template: Option<Fragment>,
    /// A `view_template`-classed child asked for display-only rendering.
    pub suppress_editor: bool,
    /// Override for the input widget, from the node's `input_type` attribute.
    pub input_type: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: PropertyKind, write: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            write,
            def: None,
            values: None,
            template: None,
            suppress_editor: false,
            input_type: None,
        }
    }
}
