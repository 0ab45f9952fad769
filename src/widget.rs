//! Widget host seam.
//!
//! Container directives (editing tools, search panes, result tables, data
//! tables) hand off to an embedder-supplied host; the engine only locates the
//! nodes and supplies context. The default host does nothing, which keeps
//! headless rendering useful.

use std::sync::Arc;

use crate::dom::{Fragment, NodeId};
use crate::object::Object;
use crate::schema::Model;

pub trait WidgetHost: Send + Sync {
    /// An `attribute_list` container for the given object.
    fn attribute_list(
        &self,
        frag: &mut Fragment,
        node: NodeId,
        model: Option<&Arc<Model>>,
        obj: Option<&Object>,
    );

    /// An `editing_tools` container. `attributes` is the raw value of the
    /// node's `attributes` attribute, when present.
    fn editing_tools(
        &self,
        frag: &mut Fragment,
        node: NodeId,
        attributes: Option<&str>,
        model: Option<&Arc<Model>>,
    );

    /// A `search` pane.
    fn search(&self, frag: &mut Fragment, node: NodeId, model: Option<&Arc<Model>>);

    /// A `search_results` table. `no_query` suppresses the initial fetch.
    fn search_results(
        &self,
        frag: &mut Fragment,
        node: NodeId,
        model: Option<&Arc<Model>>,
        no_query: bool,
    );

    /// Feed the objects reached by a `relation` directive into the node's
    /// result table.
    fn relation_results(&self, frag: &mut Fragment, node: NodeId, model: &str, objs: &[Object]);

    /// A complex property finished populating rows inside a sortable table.
    fn data_table(&self, frag: &mut Fragment, table: NodeId);
}

/// No-op host for headless rendering and tests.
pub struct NullWidgets;

impl WidgetHost for NullWidgets {
    fn attribute_list(
        &self,
        _frag: &mut Fragment,
        _node: NodeId,
        _model: Option<&Arc<Model>>,
        _obj: Option<&Object>,
    ) {
    }

    fn editing_tools(
        &self,
        _frag: &mut Fragment,
        _node: NodeId,
        _attributes: Option<&str>,
        _model: Option<&Arc<Model>>,
    ) {
    }

    fn search(&self, _frag: &mut Fragment, _node: NodeId, _model: Option<&Arc<Model>>) {}

    fn search_results(
        &self,
        _frag: &mut Fragment,
        _node: NodeId,
        _model: Option<&Arc<Model>>,
        _no_query: bool,
    ) {
    }

    fn relation_results(&self, _frag: &mut Fragment, _node: NodeId, _model: &str, _objs: &[Object]) {
    }

    fn data_table(&self, _frag: &mut Fragment, _table: NodeId) {}
}
