//! Container directives: `editing_tools`, `search`, `search_results`, and
//! `attribute_list`.
//!
//! These mark mount points for embedder-supplied widgets. The engine consumes
//! the marker, works out the model in play, and hands the node to the widget
//! host; what gets mounted there is not its business.

use crate::block::Block;
use crate::directive::{self, Filter};
use crate::event_log::EventKind;

pub(crate) fn resolve(block: &mut Block) -> usize {
    let mut changed = 0;
    changed += resolve_editing_tools(block);
    changed += resolve_search(block);
    changed += resolve_search_results(block);
    changed += resolve_attribute_lists(block);
    changed
}

fn resolve_editing_tools(block: &mut Block) -> usize {
    let hits = directive::find(
        &block.fragment,
        block.fragment.root(),
        directive::EDITING_TOOLS,
        Filter::All,
    );
    let widgets = block.ctx.widgets.clone();
    let mut changed = 0;
    for (node, value) in hits {
        block.fragment.remove_attr(node, directive::EDITING_TOOLS);
        changed += 1;
        let model = named_or_block_model(block, &value);
        let attributes = block
            .fragment
            .attr(node, directive::ATTRIBUTES)
            .map(str::to_string);
        widgets.editing_tools(&mut block.fragment, node, attributes.as_deref(), model.as_ref());
        emit(block, directive::EDITING_TOOLS, value);
    }
    changed
}

fn resolve_search(block: &mut Block) -> usize {
    let hits = directive::find(
        &block.fragment,
        block.fragment.root(),
        directive::SEARCH,
        Filter::All,
    );
    let widgets = block.ctx.widgets.clone();
    let mut changed = 0;
    for (node, value) in hits {
        block.fragment.remove_attr(node, directive::SEARCH);
        changed += 1;
        let model = named_or_block_model(block, &value);
        widgets.search(&mut block.fragment, node, model.as_ref());
        emit(block, directive::SEARCH, value);
    }
    changed
}

fn resolve_search_results(block: &mut Block) -> usize {
    let hits = directive::find(
        &block.fragment,
        block.fragment.root(),
        directive::SEARCH_RESULTS,
        Filter::All,
    );
    let widgets = block.ctx.widgets.clone();
    let mut changed = 0;
    for (node, value) in hits {
        block.fragment.remove_attr(node, directive::SEARCH_RESULTS);
        changed += 1;
        let no_query = value == "no_query" || block.fragment.attr(node, "no_query").is_some();
        let model_name = if no_query && value == "no_query" { "" } else { value.as_str() };
        let model = named_or_block_model(block, model_name);
        widgets.search_results(&mut block.fragment, node, model.as_ref(), no_query);
        emit(block, directive::SEARCH_RESULTS, value);
    }
    changed
}

/// `attribute_list` markers nested under an unresolved (or already resolved)
/// attribute subtree belong to that nested template, not to this block.
fn resolve_attribute_lists(block: &mut Block) -> usize {
    let hits = directive::find(
        &block.fragment,
        block.fragment.root(),
        directive::ATTRIBUTE_LIST,
        Filter::NotInside(&[directive::ATTRIBUTE, directive::RESOLVED]),
    );
    let widgets = block.ctx.widgets.clone();
    let mut changed = 0;
    for (node, value) in hits {
        if !block.fragment.is_attached(node) {
            continue;
        }
        block.fragment.remove_attr(node, directive::ATTRIBUTE_LIST);
        changed += 1;
        let model = block.model.clone();
        widgets.attribute_list(&mut block.fragment, node, model.as_ref(), block.object.as_ref());
        emit(block, directive::ATTRIBUTE_LIST, value);
    }
    changed
}

fn named_or_block_model(block: &Block, name: &str) -> Option<std::sync::Arc<crate::schema::Model>> {
    if name.trim().is_empty() {
        block.model.clone()
    } else {
        block.ctx.models.get(name.trim()).or_else(|| block.model.clone())
    }
}

fn emit(block: &Block, directive: &str, value: String) {
    block.ctx.events.emit(EventKind::MarkerResolved {
        directive: directive.to_string(),
        value,
    });
}
