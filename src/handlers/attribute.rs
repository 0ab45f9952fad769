//! `attribute` markers: property display, reference descent, on-demand
//! loads, and editable-field collection.
//!
//! Markers resolve one at a time, first-in-document-order, because resolving
//! a reference rewrites the subtree under its carrier and a batch scan would
//! go stale. Consumed markers leave a `_attribute` spelling behind for
//! introspection; nested templates author that spelling directly on nodes
//! this handler must never touch.

use serde_json::Value;
use tracing::warn;

use crate::block::{Block, JobKind, PendingJob};
use crate::directive::{self, Filter};
use crate::dom::{Fragment, NodeId};
use crate::event_log::EventKind;
use crate::expr;
use crate::fields::Field;
use crate::object::{PropEntry, PropertyValue};
use crate::schema::{PropertyDescriptor, PropertyKind};
use crate::util;

/// Bail-out bound for one pass; a fragment with more markers than this is a
/// runaway (markers must strictly decrease, so this is never hit legally).
const MAX_INNER_STEPS: usize = 4096;

pub(crate) fn resolve(block: &mut Block) -> usize {
    if block.object.is_none() && block.model.is_none() {
        return 0;
    }
    let mut changed = 0;
    loop {
        if changed >= MAX_INNER_STEPS {
            warn!("attribute resolution exceeded its step bound; bailing out");
            break;
        }
        let mut hits = directive::find(
            &block.fragment,
            block.fragment.root(),
            directive::ATTRIBUTE,
            Filter::First,
        );
        let Some((node, value)) = hits.pop() else {
            break;
        };
        resolve_one(block, node, &value);
        changed += 1;
    }
    changed
}

fn resolve_one(block: &mut Block, node: NodeId, value: &str) {
    let (prop, follow) = directive::split_follow(value);
    block.fragment.remove_attr(node, directive::ATTRIBUTE);
    block.fragment.set_attr(node, directive::RESOLVED, value);
    block.ctx.events.emit(EventKind::MarkerResolved {
        directive: directive::ATTRIBUTE.to_string(),
        value: value.to_string(),
    });

    // Identity pseudo-properties resolve without a schema.
    if prop == "id" {
        let id = block
            .object
            .as_ref()
            .map(|o| o.id.clone())
            .or_else(|| block.object_id.clone())
            .unwrap_or_default();
        block.fragment.set_text(node, &id);
        return;
    }
    if prop == "model" {
        let name = block
            .object
            .as_ref()
            .map(|o| o.model.clone())
            .or_else(|| block.model.as_ref().map(|m| m.name.clone()))
            .unwrap_or_default();
        block.fragment.set_text(node, &name);
        return;
    }

    let Some(desc) = block.model.as_ref().and_then(|m| m.prop(prop)).cloned() else {
        warn!(property = %prop, "unknown property; clearing node");
        block.fragment.set_text(node, "");
        return;
    };
    if !desc.read {
        warn!(property = %prop, "property is not readable; clearing node");
        block.fragment.set_text(node, "");
        return;
    }

    let editable = block.effective_editable(node) && desc.write;

    if desc.kind.is_object_ref() {
        display_ref(block, node, &desc, follow, editable);
        return;
    }

    // On-demand values (no_store, blobs) must be fetched before rendering.
    let unloaded = block
        .object
        .as_ref()
        .map(|o| !o.is_loaded(prop))
        .unwrap_or(false);
    if (desc.no_store || desc.kind == PropertyKind::Blob) && unloaded {
        if desc.kind == PropertyKind::List {
            block.fragment.add_class(node, directive::CLASS_HIDDEN);
        }
        let job = PendingJob {
            node,
            object: block.object.clone(),
            editable,
            kind: JobKind::PropLoad {
                prop: prop.to_string(),
                kind: desc.kind,
            },
        };
        if delay_gated(&block.fragment, node) {
            block.defer(job);
        } else {
            block.queue_load(job);
        }
        build_field(block, node, &desc, editable, None);
        return;
    }

    if let Some(obj) = block.object.as_ref() {
        let value = obj.get(prop).cloned().unwrap_or_default();
        match desc.kind {
            PropertyKind::List => render_list(block, node, value),
            PropertyKind::Complex => {
                // Complex rows never edit inline; the template row is
                // consumed here.
                render_complex(block, node, value);
                return;
            }
            PropertyKind::DateTime => render_date(block, node, &value.join("")),
            kind => render_scalar(block, node, kind, &value),
        }
    }
    build_field(block, node, &desc, editable, None);
}

// ─────────────────────────────────────────────────────────────
// References and queries
// ─────────────────────────────────────────────────────────────

fn display_ref(
    block: &mut Block,
    node: NodeId,
    desc: &PropertyDescriptor,
    follow: Option<&str>,
    editable: bool,
) {
    // Template selection: a follow path replaces the node's children with a
    // marker for the rest of the path; a bare reference with no nested
    // markers gets a default name link.
    if let Some(rest) = follow {
        block.fragment.clear_children(node);
        let span = block.fragment.create_element("span");
        block.fragment.set_attr(span, directive::ATTRIBUTE, rest);
        block.fragment.append(node, span);
    } else if !has_nested_markers(&block.fragment, node) {
        let link = block.fragment.create_element("a");
        block.fragment.set_attr(link, directive::ATTRIBUTE, "name");
        block.fragment.set_attr(link, directive::LINK, "view");
        block.fragment.append(node, link);
    }

    let template = block.fragment.capture_children(node);
    block.fragment.clear_children(node);

    let Some(obj) = block.object.clone() else {
        // No data context; the captured template still feeds field building
        // for action forms.
        build_field(block, node, desc, editable, Some(&template));
        return;
    };

    let filter = parse_filter(block, node);
    let no_cache =
        block.opt.no_cache || block.fragment.attr(node, directive::NO_CACHE).is_some();
    let dummy = !no_cache && dummy_eligible(block, &template, desc);

    build_field(block, node, desc, editable, Some(&template));

    let job = PendingJob {
        node,
        object: Some(obj),
        editable,
        kind: JobKind::RefLoad {
            prop: desc.name.clone(),
            template,
            item_model: desc.item_model.clone(),
            dummy,
            filter,
            no_cache,
        },
    };
    if delay_gated(&block.fragment, node) {
        block.defer(job);
    } else {
        block.queue_load(job);
    }
}

/// A reference may load as an identifier-only placeholder only when every
/// property the captured template asks of the target is one the cache policy
/// can supply. Otherwise the optimization would change output: attributes the
/// placeholder cannot answer render empty.
fn dummy_eligible(block: &Block, template: &Fragment, desc: &PropertyDescriptor) -> bool {
    let Some(target) = desc.item_model.as_deref() else {
        return false;
    };
    let policy = &block.ctx.config.cache_policy;
    let mut markers = 0;
    for n in template.descendants(template.root()) {
        if let Some(value) = template.attr(n, directive::ATTRIBUTE) {
            markers += 1;
            let (prop, _) = directive::split_follow(value);
            if !policy.is_cached(target, prop) {
                return false;
            }
        }
    }
    markers > 0
}

fn has_nested_markers(frag: &Fragment, node: NodeId) -> bool {
    frag.descendants(node).into_iter().any(|n| {
        frag.attr(n, directive::ATTRIBUTE).is_some()
            || frag.attr(n, directive::ATTRIBUTE_LIST).is_some()
            || frag.attr(n, directive::RESOLVED).is_some()
    })
}

fn parse_filter(block: &Block, node: NodeId) -> Option<Value> {
    let raw = block.fragment.attr(node, directive::FILTER)?;
    match expr::parse_literal(&expr::interpolate(raw, &block.scope())) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "ignoring malformed filter");
            None
        }
    }
}

pub(crate) fn delay_gated(frag: &Fragment, node: NodeId) -> bool {
    frag.has_class(node, directive::CLASS_DELAY_LOAD)
        || frag
            .ancestors(node)
            .into_iter()
            .any(|a| frag.has_class(a, directive::CLASS_DELAY_LOAD))
}

// ─────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────

fn render_list(block: &mut Block, node: NodeId, mut value: PropertyValue) {
    if let Some(limit) = block
        .fragment
        .attr(node, directive::LIMIT)
        .and_then(|v| v.parse::<usize>().ok())
    {
        value.entries.truncate(limit);
    }
    if value.is_empty() {
        // Empty lists stay hidden.
        block.fragment.add_class(node, directive::CLASS_HIDDEN);
        return;
    }

    let template = block
        .fragment
        .children(node)
        .iter()
        .copied()
        .find(|&c| block.fragment.is_element(c));
    match template {
        Some(template) => {
            clone_rows(block, template, &value);
            block.fragment.detach(template);
        }
        // A list item with no inner template is itself the repeated row.
        None if block.fragment.tag(node) == Some("li") => {
            clone_rows(block, node, &value);
            block.fragment.add_class(node, directive::CLASS_HIDDEN);
            return;
        }
        None => {
            let text = value.join("; ");
            block.fragment.set_text(node, &text);
        }
    }
    block.fragment.remove_class(node, directive::CLASS_HIDDEN);
}

/// Clone one row per value after the template row. Clones land right after
/// the template node, so inserting back to front keeps source order; a hidden
/// separator precedes every item but the first.
fn clone_rows(block: &mut Block, template: NodeId, value: &PropertyValue) {
    for (i, entry) in value.entries.iter().enumerate().rev() {
        let item = block.fragment.clone_subtree(template);
        block.fragment.set_text(item, &entry.as_str());
        if i == 0 {
            block.fragment.add_class(item, directive::CLASS_FIRST_VALUE);
        }
        block.fragment.insert_after(template, item);
        if i > 0 {
            let sep = block.fragment.create_element("span");
            block.fragment.add_class(sep, directive::CLASS_HIDDEN);
            block.fragment.set_text(sep, "; ");
            block.fragment.insert_after(template, sep);
        }
    }
}

fn render_complex(block: &mut Block, node: NodeId, value: PropertyValue) {
    if block.fragment.tag(node) != Some("tr") {
        let text = value.join("; ");
        block.fragment.set_text(node, &text);
        return;
    }

    for entry in &value.entries {
        let row = block.fragment.clone_subtree(node);
        // Template cells are authored with the resolved-marker spelling so
        // the main scan never picks them up.
        for cell in block.fragment.descendants(row) {
            let marker = block
                .fragment
                .attr(cell, directive::RESOLVED)
                .map(str::to_string);
            match marker.as_deref() {
                Some("key") => {
                    let key = entry.key.clone().unwrap_or_default();
                    block.fragment.set_text(cell, &key);
                }
                Some("val") => {
                    let val = entry.as_str();
                    block.fragment.set_text(cell, &val);
                }
                _ => {}
            }
        }
        block.fragment.insert_before(node, row);
    }

    let table = block
        .fragment
        .ancestors(node)
        .into_iter()
        .find(|&a| block.fragment.has_class(a, "dataTable"));
    block.fragment.detach(node);
    if let Some(table) = table {
        let widgets = block.ctx.widgets.clone();
        widgets.data_table(&mut block.fragment, table);
    }
}

fn render_date(block: &mut Block, node: NodeId, raw: &str) {
    if raw.is_empty() {
        block.fragment.set_text(node, "");
        return;
    }
    if let Some(fmt) = block
        .fragment
        .attr(node, directive::DATE_FORMAT)
        .map(str::to_string)
    {
        block.fragment.set_text(node, &util::format_date(raw, &fmt));
        return;
    }
    // Hidden sortable prefix so text-sorting tables order rows by time.
    block.fragment.clear_children(node);
    let span = block.fragment.create_element("span");
    block.fragment.add_class(span, directive::CLASS_HIDDEN);
    let sortable = util::sortable_string(&util::to_sql_date(raw));
    block.fragment.set_text(span, &sortable);
    block.fragment.append(node, span);
    let text = block.fragment.create_text(raw);
    block.fragment.append(node, text);
}

fn render_scalar(block: &mut Block, node: NodeId, kind: PropertyKind, value: &PropertyValue) {
    let text = value.join("; ");
    if kind == PropertyKind::Blob {
        let raw = block
            .fragment
            .attr(node, directive::FORMAT)
            .map(|f| f == "html")
            .unwrap_or(false);
        if raw {
            block.fragment.set_html(node, &text);
        } else {
            block.fragment.set_html(node, &util::html_format(&text));
        }
    } else {
        block.fragment.set_text(node, &text);
    }
}

/// Display a value fetched on demand. Called by the block when a property
/// load completes.
pub(crate) fn display_loaded(block: &mut Block, job: &PendingJob, value: PropertyValue) {
    let JobKind::PropLoad { prop, kind } = &job.kind else {
        return;
    };
    // Keep the block's own object in step so re-resolution sees the value.
    if let Some(obj) = block.object.as_mut() {
        let same = job.object.as_ref().map(|o| o.id == obj.id).unwrap_or(false);
        if same {
            obj.set(prop, value.clone());
        }
    }
    let node = job.node;
    match kind {
        PropertyKind::List => render_list(block, node, value),
        PropertyKind::Complex => render_complex(block, node, value),
        PropertyKind::DateTime => {
            let raw = value.join("");
            render_date(block, node, &raw);
        }
        kind => render_scalar(block, node, *kind, &value),
    }
}

// ─────────────────────────────────────────────────────────────
// Field collection
// ─────────────────────────────────────────────────────────────

fn build_field(
    block: &mut Block,
    node: NodeId,
    desc: &PropertyDescriptor,
    editable: bool,
    template: Option<&Fragment>,
) {
    if !(editable && desc.write) {
        return;
    }
    let mut field = Field::new(&desc.name, desc.kind, true);
    field.input_type = block
        .fragment
        .attr(node, directive::INPUT_TYPE)
        .map(str::to_string);
    field.def = block.opt.def.get(&desc.name).cloned();
    field.values = block
        .object
        .as_ref()
        .and_then(|o| o.get(&desc.name))
        .cloned()
        .or_else(|| block.opt.data.get(&desc.name).map(value_to_property));
    if let Some(template) = template {
        apply_template(&mut field, template);
    }
    block.ctx.events.emit(EventKind::FieldAdded {
        property: desc.name.clone(),
    });
    block.fields.push(field);
}

fn value_to_property(v: &Value) -> PropertyValue {
    match v {
        Value::Array(items) => PropertyValue {
            entries: items.iter().cloned().map(PropEntry::scalar).collect(),
        },
        other => PropertyValue::single(other.clone()),
    }
}

/// Template handling for reference fields: an `edit_template` child supplies
/// the editor markup, a `view_template` child suppresses the editor, and a
/// multi-marker layout is carried whole.
fn apply_template(field: &mut Field, template: &Fragment) {
    let mut attr_markers = 0;
    let mut has_list = false;
    for node in template.descendants(template.root()) {
        if template.has_class(node, directive::CLASS_EDIT_TEMPLATE) {
            field.template = Some(template.capture_subtree(node));
            return;
        }
        if template.has_class(node, directive::CLASS_VIEW_TEMPLATE) {
            field.suppress_editor = true;
        }
        if template.attr(node, directive::ATTRIBUTE).is_some() {
            attr_markers += 1;
        }
        if template.attr(node, directive::ATTRIBUTE_LIST).is_some() {
            has_list = true;
        }
    }
    if has_list || attr_markers > 1 {
        field.template = Some(template.clone());
    }
}
