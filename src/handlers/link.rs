//! `link` markers.
//!
//! Binds hrefs and interactions onto anchor-like nodes: raw fragment hrefs,
//! view pages, delete and edit actions, create forms, and property-valued
//! targets (emails and external URLs by heuristic). The engine owns no event
//! loop, so anything click-shaped is recorded as a [`NodeAction`] for the
//! embedder to dispatch.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::block::{Block, NodeAction};
use crate::directive::{self, Filter};
use crate::dom::NodeId;
use crate::event_log::EventKind;
use crate::expr::{self, Scope};
use crate::object::{FieldMap, PropertyValue};
use crate::util;

/// Targets that look like they leave the application.
static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(://|www\.|\.com)").unwrap());

pub(crate) fn resolve(block: &mut Block) -> usize {
    if block.object.is_none() && block.object_id.is_none() && block.model.is_none() {
        return 0;
    }
    let hits = directive::find(&block.fragment, block.fragment.root(), directive::LINK, Filter::All);
    let mut changed = 0;
    for (node, value) in hits {
        if !block.fragment.is_attached(node) {
            continue;
        }
        block.fragment.remove_attr(node, directive::LINK);
        changed += 1;
        bind_one(block, node, &value);
    }
    changed
}

fn bind_one(block: &mut Block, node: NodeId, value: &str) {
    // A `#` or `!` prefix means the value already is the href; it only wants
    // interpolation (the `!` is dropped).
    if value.starts_with('#') || value.starts_with('!') {
        let raw = value.strip_prefix('!').unwrap_or(value);
        let href = expr::interpolate(raw, &block.scope());
        finish(block, node, "raw", href);
        return;
    }

    let (kind, data) = directive::split_embedded(value);

    match kind {
        "" | "view" => bind_view(block, node),
        "edit" | "update" => bind_update(block, node, data),
        "delete" => bind_delete(block, node),
        "clone" => bind_clone(block, node),
        "create" => bind_create(block, node, data),
        "attr" => match data {
            Some(prop) => bind_property(block, node, prop.trim()),
            None => warn!("attr link without a property name"),
        },
        // Anything unrecognized still lands on the object's view page.
        other => match view_href(block, node) {
            Some(href) => finish(block, node, "view", href),
            None => warn!(kind = %other, "link without an object identity"),
        },
    }
}

fn object_identity(block: &Block) -> Option<(String, String)> {
    let id = block
        .object
        .as_ref()
        .map(|o| o.id.clone())
        .or_else(|| block.object_id.clone())?;
    let model = block
        .object
        .as_ref()
        .map(|o| o.model.clone())
        .or_else(|| block.model.as_ref().map(|m| m.name.clone()))?;
    Some((model, id))
}

/// Canonical href for the object's view page: the node's authored `href` (or
/// the configured model template) interpolated against the model, with the
/// object id appended.
fn view_href(block: &Block, node: NodeId) -> Option<String> {
    let (_, id) = object_identity(block)?;
    let base = match block.fragment.attr(node, directive::HREF) {
        Some(raw) => {
            let path = match block.model.as_ref() {
                Some(model) => expr::interpolate(raw, &Scope::Model(model)),
                None => raw.to_string(),
            };
            if path.starts_with('#') {
                path
            } else {
                format!("#{path}")
            }
        }
        None => match block.model.as_ref() {
            Some(model) => {
                expr::interpolate(&block.ctx.config.model_template, &Scope::Model(model))
            }
            None => String::new(),
        },
    };
    Some(format!("{base}?id={}", util::url_escape(&id)))
}

fn bind_view(block: &mut Block, node: NodeId) {
    match view_href(block, node) {
        Some(href) => finish(block, node, "view", href),
        None => warn!("view link without an object identity"),
    }
}

fn bind_update(block: &mut Block, node: NodeId, data: Option<&str>) {
    // A plain edit link just navigates to the edit view. Only embedded data
    // makes it a forced update.
    let Some(raw) = data else {
        match view_href(block, node) {
            Some(href) => finish(block, node, "edit", format!("{href}&action=edit")),
            None => warn!("edit link without an object identity"),
        }
        return;
    };
    let Some((model, id)) = object_identity(block) else {
        warn!("update link without an object identity");
        return;
    };
    let mut fields = FieldMap::new();
    if let Some(map) = expr::parse_embedded_data(raw, &block.scope()) {
        for (key, val) in map {
            fields.insert(key, PropertyValue::single(val));
        }
    }
    block.actions.push(NodeAction::ForcedUpdate {
        node,
        model,
        id,
        data: fields,
    });
    finish(block, node, "update", "#".to_string());
}

fn bind_delete(block: &mut Block, node: NodeId) {
    let Some((model, id)) = object_identity(block) else {
        warn!("delete link without an object identity");
        return;
    };
    let href = format!(
        "#?action=delete&model={}&id={}",
        util::url_escape(&model),
        util::url_escape(&id)
    );
    block.actions.push(NodeAction::Delete {
        node,
        model,
        id,
    });
    finish(block, node, "delete", href);
}

fn bind_clone(block: &mut Block, node: NodeId) {
    match view_href(block, node) {
        Some(href) => finish(block, node, "clone", format!("{href}&action=clone")),
        None => warn!("clone link without an object identity"),
    }
}

fn bind_create(block: &mut Block, node: NodeId, data: Option<&str>) {
    // A `model` attr overrides the block's model; a registered editor page
    // for that model overrides the generic view template.
    let model = block
        .fragment
        .attr(node, directive::MODEL)
        .and_then(|m| block.ctx.models.get(m))
        .or_else(|| block.model.clone());
    let Some(model) = model else {
        warn!("create link without a model");
        return;
    };
    let mut href = match block.ctx.config.editor_templates.get(&model.name) {
        Some(page) => format!("#{page}?action=edit"),
        None => format!(
            "{}?action=edit",
            expr::interpolate(&block.ctx.config.model_template, &Scope::Model(&model))
        ),
    };
    if let Some(raw) = data {
        let seeded = expr::interpolate(raw, &block.scope());
        href.push_str("&data=");
        href.push_str(&util::url_escape(&seeded));
    }
    finish(block, node, "create", href);
}

/// `link="attr(email)"`-style: the target comes from one of the object's own
/// properties. Email- and URL-looking values link out directly; everything
/// else lands on the canonical attribute page under the base URL.
fn bind_property(block: &mut Block, node: NodeId, prop: &str) {
    let Some(obj) = block.object.clone() else {
        warn!(property = %prop, "property link without an object");
        return;
    };
    let known = block.model.as_ref().and_then(|m| m.prop(prop)).is_some();
    let value = obj.get(prop).and_then(|v| v.first()).map(|e| e.as_str());

    let href = match value {
        Some(raw) if known && raw.contains('@') => (block.ctx.config.email_href)(&raw, &obj),
        Some(raw) if known && URL_RE.is_match(&raw) => {
            let full = if raw.contains("://") {
                raw
            } else {
                format!("http://{raw}")
            };
            (block.ctx.config.external_href)(&full, &obj)
        }
        _ => {
            let model_href = block
                .model
                .as_ref()
                .map(|m| m.href.clone())
                .unwrap_or_default();
            util::url_join([
                block.ctx.config.base_url.as_str(),
                model_href.as_str(),
                obj.id.as_str(),
                prop,
            ])
        }
    };
    finish(block, node, "attr", href);
}

fn finish(block: &mut Block, node: NodeId, kind: &str, href: String) {
    block.fragment.set_attr(node, directive::HREF, &href);
    // Buttons navigate on click instead of carrying a live href.
    if block.fragment.tag(node) == Some("button") {
        block.actions.push(NodeAction::Navigate {
            node,
            href: href.clone(),
        });
    }
    block.ctx.events.emit(EventKind::LinkBound {
        kind: kind.to_string(),
        href,
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::EngineConfig;
    use crate::engine::Engine;
    use crate::object::{Object, PropertyValue};
    use crate::schema::{Model, ModelRegistry, PropertyDescriptor, PropertyKind};
    use crate::service::MemoryService;

    fn models() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry.insert(
            Model::new("User")
                .with_prop("name", PropertyDescriptor::new(PropertyKind::Text))
                .with_prop("email", PropertyDescriptor::new(PropertyKind::Text))
                .with_prop("site", PropertyDescriptor::new(PropertyKind::Text)),
        );
        registry.insert(
            Model::new("Comment")
                .with_prop("body", PropertyDescriptor::new(PropertyKind::Text).writable()),
        );
        registry
    }

    fn engine_with(config: EngineConfig) -> Engine {
        let svc = Arc::new(MemoryService::new());
        svc.insert(
            Object::new("User", "u-1")
                .with("name", PropertyValue::single("Mitch"))
                .with("email", PropertyValue::single("mitch@example.org"))
                .with("site", PropertyValue::single("www.example.org")),
        );
        Engine::new(config, svc, models())
    }

    fn engine() -> Engine {
        engine_with(EngineConfig::new())
    }

    #[tokio::test]
    async fn view_link_builds_object_href() {
        let block = engine()
            .render(r#"<a attribute="name" link="view"/>"#, "User", "u-1")
            .await
            .unwrap();
        let out = block.to_xml();
        assert!(out.contains(r##"href="#user?id=u-1""##));
        assert!(out.contains(">Mitch</a>"));
    }

    #[tokio::test]
    async fn raw_prefix_interpolates_into_href() {
        let block = engine()
            .render(
                r##"<div><a link="#users/{id}">x</a><a link="!mailto:{email}">y</a></div>"##,
                "User",
                "u-1",
            )
            .await
            .unwrap();
        let out = block.to_xml();
        assert!(out.contains(r##"href="#users/u-1""##));
        assert!(out.contains(r#"href="mailto:mitch@example.org""#));
    }

    #[tokio::test]
    async fn delete_link_records_action() {
        let block = engine()
            .render(r#"<a link="delete">remove</a>"#, "User", "u-1")
            .await
            .unwrap();
        assert!(block
            .to_xml()
            .contains(r##"href="#?action=delete&amp;model=User&amp;id=u-1""##));
        assert!(matches!(
            block.actions()[0],
            crate::block::NodeAction::Delete { ref model, ref id, .. }
                if model == "User" && id == "u-1"
        ));
    }

    #[tokio::test]
    async fn plain_edit_link_navigates_without_update() {
        let block = engine()
            .render(r#"<a link="edit">change</a>"#, "User", "u-1")
            .await
            .unwrap();
        assert!(block
            .to_xml()
            .contains(r##"href="#user?id=u-1&amp;action=edit""##));
        assert!(block.actions().is_empty());
    }

    #[tokio::test]
    async fn clone_link_keeps_source_id() {
        let block = engine()
            .render(r#"<a link="clone">copy</a>"#, "User", "u-1")
            .await
            .unwrap();
        assert!(block
            .to_xml()
            .contains(r##"href="#user?id=u-1&amp;action=clone""##));
    }

    #[tokio::test]
    async fn create_link_honors_model_override_and_editor_page() {
        let config = EngineConfig::new().with_editor_template("Comment", "comment_editor");
        let block = engine_with(config)
            .render(r#"<a link="create" model="Comment">new</a>"#, "User", "u-1")
            .await
            .unwrap();
        assert!(block
            .to_xml()
            .contains(r##"href="#comment_editor?action=edit""##));
    }

    #[tokio::test]
    async fn email_and_url_heuristics() {
        let block = engine()
            .render(
                r#"<div><a link="attr(email)">mail</a><a link="attr(site)">www</a></div>"#,
                "User",
                "u-1",
            )
            .await
            .unwrap();
        let out = block.to_xml();
        assert!(out.contains(r#"href="mailto:mitch@example.org""#));
        // URL-ish values without a protocol get one.
        assert!(out.contains(r#"href="http://www.example.org""#));
    }

    #[tokio::test]
    async fn attr_link_builds_canonical_property_url() {
        let config = EngineConfig::new().with_base_url("http://api.example.org");
        let block = engine_with(config)
            .render(r#"<a link="attr(notes)">notes</a>"#, "User", "u-1")
            .await
            .unwrap();
        assert!(block
            .to_xml()
            .contains(r#"href="http://api.example.org/user/u-1/notes""#));
    }

    #[tokio::test]
    async fn unrecognized_link_falls_back_to_view() {
        let block = engine()
            .render(r#"<a link="bogus">x</a>"#, "User", "u-1")
            .await
            .unwrap();
        assert!(block.to_xml().contains(r##"href="#user?id=u-1""##));
    }

    #[tokio::test]
    async fn button_link_records_navigation() {
        let block = engine()
            .render(r#"<button link="view">open</button>"#, "User", "u-1")
            .await
            .unwrap();
        assert!(matches!(
            block.actions()[0],
            crate::block::NodeAction::Navigate { ref href, .. } if href.contains("u-1")
        ));
    }

    #[tokio::test]
    async fn update_link_parses_embedded_data() {
        let block = engine()
            .render(
                r#"<a link="update(status: 'archived')">archive</a>"#,
                "User",
                "u-1",
            )
            .await
            .unwrap();
        match &block.actions()[0] {
            crate::block::NodeAction::ForcedUpdate { model, id, data, .. } => {
                assert_eq!(model, "User");
                assert_eq!(id, "u-1");
                assert_eq!(data["status"].join(""), "archived");
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }
}
