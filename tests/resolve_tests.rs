//! End-to-end resolution scenarios: reference descent, follow paths, cached
//! references, deferred loads, on-demand properties, and termination.

use std::sync::Arc;

use weft::{
    Engine, EngineConfig, EventKind, MemoryService, Model, ModelRegistry, Object, PropEntry,
    PropertyDescriptor, PropertyKind, PropertyValue, StaticCacheSet, WeftError,
};

fn models() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry.insert(
        Model::new("Widget")
            .with_prop("name", PropertyDescriptor::new(PropertyKind::Text))
            .with_prop(
                "owner",
                PropertyDescriptor::new(PropertyKind::Reference).item_model("User"),
            )
            .with_prop(
                "parts",
                PropertyDescriptor::new(PropertyKind::Query).item_model("Part"),
            )
            .with_prop(
                "body",
                PropertyDescriptor::new(PropertyKind::Blob).no_store(),
            ),
    );
    registry.insert(
        Model::new("User")
            .with_prop("name", PropertyDescriptor::new(PropertyKind::Text))
            .with_prop("role", PropertyDescriptor::new(PropertyKind::Text)),
    );
    registry.insert(
        Model::new("Part").with_prop("name", PropertyDescriptor::new(PropertyKind::Text)),
    );
    registry
}

fn service() -> Arc<MemoryService> {
    let svc = Arc::new(MemoryService::new());
    svc.insert(
        Object::new("User", "u-1")
            .with("name", PropertyValue::single("Mitch"))
            .with("role", PropertyValue::single("admin")),
    );
    svc.insert(Object::new("Part", "p-1").with("name", PropertyValue::single("gear")));
    svc.insert(Object::new("Part", "p-2").with("name", PropertyValue::single("spring")));
    svc.insert(
        Object::new("Widget", "w-1")
            .with("name", PropertyValue::single("First widget"))
            .with(
                "owner",
                PropertyValue {
                    entries: vec![PropEntry::reference("User", "u-1")],
                },
            )
            .with(
                "parts",
                PropertyValue {
                    entries: vec![
                        PropEntry::reference("Part", "p-1"),
                        PropEntry::reference("Part", "p-2"),
                    ],
                },
            ),
    );
    svc
}

fn engine() -> Engine {
    Engine::new(EngineConfig::new(), service(), models())
}

#[tokio::test]
async fn reference_descends_with_nested_template() {
    let block = engine()
        .render(
            r#"<div><span attribute="name"/><span attribute="owner"><b attribute="name"/> (<i attribute="role"/>)</span></div>"#,
            "Widget",
            "w-1",
        )
        .await
        .unwrap();
    let out = block.to_xml();
    assert!(out.contains("First widget"));
    assert!(out.contains(r#"<b _attribute="name">Mitch</b>"#));
    assert!(out.contains(r#"<i _attribute="role">admin</i>"#));
}

#[tokio::test]
async fn follow_path_renders_target_property() {
    let block = engine()
        .render(r#"<span attribute="owner.name"/>"#, "Widget", "w-1")
        .await
        .unwrap();
    let out = block.to_xml();
    assert!(out.contains(">Mitch<"));
}

#[tokio::test]
async fn bare_reference_gets_default_view_link() {
    let block = engine()
        .render(r#"<span attribute="owner"/>"#, "Widget", "w-1")
        .await
        .unwrap();
    let out = block.to_xml();
    assert!(out.contains(r##"href="#user?id=u-1""##));
    assert!(out.contains(">Mitch</a>"));
}

#[tokio::test]
async fn query_renders_every_target() {
    let block = engine()
        .render(
            r#"<ol attribute="parts"><li attribute="name"/></ol>"#,
            "Widget",
            "w-1",
        )
        .await
        .unwrap();
    let out = block.to_xml();
    assert!(out.contains(">gear<"));
    assert!(out.contains(">spring<"));
    let gear = out.find("gear").unwrap();
    let spring = out.find("spring").unwrap();
    assert!(gear < spring, "targets out of order: {out}");
}

#[tokio::test]
async fn reference_filter_excludes_non_matching_targets() {
    let block = engine()
        .render(
            r#"<span attribute="owner" filter="{name: 'Somebody else'}"><b attribute="name"/></span>"#,
            "Widget",
            "w-1",
        )
        .await
        .unwrap();
    assert!(!block.to_xml().contains("Mitch"));
}

#[tokio::test]
async fn cached_reference_renders_from_placeholder() {
    // Every property the template asks of the target is cache-approved, so
    // an identifier-only placeholder suffices.
    let config = EngineConfig::new().with_cache_policy(StaticCacheSet::new([("User", "id")]));
    let engine = Engine::new(config, service(), models());
    let block = engine
        .render(r#"<span attribute="owner"><b attribute="id"/></span>"#, "Widget", "w-1")
        .await
        .unwrap();

    assert!(block.to_xml().contains(">u-1<"));
    assert!(!engine
        .events()
        .filter(|k| matches!(k, EventKind::LoadIssued { dummy: true, .. }))
        .is_empty());
}

#[tokio::test]
async fn uncached_template_property_forces_full_fetch() {
    // The template wants the target's name, which the cache cannot supply;
    // the reference must load the full object rather than a placeholder.
    let config = EngineConfig::new().with_cache_policy(StaticCacheSet::new([("User", "id")]));
    let engine = Engine::new(config, service(), models());
    let block = engine
        .render(
            r#"<span attribute="owner"><b attribute="name"/></span>"#,
            "Widget",
            "w-1",
        )
        .await
        .unwrap();

    assert!(block.to_xml().contains("Mitch"));
    assert!(engine
        .events()
        .filter(|k| matches!(k, EventKind::LoadIssued { dummy: true, .. }))
        .is_empty());
}

#[tokio::test]
async fn delay_load_defers_until_ready() {
    let svc = service();
    let engine = Engine::new(EngineConfig::new(), svc.clone(), models());
    let mut block = engine
        .render(
            r#"<span attribute="owner" class="delay_load"><b attribute="name"/></span>"#,
            "Widget",
            "w-1",
        )
        .await
        .unwrap();

    assert!(!block.to_xml().contains("Mitch"));
    assert!(!engine
        .events()
        .filter(|k| matches!(k, EventKind::DeferredQueued { .. }))
        .is_empty());

    block.ready().await.unwrap();
    assert!(block.to_xml().contains("Mitch"));
}

#[tokio::test]
async fn no_store_property_loads_on_demand() {
    let svc = service();
    svc.insert(
        Object::new("Widget", "w-2").with("body", PropertyValue::single("line one\nline two")),
    );
    let engine = Engine::new(EngineConfig::new(), svc, models());

    // The block's object does not carry the blob; resolution must fetch it.
    let mut block = engine
        .block(r#"<div attribute="body"/>"#)
        .unwrap()
        .with_object(Object::new("Widget", "w-2"));
    block.resolve().await.unwrap();

    let out = block.to_xml();
    assert!(out.contains("line one<br/>line two"));
    assert!(!engine
        .events()
        .filter(|k| matches!(k, EventKind::LoadCompleted { .. }))
        .is_empty());
}

#[tokio::test]
async fn missing_reference_target_renders_absent() {
    let svc = Arc::new(MemoryService::new());
    svc.insert(Object::new("Widget", "w-3").with(
        "owner",
        PropertyValue {
            entries: vec![PropEntry::reference("User", "ghost")],
        },
    ));
    let engine = Engine::new(EngineConfig::new(), svc, models());
    let block = engine
        .render(r#"<span attribute="owner"><b attribute="name"/></span>"#, "Widget", "w-3")
        .await
        .unwrap();
    assert_eq!(block.to_xml(), r#"<span _attribute="owner"/>"#);
}

#[tokio::test]
async fn output_carries_no_unresolved_markers() {
    let block = engine()
        .render(
            r#"<div><span attribute="name"/><span attribute="owner"><b attribute="name"/></span><a link="view">x</a><p condition="whatever">y</p></div>"#,
            "Widget",
            "w-1",
        )
        .await
        .unwrap();
    let out = block.to_xml();
    assert!(!out.contains(" attribute=\""));
    assert!(!out.contains(" link=\""));
    assert!(!out.contains(" condition=\""));
}

#[tokio::test]
async fn marker_injecting_trigger_hits_the_pass_bound() {
    let config = EngineConfig::new().with_trigger("spam", |_, frag, node| {
        let extra = frag.create_element("i");
        frag.set_attr(extra, "condition", "x");
        frag.append(node, extra);
    });
    let engine = Engine::new(config, service(), models());
    let mut block = engine.block(r#"<div trigger="spam"/>"#).unwrap();
    let err = block.resolve().await.unwrap_err();
    assert!(matches!(err, WeftError::NonTermination { .. }));
}

#[tokio::test]
async fn resolved_block_resolves_idempotently() {
    let engine = engine();
    let mut block = engine
        .render(r#"<div><span attribute="name"/></div>"#, "Widget", "w-1")
        .await
        .unwrap();
    let first = block.to_xml();
    block.resolve().await.unwrap();
    assert_eq!(block.to_xml(), first);
}
