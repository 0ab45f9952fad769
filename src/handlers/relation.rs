//! `relation` markers.
//!
//! A relation mounts a result table for the objects reached through one of
//! the current object's reference/query properties, without rendering them
//! inline. The property to follow comes from the node's `attribute`
//! attribute; it is demoted to the resolved marker so the attribute handler
//! leaves it alone. The column layout belongs to the widget host, and the
//! follow always bypasses the reference cache.

use tracing::warn;

use crate::block::{Block, JobKind, PendingJob};
use crate::directive::{self, Filter};
use crate::event_log::EventKind;
use crate::expr;
use crate::handlers::attribute::delay_gated;

pub(crate) fn resolve(block: &mut Block) -> usize {
    let hits = directive::find(
        &block.fragment,
        block.fragment.root(),
        directive::RELATION,
        Filter::All,
    );
    let widgets = block.ctx.widgets.clone();
    let mut changed = 0;

    for (node, value) in hits {
        if !block.fragment.is_attached(node) {
            continue;
        }
        block.fragment.remove_attr(node, directive::RELATION);
        changed += 1;

        // The property to follow rides on the attribute attr; demote it so
        // the attribute handler leaves the node alone.
        let Some(prop) = block.fragment.remove_attr(node, directive::ATTRIBUTE) else {
            warn!(relation = %value, "relation node carries no attribute to follow");
            continue;
        };
        let prop = prop.trim().to_string();
        block.fragment.set_attr(node, directive::RESOLVED, &prop);

        let Some(obj) = block.object.clone() else {
            warn!(relation = %value, "relation outside an object block");
            continue;
        };
        let Some(model) = block.model.clone() else {
            warn!(relation = %prop, "relation without a model");
            continue;
        };
        let Some(desc) = model.readable_prop(&prop) else {
            warn!(model = %model.name, property = %prop, "unknown relation property");
            continue;
        };
        let target_model = desc
            .item_model
            .clone()
            .unwrap_or_else(|| obj.model.clone());

        let filter = block
            .fragment
            .attr(node, directive::FILTER)
            .map(str::to_string)
            .and_then(|raw| match expr::parse_literal(&expr::interpolate(&raw, &block.scope())) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!(error = %e, "ignoring malformed relation filter");
                    None
                }
            });

        // Mount the result table immediately; rows arrive when the follow
        // completes.
        widgets.search_results(&mut block.fragment, node, block.model.clone().as_ref(), true);

        block.ctx.events.emit(EventKind::MarkerResolved {
            directive: directive::RELATION.to_string(),
            value: value.clone(),
        });

        let editable = block.effective_editable(node);
        let job = PendingJob {
            node,
            object: Some(obj),
            editable,
            kind: JobKind::Follow {
                prop,
                target_model,
                filter,
            },
        };
        if delay_gated(&block.fragment, node) {
            block.defer(job);
        } else {
            block.queue_load(job);
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::config::EngineConfig;
    use crate::dom::{Fragment, NodeId};
    use crate::engine::Engine;
    use crate::object::{Object, PropEntry, PropertyValue};
    use crate::schema::{Model, ModelRegistry, PropertyDescriptor, PropertyKind};
    use crate::service::MemoryService;
    use crate::widget::WidgetHost;

    #[derive(Default)]
    struct RelationRecorder {
        results: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl WidgetHost for RelationRecorder {
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
        fn relation_results(
            &self,
            _frag: &mut Fragment,
            _node: NodeId,
            model: &str,
            objs: &[Object],
        ) {
            self.results
                .lock()
                .unwrap()
                .push((model.to_string(), objs.iter().map(|o| o.id.clone()).collect()));
        }
        fn data_table(&self, _frag: &mut Fragment, _table: NodeId) {}
    }

    fn models() -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry.insert(Model::new("Widget").with_prop(
            "parts",
            PropertyDescriptor::new(PropertyKind::Query).item_model("Part"),
        ));
        registry.insert(Model::new("Part").with_prop(
            "name",
            PropertyDescriptor::new(PropertyKind::Text),
        ));
        registry
    }

    fn service() -> Arc<MemoryService> {
        let svc = Arc::new(MemoryService::new());
        svc.insert(Object::new("Part", "p-1").with("name", PropertyValue::single("gear")));
        svc.insert(Object::new("Part", "p-2").with("name", PropertyValue::single("spring")));
        svc.insert(Object::new("Widget", "w-1").with(
            "parts",
            PropertyValue {
                entries: vec![
                    PropEntry::reference("Part", "p-1"),
                    PropEntry::reference("Part", "p-2"),
                ],
            },
        ));
        svc
    }

    #[tokio::test]
    async fn relation_follows_and_feeds_widget() {
        let svc = service();
        let widgets = Arc::new(RelationRecorder::default());
        let engine =
            Engine::new(EngineConfig::new(), svc.clone(), models()).with_widgets(widgets.clone());

        let block = engine
            .render(r#"<table relation="objects" attribute="parts"/>"#, "Widget", "w-1")
            .await
            .unwrap();

        let results = widgets.results.lock().unwrap().clone();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "Part");
        assert_eq!(results[0].1, vec!["p-1", "p-2"]);

        // The followed property rides on the attribute attr, demoted so the
        // attribute handler skips it; the fetch always bypasses the cache.
        assert!(block.to_xml().contains(r#"_attribute="parts""#));
        assert!(!block.to_xml().contains(r#" attribute="parts""#));
        assert!(svc.calls().iter().any(|c| matches!(
            c,
            crate::service::memory::ServiceCall::Follow { prop, no_cache: true, .. }
                if prop == "parts"
        )));
    }

    #[tokio::test]
    async fn delayed_relation_waits_for_ready() {
        let widgets = Arc::new(RelationRecorder::default());
        let engine =
            Engine::new(EngineConfig::new(), service(), models()).with_widgets(widgets.clone());

        let mut block = engine
            .render(
                r#"<table relation="objects" attribute="parts" class="delay_load"/>"#,
                "Widget",
                "w-1",
            )
            .await
            .unwrap();
        assert!(widgets.results.lock().unwrap().is_empty());

        block.ready().await.unwrap();
        let results = widgets.results.lock().unwrap().clone();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, vec!["p-1", "p-2"]);
    }
}
