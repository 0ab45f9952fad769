//! `action` markers.
//!
//! An action node hosts an inline create form: its children become an
//! editable nested block resolved against the named model (no object), seeded
//! with any embedded data. The resolved form splices back in, followed by
//! create and reset buttons whose behavior is recorded as node actions.

use tracing::warn;

use crate::block::{Block, BlockOptions, NodeAction};
use crate::directive::{self, Filter};
use crate::event_log::EventKind;
use crate::expr;

pub(crate) async fn resolve(block: &mut Block) -> usize {
    let hits = directive::find(&block.fragment, block.fragment.root(), directive::ACTION, Filter::All);
    let mut changed = 0;

    for (node, value) in hits {
        if !block.fragment.is_attached(node) {
            continue;
        }
        block.fragment.remove_attr(node, directive::ACTION);
        changed += 1;

        let (model_name, data) = directive::split_embedded(&value);
        let Some(model) = block.ctx.models.get(model_name) else {
            warn!(model = %model_name, "action names an unknown model; removing node");
            block.fragment.detach(node);
            continue;
        };

        // Block data answers placeholders first; whatever it leaves
        // unresolved falls through to the object or model.
        let seed = data
            .and_then(|raw| {
                let primed = expr::interpolate(raw, &expr::Scope::Values(&block.opt.data));
                expr::parse_embedded_data(&primed, &block.scope())
            })
            .unwrap_or_default();

        let template = block.fragment.capture_children(node);
        block.fragment.clear_children(node);

        let mut child = Block::new(block.ctx.clone(), template).with_model(model.clone());
        child.opt = BlockOptions {
            editable: Some(true),
            no_cache: block.opt.no_cache,
            root: block.opt.root,
            data: seed.clone().into_iter().collect(),
            def: seed.into_iter().collect(),
        };

        if let Err(e) = child.resolve().await {
            warn!(error = %e, "action form failed to resolve");
            continue;
        }
        block.ctx.events.emit(EventKind::EditTriggered);

        let map = block.fragment.splice(node, &child.fragment);
        let fields = std::mem::take(&mut child.fields);
        block.absorb_child(child, &map);

        // Form controls after the spliced editor.
        let brk = block.fragment.create_element("br");
        block.fragment.add_class(brk, "clear");
        block.fragment.append(node, brk);

        let save = block.fragment.create_element("button");
        let label = format!("Create {}", model.name);
        block.fragment.set_text(save, &label);
        block.fragment.append(node, save);
        block.actions.push(NodeAction::SaveForm {
            node: save,
            model: model.name.clone(),
            fields,
            redirect: block.opt.root.then(|| {
                expr::interpolate(
                    &block.ctx.config.model_template,
                    &expr::Scope::Model(&model),
                )
            }),
        });

        let reset = block.fragment.create_element("button");
        block.fragment.set_text(reset, "Reset");
        block.fragment.append(node, reset);
        block.actions.push(NodeAction::ResetForm { node: reset });

        block.ctx.events.emit(EventKind::MarkerResolved {
            directive: directive::ACTION.to_string(),
            value,
        });
    }
    changed
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::block::NodeAction;
    use crate::config::EngineConfig;
    use crate::engine::Engine;
    use crate::schema::{Model, ModelRegistry, PropertyDescriptor, PropertyKind};
    use crate::service::MemoryService;

    fn engine() -> Engine {
        let mut models = ModelRegistry::new();
        models.insert(
            Model::new("Comment")
                .with_prop("body", PropertyDescriptor::new(PropertyKind::Text).writable())
                .with_prop(
                    "author",
                    PropertyDescriptor::new(PropertyKind::Text).writable(),
                ),
        );
        Engine::new(
            EngineConfig::new(),
            Arc::new(MemoryService::new()),
            models,
        )
    }

    #[tokio::test]
    async fn action_builds_form_and_buttons() {
        let mut block = engine()
            .block(r#"<div action="Comment(author: 'u-1')"><span attribute="body"/></div>"#)
            .unwrap();
        block.resolve().await.unwrap();

        let out = block.to_xml();
        assert!(out.contains("<button>Create Comment</button>"));
        assert!(out.contains("<button>Reset</button>"));
        assert!(out.contains(r#"<br class="clear"/>"#));
        assert!(!out.contains(" action="));

        let save = block
            .actions()
            .iter()
            .find_map(|a| match a {
                NodeAction::SaveForm { model, fields, .. } => Some((model.clone(), fields.clone())),
                _ => None,
            })
            .expect("save action recorded");
        assert_eq!(save.0, "Comment");
        // body comes from the form markup; author is seeded by embedded data.
        assert!(save.1.iter().any(|f| f.name == "body"));
        let author = save.1.iter().find(|f| f.name == "author");
        assert!(author.is_none() || author.unwrap().values.is_some());
    }

    #[tokio::test]
    async fn block_data_outranks_object_in_seed_defaults() {
        use std::collections::HashMap;

        use crate::block::BlockOptions;
        use crate::object::{Object, PropertyValue};

        let mut data = HashMap::new();
        data.insert("author".to_string(), serde_json::json!("u-9"));

        let mut block = engine()
            .block(
                r#"<div action="Comment(author: '{author}')"><span attribute="body"/><span attribute="author"/></div>"#,
            )
            .unwrap()
            .with_object(
                Object::new("Comment", "c-1")
                    .with("author", PropertyValue::single("from-object")),
            )
            .with_options(BlockOptions {
                data,
                ..Default::default()
            });
        block.resolve().await.unwrap();

        let fields = block
            .actions()
            .iter()
            .find_map(|a| match a {
                NodeAction::SaveForm { fields, .. } => Some(fields.clone()),
                _ => None,
            })
            .expect("save action recorded");
        let author = fields.iter().find(|f| f.name == "author").unwrap();
        assert_eq!(author.values.as_ref().unwrap().join(""), "u-9");
    }

    #[tokio::test]
    async fn unknown_action_model_removes_node() {
        let mut block = engine()
            .block(r#"<div><p action="Bogus"><span attribute="body"/></p></div>"#)
            .unwrap();
        block.resolve().await.unwrap();
        assert_eq!(block.to_xml(), "<div/>");
    }
}
