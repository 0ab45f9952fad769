//! Engine facade.
//!
//! Owns the pieces a block needs (config, service, models, widgets, event
//! log) and exposes the high-level entry points: build a block from markup,
//! render against an object or model, and dispatch recorded node actions.

use std::sync::Arc;

use crate::block::{Block, BlockCtx, BlockOptions, NodeAction};
use crate::config::EngineConfig;
use crate::dom::Fragment;
use crate::error::WeftError;
use crate::event_log::{EventKind, EventLog};
use crate::object::{FieldMap, Object};
use crate::schema::ModelRegistry;
use crate::service::{DataService, RefOptions};
use crate::widget::{NullWidgets, WidgetHost};

pub struct Engine {
    ctx: BlockCtx,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        service: Arc<dyn DataService>,
        models: ModelRegistry,
    ) -> Self {
        Self {
            ctx: BlockCtx {
                config: Arc::new(config),
                service,
                models: Arc::new(models),
                widgets: Arc::new(NullWidgets),
                events: EventLog::new(),
            },
        }
    }

    pub fn with_widgets(mut self, widgets: Arc<dyn WidgetHost>) -> Self {
        self.ctx.widgets = widgets;
        self
    }

    pub fn events(&self) -> &EventLog {
        &self.ctx.events
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.ctx.models
    }

    /// Parse markup into an unresolved block. Attach context with the
    /// builder methods on [`Block`], then call `resolve`.
    pub fn block(&self, markup: &str) -> Result<Block, WeftError> {
        let fragment = Fragment::parse(markup)?;
        Ok(Block::new(self.ctx.clone(), fragment))
    }

    /// Fetch an object and resolve the markup against it.
    #[tracing::instrument(skip(self, markup))]
    pub async fn render(
        &self,
        markup: &str,
        model: &str,
        id: &str,
    ) -> Result<Block, WeftError> {
        let obj = self
            .ctx
            .service
            .get(model, id, &RefOptions::default())
            .await?;
        let mut block = self.block(markup)?.with_object(obj).with_options(BlockOptions {
            root: true,
            ..Default::default()
        });
        block.resolve().await?;
        Ok(block)
    }

    /// Resolve the markup with a model but no object, as used by create
    /// forms and model-level pages.
    #[tracing::instrument(skip(self, markup))]
    pub async fn render_model(&self, markup: &str, model: &str) -> Result<Block, WeftError> {
        let model = self
            .ctx
            .models
            .get(model)
            .ok_or_else(|| WeftError::UnknownModel {
                name: model.to_string(),
            })?;
        let mut block = self.block(markup)?.with_model(model).with_options(BlockOptions {
            root: true,
            ..Default::default()
        });
        block.resolve().await?;
        Ok(block)
    }

    /// Dispatch a node action recorded during resolution. Returns the object
    /// a mutation produced, if any.
    pub async fn run_action(&self, action: &NodeAction) -> Result<Option<Object>, WeftError> {
        match action {
            NodeAction::Delete { model, id, .. } => {
                self.ctx.service.delete(model, id).await?;
                Ok(None)
            }
            NodeAction::ForcedUpdate { model, id, data, .. } => {
                let obj = self.ctx.service.update(model, id, data, true).await?;
                self.ctx.events.emit(EventKind::SaveComplete {
                    model: model.clone(),
                    id: id.clone(),
                });
                self.ctx.events.emit(EventKind::RefreshRequested);
                Ok(Some(obj))
            }
            NodeAction::SaveForm { model, fields, .. } => {
                let mut payload = FieldMap::new();
                for field in fields {
                    if let Some(values) = &field.values {
                        payload.insert(field.name.clone(), values.clone());
                    } else if let Some(def) = &field.def {
                        payload.insert(
                            field.name.clone(),
                            crate::object::PropertyValue::single(def.clone()),
                        );
                    }
                }
                let obj = self.ctx.service.create(model, &payload).await?;
                self.ctx.events.emit(EventKind::SaveComplete {
                    model: model.clone(),
                    id: obj.id.clone(),
                });
                Ok(Some(obj))
            }
            NodeAction::Navigate { .. } | NodeAction::ResetForm { .. } => Ok(None),
        }
    }
}
