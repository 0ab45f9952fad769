//! Block resolution.
//!
//! A `Block` pairs one fragment with its data context and drives directive
//! handlers over it until nothing changes. Handlers run in a fixed order each
//! pass; data fetches they request are queued, executed concurrently between
//! passes, and applied in request order. Resolution is a bounded fixed point:
//! markers only ever disappear (triggers excepted), so the pass limit is a
//! guard against misbehaving hooks, not a tuning knob.

use std::collections::HashMap;
use std::mem;

use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::EngineConfig;
use crate::directive;
use crate::dom::{Fragment, NodeId};
use crate::error::WeftError;
use crate::event_log::{EventKind, EventLog};
use crate::fields::Field;
use crate::handlers;
use crate::object::{FieldMap, Object, PropertyValue};
use crate::schema::{Model, ModelRegistry, PropertyKind};
use crate::service::{DataService, RefOptions, ServiceError};
use crate::widget::WidgetHost;

/// Hard ceiling on handler passes over one block.
pub const MAX_RESOLUTION_PASSES: usize = 64;

/// Shared engine state every block carries.
#[derive(Clone)]
pub(crate) struct BlockCtx {
    pub config: Arc<EngineConfig>,
    pub service: Arc<dyn DataService>,
    pub models: Arc<ModelRegistry>,
    pub widgets: Arc<dyn WidgetHost>,
    pub events: EventLog,
}

/// Per-block rendering options, inherited by nested blocks.
#[derive(Debug, Clone, Default)]
pub struct BlockOptions {
    /// Editability override; `None` falls back to markup and then to false.
    pub editable: Option<bool>,
    pub no_cache: bool,
    /// This block is the page root (create actions redirect, nested ones
    /// splice in place).
    pub root: bool,
    /// Seed values for editable fields, keyed by property name.
    pub data: HashMap<String, Value>,
    /// Default values for fields with no current value.
    pub def: HashMap<String, Value>,
}

/// An interaction discovered during resolution. The engine does not own a UI
/// event loop; it records what each bound control would do and the embedder
/// dispatches through [`crate::engine::Engine::run_action`].
#[derive(Debug, Clone)]
pub enum NodeAction {
    Delete {
        node: NodeId,
        model: String,
        id: String,
    },
    ForcedUpdate {
        node: NodeId,
        model: String,
        id: String,
        data: FieldMap,
    },
    Navigate {
        node: NodeId,
        href: String,
    },
    SaveForm {
        node: NodeId,
        model: String,
        fields: Vec<Field>,
        redirect: Option<String>,
    },
    ResetForm {
        node: NodeId,
    },
}

impl NodeAction {
    fn node_mut(&mut self) -> &mut NodeId {
        match self {
            NodeAction::Delete { node, .. }
            | NodeAction::ForcedUpdate { node, .. }
            | NodeAction::Navigate { node, .. }
            | NodeAction::SaveForm { node, .. }
            | NodeAction::ResetForm { node } => node,
        }
    }
}

/// A queued data fetch.
#[derive(Debug, Clone)]
pub(crate) enum JobKind {
    /// Resolve a reference/query property and render each target through the
    /// captured template.
    RefLoad {
        prop: String,
        template: Fragment,
        item_model: Option<String>,
        dummy: bool,
        filter: Option<Value>,
        no_cache: bool,
    },
    /// Fetch one on-demand property value and display it in place.
    PropLoad { prop: String, kind: PropertyKind },
    /// Follow a relation and hand the targets to the widget host.
    Follow {
        prop: String,
        target_model: String,
        filter: Option<Value>,
    },
}

impl JobKind {
    fn prop(&self) -> &str {
        match self {
            JobKind::RefLoad { prop, .. }
            | JobKind::PropLoad { prop, .. }
            | JobKind::Follow { prop, .. } => prop,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PendingJob {
    pub node: NodeId,
    /// Object the fetch runs against (a clone; the block's own object is not
    /// mutated by loads).
    pub object: Option<Object>,
    pub editable: bool,
    pub kind: JobKind,
}

enum JobResult {
    Objects(Vec<Object>),
    Value(PropertyValue),
}

/// One fragment being resolved against one data context.
pub struct Block {
    pub(crate) ctx: BlockCtx,
    pub(crate) fragment: Fragment,
    pub(crate) object: Option<Object>,
    pub(crate) object_id: Option<String>,
    pub(crate) model: Option<Arc<Model>>,
    pub(crate) opt: BlockOptions,
    pub(crate) fields: Vec<Field>,
    pub(crate) actions: Vec<NodeAction>,
    deferred: Vec<PendingJob>,
    pending: Vec<PendingJob>,
    waiting: usize,
    done: bool,
    /// Context identifier from the top element's `context` attribute, matched
    /// against `use_context` on pre-conditions.
    pub(crate) context: Option<String>,
    passes: usize,
    loads: usize,
}

impl Block {
    pub(crate) fn new(ctx: BlockCtx, fragment: Fragment) -> Self {
        Self {
            ctx,
            fragment,
            object: None,
            object_id: None,
            model: None,
            opt: BlockOptions::default(),
            fields: Vec::new(),
            actions: Vec::new(),
            deferred: Vec::new(),
            pending: Vec::new(),
            waiting: 0,
            done: false,
            context: None,
            passes: 0,
            loads: 0,
        }
    }

    pub fn with_object(mut self, obj: Object) -> Self {
        if self.model.is_none() {
            self.model = self.ctx.models.get(&obj.model);
        }
        self.object_id = Some(obj.id.clone());
        self.object = Some(obj);
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_model(mut self, model: Arc<Model>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_options(mut self, opt: BlockOptions) -> Self {
        self.opt = opt;
        self
    }

    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    pub fn into_fragment(self) -> Fragment {
        self.fragment
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn actions(&self) -> &[NodeAction] {
        &self.actions
    }

    /// Serialized resolved markup.
    pub fn to_xml(&self) -> String {
        self.fragment.to_xml()
    }

    // ─────────────────────────────────────────────────────────────
    // Resolution loop
    // ─────────────────────────────────────────────────────────────

    /// Resolve every directive in the fragment. Boxed so nested blocks can
    /// recurse through reference properties.
    pub fn resolve(&mut self) -> BoxFuture<'_, Result<(), WeftError>> {
        Box::pin(self.resolve_inner())
    }

    async fn resolve_inner(&mut self) -> Result<(), WeftError> {
        self.ctx.events.emit(EventKind::BlockStarted {
            model: self.model.as_ref().map(|m| m.name.clone()),
            object_id: self.object_id.clone(),
        });
        self.read_context();

        loop {
            self.passes += 1;
            if self.passes > MAX_RESOLUTION_PASSES {
                return Err(WeftError::NonTermination {
                    passes: MAX_RESOLUTION_PASSES,
                });
            }

            let changed = self.run_pass().await;
            let loaded = !self.pending.is_empty();
            self.drain().await;

            if changed == 0 && !loaded {
                break;
            }
        }

        self.complete();
        Ok(())
    }

    async fn run_pass(&mut self) -> usize {
        let mut changed = 0;
        // Triggers keep their markers and never count as progress, otherwise
        // the fixed point would not exist. They run first so that anything
        // they inject is consumed within the same pass.
        handlers::trigger::fire(self);
        changed += handlers::condition::resolve_pre_conditions(self);
        changed += handlers::condition::resolve_conditions(self);
        changed += handlers::auth::resolve(self);
        changed += handlers::containers::resolve(self);
        changed += handlers::relation::resolve(self);
        changed += handlers::action::resolve(self).await;
        changed += handlers::attribute::resolve(self);
        changed += handlers::link::resolve(self);
        debug!(pass = self.passes, changed, pending = self.pending.len(), "pass done");
        changed
    }

    fn read_context(&mut self) {
        let top: Vec<NodeId> = self
            .fragment
            .children(self.fragment.root())
            .iter()
            .copied()
            .filter(|&n| self.fragment.is_element(n))
            .collect();
        if let [only] = top[..] {
            self.context = self
                .fragment
                .attr(only, directive::CONTEXT)
                .map(str::to_string);
        }
    }

    fn complete(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        debug_assert_eq!(self.waiting, 0, "completion with loads outstanding");
        self.ctx.events.emit(EventKind::BlockCompleted {
            passes: self.passes,
            loads: self.loads,
        });
    }

    /// Replay loads that were parked behind a `delay_load` class. Call once
    /// the surrounding page signals readiness. Completion is not re-fired.
    pub fn ready(&mut self) -> BoxFuture<'_, Result<(), WeftError>> {
        Box::pin(async move {
            while !self.deferred.is_empty() {
                let deferred = mem::take(&mut self.deferred);
                for job in deferred {
                    self.queue_load(job);
                }
                self.drain().await;
            }
            Ok(())
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Load queue
    // ─────────────────────────────────────────────────────────────

    pub(crate) fn queue_load(&mut self, job: PendingJob) {
        self.waiting += 1;
        self.ctx.events.emit(EventKind::LoadIssued {
            model: job
                .object
                .as_ref()
                .map(|o| o.model.clone())
                .unwrap_or_default(),
            property: job.kind.prop().to_string(),
            dummy: matches!(job.kind, JobKind::RefLoad { dummy: true, .. }),
        });
        self.pending.push(job);
    }

    pub(crate) fn defer(&mut self, job: PendingJob) {
        self.ctx.events.emit(EventKind::DeferredQueued {
            property: job.kind.prop().to_string(),
        });
        self.deferred.push(job);
    }

    /// Execute queued loads concurrently and apply the results in request
    /// order.
    async fn drain(&mut self) {
        while !self.pending.is_empty() {
            let jobs = mem::take(&mut self.pending);
            let service = self.ctx.service.clone();
            let futures = jobs.into_iter().map(|job| {
                let service = service.clone();
                async move {
                    let result = run_job(service.as_ref(), &job).await;
                    (job, result)
                }
            });
            let results = join_all(futures).await;
            for (job, result) in results {
                self.apply(job, result).await;
            }
        }
    }

    async fn apply(&mut self, job: PendingJob, result: Result<JobResult, ServiceError>) {
        self.waiting -= 1;
        self.loads += 1;

        // Loads are never cancelled; the carrier node may have been removed
        // by a condition since the request was queued.
        if !self.fragment.is_attached(job.node) {
            return;
        }

        // A missing target renders as absent rather than failing the block.
        let result = match result {
            Err(ServiceError::NotFound(_)) => Ok(match &job.kind {
                JobKind::PropLoad { .. } => JobResult::Value(PropertyValue::default()),
                _ => JobResult::Objects(Vec::new()),
            }),
            other => other,
        };

        match result {
            Err(e) => {
                error!(property = job.kind.prop(), error = %e, "load failed");
                self.ctx.events.emit(EventKind::LoadFailed {
                    property: job.kind.prop().to_string(),
                    error: e.to_string(),
                });
            }
            Ok(JobResult::Value(value)) => {
                self.ctx.events.emit(EventKind::LoadCompleted {
                    property: job.kind.prop().to_string(),
                });
                handlers::attribute::display_loaded(self, &job, value);
            }
            Ok(JobResult::Objects(objs)) => {
                self.ctx.events.emit(EventKind::LoadCompleted {
                    property: job.kind.prop().to_string(),
                });
                match &job.kind {
                    JobKind::Follow { target_model, .. } => {
                        let widgets = self.ctx.widgets.clone();
                        widgets.relation_results(
                            &mut self.fragment,
                            job.node,
                            target_model,
                            &objs,
                        );
                    }
                    _ => self.apply_ref_objects(&job, objs).await,
                }
            }
        }
    }

    /// Render each referenced object through the job's captured template as a
    /// nested block, then splice the result under the carrier node.
    async fn apply_ref_objects(&mut self, job: &PendingJob, objs: Vec<Object>) {
        let JobKind::RefLoad {
            template,
            item_model,
            no_cache,
            ..
        } = &job.kind
        else {
            return;
        };

        for obj in objs {
            let model = self
                .ctx
                .models
                .get(&obj.model)
                .or_else(|| item_model.as_deref().and_then(|m| self.ctx.models.get(m)));
            if model.is_none() {
                warn!(model = %obj.model, "referenced object has no registered model");
            }

            let mut child = Block::new(self.ctx.clone(), template.clone());
            child.object_id = Some(obj.id.clone());
            child.object = Some(obj);
            child.model = model;
            child.opt = BlockOptions {
                editable: Some(job.editable),
                no_cache: *no_cache || self.opt.no_cache,
                root: false,
                data: self.opt.data.clone(),
                def: self.opt.def.clone(),
            };

            if let Err(e) = child.resolve().await {
                error!(error = %e, "nested block failed");
                continue;
            }

            let map = self.fragment.splice(job.node, &child.fragment);
            self.absorb_child(child, &map);
        }
    }

    /// Move a resolved child's bookkeeping into this block, remapping node
    /// ids through the splice map.
    pub(crate) fn absorb_child(&mut self, child: Block, map: &HashMap<NodeId, NodeId>) {
        for mut action in child.actions {
            match map.get(action.node_mut()) {
                Some(&new) => {
                    *action.node_mut() = new;
                    self.actions.push(action);
                }
                None => warn!("dropping action bound to a detached nested node"),
            }
        }
        for mut job in child.deferred {
            match map.get(&job.node) {
                Some(&new) => {
                    job.node = new;
                    self.deferred.push(job);
                }
                None => warn!("dropping deferred load for a detached nested node"),
            }
        }
        self.fields.extend(child.fields);
        self.loads += child.loads;
    }

    // ─────────────────────────────────────────────────────────────
    // Handler support
    // ─────────────────────────────────────────────────────────────

    pub(crate) fn scope(&self) -> crate::expr::Scope<'_> {
        if let Some(obj) = &self.object {
            crate::expr::Scope::Object(obj)
        } else if let Some(model) = &self.model {
            crate::expr::Scope::Model(model)
        } else {
            crate::expr::Scope::None
        }
    }

    /// Editability of a node: its own `editable` attribute wins, then the
    /// nearest ancestor carrying one, then the block option.
    pub(crate) fn effective_editable(&self, node: NodeId) -> bool {
        if let Some(v) = self.fragment.attr(node, directive::EDITABLE) {
            return v != "false";
        }
        for anc in self.fragment.ancestors(node) {
            if let Some(v) = self.fragment.attr(anc, directive::EDITABLE) {
                return v != "false";
            }
        }
        self.opt.editable.unwrap_or(false)
    }
}

async fn run_job(service: &dyn DataService, job: &PendingJob) -> Result<JobResult, ServiceError> {
    match &job.kind {
        JobKind::RefLoad {
            prop,
            dummy,
            filter,
            no_cache,
            ..
        } => {
            let opt = RefOptions {
                filter: filter.clone(),
                dummy: *dummy,
                no_cache: *no_cache,
            };
            match &job.object {
                Some(obj) => service.load_refs(obj, prop, &opt).await.map(JobResult::Objects),
                None => Ok(JobResult::Objects(Vec::new())),
            }
        }
        JobKind::PropLoad { prop, .. } => match &job.object {
            Some(obj) => service
                .load(&obj.model, &obj.id, prop)
                .await
                .map(JobResult::Value),
            None => Ok(JobResult::Value(PropertyValue::default())),
        },
        JobKind::Follow { prop, filter, .. } => {
            // Relation tables must show current data; never a cached ref.
            let opt = RefOptions {
                filter: filter.clone(),
                dummy: false,
                no_cache: true,
            };
            match &job.object {
                Some(obj) => service.follow(obj, prop, &opt).await.map(JobResult::Objects),
                None => Ok(JobResult::Objects(Vec::new())),
            }
        }
    }
}
