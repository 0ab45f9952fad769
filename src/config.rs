//! Engine configuration: named hooks, URL templates, viewer groups, and the
//! cached-reference policy.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dom::{Fragment, NodeId};
use crate::object::Object;

/// Named predicate for `condition`/`pre_condition` markers. Returning `false`
/// removes the node from the document.
pub type ConditionFn = Arc<dyn Fn(Option<&Object>, &mut Fragment, NodeId) -> bool + Send + Sync>;

/// Named hook for `trigger` markers. May rewrite the node; the marker is kept
/// so state can be re-examined on later passes.
pub type TriggerFn = Arc<dyn Fn(Option<&Object>, &mut Fragment, NodeId) + Send + Sync>;

/// Rewrites an external href before it is bound, given the raw value and the
/// current object.
pub type HrefFormatter = Arc<dyn Fn(&str, &Object) -> String + Send + Sync>;

/// Decides which properties of a model the page cache can supply. A
/// reference renders from an identifier-only placeholder instead of a
/// service fetch only when every property its template asks of the
/// referenced model is cached.
pub trait CachePolicy: Send + Sync {
    fn is_cached(&self, model: &str, prop: &str) -> bool;
}

/// Default policy: nothing is cached, every reference fetches.
pub struct DenyAllCache;

impl CachePolicy for DenyAllCache {
    fn is_cached(&self, _model: &str, _prop: &str) -> bool {
        false
    }
}

/// Policy backed by a static allow-list of `model.prop` pairs.
pub struct StaticCacheSet {
    entries: Vec<(String, String)>,
}

impl StaticCacheSet {
    pub fn new<I, A, B>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(m, p)| (m.into(), p.into()))
                .collect(),
        }
    }
}

impl CachePolicy for StaticCacheSet {
    fn is_cached(&self, model: &str, prop: &str) -> bool {
        self.entries
            .iter()
            .any(|(m, p)| m == model && p == prop)
    }
}

/// Everything the engine needs besides the service and model registry.
#[derive(Clone)]
pub struct EngineConfig {
    /// Base for building object URLs.
    pub base_url: String,
    /// Template for view links when a node has no `href`, interpolated
    /// against the target model.
    pub model_template: String,
    /// Editor page path per model name; create links prefer it over the
    /// generic model template.
    pub editor_templates: HashMap<String, String>,
    pub conditions: HashMap<String, ConditionFn>,
    pub triggers: HashMap<String, TriggerFn>,
    /// Groups the current viewer belongs to, for `auth` markers.
    pub viewer_groups: Vec<String>,
    /// Href builder for email-looking link targets.
    pub email_href: HrefFormatter,
    /// Href builder for URL-looking link targets.
    pub external_href: HrefFormatter,
    pub cache_policy: Arc<dyn CachePolicy>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model_template: "#{href}".to_string(),
            editor_templates: HashMap::new(),
            conditions: HashMap::new(),
            triggers: HashMap::new(),
            viewer_groups: Vec::new(),
            email_href: Arc::new(|raw, _| format!("mailto:{raw}")),
            external_href: Arc::new(|raw, _| raw.to_string()),
            cache_policy: Arc::new(DenyAllCache),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_condition<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Option<&Object>, &mut Fragment, NodeId) -> bool + Send + Sync + 'static,
    {
        self.conditions.insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn with_trigger<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Option<&Object>, &mut Fragment, NodeId) + Send + Sync + 'static,
    {
        self.triggers.insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn with_viewer_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.viewer_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_editor_template(mut self, model: &str, markup: &str) -> Self {
        self.editor_templates
            .insert(model.to_string(), markup.to_string());
        self
    }

    pub fn with_cache_policy(mut self, policy: impl CachePolicy + 'static) -> Self {
        self.cache_policy = Arc::new(policy);
        self
    }

    pub fn with_model_template(mut self, template: &str) -> Self {
        self.model_template = template.to_string();
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cache_denies() {
        let cfg = EngineConfig::default();
        assert!(!cfg.cache_policy.is_cached("Widget", "owner"));
    }

    #[test]
    fn static_cache_set() {
        let policy = StaticCacheSet::new([("Widget", "owner")]);
        assert!(policy.is_cached("Widget", "owner"));
        assert!(!policy.is_cached("Widget", "parts"));
    }

    #[test]
    fn builder_registers_hooks() {
        let cfg = EngineConfig::new()
            .with_condition("logged_in", |_, _, _| true)
            .with_trigger("noop", |_, _, _| {})
            .with_viewer_groups(["admin"]);
        assert!(cfg.conditions.contains_key("logged_in"));
        assert!(cfg.triggers.contains_key("noop"));
        assert_eq!(cfg.viewer_groups, ["admin"]);
    }
}
