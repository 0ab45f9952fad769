//! In-memory data service.
//!
//! Stores objects in a concurrent map and records every call it receives so
//! tests can assert on the exact traffic the engine generated.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::object::{FieldMap, Object, PropertyValue};

use super::{DataService, RefOptions, ServiceError};

/// One recorded service call, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Get { model: String, id: String },
    Load { model: String, id: String, prop: String },
    LoadRefs { model: String, id: String, prop: String },
    Follow { model: String, id: String, prop: String, no_cache: bool },
    Update { model: String, id: String, force: bool },
    Create { model: String },
    Delete { model: String, id: String },
}

#[derive(Default)]
pub struct MemoryService {
    store: DashMap<(String, String), Object>,
    calls: RwLock<Vec<ServiceCall>>,
    next_id: AtomicU64,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, obj: Object) {
        self.store
            .insert((obj.model.clone(), obj.id.clone()), obj);
    }

    /// All calls recorded so far, in order.
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().len()
    }

    fn record(&self, call: ServiceCall) {
        self.calls.write().push(call);
    }

    fn lookup(&self, model: &str, id: &str) -> Result<Object, ServiceError> {
        self.store
            .get(&(model.to_string(), id.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("{model}/{id}")))
    }

    /// Best-effort equality filter: every key in the filter object must match
    /// the first entry of the corresponding property.
    fn matches_filter(obj: &Object, filter: &Option<Value>) -> bool {
        let Some(Value::Object(map)) = filter else {
            return true;
        };
        map.iter().all(|(key, want)| {
            obj.get(key)
                .and_then(|v| v.first())
                .map(|entry| match want {
                    Value::String(s) => entry.as_str() == *s,
                    other => entry.val == *other,
                })
                .unwrap_or(false)
        })
    }

    fn resolve_refs(
        &self,
        obj: &Object,
        prop: &str,
        opt: &RefOptions,
    ) -> Result<Vec<Object>, ServiceError> {
        let Some(value) = obj.get(prop) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for entry in &value.entries {
            let Some((model, id)) = entry.as_ref_target() else {
                continue;
            };
            if opt.dummy {
                out.push(Object::dummy(model, id));
                continue;
            }
            match self.lookup(model, id) {
                Ok(target) => {
                    if Self::matches_filter(&target, &opt.filter) {
                        out.push(target);
                    }
                }
                Err(ServiceError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl DataService for MemoryService {
    async fn get(&self, model: &str, id: &str, opt: &RefOptions) -> Result<Object, ServiceError> {
        self.record(ServiceCall::Get {
            model: model.to_string(),
            id: id.to_string(),
        });
        if opt.dummy {
            return Ok(Object::dummy(model, id));
        }
        self.lookup(model, id)
    }

    async fn load(
        &self,
        model: &str,
        id: &str,
        prop: &str,
    ) -> Result<PropertyValue, ServiceError> {
        self.record(ServiceCall::Load {
            model: model.to_string(),
            id: id.to_string(),
            prop: prop.to_string(),
        });
        let obj = self.lookup(model, id)?;
        obj.get(prop)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(format!("{model}/{id}.{prop}")))
    }

    async fn load_refs(
        &self,
        obj: &Object,
        prop: &str,
        opt: &RefOptions,
    ) -> Result<Vec<Object>, ServiceError> {
        self.record(ServiceCall::LoadRefs {
            model: obj.model.clone(),
            id: obj.id.clone(),
            prop: prop.to_string(),
        });
        self.resolve_refs(obj, prop, opt)
    }

    async fn follow(
        &self,
        obj: &Object,
        prop: &str,
        opt: &RefOptions,
    ) -> Result<Vec<Object>, ServiceError> {
        self.record(ServiceCall::Follow {
            model: obj.model.clone(),
            id: obj.id.clone(),
            prop: prop.to_string(),
            no_cache: opt.no_cache,
        });
        self.resolve_refs(obj, prop, opt)
    }

    async fn update(
        &self,
        model: &str,
        id: &str,
        fields: &FieldMap,
        force: bool,
    ) -> Result<Object, ServiceError> {
        self.record(ServiceCall::Update {
            model: model.to_string(),
            id: id.to_string(),
            force,
        });
        let mut obj = self.lookup(model, id)?;
        for (prop, value) in fields {
            obj.set(prop, value.clone());
        }
        self.insert(obj.clone());
        Ok(obj)
    }

    async fn create(&self, model: &str, fields: &FieldMap) -> Result<Object, ServiceError> {
        self.record(ServiceCall::Create {
            model: model.to_string(),
        });
        let id = format!("{}-{}", model.to_ascii_lowercase(), self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut obj = Object::new(model, id);
        for (prop, value) in fields {
            obj.set(prop, value.clone());
        }
        self.insert(obj.clone());
        Ok(obj)
    }

    async fn delete(&self, model: &str, id: &str) -> Result<(), ServiceError> {
        self.record(ServiceCall::Delete {
            model: model.to_string(),
            id: id.to_string(),
        });
        self.store
            .remove(&(model.to_string(), id.to_string()))
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("{model}/{id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::PropEntry;

    fn seed() -> MemoryService {
        let svc = MemoryService::new();
        svc.insert(
            Object::new("User", "u-1").with("name", PropertyValue::single("Mitch")),
        );
        svc.insert(
            Object::new("Widget", "w-1")
                .with("name", PropertyValue::single("First widget"))
                .with(
                    "owner",
                    PropertyValue {
                        entries: vec![PropEntry::reference("User", "u-1")],
                    },
                ),
        );
        svc
    }

    #[tokio::test]
    async fn get_and_record() {
        let svc = seed();
        let obj = svc.get("Widget", "w-1", &RefOptions::default()).await.unwrap();
        assert_eq!(obj.get("name").unwrap().join(""), "First widget");
        assert_eq!(
            svc.calls(),
            vec![ServiceCall::Get {
                model: "Widget".into(),
                id: "w-1".into()
            }]
        );
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let svc = seed();
        let err = svc.get("Widget", "nope", &RefOptions::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn dummy_get_skips_store() {
        let svc = MemoryService::new();
        let opt = RefOptions {
            dummy: true,
            ..Default::default()
        };
        let obj = svc.get("Widget", "w-9", &opt).await.unwrap();
        assert!(obj.data.is_empty());
    }

    #[tokio::test]
    async fn load_refs_follows_envelopes() {
        let svc = seed();
        let widget = svc.get("Widget", "w-1", &RefOptions::default()).await.unwrap();
        let owners = svc
            .load_refs(&widget, "owner", &RefOptions::default())
            .await
            .unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].get("name").unwrap().join(""), "Mitch");
    }

    #[tokio::test]
    async fn load_refs_applies_filter() {
        let svc = seed();
        let widget = svc.get("Widget", "w-1", &RefOptions::default()).await.unwrap();
        let opt = RefOptions {
            filter: Some(serde_json::json!({ "name": "Somebody else" })),
            ..Default::default()
        };
        let owners = svc.load_refs(&widget, "owner", &opt).await.unwrap();
        assert!(owners.is_empty());
    }

    #[tokio::test]
    async fn create_assigns_ids() {
        let svc = MemoryService::new();
        let mut fields = FieldMap::new();
        fields.insert("name".into(), PropertyValue::single("fresh"));
        let a = svc.create("Widget", &fields).await.unwrap();
        let b = svc.create("Widget", &fields).await.unwrap();
        assert_ne!(a.id, b.id);
        assert!(svc.get("Widget", &a.id, &RefOptions::default()).await.is_ok());
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let svc = seed();
        let mut fields = FieldMap::new();
        fields.insert("name".into(), PropertyValue::single("Renamed"));
        let obj = svc.update("Widget", "w-1", &fields, true).await.unwrap();
        assert_eq!(obj.get("name").unwrap().join(""), "Renamed");
        assert!(obj.get("owner").is_some());
    }

    #[tokio::test]
    async fn delete_removes() {
        let svc = seed();
        svc.delete("Widget", "w-1").await.unwrap();
        assert!(svc.get("Widget", "w-1", &RefOptions::default()).await.is_err());
    }
}
