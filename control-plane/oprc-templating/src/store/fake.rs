//! In-memory [`Store`] for unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::error::ErrorResponse;
use serde_json::Value as JsonValue;

use super::{Store, StoreError};
use crate::resource::ObjectKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Create,
    Patch,
    Delete,
    PatchStatus,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<String, DynamicObject>,
    next_version: u64,
    failures: HashMap<(Op, String), String>,
    calls: Vec<(Op, String)>,
    status_patches: Vec<(String, JsonValue)>,
}

#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

pub fn api_error(code: u16, message: &str) -> StoreError {
    StoreError::Api(kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message: message.into(),
        reason: "InternalError".into(),
        code,
    }))
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects(objs: impl IntoIterator<Item = DynamicObject>) -> Self {
        let store = Self::new();
        for obj in objs {
            store.insert(obj);
        }
        store
    }

    /// Store `obj` as-is, stamping a resource version.
    pub fn insert(&self, mut obj: DynamicObject) {
        let key = ObjectKey::of(&obj).expect("test object must have a key");
        let mut st = self.state.lock().unwrap();
        st.next_version += 1;
        obj.metadata.resource_version = Some(st.next_version.to_string());
        st.objects.insert(key.to_string(), obj);
    }

    pub fn object(&self, key: &ObjectKey) -> Option<DynamicObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&key.to_string())
            .cloned()
    }

    /// Make `op` against the object named `name` fail with an API error.
    pub fn fail(&self, op: Op, name: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((op, name.to_string()), message.to_string());
    }

    pub fn calls(&self, op: Op) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn status_patches(&self) -> Vec<(String, JsonValue)> {
        self.state.lock().unwrap().status_patches.clone()
    }

    fn enter(&self, op: Op, name: &str) -> Result<(), StoreError> {
        let mut st = self.state.lock().unwrap();
        st.calls.push((op, name.to_string()));
        match st.failures.get(&(op, name.to_string())) {
            Some(msg) => Err(api_error(500, msg)),
            None => Ok(()),
        }
    }

    fn merge(
        &self,
        key: &ObjectKey,
        patch: &JsonValue,
    ) -> Result<DynamicObject, StoreError> {
        let mut st = self.state.lock().unwrap();
        let id = key.to_string();
        let current = st.objects.get(&id).ok_or(StoreError::NotFound)?;
        let current_rv = current.metadata.resource_version.clone();

        let wanted_rv = patch
            .get("metadata")
            .and_then(|m| m.get("resourceVersion"))
            .and_then(JsonValue::as_str);
        if let Some(rv) = wanted_rv {
            if Some(rv) != current_rv.as_deref() {
                return Err(StoreError::Conflict(format!(
                    "{id}: resourceVersion {rv} is stale"
                )));
            }
        }

        let before = serde_json::to_value(current)?;
        let mut after = before.clone();
        json_patch::merge(&mut after, patch);
        let mut updated: DynamicObject = serde_json::from_value(after)?;
        updated.metadata.resource_version = current_rv;
        if serde_json::to_value(&updated)? != before {
            st.next_version += 1;
            updated.metadata.resource_version = Some(st.next_version.to_string());
        }
        st.objects.insert(id, updated.clone());
        Ok(updated)
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject, StoreError> {
        self.enter(Op::Get, &key.name)?;
        self.object(key).ok_or(StoreError::NotFound)
    }

    async fn create(
        &self,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::of(obj)?;
        self.enter(Op::Create, &key.name)?;
        if self.object(&key).is_some() {
            return Err(StoreError::Conflict(format!("{key} already exists")));
        }
        self.insert(obj.clone());
        self.object(&key).ok_or(StoreError::NotFound)
    }

    async fn patch(
        &self,
        key: &ObjectKey,
        patch: &JsonValue,
    ) -> Result<DynamicObject, StoreError> {
        self.enter(Op::Patch, &key.name)?;
        self.merge(key, patch)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.enter(Op::Delete, &key.name)?;
        let removed = self
            .state
            .lock()
            .unwrap()
            .objects
            .remove(&key.to_string());
        removed.map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        patch: &JsonValue,
    ) -> Result<(), StoreError> {
        self.enter(Op::PatchStatus, &key.name)?;
        self.state
            .lock()
            .unwrap()
            .status_patches
            .push((key.name.clone(), patch.clone()));
        self.merge(key, patch).map(|_| ())
    }
}
