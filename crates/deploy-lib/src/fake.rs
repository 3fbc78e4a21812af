//! In-memory cluster for tests
//!
//! Stores objects as JSON keyed by kind, namespace and name, bumps
//! `metadata.resourceVersion` on every write and rejects replaces that
//! carry a stale version. Every call is recorded so tests can assert on
//! call counts and ordering.

use crate::cluster::{
    async_trait, ClusterApi, KubeObject, ResourceStore, RolloutEvents, RolloutFeed,
};
use crate::error::ApiFailure;
use crate::models::{RolloutEvent, RolloutStatus};
use futures::stream::{self, StreamExt};
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A recorded call against the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get { kind: String, name: String },
    Create { kind: String, name: String },
    Replace { kind: String, name: String },
    Subscribe { name: String },
    Snapshot { name: String },
}

/// What the rollout stream does after its scripted events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptEnd {
    /// Stay open without delivering anything
    Hang,
    /// End the stream
    Close,
}

/// Scripted behaviour of the deployment status feed
#[derive(Debug, Clone)]
pub struct RolloutScript {
    snapshot: Result<RolloutStatus, ApiFailure>,
    subscribe_error: Option<ApiFailure>,
    events: Vec<(Duration, RolloutEvent)>,
    end: ScriptEnd,
}

impl RolloutScript {
    pub fn snapshot(unavailable_replicas: u32) -> Self {
        Self {
            snapshot: Ok(RolloutStatus::new(unavailable_replicas)),
            subscribe_error: None,
            events: Vec::new(),
            end: ScriptEnd::Hang,
        }
    }

    /// Events delivered in order, each after its delay
    pub fn with_events(mut self, events: Vec<(Duration, RolloutEvent)>) -> Self {
        self.events = events;
        self
    }

    pub fn ending(mut self, end: ScriptEnd) -> Self {
        self.end = end;
        self
    }

    pub fn failing_subscribe(mut self, failure: ApiFailure) -> Self {
        self.subscribe_error = Some(failure);
        self
    }

    pub fn failing_snapshot(mut self, failure: ApiFailure) -> Self {
        self.snapshot = Err(failure);
        self
    }
}

#[derive(Default)]
struct State {
    objects: BTreeMap<(String, String, String), Value>,
    calls: Vec<Call>,
    get_failures: HashMap<String, ApiFailure>,
    create_failures: HashMap<String, ApiFailure>,
    replace_failures: HashMap<String, ApiFailure>,
    rollout: Option<RolloutScript>,
    version: u64,
}

/// Shared handle to the in-memory cluster
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
    consumed: Arc<AtomicUsize>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake cluster state poisoned")
    }

    /// Store an object as if it already existed
    pub fn seed<K: KubeObject>(&self, namespace: &str, object: &K) {
        let mut value = serde_json::to_value(object).expect("serialize seed object");
        let name = object_name(&value);
        let mut state = self.lock();
        state.version += 1;
        value["metadata"]["resourceVersion"] = json!(state.version.to_string());
        value["metadata"]["namespace"] = json!(namespace);
        let kind = K::kind(&()).to_string();
        state
            .objects
            .insert((kind, namespace.to_string(), name), value);
    }

    /// Read back a stored typed object
    pub fn object<K: KubeObject>(&self, namespace: &str, name: &str) -> Option<K> {
        self.stored(&K::kind(&()), namespace, name)
    }

    /// Read back a stored dynamic object
    pub fn dynamic_object(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Option<DynamicObject> {
        self.stored(&dynamic_kind(resource), namespace, name)
    }

    fn stored<T: DeserializeOwned>(&self, kind: &str, namespace: &str, name: &str) -> Option<T> {
        let key = (kind.to_string(), namespace.to_string(), name.to_string());
        self.lock()
            .objects
            .get(&key)
            .map(|v| serde_json::from_value(v.clone()).expect("deserialize stored object"))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn fail_get(&self, kind: &str, failure: ApiFailure) {
        self.lock().get_failures.insert(kind.to_string(), failure);
    }

    pub fn fail_create(&self, kind: &str, failure: ApiFailure) {
        self.lock().create_failures.insert(kind.to_string(), failure);
    }

    pub fn fail_replace(&self, kind: &str, failure: ApiFailure) {
        self.lock().replace_failures.insert(kind.to_string(), failure);
    }

    pub fn script_rollout(&self, script: RolloutScript) {
        self.lock().rollout = Some(script);
    }

    /// Rollout notifications pulled from the stream so far
    pub fn events_consumed(&self) -> usize {
        self.consumed.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }
}

fn object_name(value: &Value) -> String {
    value["metadata"]["name"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

/// Key under which dynamic objects are stored
pub fn dynamic_kind(resource: &ApiResource) -> String {
    format!("{}.{}", resource.kind, resource.api_version)
}

/// Store view for one kind in one namespace
struct FakeStore<K> {
    cluster: FakeCluster,
    kind: String,
    namespace: String,
    _marker: PhantomData<fn() -> K>,
}

impl<K> FakeStore<K> {
    fn key(&self, name: &str) -> (String, String, String) {
        (self.kind.clone(), self.namespace.clone(), name.to_string())
    }

    fn not_found(&self, name: &str) -> ApiFailure {
        ApiFailure::status(404, format!("{} \"{}\" not found", self.kind, name))
    }
}

#[async_trait]
impl<K> ResourceStore<K> for FakeStore<K>
where
    K: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<K, ApiFailure> {
        self.cluster.record(Call::Get {
            kind: self.kind.clone(),
            name: name.to_string(),
        });
        let state = self.cluster.lock();
        if let Some(failure) = state.get_failures.get(&self.kind) {
            return Err(failure.clone());
        }
        match state.objects.get(&self.key(name)) {
            Some(value) => Ok(serde_json::from_value(value.clone())
                .map_err(|e| ApiFailure::transport(e.to_string()))?),
            None => Err(self.not_found(name)),
        }
    }

    async fn create(&self, object: &K) -> Result<K, ApiFailure> {
        let mut value =
            serde_json::to_value(object).map_err(|e| ApiFailure::transport(e.to_string()))?;
        let name = object_name(&value);
        self.cluster.record(Call::Create {
            kind: self.kind.clone(),
            name: name.clone(),
        });

        let mut state = self.cluster.lock();
        if let Some(failure) = state.create_failures.get(&self.kind) {
            return Err(failure.clone());
        }
        if state.objects.contains_key(&self.key(&name)) {
            return Err(ApiFailure::status(
                409,
                format!("{} \"{}\" already exists", self.kind, name),
            ));
        }

        state.version += 1;
        value["metadata"]["resourceVersion"] = json!(state.version.to_string());
        state.objects.insert(self.key(&name), value.clone());
        serde_json::from_value(value).map_err(|e| ApiFailure::transport(e.to_string()))
    }

    async fn replace(&self, name: &str, object: &K) -> Result<K, ApiFailure> {
        self.cluster.record(Call::Replace {
            kind: self.kind.clone(),
            name: name.to_string(),
        });
        let mut value =
            serde_json::to_value(object).map_err(|e| ApiFailure::transport(e.to_string()))?;

        let mut state = self.cluster.lock();
        if let Some(failure) = state.replace_failures.get(&self.kind) {
            return Err(failure.clone());
        }
        let current = match state.objects.get(&self.key(name)) {
            Some(current) => current["metadata"]["resourceVersion"].clone(),
            None => return Err(self.not_found(name)),
        };

        let requested = &value["metadata"]["resourceVersion"];
        if !requested.is_null() && *requested != current {
            return Err(ApiFailure::status(
                409,
                format!(
                    "Operation cannot be fulfilled on {} \"{}\": the object has been modified",
                    self.kind, name
                ),
            ));
        }

        state.version += 1;
        value["metadata"]["resourceVersion"] = json!(state.version.to_string());
        state.objects.insert(self.key(name), value.clone());
        serde_json::from_value(value).map_err(|e| ApiFailure::transport(e.to_string()))
    }
}

struct FakeRolloutFeed {
    cluster: FakeCluster,
}

#[async_trait]
impl RolloutFeed for FakeRolloutFeed {
    async fn subscribe(&self, name: &str) -> Result<RolloutEvents, ApiFailure> {
        self.cluster.record(Call::Subscribe {
            name: name.to_string(),
        });
        let script = self
            .cluster
            .lock()
            .rollout
            .clone()
            .unwrap_or_else(|| RolloutScript::snapshot(0));
        if let Some(failure) = script.subscribe_error {
            return Err(failure);
        }

        let consumed = self.cluster.consumed.clone();
        let scripted = stream::iter(script.events)
            .then(|(delay, event)| async move {
                tokio::time::sleep(delay).await;
                Ok::<_, ApiFailure>(event)
            })
            .inspect(move |_| {
                consumed.fetch_add(1, Ordering::SeqCst);
            });

        let tail: RolloutEvents = match script.end {
            ScriptEnd::Hang => stream::pending().boxed(),
            ScriptEnd::Close => stream::empty().boxed(),
        };

        Ok(scripted.chain(tail).boxed())
    }

    async fn snapshot(&self, name: &str) -> Result<RolloutStatus, ApiFailure> {
        self.cluster.record(Call::Snapshot {
            name: name.to_string(),
        });
        let state = self.cluster.lock();
        match state.rollout.as_ref() {
            Some(script) => script.snapshot.clone(),
            None => Ok(RolloutStatus::default()),
        }
    }
}

impl ClusterApi for FakeCluster {
    fn typed<K: KubeObject>(&self, namespace: &str) -> Arc<dyn ResourceStore<K>> {
        Arc::new(FakeStore::<K> {
            cluster: self.clone(),
            kind: K::kind(&()).to_string(),
            namespace: namespace.to_string(),
            _marker: PhantomData,
        })
    }

    fn dynamic(
        &self,
        namespace: &str,
        resource: &ApiResource,
    ) -> Arc<dyn ResourceStore<DynamicObject>> {
        Arc::new(FakeStore::<DynamicObject> {
            cluster: self.clone(),
            kind: dynamic_kind(resource),
            namespace: namespace.to_string(),
            _marker: PhantomData,
        })
    }

    fn rollouts(&self, _namespace: &str) -> Arc<dyn RolloutFeed> {
        Arc::new(FakeRolloutFeed {
            cluster: self.clone(),
        })
    }
}
