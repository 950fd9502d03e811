//! Scriptable in-memory transport for unit tests.

use super::{ApiError, ApiRequest, Transport};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

type Handler = Box<dyn Fn(&ApiRequest) -> Result<Value, ApiError> + Send + Sync>;

/// Records every request and answers through a handler closure.
///
/// A gated transport holds each response until the test releases a permit,
/// which makes the optimistic in-flight state observable.
pub(crate) struct MockTransport {
    handler: Handler,
    requests: Mutex<Vec<ApiRequest>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockTransport {
    pub fn new(
        handler: impl Fn(&ApiRequest) -> Result<Value, ApiError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        (self.handler)(&request)
    }
}

pub(crate) fn status_error(resource: &str, status: u16) -> ApiError {
    ApiError::Status {
        resource: resource.to_string(),
        status,
        message: format!("status {status}"),
    }
}

/// An Eve-style list envelope.
pub(crate) fn page(items: Vec<Value>, total: u64, max_results: u64, page: u64) -> Value {
    json!({
        "_items": items,
        "_meta": { "total": total, "max_results": max_results, "page": page },
    })
}

/// Reads the `page` query parameter, defaulting to the first page.
pub(crate) fn requested_page(request: &ApiRequest) -> u64 {
    request
        .query
        .get("page")
        .and_then(Value::as_u64)
        .unwrap_or(1)
}

/// A tiny in-memory stand-in for the Eve backend.
///
/// Records live per resource and get a fresh `_etag` on every write. Updates
/// and deletes are checked against `If-Match` like the real API does.
#[derive(Default)]
pub(crate) struct FakeApi {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    records: std::collections::BTreeMap<String, std::collections::BTreeMap<String, Value>>,
    defaults: Vec<(String, String, Value)>,
    failures: Vec<(Method, String, u16)>,
    counter: u64,
}

impl FakeState {
    fn next(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}-{}", self.counter)
    }
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wraps this API into a transport.
    pub fn transport(self: &Arc<Self>) -> MockTransport {
        let api = self.clone();
        MockTransport::new(move |request| api.handle(request))
    }

    /// Inserts a record as if it had been created on the server, returning its id.
    pub fn seed(&self, resource: &str, mut record: Value) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next("id");
        let etag = state.next("etag");
        record["_id"] = json!(id);
        record["_etag"] = json!(etag);
        state
            .records
            .entry(resource.to_string())
            .or_default()
            .insert(id.clone(), record);
        id
    }

    /// Changes a record behind the client's back, bumping its version tag.
    pub fn modify(&self, resource: &str, id: &str, changes: Value) {
        let mut state = self.state.lock().unwrap();
        let etag = state.next("etag");
        let record = state
            .records
            .get_mut(resource)
            .and_then(|records| records.get_mut(id))
            .unwrap();
        merge(record, &changes);
        record["_etag"] = json!(etag);
    }

    pub fn record(&self, resource: &str, id: &str) -> Option<Value> {
        let state = self.state.lock().unwrap();
        state.records.get(resource)?.get(id).cloned()
    }

    pub fn records(&self, resource: &str) -> Vec<Value> {
        let state = self.state.lock().unwrap();
        state
            .records
            .get(resource)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Fields the server fills in on create when the client did not send them.
    pub fn set_default(&self, resource: &str, field: &str, value: Value) {
        let mut state = self.state.lock().unwrap();
        state
            .defaults
            .push((resource.to_string(), field.to_string(), value));
    }

    /// Makes every `method` request against `resource` fail with `status`.
    pub fn fail_on(&self, method: Method, resource: &str, status: u16) {
        let mut state = self.state.lock().unwrap();
        state.failures.push((method, resource.to_string(), status));
    }

    fn handle(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let mut state = self.state.lock().unwrap();
        let resource = request.resource.as_str();

        if let Some((_, _, status)) = state
            .failures
            .iter()
            .find(|(method, res, _)| *method == request.method && res == resource)
        {
            return Err(status_error(resource, *status));
        }

        let etag_matches = |record: &Value| match request.header(super::IF_MATCH) {
            Some(etag) => record["_etag"].as_str() == Some(etag),
            None => true,
        };

        let method = &request.method;
        match request.id.as_deref() {
            None if *method == Method::GET => {
                let all: Vec<Value> = state
                    .records
                    .get(resource)
                    .map(|records| records.values().cloned().collect())
                    .unwrap_or_default();
                let max_results = request
                    .query
                    .get("max_results")
                    .and_then(Value::as_u64)
                    .unwrap_or(25);
                let number = requested_page(request);
                let items = all
                    .iter()
                    .skip(((number - 1) * max_results) as usize)
                    .take(max_results as usize)
                    .cloned()
                    .collect();
                Ok(page(items, all.len() as u64, max_results, number))
            }
            Some(id) if *method == Method::GET => state
                .records
                .get(resource)
                .and_then(|records| records.get(id))
                .cloned()
                .ok_or_else(|| status_error(resource, 404)),
            None if *method == Method::POST => {
                let mut record = request.data.clone().unwrap_or_else(|| json!({}));
                let defaults: Vec<(String, Value)> = state
                    .defaults
                    .iter()
                    .filter(|(res, _, _)| res == resource)
                    .map(|(_, field, value)| (field.clone(), value.clone()))
                    .collect();
                for (field, value) in defaults {
                    if record.get(&field).is_none() {
                        record[field.as_str()] = value;
                    }
                }
                let id = state.next("id");
                let etag = state.next("etag");
                record["_id"] = json!(id);
                record["_etag"] = json!(etag);
                state
                    .records
                    .entry(resource.to_string())
                    .or_default()
                    .insert(id, record.clone());
                Ok(record)
            }
            Some(id) if *method == Method::PATCH => {
                let etag = state.next("etag");
                let record = state
                    .records
                    .get_mut(resource)
                    .and_then(|records| records.get_mut(id))
                    .ok_or_else(|| status_error(resource, 404))?;
                if !etag_matches(record) {
                    return Err(status_error(resource, 412));
                }
                merge(record, request.data.as_ref().unwrap_or(&Value::Null));
                record["_etag"] = json!(etag);
                Ok(record.clone())
            }
            Some(id) if *method == Method::DELETE => {
                let records = state
                    .records
                    .get_mut(resource)
                    .ok_or_else(|| status_error(resource, 404))?;
                let record = records.get(id).ok_or_else(|| status_error(resource, 404))?;
                if !etag_matches(record) {
                    return Err(status_error(resource, 412));
                }
                records.remove(id);
                Ok(Value::Null)
            }
            _ => Err(status_error(resource, 405)),
        }
    }
}

fn merge(record: &mut Value, changes: &Value) {
    if let (Some(record), Some(changes)) = (record.as_object_mut(), changes.as_object()) {
        for (key, value) in changes {
            record.insert(key.clone(), value.clone());
        }
    }
}
