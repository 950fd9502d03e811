//! Optimistic client-side cache for a remote PVK collection.
//!
//! A store keeps the records last confirmed by the server plus three overlays
//! for requests that are still in flight: pending creates (no id yet),
//! pending updates (keyed by the id being patched) and pending deletes.
//! [`ResourceStore::list`] merges all of them on every call.
//!
//! Mutations follow a mutate-then-dispatch protocol: `create`, `update` and
//! `delete` change the overlay synchronously when they are called and only
//! then hand back the future that performs the round trip. Any read made after
//! the call, even before the future is polled, sees the optimistic change.
//! When the future settles the overlay entry is removed again, leaving either
//! the server-confirmed record or the last confirmed state in place.
//!
//! Updates and deletes carry the record's version tag as a precondition. A
//! `412` answer means our copy is stale; the store then refetches the whole
//! collection before reporting the error.

mod error;
mod page;

pub use error::StoreError;
pub use page::{Page, PageMeta, Record};

use crate::transport::{ApiRequest, Query, Transport};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

const DEFAULT_PAGE_SIZE: u32 = 25;
const DEFAULT_PAGE_CONCURRENCY: usize = 4;

/// Confirmed records plus the optimistic overlays.
struct Overlay<T> {
    /// Records last known to match the server, keyed by `_id`
    confirmed: BTreeMap<String, T>,
    /// Submitted creates, tagged with a store-local ticket
    pending_creates: Vec<(u64, T)>,
    pending_updates: HashMap<String, T>,
    pending_deletes: HashSet<String>,
    next_ticket: u64,
}

impl<T> Default for Overlay<T> {
    fn default() -> Self {
        Self {
            confirmed: BTreeMap::new(),
            pending_creates: Vec::new(),
            pending_updates: HashMap::new(),
            pending_deletes: HashSet::new(),
            next_ticket: 0,
        }
    }
}

/// Cache of one remote collection with optimistic create/update/delete.
pub struct ResourceStore<T> {
    name: String,
    query: Query,
    page_size: u32,
    page_concurrency: usize,
    transport: Arc<dyn Transport>,
    overlay: Mutex<Overlay<T>>,
}

impl<T> ResourceStore<T>
where
    T: Record + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Creates an empty store for the API resource `name`.
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            query: Query::new(),
            page_size: DEFAULT_PAGE_SIZE,
            page_concurrency: DEFAULT_PAGE_CONCURRENCY,
            transport,
            overlay: Mutex::new(Overlay::default()),
        }
    }

    /// Adds a query field sent with every read, e.g. `where` or `embedded`.
    pub fn with_query(mut self, key: impl Into<String>, value: Value) -> Self {
        self.query.insert(key.into(), value);
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Caps how many list pages are requested at the same time.
    pub fn with_page_concurrency(mut self, page_concurrency: usize) -> Self {
        self.page_concurrency = page_concurrency.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn overlay(&self) -> MutexGuard<'_, Overlay<T>> {
        self.overlay.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetches every page of the collection and replaces the confirmed records.
    ///
    /// The first page tells us the total count and the page size the server
    /// actually used; the remaining pages are requested concurrently. Records
    /// are keyed by id, so arrival order and duplicates across pages don't
    /// matter. The returned page holds all records with the first page's meta.
    pub async fn fetch_all(&self) -> Result<Page<T>, StoreError> {
        let start = Instant::now();
        let first = self.fetch_page(1).await?;
        let page_count = first.meta.page_count();

        let mut items = first.items;
        if page_count > 1 {
            let rest: Vec<Page<T>> = stream::iter(2..=page_count)
                .map(|number| self.fetch_page(number))
                .buffer_unordered(self.page_concurrency)
                .try_collect()
                .await?;
            items.extend(rest.into_iter().flat_map(|page| page.items));
        }

        let mut confirmed = BTreeMap::new();
        for item in items {
            let id = self.require_id(&item)?;
            confirmed.insert(id, item);
        }
        let merged: Vec<T> = confirmed.values().cloned().collect();

        self.overlay().confirmed = confirmed;

        debug!(
            resource = %self.name,
            pages = page_count,
            count = merged.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Fetched collection"
        );

        Ok(Page {
            items: merged,
            meta: first.meta,
        })
    }

    async fn fetch_page(&self, number: u64) -> Result<Page<T>, StoreError> {
        let request = ApiRequest::get(&self.name)
            .with_query(&self.query)
            .with_param("page", json!(number))
            .with_param("max_results", json!(self.page_size));
        let value = self.transport.request(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetches a single record and merges it into the confirmed records.
    pub async fn fetch_one(&self, id: &str) -> Result<T, StoreError> {
        let request = ApiRequest::get(&self.name)
            .with_id(id)
            .with_query(&self.query);
        let value = self.transport.request(request).await?;
        let item: T = serde_json::from_value(value)?;
        let id = self.require_id(&item)?;

        self.overlay().confirmed.insert(id, item.clone());
        Ok(item)
    }

    /// Current view of the collection.
    ///
    /// Confirmed records (ordered by id) that are not pending deletion, each
    /// replaced by its pending update if there is one, followed by all pending
    /// creates in submission order.
    pub fn list(&self) -> Vec<T> {
        let overlay = self.overlay();
        overlay
            .confirmed
            .iter()
            .filter(|(id, _)| !overlay.pending_deletes.contains(*id))
            .map(|(id, item)| overlay.pending_updates.get(id).unwrap_or(item).clone())
            .chain(overlay.pending_creates.iter().map(|(_, item)| item.clone()))
            .collect()
    }

    /// Looks up a visible record by id, honoring the overlays.
    pub fn get(&self, id: &str) -> Option<T> {
        let overlay = self.overlay();
        if overlay.pending_deletes.contains(id) {
            return None;
        }
        overlay
            .pending_updates
            .get(id)
            .or_else(|| overlay.confirmed.get(id))
            .cloned()
    }

    /// True while an update or delete is in flight.
    ///
    /// Pending creates are not considered. This is advisory: the store does not
    /// serialize operations on the same id.
    pub fn is_busy(&self) -> bool {
        let overlay = self.overlay();
        !overlay.pending_updates.is_empty() || !overlay.pending_deletes.is_empty()
    }

    /// Creates a record.
    ///
    /// `data` shows up in [`list`](Self::list) as soon as this method returns.
    /// On success it is replaced by the confirmed record carrying the server's
    /// id and version tag; on failure it disappears again.
    pub fn create(&self, data: T) -> impl Future<Output = Result<T, StoreError>> + Send + '_ {
        let ticket = {
            let mut overlay = self.overlay();
            let ticket = overlay.next_ticket;
            overlay.next_ticket += 1;
            overlay.pending_creates.push((ticket, data.clone()));
            ticket
        };
        debug!(resource = %self.name, ticket, "Staged create");

        async move {
            let result = self.send_create(&data).await;
            self.settle_create(ticket, result)
        }
    }

    async fn send_create(&self, data: &T) -> Result<(String, T), StoreError> {
        let body = serde_json::to_value(data)?;
        let request = ApiRequest::post(&self.name).with_data(body);
        let value = self.transport.request(request).await?;
        self.decode_confirmed(value)
    }

    fn settle_create(
        &self,
        ticket: u64,
        result: Result<(String, T), StoreError>,
    ) -> Result<T, StoreError> {
        let mut overlay = self.overlay();
        overlay.pending_creates.retain(|(t, _)| *t != ticket);

        match result {
            Ok((id, record)) => {
                debug!(resource = %self.name, id = %id, "Create confirmed");
                overlay.confirmed.insert(id, record.clone());
                Ok(record)
            }
            Err(err) => {
                warn!(resource = %self.name, error = %err, "Create failed, dropping optimistic record");
                Err(err)
            }
        }
    }

    /// Applies `changes` (a JSON object) to the record `id`.
    ///
    /// The merged record replaces the confirmed one in reads until the request
    /// settles. The request carries the confirmed version tag as precondition.
    /// On a `412` the collection is refetched before the error is returned; on
    /// any failure the last confirmed record becomes visible again.
    pub fn update(
        &self,
        id: &str,
        changes: Value,
    ) -> impl Future<Output = Result<T, StoreError>> + Send + '_ {
        let staged = self.stage_update(id, &changes);
        let id = id.to_string();

        async move {
            let etag = staged?;
            let mut request = ApiRequest::patch(&self.name)
                .with_id(&id)
                .with_data(changes);
            if let Some(etag) = etag {
                request = request.if_match(etag);
            }

            let result = match self.transport.request(request).await {
                Ok(value) => self.decode_confirmed(value),
                Err(err) => Err(err.into()),
            };
            if let Err(err) = &result {
                self.resync_if_stale(err).await;
            }
            self.settle_update(&id, result)
        }
    }

    fn stage_update(&self, id: &str, changes: &Value) -> Result<Option<String>, StoreError> {
        let Some(patch) = changes.as_object() else {
            return Err(StoreError::InvalidChanges {
                changes: changes.to_string(),
            });
        };

        let mut overlay = self.overlay();
        let current = overlay
            .confirmed
            .get(id)
            .ok_or_else(|| self.unknown(id))?;
        let etag = current.etag().map(str::to_string);

        let mut merged = serde_json::to_value(current)?;
        if let Some(fields) = merged.as_object_mut() {
            for (key, value) in patch {
                fields.insert(key.clone(), value.clone());
            }
        }
        let merged: T = serde_json::from_value(merged)?;

        overlay.pending_updates.insert(id.to_string(), merged);
        debug!(resource = %self.name, id = %id, "Staged update");
        Ok(etag)
    }

    fn settle_update(
        &self,
        id: &str,
        result: Result<(String, T), StoreError>,
    ) -> Result<T, StoreError> {
        let mut overlay = self.overlay();
        overlay.pending_updates.remove(id);

        match result {
            Ok((_, record)) => {
                overlay.confirmed.insert(id.to_string(), record.clone());
                Ok(record)
            }
            Err(err) => {
                warn!(resource = %self.name, id = %id, error = %err, "Update failed, rolled back");
                Err(err)
            }
        }
    }

    /// Deletes the record `id`.
    ///
    /// The record is hidden from reads immediately. On success it is dropped
    /// from the confirmed records; on failure it becomes visible again, after
    /// a refetch if the server reported a stale version tag.
    pub fn delete(&self, id: &str) -> impl Future<Output = Result<(), StoreError>> + Send + '_ {
        let staged = self.stage_delete(id);
        let id = id.to_string();

        async move {
            let etag = staged?;
            let mut request = ApiRequest::delete(&self.name).with_id(&id);
            if let Some(etag) = etag {
                request = request.if_match(etag);
            }

            let result = self
                .transport
                .request(request)
                .await
                .map(|_| ())
                .map_err(StoreError::from);
            if let Err(err) = &result {
                self.resync_if_stale(err).await;
            }
            self.settle_delete(&id, result)
        }
    }

    fn stage_delete(&self, id: &str) -> Result<Option<String>, StoreError> {
        let mut overlay = self.overlay();
        let etag = overlay
            .confirmed
            .get(id)
            .ok_or_else(|| self.unknown(id))?
            .etag()
            .map(str::to_string);
        overlay.pending_deletes.insert(id.to_string());
        debug!(resource = %self.name, id = %id, "Staged delete");
        Ok(etag)
    }

    fn settle_delete(&self, id: &str, result: Result<(), StoreError>) -> Result<(), StoreError> {
        let mut overlay = self.overlay();
        overlay.pending_deletes.remove(id);

        match result {
            Ok(()) => {
                overlay.confirmed.remove(id);
                Ok(())
            }
            Err(err) => {
                warn!(resource = %self.name, id = %id, error = %err, "Delete failed, record restored");
                Err(err)
            }
        }
    }

    /// Refetches the collection after the server rejected our version tag.
    async fn resync_if_stale(&self, err: &StoreError) {
        if !err.is_precondition_failed() {
            return;
        }
        warn!(resource = %self.name, "Local copy is stale, resynchronizing");
        if let Err(resync) = self.fetch_all().await {
            warn!(resource = %self.name, error = %resync, "Resynchronization failed");
        }
    }

    fn decode_confirmed(&self, value: Value) -> Result<(String, T), StoreError> {
        let record: T = serde_json::from_value(value)?;
        let id = self.require_id(&record)?;
        Ok((id, record))
    }

    fn require_id(&self, item: &T) -> Result<String, StoreError> {
        item.id()
            .map(str::to_string)
            .ok_or_else(|| StoreError::MissingId {
                resource: self.name.clone(),
            })
    }

    fn unknown(&self, id: &str) -> StoreError {
        StoreError::UnknownRecord {
            resource: self.name.clone(),
            id: id.to_string(),
        }
    }
}
