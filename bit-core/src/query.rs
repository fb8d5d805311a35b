//! Keyed request cache writing its state into the store
//!
//! A query is an async fetcher identified by a [`QueryKey`]. Registering a
//! query against a store path makes that path hold a [`QueryState`]
//! (`{status, data, error, updatedAt, isFetching}`) which views bind to like
//! any other value.
//!
//! - Fetches run on the tokio runtime. Their results come back as
//!   [`Completion`]s on a channel and are written by whoever owns the
//!   [`QueryCompletions`] receiver, so the store keeps a single writer.
//! - A key has at most one fetch in flight. Registering again while a fetch
//!   runs, or while the data is fresher than [`QueryConfig::stale_time`],
//!   does not fetch.
//! - Restarting or cancelling a fetch bumps the key's generation; results of
//!   older generations are dropped.
//! - A path follows one query at a time. Registering a different key on a
//!   path detaches the previous key, cancelling its fetch if no path is left.
//!
//! # Example
//!
//! ```ignore
//! let (queries, mut completions) = QueryClient::new(store.clone(), QueryConfig::default());
//!
//! queries.register_query("vips", QueryKey::new("vips"), move || {
//!     let api = api.clone();
//!     async move { api.list_vips().await }
//! })?;
//!
//! // later, on the task that owns the store
//! while let Some(done) = completions.try_recv() {
//!     queries.apply(done);
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::error::{BitError, Result};
use crate::path::StatePath;
use crate::store::Store;

/// How long fetched data counts as fresh unless configured otherwise.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

type FetchFuture = Pin<Box<dyn Future<Output = std::result::Result<Value, String>> + Send>>;
type Fetcher = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

/// Identifies a cached query.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct QueryKey(String);

impl QueryKey {
    /// Key with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Key for `name` called with `params`.
    ///
    /// Equal parameters give equal keys.
    pub fn with_params(name: &str, params: &impl Serialize) -> Self {
        match serde_json::to_string(params) {
            Ok(params) => Self(format!("{name}:{params}")),
            Err(err) => {
                tracing::warn!(query = name, error = %err, "Query params failed to serialize");
                Self(name.to_string())
            }
        }
    }

    /// The key text.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for QueryKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for QueryKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a query or mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// What a query path holds in the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState {
    pub status: QueryStatus,
    pub data: Option<Value>,
    pub error: Option<String>,
    /// Milliseconds since the Unix epoch of the last successful fetch.
    pub updated_at: Option<u64>,
    pub is_fetching: bool,
}

impl QueryState {
    /// Whether the last fetch succeeded.
    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    /// Data deserialized as `T`.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Option<T> {
        self.data
            .as_ref()
            .and_then(|data| serde_json::from_value(data.clone()).ok())
    }

    fn started(&mut self) {
        self.is_fetching = true;
        if self.data.is_none() {
            self.status = QueryStatus::Loading;
        }
    }

    fn stopped(&mut self) {
        self.is_fetching = false;
        if self.status == QueryStatus::Loading {
            self.status = QueryStatus::Idle;
        }
    }

    fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Request cache settings.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// How long a successful result stays fresh.
    pub stale_time: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
        }
    }
}

impl QueryConfig {
    /// Set the freshness window.
    pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }
}

/// Finished fetch or mutation, waiting to be written to the store.
pub struct Completion(CompletionKind);

enum CompletionKind {
    Query {
        key: QueryKey,
        generation: u64,
        result: std::result::Result<Value, String>,
    },
    Mutation {
        path: StatePath,
        result: std::result::Result<Value, String>,
        invalidates: Vec<QueryKey>,
    },
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            CompletionKind::Query {
                key,
                generation,
                result,
            } => f
                .debug_struct("Completion::Query")
                .field("key", key)
                .field("generation", generation)
                .field("ok", &result.is_ok())
                .finish(),
            CompletionKind::Mutation { path, result, .. } => f
                .debug_struct("Completion::Mutation")
                .field("path", &path.as_str())
                .field("ok", &result.is_ok())
                .finish(),
        }
    }
}

/// Receiving end for [`Completion`]s.
pub struct QueryCompletions {
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl QueryCompletions {
    /// Wait for the next completion.
    pub async fn recv(&mut self) -> Option<Completion> {
        self.rx.recv().await
    }

    /// Next completion if one is ready.
    pub fn try_recv(&mut self) -> Option<Completion> {
        self.rx.try_recv().ok()
    }
}

impl fmt::Debug for QueryCompletions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCompletions").finish_non_exhaustive()
    }
}

struct Entry {
    state: QueryState,
    targets: Vec<StatePath>,
    fetcher: Option<Fetcher>,
    fetched_at: Option<Instant>,
    invalidated: bool,
    generation: u64,
    fetching: bool,
    task: Option<AbortHandle>,
}

impl Entry {
    fn new() -> Self {
        Self {
            state: QueryState::default(),
            targets: Vec::new(),
            fetcher: None,
            fetched_at: None,
            invalidated: false,
            generation: 0,
            fetching: false,
            task: None,
        }
    }

    fn is_stale(&self, stale_time: Duration) -> bool {
        match self.fetched_at {
            None => true,
            Some(at) => self.invalidated || at.elapsed() >= stale_time,
        }
    }

    fn is_bound_to(&self, path: &StatePath) -> bool {
        self.targets
            .iter()
            .any(|target| target.segments() == path.segments())
    }

    fn needs_fetch(&self, stale_time: Duration) -> bool {
        !self.fetching && self.is_stale(stale_time)
    }

    /// Claim the next generation and mark the entry as fetching. The fetch
    /// itself is spawned by [`QueryClient::launch`] once the lock is gone.
    fn prepare(&mut self, key: &QueryKey, fetcher: Fetcher, runtime: Handle) -> PendingFetch {
        self.generation += 1;
        self.fetching = true;
        self.state.started();
        PendingFetch {
            key: key.clone(),
            generation: self.generation,
            fetcher,
            runtime,
        }
    }

    fn abort(&mut self) -> bool {
        if !self.fetching {
            return false;
        }
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
        self.fetching = false;
        self.generation += 1;
        true
    }
}

/// A fetch claimed under the entries lock, spawned after it is released so
/// the fetcher may call back into the client.
struct PendingFetch {
    key: QueryKey,
    generation: u64,
    fetcher: Fetcher,
    runtime: Handle,
}

/// Shared handle to the request cache of one store.
#[derive(Clone)]
pub struct QueryClient {
    store: Store,
    config: QueryConfig,
    entries: Arc<Mutex<HashMap<QueryKey, Entry>>>,
    tx: mpsc::UnboundedSender<Completion>,
}

impl QueryClient {
    /// Cache writing into `store`, plus the receiver for its completions.
    pub fn new(store: Store, config: QueryConfig) -> (Self, QueryCompletions) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Self {
            store,
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
            tx,
        };
        (client, QueryCompletions { rx })
    }

    /// Bind `path` to the query `key` and fetch if needed.
    ///
    /// The query's current state is written to `path` right away. A fetch
    /// starts when nothing is cached yet or the cached data is stale, and no
    /// fetch for `key` is already running. The latest registered fetcher is
    /// the one used for later refetches.
    pub fn register_query<F, Fut, T, E>(
        &self,
        path: impl Into<StatePath>,
        key: impl Into<QueryKey>,
        fetcher: F,
    ) -> Result<QueryState>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Serialize,
        E: fmt::Display,
    {
        let path = path.into();
        let state = self.ensure(key.into(), boxed(fetcher), Some(path.clone()))?;
        self.store.set(path.as_str(), state.to_value());
        Ok(state)
    }

    /// Fetch `key` if needed without binding it to a path.
    pub fn fetch<F, Fut, T, E>(&self, key: impl Into<QueryKey>, fetcher: F) -> Result<QueryState>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Serialize,
        E: fmt::Display,
    {
        self.ensure(key.into(), boxed(fetcher), None)
    }

    /// Mark `key` stale. Returns whether a refetch started.
    ///
    /// A query bound to at least one path refetches immediately, replacing
    /// any fetch still running. Unbound queries refetch on next use.
    pub fn invalidate(&self, key: &QueryKey) -> Result<bool> {
        let (pending, targets, state) = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(key) else {
                return Ok(false);
            };
            entry.invalidated = true;
            if entry.targets.is_empty() {
                tracing::debug!(query = %key, "Query invalidated");
                return Ok(false);
            }
            let Some(fetcher) = entry.fetcher.clone() else {
                return Ok(false);
            };
            let runtime = runtime()?;
            entry.abort();
            let pending = entry.prepare(key, fetcher, runtime);
            tracing::debug!(query = %key, "Query invalidated, refetching");
            (pending, entry.targets.clone(), entry.state.clone())
        };
        self.launch(pending);
        self.write_targets(&targets, &state);
        Ok(true)
    }

    /// Run a mutation whose state is written to `path`.
    ///
    /// On success every key in `invalidates` is invalidated.
    pub fn mutate<Fut, T, E>(
        &self,
        path: impl Into<StatePath>,
        future: Fut,
        invalidates: impl IntoIterator<Item = QueryKey>,
    ) -> Result<()>
    where
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Serialize,
        E: fmt::Display,
    {
        let path = path.into();
        let runtime = runtime()?;
        let invalidates: Vec<QueryKey> = invalidates.into_iter().collect();

        let mut state = QueryState::default();
        state.started();
        self.store.set(path.as_str(), state.to_value());

        let tx = self.tx.clone();
        let future = into_value(future);
        tracing::debug!(path = %path, "Mutation started");
        runtime.spawn(async move {
            let result = future.await;
            let _ = tx.send(Completion(CompletionKind::Mutation {
                path,
                result,
                invalidates,
            }));
        });
        Ok(())
    }

    /// Write a finished fetch or mutation to the store.
    pub fn apply(&self, completion: Completion) {
        match completion.0 {
            CompletionKind::Query {
                key,
                generation,
                result,
            } => self.apply_query(key, generation, result),
            CompletionKind::Mutation {
                path,
                result,
                invalidates,
            } => {
                let ok = result.is_ok();
                let state = finished(QueryState::default(), result);
                tracing::debug!(path = %path, ok, "Mutation finished");
                self.store.set(path.as_str(), state.to_value());
                if ok {
                    for key in &invalidates {
                        if let Err(err) = self.invalidate(key) {
                            tracing::warn!(query = %key, error = %err, "Invalidation failed");
                        }
                    }
                }
            }
        }
    }

    /// Cached state of `key`.
    pub fn cached(&self, key: &QueryKey) -> Option<QueryState> {
        self.entries.lock().get(key).map(|entry| entry.state.clone())
    }

    /// Stop a running fetch. Its result, if it still arrives, is dropped.
    pub fn cancel(&self, key: &QueryKey) {
        let (targets, state) = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(key) else {
                return;
            };
            if !entry.abort() {
                return;
            }
            entry.state.stopped();
            tracing::debug!(query = %key, "Query cancelled");
            (entry.targets.clone(), entry.state.clone())
        };
        self.write_targets(&targets, &state);
    }

    /// Stop every running fetch.
    pub fn cancel_all(&self) {
        let running: Vec<QueryKey> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, entry)| entry.fetching)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &running {
            self.cancel(key);
        }
    }

    /// Number of fetches in flight.
    pub fn in_flight(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.fetching)
            .count()
    }

    /// Whether `key` has a fetch in flight.
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|entry| entry.fetching)
    }

    /// Cache settings.
    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    fn ensure(
        &self,
        key: QueryKey,
        fetcher: Fetcher,
        target: Option<StatePath>,
    ) -> Result<QueryState> {
        let stale_time = self.config.stale_time;
        let (pending, state) = {
            let mut entries = self.entries.lock();
            let runtime = match entries.get(&key) {
                Some(entry) if !entry.needs_fetch(stale_time) => None,
                _ => Some(runtime()?),
            };

            if let Some(target) = &target {
                unbind_others(&mut entries, &key, target);
            }
            // Unbound entries are only worth keeping while their data is fresh.
            entries.retain(|k, entry| {
                *k == key
                    || !entry.targets.is_empty()
                    || entry.fetching
                    || !entry.is_stale(stale_time)
            });

            let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
            if let Some(target) = target {
                if !entry.is_bound_to(&target) {
                    entry.targets.push(target);
                }
            }
            entry.fetcher = Some(Arc::clone(&fetcher));

            let pending = match runtime {
                Some(runtime) => Some(entry.prepare(&key, fetcher, runtime)),
                None if entry.fetching => {
                    tracing::trace!(query = %key, "Fetch already in flight");
                    None
                }
                None => {
                    tracing::trace!(query = %key, "Cached data is fresh");
                    None
                }
            };
            (pending, entry.state.clone())
        };

        if let Some(pending) = pending {
            self.launch(pending);
        }
        Ok(state)
    }

    /// Spawn a fetch claimed by [`Entry::prepare`]. Runs without the
    /// entries lock held.
    fn launch(&self, pending: PendingFetch) {
        let PendingFetch {
            key,
            generation,
            fetcher,
            runtime,
        } = pending;

        let future = fetcher();
        let tx = self.tx.clone();
        let task_key = key.clone();
        let handle = runtime.spawn(async move {
            let result = future.await;
            let _ = tx.send(Completion(CompletionKind::Query {
                key: task_key,
                generation,
                result,
            }));
        });

        let mut entries = self.entries.lock();
        match entries.get_mut(&key) {
            Some(entry) if entry.fetching && entry.generation == generation => {
                entry.task = Some(handle.abort_handle());
                tracing::debug!(query = %key, generation, "Fetch started");
            }
            // Superseded or cancelled while the fetcher was being built.
            _ => handle.abort(),
        }
    }

    fn apply_query(
        &self,
        key: QueryKey,
        generation: u64,
        result: std::result::Result<Value, String>,
    ) {
        let (targets, state) = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(&key) else {
                return;
            };
            if entry.generation != generation {
                tracing::trace!(query = %key, generation, "Dropping superseded result");
                return;
            }
            entry.task = None;
            entry.fetching = false;
            if result.is_ok() {
                entry.fetched_at = Some(Instant::now());
                entry.invalidated = false;
            }
            if let Err(err) = &result {
                tracing::warn!(query = %key, error = %err, "Fetch failed");
            }
            entry.state = finished(entry.state.clone(), result);
            tracing::debug!(query = %key, status = ?entry.state.status, "Fetch finished");
            (entry.targets.clone(), entry.state.clone())
        };
        self.write_targets(&targets, &state);
    }

    fn write_targets(&self, targets: &[StatePath], state: &QueryState) {
        let value = state.to_value();
        for target in targets {
            self.store.set(target.as_str(), value.clone());
        }
    }
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock();
        let mut keys: Vec<&str> = entries.keys().map(QueryKey::name).collect();
        keys.sort_unstable();
        f.debug_struct("QueryClient")
            .field("keys", &keys)
            .field("stale_time", &self.config.stale_time)
            .finish()
    }
}

/// Detach `target` from every query other than `key`. A query left with no
/// path has its running fetch cancelled so a late result cannot land.
fn unbind_others(entries: &mut HashMap<QueryKey, Entry>, key: &QueryKey, target: &StatePath) {
    for (other, entry) in entries.iter_mut().filter(|(other, _)| *other != key) {
        if !entry.is_bound_to(target) {
            continue;
        }
        entry
            .targets
            .retain(|bound| bound.segments() != target.segments());
        tracing::debug!(query = %other, path = %target, "Path rebound to another query");
        if entry.targets.is_empty() && entry.abort() {
            entry.state.stopped();
            tracing::debug!(query = %other, "Fetch cancelled, no path left");
        }
    }
}

fn runtime() -> Result<Handle> {
    Handle::try_current().map_err(|err| BitError::NoRuntime(err.to_string()))
}

fn finished(mut state: QueryState, result: std::result::Result<Value, String>) -> QueryState {
    state.is_fetching = false;
    match result {
        Ok(data) => {
            state.status = QueryStatus::Success;
            state.data = Some(data);
            state.error = None;
            state.updated_at = Some(now_millis());
        }
        Err(err) => {
            state.status = QueryStatus::Error;
            state.error = Some(err);
        }
    }
    state
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn boxed<F, Fut, T, E>(fetcher: F) -> Fetcher
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Serialize,
    E: fmt::Display,
{
    Arc::new(move || into_value(fetcher()))
}

fn into_value<Fut, T, E>(future: Fut) -> FetchFuture
where
    Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Serialize,
    E: fmt::Display,
{
    Box::pin(async move {
        let data = future.await.map_err(|err| err.to_string())?;
        serde_json::to_value(data).map_err(|err| err.to_string())
    })
}
