//! Polling synchronisation of server collections into published snapshots.
//!
//! Every fetch takes a ticket when it is issued. A response only replaces the
//! published snapshot if no later-issued fetch has published first, so a slow
//! periodic poll can never overwrite the resync that followed a mutation.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::api::Api;
use crate::form::CreateRequest;
use crate::model::Resource;

const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Published, sorted, duplicate-free collection.
pub type Collection<R> = Arc<Vec<R>>;

/// Result of one fetch: either a fresh snapshot or "keep what is shown".
#[derive(Debug)]
pub enum Fetched<T> {
    Snapshot(T),
    KeepPrevious,
}

/// What a resync did to the published state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resync {
    /// A new snapshot was published.
    Published,
    /// The fetch failed; the previous snapshot stays.
    KeptPrevious,
    /// The fetch succeeded but a later fetch already published, or the
    /// owner was torn down.
    Discarded,
}

/// Outcome of a create or delete request, reported after the resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Accepted,
    Rejected,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("{noun} {id} is not stoppable")]
    NotStoppable { noun: &'static str, id: u64 },
    #[error("no {noun} with id {id}")]
    UnknownRecord { noun: &'static str, id: u64 },
    #[error("could not fetch the {noun} list")]
    Unreachable { noun: &'static str },
}

/// A published value together with the ticket of the fetch that produced it.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub revision: u64,
    pub value: T,
}

/// Owner of one piece of published state.
pub(crate) struct Publisher<T> {
    tx: watch::Sender<Snapshot<T>>,
    issued: AtomicU64,
    closed: Arc<AtomicBool>,
}

impl<T> Publisher<T> {
    pub(crate) fn new(initial: T, closed: Arc<AtomicBool>) -> Self {
        let (tx, _) = watch::channel(Snapshot {
            revision: 0,
            value: initial,
        });
        Self {
            tx,
            issued: AtomicU64::new(0),
            closed,
        }
    }

    pub(crate) fn ticket(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Replace the snapshot wholesale unless a newer ticket already did.
    pub(crate) fn publish(&self, ticket: u64, value: T) -> Resync {
        let mut value = Some(value);
        let replaced = self.tx.send_if_modified(|current| {
            if self.closed.load(Ordering::SeqCst) || current.revision >= ticket {
                return false;
            }
            if let Some(v) = value.take() {
                *current = Snapshot {
                    revision: ticket,
                    value: v,
                };
            }
            true
        });
        if replaced { Resync::Published } else { Resync::Discarded }
    }

    /// Ticket of the published snapshot; zero until the first fetch lands.
    pub(crate) fn revision(&self) -> u64 {
        self.tx.borrow().revision
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.tx.subscribe()
    }

    pub(crate) fn current(&self) -> T
    where
        T: Clone,
    {
        self.tx.borrow().value.clone()
    }
}

/// GET a JSON singleton. Null bodies, failures and undecodable bodies all
/// leave the previous snapshot in place.
pub(crate) async fn fetch_one<T: DeserializeOwned>(api: &dyn Api, path: &str) -> Fetched<T> {
    match api.get(path).await {
        Ok(Value::Null) => {
            debug!(path, "null body, keeping previous snapshot");
            Fetched::KeepPrevious
        }
        Ok(body) => match serde_json::from_value(body) {
            Ok(v) => Fetched::Snapshot(v),
            Err(e) => {
                debug!(path, error = %e, "undecodable body, keeping previous snapshot");
                Fetched::KeepPrevious
            }
        },
        Err(e) => {
            debug!(path, error = %e, "fetch failed, keeping previous snapshot");
            Fetched::KeepPrevious
        }
    }
}

/// Cancels a polling task when dropped. Results of requests still in flight
/// are discarded from then on.
pub struct PollHandle {
    task: JoinHandle<()>,
    closed: Arc<AtomicBool>,
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

/// Run `tick` immediately and then every `every` until the handle is dropped.
/// Ticks never overlap: a tick that would fire while the previous one is
/// still running is skipped.
pub(crate) fn spawn_poller<F, Fut>(every: Duration, closed: Arc<AtomicBool>, mut tick: F) -> PollHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let every = every.max(MIN_INTERVAL);
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            tick().await;
        }
    });
    PollHandle { task, closed }
}

/// Keeps one server collection (tunnels or pipes) in sync.
pub struct ResourceList<R: Resource> {
    api: Arc<dyn Api>,
    state: Publisher<Collection<R>>,
    closed: Arc<AtomicBool>,
}

impl<R: Resource + DeserializeOwned> ResourceList<R> {
    pub fn new(api: Arc<dyn Api>) -> Arc<Self> {
        let closed = Arc::new(AtomicBool::new(false));
        Arc::new(Self {
            api,
            state: Publisher::new(Arc::new(Vec::new()), Arc::clone(&closed)),
            closed,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<Collection<R>>> {
        self.state.subscribe()
    }

    pub fn current(&self) -> Collection<R> {
        self.state.current()
    }

    /// Fetch and normalise the collection without publishing it.
    pub async fn fetch(&self) -> Fetched<Vec<R>> {
        let body = match self.api.get(R::COLLECTION).await {
            Ok(body) => body,
            Err(e) => {
                debug!(noun = R::NOUN, error = %e, "poll failed, keeping previous snapshot");
                return Fetched::KeepPrevious;
            }
        };
        // A null list is a real "zero records" answer, not "no change".
        match serde_json::from_value::<Option<Vec<R>>>(body) {
            Ok(rows) => Fetched::Snapshot(normalize(rows.unwrap_or_default())),
            Err(e) => {
                debug!(noun = R::NOUN, error = %e, "undecodable list, keeping previous snapshot");
                Fetched::KeepPrevious
            }
        }
    }

    /// Fetch the collection and publish it if it is still the newest answer.
    pub async fn resync(&self) -> Resync {
        let ticket = self.state.ticket();
        match self.fetch().await {
            Fetched::Snapshot(rows) => {
                let count = rows.len();
                let outcome = self.state.publish(ticket, Arc::new(rows));
                debug!(noun = R::NOUN, ticket, count, ?outcome, "resync");
                outcome
            }
            Fetched::KeepPrevious => Resync::KeptPrevious,
        }
    }

    /// POST a validated creation request, then resync whatever the outcome.
    pub async fn create(&self, request: &CreateRequest) -> Mutation {
        let outcome = match serde_json::to_value(request) {
            Ok(body) => match self.api.post(R::COLLECTION, body).await {
                Ok(_) => Mutation::Accepted,
                Err(e) => {
                    warn!(noun = R::NOUN, error = %e, "create failed");
                    Mutation::Rejected
                }
            },
            Err(e) => {
                warn!(noun = R::NOUN, error = %e, "cannot encode create request");
                Mutation::Rejected
            }
        };
        self.resync().await;
        outcome
    }

    /// DELETE a record, then resync whatever the outcome. Records that are
    /// not stoppable are refused without contacting the server.
    pub async fn delete(&self, record: &R) -> Result<Mutation, SyncError> {
        if !record.is_stoppable() {
            return Err(SyncError::NotStoppable {
                noun: R::NOUN,
                id: record.id(),
            });
        }
        let path = format!("{}{}", R::COLLECTION, record.id());
        let outcome = match self.api.delete(&path).await {
            Ok(_) => Mutation::Accepted,
            Err(e) => {
                warn!(noun = R::NOUN, id = record.id(), error = %e, "delete failed");
                Mutation::Rejected
            }
        };
        self.resync().await;
        Ok(outcome)
    }

    /// Delete by id, looking the record up in the published snapshot.
    /// Without any fetched snapshot the id cannot be judged unknown.
    pub async fn delete_id(&self, id: u64) -> Result<Mutation, SyncError> {
        if self.state.revision() == 0 {
            return Err(SyncError::Unreachable { noun: R::NOUN });
        }
        let record = self
            .current()
            .iter()
            .find(|r| r.id() == id)
            .cloned()
            .ok_or(SyncError::UnknownRecord { noun: R::NOUN, id })?;
        self.delete(&record).await
    }

    /// Start periodic polling; the first fetch happens immediately.
    pub fn poll(self: &Arc<Self>, every: Duration) -> PollHandle {
        let list = Arc::clone(self);
        spawn_poller(every, Arc::clone(&self.closed), move || {
            let list = Arc::clone(&list);
            async move {
                list.resync().await;
            }
        })
    }
}

/// Sort ascending by id and drop repeated ids (first occurrence wins).
fn normalize<R: Resource>(mut rows: Vec<R>) -> Vec<R> {
    rows.sort_by_key(|r| r.id());
    let before = rows.len();
    rows.dedup_by_key(|r| r.id());
    if rows.len() != before {
        warn!(noun = R::NOUN, dropped = before - rows.len(), "duplicate ids in server response");
    }
    rows
}
