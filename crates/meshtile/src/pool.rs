//! Fixed-size pool of decode workers.
//!
//! Each worker is a dedicated thread with its own parser and inbound queue.
//! Workers report back over one shared event channel, drained by a router
//! thread that tracks readiness and resolves pending requests.
//!
//! Acquisition is round-robin and never waits: a busy worker simply queues
//! more requests. Replies are matched by `(client, request)` id, never by
//! arrival order.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::sync::watch;

use crate::client::PoolClient;
use crate::correlator::PendingRequests;
use crate::error::{Error, Result};
use crate::mesh::DecodedTile;
use crate::message::{ClientId, DecodeRequest, WorkerEvent, WorkerMessage, WorkerRequest};
use crate::parser::ParserFactory;
use crate::worker::{self, WorkerContext};

/// Worker count used when the host cannot report its parallelism.
const FALLBACK_PARALLELISM: usize = 4;

/// Clamp a requested worker count to `[1, available parallelism]`.
#[must_use]
pub fn clamp_pool_size(requested: usize) -> usize {
    let available =
        thread::available_parallelism().map_or(FALLBACK_PARALLELISM, NonZeroUsize::get);
    requested.clamp(1, available)
}

/// Configuration for a [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    size: usize,
    thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 1,
            thread_name_prefix: "meshtile-worker".to_owned(),
        }
    }
}

impl PoolConfig {
    /// Set the number of workers, clamped to the host's parallelism.
    #[must_use]
    pub fn size(mut self, workers: usize) -> Self {
        self.size = clamp_pool_size(workers);
        self
    }

    /// Prefix for worker thread names; the slot number is appended.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.size
    }
}

/// Lifecycle of one pooled worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    /// Spawned, still loading its decode dependencies.
    Uninitialized,
    /// Accepting requests.
    Ready,
    /// Booting failed; the worker is never used again.
    Failed(String),
    /// The pool was released.
    Terminated,
}

impl WorkerState {
    fn is_usable(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Ready)
    }
}

/// Handle to one pool member, as returned by [`WorkerPool::acquire_worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerHandle {
    slot: usize,
}

impl WorkerHandle {
    #[must_use]
    pub fn slot(self) -> usize {
        self.slot
    }
}

#[derive(Debug)]
struct WorkerSlot {
    inbox: async_channel::Sender<WorkerRequest>,
    terminated: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct PoolThreads {
    workers: Vec<JoinHandle<()>>,
    router: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct PoolInner {
    workers: Vec<WorkerSlot>,
    states: Arc<[watch::Sender<WorkerState>]>,
    pending: Arc<PendingRequests>,
    cursor: AtomicUsize,
    next_client: AtomicU64,
    released: AtomicBool,
    threads: Mutex<PoolThreads>,
}

impl PoolInner {
    /// Stop accepting work and tell every worker to exit.
    fn signal_shutdown(&self) {
        self.released.store(true, Ordering::Release);
        for (worker, state) in self.workers.iter().zip(self.states.iter()) {
            worker.terminated.store(true, Ordering::Release);
            worker.inbox.close();
            state.send_replace(WorkerState::Terminated);
        }
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        if !self.released.load(Ordering::Acquire) {
            self.signal_shutdown();
        }
    }
}

/// A fixed set of decode workers plus the pending-request table.
///
/// Cloning is cheap and yields another handle to the same pool.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Spawn `config.pool_size()` workers, each booting a parser from
    /// `factory` on its own thread.
    pub fn new(config: PoolConfig, factory: impl ParserFactory) -> Result<Self> {
        let factory: Arc<dyn ParserFactory> = Arc::new(factory);
        let size = config.size.max(1);
        let (events_tx, events_rx) = async_channel::unbounded();

        let mut workers = Vec::with_capacity(size);
        let mut states = Vec::with_capacity(size);
        let mut threads = PoolThreads::default();

        for slot in 0..size {
            let (inbox_tx, inbox_rx) = async_channel::unbounded();
            let terminated = Arc::new(AtomicBool::new(false));
            let context = WorkerContext {
                slot,
                factory: Arc::clone(&factory),
                inbox: inbox_rx,
                events: events_tx.clone(),
                terminated: Arc::clone(&terminated),
            };
            let name = format!("{}-{}", config.thread_name_prefix, slot);
            threads.workers.push(worker::spawn(name, context)?);

            workers.push(WorkerSlot {
                inbox: inbox_tx,
                terminated,
            });
            states.push(watch::Sender::new(WorkerState::Uninitialized));
        }
        // Only workers hold event senders, so the router stops once they exit.
        drop(events_tx);

        let states: Arc<[watch::Sender<WorkerState>]> = states.into();
        let pending = Arc::new(PendingRequests::default());

        let router = {
            let states = Arc::clone(&states);
            let pending = Arc::clone(&pending);
            thread::Builder::new()
                .name(format!("{}-router", config.thread_name_prefix))
                .spawn(move || route_events(&events_rx, &states, &pending))?
        };
        threads.router = Some(router);

        tracing::info!("Started worker pool with {} workers", size);

        Ok(Self {
            inner: Arc::new(PoolInner {
                workers,
                states,
                pending,
                cursor: AtomicUsize::new(0),
                next_client: AtomicU64::new(0),
                released: AtomicBool::new(false),
                threads: Mutex::new(threads),
            }),
        })
    }

    /// Number of workers, usable or not.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.workers.len()
    }

    /// Snapshot of every worker's lifecycle state, by slot.
    #[must_use]
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.inner
            .states
            .iter()
            .map(|state| state.borrow().clone())
            .collect()
    }

    /// Number of submitted requests still waiting for a reply.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Wait until every worker has finished booting.
    ///
    /// Returns the number of ready workers, or the first boot failure. A
    /// failed worker is skipped by [`acquire_worker`](Self::acquire_worker),
    /// so the pool stays usable with the remaining workers.
    pub async fn wait_ready(&self) -> Result<usize> {
        let mut ready = 0;
        let mut failure = None;

        for (slot, state) in self.inner.states.iter().enumerate() {
            match settled_state(state).await? {
                WorkerState::Ready => ready += 1,
                WorkerState::Failed(message) => {
                    failure.get_or_insert(Error::WorkerBoot { slot, message });
                }
                WorkerState::Uninitialized | WorkerState::Terminated => {
                    return Err(Error::PoolTerminated);
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(ready),
        }
    }

    /// Pick the next usable worker in round-robin order.
    ///
    /// Does not block and does not consider load.
    pub fn acquire_worker(&self) -> Result<WorkerHandle> {
        if self.inner.released.load(Ordering::Acquire) {
            return Err(Error::PoolTerminated);
        }
        let count = self.size();
        for _ in 0..count {
            let slot = self.inner.cursor.fetch_add(1, Ordering::Relaxed) % count;
            if self.inner.states[slot].borrow().is_usable() {
                return Ok(WorkerHandle { slot });
            }
        }
        Err(Error::NoUsableWorkers)
    }

    /// Send `request` to `worker` and wait for the matching reply.
    ///
    /// Waits for the worker's ready handshake first. The request buffer is
    /// moved to the worker. Dropping the returned future abandons the
    /// request: the worker still finishes it, but the reply is discarded.
    pub async fn submit(&self, worker: WorkerHandle, request: DecodeRequest) -> Result<DecodedTile> {
        let slot = worker.slot;
        let (inbox, state) = self
            .inner
            .workers
            .get(slot)
            .map(|w| &w.inbox)
            .zip(self.inner.states.get(slot))
            .ok_or(Error::UnknownWorker(slot))?;

        match settled_state(state).await? {
            WorkerState::Ready => {}
            WorkerState::Failed(message) => return Err(Error::WorkerBoot { slot, message }),
            WorkerState::Uninitialized | WorkerState::Terminated => {
                return Err(Error::PoolTerminated);
            }
        }

        let reply = self.inner.pending.register(request.key())?;
        if self.inner.released.load(Ordering::Acquire) {
            return Err(Error::PoolTerminated);
        }
        tracing::trace!(
            slot,
            client = request.client_id.0,
            request = request.request_id,
            bytes = request.buffer.len(),
            "submitting tile"
        );
        self.dispatch(slot, inbox, request).await?;

        reply.wait().await
    }

    /// Queue `request` on a worker inbox. A closed inbox on a released pool
    /// is reported as termination.
    async fn dispatch(
        &self,
        slot: usize,
        inbox: &async_channel::Sender<WorkerRequest>,
        request: DecodeRequest,
    ) -> Result<()> {
        inbox
            .send(WorkerRequest::DecodeTile(request))
            .await
            .map_err(|_| {
                if self.inner.released.load(Ordering::Acquire) {
                    Error::PoolTerminated
                } else {
                    Error::ChannelClosed(slot)
                }
            })
    }

    /// Create a logical client with its own request id sequence.
    #[must_use]
    pub fn client(&self) -> PoolClient {
        let id = ClientId(self.inner.next_client.fetch_add(1, Ordering::Relaxed));
        PoolClient::new(self.clone(), id)
    }

    /// Terminate every worker.
    ///
    /// Requests still pending complete with [`Error::PoolTerminated`].
    /// Blocks until each worker has finished the request it is currently
    /// processing.
    pub fn release(&self) {
        if self.inner.released.load(Ordering::Acquire) {
            return;
        }
        self.inner.signal_shutdown();
        let abandoned = self.inner.pending.clear();

        let threads = std::mem::take(
            &mut *self
                .inner
                .threads
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in threads.workers {
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked during shutdown");
            }
        }
        if let Some(router) = threads.router {
            let _ = router.join();
        }

        tracing::info!(
            "Released worker pool ({} pending requests abandoned)",
            abandoned
        );
    }
}

/// Wait for a worker to leave `Uninitialized`.
async fn settled_state(state: &watch::Sender<WorkerState>) -> Result<WorkerState> {
    let mut rx = state.subscribe();
    let settled = rx
        .wait_for(|s| *s != WorkerState::Uninitialized)
        .await
        .map_err(|_| Error::PoolTerminated)?;
    Ok(settled.clone())
}

fn route_events(
    events: &async_channel::Receiver<WorkerEvent>,
    states: &[watch::Sender<WorkerState>],
    pending: &PendingRequests,
) {
    while let Ok(WorkerEvent { slot, message }) = events.recv_blocking() {
        let Some(state) = states.get(slot) else {
            continue;
        };
        match message {
            WorkerMessage::Ready => {
                state.send_if_modified(|s| {
                    let boot = *s == WorkerState::Uninitialized;
                    if boot {
                        *s = WorkerState::Ready;
                    }
                    boot
                });
            }
            WorkerMessage::BootFailed { error } => {
                tracing::error!("Worker {} is unusable: {}", slot, error);
                state.send_if_modified(|s| {
                    let boot = *s == WorkerState::Uninitialized;
                    if boot {
                        *s = WorkerState::Failed(error);
                    }
                    boot
                });
            }
            WorkerMessage::Response(response) => {
                let (client, request) = (response.client_id, response.request_id);
                if !pending.resolve(response) {
                    tracing::warn!(
                        "Dropping unmatched reply for request {} from client {}",
                        request,
                        client
                    );
                }
            }
        }
    }
    tracing::debug!("Worker event router stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::ParsedTile;

    fn empty_parser() -> Result<fn(Vec<u8>, &str) -> Result<ParsedTile>> {
        Ok(|_, _| Ok(ParsedTile::default()))
    }

    fn request() -> DecodeRequest {
        DecodeRequest {
            request_id: 0,
            client_id: ClientId(0),
            buffer: Vec::new(),
            source_path: String::new(),
        }
    }

    #[test]
    fn pool_size_is_clamped_to_host_parallelism() {
        let available =
            thread::available_parallelism().map_or(FALLBACK_PARALLELISM, NonZeroUsize::get);

        assert_eq!(clamp_pool_size(0), 1);
        assert_eq!(clamp_pool_size(1), 1);
        assert_eq!(clamp_pool_size(usize::MAX), available);
        assert_eq!(clamp_pool_size(available), available);
    }

    #[test]
    fn config_defaults_to_one_worker() {
        let config = PoolConfig::default();
        assert_eq!(config.pool_size(), 1);
        assert_eq!(config.size(0).pool_size(), 1);
        assert_eq!(
            PoolConfig::default().size(usize::MAX).pool_size(),
            clamp_pool_size(usize::MAX)
        );
    }

    #[tokio::test]
    async fn closed_inbox_after_release_reports_termination() {
        let pool = WorkerPool::new(PoolConfig::default(), empty_parser).unwrap();
        pool.wait_ready().await.unwrap();

        // Shutdown lands between the submit checks and the send.
        pool.inner.signal_shutdown();
        let inbox = &pool.inner.workers[0].inbox;
        assert!(matches!(
            pool.dispatch(0, inbox, request()).await,
            Err(Error::PoolTerminated)
        ));
    }

    #[tokio::test]
    async fn closed_inbox_on_live_pool_is_a_channel_error() {
        let pool = WorkerPool::new(PoolConfig::default(), empty_parser).unwrap();
        pool.wait_ready().await.unwrap();

        let inbox = &pool.inner.workers[0].inbox;
        inbox.close();
        assert!(matches!(
            pool.dispatch(0, inbox, request()).await,
            Err(Error::ChannelClosed(0))
        ));
        pool.release();
    }
}
