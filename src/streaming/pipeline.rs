//! Async fetch/decode pipeline with bounded concurrency
//!
//! Requests wait in a priority queue shared with a dispatcher task. The
//! dispatcher takes a semaphore permit, pops the best request and spawns a
//! task that fetches the bytes and decodes them on the blocking pool (or
//! parses them, for external tilesets). Finished work is sent back through an
//! unbounded channel and collected with [`FetchPipeline::drain`] once per
//! frame, so the caller never blocks on I/O.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::{Handle, Runtime};
use tokio::sync::{Notify, Semaphore, mpsc};
use tokio::task::JoinHandle;

use crate::core::{Error, Result, TileError};
use crate::tileset::{ContentRef, TileId, TilesetDocument};

use super::config::FetchOptions;
use super::fetch::{Decoder, Fetcher, LoadedContent};
use super::priority::{RequestHandle, RequestQueue, TilePriority};

/// What a request asks for
#[derive(Clone, Debug)]
pub struct FetchJob {
    pub tile: TileId,
    pub content: ContentRef,
}

/// Outcome of a request, delivered through [`FetchPipeline::drain`]
#[derive(Debug)]
pub enum Completion<P> {
    Loaded { handle: RequestHandle, tile: TileId, content: LoadedContent<P> },
    Failed { handle: RequestHandle, tile: TileId, error: TileError },
    /// Removed from the queue before it started
    Cancelled { handle: RequestHandle, tile: TileId },
}

impl<P> Completion<P> {
    pub fn handle(&self) -> RequestHandle {
        match self {
            Completion::Loaded { handle, .. }
            | Completion::Failed { handle, .. }
            | Completion::Cancelled { handle, .. } => *handle,
        }
    }

    pub fn tile(&self) -> TileId {
        match self {
            Completion::Loaded { tile, .. }
            | Completion::Failed { tile, .. }
            | Completion::Cancelled { tile, .. } => *tile,
        }
    }
}

/// State shared between the pipeline owner and the dispatcher
struct Shared {
    queue: Mutex<RequestQueue<FetchJob>>,
    /// Signalled whenever the queue gains work or the pipeline closes
    notify: Notify,
    /// Requests popped from the queue whose completion has not been sent
    in_flight: AtomicUsize,
    closed: AtomicBool,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, RequestQueue<FetchJob>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop the best request and count it as in flight under one lock, so
    /// idle checks never see it in neither place.
    fn take_next(&self) -> Option<(RequestHandle, FetchJob)> {
        let mut queue = self.queue();
        let next = queue.pop();
        if next.is_some() {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
        }
        next
    }
}

/// Everything a worker task needs
struct Workers<P> {
    fetcher: Arc<dyn Fetcher>,
    decoder: Arc<dyn Decoder<Payload = P>>,
    options: FetchOptions,
    outbox: mpsc::UnboundedSender<Completion<P>>,
}

impl<P> Clone for Workers<P> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            decoder: Arc::clone(&self.decoder),
            options: self.options.clone(),
            outbox: self.outbox.clone(),
        }
    }
}

/// Concurrent tile content loader
pub struct FetchPipeline<P: Send + 'static> {
    shared: Arc<Shared>,
    inbox: mpsc::UnboundedReceiver<Completion<P>>,
    /// Used to report cancellations in order with other completions
    outbox: mpsc::UnboundedSender<Completion<P>>,
    next_handle: u64,
    max_concurrent: usize,
    dispatcher: JoinHandle<()>,
    /// Present when the pipeline owns its runtime
    runtime: Option<Runtime>,
}

impl<P: Send + 'static> FetchPipeline<P> {
    /// Create a pipeline running on its own multi-threaded runtime
    ///
    /// # Arguments
    /// * `fetcher` - Source of content bytes
    /// * `decoder` - Turns bytes into resident payloads
    /// * `max_concurrent` - Maximum number of requests in flight
    /// * `options` - Forwarded to every fetch
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        decoder: Arc<dyn Decoder<Payload = P>>,
        max_concurrent: usize,
        options: FetchOptions,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("tile-fetch")
            .build()
            .map_err(|e| Error::Streaming(format!("failed to start fetch runtime: {e}")))?;
        let handle = runtime.handle().clone();
        let mut pipeline = Self::with_handle(&handle, fetcher, decoder, max_concurrent, options);
        pipeline.runtime = Some(runtime);
        Ok(pipeline)
    }

    /// Create a pipeline on an existing runtime
    pub fn with_handle(
        handle: &Handle,
        fetcher: Arc<dyn Fetcher>,
        decoder: Arc<dyn Decoder<Payload = P>>,
        max_concurrent: usize,
        options: FetchOptions,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let (outbox, inbox) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            queue: Mutex::new(RequestQueue::new()),
            notify: Notify::new(),
            in_flight: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });
        let workers = Workers { fetcher, decoder, options, outbox: outbox.clone() };
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let dispatcher = handle.spawn(Self::dispatch(Arc::clone(&shared), semaphore, workers));

        Self {
            shared,
            inbox,
            outbox,
            next_handle: 0,
            max_concurrent,
            dispatcher,
            runtime: None,
        }
    }

    /// Hands queued requests to worker tasks, at most one per permit
    async fn dispatch(shared: Arc<Shared>, semaphore: Arc<Semaphore>, workers: Workers<P>) {
        loop {
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                return;
            };
            let (handle, job) = loop {
                if shared.closed.load(Ordering::SeqCst) {
                    return;
                }
                // notify_one stores a wakeup when nobody is waiting, so a
                // submit between the pop and the await is not lost
                if let Some(next) = shared.take_next() {
                    break next;
                }
                shared.notify.notified().await;
            };

            let shared = Arc::clone(&shared);
            let workers = workers.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let completion = Self::run_job(handle, job, &workers).await;
                // Receiver is gone only when the pipeline was dropped
                let _ = workers.outbox.send(completion);
                shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }

    /// Fetch, then decode or parse a single request
    async fn run_job(handle: RequestHandle, job: FetchJob, workers: &Workers<P>) -> Completion<P> {
        let tile = job.tile;
        let bytes = match workers.fetcher.fetch(&job.content.uri, &workers.options).await {
            Ok(bytes) => bytes,
            Err(error) => return Completion::Failed { handle, tile, error },
        };

        if job.content.kind.is_tileset() {
            return match TilesetDocument::from_slice(&bytes) {
                Ok(document) => Completion::Loaded { handle, tile, content: LoadedContent::Tileset(document) },
                Err(e) => Completion::Failed { handle, tile, error: TileError::Parse(e) },
            };
        }

        let decoder = Arc::clone(&workers.decoder);
        let kind = job.content.kind;
        match tokio::task::spawn_blocking(move || decoder.decode(&bytes, &kind)).await {
            Ok(Ok(decoded)) => Completion::Loaded {
                handle,
                tile,
                content: LoadedContent::Renderable { payload: decoded.payload, byte_size: decoded.byte_size },
            },
            Ok(Err(error)) => Completion::Failed { handle, tile, error },
            Err(e) => Completion::Failed { handle, tile, error: TileError::Decode(format!("decoder task failed: {e}")) },
        }
    }

    /// Queue a request
    pub fn submit(&mut self, tile: TileId, content: ContentRef, priority: TilePriority) -> RequestHandle {
        let handle = RequestHandle(self.next_handle);
        self.next_handle += 1;
        self.shared.queue().push(handle, priority, FetchJob { tile, content });
        self.shared.notify.notify_one();
        handle
    }

    /// Re-rank a queued request
    ///
    /// Returns `false` once the request has started or finished.
    pub fn reprioritize(&self, handle: RequestHandle, priority: TilePriority) -> bool {
        self.shared.queue().update(handle, priority)
    }

    /// Cancel a request that has not started yet
    ///
    /// A [`Completion::Cancelled`] is delivered through [`drain`](Self::drain).
    /// Returns `false` if the request is already running; its completion will
    /// still arrive.
    pub fn cancel(&mut self, handle: RequestHandle) -> bool {
        let removed = self.shared.queue().remove(handle);
        match removed {
            Some(job) => {
                let _ = self.outbox.send(Completion::Cancelled { handle, tile: job.tile });
                true
            }
            None => false,
        }
    }

    /// Collect every completion delivered since the last call
    pub fn drain(&mut self) -> Vec<Completion<P>> {
        let mut completions = Vec::new();
        while let Ok(completion) = self.inbox.try_recv() {
            completions.push(completion);
        }
        completions
    }

    /// Number of requests waiting for a slot
    pub fn queued(&self) -> usize {
        self.shared.queue().len()
    }

    /// Number of requests currently being fetched or decoded
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// True when nothing is queued or running
    pub fn is_idle(&self) -> bool {
        let queue = self.shared.queue();
        queue.is_empty() && self.shared.in_flight.load(Ordering::SeqCst) == 0
    }

    /// Block the calling thread until the pipeline is idle
    ///
    /// Returns `false` if `timeout` elapsed first. Must not be called from a
    /// thread of the pipeline's runtime.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Stop dispatching and drop every queued request
    ///
    /// Requests already running finish in the background; their results are
    /// discarded.
    pub fn shutdown(&mut self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let dropped = self.shared.queue().clear();
        if !dropped.is_empty() {
            log::debug!("Fetch pipeline shut down with {} queued requests", dropped.len());
        }
        self.shared.notify.notify_one();
        self.dispatcher.abort();
    }
}

impl<P: Send + 'static> Drop for FetchPipeline<P> {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
