//! # Reactor and Serialized Regions
//!
//! The [`Reactor`] owns the worker thread pool that services every
//! asynchronous socket operation in the process. A [`Region`] is a serialized
//! execution region layered on top of it: jobs posted to one region run
//! strictly one at a time, in post order, even though the underlying workers
//! run in parallel. Connections and listeners use their region as the sole
//! synchronization primitive for user callbacks, so no additional locking is
//! needed for state touched only from region jobs.

use std::sync::Mutex;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::{TransportConfig, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::error::Result;

/// Process-wide asynchronous I/O engine.
///
/// Wraps a multi-threaded runtime with an explicit stop. Entities bound to a
/// reactor (regions, connections, listeners) must not be used after
/// [`stop`](Reactor::stop) returns.
pub struct Reactor {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
}

impl Reactor {
    /// Start a reactor with the given number of worker threads.
    ///
    /// A request for zero workers is promoted to one; a pool of zero threads
    /// could never make progress.
    pub fn new(worker_threads: usize) -> Result<Self> {
        let workers = worker_threads.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .enable_io()
            .enable_time()
            .thread_name("transport-worker")
            .build()?;
        let handle = runtime.handle().clone();
        debug!(workers, "reactor started");
        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
        })
    }

    /// Start a reactor sized by a [`TransportConfig`].
    pub fn from_config(config: &TransportConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.worker_threads)
    }

    /// Handle for spawning work onto this reactor.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Stop the reactor: cancel pending operations and join the workers.
    ///
    /// Idempotent. Blocks up to [`DEFAULT_SHUTDOWN_TIMEOUT`] for in-flight
    /// work before forcing shutdown. Must not be called from a reactor
    /// worker thread; dropping the reactor there is safe and falls back to
    /// a non-blocking background shutdown instead of joining.
    ///
    /// [`DEFAULT_SHUTDOWN_TIMEOUT`]: crate::config::DEFAULT_SHUTDOWN_TIMEOUT
    pub fn stop(&self) {
        if let Some(runtime) = self.take_runtime() {
            debug!("stopping reactor");
            runtime.shutdown_timeout(DEFAULT_SHUTDOWN_TIMEOUT);
        }
    }

    fn take_runtime(&self) -> Option<Runtime> {
        match self.runtime.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        if let Some(runtime) = self.take_runtime() {
            // A runtime cannot be shut down synchronously from one of its
            // own workers; fall back to a non-blocking shutdown there.
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(DEFAULT_SHUTDOWN_TIMEOUT);
            }
        }
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A serialized execution region bound to a [`Reactor`].
///
/// `post` enqueues a job onto a single-consumer queue drained by one driver
/// task, so jobs from the same region never overlap and run in the order
/// they were enqueued, which is the strand guarantee. Clones share the same queue
/// and therefore the same serialization domain.
///
/// Jobs run directly on a worker thread and must not block; anything that
/// needs to wait should instead post a continuation.
#[derive(Clone)]
pub struct Region {
    handle: Handle,
    jobs: mpsc::UnboundedSender<Job>,
}

impl Region {
    /// Create a new region on the given reactor.
    pub fn new(reactor: &Reactor) -> Self {
        Self::with_handle(reactor.handle().clone())
    }

    pub(crate) fn with_handle(handle: Handle) -> Self {
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        handle.spawn(async move {
            while let Some(job) = queue.recv().await {
                job();
            }
        });
        Self { handle, jobs }
    }

    /// Schedule a job after all previously posted jobs on this region.
    ///
    /// Jobs posted after the owning reactor has stopped are dropped.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.jobs.send(Box::new(job));
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }
}
