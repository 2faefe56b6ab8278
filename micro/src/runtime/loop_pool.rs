//! Pool of single-threaded event loops.
//!
//! Each loop is a current-thread Tokio runtime driven by one dedicated
//! worker thread. The worker parks inside `block_on` on a shutdown signal,
//! which doubles as the work keeper: while the wait is pending the loop keeps
//! running ready tasks, and notifying it releases the loop for shutdown.
//!
//! Connections and acceptors are spawned onto a loop through its handle; a
//! current-thread runtime runs all of its tasks on the one worker, so
//! callbacks for a given connection never run concurrently.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Notify;

use crate::status::{Result, Status};

/// One single-threaded event loop.
pub struct IoLoop {
    runtime: Arc<Runtime>,
    shutdown: Arc<Notify>,
}

impl IoLoop {
    fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Status::internal_error(format!("failed to build event loop: {e}")))?;
        Ok(Self {
            runtime: Arc::new(runtime),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Handle for spawning work onto this loop.
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }
}

/// Fixed-size pool of event loops with a round-robin cursor.
pub struct IoLoopPool {
    loops: Vec<IoLoop>,
    cursor: AtomicUsize,
    started: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for IoLoopPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoLoopPool")
            .field("loops", &self.loops.len())
            .field("cursor", &self.cursor.load(Ordering::Relaxed))
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}

impl IoLoopPool {
    /// Build a pool of `threads` loops. Zero loops is an invalid
    /// configuration.
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 0 {
            return Err(Status::invalid_argument("io loop pool needs at least one loop"));
        }

        let mut loops = Vec::with_capacity(threads);
        for _ in 0..threads {
            loops.push(IoLoop::new()?);
        }

        Ok(Self {
            loops,
            cursor: AtomicUsize::new(0),
            started: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// Pick the next loop round-robin. Relaxed: concurrent callers each get
    /// some loop, with no ordering guarantee between them.
    pub fn next(&self) -> &IoLoop {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.loops.len();
        &self.loops[idx]
    }

    /// Spawn one worker thread per loop. Idempotent.
    pub fn start(&self) {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let mut workers = self.workers.lock();
        for (i, io_loop) in self.loops.iter().enumerate() {
            let runtime = Arc::clone(&io_loop.runtime);
            let shutdown = Arc::clone(&io_loop.shutdown);
            let worker = std::thread::Builder::new()
                .name(format!("io-loop-{i}"))
                .spawn(move || {
                    runtime.block_on(async move {
                        shutdown.notified().await;
                    });
                })
                .expect("failed to spawn io loop worker");
            workers.push(worker);
        }
    }

    /// Release the work keepers, signal every loop, and join every worker.
    /// Idempotent.
    pub fn stop(&self) {
        if self
            .started
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        for io_loop in &self.loops {
            io_loop.shutdown.notify_one();
        }

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            let _ = worker.join();
        }
    }
}

impl Drop for IoLoopPool {
    fn drop(&mut self) {
        self.stop();
    }
}
