//! Application lifecycle.
//!
//! An [`App`] owns the event loop pool and the set of servers. `run` starts
//! everything and blocks until `stop` completes, whether `stop` came from a
//! signal, another thread, or drop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::loop_pool::IoLoopPool;
use super::signal;
use crate::logging;
use crate::status::Result;

/// Anything the app can start and stop around its own lifecycle.
pub trait Server: Send + Sync {
    fn start(&self);
    fn stop(&self);
}

/// Application options.
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Number of event loops; 0 means hardware concurrency (floor 1).
    pub io_threads: usize,
    pub log_level: String,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            io_threads: 0,
            log_level: "info".to_string(),
        }
    }
}

pub(crate) struct AppShared {
    pool: IoLoopPool,
    servers: Mutex<Vec<Arc<dyn Server>>>,
    stop_requested: AtomicBool,
    stopped: Mutex<bool>,
    stopped_cv: Condvar,
}

impl AppShared {
    /// Stop servers, then the loop pool, then wake `run`. Only the first
    /// caller does the work.
    pub(crate) fn stop(&self) {
        if self
            .stop_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        tracing::info!("stopping app");
        for server in self.servers.lock().iter() {
            server.stop();
        }
        self.pool.stop();

        let mut stopped = self.stopped.lock();
        *stopped = true;
        self.stopped_cv.notify_all();
        tracing::info!("stopped");
    }
}

/// The application runtime.
pub struct App {
    shared: Arc<AppShared>,
}

impl App {
    pub fn new(options: AppOptions) -> Result<App> {
        logging::init(&options.log_level);

        let threads = if options.io_threads == 0 {
            num_cpus::get().max(1)
        } else {
            options.io_threads
        };
        let pool = IoLoopPool::new(threads)?;

        Ok(App {
            shared: Arc::new(AppShared {
                pool,
                servers: Mutex::new(Vec::new()),
                stop_requested: AtomicBool::new(false),
                stopped: Mutex::new(false),
                stopped_cv: Condvar::new(),
            }),
        })
    }

    /// The event loop pool.
    pub fn io(&self) -> &IoLoopPool {
        &self.shared.pool
    }

    /// Register a server. Call before [`App::run`].
    pub fn add_server(&self, server: Arc<dyn Server>) {
        self.shared.servers.lock().push(server);
    }

    /// Start loops and servers, then block until [`App::stop`] completes.
    /// Returns the process exit code.
    pub fn run(&self) -> i32 {
        let registered = signal::register(&self.shared);

        self.shared.pool.start();
        for server in self.shared.servers.lock().iter() {
            server.start();
        }

        {
            let mut stopped = self.shared.stopped.lock();
            while !*stopped {
                self.shared.stopped_cv.wait(&mut stopped);
            }
        }

        if registered {
            signal::deregister(&self.shared);
        }
        0
    }

    /// Request shutdown. Idempotent; safe from any thread, including the
    /// signal handler.
    pub fn stop(&self) {
        self.shared.stop();
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.shared.stop();
        signal::deregister(&self.shared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingServer {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl CountingServer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
            })
        }
    }

    impl Server for CountingServer {
        fn start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn run_blocks_until_stop() {
        let app = App::new(AppOptions {
            io_threads: 1,
            ..Default::default()
        })
        .unwrap();
        let server = CountingServer::new();
        app.add_server(server.clone());

        let shared = Arc::clone(&app.shared);
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            shared.stop();
            shared.stop(); // idempotent
        });

        assert_eq!(app.run(), 0);
        stopper.join().unwrap();

        assert_eq!(server.starts.load(Ordering::SeqCst), 1);
        assert_eq!(server.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_io_threads_defaults_to_hardware_concurrency() {
        let app = App::new(AppOptions::default()).unwrap();
        assert!(app.io().len() >= 1);
        app.stop();
    }
}
