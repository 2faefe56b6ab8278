//! Worker threads driving keep-alive connections against the target.

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::metrics::LatencyHistogram;

/// Test phase, controlled by the main thread and read by workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Run the workload but don't record metrics.
    Warmup = 0,
    /// Main measurement phase.
    Running = 1,
    /// Workers should exit.
    Stop = 2,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Phase::Warmup,
            1 => Phase::Running,
            _ => Phase::Stop,
        }
    }

    pub fn is_recording(self) -> bool {
        self == Phase::Running
    }

    pub fn should_stop(self) -> bool {
        self == Phase::Stop
    }
}

/// Shared state between workers and the main thread.
pub struct SharedState {
    phase: AtomicU8,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Warmup as u8),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }
}

/// Per-worker configuration.
#[derive(Clone)]
pub struct WorkerConfig {
    pub host: String,
    pub port: u16,
    pub request: Arc<Vec<u8>>,
    pub connections: usize,
    pub timeout: Duration,
}

/// Run one worker: a single-threaded loop driving `connections` concurrent
/// keep-alive connections.
pub fn run_worker(config: WorkerConfig, shared: Arc<SharedState>, hist: Arc<LatencyHistogram>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build loadgen runtime");

    runtime.block_on(async move {
        let mut tasks = Vec::with_capacity(config.connections);
        for _ in 0..config.connections {
            let config = config.clone();
            let shared = Arc::clone(&shared);
            let hist = Arc::clone(&hist);
            tasks.push(tokio::spawn(drive_connection(config, shared, hist)));
        }
        for task in tasks {
            let _ = task.await;
        }
    });
}

async fn drive_connection(
    config: WorkerConfig,
    shared: Arc<SharedState>,
    hist: Arc<LatencyHistogram>,
) {
    'reconnect: while !shared.phase().should_stop() {
        let connect = timeout(
            config.timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await;

        let mut stream = match connect {
            Ok(Ok(stream)) => stream,
            _ => {
                if shared.phase().is_recording() {
                    hist.record_err();
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };

        loop {
            let phase = shared.phase();
            if phase.should_stop() {
                return;
            }

            let start = Instant::now();
            match timeout(config.timeout, one_request(&mut stream, &config.request)).await {
                Ok(Ok(bytes_in)) => {
                    if phase.is_recording() {
                        hist.record_ok(start.elapsed().as_micros() as u64, bytes_in);
                    }
                }
                _ => {
                    if phase.is_recording() {
                        hist.record_err();
                    }
                    continue 'reconnect;
                }
            }
        }
    }
}

/// Send one request and read one full response; returns bytes received.
async fn one_request(stream: &mut TcpStream, request: &[u8]) -> io::Result<u64> {
    stream.write_all(request).await?;

    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let content_length = content_length(&buf[..pos])?;
            let total = pos + 4 + content_length;
            while buf.len() < total {
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "closed mid-body",
                    ));
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return Ok(total as u64);
        }

        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "closed before response head",
            ));
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn content_length(head: &[u8]) -> io::Result<usize> {
    let head = std::str::from_utf8(head)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "head not utf-8"))?;
    for line in head.split("\r\n").skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                return value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad content-length"));
            }
        }
    }
    Ok(0)
}
