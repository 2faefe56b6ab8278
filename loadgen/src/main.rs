//! HTTP load generator.
//!
//! Drives a fixed number of keep-alive connections at a target endpoint,
//! warms up, measures for a fixed duration, and prints a latency and
//! throughput summary.

mod metrics;
mod worker;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use metrics::LatencyHistogram;
use worker::{Phase, SharedState, WorkerConfig};

#[derive(Parser)]
#[command(name = "http-loadgen")]
#[command(about = "Fixed-duration HTTP load generator")]
struct Args {
    /// Target host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Target port
    #[arg(long, default_value_t = 8087)]
    port: u16,

    /// Request target (path and query)
    #[arg(long, default_value = "/get?key=hot")]
    target: String,

    /// Worker threads
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Total concurrent connections
    #[arg(long, default_value_t = 128)]
    concurrency: usize,

    /// Warmup seconds (not recorded)
    #[arg(long, value_name = "SEC", default_value_t = 2)]
    warmup: u64,

    /// Measurement seconds
    #[arg(long, value_name = "SEC", default_value_t = 10)]
    duration: u64,

    /// Per-request timeout in milliseconds
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let threads = args.threads.max(1);
    let concurrency = args.concurrency.max(1);

    let request = Arc::new(
        format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: http-loadgen/0.1\r\n\r\n",
            args.target, args.host
        )
        .into_bytes(),
    );

    let shared = Arc::new(SharedState::new());
    let hist = Arc::new(LatencyHistogram::new());

    tracing::info!(
        "target http://{}:{}{} threads={} connections={} warmup={}s duration={}s",
        args.host,
        args.port,
        args.target,
        threads,
        concurrency,
        args.warmup,
        args.duration
    );

    let mut handles = Vec::with_capacity(threads);
    for worker_id in 0..threads {
        // Spread the connection count over the workers.
        let connections = concurrency / threads + usize::from(worker_id < concurrency % threads);
        if connections == 0 {
            continue;
        }

        let config = WorkerConfig {
            host: args.host.clone(),
            port: args.port,
            request: Arc::clone(&request),
            connections,
            timeout: Duration::from_millis(args.timeout_ms),
        };
        let shared = Arc::clone(&shared);
        let hist = Arc::clone(&hist);

        let handle = thread::Builder::new()
            .name(format!("loadgen-{worker_id}"))
            .spawn(move || worker::run_worker(config, shared, hist))
            .expect("failed to spawn worker thread");
        handles.push(handle);
    }

    thread::sleep(Duration::from_secs(args.warmup));
    hist.reset();
    shared.set_phase(Phase::Running);
    let measure_start = Instant::now();

    thread::sleep(Duration::from_secs(args.duration));
    shared.set_phase(Phase::Stop);
    let elapsed = measure_start.elapsed();

    for handle in handles {
        let _ = handle.join();
    }

    print_summary(&hist.snapshot(), elapsed);
}

fn print_summary(snapshot: &metrics::Snapshot, elapsed: Duration) {
    let secs = elapsed.as_secs_f64().max(f64::MIN_POSITIVE);
    let rps = snapshot.ok as f64 / secs;
    let mbps = snapshot.bytes as f64 / secs / 1_000_000.0;

    println!("duration:    {:.2}s", secs);
    println!("requests ok: {}", snapshot.ok);
    println!("errors:      {}", snapshot.err);
    println!("throughput:  {:.0} req/s, {:.2} MB/s in", rps, mbps);
    println!(
        "latency:     p50 <= {}us, p90 <= {}us, p99 <= {}us",
        snapshot.approx_percentile_us(0.50),
        snapshot.approx_percentile_us(0.90),
        snapshot.approx_percentile_us(0.99)
    );
}
