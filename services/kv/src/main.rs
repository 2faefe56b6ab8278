//! Sharded in-memory key-value service.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use clap::Parser;
use parking_lot::RwLock;

use chmicro::http::{HttpServer, ListenAddress, Router};
use chmicro::metrics;
use chmicro::runtime::{App, AppOptions};

#[derive(Parser)]
#[command(name = "kv-service")]
#[command(about = "Sharded in-memory KV store over chmicro")]
struct Args {
    /// Address to listen on
    #[arg(long, value_name = "host:port", default_value = "0.0.0.0:8087")]
    listen: ListenAddress,

    /// Number of event loops (0 = hardware concurrency)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Log level
    #[arg(long, default_value = "info")]
    log: String,

    /// Number of store shards
    #[arg(long, default_value_t = 64)]
    shards: usize,

    /// Maximum accepted value size in bytes
    #[arg(long = "max-value", value_name = "BYTES", default_value_t = 4096)]
    max_value: usize,
}

/// Keyspace split over independently locked shards.
struct ShardedKvStore {
    shards: Vec<RwLock<HashMap<String, String>>>,
}

impl ShardedKvStore {
    fn new(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    fn put(&self, key: String, value: String) {
        let shard = &self.shards[self.shard_index(&key)];
        shard.write().insert(key, value);
    }

    fn get(&self, key: &str) -> Option<String> {
        let shard = &self.shards[self.shard_index(key)];
        shard.read().get(key).cloned()
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }
}

/// Deterministic xorshift workload for the /compute endpoint.
fn cpu_burn(iters: u64) -> u64 {
    let mut sink = 0u64;
    let mut x = 0x9e37_79b9_7f4a_7c15u64;
    for _ in 0..iters {
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        sink ^= x.wrapping_mul(0x2545_f491_4f6c_dd1d);
    }
    sink
}

fn json_field<'a>(root: &'a serde_json::Value, key: &str) -> &'a str {
    root.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

fn build_router(store: Arc<ShardedKvStore>, max_value: usize) -> Router {
    let mut router = Router::new();

    router.get("/health", |_req, resp| {
        resp.status = 200;
        resp.body = b"ok".to_vec();
    });

    // GET /stats
    {
        let store = Arc::clone(&store);
        router.get("/stats", move |_req, resp| {
            let body = serde_json::json!({ "keys": store.len() });
            resp.set_json(body.to_string());
        });
    }

    // GET /get?key=foo
    {
        let store = Arc::clone(&store);
        router.get("/get", move |req, resp| {
            let key = req.query("key");
            if key.is_empty() {
                resp.status = 400;
                resp.set_json(
                    serde_json::json!({ "error": "missing query param: key" }).to_string(),
                );
                return;
            }

            match store.get(key) {
                Some(value) => {
                    let body = serde_json::json!({
                        "key": key,
                        "value": value,
                        "traceparent": req.trace.to_traceparent(),
                    });
                    resp.set_json(body.to_string());
                }
                None => {
                    resp.status = 404;
                    resp.set_json(
                        serde_json::json!({ "error": "not found", "key": key }).to_string(),
                    );
                }
            }
        });
    }

    // POST /put  {"key":"k","value":"v"}
    {
        let store = Arc::clone(&store);
        router.post("/put", move |req, resp| {
            let root: serde_json::Value = match serde_json::from_slice(&req.body) {
                Ok(v @ serde_json::Value::Object(_)) => v,
                _ => {
                    resp.status = 400;
                    resp.set_json(serde_json::json!({ "error": "invalid json" }).to_string());
                    return;
                }
            };

            let key = json_field(&root, "key");
            let value = json_field(&root, "value");
            if key.is_empty() {
                resp.status = 400;
                resp.set_json(serde_json::json!({ "error": "missing field: key" }).to_string());
                return;
            }
            if value.len() > max_value {
                resp.status = 413;
                resp.set_json(
                    serde_json::json!({ "error": "value too large", "max": max_value })
                        .to_string(),
                );
                return;
            }

            store.put(key.to_string(), value.to_string());
            resp.set_json(serde_json::json!({ "ok": true }).to_string());
        });
    }

    // CPU workload endpoint: GET /compute?iters=100000
    router.get("/compute", |req, resp| {
        let iters = req.query("iters").parse::<u64>().unwrap_or(10_000);
        cpu_burn(iters);
        resp.set_json(serde_json::json!({ "ok": true, "iters": iters }).to_string());
    });

    router.get("/metrics", |_req, resp| {
        resp.status = 200;
        resp.content_type = "text/plain; version=0.0.4; charset=utf-8".to_string();
        resp.body = metrics::default_registry().to_prometheus_text().into_bytes();
    });

    router
}

fn main() {
    let args = Args::parse();

    let app = match App::new(AppOptions {
        io_threads: args.threads,
        log_level: args.log,
    }) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("failed to start: {e}");
            std::process::exit(1);
        }
    };

    let store = Arc::new(ShardedKvStore::new(args.shards));
    let router = build_router(store, args.max_value);

    let server = HttpServer::new(app.io().next(), args.listen.clone(), router);
    app.add_server(server);

    tracing::info!(
        "kv service: http://{} (shards={}, max_value={})",
        args.listen,
        args.shards,
        args.max_value
    );
    tracing::info!("press ctrl-c to stop");
    std::process::exit(app.run());
}
