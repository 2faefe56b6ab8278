//! Hello-world service.

use clap::Parser;

use chmicro::http::{HttpServer, ListenAddress, Router};
use chmicro::metrics;
use chmicro::runtime::{App, AppOptions};

#[derive(Parser)]
#[command(name = "hello-service")]
#[command(about = "Minimal chmicro example service")]
struct Args {
    /// Address to listen on
    #[arg(long, value_name = "host:port", default_value = "0.0.0.0:8086")]
    listen: ListenAddress,

    /// Number of event loops (0 = hardware concurrency)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Log level
    #[arg(long, default_value = "info")]
    log: String,
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

    let mut router = Router::new();

    router.get("/health", |_req, resp| {
        resp.status = 200;
        resp.body = b"ok".to_vec();
    });

    router.get("/hello", |req, resp| {
        let name = req.query("name");
        let name = if name.is_empty() { "world" } else { name };

        let body = serde_json::json!({
            "message": format!("hello, {name}"),
            "traceparent": req.trace.to_traceparent(),
        });
        resp.set_json(body.to_string());
    });

    router.get("/metrics", |_req, resp| {
        resp.status = 200;
        resp.content_type = "text/plain; version=0.0.4; charset=utf-8".to_string();
        resp.body = metrics::default_registry().to_prometheus_text().into_bytes();
    });

    let server = HttpServer::new(app.io().next(), args.listen.clone(), router);
    app.add_server(server);

    tracing::info!("hello service: http://{}", args.listen);
    tracing::info!("press ctrl-c to stop");
    std::process::exit(app.run());
}
