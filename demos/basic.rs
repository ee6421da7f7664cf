//! Minimal morgana example: a couple of endpoints with access logging.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!   ACCESS_LOG_FORMAT=dev PORT=8080 cargo run --example basic
//!   ACCESS_LOG_FORMAT=':method :url :req[accept]' cargo run --example basic
//!
//! Without `ACCESS_LOG_FORMAT` the demo logs its own `brief` format, built
//! on a custom `:path` token that leaves out the query string.
//!
//! Try:
//!   curl http://localhost:3000/health
//!   curl -u alice:secret http://localhost:3000/users/42
//!   curl http://localhost:3000/nope

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use morgana::{AccessLog, Registry, RequestContext, ResponseContext, Server};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_owned());
    let format = std::env::var("ACCESS_LOG_FORMAT").unwrap_or_else(|_| "brief".to_owned());

    let registry = Arc::new(Registry::new());
    registry
        .token("path", |req: &RequestContext, _: &ResponseContext, _: Option<&str>| {
            Some(req.uri().path().to_owned())
        })
        .expect("token name is not empty")
        .format("brief", ":method :path :status :response-time[1] ms")
        .expect("format name is not empty");

    let log = AccessLog::builder(registry)
        .format(format)
        .skip(|req, _| req.uri().path() == "/health")
        .build()
        .expect("invalid access log format");

    Server::bind(&format!("0.0.0.0:{port}"))
        .serve(log, app)
        .await
        .expect("server error");
}

async fn app(req: http::Request<Incoming>) -> http::Response<Full<Bytes>> {
    let path = req.uri().path();
    let (status, body) = if path == "/health" {
        (200, "ok".to_owned())
    } else if let Some(id) = path.strip_prefix("/users/") {
        (200, format!(r#"{{"id":"{id}","name":"alice"}}"#))
    } else {
        (404, "not found".to_owned())
    };

    http::Response::builder()
        .status(status)
        .header("content-length", body.len())
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| http::Response::new(Full::new(Bytes::new())))
}
