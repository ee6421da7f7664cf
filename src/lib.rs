//! # morgana
//!
//! HTTP access logging for hyper services. One line per exchange, shaped
//! by a template.
//!
//! ## The contract
//!
//! A format is a template such as
//! `:remote-addr - :remote-user ":method :url" :status`. Each `:name` is a
//! token: a small function that reads one field out of the request or the
//! response. Templates are compiled once, when the middleware is built;
//! after that each request costs one walk over the compiled pieces.
//!
//! - **No value is never an error.** A missing header, no credentials, no
//!   timing: the token renders `-`.
//! - **Bad formats fail early.** A template naming a token nobody
//!   registered is rejected at startup with a [`FormatError`].
//! - **Lines are written when the response is done.** The response time
//!   covers the whole body. A client that hangs up early gets no line.
//! - **morgana does not write files.** Lines go to a [`Sink`]; the default
//!   one is `tracing`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use morgana::{AccessLog, Registry, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(Registry::new());
//!     let log = AccessLog::builder(registry).format("combined").build().unwrap();
//!
//!     Server::bind("0.0.0.0:3000")
//!         .serve(log, |_req| async { http::Response::new(String::from("ok")) })
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Tokens
//!
//! | Token | Value |
//! |---|---|
//! | `:method` | request method |
//! | `:url` | path and query of the original URL if the host rewrote it, else of the request URL |
//! | `:http-version` | `1.1`, `2.0`, … |
//! | `:status` | response status |
//! | `:remote-addr` | client address |
//! | `:remote-user` | user from Basic auth |
//! | `:referrer` | `Referer` (or `Referrer`) header |
//! | `:user-agent` | `User-Agent` header |
//! | `:response-time[digits]` | milliseconds, 3 decimals by default |
//! | `:req[header]` | any request header |
//! | `:res[header]` | any response header |
//!
//! Register your own with [`Registry::token`].

mod context;
mod error;
mod registry;
mod server;
mod sink;

pub mod format;
pub mod middleware;
pub mod template;
pub mod token;

pub use context::{
    ClientIp, OriginalUri, PeerAddr, ProxiedIp, RequestContext, ResponseContext, Timestamp,
};
pub use error::{Error, FormatError};
pub use format::Format;
pub use middleware::{AccessLog, AccessLogBuilder, LoggedBody};
pub use registry::Registry;
pub use server::Server;
pub use sink::{Sink, TracingSink};
pub use template::{FormatLine, LineBuilder, Template};
pub use token::Tokens;
