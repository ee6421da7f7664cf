//! Access-log middleware.
//!
//! [`AccessLog`] sits between the server and the application handler and
//! produces one line per completed exchange:
//!
//! ```text
//! Started    request snapshot + received timestamp
//!    ↓
//! InFlight   next(req).await, the handler runs, nothing blocks here
//!    ↓
//! head final status + headers snapshot, body wrapped in LoggedBody
//!    ↓
//! Completed  body finished → finished timestamp → line → sink   (Logged)
//!    or
//! aborted    body errored or dropped early → nothing            (Discarded)
//! ```
//!
//! The format is resolved once, when the middleware is built. A bad
//! template is a startup error; the request path never fails.
//!
//! ```rust
//! use std::sync::Arc;
//! use morgana::{AccessLog, Registry};
//!
//! let registry = Arc::new(Registry::new());
//! let log = AccessLog::builder(registry)
//!     .format("tiny")
//!     .sink(|line: &str| println!("{line}"))
//!     .build()?;
//! # Ok::<(), morgana::FormatError>(())
//! ```

mod body;

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::context::{RequestContext, ResponseContext, Timestamp};
use crate::error::FormatError;
use crate::format::DEFAULT_FORMAT;
use crate::registry::Registry;
use crate::sink::{Sink, TracingSink};
use crate::template::{FormatLine, LineBuilder};

pub use body::LoggedBody;

type SkipFn = dyn Fn(&RequestContext, &ResponseContext) -> bool + Send + Sync;

/// State shared by every exchange passing through one [`AccessLog`].
pub(crate) struct Shared {
    registry: Arc<Registry>,
    line: LineBuilder,
    sink: Box<dyn Sink>,
    immediate: bool,
    skip: Option<Box<SkipFn>>,
}

impl Shared {
    /// Builds the line for one exchange and hands it to the sink.
    pub(crate) fn emit(&self, req: &RequestContext, res: &ResponseContext) {
        if self.skip.as_ref().is_some_and(|skip| skip(req, res)) {
            return;
        }
        let line = self.line.format_line(&self.registry.tokens(), req, res);
        self.sink.info(&line);
    }
}

/// The access-log middleware. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct AccessLog {
    shared: Arc<Shared>,
}

impl AccessLog {
    /// Logs `format` (a format name or a literal template) to `sink`.
    pub fn new(registry: Arc<Registry>, format: &str, sink: impl Sink) -> Result<Self, FormatError> {
        Self::builder(registry).format(format).sink(sink).build()
    }

    /// Starts from the defaults: the `common` format, logged through `tracing`.
    pub fn builder(registry: Arc<Registry>) -> AccessLogBuilder {
        AccessLogBuilder {
            registry,
            format: DEFAULT_FORMAT.to_owned(),
            sink: Box::new(TracingSink),
            immediate: false,
            skip: None,
        }
    }

    /// Runs one exchange through `next`, logging it once it completes.
    ///
    /// The returned response carries a [`LoggedBody`]; the line is emitted
    /// when that body has been fully produced. Dropping the future or the
    /// body earlier discards the line.
    pub async fn handle<B, RB, F, Fut>(
        &self,
        req: http::Request<B>,
        next: F,
    ) -> http::Response<LoggedBody<RB>>
    where
        F: FnOnce(http::Request<B>) -> Fut,
        Fut: Future<Output = http::Response<RB>>,
        RB: http_body::Body,
    {
        let received = Timestamp::now();
        let ctx = RequestContext::from_request(&req).received_at(received);

        if self.shared.immediate {
            self.shared.emit(&ctx, &ResponseContext::pending());
            return next(req).await.map(LoggedBody::passthrough);
        }

        let res = next(req).await;
        let head = ResponseContext::from_response(&res);
        debug!(method = %ctx.method(), uri = %ctx.uri(), status = res.status().as_u16(), "response head ready");

        let shared = Arc::clone(&self.shared);
        res.map(|body| LoggedBody::new(body, shared, ctx, head))
    }

    /// The line-builder this middleware resolved at construction.
    pub fn line_builder(&self) -> &LineBuilder {
        &self.shared.line
    }
}

/// Configures an [`AccessLog`]. Obtain via [`AccessLog::builder`].
pub struct AccessLogBuilder {
    registry: Arc<Registry>,
    format: String,
    sink: Box<dyn Sink>,
    immediate: bool,
    skip: Option<Box<SkipFn>>,
}

impl AccessLogBuilder {
    /// A registered format name, or a literal template.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn sink(mut self, sink: impl Sink) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Log when the request arrives instead of when the response completes.
    ///
    /// Lines are emitted even for requests that never finish, but nothing
    /// about the response is known yet: status, response headers and
    /// response time all render `-`.
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Suppresses the line for exchanges where `skip` returns `true`.
    pub fn skip<F>(mut self, skip: F) -> Self
    where
        F: Fn(&RequestContext, &ResponseContext) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Box::new(skip));
        self
    }

    /// Resolves the format and builds the middleware.
    pub fn build(self) -> Result<AccessLog, FormatError> {
        let line = self.registry.resolve(&self.format)?;
        debug!(format = %self.format, immediate = self.immediate, "access log ready");
        Ok(AccessLog {
            shared: Arc::new(Shared {
                registry: self.registry,
                line,
                sink: self.sink,
                immediate: self.immediate,
                skip: self.skip,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use bytes::Bytes;
    use futures_util::stream;
    use http_body::Body;
    use http_body_util::{BodyExt, Full, StreamBody};
    use parking_lot::Mutex;

    use super::*;
    use crate::context::PeerAddr;

    #[derive(Clone, Default)]
    struct Lines(Arc<Mutex<Vec<String>>>);

    impl Lines {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.lock())
        }
    }

    impl Sink for Lines {
        fn info(&self, line: &str) {
            self.0.lock().push(line.to_owned());
        }
    }

    fn log(format: &str, lines: &Lines) -> AccessLog {
        AccessLog::new(Arc::new(Registry::new()), format, lines.clone()).unwrap()
    }

    fn get(uri: &str) -> http::Request<()> {
        http::Request::builder().method("GET").uri(uri).body(()).unwrap()
    }

    fn respond(status: u16, body: &'static str) -> http::Response<Full<Bytes>> {
        http::Response::builder()
            .status(status)
            .header("content-length", body.len())
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    #[tokio::test]
    async fn logs_after_body_completes() {
        let lines = Lines::default();
        let log = log(":method :url :status", &lines);

        let res = log.handle(get("/health"), |_| async { respond(200, "ok") }).await;
        assert!(lines.take().is_empty(), "nothing logged before the body is sent");

        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
        assert_eq!(lines.take(), vec!["GET /health 200".to_owned()]);
    }

    #[tokio::test]
    async fn empty_body_logs_on_drop() {
        let lines = Lines::default();
        let log = log(":status :res[content-length]", &lines);

        let res = log.handle(get("/"), |_| async { respond(204, "") }).await;
        assert!(res.body().is_end_stream());
        drop(res);
        assert_eq!(lines.take(), vec!["204 0".to_owned()]);
    }

    #[tokio::test]
    async fn dropped_body_is_discarded() {
        let lines = Lines::default();
        let log = log("tiny", &lines);

        let res = log.handle(get("/big"), |_| async { respond(200, "payload") }).await;
        assert!(res.body().is_pending());
        drop(res);
        assert!(lines.take().is_empty());
    }

    #[tokio::test]
    async fn head_response_logs_on_drop() {
        let lines = Lines::default();
        let log = log(":method :url :status :res[content-length]", &lines);

        let req = http::Request::builder().method("HEAD").uri("/health").body(()).unwrap();
        let res = log.handle(req, |_| async { respond(200, "ok") }).await;
        assert!(!res.body().is_end_stream(), "handler body is not empty");
        drop(res);
        assert_eq!(lines.take(), vec!["HEAD /health 200 2".to_owned()]);
    }

    #[tokio::test]
    async fn statuses_without_body_log_on_drop() {
        let lines = Lines::default();
        let log = log(":method :status", &lines);

        for status in [304, 204, 103] {
            let res = log.handle(get("/etag"), move |_| async move { respond(status, "stale") }).await;
            drop(res);
        }
        assert_eq!(
            lines.take(),
            vec!["GET 304".to_owned(), "GET 204".to_owned(), "GET 103".to_owned()]
        );
    }

    #[tokio::test]
    async fn dropped_handler_is_discarded() {
        let lines = Lines::default();
        let log = log("tiny", &lines);

        let fut = log.handle(get("/slow"), |_| async {
            std::future::pending::<()>().await;
            respond(200, "never")
        });
        drop(fut);
        assert!(lines.take().is_empty());
    }

    #[tokio::test]
    async fn streamed_body_logs_once_at_the_end() {
        let lines = Lines::default();
        let log = log(":url :status", &lines);

        let chunks = vec![
            Ok::<_, Infallible>(http_body::Frame::data(Bytes::from_static(b"a"))),
            Ok(http_body::Frame::data(Bytes::from_static(b"b"))),
        ];
        let res = log
            .handle(get("/stream"), |_| async move {
                http::Response::new(StreamBody::new(stream::iter(chunks)))
            })
            .await;

        let mut body = res.into_body();
        let first = body.frame().await.unwrap().unwrap();
        assert_eq!(first.into_data().unwrap(), Bytes::from_static(b"a"));
        assert!(lines.take().is_empty());

        while body.frame().await.is_some() {}
        drop(body);
        assert_eq!(lines.take(), vec!["/stream 200".to_owned()]);
    }

    #[tokio::test]
    async fn response_time_spans_the_exchange() {
        let lines = Lines::default();
        let log = log(":response-time[0]", &lines);

        let res = log
            .handle(get("/"), |_| async {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                respond(200, "done")
            })
            .await;
        res.into_body().collect().await.unwrap();

        let lines = lines.take();
        let ms: u64 = lines[0].parse().unwrap();
        assert!(ms >= 20, "response time {ms} too short");
    }

    #[tokio::test]
    async fn immediate_logs_before_the_handler() {
        let lines = Lines::default();
        let log = AccessLog::builder(Arc::new(Registry::new()))
            .format(":method :url :status :response-time")
            .sink(lines.clone())
            .immediate(true)
            .build()
            .unwrap();

        let seen = lines.clone();
        let res = log
            .handle(get("/now"), |_| async move {
                assert_eq!(seen.take(), vec!["GET /now - -".to_owned()]);
                respond(500, "boom")
            })
            .await;
        res.into_body().collect().await.unwrap();
        assert!(lines.take().is_empty(), "immediate mode logs exactly once");
    }

    #[tokio::test]
    async fn skip_suppresses_lines() {
        let lines = Lines::default();
        let log = AccessLog::builder(Arc::new(Registry::new()))
            .format(":status")
            .sink(lines.clone())
            .skip(|_, res| res.status().is_some_and(|s| s.is_success()))
            .build()
            .unwrap();

        let res = log.handle(get("/"), |_| async { respond(200, "fine") }).await;
        res.into_body().collect().await.unwrap();
        let res = log.handle(get("/"), |_| async { respond(503, "down") }).await;
        res.into_body().collect().await.unwrap();

        assert_eq!(lines.take(), vec!["503".to_owned()]);
    }

    #[tokio::test]
    async fn remote_addr_comes_from_extensions() {
        let lines = Lines::default();
        let log = log(":remote-addr :remote-user", &lines);

        let req = http::Request::builder()
            .uri("/")
            .extension(PeerAddr("203.0.113.9:40000".parse().unwrap()))
            .body(())
            .unwrap();
        let res = log.handle(req, |_| async { respond(200, "x") }).await;
        res.into_body().collect().await.unwrap();
        assert_eq!(lines.take(), vec!["203.0.113.9 -".to_owned()]);
    }

    #[test]
    fn unknown_format_token_fails_construction() {
        let err = AccessLog::new(Arc::new(Registry::new()), ":method :nope", |_: &str| {}).err();
        assert!(matches!(err, Some(FormatError::UnknownToken { .. })));
    }

    #[test]
    fn builder_defaults_to_common() {
        let registry = Arc::new(Registry::new());
        let log = AccessLog::builder(Arc::clone(&registry)).build().unwrap();
        assert!(Arc::ptr_eq(log.line_builder(), &registry.resolve("common").unwrap()));
    }
}
