//! Response body wrapper that logs when the body is done.
//!
//! An exchange is finished when the last byte of the response has been
//! handed to the connection, not when the handler returns. The wrapper
//! watches the body stream and fires the access line exactly once:
//!
//! ```text
//! poll_frame → None                 ─┐
//! poll_frame → last frame           ─┤
//! dropped, body was empty from start─┼→ completed: line built, sent to sink
//! dropped, exchange has no body     ─┘
//! poll_frame → Err / dropped early  ──→ discarded: no line
//! ```
//!
//! The drop arms exist because servers never poll a body they are not going
//! to send: one that reports end-of-stream up front, and any body at all on
//! a `HEAD` response or a `1xx`, `204` or `304` status.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use http::{Method, StatusCode};
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use tracing::debug;

use super::Shared;
use crate::context::{RequestContext, ResponseContext, Timestamp};

/// Per-exchange state carried until the body finishes.
pub(crate) struct Pending {
    pub(crate) log: Arc<Shared>,
    pub(crate) req: RequestContext,
    pub(crate) res: ResponseContext,
    /// Nothing will be written after the head: the body was already at
    /// end-of-stream when wrapped, or the exchange cannot carry one.
    pub(crate) bodyless: bool,
}

impl Pending {
    fn complete(self) {
        let res = self.res.finished_at(Timestamp::now());
        self.log.emit(&self.req, &res);
    }
}

pin_project! {
    /// A response body that emits an access line when it completes.
    pub struct LoggedBody<B> {
        #[pin]
        inner: B,
        pending: Option<Pending>,
    }

    impl<B> PinnedDrop for LoggedBody<B> {
        fn drop(this: Pin<&mut Self>) {
            let this = this.project();
            if let Some(pending) = this.pending.take() {
                if pending.bodyless {
                    pending.complete();
                } else {
                    debug!(method = %pending.req.method(), uri = %pending.req.uri(), "response dropped before completion, access line discarded");
                }
            }
        }
    }
}

impl<B: Body> LoggedBody<B> {
    pub(crate) fn new(inner: B, log: Arc<Shared>, req: RequestContext, res: ResponseContext) -> Self {
        let bodyless = inner.is_end_stream() || !carries_body(&req, &res);
        Self { inner, pending: Some(Pending { log, req, res, bodyless }) }
    }
}

impl<B> LoggedBody<B> {
    /// Wraps `inner` without logging anything on completion.
    pub(crate) fn passthrough(inner: B) -> Self {
        Self { inner, pending: None }
    }

    /// Whether the access line is still owed.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Whether the response to this exchange is allowed a body on the wire.
fn carries_body(req: &RequestContext, res: &ResponseContext) -> bool {
    if *req.method() == Method::HEAD {
        return false;
    }
    match res.status() {
        Some(status) => {
            !(status.is_informational()
                || status == StatusCode::NO_CONTENT
                || status == StatusCode::NOT_MODIFIED)
        }
        None => true,
    }
}

impl<B: Body> Body for LoggedBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();
        let frame = ready!(this.inner.as_mut().poll_frame(cx));

        match &frame {
            Some(Ok(_)) if !this.inner.is_end_stream() => {}
            Some(Ok(_)) | None => {
                if let Some(pending) = this.pending.take() {
                    pending.complete();
                }
            }
            Some(Err(_)) => {
                if let Some(pending) = this.pending.take() {
                    debug!(method = %pending.req.method(), uri = %pending.req.uri(), "response body failed, access line discarded");
                }
            }
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
