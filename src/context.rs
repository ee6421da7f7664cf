//! Read-only views of one HTTP exchange, as seen by tokens.
//!
//! The middleware snapshots the request when it arrives and the response
//! head once the inner service has produced it. Tokens only ever see these
//! snapshots, never the live `http` values, so evaluating a line cannot
//! disturb the exchange it describes.
//!
//! Hosts feed connection details in through request extensions:
//!
//! | Extension | Meaning | Used by |
//! |---|---|---|
//! | [`PeerAddr`] | raw socket remote address | `remote-addr` (last resort) |
//! | [`ProxiedIp`] | IP resolved from proxy headers by the host | `remote-addr` |
//! | [`ClientIp`] | IP the connection layer attributes the request to | `remote-addr` (first choice) |
//! | [`OriginalUri`] | the URI before the host rewrote it | `url` |

use std::net::{IpAddr, SocketAddr};
use std::sync::OnceLock;
use std::time::Instant;

use http::{HeaderMap, Method, StatusCode, Uri, Version};

// ── Extensions ────────────────────────────────────────────────────────────────

/// Socket address of the connected peer. Inserted by [`Server`](crate::Server).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

/// Client IP as determined by the connection layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// Client IP resolved from forwarding headers by a trusted proxy layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProxiedIp(pub IpAddr);

/// The request URI before any host-side rewriting (mounting, prefix strip).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OriginalUri(pub Uri);

// ── Timestamp ─────────────────────────────────────────────────────────────────

/// A monotonic `(seconds, nanoseconds)` reading.
///
/// Readings are measured from a process-wide origin fixed on first use, so
/// two timestamps from the same process can be subtracted; the absolute
/// value means nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp {
    secs: u64,
    nanos: u32,
}

impl Timestamp {
    pub fn new(secs: u64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    /// Reads the monotonic clock.
    pub fn now() -> Self {
        static ORIGIN: OnceLock<Instant> = OnceLock::new();
        let elapsed = ORIGIN.get_or_init(Instant::now).elapsed();
        Self { secs: elapsed.as_secs(), nanos: elapsed.subsec_nanos() }
    }

    pub fn secs(self) -> u64 { self.secs }
    pub fn nanos(self) -> u32 { self.nanos }

    /// Milliseconds elapsed from `start` to `self`.
    ///
    /// Seconds and nanoseconds are subtracted separately and then combined,
    /// so a negative nanosecond difference is absorbed by the seconds term.
    pub fn millis_since(self, start: Timestamp) -> f64 {
        (self.secs as f64 - start.secs as f64) * 1e3
            + (f64::from(self.nanos) - f64::from(start.nanos)) * 1e-6
    }
}

// ── Request ───────────────────────────────────────────────────────────────────

/// Snapshot of an incoming request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) original_uri: Option<Uri>,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    pub(crate) client_ip: Option<IpAddr>,
    pub(crate) proxied_ip: Option<IpAddr>,
    pub(crate) peer_addr: Option<SocketAddr>,
    pub(crate) received_at: Option<Timestamp>,
}

impl RequestContext {
    /// Copies everything tokens may need out of `req`. The body is not touched.
    pub fn from_request<B>(req: &http::Request<B>) -> Self {
        let ext = req.extensions();
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            original_uri: ext.get::<OriginalUri>().map(|u| u.0.clone()),
            version: req.version(),
            headers: req.headers().clone(),
            client_ip: ext.get::<ClientIp>().map(|ip| ip.0),
            proxied_ip: ext.get::<ProxiedIp>().map(|ip| ip.0),
            peer_addr: ext.get::<PeerAddr>().map(|addr| addr.0),
            received_at: None,
        }
    }

    /// Records when the request was received.
    pub fn received_at(mut self, at: Timestamp) -> Self {
        self.received_at = Some(at);
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn original_uri(&self) -> Option<&Uri> { self.original_uri.as_ref() }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.peer_addr }
    pub fn received(&self) -> Option<Timestamp> { self.received_at }

    /// Best known client address: connection layer, then proxy, then socket.
    pub fn remote_ip(&self) -> Option<IpAddr> {
        self.client_ip
            .or(self.proxied_ip)
            .or_else(|| self.peer_addr.map(|addr| addr.ip()))
    }

    /// Case-insensitive header lookup; repeated headers are joined with `", "`.
    pub fn header(&self, name: &str) -> Option<String> {
        joined(&self.headers, name)
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// Snapshot of a response.
///
/// Status and headers exist only once the head has been finalized; before
/// that both read as absent.
#[derive(Clone, Debug, Default)]
pub struct ResponseContext {
    pub(crate) head: Option<(StatusCode, HeaderMap)>,
    pub(crate) finished_at: Option<Timestamp>,
}

impl ResponseContext {
    /// A response whose head has not been written yet.
    pub fn pending() -> Self {
        Self::default()
    }

    /// A response whose head is final.
    pub fn from_response<B>(res: &http::Response<B>) -> Self {
        Self {
            head: Some((res.status(), res.headers().clone())),
            finished_at: None,
        }
    }

    /// Records when the response finished.
    pub fn finished_at(mut self, at: Timestamp) -> Self {
        self.finished_at = Some(at);
        self
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.head.as_ref().map(|(status, _)| *status)
    }

    pub fn headers(&self) -> Option<&HeaderMap> {
        self.head.as_ref().map(|(_, headers)| headers)
    }

    pub fn finished(&self) -> Option<Timestamp> { self.finished_at }

    /// Like [`RequestContext::header`]; absent until the head is final.
    pub fn header(&self, name: &str) -> Option<String> {
        joined(self.headers()?, name)
    }
}

fn joined(headers: &HeaderMap, name: &str) -> Option<String> {
    let mut values = headers
        .get_all(name)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()));
    let first = values.next()?;
    Some(values.fold(first.into_owned(), |mut acc, v| {
        acc.push_str(", ");
        acc.push_str(&v);
        acc
    }))
}
