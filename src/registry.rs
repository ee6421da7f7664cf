//! The token and format registries.
//!
//! One [`Registry`] holds everything a log line can be built from. Build it
//! at startup, register custom tokens and formats, then share it behind an
//! `Arc` with every [`AccessLog`](crate::AccessLog) that uses it. Separate
//! registries are fully independent, which is what tests want.
//!
//! ```rust
//! use morgana::{Registry, RequestContext, ResponseContext};
//!
//! let registry = Registry::new();
//! registry
//!     .token("route", |req: &RequestContext, _: &ResponseContext, _: Option<&str>| {
//!         Some(req.uri().path().to_owned())
//!     })?
//!     .format("route-only", ":method :route")?;
//! let line = registry.resolve("route-only")?;
//! # Ok::<(), morgana::FormatError>(())
//! ```
//!
//! Both tables sit behind reader/writer locks. Steady-state traffic only
//! takes read locks; registration and the one-time promotion of a template
//! to its compiled form take the write lock briefly.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::debug;

use crate::context::{RequestContext, ResponseContext};
use crate::error::FormatError;
use crate::format::{self, Format};
use crate::template::{LineBuilder, Template};
use crate::token::Tokens;

pub struct Registry {
    tokens: RwLock<Tokens>,
    formats: RwLock<HashMap<String, Format>>,
}

impl Registry {
    /// A registry holding the built-in tokens and formats.
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(Tokens::builtin()),
            formats: RwLock::new(format::builtin()),
        }
    }

    /// Registers a token, replacing any previous one with the same name.
    pub fn token<F>(&self, name: &str, evaluator: F) -> Result<&Self, FormatError>
    where
        F: Fn(&RequestContext, &ResponseContext, Option<&str>) -> Option<String>
            + Send
            + Sync
            + 'static,
    {
        if name.is_empty() {
            return Err(FormatError::MissingName);
        }
        self.tokens.write().insert(name, evaluator);
        debug!(token = name, "token registered");
        Ok(self)
    }

    /// Defines a format, replacing any previous one with the same name.
    ///
    /// Templates are stored as-is and compiled by the first
    /// [`resolve`](Registry::resolve) that asks for them.
    pub fn format(&self, name: &str, format: impl Into<Format>) -> Result<&Self, FormatError> {
        if name.is_empty() {
            return Err(FormatError::MissingName);
        }
        self.formats.write().insert(name.to_owned(), format.into());
        debug!(format = name, "format defined");
        Ok(self)
    }

    /// Resolves a format name, or a literal template, to a line-builder.
    ///
    /// A registered name yields the same `Arc` on every call: a template is
    /// compiled on first use and the compiled form replaces it in the
    /// table. Anything else is compiled as a template on every call.
    pub fn resolve(&self, name_or_template: &str) -> Result<LineBuilder, FormatError> {
        let src = match self.formats.read().get(name_or_template) {
            Some(Format::Builder(line)) => return Ok(Arc::clone(line)),
            Some(Format::Template(src)) => src.clone(),
            None => {
                let template = Template::compile(name_or_template, &self.tokens.read())?;
                return Ok(Arc::new(template));
            }
        };

        let compiled: LineBuilder = Arc::new(Template::compile(&src, &self.tokens.read())?);

        let mut formats = self.formats.write();
        match formats.get(name_or_template) {
            // Another caller promoted it while we were compiling.
            Some(Format::Builder(line)) => Ok(Arc::clone(line)),
            Some(Format::Template(current)) if *current == src => {
                formats.insert(name_or_template.to_owned(), Format::Builder(Arc::clone(&compiled)));
                debug!(format = name_or_template, "format compiled");
                Ok(compiled)
            }
            // Redefined or removed meanwhile: hand out what we compiled, cache nothing.
            _ => Ok(compiled),
        }
    }

    /// Read access to the token table, for rendering lines.
    pub fn tokens(&self) -> RwLockReadGuard<'_, Tokens> {
        self.tokens.read()
    }

    pub fn has_format(&self, name: &str) -> bool {
        self.formats.read().contains_key(name)
    }
}

impl Default for Registry {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use crate::context::{PeerAddr, Timestamp};
    use crate::format::{Color, Dev};
    use crate::template::FormatLine;

    fn render(registry: &Registry, line: &LineBuilder, req: &RequestContext, res: &ResponseContext) -> String {
        line.format_line(&registry.tokens(), req, res)
    }

    fn get(uri: &str) -> RequestContext {
        let peer: SocketAddr = "127.0.0.1:52000".parse().unwrap();
        let req = http::Request::builder()
            .method("GET")
            .uri(uri)
            .header("user-agent", "curl/8.5.0")
            .header("referer", "https://example.com/")
            .extension(PeerAddr(peer))
            .body(())
            .unwrap();
        RequestContext::from_request(&req).received_at(Timestamp::new(10, 0))
    }

    fn ok(len: &str) -> ResponseContext {
        let res = http::Response::builder()
            .status(200)
            .header("content-length", len)
            .body(())
            .unwrap();
        ResponseContext::from_response(&res).finished_at(Timestamp::new(10, 1_250_000))
    }

    #[test]
    fn named_template_is_compiled_once() {
        let registry = Registry::new();
        registry.format("mine", ":method :url").unwrap();
        let first = registry.resolve("mine").unwrap();
        let second = registry.resolve("mine").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let common = registry.resolve("common").unwrap();
        assert!(Arc::ptr_eq(&common, &registry.resolve("common").unwrap()));
    }

    #[test]
    fn literal_template_is_not_cached() {
        let registry = Registry::new();
        let first = registry.resolve(":method :status").unwrap();
        let second = registry.resolve(":method :status").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!registry.has_format(":method :status"));
        assert_eq!(render(&registry, &first, &get("/"), &ok("0")), "GET 200");
    }

    #[test]
    fn redefinition_replaces_cached_compilation() {
        let registry = Registry::new();
        registry.format("mine", ":method").unwrap();
        let before = registry.resolve("mine").unwrap();
        registry.format("mine", ":url").unwrap();
        let after = registry.resolve("mine").unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(render(&registry, &after, &get("/x"), &ok("0")), "/x");
    }

    #[test]
    fn unknown_token_fails_at_resolve() {
        let registry = Registry::new();
        registry.format("broken", ":method :bogus").unwrap();
        assert!(matches!(
            registry.resolve("broken"),
            Err(FormatError::UnknownToken { token, .. }) if token == "bogus"
        ));
        // Still a template; a later token registration fixes it.
        registry
            .token("bogus", |_: &RequestContext, _: &ResponseContext, _: Option<&str>| Some("ok".into()))
            .unwrap();
        let line = registry.resolve("broken").unwrap();
        assert_eq!(render(&registry, &line, &get("/"), &ok("0")), "GET ok");
    }

    #[test]
    fn empty_names_are_rejected() {
        let registry = Registry::new();
        assert_eq!(registry.format("", ":method").err(), Some(FormatError::MissingName));
        let err = registry
            .token("", |_: &RequestContext, _: &ResponseContext, _: Option<&str>| None)
            .err();
        assert_eq!(err, Some(FormatError::MissingName));
    }

    #[test]
    fn custom_token_with_argument() {
        let registry = Registry::new();
        registry
            .token("param", |req: &RequestContext, _: &ResponseContext, key: Option<&str>| {
                let key = key?;
                req.uri().query()?.split('&').find_map(|pair| {
                    let (k, v) = pair.split_once('=')?;
                    (k == key).then(|| v.to_owned())
                })
            })
            .unwrap();
        let line = registry.resolve(":param[page] :param[size]").unwrap();
        assert_eq!(render(&registry, &line, &get("/list?page=3"), &ok("0")), "3 -");
    }

    #[test]
    fn builder_formats_are_returned_as_is() {
        let registry = Registry::new();
        let builder: LineBuilder =
            Arc::new(|_: &Tokens, req: &RequestContext, _: &ResponseContext| req.method().to_string());
        registry.format("fn", Arc::clone(&builder)).unwrap();
        assert!(Arc::ptr_eq(&registry.resolve("fn").unwrap(), &builder));
    }

    #[test]
    fn builtin_formats() {
        let registry = Registry::new();
        let (req, res) = (get("/a?b=c"), ok("42"));

        let combined = registry.resolve("combined").unwrap();
        assert_eq!(
            render(&registry, &combined, &req, &res),
            r#"127.0.0.1 - - "GET /a?b=c HTTP/1.1" 200 42 "https://example.com/" "curl/8.5.0""#
        );

        let common = registry.resolve("common").unwrap();
        assert_eq!(render(&registry, &common, &req, &res), r#"127.0.0.1 - - "GET /a?b=c HTTP/1.1" 200 42"#);

        let short = registry.resolve("short").unwrap();
        assert_eq!(
            render(&registry, &short, &req, &res),
            "127.0.0.1 - GET /a?b=c HTTP/1.1 200 42 - 1.250 ms"
        );

        let tiny = registry.resolve("tiny").unwrap();
        assert_eq!(render(&registry, &tiny, &req, &res), "GET /a?b=c 200 42 - 1.250 ms");
    }

    #[test]
    fn dev_format_caches_per_bucket() {
        let registry = Registry::new();
        let dev = Arc::new(Dev::new());
        registry.format("dev", Format::Builder(Arc::clone(&dev) as LineBuilder)).unwrap();
        let line = registry.resolve("dev").unwrap();

        let not_found = |status: u16| {
            let res = http::Response::builder().status(status).body(()).unwrap();
            ResponseContext::from_response(&res)
        };

        let out = render(&registry, &line, &get("/nope"), &not_found(404));
        assert!(out.contains("\x1b[33m404"));
        let first = dev.cached(Color::Yellow).unwrap();

        render(&registry, &line, &get("/gone"), &not_found(410));
        assert!(Arc::ptr_eq(&first, &dev.cached(Color::Yellow).unwrap()));
        assert_eq!(dev.len(), 1);
    }
}
