//! Token table and the built-in tokens.
//!
//! A token is a named evaluator that produces one field of a log line. It
//! receives both context snapshots and the optional bracket argument from
//! the template (`:req[user-agent]` passes `Some("user-agent")`), and
//! returns `None` when it has nothing to say. `None` renders as `-`.
//!
//! Evaluators must be side-effect free: a line may evaluate any token any
//! number of times, in any order.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use http::{Uri, Version};
use http::header::{AUTHORIZATION, REFERER, USER_AGENT};

use crate::context::{RequestContext, ResponseContext};

/// A shared, type-erased token evaluator.
pub type TokenFn =
    Arc<dyn Fn(&RequestContext, &ResponseContext, Option<&str>) -> Option<String> + Send + Sync>;

/// Default number of decimals for `:response-time`.
const RESPONSE_TIME_DIGITS: usize = 3;

/// Upper bound for the `:response-time` argument.
const RESPONSE_TIME_MAX_DIGITS: usize = 100;

/// Standard alphabet, padding optional, stray low bits tolerated.
const CREDENTIALS: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Name → evaluator map.
#[derive(Clone, Default)]
pub struct Tokens {
    map: HashMap<String, TokenFn>,
}

impl Tokens {
    /// An empty table. [`Tokens::builtin`] is usually what you want.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table holding every built-in token.
    pub fn builtin() -> Self {
        let mut tokens = Self::new();
        tokens.insert("method", method);
        tokens.insert("url", url);
        tokens.insert("http-version", http_version);
        tokens.insert("status", status);
        tokens.insert("remote-addr", remote_addr);
        tokens.insert("remote-user", remote_user);
        tokens.insert("referrer", referrer);
        tokens.insert("user-agent", user_agent);
        tokens.insert("response-time", response_time);
        tokens.insert("req", request_header);
        tokens.insert("res", response_header);
        tokens
    }

    /// Registers `evaluator` under `name`, replacing any previous token.
    pub fn insert<F>(&mut self, name: impl Into<String>, evaluator: F)
    where
        F: Fn(&RequestContext, &ResponseContext, Option<&str>) -> Option<String>
            + Send
            + Sync
            + 'static,
    {
        self.map.insert(name.into(), Arc::new(evaluator));
    }

    pub fn get(&self, name: &str) -> Option<&TokenFn> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Evaluates `name`, treating an unregistered token as having no value.
    pub fn eval(
        &self,
        name: &str,
        req: &RequestContext,
        res: &ResponseContext,
        arg: Option<&str>,
    ) -> Option<String> {
        self.get(name).and_then(|token| token(req, res, arg))
    }
}

// ── Built-ins ─────────────────────────────────────────────────────────────────

fn method(req: &RequestContext, _: &ResponseContext, _: Option<&str>) -> Option<String> {
    Some(req.method().as_str().to_owned())
}

fn url(req: &RequestContext, _: &ResponseContext, _: Option<&str>) -> Option<String> {
    Some(request_target(req.original_uri().unwrap_or(req.uri())))
}

/// Path and query of `uri`. HTTP/2 requests arrive in absolute form; the
/// scheme and authority are dropped so every protocol logs the same text.
fn request_target(uri: &Uri) -> String {
    match uri.path_and_query() {
        Some(pq) => pq.as_str().to_owned(),
        None => uri.to_string(),
    }
}

fn http_version(req: &RequestContext, _: &ResponseContext, _: Option<&str>) -> Option<String> {
    let v = match req.version() {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_11 => "1.1",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => return None,
    };
    Some(v.to_owned())
}

fn status(_: &RequestContext, res: &ResponseContext, _: Option<&str>) -> Option<String> {
    res.status().map(|s| s.as_u16().to_string())
}

fn remote_addr(req: &RequestContext, _: &ResponseContext, _: Option<&str>) -> Option<String> {
    req.remote_ip().map(|ip| ip.to_string())
}

fn remote_user(req: &RequestContext, _: &ResponseContext, _: Option<&str>) -> Option<String> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    basic_auth_user(header)
}

fn referrer(req: &RequestContext, _: &ResponseContext, _: Option<&str>) -> Option<String> {
    req.header(REFERER.as_str()).or_else(|| req.header("referrer"))
}

fn user_agent(req: &RequestContext, _: &ResponseContext, _: Option<&str>) -> Option<String> {
    req.header(USER_AGENT.as_str())
}

fn response_time(req: &RequestContext, res: &ResponseContext, digits: Option<&str>) -> Option<String> {
    let start = req.received()?;
    let end = res.finished()?;
    let digits = digits.map_or(RESPONSE_TIME_DIGITS, parse_digits);
    Some(to_fixed(end.millis_since(start), digits))
}

/// Reads a decimal-places argument. Fractions truncate, anything that is
/// not a finite number means 0, and the result is clamped to
/// `0..=RESPONSE_TIME_MAX_DIGITS`.
fn parse_digits(arg: &str) -> usize {
    let n = arg.trim().parse::<f64>().ok().filter(|n| n.is_finite()).unwrap_or(0.0);
    n.trunc().clamp(0.0, RESPONSE_TIME_MAX_DIGITS as f64) as usize
}

/// Formats `value` with `digits` decimals, rounding exact halves up
/// (`2.5` → `"3"`). `format!` alone would round them to even.
fn to_fixed(value: f64, digits: usize) -> String {
    // Past 15 digits an f64 has no exact halves left to round.
    if digits > 15 {
        return format!("{value:.digits$}");
    }
    let scale = 10f64.powi(digits as i32);
    let rounded = (value * scale).round() / scale;
    format!("{rounded:.digits$}")
}

fn request_header(req: &RequestContext, _: &ResponseContext, field: Option<&str>) -> Option<String> {
    req.header(field?)
}

fn response_header(_: &RequestContext, res: &ResponseContext, field: Option<&str>) -> Option<String> {
    res.header(field?)
}

/// Extracts the user name from a `Basic` credentials header.
///
/// Accepts `Basic <token>` with any scheme casing and surrounding spaces.
/// The token may omit its `=` padding and may use the url-safe `-`/`_`
/// characters. Fails when the scheme differs, the token is not base64, the
/// decoded bytes are not UTF-8, or there is no `:` separating user and
/// password.
fn basic_auth_user(header: &str) -> Option<String> {
    let header = header.trim_matches(' ');
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let token: String = token
        .trim_start_matches(' ')
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    let decoded = CREDENTIALS.decode(token).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, _password) = decoded.split_once(':')?;
    Some(user.to_owned())
}
