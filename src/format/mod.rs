//! Named formats.
//!
//! A format is either a template string, compiled the first time it is
//! resolved, or a ready-made [`LineBuilder`]. The built-ins:
//!
//! | Name | Line |
//! |---|---|
//! | `combined` | Apache combined log format |
//! | `common` | Apache common log format (the default) |
//! | `short` | shorter than `common`, with response time |
//! | `tiny` | the minimum: method, url, status, length, time |
//! | `dev` | `tiny`-like, status colored by class, for terminals |

pub mod dev;

use std::collections::HashMap;
use std::sync::Arc;

use crate::template::{FormatLine, LineBuilder};

pub use dev::{Color, Dev};

/// Format used when none is configured.
pub const DEFAULT_FORMAT: &str = "common";

pub const COMBINED: &str = ":remote-addr - :remote-user \":method :url HTTP/:http-version\" :status :res[content-length] \":referrer\" \":user-agent\"";
pub const COMMON: &str = ":remote-addr - :remote-user \":method :url HTTP/:http-version\" :status :res[content-length]";
pub const SHORT: &str = ":remote-addr :remote-user :method :url HTTP/:http-version :status :res[content-length] - :response-time ms";
pub const TINY: &str = ":method :url :status :res[content-length] - :response-time ms";

/// What a format name maps to.
#[derive(Clone)]
pub enum Format {
    /// A template, compiled on first resolution.
    Template(String),
    /// A compiled or hand-written line-builder.
    Builder(LineBuilder),
}

impl From<&str> for Format {
    fn from(src: &str) -> Self {
        Self::Template(src.to_owned())
    }
}

impl From<String> for Format {
    fn from(src: String) -> Self {
        Self::Template(src)
    }
}

impl From<LineBuilder> for Format {
    fn from(builder: LineBuilder) -> Self {
        Self::Builder(builder)
    }
}

impl Format {
    /// Wraps any line-builder, e.g. a closure.
    pub fn builder(line: impl FormatLine) -> Self {
        Self::Builder(Arc::new(line))
    }
}

/// The built-in formats, keyed by name.
pub(crate) fn builtin() -> HashMap<String, Format> {
    HashMap::from([
        ("combined".to_owned(), Format::from(COMBINED)),
        ("common".to_owned(), Format::from(COMMON)),
        ("short".to_owned(), Format::from(SHORT)),
        ("tiny".to_owned(), Format::from(TINY)),
        ("dev".to_owned(), Format::builder(Dev::new())),
    ])
}
