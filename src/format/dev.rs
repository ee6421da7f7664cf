//! The colored `dev` format.
//!
//! The status code is tinted by class. Each color gets its own compiled
//! template, built the first time a response of that class is logged and
//! reused afterwards. There are only five colors, so the cache never grows
//! past five entries and nothing is ever evicted.

use std::sync::{Arc, OnceLock};

use http::StatusCode;

use crate::context::{RequestContext, ResponseContext};
use crate::template::{FormatLine, Template};
use crate::token::Tokens;

/// ANSI foreground color for a status class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    /// No status yet, or 1xx.
    Plain = 0,
    Red = 31,
    Green = 32,
    Yellow = 33,
    Cyan = 36,
}

/// One cache slot per [`Color`].
const BUCKETS: usize = 5;

impl Color {
    /// Picks the color for a response status.
    pub fn for_status(status: Option<StatusCode>) -> Self {
        match status.map(|s| s.as_u16()) {
            Some(s) if s >= 500 => Self::Red,
            Some(s) if s >= 400 => Self::Yellow,
            Some(s) if s >= 300 => Self::Cyan,
            Some(s) if s >= 200 => Self::Green,
            _ => Self::Plain,
        }
    }

    /// The SGR code, as written into the escape sequence.
    pub fn code(self) -> u8 {
        self as u8
    }

    fn slot(self) -> usize {
        match self {
            Self::Plain => 0,
            Self::Red => 1,
            Self::Green => 2,
            Self::Yellow => 3,
            Self::Cyan => 4,
        }
    }

    fn template(self) -> String {
        format!(
            "\x1b[0m:method :url \x1b[{}m:status \x1b[0m:response-time ms - :res[content-length]\x1b[0m",
            self.code()
        )
    }
}

/// Line-builder for `dev`: dispatches to one cached template per color.
#[derive(Default)]
pub struct Dev {
    variants: [OnceLock<Arc<Template>>; BUCKETS],
}

impl Dev {
    pub fn new() -> Self {
        Self::default()
    }

    /// The compiled variant for `color`, compiling it on first request.
    ///
    /// Concurrent first requests for the same color race to fill the slot;
    /// exactly one template is kept and every caller gets that one.
    pub fn variant(&self, color: Color) -> Arc<Template> {
        let slot = &self.variants[color.slot()];
        Arc::clone(slot.get_or_init(|| Arc::new(Template::parse(&color.template()))))
    }

    /// The variant for `color` if it has been compiled already.
    pub fn cached(&self, color: Color) -> Option<Arc<Template>> {
        self.variants[color.slot()].get().cloned()
    }

    /// Number of compiled variants.
    pub fn len(&self) -> usize {
        self.variants.iter().filter(|slot| slot.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FormatLine for Dev {
    fn format_line(&self, tokens: &Tokens, req: &RequestContext, res: &ResponseContext) -> String {
        self.variant(Color::for_status(res.status()))
            .format_line(tokens, req, res)
    }
}
