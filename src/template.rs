//! Template parsing and the line-builder trait.
//!
//! # Syntax
//!
//! A template is literal text with placeholders:
//!
//! ```text
//! :remote-addr - :remote-user ":method :url" :status :res[content-length]
//! ```
//!
//! - `:name`: a token name of at least two characters from
//!   `[A-Za-z0-9_-]`, matched greedily.
//! - `:name[arg]`: the same, with a non-empty argument up to the next `]`.
//!   `[]` or an unclosed `[` is not an argument; it stays literal text.
//!
//! Anything else, including a lone `:` or `:x`, is literal.
//!
//! # How compiled templates run
//!
//! A template is parsed once into a list of [`Node`]s. Rendering walks the
//! list, copying literals and evaluating tokens; no parsing happens per
//! request. Compiled templates are shared as [`LineBuilder`]s:
//!
//! ```text
//! "…:method :url…"         ← format string
//!        ↓ Template::compile(src, &tokens)
//! Template { nodes }       ← unknown tokens rejected here
//!        ↓ Arc::new(template) as LineBuilder
//! line.format_line(&tokens, &req, &res)   ← once per exchange
//! ```

use std::sync::Arc;

use crate::context::{RequestContext, ResponseContext};
use crate::error::FormatError;
use crate::token::Tokens;

/// Rendered in place of a token that has no value.
pub const NO_VALUE: &str = "-";

// ── Line-builder trait ────────────────────────────────────────────────────────

/// Builds one complete log line for one exchange.
///
/// Implemented by compiled [`Template`]s, by the built-in `dev` format, and
/// by any `Fn(&Tokens, &RequestContext, &ResponseContext) -> String`, so a
/// plain closure can be registered as a format.
pub trait FormatLine: Send + Sync + 'static {
    fn format_line(&self, tokens: &Tokens, req: &RequestContext, res: &ResponseContext) -> String;
}

impl<F> FormatLine for F
where
    F: Fn(&Tokens, &RequestContext, &ResponseContext) -> String + Send + Sync + 'static,
{
    fn format_line(&self, tokens: &Tokens, req: &RequestContext, res: &ResponseContext) -> String {
        self(tokens, req, res)
    }
}

/// A shared, type-erased line-builder. Cloning is one atomic increment.
pub type LineBuilder = Arc<dyn FormatLine>;

// ── Template ──────────────────────────────────────────────────────────────────

/// One piece of a parsed template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Literal(String),
    Token { name: String, arg: Option<String> },
}

/// A parsed, reusable template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Template {
    nodes: Vec<Node>,
}

impl Template {
    /// Parses `src` without checking token names against any table.
    ///
    /// Tokens missing at render time render as `-`.
    pub fn parse(src: &str) -> Self {
        Self { nodes: parse_nodes(src) }
    }

    /// Parses `src` and checks that every token it references exists.
    pub fn compile(src: &str, tokens: &Tokens) -> Result<Self, FormatError> {
        let template = Self::parse(src);
        if let Some(name) = template.token_names().find(|name| !tokens.contains(name)) {
            return Err(FormatError::UnknownToken {
                token: name.to_owned(),
                template: src.to_owned(),
            });
        }
        Ok(template)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Token names in order of appearance, repeats included.
    pub fn token_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Token { name, .. } => Some(name.as_str()),
            Node::Literal(_) => None,
        })
    }
}

impl FormatLine for Template {
    fn format_line(&self, tokens: &Tokens, req: &RequestContext, res: &ResponseContext) -> String {
        let mut line = String::new();
        for node in &self.nodes {
            match node {
                Node::Literal(text) => line.push_str(text),
                Node::Token { name, arg } => {
                    match tokens.eval(name, req, res, arg.as_deref()) {
                        Some(value) if !value.is_empty() => line.push_str(&value),
                        _ => line.push_str(NO_VALUE),
                    }
                }
            }
        }
        line
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

fn parse_nodes(src: &str) -> Vec<Node> {
    let bytes = src.as_bytes();
    let mut nodes = Vec::new();
    let mut literal_start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] != b':' {
            i += 1;
            continue;
        }

        let name_start = i + 1;
        let name_len = bytes[name_start..].iter().take_while(|b| is_name_byte(**b)).count();
        if name_len < 2 {
            i += 1;
            continue;
        }
        let name_end = name_start + name_len;

        // `[arg]` needs at least one byte and a closing bracket.
        let mut end = name_end;
        let mut arg = None;
        if bytes.get(name_end) == Some(&b'[') {
            let arg_start = name_end + 1;
            if let Some(len) = bytes[arg_start..].iter().position(|b| *b == b']') {
                if len > 0 {
                    arg = Some(src[arg_start..arg_start + len].to_owned());
                    end = arg_start + len + 1;
                }
            }
        }

        if literal_start < i {
            nodes.push(Node::Literal(src[literal_start..i].to_owned()));
        }
        nodes.push(Node::Token { name: src[name_start..name_end].to_owned(), arg });
        literal_start = end;
        i = end;
    }

    if literal_start < bytes.len() {
        nodes.push(Node::Literal(src[literal_start..].to_owned()));
    }
    nodes
}
