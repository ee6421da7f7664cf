//! Unified error types.

/// Setup-time failure while defining or compiling a log format.
///
/// Every `FormatError` surfaces while the application is wiring its access
/// log: registering tokens, defining formats, or resolving the format the
/// middleware will use. Nothing on the request path returns one; a token
/// without a value renders `-` instead.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    /// The template references a token nobody registered.
    #[error("unknown token `:{token}` in format `{template}`")]
    UnknownToken { token: String, template: String },

    /// A token or format was registered under an empty name.
    #[error("token and format names must not be empty")]
    MissingName,
}

/// The error type returned by the bundled [`Server`](crate::Server).
///
/// Only infrastructure failures end up here (binding a port, reading the
/// listener address). Format problems are caught earlier, when the
/// [`AccessLog`](crate::AccessLog) handed to the server is built.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
