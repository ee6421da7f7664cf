//! Where finished lines go.
//!
//! The middleware never writes anywhere itself. It hands every line to a
//! [`Sink`] and moves on; whatever the sink does with it (and whether that
//! fails) is the sink's business.

/// Receives one finished log line per exchange.
pub trait Sink: Send + Sync + 'static {
    fn info(&self, line: &str);
}

impl<F> Sink for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn info(&self, line: &str) {
        self(line)
    }
}

/// Emits each line as a `tracing` event at `INFO` under the
/// `access_log` target. The default sink.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn info(&self, line: &str) {
        tracing::info!(target: "access_log", "{line}");
    }
}
