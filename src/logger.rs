//! Structured logging collaborator used by the consumer and the decorators.
//!
//! Components never assume a global subscriber: they receive an `Arc<dyn Logger>` and
//! default to [`NullLogger`]. Use [`TracingLogger`] to route events into `tracing`.

use std::sync::Arc;

use serde_json::Value;
use tracing::Level;

/// Key-value pairs attached to a log event.
pub type LogContext<'a> = &'a [(&'a str, Value)];

/// Receives structured log events.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, message: &str, context: LogContext<'_>);

    fn debug(&self, message: &str, context: LogContext<'_>) {
        self.log(Level::DEBUG, message, context);
    }

    fn info(&self, message: &str, context: LogContext<'_>) {
        self.log(Level::INFO, message, context);
    }

    fn warn(&self, message: &str, context: LogContext<'_>) {
        self.log(Level::WARN, message, context);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: Level, _message: &str, _context: LogContext<'_>) {}
}

/// The logger components fall back to when none is supplied.
pub fn null_logger() -> Arc<dyn Logger> {
    Arc::new(NullLogger)
}

/// Forwards events to the `tracing` subscriber; the context is rendered as a JSON object
/// in the `context` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str, context: LogContext<'_>) {
        let context = render_context(context);
        match level {
            Level::ERROR => tracing::error!(%context, "{message}"),
            Level::WARN => tracing::warn!(%context, "{message}"),
            Level::INFO => tracing::info!(%context, "{message}"),
            Level::DEBUG => tracing::debug!(%context, "{message}"),
            _ => tracing::trace!(%context, "{message}"),
        }
    }
}

fn render_context(context: LogContext<'_>) -> Value {
    Value::Object(
        context
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect(),
    )
}
