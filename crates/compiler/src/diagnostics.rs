//! Diagnostics and error escape
//!
//! The front-end stops at the first hard error: the failing stage builds a
//! [`CompilerError`] with the position embedded in the message, every
//! caller propagates it with `?`, and the session entry point reports it
//! once through the [`Diagnostics`] sink before returning a non-zero
//! status. Nothing is recoverable mid-session.

use std::error::Error;
use std::fmt;

/// A fatal front-end error. The message carries `chunk:line:` position
/// information for lexical and syntactic failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompilerError {
    /// Invalid character, malformed number, unterminated string.
    Lexical(String),
    /// Unexpected or missing token, structural violations.
    Syntax(String),
    /// Violations detected at parse/lowering time (type name too long,
    /// unresolvable constructs).
    Semantic(String),
}

impl CompilerError {
    pub fn lexical(chunk: &str, line: u32, message: impl fmt::Display) -> Self {
        CompilerError::Lexical(format!("{}:{}: {}", chunk, line, message))
    }

    pub fn syntax(chunk: &str, line: u32, message: impl fmt::Display) -> Self {
        CompilerError::Syntax(format!("{}:{}: {}", chunk, line, message))
    }

    pub fn semantic(chunk: &str, line: u32, message: impl fmt::Display) -> Self {
        CompilerError::Semantic(format!("{}:{}: {}", chunk, line, message))
    }

    pub fn message(&self) -> &str {
        match self {
            CompilerError::Lexical(m) | CompilerError::Syntax(m) | CompilerError::Semantic(m) => m,
        }
    }
}

impl fmt::Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl Error for CompilerError {}

/// Sink for compiler output channels: one `error` per failed session and
/// any number of `debug` messages.
pub trait Diagnostics {
    fn error(&mut self, message: &str);
    fn debug(&mut self, filename: &str, line: u32, message: &str);
}

/// Routes diagnostics into the `tracing` subscriber.
#[derive(Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn error(&mut self, message: &str) {
        tracing::error!(target: "tarnc", "{message}");
    }

    fn debug(&mut self, filename: &str, line: u32, message: &str) {
        tracing::debug!(target: "tarnc", "{filename}:{line}: {message}");
    }
}

/// Buffers everything; used by tests and embedders that want the text.
#[derive(Default)]
pub struct CollectingDiagnostics {
    pub errors: Vec<String>,
    pub debug_messages: Vec<String>,
}

impl Diagnostics for CollectingDiagnostics {
    fn error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    fn debug(&mut self, filename: &str, line: u32, message: &str) {
        self.debug_messages.push(format!("{filename}:{line}: {message}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_embedded_in_message() {
        let err = CompilerError::syntax("chunk.tarn", 7, "'end' expected");
        assert_eq!(err.message(), "chunk.tarn:7: 'end' expected");
        assert_eq!(err.to_string(), err.message());
    }

    #[test]
    fn test_collecting_sink() {
        let mut sink = CollectingDiagnostics::default();
        sink.debug("f.tarn", 1, "parsed chunk");
        sink.error("f.tarn:2: unexpected symbol");
        assert_eq!(sink.errors.len(), 1);
        assert_eq!(sink.debug_messages, vec!["f.tarn:1: parsed chunk"]);
    }
}
