//! Caller-visible message accumulation.
//!
//! User-facing conditions append here instead of aborting, so one action
//! can surface several independent warnings. The host drains the log after
//! each operation and decides how to display it.

/// Message severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational note (e.g. "nothing to recover").
    Info,
    /// Error the user should see (e.g. unreadable artifact).
    Error,
}

/// One accumulated message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Severity of the condition.
    pub severity: Severity,
    /// Human-readable text.
    pub text: String,
}

/// Accumulates info and error messages across one engine operation.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an informational message.
    pub fn info(&mut self, text: impl Into<String>) {
        self.entries.push(Message {
            severity: Severity::Info,
            text: text.into(),
        });
    }

    /// Append an error message.
    pub fn error(&mut self, text: impl Into<String>) {
        self.entries.push(Message {
            severity: Severity::Error,
            text: text.into(),
        });
    }

    /// Whether any error-severity message is pending.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|m| m.severity == Severity::Error)
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hand all pending messages to the caller, clearing the log.
    pub fn drain(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_and_drains() {
        let mut log = MessageLog::new();
        log.info("created preview");
        log.error("artifact unreadable");
        assert!(log.has_errors());

        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].severity, Severity::Info);
        assert_eq!(drained[1].severity, Severity::Error);
        assert!(log.is_empty());
        assert!(!log.has_errors());
    }
}
