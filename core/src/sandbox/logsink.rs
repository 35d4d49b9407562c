use uuid::Uuid;

use super::types::{RuleLogEntry, RuleLogLevel, RuleLogMode};

/// The single sink behind every injected console binding. The mode is
/// chosen once per invocation; the bindings call [`LogSink::emit`]
/// uniformly.
#[derive(Debug)]
pub(crate) enum LogSink {
    Drop,
    Console { invocation: Uuid },
    Capture { entries: Vec<RuleLogEntry> },
}

impl LogSink {
    pub fn new(mode: RuleLogMode, invocation: Uuid) -> Self {
        match mode {
            RuleLogMode::Drop => LogSink::Drop,
            RuleLogMode::Console => LogSink::Console { invocation },
            RuleLogMode::Capture => LogSink::Capture {
                entries: Vec::new(),
            },
        }
    }

    pub fn emit(&mut self, level: RuleLogLevel, msg: String) {
        match self {
            LogSink::Drop => {}
            LogSink::Console { invocation } => match level {
                RuleLogLevel::Info => tracing::info!(rule_invocation = %invocation, "{}", msg),
                RuleLogLevel::Warn => tracing::warn!(rule_invocation = %invocation, "{}", msg),
                RuleLogLevel::Error => tracing::error!(rule_invocation = %invocation, "{}", msg),
            },
            LogSink::Capture { entries } => entries.push(RuleLogEntry { level, msg }),
        }
    }

    pub fn into_entries(self) -> Vec<RuleLogEntry> {
        match self {
            LogSink::Capture { entries } => entries,
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_preserves_emission_order() {
        let mut sink = LogSink::new(RuleLogMode::Capture, Uuid::nil());
        sink.emit(RuleLogLevel::Info, "first".to_string());
        sink.emit(RuleLogLevel::Error, "second".to_string());
        let entries = sink.into_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].msg, "first");
        assert_eq!(entries[1].level, RuleLogLevel::Error);
    }

    #[test]
    fn drop_mode_keeps_nothing() {
        let mut sink = LogSink::new(RuleLogMode::Drop, Uuid::nil());
        sink.emit(RuleLogLevel::Info, "gone".to_string());
        assert!(sink.into_entries().is_empty());
    }
}
