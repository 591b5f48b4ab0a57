use super::notifier::OutputNotifier;
use crate::domain::bridge::BindingId;
use crate::domain::conversation::{EntryTimestamp, LogChange, LogEntry};
use crate::ports::session::LogChangeStream;
use crate::telemetry::BridgeMetrics;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Separator between assistant messages in an output snapshot.
pub const OUTPUT_SEPARATOR: &str = "\n\n";

/// Turns log changes into output notifications.
///
/// An entry is announced once, the first time it carries assistant text,
/// whether or not it is still streaming. Later replacements of an announced
/// timestamp stay silent.
#[derive(Debug, Default)]
pub struct OutputTranslator {
    announced: HashSet<EntryTimestamp>,
}

impl OutputTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate(&mut self, change: &LogChange) -> Option<String> {
        let entry = change.entry();
        let text = entry.output_text()?;
        if !self.announced.insert(entry.timestamp) {
            trace!(timestamp = %entry.timestamp, "suppressing repeat notification");
            return None;
        }
        Some(text.to_string())
    }
}

/// Joins every assistant text in the log. `None` rather than an empty string
/// when there is nothing to show.
pub fn snapshot_output(entries: &[LogEntry]) -> Option<String> {
    let texts: Vec<&str> = entries.iter().filter_map(LogEntry::output_text).collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join(OUTPUT_SEPARATOR))
    }
}

/// Runs the translation pipeline for one binding until the change stream ends
/// or the task is aborted.
pub fn spawn_translation_task(
    mut changes: LogChangeStream,
    notifier: Arc<OutputNotifier>,
    metrics: Option<Arc<BridgeMetrics>>,
    binding_id: BindingId,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut translator = OutputTranslator::new();
        while let Some(change) = changes.recv().await {
            let Some(text) = translator.translate(&change) else {
                continue;
            };
            let delivered = notifier.publish(&text);
            debug!(
                %binding_id,
                change = change.label(),
                timestamp = %change.entry().timestamp,
                delivered,
                "assistant output published"
            );
            if let Some(metrics) = &metrics {
                metrics.record_notification(delivered);
            }
        }
        debug!(%binding_id, "session change stream closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::{EntryDirection, EntryKind};

    fn ts(millis: i64) -> EntryTimestamp {
        EntryTimestamp::from_millis(millis)
    }

    #[test]
    fn only_engine_text_is_translated() {
        let mut translator = OutputTranslator::new();
        let tool = LogEntry::new(
            ts(3),
            EntryDirection::FromEngine,
            EntryKind::ToolResult,
            Some("{}".into()),
        );
        assert_eq!(
            translator.translate(&LogChange::Appended(LogEntry::engine_text(ts(1), "A"))),
            Some("A".to_string())
        );
        assert_eq!(
            translator.translate(&LogChange::Appended(LogEntry::question(ts(2), "Q"))),
            None
        );
        assert_eq!(translator.translate(&LogChange::Appended(tool)), None);
        assert_eq!(
            translator.translate(&LogChange::Appended(LogEntry::new(
                ts(4),
                EntryDirection::FromEngine,
                EntryKind::Text,
                None
            ))),
            None
        );
    }

    #[test]
    fn streamed_entry_announces_its_first_text_only() {
        let mut translator = OutputTranslator::new();
        let partial = LogEntry::engine_text(ts(10), "Hel").with_partial(true);
        assert_eq!(
            translator.translate(&LogChange::Appended(partial)),
            Some("Hel".to_string())
        );
        let growing = LogEntry::engine_text(ts(10), "Hello wor").with_partial(true);
        assert_eq!(translator.translate(&LogChange::Replaced(growing)), None);
        let done = LogEntry::engine_text(ts(10), "Hello world");
        assert_eq!(translator.translate(&LogChange::Replaced(done)), None);
    }

    #[test]
    fn entry_without_text_announces_once_text_arrives() {
        let mut translator = OutputTranslator::new();
        let empty = LogEntry::engine_text(ts(20), "").with_partial(true);
        assert_eq!(translator.translate(&LogChange::Appended(empty)), None);
        let filled = LogEntry::engine_text(ts(20), "Hi").with_partial(true);
        assert_eq!(
            translator.translate(&LogChange::Replaced(filled)),
            Some("Hi".to_string())
        );
    }

    #[test]
    fn snapshot_joins_assistant_text_with_blank_lines() {
        let entries = vec![
            LogEntry::engine_text(ts(1), "A"),
            LogEntry::question(ts(2), "Q"),
            LogEntry::engine_text(ts(3), "B"),
        ];
        assert_eq!(snapshot_output(&entries), Some("A\n\nB".to_string()));
    }

    #[test]
    fn snapshot_without_output_is_absent() {
        assert_eq!(snapshot_output(&[]), None);
        let entries = vec![
            LogEntry::question(ts(1), "Q"),
            LogEntry::engine_text(ts(2), ""),
        ];
        assert_eq!(snapshot_output(&entries), None);
    }
}
