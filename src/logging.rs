//! In-memory log capture feeding the admin log page and its SSE stream.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    pub fn format(&self) -> String {
        format!(
            "{} {} [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.target,
            self.message
        )
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn severity(&self) -> u8 {
        severity(&self.level)
    }
}

fn severity(level: &str) -> u8 {
    match level.to_ascii_uppercase().as_str() {
        "TRACE" => 0,
        "DEBUG" => 1,
        "INFO" => 2,
        "WARN" => 3,
        "ERROR" => 4,
        _ => 2,
    }
}

/// Ring buffer of recent entries plus a broadcast for live followers
pub struct LogBuffer {
    tx: broadcast::Sender<LogEntry>,
    recent: RwLock<VecDeque<LogEntry>>,
    max_entries: usize,
}

impl LogBuffer {
    pub fn new(max_entries: usize) -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(max_entries)),
            max_entries,
        }
    }

    pub fn push(&self, entry: LogEntry) {
        {
            let mut recent = self.recent.write();
            if recent.len() >= self.max_entries {
                recent.pop_front();
            }
            recent.push_back(entry.clone());
        }

        // No followers is fine
        let _ = self.tx.send(entry);
    }

    /// Last `count` entries at or above `min_level` (e.g. "WARN"), oldest first
    pub fn get_recent(&self, count: usize, min_level: Option<&str>) -> Vec<LogEntry> {
        let floor = min_level.map(severity).unwrap_or(0);
        let recent = self.recent.read();
        let mut entries: Vec<LogEntry> = recent
            .iter()
            .rev()
            .filter(|e| e.severity() >= floor)
            .take(count)
            .cloned()
            .collect();
        entries.reverse();
        entries
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.tx.subscribe()
    }
}

pub type SharedLogBuffer = Arc<LogBuffer>;

pub fn create_log_buffer(max_entries: usize) -> SharedLogBuffer {
    Arc::new(LogBuffer::new(max_entries))
}

/// Tracing layer that copies events into a [`LogBuffer`]
pub struct LogCaptureLayer {
    buffer: SharedLogBuffer,
    max_level: Level,
}

impl LogCaptureLayer {
    pub fn new(buffer: SharedLogBuffer) -> Self {
        Self {
            buffer,
            max_level: Level::DEBUG,
        }
    }

    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }
}

impl<S> Layer<S> for LogCaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > self.max_level {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(LogEntry {
            timestamp: chrono::Utc::now(),
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message: visitor.finish(),
        });
    }
}

/// Collects the message and any structured fields as `key=value`
#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: String,
}

impl FieldVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{}", value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn entry(level: &str, message: &str) -> LogEntry {
        LogEntry {
            timestamp: chrono::Utc::now(),
            level: level.to_string(),
            target: "test".to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_log_buffer_overflow() {
        let buffer = create_log_buffer(2);
        for i in 1..=5 {
            buffer.push(entry("INFO", &format!("Message {}", i)));
        }

        let recent = buffer.get_recent(10, None);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "Message 4");
        assert_eq!(recent[1].message, "Message 5");
    }

    #[test]
    fn test_level_filter_keeps_order() {
        let buffer = create_log_buffer(10);
        buffer.push(entry("ERROR", "first"));
        buffer.push(entry("INFO", "noise"));
        buffer.push(entry("WARN", "second"));

        let warnings: Vec<_> = buffer
            .get_recent(10, Some("warn"))
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(warnings, vec!["first", "second"]);
        assert_eq!(buffer.get_recent(1, None)[0].message, "second");
    }

    #[test]
    fn test_layer_captures_message_and_fields() {
        let buffer = create_log_buffer(10);
        let subscriber = tracing_subscriber::registry()
            .with(LogCaptureLayer::new(buffer.clone()).with_max_level(Level::INFO));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(participant = "awa@example.com", "Checked in");
            tracing::debug!("dropped by level");
        });

        let recent = buffer.get_recent(10, None);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].level, "INFO");
        assert_eq!(recent[0].message, "Checked in participant=awa@example.com");
    }

    #[tokio::test]
    async fn test_subscribers_receive_new_entries() {
        let buffer = create_log_buffer(10);
        let mut rx = buffer.subscribe();
        buffer.push(entry("INFO", "live"));
        assert_eq!(rx.recv().await.unwrap().message, "live");
    }
}
