// SPDX-License-Identifier: Apache-2.0 OR MIT
// Logger handle and stderr sink

use super::{Facility, Severity};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

/// One log record, handed to the sink fully formed.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: Severity,
    pub facility: Facility,
    pub message: String,
    pub kvs: Vec<(String, String)>,
}

impl LogEntry {
    pub fn new(severity: Severity, facility: Facility, message: &str) -> Self {
        Self {
            severity,
            facility,
            message: message.to_string(),
            kvs: Vec::new(),
        }
    }

    pub fn add_kv(&mut self, key: &str, value: &str) {
        self.kvs.push((key.to_string(), value.to_string()));
    }
}

/// Destination for log entries.
pub trait LogSink: Send + Sync {
    fn write(&self, entry: &LogEntry);
}

/// JSON-per-line output on stderr.
///
/// Both roles write straight to stderr; the coordinator's and the children's
/// streams interleave at line granularity, which the JSON framing keeps
/// parseable.
pub struct StderrJsonSink;

impl LogSink for StderrJsonSink {
    fn write(&self, entry: &LogEntry) {
        let mut log_msg = serde_json::json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "level": entry.severity.as_str(),
            "facility": entry.facility.as_str(),
            "message": entry.message,
        });
        if !entry.kvs.is_empty() {
            let fields: serde_json::Map<String, serde_json::Value> = entry
                .kvs
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            log_msg["fields"] = serde_json::Value::Object(fields);
        }
        eprintln!("{}", log_msg);
        // No flush() - let stderr buffer naturally
    }
}

/// Logger handle for writing log entries.
///
/// This is a lightweight handle that can be cloned and passed around; the
/// sink and filtering state are shared via Arc.
pub struct Logger {
    sink: Arc<dyn LogSink>,
    /// Global minimum log level (default: Info)
    global_min_level: Arc<AtomicU8>,
    /// Per-facility minimum log levels
    facility_min_levels: Arc<RwLock<std::collections::HashMap<Facility, Severity>>>,
}

impl Logger {
    /// Create a logger over an arbitrary sink.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            global_min_level: Arc::new(AtomicU8::new(Severity::Info as u8)),
            facility_min_levels: Arc::new(RwLock::new(std::collections::HashMap::new())),
        }
    }

    /// Create a logger that writes JSON directly to stderr.
    pub fn stderr_json() -> Self {
        Self::new(Arc::new(StderrJsonSink))
    }

    /// Check if a log message should be written based on severity filtering
    #[inline]
    fn should_log(&self, severity: Severity, facility: Facility) -> bool {
        // A facility-specific level, if set, overrides the global one
        let levels = self.facility_min_levels.read().unwrap();
        if let Some(&min_level) = levels.get(&facility) {
            return severity <= min_level;
        }
        drop(levels);

        let global_min = self.global_min_level.load(Ordering::Relaxed);
        (severity as u8) <= global_min
    }

    /// Write a log entry
    #[inline]
    pub fn log(&self, severity: Severity, facility: Facility, message: &str) {
        if !self.should_log(severity, facility) {
            return;
        }
        self.sink.write(&LogEntry::new(severity, facility, message));
    }

    /// Write a log entry with key-value pairs
    #[inline]
    pub fn log_kv(
        &self,
        severity: Severity,
        facility: Facility,
        message: &str,
        kvs: &[(&str, &str)],
    ) {
        if !self.should_log(severity, facility) {
            return;
        }
        let mut entry = LogEntry::new(severity, facility, message);
        for (key, value) in kvs {
            entry.add_kv(key, value);
        }
        self.sink.write(&entry);
    }

    /// Log with critical severity
    #[inline]
    pub fn critical(&self, facility: Facility, message: &str) {
        self.log(Severity::Critical, facility, message);
    }

    /// Log with error severity
    #[inline]
    pub fn error(&self, facility: Facility, message: &str) {
        self.log(Severity::Error, facility, message);
    }

    /// Log with warning severity
    #[inline]
    pub fn warning(&self, facility: Facility, message: &str) {
        self.log(Severity::Warning, facility, message);
    }

    /// Log with notice severity
    #[inline]
    pub fn notice(&self, facility: Facility, message: &str) {
        self.log(Severity::Notice, facility, message);
    }

    /// Log with info severity
    #[inline]
    pub fn info(&self, facility: Facility, message: &str) {
        self.log(Severity::Info, facility, message);
    }

    /// Log with debug severity
    #[inline]
    pub fn debug(&self, facility: Facility, message: &str) {
        self.log(Severity::Debug, facility, message);
    }

    /// Set the global minimum log level
    pub fn set_global_level(&self, level: Severity) {
        self.global_min_level.store(level as u8, Ordering::Relaxed);
    }

    /// Set the minimum log level for a specific facility
    pub fn set_facility_level(&self, facility: Facility, level: Severity) {
        self.facility_min_levels
            .write()
            .unwrap()
            .insert(facility, level);
    }
}

impl Clone for Logger {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            global_min_level: Arc::clone(&self.global_min_level),
            facility_min_levels: Arc::clone(&self.facility_min_levels),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Captures entries for assertions.
    struct MemorySink {
        entries: Mutex<Vec<LogEntry>>,
    }

    impl MemorySink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                entries: Mutex::new(Vec::new()),
            })
        }

        fn messages(&self) -> Vec<String> {
            self.entries
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.message.clone())
                .collect()
        }
    }

    impl LogSink for MemorySink {
        fn write(&self, entry: &LogEntry) {
            self.entries.lock().unwrap().push(entry.clone());
        }
    }

    #[test]
    fn test_default_level_filters_debug() {
        let sink = MemorySink::new();
        let logger = Logger::new(sink.clone());

        logger.info(Facility::Test, "kept");
        logger.debug(Facility::Test, "filtered");

        assert_eq!(sink.messages(), vec!["kept"]);
    }

    #[test]
    fn test_facility_level_overrides_global() {
        let sink = MemorySink::new();
        let logger = Logger::new(sink.clone());

        logger.set_facility_level(Facility::Listener, Severity::Debug);
        logger.debug(Facility::Listener, "kept");
        logger.debug(Facility::Coordinator, "filtered");

        assert_eq!(sink.messages(), vec!["kept"]);
    }

    #[test]
    fn test_clone_shares_filtering_state() {
        let sink = MemorySink::new();
        let logger = Logger::new(sink.clone());
        let clone = logger.clone();

        logger.set_global_level(Severity::Error);
        clone.info(Facility::Test, "filtered");
        clone.error(Facility::Test, "kept");

        assert_eq!(sink.messages(), vec!["kept"]);
    }

    #[test]
    fn test_log_kv_records_fields() {
        let sink = MemorySink::new();
        let logger = Logger::new(sink.clone());

        logger.log_kv(
            Severity::Info,
            Facility::Test,
            "with context",
            &[("listener", "2"), ("count", "4")],
        );

        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kvs.len(), 2);
        assert_eq!(entries[0].kvs[0], ("listener".to_string(), "2".to_string()));
    }
}
