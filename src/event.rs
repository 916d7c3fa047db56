use serde_json::Value;

/// Structured observability sink.
///
/// Components receive a sink instead of writing to an ambient logger, so the
/// diagnostic side effects (placeholder discoveries, AMI searches, per-file
/// progress) are testable and disableable.
pub trait EventSink {
    fn emit(&self, message: &str, data: &Value);
}

/// Sink that writes `message\t{json}` lines to stderr.
#[derive(Debug, Default)]
pub struct StderrSink;

impl EventSink for StderrSink {
    fn emit(&self, message: &str, data: &Value) {
        if data.is_null() {
            eprintln!("{message}");
        } else {
            eprintln!("{message}\t{data}");
        }
    }
}

/// Sink that discards every event.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _message: &str, _data: &Value) {}
}
