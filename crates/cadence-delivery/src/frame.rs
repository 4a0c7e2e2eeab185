//! Line-oriented decoder for the live event feed.
//!
//! The backend answers with lines of the form `data: {json}`. Body fragments
//! arrive at arbitrary boundaries, so bytes are buffered until a full line is
//! available and only then decoded.

use cadence_core::events::DeliveryEvent;
use serde_json::{Map, Value};

/// Prefix marking a candidate event line.
pub const DATA_PREFIX: &str = "data: ";

/// Characters whose presence means a payload was meant to be structured.
const STRUCTURAL_MARKERS: &[char] = &['{', '}', '[', ']', '"', ':'];

/// One decoded `data: ` payload. Fields are read individually so a field
/// of an unexpected type never hides the others on the same line.
type FramePayload = Map<String, Value>;

/// Incremental decoder turning body fragments into [`DeliveryEvent`]s.
///
/// One parser serves exactly one delivery. After an explicit `error` frame it
/// halts and ignores everything fed afterwards.
#[derive(Debug, Default)]
pub struct ChunkFrameParser {
    pending: Vec<u8>,
    halted: bool,
    dropped: u64,
}

impl ChunkFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw body fragment, returning the events completed by it in
    /// arrival order.
    pub fn feed(&mut self, fragment: &[u8]) -> Vec<DeliveryEvent> {
        let mut events = Vec::new();
        if self.halted {
            return events;
        }
        self.pending.extend_from_slice(fragment);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.decode_line(&line[..line.len() - 1], &mut events);
            if self.halted {
                self.pending.clear();
                break;
            }
        }
        events
    }

    /// Convenience wrapper over [`feed`](Self::feed) for text fragments.
    pub fn feed_str(&mut self, fragment: &str) -> Vec<DeliveryEvent> {
        self.feed(fragment.as_bytes())
    }

    /// Flush a trailing line that was never newline-terminated.
    ///
    /// Called once the transport reports end of body.
    pub fn finish(&mut self) -> Vec<DeliveryEvent> {
        let mut events = Vec::new();
        if self.halted || self.pending.is_empty() {
            self.pending.clear();
            return events;
        }
        let line = std::mem::take(&mut self.pending);
        self.decode_line(&line, &mut events);
        events
    }

    /// Whether an explicit error frame ended this stream.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Number of `data: ` lines dropped because their payload did not parse.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    fn decode_line(&mut self, raw: &[u8], events: &mut Vec<DeliveryEvent>) {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        let Some(body) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };
        if body.trim().is_empty() {
            return;
        }

        let payload: FramePayload = match serde_json::from_str(body) {
            Ok(p) => p,
            Err(e) => {
                self.dropped += 1;
                if !body.contains(STRUCTURAL_MARKERS) {
                    tracing::debug!(frame = %body, "Ignoring unstructured data frame");
                } else {
                    tracing::trace!(error = %e, "Dropping malformed data frame");
                }
                return;
            }
        };

        if let Some(message) = payload.get("error").and_then(error_message) {
            tracing::debug!(error = %message, "Stream reported an error");
            events.push(DeliveryEvent::Error(message));
            self.halted = true;
            return;
        }
        if let Some(content) = text_field(&payload, "content") {
            events.push(DeliveryEvent::ContentChunk(content));
        }
        if let Some(model) = text_field(&payload, "model") {
            events.push(DeliveryEvent::ModelAnnounced(model));
        }
        if payload.get("done").is_some_and(is_truthy) {
            events.push(DeliveryEvent::Done);
        }
    }
}

/// Non-empty string value of `key`. Values of any other type are skipped.
fn text_field(payload: &FramePayload, key: &str) -> Option<String> {
    match payload.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::String(_)) | None => None,
        Some(other) => {
            tracing::trace!(field = key, value = %other, "Ignoring non-text frame field");
            None
        }
    }
}

/// Reason carried by an `error` field, or `None` when it reports nothing.
///
/// Structured errors use their `message` when it is a non-empty string and
/// their JSON text otherwise.
fn error_message(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) => (!s.is_empty()).then(|| s.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(fields) if fields.is_empty() => None,
        Value::Object(fields) => match fields.get("message") {
            Some(Value::String(m)) if !m.is_empty() => Some(m.clone()),
            _ => Some(value.to_string()),
        },
        other => Some(other.to_string()),
    }
}

/// Loose truthiness for the `done` flag.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
