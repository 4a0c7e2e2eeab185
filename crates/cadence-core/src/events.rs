use serde::{Deserialize, Serialize};

/// A single step of an assistant reply.
///
/// Produced either by the live frame parser or by the replay scheduler and
/// consumed only by the response assembler. Both producers emit the same
/// shapes, so the assembler cannot tell live and replayed deliveries apart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DeliveryEvent {
    /// More reply text, appended verbatim.
    ContentChunk(String),
    /// Name of the model producing the reply. Withheld from the UI until
    /// the delivery finishes.
    ModelAnnounced(String),
    /// The delivery failed. The payload is a diagnostic, never shown.
    Error(String),
    /// The delivery finished successfully.
    Done,
}

impl DeliveryEvent {
    /// Whether applying this event ends the delivery.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryEvent::Error(_) | DeliveryEvent::Done)
    }

    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryEvent::ContentChunk(_) => "content_chunk",
            DeliveryEvent::ModelAnnounced(_) => "model_announced",
            DeliveryEvent::Error(_) => "error",
            DeliveryEvent::Done => "done",
        }
    }
}
