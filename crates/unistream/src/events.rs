use serde::{Deserialize, Serialize};
use serde_json::json;

/// One chat message. Insertion order is conversation order and is preserved
/// end-to-end; the gateway never reorders or rewrites messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// The stream terminator every SSE response ends with, normal or not.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// The unified event schema. This is the only shape handed to the client
/// after translation, regardless of the upstream dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta { delta: String },
    Done,
    Error { message: String },
}

impl StreamEvent {
    /// Render this event as one SSE frame (`data: <json>\n\n`). `Done`
    /// renders as the literal `[DONE]` sentinel frame.
    pub fn to_sse_frame(&self) -> String {
        match self {
            StreamEvent::TextDelta { delta } => {
                let payload = json!({
                    "type": "response.output_text.delta",
                    "delta": delta,
                });
                format!("data: {}\n\n", payload)
            }
            StreamEvent::Error { message } => {
                let payload = json!({
                    "type": "error",
                    "error": message,
                });
                format!("data: {}\n\n", payload)
            }
            StreamEvent::Done => DONE_FRAME.to_string(),
        }
    }

    /// A terminal event is the last event of a logical stream; nothing may
    /// follow it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn text_delta_frame_matches_wire_format() {
        let event = StreamEvent::TextDelta {
            delta: "Hello".to_string(),
        };
        assert_eq!(
            event.to_sse_frame(),
            "data: {\"type\":\"response.output_text.delta\",\"delta\":\"Hello\"}\n\n"
        );
    }

    #[test]
    fn error_frame_matches_wire_format() {
        let event = StreamEvent::Error {
            message: "upstream exploded".to_string(),
        };
        assert_eq!(
            event.to_sse_frame(),
            "data: {\"type\":\"error\",\"error\":\"upstream exploded\"}\n\n"
        );
    }

    #[test]
    fn done_renders_sentinel() {
        assert_eq!(StreamEvent::Done.to_sse_frame(), DONE_FRAME);
        assert!(StreamEvent::Done.is_terminal());
        assert!(!StreamEvent::TextDelta {
            delta: String::new()
        }
        .is_terminal());
    }
}
