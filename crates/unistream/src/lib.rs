//! unistream: a library for normalizing heterogeneous model-serving
//! stream chunks into one unified client-facing event schema.
//!
//! Upstream serving endpoints speak one of two dialects: the agent dialect
//! (chunks already shaped as unified events) or the OpenAI-style chat
//! completion dialect. This crate builds the request payload for either
//! dialect, classifies the error signatures that indicate an endpoint wants
//! the other one, translates raw chunks into [`StreamEvent`]s, and repairs
//! a specific character-encoding corruption some endpoints produce.

pub mod chunk;
pub mod events;
pub mod formats;
pub mod mojibake;

// Re-export important types
pub use chunk::translate_chunk;
pub use events::{Message, StreamEvent, DONE_FRAME};
pub use formats::{classify_mismatch, payload_for, EndpointFormat, MismatchSignature};
pub use mojibake::repair;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_format_conversion() {
        assert_eq!(EndpointFormat::from("agent"), EndpointFormat::Agent);
        assert_eq!(
            EndpointFormat::from("chat_completion"),
            EndpointFormat::ChatCompletion
        );
    }

    #[test]
    fn test_chat_completion_chunk_to_unified_event() {
        // One upstream chat completion chunk becomes one unified text delta
        let raw: serde_json::Value = serde_json::from_str(
            r#"{"id":"chatcmpl-123","object":"chat.completion.chunk","created":1694268190,"model":"my-model","choices":[{"index":0,"delta":{"role":"assistant","content":"Hello"},"finish_reason":null}]}"#,
        )
        .unwrap();

        let event = translate_chunk(&raw, EndpointFormat::ChatCompletion);
        match event {
            Some(StreamEvent::TextDelta { delta }) => assert_eq!(delta, "Hello"),
            other => panic!("expected TextDelta, got {:?}", other),
        }
    }
}
