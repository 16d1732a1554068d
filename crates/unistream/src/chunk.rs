use serde::Deserialize;
use serde_json::Value;

use crate::events::StreamEvent;
use crate::formats::EndpointFormat;
use crate::mojibake;

/// Chunk type marker for agent-dialect text deltas. Agent endpoints emit
/// chunks already shaped as unified events.
const AGENT_TEXT_DELTA: &str = "response.output_text.delta";

/// Chunk type marker for chat completion stream chunks. Anything else in a
/// chat completion stream (usage summaries, etc.) carries no content.
const CHAT_COMPLETION_CHUNK: &str = "chat.completion.chunk";

/// One parsed chat completion stream chunk:
/// `{"object": "chat.completion.chunk", "choices": [{"delta": {...}}]}`.
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    object: String,
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<DeltaContent>,
}

/// Delta content is either a plain string or a list of typed parts (some
/// providers, e.g. Gemini-backed endpoints, use the list form).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeltaContent {
    Text(String),
    Parts(Vec<DeltaPart>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeltaPart {
    Text(String),
    Typed {
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        text: String,
    },
    Other(Value),
}

/// Translate one raw upstream chunk into zero or one unified events.
///
/// Agent-dialect chunks already carry the unified schema: text deltas are
/// forwarded as-is and everything else is dropped. Chat-completion chunks
/// are reshaped, with role-only and finish-reason-only chunks silently
/// skipped and the delta text passed through mojibake repair.
pub fn translate_chunk(raw: &Value, format: EndpointFormat) -> Option<StreamEvent> {
    match format {
        EndpointFormat::Agent => translate_agent_chunk(raw),
        EndpointFormat::ChatCompletion => translate_chat_completion_chunk(raw),
    }
}

fn translate_agent_chunk(raw: &Value) -> Option<StreamEvent> {
    if raw.get("type").and_then(Value::as_str) != Some(AGENT_TEXT_DELTA) {
        return None;
    }
    let delta = raw.get("delta").and_then(Value::as_str)?;
    Some(StreamEvent::TextDelta {
        delta: delta.to_string(),
    })
}

fn translate_chat_completion_chunk(raw: &Value) -> Option<StreamEvent> {
    let chunk: ChatCompletionChunk = serde_json::from_value(raw.clone()).ok()?;

    if chunk.object != CHAT_COMPLETION_CHUNK {
        return None;
    }

    let content = chunk.choices.into_iter().next()?.delta.content?;

    let text = match content {
        DeltaContent::Text(text) => text,
        DeltaContent::Parts(parts) => {
            let mut buf = String::new();
            for part in parts {
                match part {
                    DeltaPart::Text(text) => buf.push_str(&text),
                    DeltaPart::Typed { kind, text } if kind == "text" => buf.push_str(&text),
                    _ => {}
                }
            }
            buf
        }
    };

    if text.is_empty() {
        return None;
    }

    Some(StreamEvent::TextDelta {
        delta: mojibake::repair(&text),
    })
}
