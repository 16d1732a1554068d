use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::events::Message;

/// Which wire dialect a serving endpoint speaks. Absence of a cached value
/// for an endpoint means it has not been probed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointFormat {
    Agent,
    ChatCompletion,
}

impl From<&str> for EndpointFormat {
    fn from(value: &str) -> Self {
        match value {
            "chat_completion" => EndpointFormat::ChatCompletion,
            _ => EndpointFormat::Agent,
        }
    }
}

impl Display for EndpointFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointFormat::Agent => write!(f, "agent"),
            EndpointFormat::ChatCompletion => write!(f, "chat_completion"),
        }
    }
}

/// Payload for agent endpoints (multi-agent supervisors, agent frameworks).
pub fn agent_payload(messages: &[Message]) -> Value {
    json!({
        "input": messages,
        "databricks_options": {
            "return_trace": true,
        },
        "stream": true,
    })
}

/// Payload for chat completion endpoints (foundation models).
pub fn chat_completion_payload(messages: &[Message]) -> Value {
    json!({
        "messages": messages,
        "stream": true,
    })
}

pub fn payload_for(format: EndpointFormat, messages: &[Message]) -> Value {
    match format {
        EndpointFormat::Agent => agent_payload(messages),
        EndpointFormat::ChatCompletion => chat_completion_payload(messages),
    }
}

/// Known upstream error signatures that mean "this endpoint wants the chat
/// completion payload, not the agent payload". These substrings are tied to
/// specific upstream error wording; they are preserved as-is for
/// compatibility rather than replaced with a different negotiation scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchSignature {
    MissingChatParameter,
    MissingMessagesInput,
    ExtraInputField,
}

impl MismatchSignature {
    pub fn as_str(&self) -> &'static str {
        match self {
            MismatchSignature::MissingChatParameter => {
                "Missing required Chat parameter: 'messages'"
            }
            MismatchSignature::MissingMessagesInput => "Model is missing inputs ['messages']",
            MismatchSignature::ExtraInputField => "extra inputs: ['input']",
        }
    }
}

/// Classify an upstream error body. Substring-based; the first matching
/// signature wins. Returns `None` for genuine upstream failures, which must
/// not trigger a fallback probe.
pub fn classify_mismatch(error_text: &str) -> Option<MismatchSignature> {
    if error_text.contains(MismatchSignature::MissingChatParameter.as_str()) {
        return Some(MismatchSignature::MissingChatParameter);
    }
    if error_text.contains(MismatchSignature::MissingMessagesInput.as_str()) {
        return Some(MismatchSignature::MissingMessagesInput);
    }
    if error_text.contains(MismatchSignature::ExtraInputField.as_str())
        && error_text.contains("messages")
    {
        return Some(MismatchSignature::ExtraInputField);
    }
    None
}
