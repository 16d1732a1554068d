use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::configuration::{AgentConfig, UpstreamConfig};
use common::errors::GatewayError;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};
use unistream::{
    classify_mismatch, formats, payload_for, translate_chunk, EndpointFormat, Message, StreamEvent,
};

use crate::bridge::{spawn_bridge, StreamMessage, StreamProducer};
use crate::handlers::deployment::{DeploymentHandler, EventStream};
use crate::resolver::FormatResolver;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Handler for model serving endpoints reached at
/// `{host}/serving-endpoints/{endpoint_name}/invocations`.
///
/// The endpoint's wire dialect (agent vs. chat completion) is auto-detected
/// on first use and cached in the shared [`FormatResolver`]; chat completion
/// chunks are converted to the unified event schema so the client sees one
/// protocol either way.
pub struct ServingEndpointHandler {
    endpoint_name: String,
    upstream: UpstreamConfig,
    resolver: Arc<FormatResolver>,
}

impl ServingEndpointHandler {
    pub fn new(
        agent: &AgentConfig,
        upstream: UpstreamConfig,
        resolver: Arc<FormatResolver>,
    ) -> Result<Self, GatewayError> {
        let endpoint_name =
            agent
                .endpoint_name
                .clone()
                .ok_or_else(|| GatewayError::MissingEndpointName {
                    agent_id: agent.id.clone(),
                })?;

        Ok(Self {
            endpoint_name,
            upstream,
            resolver,
        })
    }

    fn invocations_url(&self) -> String {
        format!(
            "{}/serving-endpoints/{}/invocations",
            self.upstream.host, self.endpoint_name
        )
    }
}

#[async_trait]
impl DeploymentHandler for ServingEndpointHandler {
    async fn invoke(&self, messages: &[Message]) -> Result<Value, GatewayError> {
        let url = self.invocations_url();
        info!(endpoint = %self.endpoint_name, "calling serving endpoint");

        let client = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::UpstreamUnreachable(e.to_string()))?;

        let response = client
            .post(&url)
            .bearer_auth(&self.upstream.token)
            .json(&json!({ "input": messages }))
            .send()
            .await
            .map_err(|e| GatewayError::UpstreamUnreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::UpstreamUnreachable(e.to_string()))?;
        debug!(endpoint = %self.endpoint_name, response = %result, "raw upstream response");

        let text = extract_response_text(&result);
        Ok(aggregated_response(&self.endpoint_name, text))
    }

    async fn invoke_stream(&self, messages: Vec<Message>) -> EventStream {
        let endpoint_name = self.endpoint_name.clone();
        let upstream = self.upstream.clone();
        let resolver = Arc::clone(&self.resolver);
        let url = self.invocations_url();

        let rx = spawn_bridge(move |producer| {
            pump_endpoint(&endpoint_name, &url, &upstream, &resolver, &messages, producer);
        });

        Box::pin(ReceiverStream::new(rx).filter_map(|message| match message {
            StreamMessage::Chunk { raw, format } => translate_chunk(&raw, format),
            StreamMessage::Done => Some(StreamEvent::Done),
            StreamMessage::Error(message) => Some(StreamEvent::Error { message }),
        }))
    }
}

/// Blocking worker body: resolve the endpoint's format (probing if it has
/// never been seen), open the upstream stream and pump its chunks over the
/// bridge. Always leaves exactly one terminal on the channel.
fn pump_endpoint(
    endpoint_name: &str,
    url: &str,
    upstream: &UpstreamConfig,
    resolver: &FormatResolver,
    messages: &[Message],
    producer: &mut StreamProducer,
) {
    let client = match reqwest::blocking::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            producer.error(format!("failed to build upstream client: {}", e));
            return;
        }
    };

    // Known format: no probing, go straight to the cached shape.
    if let Some(format) = resolver.cached(endpoint_name) {
        debug!(endpoint = %endpoint_name, format = %format, "using cached endpoint format");
        match open_stream(&client, url, upstream, &payload_for(format, messages)) {
            Ok(response) => pump_lines(response, format, producer),
            Err(e) => {
                error!(endpoint = %endpoint_name, error = %e, "upstream call failed");
                producer.error(e.to_string());
            }
        }
        return;
    }

    // Format unknown: probe with the agent payload first.
    info!(endpoint = %endpoint_name, "probing endpoint format");
    match open_stream(&client, url, upstream, &formats::agent_payload(messages)) {
        Ok(response) => {
            resolver.record(endpoint_name, EndpointFormat::Agent);
            pump_lines(response, EndpointFormat::Agent, producer);
        }
        Err(probe_error) => {
            let error_text = probe_error.to_string();
            match classify_mismatch(&error_text) {
                Some(signature) => {
                    info!(
                        endpoint = %endpoint_name,
                        signature = ?signature,
                        "endpoint requires chat_completion format, retrying"
                    );
                    match open_stream(
                        &client,
                        url,
                        upstream,
                        &formats::chat_completion_payload(messages),
                    ) {
                        Ok(response) => {
                            resolver.record(endpoint_name, EndpointFormat::ChatCompletion);
                            pump_lines(response, EndpointFormat::ChatCompletion, producer);
                        }
                        Err(retry_error) => {
                            // Format stays unrecorded so the next call probes again.
                            error!(endpoint = %endpoint_name, error = %retry_error, "fallback probe failed");
                            producer.error(retry_error.to_string());
                        }
                    }
                }
                None => {
                    error!(endpoint = %endpoint_name, error = %error_text, "upstream call failed");
                    producer.error(error_text);
                }
            }
        }
    }
}

/// POST the payload and hand back the open response on 2xx. A non-2xx
/// status becomes a typed error carrying the body text, which is what the
/// mismatch signatures are matched against.
fn open_stream(
    client: &reqwest::blocking::Client,
    url: &str,
    upstream: &UpstreamConfig,
    payload: &Value,
) -> Result<reqwest::blocking::Response, GatewayError> {
    let response = client
        .post(url)
        .bearer_auth(&upstream.token)
        .json(payload)
        .send()
        .map_err(|e| GatewayError::UpstreamUnreachable(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(GatewayError::Upstream {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Pull SSE lines off the blocking response and push decoded chunks over
/// the bridge. Undecodable lines are skipped, not fatal. Stops early if the
/// consumer has gone away.
fn pump_lines(
    response: reqwest::blocking::Response,
    format: EndpointFormat,
    producer: &mut StreamProducer,
) {
    let reader = BufReader::new(response);

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                producer.error(format!("error reading upstream stream: {}", e));
                return;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "data: [DONE]" || line == "[DONE]" {
            break;
        }

        let json_str = line
            .strip_prefix("data:")
            .map(str::trim_start)
            .unwrap_or(line);
        if json_str.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(json_str) {
            Ok(raw) => {
                debug!(format = %format, chunk = %raw, "upstream chunk");
                if !producer.send_chunk(raw, format) {
                    debug!("consumer dropped, stopping upstream pull");
                    return;
                }
            }
            Err(e) => {
                let preview: String = json_str.chars().take(200).collect();
                warn!(error = %e, line = %preview, "failed to parse stream chunk, skipping");
            }
        }
    }

    producer.done();
}

/// Pull the assistant text out of the nested agent response shape
/// `{"output":[{"content":[{"text": ...}]}]}`, falling back to the legacy
/// `{"predictions":[{"candidates":[{"text": ...}]}]}` shape, and as a last
/// resort stringifying the whole body.
fn extract_response_text(result: &Value) -> String {
    if let Some(text) = result
        .pointer("/output/0/content/0/text")
        .and_then(Value::as_str)
    {
        if !text.is_empty() {
            return text.to_string();
        }
    }

    if let Some(text) = result
        .pointer("/predictions/0/candidates/0/text")
        .and_then(Value::as_str)
    {
        if !text.is_empty() {
            return text.to_string();
        }
    }

    result.to_string()
}

/// OpenAI-compatible aggregated response envelope for the client.
fn aggregated_response(endpoint_name: &str, content: String) -> Value {
    json!({
        "choices": [
            {
                "message": {
                    "role": "assistant",
                    "content": content,
                },
                "index": 0,
                "finish_reason": "stop",
            }
        ],
        "usage": {},
        "model": endpoint_name,
        "object": "chat.completion",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_agent_response_text() {
        let result = json!({
            "output": [{"content": [{"text": "Hello!", "type": "output_text"}]}]
        });
        assert_eq!(extract_response_text(&result), "Hello!");
    }

    #[test]
    fn falls_back_to_legacy_predictions_shape() {
        let result = json!({
            "predictions": [{"candidates": [{"text": "legacy hello"}]}]
        });
        assert_eq!(extract_response_text(&result), "legacy hello");
    }

    #[test]
    fn stringifies_unknown_shapes() {
        let result = json!({"unexpected": true});
        assert_eq!(extract_response_text(&result), r#"{"unexpected":true}"#);
    }

    #[test]
    fn aggregated_response_is_openai_compatible() {
        let response = aggregated_response("my-endpoint", "Hi".to_string());
        assert_eq!(response["object"], "chat.completion");
        assert_eq!(response["model"], "my-endpoint");
        assert_eq!(response["choices"][0]["message"]["content"], "Hi");
        assert_eq!(response["choices"][0]["finish_reason"], "stop");
    }
}
