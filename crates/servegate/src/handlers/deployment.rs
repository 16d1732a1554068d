use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use common::configuration::{AgentConfig, UpstreamConfig};
use common::errors::GatewayError;
use futures::Stream;
use serde_json::Value;
use unistream::{Message, StreamEvent};

use crate::handlers::serving_endpoint::ServingEndpointHandler;
use crate::resolver::FormatResolver;

/// A finite, non-restartable sequence of unified events. Replaying a
/// conversation requires a new `invoke_stream` call.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Strategy interface implemented once per deployment type. A handler owns
/// request payload formatting, response parsing and the streaming path for
/// its upstream flavor; it does not own session persistence or auth.
#[async_trait]
pub trait DeploymentHandler: Send + Sync {
    /// Non-streaming invocation, returning an aggregated
    /// OpenAI-compatible response value.
    async fn invoke(&self, messages: &[Message]) -> Result<Value, GatewayError>;

    /// Streaming invocation. Infallible at call time; upstream failures
    /// surface as an in-stream `Error` event followed by the terminal.
    async fn invoke_stream(&self, messages: Vec<Message>) -> EventStream;
}

pub const SERVING_ENDPOINT_TYPE: &str = "serving-endpoint";

pub const SUPPORTED_DEPLOYMENT_TYPES: &[&str] = &[SERVING_ENDPOINT_TYPE];

/// Look up the handler for an agent's deployment type and construct it.
/// Fails before any network activity on an unknown type or an agent with
/// no endpoint name.
pub fn build_handler(
    agent: &AgentConfig,
    upstream: UpstreamConfig,
    resolver: Arc<FormatResolver>,
) -> Result<Arc<dyn DeploymentHandler>, GatewayError> {
    match agent.deployment_type.as_str() {
        SERVING_ENDPOINT_TYPE => Ok(Arc::new(ServingEndpointHandler::new(
            agent, upstream, resolver,
        )?)),
        other => Err(GatewayError::UnsupportedDeploymentType {
            requested: other.to_string(),
            supported: SUPPORTED_DEPLOYMENT_TYPES.join(", "),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(deployment_type: &str, endpoint_name: Option<&str>) -> AgentConfig {
        AgentConfig {
            id: "test-agent".to_string(),
            name: None,
            description: None,
            endpoint_name: endpoint_name.map(str::to_string),
            deployment_type: deployment_type.to_string(),
        }
    }

    fn upstream() -> UpstreamConfig {
        UpstreamConfig {
            host: "https://workspace.example.com".to_string(),
            token: "token".to_string(),
        }
    }

    #[test]
    fn unknown_deployment_type_rejected() {
        let err = build_handler(
            &agent("foo", Some("ep")),
            upstream(),
            Arc::new(FormatResolver::new()),
        )
        .err()
        .unwrap();

        match err {
            GatewayError::UnsupportedDeploymentType {
                requested,
                supported,
            } => {
                assert_eq!(requested, "foo");
                assert!(supported.contains(SERVING_ENDPOINT_TYPE));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn missing_endpoint_name_rejected_at_construction() {
        let err = build_handler(
            &agent(SERVING_ENDPOINT_TYPE, None),
            upstream(),
            Arc::new(FormatResolver::new()),
        )
        .err()
        .unwrap();

        assert!(matches!(
            err,
            GatewayError::MissingEndpointName { agent_id } if agent_id == "test-agent"
        ));
    }

    #[test]
    fn serving_endpoint_handler_constructed() {
        let handler = build_handler(
            &agent(SERVING_ENDPOINT_TYPE, Some("ep")),
            upstream(),
            Arc::new(FormatResolver::new()),
        );
        assert!(handler.is_ok());
    }
}
