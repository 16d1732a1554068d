use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{Error as HyperError, Response, StatusCode};
use serde_json::json;
use thiserror::Error;

// -----------------------------------------------------------------------------
// Gateway Errors (Standardized)
// -----------------------------------------------------------------------------
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent '{agent_id}' has no endpoint_name configured")]
    MissingEndpointName { agent_id: String },

    #[error("Deployment type '{requested}' is not supported. Supported types: {supported}")]
    UnsupportedDeploymentType { requested: String, supported: String },

    #[error("Messages must be a non-empty list")]
    EmptyMessages,

    #[error("Invalid request")]
    InvalidRequest(String),

    #[error("No upstream host/token configured")]
    MissingUpstreamCredentials,

    #[error("upstream error status={status}, body={body}")]
    Upstream { status: u16, body: String },

    #[error("Failed to reach upstream: {0}")]
    UpstreamUnreachable(String),

    #[error("Failed to create response: {0}")]
    ResponseCreationFailed(#[from] hyper::http::Error),
}

impl GatewayError {
    pub fn into_response(self) -> Response<BoxBody<Bytes, HyperError>> {
        let (status, code, details) = match &self {
            GatewayError::AgentNotFound(agent_id) => (
                StatusCode::NOT_FOUND,
                "AgentNotFound",
                json!({ "agent_id": agent_id }),
            ),

            GatewayError::MissingEndpointName { agent_id } => (
                StatusCode::BAD_REQUEST,
                "MissingEndpointName",
                json!({ "agent_id": agent_id }),
            ),

            GatewayError::UnsupportedDeploymentType {
                requested,
                supported,
            } => (
                StatusCode::BAD_REQUEST,
                "UnsupportedDeploymentType",
                json!({ "requested": requested, "supported": supported }),
            ),

            GatewayError::EmptyMessages => {
                (StatusCode::BAD_REQUEST, "EmptyMessages", json!({}))
            }

            GatewayError::InvalidRequest(reason) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                json!({ "reason": reason }),
            ),

            GatewayError::MissingUpstreamCredentials => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "MissingUpstreamCredentials",
                json!({}),
            ),

            GatewayError::Upstream { status, body } => (
                StatusCode::BAD_GATEWAY,
                "UpstreamError",
                json!({ "upstream_status": status, "body": body }),
            ),

            GatewayError::UpstreamUnreachable(reason) => (
                StatusCode::BAD_GATEWAY,
                "UpstreamUnreachable",
                json!({ "reason": reason }),
            ),

            GatewayError::ResponseCreationFailed(reason) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ResponseCreationFailed",
                json!({ "reason": reason.to_string() }),
            ),
        };

        let body_json = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
                "details": details
            }
        });

        let boxed_body = Full::new(Bytes::from(body_json.to_string()))
            .map_err(|never| match never {})
            .boxed();

        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(boxed_body)
            .unwrap_or_else(|_| {
                Response::new(
                    Full::new(Bytes::from("Internal Error"))
                        .map_err(|never| match never {})
                        .boxed(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt; // For .collect().await

    #[tokio::test]
    async fn test_agent_not_found_format() {
        let err = GatewayError::AgentNotFound("mystery-agent".to_string());
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

        assert_eq!(body["error"]["code"], "AgentNotFound");
        assert_eq!(body["error"]["details"]["agent_id"], "mystery-agent");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("mystery-agent"));
    }

    #[tokio::test]
    async fn test_unsupported_deployment_type_lists_supported() {
        let err = GatewayError::UnsupportedDeploymentType {
            requested: "foo".to_string(),
            supported: "serving-endpoint".to_string(),
        };

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

        assert_eq!(body["error"]["code"], "UnsupportedDeploymentType");
        assert_eq!(body["error"]["details"]["requested"], "foo");
        assert_eq!(body["error"]["details"]["supported"], "serving-endpoint");
    }

    #[tokio::test]
    async fn test_upstream_error_maps_to_bad_gateway() {
        let err = GatewayError::Upstream {
            status: 503,
            body: "endpoint scaling up".to_string(),
        };

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

        assert_eq!(body["error"]["details"]["upstream_status"], 503);
    }
}
