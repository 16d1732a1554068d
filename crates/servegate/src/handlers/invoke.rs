use std::sync::Arc;

use bytes::Bytes;
use common::configuration::{Configuration, UpstreamConfig};
use common::errors::GatewayError;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::{header, Request, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use unistream::{Message, StreamEvent, DONE_FRAME};

use crate::handlers::deployment::{build_handler, EventStream};
use crate::resolver::FormatResolver;

fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, hyper::Error> {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Shared state for the invoke route: the agent registry, the upstream
/// credentials and the process-wide endpoint format cache.
pub struct GatewayState {
    pub config: Arc<Configuration>,
    pub upstream: Option<UpstreamConfig>,
    pub resolver: Arc<FormatResolver>,
}

fn default_stream() -> bool {
    true
}

/// Request body for `POST /invoke_endpoint`.
#[derive(Debug, Deserialize)]
pub struct InvokeEndpointRequest {
    pub agent_id: String,
    pub messages: Vec<Message>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

pub async fn invoke_endpoint(
    request: Request<hyper::body::Incoming>,
    state: Arc<GatewayState>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
    let body_bytes = request.collect().await?.to_bytes();

    let invoke_request: InvokeEndpointRequest = match serde_json::from_slice(&body_bytes) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "failed to parse invoke request");
            return Ok(GatewayError::InvalidRequest(e.to_string()).into_response());
        }
    };

    match dispatch(invoke_request, state).await {
        Ok(response) => Ok(response),
        Err(err) => Ok(err.into_response()),
    }
}

/// Look up the agent, select its deployment handler and run the requested
/// invocation mode. Configuration problems are reported synchronously as
/// structured errors before any upstream call is made.
async fn dispatch(
    request: InvokeEndpointRequest,
    state: Arc<GatewayState>,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, GatewayError> {
    if request.messages.is_empty() {
        return Err(GatewayError::EmptyMessages);
    }

    let agent = state
        .config
        .agent_by_id(&request.agent_id)
        .ok_or_else(|| GatewayError::AgentNotFound(request.agent_id.clone()))?;

    let upstream = state
        .upstream
        .clone()
        .ok_or(GatewayError::MissingUpstreamCredentials)?;

    let handler = build_handler(agent, upstream, Arc::clone(&state.resolver))?;

    info!(
        agent_id = %request.agent_id,
        deployment_type = %agent.deployment_type,
        stream = request.stream,
        messages = request.messages.len(),
        "invoking agent"
    );

    if request.stream {
        let events = handler.invoke_stream(request.messages).await;
        streaming_response(events)
    } else {
        let aggregated = handler.invoke(&request.messages).await?;
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(full(aggregated.to_string()))?)
    }
}

/// Render the event stream as the SSE wire envelope. Every stream is
/// terminated by exactly one `data: [DONE]` frame, whether it ended with a
/// `Done` event, an `Error` event, or ran out without a terminal.
fn streaming_response(
    mut events: EventStream,
) -> Result<Response<BoxBody<Bytes, hyper::Error>>, GatewayError> {
    let (tx, rx) = mpsc::channel::<Bytes>(16);

    tokio::spawn(async move {
        let mut done_sent = false;

        while let Some(event) = events.next().await {
            let frame = event.to_sse_frame();
            if tx.send(Bytes::from(frame)).await.is_err() {
                warn!("receiver dropped");
                return;
            }
            if event.is_terminal() {
                done_sent = matches!(event, StreamEvent::Done);
                break;
            }
        }

        if !done_sent {
            let _ = tx.send(Bytes::from(DONE_FRAME)).await;
        }
    });

    let stream = ReceiverStream::new(rx).map(|chunk| Ok::<_, hyper::Error>(Frame::data(chunk)));
    let stream_body = BoxBody::new(StreamBody::new(stream));

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Accel-Buffering", "no")
        .body(stream_body)?)
}
