use std::sync::Arc;
use std::{env, fs};

use bytes::Bytes;
use common::configuration::{Configuration, UpstreamConfig};
use http_body_util::{combinators::BoxBody, BodyExt, Empty};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Response, StatusCode};
use hyper_util::rt::TokioIo;
use servegate::handlers::invoke::{invoke_endpoint, GatewayState};
use servegate::resolver::FormatResolver;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const BIND_ADDRESS: &str = "0.0.0.0:8000";
const INVOKE_ENDPOINT_PATH: &str = "/invoke_endpoint";

fn empty() -> BoxBody<Bytes, hyper::Error> {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let bind_address = env::var("SERVEGATE_BIND_ADDRESS").unwrap_or_else(|_| BIND_ADDRESS.to_string());

    let config_path =
        env::var("SERVEGATE_CONFIG_PATH").unwrap_or_else(|_| "./servegate.yaml".to_string());
    let config_contents =
        fs::read_to_string(&config_path).expect("Failed to read servegate.yaml");
    let config: Configuration =
        serde_yaml::from_str(&config_contents).expect("Failed to parse servegate.yaml");
    info!(path = %config_path, agents = config.agents.len(), "loaded servegate.yaml");

    let upstream = UpstreamConfig::resolve(config.upstream.clone());
    if upstream.is_none() {
        warn!("no upstream host/token configured, invocations will fail");
    }

    let state = Arc::new(GatewayState {
        config: Arc::new(config),
        upstream,
        resolver: Arc::new(FormatResolver::new()),
    });

    let listener = TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "listening");

    loop {
        let (stream, _) = listener.accept().await?;
        let peer_addr = stream.peer_addr()?;
        let io = TokioIo::new(stream);

        let state = Arc::clone(&state);
        let service = service_fn(move |req| {
            let state = Arc::clone(&state);

            async move {
                match (req.method(), req.uri().path()) {
                    (&Method::POST, INVOKE_ENDPOINT_PATH) => invoke_endpoint(req, state).await,
                    _ => {
                        debug!(method = %req.method(), path = %req.uri().path(), "no route found");
                        let mut not_found = Response::new(empty());
                        *not_found.status_mut() = StatusCode::NOT_FOUND;
                        Ok(not_found)
                    }
                }
            }
        });

        tokio::task::spawn(async move {
            debug!(peer = ?peer_addr, "accepted connection");
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(error = ?err, "error serving connection");
            }
        });
    }
}
