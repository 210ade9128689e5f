//! Docker Engine API client
//!
//! The engine is reached either through its local socket
//! (`unix:///var/run/docker.sock`) or over TCP (`http://host:2375`).

use std::fmt;
#[cfg(unix)]
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace, warn};

use super::error::{RuntimeError, RuntimeResult};
use super::types::{
    ContainerDetail, ContainerSummary, ResourceSnapshot, RuntimeEvent, ServiceSummary, Task,
};
use super::{ContainerFilter, EventFilter, EventSubscription, RuntimeClient};

/// Events buffered between the HTTP stream and the consumer
const EVENT_BUFFER: usize = 64;

/// Host used to build request URLs for the socket transport
#[cfg(unix)]
const SOCKET_BASE: &str = "http://localhost";

#[cfg(unix)]
type UnixClient = hyper_util::client::legacy::Client<
    hyperlocal::UnixConnector,
    http_body_util::Full<Bytes>,
>;

type ByteStream = Pin<Box<dyn Stream<Item = RuntimeResult<Bytes>> + Send>>;

/// Status and body of an engine response
struct EngineResponse {
    status: u16,
    body: ByteStream,
}

/// How requests reach the engine
#[derive(Clone)]
enum Transport {
    Tcp {
        client: reqwest::Client,
        base: String,
    },

    #[cfg(unix)]
    Unix { client: UnixClient, socket: PathBuf },
}

/// [`RuntimeClient`] talking to the Docker Engine HTTP API
#[derive(Clone)]
pub struct DockerClient {
    transport: Transport,

    /// Endpoint as configured, for logs
    endpoint: String,

    /// Timeout for every non-streaming request
    timeout: Duration,
}

impl fmt::Debug for DockerClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerClient")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DockerClient {
    /// Client for `unix:///path/to/socket` or `http://host:port`
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> RuntimeResult<Self> {
        let endpoint = endpoint.into();

        let transport = match endpoint.strip_prefix("unix://") {
            Some(socket) => unix_transport(socket)?,
            None => {
                let client = reqwest::Client::builder()
                    .connect_timeout(timeout)
                    .build()
                    .map_err(|e| {
                        RuntimeError::Transport(format!("failed to build HTTP client: {e}"))
                    })?;

                Transport::Tcp {
                    client,
                    base: endpoint.trim_end_matches('/').to_string(),
                }
            }
        };

        Ok(Self {
            transport,
            endpoint,
            timeout,
        })
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> RuntimeResult<reqwest::Url> {
        let base = match &self.transport {
            Transport::Tcp { base, .. } => base.as_str(),
            #[cfg(unix)]
            Transport::Unix { .. } => SOCKET_BASE,
        };

        let mut url = reqwest::Url::parse(&format!("{base}{path}"))
            .map_err(|e| RuntimeError::Transport(format!("invalid engine URL {base}{path}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(key, value)| (*key, value.as_str())));
        }

        Ok(url)
    }

    async fn send(&self, path: &str, query: &[(&str, String)]) -> RuntimeResult<EngineResponse> {
        let url = self.url(path, query)?;
        trace!("GET {url} via {}", self.endpoint);

        match &self.transport {
            Transport::Tcp { client, .. } => {
                let response = client.get(url).send().await?;
                let status = response.status().as_u16();
                let body = response
                    .bytes_stream()
                    .map(|chunk| chunk.map_err(RuntimeError::from))
                    .boxed();

                Ok(EngineResponse { status, body })
            }

            #[cfg(unix)]
            Transport::Unix { client, socket } => {
                use http_body_util::BodyExt;

                let target = match url.query() {
                    Some(query) => format!("{}?{query}", url.path()),
                    None => url.path().to_string(),
                };
                let uri: hyper::Uri = hyperlocal::Uri::new(socket, &target).into();

                let response = client.get(uri).await.map_err(|e| {
                    if e.is_connect() {
                        RuntimeError::Connection(format!("{}: {e}", socket.display()))
                    } else {
                        RuntimeError::Transport(e.to_string())
                    }
                })?;
                let status = response.status().as_u16();
                let body = response
                    .into_body()
                    .into_data_stream()
                    .map(|chunk| chunk.map_err(|e| RuntimeError::Transport(e.to_string())))
                    .boxed();

                Ok(EngineResponse { status, body })
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> RuntimeResult<T> {
        let fetch = async {
            let response = self.send(path, query).await?;
            let body = check_status(response, path).await?;
            collect(body).await
        };

        let body = tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| RuntimeError::Timeout(format!("{path} after {:?}", self.timeout)))??;

        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(unix)]
fn unix_transport(socket: &str) -> RuntimeResult<Transport> {
    use hyperlocal::UnixClientExt;

    Ok(Transport::Unix {
        client: UnixClient::unix(),
        socket: PathBuf::from(socket),
    })
}

#[cfg(not(unix))]
fn unix_transport(socket: &str) -> RuntimeResult<Transport> {
    Err(RuntimeError::Connection(format!(
        "unix socket {socket} is not supported on this platform"
    )))
}

async fn collect(mut body: ByteStream) -> RuntimeResult<Vec<u8>> {
    let mut buffer = Vec::new();
    while let Some(chunk) = body.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer)
}

/// Map non-success responses to [`RuntimeError`]
async fn check_status(response: EngineResponse, what: &str) -> RuntimeResult<ByteStream> {
    let status = response.status;
    if (200..300).contains(&status) {
        return Ok(response.body);
    }

    if status == 404 {
        return Err(RuntimeError::NotFound(what.to_string()));
    }

    // the engine reports errors as {"message": "..."}
    let body = collect(response.body).await.unwrap_or_default();
    let body = String::from_utf8_lossy(&body).into_owned();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or(body);

    Err(RuntimeError::Api { status, message })
}

fn filters_param(filters: serde_json::Value) -> (&'static str, String) {
    ("filters", filters.to_string())
}

#[async_trait]
impl RuntimeClient for DockerClient {
    #[instrument(skip(self))]
    async fn list_containers(
        &self,
        filter: &ContainerFilter,
    ) -> RuntimeResult<Vec<ContainerSummary>> {
        let mut query = vec![("all", filter.all.to_string())];
        if let Some(names) = &filter.names {
            query.push(filters_param(serde_json::json!({ "name": names })));
        }

        self.get_json("/containers/json", &query).await
    }

    #[instrument(skip(self))]
    async fn inspect_container(&self, id: &str) -> RuntimeResult<ContainerDetail> {
        self.get_json(&format!("/containers/{id}/json"), &[]).await
    }

    #[instrument(skip(self))]
    async fn subscribe_events(&self, filter: &EventFilter) -> RuntimeResult<EventSubscription> {
        let filters = serde_json::json!({
            "type": filter.types,
            "event": filter.actions,
        });

        // only the response head is bounded: the body stays open for the life of the feed
        let query = [filters_param(filters)];
        let response = tokio::time::timeout(self.timeout, self.send("/events", &query))
            .await
            .map_err(|_| RuntimeError::Timeout(format!("/events after {:?}", self.timeout)))??;
        let mut stream = check_status(response, "/events").await?;

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            let mut decoder = LineDecoder::default();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        for item in decoder.push(&bytes) {
                            if tx.send(item).await.is_err() {
                                debug!("event subscriber dropped, closing stream");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("runtime event stream failed: {e}");
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            debug!("runtime closed the event stream");
        });

        Ok(EventSubscription::new(rx))
    }

    #[instrument(skip(self))]
    async fn resource_snapshot(&self, id: &str) -> RuntimeResult<ResourceSnapshot> {
        self.get_json(
            &format!("/containers/{id}/stats"),
            &[("stream", "false".to_string())],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn list_services(&self) -> RuntimeResult<Vec<ServiceSummary>> {
        self.get_json("/services", &[]).await
    }

    #[instrument(skip(self))]
    async fn list_tasks(&self, service: &str) -> RuntimeResult<Vec<Task>> {
        let query = [filters_param(serde_json::json!({ "service": [service] }))];
        self.get_json("/tasks", &query).await
    }
}

/// Splits a byte stream into newline-delimited JSON events
#[derive(Debug, Default)]
struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<RuntimeResult<RuntimeEvent>> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = &line[..line.len() - 1];

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            events.push(serde_json::from_slice(line).map_err(RuntimeError::from));
        }

        events
    }
}
