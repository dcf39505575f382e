use super::NodeApi;
use crate::api::Node;
use crate::{KubeError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Error body written by the control surface.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Verb {
    Create,
    Get,
    Update,
    Delete,
    List,
}

/// Remote `NodeApi` speaking JSON to the control surface.
#[derive(Clone)]
pub struct HttpNodeClient {
    client: Client,
    base_url: Url,
}

impl HttpNodeClient {
    /// `address` is `host:port` or a full `http://` URL.
    pub fn new(address: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| KubeError::Http(format!("failed to build http client: {}", error)))?;

        let base_url = base_url(address);
        let base_url = Url::parse(&base_url).map_err(|error| {
            KubeError::Config(format!("invalid api server address {}: {}", address, error))
        })?;

        Ok(Self { client, base_url })
    }

    fn nodes_url(&self) -> Result<Url> {
        self.url_with_segments(&["api", "v1", "nodes"])
    }

    /// The name goes in as one escaped path segment, so `#`, `?` or `%`
    /// in a name can never address a different node.
    fn node_url(&self, name: &str) -> Result<Url> {
        self.url_with_segments(&["api", "v1", "nodes", name])
    }

    fn url_with_segments(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                KubeError::Config(format!("api server url {} has no path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder, cancel: &CancellationToken) -> Result<Response> {
        if cancel.is_cancelled() {
            return Err(KubeError::Cancelled);
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(KubeError::Cancelled),
            result = request.send() => {
                result.map_err(|error| KubeError::Unavailable(error.to_string()))
            }
        }
    }

    async fn read_node(response: Response, verb: Verb) -> Result<Node> {
        let response = check_status(response, verb).await?;
        response
            .json::<Node>()
            .await
            .map_err(|error| KubeError::Http(format!("failed to decode node: {}", error)))
    }
}

#[async_trait]
impl NodeApi for HttpNodeClient {
    async fn create_node(&self, node: &Node, cancel: &CancellationToken) -> Result<Node> {
        let request = self.client.post(self.nodes_url()?).json(node);
        let response = self.send(request, cancel).await?;
        Self::read_node(response, Verb::Create).await
    }

    async fn get_node(&self, name: &str, cancel: &CancellationToken) -> Result<Node> {
        let request = self.client.get(self.node_url(name)?);
        let response = self.send(request, cancel).await?;
        Self::read_node(response, Verb::Get).await
    }

    async fn update_node(&self, node: &Node, cancel: &CancellationToken) -> Result<Node> {
        let request = self.client.put(self.node_url(node.name())?).json(node);
        let response = self.send(request, cancel).await?;
        Self::read_node(response, Verb::Update).await
    }

    async fn delete_node(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        let request = self.client.delete(self.node_url(name)?);
        let response = self.send(request, cancel).await?;
        check_status(response, Verb::Delete).await?;
        Ok(())
    }

    async fn list_nodes(&self, cancel: &CancellationToken) -> Result<Vec<Node>> {
        let request = self.client.get(self.nodes_url()?);
        let response = self.send(request, cancel).await?;
        let response = check_status(response, Verb::List).await?;
        response
            .json::<Vec<Node>>()
            .await
            .map_err(|error| KubeError::Http(format!("failed to decode node list: {}", error)))
    }
}

fn base_url(address: &str) -> String {
    let trimmed = address.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

async fn check_status(response: Response, verb: Verb) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(error) => {
            tracing::warn!("failed to read {} error body: {}", verb_name(verb), error);
            format!("<unreadable response body: {}>", error)
        }
    };
    let (message, reason) = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => (parsed.error, parsed.reason),
        Err(_) => (body, None),
    };

    Err(map_status(status, verb, reason.as_deref(), message))
}

fn map_status(status: StatusCode, verb: Verb, reason: Option<&str>, message: String) -> KubeError {
    match status {
        StatusCode::BAD_REQUEST => KubeError::Invalid(message),
        StatusCode::NOT_FOUND => KubeError::NodeNotFound(message),
        StatusCode::CONFLICT => match verb {
            Verb::Create => KubeError::NodeAlreadyExists(message),
            _ => KubeError::Conflict(message),
        },
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            KubeError::Unavailable(message)
        }
        _ => match reason {
            Some(reason) => KubeError::from_reason(reason, message),
            None => {
                KubeError::Http(format!("{} returned {}: {}", verb_name(verb), status, message))
            }
        },
    }
}

fn verb_name(verb: Verb) -> &'static str {
    match verb {
        Verb::Create => "create",
        Verb::Get => "get",
        Verb::Update => "update",
        Verb::Delete => "delete",
        Verb::List => "list",
    }
}
