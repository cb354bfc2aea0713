use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde_json::Value;
use thiserror::Error;

/// Base URL used by development builds.
pub const DEV_BASE_URL: &str = "http://localhost:8090/api/";

/// Errors returned by the HTTP API. Every variant counts as a network failure
/// to the pollers: the previous snapshot stays published.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{method} {path} returned HTTP {status}")]
    Status {
        method: Method,
        path: String,
        status: u16,
    },
    #[error("invalid JSON in response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),
}

/// Verb-based access to the service API. Paths are relative to the base URL.
#[async_trait]
pub trait Api: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value, ApiError>;
    async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError>;
    async fn delete(&self, path: &str) -> Result<Value, ApiError>;
}

/// Resolve the API base URL.
///
/// Development builds talk to the local dev server; anything else uses the
/// `api/` path relative to the origin serving the dashboard.
pub fn resolve_base_url(dev: bool, origin: &str) -> Result<Url, ApiError> {
    if dev {
        return Url::parse(DEV_BASE_URL).map_err(|_| ApiError::InvalidUrl(DEV_BASE_URL.to_string()));
    }
    let origin = if origin.ends_with('/') {
        origin.to_string()
    } else {
        format!("{}/", origin)
    };
    Url::parse(&origin)
        .and_then(|u| u.join("api/"))
        .map_err(|_| ApiError::InvalidUrl(origin))
}

/// Thin reqwest wrapper bound to one base URL.
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: Url) -> Result<Self, ApiError> {
        // Transport defaults only: no timeout override, no retries.
        let client = Client::builder().build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|_| ApiError::InvalidUrl(format!("{}{}", self.base_url, path)))
    }

    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let url = self.url(path)?;
        let mut req = self.client.request(method.clone(), url);
        if let Some(ref body) = body {
            req = req.json(body);
        }
        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                method,
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Probe the service's `/ping` route, which lives at the origin root
    /// rather than under the API base.
    pub async fn ping(&self) -> Result<Value, ApiError> {
        self.request(Method::GET, "../ping", None).await
    }
}

#[async_trait]
impl Api for ApiClient {
    async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::DELETE, path, None).await
    }
}
