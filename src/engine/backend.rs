//! Backend seam and its HTTP implementation.
//!
//! `HttpBackend` is the only code that knows endpoint paths and status codes; the
//! submitter, poller and definition collector only see `RunBackend`.

use crate::error::{Failure, MonitorError, Result};
use crate::model::{RunConfig, RunCreated, RunDefinition, RunId, RunRequest, RunStatus, RunVariant};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

/// Longest slice of a non-JSON error body kept as detail.
const MAX_ERROR_DETAIL: usize = 200;

#[async_trait]
pub trait RunBackend: Send + Sync {
    /// Ask the backend to create a run. `request` is `None` for the demo variant.
    async fn create_run(&self, variant: RunVariant, request: Option<&RunRequest>) -> Result<RunId>;

    /// Fetch the latest status of a run.
    async fn fetch_status(&self, variant: RunVariant, run_id: &RunId) -> Result<RunStatus>;

    /// Fetch a workflow's declared inputs, agents and steps.
    async fn fetch_definition(&self, name: &str) -> Result<RunDefinition>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(cfg: &RunConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&cfg.base_url)
            .with_context(|| format!("invalid base URL {}", cfg.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("base URL {} cannot carry a path", cfg.base_url);
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&cfg.user_agent).context("invalid user agent")?,
        );

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = cfg.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build HTTP client")?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join path segments beneath the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn run_url(&self, variant: RunVariant) -> Url {
        self.endpoint(&[variant.as_path(), "run"])
    }

    pub fn status_url(&self, variant: RunVariant, run_id: &RunId) -> Url {
        self.endpoint(&[variant.as_path(), "run", run_id.as_str()])
    }

    pub fn definition_url(&self, name: &str) -> Url {
        self.endpoint(&["workflow", "definition", name])
    }

    /// Send a request and return the body of a 2xx response.
    async fn send(&self, req: reqwest::RequestBuilder) -> std::result::Result<Vec<u8>, Failure> {
        let resp = req.send().await.map_err(transport)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(transport)?;
        if !status.is_success() {
            return Err(status_failure(status, &body));
        }
        Ok(body.to_vec())
    }
}

fn transport(err: reqwest::Error) -> Failure {
    Failure::Transport {
        detail: err.to_string(),
    }
}

/// Pull a readable reason out of an error body: `{"detail": ..}` from the backend,
/// `{"error": ..}` from proxies, otherwise the raw text.
fn status_failure(status: StatusCode, body: &[u8]) -> Failure {
    let detail = match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(v) => ["detail", "error"]
            .iter()
            .find_map(|k| v.get(*k))
            .map(|d| match d.as_str() {
                Some(s) => s.to_string(),
                None => d.to_string(),
            }),
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let text = text.trim();
            (!text.is_empty()).then(|| text.chars().take(MAX_ERROR_DETAIL).collect::<String>())
        }
    };
    Failure::Status {
        status: status.as_u16(),
        detail,
    }
}

/// Extract the run id from a creation response body.
pub(crate) fn parse_run_created(body: &[u8]) -> Result<RunId> {
    let created: RunCreated = serde_json::from_slice(body)
        .map_err(|e| MonitorError::malformed(format!("run creation body: {e}")))?;
    match created.run_id {
        Some(serde_json::Value::String(id)) if !id.is_empty() => Ok(RunId::new(id)),
        Some(serde_json::Value::String(_)) => Err(MonitorError::malformed("run_id is empty")),
        Some(other) => Err(MonitorError::malformed(format!(
            "run_id is not a string: {other}"
        ))),
        None => Err(MonitorError::malformed("run_id missing from response")),
    }
}

#[async_trait]
impl RunBackend for HttpBackend {
    async fn create_run(&self, variant: RunVariant, request: Option<&RunRequest>) -> Result<RunId> {
        let url = self.run_url(variant);
        debug!(name: "run.submit.request", url = %url, variant = ?variant, "creating run");

        let mut req = self.http.post(url);
        if let Some(body) = request {
            req = req.json(body);
        }
        let body = self
            .send(req)
            .await
            .map_err(|failure| MonitorError::SubmissionFailed { failure })?;
        parse_run_created(&body)
    }

    async fn fetch_status(&self, variant: RunVariant, run_id: &RunId) -> Result<RunStatus> {
        let url = self.status_url(variant, run_id);
        let req = self
            .http
            .get(url)
            .header(reqwest::header::CACHE_CONTROL, "no-store");
        let body = self
            .send(req)
            .await
            .map_err(|failure| MonitorError::FetchFailed { failure })?;
        serde_json::from_slice(&body)
            .map_err(|e| MonitorError::malformed(format!("run status body: {e}")))
    }

    async fn fetch_definition(&self, name: &str) -> Result<RunDefinition> {
        let url = self.definition_url(name);
        debug!(name: "definition.request", url = %url, "loading workflow definition");
        let body = self
            .send(self.http.get(url))
            .await
            .map_err(|failure| MonitorError::DefinitionFailed { failure })?;
        serde_json::from_slice(&body)
            .map_err(|e| MonitorError::malformed(format!("workflow definition body: {e}")))
    }
}
