//! fetch tool implementation.
//!
//! Hands a page request to the engine exactly as the page would issue it and
//! reports what came back.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::fetch::resolve;
use swcache_client::request::check_header;
use swcache_client::{Destination, Disposition, FetchOutcome, OfflineEngine, Request, RequestMode};
use swcache_core::{Error, SerializedRequest};

use super::json_result;
use crate::error::ToolError;

/// Input parameters for the fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request body, sent as UTF-8.
    #[serde(default)]
    pub body: Option<String>,

    /// Fetch mode: "navigate", "same-origin", "no-cors" or "cors" (default).
    #[serde(default)]
    pub mode: Option<String>,

    /// Request destination, e.g. "document" or "image".
    #[serde(default)]
    pub destination: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for the fetch tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct FetchOutput {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8, lossy.
    pub body: String,
    /// False when the engine let the request through untouched.
    pub intercepted: bool,
    /// How an intercepted request was served.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposition: Option<Disposition>,
}

/// Build the engine request described by `params`.
///
/// Malformed headers are rejected here rather than dropped, since the page
/// would never have been able to send them.
pub fn build_request(engine: &OfflineEngine, params: &FetchParams) -> Result<Request, McpError> {
    let origin = url::Url::parse(&engine.config().origin)
        .map_err(|e| Error::InvalidUrl(format!("{}: {e}", engine.config().origin)))?;
    let target = resolve(&origin, &params.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
    for (name, value) in &params.headers {
        check_header(name, value).map_err(|e| ToolError::InvalidParams(e.to_string()))?;
    }

    let serialized = SerializedRequest {
        url: target.to_string(),
        method: params.method.trim().to_ascii_uppercase(),
        headers: params.headers.clone(),
        body: params.body.clone(),
    };
    let mut request = Request::from_serialized(&serialized)?;

    if let Some(mode) = params.mode.as_deref() {
        request = request.with_mode(mode.parse::<RequestMode>()?);
    }
    if let Some(destination) = params.destination.as_deref() {
        request = request.with_destination(destination.parse::<Destination>()?);
    }

    Ok(request)
}

/// Implementation of the fetch tool.
pub async fn fetch_impl(engine: &OfflineEngine, params: FetchParams) -> Result<CallToolResult, McpError> {
    let request = build_request(engine, &params)?;
    let outcome = engine.handle_fetch(&request).await?;

    let disposition = match &outcome {
        FetchOutcome::Intercepted(dispatched) => Some(dispatched.disposition),
        FetchOutcome::Passthrough(_) => None,
    };
    let response = outcome.response();

    let output = FetchOutput {
        url: request.url.to_string(),
        status: response.status.as_u16(),
        headers: response
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect(),
        body: response.text_body(),
        intercepted: disposition.is_some(),
        disposition,
    };

    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::{engine, json_of};

    fn params(url: &str) -> FetchParams {
        FetchParams {
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
            mode: None,
            destination: None,
        }
    }

    #[tokio::test]
    async fn test_relative_url_resolved_against_origin() {
        let (engine, _) = engine().await;
        let result = fetch_impl(&engine, params("/api/profile")).await.unwrap();
        let output = json_of(&result);

        assert_eq!(output["url"], "http://localhost:3000/api/profile");
        assert_eq!(output["status"], 200);
        assert_eq!(output["body"], "served /api/profile");
        assert_eq!(output["intercepted"], true);
        assert_eq!(output["disposition"]["route"], "protocol");
        assert_eq!(output["disposition"]["detail"], "api");
    }

    #[tokio::test]
    async fn test_offline_navigation_redirects() {
        let (engine, fetcher) = engine().await;
        fetcher.set_offline(true);

        let mut p = params("/settings");
        p.mode = Some("navigate".into());
        let output = json_of(&fetch_impl(&engine, p).await.unwrap());

        assert_eq!(output["status"], 302);
        assert_eq!(output["headers"]["location"], "/offline");
        assert_eq!(output["disposition"]["route"], "offline_fallback");
    }

    #[tokio::test]
    async fn test_offline_post_is_queued() {
        let (engine, fetcher) = engine().await;
        fetcher.set_offline(true);

        let mut p = params("/api/workouts");
        p.method = "post".into();
        p.body = Some(r#"{"reps":10}"#.into());
        let output = json_of(&fetch_impl(&engine, p).await.unwrap());

        assert_eq!(output["status"], 503);
        let queue = engine.sync_queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].method, "POST");
        assert_eq!(queue[0].body.as_deref(), Some(r#"{"reps":10}"#));
    }

    #[tokio::test]
    async fn test_non_http_passthrough_fails_offline() {
        let (engine, fetcher) = engine().await;
        fetcher.set_offline(true);

        let result = fetch_impl(&engine, params("chrome-extension://abc/script.js")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unknown_mode_rejected() {
        let (engine, _) = engine().await;
        let mut p = params("/dashboard");
        p.mode = Some("teleport".into());

        let err = fetch_impl(&engine, p).await.unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode(-32602));
    }

    #[tokio::test]
    async fn test_malformed_header_rejected() {
        let (engine, _) = engine().await;
        let mut p = params("/api/profile");
        p.headers.insert("x trace".into(), "abc".into());

        let err = fetch_impl(&engine, p).await.unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode(-32602));
        assert!(err.message.contains("x trace"));
    }

    #[tokio::test]
    async fn test_empty_url_rejected() {
        let (engine, _) = engine().await;
        assert!(fetch_impl(&engine, params("   ")).await.is_err());
    }
}
