//! Request and response model for intercepted fetches.
//!
//! These mirror what a page hands to the engine: a method, URL, headers and
//! optional body plus the fetch `mode` and `destination` hints used for
//! classification and fallback selection.

use std::collections::BTreeMap;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use swcache_core::{Error, SerializedRequest, StoredResponse, SyncQueueItem};

/// The fetch mode of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    NoCors,
    #[default]
    Cors,
}

impl FromStr for RequestMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "navigate" => Ok(RequestMode::Navigate),
            "same-origin" => Ok(RequestMode::SameOrigin),
            "no-cors" => Ok(RequestMode::NoCors),
            "cors" => Ok(RequestMode::Cors),
            other => Err(Error::InvalidInput(format!("unknown request mode: {other}"))),
        }
    }
}

/// What the response will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    #[default]
    Empty,
    Document,
    Image,
    Script,
    Style,
    Font,
    Manifest,
    Other,
}

impl FromStr for Destination {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "" => Destination::Empty,
            "document" => Destination::Document,
            "image" => Destination::Image,
            "script" => Destination::Script,
            "style" => Destination::Style,
            "font" => Destination::Font,
            "manifest" => Destination::Manifest,
            _ => Destination::Other,
        })
    }
}

/// An outgoing request as seen by the engine.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub mode: RequestMode,
    pub destination: Destination,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            mode: RequestMode::default(),
            destination: Destination::default(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A top-level page navigation.
    pub fn navigate(url: Url) -> Self {
        Self { mode: RequestMode::Navigate, destination: Destination::Document, ..Self::get(url) }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Anything other than GET or HEAD.
    pub fn is_mutating(&self) -> bool {
        self.method != Method::GET && self.method != Method::HEAD
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    /// Headers flattened to lowercase name -> value, skipping non-UTF-8 values.
    pub fn header_map(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect()
    }

    /// Body as text, only for methods that carry one.
    fn body_text(&self) -> Option<String> {
        if !self.is_mutating() {
            return None;
        }
        self.body.as_ref().map(|body| String::from_utf8_lossy(body).into_owned())
    }

    /// Capture this request for replay.
    pub fn to_serialized(&self) -> SerializedRequest {
        SerializedRequest {
            url: self.url.to_string(),
            method: self.method.to_string(),
            headers: self.header_map(),
            body: self.body_text(),
        }
    }

    /// Rebuild a captured request.
    pub fn from_serialized(serialized: &SerializedRequest) -> Result<Self, Error> {
        Self::from_parts(&serialized.url, &serialized.method, &serialized.headers, serialized.body.as_deref())
    }

    /// Rebuild a request from a queued item.
    pub fn from_sync_item(item: &SyncQueueItem) -> Result<Self, Error> {
        Self::from_parts(&item.url, &item.method, &item.headers, item.body.as_deref())
    }

    fn from_parts(
        url: &str, method: &str, headers: &BTreeMap<String, String>, body: Option<&str>,
    ) -> Result<Self, Error> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        let method =
            Method::from_bytes(method.as_bytes()).map_err(|_| Error::InvalidInput(format!("invalid method: {method}")))?;

        let mut request = Request::new(method, url);
        request.headers = header_map_from_pairs(headers.iter());
        if let Some(body) = body {
            request.body = Some(Bytes::from(body.to_string()));
        }
        Ok(request)
    }
}

/// A response produced by the network, a cache store, or the engine itself.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub url: Option<Url>,
}

impl Response {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self { status, headers: HeaderMap::new(), body: body.into(), url: None }
    }

    /// Plain-text body.
    pub fn text(status: StatusCode, body: &str) -> Self {
        let mut response = Self::new(status, body.to_string());
        response
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        response
    }

    /// JSON body.
    pub fn json(status: StatusCode, body: &serde_json::Value) -> Self {
        let mut response = Self::new(status, body.to_string());
        response
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    /// A 302 redirect to `location`.
    pub fn redirect(location: &str) -> Self {
        let mut response = Self::new(StatusCode::FOUND, Bytes::new());
        if let Ok(value) = HeaderValue::from_str(location) {
            response.headers.insert(header::LOCATION, value);
        }
        response
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// 2xx status.
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Declared `Content-Length`, falling back to the body length.
    pub fn content_length(&self) -> u64 {
        self.header(header::CONTENT_LENGTH.as_str())
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(self.body.len() as u64)
    }

    pub fn text_body(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Capture this response for storage under `request`.
    pub fn to_stored(&self, request: &Request) -> StoredResponse {
        StoredResponse {
            url: request.url.to_string(),
            method: request.method.to_string(),
            status: self.status.as_u16(),
            headers: self
                .headers
                .iter()
                .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
                .collect(),
            body: self.body.to_vec(),
            stored_at: Utc::now().to_rfc3339(),
        }
    }
}

impl From<StoredResponse> for Response {
    fn from(stored: StoredResponse) -> Self {
        Self {
            status: StatusCode::from_u16(stored.status).unwrap_or(StatusCode::OK),
            headers: header_map_from_pairs(stored.headers.iter().map(|(k, v)| (k, v))),
            body: Bytes::from(stored.body),
            url: Url::parse(&stored.url).ok(),
        }
    }
}

/// Format a timestamp as an HTTP `Date` header value.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Reject a header name or value that could not be put on the wire.
pub fn check_header(name: &str, value: &str) -> Result<(), Error> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::InvalidInput(format!("invalid header name: {name}")))?;
    HeaderValue::from_str(value).map_err(|_| Error::InvalidInput(format!("invalid value for header {name}")))?;
    Ok(())
}

fn header_map_from_pairs<'a>(pairs: impl Iterator<Item = (&'a String, &'a String)>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::debug!(header = %name, "skipping invalid stored header"),
        }
    }
    headers
}
