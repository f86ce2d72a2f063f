//! Scripted network for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::StatusCode;
use reqwest::header::{self, HeaderValue};
use swcache_core::Error;

use crate::fetch::Fetcher;
use crate::request::{Request, Response, http_date};

#[derive(Clone)]
struct Route {
    status: StatusCode,
    body: Bytes,
    headers: Vec<(header::HeaderName, HeaderValue)>,
}

/// A `Fetcher` answering from per-path routes.
///
/// Unrouted paths answer 404. Every response carries a `Date` of now.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<HashMap<String, usize>>,
    requests: Mutex<Vec<Request>>,
    offline: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, path: &str, status: StatusCode, body: impl Into<Bytes>) {
        self.route_with_headers(path, status, body, Vec::new());
    }

    pub fn route_with_headers(
        &self, path: &str, status: StatusCode, body: impl Into<Bytes>, headers: Vec<(header::HeaderName, HeaderValue)>,
    ) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), Route { status, body: body.into(), headers });
    }

    /// Make every fetch fail at the network layer.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    /// Fetches attempted for a path, including failed ones.
    pub fn calls(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    /// The last request seen for a path.
    pub fn last_request(&self, path: &str) -> Option<Request> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|request| request.url.path() == path)
            .cloned()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let path = request.url.path().to_string();
        *self.calls.lock().unwrap().entry(path.clone()).or_default() += 1;
        self.requests.lock().unwrap().push(request.clone());

        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {}", request.url)));
        }

        let route = self.routes.lock().unwrap().get(&path).cloned();
        let mut response = match route {
            Some(route) => {
                let mut response = Response::new(route.status, route.body);
                for (name, value) in route.headers {
                    response.headers.insert(name, value);
                }
                response
            }
            None => Response::text(StatusCode::NOT_FOUND, "not found"),
        };

        if !response.headers.contains_key(header::DATE) {
            let date = HeaderValue::from_str(&http_date(Utc::now())).unwrap();
            response.headers.insert(header::DATE, date);
        }
        response.url = Some(request.url.clone());
        Ok(response)
    }
}
