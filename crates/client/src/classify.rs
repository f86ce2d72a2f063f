//! Resource classification and cache bypass rules.
//!
//! Classification is a pure function of the request: the same request always
//! maps to the same class. Rules are applied in priority order, so a `.woff2`
//! file is static even though font extensions also appear in the runtime rule.

use std::sync::LazyLock;

use regex::RegexSet;
use reqwest::header;
use serde::Serialize;
use swcache_core::{AppConfig, ResourceClass};

use crate::request::{Destination, Request};

const STATIC_EXTENSIONS: &[&str] = &["js", "css", "woff", "woff2", "ttf"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "ico"];
const RUNTIME_EXTENSIONS: &[&str] = &["woff", "woff2", "ttf", "eot"];

/// Analytics and tracking endpoints that must never be cached.
static TRACKING_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"google-analytics\.com",
        r"googletagmanager\.com",
        r"doubleclick\.net",
        r"facebook\.com/tr",
        r"hotjar\.com",
        r"segment\.(io|com)",
        r"mixpanel\.com",
        r"/analytics(/|$|\?)",
        r"/collect(/|$|\?)",
        r"/_vercel/insights",
    ])
    .expect("tracking patterns are valid")
});

/// Why a request skipped the caching protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BypassReason {
    /// Non-GET/HEAD; goes to the network with sync-queue-on-failure.
    MutatingMethod,
    /// `Cache-Control: no-cache` on the request.
    NoCache,
    Tracking,
    /// The page switched on development mode.
    DevMode,
}

/// Maps requests to resource classes.
#[derive(Debug, Clone)]
pub struct Classifier {
    static_prefix: String,
}

impl Classifier {
    pub fn new(static_prefix: impl Into<String>) -> Self {
        Self { static_prefix: static_prefix.into() }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.static_prefix.clone())
    }

    /// Assign a class to a request.
    ///
    /// Returns `None` for non-HTTP(S) requests, which the engine does not
    /// intercept at all.
    pub fn classify(&self, request: &Request) -> Option<ResourceClass> {
        if !request.is_http() {
            return None;
        }

        let path = request.url.path();
        let ext = extension(path);
        let has_ext = |set: &[&str]| ext.as_deref().is_some_and(|e| set.contains(&e));

        let class = if path.starts_with(&self.static_prefix) || has_ext(STATIC_EXTENSIONS) || path.contains("favicon")
        {
            ResourceClass::Static
        } else if request.destination == Destination::Image || has_ext(IMAGE_EXTENSIONS) {
            ResourceClass::Image
        } else if path.contains("/fonts/") || path.contains("/icons/") || has_ext(RUNTIME_EXTENSIONS) {
            ResourceClass::Runtime
        } else if path.starts_with("/api/") {
            ResourceClass::Api
        } else {
            ResourceClass::Page
        };

        Some(class)
    }

    /// Pre-filter applied before classification.
    pub fn should_bypass(&self, request: &Request, dev_mode: bool) -> Option<BypassReason> {
        if request.is_mutating() {
            return Some(BypassReason::MutatingMethod);
        }

        let no_cache = request
            .headers
            .get_all(header::CACHE_CONTROL)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|value| value.to_ascii_lowercase().contains("no-cache"));
        if no_cache {
            return Some(BypassReason::NoCache);
        }

        if is_tracking(request.url.as_str()) {
            return Some(BypassReason::Tracking);
        }

        if dev_mode {
            return Some(BypassReason::DevMode);
        }

        None
    }
}

/// Whether a URL matches a known analytics or tracking endpoint.
pub fn is_tracking(url: &str) -> bool {
    TRACKING_PATTERNS.is_match(url)
}

/// Lowercased extension of the last path segment.
fn extension(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() && ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use reqwest::{Method, Url};

    fn classifier() -> Classifier {
        Classifier::new("/_next/static/")
    }

    fn get(path: &str) -> Request {
        Request::get(Url::parse(&format!("http://localhost:3000{path}")).unwrap())
    }

    fn class_of(path: &str) -> Option<ResourceClass> {
        classifier().classify(&get(path))
    }

    #[test]
    fn test_static_rules() {
        assert_eq!(class_of("/_next/static/chunks/main-abc123"), Some(ResourceClass::Static));
        assert_eq!(class_of("/bundle.JS"), Some(ResourceClass::Static));
        assert_eq!(class_of("/styles/site.css"), Some(ResourceClass::Static));
        assert_eq!(class_of("/fonts/inter.woff2"), Some(ResourceClass::Static));
        assert_eq!(class_of("/favicon-32.png"), Some(ResourceClass::Static));
    }

    #[test]
    fn test_image_rules() {
        assert_eq!(class_of("/photos/cat.jpeg"), Some(ResourceClass::Image));
        assert_eq!(class_of("/icons/icon-192x192.png"), Some(ResourceClass::Image));

        let request = get("/avatar/42").with_destination(Destination::Image);
        assert_eq!(classifier().classify(&request), Some(ResourceClass::Image));
    }

    #[test]
    fn test_runtime_rules() {
        assert_eq!(class_of("/fonts/inter"), Some(ResourceClass::Runtime));
        assert_eq!(class_of("/icons/sprite"), Some(ResourceClass::Runtime));
        assert_eq!(class_of("/legacy/font.eot"), Some(ResourceClass::Runtime));
    }

    #[test]
    fn test_api_and_page_rules() {
        assert_eq!(class_of("/api/profile"), Some(ResourceClass::Api));
        assert_eq!(class_of("/dashboard"), Some(ResourceClass::Page));
        assert_eq!(class_of("/"), Some(ResourceClass::Page));
        assert_eq!(class_of("/apiary"), Some(ResourceClass::Page));
    }

    #[test]
    fn test_non_http_not_intercepted() {
        let request = Request::get(Url::parse("chrome-extension://abc/script.js").unwrap());
        assert_eq!(classifier().classify(&request), None);
    }

    #[test]
    fn test_classification_is_idempotent() {
        let c = classifier();
        for path in ["/_next/static/a.js", "/img.png", "/fonts/x", "/api/x", "/page", "/favicon.ico"] {
            let request = get(path);
            assert_eq!(c.classify(&request), c.classify(&request.clone()), "{path}");
        }
    }

    #[test]
    fn test_bypass_mutating() {
        let request = Request::new(Method::POST, Url::parse("http://localhost:3000/api/workouts").unwrap());
        assert_eq!(classifier().should_bypass(&request, false), Some(BypassReason::MutatingMethod));
    }

    #[test]
    fn test_bypass_no_cache() {
        let request = get("/api/profile").with_header(header::CACHE_CONTROL, HeaderValue::from_static("No-Cache"));
        assert_eq!(classifier().should_bypass(&request, false), Some(BypassReason::NoCache));
    }

    #[test]
    fn test_bypass_tracking() {
        let request = Request::get(Url::parse("https://www.google-analytics.com/g/collect?v=2").unwrap());
        assert_eq!(classifier().should_bypass(&request, false), Some(BypassReason::Tracking));
        assert!(is_tracking("http://localhost:3000/_vercel/insights/view"));
        assert!(!is_tracking("http://localhost:3000/collections"));
    }

    #[test]
    fn test_bypass_dev_mode() {
        assert_eq!(classifier().should_bypass(&get("/dashboard"), true), Some(BypassReason::DevMode));
        assert_eq!(classifier().should_bypass(&get("/dashboard"), false), None);
    }

    #[test]
    fn test_extension() {
        assert_eq!(extension("/a/b.PNG").as_deref(), Some("png"));
        assert_eq!(extension("/a/b"), None);
        assert_eq!(extension("/"), None);
    }
}
