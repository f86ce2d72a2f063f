//! URL resolution against the engine's origin.

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Resolve a request target against `origin`.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Absolute URLs (anything with `://` or a `scheme:` prefix) are parsed as-is
/// 3. Everything else is joined onto the origin
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
///
/// Non-HTTP schemes are accepted here; the dispatcher decides not to
/// intercept them.
pub fn resolve(origin: &url::Url, input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = match url::Url::parse(trimmed) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?
        }
        Err(e) => return Err(UrlError::InvalidUrl(e.to_string())),
    };

    parsed.set_fragment(None);

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> url::Url {
        url::Url::parse("http://localhost:3000").unwrap()
    }

    #[test]
    fn test_resolve_relative_path() {
        let url = resolve(&origin(), "/api/profile").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/profile");
    }

    #[test]
    fn test_resolve_absolute() {
        let url = resolve(&origin(), "https://cdn.example.com/logo.png").unwrap();
        assert_eq!(url.host_str(), Some("cdn.example.com"));
    }

    #[test]
    fn test_resolve_lowercases_host() {
        let url = resolve(&origin(), "https://EXAMPLE.COM/a").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_resolve_removes_fragment_keeps_query() {
        let url = resolve(&origin(), "/path?b=2&a=1#section").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), Some("b=2&a=1"));
    }

    #[test]
    fn test_resolve_non_http_scheme_passes_through() {
        let url = resolve(&origin(), "chrome-extension://abc/script.js").unwrap();
        assert_eq!(url.scheme(), "chrome-extension");
    }

    #[test]
    fn test_resolve_empty() {
        assert!(matches!(resolve(&origin(), "   "), Err(UrlError::Empty)));
    }
}
