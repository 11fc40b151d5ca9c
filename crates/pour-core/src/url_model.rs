//! URL validation and archive file name derivation.

/// Schemes the fetcher accepts. `file` is handy for local mirrors.
pub const SUPPORTED_SCHEMES: &[&str] = &["http", "https", "file"];

/// Extracts the last path segment from a URL for use as the archive file name.
///
/// Returns `None` if the URL cannot be parsed or the path is empty/root.
pub fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// Checks that `url` parses and uses one of [`SUPPORTED_SCHEMES`].
pub fn validate_url(url: &str) -> Result<url::Url, String> {
    if url.trim().is_empty() {
        return Err("URL is empty".to_string());
    }
    let parsed = url::Url::parse(url).map_err(|e| e.to_string())?;
    if !SUPPORTED_SCHEMES.contains(&parsed.scheme()) {
        return Err(format!("unsupported scheme `{}`", parsed.scheme()));
    }
    Ok(parsed)
}
