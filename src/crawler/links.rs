//! Link resolution and URL normalization

use url::Url;

/// Resolve an `href` found on `base` into a normalized absolute URL
///
/// Returns `None` for in-page anchors, non-navigational schemes and
/// anything that does not resolve to http(s).
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("javascript:")
        || href.starts_with("data:")
    {
        return None;
    }

    let url = base.join(href).ok()?;
    normalize(url)
}

/// Normalize an absolute URL before it is queued or fetched
///
/// Drops the fragment. The path is left alone so relative links on the page
/// still resolve against it. Scheme and host case and default ports are
/// already normalized by the `url` parser.
pub fn normalize(mut url: Url) -> Option<Url> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.host_str()?;

    url.set_fragment(None);
    Some(url)
}

/// Visited-set key of a normalized URL
///
/// Equal to the URL with the trailing slash of a non-root path removed, so
/// `/docs/` and `/docs` are one page.
pub fn visit_key(url: &Url) -> String {
    let path = url.path();
    if path.len() <= 1 || !path.ends_with('/') {
        return url.to_string();
    }
    let mut key = url.clone();
    let trimmed = path.trim_end_matches('/');
    key.set_path(if trimmed.is_empty() { "/" } else { trimmed });
    key.to_string()
}
