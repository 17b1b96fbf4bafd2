//! Conversions between tests-root relative paths and mounted test URLs.

/// Normalize a URL base so it starts and ends with `/`.
#[must_use]
pub fn normalize_url_base(url_base: &str) -> String {
    let trimmed = url_base.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        format!("/{trimmed}/")
    }
}

/// The URL a file at `rel_path` is served from under `url_base`.
///
/// `rel_path_to_url("a/test.html", "/")` is `"/a/test.html"`.
#[must_use]
pub fn rel_path_to_url(rel_path: &str, url_base: &str) -> String {
    let rel = rel_path.replace('\\', "/");
    format!(
        "{}{}",
        normalize_url_base(url_base),
        rel.trim_start_matches('/')
    )
}

/// Inverse of [`rel_path_to_url`].
#[must_use]
pub fn url_to_rel_path(url: &str, url_base: &str) -> String {
    let base = normalize_url_base(url_base);
    url.strip_prefix(base.as_str())
        .unwrap_or_else(|| url.trim_start_matches('/'))
        .to_owned()
}

/// Resolve an `href` found in the document at `base_url`.
///
/// Root-relative and scheme-qualified hrefs are returned as-is; relative hrefs
/// are joined to the document's directory with `.` and `..` collapsed.
#[must_use]
pub fn resolve_href(base_url: &str, href: &str) -> String {
    if href.starts_with('/') || href.contains("://") {
        return href.to_owned();
    }

    let (href_path, suffix) = split_suffix(href);
    let (base_path, _) = split_suffix(base_url);

    if href_path.is_empty() {
        return format!("{base_path}{suffix}");
    }

    let dir = base_path
        .rfind('/')
        .and_then(|idx| base_path.get(..=idx))
        .unwrap_or("/");

    format!("{}{suffix}", collapse_segments(&format!("{dir}{href_path}")))
}

/// Split `url` at the first `?` or `#`.
fn split_suffix(url: &str) -> (&str, &str) {
    url.find(['?', '#'])
        .map_or((url, ""), |idx| url.split_at(idx))
}

fn collapse_segments(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut collapsed = format!("/{}", segments.join("/"));
    let is_dir = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
    if is_dir && !segments.is_empty() {
        collapsed.push('/');
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_base_normalization() {
        assert_eq!(normalize_url_base("/"), "/");
        assert_eq!(normalize_url_base(""), "/");
        assert_eq!(normalize_url_base("mount"), "/mount/");
        assert_eq!(normalize_url_base("/mount/"), "/mount/");
    }

    #[test]
    fn path_to_url_under_root() {
        assert_eq!(rel_path_to_url("a/test.html", "/"), "/a/test.html");
    }

    #[test]
    fn path_to_url_under_mount_point() {
        assert_eq!(rel_path_to_url("a/test.html", "/tests"), "/tests/a/test.html");
        assert_eq!(rel_path_to_url("a\\test.html", "/tests/"), "/tests/a/test.html");
    }

    #[test]
    fn url_to_path_strips_base() {
        assert_eq!(url_to_rel_path("/tests/a/test.html", "/tests/"), "a/test.html");
        assert_eq!(url_to_rel_path("/a/test.html", "/"), "a/test.html");
    }

    #[test]
    fn resolve_relative_href() {
        assert_eq!(resolve_href("/a/b/test.html", "ref.html"), "/a/b/ref.html");
        assert_eq!(resolve_href("/a/b/test.html", "./ref.html"), "/a/b/ref.html");
        assert_eq!(resolve_href("/a/b/test.html", "../ref.html"), "/a/ref.html");
        assert_eq!(resolve_href("/a/test.html", "../../ref.html"), "/ref.html");
    }

    #[test]
    fn resolve_keeps_absolute_href() {
        assert_eq!(resolve_href("/a/test.html", "/b/ref.html"), "/b/ref.html");
        assert_eq!(
            resolve_href("/a/test.html", "http://example.test/ref.html"),
            "http://example.test/ref.html"
        );
    }

    #[test]
    fn resolve_preserves_query_and_fragment() {
        assert_eq!(resolve_href("/a/test.html?x=1", "ref.html#top"), "/a/ref.html#top");
        assert_eq!(resolve_href("/a/test.html", "?variant"), "/a/test.html?variant");
    }
}
