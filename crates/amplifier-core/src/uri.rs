//! Module source URI grammar.
//!
//! Parses the pip/uv-flavored source URIs used throughout Amplifier bundle
//! manifests: `git+https://...@ref#subdirectory=...`, `zip+https://...`,
//! `file://...`, bare filesystem paths, and bare package/subpath references.

use std::path::{Path, PathBuf};

/// Components of a parsed module source URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUri {
    /// `git`, `git+https`, `zip+https`, `file`, `http`, `https`, or empty
    /// for bare package references.
    pub scheme: String,
    /// Host portion for network schemes (e.g. `github.com`).
    pub host: String,
    /// Path portion: repository path, local filesystem path, or package
    /// name.
    pub path: String,
    /// Branch, tag, or commit ref (git URIs only; empty otherwise).
    pub r#ref: String,
    /// Subdirectory within the fetched container, from a
    /// `#subdirectory=...` fragment.
    pub subpath: String,
}

impl ParsedUri {
    pub fn is_git(&self) -> bool {
        self.scheme == "git" || self.scheme.starts_with("git+")
    }

    pub fn is_file(&self) -> bool {
        self.scheme == "file" || (self.scheme.is_empty() && self.path.contains('/'))
    }

    pub fn is_http(&self) -> bool {
        self.scheme == "http" || self.scheme == "https"
    }

    pub fn is_zip(&self) -> bool {
        self.scheme.starts_with("zip+")
    }

    pub fn is_package(&self) -> bool {
        self.scheme.is_empty() && !self.path.contains('/')
    }
}

/// Result of resolving a source URI to local filesystem paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// The requested path: either `source_root` itself, or a subdirectory
    /// of it when the URI carried a `#subdirectory=` fragment.
    pub active_path: PathBuf,
    /// The full clone/extract root.
    pub source_root: PathBuf,
}

impl ResolvedSource {
    pub fn is_subdirectory(&self) -> bool {
        self.active_path != self.source_root
    }
}

/// Parse a module source URI into its components.
pub fn parse_uri(uri: &str) -> ParsedUri {
    if let Some(rest) = uri.strip_prefix("git+") {
        return parse_vcs_uri(rest, "git+");
    }
    if let Some(rest) = uri.strip_prefix("zip+") {
        return parse_vcs_uri(rest, "zip+");
    }
    if let Some(rest) = uri.strip_prefix("file://") {
        let (path, subpath) = extract_fragment_subpath(rest);
        return ParsedUri {
            scheme: "file".to_string(),
            host: String::new(),
            path,
            r#ref: String::new(),
            subpath,
        };
    }
    if uri.starts_with('/') {
        return ParsedUri {
            scheme: "file".to_string(),
            host: String::new(),
            path: uri.to_string(),
            r#ref: String::new(),
            subpath: String::new(),
        };
    }
    if uri.starts_with("./") || uri.starts_with("../") {
        return ParsedUri {
            scheme: "file".to_string(),
            host: String::new(),
            path: uri.to_string(),
            r#ref: String::new(),
            subpath: String::new(),
        };
    }
    if let Some(rest) = uri.strip_prefix("https://") {
        return parse_http_uri(rest, "https");
    }
    if let Some(rest) = uri.strip_prefix("http://") {
        return parse_http_uri(rest, "http");
    }
    if let Some((head, tail)) = uri.split_once('/') {
        return ParsedUri {
            scheme: String::new(),
            host: String::new(),
            path: head.to_string(),
            r#ref: String::new(),
            subpath: tail.to_string(),
        };
    }
    ParsedUri {
        scheme: String::new(),
        host: String::new(),
        path: uri.to_string(),
        r#ref: String::new(),
        subpath: String::new(),
    }
}

fn parse_http_uri(rest: &str, scheme: &str) -> ParsedUri {
    let (authority_and_path, fragment) = match rest.split_once('#') {
        Some((a, f)) => (a, f),
        None => (rest, ""),
    };
    let (authority_and_path, _query) = match authority_and_path.split_once('?') {
        Some((a, q)) => (a, q),
        None => (authority_and_path, ""),
    };
    let (host, path) = match authority_and_path.split_once('/') {
        Some((h, p)) => (h.to_string(), format!("/{p}")),
        None => (authority_and_path.to_string(), String::new()),
    };
    ParsedUri {
        scheme: scheme.to_string(),
        host,
        path,
        r#ref: String::new(),
        subpath: extract_subdirectory_from_fragment(fragment),
    }
}

fn parse_vcs_uri(uri_without_prefix: &str, prefix: &str) -> ParsedUri {
    let (without_fragment, fragment) = match uri_without_prefix.split_once('#') {
        Some((a, f)) => (a, f),
        None => (uri_without_prefix, ""),
    };
    let subpath = extract_subdirectory_from_fragment(fragment);

    // Split scheme://authority/path, ignoring any query string.
    let (scheme_part, rest) = without_fragment
        .split_once("://")
        .unwrap_or(("", without_fragment));
    let (authority, mut path) = match rest.split_once('/') {
        Some((h, p)) => (h.to_string(), format!("/{p}")),
        None => (rest.to_string(), String::new()),
    };
    if let Some((p, _query)) = path.split_once('?') {
        path = p.to_string();
    }

    let mut r#ref = String::new();
    if prefix == "git+" {
        // Path may carry `@ref`, where ref itself may contain slashes
        // (e.g. `feat/new-feature`); the ref starts at the first `@`.
        if let Some((head, tail)) = path.split_once('@') {
            path = head.to_string();
            r#ref = tail.to_string();
        } else {
            r#ref = "main".to_string();
        }
    }

    let full_scheme = if scheme_part.is_empty() {
        prefix.trim_end_matches('+').to_string()
    } else {
        format!("{prefix}{scheme_part}")
    };

    ParsedUri {
        scheme: full_scheme,
        host: authority,
        path,
        r#ref,
        subpath,
    }
}

fn extract_subdirectory_from_fragment(fragment: &str) -> String {
    if fragment.is_empty() {
        return String::new();
    }
    for part in fragment.split('&') {
        if let Some(value) = part.strip_prefix("subdirectory=") {
            return value.to_string();
        }
    }
    String::new()
}

fn extract_fragment_subpath(uri_with_possible_fragment: &str) -> (String, String) {
    if let Some((path, fragment)) = uri_with_possible_fragment.split_once('#') {
        (path.to_string(), extract_subdirectory_from_fragment(fragment))
    } else {
        (uri_with_possible_fragment.to_string(), String::new())
    }
}

/// Normalize a path, resolving it relative to `relative_to` if it is not
/// already absolute.
pub fn normalize_path(path: &str, relative_to: Option<&Path>) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        return p.to_path_buf();
    }
    match relative_to {
        Some(base) => base.join(p),
        None => p.to_path_buf(),
    }
}
