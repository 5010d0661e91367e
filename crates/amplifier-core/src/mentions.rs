//! `@mention` parsing, resolution, and recursive loading.
//!
//! Mirrors the Python reference's `amplifier_foundation.mentions` package:
//! a regex-based extractor that ignores code fences and inline code, a
//! resolver protocol that maps a mention to a filesystem path, and a
//! loader that reads resolved files recursively with SHA-256 content
//! deduplication and cycle-safe depth bounding.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(?:^|\n)```[^\n]*\n.*?(?:^|\n)```").unwrap());
static INLINE_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]+`").unwrap());
static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([a-zA-Z0-9_:./~-]+)").unwrap());
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap());

/// Extract `@mention` references from text, in first-seen order, deduplicated.
///
/// Mentions inside fenced code blocks (```` ``` ```` at line start) or inline
/// code (single backticks) are ignored. `@user@domain.tld`-shaped email
/// addresses are not treated as mentions.
pub fn parse_mentions(text: &str) -> Vec<String> {
    let stripped = strip_code(text);

    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for caps in MENTION_RE.captures_iter(&stripped) {
        let whole = caps.get(0).unwrap().as_str();
        if EMAIL_RE.is_match(whole) {
            continue;
        }
        let mention = whole.to_string();
        if seen.insert(mention.clone()) {
            result.push(mention);
        }
    }
    result
}

fn strip_code(text: &str) -> String {
    let without_fences = FENCE_RE.replace_all(text, "\n");
    INLINE_CODE_RE.replace_all(&without_fences, "").into_owned()
}

/// Resolves an `@mention` string to a local filesystem path.
///
/// Implementors may add app-specific namespace shortcuts; the core only
/// ships [`BaseMentionResolver`], which understands `@ns:path` (via a
/// registered namespace table), `@~/path` (home expansion), and plain
/// paths relative to a configured base directory.
pub trait MentionResolver: Send + Sync {
    fn resolve(&self, mention: &str) -> Option<PathBuf>;
}

/// Base resolver implementing the three mention forms the core understands.
///
/// `namespaces` maps a bundle/namespace name to the directory its `ns:path`
/// mentions resolve against (typically a bundle's `source_base_paths` entry).
pub struct BaseMentionResolver {
    namespaces: HashMap<String, PathBuf>,
    base_path: PathBuf,
}

impl BaseMentionResolver {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            namespaces: HashMap::new(),
            base_path: base_path.into(),
        }
    }

    pub fn register_namespace(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.namespaces.insert(name.into(), path.into());
    }
}

impl MentionResolver for BaseMentionResolver {
    fn resolve(&self, mention: &str) -> Option<PathBuf> {
        let body = mention.strip_prefix('@')?;

        if let Some((namespace, name)) = body.split_once(':') {
            let root = self.namespaces.get(namespace)?;
            let candidate = root.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
            let with_md = root.join(format!("{name}.md"));
            return with_md.exists().then_some(with_md);
        }

        let (candidate, with_md) = if let Some(home_rel) = body.strip_prefix('~') {
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
            let rel = home_rel.strip_prefix('/').unwrap_or(home_rel);
            (home.join(rel), home.join(format!("{rel}.md")))
        } else {
            (self.base_path.join(body), self.base_path.join(format!("{body}.md")))
        };

        if candidate.exists() {
            Some(candidate)
        } else if with_md.exists() {
            Some(with_md)
        } else {
            None
        }
    }
}

/// A unique piece of content loaded from one or more mentions.
///
/// When the same content is reachable via multiple mentions (a symlink, a
/// re-exported file, two namespaces pointing at the same tree) all
/// contributing paths are recorded for attribution in
/// [`format_context_block`].
#[derive(Debug, Clone)]
pub struct ContextFile {
    pub content: String,
    pub content_hash: String,
    pub paths: Vec<PathBuf>,
}

/// Outcome of resolving a single top-level `@mention`.
#[derive(Debug, Clone)]
pub struct MentionResult {
    pub mention: String,
    pub resolved_path: Option<PathBuf>,
    pub content: Option<String>,
    pub is_directory: bool,
}

impl MentionResult {
    pub fn found(&self) -> bool {
        self.resolved_path.is_some() && (self.content.is_some() || self.is_directory)
    }
}

/// SHA-256 content deduplicator with multi-path attribution.
#[derive(Default)]
pub struct ContentDeduplicator {
    content_by_hash: HashMap<String, String>,
    paths_by_hash: HashMap<String, Vec<PathBuf>>,
}

impl ContentDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file's content. Returns `true` if the content is new,
    /// `false` if it is a duplicate (the path is still tracked either way).
    pub fn add_file(&mut self, path: &Path, content: &str) -> bool {
        let hash = hash_content(content);
        let resolved = canonicalize_best_effort(path);

        let paths = self.paths_by_hash.entry(hash.clone()).or_default();
        let is_new = !self.content_by_hash.contains_key(&hash);
        if is_new {
            self.content_by_hash.insert(hash, content.to_string());
            paths.push(resolved);
        } else if !paths.iter().any(|p| canonicalize_best_effort(p) == resolved) {
            paths.push(resolved);
        }
        is_new
    }

    pub fn is_seen(&self, content: &str) -> bool {
        self.content_by_hash.contains_key(&hash_content(content))
    }

    pub fn get_unique_files(&self) -> Vec<ContextFile> {
        self.content_by_hash
            .iter()
            .map(|(hash, content)| ContextFile {
                content: content.clone(),
                content_hash: hash.clone(),
                paths: self.paths_by_hash.get(hash).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn canonicalize_best_effort(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Directory-listing rendering used when a mention resolves to a directory.
///
/// Directories are listed first, then files, both sorted case-insensitively.
pub fn format_directory_listing(path: &Path) -> std::io::Result<String> {
    let mut entries: Vec<_> = std::fs::read_dir(path)?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| {
        let is_file = e.path().is_file();
        (is_file, e.file_name().to_string_lossy().to_lowercase())
    });

    let lines: Vec<String> = entries
        .iter()
        .map(|e| {
            let marker = if e.path().is_dir() { "DIR " } else { "FILE" };
            format!("  {marker} {}", e.file_name().to_string_lossy())
        })
        .collect();

    let listing = if lines.is_empty() {
        "  (empty directory)".to_string()
    } else {
        lines.join("\n")
    };
    Ok(format!("Directory: {}\n\n{listing}", path.display()))
}

/// Parse and recursively load every `@mention` in `text`.
///
/// Resolution is opportunistic: a mention that fails to resolve, or whose
/// target can't be read, is silently skipped rather than treated as an
/// error. Recursion into a loaded file's own mentions is bounded by
/// `max_depth` and made cycle-safe by the shared deduplicator (content
/// already seen is never re-parsed for nested mentions).
pub fn load_mentions(
    text: &str,
    resolver: &dyn MentionResolver,
    dedup: &mut ContentDeduplicator,
    max_depth: u32,
) -> Vec<MentionResult> {
    parse_mentions(text)
        .into_iter()
        .map(|mention| resolve_one(&mention, resolver, dedup, max_depth, 0))
        .collect()
}

fn resolve_one(
    mention: &str,
    resolver: &dyn MentionResolver,
    dedup: &mut ContentDeduplicator,
    max_depth: u32,
    depth: u32,
) -> MentionResult {
    let Some(path) = resolver.resolve(mention) else {
        return MentionResult {
            mention: mention.to_string(),
            resolved_path: None,
            content: None,
            is_directory: false,
        };
    };

    if path.is_dir() {
        return match format_directory_listing(&path) {
            Ok(listing) => {
                dedup.add_file(&path, &listing);
                MentionResult {
                    mention: mention.to_string(),
                    resolved_path: Some(path),
                    content: Some(listing),
                    is_directory: true,
                }
            }
            Err(_) => MentionResult {
                mention: mention.to_string(),
                resolved_path: Some(path),
                content: None,
                is_directory: true,
            },
        };
    }

    let Ok(content) = std::fs::read_to_string(&path) else {
        return MentionResult {
            mention: mention.to_string(),
            resolved_path: Some(path),
            content: None,
            is_directory: false,
        };
    };

    if !dedup.add_file(&path, &content) {
        return MentionResult {
            mention: mention.to_string(),
            resolved_path: Some(path),
            content: None,
            is_directory: false,
        };
    }

    if depth < max_depth {
        for nested in parse_mentions(&content) {
            resolve_one(&nested, resolver, dedup, max_depth, depth + 1);
        }
    }

    MentionResult {
        mention: mention.to_string(),
        resolved_path: Some(path),
        content: Some(content),
        is_directory: false,
    }
}

/// Render every uniquely-loaded file as an XML-ish `<context_file>` block,
/// prefixed with the `@mention → absolute path` attribution for every path
/// that contributed the same content.
pub fn format_context_block(dedup: &ContentDeduplicator, mention_to_path: &HashMap<String, PathBuf>) -> String {
    let unique_files = dedup.get_unique_files();
    if unique_files.is_empty() {
        return String::new();
    }

    let mut path_to_mentions: HashMap<PathBuf, Vec<String>> = HashMap::new();
    for (mention, path) in mention_to_path {
        let resolved = canonicalize_best_effort(path);
        path_to_mentions.entry(resolved).or_default().push(mention.clone());
    }

    let blocks: Vec<String> = unique_files
        .iter()
        .map(|cf| {
            let mut path_displays = Vec::new();
            for p in &cf.paths {
                let resolved = canonicalize_best_effort(p);
                if let Some(mentions) = path_to_mentions.get(&resolved) {
                    for m in mentions {
                        path_displays.push(format!("{m} \u{2192} {}", resolved.display()));
                    }
                } else {
                    path_displays.push(resolved.display().to_string());
                }
            }
            let paths_attr = path_displays.join(", ");
            format!("<context_file paths=\"{paths_attr}\">\n{}\n</context_file>", cf.content)
        })
        .collect();

    blocks.join("\n\n")
}
