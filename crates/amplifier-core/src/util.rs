//! Small shared utilities used across the bundle and install-state layers:
//! atomic writes with a pre-write backup, YAML frontmatter splitting, a
//! generic recursive JSON deep-merge, and JSON sanitization for values that
//! may carry non-serializable leaves.

use std::fs;
use std::io;
use std::path::Path;

use serde_json::Value;

/// Write `contents` to `path` via a temp-file-plus-rename in the same
/// directory, taking a best-effort `.bak` copy of any prior file first.
pub fn atomic_write_with_backup(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    if path.exists() {
        let backup_path = path.with_extension(match path.extension() {
            Some(ext) => format!("{}.bak", ext.to_string_lossy()),
            None => "bak".to_string(),
        });
        // Best-effort: a failed backup must never block the write itself.
        let _ = fs::copy(path, &backup_path);
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("amplifier.tmp");
    let tmp_path = dir.join(format!(".{file_name}.tmp"));
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)
}

/// Split a `bundle.md`-style document into its YAML frontmatter and
/// markdown body. Frontmatter is delimited by `---` lines; a document with
/// no frontmatter delimiter returns an empty frontmatter string and the
/// whole document as the body.
pub fn split_frontmatter(document: &str) -> (String, String) {
    let trimmed = document.trim_start_matches('\u{feff}');
    let Some(rest) = trimmed.strip_prefix("---") else {
        return (String::new(), document.to_string());
    };
    // Frontmatter opener must be on its own line.
    let rest = match rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n")) {
        Some(r) => r,
        None => return (String::new(), document.to_string()),
    };

    let Some(end_idx) = find_closing_delimiter(rest) else {
        return (String::new(), document.to_string());
    };

    let frontmatter = rest[..end_idx].to_string();
    let after = &rest[end_idx..];
    let body = after
        .trim_start_matches("---")
        .trim_start_matches("\r\n")
        .trim_start_matches('\n');
    (frontmatter, body.to_string())
}

fn find_closing_delimiter(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed == "---" {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Recursively merge `overlay` over `base`. Objects merge key-by-key
/// (recursing into nested objects); any other type pairing (scalars,
/// arrays, or a type mismatch) takes the overlay value wholesale.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, overlay_value) in overlay_map {
                let merged_value = match merged.get(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

/// Render any serializable value into a JSON tree that is guaranteed to
/// round-trip: non-serializable leaves collapse to `null` rather than
/// failing the whole conversion. Mirrors the reference's "sanitize LLM
/// SDK objects for persistence" helper, which statically typed transports
/// don't otherwise need — kept for values built up dynamically (hook
/// payloads, provider-native usage extras) before they hit disk or an IPC
/// boundary.
pub fn sanitize_for_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn split_frontmatter_extracts_yaml_and_body() {
        let doc = "---\nname: foo\nversion: 1\n---\n# Hello\nBody text\n";
        let (fm, body) = split_frontmatter(doc);
        assert_eq!(fm, "name: foo\nversion: 1\n");
        assert_eq!(body, "# Hello\nBody text\n");
    }

    #[test]
    fn split_frontmatter_without_delimiter_returns_whole_body() {
        let doc = "# Just markdown\nNo frontmatter here.\n";
        let (fm, body) = split_frontmatter(doc);
        assert!(fm.is_empty());
        assert_eq!(body, doc);
    }

    #[test]
    fn deep_merge_recurses_into_nested_objects() {
        let base = serde_json::json!({"context": {"config": {"max_tokens": 100000}}});
        let overlay = serde_json::json!({"context": {"config": {"max_tokens": 200000, "auto_compact": true}}});
        let merged = deep_merge(&base, &overlay);
        assert_eq!(merged["context"]["config"]["max_tokens"], 200000);
        assert_eq!(merged["context"]["config"]["auto_compact"], true);
    }

    #[test]
    fn deep_merge_overlay_scalar_replaces_base() {
        let base = serde_json::json!({"a": [1, 2, 3]});
        let overlay = serde_json::json!({"a": [4]});
        let merged = deep_merge(&base, &overlay);
        assert_eq!(merged["a"], serde_json::json!([4]));
    }

    #[test]
    fn sanitize_for_json_handles_primitive_and_struct() {
        assert_eq!(sanitize_for_json(&42), Value::from(42));
        assert_eq!(sanitize_for_json(&"hi".to_string()), Value::from("hi"));
    }

    #[test]
    fn atomic_write_with_backup_creates_bak_copy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        atomic_write_with_backup(&path, b"{\"v\":1}").unwrap();
        atomic_write_with_backup(&path, b"{\"v\":2}").unwrap();
        let bak = dir.path().join("state.bak");
        assert!(bak.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"v\":2}");
        assert_eq!(fs::read_to_string(&bak).unwrap(), "{\"v\":1}");
    }
}
