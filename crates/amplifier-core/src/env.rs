//! Amplifier home directory resolution and credential environment lookups.
//!
//! Mirrors the path-resolution rules of the Python reference implementation:
//! `AMPLIFIER_HOME` wins when set, otherwise `~/.amplifier` is used. A
//! separate `AMPLIFIER_GIT_HOST` variable lets operators point git module
//! fetches at an internal mirror instead of `github.com`.

use std::env;
use std::path::{Path, PathBuf};

/// Resolve the Amplifier home directory.
///
/// Resolution order:
/// 1. `AMPLIFIER_HOME` environment variable (expanded and made absolute).
/// 2. `~/.amplifier`.
pub fn amplifier_home() -> PathBuf {
    if let Ok(home) = env::var("AMPLIFIER_HOME") {
        if !home.is_empty() {
            return expand_user(&home);
        }
    }
    user_home().join(".amplifier")
}

/// Directory used to cache downloaded module sources (git clones, zip
/// extracts, http downloads).
pub fn cache_dir() -> PathBuf {
    amplifier_home().join("cache")
}

/// Directory used to persist install-state fingerprints.
pub fn state_dir() -> PathBuf {
    amplifier_home().join("state")
}

/// Git mirror host override, if configured via `AMPLIFIER_GIT_HOST`.
///
/// Only used to rewrite `github.com` URLs; any other host in the source
/// URI is left untouched by callers.
pub fn git_host_override() -> Option<String> {
    env::var("AMPLIFIER_GIT_HOST").ok().filter(|s| !s.is_empty())
}

/// Rewrite a GitHub URL to the configured mirror host, preserving the
/// trailing `org/repo` path. Returns the URL unchanged if no mirror is
/// configured or the URL is not a `github.com` URL.
pub fn apply_git_host_rewrite(url: &str) -> String {
    let Some(shadow_host) = git_host_override() else {
        return url.to_string();
    };
    if !url.contains("github.com") {
        return url.to_string();
    }
    let url_clean = url.strip_suffix(".git").unwrap_or(url);
    let Some((_, rest)) = url_clean.split_once("github.com/") else {
        return url.to_string();
    };
    let mut parts = rest.splitn(2, '/');
    let _org = parts.next();
    let Some(repo) = parts.next() else {
        return url.to_string();
    };
    let repo = repo.split('/').next().unwrap_or(repo);
    format!("{}/amplifier/{}", shadow_host.trim_end_matches('/'), repo)
}

/// GitHub API token used for authenticated commit-SHA lookups, if present.
pub fn github_token() -> Option<String> {
    env::var("GITHUB_TOKEN").ok().filter(|s| !s.is_empty())
}

/// Resolve a provider's credential from the environment, trying the
/// provider-specific variable name first (e.g. `ANTHROPIC_API_KEY`) and
/// falling back to a generic `AMPLIFIER_<PROVIDER>_API_KEY` form.
pub fn provider_credential(provider: &str) -> Option<String> {
    let normalized = provider
        .trim_start_matches("provider-")
        .to_uppercase()
        .replace('-', "_");
    for candidate in [
        format!("{normalized}_API_KEY"),
        format!("AMPLIFIER_{normalized}_API_KEY"),
    ] {
        if let Ok(value) = env::var(&candidate) {
            if !value.is_empty() {
                return Some(value);
            }
        }
    }
    None
}

fn user_home() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn expand_user(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        return user_home().join(rest);
    }
    if path == "~" {
        return user_home();
    }
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize these tests.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn amplifier_home_defaults_to_dot_amplifier() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("AMPLIFIER_HOME");
        let home = amplifier_home();
        assert!(home.ends_with(".amplifier"));
    }

    #[test]
    fn amplifier_home_respects_env_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("AMPLIFIER_HOME", "/tmp/custom-amplifier-home");
        let home = amplifier_home();
        env::remove_var("AMPLIFIER_HOME");
        assert_eq!(home, PathBuf::from("/tmp/custom-amplifier-home"));
    }

    #[test]
    fn cache_dir_and_state_dir_are_subdirs_of_home() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("AMPLIFIER_HOME", "/tmp/custom-amplifier-home2");
        assert_eq!(cache_dir(), PathBuf::from("/tmp/custom-amplifier-home2/cache"));
        assert_eq!(state_dir(), PathBuf::from("/tmp/custom-amplifier-home2/state"));
        env::remove_var("AMPLIFIER_HOME");
    }

    #[test]
    fn git_host_rewrite_noop_without_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("AMPLIFIER_GIT_HOST");
        let url = "https://github.com/org/repo";
        assert_eq!(apply_git_host_rewrite(url), url);
    }

    #[test]
    fn git_host_rewrite_applies_to_github_urls() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("AMPLIFIER_GIT_HOST", "https://mirror.internal");
        let rewritten = apply_git_host_rewrite("https://github.com/org/repo");
        env::remove_var("AMPLIFIER_GIT_HOST");
        assert_eq!(rewritten, "https://mirror.internal/amplifier/repo");
    }

    #[test]
    fn git_host_rewrite_ignores_non_github_urls() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("AMPLIFIER_GIT_HOST", "https://mirror.internal");
        let url = "https://gitlab.com/org/repo";
        let rewritten = apply_git_host_rewrite(url);
        env::remove_var("AMPLIFIER_GIT_HOST");
        assert_eq!(rewritten, url);
    }

    #[test]
    fn provider_credential_tries_both_forms() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("ANTHROPIC_API_KEY");
        env::remove_var("AMPLIFIER_ANTHROPIC_API_KEY");
        assert_eq!(provider_credential("anthropic"), None);

        env::set_var("AMPLIFIER_ANTHROPIC_API_KEY", "fallback-key");
        assert_eq!(provider_credential("anthropic"), Some("fallback-key".to_string()));
        env::remove_var("AMPLIFIER_ANTHROPIC_API_KEY");

        env::set_var("ANTHROPIC_API_KEY", "direct-key");
        assert_eq!(provider_credential("provider-anthropic"), Some("direct-key".to_string()));
        env::remove_var("ANTHROPIC_API_KEY");
    }

    #[test]
    fn github_token_reads_env() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("GITHUB_TOKEN");
        assert_eq!(github_token(), None);
        env::set_var("GITHUB_TOKEN", "ghp_test");
        assert_eq!(github_token(), Some("ghp_test".to_string()));
        env::remove_var("GITHUB_TOKEN");
    }
}
