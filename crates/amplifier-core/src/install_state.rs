//! Fingerprint cache for skipping redundant module dependency installs.
//!
//! Tracks, per module directory, a hash of its dependency manifest
//! (`pyproject.toml` or `requirements.txt`) so [`crate::activator`] can skip
//! re-running the dependency installer when nothing has changed. The whole
//! cache is invalidated whenever the toolchain identity or its mtime
//! changes, since that implies the environment the fingerprints were
//! recorded against no longer exists.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const STATE_FILE_NAME: &str = "install-state.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModuleEntry {
    fingerprint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct State {
    version: u32,
    toolchain: String,
    toolchain_mtime: Option<i64>,
    modules: HashMap<String, ModuleEntry>,
}

/// Tracks per-module dependency-install fingerprints, persisted as JSON
/// under the Amplifier cache directory.
pub struct InstallStateManager {
    state_path: PathBuf,
    state: State,
}

impl InstallStateManager {
    /// State schema version. Bump when the on-disk format changes in a way
    /// that is not backward compatible; any mismatch forces a fresh state.
    pub const VERSION: u32 = 1;

    /// Load (or initialize) install state under `cache_dir`.
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        let state_path = cache_dir.as_ref().join(STATE_FILE_NAME);
        let toolchain = current_toolchain_path();
        let toolchain_mtime = toolchain_mtime(&toolchain);

        let loaded = fs::read_to_string(&state_path)
            .ok()
            .and_then(|raw| serde_json::from_str::<State>(&raw).ok());

        let state = match loaded {
            Some(existing)
                if existing.version == Self::VERSION
                    && existing.toolchain == toolchain
                    && existing.toolchain_mtime.is_some()
                    && existing.toolchain_mtime == toolchain_mtime =>
            {
                existing
            }
            _ => State {
                version: Self::VERSION,
                toolchain,
                toolchain_mtime,
                modules: HashMap::new(),
            },
        };

        Self { state_path, state }
    }

    /// Whether `module_dir`'s dependency manifest fingerprint matches the
    /// last recorded one.
    pub fn is_installed(&self, module_dir: impl AsRef<Path>) -> bool {
        let key = module_key(module_dir.as_ref());
        let Some(entry) = self.state.modules.get(&key) else {
            return false;
        };
        match fingerprint_module(module_dir.as_ref()) {
            Some(current) => current == entry.fingerprint,
            None => false,
        }
    }

    /// Record the current fingerprint of `module_dir` as installed. No-op
    /// if the module has no recognizable dependency manifest.
    pub fn mark_installed(&mut self, module_dir: impl AsRef<Path>) {
        let Some(fingerprint) = fingerprint_module(module_dir.as_ref()) else {
            return;
        };
        let key = module_key(module_dir.as_ref());
        self.state.modules.insert(key, ModuleEntry { fingerprint });
    }

    /// Remove a single module's cached fingerprint, or every entry when
    /// `module_dir` is `None`.
    pub fn invalidate(&mut self, module_dir: Option<&Path>) {
        match module_dir {
            Some(dir) => {
                self.state.modules.remove(&module_key(dir));
            }
            None => self.state.modules.clear(),
        }
    }

    /// Persist the current state to disk via an atomic write.
    pub fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string_pretty(&self.state)?;
        atomic_write(&self.state_path, serialized.as_bytes())
    }
}

fn module_key(module_dir: &Path) -> String {
    module_dir
        .canonicalize()
        .unwrap_or_else(|_| module_dir.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn fingerprint_module(module_dir: &Path) -> Option<String> {
    for manifest in ["pyproject.toml", "requirements.txt", "Cargo.toml"] {
        let path = module_dir.join(manifest);
        if let Ok(contents) = fs::read(&path) {
            let digest = Sha256::digest(&contents);
            return Some(format!("sha256:{digest:x}"));
        }
    }
    None
}

fn current_toolchain_path() -> String {
    std::env::current_exe()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn toolchain_mtime(toolchain: &str) -> Option<i64> {
    let metadata = fs::metadata(toolchain).ok()?;
    let modified = metadata.modified().ok()?;
    let duration = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(duration.as_secs() as i64)
}

fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("install-state");
    let tmp_path = dir.join(format!(".{file_name}.tmp"));
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)
}
