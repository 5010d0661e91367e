//! Module activation: resolve a module's source URI, install its
//! dependencies, and track the resulting local path for mounting.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::env;
use crate::install_state::InstallStateManager;
use crate::sources::{self, SourceError};

/// Errors raised while activating one or more modules.
#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error("failed to activate module {module}: {source}")]
    Resolve {
        module: String,
        #[source]
        source: SourceError,
    },
    #[error("dependency install failed for {module_path}: {message}")]
    DependencyInstall { module_path: PathBuf, message: String },
}

/// A module dependency installer, abstracted so the activator does not
/// hardcode a specific package manager invocation. The default
/// implementation shells out to whatever installer is appropriate for the
/// manifest found in the module directory.
pub trait DependencyInstaller: Send + Sync {
    /// Install the dependencies declared by `module_path`'s manifest, if
    /// any. A module with no recognized manifest is a no-op success.
    fn install(&self, module_path: &Path) -> Result<(), String>;
}

/// Default installer: looks for `pyproject.toml` and shells out to `uv pip
/// install -e`, falling back to `requirements.txt` via `uv pip install -r`.
/// Mirrors the Python reference implementation's subprocess invocation.
pub struct UvDependencyInstaller;

impl DependencyInstaller for UvDependencyInstaller {
    fn install(&self, module_path: &Path) -> Result<(), String> {
        let pyproject = module_path.join("pyproject.toml");
        let requirements = module_path.join("requirements.txt");

        let args: Vec<String> = if pyproject.exists() {
            vec![
                "pip".to_string(),
                "install".to_string(),
                "-e".to_string(),
                module_path.to_string_lossy().into_owned(),
                "--quiet".to_string(),
            ]
        } else if requirements.exists() {
            vec![
                "pip".to_string(),
                "install".to_string(),
                "-r".to_string(),
                requirements.to_string_lossy().into_owned(),
                "--quiet".to_string(),
            ]
        } else {
            return Ok(());
        };

        let output = std::process::Command::new("uv")
            .args(&args)
            .output()
            .map_err(|e| format!("uv is not installed or failed to launch: {e}"))?;

        if !output.status.success() {
            return Err(format!(
                "uv pip install failed for {}: {}",
                module_path.display(),
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(())
    }
}

/// A module spec requested for activation: a logical name paired with a
/// source URI.
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    pub module: String,
    pub source: String,
}

/// Activates modules by downloading their sources, installing their
/// dependencies, and remembering the resulting local paths.
pub struct ModuleActivator {
    cache_dir: PathBuf,
    base_path: Option<PathBuf>,
    install_deps: bool,
    installer: Box<dyn DependencyInstaller>,
    install_state: Mutex<InstallStateManager>,
    activated: Mutex<HashSet<String>>,
    bundle_package_paths: Mutex<Vec<PathBuf>>,
}

impl ModuleActivator {
    pub fn new(cache_dir: Option<PathBuf>, install_deps: bool, base_path: Option<PathBuf>) -> Self {
        let cache_dir = cache_dir.unwrap_or_else(env::cache_dir);
        let install_state = InstallStateManager::new(&cache_dir);
        Self {
            cache_dir,
            base_path,
            install_deps,
            installer: Box::new(UvDependencyInstaller),
            install_state: Mutex::new(install_state),
            activated: Mutex::new(HashSet::new()),
            bundle_package_paths: Mutex::new(Vec::new()),
        }
    }

    /// Override the dependency installer (used by tests and non-Python
    /// ecosystems that need a different package manager).
    pub fn with_installer(mut self, installer: Box<dyn DependencyInstaller>) -> Self {
        self.installer = installer;
        self
    }

    /// Paths of bundle-owned source packages that need to be inherited by
    /// spawned sub-sessions.
    pub fn bundle_package_paths(&self) -> Vec<PathBuf> {
        self.bundle_package_paths.lock().unwrap().clone()
    }

    /// Activate a single module, resolving and (optionally) installing its
    /// dependencies. Idempotent within the activator's lifetime.
    pub fn activate(&self, module_name: &str, source_uri: &str) -> Result<PathBuf, ActivationError> {
        let cache_key = format!("{module_name}:{source_uri}");
        if self.activated.lock().unwrap().contains(&cache_key) {
            return self.resolve(module_name, source_uri);
        }

        let module_path = self.resolve(module_name, source_uri)?;

        if self.install_deps {
            self.install_dependencies(&module_path)?;
        }

        self.activated.lock().unwrap().insert(cache_key);
        Ok(module_path)
    }

    fn resolve(&self, module_name: &str, source_uri: &str) -> Result<PathBuf, ActivationError> {
        let resolved = sources::resolve_source(source_uri, self.base_path.as_deref(), &[self.cache_dir.clone()])
            .map_err(|source| ActivationError::Resolve {
                module: module_name.to_string(),
                source,
            })?;
        Ok(resolved.active_path)
    }

    /// Activate every module in `modules` in parallel, collecting
    /// per-module errors without letting one failure abort the batch.
    ///
    /// Each activation touches blocking I/O (git clone, package install),
    /// so the batch fans out across real OS threads via `thread::scope`
    /// rather than serially awaiting one activation at a time.
    pub async fn activate_all(&self, modules: &[ModuleSpec]) -> HashMap<String, PathBuf> {
        let results: Vec<(String, Result<PathBuf, ActivationError>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = modules
                .iter()
                .map(|spec| {
                    let module = spec.module.clone();
                    let source = spec.source.clone();
                    scope.spawn(move || {
                        let outcome = self.activate(&module, &source);
                        (module, outcome)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("module activation thread panicked"))
                .collect()
        });

        let mut activated = HashMap::new();
        for (module, outcome) in results {
            match outcome {
                Ok(path) => {
                    activated.insert(module, path);
                }
                Err(err) => {
                    log::error!("failed to activate {module}: {err}");
                }
            }
        }
        activated
    }

    /// Install a bundle's own package (if it has a `pyproject.toml` at its
    /// root) before activating its child modules, and track the bundle's
    /// `src/` directory for sub-session inheritance.
    pub fn activate_bundle_package(&self, bundle_path: &Path) -> Result<(), ActivationError> {
        if !bundle_path.exists() {
            return Ok(());
        }
        if !bundle_path.join("pyproject.toml").exists() {
            return Ok(());
        }

        self.install_dependencies(bundle_path)?;

        let src_dir = bundle_path.join("src");
        if src_dir.is_dir() {
            let mut paths = self.bundle_package_paths.lock().unwrap();
            if !paths.contains(&src_dir) {
                paths.push(src_dir);
            }
        }
        Ok(())
    }

    fn install_dependencies(&self, module_path: &Path) -> Result<(), ActivationError> {
        {
            let state = self.install_state.lock().unwrap();
            if state.is_installed(module_path) {
                return Ok(());
            }
        }

        self.installer
            .install(module_path)
            .map_err(|message| ActivationError::DependencyInstall {
                module_path: module_path.to_path_buf(),
                message,
            })?;

        self.install_state.lock().unwrap().mark_installed(module_path);
        Ok(())
    }

    /// Persist any pending install-state changes to disk.
    pub fn finalize(&self) -> std::io::Result<()> {
        self.install_state.lock().unwrap().save()
    }
}
