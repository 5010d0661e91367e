//! Bundle manifest parsing, composition, validation, registry, and the
//! `PreparedBundle` that turns a composed bundle into a mountable plan.
//!
//! A [`Bundle`] is the declarative unit described by `bundle.md` /
//! `bundle.yaml`: which orchestrator and context manager to mount, which
//! providers/tools/hooks to load, and which context files to surface as
//! instructions. Bundles compose by deterministic rules (§4.3 of the
//! design doc): deep-merge `session`, merge `providers`/`tools`/`hooks` by
//! `module` id, replace `instruction` unless the overlay's is empty.
//!
//! [`BundleLoader`] reads a single manifest (resolving its own
//! `includes` recursively); [`BundleRegistry`] maps app-facing names to
//! URIs and caches loaded bundles; [`PreparedBundle`] is the final,
//! fully-resolved artifact a [`crate::session::Session`] is built from.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::BundleError;
use crate::mentions::BaseMentionResolver;
use crate::session::{Session, SessionConfig};
use crate::sources;
use crate::util;

// ---------------------------------------------------------------------------
// Module references and entries
// ---------------------------------------------------------------------------

/// A module entry as it appears in `providers`/`tools`/`hooks` lists:
/// always the full object form, never a bare id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl ModuleEntry {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            source: None,
            config: None,
        }
    }

    /// Deep-merge `overlay` onto `self` (same `module` id assumed). `config`
    /// deep-merges recursively; `source` is replaced when the overlay sets
    /// one.
    fn merged_with(&self, overlay: &ModuleEntry) -> ModuleEntry {
        let config = match (&self.config, &overlay.config) {
            (Some(base), Some(over)) => Some(util::deep_merge(base, over)),
            (None, Some(over)) => Some(over.clone()),
            (Some(base), None) => Some(base.clone()),
            (None, None) => None,
        };
        ModuleEntry {
            module: overlay.module.clone(),
            source: overlay.source.clone().or_else(|| self.source.clone()),
            config,
        }
    }
}

/// `session.orchestrator` / `session.context`: either a bare module id or a
/// full entry. Deserializes from YAML/JSON as either a string or a mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleRef {
    Id(String),
    Entry(ModuleEntry),
}

impl ModuleRef {
    pub fn module_id(&self) -> &str {
        match self {
            ModuleRef::Id(id) => id,
            ModuleRef::Entry(entry) => &entry.module,
        }
    }

    fn to_entry(&self) -> ModuleEntry {
        match self {
            ModuleRef::Id(id) => ModuleEntry::new(id.clone()),
            ModuleRef::Entry(entry) => entry.clone(),
        }
    }

    /// Deep-merge rules for a mapping `module_ref`; a bare overlay id
    /// replaces wholesale (it carries no source/config to merge).
    fn merged_with(&self, overlay: &ModuleRef) -> ModuleRef {
        match overlay {
            ModuleRef::Id(_) => overlay.clone(),
            ModuleRef::Entry(overlay_entry) => {
                ModuleRef::Entry(self.to_entry().merged_with(overlay_entry))
            }
        }
    }
}

/// `session: {orchestrator, context}`. Either half may be absent on an
/// intermediate (not-yet-composed) bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRefs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestrator: Option<ModuleRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ModuleRef>,
}

impl SessionRefs {
    fn merged_with(&self, overlay: &SessionRefs) -> SessionRefs {
        let orchestrator = match (&self.orchestrator, &overlay.orchestrator) {
            (Some(base), Some(over)) => Some(base.merged_with(over)),
            (None, Some(over)) => Some(over.clone()),
            (Some(base), None) => Some(base.clone()),
            (None, None) => None,
        };
        let context = match (&self.context, &overlay.context) {
            (Some(base), Some(over)) => Some(base.merged_with(over)),
            (None, Some(over)) => Some(over.clone()),
            (Some(base), None) => Some(base.clone()),
            (None, None) => None,
        };
        SessionRefs { orchestrator, context }
    }
}

// ---------------------------------------------------------------------------
// Context includes
// ---------------------------------------------------------------------------

/// One entry from `context.include`: the raw ref as written in the
/// manifest (`"local/path.md"` or `"ns:path.md"`), plus its resolved
/// absolute path once known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextInclude {
    pub r#ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<PathBuf>,
}

impl ContextInclude {
    fn is_namespaced(r#ref: &str) -> bool {
        // A `ns:path` ref has a namespace component with no path separator
        // before the first colon; `C:\...`-style paths don't occur in this
        // manifest grammar so a bare colon split is unambiguous here.
        matches!(r#ref.split_once(':'), Some((ns, _)) if !ns.is_empty() && !ns.contains('/'))
    }
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// A composed or pre-composition bundle: the full logical unit described by
/// one `bundle.md`/`bundle.yaml` manifest (or the result of composing
/// several).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub session: SessionRefs,
    #[serde(default)]
    pub providers: Vec<ModuleEntry>,
    #[serde(default)]
    pub tools: Vec<ModuleEntry>,
    #[serde(default)]
    pub hooks: Vec<ModuleEntry>,
    #[serde(default)]
    pub agents: HashMap<String, Value>,
    #[serde(default)]
    pub context: Vec<ContextInclude>,
    #[serde(default)]
    pub pending_context: Vec<ContextInclude>,
    #[serde(default)]
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,
    #[serde(default)]
    pub source_base_paths: HashMap<String, PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Bundle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Structural validation (§3 invariants): non-empty name, every module
    /// entry is a mapping carrying `module`, `session.orchestrator` /
    /// `session.context` present and resolvable to at least a module id.
    pub fn validate(&self) -> Result<(), BundleError> {
        if self.name.trim().is_empty() {
            return Err(BundleError::Validation {
                field: "name".to_string(),
                value: self.name.clone(),
            });
        }

        for (field, entries) in [
            ("providers", &self.providers),
            ("tools", &self.tools),
            ("hooks", &self.hooks),
        ] {
            for entry in entries {
                if entry.module.trim().is_empty() {
                    return Err(BundleError::Validation {
                        field: field.to_string(),
                        value: "module entry missing non-empty 'module' id".to_string(),
                    });
                }
            }
        }

        if let Some(orchestrator) = &self.session.orchestrator {
            if orchestrator.module_id().trim().is_empty() {
                return Err(BundleError::Validation {
                    field: "session.orchestrator".to_string(),
                    value: "empty module id".to_string(),
                });
            }
        }
        if let Some(context) = &self.session.context {
            if context.module_id().trim().is_empty() {
                return Err(BundleError::Validation {
                    field: "session.context".to_string(),
                    value: "empty module id".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Whether `session.orchestrator` and `session.context` are both set —
    /// required before a bundle can be turned into a mount plan.
    pub fn has_complete_session(&self) -> bool {
        self.session.orchestrator.is_some() && self.session.context.is_some()
    }

    /// Resolve `pending_context` refs (`ns:path`) against
    /// `source_base_paths`, moving newly-resolvable entries into `context`.
    /// A bundle may reference its own namespace (`ns == self.name`), which
    /// resolves against `base_path`. Returns the refs that remain
    /// unresolved (unknown namespace, or file missing on disk).
    pub fn resolve_pending_context(&mut self) -> Vec<String> {
        let mut still_pending = Vec::new();
        let pending = std::mem::take(&mut self.pending_context);

        for mut include in pending {
            let Some((namespace, rel_path)) = include.r#ref.split_once(':') else {
                still_pending.push(include);
                continue;
            };

            let root = if namespace == self.name {
                self.base_path.clone()
            } else {
                self.source_base_paths.get(namespace).cloned()
            };

            match root {
                Some(root) => {
                    let candidate = root.join(rel_path);
                    let with_md = root.join(format!("{rel_path}.md"));
                    let resolved = if candidate.exists() {
                        Some(candidate)
                    } else if with_md.exists() {
                        Some(with_md)
                    } else {
                        None
                    };
                    match resolved {
                        Some(path) => {
                            include.resolved = Some(path);
                            push_dedup_by_path(&mut self.context, include);
                        }
                        None => still_pending.push(include),
                    }
                }
                None => still_pending.push(include),
            }
        }

        let unresolved: Vec<String> = still_pending.iter().map(|c| c.r#ref.clone()).collect();
        self.pending_context = still_pending;
        unresolved
    }

    /// Build the mount plan this bundle describes. Fails if `session`
    /// isn't fully resolved (an orchestrator and a context manager must
    /// both be named).
    pub fn to_mount_plan(&self) -> Result<MountPlan, BundleError> {
        let orchestrator = self.session.orchestrator.as_ref().ok_or_else(|| BundleError::Validation {
            field: "session.orchestrator".to_string(),
            value: "not set".to_string(),
        })?;
        let context = self.session.context.as_ref().ok_or_else(|| BundleError::Validation {
            field: "session.context".to_string(),
            value: "not set".to_string(),
        })?;

        let context_paths: HashMap<String, PathBuf> = self
            .context
            .iter()
            .filter_map(|c| c.resolved.clone().map(|p| (c.r#ref.clone(), p)))
            .collect();

        Ok(MountPlan {
            session: MountPlanSession {
                orchestrator: orchestrator.to_entry(),
                context: context.to_entry(),
            },
            providers: self.providers.clone(),
            tools: self.tools.clone(),
            hooks: self.hooks.clone(),
            agents: self.agents.clone(),
            context_paths,
            instruction: self.instruction.clone(),
        })
    }
}

/// Append `include` to `list`, deduplicating by resolved path (per the
/// "duplicates are deduplicated by resolved path" invariant).
fn push_dedup_by_path(list: &mut Vec<ContextInclude>, include: ContextInclude) {
    if let Some(resolved) = &include.resolved {
        if list.iter().any(|c| c.resolved.as_ref() == Some(resolved)) {
            return;
        }
    }
    list.push(include);
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Merge `overlay` onto `base` per the deterministic rules in §4.3:
/// `session` deep-merges, `providers`/`tools`/`hooks` merge by `module` id,
/// `instruction` replaces unless the overlay's is empty, `context`/
/// `pending_context`/`source_base_paths` union, `name` takes the overlay's.
/// `includes` is not merged — it is consumed during loading.
pub fn compose_pair(base: &Bundle, overlay: &Bundle) -> Bundle {
    let name = if overlay.name.trim().is_empty() {
        base.name.clone()
    } else {
        overlay.name.clone()
    };

    let mut context = base.context.clone();
    for include in &overlay.context {
        push_dedup_by_path(&mut context, include.clone());
    }
    // Entries with no resolved path yet (local refs resolved at load time
    // should already carry one) dedupe by ref instead.
    let mut seen_refs = HashSet::new();
    context.retain(|c| c.resolved.is_some() || seen_refs.insert(c.r#ref.clone()));

    let mut pending_context = base.pending_context.clone();
    for include in &overlay.pending_context {
        if !pending_context.iter().any(|c| c.r#ref == include.r#ref) {
            pending_context.push(include.clone());
        }
    }

    let mut source_base_paths = base.source_base_paths.clone();
    for (k, v) in &overlay.source_base_paths {
        source_base_paths.insert(k.clone(), v.clone());
    }

    Bundle {
        name,
        version: overlay.version.clone().or_else(|| base.version.clone()),
        description: overlay.description.clone().or_else(|| base.description.clone()),
        includes: Vec::new(),
        session: base.session.merged_with(&overlay.session),
        providers: merge_entries_by_module(&base.providers, &overlay.providers),
        tools: merge_entries_by_module(&base.tools, &overlay.tools),
        hooks: merge_entries_by_module(&base.hooks, &overlay.hooks),
        agents: {
            let mut merged = base.agents.clone();
            for (k, v) in &overlay.agents {
                merged.insert(k.clone(), v.clone());
            }
            merged
        },
        context,
        pending_context,
        instruction: if overlay.instruction.trim().is_empty() {
            base.instruction.clone()
        } else {
            overlay.instruction.clone()
        },
        base_path: overlay.base_path.clone().or_else(|| base.base_path.clone()),
        source_base_paths,
        source_uri: overlay.source_uri.clone().or_else(|| base.source_uri.clone()),
    }
}

fn merge_entries_by_module(base: &[ModuleEntry], overlay: &[ModuleEntry]) -> Vec<ModuleEntry> {
    let mut merged = base.to_vec();
    for overlay_entry in overlay {
        if let Some(existing) = merged.iter_mut().find(|e| e.module == overlay_entry.module) {
            *existing = existing.merged_with(overlay_entry);
        } else {
            merged.push(overlay_entry.clone());
        }
    }
    merged
}

/// Compose a base bundle with zero or more overlays, applied left to
/// right. `compose(a)` returns `a` unchanged; `compose(a, b, c)` equals
/// `compose(compose(a, b), c)`.
pub fn compose(base: &Bundle, overlays: &[Bundle]) -> Bundle {
    let mut result = base.clone();
    for overlay in overlays {
        result = compose_pair(&result, overlay);
    }
    result
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Raw manifest shape as deserialized from YAML, before context includes
/// are split into resolved/pending and before `includes` are expanded.
#[derive(Debug, Default, Deserialize)]
struct RawManifest {
    #[serde(default)]
    bundle: RawBundleHeader,
    #[serde(default)]
    includes: Vec<String>,
    #[serde(default)]
    session: SessionRefs,
    #[serde(default)]
    providers: Vec<ModuleEntry>,
    #[serde(default)]
    tools: Vec<ModuleEntry>,
    #[serde(default)]
    hooks: Vec<ModuleEntry>,
    #[serde(default)]
    agents: HashMap<String, Value>,
    #[serde(default)]
    context: RawContextSection,
}

#[derive(Debug, Default, Deserialize)]
struct RawBundleHeader {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawContextSection {
    #[serde(default)]
    include: Vec<String>,
}

/// Reads a single bundle manifest: `bundle.md` (YAML frontmatter + markdown
/// body) or `bundle.yaml`/`bundle.yml` (pure YAML, no instruction body).
pub struct BundleLoader;

impl BundleLoader {
    /// Load a manifest from a directory, preferring `bundle.md` then
    /// `bundle.yaml`/`bundle.yml`.
    pub fn load_dir(dir: &Path) -> Result<Bundle, BundleError> {
        let md_path = dir.join("bundle.md");
        if md_path.exists() {
            let contents = std::fs::read_to_string(&md_path).map_err(|e| BundleError::Load {
                uri: md_path.display().to_string(),
                message: e.to_string(),
            })?;
            return Self::load_markdown(&contents, Some(dir));
        }
        for name in ["bundle.yaml", "bundle.yml"] {
            let path = dir.join(name);
            if path.exists() {
                let contents = std::fs::read_to_string(&path).map_err(|e| BundleError::Load {
                    uri: path.display().to_string(),
                    message: e.to_string(),
                })?;
                return Self::load_yaml(&contents, Some(dir));
            }
        }
        Err(BundleError::NotFound {
            uri: dir.display().to_string(),
        })
    }

    /// Load a `bundle.md` document: YAML frontmatter plus a markdown body
    /// that becomes `instruction`.
    pub fn load_markdown(document: &str, base_path: Option<&Path>) -> Result<Bundle, BundleError> {
        let (frontmatter, body) = util::split_frontmatter(document);
        let mut bundle = Self::parse_manifest(&frontmatter, base_path)?;
        bundle.instruction = body.trim().to_string();
        Ok(bundle)
    }

    /// Load a pure `bundle.yaml` document (no separate instruction body —
    /// callers that want one can set `bundle.instruction` in the YAML, which
    /// is not part of the grammar today but kept easy to add).
    pub fn load_yaml(document: &str, base_path: Option<&Path>) -> Result<Bundle, BundleError> {
        Self::parse_manifest(document, base_path)
    }

    fn parse_manifest(yaml: &str, base_path: Option<&Path>) -> Result<Bundle, BundleError> {
        let raw: RawManifest = serde_yaml::from_str(yaml).map_err(|e| BundleError::Load {
            uri: base_path.map(|p| p.display().to_string()).unwrap_or_default(),
            message: e.to_string(),
        })?;

        if raw.bundle.name.trim().is_empty() {
            return Err(BundleError::Validation {
                field: "bundle.name".to_string(),
                value: String::new(),
            });
        }

        let mut context = Vec::new();
        let mut pending_context = Vec::new();
        let mut seen_refs = HashSet::new();

        for r#ref in raw.context.include {
            if !seen_refs.insert(r#ref.clone()) {
                continue;
            }
            if ContextInclude::is_namespaced(&r#ref) {
                pending_context.push(ContextInclude { r#ref, resolved: None });
            } else {
                let resolved = base_path.map(|base| base.join(&r#ref));
                if let Some(path) = &resolved {
                    if !path.exists() {
                        // Opportunistic: missing local includes are dropped
                        // rather than failing the whole load, matching the
                        // @mention loader's "missing files silently skipped"
                        // policy for the same context-loading concern.
                        continue;
                    }
                }
                context.push(ContextInclude {
                    r#ref,
                    resolved,
                });
            }
        }

        let bundle = Bundle {
            name: raw.bundle.name,
            version: raw.bundle.version,
            description: raw.bundle.description,
            includes: raw.includes,
            session: raw.session,
            providers: raw.providers,
            tools: raw.tools,
            hooks: raw.hooks,
            agents: raw.agents,
            context,
            pending_context,
            instruction: String::new(),
            base_path: base_path.map(Path::to_path_buf),
            source_base_paths: HashMap::new(),
            source_uri: None,
        };
        bundle.validate()?;
        Ok(bundle)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// App-facing façade mapping bundle *names* to source URIs, with in-memory
/// (and optionally on-disk) caching of loaded-and-composed bundles.
pub struct BundleRegistry {
    names: Mutex<HashMap<String, String>>,
    cache: Mutex<HashMap<String, Bundle>>,
    disk_cache_dir: Option<PathBuf>,
    package_search_roots: Vec<PathBuf>,
}

impl BundleRegistry {
    pub fn new(disk_cache_dir: Option<PathBuf>) -> Self {
        Self {
            names: Mutex::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
            disk_cache_dir,
            package_search_roots: Vec::new(),
        }
    }

    pub fn with_search_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.package_search_roots = roots;
        self
    }

    /// Register `name → uri` mappings for later `load(name)` calls.
    pub fn register(&self, mappings: HashMap<String, String>) {
        self.names.lock().unwrap().extend(mappings);
    }

    /// Load (and fully compose, including recursively resolving
    /// `includes`) the bundle named or addressed by `name_or_uri`.
    /// Results are cached in memory for the registry's lifetime; when a
    /// disk cache directory is configured, a JSON serialization is also
    /// written and consulted there.
    pub fn load(&self, name_or_uri: &str) -> Result<Bundle, BundleError> {
        let uri = self
            .names
            .lock()
            .unwrap()
            .get(name_or_uri)
            .cloned()
            .unwrap_or_else(|| name_or_uri.to_string());

        if let Some(cached) = self.cache.lock().unwrap().get(&uri) {
            return Ok(cached.clone());
        }

        if let Some(cached) = self.load_from_disk_cache(&uri) {
            self.cache.lock().unwrap().insert(uri.clone(), cached.clone());
            return Ok(cached);
        }

        let mut visiting = HashSet::new();
        let bundle = self.load_and_compose(&uri, &mut visiting)?;

        self.cache.lock().unwrap().insert(uri.clone(), bundle.clone());
        self.save_to_disk_cache(&uri, &bundle);
        Ok(bundle)
    }

    fn load_and_compose(&self, uri: &str, visiting: &mut HashSet<String>) -> Result<Bundle, BundleError> {
        if !visiting.insert(uri.to_string()) {
            return Err(BundleError::Dependency {
                dependency: format!("circular include: {uri}"),
            });
        }

        let resolved = sources::resolve_source(uri, None, &self.package_search_roots).map_err(|e| {
            BundleError::NotFound {
                uri: format!("{uri}: {e}"),
            }
        })?;

        let mut bundle = BundleLoader::load_dir(&resolved.active_path)?;
        bundle.source_uri = Some(uri.to_string());
        bundle
            .source_base_paths
            .insert(bundle.name.clone(), resolved.active_path.clone());

        let mut overlays = Vec::new();
        for include_uri in bundle.includes.clone() {
            let included = self.load_and_compose(&include_uri, visiting)?;
            overlays.push(included);
        }
        // The manifest's own fields (already in `bundle`) take precedence
        // over anything it includes, so includes form the base chain and
        // `bundle` itself is composed last, as the final overlay.
        let merged = if overlays.is_empty() {
            bundle.clone()
        } else {
            let mut iter = overlays.into_iter();
            let first = iter.next().unwrap();
            let base = compose(&first, &iter.collect::<Vec<_>>());
            compose(&base, std::slice::from_ref(&bundle))
        };

        visiting.remove(uri);
        Ok(merged)
    }

    fn disk_cache_path(&self, uri: &str) -> Option<PathBuf> {
        let dir = self.disk_cache_dir.as_ref()?;
        let digest = <sha2::Sha256 as sha2::Digest>::digest(uri.as_bytes());
        let key: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        Some(dir.join(format!("{key}.json")))
    }

    fn load_from_disk_cache(&self, uri: &str) -> Option<Bundle> {
        let path = self.disk_cache_path(uri)?;
        let contents = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    fn save_to_disk_cache(&self, uri: &str, bundle: &Bundle) {
        let Some(path) = self.disk_cache_path(uri) else {
            return;
        };
        if let Ok(serialized) = serde_json::to_string_pretty(bundle) {
            let _ = util::atomic_write_with_backup(&path, serialized.as_bytes());
        }
    }
}

// ---------------------------------------------------------------------------
// Mount plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountPlanSession {
    pub orchestrator: ModuleEntry,
    pub context: ModuleEntry,
}

/// The flat, resolved dictionary a [`Session`] is constructed from. Every
/// `entry.source` is expected to be a resolvable URI or local path by the
/// time this plan is handed to a session; an id with no source and no
/// registered default is a mount-time failure, not a preparation-time one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountPlan {
    pub session: MountPlanSession,
    #[serde(default)]
    pub providers: Vec<ModuleEntry>,
    #[serde(default)]
    pub tools: Vec<ModuleEntry>,
    #[serde(default)]
    pub hooks: Vec<ModuleEntry>,
    #[serde(default)]
    pub agents: HashMap<String, Value>,
    #[serde(default)]
    pub context_paths: HashMap<String, PathBuf>,
    #[serde(default)]
    pub instruction: String,
}

impl MountPlan {
    /// Render as the JSON value the rest of the crate (session config,
    /// sub-session provider-preference application) consumes.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Prepared bundle
// ---------------------------------------------------------------------------

/// A composed, resolved bundle along with its derived mount plan and a
/// mention resolver that knows every namespace the composition touched.
/// Returned by preparing a loaded [`Bundle`] for mounting.
pub struct PreparedBundle {
    bundle: Bundle,
    mount_plan: MountPlan,
    mention_resolver: BaseMentionResolver,
}

impl PreparedBundle {
    /// Finish resolving `bundle` (pending context, mount plan) and build a
    /// mention resolver carrying every composed namespace.
    pub fn prepare(mut bundle: Bundle) -> Result<Self, BundleError> {
        bundle.resolve_pending_context();
        let mount_plan = bundle.to_mount_plan()?;

        let base_path = bundle
            .base_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let mut mention_resolver = BaseMentionResolver::new(base_path);
        for (namespace, path) in &bundle.source_base_paths {
            mention_resolver.register_namespace(namespace.clone(), path.clone());
        }

        Ok(Self {
            bundle,
            mount_plan,
            mention_resolver,
        })
    }

    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    pub fn mount_plan(&self) -> &MountPlan {
        &self.mount_plan
    }

    pub fn mention_resolver(&self) -> &BaseMentionResolver {
        &self.mention_resolver
    }

    /// Build a `Session` from this bundle's mount plan. Module mounting
    /// (resolving providers/tools/hooks/orchestrator/context to live
    /// instances) happens externally — the same split the activator and
    /// session already assume (§9 design notes: module loading is a
    /// collaborator, not the session's own job).
    pub fn create_session(
        &self,
        session_id: Option<String>,
        parent_id: Option<String>,
    ) -> Result<Session, BundleError> {
        let config = SessionConfig::from_value(self.mount_plan.to_value()).map_err(|e| BundleError::Validation {
            field: "mount_plan".to_string(),
            value: e.to_string(),
        })?;
        Ok(Session::new(config, session_id, parent_id))
    }
}
