//! ModuleCoordinator — central coordination hub for the Amplifier kernel.
//!
//! The coordinator holds mount points for all module types, a capability
//! registry for inter-module communication, contribution channels for
//! data aggregation, cleanup functions, and the hook/cancellation subsystems.
//!
//! # Design
//!
//! The Python `ModuleCoordinator` uses dynamic typing extensively. In Rust
//! we use typed fields for the four primary module slots (orchestrator,
//! context, providers, tools) and typed accessor methods. Capabilities
//! are stored as `serde_json::Value` for maximum flexibility.
//!
//! # Connections
//!
//! - Holds a [`HookRegistry`](crate::hooks::HookRegistry) for event dispatch.
//! - Holds a [`CancellationToken`](crate::cancellation::CancellationToken)
//!   for cooperative cancellation.
//! - Stores modules as `Arc<dyn Trait>` from [`crate::traits`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::cancellation::CancellationToken;
use crate::hooks::HookRegistry;
use crate::traits::{ApprovalProvider, ContextManager, Orchestrator, Provider, Tool};

// ---------------------------------------------------------------------------
// Type aliases for cleanup and contributor callbacks
// ---------------------------------------------------------------------------

/// An async cleanup function: `() -> Future<Output = ()>`.
pub type CleanupFn = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// An async contributor callback: `() -> Future<Output = Result<Value, ...>>`.
pub type ContributorCallback = Box<
    dyn Fn() -> Pin<Box<dyn Future<Output = Result<Value, Box<dyn std::error::Error + Send + Sync>>> + Send>>
        + Send
        + Sync,
>;

/// A registered contributor with name and callback.
struct ContributorEntry {
    name: String,
    callback: ContributorCallback,
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Central coordination hub for module mount points, capabilities, and services.
///
/// Holds the four primary module slots (orchestrator, context manager,
/// providers, tools), plus the hook registry and cancellation token.
///
/// # Example
///
/// ```rust
/// use amplifier_core::coordinator::Coordinator;
///
/// let coord = Coordinator::new(Default::default());
/// assert!(coord.tools().is_empty());
/// ```
pub struct Coordinator {
    // -- Module mount points (typed) --
    orchestrator: Mutex<Option<Arc<dyn Orchestrator>>>,
    context: Mutex<Option<Arc<dyn ContextManager>>>,
    providers: Mutex<HashMap<String, Arc<dyn Provider>>>,
    tools: Mutex<HashMap<String, Arc<dyn Tool>>>,
    approval_provider: Mutex<Option<Arc<dyn ApprovalProvider>>>,

    // -- Subsystems --
    hooks: Arc<HookRegistry>,
    cancellation: CancellationToken,

    // -- Capabilities & contributions --
    capabilities: Mutex<HashMap<String, Value>>,
    channels: Mutex<HashMap<String, Vec<ContributorEntry>>>,

    // -- Cleanup --
    cleanup_functions: Mutex<Vec<CleanupFn>>,

    // -- Config --
    config: HashMap<String, Value>,

    // -- Turn tracking --
    current_turn_injections: Mutex<usize>,
}

impl Coordinator {
    /// Create a new coordinator with the given session config.
    pub fn new(config: HashMap<String, Value>) -> Self {
        Self {
            orchestrator: Mutex::new(None),
            context: Mutex::new(None),
            providers: Mutex::new(HashMap::new()),
            tools: Mutex::new(HashMap::new()),
            approval_provider: Mutex::new(None),
            hooks: Arc::new(HookRegistry::new()),
            cancellation: CancellationToken::new(),
            capabilities: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            cleanup_functions: Mutex::new(Vec::new()),
            config,
            current_turn_injections: Mutex::new(0),
        }
    }

    /// Create a coordinator with empty config (convenience for tests).
    pub fn new_for_test() -> Self {
        Self::new(HashMap::new())
    }

    // -- Module mount/get: Orchestrator --

    /// Set the orchestrator module (single slot).
    pub fn set_orchestrator(&self, orchestrator: Arc<dyn Orchestrator>) {
        *self.orchestrator.lock().unwrap() = Some(orchestrator);
    }

    /// Get the orchestrator module, if mounted.
    pub fn orchestrator(&self) -> Option<Arc<dyn Orchestrator>> {
        self.orchestrator.lock().unwrap().clone()
    }

    // -- Module mount/get: ContextManager --

    /// Set the context manager module (single slot).
    pub fn set_context(&self, context: Arc<dyn ContextManager>) {
        *self.context.lock().unwrap() = Some(context);
    }

    /// Get the context manager module, if mounted.
    pub fn context(&self) -> Option<Arc<dyn ContextManager>> {
        self.context.lock().unwrap().clone()
    }

    // -- Module mount/get: Providers --

    /// Mount a provider by name.
    pub fn mount_provider(&self, name: &str, provider: Arc<dyn Provider>) {
        self.providers
            .lock()
            .unwrap()
            .insert(name.to_string(), provider);
    }

    /// Get a single provider by name.
    pub fn get_provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.lock().unwrap().get(name).cloned()
    }

    /// Get all mounted providers as a snapshot.
    pub fn providers(&self) -> HashMap<String, Arc<dyn Provider>> {
        self.providers.lock().unwrap().clone()
    }

    /// Unmount a provider by name. Returns `true` if it was present.
    pub fn unmount_provider(&self, name: &str) -> bool {
        self.providers.lock().unwrap().remove(name).is_some()
    }

    // -- Module mount/get: Tools --

    /// Mount a tool by name.
    pub fn mount_tool(&self, name: &str, tool: Arc<dyn Tool>) {
        self.tools
            .lock()
            .unwrap()
            .insert(name.to_string(), tool);
    }

    /// Get a single tool by name.
    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.lock().unwrap().get(name).cloned()
    }

    /// Get all mounted tools as a snapshot.
    pub fn tools(&self) -> HashMap<String, Arc<dyn Tool>> {
        self.tools.lock().unwrap().clone()
    }

    /// Unmount a tool by name. Returns `true` if it was present.
    pub fn unmount_tool(&self, name: &str) -> bool {
        self.tools.lock().unwrap().remove(name).is_some()
    }

    // -- Module mount/get: ApprovalProvider --

    /// Set the approval provider used to resolve `ask_user` hook results
    /// (single slot, mirroring `orchestrator`/`context`).
    pub fn set_approval_provider(&self, provider: Arc<dyn ApprovalProvider>) {
        *self.approval_provider.lock().unwrap() = Some(provider);
    }

    /// Get the approval provider, if mounted. A bundle with no `hooks`
    /// entry providing one will see `None`; orchestrators fall back to
    /// `HookResult::approval_default` in that case.
    pub fn approval_provider(&self) -> Option<Arc<dyn ApprovalProvider>> {
        self.approval_provider.lock().unwrap().clone()
    }

    // -- Subsystem accessors --

    /// Reference to the hook registry.
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// Shared handle to the hook registry.
    ///
    /// Used to hand providers and other modules constructed independently
    /// of the coordinator (e.g. the reference provider adapter) a cloneable
    /// reference they can emit `provider:retry` / `provider:tool_sequence_repaired`
    /// onto without threading the whole coordinator through their constructor.
    pub fn hooks_arc(&self) -> Arc<HookRegistry> {
        self.hooks.clone()
    }

    /// Reference to the cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    // -- Config --

    /// Session configuration.
    pub fn config(&self) -> &HashMap<String, Value> {
        &self.config
    }

    // -- Capabilities --

    /// Register a capability (inter-module communication).
    pub fn register_capability(&self, name: &str, value: Value) {
        self.capabilities
            .lock()
            .unwrap()
            .insert(name.to_string(), value);
    }

    /// Get a registered capability.
    pub fn get_capability(&self, name: &str) -> Option<Value> {
        self.capabilities.lock().unwrap().get(name).cloned()
    }

    // -- Contribution channels --

    /// Register a contributor to a named channel.
    ///
    /// # Arguments
    ///
    /// * `channel` — Channel name (e.g., `"observability.events"`).
    /// * `name` — Module name for debugging.
    /// * `callback` — Async callback that returns a `Value` contribution.
    pub fn register_contributor(
        &self,
        channel: &str,
        name: &str,
        callback: ContributorCallback,
    ) {
        let entry = ContributorEntry {
            name: name.to_string(),
            callback,
        };
        self.channels
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push(entry);
    }

    /// Collect contributions from a channel.
    ///
    /// Calls each registered contributor and returns non-error results.
    /// Errors in individual contributors are logged and skipped.
    pub async fn collect_contributions(&self, channel: &str) -> Vec<Value> {
        // Snapshot callbacks to avoid holding lock during async calls
        let entries: Vec<(String, _)> = {
            let channels = self.channels.lock().unwrap();
            match channels.get(channel) {
                Some(entries) => entries
                    .iter()
                    .map(|e| {
                        let fut = (e.callback)();
                        (e.name.clone(), fut)
                    })
                    .collect(),
                None => return Vec::new(),
            }
        };

        let mut results = Vec::new();
        for (_name, fut) in entries {
            match fut.await {
                Ok(value) => results.push(value),
                Err(_e) => {
                    // Log and skip, matching Python behaviour
                    continue;
                }
            }
        }
        results
    }

    // -- Cleanup --

    /// Register a cleanup function to be called on shutdown.
    pub fn register_cleanup(&self, cleanup_fn: CleanupFn) {
        self.cleanup_functions.lock().unwrap().push(cleanup_fn);
    }

    /// Run all cleanup functions in reverse registration order.
    ///
    /// Errors in one cleanup function do not prevent subsequent functions
    /// from running (matching Python behaviour).
    pub async fn cleanup(&self) {
        // Take functions out to avoid holding lock during async calls
        let functions: Vec<_> = {
            let mut fns = self.cleanup_functions.lock().unwrap();
            let taken: Vec<_> = fns.drain(..).collect();
            taken
        };

        // Execute in reverse order
        for cleanup_fn in functions.iter().rev() {
            let fut = cleanup_fn();
            if let Err(e) = tokio::task::spawn(fut).await {
                eprintln!("Error during cleanup: {e}");
            }
        }
    }

    // -- Turn management --

    /// Reset per-turn tracking. Call at turn boundaries.
    pub fn reset_turn(&self) {
        *self.current_turn_injections.lock().unwrap() = 0;
        // Note: cancellation is NOT reset here (persists across turns)
    }

    /// Current injection count for this turn.
    pub fn current_turn_injections(&self) -> usize {
        *self.current_turn_injections.lock().unwrap()
    }

    /// Increment the injection counter.
    pub fn increment_injections(&self, count: usize) {
        *self.current_turn_injections.lock().unwrap() += count;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
