//! HookRegistry -- priority-ordered event dispatch pipeline.
//!
//! The hook system provides lifecycle event dispatch with deterministic
//! execution order and action precedence.
//!
//! # Dispatch Semantics
//!
//! Handlers execute **sequentially** by priority (lower number = higher
//! priority). Each handler returns a [`HookResult`] whose `action` field
//! determines how the pipeline continues:
//!
//! | Action          | Behaviour                                              |
//! |-----------------|--------------------------------------------------------|
//! | `Continue`      | Proceed to next handler                                |
//! | `Deny`          | **Short-circuit** -- stop immediately, return deny      |
//! | `Modify`        | Chain `modified_data` to the next handler               |
//! | `InjectContext`  | Collect; merge all at end                              |
//! | `AskUser`       | First one wins; collected for return                    |
//!
//! **Action precedence:** Deny > AskUser > InjectContext > Modify > Continue
//!
//! # Connections
//!
//! - [`HookHandler`](crate::traits::HookHandler) trait defines the handler contract.
//! - [`HookResult`] and [`HookAction`] from [`crate::models`] define results.
//! - Event names come from [`crate::events`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;

use crate::models::{HookAction, HookResult};
use crate::traits::HookHandler;

// ---------------------------------------------------------------------------
// HandlerEntry -- internal storage for a registered handler
// ---------------------------------------------------------------------------

/// A registered handler with its priority and name.
struct HandlerEntry {
    handler: Arc<dyn HookHandler>,
    priority: i32,
    name: String,
    /// Unique ID for unregistration.
    id: u64,
}

// ---------------------------------------------------------------------------
// HookRegistry
// ---------------------------------------------------------------------------

/// Manages lifecycle hooks with deterministic execution.
///
/// Hooks execute sequentially by priority with short-circuit on deny.
///
/// # Example
///
/// ```rust
/// use amplifier_core::hooks::HookRegistry;
///
/// let registry = HookRegistry::new();
/// // register handlers, emit events ...
/// ```
pub struct HookRegistry {
    /// Handlers keyed by event name, sorted by priority within each event.
    /// Wrapped in `Arc` so unregister closures can safely hold a reference.
    handlers: Arc<Mutex<HashMap<String, Vec<HandlerEntry>>>>,
    /// Default fields merged into every `emit()` call.
    defaults: Mutex<Option<Value>>,
    /// Monotonically increasing ID for handler entries.
    next_id: Mutex<u64>,
}

impl HookRegistry {
    /// Create an empty hook registry.
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(HashMap::new())),
            defaults: Mutex::new(None),
            next_id: Mutex::new(0),
        }
    }

    /// Register a hook handler for an event.
    ///
    /// # Arguments
    ///
    /// * `event` -- Event name to hook into (e.g., `"tool:pre"`).
    /// * `handler` -- `Arc<dyn HookHandler>` that handles the event.
    /// * `priority` -- Execution priority (lower = earlier).
    /// * `name` -- Optional handler name for debugging.
    ///
    /// # Returns
    ///
    /// An unregister closure. Call it to remove this handler.
    pub fn register(
        &self,
        event: &str,
        handler: Arc<dyn HookHandler>,
        priority: i32,
        name: Option<String>,
    ) -> Box<dyn Fn() + Send + Sync> {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        };

        let entry_name = name.unwrap_or_else(|| format!("handler-{id}"));

        let entry = HandlerEntry {
            handler,
            priority,
            name: entry_name,
            id,
        };

        {
            let mut handlers = self.handlers.lock().unwrap();
            let event_handlers = handlers.entry(event.to_string()).or_default();
            event_handlers.push(entry);
            // Keep sorted by priority (lower = higher priority)
            event_handlers.sort_by_key(|e| e.priority);
        }

        // The unregister closure holds an Arc clone of the handlers map,
        // so it can remove the entry even after the registry borrow ends.
        // This matches Python's pattern where the closure captures self._handlers.
        let event_key = event.to_string();
        let handlers_ref = self.handlers.clone();

        Box::new(move || {
            let mut handlers = handlers_ref.lock().unwrap();
            if let Some(event_handlers) = handlers.get_mut(&event_key) {
                event_handlers.retain(|e| e.id != id);
            }
        })
    }

    /// Set default fields merged into every `emit()` call.
    ///
    /// Defaults are merged with event data, with explicit event data taking
    /// precedence (matching Python's `{**defaults, **data}` pattern).
    pub fn set_default_fields(&self, defaults: Value) {
        *self.defaults.lock().unwrap() = Some(defaults);
    }

    /// Emit an event to all registered handlers.
    ///
    /// Handlers execute sequentially by priority with:
    /// - Short-circuit on `Deny`
    /// - Data modification chaining on `Modify`
    /// - Collection and merging on `InjectContext`
    /// - First-wins on `AskUser`
    ///
    /// Action precedence: Deny > AskUser > InjectContext > Modify > Continue
    pub async fn emit(&self, event: &str, data: Value) -> HookResult {
        // Snapshot handlers for this event (avoids holding the lock during async calls).
        let entries: Vec<(Arc<dyn HookHandler>, String)> = {
            let handlers = self.handlers.lock().unwrap();
            match handlers.get(event) {
                Some(entries) => entries
                    .iter()
                    .map(|e| (e.handler.clone(), e.name.clone()))
                    .collect(),
                None => {
                    return HookResult {
                        action: HookAction::Continue,
                        data: Some(value_to_map(&data)),
                        ..Default::default()
                    };
                }
            }
        };

        if entries.is_empty() {
            return HookResult {
                action: HookAction::Continue,
                data: Some(value_to_map(&data)),
                ..Default::default()
            };
        }

        // Merge default fields with event data (event data takes precedence).
        let mut current_data = {
            let defaults = self.defaults.lock().unwrap();
            match defaults.as_ref() {
                Some(defaults_val) => merge_json(defaults_val, &data),
                None => data,
            }
        };

        // Stamp infrastructure-owned timestamp (UTC ISO-8601).
        // Together with session_id (from defaults), forms the compound identity
        // key (session_id, timestamp) for event uniqueness and ordering.
        // Infrastructure-owned: always present, callers cannot omit or override.
        if let Value::Object(ref mut map) = current_data {
            map.insert(
                "timestamp".to_string(),
                Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }

        // Track special actions
        let mut special_result: Option<HookResult> = None;
        let mut inject_context_results: Vec<HookResult> = Vec::new();

        for (handler, _name) in &entries {
            let result = match handler.handle(event, current_data.clone()).await {
                Ok(r) => r,
                Err(_e) => {
                    // Error in handler -- log and continue (matches Python behaviour).
                    continue;
                }
            };

            // Deny short-circuits immediately
            if result.action == HookAction::Deny {
                return result;
            }

            // Modify chains data to next handler
            if result.action == HookAction::Modify {
                if let Some(ref modified) = result.data {
                    current_data = serde_json::to_value(modified).unwrap_or(current_data);
                }
            }

            // Collect inject_context for merging at end
            if result.action == HookAction::InjectContext && result.context_injection.is_some() {
                inject_context_results.push(result.clone());
            }

            // Preserve ask_user (only first one -- can't merge approvals)
            if result.action == HookAction::AskUser && special_result.is_none() {
                special_result = Some(result);
            }
        }

        // Merge inject_context results if any
        if !inject_context_results.is_empty() {
            let merged_inject = merge_inject_context_results(&inject_context_results);
            if special_result.is_none() {
                // No ask_user captured -- inject_context wins
                special_result = Some(merged_inject);
            }
            // If ask_user already captured, it takes precedence (don't overwrite)
        }

        // Return special action if any hook requested it, otherwise continue
        if let Some(result) = special_result {
            return result;
        }

        // Return final result with potentially modified data
        HookResult {
            action: HookAction::Continue,
            data: Some(value_to_map(&current_data)),
            ..Default::default()
        }
    }

    /// Emit event and collect data from all handler responses.
    ///
    /// Unlike [`emit()`](Self::emit) which processes action semantics,
    /// this method simply collects `result.data` from all handlers for
    /// aggregation. Each handler is called with a timeout.
    ///
    /// Use for decision events where multiple hooks propose candidates
    /// (e.g., tool resolution, agent selection).
    pub async fn emit_and_collect(
        &self,
        event: &str,
        data: Value,
        timeout: Duration,
    ) -> Vec<HashMap<String, Value>> {
        // Snapshot handlers
        let entries: Vec<(Arc<dyn HookHandler>, String)> = {
            let handlers = self.handlers.lock().unwrap();
            match handlers.get(event) {
                Some(entries) => entries
                    .iter()
                    .map(|e| (e.handler.clone(), e.name.clone()))
                    .collect(),
                None => return Vec::new(),
            }
        };

        if entries.is_empty() {
            return Vec::new();
        }

        let mut responses = Vec::new();

        for (handler, _name) in &entries {
            let fut = handler.handle(event, data.clone());
            let result = match tokio::time::timeout(timeout, fut).await {
                Ok(Ok(r)) => r,
                Ok(Err(_e)) => {
                    // Handler error -- skip
                    continue;
                }
                Err(_) => {
                    // Timeout -- skip
                    continue;
                }
            };

            if let Some(d) = result.data {
                responses.push(d);
            }
        }

        responses
    }

    /// List registered handlers.
    ///
    /// If `event` is `Some`, only return handlers for that event.
    /// If `None`, return all handlers grouped by event.
    pub fn list_handlers(&self, event: Option<&str>) -> HashMap<String, Vec<String>> {
        let handlers = self.handlers.lock().unwrap();

        if let Some(evt) = event {
            let names = handlers
                .get(evt)
                .map(|entries| entries.iter().map(|e| e.name.clone()).collect())
                .unwrap_or_default();
            let mut result = HashMap::new();
            result.insert(evt.to_string(), names);
            result
        } else {
            handlers
                .iter()
                .map(|(evt, entries)| {
                    (
                        evt.clone(),
                        entries.iter().map(|e| e.name.clone()).collect(),
                    )
                })
                .collect()
        }
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Merge two JSON values: `base` is overridden by `overlay`.
/// Both should be objects; non-object values result in `overlay` winning.
fn merge_json(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (k, v) in overlay_map {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

/// Convert a JSON Value to HashMap<String, Value>.
fn value_to_map(value: &Value) -> HashMap<String, Value> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => HashMap::new(),
    }
}

/// Merge multiple inject_context HookResults into a single result.
///
/// Combines injections with `"\n\n"` separator, preserving settings from
/// the first result (role, ephemeral, suppress_output).
fn merge_inject_context_results(results: &[HookResult]) -> HookResult {
    if results.is_empty() {
        return HookResult::default();
    }

    if results.len() == 1 {
        return results[0].clone();
    }

    // Combine all injections
    let combined_content: String = results
        .iter()
        .filter_map(|r| r.context_injection.as_deref())
        .collect::<Vec<_>>()
        .join("\n\n");

    // Use settings from first result
    let first = &results[0];

    HookResult {
        action: HookAction::InjectContext,
        context_injection: Some(combined_content),
        context_injection_role: first.context_injection_role.clone(),
        ephemeral: first.ephemeral,
        suppress_output: first.suppress_output,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
