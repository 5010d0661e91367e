//! AmplifierSession — lifecycle management for agent sessions.
//!
//! The session is the top-level entry point: create → initialize → execute → cleanup.
//! It owns a [`Coordinator`] and manages session identity, status tracking,
//! and event emission.
//!
//! # Design
//!
//! The Python `AmplifierSession` handles both module loading (via `ModuleLoader`)
//! and runtime lifecycle. In Rust, module loading stays in Python (via the PyO3
//! bridge). The Rust session provides the runtime lifecycle after modules are
//! mounted externally.
//!
//! # Connections
//!
//! - Owns a [`Coordinator`](crate::coordinator::Coordinator) for module access.
//! - Emits lifecycle events via [`HookRegistry`](crate::hooks::HookRegistry).
//! - Tracks status via [`SessionState`](crate::models::SessionState).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::coordinator::Coordinator;
use crate::errors::{AmplifierError, SessionError};
use crate::events;
use crate::models::SessionState;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for creating an `AmplifierSession`.
///
/// Mirrors the Python config dict with validation for required fields.
#[derive(Debug)]
pub struct SessionConfig {
    /// Full session configuration (the "mount plan").
    pub config: HashMap<String, Value>,
}

impl SessionConfig {
    /// Create a `SessionConfig` from a JSON value, validating required fields.
    ///
    /// Requires `session.orchestrator` and `session.context` to be present.
    pub fn from_value(value: Value) -> Result<Self, SessionError> {
        let obj = match value.as_object() {
            Some(o) => o,
            None => {
                return Err(SessionError::ConfigMissing {
                    field: "config must be a JSON object".into(),
                });
            }
        };

        let session = obj
            .get("session")
            .and_then(|v| v.as_object());

        let has_orchestrator = session
            .and_then(|s| s.get("orchestrator"))
            .is_some();

        if !has_orchestrator {
            return Err(SessionError::ConfigMissing {
                field: "session.orchestrator".into(),
            });
        }

        let has_context = session
            .and_then(|s| s.get("context"))
            .is_some();

        if !has_context {
            return Err(SessionError::ConfigMissing {
                field: "session.context".into(),
            });
        }

        let config: HashMap<String, Value> = obj
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self { config })
    }

    /// Create a minimal config for testing.
    ///
    /// Sets `session.orchestrator` and `session.context` to the given values.
    pub fn minimal(orchestrator: &str, context: &str) -> Self {
        let mut config = HashMap::new();
        config.insert(
            "session".into(),
            serde_json::json!({
                "orchestrator": orchestrator,
                "context": context,
            }),
        );
        Self { config }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An Amplifier session managing the lifecycle of an agent execution.
///
/// # Lifecycle
///
/// 1. **Create** — `Session::new(config, session_id, parent_id)`
/// 2. **Mount modules** — caller mounts orchestrator, context, providers, tools
///    on `coordinator_mut()`
/// 3. **Mark initialized** — `set_initialized()` (or auto-init on execute)
/// 4. **Execute** — `execute(prompt)` runs the orchestrator loop
/// 5. **Cleanup** — `cleanup()` runs cleanup functions
///
/// # Example
///
/// ```rust
/// use amplifier_core::session::{Session, SessionConfig};
///
/// let config = SessionConfig::minimal("loop-basic", "context-simple");
/// let session = Session::new(config, None, None);
/// assert!(!session.session_id().is_empty());
/// ```
pub struct Session {
    session_id: String,
    parent_id: Option<String>,
    coordinator: Arc<Coordinator>,
    initialized: bool,
    status: SessionState,
    is_resumed: bool,
}

impl Session {
    /// Create a new session.
    ///
    /// # Arguments
    ///
    /// * `config` — Session configuration (mount plan).
    /// * `session_id` — Optional session ID. If `None`, a UUID v4 is generated.
    /// * `parent_id` — Optional parent session ID (for child/forked sessions).
    pub fn new(
        config: SessionConfig,
        session_id: Option<String>,
        parent_id: Option<String>,
    ) -> Self {
        let id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let coordinator = Arc::new(Coordinator::new(config.config));

        // Set default fields for all hook events
        coordinator.hooks().set_default_fields(serde_json::json!({
            "session_id": id,
            "parent_id": parent_id,
        }));

        Self {
            session_id: id,
            parent_id,
            coordinator,
            initialized: false,
            status: SessionState::Created,
            is_resumed: false,
        }
    }

    /// Create a session that is marked as resumed (emits session:resume instead of session:start).
    pub fn new_resumed(
        config: SessionConfig,
        session_id: String,
        parent_id: Option<String>,
    ) -> Self {
        let mut session = Self::new(config, Some(session_id), parent_id);
        session.is_resumed = true;
        session
    }

    /// The session ID.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The parent session ID (if this is a child session).
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// Current session status as a string (matching Python's status field).
    pub fn status(&self) -> &str {
        match &self.status {
            SessionState::Created => "created",
            SessionState::Initialized => "initialized",
            SessionState::Executing => "executing",
            SessionState::Idle => "idle",
            SessionState::ShuttingDown => "shutting_down",
            SessionState::Closed => "closed",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        }
    }

    /// Current session state enum.
    pub fn state(&self) -> &SessionState {
        &self.status
    }

    /// Whether the session has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Reference to the coordinator. All mount/unmount operations go through
    /// interior `Mutex`es, so a shared reference is sufficient for mounting
    /// modules as well as reading them.
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Shared handle to the coordinator, suitable for passing to an
    /// [`Orchestrator`](crate::traits::Orchestrator) or a spawned sub-session.
    pub fn coordinator_arc(&self) -> Arc<Coordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Kept for call sites migrating from the old `&mut Coordinator` API;
    /// behaves exactly like [`coordinator`](Self::coordinator).
    pub fn coordinator_mut(&mut self) -> &Coordinator {
        &self.coordinator
    }

    /// Mark the session as initialized.
    ///
    /// In the Rust kernel, module loading is done externally (by the Python
    /// bridge or test harness). This method marks the session ready for
    /// execution after modules have been mounted.
    pub fn set_initialized(&mut self) {
        self.initialized = true;
        if self.status == SessionState::Created {
            self.status = SessionState::Initialized;
        }
    }

    /// Clear the initialized flag (used during cleanup).
    ///
    /// After cleanup, the session is no longer ready for execution.
    pub fn clear_initialized(&mut self) {
        self.initialized = false;
    }

    /// Execute a prompt using the mounted orchestrator.
    ///
    /// Auto-emits `session:start` (or `session:resume`) event, then delegates
    /// to the orchestrator. Tracks status transitions on success, failure,
    /// or cancellation.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotInitialized` if not initialized
    /// - `SessionError::Other("No orchestrator mounted")` if no orchestrator
    /// - `SessionError::Other("No context manager mounted")` if no context
    /// - `SessionError::Other("No providers mounted")` if providers map is empty
    /// - Any `AmplifierError` from the orchestrator
    pub async fn execute(&mut self, prompt: &str) -> Result<String, AmplifierError> {
        if !self.initialized {
            return Err(AmplifierError::Session(SessionError::NotInitialized));
        }

        // A prior turn's terminal outcome settles into `idle` before the
        // session re-enters `executing`, so repeated `execute()` calls on
        // the same session walk the `executing ↔ idle` edge rather than
        // jumping straight from one terminal outcome to the next.
        if matches!(
            self.status,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        ) {
            self.status = SessionState::Idle;
        }

        // Emit lifecycle event
        let event = if self.is_resumed {
            events::SESSION_RESUME
        } else {
            events::SESSION_START
        };

        self.coordinator
            .hooks()
            .emit(
                event,
                serde_json::json!({
                    "session_id": self.session_id,
                    "parent_id": self.parent_id,
                }),
            )
            .await;

        // Get orchestrator
        let orchestrator = self.coordinator.orchestrator().ok_or_else(|| {
            AmplifierError::Session(SessionError::Other {
                message: "No orchestrator mounted".into(),
            })
        })?;

        // Get context
        let context = self.coordinator.context().ok_or_else(|| {
            AmplifierError::Session(SessionError::Other {
                message: "No context manager mounted".into(),
            })
        })?;

        // Get providers
        let providers = self.coordinator.providers();
        if providers.is_empty() {
            return Err(AmplifierError::Session(SessionError::Other {
                message: "No providers mounted".into(),
            }));
        }

        // Get tools
        let tools = self.coordinator.tools();

        // Execute orchestrator
        self.status = SessionState::Executing;

        match orchestrator
            .execute(
                prompt.to_string(),
                context,
                providers,
                tools,
                self.coordinator.clone(),
            )
            .await
        {
            Ok(result) => {
                // Check cancellation
                if self.coordinator.cancellation().is_cancelled() {
                    self.status = SessionState::Cancelled;
                } else {
                    self.status = SessionState::Completed;
                }
                Ok(result)
            }
            Err(e) => {
                if self.coordinator.cancellation().is_cancelled() {
                    self.status = SessionState::Cancelled;
                } else {
                    self.status = SessionState::Failed;
                }
                Err(e)
            }
        }
    }

    /// Clean up session resources.
    ///
    /// Emits `session:end` event (carrying the session's last status before
    /// shutdown began) and runs all cleanup functions registered on the
    /// coordinator, then settles the session into `closed` and clears
    /// `initialized` so any further `execute()` call is rejected.
    pub async fn cleanup(&mut self) {
        let last_status = self.status().to_string();
        self.status = SessionState::ShuttingDown;

        // Emit session:end event
        self.coordinator
            .hooks()
            .emit(
                events::SESSION_END,
                serde_json::json!({
                    "session_id": self.session_id,
                    "status": last_status,
                }),
            )
            .await;

        // Run coordinator cleanup
        self.coordinator.cleanup().await;

        self.clear_initialized();
        self.status = SessionState::Closed;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
