//! Reference tool-calling loop orchestrator.
//!
//! [`BasicOrchestrator`] drives the `prompt:submit` → provider/tool loop →
//! `prompt:complete` sequence: it appends the prompt to context, selects a
//! provider, and alternates between asking the provider for a completion and
//! executing any tool calls it requests until the provider returns a final
//! text response or the turn budget is exhausted.
//!
//! Every hook-gated decision (deny / ask_user / modify / inject_context) is
//! resolved through the [`crate::coordinator::Coordinator`] passed into
//! `execute`, so a single orchestrator instance carries no per-session state
//! of its own — it is safe to share one `Arc<BasicOrchestrator>` across
//! concurrent sessions.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};

use crate::coordinator::Coordinator;
use crate::errors::{AmplifierError, ContextError, ModuleNotFoundError, SessionError};
use crate::events;
use crate::messages::{
    ChatRequest, ContentBlock, Message, MessageContent, Role, ToolCall, ToolSpec,
};
use crate::models::{ApprovalDefault, ApprovalRequest, ContextInjectionRole, HookAction, HookResult, ToolResult};
use crate::traits::{ContextManager, Orchestrator, Provider, Tool};

/// Turn cap protecting against a provider that never stops requesting tools.
const DEFAULT_MAX_TOOL_TURNS: usize = 25;

/// Tool-calling loop orchestrator.
///
/// Holds no session state; `max_tool_turns` only bounds a single `execute`
/// call's provider/tool round trips.
pub struct BasicOrchestrator {
    max_tool_turns: usize,
}

impl BasicOrchestrator {
    /// Create an orchestrator with the default turn budget.
    pub fn new() -> Self {
        Self {
            max_tool_turns: DEFAULT_MAX_TOOL_TURNS,
        }
    }

    /// Create an orchestrator with an explicit turn budget.
    pub fn with_max_tool_turns(max_tool_turns: usize) -> Self {
        Self { max_tool_turns }
    }
}

impl Default for BasicOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the provider to drive this turn.
///
/// Prefers a provider mounted under the name `"default"`. Otherwise picks
/// the lexicographically smallest provider name, since `HashMap` iteration
/// order is not stable and callers need a reproducible choice across runs.
fn select_provider(providers: &HashMap<String, Arc<dyn Provider>>) -> Option<Arc<dyn Provider>> {
    if let Some(provider) = providers.get("default") {
        return Some(provider.clone());
    }
    providers
        .keys()
        .min()
        .and_then(|name| providers.get(name))
        .cloned()
}

/// Join every `ContentBlock::Text` in a response into the final answer text.
fn extract_text(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a [`ToolResult`] as the plain text stored in a `tool` message.
fn tool_output_text(result: &ToolResult) -> String {
    if result.success {
        match &result.output {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
    } else {
        result
            .error
            .as_ref()
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "tool execution failed".to_string())
    }
}

/// Build a failed [`ToolResult`] carrying `reason` as its error message,
/// used when a tool call is denied or its tool is missing.
fn synthetic_tool_result(reason: &str) -> ToolResult {
    ToolResult {
        success: false,
        output: None,
        error: Some(HashMap::from([(
            "message".to_string(),
            json!(reason),
        )])),
    }
}

fn serialize_message(message: &Message) -> Result<Value, ContextError> {
    serde_json::to_value(message).map_err(|e| ContextError::Other {
        message: e.to_string(),
    })
}

fn deserialize_message(raw: Value) -> Result<Message, ContextError> {
    serde_json::from_value(raw).map_err(|e| ContextError::Other {
        message: e.to_string(),
    })
}

/// Append `hook_result.context_injection` to context when the action is
/// `inject_context`, and account for it on the coordinator's per-turn
/// injection counter. A no-op for every other action.
async fn apply_inject_context(
    hook_result: &HookResult,
    context: &Arc<dyn ContextManager>,
    coordinator: &Arc<Coordinator>,
) -> Result<(), AmplifierError> {
    if hook_result.action != HookAction::InjectContext {
        return Ok(());
    }
    let Some(text) = &hook_result.context_injection else {
        return Ok(());
    };
    let role = match hook_result.context_injection_role {
        ContextInjectionRole::System => Role::System,
        ContextInjectionRole::User => Role::User,
        ContextInjectionRole::Assistant => Role::Assistant,
    };
    let message = Message {
        role,
        content: MessageContent::Text(text.clone()),
        name: None,
        tool_call_id: None,
        metadata: None,
        extensions: HashMap::new(),
    };
    context.add_message(serialize_message(&message)?).await?;
    coordinator.increment_injections(1);
    Ok(())
}

/// Consult the mounted approval provider (or `hook_result.approval_default`
/// when none is mounted) for a hook that returned `ask_user`.
async fn resolve_ask_user(
    hook_result: &HookResult,
    tool_call: &ToolCall,
    coordinator: &Arc<Coordinator>,
) -> Result<bool, AmplifierError> {
    coordinator
        .hooks()
        .emit(
            events::APPROVAL_REQUIRED,
            json!({"tool_call_id": tool_call.id, "tool_name": tool_call.name}),
        )
        .await;

    let approved = match coordinator.approval_provider() {
        Some(approver) => {
            let request = ApprovalRequest {
                prompt: hook_result
                    .approval_prompt
                    .clone()
                    .unwrap_or_else(|| format!("Approve tool call `{}`?", tool_call.name)),
                options: hook_result.approval_options.clone().unwrap_or_default(),
                default: Some(
                    match hook_result.approval_default {
                        ApprovalDefault::Allow => "allow",
                        ApprovalDefault::Deny => "deny",
                    }
                    .to_string(),
                ),
                timeout_secs: Some(hook_result.approval_timeout),
                metadata: hook_result.data.clone().unwrap_or_default(),
            };
            approver.request_approval(request).await?.approved
        }
        None => matches!(hook_result.approval_default, ApprovalDefault::Allow),
    };

    let event = if approved {
        events::APPROVAL_GRANTED
    } else {
        events::APPROVAL_DENIED
    };
    coordinator
        .hooks()
        .emit(event, json!({"tool_call_id": tool_call.id}))
        .await;

    Ok(approved)
}

/// Apply a `modify` hook result's `data.arguments` override, falling back to
/// the tool call's original arguments when no override is present.
fn resolve_modified_arguments(
    hook_result: &HookResult,
    tool_call: &ToolCall,
) -> HashMap<String, Value> {
    hook_result
        .data
        .as_ref()
        .and_then(|data| data.get("arguments"))
        .and_then(Value::as_object)
        .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_else(|| tool_call.arguments.clone())
}

impl Orchestrator for BasicOrchestrator {
    fn execute(
        &self,
        prompt: String,
        context: Arc<dyn ContextManager>,
        providers: HashMap<String, Arc<dyn Provider>>,
        tools: HashMap<String, Arc<dyn Tool>>,
        coordinator: Arc<Coordinator>,
    ) -> Pin<Box<dyn Future<Output = Result<String, AmplifierError>> + Send + '_>> {
        let max_tool_turns = self.max_tool_turns;
        Box::pin(async move {
            let started_at = Instant::now();
            let hooks = coordinator.hooks_arc();

            hooks
                .emit(events::EXECUTION_START, json!({"prompt_len": prompt.len()}))
                .await;
            hooks
                .emit(events::PROMPT_SUBMIT, json!({"prompt": prompt}))
                .await;

            let user_message = Message {
                role: Role::User,
                content: MessageContent::Text(prompt),
                name: None,
                tool_call_id: None,
                metadata: None,
                extensions: HashMap::new(),
            };
            context.add_message(serialize_message(&user_message)?).await?;

            let provider = select_provider(&providers).ok_or_else(|| {
                AmplifierError::from(ModuleNotFoundError {
                    id: "provider".to_string(),
                })
            })?;

            let tool_specs: Vec<ToolSpec> = tools.values().map(|tool| tool.get_spec()).collect();

            let mut final_text = String::new();
            let mut turns = 0usize;

            loop {
                if coordinator.cancellation().is_cancelled() {
                    break;
                }
                if turns >= max_tool_turns {
                    return Err(AmplifierError::from(SessionError::Other {
                        message: format!(
                            "tool-call loop exceeded {max_tool_turns} turns without a final response"
                        ),
                    }));
                }
                turns += 1;

                let raw_messages = context.get_messages_for_request(None, Some(provider.clone())).await?;
                let mut messages = Vec::with_capacity(raw_messages.len());
                for raw in raw_messages {
                    messages.push(deserialize_message(raw)?);
                }

                let request = ChatRequest {
                    messages,
                    tools: (!tool_specs.is_empty()).then(|| tool_specs.clone()),
                    response_format: None,
                    temperature: None,
                    top_p: None,
                    max_output_tokens: None,
                    conversation_id: None,
                    stream: None,
                    metadata: None,
                    model: None,
                    tool_choice: None,
                    stop: None,
                    reasoning_effort: None,
                    timeout: None,
                    extensions: HashMap::new(),
                };

                hooks
                    .emit(events::PROVIDER_REQUEST, json!({"provider": provider.name()}))
                    .await;
                let response = provider.complete(request).await.map_err(AmplifierError::from)?;
                hooks
                    .emit(events::PROVIDER_RESPONSE, json!({"provider": provider.name()}))
                    .await;

                let tool_calls = provider.parse_tool_calls(&response);

                let assistant_message = Message {
                    role: Role::Assistant,
                    content: MessageContent::Blocks(response.content.clone()),
                    name: None,
                    tool_call_id: None,
                    metadata: None,
                    extensions: HashMap::new(),
                };
                context.add_message(serialize_message(&assistant_message)?).await?;

                if tool_calls.is_empty() {
                    final_text = extract_text(&response.content);
                    break;
                }

                for tool_call in &tool_calls {
                    if coordinator.cancellation().is_cancelled() {
                        break;
                    }

                    let pre_result = hooks
                        .emit(
                            events::TOOL_PRE,
                            json!({
                                "tool_call_id": tool_call.id,
                                "tool_name": tool_call.name,
                                "arguments": tool_call.arguments,
                            }),
                        )
                        .await;
                    apply_inject_context(&pre_result, &context, &coordinator).await?;

                    let arguments = match pre_result.action {
                        HookAction::Deny => Err(pre_result
                            .reason
                            .clone()
                            .unwrap_or_else(|| "denied by hook".to_string())),
                        HookAction::AskUser => {
                            if resolve_ask_user(&pre_result, tool_call, &coordinator).await? {
                                Ok(tool_call.arguments.clone())
                            } else {
                                Err("denied by user".to_string())
                            }
                        }
                        HookAction::Modify => Ok(resolve_modified_arguments(&pre_result, tool_call)),
                        HookAction::Continue | HookAction::InjectContext => {
                            Ok(tool_call.arguments.clone())
                        }
                    };

                    let tool_result = match arguments {
                        Ok(arguments) => {
                            if coordinator.cancellation().is_immediate() {
                                synthetic_tool_result("cancelled before execution")
                            } else {
                                match tools.get(&tool_call.name) {
                                    Some(tool) => {
                                        coordinator
                                            .cancellation()
                                            .register_tool_start(&tool_call.id, &tool_call.name);
                                        let input = Value::Object(arguments.into_iter().collect());
                                        let result = tool.execute(input).await?;
                                        coordinator.cancellation().register_tool_complete(&tool_call.id);
                                        result
                                    }
                                    None => synthetic_tool_result(&format!(
                                        "tool not found: {}",
                                        tool_call.name
                                    )),
                                }
                            }
                        }
                        Err(reason) => synthetic_tool_result(&reason),
                    };

                    hooks
                        .emit(
                            events::TOOL_POST,
                            json!({
                                "tool_call_id": tool_call.id,
                                "tool_name": tool_call.name,
                                "success": tool_result.success,
                            }),
                        )
                        .await;

                    let tool_message = Message {
                        role: Role::Tool,
                        content: MessageContent::Text(tool_output_text(&tool_result)),
                        name: None,
                        tool_call_id: Some(tool_call.id.clone()),
                        metadata: Some(HashMap::from([(
                            "is_error".to_string(),
                            json!(!tool_result.success),
                        )])),
                        extensions: HashMap::new(),
                    };
                    context.add_message(serialize_message(&tool_message)?).await?;
                }

                hooks
                    .emit(events::ORCHESTRATOR_TURN_COMPLETE, json!({"turn": turns}))
                    .await;
            }

            hooks
                .emit(
                    events::PROMPT_COMPLETE,
                    json!({
                        "response_len": final_text.len(),
                        "elapsed_secs": started_at.elapsed().as_secs_f64(),
                    }),
                )
                .await;
            hooks.emit(events::EXECUTION_END, json!({})).await;

            Ok(final_text)
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
