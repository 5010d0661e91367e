//! Reference provider adapter: an Anthropic-shaped [`Provider`] implementation
//! covering message conversion, reasoning/thinking parameter derivation,
//! retry/error-translation, tool-sequence repair, and usage accounting.
//!
//! This is the baseline the abstract contract in `traits::Provider` is
//! written against (spec.md 4.8): other providers (OpenAI, local models,
//! …) live outside this crate as separately published modules and only
//! need to satisfy the same trait.
//!
//! # Design
//!
//! `complete()` does not have access to the mounting `Coordinator` (the
//! trait signature is `&self, request -> ChatResponse`, matching every
//! other module contract in `traits.rs`). Two cross-cutting concerns —
//! emitting `provider:retry`/`provider:tool_sequence_repaired` events and
//! observing cooperative cancellation — are instead threaded in at
//! construction time as optional collaborators (`Arc<HookRegistry>`,
//! `CancellationToken`), both cheap `Clone`s of the handles the session
//! already owns. See DESIGN.md for the open-question writeup.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::cancellation::CancellationToken;
use crate::capability::{get_capabilities, ModelCapabilities};
use crate::errors::ProviderError;
use crate::events;
use crate::hooks::HookRegistry;
use crate::messages::{
    ChatRequest, ChatResponse, ContentBlock, Message, MessageContent, Role, ToolCall, ToolSpec,
    Usage,
};
use crate::models::{ModelInfo, ProviderInfo};
use crate::traits::Provider;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const NO_RESULT_RECORDED: &str = "<no result recorded>";
const THINKING_LOW_BUDGET: i64 = 4096;

// ---------------------------------------------------------------------------
// Tool-sequence repair
// ---------------------------------------------------------------------------

/// One dangling `tool_use` id that was patched with a synthetic error result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairedCall {
    pub tool_call_id: String,
    pub tool_name: String,
}

/// Scan `messages` for assistant [`ContentBlock::ToolCall`]s whose `id`
/// never appears as a later message's `tool_call_id`, and splice a
/// synthetic `is_error` tool-result message immediately after the
/// originating assistant message.
///
/// `already_repaired` is consulted and updated so the same id is never
/// repaired twice within the life of a provider instance — the property
/// that prevents an infinite detection loop when the upstream message
/// store does not persist the synthetic result (spec.md 4.8, property 7
/// in spec.md 8).
pub fn repair_tool_sequence(
    messages: &mut Vec<Message>,
    already_repaired: &mut HashSet<String>,
) -> Vec<RepairedCall> {
    let satisfied: HashSet<String> = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.clone())
        .collect();

    let mut dangling: Vec<(usize, String, String)> = Vec::new();
    for (idx, msg) in messages.iter().enumerate() {
        if msg.role != Role::Assistant {
            continue;
        }
        if let MessageContent::Blocks(blocks) = &msg.content {
            for block in blocks {
                if let ContentBlock::ToolCall { id, name, .. } = block {
                    if !satisfied.contains(id) && !already_repaired.contains(id) {
                        dangling.push((idx, id.clone(), name.clone()));
                    }
                }
            }
        }
    }

    let mut repaired = Vec::with_capacity(dangling.len());
    for (offset, (idx, id, name)) in dangling.into_iter().enumerate() {
        let insert_at = idx + 1 + offset;
        let mut metadata = HashMap::new();
        metadata.insert("is_error".to_string(), json!(true));
        messages.insert(
            insert_at,
            Message {
                role: Role::Tool,
                content: MessageContent::Text(NO_RESULT_RECORDED.to_string()),
                name: None,
                tool_call_id: Some(id.clone()),
                metadata: Some(metadata),
                extensions: HashMap::new(),
            },
        );
        already_repaired.insert(id.clone());
        repaired.push(RepairedCall {
            tool_call_id: id,
            tool_name: name,
        });
    }
    repaired
}

// ---------------------------------------------------------------------------
// Message conversion (Anthropic wire format)
// ---------------------------------------------------------------------------

/// Convert internal messages into the Anthropic Messages API wire format:
/// a collapsed leading system string plus an alternating `user`/`assistant`
/// array. `ToolResultBlock`-bearing `tool` messages merge into the
/// preceding all-tool-result user message when possible (spec.md 4.8).
pub fn to_anthropic_wire(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system_parts = Vec::new();
    let mut wire: Vec<Value> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System | Role::Developer => {
                let text = content_to_plain_text(&msg.content);
                if !text.is_empty() {
                    system_parts.push(text);
                }
            }
            Role::Tool => {
                let is_error = msg
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("is_error"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id,
                    "content": content_to_plain_text(&msg.content),
                    "is_error": is_error,
                });
                if !merge_tool_result(&mut wire, &block) {
                    wire.push(json!({"role": "user", "content": [block]}));
                }
            }
            Role::User | Role::Function => {
                wire.push(json!({"role": "user", "content": content_to_blocks(&msg.content)}));
            }
            Role::Assistant => {
                wire.push(json!({"role": "assistant", "content": content_to_blocks(&msg.content)}));
            }
        }
    }

    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, wire)
}

fn merge_tool_result(wire: &mut [Value], block: &Value) -> bool {
    let Some(last) = wire.last_mut() else {
        return false;
    };
    if last.get("role").and_then(Value::as_str) != Some("user") {
        return false;
    }
    let Some(arr) = last.get_mut("content").and_then(Value::as_array_mut) else {
        return false;
    };
    if arr.is_empty()
        || !arr
            .iter()
            .all(|b| b.get("type").and_then(Value::as_str) == Some("tool_result"))
    {
        return false;
    }
    arr.push(block.clone());
    true
}

fn content_to_plain_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(s) => s.clone(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn content_to_blocks(content: &MessageContent) -> Vec<Value> {
    match content {
        MessageContent::Text(s) => vec![json!({"type": "text", "text": s})],
        MessageContent::Blocks(blocks) => blocks.iter().filter_map(block_to_wire).collect(),
    }
}

fn block_to_wire(block: &ContentBlock) -> Option<Value> {
    match block {
        ContentBlock::Text { text, .. } => Some(json!({"type": "text", "text": text})),
        ContentBlock::Image { source, .. } => Some(json!({"type": "image", "source": source})),
        ContentBlock::ToolCall { id, name, input, .. } => {
            Some(json!({"type": "tool_use", "id": id, "name": name, "input": input}))
        }
        // Echoed back verbatim only -- never authored by the caller (spec.md 4.8).
        ContentBlock::Thinking {
            thinking, signature, ..
        } => Some(json!({"type": "thinking", "thinking": thinking, "signature": signature})),
        ContentBlock::RedactedThinking { data, .. } => {
            Some(json!({"type": "redacted_thinking", "data": data}))
        }
        // Handled by the caller (merged into a preceding user turn); never
        // reached when converting an assistant/user message's own blocks.
        ContentBlock::ToolResult { .. } | ContentBlock::Reasoning { .. } => None,
    }
}

fn tool_spec_to_wire(spec: &ToolSpec) -> Value {
    json!({
        "name": spec.name,
        "description": spec.description,
        "input_schema": spec.parameters,
    })
}

// ---------------------------------------------------------------------------
// Reasoning / thinking parameter derivation
// ---------------------------------------------------------------------------

/// Derive the Anthropic `thinking` request parameter per spec.md 4.8's
/// `reasoning_effort` table. Returns `(thinking_param, forced_temperature)`;
/// `forced_temperature` is `Some(1.0)` exactly when a thinking param is sent.
pub fn resolve_thinking(
    caps: ModelCapabilities,
    reasoning_effort: Option<&str>,
    extended_thinking_override: Option<bool>,
    thinking_budget_override: Option<i64>,
) -> (Option<Value>, Option<f64>) {
    if !caps.supports_thinking || extended_thinking_override == Some(false) {
        return (None, None);
    }

    let enabled = extended_thinking_override == Some(true) || reasoning_effort.is_some();
    if !enabled {
        return (None, None);
    }

    let budget = thinking_budget_override.unwrap_or(match reasoning_effort {
        Some("low") => THINKING_LOW_BUDGET,
        _ => caps.default_thinking_budget,
    });

    let use_adaptive = caps.supports_adaptive_thinking
        && matches!(reasoning_effort, Some("medium") | Some("high"))
        && thinking_budget_override.is_none();

    let thinking = if use_adaptive {
        json!({"type": "adaptive"})
    } else {
        json!({"type": "enabled", "budget_tokens": budget})
    };

    (Some(thinking), Some(1.0))
}

// ---------------------------------------------------------------------------
// Error translation
// ---------------------------------------------------------------------------

const CONTEXT_LENGTH_NEEDLES: &[&str] = &["context length", "too many tokens", "prompt is too long"];
const CONTENT_FILTER_NEEDLES: &[&str] = &["safety", "blocked", "content filter"];

/// Translate an HTTP status + body into the shared provider error taxonomy
/// (spec.md 4.8's translation table).
pub fn translate_http_error(
    provider: &str,
    status: u16,
    body: &str,
    retry_after: Option<f64>,
) -> ProviderError {
    let lower = body.to_lowercase();
    match status {
        429 => ProviderError::RateLimit {
            message: body.to_string(),
            provider: Some(provider.to_string()),
            retry_after,
        },
        401 | 403 => ProviderError::Authentication {
            message: body.to_string(),
            provider: Some(provider.to_string()),
        },
        400 if CONTEXT_LENGTH_NEEDLES.iter().any(|n| lower.contains(n)) => ProviderError::ContextLength {
            message: body.to_string(),
            provider: Some(provider.to_string()),
        },
        400 if CONTENT_FILTER_NEEDLES.iter().any(|n| lower.contains(n)) => ProviderError::ContentFilter {
            message: body.to_string(),
            provider: Some(provider.to_string()),
        },
        400 | 422 => ProviderError::InvalidRequest {
            message: body.to_string(),
            provider: Some(provider.to_string()),
        },
        500..=599 => ProviderError::Unavailable {
            message: body.to_string(),
            provider: Some(provider.to_string()),
            status_code: Some(status),
        },
        _ => ProviderError::Other {
            message: body.to_string(),
            provider: Some(provider.to_string()),
            status_code: Some(status),
            retryable: true,
        },
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// What the retry loop should do next.
#[derive(Debug)]
pub enum RetryDecision {
    /// Sleep this long, then retry.
    Sleep(Duration),
    /// The wait would exceed policy; raise the error without sleeping.
    FailFast,
}

/// Exponential-backoff retry policy honoring a provider's `Retry-After`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub min_retry_delay: f64,
    pub max_retry_delay: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_retry_delay: 1.0,
            max_retry_delay: 60.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Decide the delay for the `attempt`-th retry (0-indexed), given an
    /// optional `Retry-After` value from the failing response.
    ///
    /// `Retry-After > max_retry_delay` fails fast without sleeping
    /// (spec.md 4.8, scenario S5); otherwise it is honored verbatim when
    /// present, else exponential backoff `min_retry_delay * 2^attempt`
    /// capped at `max_retry_delay`, with optional jitter.
    pub fn decide(&self, attempt: u32, retry_after: Option<f64>) -> RetryDecision {
        if let Some(ra) = retry_after {
            if ra > self.max_retry_delay {
                return RetryDecision::FailFast;
            }
            return RetryDecision::Sleep(Duration::from_secs_f64(ra.max(0.0)));
        }
        let base = self.min_retry_delay * 2f64.powi(attempt as i32);
        let capped = base.min(self.max_retry_delay);
        let delay = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..=1.0)
        } else {
            capped
        };
        RetryDecision::Sleep(Duration::from_secs_f64(delay))
    }
}

// ---------------------------------------------------------------------------
// AnthropicProvider (reference implementation)
// ---------------------------------------------------------------------------

/// Construction-time configuration for [`AnthropicProvider`].
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub default_model: String,
    pub base_url: String,
    pub retry: RetryPolicy,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            default_model: default_model.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Reference `Provider` implementation against the Anthropic Messages API.
///
/// Holds the single pieces of mutable state the spec requires live for the
/// lifetime of one provider instance: the http client, and the set of
/// `tool_use` ids already patched by [`repair_tool_sequence`] (spec.md 4.8,
/// "Track the repaired ids in a set on the provider instance").
pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: reqwest::Client,
    repaired_tool_ids: Mutex<HashSet<String>>,
    hooks: Option<Arc<HookRegistry>>,
    cancellation: Option<CancellationToken>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: i64,
    output_tokens: i64,
    #[serde(default)]
    cache_read_input_tokens: Option<i64>,
    #[serde(default)]
    cache_creation_input_tokens: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: HashMap<String, Value>,
    },
}

#[derive(Debug, Deserialize)]
struct AnthropicMessage {
    content: Vec<AnthropicBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    model: Option<String>,
    usage: AnthropicUsage,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            repaired_tool_ids: Mutex::new(HashSet::new()),
            hooks: None,
            cancellation: None,
        }
    }

    /// Attach a hook registry so retry/repair attempts are observable as
    /// `provider:retry` / `provider:tool_sequence_repaired` events.
    pub fn with_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// Attach a cancellation token so in-flight retries abort promptly.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    async fn emit(&self, event: &str, data: Value) {
        if let Some(hooks) = &self.hooks {
            hooks.emit(event, data).await;
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    fn model_for(&self, request: &ChatRequest) -> String {
        request
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone())
    }

    fn build_body(&self, request: &ChatRequest, messages: &[Message]) -> (Value, ModelCapabilities) {
        let model = self.model_for(request);
        let caps = get_capabilities(&model);
        let (system, wire_messages) = to_anthropic_wire(messages);

        let extended_thinking = request
            .extensions
            .get("extended_thinking")
            .and_then(Value::as_bool);
        let thinking_budget = request
            .extensions
            .get("thinking_budget_tokens")
            .and_then(Value::as_i64);
        let (thinking, forced_temperature) = resolve_thinking(
            caps,
            request.reasoning_effort.as_deref(),
            extended_thinking,
            thinking_budget,
        );

        let mut body = json!({
            "model": model,
            "max_tokens": request.max_output_tokens.unwrap_or(caps.max_output_tokens),
            "messages": wire_messages,
        });

        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                body["tools"] = Value::Array(tools.iter().map(tool_spec_to_wire).collect());
            }
        }
        if let Some(thinking) = thinking {
            body["thinking"] = thinking;
        }
        let temperature = forced_temperature.or(request.temperature);
        if let Some(temperature) = temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(stop) = &request.stop {
            body["stop_sequences"] = json!(stop);
        }

        (body, caps)
    }

    async fn send_once(&self, body: &Value) -> Result<AnthropicMessage, ProviderError> {
        let mut api_key_header = reqwest::header::HeaderValue::try_from(self.config.api_key.as_str())
            .map_err(|e| ProviderError::Authentication {
                message: format!("invalid API key characters: {e}"),
                provider: Some(self.name_static().to_string()),
            })?;
        api_key_header.set_sensitive(true);

        let response = self
            .client
            .post(self.config.base_url.as_str())
            .header("x-api-key", api_key_header)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        message: e.to_string(),
                        provider: Some(self.name_static().to_string()),
                    }
                } else {
                    ProviderError::Unavailable {
                        message: e.to_string(),
                        provider: Some(self.name_static().to_string()),
                        status_code: None,
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok());
            let body_text = response.text().await.unwrap_or_default();
            return Err(translate_http_error(
                self.name_static(),
                status,
                &body_text,
                retry_after,
            ));
        }

        response
            .json::<AnthropicMessage>()
            .await
            .map_err(|e| ProviderError::Other {
                message: format!("malformed response body: {e}"),
                provider: Some(self.name_static().to_string()),
                status_code: None,
                retryable: false,
            })
    }

    fn name_static(&self) -> &'static str {
        "anthropic"
    }
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn get_info(&self) -> ProviderInfo {
        ProviderInfo {
            id: "anthropic".to_string(),
            display_name: "Anthropic".to_string(),
            credential_env_vars: vec!["ANTHROPIC_API_KEY".to_string()],
            capabilities: vec!["tools".to_string(), "vision".to_string(), "thinking".to_string()],
            defaults: HashMap::new(),
            config_fields: Vec::new(),
        }
    }

    fn list_models(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<ModelInfo>, ProviderError>> + Send + '_>> {
        Box::pin(async move {
            Ok(vec![
                ModelInfo {
                    id: "claude-opus-4-6-20260101".to_string(),
                    display_name: "Claude Opus 4.6".to_string(),
                    context_window: 200_000,
                    max_output_tokens: 128_000,
                    capabilities: vec!["tools".to_string(), "thinking".to_string()],
                    defaults: HashMap::new(),
                },
                ModelInfo {
                    id: "claude-sonnet-4-5-20250929".to_string(),
                    display_name: "Claude Sonnet 4.5".to_string(),
                    context_window: 200_000,
                    max_output_tokens: 64_000,
                    capabilities: vec!["tools".to_string(), "thinking".to_string()],
                    defaults: HashMap::new(),
                },
                ModelInfo {
                    id: "claude-haiku-3-5-20250929".to_string(),
                    display_name: "Claude Haiku 3.5".to_string(),
                    context_window: 200_000,
                    max_output_tokens: 64_000,
                    capabilities: vec!["tools".to_string()],
                    defaults: HashMap::new(),
                },
            ])
        })
    }

    fn complete(
        &self,
        request: ChatRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ChatResponse, ProviderError>> + Send + '_>> {
        Box::pin(async move {
            let mut messages = request.messages.clone();
            let repairs = {
                let mut repaired = self.repaired_tool_ids.lock().unwrap();
                repair_tool_sequence(&mut messages, &mut repaired)
            };
            if !repairs.is_empty() {
                self.emit(
                    events::PROVIDER_TOOL_SEQUENCE_REPAIRED,
                    json!({
                        "provider": self.name(),
                        "repair_count": repairs.len(),
                        "repairs": repairs
                            .iter()
                            .map(|r| json!({"tool_call_id": r.tool_call_id, "tool_name": r.tool_name}))
                            .collect::<Vec<_>>(),
                    }),
                )
                .await;
            }

            let (body, _caps) = self.build_body(&request, &messages);

            let policy = self.config.retry;
            let mut attempt = 0u32;
            loop {
                if self.is_cancelled() {
                    return Err(ProviderError::Other {
                        message: "cancelled".to_string(),
                        provider: Some(self.name().to_string()),
                        status_code: None,
                        retryable: false,
                    });
                }

                match self.send_once(&body).await {
                    Ok(msg) => return Ok(to_chat_response(msg)),
                    Err(err) => {
                        if !err.retryable() || attempt >= policy.max_retries {
                            return Err(err);
                        }
                        match policy.decide(attempt, err.retry_after()) {
                            RetryDecision::FailFast => return Err(err),
                            RetryDecision::Sleep(delay) => {
                                self.emit(
                                    events::PROVIDER_RETRY,
                                    json!({
                                        "provider": self.name(),
                                        "attempt": attempt + 1,
                                        "delay": delay.as_secs_f64(),
                                        "error_type": provider_error_type(&err),
                                    }),
                                )
                                .await;
                                if self.is_cancelled() {
                                    return Err(err);
                                }
                                tokio::time::sleep(delay).await;
                                attempt += 1;
                            }
                        }
                    }
                }
            }
        })
    }

    fn parse_tool_calls(&self, response: &ChatResponse) -> Vec<ToolCall> {
        response.tool_calls.clone().unwrap_or_default()
    }
}

fn provider_error_type(err: &ProviderError) -> &'static str {
    match err {
        ProviderError::RateLimit { .. } => "rate_limit",
        ProviderError::Authentication { .. } => "authentication",
        ProviderError::ContextLength { .. } => "context_length",
        ProviderError::ContentFilter { .. } => "content_filter",
        ProviderError::InvalidRequest { .. } => "invalid_request",
        ProviderError::Unavailable { .. } => "provider_unavailable",
        ProviderError::Timeout { .. } => "timeout",
        ProviderError::Other { .. } => "other",
    }
}

fn to_chat_response(msg: AnthropicMessage) -> ChatResponse {
    let mut content = Vec::with_capacity(msg.content.len());
    let mut tool_calls = Vec::new();

    for block in msg.content {
        match block {
            AnthropicBlock::Text { text } => {
                content.push(ContentBlock::Text {
                    text,
                    visibility: None,
                    extensions: HashMap::new(),
                });
            }
            AnthropicBlock::Thinking { thinking, signature } => {
                content.push(ContentBlock::Thinking {
                    thinking,
                    signature,
                    visibility: None,
                    content: None,
                    extensions: HashMap::new(),
                });
            }
            AnthropicBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: input.clone(),
                    extensions: HashMap::new(),
                });
                content.push(ContentBlock::ToolCall {
                    id,
                    name,
                    input,
                    visibility: None,
                    extensions: HashMap::new(),
                });
            }
        }
    }

    ChatResponse {
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        usage: Some(Usage {
            input_tokens: msg.usage.input_tokens,
            output_tokens: msg.usage.output_tokens,
            total_tokens: msg.usage.input_tokens + msg.usage.output_tokens,
            reasoning_tokens: None,
            cache_read_tokens: msg.usage.cache_read_input_tokens,
            cache_write_tokens: msg.usage.cache_creation_input_tokens,
            extensions: HashMap::new(),
        }),
        degradation: None,
        finish_reason: msg.stop_reason,
        metadata: msg.model.map(|m| HashMap::from([("model".to_string(), json!(m))])),
        extensions: HashMap::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
