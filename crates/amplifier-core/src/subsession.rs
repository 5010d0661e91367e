//! Sub-session ID derivation and provider/model preference inheritance for
//! spawned child sessions.
//!
//! `generate_sub_session_id` follows W3C Trace Context principles: every
//! sub-session ID embeds a parent span and a freshly generated child span,
//! so lineage can be reconstructed by walking the chain of IDs without any
//! out-of-band bookkeeping.

use std::sync::Arc;

use globset::Glob;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::coordinator::Coordinator;

const SPAN_HEX_LEN: usize = 16;

static SPAN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9a-f]{16})-([0-9a-f]{16})_").unwrap());
static TRACE_ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{32}$").unwrap());

/// Generate a sub-session ID with W3C Trace Context lineage.
///
/// Format: `{parent-span}-{child-span}_{agent-name}`, e.g.
/// `1234567890abcdef-fedcba0987654321_zen-architect`.
pub fn generate_sub_session_id(
    agent_name: Option<&str>,
    parent_session_id: Option<&str>,
    parent_trace_id: Option<&str>,
) -> String {
    let sanitized = sanitize_agent_name(agent_name.unwrap_or(""));

    let mut parent_span = "0".repeat(SPAN_HEX_LEN);

    if let Some(parent_id) = parent_session_id {
        if let Some(captures) = SPAN_PATTERN.captures(parent_id) {
            parent_span = captures[2].to_string();
        }
    }

    if parent_span == "0".repeat(SPAN_HEX_LEN) {
        if let Some(trace_id) = parent_trace_id {
            if TRACE_ID_PATTERN.is_match(trace_id) {
                parent_span = trace_id[8..24].to_string();
            }
        }
    }

    let child_span = &uuid::Uuid::new_v4().simple().to_string()[..SPAN_HEX_LEN];

    format!("{parent_span}-{child_span}_{sanitized}")
}

fn sanitize_agent_name(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let mut sanitized = String::with_capacity(lowered.len());
    let mut last_was_sep = false;
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() {
            sanitized.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            sanitized.push('-');
            last_was_sep = true;
        }
    }
    let trimmed = sanitized.trim_matches('-').trim_start_matches('.');
    if trimmed.is_empty() {
        "agent".to_string()
    } else {
        trimmed.to_string()
    }
}

/// An ordered provider/model preference used when spawning a sub-session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderPreference {
    pub provider: String,
    pub model: String,
}

/// Outcome of resolving a (possibly glob) model hint against a provider's
/// available models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResolutionResult {
    pub resolved_model: String,
    pub pattern: Option<String>,
    pub available_models: Option<Vec<String>>,
    pub matched_models: Option<Vec<String>>,
}

/// Whether `model_hint` contains glob wildcard characters.
pub fn is_glob_pattern(model_hint: &str) -> bool {
    model_hint.contains(['*', '?', '['])
}

/// Resolve a model glob pattern against a provider's available models.
///
/// Returns the hint unchanged (with resolution metadata explaining why) if
/// it isn't a pattern, no provider name was given, the provider can't be
/// found, or nothing matches.
pub async fn resolve_model_pattern(
    model_hint: &str,
    provider_name: Option<&str>,
    coordinator: &Coordinator,
) -> ModelResolutionResult {
    if !is_glob_pattern(model_hint) {
        return ModelResolutionResult {
            resolved_model: model_hint.to_string(),
            pattern: None,
            available_models: None,
            matched_models: None,
        };
    }

    let Some(provider_name) = provider_name else {
        return ModelResolutionResult {
            resolved_model: model_hint.to_string(),
            pattern: Some(model_hint.to_string()),
            available_models: None,
            matched_models: None,
        };
    };

    let providers = coordinator.providers();
    let provider = find_provider_instance(&providers, provider_name);

    let available_models: Vec<String> = match provider {
        Some(provider) => match provider.list_models().await {
            Ok(models) => models.into_iter().map(|m| m.id).collect(),
            Err(_) => Vec::new(),
        },
        None => Vec::new(),
    };

    if available_models.is_empty() {
        return ModelResolutionResult {
            resolved_model: model_hint.to_string(),
            pattern: Some(model_hint.to_string()),
            available_models: Some(Vec::new()),
            matched_models: Some(Vec::new()),
        };
    }

    let mut matched = filter_glob(&available_models, model_hint);
    if matched.is_empty() {
        return ModelResolutionResult {
            resolved_model: model_hint.to_string(),
            pattern: Some(model_hint.to_string()),
            available_models: Some(available_models),
            matched_models: Some(Vec::new()),
        };
    }

    matched.sort();
    matched.reverse();
    let resolved = matched[0].clone();

    ModelResolutionResult {
        resolved_model: resolved,
        pattern: Some(model_hint.to_string()),
        available_models: Some(available_models),
        matched_models: Some(matched),
    }
}

fn filter_glob(candidates: &[String], pattern: &str) -> Vec<String> {
    let Ok(glob) = Glob::new(pattern) else {
        return Vec::new();
    };
    let matcher = glob.compile_matcher();
    candidates
        .iter()
        .filter(|c| matcher.is_match(c.as_str()))
        .cloned()
        .collect()
}

fn find_provider_instance(
    providers: &std::collections::HashMap<String, Arc<dyn crate::traits::Provider>>,
    provider_name: &str,
) -> Option<Arc<dyn crate::traits::Provider>> {
    for (name, provider) in providers {
        let short = name.strip_prefix("provider-").unwrap_or(name);
        let prefixed = format!("provider-{short}");
        if provider_name == name || provider_name == short || provider_name == prefixed {
            return Some(Arc::clone(provider));
        }
    }
    None
}

fn find_provider_index(providers: &[Value], provider_id: &str) -> Option<usize> {
    providers.iter().position(|p| {
        let module_id = p.get("module").and_then(|v| v.as_str()).unwrap_or("");
        let short = module_id.strip_prefix("provider-").unwrap_or(module_id);
        let prefixed = format!("provider-{short}");
        provider_id == module_id || provider_id == short || provider_id == prefixed
    })
}

fn build_provider_lookup(providers: &[Value]) -> std::collections::HashMap<String, usize> {
    let mut lookup = std::collections::HashMap::new();
    for (i, p) in providers.iter().enumerate() {
        let module_id = p.get("module").and_then(|v| v.as_str()).unwrap_or("").to_string();
        lookup.insert(module_id.clone(), i);
        let short = module_id.strip_prefix("provider-").unwrap_or(&module_id).to_string();
        if short != module_id {
            lookup.insert(short.clone(), i);
        }
        lookup.insert(format!("provider-{short}"), i);
    }
    lookup
}

/// Apply the first matching provider preference to a mount plan, promoting
/// it to priority 0 and setting its model. Returns the mount plan
/// unmodified if no preference matches (or none are given).
pub fn apply_provider_preferences(mount_plan: &Value, preferences: &[ProviderPreference]) -> Value {
    if preferences.is_empty() {
        return mount_plan.clone();
    }

    let Some(providers) = mount_plan.get("providers").and_then(|v| v.as_array()) else {
        return mount_plan.clone();
    };
    if providers.is_empty() {
        return mount_plan.clone();
    }

    let lookup = build_provider_lookup(providers);
    for pref in preferences {
        if let Some(&target_idx) = lookup.get(&pref.provider) {
            return apply_single_override(mount_plan, providers, target_idx, &pref.model);
        }
    }
    mount_plan.clone()
}

/// Like [`apply_provider_preferences`], but resolves glob model patterns
/// against the matched provider's available models first.
pub async fn apply_provider_preferences_with_resolution(
    mount_plan: &Value,
    preferences: &[ProviderPreference],
    coordinator: &Coordinator,
) -> Value {
    if preferences.is_empty() {
        return mount_plan.clone();
    }

    let Some(providers) = mount_plan.get("providers").and_then(|v| v.as_array()) else {
        return mount_plan.clone();
    };
    if providers.is_empty() {
        return mount_plan.clone();
    }

    let lookup = build_provider_lookup(providers);
    for pref in preferences {
        if let Some(&target_idx) = lookup.get(&pref.provider) {
            let resolved_model = if is_glob_pattern(&pref.model) {
                resolve_model_pattern(&pref.model, Some(&pref.provider), coordinator)
                    .await
                    .resolved_model
            } else {
                pref.model.clone()
            };
            return apply_single_override(mount_plan, providers, target_idx, &resolved_model);
        }
    }
    mount_plan.clone()
}

fn apply_single_override(mount_plan: &Value, providers: &[Value], target_idx: usize, model: &str) -> Value {
    let mut new_plan = mount_plan.clone();
    let mut new_providers = Vec::with_capacity(providers.len());

    for (i, p) in providers.iter().enumerate() {
        let mut p_copy = p.clone();
        let config = p_copy
            .as_object_mut()
            .unwrap()
            .entry("config")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if i == target_idx {
            let config_obj = config.as_object_mut().unwrap();
            config_obj.insert("priority".to_string(), Value::from(0));
            config_obj.insert("model".to_string(), Value::from(model));
        }
        new_providers.push(p_copy);
    }

    new_plan["providers"] = Value::Array(new_providers);
    new_plan
}
