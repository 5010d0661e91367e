//! Provider model capability tables.
//!
//! Maps a model id to the feature set the reference provider adapter needs
//! to build a correct request: output token ceiling, whether extended
//! thinking is supported at all, whether the `adaptive` thinking mode is
//! available, the default thinking budget, and 1M-context eligibility.
//!
//! Grounded in the Anthropic reference provider's model-family/version
//! detection: family is parsed from the model id (`opus`, `sonnet`,
//! `haiku`, defaulting to `sonnet` for unrecognized families), version is
//! the `(major, minor)` pair following the family name when present.

/// Capability record for one model family/version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelCapabilities {
    pub family: &'static str,
    pub max_output_tokens: i64,
    pub supports_thinking: bool,
    pub supports_adaptive_thinking: bool,
    pub default_thinking_budget: i64,
    pub supports_1m_context: bool,
}

const THINKING_BUDGET_BUFFER: i64 = 4096;

/// Parse the model family (`opus`, `sonnet`, `haiku`) out of a model id.
/// Unrecognized families default to `sonnet`, matching the reference
/// provider's forward-compatible fallback.
pub fn detect_family(model_id: &str) -> &'static str {
    if model_id.contains("opus") {
        "opus"
    } else if model_id.contains("haiku") {
        "haiku"
    } else {
        "sonnet"
    }
}

/// Parse the `(major, minor)` version pair following the family name, e.g.
/// `claude-opus-4-6-20260101` → `(4, 6)`. Returns `(0, 0)` when the id
/// doesn't carry a parseable version (e.g. `claude-opus-latest`).
pub fn detect_version(model_id: &str, family: &str) -> (u32, u32) {
    let Some(after_family) = model_id.split(family).nth(1) else {
        return (0, 0);
    };
    let parts: Vec<&str> = after_family
        .trim_start_matches('-')
        .split('-')
        .take(2)
        .collect();
    let major = parts.first().and_then(|s| s.parse().ok());
    let minor = parts.get(1).and_then(|s| s.parse().ok());
    match (major, minor) {
        (Some(maj), Some(min)) => (maj, min),
        _ => (0, 0),
    }
}

/// Look up the capability record for a model id.
///
/// Unknown/unparseable versions default to the family's latest-known
/// capabilities for forward compatibility, matching the reference
/// provider's behavior (a bare alias like `claude-opus-4-6` or an
/// unversioned `claude-opus-latest` both resolve to the newest record).
pub fn get_capabilities(model_id: &str) -> ModelCapabilities {
    let family = detect_family(model_id);
    let version = detect_version(model_id, family);

    let caps = match family {
        "opus" => {
            if version.0 == 4 && version.1 == 5 {
                ModelCapabilities {
                    family: "opus",
                    max_output_tokens: 64_000,
                    supports_thinking: true,
                    supports_adaptive_thinking: false,
                    default_thinking_budget: 32_000,
                    supports_1m_context: false,
                }
            } else {
                ModelCapabilities {
                    family: "opus",
                    max_output_tokens: 128_000,
                    supports_thinking: true,
                    supports_adaptive_thinking: true,
                    default_thinking_budget: 64_000,
                    supports_1m_context: true,
                }
            }
        }
        "haiku" => ModelCapabilities {
            family: "haiku",
            max_output_tokens: 64_000,
            supports_thinking: false,
            supports_adaptive_thinking: false,
            default_thinking_budget: 0,
            supports_1m_context: false,
        },
        _ => ModelCapabilities {
            family: "sonnet",
            max_output_tokens: 64_000,
            supports_thinking: true,
            supports_adaptive_thinking: false,
            default_thinking_budget: 32_000,
            supports_1m_context: false,
        },
    };

    debug_assert!(
        !caps.supports_thinking || caps.default_thinking_budget + THINKING_BUDGET_BUFFER <= caps.max_output_tokens,
        "capability table entry for {family} violates the thinking-budget/output-ceiling invariant"
    );
    caps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_opus_family() {
        assert_eq!(detect_family("claude-opus-4-6-20260101"), "opus");
    }

    #[test]
    fn detects_sonnet_family() {
        assert_eq!(detect_family("claude-sonnet-4-5-20250929"), "sonnet");
    }

    #[test]
    fn detects_haiku_family() {
        assert_eq!(detect_family("claude-haiku-3-5-20250929"), "haiku");
    }

    #[test]
    fn unknown_family_defaults_to_sonnet() {
        assert_eq!(detect_family("claude-mystery-9-9"), "sonnet");
    }

    #[test]
    fn detects_version_with_date_suffix() {
        assert_eq!(detect_version("claude-opus-4-6-20260101", "opus"), (4, 6));
        assert_eq!(detect_version("claude-opus-4-5-20251101", "opus"), (4, 5));
    }

    #[test]
    fn detects_version_from_bare_alias() {
        assert_eq!(detect_version("claude-opus-4-6", "opus"), (4, 6));
    }

    #[test]
    fn unparseable_version_is_zero() {
        assert_eq!(detect_version("claude-opus-latest", "opus"), (0, 0));
    }

    #[test]
    fn opus_45_uses_reduced_ceiling_and_budget() {
        let caps = get_capabilities("claude-opus-4-5-20251101");
        assert_eq!(caps.max_output_tokens, 64_000);
        assert_eq!(caps.default_thinking_budget, 32_000);
        assert!(!caps.supports_1m_context);
        assert!(!caps.supports_adaptive_thinking);
    }

    #[test]
    fn opus_46_uses_full_ceiling_and_budget() {
        let caps = get_capabilities("claude-opus-4-6-20260101");
        assert_eq!(caps.max_output_tokens, 128_000);
        assert_eq!(caps.default_thinking_budget, 64_000);
        assert!(caps.supports_1m_context);
        assert!(caps.supports_adaptive_thinking);
    }

    #[test]
    fn opus_bare_alias_assumes_latest() {
        let caps = get_capabilities("claude-opus-4-6");
        assert_eq!(caps.max_output_tokens, 128_000);
        assert!(caps.supports_1m_context);
    }

    #[test]
    fn opus_unknown_version_assumes_latest() {
        let caps = get_capabilities("claude-opus-latest");
        assert_eq!(caps.max_output_tokens, 128_000);
    }

    #[test]
    fn all_opus_versions_support_thinking() {
        for id in ["claude-opus-4-5-20251101", "claude-opus-4-6-20260101"] {
            assert!(get_capabilities(id).supports_thinking);
        }
    }

    #[test]
    fn sonnet_capabilities() {
        let caps = get_capabilities("claude-sonnet-4-5-20250929");
        assert_eq!(caps.max_output_tokens, 64_000);
        assert!(caps.supports_thinking);
        assert!(!caps.supports_adaptive_thinking);
        assert_eq!(caps.default_thinking_budget, 32_000);
    }

    #[test]
    fn haiku_does_not_support_thinking() {
        let caps = get_capabilities("claude-haiku-3-5-20250929");
        assert!(!caps.supports_thinking);
        assert_eq!(caps.family, "haiku");
    }

    #[test]
    fn thinking_budget_always_within_ceiling() {
        for id in [
            "claude-opus-4-5-20251101",
            "claude-opus-4-6-20260101",
            "claude-sonnet-4-5-20250929",
        ] {
            let caps = get_capabilities(id);
            assert!(caps.default_thinking_budget + THINKING_BUDGET_BUFFER <= caps.max_output_tokens);
        }
    }
}
