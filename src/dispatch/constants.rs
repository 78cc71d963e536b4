//! Constants for talking to the Cloud Code (Antigravity) backend.
//!
//! Ported from `providers/gemini/constants.rs`: endpoints, timeouts,
//! rate-limit budgets, API paths, and model-family detection.

use std::time::Duration;

// ============================================================================
// API Endpoints
// ============================================================================

/// Daily/experimental Cloud Code API endpoint.
pub const CLOUDCODE_ENDPOINT_DAILY: &str = "https://daily-cloudcode-pa.googleapis.com";

/// Production Cloud Code API endpoint.
pub const CLOUDCODE_ENDPOINT_PROD: &str = "https://cloudcode-pa.googleapis.com";

/// generateContent fallback order: daily first (newer features, looser
/// availability), then prod.
pub const CLOUDCODE_ENDPOINT_FALLBACKS: &[&str] =
    &[CLOUDCODE_ENDPOINT_DAILY, CLOUDCODE_ENDPOINT_PROD];

/// loadCodeAssist endpoint order: prod first, which handles fresh
////unprovisioned accounts better during discovery.
pub const LOAD_CODE_ASSIST_ENDPOINTS: &[&str] =
    &[CLOUDCODE_ENDPOINT_PROD, CLOUDCODE_ENDPOINT_DAILY];

// ============================================================================
// Model Detection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    Claude,
    Gemini,
    Unknown,
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFamily::Claude => write!(f, "claude"),
            ModelFamily::Gemini => write!(f, "gemini"),
            ModelFamily::Unknown => write!(f, "unknown"),
        }
    }
}

/// Determine the model family from a model name. Case-insensitive
/// substring match on "claude" / "gemini".
pub fn get_model_family(model: &str) -> ModelFamily {
    let lower = model.to_lowercase();
    if lower.contains("claude") {
        ModelFamily::Claude
    } else if lower.contains("gemini") {
        ModelFamily::Gemini
    } else {
        ModelFamily::Unknown
    }
}

/// Whether a model emits thinking/reasoning content: Claude models with
/// "thinking" in the name, Gemini models with "thinking" in the name, or
/// any Gemini 3+ model (thinking is on by default from gemini-3 onward).
pub fn is_thinking_model(model: &str) -> bool {
    let lower = model.to_lowercase();

    if lower.contains("claude") && lower.contains("thinking") {
        return true;
    }

    if lower.contains("gemini") {
        if lower.contains("thinking") {
            return true;
        }
        if let Some(version_start) = lower.find("gemini-") {
            let after_prefix = &lower[version_start + 7..];
            let version_str: String = after_prefix
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(version) = version_str.parse::<u32>() {
                if version >= 3 {
                    return true;
                }
            }
        }
    }

    false
}

// ============================================================================
// Project and API Constants
// ============================================================================

/// Fallback project ID used when discovery exhausts every endpoint.
pub const DEFAULT_PROJECT_ID: &str = "rising-fact-p41fc";

/// Maximum output tokens for Gemini models.
pub const GEMINI_MAX_OUTPUT_TOKENS: u32 = 16384;

/// Sentinel that bypasses thought-signature validation. Injected when the
/// upstream has stripped the original `thoughtSignature` and the cache has
/// nothing usable for the turn.
pub const GEMINI_SKIP_SIGNATURE: &str = "skip_thought_signature_validator";

/// TTL for cached thought signatures (2 hours).
pub const SIGNATURE_CACHE_TTL_SECS: u64 = 7200;
pub const SIGNATURE_CACHE_TTL: Duration = Duration::from_secs(SIGNATURE_CACHE_TTL_SECS);

/// Signatures shorter than this are treated as corrupted, not cached.
pub const MIN_SIGNATURE_LENGTH: usize = 50;

// ============================================================================
// HTTP Headers
// ============================================================================

pub const USER_AGENT: &str = "cloudcode-gateway/0.1";
pub const GOOG_API_CLIENT: &str = "google-cloud-sdk vscode_cloudshelleditor/0.1";
pub const CLIENT_METADATA: &str =
    r#"{"ideType":"IDE_UNSPECIFIED","platform":"PLATFORM_UNSPECIFIED","pluginType":"GEMINI"}"#;

// ============================================================================
// Timeouts
// ============================================================================

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Rate Limiting / Retry Budgets
// ============================================================================

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);
pub const MAX_WAIT_BEFORE_ERROR: Duration = Duration::from_secs(120);
pub const MAX_RETRIES: u32 = 5;
pub const MAX_EMPTY_RESPONSE_RETRIES: u32 = 2;

// ============================================================================
// API Paths
// ============================================================================

pub const API_PATH_GENERATE_CONTENT: &str = "/v1internal:generateContent";
pub const API_PATH_STREAM_GENERATE_CONTENT: &str = "/v1internal:streamGenerateContent?alt=sse";
pub const API_PATH_LOAD_CODE_ASSIST: &str = "/v1internal/load_code_assist";
pub const API_PATH_ONBOARD_USER: &str = "/v1internal/onboard_user";
pub const API_PATH_FETCH_MODELS: &str = "/v1internal/fetch_available_models";

// ============================================================================
// System Instruction
// ============================================================================

/// Injected into every request to keep the Cloud Code backend's agentic
/// persona checks satisfied.
pub const ANTIGRAVITY_SYSTEM_INSTRUCTION: &str = r#"You are Antigravity, a powerful agentic AI coding assistant designed by the Google Deepmind team working on Advanced Agentic Coding.You are pair programming with a USER to solve their coding task. The task may require creating a new codebase, modifying or debugging an existing codebase, or simply answering a question.**Absolute paths only****Proactiveness**"#;

// ============================================================================
// Known Models
// ============================================================================

pub const CLAUDE_MODELS: &[&str] = &[
    "claude-opus-4-5-thinking",
    "claude-sonnet-4-5-thinking",
    "claude-sonnet-4-5",
];

pub const GEMINI_MODELS: &[&str] = &[
    "gemini-3-pro-high",
    "gemini-3-pro-low",
    "gemini-3-flash",
    "gemini-2.5-flash-lite",
];

/// Default max output tokens for a model when the caller didn't specify one.
pub fn default_max_tokens(model: &str) -> u32 {
    match get_model_family(model) {
        ModelFamily::Gemini => GEMINI_MAX_OUTPUT_TOKENS,
        ModelFamily::Claude | ModelFamily::Unknown => 8192,
    }
}

// ============================================================================
// Model Fallback
// ============================================================================

/// When every account is exhausted for a model, the dispatcher may recurse
/// once with a configured fallback model rather than surfacing
/// `RESOURCE_EXHAUSTED` directly. Thinking variants fall back to their
/// cheaper non-thinking sibling within the same family.
pub const MODEL_FALLBACKS: &[(&str, &str)] = &[
    ("claude-opus-4-5-thinking", "claude-sonnet-4-5"),
    ("claude-sonnet-4-5-thinking", "claude-sonnet-4-5"),
    ("gemini-3-pro-high", "gemini-3-flash"),
    ("gemini-3-pro-low", "gemini-3-flash"),
];

/// The configured fallback model for `model`, if any.
pub fn model_fallback(model: &str) -> Option<&'static str> {
    MODEL_FALLBACKS
        .iter()
        .find(|(from, _)| from.eq_ignore_ascii_case(model))
        .map(|(_, to)| *to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_model_family_claude() {
        assert_eq!(get_model_family("claude-sonnet-4-5-thinking"), ModelFamily::Claude);
        assert_eq!(get_model_family("CLAUDE-SONNET-4-5"), ModelFamily::Claude);
    }

    #[test]
    fn test_get_model_family_gemini() {
        assert_eq!(get_model_family("gemini-3-flash"), ModelFamily::Gemini);
        assert_eq!(get_model_family("GEMINI-3-PRO"), ModelFamily::Gemini);
    }

    #[test]
    fn test_get_model_family_unknown() {
        assert_eq!(get_model_family("gpt-4"), ModelFamily::Unknown);
        assert_eq!(get_model_family(""), ModelFamily::Unknown);
    }

    #[test]
    fn test_is_thinking_model_claude() {
        assert!(is_thinking_model("claude-sonnet-4-5-thinking"));
        assert!(!is_thinking_model("claude-sonnet-4-5"));
    }

    #[test]
    fn test_is_thinking_model_gemini_version_gate() {
        assert!(is_thinking_model("gemini-3-flash"));
        assert!(is_thinking_model("gemini-4-pro"));
        assert!(is_thinking_model("gemini-2-thinking"));
        assert!(!is_thinking_model("gemini-2.5-flash-lite"));
        assert!(!is_thinking_model("gemini-1.5-pro"));
    }

    #[test]
    fn test_model_family_display() {
        assert_eq!(ModelFamily::Claude.to_string(), "claude");
        assert_eq!(ModelFamily::Unknown.to_string(), "unknown");
    }

    #[test]
    fn test_default_max_tokens() {
        assert_eq!(default_max_tokens("gemini-3-flash"), GEMINI_MAX_OUTPUT_TOKENS);
        assert_eq!(default_max_tokens("claude-sonnet-4-5"), 8192);
    }

    #[test]
    fn test_endpoint_orderings_differ() {
        assert_eq!(CLOUDCODE_ENDPOINT_FALLBACKS[0], CLOUDCODE_ENDPOINT_DAILY);
        assert_eq!(LOAD_CODE_ASSIST_ENDPOINTS[0], CLOUDCODE_ENDPOINT_PROD);
    }

    #[test]
    fn test_timeouts_ordered() {
        assert!(REQUEST_TIMEOUT > CONNECT_TIMEOUT);
        assert!(REQUEST_TIMEOUT > STREAM_IDLE_TIMEOUT);
    }

    #[test]
    fn test_signature_cache_ttl() {
        assert_eq!(SIGNATURE_CACHE_TTL, Duration::from_secs(7200));
    }

    #[test]
    fn test_model_fallback_known_and_unknown() {
        assert_eq!(model_fallback("claude-opus-4-5-thinking"), Some("claude-sonnet-4-5"));
        assert_eq!(model_fallback("gemini-3-flash"), None);
    }
}
