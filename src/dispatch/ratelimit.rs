//! Rate-limit reset hint parsing for HTTP 429 responses.
//!
//! Priority order per spec: a structured `retryInfo.retryDelay` field in
//! the JSON body (e.g. `"32s"`), then a `Retry-After` header in seconds,
//! then a pattern search over the body text, else `None`.

use regex::Regex;
use std::sync::OnceLock;

use super::error::RateLimitHint;

fn duration_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)retry(?:\s+again)?\s+in\s+(\d+(?:\.\d+)?)\s*s").unwrap())
}

/// Parse a `google.rpc.RetryInfo`-shaped `retryDelay` string such as
/// `"32s"` or `"1.5s"` into milliseconds.
fn parse_retry_delay_string(s: &str) -> Option<u64> {
    let secs: f64 = s.trim_end_matches('s').parse().ok()?;
    Some((secs * 1000.0).round() as u64)
}

/// Extract a `retryInfo.retryDelay` hint from a parsed 429 JSON body.
/// Google's error envelope nests this under `error.details[]` entries
/// tagged `type.googleapis.com/google.rpc.RetryInfo`.
fn from_body_retry_info(body: &serde_json::Value) -> Option<u64> {
    let details = body.get("error")?.get("details")?.as_array()?;
    for detail in details {
        if let Some(delay) = detail.get("retryDelay").and_then(|v| v.as_str()) {
            if let Some(ms) = parse_retry_delay_string(delay) {
                return Some(ms);
            }
        }
    }
    None
}

fn from_retry_after_header(header_value: &str) -> Option<u64> {
    header_value.trim().parse::<u64>().ok().map(|secs| secs * 1000)
}

fn from_body_pattern(body_text: &str) -> Option<u64> {
    let caps = duration_pattern().captures(body_text)?;
    let secs: f64 = caps.get(1)?.as_str().parse().ok()?;
    Some((secs * 1000.0).round() as u64)
}

/// Parse a rate-limit reset hint from a 429 response's body and headers.
pub fn parse_rate_limit_hint(body_text: &str, retry_after_header: Option<&str>) -> RateLimitHint {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body_text) {
        if let Some(ms) = from_body_retry_info(&json) {
            return RateLimitHint { reset_in_ms: Some(ms) };
        }
    }

    if let Some(header) = retry_after_header {
        if let Some(ms) = from_retry_after_header(header) {
            return RateLimitHint { reset_in_ms: Some(ms) };
        }
    }

    RateLimitHint {
        reset_in_ms: from_body_pattern(body_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_retry_info_takes_priority() {
        let body = serde_json::json!({
            "error": {
                "code": 429,
                "details": [{"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "32s"}]
            }
        })
        .to_string();
        let hint = parse_rate_limit_hint(&body, Some("99"));
        assert_eq!(hint.reset_in_ms, Some(32_000));
    }

    #[test]
    fn test_retry_after_header_used_without_structured_body() {
        let hint = parse_rate_limit_hint("{}", Some("5"));
        assert_eq!(hint.reset_in_ms, Some(5_000));
    }

    #[test]
    fn test_body_pattern_fallback() {
        let hint = parse_rate_limit_hint("please retry in 12s", None);
        assert_eq!(hint.reset_in_ms, Some(12_000));
    }

    #[test]
    fn test_no_hint_found() {
        let hint = parse_rate_limit_hint("quota exceeded", None);
        assert_eq!(hint.reset_in_ms, None);
    }

    #[test]
    fn test_fractional_seconds() {
        let hint = parse_rate_limit_hint("retry again in 1.5s", None);
        assert_eq!(hint.reset_in_ms, Some(1500));
    }
}
