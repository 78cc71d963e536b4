//! Per-account token cache entry.
//!
//! Adapted from `oauth/token.rs`'s `TokenInfo`: composite refresh-token
//! format (`refresh_token|project_id|managed_project_id`) and the
//! expiry/refresh-window arithmetic, scoped down to what the broker
//! needs (no multi-provider bookkeeping).

use std::time::{SystemTime, UNIX_EPOCH};

/// Separator used in the composite refresh-token format.
pub const COMPOSITE_SEPARATOR: char = '|';

/// Tokens are treated as expired this many seconds before their real
/// expiry, to avoid racing a request against the clock.
pub const EXPIRY_SAFETY_MARGIN_SECS: i64 = 60;

/// A token younger than this window is served from cache without a
/// refresh round-trip.
pub const REFRESH_BUFFER_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: String,
    /// Epoch-seconds at which the access token expires.
    pub expires_at: i64,
}

impl CachedToken {
    pub fn new(access_token: impl Into<String>, expires_in_secs: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: now_secs() + expires_in_secs,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= now_secs() + EXPIRY_SAFETY_MARGIN_SECS
    }

    pub fn needs_refresh(&self) -> bool {
        self.expires_at <= now_secs() + REFRESH_BUFFER_SECS
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Split a composite refresh token into `(base_refresh, project_id, managed_project_id)`.
pub fn parse_refresh_parts(raw: &str) -> (&str, Option<&str>, Option<&str>) {
    let mut parts = raw.splitn(3, COMPOSITE_SEPARATOR);
    let base = parts.next().unwrap_or(raw);
    let project = parts.next().filter(|s| !s.is_empty());
    let managed = parts.next().filter(|s| !s.is_empty());
    (base, project, managed)
}

/// Re-compose a refresh token with (possibly updated) project IDs attached.
pub fn with_project_ids(base_refresh: &str, project_id: &str, managed_project_id: Option<&str>) -> String {
    format!(
        "{base_refresh}{sep}{project_id}{sep}{managed}",
        sep = COMPOSITE_SEPARATOR,
        managed = managed_project_id.unwrap_or("")
    )
}
