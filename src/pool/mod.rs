//! Account pool manager.
//!
//! Owns the set of Google accounts, selects one for each inbound request
//! using a sticky-then-failover policy, tracks per-model rate-limit
//! cooldowns, and persists state across restarts.
//!
//! Selection/rotation is grounded on the teacher's
//! `ProviderRouter::candidates_for_model` round-robin index; per-account
//! health bookkeeping borrows the shape (not the state machine) of
//! `providers::health::CircuitBreaker` -- cooldowns here are a
//! fixed-reset-time model rather than a failure-counting breaker.

pub mod persist;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Default cooldown applied when a 429 carries no explicit reset hint.
pub const DEFAULT_COOLDOWN_MS: u64 = 10_000;

/// If the soonest available account is cooling down for no longer than
/// this, the dispatcher sleeps in-process rather than surfacing an error.
pub const MAX_WAIT_BEFORE_ERROR_MS: u64 = 120_000;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

/// Per-model rate-limit bookkeeping for one account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitState {
    pub is_rate_limited: bool,
    /// Epoch-ms at which the cooldown clears, if any.
    pub reset_time: Option<u64>,
}

impl RateLimitState {
    fn is_active(&self, now: u64) -> bool {
        self.is_rate_limited && self.reset_time.map(|t| t > now).unwrap_or(true)
    }
}

/// How an account authenticates with the upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccountSource {
    /// OAuth refresh token, exchanged for short-lived access tokens.
    OAuth { refresh_token: String },
    /// A static API key, used verbatim.
    ApiKey { api_key: String },
    /// Credentials live in an external (collaborator-managed) database.
    DbBacked { reference: String },
}

/// One Google Cloud Code account in the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub source: AccountSource,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "now_ms")]
    pub added_at: u64,
    #[serde(default)]
    pub last_used: Option<u64>,
    #[serde(default)]
    pub is_invalid: bool,
    #[serde(default)]
    pub invalid_reason: Option<String>,
    #[serde(default)]
    pub invalid_at: Option<u64>,
    #[serde(default)]
    pub model_rate_limits: HashMap<String, RateLimitState>,
    /// Unknown fields preserved verbatim across a load/save round-trip.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Account {
    pub fn new(email: impl Into<String>, source: AccountSource) -> Self {
        Self {
            email: email.into(),
            source,
            project_id: None,
            added_at: now_ms(),
            last_used: None,
            is_invalid: false,
            invalid_reason: None,
            invalid_at: None,
            model_rate_limits: HashMap::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Whether this account is currently usable for `model`.
    pub fn is_usable_for(&self, model: &str) -> bool {
        if self.is_invalid {
            return false;
        }
        match self.model_rate_limits.get(model) {
            Some(state) => !state.is_active(now_ms()),
            None => true,
        }
    }

    fn clear_expired(&mut self) {
        let now = now_ms();
        self.model_rate_limits
            .retain(|_, state| state.is_active(now));
    }

    fn mark_rate_limited(&mut self, model: &str, reset_ms: Option<u64>, default_cooldown_ms: u64) {
        let reset_time = reset_ms.unwrap_or_else(|| now_ms() + default_cooldown_ms);
        self.model_rate_limits.insert(
            model.to_string(),
            RateLimitState {
                is_rate_limited: true,
                reset_time: Some(reset_time),
            },
        );
    }

    fn mark_invalid(&mut self, reason: impl Into<String>) {
        self.is_invalid = true;
        self.invalid_reason = Some(reason.into());
        self.invalid_at = Some(now_ms());
    }
}

/// Pool-wide settings, persisted alongside the account list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_duration_ms: u64,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_before_error_ms: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_cooldown_ms() -> u64 {
    DEFAULT_COOLDOWN_MS
}

fn default_max_wait_ms() -> u64 {
    MAX_WAIT_BEFORE_ERROR_MS
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            cooldown_duration_ms: DEFAULT_COOLDOWN_MS,
            max_wait_before_error_ms: MAX_WAIT_BEFORE_ERROR_MS,
            extra: serde_json::Map::new(),
        }
    }
}

/// The entire persisted pool state.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccountConfig {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub active_index: usize,
    #[serde(default)]
    pub settings: PoolSettings,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("no accounts configured")]
    NoAccounts,
    #[error("all accounts rate-limited for this model; retry in {min_wait_ms}ms")]
    AllRateLimited { min_wait_ms: u64 },
    #[error("unknown account: {0}")]
    UnknownAccount(String),
    #[error("persistence error: {0}")]
    Persist(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;

// ---------------------------------------------------------------------------
// AccountPool
// ---------------------------------------------------------------------------

/// Outcome of `pick_sticky`: either a usable account, or a wait hint.
#[derive(Debug, Clone)]
pub enum Pick {
    /// Use this account immediately.
    Account(Account),
    /// No account is currently usable; sleep this many ms and retry.
    Wait(u64),
}

pub struct AccountPool {
    state: RwLock<AccountConfig>,
    path: Option<PathBuf>,
}

impl AccountPool {
    /// Construct an empty in-memory pool (mainly for tests).
    pub fn new_in_memory(accounts: Vec<Account>) -> Self {
        Self {
            state: RwLock::new(AccountConfig {
                accounts,
                active_index: 0,
                settings: PoolSettings::default(),
            }),
            path: None,
        }
    }

    /// Load from `path`. If the file is absent, start with an empty pool --
    /// the single-account database fallback named in the spec is the
    /// collaborator's job (reading from its own SQLite file) and is invoked
    /// by the collaborator calling `new_in_memory` with that account.
    pub async fn initialize(path: PathBuf) -> Result<Self> {
        let mut config = persist::load(&path)
            .await
            .map_err(|e| PoolError::Persist(e.to_string()))?;

        if config.active_index >= config.accounts.len() {
            config.active_index = 0;
        }
        for account in &mut config.accounts {
            // Every account gets one fresh chance to refresh on load.
            account.is_invalid = false;
            account.invalid_reason = None;
            account.invalid_at = None;
            account.clear_expired();
        }

        info!(accounts = config.accounts.len(), "account pool initialized");

        Ok(Self {
            state: RwLock::new(config),
            path: Some(path),
        })
    }

    async fn save(&self) {
        if let Some(path) = &self.path {
            let snapshot = self.state.read().await.clone();
            if let Err(e) = persist::save(path, &snapshot).await {
                warn!(error = %e, "failed to persist account pool");
            }
        }
    }

    /// Sticky-then-failover selection, per spec §4.1.
    pub async fn pick_sticky(&self, model: &str) -> Result<Pick> {
        let mut state = self.state.write().await;
        if state.accounts.is_empty() {
            return Err(PoolError::NoAccounts);
        }

        let now = now_ms();
        for account in &mut state.accounts {
            account.clear_expired();
        }

        let len = state.accounts.len();
        let idx = state.active_index.min(len - 1);

        if state.accounts[idx].is_usable_for(model) {
            state.accounts[idx].last_used = Some(now);
            let account = state.accounts[idx].clone();
            drop(state);
            self.save().await;
            return Ok(Pick::Account(account));
        }

        // Round-robin scan for another usable account.
        for step in 1..len {
            let candidate = (idx + step) % len;
            if state.accounts[candidate].is_usable_for(model) {
                state.active_index = candidate;
                state.accounts[candidate].last_used = Some(now);
                let account = state.accounts[candidate].clone();
                debug!(email = %account.email, "pool: advanced sticky account");
                drop(state);
                self.save().await;
                return Ok(Pick::Account(account));
            }
        }

        // Nobody usable. Would the sticky account free up soon?
        if let Some(wait) = state.accounts[idx]
            .model_rate_limits
            .get(model)
            .and_then(|s| s.reset_time)
            .map(|reset| reset.saturating_sub(now))
        {
            if wait <= state.settings.max_wait_before_error_ms {
                return Ok(Pick::Wait(wait));
            }
        }

        // Otherwise advance anyway (even though also unusable) so callers
        // observe rotation; the dispatcher surfaces the wait-for-all error.
        let next = if len > 1 { (idx + 1) % len } else { idx };
        state.active_index = next;
        let account = state.accounts[next].clone();
        Ok(Pick::Account(account))
    }

    /// Explicit failover: advance past the current sticky account.
    pub async fn pick_next(&self, model: &str) -> Option<Account> {
        let mut state = self.state.write().await;
        let len = state.accounts.len();
        if len == 0 {
            return None;
        }
        let idx = state.active_index.min(len - 1);
        for step in 1..=len {
            let candidate = (idx + step) % len;
            if state.accounts[candidate].is_usable_for(model) {
                state.active_index = candidate;
                state.accounts[candidate].last_used = Some(now_ms());
                return Some(state.accounts[candidate].clone());
            }
        }
        None
    }

    pub async fn mark_rate_limited(&self, email: &str, reset_ms: Option<u64>, model: &str) {
        let mut state = self.state.write().await;
        let cooldown = state.settings.cooldown_duration_ms;
        if let Some(account) = state.accounts.iter_mut().find(|a| a.email == email) {
            account.mark_rate_limited(model, reset_ms, cooldown);
            warn!(email, model, "account rate-limited");
        }
        drop(state);
        self.save().await;
    }

    pub async fn mark_invalid(&self, email: &str, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.state.write().await;
        if let Some(account) = state.accounts.iter_mut().find(|a| a.email == email) {
            account.mark_invalid(reason.clone());
            warn!(email, reason = %reason, "account marked invalid");
        }
        drop(state);
        self.save().await;
    }

    pub async fn is_all_rate_limited(&self, model: &str) -> bool {
        if model.is_empty() {
            return false;
        }
        let state = self.state.read().await;
        if state.accounts.is_empty() {
            return false;
        }
        let now = now_ms();
        state.accounts.iter().all(|a| {
            a.is_invalid
                || a.model_rate_limits
                    .get(model)
                    .map(|s| s.is_active(now))
                    .unwrap_or(false)
        })
    }

    pub async fn get_min_wait_time_ms(&self, model: &str) -> Option<u64> {
        let state = self.state.read().await;
        let now = now_ms();
        state
            .accounts
            .iter()
            .filter_map(|a| a.model_rate_limits.get(model))
            .filter_map(|s| s.reset_time)
            .filter(|t| *t > now)
            .map(|t| t - now)
            .min()
    }

    pub async fn accounts(&self) -> Vec<Account> {
        self.state.read().await.accounts.clone()
    }
}
