//! Signature cache for thinking block continuity.
//!
//! Gemini 3+ models require `thoughtSignature` on tool calls and thinking
//! blocks for multi-turn conversations. Clients commonly strip non-standard
//! fields from content blocks before sending them back, so this cache keeps
//! the last signature seen for a given tool_use_id or thinking text and lets
//! the translator restore it on the next turn.
//!
//! The cache also tracks which model family produced a signature, since a
//! signature minted by Claude is not valid to replay against Gemini.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::dispatch::constants::{
    ModelFamily, GEMINI_SKIP_SIGNATURE, MIN_SIGNATURE_LENGTH, SIGNATURE_CACHE_TTL,
};

/// Sentinel value telling Gemini to skip signature validation when no
/// signature could be recovered.
pub const SKIP_SIGNATURE_SENTINEL: &str = GEMINI_SKIP_SIGNATURE;

const MAX_CACHE_ENTRIES: usize = 1000;

#[derive(Debug, Clone)]
struct CacheEntry {
    signature: String,
    model_family: ModelFamily,
    created_at: Instant,
}

impl CacheEntry {
    fn new(signature: String, model_family: ModelFamily) -> Self {
        Self {
            signature,
            model_family,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Thread-safe cache for thinking signatures.
///
/// Stores two independent maps: `tool_use_id -> signature` for function-call
/// continuity, and a truncated-thinking-text key -> signature for
/// cross-model compatibility checks. Both use TTL expiry plus oldest-first
/// eviction once full.
#[derive(Debug)]
pub struct SignatureCache {
    tool_signatures: RwLock<HashMap<String, CacheEntry>>,
    thinking_signatures: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl SignatureCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tool_signatures: RwLock::new(HashMap::new()),
            thinking_signatures: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(SIGNATURE_CACHE_TTL)
    }

    pub fn store_tool_signature(
        &self,
        tool_use_id: impl Into<String>,
        signature: impl Into<String>,
        model_family: ModelFamily,
    ) {
        let tool_use_id = tool_use_id.into();
        let signature = signature.into();

        if tool_use_id.is_empty() || signature.is_empty() {
            return;
        }

        let mut cache = self.tool_signatures.write().unwrap();

        if cache.len() >= MAX_CACHE_ENTRIES {
            self.evict_expired(&mut cache);
        }
        if cache.len() >= MAX_CACHE_ENTRIES {
            self.evict_oldest(&mut cache, MAX_CACHE_ENTRIES / 4);
        }

        cache.insert(tool_use_id, CacheEntry::new(signature, model_family));
    }

    pub fn get_tool_signature(&self, tool_use_id: &str) -> Option<String> {
        if tool_use_id.is_empty() {
            return None;
        }

        let cache = self.tool_signatures.read().unwrap();
        cache.get(tool_use_id).and_then(|entry| {
            if entry.is_expired(self.ttl) {
                None
            } else {
                Some(entry.signature.clone())
            }
        })
    }

    pub fn get_tool_signature_or_sentinel(&self, tool_use_id: &str) -> String {
        self.get_tool_signature(tool_use_id)
            .unwrap_or_else(|| SKIP_SIGNATURE_SENTINEL.to_string())
    }

    pub fn store_thinking_signature(
        &self,
        thinking_text: &str,
        signature: impl Into<String>,
        model_family: ModelFamily,
    ) {
        let signature = signature.into();

        if signature.len() < MIN_SIGNATURE_LENGTH {
            return;
        }

        let key = Self::thinking_cache_key(thinking_text);
        if key.is_empty() {
            return;
        }

        let mut cache = self.thinking_signatures.write().unwrap();

        if cache.len() >= MAX_CACHE_ENTRIES {
            self.evict_expired(&mut cache);
        }
        if cache.len() >= MAX_CACHE_ENTRIES {
            self.evict_oldest(&mut cache, MAX_CACHE_ENTRIES / 4);
        }

        cache.insert(key, CacheEntry::new(signature, model_family));
    }

    pub fn get_thinking_signature(&self, thinking_text: &str) -> Option<String> {
        let key = Self::thinking_cache_key(thinking_text);
        if key.is_empty() {
            return None;
        }

        let cache = self.thinking_signatures.read().unwrap();
        cache.get(&key).and_then(|entry| {
            if entry.is_expired(self.ttl) {
                None
            } else {
                Some(entry.signature.clone())
            }
        })
    }

    /// Look up which model family minted a given signature value, by
    /// scanning the thinking-signature cache. Used for cross-model
    /// compatibility checks, not for normal lookups.
    pub fn get_thinking_signature_family(&self, signature: &str) -> Option<ModelFamily> {
        if signature.len() < MIN_SIGNATURE_LENGTH {
            return None;
        }

        let cache = self.thinking_signatures.read().unwrap();
        for entry in cache.values() {
            if entry.signature == signature && !entry.is_expired(self.ttl) {
                return Some(entry.model_family);
            }
        }
        None
    }

    /// Claude validates its own signatures so any origin is accepted when
    /// targeting Claude. Gemini is strict: an unknown or cross-family
    /// signature is rejected.
    pub fn is_signature_compatible(&self, signature: &str, target_family: ModelFamily) -> bool {
        if target_family == ModelFamily::Claude {
            return true;
        }

        match self.get_thinking_signature_family(signature) {
            Some(sig_family) => sig_family == target_family,
            None => false,
        }
    }

    pub fn clear_tool_signatures(&self) {
        self.tool_signatures.write().unwrap().clear();
    }

    pub fn clear_thinking_signatures(&self) {
        self.thinking_signatures.write().unwrap().clear();
    }

    pub fn clear_all(&self) {
        self.clear_tool_signatures();
        self.clear_thinking_signatures();
    }

    pub fn tool_signature_count(&self) -> usize {
        self.tool_signatures.read().unwrap().len()
    }

    pub fn thinking_signature_count(&self) -> usize {
        self.thinking_signatures.read().unwrap().len()
    }

    fn thinking_cache_key(thinking_text: &str) -> String {
        let chars: String = thinking_text.chars().take(100).collect();
        chars.trim().to_string()
    }

    fn evict_expired(&self, cache: &mut HashMap<String, CacheEntry>) {
        cache.retain(|_, entry| !entry.is_expired(self.ttl));
    }

    fn evict_oldest(&self, cache: &mut HashMap<String, CacheEntry>, count: usize) {
        if cache.is_empty() || count == 0 {
            return;
        }

        let mut entries: Vec<_> = cache.iter().map(|(k, v)| (k.clone(), v.created_at)).collect();
        entries.sort_by_key(|(_, created)| *created);

        for (key, _) in entries.into_iter().take(count) {
            cache.remove(&key);
        }
    }
}

impl Default for SignatureCache {
    fn default() -> Self {
        Self::with_default_ttl()
    }
}

/// Process-wide cache shared by the request/response translators.
pub static GLOBAL_SIGNATURE_CACHE: std::sync::LazyLock<SignatureCache> =
    std::sync::LazyLock::new(SignatureCache::default);
