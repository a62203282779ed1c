use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use taskweave_core::Usage;

/// Collapses runs of whitespace during content normalization.
#[allow(clippy::expect_used)]
fn whitespace_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\s+").expect("static regex"))
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: String,
    usage: Usage,
    inserted_at: Instant,
}

/// A cached result served on a dedupe hit.
#[derive(Debug, Clone)]
pub struct CachedResult {
    /// The previously computed result text.
    pub result: String,
    /// Usage recorded when the result was first computed.
    pub usage: Usage,
}

/// Content-addressed dedupe cache bounding redundant provider calls
/// within a TTL window.
///
/// Keys derive from task type, assigned executor, and normalized content;
/// expired entries are dropped lazily on access.
pub struct ResultCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    /// Create a cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Compute the content-derived cache key: SHA-256 over
    /// `type + executor + normalized content`. Normalization lowercases
    /// and collapses whitespace; metadata is deliberately excluded.
    pub fn key(task_type: &str, executor: &str, content: &str) -> String {
        let normalized = whitespace_re()
            .replace_all(content.trim(), " ")
            .to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(task_type.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(executor.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(normalized.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Look up a key, dropping it first if expired.
    pub fn get(&self, key: &str) -> Option<CachedResult> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            if entry.inserted_at.elapsed() >= self.ttl {
                entries.remove(key);
                return None;
            }
            return Some(CachedResult {
                result: entry.result.clone(),
                usage: entry.usage,
            });
        }
        None
    }

    /// Store a result under a key, refreshing its TTL.
    pub fn insert(&self, key: String, result: String, usage: Usage) {
        self.entries.lock().insert(
            key,
            CacheEntry {
                result,
                usage,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries
            .lock()
            .retain(|_, e| e.inserted_at.elapsed() < ttl);
    }

    /// Live entry count (including not-yet-purged expired entries).
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
