//! Policy Registry
//!
//! Immutable table mapping policy names and key patterns to a `CachePolicy`.
//! Resolution order is explicit name, then longest literal prefix among the
//! registered patterns, then the default policy.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CacheError, Result};

/// Name of the built-in fallback policy.
pub const DEFAULT_POLICY_NAME: &str = "default";

/// TTL of the built-in fallback policy, in seconds.
pub const DEFAULT_TTL_SECONDS: u64 = 3600;

/// Longest TTL any entry is stored with (one year).
pub const MAX_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

// == Serialization Format ==
/// Wire format used to encode values in L2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// serde_json
    #[default]
    Json,
    /// MessagePack with named fields
    Binary,
}

// == Cache Policy ==
/// Caching behaviour for one class of keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub name: String,
    pub ttl_seconds: u64,
    /// Encoded entries larger than this are served from L2 only
    #[serde(default)]
    pub max_entry_bytes: Option<usize>,
    #[serde(default)]
    pub compression_enabled: bool,
    #[serde(default)]
    pub serialization_format: SerializationFormat,
    #[serde(default)]
    pub invalidation_tags: BTreeSet<String>,
}

impl CachePolicy {
    /// Creates a JSON, uncompressed, untagged policy.
    pub fn new(name: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            name: name.into(),
            ttl_seconds,
            max_entry_bytes: None,
            compression_enabled: false,
            serialization_format: SerializationFormat::Json,
            invalidation_tags: BTreeSet::new(),
        }
    }

    pub fn with_max_entry_bytes(mut self, bytes: usize) -> Self {
        self.max_entry_bytes = Some(bytes);
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression_enabled = enabled;
        self
    }

    pub fn with_format(mut self, format: SerializationFormat) -> Self {
        self.serialization_format = format;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.invalidation_tags.insert(tag.into());
        self
    }

    /// TTL to store with: `requested` if given, else the policy's, capped at
    /// [`MAX_TTL_SECONDS`].
    pub fn effective_ttl(&self, requested: Option<u64>) -> u64 {
        requested.unwrap_or(self.ttl_seconds).min(MAX_TTL_SECONDS)
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLICY_NAME, DEFAULT_TTL_SECONDS)
    }
}

// == Policy Table ==
/// On-disk shape of a policy table.
///
/// ```json
/// {
///   "default_ttl": 3600,
///   "policies": [{ "name": "user_profile", "ttl_seconds": 1800 }],
///   "patterns": { "user_profile:*": "user_profile" }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyTable {
    #[serde(default)]
    pub default_ttl: Option<u64>,
    #[serde(default)]
    pub policies: Vec<CachePolicy>,
    #[serde(default)]
    pub patterns: HashMap<String, String>,
}

// == Policy Registry ==
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    named: HashMap<String, CachePolicy>,
    /// (literal prefix, policy name), longest prefix first
    prefixes: Vec<(String, String)>,
    default: CachePolicy,
}

impl PolicyRegistry {
    pub fn builder() -> PolicyRegistryBuilder {
        PolicyRegistryBuilder::default()
    }

    /// Registry holding only the default policy.
    pub fn empty() -> Self {
        Self::builder().build()
    }

    /// Resolves the effective policy for `key`.
    ///
    /// An unknown explicit name is logged and ignored; resolution then
    /// continues with the key patterns.
    pub fn resolve(&self, key: &str, explicit: Option<&str>) -> &CachePolicy {
        if let Some(name) = explicit {
            match self.named.get(name) {
                Some(policy) => return policy,
                None => warn!(policy = %name, key = %key, "unknown cache policy, falling back"),
            }
        }

        self.prefixes
            .iter()
            .find(|(prefix, _)| key.starts_with(prefix.as_str()))
            .and_then(|(_, name)| self.named.get(name))
            .unwrap_or(&self.default)
    }

    /// Looks up a policy by exact name.
    pub fn get(&self, name: &str) -> Option<&CachePolicy> {
        self.named.get(name)
    }

    /// Builds a registry from a parsed policy table.
    pub fn from_table(table: PolicyTable) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(ttl) = table.default_ttl {
            builder = builder.default_policy(CachePolicy::new(DEFAULT_POLICY_NAME, ttl));
        }
        for policy in table.policies {
            builder = builder.policy(policy);
        }
        for (pattern, name) in table.patterns {
            builder = builder.pattern(pattern, name);
        }
        builder.try_build()
    }

    /// Reads and parses a JSON policy table from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CacheError::InvalidRequest(format!("cannot read policy file: {e}")))?;
        let table: PolicyTable = serde_json::from_str(&raw)
            .map_err(|e| CacheError::InvalidRequest(format!("invalid policy file: {e}")))?;
        Self::from_table(table)
    }

    /// Policies used by the hosting platform's services.
    pub fn platform_defaults(default_ttl: u64) -> Self {
        Self::builder()
            .default_policy(CachePolicy::new(DEFAULT_POLICY_NAME, default_ttl))
            .policy(
                CachePolicy::new("user_profile", 1800)
                    .with_max_entry_bytes(64 * 1024)
                    .with_tag("profiles"),
            )
            .policy(
                CachePolicy::new("match_scores", 600)
                    .with_compression(true)
                    .with_format(SerializationFormat::Binary)
                    .with_max_entry_bytes(256 * 1024)
                    .with_tag("matching"),
            )
            .policy(
                CachePolicy::new("analytics", 3600)
                    .with_compression(true)
                    .with_format(SerializationFormat::Binary)
                    .with_max_entry_bytes(16 * 1024)
                    .with_tag("analytics"),
            )
            .policy(CachePolicy::new("moderation", 300).with_tag("moderation"))
            .policy(CachePolicy::new("session", 900).with_max_entry_bytes(4 * 1024))
            .pattern("user_profile:*", "user_profile")
            .pattern("match:*", "match_scores")
            .pattern("analytics:*", "analytics")
            .pattern("moderation:*", "moderation")
            .pattern("session:*", "session")
            .build()
    }
}

// == Builder ==
#[derive(Debug, Default)]
pub struct PolicyRegistryBuilder {
    named: HashMap<String, CachePolicy>,
    patterns: Vec<(String, String)>,
    default: Option<CachePolicy>,
}

impl PolicyRegistryBuilder {
    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.named.insert(policy.name.clone(), policy);
        self
    }

    /// Maps a glob-style key pattern to a policy name.
    pub fn pattern(mut self, pattern: impl Into<String>, policy_name: impl Into<String>) -> Self {
        self.patterns.push((pattern.into(), policy_name.into()));
        self
    }

    pub fn default_policy(mut self, policy: CachePolicy) -> Self {
        self.default = Some(policy);
        self
    }

    /// Builds the registry, failing if a pattern names an unknown policy.
    pub fn try_build(self) -> Result<PolicyRegistry> {
        if let Some((pattern, name)) = self
            .patterns
            .iter()
            .find(|(_, name)| !self.named.contains_key(name))
        {
            return Err(CacheError::InvalidRequest(format!(
                "pattern '{pattern}' refers to unknown policy '{name}'"
            )));
        }
        Ok(self.build())
    }

    /// Builds the registry, dropping patterns that name unknown policies.
    pub fn build(self) -> PolicyRegistry {
        let mut prefixes: Vec<(String, String)> = self
            .patterns
            .into_iter()
            .filter(|(pattern, name)| {
                let known = self.named.contains_key(name);
                if !known {
                    warn!(pattern = %pattern, policy = %name, "pattern refers to unknown policy");
                }
                known
            })
            .map(|(pattern, name)| (literal_prefix(&pattern).to_string(), name))
            .collect();
        // Longest prefix wins; ties broken by name so resolution is deterministic.
        prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.1.cmp(&b.1)));

        PolicyRegistry {
            named: self.named,
            prefixes,
            default: self.default.unwrap_or_default(),
        }
    }
}

/// Text before the first glob metacharacter.
pub fn literal_prefix(pattern: &str) -> &str {
    match pattern.find(['*', '?', '[']) {
        Some(idx) => &pattern[..idx],
        None => pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PolicyRegistry {
        PolicyRegistry::builder()
            .policy(CachePolicy::new("user", 100))
            .policy(CachePolicy::new("user_admin", 200))
            .policy(CachePolicy::new("scores", 300).with_compression(true))
            .pattern("user:*", "user")
            .pattern("user:admin:*", "user_admin")
            .pattern("scores:*", "scores")
            .build()
    }

    #[test]
    fn test_literal_prefix() {
        assert_eq!(literal_prefix("user:*"), "user:");
        assert_eq!(literal_prefix("a?b*"), "a");
        assert_eq!(literal_prefix("[ab]c"), "");
        assert_eq!(literal_prefix("plain"), "plain");
    }

    #[test]
    fn test_explicit_name_wins() {
        let reg = registry();
        assert_eq!(reg.resolve("user:1", Some("scores")).name, "scores");
    }

    #[test]
    fn test_unknown_explicit_name_falls_back() {
        let reg = registry();
        assert_eq!(reg.resolve("user:1", Some("nope")).name, "user");
        assert_eq!(reg.resolve("other", Some("nope")).name, DEFAULT_POLICY_NAME);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let reg = registry();
        assert_eq!(reg.resolve("user:42", None).name, "user");
        assert_eq!(reg.resolve("user:admin:7", None).name, "user_admin");
    }

    #[test]
    fn test_default_policy() {
        let reg = registry();
        let policy = reg.resolve("unmatched", None);
        assert_eq!(policy.name, DEFAULT_POLICY_NAME);
        assert_eq!(policy.ttl_seconds, DEFAULT_TTL_SECONDS);
        assert!(!policy.compression_enabled);
        assert_eq!(policy.serialization_format, SerializationFormat::Json);
    }

    #[test]
    fn test_try_build_rejects_dangling_pattern() {
        let result = PolicyRegistry::builder().pattern("x:*", "missing").try_build();
        assert!(matches!(result, Err(CacheError::InvalidRequest(_))));
    }

    #[test]
    fn test_from_table() {
        let table: PolicyTable = serde_json::from_str(
            r#"{
                "default_ttl": 60,
                "policies": [
                    {"name": "p", "ttl_seconds": 5, "serialization_format": "binary",
                     "invalidation_tags": ["t1", "t2"]}
                ],
                "patterns": {"p:*": "p"}
            }"#,
        )
        .unwrap();
        let reg = PolicyRegistry::from_table(table).unwrap();

        let p = reg.resolve("p:1", None);
        assert_eq!(p.ttl_seconds, 5);
        assert_eq!(p.serialization_format, SerializationFormat::Binary);
        assert_eq!(p.invalidation_tags.len(), 2);
        assert_eq!(reg.resolve("q", None).ttl_seconds, 60);
    }

    #[test]
    fn test_platform_defaults_resolve() {
        let reg = PolicyRegistry::platform_defaults(3600);
        assert_eq!(reg.resolve("match:1:2", None).name, "match_scores");
        assert!(reg.resolve("analytics:daily", None).compression_enabled);
        assert!(reg.get("session").is_some());
    }

    #[test]
    fn test_effective_ttl_is_capped() {
        let policy = CachePolicy::new("p", 60);
        assert_eq!(policy.effective_ttl(None), 60);
        assert_eq!(policy.effective_ttl(Some(5)), 5);
        assert_eq!(policy.effective_ttl(Some(u64::MAX)), MAX_TTL_SECONDS);
        assert_eq!(CachePolicy::new("p", u64::MAX).effective_ttl(None), MAX_TTL_SECONDS);
    }
}
