//! Mapping from logical keys to store keys.

use crate::config::CacheConfig;

/// Namespacing rules for data and lock keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
    lock_suffix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>, lock_suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            lock_suffix: lock_suffix.into(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.key_prefix.clone(), config.lock_suffix.clone())
    }

    /// `prefix + key`
    pub fn data_key(&self, key: &str) -> String {
        let mut out = String::with_capacity(self.prefix.len() + key.len());
        out.push_str(&self.prefix);
        out.push_str(key);
        out
    }

    /// `prefix + key + lock_suffix`
    pub fn lock_key(&self, key: &str) -> String {
        let mut out = self.data_key(key);
        out.push_str(&self.lock_suffix);
        out
    }
}
