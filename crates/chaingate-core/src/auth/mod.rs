//! Startup API-key issuance.
//!
//! When rate limiting is enabled the gateway mints a fixed batch of keys at
//! startup, writes them to a flat file for the operator, and keeps the set in
//! memory. The set is written once and read lock-free afterwards.

use std::{collections::HashSet, io::Write, path::Path};

use thiserror::Error;

/// Keys minted at startup.
pub const GENERATED_KEY_COUNT: usize = 10;

/// Key length in characters: the first half of a hex-encoded UUID.
pub const KEY_LENGTH: usize = 16;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("key file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Immutable set of valid API keys.
#[derive(Debug, Default)]
pub struct ApiKeySet {
    keys: HashSet<String>,
}

impl ApiKeySet {
    #[must_use]
    pub fn from_keys(keys: impl IntoIterator<Item = String>) -> Self {
        Self { keys: keys.into_iter().collect() }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Mints `count` keys: hex of a fresh UUID, first [`KEY_LENGTH`] characters.
#[must_use]
pub fn generate_keys(count: usize) -> Vec<String> {
    (0..count)
        .map(|_| {
            let hex = uuid::Uuid::new_v4().simple().to_string();
            hex[..KEY_LENGTH].to_string()
        })
        .collect()
}

/// Generates the startup key batch and writes it to `path`, one key per line.
/// Missing parent directories are created.
///
/// # Errors
///
/// Returns an error when the file or its directory cannot be written.
pub fn generate_and_store(path: impl AsRef<Path>) -> Result<ApiKeySet, AuthError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let keys = generate_keys(GENERATED_KEY_COUNT);
    let mut file = std::fs::File::create(path)?;
    for key in &keys {
        writeln!(file, "{key}")?;
    }

    tracing::info!(count = keys.len(), path = %path.display(), "API keys generated");

    Ok(ApiKeySet::from_keys(keys))
}
