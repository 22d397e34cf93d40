use std::sync::Arc;

use serde::Serialize;

use crate::common::errors::PlayerError;

/// Opaque, validated pointer to a playable resource (usually a URL).
///
/// Cloning is cheap and the value never changes once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TrackRef(Arc<str>);

impl TrackRef {
    /// Trims `raw` and accepts it only if `check` does.
    pub fn parse_with<F>(raw: &str, check: F) -> Result<Self, PlayerError>
    where
        F: FnOnce(&str) -> bool,
    {
        let trimmed = raw.trim();
        if trimmed.is_empty() || !check(trimmed) {
            return Err(PlayerError::InvalidReference(raw.to_string()));
        }
        Ok(Self(Arc::from(trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TrackRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TrackRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for TrackRef {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for TrackRef {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}
