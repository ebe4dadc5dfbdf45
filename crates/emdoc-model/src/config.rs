use serde::{Deserialize, Serialize};

/// Behaviour switches shared by every association of a schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// When the owner is already persisted, `writer` and `concat` commit
    /// immediately. When `false`, they only stage changes and the owner's
    /// next save commits them.
    pub commit_on_assign: bool,
    /// Maximum number of entries a [`CollectionView`](crate::CollectionView)
    /// prints in its `Debug` output before eliding the rest.
    pub inspect_limit: usize,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            commit_on_assign: true,
            inspect_limit: 10,
        }
    }
}

impl EmbedConfig {
    /// A configuration that never commits on assignment.
    pub fn staged() -> Self {
        Self {
            commit_on_assign: false,
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
