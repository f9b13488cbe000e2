use serde::{Deserialize, Serialize};

use crate::Ref;

/// Tuning for a [`Store`](crate::Store) and its [`TripleIndex`](crate::TripleIndex).
///
/// Deserializes with every field optional; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Halve container capacity on `pop` once half of it suffices.
    pub shrink_on_remove: bool,
    /// Initial `next_ref` of a new store.
    pub first_ref: Ref,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shrink_on_remove: true,
            first_ref: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert!(config.shrink_on_remove);
        assert_eq!(config.first_ref, 1);
    }

    #[test]
    fn test_partial_json() {
        let config: StoreConfig = serde_json::from_str(r#"{"first_ref": 100}"#).unwrap();
        assert_eq!(config.first_ref, 100);
        assert!(config.shrink_on_remove);
    }

    #[test]
    fn test_json_round_trip() {
        let config = StoreConfig {
            shrink_on_remove: false,
            first_ref: -5,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: StoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_unknown_field_ignored() {
        let config: StoreConfig = serde_json::from_str(r#"{"shrink_on_remove": false, "extra": 1}"#).unwrap();
        assert!(!config.shrink_on_remove);
    }
}
