use scrollgate_protocol::Threshold;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of journal entries kept before the oldest are dropped.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 256;

/// Page-level settings for the scroll lock.
///
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScrollLockConfig {
    /// Visible-area fraction at which a section counts as in view.
    pub threshold: f64,
    /// Registry journal capacity. `0` disables the journal.
    pub journal_capacity: usize,
    pub suppression: SuppressionStyle,
}

/// The style declaration a DOM host toggles on the page body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SuppressionStyle {
    pub property: String,
    pub value: String,
}

impl Default for SuppressionStyle {
    fn default() -> Self {
        Self {
            property: "overflow".to_string(),
            value: "hidden".to_string(),
        }
    }
}

impl Default for ScrollLockConfig {
    fn default() -> Self {
        Self {
            threshold: Threshold::HALF.fraction(),
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
            suppression: SuppressionStyle::default(),
        }
    }
}

impl ScrollLockConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(data: &[u8]) -> Result<Self, ConfigError> {
        let config: ScrollLockConfig = serde_json::from_slice(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.try_threshold()?;
        if self.suppression.property.trim().is_empty() {
            return Err(ConfigError::EmptySuppressionProperty);
        }
        Ok(())
    }

    /// The validated threshold, or the default one if the field was
    /// corrupted after validation.
    pub fn threshold(&self) -> Threshold {
        self.try_threshold().unwrap_or_default()
    }

    fn try_threshold(&self) -> Result<Threshold, ConfigError> {
        Threshold::new(self.threshold).ok_or(ConfigError::InvalidThreshold(self.threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let config = ScrollLockConfig::from_json(b"{}").expect("empty object is valid");
        assert_eq!(config, ScrollLockConfig::default());
        assert_eq!(config.threshold(), Threshold::HALF);
        assert_eq!(config.suppression.property, "overflow");
        assert_eq!(config.suppression.value, "hidden");
    }

    #[test]
    fn partial_override() {
        let config = ScrollLockConfig::from_json(br#"{"threshold":0.8,"journal_capacity":4}"#)
            .expect("partial config is valid");
        assert!((config.threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.journal_capacity, 4);
        assert_eq!(config.suppression, SuppressionStyle::default());
    }

    #[test]
    fn rejects_bad_threshold() {
        let err = ScrollLockConfig::from_json(br#"{"threshold":1.5}"#);
        assert!(matches!(err, Err(ConfigError::InvalidThreshold(t)) if t > 1.0));
        let err = ScrollLockConfig::from_json(br#"{"threshold":0}"#);
        assert!(matches!(err, Err(ConfigError::InvalidThreshold(_))));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_json() {
        assert!(matches!(
            ScrollLockConfig::from_json(br#"{"treshold":0.5}"#),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            ScrollLockConfig::from_json(b"not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn rejects_empty_property() {
        let err = ScrollLockConfig::from_json(br#"{"suppression":{"property":"  "}}"#);
        assert!(matches!(err, Err(ConfigError::EmptySuppressionProperty)));
    }
}
