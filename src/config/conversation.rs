//! Conversation policy configuration

use serde::Deserialize;

use super::error::ValidationError;
use crate::application::conversation::ConversationSettings;
use crate::domain::conversation::BOE_REQUIRED_FIELDS;
use crate::domain::session::ConfidenceBands;

/// Which fields to collect and how much to trust extracted values
///
/// `PROPOSALOS__CONVERSATION__REQUIRED_FIELDS` takes a comma-separated list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub required_fields: Vec<String>,
    /// Extracted values at or above this confidence fill a field
    pub confirmation_threshold: f64,
    /// Extracted values below this confidence are dropped
    pub discard_threshold: f64,
    /// Past turns passed to the extractor
    pub history_window: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            required_fields: BOE_REQUIRED_FIELDS.iter().map(|f| f.to_string()).collect(),
            confirmation_threshold: 0.7,
            discard_threshold: 0.3,
            history_window: 10,
        }
    }
}

impl ConversationConfig {
    pub fn bands(&self) -> Result<ConfidenceBands, ValidationError> {
        ConfidenceBands::new(self.confirmation_threshold, self.discard_threshold)
            .map_err(ValidationError::setting("conversation"))
    }

    /// Dialogue settings for sessions that live `session_ttl_seconds`.
    pub fn settings(&self, session_ttl_seconds: u64) -> Result<ConversationSettings, ValidationError> {
        Ok(ConversationSettings {
            required_fields: self.required_fields(),
            bands: self.bands()?,
            history_window: self.history_window,
            session_ttl_seconds,
        })
    }

    /// Trimmed, de-duplicated field names in configured order.
    fn required_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::with_capacity(self.required_fields.len());
        for field in self.required_fields.iter().map(|f| f.trim()) {
            if !field.is_empty() && !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }
        fields
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.required_fields().is_empty() {
            return Err(ValidationError::NoRequiredFields);
        }
        self.bands()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_require_the_boe_catalog() {
        let config = ConversationConfig::default();
        let settings = config.settings(3600).unwrap();
        assert_eq!(settings.required_fields.len(), BOE_REQUIRED_FIELDS.len());
        assert_eq!(settings.bands, ConfidenceBands::default());
        assert_eq!(settings.session_ttl_seconds, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn required_fields_are_trimmed_and_deduplicated() {
        let config = ConversationConfig {
            required_fields: vec![
                " origin_city".to_string(),
                "origin_city".to_string(),
                String::new(),
                "trip_purpose".to_string(),
            ],
            ..Default::default()
        };
        let settings = config.settings(60).unwrap();
        assert_eq!(settings.required_fields, vec!["origin_city", "trip_purpose"]);
    }

    #[test]
    fn empty_required_fields_are_rejected() {
        let config = ConversationConfig {
            required_fields: vec![" ".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::NoRequiredFields)
        ));
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let config = ConversationConfig {
            confirmation_threshold: 0.3,
            discard_threshold: 0.7,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidSetting { section: "conversation", .. })
        ));
    }
}
