//! Status of the QuarksSecret resource.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Observed state of a QuarksSecret.
///
/// `generated` and `copied` are deliberately tri-state: absent means the work
/// was never attempted, `false` means the resource was explicitly invalidated
/// and must be re-processed, `true` means the work is done.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuarksSecretStatus {
    /// Timestamp of the last reconcile, consulted by the meltdown window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile: Option<String>,
    /// Whether the target secret has been generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<bool>,
    /// Whether the copy destinations have been updated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copied: Option<bool>,
}

/// Tri-state view of a status field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    /// Never attempted.
    Unknown,
    /// Explicitly invalidated, regeneration required.
    Dirty,
    /// Materialized.
    Clean,
}

impl From<Option<bool>> for GenerationState {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => GenerationState::Unknown,
            Some(false) => GenerationState::Dirty,
            Some(true) => GenerationState::Clean,
        }
    }
}

impl QuarksSecretStatus {
    /// State of the target secret generation.
    pub fn generation(&self) -> GenerationState {
        self.generated.into()
    }

    /// State of the copy propagation.
    pub fn copy(&self) -> GenerationState {
        self.copied.into()
    }

    /// Parsed `last_reconcile` timestamp, if present and well formed.
    pub fn last_reconcile_time(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.last_reconcile
            .as_deref()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&chrono::Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tri_state_mapping() {
        let mut status = QuarksSecretStatus::default();
        assert_eq!(status.generation(), GenerationState::Unknown);
        assert_eq!(status.copy(), GenerationState::Unknown);

        status.generated = Some(false);
        assert_eq!(status.generation(), GenerationState::Dirty);

        status.generated = Some(true);
        assert_eq!(status.generation(), GenerationState::Clean);

        status.copied = Some(false);
        assert_eq!(status.copy(), GenerationState::Dirty);
        status.copied = Some(true);
        assert_eq!(status.copy(), GenerationState::Clean);
    }

    #[test]
    fn last_reconcile_parses_rfc3339() {
        let status = QuarksSecretStatus {
            last_reconcile: Some("2024-05-01T10:00:00Z".into()),
            ..Default::default()
        };
        let parsed = status.last_reconcile_time().unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-05-01T10:00:00+00:00");

        let garbage = QuarksSecretStatus {
            last_reconcile: Some("not-a-time".into()),
            ..Default::default()
        };
        assert!(garbage.last_reconcile_time().is_none());
    }
}
