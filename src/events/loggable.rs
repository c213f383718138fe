use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity levels for activity log entries, used by retention policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Long-term retention, never auto-deleted
    Critical,
    /// Medium-term retention (default)
    Important,
    /// Aggressively trimmed
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Important
    }
}

/// Trait for entities that appear in the activity log.
pub trait Loggable: Serialize + Send + Sync {
    /// Entity type name ("project", "store", ...), the prefix in event
    /// names like "project.shared".
    fn entity_type() -> &'static str;

    /// Usually the entity's primary key.
    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    /// Deletions and permission changes are always kept.
    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "shared" => Severity::Critical,
            "created" | "updated" => self.severity(),
            _ => Severity::Important,
        }
    }
}
