//! Activity event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle transition kinds published on the activity stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    /// A job was created and indexed for future execution.
    Scheduled,
    /// A claimed job began dispatching.
    Started,
    /// A job was manually forced to execute now.
    Invoked,
    /// A job was moved to a later due time (repetition or retry).
    Rescheduled,
    /// A dispatch attempt succeeded.
    Completed,
    /// A job was removed.
    Deleted,
}

impl ActivityKind {
    /// Wire name of the event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Started => "started",
            Self::Invoked => "invoked",
            Self::Rescheduled => "rescheduled",
            Self::Completed => "completed",
            Self::Deleted => "deleted",
        }
    }
}

/// One activity event: a lifecycle transition plus a queue-scoped job
/// reference (or full job description for `scheduled`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// The lifecycle transition.
    pub kind: ActivityKind,
    /// Event payload: a job DTO or a `{endpoint, id}` reference.
    pub payload: serde_json::Value,
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
}

impl ActivityEvent {
    /// Create a new activity event stamped with the current time.
    pub fn new(kind: ActivityKind, payload: serde_json::Value) -> Self {
        Self {
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Wire form pushed to subscribers: a JSON `[type, payload]` tuple.
    pub fn to_wire(&self) -> String {
        serde_json::json!([self.kind.as_str(), self.payload]).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tuple_shape() {
        let event = ActivityEvent::new(
            ActivityKind::Completed,
            serde_json::json!({"endpoint": "https://example.com", "id": "j1"}),
        );
        let wire: serde_json::Value = serde_json::from_str(&event.to_wire()).unwrap();
        assert_eq!(wire[0], "completed");
        assert_eq!(wire[1]["id"], "j1");
    }
}
