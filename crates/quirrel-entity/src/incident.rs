//! Incident report shape.

use serde::{Deserialize, Serialize};

use super::job::dto::JobDto;

/// Report of an unrecoverable (or retry-exhausted) delivery failure,
/// forwarded to the configured incident receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentReport {
    /// Always `"incident"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The failing job at the time of the final attempt.
    pub job: JobDto,
    /// The failing response.
    pub incident: IncidentDetail,
}

/// The response that made the delivery unrecoverable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentDetail {
    /// HTTP status of the final attempt; `0` for transport failures.
    pub status: u16,
    /// Response body (or client error text).
    pub body: String,
}

impl IncidentReport {
    /// Build a report for a failing job.
    pub fn new(job: JobDto, status: u16, body: impl Into<String>) -> Self {
        Self {
            kind: "incident".to_string(),
            job,
            incident: IncidentDetail {
                status,
                body: body.into(),
            },
        }
    }
}
