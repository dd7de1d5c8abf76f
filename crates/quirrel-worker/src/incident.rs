//! Incident forwarding.

use reqwest::Client;
use tracing::{debug, warn};

use quirrel_core::config::worker::IncidentReceiverConfig;
use quirrel_core::error::AppError;
use quirrel_core::result::AppResult;
use quirrel_entity::IncidentReport;

/// Forwards unrecoverable delivery failures to the configured
/// incident receiver, authenticated with a shared passphrase.
///
/// Reporting is fire-and-forget: an unreachable receiver is logged and
/// swallowed, and never affects the failing job's own outcome.
#[derive(Debug, Clone)]
pub struct IncidentReporter {
    http: Client,
    endpoint: String,
    passphrase: String,
}

impl IncidentReporter {
    /// Create a reporter from configuration.
    pub fn new(config: &IncidentReceiverConfig) -> AppResult<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| AppError::internal(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            passphrase: config.passphrase.clone(),
        })
    }

    /// Forward one report in the background.
    pub fn report(&self, report: IncidentReport) {
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        let passphrase = self.passphrase.clone();

        tokio::spawn(async move {
            let result = http
                .post(&endpoint)
                .bearer_auth(&passphrase)
                .json(&report)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    debug!(
                        endpoint = %report.job.endpoint,
                        id = %report.job.id,
                        status = report.incident.status,
                        "Forwarded incident"
                    );
                }
                Ok(response) => {
                    warn!(
                        receiver = %endpoint,
                        status = response.status().as_u16(),
                        "Incident receiver rejected report"
                    );
                }
                Err(e) => {
                    warn!(receiver = %endpoint, error = %e, "Incident receiver unreachable");
                }
            }
        });
    }
}
