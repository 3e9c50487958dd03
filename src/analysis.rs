//! One-way notification to the post-meeting analysis pipeline.
//!
//! Invoked after a meeting closes when the config flag is set. Strictly
//! fire-and-forget: failures are logged and never affect the close
//! transition, which has already committed by the time this runs.

use log::{error, warn};
use serde::Serialize;
use std::time::Duration;

/// Summary pushed to the analysis pipeline when a meeting closes
#[derive(Debug, Clone, Serialize)]
pub struct MeetingSummary {
    pub uuid: String,
    pub project_key: String,
    pub hub_uuid: String,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub ending_method: Option<String>,
}

/// Post the summary to the analysis endpoint on a background thread
pub fn notify_meeting_complete(analysis_url: String, summary: MeetingSummary) {
    std::thread::spawn(move || {
        let client = match reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to build analysis client: {}", e);
                return;
            }
        };

        match client.post(&analysis_url).json(&summary).send() {
            Ok(response) if response.status().is_success() => {
                println!(
                    "Posted meeting {} to analysis pipeline",
                    summary.uuid
                );
            }
            Ok(response) => {
                warn!(
                    "Analysis pipeline returned {} for meeting {}",
                    response.status(),
                    summary.uuid
                );
            }
            Err(e) => {
                error!(
                    "Failed to notify analysis pipeline for meeting {}: {}",
                    summary.uuid, e
                );
            }
        }
    });
}
