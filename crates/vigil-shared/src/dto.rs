//! Data Transfer Objects - request/response types for the scan API.

use serde::{Deserialize, Serialize};

/// Request to start a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitScanRequest {
    /// Model or endpoint the scanner should exercise.
    pub target: String,
    /// Probe names to run; the scanner's defaults when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probes: Option<Vec<String>>,
}

/// Response to an accepted scan submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanAccepted {
    pub job_id: String,
    pub status: String,
}

/// Current state of a scan job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStatusResponse {
    pub job_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub report_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}
