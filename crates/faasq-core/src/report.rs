//! Outcome record emitted once a queued invocation has run.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Summary of one async invocation, sent back out-of-band by the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncReport {
    #[serde(rename = "namespace")]
    pub function_namespace: String,
    #[serde(rename = "name")]
    pub function_name: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// Processing time in seconds.
    #[serde(rename = "timeTaken")]
    pub time_taken: f64,
}

impl AsyncReport {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        status_code: u16,
        elapsed: Duration,
    ) -> Self {
        Self {
            function_namespace: namespace.into(),
            function_name: name.into(),
            status_code,
            time_taken: elapsed.as_secs_f64(),
        }
    }

    /// Processing time, clamped to zero for negative or non-finite values.
    pub fn elapsed(&self) -> Duration {
        Duration::try_from_secs_f64(self.time_taken).unwrap_or_default()
    }

    /// Whether the function answered with a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }
}
