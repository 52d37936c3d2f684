//! Function log query and log line records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Query for the logs of a function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRequest {
    /// Function name. Required.
    pub name: String,
    /// Provider-specific namespace the function is deployed to.
    #[serde(default)]
    pub namespace: String,
    /// Restrict to one container instance.
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Maximum number of lines; zero or negative means unlimited.
    #[serde(default)]
    pub tail: i64,
    /// Keep streaming until the caller's timeout.
    #[serde(default)]
    pub follow: bool,
}

impl LogRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.tail <= 0
    }
}

// Stable rendering: two requests with equal values print identically.
impl fmt::Display for LogRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let since = match &self.since {
            Some(ts) => ts.to_rfc3339(),
            None => "<nil>".to_string(),
        };
        write!(
            f,
            "name: {} namespace: {} instance: {} since: {} tail: {} follow: {}",
            self.name, self.namespace, self.instance, since, self.tail, self.follow
        )
    }
}

/// One line from a function container's log stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Container instance that produced the line.
    #[serde(default)]
    pub instance: String,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl fmt::Display for LogMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (", self.timestamp, self.name)?;
        if !self.namespace.is_empty() {
            write!(f, "{} ", self.namespace)?;
        }
        write!(f, "{}) {}", self.instance, self.text)
    }
}
