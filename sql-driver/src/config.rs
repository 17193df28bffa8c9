//! Driver configuration

use crate::context::Context;
use serde::Deserialize;
use std::time::Duration;

/// Options applied when opening a driver and when serving queries
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverOptions {
    /// Maximum connections held by each pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long opening a connection may take before it fails
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,

    /// Default query timeout; `null` disables it
    #[serde(default = "default_query_timeout_seconds")]
    pub query_timeout_seconds: Option<u64>,

    /// Maximum rows returned by the HTTP query endpoint
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout_seconds() -> u64 {
    10
}

fn default_query_timeout_seconds() -> Option<u64> {
    Some(30)
}

fn default_max_result_rows() -> usize {
    10_000
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connect_timeout_seconds: default_connect_timeout_seconds(),
            query_timeout_seconds: default_query_timeout_seconds(),
            max_result_rows: default_max_result_rows(),
        }
    }
}

impl DriverOptions {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_seconds.map(Duration::from_secs)
    }

    /// A fresh context carrying the configured timeout
    pub fn context(&self) -> Context {
        match self.query_timeout() {
            Some(timeout) => Context::background().with_timeout(timeout),
            None => Context::background(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let options = DriverOptions::from_json_str(r#"{ "maxConnections": 2 }"#).unwrap();
        assert_eq!(options.max_connections, 2);
        assert_eq!(options.connect_timeout_seconds, 10);
        assert_eq!(options.query_timeout_seconds, Some(30));
        assert_eq!(options.max_result_rows, 10_000);
    }

    #[test]
    fn test_null_timeout_disables_deadline() {
        let options = DriverOptions::from_json_str(r#"{ "queryTimeoutSeconds": null }"#).unwrap();
        assert_eq!(options.query_timeout(), None);
        assert!(options.context().deadline().is_none());
    }

    #[tokio::test]
    async fn test_context_carries_timeout() {
        let options = DriverOptions::default();
        assert!(options.context().deadline().is_some());
    }
}
