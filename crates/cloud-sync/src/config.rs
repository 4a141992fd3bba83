//! Delivery configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cloud sync configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Primary collector host
    pub host: String,
    pub port: u16,
    /// WebSocket endpoint path
    pub path: String,
    /// Hosts tried after the primary, in order
    pub fallback_hosts: Vec<String>,
    /// Logical destination for SEND frames
    pub destination: String,
    pub connect_timeout_ms: u64,
    /// Inbound frame poll timeout while connected
    pub poll_interval_ms: u64,
    /// Pause between steady-state loop turns
    pub idle_delay_ms: u64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    /// Pause between candidate hosts within one cycle
    pub candidate_pause_ms: u64,
    /// Append-only JSONL log used while offline
    pub offline_log: PathBuf,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            path: "/ws".to_string(),
            fallback_hosts: vec!["127.0.0.1".to_string()],
            destination: "/app/vehicle-event".to_string(),
            connect_timeout_ms: 5_000,
            poll_interval_ms: 100,
            idle_delay_ms: 50,
            backoff_initial_ms: 1_000,
            backoff_max_ms: 30_000,
            candidate_pause_ms: 200,
            offline_log: PathBuf::from("reports/offline_queue.jsonl"),
        }
    }
}

impl CloudConfig {
    /// Primary host followed by fallbacks, without repeats
    pub fn candidates(&self) -> Vec<String> {
        let mut hosts: Vec<String> = Vec::with_capacity(1 + self.fallback_hosts.len());
        for host in std::iter::once(&self.host).chain(&self.fallback_hosts) {
            if !hosts.contains(host) {
                hosts.push(host.clone());
            }
        }
        hosts
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn candidate_pause(&self) -> Duration {
        Duration::from_millis(self.candidate_pause_ms)
    }

    /// WebSocket URL for one candidate host
    pub fn url_for(&self, host: &str) -> String {
        format!("ws://{}:{}{}", host, self.port, self.path)
    }
}
