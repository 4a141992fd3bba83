//! Fatigue Edge Agent
//!
//! Wires the per-frame fatigue engine to the cloud delivery channel:
//! measurement input, send cadence, keepalives, logging and shutdown.

pub mod config;
pub mod scheduler;
pub mod source;

pub use config::{AgentConfig, LoggingConfig, SendConfig};
pub use scheduler::SendScheduler;
pub use source::{Input, MeasurementSource, SourceError};

use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use cloud_sync::{CloudSync, Connector, Delivery, WsConnector};
use dms::{Classification, DmsError, DriverIdentity, FatigueEngine, TelemetryPayload};
use tokio::io::AsyncBufRead;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize logging; `RUST_LOG` overrides the configured level
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("invalid log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {e}"))
}

/// Per-frame path plus the delivery handle
pub struct Agent {
    engine: FatigueEngine,
    scheduler: SendScheduler,
    identity: DriverIdentity,
    sync: CloudSync,
    last_classification: Classification,
}

impl Agent {
    pub fn new(config: &AgentConfig, sync: CloudSync) -> anyhow::Result<Self> {
        Ok(Self {
            engine: FatigueEngine::new(config.fatigue.clone())?,
            scheduler: SendScheduler::new(&config.send),
            identity: config.identity.clone(),
            sync,
            last_classification: Classification::NONE,
        })
    }

    /// Process one frame; returns the routing of any payload sent
    pub fn on_input(&mut self, input: Input, now: Instant) -> Option<Delivery> {
        match input {
            Input::Face(raw) => {
                let analysis = match self.engine.process(Some(&raw), now) {
                    Ok(Some(analysis)) => analysis,
                    Ok(None) => return None,
                    Err(DmsError::InvalidMeasurement(reason)) => {
                        warn!(reason = %reason, "Dropping invalid measurement");
                        return None;
                    }
                    Err(e) => {
                        warn!(error = %e, "Frame not processed");
                        return None;
                    }
                };

                if analysis.classification != self.last_classification {
                    if analysis.has_alert() {
                        info!(
                            level = %analysis.level(),
                            kind = %analysis.fatigue_type(),
                            eye_closure_s = analysis.eye_closure_duration,
                            blink_rate = analysis.blink_rate,
                            yawn_count = analysis.yawn_count,
                            "Fatigue state changed"
                        );
                    } else {
                        debug!("Fatigue state cleared");
                    }
                    self.last_classification = analysis.classification;
                }

                if !self.scheduler.should_send(analysis.level(), now) {
                    return None;
                }
                let payload = TelemetryPayload::from_analysis(&self.identity, &analysis, Utc::now());
                Some(self.sync.send(payload))
            }
            Input::NoFace => {
                // Counted for calibration only
                if let Err(e) = self.engine.process(None, now) {
                    debug!(error = %e, "No-face frame not processed");
                }
                if !self.scheduler.should_keepalive(now) {
                    return None;
                }
                debug!("No face, sending keepalive");
                Some(self.sync.send(TelemetryPayload::keepalive(&self.identity, Utc::now())))
            }
        }
    }

    pub fn engine(&self) -> &FatigueEngine {
        &self.engine
    }

    pub fn sync(&self) -> &CloudSync {
        &self.sync
    }

    /// Orderly stop of the delivery channel
    pub async fn shutdown(self) {
        let stats = self.sync.stats();
        info!(
            queued = stats.queued,
            delivered = stats.delivered,
            persisted = stats.persisted,
            dropped = stats.dropped_overflow,
            "Stopping agent"
        );
        self.sync.shutdown().await;
    }
}

/// Run until end of input or Ctrl-C
pub async fn run(config: AgentConfig) -> anyhow::Result<()> {
    run_with(config, MeasurementSource::stdin(), WsConnector).await
}

/// Run over any line source and connector
pub async fn run_with<R, C>(
    config: AgentConfig,
    mut source: MeasurementSource<R>,
    connector: C,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    C: Connector + 'static,
{
    info!(
        driver = %config.identity.driver_id,
        vehicle = %config.identity.vehicle_id,
        collector = %config.cloud.url_for(&config.cloud.host),
        "Starting fatigue agent"
    );

    let sync = CloudSync::spawn(config.cloud.clone(), connector);
    let mut agent = Agent::new(&config, sync)?;

    let outcome = loop {
        tokio::select! {
            next = source.next_input() => match next {
                Ok(Some(input)) => {
                    agent.on_input(input, Instant::now());
                }
                Ok(None) => {
                    info!(lines = source.lines_read(), "End of input");
                    break Ok(());
                }
                Err(e) => break Err(anyhow::Error::new(e).context("measurement input failed")),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break Ok(());
            }
        }
    };

    agent.shutdown().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloud_sync::OfflineLog;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::BufReader;

    /// Collector that never answers: everything goes to the offline log
    fn offline_config(dir: &TempDir) -> AgentConfig {
        let mut config = AgentConfig::default();
        config.cloud.host = "127.0.0.1".into();
        config.cloud.port = 1;
        config.cloud.fallback_hosts.clear();
        config.cloud.offline_log = dir.path().join("offline_queue.jsonl");
        config
    }

    fn face(ear: f64) -> Input {
        Input::Face(dms::RawMeasurement::new(ear, 0.3, 0.0, 0.0))
    }

    #[tokio::test]
    async fn test_first_frame_persisted_while_offline() {
        let dir = TempDir::new().unwrap();
        let config = offline_config(&dir);
        let sync = CloudSync::spawn(config.cloud.clone(), WsConnector);
        let mut agent = Agent::new(&config, sync).unwrap();

        let t0 = Instant::now();
        assert_eq!(agent.on_input(face(0.3), t0), Some(Delivery::Persisted));
        // Inside the send interval
        assert_eq!(agent.on_input(face(0.3), t0 + Duration::from_millis(50)), None);
        agent.shutdown().await;

        let items = OfflineLog::new(&config.cloud.offline_log).drain().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].driver_id, "DEFAULT_DRIVER");
    }

    #[tokio::test]
    async fn test_keepalive_without_face() {
        let dir = TempDir::new().unwrap();
        let config = offline_config(&dir);
        let sync = CloudSync::spawn(config.cloud.clone(), WsConnector);
        let mut agent = Agent::new(&config, sync).unwrap();

        let t0 = Instant::now();
        assert_eq!(agent.on_input(Input::NoFace, t0), Some(Delivery::Persisted));
        assert_eq!(agent.on_input(Input::NoFace, t0 + Duration::from_secs(1)), None);
        assert_eq!(agent.on_input(Input::NoFace, t0 + Duration::from_secs(30)), Some(Delivery::Persisted));
        agent.shutdown().await;

        let items = OfflineLog::new(&config.cloud.offline_log).drain().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.fatigue_level == dms::FatigueLevel::None));
    }

    #[tokio::test]
    async fn test_invalid_measurement_dropped() {
        let dir = TempDir::new().unwrap();
        let config = offline_config(&dir);
        let sync = CloudSync::spawn(config.cloud.clone(), WsConnector);
        let mut agent = Agent::new(&config, sync).unwrap();

        assert_eq!(agent.on_input(face(-1.0), Instant::now()), None);
        agent.shutdown().await;
        assert!(!config.cloud.offline_log.exists());
    }

    #[tokio::test]
    async fn test_run_until_end_of_input() {
        let dir = TempDir::new().unwrap();
        let config = offline_config(&dir);
        let log_path = config.cloud.offline_log.clone();
        let text = "{\"ear\":0.3,\"mar\":0.2,\"headPitchDeg\":0,\"headYawDeg\":0}\nnull\ngarbage\n";
        let source = MeasurementSource::new(BufReader::new(text.as_bytes()));

        run_with(config, source, WsConnector).await.unwrap();

        let items = OfflineLog::new(&log_path).drain().unwrap();
        assert_eq!(items.len(), 1);
    }
}
