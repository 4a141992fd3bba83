//! Background connection manager
//!
//! Owns the link lifecycle end to end: candidate hosts, STOMP handshake,
//! steady-state drain of the queue, and backoff between cycles.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dms::TelemetryPayload;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::config::CloudConfig;
use crate::error::{CloudError, FailureKind};
use crate::frame::{Command, Frame};
use crate::queue::{ConnectionState, Delivery, DurableQueue, QueueStats};
use crate::transport::{Connector, Link};

/// Cooperative stop flag checked at every loop boundary
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Sleep unless stopped first; returns true if stopped
    pub async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_set() {
            return true;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_set(),
            _ = notified => true,
        }
    }
}

/// How a connected session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Stopped,
    Failed,
}

/// Connection state machine: DISCONNECTED -> HANDSHAKING -> CONNECTED
pub struct ConnectionManager<C> {
    config: CloudConfig,
    queue: Arc<DurableQueue>,
    connector: C,
    stop: Arc<StopSignal>,
    backoff: Backoff,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        config: CloudConfig,
        queue: Arc<DurableQueue>,
        connector: C,
        stop: Arc<StopSignal>,
    ) -> Self {
        let backoff = Backoff::new(config.backoff_initial(), config.backoff_max());
        Self { config, queue, connector, stop, backoff }
    }

    /// Run until stopped
    pub async fn run(mut self) {
        info!(
            host = %self.config.host,
            port = self.config.port,
            path = %self.config.path,
            "Connection manager started"
        );

        while !self.stop.is_set() {
            if let Some(mut link) = self.connect().await {
                self.backoff.reset();
                if let Err(e) = self.queue.on_connected() {
                    error!(error = %e, "Failed to restore offline log");
                }

                if self.session(link.as_mut()).await == SessionEnd::Stopped {
                    break;
                }
            }

            let delay = self.backoff.next_delay();
            warn!(retry_in_ms = delay.as_millis() as u64, "Collector unavailable, backing off");
            if self.stop.sleep(delay).await {
                break;
            }
        }

        let spilled = self.queue.on_disconnected(None);
        info!(spilled, "Connection manager stopped");
    }

    /// Try every candidate host once
    async fn connect(&mut self) -> Option<Box<dyn Link>> {
        let candidates = self.config.candidates();
        for (index, host) in candidates.iter().enumerate() {
            if index > 0 && self.stop.sleep(self.config.candidate_pause()).await {
                return None;
            }
            if self.stop.is_set() {
                return None;
            }

            self.queue.set_state(ConnectionState::Handshaking);
            match self.handshake(host).await {
                Ok(link) => {
                    info!(host = %host, port = self.config.port, "Connected to collector");
                    return Some(link);
                }
                Err(e) => {
                    self.queue.set_state(ConnectionState::Disconnected);
                    warn!(host = %host, error = %e, "Connection attempt failed");
                }
            }
        }
        None
    }

    async fn handshake(&self, host: &str) -> Result<Box<dyn Link>, CloudError> {
        let timeout = self.config.connect_timeout();
        let mut link = self
            .connector
            .open(host, self.config.port, &self.config.path, timeout)
            .await?;

        match exchange_connect(link.as_mut(), host, self.config.port, timeout).await {
            Ok(()) => Ok(link),
            Err(e) => {
                if let Err(close_err) = bounded(timeout, "close", link.close()).await {
                    debug!(error = %close_err, "Close after failed handshake failed");
                }
                Err(e)
            }
        }
    }

    /// Steady state: transmit the queue head, poll inbound, repeat
    async fn session(&mut self, link: &mut dyn Link) -> SessionEnd {
        loop {
            if self.stop.is_set() {
                self.close_gracefully(link).await;
                return SessionEnd::Stopped;
            }

            if let Some(item) = self.queue.pop() {
                if let Err(e) = self.transmit(link, &item).await {
                    if e.kind() == FailureKind::Persistence {
                        error!(error = %e, "Dropping unencodable telemetry");
                    } else {
                        warn!(error = %e, "Transmit failed, persisting in-flight item");
                        self.drop_link(link, Some(item)).await;
                        return SessionEnd::Failed;
                    }
                } else {
                    self.queue.mark_delivered();
                }
            }

            match link.recv_text(self.config.poll_interval()).await {
                Ok(Some(text)) => log_inbound(&text),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Receive failed, reconnecting");
                    self.drop_link(link, None).await;
                    return SessionEnd::Failed;
                }
            }

            if self.stop.sleep(self.config.idle_delay()).await {
                self.close_gracefully(link).await;
                return SessionEnd::Stopped;
            }
        }
    }

    async fn transmit(&self, link: &mut dyn Link, item: &TelemetryPayload) -> Result<(), CloudError> {
        let body = serde_json::to_string(item)?;
        let frame = Frame::send(&self.config.destination, body);
        bounded(self.config.connect_timeout(), "send", link.send_text(frame.encode())).await?;
        debug!(
            level = %item.fatigue_level,
            kind = %item.fatigue_type,
            "Telemetry sent"
        );
        Ok(())
    }

    async fn drop_link(&self, link: &mut dyn Link, in_flight: Option<TelemetryPayload>) {
        let spilled = self.queue.on_disconnected(in_flight);
        debug!(spilled, "Left connected state");
        if let Err(e) = bounded(self.config.connect_timeout(), "close", link.close()).await {
            debug!(error = %e, "Close failed");
        }
    }

    async fn close_gracefully(&self, link: &mut dyn Link) {
        let limit = self.config.connect_timeout();
        if let Err(e) = bounded(limit, "send", link.send_text(Frame::disconnect().encode())).await {
            debug!(error = %e, "DISCONNECT not sent");
        }
        if let Err(e) = bounded(limit, "close", link.close()).await {
            debug!(error = %e, "Close failed");
        }
        self.queue.on_disconnected(None);
    }
}

/// Send CONNECT and wait for the CONNECTED acknowledgment
async fn exchange_connect(
    link: &mut dyn Link,
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<(), CloudError> {
    bounded(timeout, "send", link.send_text(Frame::connect(host, port).encode())).await?;

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(CloudError::HandshakeTimeout(timeout));
        }
        // `None` is a ping or an idle wait; the deadline above ends the loop
        if let Some(text) = link.recv_text(remaining).await? {
            if check_ack(&text)? {
                return Ok(());
            }
        }
    }
}

/// Bound one outbound link operation; an elapsed limit is a transport failure
async fn bounded<T>(
    limit: Duration,
    what: &str,
    op: impl Future<Output = Result<T, CloudError>>,
) -> Result<T, CloudError> {
    tokio::time::timeout(limit, op)
        .await
        .map_err(|_| CloudError::Transport(format!("{what} timed out after {limit:?}")))?
}

/// True for CONNECTED, false for a heartbeat, error otherwise
fn check_ack(text: &str) -> Result<bool, CloudError> {
    match Frame::parse(text) {
        Ok(None) => Ok(false),
        Ok(Some(frame)) if frame.command == Command::Connected => Ok(true),
        Ok(Some(frame)) if frame.command == Command::Error => {
            let reason = frame.header_value("message").unwrap_or(frame.body.as_str());
            Err(CloudError::HandshakeRejected(reason.to_string()))
        }
        _ if text.contains(Command::Connected.as_str()) => Ok(true),
        Ok(Some(frame)) => Err(CloudError::HandshakeRejected(format!(
            "unexpected {} frame",
            frame.command
        ))),
        Err(e) => Err(CloudError::HandshakeRejected(e.to_string())),
    }
}

fn log_inbound(text: &str) {
    match Frame::parse(text) {
        Ok(Some(frame)) if frame.command == Command::Error => warn!(
            message = frame.header_value("message").unwrap_or_default(),
            body = %frame.body,
            "Collector reported an error"
        ),
        Ok(Some(frame)) => debug!(command = %frame.command, "Inbound frame ignored"),
        Ok(None) => debug!("Heartbeat"),
        Err(e) => debug!(error = %e, "Unparseable inbound frame"),
    }
}

/// Handle to the delivery subsystem: producer-side queue plus the background task
pub struct CloudSync {
    queue: Arc<DurableQueue>,
    stop: Arc<StopSignal>,
    task: JoinHandle<()>,
}

impl CloudSync {
    /// Spawn the connection manager on the current runtime
    pub fn spawn<C>(config: CloudConfig, connector: C) -> Self
    where
        C: Connector + 'static,
    {
        let queue = Arc::new(DurableQueue::new(config.offline_log.clone()));
        let stop = Arc::new(StopSignal::default());
        let manager = ConnectionManager::new(config, Arc::clone(&queue), connector, Arc::clone(&stop));
        let task = tokio::spawn(manager.run());
        Self { queue, stop, task }
    }

    /// Enqueue or persist one payload; never blocks on the network
    pub fn send(&self, item: TelemetryPayload) -> Delivery {
        self.queue.send(item)
    }

    pub fn state(&self) -> ConnectionState {
        self.queue.state()
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }

    pub fn queue(&self) -> &Arc<DurableQueue> {
        &self.queue
    }

    /// Orderly stop: DISCONNECT, close, spill remaining items to disk
    pub async fn shutdown(self) {
        info!("Shutting down cloud sync");
        self.stop.trigger();
        if let Err(e) = self.task.await {
            error!(error = %e, "Connection manager task failed");
        }
        self.queue.on_disconnected(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::tests::payload;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const ACK: &str = "CONNECTED\nversion:1.2\n\n\0";

    /// One scripted inbound event
    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Text(&'static str),
        /// Control frame: returns at once with nothing
        Ping,
        /// Nothing arrives within the timeout
        Wait,
        /// Receive error
        Fail,
    }

    #[derive(Debug, Clone, Default)]
    struct LinkScript {
        /// Consumed in order; silence once exhausted
        replies: Vec<Reply>,
        fail_sends_after: Option<usize>,
        stall_sends: bool,
    }

    #[derive(Debug, Clone)]
    enum Attempt {
        Refuse,
        Accept(LinkScript),
    }

    fn replying(replies: Vec<Reply>) -> Attempt {
        Attempt::Accept(LinkScript { replies, ..Default::default() })
    }

    fn accept() -> Attempt {
        replying(vec![Reply::Text(ACK)])
    }

    /// Everything the fake collector observed
    #[derive(Debug, Clone, Default)]
    struct Wire(Arc<Mutex<Vec<String>>>);

    impl Wire {
        fn record(&self, event: String) {
            self.0.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn opens(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| e.strip_prefix("open ").map(str::to_string))
                .collect()
        }

        fn sent_yawn_counts(&self) -> Vec<u32> {
            self.events()
                .iter()
                .filter(|e| e.starts_with("SEND\n"))
                .map(|e| {
                    let frame = Frame::parse(e).unwrap().unwrap();
                    let item: TelemetryPayload = serde_json::from_str(&frame.body).unwrap();
                    item.yawn_count
                })
                .collect()
        }
    }

    struct ScriptedConnector {
        attempts: Mutex<VecDeque<Attempt>>,
        wire: Wire,
    }

    impl ScriptedConnector {
        fn new(attempts: Vec<Attempt>, wire: &Wire) -> Self {
            Self { attempts: Mutex::new(attempts.into()), wire: wire.clone() }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn open(
            &self,
            host: &str,
            port: u16,
            _path: &str,
            _timeout: Duration,
        ) -> Result<Box<dyn Link>, CloudError> {
            self.wire.record(format!("open {host}"));
            let attempt = self.attempts.lock().unwrap().pop_front().unwrap_or(Attempt::Refuse);
            match attempt {
                Attempt::Refuse => Err(CloudError::Unreachable {
                    host: host.to_string(),
                    port,
                    reason: "connection refused".into(),
                }),
                Attempt::Accept(script) => Ok(Box::new(ScriptedLink {
                    replies: script.replies.into(),
                    sends: 0,
                    fail_sends_after: script.fail_sends_after,
                    stall_sends: script.stall_sends,
                    wire: self.wire.clone(),
                })),
            }
        }
    }

    struct ScriptedLink {
        replies: VecDeque<Reply>,
        sends: usize,
        fail_sends_after: Option<usize>,
        stall_sends: bool,
        wire: Wire,
    }

    #[async_trait]
    impl Link for ScriptedLink {
        async fn send_text(&mut self, text: String) -> Result<(), CloudError> {
            if text.starts_with("SEND\n") {
                if self.stall_sends {
                    std::future::pending::<()>().await;
                }
                if self.fail_sends_after == Some(self.sends) {
                    return Err(CloudError::Transport("broken pipe".into()));
                }
                self.sends += 1;
            }
            self.wire.record(text);
            Ok(())
        }

        async fn recv_text(&mut self, timeout: Duration) -> Result<Option<String>, CloudError> {
            match self.replies.pop_front() {
                Some(Reply::Text(text)) => Ok(Some(text.to_string())),
                Some(Reply::Ping) => Ok(None),
                Some(Reply::Fail) => Err(CloudError::Transport("connection reset".into())),
                Some(Reply::Wait) | None => {
                    tokio::time::sleep(timeout).await;
                    Ok(None)
                }
            }
        }

        async fn close(&mut self) -> Result<(), CloudError> {
            self.wire.record("close".into());
            Ok(())
        }
    }

    fn config_in(dir: &TempDir) -> CloudConfig {
        CloudConfig {
            host: "collector".into(),
            fallback_hosts: vec!["127.0.0.1".into()],
            offline_log: dir.path().join("offline_queue.jsonl"),
            ..Default::default()
        }
    }

    async fn settle(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_candidates_then_backoff() {
        let dir = TempDir::new().unwrap();
        let wire = Wire::default();
        let sync = CloudSync::spawn(config_in(&dir), ScriptedConnector::new(vec![], &wire));

        // Cycle 1 at t=0 and t=0.2s, backoff 1s, cycle 2 at t=1.2s and 1.4s,
        // backoff 2s, cycle 3 at t=3.4s
        settle(3_000).await;
        assert_eq!(wire.opens(), vec!["collector", "127.0.0.1", "collector", "127.0.0.1"]);
        assert_eq!(sync.state(), ConnectionState::Disconnected);

        settle(500).await;
        assert_eq!(wire.opens().len(), 5);
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_host_used_when_primary_refuses() {
        let dir = TempDir::new().unwrap();
        let wire = Wire::default();
        let connector = ScriptedConnector::new(vec![Attempt::Refuse, accept()], &wire);
        let sync = CloudSync::spawn(config_in(&dir), connector);

        settle(500).await;
        assert_eq!(wire.opens(), vec!["collector", "127.0.0.1"]);
        assert_eq!(sync.state(), ConnectionState::Connected);
        assert!(wire.events().iter().any(|e| e.starts_with("CONNECT\n")));
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_items_delivered_after_reconnect() {
        let dir = TempDir::new().unwrap();
        let wire = Wire::default();
        let connector =
            ScriptedConnector::new(vec![Attempt::Refuse, Attempt::Refuse, accept()], &wire);
        let sync = CloudSync::spawn(config_in(&dir), connector);

        for n in 0..3 {
            assert_eq!(sync.send(payload(n)), Delivery::Persisted);
        }
        assert!(sync.queue().log().exists());

        settle(5_000).await;
        assert_eq!(sync.state(), ConnectionState::Connected);
        assert_eq!(wire.sent_yawn_counts(), vec![0, 1, 2]);
        assert!(!sync.queue().log().exists());
        assert_eq!(sync.stats().delivered, 3);
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transmit_failure_persists_and_redelivers() {
        let dir = TempDir::new().unwrap();
        let wire = Wire::default();
        let flaky = Attempt::Accept(LinkScript {
            replies: vec![Reply::Text("CONNECTED\n\n\0")],
            fail_sends_after: Some(1),
            ..Default::default()
        });
        let connector = ScriptedConnector::new(vec![flaky, accept()], &wire);
        let sync = CloudSync::spawn(config_in(&dir), connector);

        settle(10).await;
        assert_eq!(sync.state(), ConnectionState::Connected);
        for n in 0..3 {
            assert_eq!(sync.send(payload(n)), Delivery::Queued);
        }

        settle(3_000).await;
        assert_eq!(wire.sent_yawn_counts(), vec![0, 1, 2]);
        assert_eq!(wire.opens().len(), 2);
        assert_eq!(sync.stats().delivered, 3);
        assert!(!sync.queue().log().exists());
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_handshake_tries_next_candidate() {
        let dir = TempDir::new().unwrap();
        let wire = Wire::default();
        let rejected = replying(vec![Reply::Text("ERROR\nmessage:denied\n\n\0")]);
        let connector = ScriptedConnector::new(vec![rejected, accept()], &wire);
        let sync = CloudSync::spawn(config_in(&dir), connector);

        settle(500).await;
        assert_eq!(wire.opens(), vec!["collector", "127.0.0.1"]);
        assert_eq!(sync.state(), ConnectionState::Connected);
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_before_ack_keeps_waiting() {
        let dir = TempDir::new().unwrap();
        let wire = Wire::default();
        let connector = ScriptedConnector::new(vec![replying(vec![Reply::Ping, Reply::Text(ACK)])], &wire);
        let sync = CloudSync::spawn(config_in(&dir), connector);

        settle(10).await;
        assert_eq!(wire.opens(), vec!["collector"]);
        assert_eq!(sync.state(), ConnectionState::Connected);
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_handshake_times_out_to_next_candidate() {
        let dir = TempDir::new().unwrap();
        let wire = Wire::default();
        let connector = ScriptedConnector::new(vec![replying(vec![]), accept()], &wire);
        let sync = CloudSync::spawn(config_in(&dir), connector);

        settle(4_000).await;
        assert_eq!(wire.opens(), vec!["collector"]);
        assert_eq!(sync.state(), ConnectionState::Handshaking);

        // 5 s connect timeout plus the 200 ms candidate pause
        settle(1_500).await;
        assert_eq!(wire.opens(), vec!["collector", "127.0.0.1"]);
        assert_eq!(sync.state(), ConnectionState::Connected);
        let events = wire.events();
        let closed = events.iter().position(|e| e == "close");
        let second = events.iter().position(|e| e == "open 127.0.0.1");
        assert!(closed.is_some());
        assert!(closed < second);
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_failure_spills_queue_and_reconnects() {
        let dir = TempDir::new().unwrap();
        let wire = Wire::default();
        let dropping = replying(vec![Reply::Text(ACK), Reply::Wait, Reply::Fail]);
        let sync = CloudSync::spawn(config_in(&dir), ScriptedConnector::new(vec![dropping, accept()], &wire));

        settle(10).await;
        for n in 0..3 {
            assert_eq!(sync.send(payload(n)), Delivery::Queued);
        }

        // Second loop turn sends one item, then the receive fails
        settle(200).await;
        assert_eq!(sync.state(), ConnectionState::Disconnected);
        assert_eq!(wire.sent_yawn_counts(), vec![0]);
        assert!(sync.queue().is_empty());
        assert!(sync.queue().log().exists());
        assert_eq!(sync.stats().persisted, 2);
        assert_eq!(sync.send(payload(3)), Delivery::Persisted);

        settle(2_000).await;
        assert_eq!(wire.opens().len(), 2);
        assert_eq!(sync.state(), ConnectionState::Connected);
        assert_eq!(wire.sent_yawn_counts(), vec![0, 1, 2, 3]);
        assert!(!sync.queue().log().exists());
        sync.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_send_is_bounded_and_persisted() {
        let dir = TempDir::new().unwrap();
        let wire = Wire::default();
        let stalling = Attempt::Accept(LinkScript {
            replies: vec![Reply::Text(ACK)],
            stall_sends: true,
            ..Default::default()
        });
        let sync = CloudSync::spawn(config_in(&dir), ScriptedConnector::new(vec![stalling], &wire));

        settle(10).await;
        assert_eq!(sync.send(payload(5)), Delivery::Queued);
        settle(200).await;
        assert!(sync.queue().is_empty());

        let queue = Arc::clone(sync.queue());
        let stopped = tokio::time::timeout(Duration::from_secs(60), sync.shutdown()).await;
        assert!(stopped.is_ok());
        assert!(wire.sent_yawn_counts().is_empty());
        assert_eq!(queue.log().drain().unwrap().iter().map(|i| i.yawn_count).collect::<Vec<_>>(), vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_sends_disconnect_and_persists_later_sends() {
        let dir = TempDir::new().unwrap();
        let wire = Wire::default();
        let sync = CloudSync::spawn(config_in(&dir), ScriptedConnector::new(vec![accept()], &wire));

        settle(10).await;
        let queue = Arc::clone(sync.queue());
        sync.shutdown().await;

        let events = wire.events();
        let disconnect = events.iter().position(|e| e == "DISCONNECT\n\n\0");
        let close = events.iter().rposition(|e| e == "close");
        assert!(disconnect.is_some());
        assert!(disconnect < close);

        assert_eq!(queue.state(), ConnectionState::Disconnected);
        assert_eq!(queue.send(payload(9)), Delivery::Persisted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts_backoff() {
        let dir = TempDir::new().unwrap();
        let wire = Wire::default();
        let sync = CloudSync::spawn(config_in(&dir), ScriptedConnector::new(vec![], &wire));

        settle(300).await;
        let started = tokio::time::Instant::now();
        sync.shutdown().await;
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_check_ack() {
        assert!(check_ack("CONNECTED\nversion:1.2\n\n\0").unwrap());
        assert!(!check_ack("\n").unwrap());
        assert!(matches!(
            check_ack("ERROR\nmessage:bad login\n\n\0"),
            Err(CloudError::HandshakeRejected(m)) if m == "bad login"
        ));
        assert!(matches!(
            check_ack("RECEIPT\nreceipt-id:1\n\n\0"),
            Err(CloudError::HandshakeRejected(_))
        ));
    }
}
