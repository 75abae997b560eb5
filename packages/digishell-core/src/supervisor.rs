//! LinkSupervisor - polling loop over the fldigi link
//!
//! fldigi cannot push, so the supervisor polls on a short fixed interval:
//! - inbound text every tick, published as soon as it arrives
//! - a full status snapshot every `status_poll_every` ticks, deduped
//! - a health check every `health_check_every` ticks
//!
//! Connection changes are published on edges only. Repeated connectivity
//! failures are debounced into a single forced disconnect.

use crate::broadcast::ChangeBroadcaster;
use crate::config::SupervisorConfig;
use crate::error::LinkError;
use crate::link::ModemController;
use crate::signal::{parse_snr, rsq_estimate, rst_estimate};
use crate::{
    ConnectionEvent, StatusSnapshot, TextEvent, TextKind, TrxState, CONNECTION_LOST_MESSAGE,
    OPERATOR_DISCONNECT_MESSAGE,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives the trx state seen by every status poll, with the one seen before
#[async_trait]
pub trait TrxObserver: Send + Sync {
    async fn trx_observed(&self, previous: Option<TrxState>, current: TrxState);
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Link is down; nothing polled
    Disconnected,
    /// Poll body completed
    Healthy,
    /// Periodic health check failed and the link dropped itself
    HealthCheckFailed,
    /// Connectivity failure below the threshold
    Failed { consecutive: u32 },
    /// Threshold reached; link was forced down
    ForcedDisconnect,
}

/// Supervisor bookkeeping, exposed for inspection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorState {
    /// Last connection state published, `None` before the first edge
    pub last_broadcast_connected: Option<bool>,
    pub consecutive_failures: u32,
    pub connection_check_counter: u32,
    pub status_poll_counter: u32,
    pub reconnect_counter: u32,
    pub reconnect_failures: u32,
    pub last_trx: Option<TrxState>,
}

/// Operator hold on automatic reconnection.
///
/// While held, a down link stays down until the operator connects again.
/// Shared between the supervisor and the code acting on operator requests.
#[derive(Debug, Default)]
pub struct ReconnectGate {
    held: AtomicBool,
}

impl ReconnectGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

pub struct LinkSupervisor {
    link: Arc<dyn ModemController>,
    broadcaster: Arc<ChangeBroadcaster>,
    config: SupervisorConfig,
    gate: Arc<ReconnectGate>,
    observers: Vec<Arc<dyn TrxObserver>>,
    state: SupervisorState,
}

impl LinkSupervisor {
    pub fn new(
        link: Arc<dyn ModemController>,
        broadcaster: Arc<ChangeBroadcaster>,
        config: SupervisorConfig,
    ) -> Self {
        let state = SupervisorState {
            last_broadcast_connected: Some(link.is_connected()),
            ..Default::default()
        };
        Self {
            link,
            broadcaster,
            config,
            gate: Arc::new(ReconnectGate::new()),
            observers: Vec::new(),
            state,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TrxObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_reconnect_gate(mut self, gate: Arc<ReconnectGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn reconnect_gate(&self) -> Arc<ReconnectGate> {
        self.gate.clone()
    }

    pub fn state(&self) -> &SupervisorState {
        &self.state
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Sleep to apply after a tick with the given outcome
    pub fn next_delay(&self, outcome: TickOutcome) -> Duration {
        match outcome {
            TickOutcome::Failed { .. } | TickOutcome::ForcedDisconnect => {
                self.config.backoff_interval
            }
            _ => self.config.poll_interval,
        }
    }

    /// Run one poll cycle
    pub async fn tick(&mut self) -> TickOutcome {
        match self.poll_once().await {
            Ok(outcome) => {
                if outcome == TickOutcome::Healthy {
                    self.state.consecutive_failures = 0;
                }
                outcome
            }
            Err(err) => self.record_failure(&err).await,
        }
    }

    /// Only connectivity failures escape; remote rejections are logged and skipped
    async fn poll_once(&mut self) -> Result<TickOutcome, LinkError> {
        if !self.link.is_connected() {
            self.announce_disconnected();
            self.try_reconnect().await;
            return Ok(TickOutcome::Disconnected);
        }

        self.state.connection_check_counter += 1;
        if self.state.connection_check_counter >= self.config.health_check_every {
            self.state.connection_check_counter = 0;
            if !self.link.health_check().await {
                self.announce_disconnected();
                return Ok(TickOutcome::HealthCheckFailed);
            }
        }

        match self.link.read_new_rx_text().await {
            Ok(Some(chunk)) if !chunk.text.is_empty() => {
                self.broadcaster.publish_text(TextEvent {
                    text: chunk.text,
                    kind: TextKind::Rx,
                    offset: chunk.offset,
                });
            }
            Ok(_) => {}
            Err(err) if err.is_connectivity() => return Err(err),
            Err(err) => debug!(error = %err, "rx read rejected by fldigi"),
        }

        if self.state.last_broadcast_connected != Some(true) {
            self.announce_connected().await;
        }

        self.state.status_poll_counter += 1;
        if self.state.status_poll_counter >= self.config.status_poll_every {
            self.state.status_poll_counter = 0;
            let snapshot = read_snapshot(self.link.as_ref()).await?;
            if let Some(trx) = snapshot.trx_state {
                self.notify_trx(trx).await;
            }
            self.broadcaster.publish_status(snapshot);
        }

        Ok(TickOutcome::Healthy)
    }

    async fn record_failure(&mut self, err: &LinkError) -> TickOutcome {
        self.state.consecutive_failures += 1;
        let count = self.state.consecutive_failures;
        if count == 1 || count % self.config.failure_log_every.max(1) == 0 {
            warn!(consecutive = count, error = %err, "fldigi poll failed");
        }

        if count >= self.config.failure_threshold {
            warn!(
                consecutive = count,
                "too many consecutive failures, forcing disconnect"
            );
            self.link.disconnect().await;
            self.announce_disconnected();
            self.state.consecutive_failures = 0;
            return TickOutcome::ForcedDisconnect;
        }

        TickOutcome::Failed { consecutive: count }
    }

    fn announce_disconnected(&mut self) {
        if self.state.last_broadcast_connected == Some(false) {
            return;
        }
        let message = if self.gate.is_held() {
            OPERATOR_DISCONNECT_MESSAGE
        } else {
            CONNECTION_LOST_MESSAGE
        };
        info!(held = self.gate.is_held(), "fldigi link is down");
        self.state.last_broadcast_connected = Some(false);
        self.state.reconnect_counter = 0;
        self.broadcaster
            .publish_connection(ConnectionEvent::lost(message));
        self.broadcaster
            .publish_status(StatusSnapshot::disconnected());
    }

    async fn announce_connected(&mut self) {
        let version = self.link.version().await.ok();
        let name = self.link.name().await.ok();
        info!(?version, ?name, "fldigi link is up");

        self.state.last_broadcast_connected = Some(true);
        self.state.consecutive_failures = 0;
        self.state.connection_check_counter = 0;
        self.state.reconnect_failures = 0;
        // Publish a fresh snapshot on this same tick
        self.state.status_poll_counter = self.config.status_poll_every.saturating_sub(1);
        self.broadcaster
            .publish_connection(ConnectionEvent::connected(version, name));
    }

    async fn try_reconnect(&mut self) {
        let Some(every) = self.config.reconnect_every_ticks() else {
            return;
        };
        if self.gate.is_held() {
            self.state.reconnect_counter = 0;
            return;
        }
        self.state.reconnect_counter += 1;
        if self.state.reconnect_counter < every {
            return;
        }
        self.state.reconnect_counter = 0;

        self.link.disconnect().await;
        match self.link.connect().await {
            Ok(()) => info!("reconnected to fldigi"),
            Err(e) => {
                self.state.reconnect_failures += 1;
                let count = self.state.reconnect_failures;
                if count == 1 || count % self.config.failure_log_every.max(1) == 0 {
                    warn!(attempts = count, kind = %e.kind, "reconnect failed: {}", e);
                }
            }
        }
    }

    async fn notify_trx(&mut self, current: TrxState) {
        let previous = self.state.last_trx.replace(current);
        if previous != Some(current) {
            debug!(?previous, %current, "trx state changed");
        }
        for observer in &self.observers {
            observer.trx_observed(previous, current).await;
        }
    }

    /// Loop until cancelled, then drop the link
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "link supervisor started"
        );

        loop {
            let outcome = self.tick().await;
            let delay = self.next_delay(outcome);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.link.disconnect().await;
        info!("link supervisor stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

/// Read a full status snapshot from a connected link.
///
/// Trx state and quality detect link loss: a connectivity failure on either
/// fails the whole read. Every other field is best effort.
pub async fn read_snapshot(link: &dyn ModemController) -> Result<StatusSnapshot, LinkError> {
    let trx_state = loss_detecting(link.trx_state().await)?;
    let quality = loss_detecting(link.quality().await)?;

    let snr = best_effort(link.status_line().await)
        .as_deref()
        .and_then(parse_snr);

    Ok(StatusSnapshot {
        modem: best_effort(link.modem().await),
        carrier: best_effort(link.carrier().await),
        bandwidth: best_effort(link.bandwidth().await),
        trx_state,
        device_frequency: best_effort(link.rig_frequency().await),
        device_mode: best_effort(link.rig_mode().await),
        quality,
        snr,
        rst_estimate: rst_estimate(quality, snr),
        rsq_estimate: rsq_estimate(quality, snr),
        connected: true,
    })
}

fn loss_detecting<T>(result: Result<T, LinkError>) -> Result<Option<T>, LinkError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_connectivity() => Err(e),
        Err(_) => Ok(None),
    }
}

fn best_effort<T>(result: Result<T, LinkError>) -> Option<T> {
    result.ok()
}
