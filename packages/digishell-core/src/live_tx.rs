//! Live transmission: keystroke-level sync of an editable buffer to fldigi
//!
//! The operator edits a local buffer while the transmitter is keyed. Each
//! sync compares that buffer with `committed`, the text the remote TX buffer
//! has accepted, and forwards only appends and end-of-buffer deletions.
//! Anything else is rejected and the operator's buffer is reset to
//! `committed`.
//!
//! State machine:
//! - `Idle` → `Active` on `start` with non-empty text while connected
//! - `Active` → `Ending` on `commit` (remote told to return to receive)
//! - `Ending`/`Active` → `Idle` when the remote is seen going TX → RX
//! - any → `Idle` on `abort`

use crate::broadcast::ChangeBroadcaster;
use crate::error::LinkError;
use crate::link::ModemController;
use crate::supervisor::TrxObserver;
use crate::{Notice, TrxState};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// TX → RX transitions seen this soon after `start` belong to the previous
/// transmission and are ignored while the session is still `Active`.
pub const STALE_TRANSITION_GUARD: Duration = Duration::from_secs(2);

/// Rate assumed for modes missing from the table
pub const DEFAULT_CHARS_PER_SECOND: f64 = 1.5;

const MODE_RATES: &[(&str, f64)] = &[
    ("PSK1000", 120.0),
    ("PSK500", 60.0),
    ("PSK250", 30.0),
    ("PSK125", 15.0),
    ("PSK63", 8.0),
    ("PSK31", 4.0),
    ("RTTY", 6.0),
    ("MFSK64", 20.0),
    ("MFSK32", 10.0),
    ("MFSK16", 5.0),
    ("MFSK8", 2.5),
    ("MT63", 10.0),
    ("OLIVIA", 1.5),
    ("CONTESTIA", 2.0),
    ("THOR", 3.0),
    ("DOMINO", 4.0),
    ("HELL", 2.5),
    ("CW", 2.0),
];

/// Approximate characters per second for a modem name. The longest table key
/// contained in the name wins, so `BPSK125` matches `PSK125`, not `PSK31`.
pub fn chars_per_second(mode: &str) -> f64 {
    let upper = mode.to_ascii_uppercase();
    MODE_RATES
        .iter()
        .filter(|(key, _)| upper.contains(key))
        .max_by_key(|(key, _)| key.len())
        .map(|(_, cps)| *cps)
        .unwrap_or(DEFAULT_CHARS_PER_SECOND)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Active,
    Ending,
}

/// Why an edit was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditWarning {
    /// Changed something other than the end of the buffer
    InteriorEdit,
    /// Deleted into text the transmitter has already sent
    AlreadyTransmitted,
}

impl EditWarning {
    pub fn message(&self) -> &'static str {
        match self {
            EditWarning::InteriorEdit => {
                "Cannot edit already-transmitted text - backspace from END only"
            }
            EditWarning::AlreadyTransmitted => "Cannot edit what has already gone out",
        }
    }
}

/// Result of one sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SyncOutcome {
    /// No session is accepting edits
    Inactive,
    /// Link is down, nothing attempted
    Offline,
    Unchanged,
    Appended { text: String },
    Deleted { count: usize },
    /// Edit refused; the local buffer must be replaced with `reset_to`
    Rejected {
        warning: EditWarning,
        reset_to: String,
    },
    /// Remote call failed; the edit stays local and is retried next sync
    Failed { error: String },
}

#[derive(Debug, Error)]
pub enum LiveTxError {
    #[error("a live transmission is already in progress")]
    AlreadyActive,
    #[error("nothing to transmit")]
    EmptyText,
    #[error("no live transmission in progress")]
    NotActive,
    #[error("transmission is already ending")]
    AlreadyEnding,
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// A finished transmission, handed back for echoing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTransmission {
    pub text: String,
    pub duration: Duration,
}

/// Read-only snapshot of the session for operator surfaces
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveTxView {
    pub phase: Phase,
    pub committed: String,
    /// Leading part of `committed` believed to be on air already
    pub transmitted: String,
    pub pending: String,
    pub transmitted_estimate: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone)]
struct Transmission {
    committed: String,
    last_observed: String,
    started_at: Instant,
    mode: Option<String>,
    transmitted_estimate: usize,
}

impl Transmission {
    fn estimate_at(&self, now: Instant) -> usize {
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f64();
        let cps = self
            .mode
            .as_deref()
            .map(chars_per_second)
            .unwrap_or(DEFAULT_CHARS_PER_SECOND);
        ((elapsed * cps).floor() as usize).min(char_len(&self.committed))
    }

    fn reject(&mut self, warning: EditWarning) -> SyncOutcome {
        debug!(?warning, committed = %self.committed, "live edit rejected");
        self.last_observed = self.committed.clone();
        SyncOutcome::Rejected {
            warning,
            reset_to: self.committed.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
enum SessionState {
    #[default]
    Idle,
    Active(Transmission),
    Ending(Transmission),
}

#[derive(Debug, Default)]
pub struct LiveTxSession {
    state: SessionState,
}

impl LiveTxSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            SessionState::Idle => Phase::Idle,
            SessionState::Active(_) => Phase::Active,
            SessionState::Ending(_) => Phase::Ending,
        }
    }

    fn transmission(&self) -> Option<&Transmission> {
        match &self.state {
            SessionState::Idle => None,
            SessionState::Active(tx) | SessionState::Ending(tx) => Some(tx),
        }
    }

    pub fn committed(&self) -> Option<&str> {
        self.transmission().map(|tx| tx.committed.as_str())
    }

    pub fn transmitted_estimate(&self) -> usize {
        self.transmission()
            .map(|tx| tx.transmitted_estimate)
            .unwrap_or(0)
    }

    /// Begin a transmission with `text` as the first unit
    pub async fn start(
        &mut self,
        link: &dyn ModemController,
        text: &str,
        now: Instant,
    ) -> Result<(), LiveTxError> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Active(_) => return Err(LiveTxError::AlreadyActive),
            SessionState::Ending(_) => return Err(LiveTxError::AlreadyEnding),
        }
        if text.trim().is_empty() {
            return Err(LiveTxError::EmptyText);
        }
        if !link.is_connected() {
            return Err(LinkError::NotConnected.into());
        }

        let mode = link
            .modem()
            .await
            .inspect_err(|e| debug!(error = %e, "modem name unavailable, using fallback rate"))
            .ok();
        link.start_transmission(text).await?;

        info!(chars = char_len(text), mode = ?mode, "live transmission started");
        self.state = SessionState::Active(Transmission {
            committed: text.to_string(),
            last_observed: text.to_string(),
            started_at: now,
            mode,
            transmitted_estimate: 0,
        });
        Ok(())
    }

    /// Reconcile the operator's buffer with the remote TX buffer
    pub async fn sync(
        &mut self,
        link: &dyn ModemController,
        local: &str,
        now: Instant,
    ) -> SyncOutcome {
        let SessionState::Active(tx) = &mut self.state else {
            return SyncOutcome::Inactive;
        };
        if !link.is_connected() {
            return SyncOutcome::Offline;
        }

        tx.transmitted_estimate = tx.estimate_at(now);
        if local == tx.committed {
            tx.last_observed = tx.committed.clone();
            return SyncOutcome::Unchanged;
        }

        let committed_len = char_len(&tx.committed);
        let local_len = char_len(local);

        if local_len > committed_len {
            let Some(suffix) = local.strip_prefix(tx.committed.as_str()) else {
                return tx.reject(EditWarning::InteriorEdit);
            };
            tx.last_observed = local.to_string();
            return match link.append_tx_text(suffix).await {
                Ok(()) => {
                    tx.committed.push_str(suffix);
                    SyncOutcome::Appended {
                        text: suffix.to_string(),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to append live text");
                    SyncOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
        }

        if local_len == committed_len || !tx.committed.starts_with(local) {
            return tx.reject(EditWarning::InteriorEdit);
        }
        if local_len < tx.transmitted_estimate {
            return tx.reject(EditWarning::AlreadyTransmitted);
        }

        tx.last_observed = local.to_string();
        let deleted = committed_len - local_len;
        for sent in 0..deleted {
            if let Err(e) = link.send_backspace().await {
                warn!(error = %e, sent, deleted, "failed to delete live text");
                truncate_chars(&mut tx.committed, committed_len - sent);
                return SyncOutcome::Failed {
                    error: e.to_string(),
                };
            }
        }
        truncate_chars(&mut tx.committed, local_len);
        SyncOutcome::Deleted { count: deleted }
    }

    /// Ask the remote to finish what is buffered and return to receive
    pub async fn commit(&mut self, link: &dyn ModemController) -> Result<(), LiveTxError> {
        match self.state {
            SessionState::Active(_) => {}
            SessionState::Ending(_) => return Err(LiveTxError::AlreadyEnding),
            SessionState::Idle => return Err(LiveTxError::NotActive),
        }

        link.end_transmission().await?;
        if let SessionState::Active(tx) = std::mem::take(&mut self.state) {
            info!(chars = char_len(&tx.committed), "live transmission ending");
            self.state = SessionState::Ending(tx);
        }
        Ok(())
    }

    /// Stop transmitting immediately and drop the session
    pub async fn abort(&mut self, link: &dyn ModemController) -> Result<(), LiveTxError> {
        let previous = self.phase();
        self.state = SessionState::Idle;
        link.abort().await?;
        info!(?previous, "live transmission aborted");
        Ok(())
    }

    /// Feed an observed trx state.
    ///
    /// `Ending` completes on any RX: the end request was already issued, so
    /// RX means the buffer has drained, whether or not the TX → RX edge
    /// itself was seen. `Active` completes only on a TX → RX edge past the
    /// stale-transition guard.
    pub fn observe_trx(
        &mut self,
        previous: Option<TrxState>,
        current: TrxState,
        now: Instant,
    ) -> Option<CompletedTransmission> {
        if current != TrxState::Rx {
            return None;
        }

        let started_at = match &self.state {
            SessionState::Idle => return None,
            SessionState::Ending(tx) => tx.started_at,
            SessionState::Active(tx) => {
                if previous != Some(TrxState::Tx) {
                    return None;
                }
                if now.saturating_duration_since(tx.started_at) < STALE_TRANSITION_GUARD {
                    debug!("ignoring TX->RX transition from a previous transmission");
                    return None;
                }
                tx.started_at
            }
        };

        match std::mem::take(&mut self.state) {
            SessionState::Active(tx) | SessionState::Ending(tx) => {
                let duration = now.saturating_duration_since(started_at);
                info!(chars = char_len(&tx.committed), ?duration, "live transmission complete");
                Some(CompletedTransmission {
                    text: tx.committed,
                    duration,
                })
            }
            SessionState::Idle => None,
        }
    }

    pub fn view(&self, now: Instant) -> LiveTxView {
        let Some(tx) = self.transmission() else {
            return LiveTxView {
                phase: Phase::Idle,
                committed: String::new(),
                transmitted: String::new(),
                pending: String::new(),
                transmitted_estimate: 0,
                elapsed_ms: 0,
                mode: None,
            };
        };

        let estimate = tx.estimate_at(now).max(tx.transmitted_estimate);
        let split = tx
            .committed
            .char_indices()
            .nth(estimate)
            .map(|(i, _)| i)
            .unwrap_or(tx.committed.len());
        LiveTxView {
            phase: self.phase(),
            committed: tx.committed.clone(),
            transmitted: tx.committed[..split].to_string(),
            pending: tx.committed[split..].to_string(),
            transmitted_estimate: estimate,
            elapsed_ms: now.saturating_duration_since(tx.started_at).as_millis() as u64,
            mode: tx.mode.clone(),
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn truncate_chars(s: &mut String, chars: usize) {
    if let Some((idx, _)) = s.char_indices().nth(chars) {
        s.truncate(idx);
    }
}

// ============================================
// Shared session
// ============================================

/// Process-wide live session bound to a link, publishing operator notices
pub struct SharedLiveTx {
    link: Arc<dyn ModemController>,
    broadcaster: Arc<ChangeBroadcaster>,
    session: Mutex<LiveTxSession>,
}

impl SharedLiveTx {
    pub fn new(link: Arc<dyn ModemController>, broadcaster: Arc<ChangeBroadcaster>) -> Self {
        Self {
            link,
            broadcaster,
            session: Mutex::new(LiveTxSession::new()),
        }
    }

    pub async fn start(&self, text: &str) -> Result<LiveTxView, LiveTxError> {
        let mut session = self.session.lock().await;
        let now = Instant::now();
        session.start(self.link.as_ref(), text, now).await?;
        Ok(session.view(now))
    }

    pub async fn sync(&self, local: &str) -> SyncOutcome {
        let outcome = {
            let mut session = self.session.lock().await;
            session.sync(self.link.as_ref(), local, Instant::now()).await
        };

        match &outcome {
            SyncOutcome::Rejected { warning, .. } => {
                self.broadcaster
                    .publish_notice(Notice::warning(warning.message()));
            }
            SyncOutcome::Failed { error } => {
                self.broadcaster
                    .publish_notice(Notice::error(format!("Live TX update failed: {error}")));
            }
            _ => {}
        }
        outcome
    }

    pub async fn commit(&self) -> Result<LiveTxView, LiveTxError> {
        let mut session = self.session.lock().await;
        session.commit(self.link.as_ref()).await?;
        Ok(session.view(Instant::now()))
    }

    pub async fn abort(&self) -> Result<(), LiveTxError> {
        self.session.lock().await.abort(self.link.as_ref()).await
    }

    pub async fn view(&self) -> LiveTxView {
        self.session.lock().await.view(Instant::now())
    }

    pub async fn phase(&self) -> Phase {
        self.session.lock().await.phase()
    }
}

#[async_trait]
impl TrxObserver for SharedLiveTx {
    async fn trx_observed(&self, previous: Option<TrxState>, current: TrxState) {
        let completed = self
            .session
            .lock()
            .await
            .observe_trx(previous, current, Instant::now());

        if let Some(done) = completed {
            self.broadcaster.publish_notice(Notice::info(format!(
                "Transmission complete ({} chars)",
                char_len(&done.text)
            )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeController;
    use crate::LinkEvent;

    fn connected() -> FakeController {
        let fake = FakeController::new();
        fake.set_modem("BPSK31");
        fake
    }

    async fn active(fake: &FakeController, text: &str, t0: Instant) -> LiveTxSession {
        let mut session = LiveTxSession::new();
        session.start(fake, text, t0).await.unwrap();
        fake.clear_calls();
        session
    }

    #[test]
    fn test_chars_per_second_lookup() {
        assert_eq!(chars_per_second("BPSK31"), 4.0);
        assert_eq!(chars_per_second("bpsk125"), 15.0);
        assert_eq!(chars_per_second("PSK1000"), 120.0);
        assert_eq!(chars_per_second("MFSK16"), 5.0);
        assert_eq!(chars_per_second("OLIVIA-8-250"), 1.5);
        assert_eq!(chars_per_second("WEFAX576"), DEFAULT_CHARS_PER_SECOND);
    }

    #[tokio::test]
    async fn test_start_sends_full_text_and_keys_up() {
        let fake = connected();
        let mut session = LiveTxSession::new();
        session.start(&fake, "CQ CQ", Instant::now()).await.unwrap();

        assert_eq!(session.phase(), Phase::Active);
        assert_eq!(session.committed(), Some("CQ CQ"));
        assert_eq!(fake.tx_buffer(), "CQ CQ");
        assert_eq!(fake.trx(), TrxState::Tx);
    }

    #[tokio::test]
    async fn test_start_rejections() {
        let fake = connected();
        let mut session = LiveTxSession::new();
        assert!(matches!(
            session.start(&fake, "   ", Instant::now()).await,
            Err(LiveTxError::EmptyText)
        ));

        let offline = FakeController::disconnected();
        assert!(matches!(
            session.start(&offline, "CQ", Instant::now()).await,
            Err(LiveTxError::Link(LinkError::NotConnected))
        ));
        assert_eq!(session.phase(), Phase::Idle);

        session.start(&fake, "CQ", Instant::now()).await.unwrap();
        assert!(matches!(
            session.start(&fake, "CQ", Instant::now()).await,
            Err(LiveTxError::AlreadyActive)
        ));
    }

    #[tokio::test]
    async fn test_growth_sends_only_suffixes() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "CQ", t0).await;

        let mut local = String::from("CQ");
        for piece in [" CQ", " DE", " K1ABC", " K"] {
            local.push_str(piece);
            assert_eq!(
                session.sync(&fake, &local, t0).await,
                SyncOutcome::Appended {
                    text: piece.to_string()
                }
            );
            assert_eq!(session.committed(), Some(local.as_str()));
        }

        assert_eq!(
            fake.appended(),
            vec![" CQ", " DE", " K1ABC", " K"]
        );
        assert_eq!(fake.tx_buffer(), "CQ CQ DE K1ABC K");
    }

    #[tokio::test]
    async fn test_unchanged_buffer_makes_no_calls() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "CQ", t0).await;

        assert_eq!(session.sync(&fake, "CQ", t0).await, SyncOutcome::Unchanged);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_growth_with_changed_prefix_is_rejected() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "CQ CQ", t0).await;

        let outcome = session.sync(&fake, "CX CQ DE", t0).await;
        assert_eq!(
            outcome,
            SyncOutcome::Rejected {
                warning: EditWarning::InteriorEdit,
                reset_to: "CQ CQ".to_string()
            }
        );
        assert!(fake.calls().is_empty());
        assert_eq!(session.committed(), Some("CQ CQ"));
    }

    #[tokio::test]
    async fn test_same_length_replacement_is_rejected() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "HELLO", t0).await;

        match session.sync(&fake, "HELLX", t0).await {
            SyncOutcome::Rejected { warning, reset_to } => {
                assert_eq!(warning, EditWarning::InteriorEdit);
                assert_eq!(reset_to, "HELLO");
            }
            other => panic!("Expected rejection, got {other:?}"),
        }
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_backspace_from_end() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "CQ CQ DE K1ABX", t0).await;

        let outcome = session.sync(&fake, "CQ CQ DE K1AB", t0).await;
        assert_eq!(outcome, SyncOutcome::Deleted { count: 1 });
        let outcome = session.sync(&fake, "CQ CQ DE K1ABC", t0).await;
        assert_eq!(
            outcome,
            SyncOutcome::Appended {
                text: "C".to_string()
            }
        );
        assert_eq!(fake.tx_buffer(), "CQ CQ DE K1ABC");
    }

    #[tokio::test]
    async fn test_shrink_that_is_not_a_prefix_is_rejected() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "CQ CQ DE", t0).await;

        let outcome = session.sync(&fake, "CQ XQ", t0).await;
        assert!(matches!(
            outcome,
            SyncOutcome::Rejected {
                warning: EditWarning::InteriorEdit,
                ..
            }
        ));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cannot_delete_into_transmitted_text() {
        let fake = connected();
        let t0 = Instant::now();
        // BPSK31 is 4 chars/s: after 2 s about 8 characters are gone
        let mut session = active(&fake, "CQ CQ CQ DE K1ABC", t0).await;
        let later = t0 + Duration::from_secs(2);

        let outcome = session.sync(&fake, "CQ CQ", later).await;
        assert_eq!(
            outcome,
            SyncOutcome::Rejected {
                warning: EditWarning::AlreadyTransmitted,
                reset_to: "CQ CQ CQ DE K1ABC".to_string()
            }
        );
        assert_eq!(session.transmitted_estimate(), 8);
        assert!(fake.calls().is_empty());

        // Deleting down to exactly the estimate is still allowed
        let outcome = session.sync(&fake, "CQ CQ CQ", later).await;
        assert_eq!(outcome, SyncOutcome::Deleted { count: 9 });
        assert_eq!(fake.tx_buffer(), "CQ CQ CQ");
    }

    #[tokio::test]
    async fn test_estimate_is_bounded_by_committed() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "73", t0).await;

        session
            .sync(&fake, "73", t0 + Duration::from_secs(60))
            .await;
        assert_eq!(session.transmitted_estimate(), 2);
    }

    #[tokio::test]
    async fn test_failed_append_is_retried_next_sync() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "CQ", t0).await;

        fake.fail_writes(true);
        assert!(matches!(
            session.sync(&fake, "CQ DE", t0).await,
            SyncOutcome::Failed { .. }
        ));
        assert_eq!(session.committed(), Some("CQ"));

        fake.fail_writes(false);
        assert_eq!(
            session.sync(&fake, "CQ DE", t0).await,
            SyncOutcome::Appended {
                text: " DE".to_string()
            }
        );
        assert_eq!(fake.tx_buffer(), "CQ DE");
    }

    #[tokio::test]
    async fn test_partial_backspace_failure_tracks_sent_count() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "CQ CQ", t0).await;

        fake.fail_writes_after(2);
        assert!(matches!(
            session.sync(&fake, "CQ", t0).await,
            SyncOutcome::Failed { .. }
        ));
        assert_eq!(session.committed(), Some("CQ "));
        assert_eq!(fake.tx_buffer(), "CQ ");
    }

    #[tokio::test]
    async fn test_offline_sync_makes_no_attempt() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "CQ", t0).await;

        fake.drop_link();
        assert_eq!(session.sync(&fake, "CQ DE", t0).await, SyncOutcome::Offline);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_commit_and_complete() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "CQ CQ", t0).await;

        session.commit(&fake).await.unwrap();
        assert_eq!(session.phase(), Phase::Ending);
        assert_eq!(fake.calls(), vec!["rx"]);
        assert_eq!(
            session.sync(&fake, "CQ CQ DE", t0).await,
            SyncOutcome::Inactive
        );
        assert!(matches!(
            session.commit(&fake).await,
            Err(LiveTxError::AlreadyEnding)
        ));

        // Ending completes even inside the stale-transition guard
        let done = session
            .observe_trx(Some(TrxState::Tx), TrxState::Rx, t0 + Duration::from_millis(500))
            .unwrap();
        assert_eq!(done.text, "CQ CQ");
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.committed(), None);
        assert_eq!(session.transmitted_estimate(), 0);
    }

    #[tokio::test]
    async fn test_stale_transition_ignored_while_active() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "CQ", t0).await;

        assert!(session
            .observe_trx(Some(TrxState::Tx), TrxState::Rx, t0 + Duration::from_secs(1))
            .is_none());
        assert_eq!(session.phase(), Phase::Active);

        // Remote ended on its own after the guard
        let done = session
            .observe_trx(Some(TrxState::Tx), TrxState::Rx, t0 + Duration::from_secs(3))
            .unwrap();
        assert_eq!(done.duration, Duration::from_secs(3));
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_active_completes_only_on_tx_to_rx() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "CQ", t0).await;

        let later = t0 + Duration::from_secs(5);
        assert!(session.observe_trx(None, TrxState::Rx, later).is_none());
        assert!(session
            .observe_trx(Some(TrxState::Rx), TrxState::Rx, later)
            .is_none());
        assert!(session
            .observe_trx(Some(TrxState::Tune), TrxState::Rx, later)
            .is_none());
        assert!(session
            .observe_trx(Some(TrxState::Rx), TrxState::Tx, later)
            .is_none());
        assert_eq!(session.phase(), Phase::Active);
    }

    #[tokio::test]
    async fn test_ending_completes_on_rx_without_seeing_tx() {
        let fake = connected();
        let t0 = Instant::now();

        // Whole transmission drained between two polls
        let mut session = active(&fake, "73", t0).await;
        session.commit(&fake).await.unwrap();
        assert!(session
            .observe_trx(Some(TrxState::Tx), TrxState::Tx, t0)
            .is_none());
        let done = session
            .observe_trx(Some(TrxState::Rx), TrxState::Rx, t0 + Duration::from_millis(200))
            .unwrap();
        assert_eq!(done.text, "73");
        assert_eq!(session.phase(), Phase::Idle);

        // Observed state lost across a reconnect
        let mut session = active(&fake, "73", t0).await;
        session.commit(&fake).await.unwrap();
        assert!(session.observe_trx(None, TrxState::Rx, t0).is_some());
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn test_abort_from_any_phase() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "CQ", t0).await;

        session.abort(&fake).await.unwrap();
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(fake.calls(), vec!["abort"]);

        session.abort(&fake).await.unwrap();
        assert_eq!(fake.calls(), vec!["abort", "abort"]);
    }

    #[tokio::test]
    async fn test_view_splits_transmitted_text() {
        let fake = connected();
        let t0 = Instant::now();
        let session = active(&fake, "CQ CQ CQ DE K1ABC", t0).await;

        let view = session.view(t0 + Duration::from_secs(1));
        assert_eq!(view.phase, Phase::Active);
        assert_eq!(view.transmitted, "CQ C");
        assert_eq!(view.pending, "Q CQ DE K1ABC");
        assert_eq!(view.elapsed_ms, 1000);
        assert_eq!(view.mode.as_deref(), Some("BPSK31"));

        let idle = LiveTxSession::new().view(t0);
        assert_eq!(idle.phase, Phase::Idle);
        assert!(idle.committed.is_empty());
    }

    #[tokio::test]
    async fn test_multibyte_text_is_counted_in_characters() {
        let fake = connected();
        let t0 = Instant::now();
        let mut session = active(&fake, "73 ÆØÅ", t0).await;

        assert_eq!(
            session.sync(&fake, "73 ÆØ", t0).await,
            SyncOutcome::Deleted { count: 1 }
        );
        assert_eq!(session.committed(), Some("73 ÆØ"));
    }

    #[tokio::test]
    async fn test_shared_session_publishes_notices() {
        let fake = Arc::new(connected());
        let broadcaster = Arc::new(ChangeBroadcaster::new());
        let (_, mut rx) = broadcaster.subscribe();
        let shared = SharedLiveTx::new(fake.clone(), broadcaster.clone());

        shared.start("HELLO").await.unwrap();
        let outcome = shared.sync("HELLX").await;
        assert!(matches!(outcome, SyncOutcome::Rejected { .. }));

        match rx.try_recv().unwrap() {
            LinkEvent::Notice(notice) => {
                assert_eq!(notice.message, EditWarning::InteriorEdit.message())
            }
            other => panic!("Expected notice, got {other:?}"),
        }

        shared.commit().await.unwrap();
        shared.trx_observed(Some(TrxState::Tx), TrxState::Rx).await;
        assert_eq!(shared.phase().await, Phase::Idle);
        match rx.try_recv().unwrap() {
            LinkEvent::Notice(notice) => assert!(notice.message.starts_with("Transmission complete")),
            other => panic!("Expected notice, got {other:?}"),
        }
    }
}
