pub mod broadcast;
pub mod config;
pub mod error;
pub mod link;
pub mod live_tx;
pub mod signal;
pub mod supervisor;
pub mod xmlrpc;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use broadcast::{ChangeBroadcaster, EventSink, SinkClosed, SubscriberId};
pub use config::{LinkConfig, SupervisorConfig};
pub use error::{ConnectError, ConnectErrorKind, LinkError};
pub use link::{BoolSetting, ModemController, RemoteLink, RxChunk};
pub use live_tx::{
    EditWarning, LiveTxError, LiveTxSession, LiveTxView, Phase, SharedLiveTx, SyncOutcome,
};
pub use supervisor::{read_snapshot, LinkSupervisor, ReconnectGate, TickOutcome, TrxObserver};

/// Default fldigi XML-RPC host
pub const DEFAULT_FLDIGI_HOST: &str = "127.0.0.1";

/// Default fldigi XML-RPC port
pub const DEFAULT_FLDIGI_PORT: u16 = 7362;

/// Message attached to the disconnect edge when the supervisor gives up on the link
pub const CONNECTION_LOST_MESSAGE: &str =
    "Connection to FLDIGI lost. Use the Connect action to reconnect.";

/// Message attached to the disconnect edge after an operator disconnect
pub const OPERATOR_DISCONNECT_MESSAGE: &str =
    "Disconnected from FLDIGI. Use the Connect action to reconnect.";

// ============================================
// Radio state
// ============================================

/// Transmit/receive state reported by fldigi
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrxState {
    Rx,
    Tx,
    Tune,
}

impl TrxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrxState::Rx => "RX",
            TrxState::Tx => "TX",
            TrxState::Tune => "TUNE",
        }
    }
}

impl fmt::Display for TrxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrxState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RX" => Ok(TrxState::Rx),
            "TX" => Ok(TrxState::Tx),
            "TUNE" => Ok(TrxState::Tune),
            other => Err(format!("unknown trx state: {other}")),
        }
    }
}

// ============================================
// Broadcast payloads
// ============================================

/// Point-in-time view of the modem and rig.
///
/// Fields the remote could not provide are left as `None` and omitted from
/// the serialized form. Equality drives status deduplication in the
/// broadcaster.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trx_state: Option<TrxState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_frequency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rst_estimate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rsq_estimate: Option<String>,
    pub connected: bool,
}

impl StatusSnapshot {
    /// Snapshot published when the link goes down
    pub fn disconnected() -> Self {
        Self::default()
    }
}

/// Identity of the remote, attached to the connected edge
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ConnectionDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Connection edge: only published when the connected flag flips
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ConnectionDetails>,
}

impl ConnectionEvent {
    pub fn connected(version: Option<String>, name: Option<String>) -> Self {
        Self {
            connected: true,
            details: Some(ConnectionDetails {
                version,
                name,
                error: None,
            }),
        }
    }

    pub fn lost(message: impl Into<String>) -> Self {
        Self {
            connected: false,
            details: Some(ConnectionDetails {
                error: Some(message.into()),
                ..Default::default()
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextKind {
    Rx,
}

/// Newly decoded receive text.
///
/// `offset` is the position of `text` in the remote receive buffer, so two
/// identical strings decoded at different times are still distinct events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextEvent {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: TextKind,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Operator-facing message (edit rejected, transmission complete, ...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Everything the broadcaster fans out to subscribers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum LinkEvent {
    #[serde(rename = "status_update")]
    Status(StatusSnapshot),
    #[serde(rename = "text_update")]
    Text(TextEvent),
    #[serde(rename = "connection_status")]
    Connection(ConnectionEvent),
    #[serde(rename = "notice")]
    Notice(Notice),
}

impl LinkEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            LinkEvent::Status(_) => "status_update",
            LinkEvent::Text(_) => "text_update",
            LinkEvent::Connection(_) => "connection_status",
            LinkEvent::Notice(_) => "notice",
        }
    }
}
