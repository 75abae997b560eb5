//! fldigi remote link
//!
//! The rest of the crate talks to fldigi only through [`ModemController`]:
//! connection lifecycle, typed getters/setters per field, and the transmit
//! buffer primitives live TX is built on.
//!
//! ## Key components:
//! - `transport` - XML-RPC over HTTP with failure classification
//! - `remote` - `RemoteLink`, the connection-owning implementation

mod remote;
mod transport;

pub use remote::RemoteLink;
pub use transport::{Dialer, HttpDialer, HttpTransport, RpcTransport};

use crate::error::{ConnectError, LinkError};
use crate::TrxState;
use async_trait::async_trait;
use serde::Serialize;
use std::str::FromStr;

/// fldigi's inline "return to receive when the buffer drains" marker
pub const RETURN_TO_RX_MARKER: &str = "^r";

/// Control character that deletes the last character of the TX buffer
pub const BACKSPACE: &str = "\u{8}";

/// Receive text read since the previous call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxChunk {
    /// Position of `text` in the remote receive buffer
    pub offset: u64,
    pub text: String,
}

/// On/off switches exposed by the settings API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolSetting {
    Afc,
    Squelch,
    Reverse,
    Rsid,
    Txid,
}

impl BoolSetting {
    pub const ALL: [BoolSetting; 5] = [
        BoolSetting::Afc,
        BoolSetting::Squelch,
        BoolSetting::Reverse,
        BoolSetting::Rsid,
        BoolSetting::Txid,
    ];

    /// Lowercase name used in URLs
    pub fn as_str(&self) -> &'static str {
        match self {
            BoolSetting::Afc => "afc",
            BoolSetting::Squelch => "squelch",
            BoolSetting::Reverse => "reverse",
            BoolSetting::Rsid => "rsid",
            BoolSetting::Txid => "txid",
        }
    }

    /// Display name for operator messages
    pub fn label(&self) -> &'static str {
        match self {
            BoolSetting::Afc => "AFC",
            BoolSetting::Squelch => "Squelch",
            BoolSetting::Reverse => "Reverse",
            BoolSetting::Rsid => "RSID",
            BoolSetting::Txid => "TXID",
        }
    }

    pub(crate) fn getter(&self) -> &'static str {
        match self {
            BoolSetting::Afc => "main.get_afc",
            BoolSetting::Squelch => "main.get_squelch",
            BoolSetting::Reverse => "main.get_reverse",
            BoolSetting::Rsid => "main.get_rsid",
            BoolSetting::Txid => "main.get_txid",
        }
    }

    pub(crate) fn setter(&self) -> &'static str {
        match self {
            BoolSetting::Afc => "main.set_afc",
            BoolSetting::Squelch => "main.set_squelch",
            BoolSetting::Reverse => "main.set_reverse",
            BoolSetting::Rsid => "main.set_rsid",
            BoolSetting::Txid => "main.set_txid",
        }
    }
}

impl FromStr for BoolSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        BoolSetting::ALL
            .into_iter()
            .find(|setting| setting.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| format!("unknown setting: {name}"))
    }
}

/// Typed control surface of a connected fldigi instance.
///
/// Every operation fails with [`LinkError::NotConnected`] without touching
/// the network while the link is down.
#[async_trait]
pub trait ModemController: Send + Sync {
    /// Cached connectivity flag, no I/O
    fn is_connected(&self) -> bool;

    /// Establish the connection. Succeeds immediately if already connected.
    async fn connect(&self) -> Result<(), ConnectError>;

    /// Drop the connection. Idempotent.
    async fn disconnect(&self);

    /// Probe the remote; any failure marks the link disconnected
    async fn health_check(&self) -> bool;

    // Identity
    async fn version(&self) -> Result<String, LinkError>;
    async fn name(&self) -> Result<String, LinkError>;

    // Modem
    async fn modem(&self) -> Result<String, LinkError>;
    async fn set_modem(&self, name: &str) -> Result<(), LinkError>;
    async fn modem_names(&self) -> Result<Vec<String>, LinkError>;
    async fn carrier(&self) -> Result<i64, LinkError>;
    async fn set_carrier(&self, hz: i64) -> Result<(), LinkError>;
    async fn bandwidth(&self) -> Result<i64, LinkError>;
    async fn set_bandwidth(&self, hz: i64) -> Result<(), LinkError>;
    async fn quality(&self) -> Result<f64, LinkError>;
    /// First status bar line, where fldigi reports "s/n" for most modes
    async fn status_line(&self) -> Result<String, LinkError>;

    // Transmit/receive control
    async fn trx_state(&self) -> Result<TrxState, LinkError>;
    async fn transmit(&self) -> Result<(), LinkError>;
    async fn receive(&self) -> Result<(), LinkError>;
    async fn tune(&self) -> Result<(), LinkError>;
    async fn abort(&self) -> Result<(), LinkError>;

    // Text buffers
    async fn append_tx_text(&self, text: &str) -> Result<(), LinkError>;
    async fn clear_tx(&self) -> Result<(), LinkError>;
    async fn clear_rx(&self) -> Result<(), LinkError>;
    /// Receive text decoded since the previous call, `None` if nothing new
    async fn read_new_rx_text(&self) -> Result<Option<RxChunk>, LinkError>;

    // Rig
    async fn rig_name(&self) -> Result<String, LinkError>;
    async fn rig_frequency(&self) -> Result<f64, LinkError>;
    async fn set_rig_frequency(&self, hz: f64) -> Result<(), LinkError>;
    async fn rig_mode(&self) -> Result<String, LinkError>;
    async fn set_rig_mode(&self, mode: &str) -> Result<(), LinkError>;

    // Settings
    async fn bool_setting(&self, setting: BoolSetting) -> Result<bool, LinkError>;
    async fn set_bool_setting(&self, setting: BoolSetting, on: bool) -> Result<(), LinkError>;
    async fn squelch_level(&self) -> Result<f64, LinkError>;
    /// Level is clamped to `0.0..=1.0`
    async fn set_squelch_level(&self, level: f64) -> Result<(), LinkError>;

    /// Remove the last character of the TX buffer
    async fn send_backspace(&self) -> Result<(), LinkError> {
        self.append_tx_text(BACKSPACE).await
    }

    /// Replace the TX buffer with `text` and key up
    async fn start_transmission(&self, text: &str) -> Result<(), LinkError> {
        self.clear_tx().await?;
        self.append_tx_text(text).await?;
        self.transmit().await
    }

    /// One-shot send: transmit `text` and return to receive once it drains
    async fn queue_text(&self, text: &str) -> Result<(), LinkError> {
        if text.ends_with(RETURN_TO_RX_MARKER) {
            self.start_transmission(text).await
        } else {
            self.start_transmission(&format!("{text}{RETURN_TO_RX_MARKER}"))
                .await
        }
    }

    /// Let the remote finish what is buffered, then return to receive
    async fn end_transmission(&self) -> Result<(), LinkError> {
        self.receive().await
    }
}
