//! In-memory [`ModemController`] for tests
//!
//! Behaves like a small fldigi: a TX buffer that honours backspaces, a trx
//! state driven by tx/rx/tune/abort, and a receive buffer with a read cursor.
//! Calls made while disconnected fail with `NotConnected` and are not logged,
//! so `calls()` lists exactly what reached the "remote".

use crate::error::{ConnectError, ConnectErrorKind, LinkError};
use crate::link::{BoolSetting, ModemController, RxChunk, BACKSPACE};
use crate::TrxState;
use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;

struct FakeState {
    connected: bool,
    reachable: bool,
    severed: bool,
    calls: Vec<String>,
    appended: Vec<String>,
    tx_buffer: String,
    trx: TrxState,
    modem: String,
    modem_names: Vec<String>,
    carrier: i64,
    bandwidth: i64,
    quality: f64,
    status_line: String,
    rig_name: String,
    rig_frequency: f64,
    rig_mode: String,
    settings: HashMap<BoolSetting, bool>,
    squelch_level: f64,
    rx_buffer: String,
    rx_cursor: usize,
    rx_error: Option<LinkError>,
    fail_writes: bool,
    writes_before_failure: Option<usize>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            connected: true,
            reachable: true,
            severed: false,
            calls: Vec::new(),
            appended: Vec::new(),
            tx_buffer: String::new(),
            trx: TrxState::Rx,
            modem: "BPSK31".to_string(),
            modem_names: vec![
                "BPSK31".to_string(),
                "BPSK63".to_string(),
                "RTTY".to_string(),
                "MFSK16".to_string(),
            ],
            carrier: 1500,
            bandwidth: 31,
            quality: 65.0,
            status_line: "s/n 12 dB".to_string(),
            rig_name: "IC-7300".to_string(),
            rig_frequency: 14_070_000.0,
            rig_mode: "USB".to_string(),
            settings: HashMap::new(),
            squelch_level: 0.5,
            rx_buffer: String::new(),
            rx_cursor: 0,
            rx_error: None,
            fail_writes: false,
            writes_before_failure: None,
        }
    }
}

pub struct FakeController {
    state: Mutex<FakeState>,
}

impl Default for FakeController {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeController {
    /// Connected fake with typical BPSK31 defaults
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn disconnected() -> Self {
        let fake = Self::new();
        fake.state.lock().connected = false;
        fake
    }

    /// Record the call and check it can reach the remote
    fn enter(&self, op: &str) -> Result<MutexGuard<'_, FakeState>, LinkError> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(LinkError::NotConnected);
        }
        state.calls.push(op.to_string());
        if state.severed {
            return Err(LinkError::connectivity(
                ConnectErrorKind::Other,
                "connection reset by peer",
            ));
        }
        Ok(state)
    }

    fn enter_write(&self, op: &str) -> Result<MutexGuard<'_, FakeState>, LinkError> {
        let mut state = self.enter(op)?;
        let pending = state.writes_before_failure;
        let refuse = match pending {
            Some(0) => true,
            Some(left) => {
                state.writes_before_failure = Some(left - 1);
                false
            }
            None => state.fail_writes,
        };
        if refuse {
            return Err(LinkError::connectivity(
                ConnectErrorKind::Timeout,
                "write timed out",
            ));
        }
        Ok(state)
    }

    // ============================================
    // Test controls
    // ============================================

    /// Link dropped locally, as after a failed health check
    pub fn drop_link(&self) {
        self.state.lock().connected = false;
    }

    /// Remote gone while the link still believes it is connected
    pub fn sever(&self) {
        self.state.lock().severed = true;
    }

    /// Whether `connect` succeeds
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    pub fn set_modem(&self, modem: &str) {
        self.state.lock().modem = modem.to_string();
    }

    pub fn set_trx(&self, trx: TrxState) {
        self.state.lock().trx = trx;
    }

    pub fn trx(&self) -> TrxState {
        self.state.lock().trx
    }

    pub fn push_rx(&self, text: &str) {
        self.state.lock().rx_buffer.push_str(text);
    }

    /// Make every receive read fail with `error` until cleared with `None`
    pub fn fail_rx_reads(&self, error: Option<LinkError>) {
        self.state.lock().rx_error = error;
    }

    pub fn fail_writes(&self, fail: bool) {
        let mut state = self.state.lock();
        state.fail_writes = fail;
        state.writes_before_failure = None;
    }

    /// Accept `n` more writes, then fail every write
    pub fn fail_writes_after(&self, n: usize) {
        self.state.lock().writes_before_failure = Some(n);
    }

    pub fn tx_buffer(&self) -> String {
        self.state.lock().tx_buffer.clone()
    }

    /// Operations that reached the remote, in order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Text appended to the TX buffer, backspaces excluded
    pub fn appended(&self) -> Vec<String> {
        self.state.lock().appended.clone()
    }
}

#[async_trait]
impl ModemController for FakeController {
    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn connect(&self) -> Result<(), ConnectError> {
        let mut state = self.state.lock();
        if state.connected {
            return Ok(());
        }
        if !state.reachable {
            return Err(ConnectError::for_endpoint(
                ConnectErrorKind::Refused,
                "127.0.0.1",
                7362,
                "",
            ));
        }
        state.connected = true;
        state.severed = false;
        state.rx_cursor = state.rx_buffer.len();
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    async fn health_check(&self) -> bool {
        let mut state = self.state.lock();
        if !state.connected {
            return false;
        }
        state.calls.push("health_check".to_string());
        if state.severed {
            state.connected = false;
            return false;
        }
        true
    }

    async fn version(&self) -> Result<String, LinkError> {
        self.enter("version").map(|_| "4.2.05".to_string())
    }

    async fn name(&self) -> Result<String, LinkError> {
        self.enter("name").map(|_| "fldigi".to_string())
    }

    async fn modem(&self) -> Result<String, LinkError> {
        Ok(self.enter("modem")?.modem.clone())
    }

    async fn set_modem(&self, name: &str) -> Result<(), LinkError> {
        let mut state = self.enter("set_modem")?;
        if !state.modem_names.iter().any(|m| m == name) {
            return Err(LinkError::Application {
                code: -1,
                message: format!("unknown modem: {name}"),
            });
        }
        state.modem = name.to_string();
        Ok(())
    }

    async fn modem_names(&self) -> Result<Vec<String>, LinkError> {
        Ok(self.enter("modem_names")?.modem_names.clone())
    }

    async fn carrier(&self) -> Result<i64, LinkError> {
        Ok(self.enter("carrier")?.carrier)
    }

    async fn set_carrier(&self, hz: i64) -> Result<(), LinkError> {
        self.enter("set_carrier")?.carrier = hz;
        Ok(())
    }

    async fn bandwidth(&self) -> Result<i64, LinkError> {
        Ok(self.enter("bandwidth")?.bandwidth)
    }

    async fn set_bandwidth(&self, hz: i64) -> Result<(), LinkError> {
        self.enter("set_bandwidth")?.bandwidth = hz;
        Ok(())
    }

    async fn quality(&self) -> Result<f64, LinkError> {
        Ok(self.enter("quality")?.quality)
    }

    async fn status_line(&self) -> Result<String, LinkError> {
        Ok(self.enter("status_line")?.status_line.clone())
    }

    async fn trx_state(&self) -> Result<TrxState, LinkError> {
        Ok(self.enter("trx_state")?.trx)
    }

    async fn transmit(&self) -> Result<(), LinkError> {
        self.enter_write("tx")?.trx = TrxState::Tx;
        Ok(())
    }

    async fn receive(&self) -> Result<(), LinkError> {
        self.enter_write("rx")?.trx = TrxState::Rx;
        Ok(())
    }

    async fn tune(&self) -> Result<(), LinkError> {
        self.enter_write("tune")?.trx = TrxState::Tune;
        Ok(())
    }

    async fn abort(&self) -> Result<(), LinkError> {
        let mut state = self.enter("abort")?;
        state.trx = TrxState::Rx;
        state.tx_buffer.clear();
        Ok(())
    }

    async fn append_tx_text(&self, text: &str) -> Result<(), LinkError> {
        let op = if text == BACKSPACE { "backspace" } else { "add_tx" };
        let mut state = self.enter_write(op)?;
        if text == BACKSPACE {
            state.tx_buffer.pop();
        } else {
            state.tx_buffer.push_str(text);
            state.appended.push(text.to_string());
        }
        Ok(())
    }

    async fn clear_tx(&self) -> Result<(), LinkError> {
        self.enter_write("clear_tx")?.tx_buffer.clear();
        Ok(())
    }

    async fn clear_rx(&self) -> Result<(), LinkError> {
        let mut state = self.enter("clear_rx")?;
        state.rx_buffer.clear();
        state.rx_cursor = 0;
        Ok(())
    }

    async fn read_new_rx_text(&self) -> Result<Option<RxChunk>, LinkError> {
        let mut state = self.enter("read_rx")?;
        if let Some(err) = &state.rx_error {
            return Err(err.clone());
        }
        if state.rx_cursor >= state.rx_buffer.len() {
            return Ok(None);
        }
        let offset = state.rx_cursor;
        let text = state.rx_buffer[offset..].to_string();
        state.rx_cursor = state.rx_buffer.len();
        Ok(Some(RxChunk {
            offset: offset as u64,
            text,
        }))
    }

    async fn rig_name(&self) -> Result<String, LinkError> {
        Ok(self.enter("rig_name")?.rig_name.clone())
    }

    async fn rig_frequency(&self) -> Result<f64, LinkError> {
        Ok(self.enter("rig_frequency")?.rig_frequency)
    }

    async fn set_rig_frequency(&self, hz: f64) -> Result<(), LinkError> {
        self.enter("set_rig_frequency")?.rig_frequency = hz;
        Ok(())
    }

    async fn rig_mode(&self) -> Result<String, LinkError> {
        Ok(self.enter("rig_mode")?.rig_mode.clone())
    }

    async fn set_rig_mode(&self, mode: &str) -> Result<(), LinkError> {
        self.enter("set_rig_mode")?.rig_mode = mode.to_string();
        Ok(())
    }

    async fn bool_setting(&self, setting: BoolSetting) -> Result<bool, LinkError> {
        let state = self.enter("bool_setting")?;
        Ok(state.settings.get(&setting).copied().unwrap_or(false))
    }

    async fn set_bool_setting(&self, setting: BoolSetting, on: bool) -> Result<(), LinkError> {
        self.enter("set_bool_setting")?.settings.insert(setting, on);
        Ok(())
    }

    async fn squelch_level(&self) -> Result<f64, LinkError> {
        Ok(self.enter("squelch_level")?.squelch_level)
    }

    async fn set_squelch_level(&self, level: f64) -> Result<(), LinkError> {
        self.enter("set_squelch_level")?.squelch_level = level.clamp(0.0, 1.0);
        Ok(())
    }
}
