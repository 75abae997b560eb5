//! Connection-owning fldigi link
//!
//! Owns the transport handle, the cached connected flag and the receive
//! text cursor. Only `health_check` and an explicit `disconnect` ever flip
//! the flag to false; ordinary getter failures are reported, not acted on.

use super::transport::{Dialer, HttpDialer, RpcTransport};
use super::{BoolSetting, ModemController, RxChunk};
use crate::config::LinkConfig;
use crate::error::{ConnectError, ConnectErrorKind, LinkError};
use crate::xmlrpc::Value;
use crate::TrxState;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct LinkInner {
    /// `Some` exactly while connected
    transport: Option<Box<dyn RpcTransport>>,

    /// Receive buffer position already handed out by `read_new_rx_text`
    rx_cursor: u64,
}

pub struct RemoteLink {
    config: LinkConfig,
    dialer: Arc<dyn Dialer>,
    inner: Mutex<LinkInner>,

    /// Mirror of `inner.transport.is_some()`, written only under the lock
    connected: AtomicBool,
}

impl RemoteLink {
    pub fn new(config: LinkConfig) -> Self {
        Self::with_dialer(config, Arc::new(HttpDialer))
    }

    pub fn with_dialer(config: LinkConfig, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            config,
            dialer,
            inner: Mutex::new(LinkInner {
                transport: None,
                rx_cursor: 0,
            }),
            connected: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, LinkError> {
        let inner = self.inner.lock().await;
        let transport = inner.transport.as_deref().ok_or(LinkError::NotConnected)?;
        transport
            .call(method, params)
            .await
            .inspect_err(|e| debug!(method, error = %e, "fldigi call failed"))
    }

    async fn call_unit(&self, method: &str, params: Vec<Value>) -> Result<(), LinkError> {
        self.call(method, params).await.map(|_| ())
    }

    fn connect_error(&self, err: &LinkError) -> ConnectError {
        let (kind, detail) = match err {
            LinkError::Connect(e) => return e.clone(),
            LinkError::Connectivity { kind, message } => (*kind, message.clone()),
            other => (ConnectErrorKind::Other, other.to_string()),
        };
        ConnectError::for_endpoint(kind, &self.config.host, self.config.port, &detail)
    }
}

#[async_trait]
impl ModemController for RemoteLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<(), ConnectError> {
        let mut inner = self.inner.lock().await;
        if inner.transport.is_some() {
            return Ok(());
        }

        let transport = self
            .dialer
            .dial(&self.config)
            .map_err(|e| self.connect_error(&e))?;

        let name = match transport.call("fldigi.name", vec![]).await {
            Ok(value) => value.into_text().unwrap_or_default(),
            Err(e) => {
                let err = self.connect_error(&e);
                warn!(
                    host = %self.config.host,
                    port = self.config.port,
                    kind = %err.kind,
                    "failed to connect to fldigi: {}",
                    e
                );
                return Err(err);
            }
        };

        // Start at the end of the receive buffer so old history is not replayed
        let rx_cursor = match transport
            .call("text.get_rx_length", vec![])
            .await
            .and_then(|v| v.as_i64())
        {
            Ok(len) => len.max(0) as u64,
            Err(e) => {
                debug!(error = %e, "could not read rx length, starting cursor at 0");
                0
            }
        };

        inner.transport = Some(transport);
        inner.rx_cursor = rx_cursor;
        self.connected.store(true, Ordering::SeqCst);
        info!(
            host = %self.config.host,
            port = self.config.port,
            name = %name,
            "connected to fldigi"
        );
        Ok(())
    }

    async fn disconnect(&self) {
        let mut inner = self.inner.lock().await;
        let was_connected = inner.transport.take().is_some();
        self.connected.store(false, Ordering::SeqCst);
        if was_connected {
            info!("disconnected from fldigi");
        }
    }

    async fn health_check(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(transport) = inner.transport.as_deref() else {
            return false;
        };

        match transport.call("fldigi.name", vec![]).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "health check failed, marking link disconnected");
                inner.transport = None;
                self.connected.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    async fn version(&self) -> Result<String, LinkError> {
        self.call("fldigi.version", vec![]).await?.into_text()
    }

    async fn name(&self) -> Result<String, LinkError> {
        self.call("fldigi.name", vec![]).await?.into_text()
    }

    async fn modem(&self) -> Result<String, LinkError> {
        self.call("modem.get_name", vec![]).await?.into_text()
    }

    async fn set_modem(&self, name: &str) -> Result<(), LinkError> {
        self.call_unit("modem.set_by_name", vec![name.into()]).await
    }

    async fn modem_names(&self) -> Result<Vec<String>, LinkError> {
        self.call("modem.get_names", vec![]).await?.into_string_list()
    }

    async fn carrier(&self) -> Result<i64, LinkError> {
        self.call("modem.get_carrier", vec![]).await?.as_i64()
    }

    async fn set_carrier(&self, hz: i64) -> Result<(), LinkError> {
        self.call_unit("modem.set_carrier", vec![hz.into()]).await
    }

    async fn bandwidth(&self) -> Result<i64, LinkError> {
        self.call("modem.get_bandwidth", vec![]).await?.as_i64()
    }

    async fn set_bandwidth(&self, hz: i64) -> Result<(), LinkError> {
        self.call_unit("modem.set_bandwidth", vec![hz.into()]).await
    }

    async fn quality(&self) -> Result<f64, LinkError> {
        self.call("modem.get_quality", vec![]).await?.as_f64()
    }

    async fn status_line(&self) -> Result<String, LinkError> {
        self.call("main.get_status1", vec![]).await?.into_text()
    }

    async fn trx_state(&self) -> Result<TrxState, LinkError> {
        let value = self.call("main.get_trx_state", vec![]).await?;
        value.as_str()?.parse().map_err(LinkError::Protocol)
    }

    async fn transmit(&self) -> Result<(), LinkError> {
        self.call_unit("main.tx", vec![]).await
    }

    async fn receive(&self) -> Result<(), LinkError> {
        self.call_unit("main.rx", vec![]).await
    }

    async fn tune(&self) -> Result<(), LinkError> {
        self.call_unit("main.tune", vec![]).await
    }

    async fn abort(&self) -> Result<(), LinkError> {
        self.call_unit("main.abort", vec![]).await
    }

    async fn append_tx_text(&self, text: &str) -> Result<(), LinkError> {
        self.call_unit("text.add_tx", vec![text.into()]).await
    }

    async fn clear_tx(&self) -> Result<(), LinkError> {
        self.call_unit("text.clear_tx", vec![]).await
    }

    async fn clear_rx(&self) -> Result<(), LinkError> {
        let mut inner = self.inner.lock().await;
        let transport = inner.transport.as_deref().ok_or(LinkError::NotConnected)?;
        transport.call("text.clear_rx", vec![]).await?;
        inner.rx_cursor = 0;
        Ok(())
    }

    async fn read_new_rx_text(&self) -> Result<Option<RxChunk>, LinkError> {
        let mut inner = self.inner.lock().await;
        let mut cursor = inner.rx_cursor;
        let transport = inner.transport.as_deref().ok_or(LinkError::NotConnected)?;

        let length = transport
            .call("text.get_rx_length", vec![])
            .await?
            .as_i64()?
            .max(0) as u64;
        if length < cursor {
            // Buffer was cleared on the remote side
            debug!(length, cursor, "rx buffer shrank, restarting cursor");
            cursor = 0;
        }
        if length == cursor {
            inner.rx_cursor = cursor;
            return Ok(None);
        }

        let text = transport
            .call(
                "text.get_rx",
                vec![Value::Int(cursor as i64), Value::Int((length - cursor) as i64)],
            )
            .await?
            .into_text()?;
        inner.rx_cursor = length;

        Ok(Some(RxChunk {
            offset: cursor,
            text,
        }))
    }

    async fn rig_name(&self) -> Result<String, LinkError> {
        self.call("rig.get_name", vec![]).await?.into_text()
    }

    async fn rig_frequency(&self) -> Result<f64, LinkError> {
        self.call("rig.get_frequency", vec![]).await?.as_f64()
    }

    async fn set_rig_frequency(&self, hz: f64) -> Result<(), LinkError> {
        self.call_unit("rig.set_frequency", vec![hz.into()]).await
    }

    async fn rig_mode(&self) -> Result<String, LinkError> {
        self.call("rig.get_mode", vec![]).await?.into_text()
    }

    async fn set_rig_mode(&self, mode: &str) -> Result<(), LinkError> {
        self.call_unit("rig.set_mode", vec![mode.into()]).await
    }

    async fn bool_setting(&self, setting: BoolSetting) -> Result<bool, LinkError> {
        self.call(setting.getter(), vec![]).await?.as_bool()
    }

    async fn set_bool_setting(&self, setting: BoolSetting, on: bool) -> Result<(), LinkError> {
        self.call_unit(setting.setter(), vec![on.into()]).await
    }

    async fn squelch_level(&self) -> Result<f64, LinkError> {
        self.call("main.get_squelch_level", vec![]).await?.as_f64()
    }

    async fn set_squelch_level(&self, level: f64) -> Result<(), LinkError> {
        let level = level.clamp(0.0, 1.0);
        self.call_unit("main.set_squelch_level", vec![level.into()])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;

    /// Shared state behind every transport the scripted dialer hands out
    #[derive(Default)]
    struct Remote {
        calls: Vec<(String, Vec<Value>)>,
        alive: bool,
        refuse: bool,
        rx_buffer: String,
        dials: usize,
    }

    struct ScriptedTransport {
        remote: Arc<SyncMutex<Remote>>,
    }

    #[async_trait]
    impl RpcTransport for ScriptedTransport {
        async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, LinkError> {
            let mut remote = self.remote.lock();
            remote.calls.push((method.to_string(), params.clone()));
            if remote.refuse {
                return Err(LinkError::connectivity(
                    ConnectErrorKind::Refused,
                    "connection refused",
                ));
            }
            if !remote.alive {
                return Err(LinkError::connectivity(
                    ConnectErrorKind::Other,
                    "connection reset by peer",
                ));
            }
            match method {
                "fldigi.name" => Ok(Value::from("fldigi")),
                "text.get_rx_length" => Ok(Value::Int(remote.rx_buffer.len() as i64)),
                "text.get_rx" => {
                    let start = params[0].as_i64()? as usize;
                    let len = params[1].as_i64()? as usize;
                    Ok(Value::Base64(
                        remote.rx_buffer.as_bytes()[start..start + len].to_vec(),
                    ))
                }
                "text.clear_rx" => {
                    remote.rx_buffer.clear();
                    Ok(Value::Nil)
                }
                "main.get_trx_state" => Ok(Value::from("TX")),
                "modem.get_names" => Ok(Value::Array(vec![
                    Value::from("BPSK31"),
                    Value::from("RTTY"),
                ])),
                "modem.get_carrier" => Err(LinkError::Application {
                    code: 1,
                    message: "busy".to_string(),
                }),
                _ => Ok(Value::Nil),
            }
        }
    }

    struct ScriptedDialer {
        remote: Arc<SyncMutex<Remote>>,
    }

    impl Dialer for ScriptedDialer {
        fn dial(&self, _config: &LinkConfig) -> Result<Box<dyn RpcTransport>, LinkError> {
            self.remote.lock().dials += 1;
            Ok(Box::new(ScriptedTransport {
                remote: self.remote.clone(),
            }))
        }
    }

    fn link_with(remote: Remote) -> (RemoteLink, Arc<SyncMutex<Remote>>) {
        let remote = Arc::new(SyncMutex::new(remote));
        let dialer = Arc::new(ScriptedDialer {
            remote: remote.clone(),
        });
        (RemoteLink::with_dialer(LinkConfig::default(), dialer), remote)
    }

    fn alive() -> Remote {
        Remote {
            alive: true,
            ..Default::default()
        }
    }

    fn methods(remote: &Arc<SyncMutex<Remote>>) -> Vec<String> {
        remote.lock().calls.iter().map(|(m, _)| m.clone()).collect()
    }

    #[tokio::test]
    async fn test_getters_fail_fast_while_disconnected() {
        let (link, remote) = link_with(alive());

        assert!(!link.is_connected());
        assert_eq!(link.modem().await, Err(LinkError::NotConnected));
        assert_eq!(link.read_new_rx_text().await, Err(LinkError::NotConnected));
        assert!(!link.health_check().await);
        assert!(methods(&remote).is_empty());
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (link, remote) = link_with(alive());

        link.connect().await.unwrap();
        link.connect().await.unwrap();
        assert!(link.is_connected());
        assert_eq!(remote.lock().dials, 1);
    }

    #[tokio::test]
    async fn test_connect_refused_message() {
        let (link, _remote) = link_with(Remote {
            refuse: true,
            ..Default::default()
        });

        let err = link.connect().await.unwrap_err();
        assert_eq!(err.kind, ConnectErrorKind::Refused);
        assert!(err.message.contains("127.0.0.1:7362"));
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn test_failed_health_check_disconnects_once_and_for_all() {
        let (link, remote) = link_with(alive());
        link.connect().await.unwrap();
        assert!(link.health_check().await);

        remote.lock().alive = false;
        assert!(!link.health_check().await);
        assert!(!link.is_connected());

        // Subsequent calls fail without reaching the transport
        let before = remote.lock().calls.len();
        assert!(!link.health_check().await);
        assert_eq!(link.trx_state().await, Err(LinkError::NotConnected));
        assert_eq!(remote.lock().calls.len(), before);
    }

    #[tokio::test]
    async fn test_getter_failure_does_not_flip_connected() {
        let (link, remote) = link_with(alive());
        link.connect().await.unwrap();

        assert!(matches!(
            link.carrier().await,
            Err(LinkError::Application { .. })
        ));
        remote.lock().alive = false;
        assert!(link.modem().await.unwrap_err().is_connectivity());
        assert!(link.is_connected());
    }

    #[tokio::test]
    async fn test_rx_cursor_skips_history_and_tracks_new_text() {
        let (link, remote) = link_with(Remote {
            rx_buffer: "old history ".to_string(),
            ..alive()
        });
        link.connect().await.unwrap();

        assert_eq!(link.read_new_rx_text().await.unwrap(), None);

        remote.lock().rx_buffer.push_str("CQ CQ");
        let chunk = link.read_new_rx_text().await.unwrap().unwrap();
        assert_eq!(chunk.text, "CQ CQ");
        assert_eq!(chunk.offset, 12);

        remote.lock().rx_buffer.push_str(" DE K1ABC");
        let chunk = link.read_new_rx_text().await.unwrap().unwrap();
        assert_eq!(chunk.text, " DE K1ABC");
        assert_eq!(link.read_new_rx_text().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rx_cursor_restarts_when_buffer_shrinks() {
        let (link, remote) = link_with(Remote {
            rx_buffer: "a long line of old text".to_string(),
            ..alive()
        });
        link.connect().await.unwrap();

        // Cleared remotely, then new text arrives
        remote.lock().rx_buffer = "QRZ?".to_string();
        let chunk = link.read_new_rx_text().await.unwrap().unwrap();
        assert_eq!(chunk.text, "QRZ?");
        assert_eq!(chunk.offset, 0);
    }

    #[tokio::test]
    async fn test_clear_rx_resets_cursor() {
        let (link, remote) = link_with(Remote {
            rx_buffer: "abc".to_string(),
            ..alive()
        });
        link.connect().await.unwrap();
        link.clear_rx().await.unwrap();

        remote.lock().rx_buffer.push_str("abcdef");
        let chunk = link.read_new_rx_text().await.unwrap().unwrap();
        assert_eq!(chunk.text, "abcdef");
    }

    #[tokio::test]
    async fn test_queue_text_appends_return_marker_once() {
        let (link, remote) = link_with(alive());
        link.connect().await.unwrap();
        remote.lock().calls.clear();

        link.queue_text("CQ DE K1ABC").await.unwrap();
        link.queue_text("73^r").await.unwrap();

        let calls = remote.lock().calls.clone();
        let sent: Vec<&Value> = calls
            .iter()
            .filter(|(m, _)| m == "text.add_tx")
            .map(|(_, p)| &p[0])
            .collect();
        assert_eq!(sent, vec![&Value::from("CQ DE K1ABC^r"), &Value::from("73^r")]);
        assert_eq!(
            methods(&remote)[..3],
            ["text.clear_tx", "text.add_tx", "main.tx"]
        );
    }

    #[tokio::test]
    async fn test_squelch_level_is_clamped() {
        let (link, remote) = link_with(alive());
        link.connect().await.unwrap();

        link.set_squelch_level(1.7).await.unwrap();
        let calls = remote.lock().calls.clone();
        let (method, params) = calls.last().unwrap();
        assert_eq!(method, "main.set_squelch_level");
        assert_eq!(params[0], Value::Double(1.0));
    }

    #[tokio::test]
    async fn test_typed_getters() {
        let (link, _remote) = link_with(alive());
        link.connect().await.unwrap();

        assert_eq!(link.trx_state().await.unwrap(), TrxState::Tx);
        assert_eq!(link.modem_names().await.unwrap(), vec!["BPSK31", "RTTY"]);
    }
}
