//! HTTP transport for fldigi's XML-RPC endpoint
//!
//! Every call is an independent POST to `http://host:port/RPC2`. There is no
//! persistent socket, so "connected" is a property the link tracks itself.

use crate::config::LinkConfig;
use crate::error::{ConnectErrorKind, LinkError};
use crate::xmlrpc::{encode_call, parse_response, Value};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::error::Error as StdError;
use std::io;

/// One XML-RPC round trip
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, LinkError>;
}

/// Produces a transport for an endpoint. The link asks for a fresh one on
/// every connect so a stale client never outlives a disconnect.
pub trait Dialer: Send + Sync {
    fn dial(&self, config: &LinkConfig) -> Result<Box<dyn RpcTransport>, LinkError>;
}

/// Dialer for the real fldigi HTTP endpoint
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpDialer;

impl Dialer for HttpDialer {
    fn dial(&self, config: &LinkConfig) -> Result<Box<dyn RpcTransport>, LinkError> {
        Ok(Box::new(HttpTransport::new(config)?))
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(config: &LinkConfig) -> Result<Self, LinkError> {
        let client = reqwest::Client::builder()
            .timeout(config.call_timeout)
            .connect_timeout(config.call_timeout)
            .build()
            .map_err(|e| LinkError::connectivity(ConnectErrorKind::Other, e.to_string()))?;

        Ok(Self {
            client,
            url: config.url(),
        })
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, LinkError> {
        let body = encode_call(method, &params);

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LinkError::connectivity(
                ConnectErrorKind::Other,
                format!("{method}: HTTP {status}"),
            ));
        }

        let text = response.text().await.map_err(classify)?;
        parse_response(&text)
    }
}

/// Map a reqwest failure onto the connectivity classes
fn classify(err: reqwest::Error) -> LinkError {
    let kind = if err.is_timeout() {
        ConnectErrorKind::Timeout
    } else if is_refused(&err) {
        ConnectErrorKind::Refused
    } else {
        ConnectErrorKind::Other
    };
    LinkError::connectivity(kind, err.to_string())
}

fn is_refused(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = cause.source();
    }
    false
}
