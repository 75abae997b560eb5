use super::escape::escape_text;
use crate::error::LinkError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt::Write;

/// A decoded XML-RPC value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Double(f64),
    String(String),
    Base64(Vec<u8>),
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
    Nil,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "boolean",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Base64(_) => "base64",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Nil => "nil",
        }
    }

    fn mismatch(&self, expected: &str) -> LinkError {
        LinkError::protocol(format!("expected {expected}, got {}", self.type_name()))
    }

    pub fn as_str(&self) -> Result<&str, LinkError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }

    pub fn as_i64(&self) -> Result<i64, LinkError> {
        match self {
            Value::Int(n) => Ok(*n),
            other => Err(other.mismatch("int")),
        }
    }

    /// Doubles are also accepted from integer nodes
    pub fn as_f64(&self) -> Result<f64, LinkError> {
        match self {
            Value::Double(n) => Ok(*n),
            Value::Int(n) => Ok(*n as f64),
            other => Err(other.mismatch("double")),
        }
    }

    /// fldigi sometimes answers boolean getters with `0`/`1` ints
    pub fn as_bool(&self) -> Result<bool, LinkError> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(n) => Ok(*n != 0),
            other => Err(other.mismatch("boolean")),
        }
    }

    /// Text from a string or base64 node. Invalid UTF-8 in base64 payloads is
    /// replaced rather than rejected since decoder output is often noisy.
    pub fn into_text(self) -> Result<String, LinkError> {
        match self {
            Value::String(s) => Ok(s),
            Value::Base64(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            other => Err(other.mismatch("string or base64")),
        }
    }

    pub fn into_string_list(self) -> Result<Vec<String>, LinkError> {
        match self {
            Value::Array(items) => items.into_iter().map(Value::into_text).collect(),
            other => Err(other.mismatch("array")),
        }
    }

    /// Look up a struct member by name
    pub fn member(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(members) => members.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    fn write_xml(&self, out: &mut String) {
        out.push_str("<value>");
        match self {
            Value::Int(n) => {
                let _ = write!(out, "<int>{n}</int>");
            }
            Value::Bool(b) => {
                let _ = write!(out, "<boolean>{}</boolean>", u8::from(*b));
            }
            Value::Double(n) => {
                let _ = write!(out, "<double>{n:?}</double>");
            }
            Value::String(s) => {
                out.push_str("<string>");
                out.push_str(&escape_text(s));
                out.push_str("</string>");
            }
            Value::Base64(bytes) => {
                out.push_str("<base64>");
                out.push_str(&STANDARD.encode(bytes));
                out.push_str("</base64>");
            }
            Value::Array(items) => {
                out.push_str("<array><data>");
                for item in items {
                    item.write_xml(out);
                }
                out.push_str("</data></array>");
            }
            Value::Struct(members) => {
                out.push_str("<struct>");
                for (name, value) in members {
                    out.push_str("<member><name>");
                    out.push_str(&escape_text(name));
                    out.push_str("</name>");
                    value.write_xml(out);
                    out.push_str("</member>");
                }
                out.push_str("</struct>");
            }
            Value::Nil => out.push_str("<nil/>"),
        }
        out.push_str("</value>");
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Serialize a `methodCall` document
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(128);
    out.push_str("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape_text(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        param.write_xml(&mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}
