//! Parser for XML-RPC `methodResponse` documents
//!
//! A response carries either a single value:
//! - `<methodResponse><params><param><value>...</value></param></params></methodResponse>`
//!
//! or a fault struct with `faultCode` and `faultString` members:
//! - `<methodResponse><fault><value><struct>...</struct></value></fault></methodResponse>`

use super::escape::unescape_text;
use super::value::Value;
use crate::error::LinkError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;

/// Parse a `methodResponse` body.
///
/// Faults become `LinkError::Application`; anything that is not a well-formed
/// response becomes `LinkError::Protocol`. An empty `<params/>` yields `Nil`.
pub fn parse_response(body: &str) -> Result<Value, LinkError> {
    let mut reader = Reader::new(body);
    reader.skip_prolog();
    reader.expect_open("methodResponse")?;

    let tag = reader.next_tag()?;
    let value = match (tag.name, tag.kind) {
        ("params", TagKind::Empty) => Value::Nil,
        ("params", TagKind::Open) => {
            if reader.peek_is_close("params")? {
                reader.expect_close("params")?;
                Value::Nil
            } else {
                reader.expect_open("param")?;
                let value = parse_value(&mut reader)?;
                reader.expect_close("param")?;
                reader.expect_close("params")?;
                value
            }
        }
        ("fault", TagKind::Open) => {
            let fault = parse_value(&mut reader)?;
            reader.expect_close("fault")?;
            return Err(fault_error(&fault));
        }
        _ => {
            return Err(LinkError::protocol(format!(
                "expected <params> or <fault>, found {tag}"
            )))
        }
    };

    reader.expect_close("methodResponse")?;
    Ok(value)
}

fn fault_error(fault: &Value) -> LinkError {
    let code = fault
        .member("faultCode")
        .and_then(|v| v.as_i64().ok())
        .unwrap_or_default();
    let message = fault
        .member("faultString")
        .and_then(|v| v.as_str().ok())
        .unwrap_or("unknown fault")
        .to_string();
    LinkError::Application { code, message }
}

fn parse_value(reader: &mut Reader<'_>) -> Result<Value, LinkError> {
    let tag = reader.next_tag()?;
    match (tag.name, tag.kind) {
        ("value", TagKind::Empty) => return Ok(Value::String(String::new())),
        ("value", TagKind::Open) => {}
        _ => return Err(LinkError::protocol(format!("expected <value>, found {tag}"))),
    }

    // Untyped content is a string
    let text = reader.read_text();
    if reader.peek_is_close("value")? {
        reader.expect_close("value")?;
        return Ok(Value::String(unescape_text(text)?));
    }
    if !text.trim().is_empty() {
        return Err(LinkError::protocol("text mixed with typed value"));
    }

    let ty = reader.next_tag()?;
    let value = match ty.kind {
        TagKind::Empty => match ty.name {
            "string" => Value::String(String::new()),
            "base64" => Value::Base64(Vec::new()),
            "nil" => Value::Nil,
            "struct" => Value::Struct(Vec::new()),
            other => return Err(LinkError::protocol(format!("empty <{other}/> has no value"))),
        },
        TagKind::Open => parse_typed(reader, ty.name)?,
        TagKind::Close => return Err(LinkError::protocol(format!("unexpected {ty}"))),
    };

    reader.expect_close("value")?;
    Ok(value)
}

fn parse_typed(reader: &mut Reader<'_>, name: &str) -> Result<Value, LinkError> {
    let value = match name {
        "array" => return parse_array(reader),
        "struct" => return parse_struct(reader),
        "nil" => Value::Nil,
        "i4" | "int" | "i8" => {
            let text = reader.read_text().trim();
            Value::Int(
                text.parse()
                    .map_err(|_| LinkError::protocol(format!("invalid int: {text}")))?,
            )
        }
        "boolean" => match reader.read_text().trim() {
            "1" => Value::Bool(true),
            "0" => Value::Bool(false),
            other => return Err(LinkError::protocol(format!("invalid boolean: {other}"))),
        },
        "double" => {
            let text = reader.read_text().trim();
            Value::Double(
                text.parse()
                    .map_err(|_| LinkError::protocol(format!("invalid double: {text}")))?,
            )
        }
        "string" | "dateTime.iso8601" => Value::String(unescape_text(reader.read_text())?),
        "base64" => {
            let compact: String = reader
                .read_text()
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            Value::Base64(
                STANDARD
                    .decode(compact)
                    .map_err(|e| LinkError::protocol(format!("invalid base64: {e}")))?,
            )
        }
        other => return Err(LinkError::protocol(format!("unsupported type <{other}>"))),
    };

    reader.expect_close(name)?;
    Ok(value)
}

fn parse_array(reader: &mut Reader<'_>) -> Result<Value, LinkError> {
    let data = reader.next_tag()?;
    let mut items = Vec::new();
    match (data.name, data.kind) {
        ("data", TagKind::Empty) => {}
        ("data", TagKind::Open) => {
            while !reader.peek_is_close("data")? {
                items.push(parse_value(reader)?);
            }
            reader.expect_close("data")?;
        }
        _ => return Err(LinkError::protocol(format!("expected <data>, found {data}"))),
    }
    reader.expect_close("array")?;
    Ok(Value::Array(items))
}

fn parse_struct(reader: &mut Reader<'_>) -> Result<Value, LinkError> {
    let mut members = Vec::new();
    while !reader.peek_is_close("struct")? {
        reader.expect_open("member")?;
        reader.expect_open("name")?;
        let name = unescape_text(reader.read_text())?;
        reader.expect_close("name")?;
        let value = parse_value(reader)?;
        reader.expect_close("member")?;
        members.push((name, value));
    }
    reader.expect_close("struct")?;
    Ok(Value::Struct(members))
}

// ============================================
// Tokenizer
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
    Empty,
}

#[derive(Debug, Clone, Copy)]
struct Tag<'a> {
    name: &'a str,
    kind: TagKind,
}

impl fmt::Display for Tag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TagKind::Open => write!(f, "<{}>", self.name),
            TagKind::Close => write!(f, "</{}>", self.name),
            TagKind::Empty => write!(f, "<{}/>", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Skip the XML declaration, processing instructions and comments
    fn skip_prolog(&mut self) {
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            let end = if rest.starts_with("<?") {
                rest.find("?>").map(|i| i + 2)
            } else if rest.starts_with("<!--") {
                rest.find("-->").map(|i| i + 3)
            } else {
                None
            };
            match end {
                Some(n) => self.pos += n,
                None => break,
            }
        }
    }

    fn next_tag(&mut self) -> Result<Tag<'a>, LinkError> {
        self.skip_whitespace();
        let rest = self.rest();
        if !rest.starts_with('<') {
            return Err(if rest.is_empty() {
                LinkError::protocol("unexpected end of document")
            } else {
                LinkError::protocol("expected a tag")
            });
        }
        let end = rest
            .find('>')
            .ok_or_else(|| LinkError::protocol("unterminated tag"))?;
        let inner = &rest[1..end];
        self.pos += end + 1;

        let (kind, body) = if let Some(body) = inner.strip_prefix('/') {
            (TagKind::Close, body)
        } else if let Some(body) = inner.strip_suffix('/') {
            (TagKind::Empty, body)
        } else {
            (TagKind::Open, inner)
        };
        // Attributes are not part of XML-RPC; ignore any that appear
        let name = body.split_whitespace().next().unwrap_or_default();
        if name.is_empty() {
            return Err(LinkError::protocol("empty tag name"));
        }

        Ok(Tag { name, kind })
    }

    fn peek_is_close(&self, name: &str) -> Result<bool, LinkError> {
        let mut lookahead = *self;
        let tag = lookahead.next_tag()?;
        Ok(tag.kind == TagKind::Close && tag.name == name)
    }

    fn expect_open(&mut self, name: &str) -> Result<(), LinkError> {
        let tag = self.next_tag()?;
        if tag.kind == TagKind::Open && tag.name == name {
            Ok(())
        } else {
            Err(LinkError::protocol(format!("expected <{name}>, found {tag}")))
        }
    }

    fn expect_close(&mut self, name: &str) -> Result<(), LinkError> {
        let tag = self.next_tag()?;
        if tag.kind == TagKind::Close && tag.name == name {
            Ok(())
        } else {
            Err(LinkError::protocol(format!("expected </{name}>, found {tag}")))
        }
    }

    /// Raw text up to the next tag, whitespace preserved
    fn read_text(&mut self) -> &'a str {
        let rest = self.rest();
        let end = rest.find('<').unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }
}
