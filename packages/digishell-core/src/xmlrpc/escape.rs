//! XML character entity encoding for XML-RPC text nodes
//!
//! Encoding escapes `&`, `<`, `>`, `"` and `'`. Decoding also understands
//! numeric references (`&#65;`, `&#x41;`).

use crate::error::LinkError;

/// Escape text for use inside an XML element.
///
/// # Examples
/// ```
/// use digishell_core::xmlrpc::escape_text;
///
/// assert_eq!(escape_text("CQ <de> K1ABC & co"), "CQ &lt;de&gt; K1ABC &amp; co");
/// assert_eq!(escape_text("plain"), "plain");
/// ```
pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Decode XML character entities.
///
/// # Examples
/// ```
/// use digishell_core::xmlrpc::unescape_text;
///
/// assert_eq!(unescape_text("a &lt;b&gt; &amp;&#65;&#x42;").unwrap(), "a <b> &AB");
/// assert!(unescape_text("&bogus;").is_err());
/// ```
pub fn unescape_text(input: &str) -> Result<String, LinkError> {
    if !input.contains('&') {
        return Ok(input.to_string());
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after
            .find(';')
            .ok_or_else(|| LinkError::protocol("unterminated character entity"))?;
        out.push(decode_entity(&after[..semi])?);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

fn decode_entity(name: &str) -> Result<char, LinkError> {
    let decoded = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name
                .strip_prefix("#x")
                .or_else(|| name.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok()
            } else {
                None
            };
            code.and_then(char::from_u32)
        }
    };

    decoded.ok_or_else(|| LinkError::protocol(format!("unknown character entity: &{name};")))
}
