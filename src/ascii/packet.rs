use crate::ascii::command::{Command, FieldKind, Schema};
use crate::checksum;
use crate::error::Error;
use crate::prelude::*;

use serde::{Deserialize, Serialize};

pub const TERMINATOR: u8 = b'\r';
pub const MIN_RESPONSE_LEN: usize = 5;

/// One decoded response token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Integer, else float, else the token itself. Never fails.
    pub fn parse(token: &str) -> Self {
        if let Ok(i) = token.parse::<i64>() {
            return Self::Int(i);
        }
        // f64::from_str also accepts "inf" and "NaN", which are text here
        let numeric = token
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
        if numeric && token.chars().any(|c| c.is_ascii_digit()) {
            if let Ok(f) = token.parse::<f64>() {
                return Self::Float(f);
            }
        }
        Self::Text(token.to_owned())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Text(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

/// Decoded fields of one response, in wire order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AsciiFields {
    fields: Vec<(String, FieldValue)>,
}

impl AsciiFields {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FieldValue::as_f64)
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    fn push(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.push((name.into(), value));
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .fields
            .iter()
            .map(|(n, v)| (n.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

/// `command + crc (low byte first) + CR`
pub fn encode_command(command: &str) -> Vec<u8> {
    let mut r = checksum::append_crc(command.as_bytes());
    r.push(TERMINATOR);
    r
}

/// Validates length and checksum, returning the payload text.
pub fn split_response(response: &[u8]) -> Result<&str, Error> {
    if response.len() < MIN_RESPONSE_LEN {
        return Err(Error::ShortResponse {
            len: response.len(),
            min: MIN_RESPONSE_LEN,
        });
    }

    let (payload, tail) = response.split_at(response.len() - 3);
    let received = checksum::wire_crc([tail[0], tail[1]]);
    let calculated = checksum::crc16(payload);
    if received != calculated {
        return Err(Error::ChecksumMismatch {
            received,
            calculated,
        });
    }

    if !payload.is_ascii() {
        return Err(Error::DecodeAsciiFailure(format!(
            "non-ascii payload {:02X?}",
            payload
        )));
    }
    std::str::from_utf8(payload).map_err(|err| Error::DecodeAsciiFailure(err.to_string()))
}

/// Validates and decodes a full response frame to `command`.
pub fn decode_response(command: Command, response: &[u8]) -> Result<AsciiFields, Error> {
    let payload = split_response(response)?;
    trace!("{} payload {:?}", command, payload);
    Ok(decode_payload(command.schema(), payload))
}

/// Decodes the response to a command outside the table into a single `raw`
/// text field.
pub fn decode_raw(response: &[u8]) -> Result<AsciiFields, Error> {
    let payload = split_response(response)?;
    let mut r = AsciiFields::default();
    r.push("raw", FieldValue::Text(strip_paren(payload).trim().to_owned()));
    Ok(r)
}

fn strip_paren(payload: &str) -> &str {
    payload.strip_prefix('(').unwrap_or(payload)
}

/// Zips payload tokens against `schema`. Missing tokens are left out;
/// surplus ones become `reserved_{n}` where n is the token position.
pub fn decode_payload(schema: Schema, payload: &str) -> AsciiFields {
    let payload = strip_paren(payload).trim();
    let mut r = AsciiFields::default();

    match schema {
        Schema::Whole { name, strip_prefix } => {
            let value = strip_prefix
                .and_then(|p| payload.strip_prefix(p))
                .unwrap_or(payload)
                .trim();
            if !value.is_empty() {
                r.push(name, FieldValue::Text(value.to_owned()));
            }
        }
        Schema::Fields(specs) => {
            for (index, token) in payload.split_whitespace().enumerate() {
                match specs.get(index) {
                    Some(spec) => {
                        let value = match spec.kind {
                            FieldKind::Auto => FieldValue::parse(token),
                            FieldKind::Text => FieldValue::Text(token.to_owned()),
                        };
                        r.push(spec.name, value);
                    }
                    None => r.push(format!("reserved_{}", index), FieldValue::parse(token)),
                }
            }
        }
    }

    r
}
