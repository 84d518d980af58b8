//! Inbound datagram decoding.
//!
//! Decoding never fails: every byte sequence maps onto one [`Inbound`]
//! variant, and the caller decides what each variant means for it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A decoded protocol envelope `{"msg": {"cmd": .., "data": ..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub msg: EnvelopeMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMessage {
    pub cmd: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn cmd(&self) -> &str {
        &self.msg.cmd
    }

    /// The `data` member, when it is a JSON object.
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.msg.data.as_object()
    }
}

/// Result of decoding one datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A well-formed envelope. `raw` is the full object as received.
    Envelope { envelope: Envelope, raw: Value },
    /// Valid JSON object that does not have the envelope shape.
    Unrecognized(Value),
    /// Not UTF-8, not JSON, or JSON that is not an object.
    Undecodable,
}

impl Inbound {
    /// The decoded JSON object, if there is one.
    pub fn json(&self) -> Option<&Value> {
        match self {
            Inbound::Envelope { raw, .. } => Some(raw),
            Inbound::Unrecognized(raw) => Some(raw),
            Inbound::Undecodable => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Inbound::Envelope { raw, .. } => Some(raw),
            Inbound::Unrecognized(raw) => Some(raw),
            Inbound::Undecodable => None,
        }
    }

    /// Command name carried by the envelope, if any.
    pub fn cmd(&self) -> Option<&str> {
        match self {
            Inbound::Envelope { envelope, .. } => Some(envelope.cmd()),
            _ => None,
        }
    }

    /// The envelope when its command is `cmd` and its data is an object.
    pub fn data_for(&self, cmd: &str) -> Option<&Map<String, Value>> {
        match self {
            Inbound::Envelope { envelope, .. } if envelope.cmd() == cmd => envelope.data(),
            _ => None,
        }
    }
}

/// Decode a datagram.
///
/// # Examples
///
/// ```
/// use govee_lan_rs::{Inbound, decode};
///
/// assert_eq!(decode(b"\xff\xfe"), Inbound::Undecodable);
/// assert_eq!(decode(b"[1, 2]"), Inbound::Undecodable);
/// assert!(matches!(decode(br#"{"hello": 1}"#), Inbound::Unrecognized(_)));
/// assert_eq!(decode(br#"{"msg":{"cmd":"scan","data":{}}}"#).cmd(), Some("scan"));
/// ```
pub fn decode(bytes: &[u8]) -> Inbound {
    let Ok(text) = std::str::from_utf8(bytes) else {
        return Inbound::Undecodable;
    };
    let Ok(raw) = serde_json::from_str::<Value>(text) else {
        return Inbound::Undecodable;
    };
    if !raw.is_object() {
        return Inbound::Undecodable;
    }

    match Envelope::deserialize(&raw) {
        Ok(envelope) => Inbound::Envelope { envelope, raw },
        Err(_) => Inbound::Unrecognized(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncated_and_garbage_bytes() {
        let full = br#"{"msg":{"cmd":"devStatus","data":{"onOff":1}}}"#;
        for cut in 0..full.len() - 1 {
            assert_eq!(decode(&full[..cut]), Inbound::Undecodable, "cut at {cut}");
        }
        assert_eq!(decode(&[0xc3, 0x28]), Inbound::Undecodable);
        assert_eq!(decode(b"test"), Inbound::Undecodable);
        assert_eq!(decode(b"42"), Inbound::Undecodable);
    }

    #[test]
    fn test_envelope_shapes() {
        let inbound = decode(br#"{"msg":{"cmd":"devStatus","data":{"onOff":1}}}"#);
        assert_eq!(inbound.cmd(), Some("devStatus"));
        assert_eq!(
            inbound.data_for("devStatus").and_then(|d| d.get("onOff")),
            Some(&json!(1))
        );
        assert!(inbound.data_for("scan").is_none());

        // cmd must be a string
        assert!(matches!(
            decode(br#"{"msg":{"cmd":7,"data":{}}}"#),
            Inbound::Unrecognized(_)
        ));
        // msg must be an object
        assert!(matches!(decode(br#"{"msg":"scan"}"#), Inbound::Unrecognized(_)));
    }

    #[test]
    fn test_missing_or_non_object_data() {
        let inbound = decode(br#"{"msg":{"cmd":"scan"}}"#);
        assert_eq!(inbound.cmd(), Some("scan"));
        assert!(inbound.data_for("scan").is_none());

        let inbound = decode(br#"{"msg":{"cmd":"scan","data":[1]}}"#);
        assert!(inbound.data_for("scan").is_none());
    }

    #[test]
    fn test_raw_object_preserved() {
        let inbound = decode(br#"{"msg":{"cmd":"x","data":{}},"extra":true}"#);
        assert_eq!(inbound.json().unwrap()["extra"], json!(true));
    }
}
