//! Device status as reported by `devStatus`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Color;

/// Key prefix for status fields normalized into the registry.
pub const STATUS_KEY_PREFIX: &str = "status.";

/// The well-known fields of a `devStatus` reply.
///
/// Values are kept as the raw JSON the device sent, since models disagree on
/// types (`onOff` is `1` on most, `true` on some).
#[serde_with::skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeviceStatus {
    #[serde(rename = "onOff")]
    on_off: Option<Value>,
    brightness: Option<Value>,
    color: Option<Value>,
    #[serde(rename = "colorTemInKelvin")]
    color_tem_in_kelvin: Option<Value>,
}

impl DeviceStatus {
    /// Pick the well-known fields out of a reply's `data` object.
    pub fn from_data(data: &Map<String, Value>) -> Self {
        let field = |key: &str| data.get(key).cloned();
        DeviceStatus {
            on_off: field("onOff"),
            brightness: field("brightness"),
            color: field("color"),
            color_tem_in_kelvin: field("colorTemInKelvin"),
        }
    }

    /// Check if the light reports itself on.
    pub fn emitting(&self) -> Option<bool> {
        match self.on_off.as_ref()? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|v| v != 0),
            _ => None,
        }
    }

    pub fn brightness(&self) -> Option<u8> {
        self.brightness
            .as_ref()
            .and_then(Value::as_u64)
            .and_then(|v| u8::try_from(v).ok())
    }

    pub fn color(&self) -> Option<Color> {
        self.color
            .as_ref()
            .filter(|c| c.is_object())
            .and_then(|c| serde_json::from_value(c.clone()).ok())
    }

    pub fn kelvin(&self) -> Option<u32> {
        self.color_tem_in_kelvin
            .as_ref()
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    /// Present fields as `(registry key, raw value)` pairs.
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::DeviceStatus;
    /// use serde_json::json;
    ///
    /// let data = json!({"onOff": 1, "brightness": 80});
    /// let status = DeviceStatus::from_data(data.as_object().unwrap());
    /// let keys: Vec<String> = status.key_values().into_iter().map(|(k, _)| k).collect();
    /// assert_eq!(keys, ["status.onOff", "status.brightness"]);
    /// ```
    pub fn key_values(&self) -> Vec<(String, Value)> {
        [
            ("onOff", &self.on_off),
            ("brightness", &self.brightness),
            ("color", &self.color),
            ("colorTemInKelvin", &self.color_tem_in_kelvin),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .as_ref()
                .map(|v| (format!("{STATUS_KEY_PREFIX}{name}"), v.clone()))
        })
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.key_values().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status(data: Value) -> DeviceStatus {
        DeviceStatus::from_data(data.as_object().unwrap())
    }

    #[test]
    fn test_typed_accessors() {
        let s = status(json!({
            "onOff": 1,
            "brightness": 80,
            "color": {"r": 255, "g": 10, "b": 0},
            "colorTemInKelvin": 3000,
            "pactType": 1
        }));
        assert_eq!(s.emitting(), Some(true));
        assert_eq!(s.brightness(), Some(80));
        assert_eq!(s.color(), Some(Color::rgb(255, 10, 0)));
        assert_eq!(s.kelvin(), Some(3000));
        assert_eq!(s.key_values().len(), 4);
    }

    #[test]
    fn test_absent_fields_are_skipped() {
        let s = status(json!({"onOff": false}));
        assert_eq!(s.emitting(), Some(false));
        assert_eq!(s.key_values(), vec![("status.onOff".to_string(), json!(false))]);

        assert!(status(json!({"unrelated": 1})).is_empty());
    }

    #[test]
    fn test_odd_types_preserved_raw() {
        let s = status(json!({"brightness": "high", "color": [1, 2, 3]}));
        assert_eq!(s.brightness(), None);
        assert_eq!(s.color(), None);
        assert_eq!(
            s.key_values(),
            vec![
                ("status.brightness".to_string(), json!("high")),
                ("status.color".to_string(), json!([1, 2, 3])),
            ]
        );
    }
}
