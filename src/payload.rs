//! Outbound command payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::errors::Error;
use crate::types::{Brightness, Color, ColorCommand, ColorScale, Kelvin, PowerMode};

type Result<T> = std::result::Result<T, Error>;

/// Command names used on the wire.
pub mod cmd {
    pub const SCAN: &str = "scan";
    pub const TURN: &str = "turn";
    pub const BRIGHTNESS: &str = "brightness";
    pub const COLOR_TEM: &str = "colorTem";
    pub const DEV_STATUS: &str = "devStatus";
}

/// A validated command ready to be sent to a device.
///
/// Every payload serializes to the envelope
/// `{"msg": {"cmd": <name>, "data": <object>}}`. Constructors validate their
/// input, so a `Payload` that exists is always well formed.
///
/// # Examples
///
/// ```
/// use govee_lan_rs::{Payload, PowerMode};
///
/// let payload = Payload::turn(PowerMode::On);
/// assert_eq!(
///     payload.to_value(),
///     serde_json::json!({"msg": {"cmd": "turn", "data": {"value": 1}}})
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    msg: Message,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Message {
    cmd: String,
    data: Value,
}

/// Data object of the combined color/temperature family.
#[serde_with::skip_serializing_none]
#[derive(Debug, Serialize)]
struct ColorData {
    color: Option<Color>,
    #[serde(rename = "colorTemInKelvin")]
    kelvin: Option<u32>,
}

impl Payload {
    fn new(cmd: &str, data: Value) -> Self {
        Payload {
            msg: Message {
                cmd: cmd.to_string(),
                data,
            },
        }
    }

    /// Multicast scan request.
    pub fn scan() -> Self {
        Self::new(cmd::SCAN, json!({"account_topic": "reserve"}))
    }

    /// Status request, optionally scoped to one device behind a gateway.
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::Payload;
    ///
    /// assert_eq!(Payload::dev_status(None, None).to_string(), r#"{"msg":{"cmd":"devStatus","data":{}}}"#);
    /// let scoped = Payload::dev_status(Some("AB:CD"), Some("H6159")).to_value();
    /// assert_eq!(scoped["msg"]["data"]["device"], "AB:CD");
    /// ```
    pub fn dev_status(device_id: Option<&str>, sku: Option<&str>) -> Self {
        let mut data = Map::new();
        if let Some(id) = device_id {
            data.insert("device".into(), Value::from(id));
        }
        if let Some(sku) = sku {
            data.insert("sku".into(), Value::from(sku));
        }
        Self::new(cmd::DEV_STATUS, Value::Object(data))
    }

    /// Power on or off.
    pub fn turn(power: PowerMode) -> Self {
        Self::new(cmd::TURN, json!({"value": power.value()}))
    }

    /// Set brightness in percent.
    pub fn brightness(brightness: &Brightness) -> Self {
        Self::new(cmd::BRIGHTNESS, json!({"value": brightness.value()}))
    }

    /// Set the white color temperature.
    pub fn color_temperature(kelvin: &Kelvin) -> Self {
        Self::new(cmd::COLOR_TEM, json!({"value": kelvin.kelvin()}))
    }

    /// Build a payload of the combined color/temperature family.
    ///
    /// The color is rescaled to `scale` before it is placed in the payload.
    /// Variants that require a color or a Kelvin value fail validation
    /// without it.
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::{Color, ColorCommand, ColorScale, Kelvin, Payload};
    ///
    /// let p = Payload::color(
    ///     ColorCommand::SetColor,
    ///     Some(Color::rgb(255, 128, 0)),
    ///     None,
    ///     ColorScale::Percent,
    /// ).unwrap();
    /// assert_eq!(p.to_value()["msg"]["data"]["color"], serde_json::json!({"r": 100, "g": 50, "b": 0}));
    ///
    /// let kelvin = Kelvin::create(2700).unwrap();
    /// assert!(Payload::color(ColorCommand::ColorWc, None, Some(kelvin), ColorScale::Full).is_ok());
    /// assert!(Payload::color(ColorCommand::Color, None, Some(kelvin), ColorScale::Full).is_err());
    /// ```
    pub fn color(
        command: ColorCommand,
        color: Option<Color>,
        kelvin: Option<Kelvin>,
        scale: ColorScale,
    ) -> Result<Self> {
        let color = color.map(|c| c.scaled(scale));

        if command.requires_color() && color.is_none() {
            return Err(Error::MissingColor {
                cmd: command.to_string(),
            });
        }
        if command.requires_kelvin() && kelvin.is_none() {
            return Err(Error::MissingKelvin {
                cmd: command.to_string(),
            });
        }

        let data = ColorData {
            color,
            kelvin: kelvin.map(|k| k.kelvin()),
        };
        let data = serde_json::to_value(&data).map_err(Error::JsonDump)?;
        Ok(Self::new(command.as_ref(), data))
    }

    /// The command name.
    pub fn cmd(&self) -> &str {
        &self.msg.cmd
    }

    /// The `data` object.
    pub fn data(&self) -> &Value {
        &self.msg.data
    }

    /// The full envelope as a JSON value.
    pub fn to_value(&self) -> Value {
        json!({"msg": {"cmd": self.msg.cmd, "data": self.msg.data}})
    }

    /// Compact wire encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::JsonDump)
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<PowerMode> for Payload {
    fn from(power: PowerMode) -> Self {
        Payload::turn(power)
    }
}

impl From<&Brightness> for Payload {
    fn from(brightness: &Brightness) -> Self {
        Payload::brightness(brightness)
    }
}

impl From<&Kelvin> for Payload {
    fn from(kelvin: &Kelvin) -> Self {
        Payload::color_temperature(kelvin)
    }
}
