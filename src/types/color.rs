//! RGB colors, named colors and the 0-100 channel scale.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::Error;
use crate::types::ColorScale;

/// Colors accepted by name. Lookup ignores case, `-` and `_`.
const NAMED_COLORS: [(&str, Color); 11] = [
    ("red", Color::rgb(255, 0, 0)),
    ("green", Color::rgb(0, 255, 0)),
    ("blue", Color::rgb(0, 0, 255)),
    ("white", Color::rgb(255, 255, 255)),
    ("warmwhite", Color::rgb(255, 244, 229)),
    ("yellow", Color::rgb(255, 255, 0)),
    ("orange", Color::rgb(255, 165, 0)),
    ("purple", Color::rgb(128, 0, 128)),
    ("pink", Color::rgb(255, 105, 180)),
    ("cyan", Color::rgb(0, 255, 255)),
    ("magenta", Color::rgb(255, 0, 255)),
];

/// An RGB color with red, green, and blue components.
///
/// Serializes to the wire shape `{"r": .., "g": .., "b": ..}`.
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    #[serde(rename = "r")]
    pub(crate) red: u8,
    #[serde(rename = "g")]
    pub(crate) green: u8,
    #[serde(rename = "b")]
    pub(crate) blue: u8,
}

impl Color {
    /// Create a color with the given RGB values.
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    pub fn red(&self) -> u8 {
        self.red
    }

    pub fn green(&self) -> u8 {
        self.green
    }

    pub fn blue(&self) -> u8 {
        self.blue
    }

    /// Look up a color from the fixed name table.
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::Color;
    ///
    /// assert_eq!(Color::named("Warm-White"), Some(Color::rgb(255, 244, 229)));
    /// assert_eq!(Color::named("teal"), None);
    /// ```
    pub fn named(name: &str) -> Option<Self> {
        let key = name.trim().to_ascii_lowercase();
        let key = match key.as_str() {
            "warm-white" | "warm_white" => "warmwhite",
            other => other,
        };
        NAMED_COLORS
            .iter()
            .find(|(n, _)| *n == key)
            .map(|(_, color)| *color)
    }

    /// Rescale the channels for a device that expects the given range.
    ///
    /// At [`ColorScale::Percent`] each channel becomes
    /// `round(channel / 255 * 100)`. The exact quotient never ends in `.5` for
    /// an integer channel, so no tie-breaking rule is involved.
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::{Color, ColorScale};
    ///
    /// let c = Color::rgb(255, 128, 0).scaled(ColorScale::Percent);
    /// assert_eq!(c, Color::rgb(100, 50, 0));
    /// ```
    pub fn scaled(&self, scale: ColorScale) -> Self {
        match scale {
            ColorScale::Full => *self,
            ColorScale::Percent => Self::rgb(
                percent(self.red),
                percent(self.green),
                percent(self.blue),
            ),
        }
    }
}

fn percent(channel: u8) -> u8 {
    ((u16::from(channel) * 100 + 127) / 255) as u8
}

impl FromStr for Color {
    type Err = Error;

    /// Parse a color name (`red`, `warm-white`, ...) or a hex literal
    /// (`ff8800` / `#FF8800`).
    fn from_str(s: &str) -> Result<Self, Error> {
        if let Some(color) = Self::named(s) {
            return Ok(color);
        }

        let hex = s.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidColorString(s.to_string()));
        }

        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| Error::InvalidColorString(s.to_string()))
        };
        Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_colors_case_insensitive() {
        for (name, expected) in NAMED_COLORS {
            assert_eq!(Color::from_str(name).unwrap(), expected);
            assert_eq!(Color::from_str(&name.to_uppercase()).unwrap(), expected);
        }
        assert_eq!(
            Color::from_str("warm-white").unwrap(),
            Color::rgb(255, 244, 229)
        );
        assert_eq!(
            Color::from_str("Warm_White").unwrap(),
            Color::rgb(255, 244, 229)
        );
        assert_eq!(Color::from_str(" Cyan ").unwrap(), Color::rgb(0, 255, 255));
    }

    #[test]
    fn test_hex_colors() {
        assert_eq!(Color::from_str("ff8800").unwrap(), Color::rgb(255, 136, 0));
        assert_eq!(Color::from_str("#FF8800").unwrap(), Color::rgb(255, 136, 0));
        assert_eq!(Color::from_str("#0a0B0c").unwrap(), Color::rgb(10, 11, 12));
        assert_eq!(Color::from_str("000000").unwrap(), Color::rgb(0, 0, 0));
    }

    #[test]
    fn test_rejects_other_strings() {
        let bad_strings = [
            "", "#", "fff", "#ff88000", "gg8800", "##ff8800", "255,0,0", "teal",
            // separators are only accepted in the warm-white spellings
            "r-e-d", "_blue_", "cy-an", "warm--white", "-red",
        ];
        for bad in bad_strings {
            assert_eq!(
                Color::from_str(bad),
                Err(Error::InvalidColorString(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_scale_to_percent() {
        let scaled = Color::rgb(255, 128, 0).scaled(ColorScale::Percent);
        assert_eq!(scaled, Color::rgb(100, 50, 0));

        // 1/255*100 = 0.39 -> 0, 2/255*100 = 0.78 -> 1, 127 -> 49.8 -> 50
        assert_eq!(percent(1), 0);
        assert_eq!(percent(2), 1);
        assert_eq!(percent(127), 50);
        assert_eq!(percent(254), 100);

        for c in 0..=255u8 {
            let exact = f64::from(c) / 255.0 * 100.0;
            assert_eq!(f64::from(percent(c)), exact.round(), "channel {c}");
        }
    }

    #[test]
    fn test_scale_full_is_identity() {
        let color = Color::rgb(12, 200, 255);
        assert_eq!(color.scaled(ColorScale::Full), color);
    }
}
