//! Brightness control.

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Brightness level from 0 to 100 percent.
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Brightness {
    pub(crate) value: u8,
}

impl Brightness {
    const MIN: i64 = 0;
    const MAX: i64 = 100;

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Validate a brightness percentage.
    ///
    /// Values outside 0-100 are rejected, never clamped.
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::Brightness;
    ///
    /// assert!(Brightness::create(0).is_ok());
    /// assert!(Brightness::create(100).is_ok());
    /// assert!(Brightness::create(101).is_err());
    /// assert!(Brightness::create(-1).is_err());
    /// ```
    pub fn create(value: i64) -> Result<Self, Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Brightness { value: value as u8 })
        } else {
            Err(Error::InvalidBrightness(value))
        }
    }
}
