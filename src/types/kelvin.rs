//! Color temperature control.

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// Color temperature in Kelvin.
///
/// Any strictly positive value is accepted; the usable range depends on the
/// device model, which reports errors of its own. Typical values:
/// - 2700K: Warm white (incandescent-like)
/// - 4000K: Neutral white
/// - 6500K: Daylight
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Kelvin {
    pub(crate) kelvin: u32,
}

impl Kelvin {
    /// Get the kelvin value.
    pub fn kelvin(&self) -> u32 {
        self.kelvin
    }

    /// Create a new Kelvin with the given value.
    ///
    /// # Examples
    ///
    /// ```
    /// use govee_lan_rs::Kelvin;
    ///
    /// assert!(Kelvin::create(0).is_err());
    /// assert!(Kelvin::create(-2700).is_err());
    /// assert_eq!(Kelvin::create(2700).unwrap().kelvin(), 2700);
    /// ```
    pub fn create(kelvin: i64) -> Result<Self, Error> {
        match u32::try_from(kelvin) {
            Ok(k) if k > 0 => Ok(Kelvin { kelvin: k }),
            _ => Err(Error::InvalidKelvin(kelvin)),
        }
    }
}
