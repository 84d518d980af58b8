use std::path::PathBuf;

/// All error types that can occur when talking to devices or the registry.
///
/// Timeouts, undecodable replies and unexpected replies are not errors; they
/// are reported through [`crate::Outcome`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to serialize data to JSON.
    #[error("failed to dump json: {0:?}")]
    JsonDump(serde_json::Error),

    /// A network socket operation failed (bind, join, send).
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// A registry statement failed.
    #[error("registry error: {0}")]
    Store(#[from] rusqlite::Error),

    /// The directory holding the registry database could not be created.
    #[error("cannot create registry directory {path:?}: {err}")]
    StoreDirectory { path: PathBuf, err: std::io::Error },

    /// Another caller panicked while holding the registry connection.
    #[error("registry connection lock poisoned")]
    StoreLock,

    /// A settings file could not be read or parsed.
    #[error("invalid config {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },

    /// Brightness outside 0..=100.
    #[error("brightness must be between 0 and 100, got {0}")]
    InvalidBrightness(i64),

    /// Color temperature that is not strictly positive.
    #[error("color temperature must be positive, got {0}")]
    InvalidKelvin(i64),

    /// Failed to parse a [`crate::Color`] from a string.
    #[error("invalid color string: {0}")]
    InvalidColorString(String),

    /// Color scale other than 100 or 255.
    #[error("color scale must be 100 or 255, got {0}")]
    InvalidColorScale(String),

    /// The color command variant needs an RGB value.
    #[error("command {cmd} requires a color")]
    MissingColor { cmd: String },

    /// The color command variant needs a Kelvin value.
    #[error("command {cmd} requires a color temperature")]
    MissingKelvin { cmd: String },

    /// No registry entry exists for the device id.
    #[error("no IP found for device_id={0}")]
    DeviceNotFound(String),

    /// A stored or supplied address is not a usable IPv4 address.
    #[error("invalid device address {0:?}")]
    InvalidAddress(String),
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    /// True for bad input that was rejected before any network I/O.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidBrightness(_)
                | Error::InvalidKelvin(_)
                | Error::InvalidColorString(_)
                | Error::InvalidColorScale(_)
                | Error::MissingColor { .. }
                | Error::MissingKelvin { .. }
        )
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
