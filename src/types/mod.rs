//! Value types for light control parameters.

mod brightness;
mod color;
mod color_command;
mod kelvin;
mod power;

pub use brightness::Brightness;
pub use color::Color;
pub use color_command::{ColorCommand, ColorScale};
pub use kelvin::Kelvin;
pub use power::PowerMode;
