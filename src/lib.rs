//! Play notes through a software instrument and get live chord, key and
//! next-chord feedback.

pub mod audio;
pub mod core;
pub mod error;
pub mod messaging;
pub mod pipeline;
pub mod settings;
pub mod ui;

pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use settings::Settings;
