//! Core types, errors, logging and the camera model

pub mod types;
pub mod error;
pub mod logging;
pub mod camera;

pub use types::*;
pub use error::{Error, ParseError, TileError};
pub use camera::{Camera, Projection};
