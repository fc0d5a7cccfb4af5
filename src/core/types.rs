//! Core type aliases and re-exports
//!
//! Tilesets are frequently georeferenced in earth-centered coordinates, so the
//! whole crate works in double precision.

pub use glam::{
    DVec2, DVec3, DVec4,
    DMat3, DMat4,
    DQuat,
};

/// Standard Result type for the crate
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;
