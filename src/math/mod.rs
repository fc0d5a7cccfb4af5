//! Geometry used for culling, error estimation and queries

pub mod aabb;
pub mod bounds;
pub mod frustum;
pub mod ray;
pub mod region;

pub use aabb::Aabb;
pub use bounds::{BoundingSphere, BoundingVolume, OrientedBox};
pub use frustum::{Frustum, Plane};
pub use ray::Ray;
pub use region::Region;
