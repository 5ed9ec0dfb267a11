//! Parallel construction of linearized bounding volume hierarchies.
//!
//! The builder takes per-leaf axis-aligned bounding boxes, orders them along
//! a Morton curve, assembles a binary radix tree over the sorted codes and
//! packs it into a flat, stackless-traversal-friendly node array that can be
//! handed to the GPU as a storage buffer. Topology-preserving refits are a
//! fraction of a rebuild, so moving geometry stays cheap.

pub mod aabb;
pub mod bindings;
pub mod bvh;
pub mod error;
pub mod gpu_handles;
pub mod morton;
pub mod timings;
pub mod vector;

pub use aabb::Aabb;
pub use bvh::{Bvh, BvhNode};
pub use error::BvhError;
pub use timings::{BuildTimings, Stage};
pub use vector::Vec3f32;
