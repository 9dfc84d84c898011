//! Service layer for container orchestration
//!
//! This module contains the operations behind the CLI commands that drive the
//! container engine, separating them from argument handling in main.rs.

pub mod image;
pub mod lifecycle;
pub mod pod;

pub use image::ImageService;
pub use lifecycle::{Action, Lifecycle};
pub use pod::{PodSequencer, Step};
