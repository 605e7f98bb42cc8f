//! Ergonomic wrappers over `stmd-core`: a reference ESTMD pipeline wiring,
//! `image::GrayImage` helpers, and app-level configuration.
//!
//! This crate is organized into a few focused modules:
//! - [`pipeline`] – the retina→lamina→medulla→lobula wiring over the core
//!   primitives, with optional direction channels.
//! - [`image`] – conversions between `image::GrayImage` and core matrices.
//! - [`app`] – JSON config loading, frame-directory processing, and
//!   detection dumps shared by tools and examples.

pub mod app;
pub mod image;
pub mod pipeline;

// Re-export a focused subset of core types for convenience. Consumers that
// need lower-level primitives (ring buffers, raw kernels, individual NMS
// algorithms) are encouraged to depend on `stmd-core` directly.
pub use stmd_core::{Error, Matrix, NmsEngine, NmsMemo, NmsMethod, Peak};

pub use crate::image::{frame_from_gray, response_to_gray};
pub use crate::pipeline::{PipelineOutput, PipelineParams, StmdPipeline};
