//! homowarp - interactive perspective warp
//!
//! Loads an image, warps it onto a destination quadrilateral and lets the
//! user drag the quad's corners while the homography is recomputed live.

pub mod config;
pub mod correspondence;
pub mod display;
pub mod image_source;
pub mod input;
pub mod render;
pub mod session;
pub mod transform;
pub mod viewer;
