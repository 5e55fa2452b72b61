//! Detection post-processing for the Darknet YOLO engine.
//!
//! Turns decoded head rows into final detections:
//!
//! - [`SuppressionConfig`] - confidence and `IoU` thresholds
//! - [`postprocess`] - confidence filter, corner conversion, class collapse
//!   and per-class suppression in one call
//! - [`non_max_suppression`] - the greedy per-class suppression step alone
//!
//! This crate has no tensor-backend dependency; it works on the host-side
//! rows produced by `yolo-models`.

#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod config;
mod error;
mod suppress;

pub use config::SuppressionConfig;

pub use suppress::{non_max_suppression, postprocess, postprocess_batch};

pub use error::{PostprocessError, Result};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{
        PostprocessError, SuppressionConfig, non_max_suppression, postprocess, postprocess_batch,
    };
}
