//! Detection data types for the Darknet YOLO inference engine.
//!
//! This crate holds the plain records that flow between the engine stages and
//! has no tensor-backend dependency:
//!
//! - [`Anchor`] - `(width, height)` prior shared by the detection heads
//! - [`RawDetection`] - decoded head row `(cx, cy, w, h, objectness, scores..)`
//! - [`BoundingBox`] - corner-form box in input-image pixels
//! - [`Detection`] - final `(x1, y1, x2, y2, objectness, class_conf, class_id)`
//!
//! # Example
//!
//! ```
//! use yolo_types::{Detection, RawDetection};
//!
//! let row = RawDetection::new(208.0, 208.0, 10.0, 13.0, 0.9, vec![0.1, 0.8]);
//! let det = Detection::from_raw(&row);
//!
//! assert_eq!(det.map(|d| d.class_id), Some(1));
//! assert!(det.is_some_and(|d| (d.bbox.x1 - 203.0).abs() < 1e-4));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod anchor;
mod bbox;
mod detection;
mod error;

pub use anchor::Anchor;
pub use bbox::BoundingBox;
pub use detection::{BOX_FIELDS, Detection, RawDetection};

pub use error::{Result, TypesError};
