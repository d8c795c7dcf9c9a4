// SPDX-License-Identifier: MPL-2.0

//! Camera capture
//!
//! - [`types`]: frames, capture settings and backend errors shared by every
//!   source and sink
//! - [`device`]: process-wide exclusive device leases
//! - [`pipeline`]: the GStreamer camera source

pub mod device;
pub mod pipeline;
pub mod types;

pub use device::DeviceLease;
pub use pipeline::CameraSource;
pub use types::*;
