// SPDX-License-Identifier: GPL-3.0-only

//! Still photo output
//!
//! A photo is the next composite frame after the capture request, taken by
//! a one-shot [`StillCaptureSink`](crate::pipelines::sinks::StillCaptureSink)
//! and written to the session photo path.

pub mod encoding;

pub use encoding::{EncodingFormat, PhotoEncoder};
