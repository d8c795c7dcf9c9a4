// SPDX-License-Identifier: GPL-3.0-only

//! Chroma key compositing
//!
//! - [`blend`]: classification of foreground pixels and the alpha mix
//! - [`fit`]: aspect-preserving fit of the background to the foreground size

pub mod blend;
pub mod fit;

pub use blend::{ChromaKeyBlender, background_alpha, blend, chroma_of, color_distance};
pub use fit::{cover_crop, fit_background};
