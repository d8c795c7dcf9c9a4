// SPDX-License-Identifier: MPL-2.0

//! Compositing and capture pipelines
//!
//! Frames from the camera and the background meet in the chroma key
//! blender; the composite fans out to the attached sinks.
//!
//! ```text
//! ┌──────────────┐
//! │ Camera frame │ ──┐   ┌──────────────────┐     ┌─────────────┐
//! └──────────────┘   ├─▶ │ ChromaKeyBlender │ ──▶ │ Display     │
//! ┌──────────────┐   │   │  - cover fit     │     │ Still (JPEG)│
//! │  Background  │ ──┘   │  - key + blend   │     │ Encoder(MP4)│
//! └──────────────┘       └──────────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`compositor`]: Per-pixel key classification and background fitting
//! - [`graph`]: Source → blender → sink graph and its lifecycle
//! - [`worker`]: The thread that owns the graph and the handle that drives it
//! - [`recording`]: Photo capture and video recording state machine
//! - [`photo`]: Still photo encoding
//! - [`video`]: H.264/MP4 recording with GStreamer

pub mod compositor;
pub mod frame_loop;
pub mod graph;
pub mod photo;
pub mod recording;
pub mod sinks;
pub mod video;
pub mod worker;

pub use graph::{GraphError, GraphEvent, GraphLayout, GraphState, PipelineGraph, SinkId};
pub use recording::{CaptureKind, CaptureResult, CaptureState, RecordingController};
pub use worker::{PipelineHandle, PipelineWorker};
