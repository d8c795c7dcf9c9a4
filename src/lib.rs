// SPDX-License-Identifier: MPL-2.0

//! Chroma Key Camera - real-time green/blue screen compositing
//!
//! This library keys out a color range from a live camera feed, composites
//! the result over a still image or a looping video, and captures the
//! composite as a photo or a recording.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera, background and encoder sources behind a backend trait
//! - [`pipelines`]: Chroma key blending, the frame graph and capture state machine
//! - [`session`]: Session orchestration and the host-facing reply
//! - [`config`]: Host request parsing and persisted settings
//! - [`storage`]: Session-scoped capture files
//!
//! # Example
//!
//! ```ignore
//! let controller = SessionController::new(Arc::new(GstBackend), &Config::load()?);
//! let mut session = controller.start(&HostRequest::from_json(json)?).await?;
//! session.capture_photo().await?;
//! let capture = session.accept_photo().await?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::{ChromaKeyConfig, Config, HostRequest, SessionConfig};
pub use constants::BitratePreset;
pub use errors::{SessionError, SessionResult};
pub use session::{HostReply, Session, SessionController, SessionOutcome};
