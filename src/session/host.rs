// SPDX-License-Identifier: GPL-3.0-only

//! Host bridge
//!
//! The host hears exactly one reply per session: success with the path of
//! the accepted file, or an error message. A calibrate session succeeds
//! with the tuned values instead of a path.

use super::SessionOutcome;
use crate::errors::{SessionError, USER_CLOSED};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum HostReply {
    Success { path: String },
    Calibrated { threshold: f32, smoothing: f32 },
    Error { message: String },
}

impl HostReply {
    /// Reply for a session that never started
    pub fn from_error(error: &SessionError) -> Self {
        HostReply::Error {
            message: error.host_message(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, HostReply::Error { .. })
    }

    pub fn to_json(&self) -> String {
        // Plain strings and floats always serialize
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

impl From<SessionOutcome> for HostReply {
    fn from(outcome: SessionOutcome) -> Self {
        match outcome {
            SessionOutcome::Captured(result) => HostReply::Success {
                path: result.path.to_string_lossy().into_owned(),
            },
            SessionOutcome::Calibrated {
                threshold,
                smoothing,
            } => HostReply::Calibrated {
                threshold,
                smoothing,
            },
            SessionOutcome::Cancelled => HostReply::Error {
                message: USER_CLOSED.to_string(),
            },
            SessionOutcome::Failed(error) => HostReply::from_error(&error),
        }
    }
}
