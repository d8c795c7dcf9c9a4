// SPDX-License-Identifier: GPL-3.0-only

//! Consumers of composite frames
//!
//! Every sink sees composite frames in capture order. A sink that returns
//! [`SinkStatus::Finished`] is detached by the graph after the call; a sink
//! that returns an error is detached and reported.

use super::video::{EncodeSummary, VideoEncoder};
use crate::backends::camera::types::{BackendError, Frame};
use crate::constants::timing;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    Display,
    Encoder,
    StillCapture,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Display => "display",
            Self::Encoder => "encoder",
            Self::StillCapture => "still capture",
        }
    }
}

/// Whether a sink wants more frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Continue,
    Finished,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SinkError {
    #[error("receiver closed")]
    Disconnected,
    #[error("recording contains no frames")]
    Empty,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub trait FrameSink: Send {
    fn kind(&self) -> SinkKind;

    fn consume(&mut self, frame: &Frame) -> Result<SinkStatus, SinkError>;

    /// Release the sink after it was detached
    ///
    /// Encoder sinks finalize their file here and report what was written.
    fn close(self: Box<Self>) -> Result<Option<EncodeSummary>, SinkError> {
        Ok(None)
    }
}

/// Preview frames for the host, dropped when the host falls behind
pub struct DisplaySink {
    sender: mpsc::Sender<Frame>,
    delivered: u64,
    dropped: u64,
}

impl DisplaySink {
    /// A display sink and the receiving end of its bounded queue
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                delivered: 0,
                dropped: 0,
            },
            receiver,
        )
    }
}

impl FrameSink for DisplaySink {
    fn kind(&self) -> SinkKind {
        SinkKind::Display
    }

    fn consume(&mut self, frame: &Frame) -> Result<SinkStatus, SinkError> {
        match self.sender.try_send(frame.clone()) {
            Ok(()) => {
                self.delivered += 1;
                Ok(SinkStatus::Continue)
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped % timing::FRAME_LOG_INTERVAL == 1 {
                    debug!(dropped = self.dropped, "Preview frame dropped (host behind)");
                }
                Ok(SinkStatus::Continue)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::Disconnected),
        }
    }
}

/// Hands the next composite frame to a waiting capture request
pub struct StillCaptureSink {
    sender: Option<oneshot::Sender<Frame>>,
}

impl StillCaptureSink {
    pub fn new() -> (Self, oneshot::Receiver<Frame>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }
}

impl FrameSink for StillCaptureSink {
    fn kind(&self) -> SinkKind {
        SinkKind::StillCapture
    }

    fn consume(&mut self, frame: &Frame) -> Result<SinkStatus, SinkError> {
        if let Some(sender) = self.sender.take() {
            if sender.send(frame.clone()).is_err() {
                warn!("Still capture requester went away");
            } else {
                debug!(pts_ms = frame.pts.as_millis() as u64, "Still frame captured");
            }
        }
        Ok(SinkStatus::Finished)
    }
}

/// Feeds composite frames into a video encoder
///
/// Frames whose timestamp does not advance past the last encoded frame are
/// skipped.
pub struct EncoderSink {
    encoder: Box<dyn VideoEncoder>,
    last_pts: Option<Duration>,
    skipped: u64,
}

impl EncoderSink {
    pub fn new(encoder: Box<dyn VideoEncoder>) -> Self {
        Self {
            encoder,
            last_pts: None,
            skipped: 0,
        }
    }
}

impl FrameSink for EncoderSink {
    fn kind(&self) -> SinkKind {
        SinkKind::Encoder
    }

    fn consume(&mut self, frame: &Frame) -> Result<SinkStatus, SinkError> {
        if self.last_pts.is_some_and(|last| frame.pts <= last) {
            self.skipped += 1;
            return Ok(SinkStatus::Continue);
        }
        self.encoder.push_frame(frame)?;
        if self.last_pts.is_none() {
            info!(pts_ms = frame.pts.as_millis() as u64, "First frame encoded");
        }
        self.last_pts = Some(frame.pts);
        Ok(SinkStatus::Continue)
    }

    fn close(self: Box<Self>) -> Result<Option<EncodeSummary>, SinkError> {
        if self.skipped > 0 {
            debug!(skipped = self.skipped, "Out-of-order frames skipped while recording");
        }
        if self.encoder.frames_written() == 0 {
            self.encoder.abort();
            return Err(SinkError::Empty);
        }
        Ok(Some(self.encoder.finish()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{BackendResult, FrameOrigin};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    fn frame(pts_ms: u64) -> Frame {
        Frame::from_rgba(
            1,
            1,
            vec![0; 4],
            Duration::from_millis(pts_ms),
            pts_ms,
            FrameOrigin::Composite,
        )
        .unwrap()
    }

    #[derive(Clone, Default)]
    struct Recorded(Arc<Mutex<Vec<Duration>>>);

    struct ListEncoder(Recorded);

    impl VideoEncoder for ListEncoder {
        fn push_frame(&mut self, frame: &Frame) -> BackendResult<()> {
            self.0.0.lock().unwrap().push(frame.pts);
            Ok(())
        }

        fn frames_written(&self) -> u64 {
            self.0.0.lock().unwrap().len() as u64
        }

        fn finish(self: Box<Self>) -> BackendResult<EncodeSummary> {
            Ok(EncodeSummary {
                path: PathBuf::from("list"),
                frames: self.frames_written(),
                duration: Duration::ZERO,
            })
        }

        fn abort(self: Box<Self>) {}
    }

    #[test]
    fn test_display_drops_when_full() {
        let (mut sink, mut rx) = DisplaySink::channel(1);
        assert_eq!(sink.consume(&frame(1)).unwrap(), SinkStatus::Continue);
        assert_eq!(sink.consume(&frame(2)).unwrap(), SinkStatus::Continue);
        assert_eq!(sink.dropped, 1);
        assert_eq!(rx.try_recv().unwrap().pts, Duration::from_millis(1));
        drop(rx);
        assert_eq!(sink.consume(&frame(3)), Err(SinkError::Disconnected));
    }

    #[test]
    fn test_still_capture_takes_one_frame() {
        let (mut sink, mut rx) = StillCaptureSink::new();
        assert_eq!(sink.consume(&frame(5)).unwrap(), SinkStatus::Finished);
        assert_eq!(rx.try_recv().unwrap().pts, Duration::from_millis(5));
    }

    #[test]
    fn test_encoder_skips_non_increasing() {
        let recorded = Recorded::default();
        let mut sink = EncoderSink::new(Box::new(ListEncoder(recorded.clone())));
        for pts in [10, 20, 20, 15, 30] {
            sink.consume(&frame(pts)).unwrap();
        }
        let list = recorded.0.lock().unwrap().clone();
        assert_eq!(
            list,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(30)
            ]
        );
        assert_eq!(sink.skipped, 2);
    }

    #[test]
    fn test_empty_recording_fails_close() {
        let sink = Box::new(EncoderSink::new(Box::new(ListEncoder(Recorded::default()))));
        assert_eq!(sink.close(), Err(SinkError::Empty));
    }
}
