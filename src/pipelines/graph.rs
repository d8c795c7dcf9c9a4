// SPDX-License-Identifier: GPL-3.0-only

//! Source → blender → sink graph
//!
//! Nodes live in an arena and are addressed by index; edges are an
//! adjacency list from producer to consumer. The blender always has exactly
//! two inputs, the camera (foreground) and the background. Sinks hang off
//! the blender and can be attached or detached while frames flow, without
//! touching the sources.
//!
//! ```text
//! camera ─────┐                ┌─▶ display
//!             ├─▶ blender ─────┼─▶ encoder     (while recording)
//! background ─┘                └─▶ still       (one frame)
//! ```
//!
//! Lifecycle: `Unbuilt → Built → Running ⇄ Paused → TornDown`.

use super::compositor::ChromaKeyBlender;
use super::sinks::{FrameSink, SinkError, SinkKind, SinkStatus};
use crate::backends::camera::types::{BackendError, CameraSettings, Frame};
use crate::backends::{FrameSource, MediaBackend, SourceKind};
use crate::config::{BackgroundMode, BackgroundSource, ChromaKeyConfig};
use crate::constants::timing;
use crate::errors::{ConfigError, SessionError};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Unbuilt,
    Built,
    Running,
    Paused,
    TornDown,
}

impl GraphState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unbuilt => "unbuilt",
            Self::Built => "built",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::TornDown => "torn down",
        }
    }
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arena index of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Handle to an attached sink
pub type SinkId = NodeId;

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error(transparent)]
    Resource(#[from] BackendError),
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: GraphState,
    },
    #[error("no sink {0}")]
    UnknownSink(SinkId),
    /// The processing thread is gone or not answering
    #[error("pipeline unavailable: {0}")]
    Unavailable(String),
}

impl From<GraphError> for SessionError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Configuration(e) => SessionError::Configuration(e),
            GraphError::Resource(e) => SessionError::Resource(e),
            other => SessionError::Runtime(other.to_string()),
        }
    }
}

/// Things that happened during a tick that the owner must hear about
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// A sink asked to be removed after its last frame
    SinkFinished { id: SinkId, kind: SinkKind },
    /// A sink failed and was removed
    SinkFailed {
        id: SinkId,
        kind: SinkKind,
        error: SinkError,
    },
}

/// Result of one processing step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing to do (not running, or no new camera frame)
    Idle,
    /// A camera frame was discarded without compositing
    Dropped,
    /// A composite frame went to this many sinks
    Delivered(usize),
}

/// Everything needed to build a graph
pub struct GraphLayout {
    pub camera: CameraSettings,
    pub background_mode: BackgroundMode,
    pub background: BackgroundSource,
    pub chroma: ChromaKeyConfig,
    /// Sinks attached from the first frame on
    pub sinks: Vec<Box<dyn FrameSink>>,
}

enum Node {
    Camera(Box<dyn FrameSource>),
    Background(Box<dyn FrameSource>),
    Blender(ChromaKeyBlender),
    Sink {
        sink: Box<dyn FrameSink>,
        /// Frames older than this predate the attach and are not delivered
        attached_at: Option<Duration>,
    },
}

impl Node {
    fn source_mut(&mut self) -> Option<&mut Box<dyn FrameSource>> {
        match self {
            Node::Camera(source) | Node::Background(source) => Some(source),
            _ => None,
        }
    }
}

pub struct PipelineGraph {
    nodes: Vec<Option<Node>>,
    /// (from, to) pairs in attach order
    edges: Vec<(NodeId, NodeId)>,
    state: GraphState,
    camera: Option<NodeId>,
    background: Option<NodeId>,
    blender: Option<NodeId>,
    /// Last background frame, re-used until a newer one arrives
    background_frame: Option<Frame>,
    last_foreground_pts: Option<Duration>,
    events: Vec<GraphEvent>,
    ticks: u64,
}

impl Default for PipelineGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            state: GraphState::Unbuilt,
            camera: None,
            background: None,
            blender: None,
            background_frame: None,
            last_foreground_pts: None,
            events: Vec::new(),
            ticks: 0,
        }
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    fn require(&self, operation: &'static str, allowed: &[GraphState]) -> Result<(), GraphError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(GraphError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn add_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(Some(node));
        NodeId(self.nodes.len() - 1)
    }

    fn connect(&mut self, from: NodeId, to: NodeId) {
        self.edges.push((from, to));
    }

    /// Open the sources and wire them to the blender and sinks
    ///
    /// The background declaration is checked before any device is opened.
    /// On failure nothing stays open and the graph remains `Unbuilt`.
    pub fn build(&mut self, backend: &dyn MediaBackend, layout: GraphLayout) -> Result<(), GraphError> {
        self.require("build", &[GraphState::Unbuilt])?;

        if layout.background.mode() != layout.background_mode {
            return Err(ConfigError::BackgroundMismatch.into());
        }
        layout.chroma.validate()?;

        let camera = backend.open_camera(&layout.camera)?;
        let background = backend.open_background(&layout.background)?;

        let expected = match layout.background_mode {
            BackgroundMode::Photo => SourceKind::StillImage,
            BackgroundMode::Video => SourceKind::LoopingVideo,
        };
        if background.kind() != expected {
            warn!(
                expected = expected.as_str(),
                actual = background.kind().as_str(),
                "Background source kind mismatch"
            );
            return Err(ConfigError::BackgroundMismatch.into());
        }

        let camera = self.add_node(Node::Camera(camera));
        let background = self.add_node(Node::Background(background));
        let blender = self.add_node(Node::Blender(ChromaKeyBlender::new(layout.chroma)));
        self.connect(camera, blender);
        self.connect(background, blender);
        self.camera = Some(camera);
        self.background = Some(background);
        self.blender = Some(blender);

        for sink in layout.sinks {
            let id = self.add_node(Node::Sink {
                sink,
                attached_at: None,
            });
            self.connect(blender, id);
        }

        self.state = GraphState::Built;
        info!(
            width = layout.camera.width,
            height = layout.camera.height,
            background = %layout.background.path().display(),
            "Pipeline built"
        );
        Ok(())
    }

    fn for_each_source(
        &mut self,
        mut f: impl FnMut(&mut Box<dyn FrameSource>) -> Result<(), BackendError>,
    ) -> Result<(), GraphError> {
        for id in [self.camera, self.background].into_iter().flatten() {
            if let Some(source) = self.nodes[id.0].as_mut().and_then(Node::source_mut) {
                f(source)?;
            }
        }
        Ok(())
    }

    /// Begin delivering frames; a no-op once running
    pub fn start(&mut self) -> Result<(), GraphError> {
        match self.state {
            GraphState::Running | GraphState::Paused => return Ok(()),
            _ => self.require("start", &[GraphState::Built])?,
        }
        self.for_each_source(|source| source.start())?;
        self.state = GraphState::Running;
        info!("Pipeline running");
        Ok(())
    }

    /// Stop the camera and video background; sinks stay attached
    pub fn pause(&mut self) -> Result<(), GraphError> {
        match self.state {
            GraphState::Paused => return Ok(()),
            _ => self.require("pause", &[GraphState::Running])?,
        }
        self.for_each_source(|source| match source.kind() {
            SourceKind::StillImage => Ok(()),
            _ => source.pause(),
        })?;
        self.state = GraphState::Paused;
        debug!("Pipeline paused");
        Ok(())
    }

    /// Continue from where the sources were paused
    pub fn resume(&mut self) -> Result<(), GraphError> {
        match self.state {
            GraphState::Running => return Ok(()),
            _ => self.require("resume", &[GraphState::Paused])?,
        }
        self.for_each_source(|source| source.resume())?;
        self.state = GraphState::Running;
        debug!("Pipeline resumed");
        Ok(())
    }

    /// Restart the sources from time zero
    pub fn rewind(&mut self) -> Result<(), GraphError> {
        self.require("rewind", &[GraphState::Running, GraphState::Paused])?;
        self.for_each_source(|source| source.rewind())?;
        debug!("Pipeline rewound");
        Ok(())
    }

    pub fn attach_sink(&mut self, sink: Box<dyn FrameSink>) -> Result<SinkId, GraphError> {
        self.require("attach a sink", &[GraphState::Running, GraphState::Paused])?;
        let blender = self.blender.ok_or(GraphError::InvalidState {
            operation: "attach a sink",
            state: self.state,
        })?;
        let kind = sink.kind();
        let id = self.add_node(Node::Sink {
            sink,
            attached_at: self.last_foreground_pts,
        });
        self.connect(blender, id);
        info!(sink = %id, kind = kind.as_str(), "Sink attached");
        Ok(id)
    }

    pub fn detach_sink(&mut self, id: SinkId) -> Result<Box<dyn FrameSink>, GraphError> {
        self.require("detach a sink", &[GraphState::Running, GraphState::Paused])?;
        let sink = self.remove_sink(id).ok_or(GraphError::UnknownSink(id))?;
        info!(sink = %id, kind = sink.kind().as_str(), "Sink detached");
        Ok(sink)
    }

    fn remove_sink(&mut self, id: SinkId) -> Option<Box<dyn FrameSink>> {
        match self.nodes.get(id.0) {
            Some(Some(Node::Sink { .. })) => {}
            _ => return None,
        }
        self.edges.retain(|&(_, to)| to != id);
        match self.nodes[id.0].take() {
            Some(Node::Sink { sink, .. }) => Some(sink),
            _ => None,
        }
    }

    /// Attached sinks in delivery order
    pub fn sinks(&self) -> Vec<(SinkId, SinkKind)> {
        let Some(blender) = self.blender else {
            return Vec::new();
        };
        self.edges
            .iter()
            .filter(|(from, _)| *from == blender)
            .filter_map(|&(_, to)| match self.nodes.get(to.0) {
                Some(Some(Node::Sink { sink, .. })) => Some((to, sink.kind())),
                _ => None,
            })
            .collect()
    }

    /// Replace the key settings used for the next frame
    pub fn set_chroma(&mut self, config: ChromaKeyConfig) -> Result<(), GraphError> {
        config.validate()?;
        if let Some(Some(Node::Blender(blender))) = self.blender.map(|id| &mut self.nodes[id.0]) {
            blender.set_config(config);
        }
        Ok(())
    }

    pub fn chroma(&self) -> Option<ChromaKeyConfig> {
        match self.blender.map(|id| &self.nodes[id.0]) {
            Some(Some(Node::Blender(blender))) => Some(*blender.config()),
            _ => None,
        }
    }

    /// Events produced since the last call
    pub fn take_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }

    fn pull(&mut self, id: Option<NodeId>) -> Option<Frame> {
        self.nodes[id?.0].as_mut()?.source_mut()?.next_frame()
    }

    /// Composite the newest camera frame and hand it to every sink
    pub fn tick(&mut self) -> TickOutcome {
        if self.state != GraphState::Running {
            return TickOutcome::Idle;
        }

        // Keep only the newest background frame
        while let Some(frame) = self.pull(self.background) {
            self.background_frame = Some(frame);
        }

        let Some(foreground) = self.pull(self.camera) else {
            return TickOutcome::Idle;
        };

        if self
            .last_foreground_pts
            .is_some_and(|last| foreground.pts <= last)
        {
            debug!(
                pts_ms = foreground.pts.as_millis() as u64,
                "Dropping out-of-order camera frame"
            );
            return TickOutcome::Dropped;
        }
        self.last_foreground_pts = Some(foreground.pts);

        let Some(background) = self.background_frame.as_ref() else {
            return TickOutcome::Dropped;
        };

        let composite = match self.blender.map(|id| &mut self.nodes[id.0]) {
            Some(Some(Node::Blender(blender))) => match blender.blend(&foreground, background) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "Blend failed, dropping frame");
                    return TickOutcome::Dropped;
                }
            },
            _ => return TickOutcome::Dropped,
        };

        self.ticks += 1;
        if self.ticks % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(
                frame = self.ticks,
                width = composite.width,
                height = composite.height,
                latency_us = composite.captured_at.elapsed().as_micros() as u64,
                "Composite frame"
            );
        }

        TickOutcome::Delivered(self.deliver(&composite))
    }

    fn deliver(&mut self, frame: &Frame) -> usize {
        let targets: Vec<SinkId> = self.sinks().into_iter().map(|(id, _)| id).collect();
        let mut delivered = 0;

        for id in targets {
            let Some(Some(Node::Sink { sink, attached_at })) = self.nodes.get_mut(id.0) else {
                continue;
            };
            if attached_at.is_some_and(|t| frame.pts < t) {
                continue;
            }
            let kind = sink.kind();
            match sink.consume(frame) {
                Ok(SinkStatus::Continue) => delivered += 1,
                Ok(SinkStatus::Finished) => {
                    delivered += 1;
                    self.remove_sink(id);
                    debug!(sink = %id, kind = kind.as_str(), "Sink finished");
                    self.events.push(GraphEvent::SinkFinished { id, kind });
                }
                Err(error) => {
                    warn!(sink = %id, kind = kind.as_str(), error = %error, "Sink failed, detaching");
                    self.remove_sink(id);
                    self.events.push(GraphEvent::SinkFailed { id, kind, error });
                }
            }
        }
        delivered
    }

    /// Stop every source and drop every sink; terminal
    pub fn teardown(&mut self) {
        if self.state == GraphState::TornDown {
            return;
        }
        let _ = self.for_each_source(|source| {
            source.stop();
            Ok(())
        });
        self.nodes.clear();
        self.edges.clear();
        self.camera = None;
        self.background = None;
        self.blender = None;
        self.background_frame = None;
        self.state = GraphState::TornDown;
        info!("Pipeline torn down");
    }
}

impl Drop for PipelineGraph {
    fn drop(&mut self) {
        self.teardown();
    }
}
