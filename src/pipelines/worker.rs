// SPDX-License-Identifier: GPL-3.0-only

//! The frame-processing thread
//!
//! The graph is owned by one thread. Everything else talks to it through a
//! [`PipelineHandle`], whose requests are queued as control messages and
//! applied between two ticks, so a control operation never overlaps a blend.
//!
//! The thread exits on its own when an encoder sink fails. The event stream
//! closes only after the graph has been torn down, so a closed stream means
//! every source and sink is gone.

use super::frame_loop::{LoopAction, LoopController};
use super::graph::{GraphError, GraphEvent, GraphState, PipelineGraph, SinkId, TickOutcome};
use super::sinks::{FrameSink, SinkKind};
use crate::config::ChromaKeyConfig;
use crate::constants::timing;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Pending control requests allowed before senders wait
const CONTROL_QUEUE_DEPTH: usize = 16;

type Reply<T> = oneshot::Sender<Result<T, GraphError>>;

enum Control {
    Start(Reply<()>),
    Pause(Reply<()>),
    Resume(Reply<()>),
    Rewind(Reply<()>),
    Attach(Box<dyn FrameSink>, Reply<SinkId>),
    Detach(SinkId, Reply<Box<dyn FrameSink>>),
    SetChroma(ChromaKeyConfig, Reply<()>),
    Sinks(Reply<Vec<(SinkId, SinkKind)>>),
    State(Reply<GraphState>),
}

impl Control {
    fn apply(self, graph: &mut PipelineGraph) {
        // A requester that gave up waiting is not an error
        match self {
            Control::Start(reply) => drop(reply.send(graph.start())),
            Control::Pause(reply) => drop(reply.send(graph.pause())),
            Control::Resume(reply) => drop(reply.send(graph.resume())),
            Control::Rewind(reply) => drop(reply.send(graph.rewind())),
            Control::Attach(sink, reply) => drop(reply.send(graph.attach_sink(sink))),
            Control::Detach(id, reply) => drop(reply.send(graph.detach_sink(id))),
            Control::SetChroma(config, reply) => drop(reply.send(graph.set_chroma(config))),
            Control::Sinks(reply) => drop(reply.send(Ok(graph.sinks()))),
            Control::State(reply) => drop(reply.send(Ok(graph.state()))),
        }
    }
}

struct Worker {
    graph: PipelineGraph,
    control: mpsc::Receiver<Control>,
    events: mpsc::UnboundedSender<GraphEvent>,
}

impl Worker {
    fn step(&mut self) -> LoopAction {
        loop {
            match self.control.try_recv() {
                Ok(message) => message.apply(&mut self.graph),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    debug!("All pipeline handles dropped");
                    return LoopAction::Stop;
                }
            }
        }

        let outcome = self.graph.tick();
        let mut encoder_failed = false;
        for event in self.graph.take_events() {
            encoder_failed |= matches!(
                event,
                GraphEvent::SinkFailed {
                    kind: SinkKind::Encoder,
                    ..
                }
            );
            let _ = self.events.send(event);
        }

        // A failed encoder ends the session
        if encoder_failed {
            warn!("Encoder failed, stopping processing thread");
            return LoopAction::Stop;
        }

        if outcome == TickOutcome::Idle {
            std::thread::sleep(timing::IDLE_POLL_INTERVAL);
        }
        LoopAction::Continue
    }
}

/// Cloneable sender of control requests to the processing thread
#[derive(Clone)]
pub struct PipelineHandle {
    control: mpsc::Sender<Control>,
}

impl PipelineHandle {
    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Control) -> Result<T, GraphError> {
        let (reply, response) = oneshot::channel();
        self.control
            .send(make(reply))
            .await
            .map_err(|_| GraphError::Unavailable("processing thread stopped".into()))?;
        match tokio::time::timeout(timing::CONTROL_REPLY_TIMEOUT, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GraphError::Unavailable(
                "processing thread dropped the request".into(),
            )),
            Err(_) => Err(GraphError::Unavailable("no reply from processing thread".into())),
        }
    }

    pub async fn start(&self) -> Result<(), GraphError> {
        self.call(Control::Start).await
    }

    pub async fn pause(&self) -> Result<(), GraphError> {
        self.call(Control::Pause).await
    }

    pub async fn resume(&self) -> Result<(), GraphError> {
        self.call(Control::Resume).await
    }

    pub async fn rewind(&self) -> Result<(), GraphError> {
        self.call(Control::Rewind).await
    }

    pub async fn attach_sink(&self, sink: Box<dyn FrameSink>) -> Result<SinkId, GraphError> {
        self.call(|reply| Control::Attach(sink, reply)).await
    }

    pub async fn detach_sink(&self, id: SinkId) -> Result<Box<dyn FrameSink>, GraphError> {
        self.call(|reply| Control::Detach(id, reply)).await
    }

    pub async fn set_chroma(&self, config: ChromaKeyConfig) -> Result<(), GraphError> {
        self.call(|reply| Control::SetChroma(config, reply)).await
    }

    pub async fn sinks(&self) -> Result<Vec<(SinkId, SinkKind)>, GraphError> {
        self.call(Control::Sinks).await
    }

    pub async fn state(&self) -> Result<GraphState, GraphError> {
        self.call(Control::State).await
    }
}

/// Owner of the processing thread
pub struct PipelineWorker {
    handle: PipelineHandle,
    controller: Option<LoopController>,
}

impl PipelineWorker {
    /// Move a built graph onto its own thread
    ///
    /// Returns the worker and the stream of graph events.
    pub fn spawn(
        graph: PipelineGraph,
    ) -> Result<(Self, mpsc::UnboundedReceiver<GraphEvent>), GraphError> {
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_DEPTH);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let worker = Worker {
            graph,
            control: control_rx,
            events: event_tx,
        };

        let controller = LoopController::spawn(
            "chromakey-pipeline",
            worker,
            Worker::step,
            |worker| worker.graph.teardown(),
        )
        .map_err(|e| GraphError::Unavailable(format!("failed to spawn thread: {}", e)))?;

        Ok((
            Self {
                handle: PipelineHandle {
                    control: control_tx,
                },
                controller: Some(controller),
            },
            event_rx,
        ))
    }

    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.controller.as_ref().is_some_and(LoopController::is_running)
    }

    /// Tear the graph down and wait until the thread has exited
    ///
    /// Blocks until sources and sinks are dropped, so the camera is free
    /// when this returns.
    pub fn shutdown(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.stop();
            info!("Processing thread shut down");
        }
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
