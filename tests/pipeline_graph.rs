// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline graph driven through its processing thread

mod common;

use chromakey_camera::backends::camera::device::is_leased;
use chromakey_camera::backends::camera::types::{CameraSettings, Frame};
use chromakey_camera::config::{BackgroundMode, BackgroundSource, ChromaKeyConfig, KeyColor};
use chromakey_camera::pipelines::graph::GraphLayout;
use chromakey_camera::pipelines::sinks::{DisplaySink, SinkKind, StillCaptureSink};
use chromakey_camera::pipelines::{GraphState, PipelineGraph, PipelineWorker};
use common::TestBackend;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;

fn layout(camera: &CameraSettings, preview: DisplaySink) -> GraphLayout {
    GraphLayout {
        camera: camera.clone(),
        background_mode: BackgroundMode::Video,
        background: BackgroundSource::LoopingVideo("/backgrounds/waves.mp4".into()),
        chroma: ChromaKeyConfig::new(KeyColor::Green, 0.4, 0.1).unwrap(),
        sinks: vec![Box::new(preview)],
    }
}

fn spawn(camera: &CameraSettings) -> (PipelineWorker, mpsc::Receiver<Frame>) {
    let (preview, frames) = DisplaySink::channel(2);
    let mut graph = PipelineGraph::new();
    graph.build(&TestBackend::default(), layout(camera, preview)).unwrap();
    let (worker, _events) = PipelineWorker::spawn(graph).unwrap();
    (worker, frames)
}

#[tokio::test]
async fn test_pause_resume_keeps_sinks() {
    let camera = common::camera();
    let (mut worker, mut frames) = spawn(&camera);
    let handle = worker.handle();

    handle.start().await.unwrap();
    let before = handle.sinks().await.unwrap();
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].1, SinkKind::Display);

    handle.pause().await.unwrap();
    assert_eq!(handle.state().await.unwrap(), GraphState::Paused);
    handle.resume().await.unwrap();
    assert_eq!(handle.state().await.unwrap(), GraphState::Running);
    assert_eq!(handle.sinks().await.unwrap(), before);

    // Frames keep flowing to the same preview after resume
    while frames.try_recv().is_ok() {}
    let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame.width, common::WIDTH);

    worker.shutdown();
}

#[tokio::test]
async fn test_still_capture_detaches_itself() {
    let camera = common::camera();
    let (mut worker, _frames) = spawn(&camera);
    let handle = worker.handle();
    handle.start().await.unwrap();

    let (sink, frame) = StillCaptureSink::new();
    let id = handle.attach_sink(Box::new(sink)).await.unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(2), frame)
        .await
        .unwrap()
        .unwrap();
    assert_eq!((frame.width, frame.height), (common::WIDTH, common::HEIGHT));

    let sinks = handle.sinks().await.unwrap();
    assert!(sinks.iter().all(|(sink, _)| *sink != id));
    assert!(handle.detach_sink(id).await.is_err());

    worker.shutdown();
}

#[tokio::test]
async fn test_commands_after_shutdown_fail() {
    let camera = common::camera();
    let (mut worker, _frames) = spawn(&camera);
    let handle = worker.handle();
    handle.start().await.unwrap();
    assert!(is_leased(&camera.device));

    worker.shutdown();
    assert!(!worker.is_running());
    assert!(!is_leased(&camera.device));
    assert!(handle.pause().await.is_err());
}

#[test]
fn test_mismatched_background_opens_nothing() {
    let camera = common::camera();
    let backend = TestBackend::default();
    let (preview, _frames) = DisplaySink::channel(2);
    let mut layout = layout(&camera, preview);
    layout.background_mode = BackgroundMode::Photo;

    let mut graph = PipelineGraph::new();
    assert!(graph.build(&backend, layout).is_err());
    assert_eq!(graph.state(), GraphState::Unbuilt);
    assert_eq!(backend.cameras_opened.load(Ordering::SeqCst), 0);
    assert!(!is_leased(&camera.device));
}
