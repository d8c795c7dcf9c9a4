// SPDX-License-Identifier: GPL-3.0-only

//! Command line front end
//!
//! Plays the host's part: starts a session, presses the buttons a user
//! would press for the chosen mode, and prints the single reply.
//! - photo: warm up, capture, accept
//! - video: record for the requested duration, stop, accept
//! - calibrate: apply slider values read from stdin until `done`
//!
//! Ctrl+C closes the session.

use chromakey_camera::backends::camera::types::Frame;
use chromakey_camera::backends::synthetic::TestPatternBackend;
use chromakey_camera::backends::{GstBackend, MediaBackend};
use chromakey_camera::config::{Config, HostRequest, OperationMode};
use chromakey_camera::errors::{SessionError, SessionResult};
use chromakey_camera::session::{HostReply, Session, SessionController};
use chromakey_camera::storage::{self, SessionPaths};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::warn;

/// Time the camera gets to settle before a photo is taken
const PHOTO_WARMUP: Duration = Duration::from_millis(500);

/// Progress refresh interval while waiting
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct RunOptions {
    pub test_pattern: bool,
    pub output: Option<PathBuf>,
    pub duration: Duration,
    pub rewind: bool,
    /// Print the host reply as JSON instead of human-readable text
    pub print_json: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            test_pattern: false,
            output: None,
            duration: Duration::from_secs(10),
            rewind: false,
            print_json: false,
        }
    }
}

/// Run one session to completion and report its outcome
pub fn run(request: HostRequest, options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let backend: Arc<dyn MediaBackend> = if options.test_pattern {
        Arc::new(TestPatternBackend::new(GstBackend))
    } else {
        Arc::new(GstBackend)
    };
    let mut controller = SessionController::new(backend, &config);
    if let Some(dir) = &options.output {
        controller = controller.with_paths(SessionPaths::in_dir(dir));
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        cancel_clone.store(true, Ordering::SeqCst);
    })?;

    let rt = tokio::runtime::Runtime::new()?;
    let reply = rt.block_on(async {
        let mut session = match controller.start(&request).await {
            Ok(session) => session,
            Err(e) => return HostReply::from_error(&e),
        };
        let Some(outcome) = session.outcome() else {
            return HostReply::from_error(&SessionError::Runtime("no outcome channel".into()));
        };

        if let Err(e) = drive(&mut session, &options, &cancel).await
            && session.is_active()
        {
            // A rejected command leaves the session open; nothing else will close it
            eprintln!("{}", e);
            session.cancel().await;
        }
        drop(session);

        match outcome.await {
            Ok(outcome) => HostReply::from(outcome),
            Err(_) => HostReply::from_error(&SessionError::Runtime("session vanished".into())),
        }
    });

    report(&reply, options.print_json)
}

fn report(reply: &HostReply, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", reply.to_json());
    }
    match reply {
        HostReply::Success { path } => {
            if !json {
                println!("Saved: {}", path);
            }
            match storage::archive_copy(Path::new(path)) {
                Ok(copy) if !json => println!("Archived: {}", copy.display()),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to archive capture"),
            }
            Ok(())
        }
        HostReply::Calibrated {
            threshold,
            smoothing,
        } => {
            if !json {
                println!("threshold={:.3} smoothing={:.3}", threshold, smoothing);
            }
            Ok(())
        }
        HostReply::Error { message } => Err(message.clone().into()),
    }
}

async fn drive(session: &mut Session, options: &RunOptions, cancel: &AtomicBool) -> SessionResult<()> {
    let mut preview = session.take_preview();

    match session.mode() {
        OperationMode::Photo => {
            if !wait(session, &mut preview, PHOTO_WARMUP, cancel, None).await? {
                return Ok(());
            }
            let path = session.capture_photo().await?;
            if !options.print_json {
                println!("Captured {}", path.display());
            }
            session.accept_photo().await?;
        }
        OperationMode::Video => {
            if options.rewind && session.can_rewind() {
                session.rewind_and_record().await?;
            } else {
                session.start_recording().await?;
            }
            if !options.print_json {
                println!("Recording... (press Ctrl+C to abort)");
            }
            let label = (!options.print_json).then_some("Recording");
            if !wait(session, &mut preview, options.duration, cancel, label).await? {
                return Ok(());
            }
            session.stop_recording().await?;
            session.accept_recording().await?;
        }
        OperationMode::Calibrate => calibrate(session, &mut preview, cancel).await?,
    }
    Ok(())
}

/// Keep the session serviced for `duration`
///
/// Returns false if the user cancelled in the meantime.
async fn wait(
    session: &mut Session,
    preview: &mut Option<mpsc::Receiver<Frame>>,
    duration: Duration,
    cancel: &AtomicBool,
    label: Option<&str>,
) -> SessionResult<bool> {
    let start = Instant::now();
    let mut frames = 0u64;

    while start.elapsed() < duration {
        if cancel.load(Ordering::SeqCst) {
            if label.is_some() {
                println!();
            }
            session.cancel().await;
            return Ok(false);
        }
        session.poll().await?;
        frames += drain(preview);

        if let Some(label) = label {
            let elapsed = start.elapsed().as_secs();
            print!(
                "\r{}: {:02}:{:02} ({} frames)",
                label,
                elapsed / 60,
                elapsed % 60,
                frames
            );
            let _ = std::io::Write::flush(&mut std::io::stdout());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    if label.is_some() {
        println!();
    }
    Ok(true)
}

fn drain(preview: &mut Option<mpsc::Receiver<Frame>>) -> u64 {
    let Some(receiver) = preview else {
        return 0;
    };
    let mut count = 0;
    while receiver.try_recv().is_ok() {
        count += 1;
    }
    count
}

async fn calibrate(
    session: &mut Session,
    preview: &mut Option<mpsc::Receiver<Frame>>,
    cancel: &AtomicBool,
) -> SessionResult<()> {
    let chroma = session.chroma();
    println!(
        "threshold={:.3} smoothing={:.3}; enter `threshold <v>`, `smoothing <v>` or `done`",
        chroma.threshold, chroma.smoothing
    );

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut tick = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = line.map_err(|e| SessionError::Runtime(e.to_string()))?;
                let Some(line) = line else {
                    break;
                };
                let mut parts = line.split_whitespace();
                let result = match (parts.next(), parts.next().map(str::parse::<f32>)) {
                    (None, _) => continue,
                    (Some("done"), _) => break,
                    (Some("threshold"), Some(Ok(value))) => session.set_threshold(value).await,
                    (Some("smoothing"), Some(Ok(value))) => session.set_smoothing(value).await,
                    _ => {
                        println!("expected `threshold <v>`, `smoothing <v>` or `done`");
                        continue;
                    }
                };
                match result {
                    Ok(()) => {
                        let chroma = session.chroma();
                        println!("threshold={:.3} smoothing={:.3}", chroma.threshold, chroma.smoothing);
                    }
                    Err(SessionError::Rejected(message)) => println!("{}", message),
                    Err(e) => return Err(e),
                }
            }
            _ = tick.tick() => {
                if cancel.load(Ordering::SeqCst) {
                    session.cancel().await;
                    return Ok(());
                }
                session.poll().await?;
                drain(preview);
            }
        }
    }

    session.finish_calibration().await?;
    Ok(())
}
