// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for the frame-processing loop
//!
//! The loop state is moved into the thread and dropped there when the loop
//! ends, so joining the thread guarantees everything the state owned (camera
//! devices included) has been released.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// What the loop body wants next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// A dedicated thread running one loop body over owned state
pub struct LoopController {
    thread: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    name: String,
}

impl LoopController {
    /// Move `state` into a new thread and call `body` on it until it
    /// returns [`LoopAction::Stop`] or [`stop`](Self::stop) is called
    ///
    /// `on_exit` runs on the loop thread with the state before it is dropped.
    pub fn spawn<S, F, E>(name: &str, mut state: S, mut body: F, on_exit: E) -> std::io::Result<Self>
    where
        S: Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
        E: FnOnce(&mut S) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_name = name.to_string();

        info!(name, "Starting processing loop");

        let thread = thread::Builder::new().name(name.to_string()).spawn(move || {
            debug!(name = %thread_name, "Processing thread started");

            while !thread_stop.load(Ordering::SeqCst) {
                if body(&mut state) == LoopAction::Stop {
                    debug!(name = %thread_name, "Loop body requested stop");
                    break;
                }
            }

            on_exit(&mut state);
            drop(state);
            info!(name = %thread_name, "Processing thread exiting");
        })?;

        Ok(Self {
            thread: Some(thread),
            stop,
            name: name.to_string(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }

    /// Stop the loop and wait until its state has been dropped
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.join();
    }

    /// Wait for the loop to end on its own
    pub fn join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        match thread.join() {
            Ok(()) => debug!(name = %self.name, "Processing thread joined"),
            Err(e) => warn!(name = %self.name, "Processing thread panicked: {:?}", e),
        }
    }
}

impl Drop for LoopController {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn test_loop_stops_itself() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = LoopController::spawn(
            "test-loop",
            0u32,
            move |n| {
                *n += 1;
                counter_clone.store(*n, Ordering::SeqCst);
                if *n >= 10 { LoopAction::Stop } else { LoopAction::Continue }
            },
            |_| {},
        )
        .unwrap();

        controller.join();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_state_dropped_before_join_returns() {
        struct Flag(Arc<AtomicBool>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let mut controller = LoopController::spawn(
            "test-drop",
            Flag(Arc::clone(&dropped)),
            |_| {
                thread::sleep(Duration::from_millis(5));
                LoopAction::Continue
            },
            |_| {},
        )
        .unwrap();

        assert!(controller.is_running());
        controller.stop();
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn test_on_exit_runs() {
        let exited = Arc::new(AtomicBool::new(false));
        let exited_clone = Arc::clone(&exited);
        let mut controller = LoopController::spawn(
            "test-exit",
            (),
            |_| LoopAction::Stop,
            move |_| exited_clone.store(true, Ordering::SeqCst),
        )
        .unwrap();
        controller.join();
        assert!(exited.load(Ordering::SeqCst));
    }
}
