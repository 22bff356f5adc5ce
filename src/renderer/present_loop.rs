// SPDX-License-Identifier: GPL-3.0-only

//! Display-consumer thread lifecycle
//!
//! Drives `present_frame` at a fixed display cadence on its own thread,
//! independent of the capture producer. The controller owns the thread and
//! guarantees clean shutdown: stopping waits for the current iteration to
//! finish rather than racing it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Action returned by the loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a fixed-cadence present loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let renderer = Arc::clone(&renderer);
/// let controller = PresentLoopController::start(
///     "preview-present",
///     Duration::from_millis(16),
///     move || match renderer.present_frame() {
///         Ok(_) => LoopAction::Continue,
///         Err(e) => {
///             warn!("Present failed: {}", e);
///             LoopAction::Stop
///         }
///     },
/// );
/// // Later, on surface teardown
/// controller.stop();
/// ```
pub struct PresentLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl PresentLoopController {
    /// Start a present loop calling `tick_fn` once per cadence interval.
    ///
    /// The closure runs until it returns [`LoopAction::Stop`] or `stop()` is
    /// called. Iterations are paced against the tick start, so a slow tick
    /// does not accumulate drift.
    pub fn start<F>(name: &str, cadence: Duration, mut tick_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, cadence_ms = cadence.as_millis() as u64, "Starting present loop");

        let thread_handle = thread::spawn(move || {
            debug!(name = %name_clone, "Present loop thread started");

            loop {
                if stop_signal_clone.load(Ordering::SeqCst) {
                    debug!(name = %name_clone, "Stop signal received");
                    break;
                }

                let tick_start = Instant::now();
                match tick_fn() {
                    LoopAction::Continue => {}
                    LoopAction::Stop => {
                        debug!(name = %name_clone, "Loop requested stop");
                        break;
                    }
                }

                if let Some(remaining) = cadence.checked_sub(tick_start.elapsed()) {
                    thread::sleep(remaining);
                }
            }

            info!(name = %name_clone, "Present loop thread exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop without waiting for the thread
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting present loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending a stop signal
    ///
    /// Useful if the loop stops itself via [`LoopAction::Stop`].
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for present loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Present loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Present loop thread finished");
            }
        }
    }
}

impl Drop for PresentLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "PresentLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_loop_stops_itself() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller =
            PresentLoopController::start("test-loop", Duration::from_millis(1), move || {
                let count = counter_clone.fetch_add(1, Ordering::SeqCst);
                if count >= 5 {
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            });

        controller.join();
        assert_eq!(counter.load(Ordering::SeqCst), 6); // 0-5 inclusive
    }

    #[test]
    fn test_stop_signal() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller =
            PresentLoopController::start("test-loop", Duration::from_millis(5), move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                LoopAction::Continue
            });

        thread::sleep(Duration::from_millis(30));
        controller.stop();
        assert!(counter.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_is_running_and_drop() {
        let controller =
            PresentLoopController::start("test-running", Duration::from_millis(50), || {
                LoopAction::Continue
            });

        assert!(controller.is_running());
        // Drop stops the loop
        drop(controller);
    }
}
