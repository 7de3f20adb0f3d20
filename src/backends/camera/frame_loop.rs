// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle for device delivery loops
//!
//! Devices that produce frames on their own thread (the virtual device, the
//! V4L2 mmap reader) run their per-frame work through a
//! [`CaptureLoopController`], which owns the thread and its stop signal.

use super::types::{DeviceError, DeviceResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by the loop body to control the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Run another iteration
    Continue,
    /// Exit the loop
    Stop,
}

/// Owner of a delivery thread
///
/// # Example
///
/// ```ignore
/// let controller = CaptureLoopController::spawn("virtual-frames", move || {
///     produce_one_frame();
///     LoopAction::Continue
/// })?;
///
/// controller.stop(); // joins the thread
/// ```
pub struct CaptureLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl CaptureLoopController {
    /// Spawn a named thread that runs `loop_fn` until it returns
    /// [`LoopAction::Stop`] or the controller is stopped.
    pub fn spawn<F>(name: &str, mut loop_fn: F) -> DeviceResult<Self>
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::spawn_with_init(name, || Ok(()), move |_: &mut ()| loop_fn())
    }

    /// Spawn a loop whose resources are created on the loop thread itself.
    ///
    /// `init_fn` runs once on the new thread and this call waits for it. If
    /// it fails the thread exits without running the loop body and the error
    /// is returned here.
    pub fn spawn_with_init<S, I, F>(name: &str, init_fn: I, mut loop_fn: F) -> DeviceResult<Self>
    where
        S: 'static,
        I: FnOnce() -> DeviceResult<S> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();
        let (init_tx, init_rx) = mpsc::sync_channel::<DeviceResult<()>>(1);

        info!(name = %name, "Starting delivery loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut state = match init_fn() {
                    Ok(state) => {
                        let _ = init_tx.send(Ok(()));
                        state
                    }
                    Err(e) => {
                        warn!(name = %thread_name, error = %e, "Delivery loop initialization failed");
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };

                while !thread_stop.load(Ordering::Acquire) {
                    if loop_fn(&mut state) == LoopAction::Stop {
                        debug!(name = %thread_name, "Delivery loop requested stop");
                        break;
                    }
                }

                debug!(name = %thread_name, "Delivery loop thread exiting");
            })
            .map_err(|e| DeviceError::Other(format!("spawn {}: {}", name, e)))?;

        let init_result = init_rx.recv().unwrap_or_else(|_| {
            Err(DeviceError::Other(format!(
                "{} exited during initialization",
                name
            )))
        });
        if let Err(e) = init_result {
            if thread_handle.join().is_err() {
                warn!(name = %name, "Delivery loop thread panicked during initialization");
            }
            return Err(e);
        }

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Signal the loop to stop without waiting
    pub fn request_stop(&self) {
        self.stop_signal.store(true, Ordering::Release);
    }

    /// Signal the loop and wait for the thread to exit
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to exit on its own
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                // Stopping from inside the loop body; the loop exits on its own
                return;
            }
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Delivery loop thread panicked: {:?}", e);
            } else {
                info!(name = %self.name, "Delivery loop stopped");
            }
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
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

        let mut controller = CaptureLoopController::spawn("test-loop", move || {
            if counter_clone.fetch_add(1, Ordering::SeqCst) >= 4 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        })
        .unwrap();

        controller.join();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_stop_joins() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = CaptureLoopController::spawn("test-stop", move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            LoopAction::Continue
        })
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        controller.stop();

        let after_stop = counter.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_init_state_reaches_loop() {
        let result = Arc::new(AtomicU32::new(0));
        let result_clone = Arc::clone(&result);

        let mut controller = CaptureLoopController::spawn_with_init(
            "test-init",
            || Ok(7u32),
            move |state| {
                result_clone.store(*state, Ordering::SeqCst);
                LoopAction::Stop
            },
        )
        .unwrap();

        controller.join();
        assert_eq!(result.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_init_failure_skips_loop() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);

        let result = CaptureLoopController::spawn_with_init(
            "test-init-fail",
            || Err::<(), _>(DeviceError::NotAvailable("no device".to_string())),
            move |_: &mut ()| {
                ran_clone.store(true, Ordering::SeqCst);
                LoopAction::Stop
            },
        );

        assert!(matches!(result, Err(DeviceError::NotAvailable(_))));
        assert!(!ran.load(Ordering::SeqCst));
    }
}
