// SPDX-License-Identifier: GPL-3.0-only

//! Stop/reconfigure racing against frame delivery and other callers.
//! Sleeps only nudge the interleaving; the assertions hold for any schedule.

mod common;

use capture_coordinator::capture::{
    CaptureConfig, CaptureSession, CaptureState, CorrelationHandle, FrameOutcome, PixelFormat,
    RenderTarget,
};
use common::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

const SURFACE: RenderTarget = RenderTarget::Surface(1);
const HD_FRAME: usize = 1280 * 720 * 12 / 8;

fn start_running(session: &CaptureSession) {
    session.notify_surface_ready(SURFACE).unwrap();
    session.request_start(vga()).unwrap();
    assert_eq!(session.state(), CaptureState::Running);
}

#[test]
fn test_stop_waits_for_in_flight_frame() {
    let sink = RecordingSink::slow(Duration::from_millis(50));
    let (session, device) = session_with(Default::default(), Arc::clone(&sink));
    start_running(&session);

    let producer = {
        let device = device.clone();
        thread::spawn(move || device.push_frame(VGA_FRAME))
    };
    thread::sleep(Duration::from_millis(10));

    session.stop();
    let at_stop = sink.count();

    let outcome = producer.join().unwrap();
    assert_eq!(sink.count(), at_stop, "no frame may be forwarded after stop returns");
    match outcome {
        Some(FrameOutcome::Forwarded) => assert_eq!(at_stop, 1),
        _ => assert_eq!(at_stop, 0),
    }
}

#[test]
fn test_no_frames_after_stop_from_stale_callback() {
    let sink = RecordingSink::new();
    let (session, device) = session_with(Default::default(), Arc::clone(&sink));
    start_running(&session);

    let callback = device.callback().unwrap();
    let done = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicUsize::new(0));

    let producer = {
        let done = Arc::clone(&done);
        let dropped = Arc::clone(&dropped);
        thread::spawn(move || {
            let frame = vec![0u8; VGA_FRAME];
            while !done.load(Ordering::SeqCst) {
                if callback.deliver_borrowed(&frame, VGA_FRAME) == FrameOutcome::DroppedNotRunning {
                    dropped.fetch_add(1, Ordering::SeqCst);
                }
            }
        })
    };

    thread::sleep(Duration::from_millis(20));
    session.stop();
    let at_stop = sink.count();

    thread::sleep(Duration::from_millis(20));
    done.store(true, Ordering::SeqCst);
    producer.join().unwrap();

    assert_eq!(sink.count(), at_stop);
    assert!(dropped.load(Ordering::SeqCst) > 0);
    assert_eq!(
        session.diagnostics().dropped_not_running,
        dropped.load(Ordering::SeqCst) as u64
    );
}

#[test]
fn test_reconfigure_never_mixes_frame_sizes() {
    // Completed reconfigures, and whether one is in flight. The sink runs
    // under the frame lock, so no reconfigure can finish while it reads these.
    let completed = Arc::new(AtomicUsize::new(0));
    let in_flight = Arc::new(AtomicBool::new(false));
    let forwarded: Arc<Mutex<Vec<(usize, usize, bool)>>> = Arc::new(Mutex::new(Vec::new()));

    let sink = {
        let completed = Arc::clone(&completed);
        let in_flight = Arc::clone(&in_flight);
        let forwarded = Arc::clone(&forwarded);
        move |_: &[u8], length: usize, _: CorrelationHandle| {
            let busy = in_flight.load(Ordering::SeqCst);
            let epoch = completed.load(Ordering::SeqCst);
            forwarded.lock().unwrap().push((length, epoch, busy));
        }
    };
    let (device, handle) = MockDevice::new();
    let session = CaptureSession::builder(Arc::new(sink))
        .device(Box::new(device))
        .build();
    start_running(&session);

    // The callback survives restarts: it always targets the session's relay
    let callback = handle.callback().unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let frame = vec![0u8; HD_FRAME];
            let mut toggle = false;
            while !done.load(Ordering::SeqCst) {
                let len = if toggle { HD_FRAME } else { VGA_FRAME };
                callback.deliver_borrowed(&frame, len);
                toggle = !toggle;
            }
        })
    };

    // Reconfigure `i` installs HD for even `i`, so epoch `n` runs HD when odd
    let hd = CaptureConfig::new(1280, 720, 30, PixelFormat::NV21).unwrap();
    let size_at = |epoch: usize| if epoch % 2 == 1 { HD_FRAME } else { VGA_FRAME };
    for i in 0..10 {
        let config = if i % 2 == 0 { hd } else { vga() };
        in_flight.store(true, Ordering::SeqCst);
        session.reconfigure(config).unwrap();
        completed.store(i + 1, Ordering::SeqCst);
        in_flight.store(false, Ordering::SeqCst);
        assert_eq!(session.expected_frame_size(), Some(size_at(i + 1)));
        thread::sleep(Duration::from_millis(2));
    }

    done.store(true, Ordering::SeqCst);
    producer.join().unwrap();

    let forwarded = forwarded.lock().unwrap();
    assert!(!forwarded.is_empty());
    for &(length, epoch, busy) in forwarded.iter() {
        if busy {
            assert!(length == size_at(epoch) || length == size_at(epoch + 1));
        } else {
            assert_eq!(length, size_at(epoch), "forwarded in epoch {}", epoch);
        }
    }
    assert!(session.diagnostics().size_mismatches > 0);
    assert_eq!(session.state(), CaptureState::Running);
}

#[test]
fn test_concurrent_callers_keep_state_consistent() {
    let sink = RecordingSink::new();
    let (session, device) = session_with(Default::default(), Arc::clone(&sink));
    let session = Arc::new(session);

    let mut workers = Vec::new();
    for worker in 0..4 {
        let session = Arc::clone(&session);
        workers.push(thread::spawn(move || {
            for i in 0..50 {
                match (worker + i) % 4 {
                    0 => {
                        session.start(640, 480, 30);
                    }
                    1 => {
                        session.stop();
                    }
                    2 => {
                        let _ = session.notify_surface_ready(SURFACE);
                    }
                    _ => {
                        session.set_rotation(i as i32 * 90);
                    }
                }
            }
        }));
    }

    let frames = {
        let device = device.clone();
        thread::spawn(move || {
            for _ in 0..500 {
                device.push_frame(VGA_FRAME);
            }
        })
    };

    for worker in workers {
        worker.join().unwrap();
    }
    frames.join().unwrap();

    assert_eq!(
        session.state() == CaptureState::Running,
        device.is_streaming()
    );

    let mut streaming = false;
    for call in device.calls() {
        match call {
            DeviceCall::StartStreaming => {
                assert!(!streaming, "double start");
                streaming = true;
            }
            DeviceCall::StopStreaming => streaming = false,
            _ => {}
        }
    }

    session.teardown().unwrap();
    assert!(!device.is_streaming());
}
