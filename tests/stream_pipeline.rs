//! End-to-end pipeline behavior with the synthetic drone source.
//!
//! The simulated camera runs at an accelerated wall-clock rate; the gate's
//! arithmetic still uses the nominal 30 fps source rate, so admission
//! patterns match the real deployment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use image::RgbImage;

use wildsky::detect::{Detection, DetectorBackend, StubBackend};
use wildsky::display::DisplaySink;
use wildsky::frame::PixelFormat;
use wildsky::relay::FrameRelay;
use wildsky::source::{DroneStream, SimulatedDrone, SimulatedDroneConfig, StreamCallbacks};
use wildsky::stream::{StreamController, StreamOptions};

fn fast_drone(budget: u64) -> SimulatedDrone {
    SimulatedDrone::new(SimulatedDroneConfig {
        width: 64,
        height: 48,
        format: PixelFormat::I420,
        source_fps: 1000,
        frame_budget: Some(budget),
        ..SimulatedDroneConfig::default()
    })
    .expect("stub address")
}

fn options(target_fps: u32) -> StreamOptions {
    StreamOptions {
        source_fps: 30,
        target_fps,
        stop_when_stream_ends: true,
    }
}

#[derive(Clone, Default)]
struct CountingSink {
    shown: Arc<AtomicU64>,
}

impl CountingSink {
    fn shown(&self) -> u64 {
        self.shown.load(Ordering::SeqCst)
    }
}

impl DisplaySink for CountingSink {
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    fn show(&mut self, _image: &RgbImage) -> Result<()> {
        self.shown.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {}
}

/// Fails a configurable set of detect calls, succeeds otherwise.
struct FlakyDetector {
    calls: u64,
    fail_on_call: u64,
}

impl FlakyDetector {
    fn new(fail_on_call: u64) -> Self {
        Self {
            calls: 0,
            fail_on_call,
        }
    }
}

impl DetectorBackend for FlakyDetector {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
        self.calls += 1;
        if self.calls == self.fail_on_call {
            Err(anyhow!("simulated detector outage"))
        } else {
            Ok(Vec::new())
        }
    }
}

#[test]
fn every_dequeued_frame_is_released_exactly_once() {
    let drone = fast_drone(20);
    let sink = CountingSink::default();
    let mut controller = StreamController::new(
        Box::new(drone),
        Box::new(StubBackend::new()),
        Box::new(sink),
        wildsky::render::RenderConfig::default(),
        options(10),
    );

    controller.start().unwrap();
    let stats = controller.run().unwrap();
    controller.stop().unwrap();

    assert_eq!(stats.relayed, 20);
    assert_eq!(controller.ledger().issued(), 20);
    assert_eq!(controller.ledger().released(), 20);
    assert_eq!(controller.ledger().outstanding(), 0);
}

#[test]
fn rate_gate_selects_the_expected_frames() {
    // divisor = 30 / 6 = 5, so of indices 0..=5 only 0 and 5 pass.
    let drone = fast_drone(6);
    let sink = CountingSink::default();
    let shown = sink.clone();
    let mut controller = StreamController::new(
        Box::new(drone),
        Box::new(StubBackend::new()),
        Box::new(sink),
        wildsky::render::RenderConfig::default(),
        options(6),
    );

    controller.start().unwrap();
    let stats = controller.run().unwrap();
    controller.stop().unwrap();

    assert_eq!(stats.relayed, 6);
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.gated_out, 4);
    assert_eq!(stats.failed, 0);
    assert_eq!(shown.shown(), 2);
}

#[test]
fn full_rate_processes_every_frame() {
    let drone = fast_drone(15);
    let sink = CountingSink::default();
    let shown = sink.clone();
    let mut controller = StreamController::new(
        Box::new(drone),
        Box::new(StubBackend::new()),
        Box::new(sink),
        wildsky::render::RenderConfig::default(),
        options(30),
    );

    controller.start().unwrap();
    let stats = controller.run().unwrap();
    controller.stop().unwrap();

    assert_eq!(stats.processed, 15);
    assert_eq!(stats.gated_out, 0);
    assert_eq!(shown.shown(), 15);
}

#[test]
fn detector_failure_skips_the_frame_and_continues() {
    let drone = fast_drone(10);
    let sink = CountingSink::default();
    let shown = sink.clone();
    let mut controller = StreamController::new(
        Box::new(drone),
        Box::new(FlakyDetector::new(1)),
        Box::new(sink),
        wildsky::render::RenderConfig::default(),
        options(30),
    );

    controller.start().unwrap();
    let stats = controller.run().unwrap();
    controller.stop().unwrap();

    // First detection blew up; the other nine frames still made it through.
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.processed, 9);
    assert_eq!(shown.shown(), 9);
    // The failed frame was released like any other.
    assert_eq!(controller.ledger().outstanding(), 0);
}

#[test]
fn flush_notification_drains_queued_frames() {
    // No consumer: frames pile up in the relay, and the flush fired after
    // frame 5 discards exactly the five frames queued at that point.
    let mut drone = SimulatedDrone::new(SimulatedDroneConfig {
        width: 32,
        height: 24,
        source_fps: 1000,
        frame_budget: Some(10),
        flush_after: Some(5),
        ..SimulatedDroneConfig::default()
    })
    .unwrap();
    drone.connect().unwrap();

    let relay = FrameRelay::new();
    let push_relay = relay.clone();
    let flush_relay = relay.clone();
    let drained = Arc::new(Mutex::new(0usize));
    let drained_sink = Arc::clone(&drained);

    let ended = Arc::new(AtomicU64::new(0));
    let ended_flag = Arc::clone(&ended);
    let callbacks = StreamCallbacks::new(move |frame| push_relay.push(frame))
        .with_flush(move || {
            *drained_sink.lock().unwrap() += flush_relay.flush();
        })
        .with_end(move || {
            ended_flag.store(1, Ordering::SeqCst);
        });

    drone.start_streaming(callbacks).unwrap();
    while ended.load(Ordering::SeqCst) == 0 {
        std::thread::sleep(Duration::from_millis(1));
    }
    drone.stop_streaming().unwrap();

    assert_eq!(*drained.lock().unwrap(), 5);
    assert_eq!(relay.len(), 5);

    // Frames pushed after the flush are unaffected and release normally.
    let mut popped = 0;
    while relay.pop(Duration::from_millis(1)).is_some() {
        popped += 1;
    }
    assert_eq!(popped, 5);
    assert_eq!(drone.ledger().issued(), 10);
    assert_eq!(drone.ledger().outstanding(), 0);
    drone.disconnect().unwrap();
}

#[test]
fn run_requires_start() {
    let drone = fast_drone(1);
    let mut controller = StreamController::new(
        Box::new(drone),
        Box::new(StubBackend::new()),
        Box::new(CountingSink::default()),
        wildsky::render::RenderConfig::default(),
        options(30),
    );
    assert!(controller.run().is_err());
}

#[test]
fn stop_before_start_is_a_no_op() {
    let drone = fast_drone(1);
    let mut controller = StreamController::new(
        Box::new(drone),
        Box::new(StubBackend::new()),
        Box::new(CountingSink::default()),
        wildsky::render::RenderConfig::default(),
        options(30),
    );
    assert!(controller.stop().is_ok());
    assert!(controller.stop().is_ok());
}
