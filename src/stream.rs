//! Stream controller.
//!
//! Wires the drone source, frame relay, rate gate, detector, renderer, and
//! display sink into the demo loop: connect, register callbacks, stream,
//! consume until stopped, tear down. One steady state, one terminal
//! transition, no retries and no backoff; per-frame failures are logged and
//! the loop moves on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use crate::decode::decode_frame;
use crate::detect::DetectorBackend;
use crate::display::DisplaySink;
use crate::frame::FrameRef;
use crate::gate::RateGate;
use crate::relay::FrameRelay;
use crate::render::{render_detections, RenderConfig};
use crate::source::{DroneStream, StreamCallbacks};

/// Native camera rate of the drone feed.
pub const DEFAULT_SOURCE_FPS: u32 = 30;

/// Short dequeue timeout; keeps the loop responsive to the stop signal
/// without busy-waiting.
const POLL_TIMEOUT: Duration = Duration::from_millis(10);

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Loop parameters.
#[derive(Clone, Debug)]
pub struct StreamOptions {
    /// Camera's native frame rate.
    pub source_fps: u32,
    /// Target display/detection rate (the rate-gate divisor input).
    pub target_fps: u32,
    /// Exit the loop once the source signals end-of-stream and the relay
    /// has drained.
    pub stop_when_stream_ends: bool,
}

impl StreamOptions {
    pub fn new(target_fps: u32) -> Self {
        Self {
            source_fps: DEFAULT_SOURCE_FPS,
            target_fps,
            stop_when_stream_ends: true,
        }
    }
}

/// Counters reported at shutdown and in the periodic health line.
#[derive(Clone, Debug, Default)]
pub struct StreamStats {
    /// Frames dequeued from the relay.
    pub relayed: u64,
    /// Frames that passed the gate and were detected/rendered/shown.
    pub processed: u64,
    /// Frames skipped by the rate gate.
    pub gated_out: u64,
    /// Frames that failed mid-pipeline (decode, detect, render, display).
    pub failed: u64,
    /// Frames discarded by the teardown flush.
    pub flushed: u64,
}

/// Orchestrates one stream session from connect to teardown.
pub struct StreamController {
    drone: Box<dyn DroneStream>,
    detector: Box<dyn DetectorBackend>,
    display: Box<dyn DisplaySink>,
    render: RenderConfig,
    options: StreamOptions,
    relay: FrameRelay,
    stop: Arc<AtomicBool>,
    stream_ended: Arc<AtomicBool>,
    stats: StreamStats,
    started: bool,
}

impl StreamController {
    pub fn new(
        drone: Box<dyn DroneStream>,
        detector: Box<dyn DetectorBackend>,
        display: Box<dyn DisplaySink>,
        render: RenderConfig,
        options: StreamOptions,
    ) -> Self {
        Self {
            drone,
            detector,
            display,
            render,
            options,
            relay: FrameRelay::new(),
            stop: Arc::new(AtomicBool::new(false)),
            stream_ended: Arc::new(AtomicBool::new(false)),
            stats: StreamStats::default(),
            started: false,
        }
    }

    /// Flag the caller flips (e.g. from a Ctrl-C handler) to end `run`.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Connect to the drone, warm the detector up, open the display, and
    /// start streaming into the relay. Failures here are fatal: nothing has
    /// been queued yet and the process should abort.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(anyhow!("stream already started"));
        }

        self.drone.connect().context("connect to drone")?;
        self.detector
            .warm_up()
            .with_context(|| format!("warm up '{}' detector", self.detector.name()))?;
        self.display.open().context("open display sink")?;

        let relay = self.relay.clone();
        let flush_relay = self.relay.clone();
        let ended = Arc::clone(&self.stream_ended);
        let callbacks = StreamCallbacks::new(move |frame| relay.push(frame))
            .with_flush(move || {
                let drained = flush_relay.flush();
                if drained > 0 {
                    log::info!("stream discontinuity: flushed {} stale frames", drained);
                }
            })
            .with_end(move || ended.store(true, Ordering::SeqCst));

        self.drone
            .start_streaming(callbacks)
            .context("start video stream")?;
        self.started = true;
        log::info!(
            "streaming at source {} fps, target {} fps",
            self.options.source_fps,
            self.options.target_fps
        );
        Ok(())
    }

    /// Consumer loop. Returns the final counters once the stop flag is set
    /// or the stream ends.
    pub fn run(&mut self) -> Result<StreamStats> {
        if !self.started {
            return Err(anyhow!("call start() before run()"));
        }

        let mut gate = RateGate::new(self.options.source_fps, self.options.target_fps);
        let mut last_health = Instant::now();

        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            if self.options.stop_when_stream_ends
                && self.stream_ended.load(Ordering::SeqCst)
                && self.relay.is_empty()
            {
                break;
            }

            let Some(frame) = self.relay.pop(POLL_TIMEOUT) else {
                continue;
            };
            self.stats.relayed += 1;
            let admitted = gate.admit();

            match self.process_frame(&frame, admitted) {
                Ok(true) => self.stats.processed += 1,
                Ok(false) => self.stats.gated_out += 1,
                Err(err) => {
                    self.stats.failed += 1;
                    log::error!("frame {} failed: {:?}", gate.frames_seen() - 1, err);
                }
            }
            // The frame reference is released right here, whatever happened
            // above.
            drop(frame);

            if last_health.elapsed() >= HEALTH_LOG_INTERVAL {
                self.log_health();
                last_health = Instant::now();
            }
        }

        Ok(self.stats.clone())
    }

    /// Decode, gate, and (when admitted) detect, render, and show one
    /// frame. `Ok(true)` means the frame was fully processed, `Ok(false)`
    /// that the gate skipped it after decoding.
    fn process_frame(&mut self, frame: &FrameRef, admitted: bool) -> Result<bool> {
        let mut image = decode_frame(frame).context("decode frame")?;
        if !admitted {
            return Ok(false);
        }

        let detections = self
            .detector
            .detect(&image)
            .with_context(|| format!("'{}' detection", self.detector.name()))?;
        render_detections(&mut image, &detections, &self.render);
        self.display.show(&image).context("display frame")?;
        Ok(true)
    }

    /// Sequential teardown: stop the stream, disconnect, flush whatever is
    /// still queued, close the window. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;

        self.drone.stop_streaming().context("stop video stream")?;
        self.drone.disconnect().context("disconnect drone")?;
        self.stats.flushed += self.relay.flush() as u64;
        self.display.close();

        let outstanding = self.drone.ledger().outstanding();
        if outstanding != 0 {
            log::warn!("{} frame references were never released", outstanding);
        }
        log::info!(
            "stream stopped: relayed={} processed={} gated={} failed={} flushed={}",
            self.stats.relayed,
            self.stats.processed,
            self.stats.gated_out,
            self.stats.failed,
            self.stats.flushed
        );
        Ok(())
    }

    fn log_health(&self) {
        let source = self.drone.stats();
        log::info!(
            "stream health: source={} emitted={} queue_depth={} outstanding={} \
             relayed={} processed={} gated={} failed={}",
            source.address,
            source.frames_emitted,
            self.relay.len(),
            self.drone.ledger().outstanding(),
            self.stats.relayed,
            self.stats.processed,
            self.stats.gated_out,
            self.stats.failed
        );
    }

    /// Ledger of the underlying source, for post-run assertions.
    pub fn ledger(&self) -> &crate::frame::FrameLedger {
        self.drone.ledger()
    }
}
