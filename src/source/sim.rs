//! Synthetic drone source.
//!
//! Generates YUV frames from a producer thread at the camera's native rate,
//! with an occasional scene change so detection stubs have something to
//! notice. Tests can cap the number of frames and inject a mid-stream flush
//! notification to exercise discontinuity handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::frame::{FrameLedger, PixelFormat, VideoFrame};
use crate::source::{DroneStream, SourceStats, StreamCallbacks};

/// Configuration for the synthetic source.
#[derive(Clone, Debug)]
pub struct SimulatedDroneConfig {
    /// Stub address, e.g. "stub://anafi".
    pub address: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Native camera rate in frames per second.
    pub source_fps: u32,
    /// Stop emitting after this many frames (tests).
    pub frame_budget: Option<u64>,
    /// Fire the flush notification once, after this many frames (tests).
    pub flush_after: Option<u64>,
}

impl Default for SimulatedDroneConfig {
    fn default() -> Self {
        Self {
            address: "stub://anafi".to_string(),
            width: 640,
            height: 480,
            format: PixelFormat::I420,
            source_fps: 30,
            frame_budget: None,
            flush_after: None,
        }
    }
}

/// Synthetic drone video source.
pub struct SimulatedDrone {
    config: SimulatedDroneConfig,
    ledger: FrameLedger,
    connected: bool,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SimulatedDrone {
    pub fn new(config: SimulatedDroneConfig) -> Result<Self> {
        if !crate::source::is_stub_address(&config.address) {
            return Err(anyhow!(
                "simulated drone expects a stub:// address, got '{}'",
                config.address
            ));
        }
        Ok(Self {
            config,
            ledger: FrameLedger::new(),
            connected: false,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }
}

impl DroneStream for SimulatedDrone {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("drone: connected to {} (synthetic)", self.config.address);
        Ok(())
    }

    fn start_streaming(&mut self, callbacks: StreamCallbacks) -> Result<()> {
        if !self.connected {
            return Err(anyhow!("drone not connected; call connect() first"));
        }
        if self.worker.is_some() {
            return Err(anyhow!("streaming already started"));
        }

        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let ledger = self.ledger.clone();
        let config = self.config.clone();

        self.worker = Some(std::thread::spawn(move || {
            produce_frames(config, ledger, stop, callbacks);
        }));
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("synthetic producer thread panicked"))?;
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.stop_streaming()?;
        if self.connected {
            self.connected = false;
            log::info!("drone: disconnected from {}", self.config.address);
        }
        Ok(())
    }

    fn ledger(&self) -> &FrameLedger {
        &self.ledger
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_emitted: self.ledger.issued(),
            address: self.config.address.clone(),
        }
    }
}

fn produce_frames(
    config: SimulatedDroneConfig,
    ledger: FrameLedger,
    stop: Arc<AtomicBool>,
    mut callbacks: StreamCallbacks,
) {
    (callbacks.on_start)();

    let interval = frame_interval(config.source_fps);
    let mut frame_count: u64 = 0;
    let mut scene_state: u8 = 0;

    while !stop.load(Ordering::SeqCst) {
        if let Some(budget) = config.frame_budget {
            if frame_count >= budget {
                break;
            }
        }
        if config.flush_after == Some(frame_count) {
            (callbacks.on_flush)();
        }

        // Scene jumps to a new random state occasionally, like something
        // walking into view.
        if frame_count > 0 && frame_count % 50 == 0 {
            scene_state = rand::random();
        }

        match synthetic_frame(&config, frame_count, scene_state) {
            Ok(frame) => (callbacks.on_frame)(ledger.issue(frame)),
            Err(err) => log::error!("synthetic frame generation failed: {:?}", err),
        }
        frame_count += 1;

        std::thread::sleep(interval);
    }

    (callbacks.on_end)();
}

fn frame_interval(source_fps: u32) -> Duration {
    if source_fps == 0 {
        Duration::from_millis(33)
    } else {
        Duration::from_millis(u64::from((1000 / source_fps).max(1)))
    }
}

fn synthetic_frame(
    config: &SimulatedDroneConfig,
    frame_count: u64,
    scene_state: u8,
) -> Result<VideoFrame> {
    let luma = config.width as usize * config.height as usize;
    let total = config.format.frame_len(config.width, config.height);

    let mut data = Vec::with_capacity(total);
    for i in 0..luma {
        data.push(((i as u64 + frame_count + scene_state as u64) % 256) as u8);
    }
    // Neutral chroma keeps decoded output grayscale; both layouts interleave
    // or stack the same 128-valued planes.
    data.resize(total, 128);

    VideoFrame::new(config.format, config.width, config.height, data)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn fast_config(budget: u64) -> SimulatedDroneConfig {
        SimulatedDroneConfig {
            width: 32,
            height: 24,
            source_fps: 1000,
            frame_budget: Some(budget),
            ..SimulatedDroneConfig::default()
        }
    }

    #[test]
    fn rejects_non_stub_addresses() {
        let config = SimulatedDroneConfig {
            address: "192.168.53.1".to_string(),
            ..SimulatedDroneConfig::default()
        };
        assert!(SimulatedDrone::new(config).is_err());
    }

    #[test]
    fn requires_connect_before_streaming() {
        let mut drone = SimulatedDrone::new(fast_config(1)).unwrap();
        let callbacks = StreamCallbacks::new(|_| {});
        assert!(drone.start_streaming(callbacks).is_err());
    }

    #[test]
    fn emits_the_budgeted_number_of_frames() {
        let mut drone = SimulatedDrone::new(fast_config(5)).unwrap();
        drone.connect().unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let ended = Arc::new(AtomicBool::new(false));
        let ended_flag = Arc::clone(&ended);

        let callbacks = StreamCallbacks::new(move |frame| {
            sink.lock().unwrap().push((frame.width(), frame.height()));
        })
        .with_end(move || ended_flag.store(true, Ordering::SeqCst));

        drone.start_streaming(callbacks).unwrap();
        while !ended.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        drone.disconnect().unwrap();

        let frames = received.lock().unwrap();
        assert_eq!(frames.len(), 5);
        assert!(frames.iter().all(|&(w, h)| w == 32 && h == 24));
        // Callbacks dropped their handles; nothing outstanding.
        assert_eq!(drone.ledger().outstanding(), 0);
        assert_eq!(drone.stats().frames_emitted, 5);
    }

    #[test]
    fn fires_flush_notification_once() {
        let mut config = fast_config(4);
        config.flush_after = Some(2);
        let mut drone = SimulatedDrone::new(config).unwrap();
        drone.connect().unwrap();

        let flushes = Arc::new(AtomicBool::new(false));
        let flushed = Arc::clone(&flushes);
        let callbacks =
            StreamCallbacks::new(|_| {}).with_flush(move || flushed.store(true, Ordering::SeqCst));

        drone.start_streaming(callbacks).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        drone.disconnect().unwrap();
        assert!(flushes.load(Ordering::SeqCst));
    }
}
