#![cfg(feature = "stream-gstreamer")]

//! RTSP drone source via GStreamer.
//!
//! The Anafi exposes its camera as an RTSP feed; this source pulls it
//! through `rtspsrc ! decodebin ! videoconvert` negotiated to I420 and
//! pumps frames into the registered callbacks from a reader thread, so the
//! consumer side sees the same callback-driven surface as the vendor SDK.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use gstreamer::prelude::*;

use crate::frame::{FrameLedger, PixelFormat, VideoFrame};
use crate::source::{DroneStream, SourceStats, StreamCallbacks};

/// Configuration for the RTSP source.
#[derive(Clone, Debug)]
pub struct GstStreamConfig {
    /// Full RTSP URL, e.g. "rtsp://192.168.53.1:554/live".
    pub url: String,
    /// Expected camera rate; sets the pull timeout.
    pub source_fps: u32,
}

/// GStreamer-backed drone video source.
pub struct GstDroneStream {
    config: GstStreamConfig,
    ledger: FrameLedger,
    pipeline: Option<gstreamer::Pipeline>,
    appsink: Option<gstreamer_app::AppSink>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl GstDroneStream {
    pub fn new(config: GstStreamConfig) -> Result<Self> {
        Ok(Self {
            config,
            ledger: FrameLedger::new(),
            pipeline: None,
            appsink: None,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }

    fn pull_timeout(&self) -> Duration {
        let base_ms = if self.config.source_fps == 0 {
            500
        } else {
            u64::from((1000 / self.config.source_fps).saturating_mul(4))
        };
        Duration::from_millis(base_ms.max(500))
    }
}

impl DroneStream for GstDroneStream {
    fn connect(&mut self) -> Result<()> {
        gstreamer::init().context("initialize gstreamer")?;

        let description = format!(
            "rtspsrc location={} latency=0 ! decodebin ! videoconvert ! \
             video/x-raw,format=I420 ! appsink name=appsink sync=false \
             max-buffers=4 drop=false",
            self.config.url
        );
        let pipeline = gstreamer::parse::launch(&description)
            .context("build RTSP pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("RTSP pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "I420")
            .build();
        appsink.set_caps(Some(&caps));

        self.pipeline = Some(pipeline);
        self.appsink = Some(appsink);
        log::info!("drone: RTSP pipeline built for {}", self.config.url);
        Ok(())
    }

    fn start_streaming(&mut self, callbacks: StreamCallbacks) -> Result<()> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| anyhow!("drone not connected; call connect() first"))?;
        let appsink = self
            .appsink
            .take()
            .ok_or_else(|| anyhow!("streaming already started"))?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .context("set RTSP pipeline to Playing")?;

        self.stop.store(false, Ordering::SeqCst);
        let stop = Arc::clone(&self.stop);
        let ledger = self.ledger.clone();
        let bus = pipeline.bus();
        let timeout = self.pull_timeout();

        self.worker = Some(std::thread::spawn(move || {
            pump_samples(appsink, bus, ledger, stop, callbacks, timeout);
        }));
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| anyhow!("RTSP reader thread panicked"))?;
        }
        if let Some(pipeline) = &self.pipeline {
            pipeline
                .set_state(gstreamer::State::Null)
                .context("stop RTSP pipeline")?;
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.stop_streaming()?;
        self.pipeline = None;
        self.appsink = None;
        Ok(())
    }

    fn ledger(&self) -> &FrameLedger {
        &self.ledger
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_emitted: self.ledger.issued(),
            address: self.config.url.clone(),
        }
    }
}

fn pump_samples(
    appsink: gstreamer_app::AppSink,
    bus: Option<gstreamer::Bus>,
    ledger: FrameLedger,
    stop: Arc<AtomicBool>,
    mut callbacks: StreamCallbacks,
    timeout: Duration,
) {
    (callbacks.on_start)();

    while !stop.load(Ordering::SeqCst) {
        if let Some(bus) = &bus {
            if drain_bus(bus) {
                break;
            }
        }

        let sample = match appsink.try_pull_sample(gstreamer::ClockTime::from_mseconds(
            timeout.as_millis() as u64,
        )) {
            Some(sample) => sample,
            None => {
                if appsink.is_eos() {
                    log::warn!("RTSP stream reached end of stream");
                    break;
                }
                continue;
            }
        };

        match sample_to_frame(&sample) {
            Ok(frame) => (callbacks.on_frame)(ledger.issue(frame)),
            Err(err) => log::error!("dropping undecodable RTSP sample: {:?}", err),
        }
    }

    (callbacks.on_end)();
}

/// Returns true when the bus reported a terminal condition.
fn drain_bus(bus: &gstreamer::Bus) -> bool {
    use gstreamer::MessageView;
    while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
        match message.view() {
            MessageView::Error(err) => {
                log::error!(
                    "gstreamer error from {:?}: {}",
                    err.src().map(|s| s.path_string()),
                    err.error()
                );
                return true;
            }
            MessageView::Eos(..) => {
                log::warn!("gstreamer reached EOS");
                return true;
            }
            _ => {}
        }
    }
    false
}

/// Repack a sample's I420 planes into one tight buffer, honoring per-plane
/// strides.
fn sample_to_frame(sample: &gstreamer::Sample) -> Result<VideoFrame> {
    let caps = sample.caps().context("RTSP sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse RTSP caps as video info")?;
    let buffer = sample.buffer().context("RTSP sample missing buffer")?;
    let frame = gstreamer_video::VideoFrameRef::from_buffer_ref_readable(buffer, &info)
        .map_err(|_| anyhow!("map RTSP buffer"))?;

    let width = info.width();
    let height = info.height();
    let chroma_width = (width as usize + 1) / 2;
    let chroma_height = (height as usize + 1) / 2;

    let mut data = Vec::with_capacity(PixelFormat::I420.frame_len(width, height));
    for plane in 0..3u32 {
        let stride = frame.plane_stride()[plane as usize] as usize;
        let plane_data = frame
            .plane_data(plane)
            .map_err(|_| anyhow!("read plane {}", plane))?;
        let (row_bytes, rows) = if plane == 0 {
            (width as usize, height as usize)
        } else {
            (chroma_width, chroma_height)
        };
        for row in 0..rows {
            let start = row * stride;
            let end = start + row_bytes;
            data.extend_from_slice(
                plane_data
                    .get(start..end)
                    .context("RTSP plane row out of bounds")?,
            );
        }
    }

    VideoFrame::new(PixelFormat::I420, width, height, data)
}
