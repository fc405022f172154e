//! Drone SDK boundary.
//!
//! Frames arrive by callback from the SDK's internal streaming thread; this
//! module defines that surface and the sources that implement it:
//! - [`SimulatedDrone`]: synthetic frames for tests and drone-less runs,
//!   selected by `stub://` addresses.
//! - `GstDroneStream` (feature `stream-gstreamer`): the drone's RTSP video
//!   feed pulled through GStreamer.
//!
//! Flight control and the rest of the vendor SDK stay out of scope; only
//! connect/disconnect and streaming start/stop are modeled.

#[cfg(feature = "stream-gstreamer")]
pub mod rtsp;
pub mod sim;

#[cfg(feature = "stream-gstreamer")]
pub use rtsp::{GstDroneStream, GstStreamConfig};
pub use sim::{SimulatedDrone, SimulatedDroneConfig};

use anyhow::Result;

use crate::frame::{FrameLedger, FrameRef};

/// Callback set registered with the SDK before streaming starts. Mirrors
/// the vendor surface: raw-frame delivery, start/end of stream, and a flush
/// notification on discontinuity.
///
/// `on_frame` receives ownership of one frame reference per call; the
/// receiver (in practice the relay) is responsible for its release.
pub struct StreamCallbacks {
    pub on_frame: Box<dyn FnMut(FrameRef) + Send>,
    pub on_start: Box<dyn FnMut() + Send>,
    pub on_end: Box<dyn FnMut() + Send>,
    pub on_flush: Box<dyn FnMut() + Send>,
}

impl StreamCallbacks {
    /// Build a callback set with the mandatory frame callback; the rest
    /// default to no-ops.
    pub fn new(on_frame: impl FnMut(FrameRef) + Send + 'static) -> Self {
        Self {
            on_frame: Box::new(on_frame),
            on_start: Box::new(|| {}),
            on_end: Box::new(|| {}),
            on_flush: Box::new(|| {}),
        }
    }

    pub fn with_start(mut self, on_start: impl FnMut() + Send + 'static) -> Self {
        self.on_start = Box::new(on_start);
        self
    }

    pub fn with_end(mut self, on_end: impl FnMut() + Send + 'static) -> Self {
        self.on_end = Box::new(on_end);
        self
    }

    pub fn with_flush(mut self, on_flush: impl FnMut() + Send + 'static) -> Self {
        self.on_flush = Box::new(on_flush);
        self
    }
}

/// Source statistics snapshot, for the health log.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_emitted: u64,
    pub address: String,
}

/// The streaming side of the drone connection.
pub trait DroneStream: Send {
    /// Establish the connection. Fatal on failure: the process aborts
    /// before the consumer loop starts.
    fn connect(&mut self) -> Result<()>;

    /// Register callbacks and start the video stream.
    fn start_streaming(&mut self, callbacks: StreamCallbacks) -> Result<()>;

    /// Stop the video stream. Idempotent.
    fn stop_streaming(&mut self) -> Result<()>;

    /// Tear the connection down. Idempotent.
    fn disconnect(&mut self) -> Result<()>;

    /// The ledger tracking this source's frame references.
    fn ledger(&self) -> &FrameLedger;

    fn stats(&self) -> SourceStats;
}

/// Whether an address selects the synthetic source.
pub fn is_stub_address(address: &str) -> bool {
    address == "stub" || address.starts_with("stub://")
}

/// Construct the drone source the settings select: synthetic for `stub://`
/// addresses, the RTSP feed otherwise.
pub fn build_drone(drone: &crate::config::DroneSettings) -> Result<Box<dyn DroneStream>> {
    if drone.is_stub() {
        let address = if drone.ip.starts_with("stub://") {
            drone.ip.clone()
        } else {
            "stub://anafi".to_string()
        };
        let config = SimulatedDroneConfig {
            address,
            source_fps: drone.source_fps,
            ..SimulatedDroneConfig::default()
        };
        return Ok(Box::new(SimulatedDrone::new(config)?));
    }

    #[cfg(feature = "stream-gstreamer")]
    {
        let config = GstStreamConfig {
            url: drone.rtsp_url(),
            source_fps: drone.source_fps,
        };
        Ok(Box::new(GstDroneStream::new(config)?))
    }
    #[cfg(not(feature = "stream-gstreamer"))]
    {
        Err(anyhow::anyhow!(
            "streaming from {} requires the stream-gstreamer feature \
             (or set DRONE_IP=stub://anafi for the synthetic source)",
            drone.rtsp_url()
        ))
    }
}
