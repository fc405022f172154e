//! wildsky - drone wildlife detection demo harness.
//!
//! Relays video frames from a Parrot Anafi-class drone into MegaDetector
//! (served by Triton, or run in-process) and displays the annotated stream.
//! The heavy pieces (the detection model, the inference server, the drone
//! video stack, the display toolkit) are external; this crate owns the
//! glue between them, centered on the frame relay and the rate gate.
//!
//! # Module structure
//!
//! - `frame`: frame buffers and release accounting (`FrameRef`, `FrameLedger`)
//! - `relay`: producer/consumer hand-off queue with discontinuity flush
//! - `gate`: frame-rate decimation
//! - `decode`: YUV → RGB conversion
//! - `detect`: detector boundary (Triton remote, tract local, stub)
//! - `render`: bounding-box overlay
//! - `source`: drone SDK boundary (synthetic, RTSP via GStreamer)
//! - `display`: display sink boundary (headless, OpenCV window)
//! - `stream`: the controller driving one session end to end
//! - `config`: env/file/CLI configuration

pub mod config;
pub mod decode;
pub mod detect;
pub mod display;
pub mod frame;
pub mod gate;
pub mod relay;
pub mod render;
pub mod source;
pub mod stream;

pub use config::{DetectorKind, DetectorSettings, DroneSettings, StreamSettings};
pub use decode::decode_frame;
#[cfg(feature = "detector-tract")]
pub use detect::TractBackend;
pub use detect::{
    build_detector, Detection, DetectionReport, DetectorBackend, StubBackend, TritonBackend,
};
#[cfg(feature = "display-opencv")]
pub use display::OpencvSink;
pub use display::{build_display, DisplaySink, HeadlessSink};
pub use frame::{FrameLedger, FrameRef, PixelFormat, VideoFrame};
pub use gate::{should_process, RateGate};
pub use relay::FrameRelay;
pub use render::{render_detections, RenderConfig};
#[cfg(feature = "stream-gstreamer")]
pub use source::{GstDroneStream, GstStreamConfig};
pub use source::{
    build_drone, DroneStream, SimulatedDrone, SimulatedDroneConfig, SourceStats, StreamCallbacks,
};
pub use stream::{StreamController, StreamOptions, StreamStats};
