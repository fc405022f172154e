use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// Detector boundary.
///
/// The detection model itself is an external component, a local ONNX
/// export or a model served over HTTP. Implementations receive a decoded
/// RGB frame and return the detections; they must not retain the frame.
///
/// A failed detection is an ordinary per-frame error: the stream loop logs
/// it and moves on. There is no retry policy.
pub trait DetectorBackend: Send {
    /// Backend identifier, for logs.
    fn name(&self) -> &'static str;

    /// Run detection on one decoded frame.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;

    /// Optional startup hook (health check, first-inference warm-up).
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
