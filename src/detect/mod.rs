//! Wildlife detector boundary.
//!
//! Two interchangeable implementations, matching how the demo is deployed:
//! - `TritonBackend`: remote inference over the KServe v2 REST protocol.
//! - `TractBackend` (feature `detector-tract`): in-process ONNX inference.
//!
//! Plus `StubBackend`, a deterministic scene-change detector for tests and
//! drone-less demo runs.

mod backend;
pub mod backends;
mod result;

use anyhow::Result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "detector-tract")]
pub use backends::TractBackend;
pub use backends::TritonBackend;
pub use result::{Detection, DetectionReport};

/// Confidence floor below which the detector does not report a detection at
/// all (MegaDetector's conventional output threshold; the renderer applies
/// its own, much higher, display threshold).
pub const DEFAULT_OUTPUT_CONFIDENCE_THRESHOLD: f32 = 0.005;

/// Default model input edge for the in-process backend.
#[cfg(feature = "detector-tract")]
pub const DEFAULT_MODEL_INPUT_SIZE: u32 = 1280;

/// Construct the configured detector backend.
pub fn build_detector(
    settings: &crate::config::DetectorSettings,
) -> Result<Box<dyn DetectorBackend>> {
    use crate::config::DetectorKind;

    match settings.kind {
        DetectorKind::Triton => Ok(Box::new(TritonBackend::new(
            &settings.triton_url,
            &settings.model_name,
            &settings.model_version,
        ))),
        DetectorKind::Tract => {
            #[cfg(feature = "detector-tract")]
            {
                let path = settings.model_path().ok_or_else(|| {
                    anyhow::anyhow!("the tract detector needs a model repository path")
                })?;
                Ok(Box::new(TractBackend::new(path, DEFAULT_MODEL_INPUT_SIZE)?))
            }
            #[cfg(not(feature = "detector-tract"))]
            {
                Err(anyhow::anyhow!(
                    "in-process detection requires the detector-tract feature"
                ))
            }
        }
        DetectorKind::Stub => Ok(Box::new(StubBackend::new())),
    }
}
