//! Detection records in the MegaDetector wire format.

use serde::{Deserialize, Serialize};

/// One detected object.
///
/// `category` is the detector's string class id ("1" animal, "2" person,
/// "3" vehicle; see [`crate::render::RenderConfig::label_map`]). `bbox` is
/// `[x, y, width, height]` normalized to the 0..=1 image space, origin at
/// the top-left corner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Detection {
    pub category: String,
    pub conf: f32,
    pub bbox: [f32; 4],
}

/// Per-image report as serialized by MegaDetector and relayed by the
/// inference server.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DetectionReport {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_detection_conf: Option<f32>,
}
