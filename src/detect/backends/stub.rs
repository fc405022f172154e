use anyhow::Result;
use image::RgbImage;
use sha2::{Digest, Sha256};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// Stub backend for tests and the synthetic demo. Hashes pixel content and
/// fabricates one centered "animal" detection whenever the scene changes.
pub struct StubBackend {
    last_hash: Option<[u8; 32]>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { last_hash: None }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let current_hash: [u8; 32] = Sha256::digest(image.as_raw()).into();

        let changed = match self.last_hash {
            Some(prev) => prev != current_hash,
            None => false,
        };

        self.last_hash = Some(current_hash);

        if changed {
            Ok(vec![Detection {
                category: "1".to_string(),
                conf: 0.85,
                bbox: [0.25, 0.25, 0.5, 0.5],
            }])
        } else {
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_image(value: u8) -> RgbImage {
        RgbImage::from_pixel(8, 8, image::Rgb([value, value, value]))
    }

    #[test]
    fn reports_nothing_until_the_scene_changes() {
        let mut backend = StubBackend::new();

        assert!(backend.detect(&solid_image(10)).unwrap().is_empty());
        let detections = backend.detect(&solid_image(200)).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].category, "1");

        // Same content again: no change, no detection.
        assert!(backend.detect(&solid_image(200)).unwrap().is_empty());
    }
}
