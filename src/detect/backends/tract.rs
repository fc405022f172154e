#![cfg(feature = "detector-tract")]

//! In-process detector running a MegaDetector ONNX export with tract.
//!
//! The export is expected to carry its own NMS and emit `[n, 6]` rows of
//! `(x1, y1, x2, y2, confidence, class)` in model-input pixel coordinates,
//! which is the usual layout for YOLOv5-family exports.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::detect::DEFAULT_OUTPUT_CONFIDENCE_THRESHOLD;

/// Local MegaDetector backend.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    output_floor: f32,
}

impl TractBackend {
    /// Load the ONNX export and prepare it for square `input_size` frames.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_size as usize, input_size as usize),
                ),
            )
            .context("set model input fact")?
            .into_optimized()
            .context("optimize ONNX model")?
            .into_runnable()
            .context("build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            output_floor: DEFAULT_OUTPUT_CONFIDENCE_THRESHOLD,
        })
    }

    /// Override the default output confidence floor.
    pub fn with_output_floor(mut self, floor: f32) -> Self {
        self.output_floor = floor;
        self
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let size = self.input_size;
        let resized = if image.width() == size && image.height() == size {
            image.clone()
        } else {
            image::imageops::resize(image, size, size, image::imageops::FilterType::Triangle)
        };

        let size = size as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size, size),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }

    fn parse_rows(&self, values: &[f32]) -> Result<Vec<Detection>> {
        if values.len() % 6 != 0 {
            return Err(anyhow!(
                "model output of {} values is not [n, 6] detection rows",
                values.len()
            ));
        }

        let scale = self.input_size as f32;
        let mut detections = Vec::new();
        for row in values.chunks_exact(6) {
            let conf = row[4];
            if conf < self.output_floor {
                continue;
            }
            let x = (row[0] / scale).clamp(0.0, 1.0);
            let y = (row[1] / scale).clamp(0.0, 1.0);
            let w = ((row[2] - row[0]) / scale).clamp(0.0, 1.0 - x);
            let h = ((row[3] - row[1]) / scale).clamp(0.0, 1.0 - y);
            // MegaDetector categories are 1-based; exported class ids start at 0.
            let category = (row[5].round() as i64 + 1).to_string();
            detections.push(Detection {
                category,
                conf,
                bbox: [x, y, w, h],
            });
        }
        Ok(detections)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let values: Vec<f32> = view.iter().copied().collect();
        self.parse_rows(&values)
    }

    fn warm_up(&mut self) -> Result<()> {
        // First inference pays one-off allocation costs; run it on a blank
        // frame so the stream loop does not.
        let blank = RgbImage::new(self.input_size, self.input_size);
        self.detect(&blank).map(|_| ())
    }
}
