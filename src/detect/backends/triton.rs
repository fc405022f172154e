//! Remote detector served by a Triton-compatible inference server.
//!
//! Speaks the KServe v2 REST protocol: the frame goes out as a UINT8 HWC
//! tensor using the binary-tensor extension (JSON header + raw bytes, with
//! `Inference-Header-Content-Length` marking the split), and the server
//! answers with a JSON body whose `detection_result` output carries the
//! MegaDetector report as an encoded JSON string.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use serde::Deserialize;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionReport};

/// Tensor names fixed by the MegaDetector model configuration.
const INPUT_NAME: &str = "image";
const OUTPUT_NAME: &str = "detection_result";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote MegaDetector backend.
pub struct TritonBackend {
    server_url: String,
    model_name: String,
    model_version: String,
    agent: ureq::Agent,
}

impl TritonBackend {
    pub fn new(server_url: &str, model_name: &str, model_version: &str) -> Self {
        Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            model_name: model_name.to_string(),
            model_version: model_version.to_string(),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
        }
    }

    fn infer_url(&self) -> String {
        format!(
            "{}/v2/models/{}/versions/{}/infer",
            self.server_url, self.model_name, self.model_version
        )
    }

    fn ready_url(&self) -> String {
        format!(
            "{}/v2/models/{}/versions/{}/ready",
            self.server_url, self.model_name, self.model_version
        )
    }
}

impl DetectorBackend for TritonBackend {
    fn name(&self) -> &'static str {
        "triton"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let pixels = image.as_raw();
        let header = serde_json::json!({
            "inputs": [{
                "name": INPUT_NAME,
                "shape": [image.height(), image.width(), 3],
                "datatype": "UINT8",
                "parameters": { "binary_data_size": pixels.len() },
            }],
            "outputs": [{
                "name": OUTPUT_NAME,
                "parameters": { "binary_data": false },
            }],
        });
        let header_bytes = serde_json::to_vec(&header).context("encode infer header")?;

        let mut body = Vec::with_capacity(header_bytes.len() + pixels.len());
        body.extend_from_slice(&header_bytes);
        body.extend_from_slice(pixels);

        let response = self
            .agent
            .post(&self.infer_url())
            .set("Content-Type", "application/octet-stream")
            .set(
                "Inference-Header-Content-Length",
                &header_bytes.len().to_string(),
            )
            .send_bytes(&body)
            .with_context(|| format!("infer request to {}", self.infer_url()))?;

        let parsed: InferResponse = response
            .into_json()
            .context("parse inference server response")?;
        parse_detection_output(&parsed)
    }

    fn warm_up(&mut self) -> Result<()> {
        let url = self.ready_url();
        let response = self
            .agent
            .get(&url)
            .call()
            .with_context(|| format!("model readiness check at {}", url))?;
        if response.status() != 200 {
            return Err(anyhow!(
                "model {}:{} not ready (HTTP {})",
                self.model_name,
                self.model_version,
                response.status()
            ));
        }
        log::info!(
            "inference server ready: {} model={} version={}",
            self.server_url,
            self.model_name,
            self.model_version
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct InferResponse {
    #[serde(default)]
    outputs: Vec<InferOutput>,
}

#[derive(Debug, Deserialize)]
struct InferOutput {
    name: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// The `detection_result` output is a BYTES tensor holding one JSON string.
fn parse_detection_output(response: &InferResponse) -> Result<Vec<Detection>> {
    let output = response
        .outputs
        .iter()
        .find(|output| output.name == OUTPUT_NAME)
        .ok_or_else(|| anyhow!("inference response missing '{}' output", OUTPUT_NAME))?;

    let encoded = output
        .data
        .get(0)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| anyhow!("'{}' output carries no JSON payload", OUTPUT_NAME))?;

    let report: DetectionReport =
        serde_json::from_str(encoded).context("decode detection report")?;
    Ok(report.detections)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
