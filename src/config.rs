//! Process configuration.
//!
//! Layering follows file < environment < validation: an optional JSON
//! config file (`WILDSKY_CONFIG`) provides the base, the environment
//! variables the original deployment used (`DRONE_IP`, `DRONE_RTSP_PORT`,
//! `TRITON_URL`, `MODEL_REPO`) override it, and `validate()` decides
//! whether the process may start. The target frame rate comes from the
//! command line and is validated before anything touches the network.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_DRONE_IP: &str = "192.168.53.1";
pub const DEFAULT_RTSP_PORT: u16 = 554;
pub const DEFAULT_TRITON_URL: &str = "http://localhost:8000";
pub const DEFAULT_MODEL_NAME: &str = "MegaDetector";
pub const DEFAULT_MODEL_VERSION: &str = "1";
pub const DEFAULT_WINDOW_NAME: &str = "wildsky";
pub const DEFAULT_SOURCE_FPS: u32 = 30;

pub const MIN_TARGET_FPS: u32 = 1;
pub const MAX_TARGET_FPS: u32 = 30;

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    drone: Option<DroneConfigFile>,
    detector: Option<DetectorConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DroneConfigFile {
    ip: Option<String>,
    rtsp_port: Option<u16>,
    source_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    kind: Option<String>,
    triton_url: Option<String>,
    model_name: Option<String>,
    model_version: Option<String>,
    model_repo: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    window_name: Option<String>,
}

/// Which detector implementation to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorKind {
    /// Remote MegaDetector behind a Triton-compatible server.
    Triton,
    /// In-process ONNX inference (feature `detector-tract`).
    Tract,
    /// Scene-change stub, for drone-less runs.
    Stub,
}

impl FromStr for DetectorKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "triton" => Ok(Self::Triton),
            "tract" | "local" => Ok(Self::Tract),
            "stub" => Ok(Self::Stub),
            other => Err(anyhow!(
                "unknown detector '{}'; expected triton, tract, or stub",
                other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DroneSettings {
    pub ip: String,
    pub rtsp_port: u16,
    /// Native camera frame rate.
    pub source_fps: u32,
}

impl DroneSettings {
    pub fn rtsp_url(&self) -> String {
        format!("rtsp://{}:{}/live", self.ip, self.rtsp_port)
    }

    /// Whether the address selects the synthetic source.
    pub fn is_stub(&self) -> bool {
        crate::source::is_stub_address(&self.ip)
    }
}

#[derive(Clone, Debug)]
pub struct DetectorSettings {
    pub kind: DetectorKind,
    pub triton_url: String,
    pub model_name: String,
    pub model_version: String,
    /// Triton-style model repository root, for the in-process backend.
    pub model_repo: Option<String>,
}

impl DetectorSettings {
    /// `<repo>/<model>/<version>/model.onnx`, mirroring the server's model
    /// repository layout.
    pub fn model_path(&self) -> Option<PathBuf> {
        self.model_repo.as_ref().map(|repo| {
            Path::new(repo)
                .join(&self.model_name)
                .join(&self.model_version)
                .join("model.onnx")
        })
    }
}

/// Fully resolved process settings.
#[derive(Clone, Debug)]
pub struct StreamSettings {
    pub drone: DroneSettings,
    pub detector: DetectorSettings,
    pub window_name: String,
    pub target_fps: u32,
}

impl StreamSettings {
    /// Load settings for the given (already CLI-validated) target rate.
    pub fn load(target_fps: u32) -> Result<Self> {
        let file_cfg = match std::env::var("WILDSKY_CONFIG").ok().as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => StreamConfigFile::default(),
        };
        let mut settings = Self::from_file(file_cfg, target_fps)?;
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    fn from_file(file: StreamConfigFile, target_fps: u32) -> Result<Self> {
        let drone = DroneSettings {
            ip: file
                .drone
                .as_ref()
                .and_then(|drone| drone.ip.clone())
                .unwrap_or_else(|| DEFAULT_DRONE_IP.to_string()),
            rtsp_port: file
                .drone
                .as_ref()
                .and_then(|drone| drone.rtsp_port)
                .unwrap_or(DEFAULT_RTSP_PORT),
            source_fps: file
                .drone
                .as_ref()
                .and_then(|drone| drone.source_fps)
                .unwrap_or(DEFAULT_SOURCE_FPS),
        };
        let detector = DetectorSettings {
            kind: file
                .detector
                .as_ref()
                .and_then(|detector| detector.kind.as_deref())
                .map(DetectorKind::from_str)
                .transpose()?
                .unwrap_or(DetectorKind::Triton),
            triton_url: file
                .detector
                .as_ref()
                .and_then(|detector| detector.triton_url.clone())
                .unwrap_or_else(|| DEFAULT_TRITON_URL.to_string()),
            model_name: file
                .detector
                .as_ref()
                .and_then(|detector| detector.model_name.clone())
                .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            model_version: file
                .detector
                .as_ref()
                .and_then(|detector| detector.model_version.clone())
                .unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string()),
            model_repo: file.detector.and_then(|detector| detector.model_repo),
        };
        let window_name = file
            .display
            .and_then(|display| display.window_name)
            .unwrap_or_else(|| DEFAULT_WINDOW_NAME.to_string());
        Ok(Self {
            drone,
            detector,
            window_name,
            target_fps,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(ip) = std::env::var("DRONE_IP") {
            if !ip.trim().is_empty() {
                self.drone.ip = ip;
            }
        }
        if let Ok(port) = std::env::var("DRONE_RTSP_PORT") {
            if !port.trim().is_empty() {
                self.drone.rtsp_port = port
                    .parse()
                    .map_err(|_| anyhow!("DRONE_RTSP_PORT must be a port number"))?;
            }
        }
        if let Ok(url) = std::env::var("TRITON_URL") {
            if !url.trim().is_empty() {
                self.detector.triton_url = url;
            }
        }
        if let Ok(repo) = std::env::var("MODEL_REPO") {
            if !repo.trim().is_empty() {
                self.detector.model_repo = Some(repo);
            }
        }
        if let Ok(kind) = std::env::var("WILDSKY_DETECTOR") {
            if !kind.trim().is_empty() {
                self.detector.kind = kind.parse()?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_target_fps(i64::from(self.target_fps))?;
        if self.drone.source_fps == 0 {
            return Err(anyhow!("source frame rate must be greater than zero"));
        }
        if self.detector.kind == DetectorKind::Triton {
            let url = Url::parse(&self.detector.triton_url)
                .with_context(|| format!("invalid TRITON_URL '{}'", self.detector.triton_url))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(anyhow!(
                    "TRITON_URL must be http(s), got '{}'",
                    url.scheme()
                ));
            }
        }
        if self.detector.kind == DetectorKind::Tract && self.detector.model_repo.is_none() {
            return Err(anyhow!(
                "the tract detector needs MODEL_REPO pointing at the model repository"
            ));
        }
        Ok(())
    }
}

/// The CLI contract: an integer from 1 to 30 inclusive.
pub fn validate_target_fps(fps: i64) -> Result<u32> {
    if fps < i64::from(MIN_TARGET_FPS) || fps > i64::from(MAX_TARGET_FPS) {
        return Err(anyhow!(
            "target frame rate must be between {} and {} inclusive, got {}",
            MIN_TARGET_FPS,
            MAX_TARGET_FPS,
            fps
        ));
    }
    Ok(fps as u32)
}

/// clap `value_parser` hook for the positional fps argument.
pub fn parse_target_fps(raw: &str) -> Result<u32, String> {
    let fps: i64 = raw
        .parse()
        .map_err(|_| format!("'{}' is not an integer frame rate", raw))?;
    validate_target_fps(fps).map_err(|err| err.to_string())
}

fn read_config_file(path: &Path) -> Result<StreamConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
