//! The face-analysis capability seam.
//!
//! The verifier only ever talks to a [`FaceAnalyzer`]. Which implementation
//! sits behind it (ONNX models or the random mock) is chosen once at startup.

use crate::classifier::ClassifierError;
use crate::detector::DetectorError;
use crate::types::FaceAnalysis;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Face could not be detected in the image. Confirm that the picture is a face photo.")]
    NoFaceDetected,
    #[error("image could not be decoded: {0}")]
    Image(#[from] image::ImageError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    /// Free-form failure reported by an external binding.
    #[error("{0}")]
    Backend(String),
}

/// Attribute the analyzer should compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Gender,
    Age,
}

/// Face localisation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorBackend {
    /// SCRFD via ONNX Runtime.
    #[default]
    Scrfd,
    /// No detection; the whole image is treated as the face.
    Skip,
}

impl DetectorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorBackend::Scrfd => "scrfd",
            DetectorBackend::Skip => "skip",
        }
    }
}

impl fmt::Display for DetectorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scrfd" => Ok(DetectorBackend::Scrfd),
            "skip" => Ok(DetectorBackend::Skip),
            other => Err(format!("unknown detector backend '{other}' (expected scrfd or skip)")),
        }
    }
}

/// Options passed to every analyzer call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeOptions {
    /// Fail with [`AnalyzerError::NoFaceDetected`] instead of analysing the whole image.
    pub enforce_detection: bool,
    pub actions: Vec<Action>,
    pub detector_backend: DetectorBackend,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            enforce_detection: true,
            actions: vec![Action::Gender],
            detector_backend: DetectorBackend::Scrfd,
        }
    }
}

impl AnalyzeOptions {
    pub fn wants(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

/// External face-analysis capability.
///
/// Accepts a file path only. Returns one record per detected face, ordered
/// by the analyzer's own ranking (best face first).
pub trait FaceAnalyzer: Send + Sync {
    fn analyze(
        &self,
        image_path: &Path,
        options: &AnalyzeOptions,
    ) -> Result<Vec<FaceAnalysis>, AnalyzerError>;

    /// `false` for implementations whose output must not be trusted.
    fn is_authoritative(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}
