//! veriface-core — Privacy-preserving gender verification.
//!
//! Image bytes are staged in an ephemeral file, handed to a [`FaceAnalyzer`]
//! (SCRFD + genderage via ONNX Runtime, or a random mock), normalized to
//! "Man"/"Woman", and the staged file is deleted before returning.

pub mod analyzer;
pub mod classifier;
pub mod detector;
pub mod mock;
pub mod onnx;
pub mod staging;
pub mod types;
pub mod verification;

use std::path::PathBuf;

pub use analyzer::{Action, AnalyzeOptions, AnalyzerError, DetectorBackend, FaceAnalyzer};
pub use mock::MockAnalyzer;
pub use onnx::OnnxAnalyzer;
pub use types::{FaceAnalysis, Gender, Rejection, Verification, VerificationReport, NO_FACE_MESSAGE};
pub use verification::Verifier;

/// Default location of the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/veriface/models")
}
