use crate::analyzer::{AnalyzeOptions, AnalyzerError, FaceAnalyzer};
use crate::types::{FaceAnalysis, Gender};
use rand::seq::SliceRandom;
use std::path::Path;

/// Non-authoritative analyzer returning a uniformly random label.
///
/// Never inspects the image and never fails. Intended for development
/// environments without model files; production config refuses it.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockAnalyzer;

impl FaceAnalyzer for MockAnalyzer {
    fn analyze(
        &self,
        _image_path: &Path,
        _options: &AnalyzeOptions,
    ) -> Result<Vec<FaceAnalysis>, AnalyzerError> {
        let gender = [Gender::Man, Gender::Woman]
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(Gender::Woman);
        tracing::warn!(%gender, "MOCK: returning random gender");
        Ok(vec![FaceAnalysis::with_label(gender.as_str())])
    }

    fn is_authoritative(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_always_returns_known_label() {
        let options = AnalyzeOptions::default();
        for _ in 0..50 {
            let faces = MockAnalyzer.analyze(Path::new("/nonexistent.jpg"), &options).unwrap();
            assert_eq!(faces.len(), 1);
            assert!(Gender::from_label(&faces[0].dominant_gender).is_some());
        }
    }

    #[test]
    fn test_mock_is_not_authoritative() {
        assert!(!MockAnalyzer.is_authoritative());
        assert_eq!(MockAnalyzer.name(), "mock");
    }
}
