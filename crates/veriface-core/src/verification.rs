//! Gender verification over a staged image.
//!
//! Per call: stage bytes, analyze, normalize, remove the staged file, return.
//! Every failure is folded into a [`Verification::Rejected`]; nothing escapes
//! as an error or a panic. Image bytes are never logged.

use crate::analyzer::{AnalyzeOptions, AnalyzerError, FaceAnalyzer};
use crate::staging::StagedImage;
use crate::types::{FaceAnalysis, Gender, Rejection, Verification};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Stateless verification adapter. Cheap to clone; clones share the analyzer.
#[derive(Clone)]
pub struct Verifier {
    analyzer: Arc<dyn FaceAnalyzer>,
    options: AnalyzeOptions,
    staging_dir: PathBuf,
}

impl Verifier {
    pub fn new(
        analyzer: Arc<dyn FaceAnalyzer>,
        options: AnalyzeOptions,
        staging_dir: PathBuf,
    ) -> Self {
        if analyzer.is_authoritative() {
            tracing::info!(
                analyzer = analyzer.name(),
                backend = %options.detector_backend,
                staging_dir = %staging_dir.display(),
                "verifier ready"
            );
        } else {
            tracing::warn!(
                analyzer = analyzer.name(),
                "MOCK mode active: verification results are random and non-authoritative"
            );
        }
        Self {
            analyzer,
            options,
            staging_dir,
        }
    }

    /// `false` while mock mode is active.
    pub fn is_authoritative(&self) -> bool {
        self.analyzer.is_authoritative()
    }

    pub fn analyzer_name(&self) -> &'static str {
        self.analyzer.name()
    }

    /// Classify `image_bytes` as "Man" or "Woman".
    ///
    /// Blocks for the duration of the analyzer call. The staged copy of the
    /// bytes is gone by the time this returns, on every path.
    pub fn verify_gender(&self, image_bytes: &[u8]) -> Verification {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("verify_gender", %request_id, bytes = image_bytes.len());
        let _enter = span.enter();

        let staged = match StagedImage::write(&self.staging_dir, image_bytes) {
            Ok(staged) => staged,
            Err(err) => {
                tracing::error!(error = %err, "failed to stage image");
                let details = format!("could not stage image: {err}");
                return Verification::Rejected(Rejection::Failed(details));
            }
        };

        let outcome = self.analyze_staged(staged.path());

        let path = staged.path().to_path_buf();
        match staged.remove() {
            Ok(()) => tracing::debug!(path = %path.display(), "deleted staged image"),
            Err(err) => tracing::error!(
                path = %path.display(),
                error = %err,
                "failed to delete staged image"
            ),
        }

        match &outcome {
            Verification::Verified(gender) if !self.is_authoritative() => {
                tracing::warn!(%gender, "MOCK verification result")
            }
            Verification::Verified(gender) => tracing::info!(%gender, "verification complete"),
            Verification::Rejected(reason) => tracing::info!(%reason, "verification rejected"),
        }
        outcome
    }

    fn analyze_staged(&self, path: &Path) -> Verification {
        let analyzer = &self.analyzer;
        let options = &self.options;
        let result = panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(path, options)));

        match result {
            Ok(Ok(faces)) => classify(faces),
            Ok(Err(err)) => reject(err),
            Err(payload) => {
                let details = panic_message(payload.as_ref());
                tracing::error!(details = %details, "analyzer panicked");
                Verification::Rejected(Rejection::Failed(format!("analyzer panicked: {details}")))
            }
        }
    }
}

/// Normalize the first face's label. Additional faces are ignored.
fn classify(faces: Vec<FaceAnalysis>) -> Verification {
    let Some(first) = faces.into_iter().next() else {
        return Verification::Rejected(Rejection::NoFace);
    };
    tracing::debug!(
        confidence = first.face_confidence,
        region = ?first.region,
        scores = ?first.gender,
        age = ?first.age,
        "first face"
    );
    match Gender::from_label(&first.dominant_gender) {
        Some(gender) => Verification::Verified(gender),
        None => Verification::Rejected(Rejection::UnrecognizedLabel(first.dominant_gender)),
    }
}

fn reject(err: AnalyzerError) -> Verification {
    let details = err.to_string();
    let no_face = matches!(err, AnalyzerError::NoFaceDetected)
        || details.contains("Face could not be detected");
    if no_face {
        return Verification::Rejected(Rejection::NoFace);
    }
    tracing::error!(error = %details, "gender verification error");
    Verification::Rejected(Rejection::Failed(details))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAnalyzer;
    use crate::types::NO_FACE_MESSAGE;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Returns fixed labels, in order, and records every path it was handed.
    struct FixedAnalyzer {
        labels: Vec<&'static str>,
        seen: Mutex<Vec<(PathBuf, bool)>>,
    }

    impl FixedAnalyzer {
        fn new(labels: &[&'static str]) -> Self {
            Self {
                labels: labels.to_vec(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl FaceAnalyzer for FixedAnalyzer {
        fn analyze(
            &self,
            path: &Path,
            _: &AnalyzeOptions,
        ) -> Result<Vec<FaceAnalysis>, AnalyzerError> {
            self.seen.lock().unwrap().push((path.to_path_buf(), path.exists()));
            Ok(self.labels.iter().map(|l| FaceAnalysis::with_label(*l)).collect())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct FailingAnalyzer(fn() -> AnalyzerError);

    impl FaceAnalyzer for FailingAnalyzer {
        fn analyze(
            &self,
            _: &Path,
            _: &AnalyzeOptions,
        ) -> Result<Vec<FaceAnalysis>, AnalyzerError> {
            Err((self.0)())
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct PanickingAnalyzer;

    impl FaceAnalyzer for PanickingAnalyzer {
        fn analyze(
            &self,
            _: &Path,
            _: &AnalyzeOptions,
        ) -> Result<Vec<FaceAnalysis>, AnalyzerError> {
            panic!("model exploded");
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    /// Labels each image by its first byte: even → Man, odd → Woman.
    struct ContentAnalyzer {
        seen: Mutex<Vec<PathBuf>>,
    }

    impl FaceAnalyzer for ContentAnalyzer {
        fn analyze(
            &self,
            path: &Path,
            _: &AnalyzeOptions,
        ) -> Result<Vec<FaceAnalysis>, AnalyzerError> {
            self.seen.lock().unwrap().push(path.to_path_buf());
            let bytes = std::fs::read(path).map_err(|e| AnalyzerError::Backend(e.to_string()))?;
            std::thread::sleep(std::time::Duration::from_millis(5));
            let label = match bytes.first() {
                Some(b) if b % 2 == 0 => "male",
                Some(_) => "female",
                None => return Err(AnalyzerError::NoFaceDetected),
            };
            Ok(vec![FaceAnalysis::with_label(label)])
        }

        fn name(&self) -> &'static str {
            "content"
        }
    }

    fn verifier(analyzer: Arc<dyn FaceAnalyzer>, dir: &TempDir) -> Verifier {
        Verifier::new(analyzer, AnalyzeOptions::default(), dir.path().to_path_buf())
    }

    /// Deletes the staged file itself before answering.
    struct DeletingAnalyzer;

    impl FaceAnalyzer for DeletingAnalyzer {
        fn analyze(
            &self,
            path: &Path,
            _: &AnalyzeOptions,
        ) -> Result<Vec<FaceAnalysis>, AnalyzerError> {
            std::fs::remove_file(path).map_err(|e| AnalyzerError::Backend(e.to_string()))?;
            Ok(vec![FaceAnalysis::with_label("Male")])
        }

        fn name(&self) -> &'static str {
            "deleting"
        }
    }

    fn staged_files(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[test]
    fn test_male_maps_to_man() {
        let dir = TempDir::new().unwrap();
        let v = verifier(Arc::new(FixedAnalyzer::new(&["Male"])), &dir);
        assert_eq!(v.verify_gender(b"img").into_parts(), (Some(Gender::Man), None));
    }

    #[test]
    fn test_female_maps_to_woman() {
        let dir = TempDir::new().unwrap();
        let v = verifier(Arc::new(FixedAnalyzer::new(&["female"])), &dir);
        assert_eq!(v.verify_gender(b"img").into_parts(), (Some(Gender::Woman), None));
    }

    #[test]
    fn test_unrecognized_label_is_named() {
        let dir = TempDir::new().unwrap();
        let v = verifier(Arc::new(FixedAnalyzer::new(&["cyborg"])), &dir);
        let (label, error) = v.verify_gender(b"img").into_parts();
        assert_eq!(label, None);
        assert!(error.unwrap().contains("cyborg"));
    }

    #[test]
    fn test_only_first_face_counts() {
        let dir = TempDir::new().unwrap();
        let a = verifier(Arc::new(FixedAnalyzer::new(&["Woman", "Man"])), &dir);
        let b = verifier(Arc::new(FixedAnalyzer::new(&["Woman", "cyborg"])), &dir);
        assert_eq!(a.verify_gender(b"img").label(), Some(Gender::Woman));
        assert_eq!(b.verify_gender(b"img").label(), Some(Gender::Woman));
    }

    #[test]
    fn test_empty_result_is_no_face() {
        let dir = TempDir::new().unwrap();
        let v = verifier(Arc::new(FixedAnalyzer::new(&[])), &dir);
        assert_eq!(v.verify_gender(b"img").error_message().as_deref(), Some(NO_FACE_MESSAGE));
    }

    #[test]
    fn test_no_face_error_variant() {
        let dir = TempDir::new().unwrap();
        let v = verifier(Arc::new(FailingAnalyzer(|| AnalyzerError::NoFaceDetected)), &dir);
        assert_eq!(
            v.verify_gender(b"img").into_parts(),
            (None, Some(NO_FACE_MESSAGE.to_string()))
        );
        assert_eq!(staged_files(&dir), 0);
    }

    #[test]
    fn test_no_face_error_text_from_backend() {
        let dir = TempDir::new().unwrap();
        let v = verifier(
            Arc::new(FailingAnalyzer(|| {
                AnalyzerError::Backend("Face could not be detected in numpy array.".into())
            })),
            &dir,
        );
        assert_eq!(v.verify_gender(b"img").error_message().as_deref(), Some(NO_FACE_MESSAGE));
    }

    #[test]
    fn test_generic_failure_carries_details() {
        let dir = TempDir::new().unwrap();
        let v = verifier(
            Arc::new(FailingAnalyzer(|| AnalyzerError::Backend("tensor shape mismatch".into()))),
            &dir,
        );
        assert_eq!(
            v.verify_gender(b"img").error_message().as_deref(),
            Some("Verification failed: tensor shape mismatch")
        );
        assert_eq!(staged_files(&dir), 0);
    }

    #[test]
    fn test_panic_is_absorbed_and_file_removed() {
        let dir = TempDir::new().unwrap();
        let v = verifier(Arc::new(PanickingAnalyzer), &dir);
        let error = v.verify_gender(b"img").error_message().unwrap();
        assert!(error.starts_with("Verification failed:"));
        assert!(error.contains("model exploded"));
        assert_eq!(staged_files(&dir), 0);
    }

    #[test]
    fn test_cleanup_failure_keeps_result() {
        let dir = TempDir::new().unwrap();
        let v = verifier(Arc::new(DeletingAnalyzer), &dir);
        assert_eq!(v.verify_gender(b"img").into_parts(), (Some(Gender::Man), None));
        assert_eq!(staged_files(&dir), 0);
    }

    #[test]
    fn test_staging_failure_is_rejected() {
        let dir = TempDir::new().unwrap();
        let v = Verifier::new(
            Arc::new(FixedAnalyzer::new(&["Man"])),
            AnalyzeOptions::default(),
            dir.path().join("missing"),
        );
        let (label, error) = v.verify_gender(b"img").into_parts();
        assert_eq!(label, None);
        assert!(error.unwrap().starts_with("Verification failed:"));
    }

    #[test]
    fn test_staged_file_exists_during_analysis_and_not_after() {
        let dir = TempDir::new().unwrap();
        let analyzer = Arc::new(FixedAnalyzer::new(&["Man"]));
        let v = verifier(analyzer.clone(), &dir);

        for input in [&b""[..], &b"\x00"[..], &b"not an image at all"[..], &[0xffu8; 4096][..]] {
            v.verify_gender(input);
        }

        let seen = analyzer.seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        for (path, existed) in seen.iter() {
            assert!(existed, "staged file missing during analysis");
            assert!(!path.exists(), "staged file left behind: {}", path.display());
        }
        assert_eq!(staged_files(&dir), 0);
    }

    #[test]
    fn test_mock_mode_always_labels() {
        let dir = TempDir::new().unwrap();
        let v = verifier(Arc::new(MockAnalyzer), &dir);
        assert!(!v.is_authoritative());
        for _ in 0..20 {
            let (label, error) = v.verify_gender(b"anything").into_parts();
            assert!(matches!(label, Some(Gender::Man) | Some(Gender::Woman)));
            assert!(error.is_none());
        }
        assert_eq!(staged_files(&dir), 0);
    }

    #[test]
    fn test_concurrent_calls_do_not_interfere() {
        let dir = TempDir::new().unwrap();
        let analyzer = Arc::new(ContentAnalyzer {
            seen: Mutex::new(Vec::new()),
        });
        let v = verifier(analyzer.clone(), &dir);

        let handles: Vec<_> = (0u8..16)
            .map(|i| {
                let v = v.clone();
                std::thread::spawn(move || (i, v.verify_gender(&[i, 1, 2, 3])))
            })
            .collect();

        for handle in handles {
            let (i, outcome) = handle.join().unwrap();
            let expected = if i % 2 == 0 { Gender::Man } else { Gender::Woman };
            assert_eq!(outcome.label(), Some(expected), "input {i}");
        }

        let mut seen = analyzer.seen.lock().unwrap().clone();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 16, "staging paths collided");
        assert_eq!(staged_files(&dir), 0);
    }
}
