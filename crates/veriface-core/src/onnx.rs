//! Real analyzer binding: SCRFD detection followed by genderage classification.

use crate::analyzer::{Action, AnalyzeOptions, AnalyzerError, DetectorBackend, FaceAnalyzer};
use crate::classifier::GenderAgeClassifier;
use crate::detector::{Detection, FaceDetector};
use crate::types::{FaceAnalysis, FaceRegion, GenderScores};
use image::{ImageReader, RgbImage};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const GENDERAGE_MODEL_FILE: &str = "genderage.onnx";

/// ONNX Runtime backed [`FaceAnalyzer`].
///
/// Sessions need `&mut` to run, so each sits behind its own mutex. Concurrent
/// calls serialize on model access only; decoding and cropping run in parallel.
/// A panic mid-inference leaves the session reusable, so poisoned locks are
/// recovered rather than reported.
pub struct OnnxAnalyzer {
    detector: Mutex<FaceDetector>,
    classifier: Mutex<GenderAgeClassifier>,
}

impl OnnxAnalyzer {
    /// Load both models from `model_dir`. Fails fast if either file is missing.
    pub fn load(model_dir: &Path) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let classifier = GenderAgeClassifier::load(&model_dir.join(GENDERAGE_MODEL_FILE))?;
        Ok(Self {
            detector: Mutex::new(detector),
            classifier: Mutex::new(classifier),
        })
    }

    fn locate(
        &self,
        image: &RgbImage,
        options: &AnalyzeOptions,
    ) -> Result<Vec<Detection>, AnalyzerError> {
        let faces = match options.detector_backend {
            DetectorBackend::Scrfd => lock(&self.detector).detect(image)?,
            DetectorBackend::Skip => Vec::new(),
        };

        if !faces.is_empty() {
            return Ok(faces);
        }
        if options.enforce_detection && options.detector_backend != DetectorBackend::Skip {
            return Err(AnalyzerError::NoFaceDetected);
        }
        Ok(vec![whole_image(image)])
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn analyze(
        &self,
        image_path: &Path,
        options: &AnalyzeOptions,
    ) -> Result<Vec<FaceAnalysis>, AnalyzerError> {
        let image = decode_image(image_path)?;
        let faces = self.locate(&image, options)?;
        tracing::debug!(
            faces = faces.len(),
            backend = %options.detector_backend,
            "faces located"
        );

        let mut classifier = lock(&self.classifier);
        faces
            .into_iter()
            .map(|face| {
                let prediction = classifier.classify(&image, &face)?;
                Ok::<_, AnalyzerError>(FaceAnalysis {
                    dominant_gender: prediction.dominant().to_string(),
                    gender: Some(GenderScores {
                        woman: prediction.woman * 100.0,
                        man: prediction.man * 100.0,
                    }),
                    age: options.wants(Action::Age).then_some(prediction.age),
                    region: FaceRegion {
                        x: face.x,
                        y: face.y,
                        width: face.width,
                        height: face.height,
                    },
                    face_confidence: face.confidence,
                })
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}

/// Decode a staged image, picking the format from its leading bytes.
///
/// Staged files always carry a `.jpg` suffix, so the extension says nothing
/// about the actual encoding.
pub(crate) fn decode_image(path: &Path) -> Result<RgbImage, AnalyzerError> {
    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(image::ImageError::IoError)?;
    Ok(reader.decode()?.to_rgb8())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn whole_image(image: &RgbImage) -> Detection {
    Detection {
        x: 0.0,
        y: 0.0,
        width: image.width() as f32,
        height: image.height() as f32,
        confidence: 0.0,
    }
}
