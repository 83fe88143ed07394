//! InsightFace `genderage` attribute model via ONNX Runtime.
//!
//! Takes a 96×96 RGB crop centred on the face box (1.5× the longer side) and
//! produces two gender logits plus a scaled age estimate.

use crate::detector::Detection;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const GENDERAGE_INPUT_SIZE: usize = 96;
const GENDERAGE_CROP_FACTOR: f32 = 1.5;
const GENDERAGE_OUTPUTS: usize = 3;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0}; download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Raw attribute prediction for one face.
#[derive(Debug, Clone, PartialEq)]
pub struct GenderAge {
    /// Softmax probability of "Woman", in [0, 1].
    pub woman: f32,
    /// Softmax probability of "Man", in [0, 1].
    pub man: f32,
    pub age: u32,
}

impl GenderAge {
    /// Decode the model's `[female_logit, male_logit, age / 100]` output.
    fn from_raw(raw: &[f32]) -> Result<Self, ClassifierError> {
        let &[female, male, age] = raw else {
            return Err(ClassifierError::InferenceFailed(format!(
                "expected {GENDERAGE_OUTPUTS} outputs, got {}",
                raw.len()
            )));
        };

        let peak = female.max(male);
        let (ef, em) = ((female - peak).exp(), (male - peak).exp());
        let sum = ef + em;

        Ok(Self {
            woman: ef / sum,
            man: em / sum,
            age: (age * 100.0).round().max(0.0) as u32,
        })
    }

    /// Argmax label; a tie picks index 0, "Woman".
    pub fn dominant(&self) -> &'static str {
        if self.man > self.woman {
            "Man"
        } else {
            "Woman"
        }
    }
}

pub struct GenderAgeClassifier {
    session: Session,
}

impl GenderAgeClassifier {
    pub fn load(model_path: &Path) -> Result<Self, ClassifierError> {
        if !model_path.exists() {
            return Err(ClassifierError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded genderage model"
        );

        Ok(Self { session })
    }

    pub fn classify(
        &mut self,
        image: &RgbImage,
        face: &Detection,
    ) -> Result<GenderAge, ClassifierError> {
        let input = crop_face(image, face);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("genderage output: {e}")))?;

        GenderAge::from_raw(raw)
    }
}

/// Sample a square crop around the face into a NCHW tensor of raw RGB values.
///
/// The model normalizes internally, so pixels are left in [0, 255]. Pixels
/// outside the source image are black.
fn crop_face(image: &RgbImage, face: &Detection) -> Array4<f32> {
    let size = GENDERAGE_INPUT_SIZE;
    let side = face.width.max(face.height).max(1.0) * GENDERAGE_CROP_FACTOR;
    let left = face.x + face.width / 2.0 - side / 2.0;
    let top = face.y + face.height / 2.0 - side / 2.0;
    let step = side / size as f32;

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for v in 0..size {
        let sy = top + (v as f32 + 0.5) * step - 0.5;
        for u in 0..size {
            let sx = left + (u as f32 + 0.5) * step - 0.5;
            let rgb = sample_bilinear(image, sx, sy);
            for c in 0..3 {
                tensor[[0, c, v, u]] = rgb[c];
            }
        }
    }
    tensor
}

fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> [f32; 3] {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let (x0, y0) = (x.floor() as i64, y.floor() as i64);
    let (fx, fy) = (x - x.floor(), y - y.floor());

    let texel = |px: i64, py: i64| -> [f32; 3] {
        if px < 0 || py < 0 || px >= w || py >= h {
            return [0.0; 3];
        }
        let p = image.get_pixel(px as u32, py as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32]
    };

    let (tl, tr) = (texel(x0, y0), texel(x0 + 1, y0));
    let (bl, br) = (texel(x0, y0 + 1), texel(x0 + 1, y0 + 1));

    std::array::from_fn(|c| {
        let top = tl[c] * (1.0 - fx) + tr[c] * fx;
        let bottom = bl[c] * (1.0 - fx) + br[c] * fx;
        top * (1.0 - fy) + bottom * fy
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_male() {
        let ga = GenderAge::from_raw(&[-1.0, 2.0, 0.31]).unwrap();
        assert_eq!(ga.dominant(), "Man");
        assert!(ga.man > 0.9);
        assert!((ga.man + ga.woman - 1.0).abs() < 1e-6);
        assert_eq!(ga.age, 31);
    }

    #[test]
    fn test_from_raw_female() {
        let ga = GenderAge::from_raw(&[3.0, 0.5, 0.25]).unwrap();
        assert_eq!(ga.dominant(), "Woman");
        assert_eq!(ga.age, 25);
    }

    #[test]
    fn test_from_raw_wrong_len() {
        assert!(GenderAge::from_raw(&[0.1, 0.2]).is_err());
    }

    #[test]
    fn test_crop_shape_and_uniform_fill() {
        let image = RgbImage::from_pixel(200, 200, image::Rgb([10, 20, 30]));
        let face = Detection { x: 50.0, y: 50.0, width: 60.0, height: 60.0, confidence: 0.9 };
        let tensor = crop_face(&image, &face);
        assert_eq!(tensor.shape(), &[1, 3, GENDERAGE_INPUT_SIZE, GENDERAGE_INPUT_SIZE]);
        // Crop lies fully inside the image, so every sample equals the fill colour.
        assert!((tensor[[0, 0, 48, 48]] - 10.0).abs() < 1e-3);
        assert!((tensor[[0, 1, 10, 80]] - 20.0).abs() < 1e-3);
        assert!((tensor[[0, 2, 90, 5]] - 30.0).abs() < 1e-3);
    }

    #[test]
    fn test_crop_out_of_bounds_is_black() {
        let image = RgbImage::from_pixel(20, 20, image::Rgb([255, 255, 255]));
        // Face at the corner: the crop extends far past the top-left edge.
        let face = Detection { x: 0.0, y: 0.0, width: 20.0, height: 20.0, confidence: 0.9 };
        let tensor = crop_face(&image, &face);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert!((tensor[[0, 0, 48, 48]] - 255.0).abs() < 1e-3);
    }
}
