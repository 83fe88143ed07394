use serde::{Deserialize, Serialize};
use std::fmt;

/// User-facing message returned when the analyzer finds no face.
pub const NO_FACE_MESSAGE: &str = "No face detected. Please ensure your face is clearly visible.";

/// Normalized classification label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Man,
    Woman,
}

impl Gender {
    /// Normalize an analyzer label, case-insensitively.
    ///
    /// "male"/"man" map to [`Gender::Man`], "female"/"woman" to [`Gender::Woman`].
    /// Anything else is unrecognized.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if label.eq_ignore_ascii_case("male") || label.eq_ignore_ascii_case("man") {
            Some(Gender::Man)
        } else if label.eq_ignore_ascii_case("female") || label.eq_ignore_ascii_case("woman") {
            Some(Gender::Woman)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Man => "Man",
            Gender::Woman => "Woman",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Face region in source image pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Per-class gender scores in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenderScores {
    pub woman: f32,
    pub man: f32,
}

/// One analyzed face as reported by a [`FaceAnalyzer`](crate::FaceAnalyzer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceAnalysis {
    /// Raw label chosen by the analyzer. Not yet normalized.
    pub dominant_gender: String,
    pub gender: Option<GenderScores>,
    /// Only populated when the age action was requested.
    pub age: Option<u32>,
    pub region: FaceRegion,
    pub face_confidence: f32,
}

impl FaceAnalysis {
    /// A record carrying only a label, with an empty region.
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            dominant_gender: label.into(),
            gender: None,
            age: None,
            region: FaceRegion {
                x: 0.0,
                y: 0.0,
                width: 0.0,
                height: 0.0,
            },
            face_confidence: 0.0,
        }
    }
}

/// Why a verification produced no label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The analyzer could not find a face.
    NoFace,
    /// The analyzer answered with a label outside {Man, Woman}.
    UnrecognizedLabel(String),
    /// Staging or analysis failed for any other reason.
    Failed(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoFace => f.write_str(NO_FACE_MESSAGE),
            Rejection::UnrecognizedLabel(label) => {
                write!(f, "Could not determine gender: {label}")
            }
            Rejection::Failed(details) if details.trim().is_empty() => {
                f.write_str("Verification failed: unknown error")
            }
            Rejection::Failed(details) => write!(f, "Verification failed: {details}"),
        }
    }
}

/// Outcome of one verification call. Either a label or a reason, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified(Gender),
    Rejected(Rejection),
}

impl Verification {
    pub fn label(&self) -> Option<Gender> {
        match self {
            Verification::Verified(gender) => Some(*gender),
            Verification::Rejected(_) => None,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        match self {
            Verification::Verified(_) => None,
            Verification::Rejected(reason) => Some(reason.to_string()),
        }
    }

    /// Split into the `(label, error_message)` pair handed to request handlers.
    pub fn into_parts(self) -> (Option<Gender>, Option<String>) {
        (self.label(), self.error_message())
    }

    pub fn into_report(self) -> VerificationReport {
        let (label, error) = self.into_parts();
        VerificationReport { label, error }
    }
}

/// Serializable two-field view of a [`Verification`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub label: Option<Gender>,
    pub error: Option<String>,
}
