use thiserror::Error;

/// Outcome of a single check: the confidence for the target class in
/// [0.0, 1.0], or a structured detection error.
pub type DetectionResult = Result<f32, DetectionError>;

/// Per-call failures surfaced through the result channel.
///
/// Loading the classifier itself is a construction-time concern; see
/// [`crate::NsfwDetector::new`]. None of these is retried internally.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// The input carried no usable pixel backing: undecodable bytes, a
    /// zero-dimension image, or an RGBA buffer that does not match its
    /// claimed dimensions.
    #[error("no usable image backing: {0}")]
    UnusableImage(String),

    /// The inference runtime failed to execute the request.
    #[error("detection failed: {0}")]
    Inference(String),

    /// Inference produced a result set, but no observation for the
    /// target class.
    #[error("no NSFW observation found in classification results")]
    MissingObservation,
}

impl DetectionError {
    pub fn unusable(msg: impl Into<String>) -> Self {
        Self::UnusableImage(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }
}
