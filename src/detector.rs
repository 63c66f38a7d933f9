use std::sync::{Arc, OnceLock};
use std::thread;

use anyhow::Result;
use image::DynamicImage;
use tokio::sync::oneshot;

use crate::error::{DetectionError, DetectionResult};
use crate::model::{ModelSource, NsfwModel, Observation};
use crate::pixel_buffer::PixelBuffer;
use crate::preprocess;

/// Class the detector reports on, matched ASCII-case-insensitively
/// against the model's published label set.
pub const NSFW_LABEL: &str = "NSFW";

/// Construction options for an explicitly built detector.
#[derive(Debug, Clone, Default)]
pub struct DetectorConfig {
    pub source: ModelSource,
    /// Skip hardware acceleration entirely. Required in virtualized
    /// environments without GPU access; noticeably less accurate than
    /// accelerated execution.
    pub force_cpu: bool,
}

/// Scores images for NSFW content with a pre-trained classifier.
///
/// Each check runs one inference on a worker thread and reports through a
/// completion closure invoked exactly once, with 0.0 for safe content up
/// to 1.0 for explicit material. The `async` wrappers suspend until that
/// single invocation and resolve to the same result.
pub struct NsfwDetector {
    model: Arc<NsfwModel>,
}

static SHARED: OnceLock<NsfwDetector> = OnceLock::new();

impl NsfwDetector {
    /// Process-wide detector, loaded on first access and shared by every
    /// caller afterwards.
    ///
    /// Aborts the process if the packaged model cannot be loaded: the
    /// artifact ships with the application, so a load failure means a
    /// corrupted build. Use [`NsfwDetector::new`] to handle load errors
    /// yourself.
    pub fn shared() -> &'static NsfwDetector {
        SHARED.get_or_init(|| {
            NsfwDetector::new().expect("packaged NSFW model should always load")
        })
    }

    pub fn new() -> Result<Self> {
        Self::with_config(DetectorConfig::default())
    }

    pub fn with_config(config: DetectorConfig) -> Result<Self> {
        let model = NsfwModel::load(&config.source, config.force_cpu)?;
        Ok(Self {
            model: Arc::new(model),
        })
    }

    /// Checks a decoded image, reporting through `completion`.
    pub fn check_image_with<F>(&self, image: &DynamicImage, completion: F)
    where
        F: FnOnce(DetectionResult) + Send + 'static,
    {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        self.spawn_check(rgba.into_raw(), width, height, completion);
    }

    /// Checks a raw frame, skipping image-container decoding.
    pub fn check_pixel_buffer_with<F>(&self, buffer: &PixelBuffer, completion: F)
    where
        F: FnOnce(DetectionResult) + Send + 'static,
    {
        self.spawn_check(buffer.rgba.clone(), buffer.width, buffer.height, completion);
    }

    /// Checks a still-encoded image (PNG, JPEG, ...). Decoding is
    /// delegated to the image crate; undecodable bytes surface as
    /// [`DetectionError::UnusableImage`] without reaching inference.
    pub fn check_encoded_with<F>(&self, bytes: &[u8], completion: F)
    where
        F: FnOnce(DetectionResult) + Send + 'static,
    {
        match image::load_from_memory(bytes) {
            Ok(image) => self.check_image_with(&image, completion),
            Err(e) => completion(Err(DetectionError::unusable(format!(
                "undecodable image data: {e}"
            )))),
        }
    }

    /// Awaitable form of [`NsfwDetector::check_image_with`].
    pub async fn check_image(&self, image: &DynamicImage) -> DetectionResult {
        let (tx, rx) = oneshot::channel();
        self.check_image_with(image, move |result| {
            let _ = tx.send(result);
        });
        await_completion(rx).await
    }

    /// Awaitable form of [`NsfwDetector::check_pixel_buffer_with`].
    pub async fn check_pixel_buffer(&self, buffer: &PixelBuffer) -> DetectionResult {
        let (tx, rx) = oneshot::channel();
        self.check_pixel_buffer_with(buffer, move |result| {
            let _ = tx.send(result);
        });
        await_completion(rx).await
    }

    /// Awaitable form of [`NsfwDetector::check_encoded_with`].
    pub async fn check_encoded(&self, bytes: &[u8]) -> DetectionResult {
        let (tx, rx) = oneshot::channel();
        self.check_encoded_with(bytes, move |result| {
            let _ = tx.send(result);
        });
        await_completion(rx).await
    }

    fn spawn_check<F>(&self, rgba: Vec<u8>, width: u32, height: u32, completion: F)
    where
        F: FnOnce(DetectionResult) + Send + 'static,
    {
        let model = Arc::clone(&self.model);
        thread::spawn(move || completion(run_check(&model, &rgba, width, height)));
    }
}

async fn await_completion(rx: oneshot::Receiver<DetectionResult>) -> DetectionResult {
    rx.await.unwrap_or_else(|_| {
        Err(DetectionError::inference(
            "detection ended without reporting a result",
        ))
    })
}

/// One full check: scale the backing, build the input tensor, run a single
/// inference, extract the target-class confidence.
fn run_check(model: &NsfwModel, rgba: &[u8], width: u32, height: u32) -> DetectionResult {
    let rgb = preprocess::scale_rgba(rgba, width, height)?;
    let input = preprocess::to_tensor(&rgb, model.device())
        .map_err(|e| DetectionError::inference(e.to_string()))?;
    let observations = model.classify(&input).map_err(|e| {
        log::warn!("NSFW detection failed: {e}");
        DetectionError::inference(e.to_string())
    })?;
    nsfw_confidence(&observations)
}

/// Extracts the target-class confidence from one inference's result set.
fn nsfw_confidence(observations: &[Observation]) -> DetectionResult {
    observations
        .iter()
        .find(|o| o.label.eq_ignore_ascii_case(NSFW_LABEL))
        .map(|o| o.confidence)
        .ok_or(DetectionError::MissingObservation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(label: &str, confidence: f32) -> Observation {
        Observation {
            label: label.to_string(),
            confidence,
        }
    }

    #[test]
    fn test_confidence_picks_target_class() {
        let observations = [observation("normal", 0.93), observation("nsfw", 0.07)];
        assert_eq!(nsfw_confidence(&observations).unwrap(), 0.07);
    }

    #[test]
    fn test_confidence_matches_label_case_insensitively() {
        for label in ["nsfw", "NSFW", "Nsfw"] {
            let observations = [observation(label, 0.4)];
            assert_eq!(nsfw_confidence(&observations).unwrap(), 0.4);
        }
    }

    #[test]
    fn test_confidence_missing_target_class() {
        let observations = [observation("normal", 1.0)];
        assert!(matches!(
            nsfw_confidence(&observations),
            Err(DetectionError::MissingObservation)
        ));
    }

    #[test]
    fn test_confidence_empty_result_set() {
        assert!(matches!(
            nsfw_confidence(&[]),
            Err(DetectionError::MissingObservation)
        ));
    }
}

// Tests below exercise the published model end to end. They download it
// on first run, so they stay out of the default test pass:
//   cargo test -- --ignored
#[cfg(test)]
mod model_tests {
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    use image::{DynamicImage, Rgba, RgbaImage};

    use super::*;

    fn detector() -> &'static NsfwDetector {
        static DETECTOR: OnceLock<NsfwDetector> = OnceLock::new();
        DETECTOR.get_or_init(|| {
            NsfwDetector::with_config(DetectorConfig {
                source: ModelSource::HuggingFace,
                force_cpu: true,
            })
            .expect("model load")
        })
    }

    fn gradient_image(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8, 255])
        })
    }

    #[tokio::test]
    #[ignore = "downloads the published model"]
    async fn test_confidence_within_unit_interval() {
        let image = DynamicImage::ImageRgba8(gradient_image(64, 48));
        let confidence = detector().check_image(&image).await.unwrap();
        assert!((0.0..=1.0).contains(&confidence));
    }

    #[tokio::test]
    #[ignore = "downloads the published model"]
    async fn test_image_and_pixel_buffer_agree() {
        let raster = gradient_image(64, 48);
        let buffer = PixelBuffer::from_image(&raster);
        let image = DynamicImage::ImageRgba8(raster);

        let from_image = detector().check_image(&image).await.unwrap();
        let from_buffer = detector().check_pixel_buffer(&buffer).await.unwrap();
        assert!((from_image - from_buffer).abs() < 1e-5);
    }

    #[tokio::test]
    #[ignore = "downloads the published model"]
    async fn test_callback_and_await_agree() {
        let image = DynamicImage::ImageRgba8(gradient_image(32, 32));

        let (tx, rx) = mpsc::channel();
        detector().check_image_with(&image, move |result| {
            tx.send(result).unwrap();
        });
        let via_callback = rx.recv().unwrap().unwrap();

        let via_await = detector().check_image(&image).await.unwrap();
        assert!((via_callback - via_await).abs() < 1e-5);
    }

    #[test]
    #[ignore = "downloads the published model"]
    fn test_callback_fires_exactly_once() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let image = DynamicImage::ImageRgba8(gradient_image(16, 16));
        let (tx, rx) = mpsc::channel();
        detector().check_image_with(&image, move |_| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            tx.send(()).unwrap();
        });

        rx.recv().unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
        assert!(rx.recv().is_err(), "completion sender should be consumed");
    }

    #[tokio::test]
    #[ignore = "downloads the published model"]
    async fn test_concurrent_checks_resolve_independently() {
        let a = DynamicImage::ImageRgba8(gradient_image(40, 40));
        let b = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            40,
            40,
            Rgba([200, 200, 200, 255]),
        ));

        let detector = detector();
        let (ra, rb) = tokio::join!(detector.check_image(&a), detector.check_image(&b));
        assert!((0.0..=1.0).contains(&ra.unwrap()));
        assert!((0.0..=1.0).contains(&rb.unwrap()));
    }

    #[tokio::test]
    #[ignore = "downloads the published model"]
    async fn test_unusable_input_errors_without_inference() {
        let empty = DynamicImage::new_rgba8(0, 0);
        let result = detector().check_image(&empty).await;
        assert!(matches!(result, Err(DetectionError::UnusableImage(_))));

        let result = detector().check_encoded(b"definitely not an image").await;
        assert!(matches!(result, Err(DetectionError::UnusableImage(_))));
    }

    #[test]
    #[ignore = "downloads the published model"]
    fn test_shared_detector_is_one_instance() {
        assert!(std::ptr::eq(NsfwDetector::shared(), NsfwDetector::shared()));
    }
}
