//! NSFW image detection backed by a pre-trained ViT classifier.
//!
//! [`NsfwDetector`] wraps the packaged `Falconsai/nsfw_image_detection`
//! model behind a small check API: feed it a decoded image, encoded image
//! bytes, or a raw RGBA frame and get back a confidence, 0.0 for safe
//! content up to 1.0 for explicit material. Every check is available in a
//! callback form and an awaitable form that report the same result.
//!
//! ```no_run
//! use nsfw_detector::NsfwDetector;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let image = image::open("photo.jpg")?;
//! let confidence = NsfwDetector::shared().check_image(&image).await?;
//! if confidence > 0.8 {
//!     println!("flagged: {confidence:.2}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod detector;
pub mod error;
pub mod model;
pub mod pixel_buffer;
pub mod preprocess;

pub use detector::{DetectorConfig, NSFW_LABEL, NsfwDetector};
pub use error::{DetectionError, DetectionResult};
pub use model::{ModelSource, Observation};
pub use pixel_buffer::PixelBuffer;
