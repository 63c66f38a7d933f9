//! Scores a single image file for NSFW content and prints the confidence.

use std::sync::mpsc;

use anyhow::{Context, Result};
use nsfw_detector::NsfwDetector;

fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: nsfw-score <image-file>")?;
    let image = image::open(&path).with_context(|| format!("opening {path}"))?;

    let detector = NsfwDetector::new()?;

    let (tx, rx) = mpsc::channel();
    detector.check_image_with(&image, move |result| {
        let _ = tx.send(result);
    });

    let confidence = rx.recv().context("detection thread exited")??;
    println!("{path}: NSFW confidence {confidence:.4}");

    Ok(())
}
