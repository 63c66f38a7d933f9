use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::vit;
use hf_hub::{Repo, RepoType, api::sync::Api};
use serde::Deserialize;

/// Hugging Face repository holding the packaged classifier.
/// 2-class ViT: normal (safe), nsfw (explicit).
pub const MODEL_REPO: &str = "Falconsai/nsfw_image_detection";

const WEIGHTS_FILE: &str = "model.safetensors";
const CONFIG_FILE: &str = "config.json";

/// One labeled score from a single inference execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub label: String,
    pub confidence: f32,
}

/// Where the packaged model artifact comes from.
#[derive(Debug, Clone, Default)]
pub enum ModelSource {
    /// Fetch from the published Hugging Face repository, using its local
    /// cache on repeat loads.
    #[default]
    HuggingFace,
    /// Load `model.safetensors` and `config.json` from a local directory,
    /// for offline or pre-provisioned deployments.
    Directory(PathBuf),
}

#[derive(Deserialize)]
struct LabelMap {
    id2label: HashMap<String, String>,
}

/// Loaded classifier plus the device it executes on.
///
/// Immutable after construction; concurrent checks share it behind an
/// `Arc` without locking.
pub struct NsfwModel {
    model: vit::Model,
    device: Device,
    labels: Vec<String>,
}

impl NsfwModel {
    pub fn load(source: &ModelSource, force_cpu: bool) -> Result<Self> {
        let device = select_device(force_cpu);

        let (weights, config) = match source {
            ModelSource::HuggingFace => fetch_from_hub()?,
            ModelSource::Directory(dir) => (dir.join(WEIGHTS_FILE), dir.join(CONFIG_FILE)),
        };

        log::info!("loading NSFW classifier from {:?} on {:?}", weights, device);

        let raw = fs::read_to_string(&config)
            .with_context(|| format!("reading model config {:?}", config))?;
        let vit_config: vit::Config =
            serde_json::from_str(&raw).context("parsing ViT model config")?;
        let labels = labels_from_config(&raw)?;

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)? };
        let model = vit::Model::new(&vit_config, labels.len(), vb)?;

        log::info!("NSFW classifier ready, classes: {:?}", labels);

        Ok(Self {
            model,
            device,
            labels,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Runs exactly one inference execution and returns every labeled
    /// classification score.
    pub fn classify(&self, input: &Tensor) -> Result<Vec<Observation>> {
        let logits = self.model.forward(input)?;
        let probs = candle_nn::ops::softmax(&logits, 1)?;
        let scores: Vec<f32> = probs.flatten_all()?.to_vec1()?;

        if scores.len() != self.labels.len() {
            return Err(anyhow!(
                "model produced {} scores for {} classes",
                scores.len(),
                self.labels.len()
            ));
        }

        Ok(self
            .labels
            .iter()
            .cloned()
            .zip(scores)
            .map(|(label, confidence)| Observation { label, confidence })
            .collect())
    }
}

fn fetch_from_hub() -> Result<(PathBuf, PathBuf)> {
    let api = Api::new()?;
    let repo = api.repo(Repo::new(MODEL_REPO.to_string(), RepoType::Model));
    let weights = repo.get(WEIGHTS_FILE)?;
    let config = repo.get(CONFIG_FILE)?;
    Ok((weights, config))
}

/// Class labels ordered by index, from the config's `id2label` map.
fn labels_from_config(raw: &str) -> Result<Vec<String>> {
    let map: LabelMap = serde_json::from_str(raw).context("parsing id2label from model config")?;

    let mut labels = vec![String::new(); map.id2label.len()];
    for (id, label) in map.id2label {
        let idx: usize = id
            .parse()
            .with_context(|| format!("non-numeric class index {:?}", id))?;
        let slot = labels
            .get_mut(idx)
            .ok_or_else(|| anyhow!("class index {} out of range", idx))?;
        *slot = label;
    }

    Ok(labels)
}

fn select_device(force_cpu: bool) -> Device {
    if force_cpu {
        log::warn!(
            "CPU-only execution forced; detection accuracy is reduced compared to hardware-accelerated execution"
        );
        return Device::Cpu;
    }

    #[cfg(feature = "metal")]
    match Device::new_metal(0) {
        Ok(device) => return device,
        Err(e) => log::warn!("Metal unavailable, falling back to CPU: {e}"),
    }

    #[cfg(feature = "cuda")]
    match Device::new_cuda(0) {
        Ok(device) => return device,
        Err(e) => log::warn!("CUDA unavailable, falling back to CPU: {e}"),
    }

    Device::Cpu
}
