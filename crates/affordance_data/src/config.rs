//! src/config.rs
//!
//! Configuration for building a [`SegmentationDataset`](crate::SegmentationDataset).
//!
//! Built in code:
//! ```ignore
//! let config = PipelineConfig::builder()
//!     .manifest("image_class_path.csv")
//!     .crop(256, 320)
//!     .normalize(Normalize::new([0.22, 0.23, 0.36], [0.12, 0.12, 0.07])?)
//!     .build();
//! ```
//!
//! or read from JSON, where every field is optional:
//! ```json
//! {
//!   "manifest": { "path": "image_class_path.csv", "has_headers": true },
//!   "crop": { "height": 256, "width": 320 },
//!   "normalize": { "mean": [0.2191, 0.2349, 0.3598], "std": [0.1243, 0.1171, 0.0748] },
//!   "mask_key": "gt_label",
//!   "stages": ["center_crop", "to_tensor", "normalize"]
//! }
//! ```

use crate::readers::{ManifestOptions, DEFAULT_MASK_KEY};
use crate::transforms::vision::{CenterCrop, Normalize, ToTensor};
use crate::transforms::{Stage, StageKind, TransformChain};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where the manifest lives and how to parse it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestConfig {
    pub path: PathBuf,
    #[serde(flatten)]
    pub options: ManifestOptions,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("image_class_path.csv"),
            options: ManifestOptions::default(),
        }
    }
}

/// Center-crop target in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropConfig {
    pub height: u32,
    pub width: u32,
}

impl Default for CropConfig {
    fn default() -> Self {
        let (height, width) = CenterCrop::default().size();
        Self { height, width }
    }
}

/// Everything needed to build a dataset. Fixed once the dataset exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub manifest: ManifestConfig,
    pub crop: CropConfig,
    /// Defaults to the part-affordance training statistics.
    pub normalize: Normalize,
    /// Key of the label array inside each mask file.
    pub mask_key: String,
    /// Stages to run, validated by [`TransformChain::new`].
    pub stages: Vec<StageKind>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            manifest: ManifestConfig::default(),
            crop: CropConfig::default(),
            normalize: Normalize::default(),
            mask_key: DEFAULT_MASK_KEY.to_string(),
            stages: StageKind::ALL.to_vec(),
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse pipeline configuration")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline configuration: {}", path.display()))?;
        Self::from_json_str(&json)
            .with_context(|| format!("Invalid pipeline configuration: {}", path.display()))
    }

    pub fn center_crop(&self) -> Result<CenterCrop> {
        CenterCrop::new(self.crop.height, self.crop.width)
    }

    /// Builds and validates the configured stage list.
    pub fn transform_chain(&self) -> Result<TransformChain> {
        let crop = self.center_crop()?;
        let stages = self
            .stages
            .iter()
            .map(|kind| -> Stage {
                match kind {
                    StageKind::CenterCrop => crop.into(),
                    StageKind::ToTensor => ToTensor.into(),
                    StageKind::Normalize => self.normalize.into(),
                }
            })
            .collect();
        TransformChain::new(stages)
    }
}

/// Builder for [`PipelineConfig`] with method chaining.
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the manifest file path
    pub fn manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.manifest.path = path.into();
        self
    }

    /// Set whether the manifest starts with a header row
    pub fn has_headers(mut self, has_headers: bool) -> Self {
        self.config.manifest.options.has_headers = has_headers;
        self
    }

    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.config.manifest.options.delimiter = delimiter;
        self
    }

    /// Resolve relative manifest paths against `dir`
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.manifest.options.base_dir = Some(dir.into());
        self
    }

    /// Set the center-crop target
    pub fn crop(mut self, height: u32, width: u32) -> Self {
        self.config.crop = CropConfig { height, width };
        self
    }

    pub fn normalize(mut self, normalize: Normalize) -> Self {
        self.config.normalize = normalize;
        self
    }

    pub fn mask_key(mut self, key: impl Into<String>) -> Self {
        self.config.mask_key = key.into();
        self
    }

    /// Replace the stage list. Order is checked when the chain is built.
    pub fn stages(mut self, stages: impl IntoIterator<Item = StageKind>) -> Self {
        self.config.stages = stages.into_iter().collect();
        self
    }

    /// Build the final configuration.
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::sample::Phase;

    #[test]
    fn test_config_defaults() -> Result<()> {
        let config = PipelineConfig::default();
        assert_eq!(config.crop, CropConfig { height: 256, width: 320 });
        assert_eq!(config.mask_key, "gt_label");
        assert_eq!(config.normalize, Normalize::part_affordance());
        assert!(config.manifest.options.has_headers);

        let chain = config.transform_chain()?;
        assert_eq!(chain.kinds(), StageKind::ALL.to_vec());
        assert_eq!(chain.output_phase(), Phase::Tensor);
        Ok(())
    }

    #[test]
    fn test_config_from_partial_json() -> Result<()> {
        let config = PipelineConfig::from_json_str(
            r#"{
                "manifest": { "path": "train.csv", "has_headers": false, "delimiter": ";" },
                "crop": { "height": 128, "width": 160 },
                "stages": ["center_crop", "to_tensor"]
            }"#,
        )?;

        assert_eq!(config.manifest.path, PathBuf::from("train.csv"));
        assert!(!config.manifest.options.has_headers);
        assert_eq!(config.manifest.options.delimiter, ';');
        assert_eq!(config.center_crop()?.size(), (128, 160));
        assert_eq!(config.normalize, Normalize::part_affordance());
        assert_eq!(config.transform_chain()?.kinds().len(), 2);
        Ok(())
    }

    #[test]
    fn test_config_rejects_bad_stage_order() {
        let config = PipelineConfig::builder()
            .stages([StageKind::ToTensor, StageKind::CenterCrop])
            .build();
        let err = config.transform_chain().unwrap_err();
        assert!(matches!(
            PipelineError::classify(&err),
            Some(PipelineError::Config { .. })
        ));
    }

    #[test]
    fn test_config_rejects_invalid_normalize_json() {
        let result = PipelineConfig::from_json_str(
            r#"{ "normalize": { "mean": [0.1, 0.1, 0.1], "std": [0.0, 1.0, 1.0] } }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_overrides() -> Result<()> {
        let norm = Normalize::new([0.5; 3], [0.5; 3])?;
        let config = PipelineConfig::builder()
            .manifest("val.csv")
            .base_dir("/data")
            .crop(64, 64)
            .normalize(norm)
            .mask_key("labels")
            .build();

        assert_eq!(config.manifest.options.base_dir, Some(PathBuf::from("/data")));
        assert_eq!(config.normalize, norm);
        assert_eq!(config.mask_key, "labels");
        assert_eq!(config.center_crop()?.size(), (64, 64));
        Ok(())
    }
}
