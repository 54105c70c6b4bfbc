use crate::error::PipelineError;
use crate::sample::TensorSample;
use crate::transforms::Transform;
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tch::Tensor;

/// Per-channel mean of the cropped part-affordance training images in [0, 1].
pub const PART_AFFORDANCE_MEAN: [f32; 3] = [0.2191, 0.2349, 0.3598];
/// Per-channel standard deviation matching [`PART_AFFORDANCE_MEAN`].
pub const PART_AFFORDANCE_STD: [f32; 3] = [0.1243, 0.1171, 0.0748];

// ============================================================================
// Normalize
// ============================================================================

/// Normalizes the image tensor with channel-wise statistics. The label mask
/// passes through untouched.
///
/// ```text
/// image[c, h, w] = (image[c, h, w] - mean[c]) / std[c]
/// ```
///
/// # Example
/// ```ignore
/// let norm = Normalize::new([0.5; 3], [0.25; 3])?;
/// let normalized = norm.apply(tensor_sample)?;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NormalizeParams", into = "NormalizeParams")]
pub struct Normalize {
    mean: [f32; 3],
    std: [f32; 3],
}

/// Unvalidated form used for (de)serialization.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct NormalizeParams {
    mean: [f32; 3],
    std: [f32; 3],
}

impl Normalize {
    pub fn new(mean: [f32; 3], std: [f32; 3]) -> Result<Self> {
        ensure!(
            mean.iter().all(|m| m.is_finite()),
            PipelineError::config(format!("Normalization mean must be finite (got {:?})", mean))
        );
        ensure!(
            std.iter().all(|s| s.is_finite() && *s != 0.0),
            PipelineError::config(format!(
                "Normalization std must be finite and non-zero (got {:?})",
                std
            ))
        );
        Ok(Self { mean, std })
    }

    /// Statistics of the part-affordance training set.
    pub fn part_affordance() -> Self {
        Self {
            mean: PART_AFFORDANCE_MEAN,
            std: PART_AFFORDANCE_STD,
        }
    }

    pub fn mean(&self) -> [f32; 3] {
        self.mean
    }

    pub fn std(&self) -> [f32; 3] {
        self.std
    }

    fn channel_params(&self, tensor: &Tensor) -> Result<(Tensor, Tensor)> {
        let (num_channels, _height, _width) = tensor.size3().map_err(|_| {
            PipelineError::dimension(format!(
                "Input must be 3D tensor [C, H, W], got {:?}",
                tensor.size()
            ))
        })?;
        ensure!(
            num_channels == 3,
            PipelineError::dimension(format!(
                "Channel count mismatch: input has {} channels but normalization expects 3",
                num_channels
            ))
        );

        let mean_t = Tensor::from_slice(&self.mean)
            .reshape(&[3, 1, 1])
            .to_kind(tensor.kind());
        let std_t = Tensor::from_slice(&self.std)
            .reshape(&[3, 1, 1])
            .to_kind(tensor.kind());
        Ok((mean_t, std_t))
    }

    /// Normalizes a bare `[3, H, W]` image tensor.
    pub fn normalize_image(&self, image: &Tensor) -> Result<Tensor> {
        let (mean_t, std_t) = self.channel_params(image)?;
        image
            .f_sub(&mean_t)
            .and_then(|centered| centered.f_div(&std_t))
            .context("Failed to normalize image tensor")
    }

    /// Maps a normalized image back to [0, 1] space: `x * std + mean`.
    pub fn invert(&self, image: &Tensor) -> Result<Tensor> {
        let (mean_t, std_t) = self.channel_params(image)?;
        image
            .f_mul(&std_t)
            .and_then(|scaled| scaled.f_add(&mean_t))
            .context("Failed to denormalize image tensor")
    }
}

impl Default for Normalize {
    fn default() -> Self {
        Self::part_affordance()
    }
}

impl TryFrom<NormalizeParams> for Normalize {
    type Error = anyhow::Error;

    fn try_from(params: NormalizeParams) -> Result<Self> {
        Self::new(params.mean, params.std)
    }
}

impl From<Normalize> for NormalizeParams {
    fn from(norm: Normalize) -> Self {
        Self {
            mean: norm.mean,
            std: norm.std,
        }
    }
}

impl Transform<TensorSample, TensorSample> for Normalize {
    fn apply(&self, sample: TensorSample) -> Result<TensorSample> {
        let image = self.normalize_image(&sample.image)?;
        Ok(TensorSample {
            image,
            mask: sample.mask,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind, Tensor};

    fn test_sample(value: f64) -> TensorSample {
        TensorSample {
            image: Tensor::full(&[3, 4, 5], value, (Kind::Float, Device::Cpu)),
            mask: Tensor::full(&[4, 5], 2i64, (Kind::Int64, Device::Cpu)),
        }
    }

    #[test]
    fn test_normalize_per_channel() -> Result<()> {
        let norm = Normalize::new([1.0, 0.0, 0.5], [1.0, 2.0, 0.25])?;
        let normalized = norm.apply(test_sample(1.0))?;

        let expected = [0.0, 0.5, 2.0];
        for (c, want) in expected.iter().enumerate() {
            let channel_mean = normalized.image.select(0, c as i64).mean(Kind::Float);
            assert!((channel_mean.double_value(&[]) - want).abs() < 1e-5);
        }
        // Mask untouched
        assert_eq!(normalized.mask.kind(), Kind::Int64);
        assert_eq!(normalized.mask.int64_value(&[3, 4]), 2);
        Ok(())
    }

    #[test]
    fn test_normalize_invert_round_trip() -> Result<()> {
        let norm = Normalize::part_affordance();
        let image = Tensor::rand(&[3, 8, 8], (Kind::Float, Device::Cpu));

        let restored = norm.invert(&norm.normalize_image(&image)?)?;
        assert!(restored.allclose(&image, 1e-5, 1e-5, false));

        let back = norm.normalize_image(&norm.invert(&image)?)?;
        assert!(back.allclose(&image, 1e-4, 1e-4, false));
        Ok(())
    }

    #[test]
    fn test_normalize_rejects_bad_std() {
        for std in [[0.1, 0.0, 0.1], [0.1, f32::NAN, 0.1]] {
            let err = Normalize::new([0.0; 3], std).unwrap_err();
            assert!(matches!(
                PipelineError::classify(&err),
                Some(PipelineError::Config { .. })
            ));
        }
    }

    #[test]
    fn test_normalize_rejects_wrong_channel_count() {
        let image = Tensor::zeros(&[1, 4, 4], (Kind::Float, Device::Cpu));
        let err = Normalize::default().normalize_image(&image).unwrap_err();
        assert!(matches!(
            PipelineError::classify(&err),
            Some(PipelineError::Dimension { .. })
        ));
    }

    #[test]
    fn test_normalize_deserialize_validates() {
        let ok: Normalize =
            serde_json::from_str(r#"{"mean":[0.5,0.5,0.5],"std":[0.2,0.2,0.2]}"#).unwrap();
        assert_eq!(ok.std(), [0.2; 3]);

        let bad =
            serde_json::from_str::<Normalize>(r#"{"mean":[0.5,0.5,0.5],"std":[0.0,0.2,0.2]}"#);
        assert!(bad.is_err());
    }
}
