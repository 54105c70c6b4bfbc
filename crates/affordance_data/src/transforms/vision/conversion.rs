use crate::error::PipelineError;
use crate::sample::{RawSample, TensorSample};
use crate::transforms::Transform;
use anyhow::{ensure, Context, Result};
use tch::{Kind, Tensor};

// ============================================================================
// ToTensor
// ============================================================================

/// Converts a raw sample to tensors.
///
/// | Field | Input                 | Output                          |
/// |-------|-----------------------|---------------------------------|
/// | image | RGB8, `H x W x 3`     | `Float`, `[3, H, W]`, in [0, 1] |
/// | mask  | `LabelMask`, `H x W`  | `Int64`, `[H, W]`, unchanged    |
///
/// No cropping and no normalization happen here.
///
/// # Example
/// ```ignore
/// let tensors = ToTensor.apply(raw_sample)?;
/// assert_eq!(tensors.image.size(), vec![3, 256, 320]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ToTensor;

impl ToTensor {
    /// `[H, W, 3]` u8 pixels -> `[3, H, W]` f32 in [0, 1].
    fn image_tensor(sample: &RawSample) -> Result<Tensor> {
        let (width, height) = sample.image.dimensions();
        ensure!(
            width > 0 && height > 0,
            PipelineError::dimension(format!(
                "Image dimensions must be positive (got {}x{})",
                width, height
            ))
        );

        Tensor::from_slice(sample.image.as_raw())
            .reshape(&[height as i64, width as i64, 3])
            .permute(&[2, 0, 1])
            .contiguous()
            .to_kind(Kind::Float)
            .f_div_scalar(255.0)
            .context("Failed to scale image tensor values")
    }

    fn mask_tensor(sample: &RawSample) -> Tensor {
        let (height, width) = sample.mask.dimensions();
        Tensor::from_slice(sample.mask.as_slice()).reshape(&[height as i64, width as i64])
    }
}

impl Transform<RawSample, TensorSample> for ToTensor {
    fn apply(&self, sample: RawSample) -> Result<TensorSample> {
        sample.check_aligned()?;
        let image = Self::image_tensor(&sample)?;
        let mask = Self::mask_tensor(&sample);
        Ok(TensorSample { image, mask })
    }
}
