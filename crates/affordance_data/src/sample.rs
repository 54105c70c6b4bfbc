use crate::error::PipelineError;
use anyhow::{ensure, Result};
use image::RgbImage;
use tch::{Kind, Tensor};

/// A 2-D grid of categorical labels, stored row-major.
///
/// `labels[y * width + x]` annotates pixel `(x, y)` of the paired image.
/// Values are class ids and are never interpolated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMask {
    height: usize,
    width: usize,
    labels: Vec<i64>,
}

impl LabelMask {
    /// Creates a mask from row-major labels.
    pub fn new(height: usize, width: usize, labels: Vec<i64>) -> Result<Self> {
        let cells = height.checked_mul(width).ok_or_else(|| {
            PipelineError::dimension(format!("mask size {}x{} overflows", height, width))
        })?;
        ensure!(
            labels.len() == cells,
            PipelineError::dimension(format!(
                "label buffer holds {} values but mask is {}x{}",
                labels.len(),
                height,
                width
            ))
        );
        Ok(Self {
            height,
            width,
            labels,
        })
    }

    /// Creates a mask where every pixel carries `label`.
    pub fn filled(height: usize, width: usize, label: i64) -> Self {
        Self {
            height,
            width,
            labels: vec![label; height * width],
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns `(height, width)`.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn get(&self, y: usize, x: usize) -> Option<i64> {
        if y < self.height && x < self.width {
            Some(self.labels[y * self.width + x])
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.labels
    }

    /// Copies the `height x width` window whose top-left corner is `(top, left)`.
    /// The caller guarantees the window lies inside the mask.
    pub(crate) fn window(&self, top: usize, left: usize, height: usize, width: usize) -> Self {
        let mut labels = Vec::with_capacity(height * width);
        for row in top..top + height {
            let start = row * self.width + left;
            labels.extend_from_slice(&self.labels[start..start + width]);
        }
        Self {
            height,
            width,
            labels,
        }
    }
}

/// A sample as decoded from disk: RGB pixels plus the aligned label mask.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub image: RgbImage,
    pub mask: LabelMask,
}

impl RawSample {
    /// Pairs an image with its mask, rejecting pairs whose sizes differ.
    pub fn new(image: RgbImage, mask: LabelMask) -> Result<Self> {
        let sample = Self { image, mask };
        sample.check_aligned()?;
        Ok(sample)
    }

    /// Returns `(height, width)` of the image.
    pub fn dimensions(&self) -> (usize, usize) {
        let (width, height) = self.image.dimensions();
        (height as usize, width as usize)
    }

    pub(crate) fn check_aligned(&self) -> Result<()> {
        let image_dims = self.dimensions();
        let mask_dims = self.mask.dimensions();
        ensure!(
            image_dims == mask_dims,
            PipelineError::dimension(format!(
                "image is {}x{} but label mask is {}x{}",
                image_dims.0, image_dims.1, mask_dims.0, mask_dims.1
            ))
        );
        Ok(())
    }
}

/// A sample ready for training.
/// - `image`: `Float` tensor `[3, H, W]`
/// - `mask`: `Int64` tensor `[H, W]`
#[derive(Debug)]
pub struct TensorSample {
    pub image: Tensor,
    pub mask: Tensor,
}

/// Creates a shallow clone sharing the underlying storage.
impl Clone for TensorSample {
    fn clone(&self) -> Self {
        Self {
            image: self.image.shallow_clone(),
            mask: self.mask.shallow_clone(),
        }
    }
}

impl TensorSample {
    /// Pairs image and mask tensors after checking kinds and shapes.
    pub fn new(image: Tensor, mask: Tensor) -> Result<Self> {
        let (channels, height, width) = image.size3().map_err(|_| {
            PipelineError::dimension(format!(
                "image tensor must be [C, H, W], got {:?}",
                image.size()
            ))
        })?;
        let (mask_height, mask_width) = mask.size2().map_err(|_| {
            PipelineError::dimension(format!("mask tensor must be [H, W], got {:?}", mask.size()))
        })?;
        ensure!(
            channels == 3 && (height, width) == (mask_height, mask_width),
            PipelineError::dimension(format!(
                "image tensor {:?} does not pair with mask tensor {:?}",
                image.size(),
                mask.size()
            ))
        );
        ensure!(
            mask.kind() == Kind::Int64,
            PipelineError::config(format!("mask tensor must be Int64, got {:?}", mask.kind()))
        );
        Ok(Self { image, mask })
    }

    pub fn into_parts(self) -> (Tensor, Tensor) {
        (self.image, self.mask)
    }
}

/// Which representation a [`SegmentationSample`] is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Raw,
    Tensor,
}

/// A sample at either phase of the pipeline. Runtime-configured chains move
/// samples through this type; statically typed chains use the phase structs
/// directly.
#[derive(Debug, Clone)]
pub enum SegmentationSample {
    Raw(RawSample),
    Tensor(TensorSample),
}

impl SegmentationSample {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Raw(_) => Phase::Raw,
            Self::Tensor(_) => Phase::Tensor,
        }
    }

    pub fn into_raw(self) -> Result<RawSample> {
        match self {
            Self::Raw(sample) => Ok(sample),
            Self::Tensor(_) => Err(PipelineError::config("expected a raw sample, got tensors").into()),
        }
    }

    pub fn into_tensor(self) -> Result<TensorSample> {
        match self {
            Self::Tensor(sample) => Ok(sample),
            Self::Raw(_) => {
                Err(PipelineError::config("expected a tensor sample, got raw pixels").into())
            }
        }
    }
}

impl From<RawSample> for SegmentationSample {
    fn from(sample: RawSample) -> Self {
        Self::Raw(sample)
    }
}

impl From<TensorSample> for SegmentationSample {
    fn from(sample: TensorSample) -> Self {
        Self::Tensor(sample)
    }
}
