use crate::error::PipelineError;
use crate::sample::RawSample;
use crate::transforms::Transform;
use anyhow::{ensure, Result};
use image::imageops;

// ============================================================================
// CenterCrop
// ============================================================================

/// Crops the image and its label mask to the same centered window.
///
/// For a source of size `(h, w)` and a target of `(crop_height, crop_width)`
/// the window starts at
/// ```text
/// top  = h / 2 - crop_height / 2
/// left = w / 2 - crop_width / 2
/// ```
/// (integer division) and spans exactly the target size. The window is
/// computed once from the image size and used for both image and mask, so
/// `image[y, x]` and `mask[y, x]` keep annotating each other.
///
/// Sources smaller than the target are rejected with a dimension error.
///
/// # Example
/// ```ignore
/// let crop = CenterCrop::new(256, 320)?;
/// let cropped = crop.apply(raw_sample)?;
/// assert_eq!(cropped.dimensions(), (256, 320));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CenterCrop {
    height: u32,
    width: u32,
}

impl CenterCrop {
    pub fn new(height: u32, width: u32) -> Result<Self> {
        ensure!(
            height > 0 && width > 0,
            PipelineError::config(format!(
                "Crop dimensions must be positive (got {}x{})",
                height, width
            ))
        );
        Ok(Self { height, width })
    }

    /// Returns `(height, width)` of the crop target.
    pub fn size(&self) -> (u32, u32) {
        (self.height, self.width)
    }

    /// Top-left corner `(top, left)` of the crop window inside a
    /// `height x width` source.
    pub fn window_origin(&self, height: u32, width: u32) -> Result<(u32, u32)> {
        ensure!(
            height >= self.height && width >= self.width,
            PipelineError::dimension(format!(
                "source {}x{} is smaller than crop target {}x{}",
                height, width, self.height, self.width
            ))
        );
        let top = height / 2 - self.height / 2;
        let left = width / 2 - self.width / 2;
        debug_assert!(top + self.height <= height && left + self.width <= width);
        Ok((top, left))
    }
}

impl Default for CenterCrop {
    /// 256x320, the crop used to prepare the part-affordance training set.
    fn default() -> Self {
        Self {
            height: 256,
            width: 320,
        }
    }
}

impl Transform<RawSample, RawSample> for CenterCrop {
    fn apply(&self, sample: RawSample) -> Result<RawSample> {
        sample.check_aligned()?;

        let (width, height) = sample.image.dimensions();
        if (height, width) == (self.height, self.width) {
            return Ok(sample);
        }

        let (top, left) = self.window_origin(height, width)?;
        let image = imageops::crop_imm(&sample.image, left, top, self.width, self.height).to_image();
        let mask = sample.mask.window(
            top as usize,
            left as usize,
            self.height as usize,
            self.width as usize,
        );
        Ok(RawSample { image, mask })
    }
}
