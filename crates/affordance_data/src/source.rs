use crate::dataset::Dataset;
use crate::error::PipelineError;
use crate::readers::{LoadLabelMask, Manifest};
use crate::sample::RawSample;
use crate::transforms::vision::LoadImage;
use anyhow::{Context, Result};
use tracing::trace;

/// Resolves sample indices to decoded (image, label mask) pairs.
///
/// Every `get` re-reads both files from disk; nothing is cached. Clones share
/// the manifest rows but no file handles, so a loader can give each worker
/// its own `SampleSource`.
///
/// # Example
/// ```ignore
/// let source = SampleSource::new(manifest, LoadLabelMask::default());
/// let raw = source.get(0)?;
/// assert_eq!(raw.dimensions(), raw.mask.dimensions());
/// ```
#[derive(Debug, Clone)]
pub struct SampleSource {
    manifest: Manifest,
    image_loader: LoadImage,
    mask_loader: LoadLabelMask,
}

impl SampleSource {
    pub fn new(manifest: Manifest, mask_loader: LoadLabelMask) -> Self {
        Self {
            manifest,
            image_loader: LoadImage::new(),
            mask_loader,
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Number of samples; valid indices are `0..size()`.
    pub fn size(&self) -> usize {
        self.manifest.len()
    }

    /// Decodes sample `index`.
    ///
    /// Fails with [`PipelineError::Index`] when `index >= size()`,
    /// [`PipelineError::Decode`] when either file cannot be decoded, and
    /// [`PipelineError::Dimension`] when image and mask sizes differ.
    pub fn get(&self, index: usize) -> Result<RawSample> {
        let entry = self.manifest.get(index).ok_or(PipelineError::Index {
            index,
            len: self.size(),
        })?;
        trace!(index, image = %entry.image_path.display(), "decoding sample");

        let image = self.image_loader.load(&entry.image_path)?;
        let mask = self.mask_loader.load(&entry.mask_path)?;
        RawSample::new(image, mask).with_context(|| {
            format!(
                "image {} and mask {} do not pair",
                entry.image_path.display(),
                entry.mask_path.display()
            )
        })
    }
}

impl Dataset for SampleSource {
    type Item = RawSample;

    fn len(&self) -> usize {
        self.size()
    }

    fn get(&self, index: usize) -> Result<RawSample> {
        SampleSource::get(self, index)
    }
}
