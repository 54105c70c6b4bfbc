use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::readers::{LoadLabelMask, Manifest};
use crate::sample::{Phase, TensorSample};
use crate::source::SampleSource;
use crate::transforms::TransformChain;
use anyhow::{Context, Result};
use tch::Tensor;
use tracing::debug;

/// Random access to samples by index.
///
/// Implementations hold only read-only configuration, so they are
/// `Send + Sync` and can be cloned into loader workers.
pub trait Dataset: Send + Sync {
    /// What `get` returns for one index.
    type Item;

    /// Total number of samples; valid indices are `0..len()`.
    fn len(&self) -> usize;

    /// Loads sample `index`. Out-of-range indices are an error, never a
    /// default sample.
    fn get(&self, index: usize) -> Result<Self::Item>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazily loads every sample in index order.
    fn iter(&self) -> DatasetIter<'_, Self>
    where
        Self: Sized,
    {
        DatasetIter {
            dataset: self,
            next: 0,
        }
    }
}

/// Iterator returned by [`Dataset::iter`].
pub struct DatasetIter<'a, D> {
    dataset: &'a D,
    next: usize,
}

impl<D: Dataset> Iterator for DatasetIter<'_, D> {
    type Item = Result<D::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.dataset.len() {
            return None;
        }
        let item = self.dataset.get(self.next);
        self.next += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.dataset.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

/// Decodes samples from disk and runs them through a [`TransformChain`].
///
/// This is the surface a training loop consumes: `length()` and
/// `item(i) -> (image, mask)`, with `image` a `Float` tensor `[3, H, W]` and
/// `mask` an `Int64` tensor `[H, W]`. A failed lookup returns an error and
/// never a partially transformed sample; batching, skipping and retrying are
/// left to the caller.
///
/// # Example
/// ```ignore
/// let config = PipelineConfig::builder()
///     .manifest("image_class_path.csv")
///     .build();
/// let dataset = SegmentationDataset::from_config(&config)?;
/// let (image, mask) = dataset.item(0)?;
/// assert_eq!(image.size(), vec![3, 256, 320]);
/// ```
#[derive(Debug, Clone)]
pub struct SegmentationDataset {
    source: SampleSource,
    chain: TransformChain,
}

impl SegmentationDataset {
    /// Pairs a source with a chain. The chain must end in the tensor phase,
    /// i.e. contain a `ToTensor` stage.
    pub fn new(source: SampleSource, chain: TransformChain) -> Result<Self> {
        if chain.output_phase() != Phase::Tensor {
            return Err(PipelineError::config(
                "a dataset chain must produce tensors; include the to_tensor stage",
            )
            .into());
        }
        debug!(
            samples = source.size(),
            stages = chain.stages().len(),
            "built segmentation dataset"
        );
        Ok(Self { source, chain })
    }

    /// Loads the manifest and builds the chain described by `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let manifest = Manifest::load(&config.manifest.path, &config.manifest.options)?;
        let source = SampleSource::new(manifest, LoadLabelMask::new(config.mask_key.clone()));
        let chain = config.transform_chain()?;
        Self::new(source, chain)
    }

    pub fn source(&self) -> &SampleSource {
        &self.source
    }

    pub fn chain(&self) -> &TransformChain {
        &self.chain
    }

    pub fn length(&self) -> usize {
        self.source.size()
    }

    /// Loads and transforms sample `index`.
    pub fn sample(&self, index: usize) -> Result<TensorSample> {
        let raw = self.source.get(index)?;
        self.chain
            .run(raw)
            .and_then(|sample| sample.into_tensor())
            .with_context(|| format!("Failed to transform sample {index}"))
    }

    /// Loads and transforms sample `index`, returning `(image, mask)`.
    pub fn item(&self, index: usize) -> Result<(Tensor, Tensor)> {
        self.sample(index).map(TensorSample::into_parts)
    }
}

impl Dataset for SegmentationDataset {
    type Item = TensorSample;

    fn len(&self) -> usize {
        self.length()
    }

    fn get(&self, index: usize) -> Result<TensorSample> {
        self.sample(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::ManifestEntry;
    use crate::transforms::vision::{CenterCrop, ToTensor};
    use image::{Rgb, RgbImage};
    use safetensors::tensor::{Dtype, TensorView};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Writes `n` 6x8 samples; sample `i` has pixel value `i * 10` and label `i`.
    fn make_source(dir: &TempDir, n: usize) -> SampleSource {
        let entries = (0..n)
            .map(|i| {
                let image_path = dir.path().join(format!("{i}.png"));
                RgbImage::from_pixel(8, 6, Rgb([(i * 10) as u8; 3]))
                    .save(&image_path)
                    .unwrap();

                let labels = vec![i as u8; 48];
                let view = TensorView::new(Dtype::U8, vec![6, 8], &labels).unwrap();
                let mask_path = dir.path().join(format!("{i}.safetensors"));
                std::fs::write(
                    &mask_path,
                    safetensors::serialize([("gt_label", view)], &None).unwrap(),
                )
                .unwrap();
                ManifestEntry {
                    image_path,
                    mask_path,
                }
            })
            .collect();
        SampleSource::new(Manifest::new(entries), LoadLabelMask::default())
    }

    #[test]
    fn test_dataset_item_shapes() -> Result<()> {
        let dir = TempDir::new()?;
        let chain = TransformChain::standard(CenterCrop::new(4, 4)?, Default::default());
        let dataset = SegmentationDataset::new(make_source(&dir, 2), chain)?;

        assert_eq!(dataset.length(), 2);
        let (image, mask) = dataset.item(1)?;
        assert_eq!(image.size(), vec![3, 4, 4]);
        assert_eq!(mask.size(), vec![4, 4]);
        assert_eq!(mask.int64_value(&[0, 0]), 1);
        Ok(())
    }

    #[test]
    fn test_dataset_index_equal_to_length() -> Result<()> {
        let dir = TempDir::new()?;
        let dataset = SegmentationDataset::new(make_source(&dir, 2), TransformChain::default())?;

        let err = dataset.item(dataset.length()).unwrap_err();
        assert!(matches!(
            PipelineError::classify(&err),
            Some(PipelineError::Index { index: 2, len: 2 })
        ));
        Ok(())
    }

    #[test]
    fn test_dataset_requires_tensor_chain() -> Result<()> {
        let dir = TempDir::new()?;
        let crop_only = TransformChain::new(vec![CenterCrop::new(4, 4)?.into()])?;
        let err = SegmentationDataset::new(make_source(&dir, 1), crop_only).unwrap_err();

        assert!(matches!(
            PipelineError::classify(&err),
            Some(PipelineError::Config { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_dataset_iter_in_order() -> Result<()> {
        let dir = TempDir::new()?;
        let chain = TransformChain::new(vec![ToTensor.into()])?;
        let dataset = SegmentationDataset::new(make_source(&dir, 3), chain)?;

        let labels: Vec<i64> = dataset
            .iter()
            .map(|sample| sample.map(|s| s.mask.int64_value(&[0, 0])))
            .collect::<Result<_>>()?;
        assert_eq!(labels, vec![0, 1, 2]);
        assert_eq!(dataset.iter().size_hint(), (3, Some(3)));
        Ok(())
    }

    #[test]
    fn test_dataset_concurrent_clones() -> Result<()> {
        let dir = TempDir::new()?;
        let chain = TransformChain::new(vec![ToTensor.into()])?;
        let dataset = Arc::new(SegmentationDataset::new(make_source(&dir, 4), chain)?);

        let threads: Vec<_> = (0..4)
            .map(|worker| {
                let dataset = (*dataset).clone();
                std::thread::spawn(move || {
                    let (_, mask) = dataset.item(worker).unwrap();
                    mask.int64_value(&[5, 7])
                })
            })
            .collect();

        let labels: Vec<i64> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert_eq!(labels, vec![0, 1, 2, 3]);
        Ok(())
    }
}
