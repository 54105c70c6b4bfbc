//! src/stats.rs
//!
//! Offline computation of the per-channel normalization constants.
//!
//! The statistics are taken over cropped images scaled to [0, 1], i.e. the
//! output of `[CenterCrop, ToTensor]`. For every image the per-channel mean
//! and unbiased standard deviation are computed over its pixels; the dataset
//! statistics are the averages of those values over all images.
//!
//! ```ignore
//! let config = PipelineConfig::builder().manifest("train.csv").build();
//! let stats = ChannelStats::compute_from_config(&config, 4)?;
//! let normalize = stats.to_normalize()?;
//! ```
//!
//! With `num_workers > 0` images are decoded in parallel, using at most one
//! worker per sample. Each worker owns a clone of the dataset and pulls
//! indices from a shared channel. Results are summed in index order, so the
//! outcome does not depend on the worker count.

use crate::config::PipelineConfig;
use crate::dataset::{Dataset, SegmentationDataset};
use crate::error::PipelineError;
use crate::readers::{LoadLabelMask, Manifest};
use crate::sample::TensorSample;
use crate::source::SampleSource;
use crate::transforms::vision::{Normalize, ToTensor};
use crate::transforms::TransformChain;
use anyhow::{anyhow, ensure, Context, Result};
use crossbeam_channel::{bounded, unbounded};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tch::{Kind, Tensor};
use tracing::{debug, info};

/// Per-channel mean and standard deviation of one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageMoments {
    pub mean: [f64; 3],
    pub std: [f64; 3],
}

impl ImageMoments {
    /// Moments of a `[3, H, W]` image tensor.
    pub fn of(image: &Tensor) -> Result<Self> {
        let (channels, height, width) = image.size3().map_err(|_| {
            PipelineError::dimension(format!("expected a [3, H, W] image, got {:?}", image.size()))
        })?;
        ensure!(
            channels == 3,
            PipelineError::dimension(format!("expected 3 channels, got {}", channels))
        );
        ensure!(
            height * width > 1,
            PipelineError::dimension("standard deviation needs at least two pixels")
        );

        let image = image.to_kind(Kind::Double);
        let mut moments = Self {
            mean: [0.0; 3],
            std: [0.0; 3],
        };
        for c in 0..3 {
            let channel = image.select(0, c as i64);
            moments.mean[c] = channel.mean(Kind::Double).double_value(&[]);
            moments.std[c] = channel.std(true).double_value(&[]);
        }
        Ok(moments)
    }
}

/// Running sums of [`ImageMoments`].
#[derive(Debug, Clone, Default)]
pub struct ChannelStatsAccumulator {
    mean_sum: [f64; 3],
    std_sum: [f64; 3],
    count: usize,
}

impl ChannelStatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, moments: &ImageMoments) {
        for c in 0..3 {
            self.mean_sum[c] += moments.mean[c];
            self.std_sum[c] += moments.std[c];
        }
        self.count += 1;
    }

    pub fn add_image(&mut self, image: &Tensor) -> Result<()> {
        self.add(&ImageMoments::of(image)?);
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn finish(&self) -> Result<ChannelStats> {
        ensure!(
            self.count > 0,
            PipelineError::config("cannot compute channel statistics of an empty dataset")
        );
        let n = self.count as f64;
        Ok(ChannelStats {
            mean: self.mean_sum.map(|sum| sum / n),
            std: self.std_sum.map(|sum| sum / n),
            samples: self.count,
        })
    }
}

/// Dataset-level normalization constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: [f64; 3],
    pub std: [f64; 3],
    /// Number of images the statistics were taken over.
    pub samples: usize,
}

impl ChannelStats {
    /// Computes statistics over every image of `dataset`.
    ///
    /// `dataset` should produce cropped, unnormalized tensors. The first
    /// failing sample aborts the computation.
    pub fn compute<D>(dataset: &D, num_workers: usize) -> Result<Self>
    where
        D: Dataset<Item = TensorSample> + Clone,
    {
        let stats = if num_workers == 0 {
            Self::compute_sequential(dataset)?
        } else {
            Self::compute_parallel(dataset, num_workers)?
        };
        info!(
            samples = stats.samples,
            mean = ?stats.mean,
            std = ?stats.std,
            "computed channel statistics"
        );
        Ok(stats)
    }

    /// Builds a `[CenterCrop, ToTensor]` dataset from `config` and computes
    /// its statistics. The configured stages and normalization are ignored.
    pub fn compute_from_config(config: &PipelineConfig, num_workers: usize) -> Result<Self> {
        let manifest = Manifest::load(&config.manifest.path, &config.manifest.options)?;
        let source = SampleSource::new(manifest, LoadLabelMask::new(config.mask_key.clone()));
        let chain = TransformChain::new(vec![config.center_crop()?.into(), ToTensor.into()])?;
        let dataset = SegmentationDataset::new(source, chain)?;
        Self::compute(&dataset, num_workers)
    }

    /// Normalization stage using these statistics.
    pub fn to_normalize(&self) -> Result<Normalize> {
        Normalize::new(
            self.mean.map(|m| m as f32),
            self.std.map(|s| s as f32),
        )
    }

    fn compute_sequential<D>(dataset: &D) -> Result<Self>
    where
        D: Dataset<Item = TensorSample>,
    {
        let mut acc = ChannelStatsAccumulator::new();
        for index in 0..dataset.len() {
            let sample = dataset.get(index)?;
            acc.add_image(&sample.image)
                .with_context(|| format!("Failed to measure sample {index}"))?;
        }
        acc.finish()
    }

    fn compute_parallel<D>(dataset: &D, num_workers: usize) -> Result<Self>
    where
        D: Dataset<Item = TensorSample> + Clone,
    {
        let len = dataset.len();
        // No more workers than samples.
        let num_workers = num_workers.min(len).max(1);
        let (task_tx, task_rx) = unbounded::<usize>();
        let (result_tx, result_rx) = bounded::<(usize, Result<ImageMoments>)>(num_workers * 2);
        let shutdown = AtomicBool::new(false);

        for index in 0..len {
            task_tx
                .send(index)
                .map_err(|_| anyhow!("statistics task queue closed early"))?;
        }
        drop(task_tx);

        let per_index = thread::scope(|scope| -> Result<Vec<Option<ImageMoments>>> {
            // Owned by this closure: dropping it on early return unblocks
            // workers waiting to send.
            let result_rx = result_rx;
            for worker_id in 0..num_workers {
                let dataset = dataset.clone();
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let shutdown = &shutdown;
                scope.spawn(move || {
                    debug!(worker_id, "statistics worker started");
                    for index in task_rx.iter() {
                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }
                        let moments = dataset.get(index).and_then(|sample| {
                            ImageMoments::of(&sample.image)
                                .with_context(|| format!("Failed to measure sample {index}"))
                        });
                        if result_tx.send((index, moments)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            let mut per_index = vec![None; len];
            for (index, moments) in result_rx.iter() {
                match moments {
                    Ok(moments) => per_index[index] = Some(moments),
                    Err(err) => {
                        shutdown.store(true, Ordering::Relaxed);
                        return Err(err);
                    }
                }
            }
            Ok(per_index)
        })?;

        let mut acc = ChannelStatsAccumulator::new();
        for (index, moments) in per_index.into_iter().enumerate() {
            let moments =
                moments.ok_or_else(|| anyhow!("statistics worker dropped sample {index}"))?;
            acc.add(&moments);
        }
        acc.finish()
    }
}
