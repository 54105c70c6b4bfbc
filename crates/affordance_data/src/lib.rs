//! Loading and preprocessing of paired image / label-mask samples for
//! semantic segmentation training.
//!
//! ```text
//! manifest row i ──► SampleSource::get(i) ──► RawSample { RGB8, LabelMask }
//!                                                   │
//!              CenterCrop ──► ToTensor ──► Normalize  (TransformChain)
//!                                                   │
//!                              (image [3, H, W] f32, mask [H, W] i64)
//! ```
//!
//! [`SegmentationDataset`] ties the pieces together and exposes
//! `length()` / `item(i)`; every failure carries a [`PipelineError`] at its
//! root.

pub mod config;
pub mod dataset;
pub mod error;
pub mod readers;
pub mod sample;
pub mod source;
pub mod stats;
pub mod transforms;

pub use config::PipelineConfig;
pub use dataset::{Dataset, SegmentationDataset};
pub use error::PipelineError;
pub use sample::{LabelMask, Phase, RawSample, SegmentationSample, TensorSample};
pub use source::SampleSource;
pub use stats::ChannelStats;
pub use transforms::{Transform, TransformChain};
