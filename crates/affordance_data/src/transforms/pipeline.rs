//! src/transforms/pipeline.rs
//!
//! Runtime-configured sample pipeline.
//!
//! `Transform::then` fixes the stage order at compile time. When the stage
//! list comes from configuration instead, [`TransformChain::new`] checks the
//! same ordering rules once, at construction:
//!
//! | Stage        | Rank | Input  | Output |
//! |--------------|------|--------|--------|
//! | `CenterCrop` | 0    | raw    | raw    |
//! | `ToTensor`   | 1    | raw    | tensor |
//! | `Normalize`  | 2    | tensor | tensor |
//!
//! Ranks must strictly increase and every stage must accept the phase the
//! previous one produced. `[CenterCrop, ToTensor]` is a valid subset;
//! `[ToTensor, CenterCrop]`, `[CenterCrop, Normalize]` and repeated stages
//! are not.

use crate::error::PipelineError;
use crate::sample::{Phase, RawSample, SegmentationSample};
use crate::transforms::vision::{CenterCrop, Normalize, ToTensor};
use crate::transforms::Transform;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Names a stage without its parameters. Used in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    CenterCrop,
    ToTensor,
    Normalize,
}

impl StageKind {
    /// The full pipeline, in its only valid order.
    pub const ALL: [StageKind; 3] = [Self::CenterCrop, Self::ToTensor, Self::Normalize];

    fn rank(self) -> u8 {
        match self {
            Self::CenterCrop => 0,
            Self::ToTensor => 1,
            Self::Normalize => 2,
        }
    }

    pub fn input_phase(self) -> Phase {
        match self {
            Self::CenterCrop | Self::ToTensor => Phase::Raw,
            Self::Normalize => Phase::Tensor,
        }
    }

    pub fn output_phase(self) -> Phase {
        match self {
            Self::CenterCrop => Phase::Raw,
            Self::ToTensor | Self::Normalize => Phase::Tensor,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CenterCrop => "center_crop",
            Self::ToTensor => "to_tensor",
            Self::Normalize => "normalize",
        };
        f.write_str(name)
    }
}

/// A configured stage.
#[derive(Debug, Clone)]
pub enum Stage {
    CenterCrop(CenterCrop),
    ToTensor(ToTensor),
    Normalize(Normalize),
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Self::CenterCrop(_) => StageKind::CenterCrop,
            Self::ToTensor(_) => StageKind::ToTensor,
            Self::Normalize(_) => StageKind::Normalize,
        }
    }
}

impl From<CenterCrop> for Stage {
    fn from(crop: CenterCrop) -> Self {
        Self::CenterCrop(crop)
    }
}

impl From<ToTensor> for Stage {
    fn from(to_tensor: ToTensor) -> Self {
        Self::ToTensor(to_tensor)
    }
}

impl From<Normalize> for Stage {
    fn from(norm: Normalize) -> Self {
        Self::Normalize(norm)
    }
}

impl Transform<SegmentationSample, SegmentationSample> for Stage {
    fn apply(&self, sample: SegmentationSample) -> Result<SegmentationSample> {
        match (self, sample) {
            (Self::CenterCrop(crop), SegmentationSample::Raw(raw)) => {
                crop.apply(raw).map(Into::into)
            }
            (Self::ToTensor(to_tensor), SegmentationSample::Raw(raw)) => {
                to_tensor.apply(raw).map(Into::into)
            }
            (Self::Normalize(norm), SegmentationSample::Tensor(tensors)) => {
                norm.apply(tensors).map(Into::into)
            }
            (stage, sample) => Err(PipelineError::config(format!(
                "stage {} cannot run on a {:?} sample",
                stage.kind(),
                sample.phase()
            ))
            .into()),
        }
    }
}

/// An ordered, validated list of stages.
///
/// # Example
/// ```ignore
/// let chain = TransformChain::new(vec![
///     CenterCrop::new(256, 320)?.into(),
///     ToTensor.into(),
///     Normalize::new(mean, std)?.into(),
/// ])?;
/// let tensors = chain.run(raw_sample)?.into_tensor()?;
/// ```
#[derive(Debug, Clone)]
pub struct TransformChain {
    stages: Vec<Stage>,
    output_phase: Phase,
}

impl TransformChain {
    /// Validates the stage order; see the module docs for the rules.
    pub fn new(stages: Vec<Stage>) -> Result<Self> {
        let mut phase = Phase::Raw;
        let mut previous: Option<StageKind> = None;

        for stage in &stages {
            let kind = stage.kind();
            if let Some(prev) = previous {
                if prev.rank() >= kind.rank() {
                    return Err(PipelineError::config(format!(
                        "stage {} cannot follow {}; stages run in the order {}",
                        kind,
                        prev,
                        order_description()
                    ))
                    .into());
                }
            }
            if kind.input_phase() != phase {
                return Err(PipelineError::config(format!(
                    "stage {} needs a {:?} sample but receives {:?}; add {} before it",
                    kind,
                    kind.input_phase(),
                    phase,
                    StageKind::ToTensor
                ))
                .into());
            }
            phase = kind.output_phase();
            previous = Some(kind);
        }

        debug!(
            stages = %stages.iter().map(|s| s.kind().to_string()).collect::<Vec<_>>().join(" -> "),
            "built transform chain"
        );
        Ok(Self {
            stages,
            output_phase: phase,
        })
    }

    /// Crop -> ToTensor -> Normalize.
    pub fn standard(crop: CenterCrop, normalize: Normalize) -> Self {
        Self {
            stages: vec![crop.into(), ToTensor.into(), normalize.into()],
            output_phase: Phase::Tensor,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(Stage::kind).collect()
    }

    /// Phase of the samples this chain returns.
    pub fn output_phase(&self) -> Phase {
        self.output_phase
    }

    /// Runs every stage in order. The first failing stage aborts the run.
    pub fn run(&self, sample: RawSample) -> Result<SegmentationSample> {
        self.stages
            .iter()
            .try_fold(SegmentationSample::Raw(sample), |sample, stage| {
                stage
                    .apply(sample)
                    .with_context(|| format!("stage {} failed", stage.kind()))
            })
    }
}

impl Default for TransformChain {
    fn default() -> Self {
        Self::standard(CenterCrop::default(), Normalize::default())
    }
}

impl Transform<RawSample, SegmentationSample> for TransformChain {
    fn apply(&self, sample: RawSample) -> Result<SegmentationSample> {
        self.run(sample)
    }
}

fn order_description() -> String {
    StageKind::ALL
        .iter()
        .map(StageKind::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
