use super::level5;
use crate::error::PipelineError;
use crate::sample::LabelMask;
use crate::transforms::Transform;
use anyhow::Result;
use bytemuck::{pod_read_unaligned, Pod};
use matfile::{MatFile, NumericData};
use safetensors::{tensor::Dtype, SafeTensors};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the label array inside part-affordance mask files.
pub const DEFAULT_MASK_KEY: &str = "gt_label";

/// Container formats a label mask can be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskFormat {
    /// MATLAB level-5 MAT-file. Arrays are column-major on disk.
    Mat,
    /// safetensors file. Arrays are row-major on disk.
    Safetensors,
}

impl MaskFormat {
    /// Picks the container from the file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "mat" => Some(Self::Mat),
            "safetensors" => Some(Self::Safetensors),
            _ => None,
        }
    }
}

/// Reads the 2-D label grid stored under a named key in a mask file.
///
/// Integer arrays of any width are widened to `i64`. Floating-point arrays
/// are accepted only if every value is integral, since labels are class ids
/// and must round-trip exactly. A missing key, a non 2-D array, or any other
/// layout is a [`PipelineError::Decode`].
///
/// # Example
/// ```ignore
/// let loader = LoadLabelMask::new("gt_label");
/// let mask = loader.load(Path::new("labels/0001_label.mat"))?;
/// ```
#[derive(Debug, Clone)]
pub struct LoadLabelMask {
    key: String,
}

impl LoadLabelMask {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn load(&self, path: &Path) -> Result<LabelMask> {
        let format = MaskFormat::from_path(path).ok_or_else(|| {
            PipelineError::decode(
                path,
                "unsupported label container (expected .mat or .safetensors)",
            )
        })?;
        let bytes = fs::read(path)
            .map_err(|e| PipelineError::decode(path, format!("cannot read label file: {e}")))?;

        match format {
            MaskFormat::Mat => self.decode_mat(path, &bytes),
            MaskFormat::Safetensors => self.decode_safetensors(path, &bytes),
        }
    }

    fn decode_mat(&self, path: &Path, bytes: &[u8]) -> Result<LabelMask> {
        let mat = match MatFile::parse(bytes) {
            Ok(mat) => mat,
            // matfile rejects int32-class arrays; read those directly.
            Err(parse_err) => {
                return match level5::find_int32_array(bytes, &self.key) {
                    Ok(Some(array)) => {
                        self.mask_from_column_major(path, array.height, array.width, array.values)
                    }
                    Ok(None) => Err(PipelineError::decode(
                        path,
                        format!("malformed MAT-file: {parse_err:?}"),
                    )
                    .into()),
                    Err(reason) => Err(PipelineError::decode(path, reason).into()),
                };
            }
        };
        let array = mat.find_by_name(&self.key).ok_or_else(|| {
            PipelineError::decode(path, format!("no `{}` array in MAT-file", self.key))
        })?;

        let (height, width) = match array.size().as_slice() {
            &[height, width] => (height, width),
            other => {
                return Err(PipelineError::decode(
                    path,
                    format!("`{}` must be 2-D, got shape {:?}", self.key, other),
                )
                .into())
            }
        };

        let column_major = match array.data() {
            NumericData::Int8 { real, imag: None } => widen_slice(real),
            NumericData::UInt8 { real, imag: None } => widen_slice(real),
            NumericData::Int16 { real, imag: None } => widen_slice(real),
            NumericData::UInt16 { real, imag: None } => widen_slice(real),
            NumericData::Int32 { real, imag: None } => widen_slice(real),
            NumericData::UInt32 { real, imag: None } => widen_slice(real),
            NumericData::Int64 { real, imag: None } => real.clone(),
            NumericData::UInt64 { real, imag: None } => unsigned_labels(real.iter().copied())
                .map_err(|reason| PipelineError::decode(path, reason))?,
            NumericData::Single { real, imag: None } => {
                integral_labels(real.iter().map(|&v| v as f64))
                    .map_err(|reason| PipelineError::decode(path, reason))?
            }
            NumericData::Double { real, imag: None } => integral_labels(real.iter().copied())
                .map_err(|reason| PipelineError::decode(path, reason))?,
            _ => {
                return Err(PipelineError::decode(
                    path,
                    format!("`{}` must be a real numeric array", self.key),
                )
                .into())
            }
        };

        self.mask_from_column_major(path, height, width, column_major)
    }

    fn mask_from_column_major(
        &self,
        path: &Path,
        height: usize,
        width: usize,
        column_major: Vec<i64>,
    ) -> Result<LabelMask> {
        let labels = transpose_column_major(column_major, height, width);
        LabelMask::new(height, width, labels).map_err(|e| {
            PipelineError::decode(path, format!("`{}` has inconsistent size: {e}", self.key)).into()
        })
    }

    fn decode_safetensors(&self, path: &Path, bytes: &[u8]) -> Result<LabelMask> {
        let tensors = SafeTensors::deserialize(bytes)
            .map_err(|e| PipelineError::decode(path, format!("malformed safetensors: {e}")))?;
        let view = tensors.tensor(&self.key).map_err(|e| {
            PipelineError::decode(path, format!("no `{}` tensor: {e}", self.key))
        })?;

        let (height, width) = match view.shape() {
            &[height, width] => (height, width),
            other => {
                return Err(PipelineError::decode(
                    path,
                    format!("`{}` must be 2-D, got shape {:?}", self.key, other),
                )
                .into())
            }
        };

        let raw = view.data();
        let labels = match view.dtype() {
            Dtype::BOOL | Dtype::U8 => widen::<u8>(raw),
            Dtype::I8 => widen::<i8>(raw),
            Dtype::I16 => widen::<i16>(raw),
            Dtype::U16 => widen::<u16>(raw),
            Dtype::I32 => widen::<i32>(raw),
            Dtype::U32 => widen::<u32>(raw),
            Dtype::I64 => widen::<i64>(raw),
            Dtype::U64 => unsigned_labels(raw.chunks_exact(8).map(pod_read_unaligned::<u64>))
                .map_err(|reason| PipelineError::decode(path, reason))?,
            Dtype::F32 => integral_labels(
                raw.chunks_exact(4)
                    .map(|c| pod_read_unaligned::<f32>(c) as f64),
            )
            .map_err(|reason| PipelineError::decode(path, reason))?,
            Dtype::F64 => integral_labels(raw.chunks_exact(8).map(pod_read_unaligned::<f64>))
                .map_err(|reason| PipelineError::decode(path, reason))?,
            other => {
                return Err(PipelineError::decode(
                    path,
                    format!(
                        "unsupported label dtype {:?}; store labels as integers",
                        other
                    ),
                )
                .into())
            }
        };

        LabelMask::new(height, width, labels).map_err(|e| {
            PipelineError::decode(path, format!("`{}` has inconsistent size: {e}", self.key)).into()
        })
    }
}

impl Default for LoadLabelMask {
    fn default() -> Self {
        Self::new(DEFAULT_MASK_KEY)
    }
}

impl Transform<PathBuf, LabelMask> for LoadLabelMask {
    fn apply(&self, path: PathBuf) -> Result<LabelMask> {
        self.load(&path)
    }
}

/// Reads little-endian elements of type `T` out of an unaligned byte buffer.
fn widen<T: Pod + Into<i64>>(raw: &[u8]) -> Vec<i64> {
    raw.chunks_exact(std::mem::size_of::<T>())
        .map(|chunk| pod_read_unaligned::<T>(chunk).into())
        .collect()
}

fn widen_slice<T: Copy + Into<i64>>(values: &[T]) -> Vec<i64> {
    values.iter().map(|&v| v.into()).collect()
}

/// Converts float-stored labels, rejecting any value that is not a whole number.
fn integral_labels(values: impl Iterator<Item = f64>) -> Result<Vec<i64>, String> {
    values
        .map(|v| {
            if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                Ok(v as i64)
            } else {
                Err(format!("label value {v} is not an integer"))
            }
        })
        .collect()
}

/// Converts unsigned labels, rejecting values that do not fit in `i64`.
fn unsigned_labels(values: impl Iterator<Item = u64>) -> Result<Vec<i64>, String> {
    values
        .map(|v| i64::try_from(v).map_err(|_| format!("label {v} exceeds i64")))
        .collect()
}

fn transpose_column_major(values: Vec<i64>, height: usize, width: usize) -> Vec<i64> {
    if height.checked_mul(width) != Some(values.len()) {
        // Let LabelMask::new report the size mismatch.
        return values;
    }
    let mut row_major = Vec::with_capacity(values.len());
    for y in 0..height {
        for x in 0..width {
            row_major.push(values[x * height + y]);
        }
    }
    row_major
}
