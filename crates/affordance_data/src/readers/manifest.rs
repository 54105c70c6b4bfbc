use crate::error::PipelineError;
use anyhow::Result;
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::ops::Index;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// One row of the manifest: where a sample's image and label mask live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub image_path: PathBuf,
    pub mask_path: PathBuf,
}

/// How to read a manifest file.
///
/// Column 0 holds the image path and column 1 the mask path; any further
/// columns are ignored. By default the first row is a header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestOptions {
    pub has_headers: bool,
    pub delimiter: char,
    /// Relative paths in the manifest are joined onto this directory.
    /// When unset they are used as written.
    pub base_dir: Option<PathBuf>,
}

impl Default for ManifestOptions {
    fn default() -> Self {
        Self {
            has_headers: true,
            delimiter: ',',
            base_dir: None,
        }
    }
}

/// The ordered, immutable list of samples.
///
/// Rows keep their file order, so index `i` always names the same pair for
/// a given manifest. Cloning shares the rows (`Arc<[ManifestEntry]>`), which
/// lets every loader worker hold its own handle without copying.
///
/// # Example
/// ```ignore
/// let manifest = Manifest::load("image_class_path.csv", &ManifestOptions::default())?;
/// println!("{} samples, first image {:?}", manifest.len(), manifest[0].image_path);
/// ```
#[derive(Debug, Clone)]
pub struct Manifest {
    entries: Arc<[ManifestEntry]>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self {
            entries: entries.into(),
        }
    }

    /// Reads and validates every row of the manifest at `path`.
    pub fn load(path: impl AsRef<Path>, options: &ManifestOptions) -> Result<Self> {
        let path = path.as_ref();
        let manifest_error = |row: Option<usize>, reason: String| PipelineError::Manifest {
            path: path.to_path_buf(),
            row,
            reason,
        };

        let delimiter = u8::try_from(options.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                manifest_error(
                    None,
                    format!("delimiter {:?} is not a single ASCII byte", options.delimiter),
                )
            })?;

        let mut reader = ReaderBuilder::new()
            .has_headers(options.has_headers)
            .delimiter(delimiter)
            .flexible(true)
            .from_path(path)
            .map_err(|e| manifest_error(None, format!("cannot open manifest: {e}")))?;

        let mut entries = Vec::new();
        for record in reader.records() {
            // 1-based file line, so blank lines and the header are counted.
            let record = record.map_err(|e| {
                let line = e.position().map(|p| p.line() as usize);
                manifest_error(line, e.to_string())
            })?;
            let row = record.position().map(|p| p.line() as usize);

            let image = record.get(0).map(str::trim).unwrap_or_default();
            let mask = record.get(1).map(str::trim).unwrap_or_default();
            if image.is_empty() || mask.is_empty() {
                return Err(manifest_error(
                    row,
                    format!(
                        "expected image and mask paths in the first two columns, got {} field(s)",
                        record.len()
                    ),
                )
                .into());
            }

            entries.push(ManifestEntry {
                image_path: resolve(options.base_dir.as_deref(), image),
                mask_path: resolve(options.base_dir.as_deref(), mask),
            });
        }

        if entries.is_empty() {
            warn!(manifest = %path.display(), "manifest contains no samples");
        } else {
            info!(manifest = %path.display(), samples = entries.len(), "loaded manifest");
        }
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ManifestEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter()
    }
}

impl Index<usize> for Manifest {
    type Output = ManifestEntry;

    fn index(&self, index: usize) -> &ManifestEntry {
        &self.entries[index]
    }
}

fn resolve(base_dir: Option<&Path>, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw);
    match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path,
    }
}
