pub mod label_mask;
mod level5;
pub mod manifest;

pub use label_mask::{LoadLabelMask, MaskFormat, DEFAULT_MASK_KEY};
pub use manifest::{Manifest, ManifestEntry, ManifestOptions};
