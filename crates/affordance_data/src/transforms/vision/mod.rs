//! src/transforms/vision/mod.rs
//!
//! Paired image / label-mask transforms.
//!
//! ```text
//! transforms/vision/
//! ├── geometric.rs     → CenterCrop (image and mask share one window)
//! ├── conversion.rs    → ToTensor (pixels → [3, H, W] f32, mask → [H, W] i64)
//! ├── photometric.rs   → Normalize (image channels only)
//! └── io.rs            → LoadImage (file → RGB8)
//! ```
//!
//! The three sample stages compose in exactly one order:
//!
//! ```ignore
//! use crate::transforms::Transform;
//! use crate::transforms::vision::{CenterCrop, Normalize, ToTensor};
//!
//! let pipeline = CenterCrop::new(256, 320)?
//!     .then(ToTensor)
//!     .then(Normalize::part_affordance());
//! ```

pub mod conversion;
pub mod geometric;
pub mod io;
pub mod photometric;

pub use conversion::ToTensor;
pub use geometric::CenterCrop;
pub use io::LoadImage;
pub use photometric::{Normalize, PART_AFFORDANCE_MEAN, PART_AFFORDANCE_STD};
