pub mod core;
pub mod pipeline;
pub mod vision;

pub use core::{Chain, Transform};
pub use pipeline::{Stage, StageKind, TransformChain};
