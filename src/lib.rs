pub mod algorithms;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod utils;

pub use batch::{align_batch, AlignJob, BatchEntry, BatchReport};
pub use config::Config;
pub use engine::{FeatureEngine, ImageEngine, OpenCvEngine};
pub use error::AlignmentError;
pub use pipeline::{
    align_images, AlignMethod, AlignOptions, Aligner, AlignmentOutcome, DetectorKind, Offset,
    Region, StrategyId,
};

pub type Result<T> = anyhow::Result<T>;
