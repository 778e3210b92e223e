pub mod aligner;
pub mod cascade;
pub mod composite;
pub mod observer;
pub mod types;

pub use aligner::{align_images, Aligner};
pub use cascade::{Cascade, CascadeContext, CascadeOutcome, CascadeStep};
pub use composite::{compose, Placement};
pub use observer::{FanOutObserver, RecordingObserver, StrategyObserver, TracingObserver};
pub use types::*;
