//! Last-resort correlation check.
//!
//! Not a registration method: the offset is always zero. The score only says
//! how similar the two images are when left where they are.

use crate::engine::ImageEngine;
use crate::pipeline::{Offset, StrategyId, StrategyResult};
use crate::Result;

pub fn correlation_fallback<E: ImageEngine>(
    engine: &E,
    reference: &E::Image,
    target: &E::Image,
) -> Result<StrategyResult> {
    let canvas = engine.dimensions(reference).max(engine.dimensions(target));
    let reference_gray = engine.grayscale_and_pad(reference, canvas)?;
    let target_gray = engine.grayscale_and_pad(target, canvas)?;
    let correlation = engine.normalized_cross_correlation(&reference_gray, &target_gray)?;
    tracing::debug!(correlation = correlation, canvas = %canvas, "Correlation computed");

    Ok(StrategyResult::new(
        StrategyId::PhaseCorrelation,
        (1.0 - correlation).max(0.0),
        Offset::ZERO,
    ))
}
