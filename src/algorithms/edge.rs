//! Edge-map search, robust to colour and theme changes.

use super::subimage;
use crate::config::EdgeConfig;
use crate::engine::ImageEngine;
use crate::pipeline::{StrategyId, StrategyResult};
use crate::Result;

/// Matches downsampled edge maps and scales the offset back up.
///
/// Precision is limited to the downsample factor.
pub fn edge_based<E: ImageEngine>(
    engine: &E,
    config: &EdgeConfig,
    reference: &E::Image,
    target: &E::Image,
) -> Result<StrategyResult> {
    let factor = config.downsample_factor.max(1) as f64;
    let percent = 100.0 / factor;

    let reference_small = {
        let edges = engine.edge_detect(reference)?;
        engine.resize(&edges, percent)?
    };
    let target_small = {
        let edges = engine.edge_detect(target)?;
        engine.resize(&edges, percent)?
    };

    tracing::debug!(
        reference = %engine.dimensions(&reference_small),
        target = %engine.dimensions(&target_small),
        factor = factor,
        "Searching downsampled edge maps"
    );

    let found = subimage::either_direction(engine, &reference_small, &target_small)?;
    Ok(StrategyResult::new(
        StrategyId::EdgeBased,
        found.score,
        found.offset.scaled(factor),
    ))
}
