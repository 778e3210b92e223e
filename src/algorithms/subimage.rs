//! Direct and reverse subimage search.

use crate::engine::{ImageEngine, TemplateMatch};
use crate::pipeline::{StrategyId, StrategyResult};
use crate::Result;

/// Finds the target inside the reference.
pub fn target_in_reference<E: ImageEngine>(
    engine: &E,
    reference: &E::Image,
    target: &E::Image,
) -> Result<StrategyResult> {
    let found = locate(engine, reference, target)?;
    Ok(StrategyResult::new(
        StrategyId::TargetInReference,
        found.score,
        found.offset,
    ))
}

/// Finds the reference inside the target.
///
/// The match position says where the reference sits in the target, so the
/// target has to move the opposite way; the returned offset is already negated.
pub fn reference_in_target<E: ImageEngine>(
    engine: &E,
    reference: &E::Image,
    target: &E::Image,
) -> Result<StrategyResult> {
    let found = locate(engine, target, reference)?;
    Ok(StrategyResult::new(
        StrategyId::ReferenceInTarget,
        found.score,
        found.offset.inverted(),
    ))
}

/// Direct search with a reverse fallback, for derived image pairs.
///
/// The result is expressed as target placement on the reference, like the
/// cascade's own direct/reverse steps.
pub fn either_direction<E: ImageEngine>(
    engine: &E,
    reference: &E::Image,
    target: &E::Image,
) -> Result<TemplateMatch> {
    match locate(engine, reference, target) {
        Ok(found) => Ok(found),
        Err(direct_err) => {
            tracing::trace!(error = %direct_err, "Direct search failed, trying reverse");
            let found = locate(engine, target, reference)?;
            Ok(TemplateMatch {
                score: found.score,
                offset: found.offset.inverted(),
            })
        }
    }
}

fn locate<E: ImageEngine>(
    engine: &E,
    haystack: &E::Image,
    needle: &E::Image,
) -> Result<TemplateMatch> {
    let (h, n) = (engine.dimensions(haystack), engine.dimensions(needle));
    if !n.fits_within(h) {
        return Err(anyhow::anyhow!("{} does not fit inside {}", n, h));
    }
    let found = engine.template_match(haystack, needle)?;
    if !found.score.is_finite() || found.score < 0.0 {
        return Err(anyhow::anyhow!("Unusable match score: {}", found.score));
    }
    Ok(found)
}
