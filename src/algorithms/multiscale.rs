//! Multi-scale search: a brute-force grid at full resolution plus subimage
//! search on downsampled copies.

use super::subimage;
use crate::config::MultiScaleConfig;
use crate::engine::{ImageEngine, TemplateMatch};
use crate::pipeline::{ImageSize, Offset, StrategyId, StrategyResult};
use crate::Result;

pub fn multi_scale<E: ImageEngine>(
    engine: &E,
    config: &MultiScaleConfig,
    reference: &E::Image,
    target: &E::Image,
) -> Result<StrategyResult> {
    let mut best: Option<TemplateMatch> = None;

    for &scale in &config.scales {
        let attempt = if (scale - 1.0).abs() < f64::EPSILON {
            grid_search(engine, config, reference, target)
        } else {
            scaled_search(engine, scale, reference, target).map(Some)
        };

        match attempt {
            Ok(Some(found)) => {
                tracing::debug!(
                    scale = scale,
                    score = found.score,
                    offset = %found.offset,
                    "Scale searched"
                );
                if best.map_or(true, |b| found.score < b.score) {
                    best = Some(found);
                }
            }
            Ok(None) => tracing::debug!(scale = scale, "Scale not applicable"),
            Err(e) => tracing::debug!(scale = scale, error = %e, "Scale search failed"),
        }
    }

    let found = best.ok_or_else(|| anyhow::anyhow!("No scale produced a match"))?;
    Ok(StrategyResult::new(
        StrategyId::MultiScale,
        found.score,
        found.offset,
    ))
}

/// Whether both axes are within `min_ratio` of each other.
pub fn sizes_comparable(a: ImageSize, b: ImageSize, min_ratio: f64) -> bool {
    fn ratio(x: u32, y: u32) -> f64 {
        let (lo, hi) = (x.min(y), x.max(y));
        if hi == 0 {
            return 0.0;
        }
        lo as f64 / hi as f64
    }
    ratio(a.width, b.width) >= min_ratio && ratio(a.height, b.height) >= min_ratio
}

/// Candidate offsets on one axis: zero first, then alternating outwards.
pub fn grid_axis(range: i32, step: u32) -> Vec<i32> {
    let step = step.max(1) as i32;
    let mut values = vec![0];
    let mut distance = step;
    while distance <= range {
        values.push(-distance);
        values.push(distance);
        distance += step;
    }
    values
}

/// Composites the target at every grid offset and keeps the lowest RMSE.
///
/// `Ok(None)` when the images are too different in size for a grid to make sense.
fn grid_search<E: ImageEngine>(
    engine: &E,
    config: &MultiScaleConfig,
    reference: &E::Image,
    target: &E::Image,
) -> Result<Option<TemplateMatch>> {
    let reference_size = engine.dimensions(reference);
    let target_size = engine.dimensions(target);
    if !sizes_comparable(reference_size, target_size, config.min_size_ratio) {
        return Ok(None);
    }

    let range_x =
        reference_size.width.abs_diff(target_size.width) as i32 + config.grid_margin as i32;
    let range_y =
        reference_size.height.abs_diff(target_size.height) as i32 + config.grid_margin as i32;
    let xs = grid_axis(range_x, config.grid_step);
    let ys = grid_axis(range_y, config.grid_step);

    let mut best: Option<TemplateMatch> = None;
    for &dy in &ys {
        for &dx in &xs {
            let offset = Offset::new(dx, dy);
            let placed = engine.composite(reference_size, target, offset)?;
            let score = engine.rmse(reference, &placed)?;
            if best.map_or(true, |b| score < b.score) {
                best = Some(TemplateMatch { score, offset });
            }
        }
    }
    Ok(best)
}

fn scaled_search<E: ImageEngine>(
    engine: &E,
    scale: f64,
    reference: &E::Image,
    target: &E::Image,
) -> Result<TemplateMatch> {
    let percent = scale * 100.0;
    let reference_small = engine.resize(reference, percent)?;
    let target_small = engine.resize(target, percent)?;
    let found = subimage::either_direction(engine, &reference_small, &target_small)?;
    Ok(TemplateMatch {
        score: found.score,
        offset: found.offset.scaled(1.0 / scale),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_axis_is_symmetric_and_starts_at_zero() {
        assert_eq!(grid_axis(120, 50), vec![0, -50, 50, -100, 100]);
        assert_eq!(grid_axis(200, 50).len(), 9);
        assert_eq!(grid_axis(10, 50), vec![0]);
    }

    #[test]
    fn test_size_ratio_gate() {
        let a = ImageSize::new(1000, 800);
        assert!(sizes_comparable(a, ImageSize::new(700, 560), 0.7));
        assert!(!sizes_comparable(a, ImageSize::new(690, 800), 0.7));
        assert!(!sizes_comparable(a, ImageSize::new(1000, 500), 0.7));
    }
}
