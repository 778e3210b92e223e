//! Centre-crop comparison for images that share a large middle region.

use crate::config::CropConfig;
use crate::engine::ImageEngine;
use crate::pipeline::{ImageSize, Offset, Region, StrategyId, StrategyResult};
use crate::Result;

/// Compares equal-size centre crops and reports the best one.
///
/// The offset is `target crop origin - reference crop origin` of the winning
/// crop size. A crop size that fails is skipped; the loop moves on.
pub fn cropped_region<E: ImageEngine>(
    engine: &E,
    config: &CropConfig,
    reference: &E::Image,
    target: &E::Image,
) -> Result<StrategyResult> {
    let reference_size = engine.dimensions(reference);
    let target_size = engine.dimensions(target);

    let mut best: Option<(f64, Offset)> = None;
    for &[width, height] in &config.sizes {
        let crop = ImageSize::new(width, height);
        if !crop.fits_within(reference_size) || !crop.fits_within(target_size) {
            tracing::trace!(crop = %crop, "Crop larger than an input, skipping");
            continue;
        }

        let reference_rect = Region::centered(reference_size, crop);
        let target_rect = Region::centered(target_size, crop);
        let score = match compare_crops(engine, reference, target, reference_rect, target_rect) {
            Ok(score) => score,
            Err(e) => {
                tracing::debug!(crop = %crop, error = %e, "Crop comparison failed");
                continue;
            }
        };

        let offset = Offset::new(
            target_rect.x - reference_rect.x,
            target_rect.y - reference_rect.y,
        );
        tracing::trace!(crop = %crop, score = score, offset = %offset, "Crop compared");
        if best.map_or(true, |(best_score, _)| score < best_score) {
            best = Some((score, offset));
        }
    }

    let (score, offset) =
        best.ok_or_else(|| anyhow::anyhow!("No crop size could be compared"))?;
    Ok(StrategyResult::new(StrategyId::CroppedRegion, score, offset))
}

fn compare_crops<E: ImageEngine>(
    engine: &E,
    reference: &E::Image,
    target: &E::Image,
    reference_rect: Region,
    target_rect: Region,
) -> Result<f64> {
    let reference_crop = engine.crop(reference, reference_rect)?;
    let target_crop = engine.crop(target, target_rect)?;
    engine.rmse(&reference_crop, &target_crop)
}
