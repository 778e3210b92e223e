//! Result compositor: writes the target onto a reference-sized canvas at the
//! winning placement and reports the overlap.

use crate::engine::FeatureEngine;
use crate::error::AlignmentError;
use crate::pipeline::{ImageSize, Offset, Region};
use crate::utils::{HomographyMatrix, ScratchFile};
use std::path::Path;

/// How the target is mapped onto the reference canvas.
#[derive(Debug, Clone, Copy)]
pub enum Placement<'a> {
    Translate(Offset),
    Warp {
        homography: &'a HomographyMatrix,
        offset: Offset,
    },
}

impl Placement<'_> {
    /// Translation used for the reported matching region.
    pub fn offset(&self) -> Offset {
        match self {
            Placement::Translate(offset) => *offset,
            Placement::Warp { offset, .. } => *offset,
        }
    }
}

/// Renders the aligned target to `output` and returns the matching region.
///
/// The image is first written to a scratch file next to `output` and renamed
/// into place, so a failed write never leaves a partial file behind.
pub fn compose<E: FeatureEngine>(
    engine: &E,
    reference_size: ImageSize,
    target: &E::Image,
    placement: Placement<'_>,
    output: &Path,
) -> Result<Region, AlignmentError> {
    let target_size = engine.dimensions(target);
    let with_alpha = engine
        .with_opaque_alpha(target)
        .map_err(|e| AlignmentError::composite(output, e))?;

    let aligned = match placement {
        Placement::Translate(offset) => engine.composite(reference_size, &with_alpha, offset),
        Placement::Warp { homography, .. } => {
            engine.warp_perspective(&with_alpha, homography, reference_size)
        }
    }
    .map_err(|e| AlignmentError::composite(output, e))?;

    let scratch = ScratchFile::beside(output);
    engine
        .save(&aligned, scratch.path())
        .map_err(|e| AlignmentError::composite(output, e))?;
    scratch
        .persist_to(output)
        .map_err(|e| AlignmentError::composite(output, e))?;

    let region = Region::overlap(reference_size, target_size, placement.offset());
    tracing::debug!(
        output = %output.display(),
        region_x = region.x,
        region_y = region.y,
        region_width = region.width,
        region_height = region.height,
        "Aligned image written"
    );
    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_offset() {
        let h = HomographyMatrix::translation(3.0, -4.0);
        let warp = Placement::Warp {
            homography: &h,
            offset: h.translation_offset(),
        };
        assert_eq!(warp.offset(), Offset::new(3, -4));
        assert_eq!(Placement::Translate(Offset::new(1, 2)).offset(), Offset::new(1, 2));
    }
}
