//! Image-processing primitives the alignment strategies are written against.
//!
//! Strategies only ever talk to these traits, so the cascade can be driven by
//! the OpenCV backend in production and by a scripted engine in tests.

pub mod opencv_engine;

pub use opencv_engine::{OpenCvEngine, QUANTUM_SCALE};

use crate::pipeline::{DetectorKind, ImageSize, Offset, Region};
use crate::utils::HomographyMatrix;
use crate::Result;
use std::path::Path;

/// Best placement of a needle inside a haystack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    /// RMSE at the best position, on a 16-bit quantum scale.
    pub score: f64,
    /// Top-left corner of the needle in haystack coordinates.
    pub offset: Offset,
}

/// Keypoint locations plus the backend's descriptor block for them.
#[derive(Debug, Clone)]
pub struct FeatureSet<D> {
    pub points: Vec<(f64, f64)>,
    pub descriptors: D,
}

impl<D> FeatureSet<D> {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescriptorMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// Raster operations needed by the translation-only strategies.
pub trait ImageEngine: Send + Sync {
    type Image;

    fn load(&self, path: &Path) -> Result<Self::Image>;

    fn dimensions(&self, image: &Self::Image) -> ImageSize;

    /// Locates `needle` inside `haystack` by minimising RMSE.
    ///
    /// Errors when the needle does not fit or the result is not a finite score.
    fn template_match(&self, haystack: &Self::Image, needle: &Self::Image)
        -> Result<TemplateMatch>;

    /// RMSE between two equally sized images.
    fn rmse(&self, a: &Self::Image, b: &Self::Image) -> Result<f64> {
        let (sa, sb) = (self.dimensions(a), self.dimensions(b));
        if sa != sb {
            return Err(anyhow::anyhow!("RMSE needs equal sizes, got {} and {}", sa, sb));
        }
        Ok(self.template_match(a, b)?.score)
    }

    /// Single-channel inverted edge map.
    fn edge_detect(&self, image: &Self::Image) -> Result<Self::Image>;

    fn resize(&self, image: &Self::Image, percent: f64) -> Result<Self::Image>;

    fn crop(&self, image: &Self::Image, rect: Region) -> Result<Self::Image>;

    /// Places `image` at `offset` on a blank canvas of `canvas` size.
    fn composite(&self, canvas: ImageSize, image: &Self::Image, offset: Offset)
        -> Result<Self::Image>;

    /// Adds a fully opaque alpha channel so later padding reads as transparent.
    fn with_opaque_alpha(&self, image: &Self::Image) -> Result<Self::Image>;

    /// Grayscale copy padded on the right/bottom with white up to `size`.
    fn grayscale_and_pad(&self, image: &Self::Image, size: ImageSize) -> Result<Self::Image>;

    fn normalized_cross_correlation(&self, a: &Self::Image, b: &Self::Image) -> Result<f64>;

    fn save(&self, image: &Self::Image, path: &Path) -> Result<()>;
}

/// Keypoint and homography support for the feature-based strategy.
pub trait FeatureEngine: ImageEngine {
    type Descriptors;

    fn detect_and_compute(
        &self,
        image: &Self::Image,
        detector: DetectorKind,
        max_features: usize,
    ) -> Result<FeatureSet<Self::Descriptors>>;

    /// Nearest-neighbour matches from `query` into `train`.
    fn match_descriptors(
        &self,
        query: &Self::Descriptors,
        train: &Self::Descriptors,
    ) -> Result<Vec<DescriptorMatch>>;

    /// RANSAC homography mapping `src` onto `dst`; `None` when degenerate.
    fn estimate_homography(
        &self,
        src: &[(f64, f64)],
        dst: &[(f64, f64)],
        reproj_threshold: f64,
    ) -> Result<Option<HomographyMatrix>>;

    fn warp_perspective(
        &self,
        image: &Self::Image,
        homography: &HomographyMatrix,
        canvas: ImageSize,
    ) -> Result<Self::Image>;
}
