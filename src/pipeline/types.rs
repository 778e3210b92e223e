use crate::utils::homography::{HomographyMatrix, SimilarityApprox};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

/// Displacement applied to the target so it overlays the reference.
///
/// Positive `x`/`y` shift the target right/down relative to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Offset {
    pub x: i32,
    pub y: i32,
}

impl Offset {
    pub const ZERO: Offset = Offset { x: 0, y: 0 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Offset seen from the other image's point of view.
    pub fn inverted(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }

    /// Maps an offset measured on a resampled image back to full resolution.
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            x: (self.x as f64 * factor).round() as i32,
            y: (self.y as f64 * factor).round() as i32,
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when `self` fits inside `other` on both axes.
    pub fn fits_within(&self, other: ImageSize) -> bool {
        self.width <= other.width && self.height <= other.height
    }

    pub fn max(&self, other: ImageSize) -> ImageSize {
        ImageSize::new(self.width.max(other.width), self.height.max(other.height))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle in reference canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle of `size` centred inside `outer`.
    pub fn centered(outer: ImageSize, size: ImageSize) -> Self {
        let x = (outer.width.saturating_sub(size.width) / 2) as i32;
        let y = (outer.height.saturating_sub(size.height) / 2) as i32;
        Self::new(x, y, size.width, size.height)
    }

    /// Overlap of the reference canvas with the target placed at `offset`.
    ///
    /// Dimensions never exceed the smaller image on either axis and collapse to
    /// zero when the placed target misses the canvas entirely.
    pub fn overlap(reference: ImageSize, target: ImageSize, offset: Offset) -> Self {
        let (x, width) = overlap_1d(reference.width, target.width, offset.x);
        let (y, height) = overlap_1d(reference.height, target.height, offset.y);
        if width == 0 || height == 0 {
            return Self::new(x, y, 0, 0);
        }
        Self::new(x, y, width, height)
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

fn overlap_1d(canvas: u32, length: u32, offset: i32) -> (i32, u32) {
    let start = (offset as i64).clamp(0, canvas as i64);
    let end = (offset as i64 + length as i64).clamp(0, canvas as i64);
    (start as i32, (end - start).max(0) as u32)
}

/// Closed set of strategies the cascade can report as the winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyId {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "feature-homography")]
    FeatureHomography,
    #[serde(rename = "target-in-ref")]
    TargetInReference,
    #[serde(rename = "ref-in-target")]
    ReferenceInTarget,
    #[serde(rename = "edge-based")]
    EdgeBased,
    #[serde(rename = "cropped-region")]
    CroppedRegion,
    #[serde(rename = "multi-scale")]
    MultiScale,
    #[serde(rename = "phase-correlation")]
    PhaseCorrelation,
}

impl StrategyId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::None => "none",
            StrategyId::FeatureHomography => "feature-homography",
            StrategyId::TargetInReference => "target-in-ref",
            StrategyId::ReferenceInTarget => "ref-in-target",
            StrategyId::EdgeBased => "edge-based",
            StrategyId::CroppedRegion => "cropped-region",
            StrategyId::MultiScale => "multi-scale",
            StrategyId::PhaseCorrelation => "phase-correlation",
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate reported by a strategy. Lower `score` is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyResult {
    pub score: f64,
    pub offset: Offset,
    pub method: StrategyId,
}

impl StrategyResult {
    pub fn new(method: StrategyId, score: f64, offset: Offset) -> Self {
        Self {
            score,
            offset,
            method,
        }
    }
}

/// Which flavour of the cascade the caller asked for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AlignMethod {
    Feature,
    Phase,
    #[default]
    Subimage,
    Opencv,
}

impl FromStr for AlignMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "feature" => Ok(AlignMethod::Feature),
            "phase" => Ok(AlignMethod::Phase),
            "subimage" => Ok(AlignMethod::Subimage),
            "opencv" => Ok(AlignMethod::Opencv),
            other => Err(format!("unknown alignment method: {other}")),
        }
    }
}

impl AlignMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignMethod::Feature => "feature",
            AlignMethod::Phase => "phase",
            AlignMethod::Subimage => "subimage",
            AlignMethod::Opencv => "opencv",
        }
    }
}

impl fmt::Display for AlignMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keypoint detector used by the feature-based strategy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    #[default]
    Orb,
    Akaze,
    Brisk,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Orb => "orb",
            DetectorKind::Akaze => "akaze",
            DetectorKind::Brisk => "brisk",
        }
    }
}

impl FromStr for DetectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "orb" => Ok(DetectorKind::Orb),
            "akaze" => Ok(DetectorKind::Akaze),
            "brisk" => Ok(DetectorKind::Brisk),
            other => Err(format!("unknown detector: {other}")),
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignOptions {
    #[serde(default)]
    pub method: AlignMethod,
    /// Overrides the fraction of feature matches kept.
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub opencv_detector: Option<DetectorKind>,
}

impl AlignOptions {
    pub fn with_method(mut self, method: AlignMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_detector(mut self, detector: DetectorKind) -> Self {
        self.opencv_detector = Some(detector);
        self
    }
}

/// What happened when the cascade reached a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AttemptOutcome {
    Candidate {
        score: f64,
        offset: Offset,
        /// Whether this candidate replaced the running best.
        improved: bool,
    },
    Failed {
        reason: String,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyAttempt {
    pub strategy: StrategyId,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    pub elapsed_ms: f64,
}

impl StrategyAttempt {
    pub fn was_executed(&self) -> bool {
        !matches!(self.outcome, AttemptOutcome::Skipped { .. })
    }
}

/// Projective transform reported by the feature-based strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureTransform {
    pub matrix: HomographyMatrix,
    /// Exact for similarity transforms only.
    pub approximation: SimilarityApprox,
    pub confidence: f64,
    pub inliers: usize,
    pub good_matches: usize,
    pub detector: DetectorKind,
}

/// Everything downstream consumers need from one alignment call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignmentOutcome {
    pub alignment_id: Uuid,
    pub aligned_path: PathBuf,
    pub offset: Offset,
    pub matching_region: Region,
    pub method: StrategyId,
    /// Absent when no strategy produced a candidate.
    pub score: Option<f64>,
    pub transform: Option<FeatureTransform>,
    pub attempts: Vec<StrategyAttempt>,
}

impl AlignmentOutcome {
    pub fn executed_strategies(&self) -> Vec<StrategyId> {
        self.attempts
            .iter()
            .filter(|a| a.was_executed())
            .map(|a| a.strategy)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlap_positive_offset() {
        let size = ImageSize::new(800, 600);
        let region = Region::overlap(size, size, Offset::new(20, -10));
        assert_eq!(region, Region::new(20, 0, 780, 590));
    }

    #[test]
    fn test_overlap_disjoint_collapses() {
        let region = Region::overlap(
            ImageSize::new(100, 100),
            ImageSize::new(50, 50),
            Offset::new(150, 10),
        );
        assert_eq!(region.width, 0);
        assert_eq!(region.height, 0);
    }

    #[test]
    fn test_overlap_never_exceeds_smaller_image() {
        let reference = ImageSize::new(300, 200);
        let target = ImageSize::new(120, 500);
        for dx in [-400, -60, 0, 10, 250, 400] {
            for dy in [-600, -100, 0, 50, 199] {
                let r = Region::overlap(reference, target, Offset::new(dx, dy));
                assert!(r.width <= reference.width.min(target.width));
                assert!(r.height <= reference.height.min(target.height));
                assert!(r.x >= 0 && r.y >= 0);
            }
        }
    }

    #[test]
    fn test_offset_scaling_rounds() {
        assert_eq!(Offset::new(3, -5).scaled(4.0), Offset::new(12, -20));
        assert_eq!(Offset::new(7, 1).scaled(1.0 / 0.25), Offset::new(28, 4));
        assert_eq!(Offset::new(7, -2).inverted(), Offset::new(-7, 2));
    }

    #[test]
    fn test_centered_region() {
        let r = Region::centered(ImageSize::new(1000, 700), ImageSize::new(800, 600));
        assert_eq!(r, Region::new(100, 50, 800, 600));
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("OpenCV".parse::<AlignMethod>().unwrap(), AlignMethod::Opencv);
        assert_eq!(AlignMethod::default(), AlignMethod::Subimage);
        assert!("fft".parse::<AlignMethod>().is_err());
        assert_eq!("brisk".parse::<DetectorKind>().unwrap(), DetectorKind::Brisk);
    }

    #[test]
    fn test_strategy_id_serializes_to_wire_names() {
        let json = serde_json::to_string(&StrategyId::TargetInReference).unwrap();
        assert_eq!(json, "\"target-in-ref\"");
    }
}
