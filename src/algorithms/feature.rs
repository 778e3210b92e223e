//! Keypoint + homography alignment (opt-in).

use crate::config::FeatureConfig;
use crate::engine::FeatureEngine;
use crate::pipeline::{DetectorKind, FeatureTransform, StrategyId, StrategyResult};
use crate::utils::HomographyMatrix;
use crate::Result;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("only {found} good matches, need at least {required}")]
    InsufficientMatches { found: usize, required: usize },

    #[error("descriptor match refers to missing keypoint {0}")]
    DanglingMatch(usize),

    #[error("homography estimation failed")]
    DegenerateHomography,
}

/// Tunables resolved from config plus per-call overrides.
#[derive(Debug, Clone, Copy)]
pub struct FeatureParams {
    pub detector: DetectorKind,
    pub match_threshold: f64,
    pub min_matches: usize,
    pub ransac_reproj_threshold: f64,
    pub inlier_threshold: f64,
    pub max_features: usize,
}

impl FeatureParams {
    pub fn from_config(
        config: &FeatureConfig,
        detector: Option<DetectorKind>,
        match_threshold: Option<f64>,
    ) -> Self {
        Self {
            detector: detector.unwrap_or(config.detector),
            match_threshold: match_threshold
                .filter(|t| *t > 0.0 && *t <= 1.0)
                .unwrap_or(config.match_threshold),
            // Four correspondences is the minimum a homography needs.
            min_matches: config.min_matches.max(4),
            ransac_reproj_threshold: config.ransac_reproj_threshold,
            inlier_threshold: config.inlier_threshold,
            max_features: config.max_features,
        }
    }
}

/// Candidate from the feature strategy, with the full transform kept for warping.
#[derive(Debug, Clone)]
pub struct FeatureCandidate {
    pub result: StrategyResult,
    pub homography: HomographyMatrix,
    pub transform: FeatureTransform,
}

impl FeatureCandidate {
    pub fn confidence(&self) -> f64 {
        self.transform.confidence
    }
}

/// Estimates a homography taking target pixels onto the reference.
///
/// Confidence is the share of kept matches that reproject within
/// `inlier_threshold` pixels. The candidate's score is `1 - confidence`.
pub fn feature_homography<E: FeatureEngine>(
    engine: &E,
    params: &FeatureParams,
    reference: &E::Image,
    target: &E::Image,
) -> Result<FeatureCandidate> {
    let reference_features =
        engine.detect_and_compute(reference, params.detector, params.max_features)?;
    let target_features = engine.detect_and_compute(target, params.detector, params.max_features)?;
    tracing::debug!(
        detector = params.detector.as_str(),
        reference_keypoints = reference_features.len(),
        target_keypoints = target_features.len(),
        "Feature detection completed"
    );

    let mut matches =
        engine.match_descriptors(&target_features.descriptors, &reference_features.descriptors)?;
    let raw_matches = matches.len();
    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    let keep = (matches.len() as f64 * params.match_threshold).floor() as usize;
    matches.truncate(keep);
    tracing::debug!(raw_matches, good_matches = matches.len(), "Feature matching completed");

    if matches.len() < params.min_matches {
        return Err(FeatureError::InsufficientMatches {
            found: matches.len(),
            required: params.min_matches,
        }
        .into());
    }

    let mut src = Vec::with_capacity(matches.len());
    let mut dst = Vec::with_capacity(matches.len());
    for m in &matches {
        let from = target_features
            .points
            .get(m.query_idx)
            .ok_or(FeatureError::DanglingMatch(m.query_idx))?;
        let to = reference_features
            .points
            .get(m.train_idx)
            .ok_or(FeatureError::DanglingMatch(m.train_idx))?;
        src.push(*from);
        dst.push(*to);
    }

    let homography = engine
        .estimate_homography(&src, &dst, params.ransac_reproj_threshold)?
        .filter(HomographyMatrix::is_finite)
        .ok_or(FeatureError::DegenerateHomography)?;

    let inliers = homography.count_inliers(&src, &dst, params.inlier_threshold);
    let confidence = inliers as f64 / matches.len() as f64;
    tracing::debug!(inliers, good_matches = matches.len(), confidence, "Homography estimated");

    let transform = FeatureTransform {
        matrix: homography,
        approximation: homography.decompose(),
        confidence,
        inliers,
        good_matches: matches.len(),
        detector: params.detector,
    };
    Ok(FeatureCandidate {
        result: StrategyResult::new(
            StrategyId::FeatureHomography,
            1.0 - confidence,
            homography.translation_offset(),
        ),
        homography,
        transform,
    })
}
