use crate::pipeline::Offset;
use serde::{Deserialize, Serialize};

/// Row-major 3x3 projective transform mapping target pixels onto the reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomographyMatrix(pub [[f64; 3]; 3]);

/// Translation/scale/rotation read off a homography.
///
/// Only exact when the homography is a similarity transform; for general
/// projective matrices the values are an approximation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityApprox {
    pub translation: (f64, f64),
    pub scale: (f64, f64),
    pub rotation_degrees: f64,
}

impl HomographyMatrix {
    pub fn identity() -> Self {
        Self([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self([[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]])
    }

    pub fn from_rows(rows: [[f64; 3]; 3]) -> Self {
        Self(rows)
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().flatten().all(|v| v.is_finite())
    }

    /// Maps `(x, y)` through the transform; `None` on a point at infinity.
    pub fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let m = &self.0;
        let w = m[2][0] * x + m[2][1] * y + m[2][2];
        if w.abs() < f64::EPSILON {
            return None;
        }
        let px = (m[0][0] * x + m[0][1] * y + m[0][2]) / w;
        let py = (m[1][0] * x + m[1][1] * y + m[1][2]) / w;
        Some((px, py))
    }

    /// Euclidean distance between the projected `src` and `dst`.
    pub fn reprojection_error(&self, src: (f64, f64), dst: (f64, f64)) -> f64 {
        match self.project(src.0, src.1) {
            Some((px, py)) => ((px - dst.0).powi(2) + (py - dst.1).powi(2)).sqrt(),
            None => f64::INFINITY,
        }
    }

    /// Counts correspondences whose reprojection error is below `threshold`.
    pub fn count_inliers(&self, src: &[(f64, f64)], dst: &[(f64, f64)], threshold: f64) -> usize {
        src.iter()
            .zip(dst)
            .filter(|(s, d)| self.reprojection_error(**s, **d) < threshold)
            .count()
    }

    pub fn decompose(&self) -> SimilarityApprox {
        let m = &self.0;
        let (a, b, c, d) = (m[0][0], m[0][1], m[1][0], m[1][1]);
        SimilarityApprox {
            translation: (m[0][2], m[1][2]),
            scale: ((a * a + c * c).sqrt(), (b * b + d * d).sqrt()),
            rotation_degrees: c.atan2(a).to_degrees(),
        }
    }

    /// Integer placement of the target implied by the translation terms.
    pub fn translation_offset(&self) -> Offset {
        Offset::new(self.0[0][2].round() as i32, self.0[1][2].round() as i32)
    }
}
