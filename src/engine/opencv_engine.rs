use super::{DescriptorMatch, FeatureEngine, FeatureSet, ImageEngine, TemplateMatch};
use crate::pipeline::{DetectorKind, ImageSize, Offset, Region};
use crate::utils::HomographyMatrix;
use crate::Result;
use opencv::core::{
    self, no_array, DMatch, KeyPoint, Mat, Point, Point2f, Rect, Scalar, Size, Vector,
};
use opencv::features2d::{
    AKAZE_DescriptorType, BFMatcher, KAZE_DiffusivityType, ORB_ScoreType, AKAZE, BRISK, ORB,
};
use opencv::prelude::*;
use opencv::{calib3d, imgcodecs, imgproc};
use std::path::Path;

/// Factor lifting 8-bit RMSE onto the 16-bit quantum scale used for scores.
pub const QUANTUM_SCALE: f64 = 257.0;

/// BGR luma weights for `core::transform`.
const LUMA_WEIGHTS: [f32; 3] = [0.114, 0.587, 0.299];

/// OpenCV-backed engine. Images are 8-bit BGR `Mat`s as decoded by `imread`;
/// edge maps and grayscale derivatives are single-channel.
#[derive(Debug, Clone)]
pub struct OpenCvEngine {
    canny_low: f64,
    canny_high: f64,
}

impl Default for OpenCvEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenCvEngine {
    pub fn new() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
        }
    }

    pub fn with_canny_thresholds(mut self, low: f64, high: f64) -> Self {
        self.canny_low = low;
        self.canny_high = high;
        self
    }

    fn path_str(path: &Path) -> Result<&str> {
        path.to_str()
            .ok_or_else(|| anyhow::anyhow!("Path is not valid UTF-8: {}", path.display()))
    }

    fn to_gray(image: &Mat) -> Result<Mat> {
        let channels = image.channels();
        if channels == 1 {
            return Ok(image.try_clone()?);
        }
        if channels != 3 && channels != 4 {
            return Err(anyhow::anyhow!("Unsupported channel count: {}", channels));
        }

        // Alpha, when present, gets zero weight.
        let mut weights =
            Mat::new_rows_cols_with_default(1, channels, core::CV_32FC1, Scalar::all(0.0))?;
        for (i, w) in LUMA_WEIGHTS.iter().enumerate() {
            *weights.at_2d_mut::<f32>(0, i as i32)? = *w;
        }

        let mut gray = Mat::default();
        core::transform(image, &mut gray, &weights)?;
        Ok(gray)
    }

    fn homography_to_mat(homography: &HomographyMatrix) -> Result<Mat> {
        let mut mat = Mat::new_rows_cols_with_default(3, 3, core::CV_64FC1, Scalar::all(0.0))?;
        for (r, row) in homography.0.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                *mat.at_2d_mut::<f64>(r as i32, c as i32)? = *value;
            }
        }
        Ok(mat)
    }

    fn blank(canvas: ImageSize, typ: i32) -> Result<Mat> {
        Ok(Mat::new_rows_cols_with_default(
            canvas.height as i32,
            canvas.width as i32,
            typ,
            Scalar::all(0.0),
        )?)
    }
}

impl ImageEngine for OpenCvEngine {
    type Image = Mat;

    fn load(&self, path: &Path) -> Result<Mat> {
        let mat = imgcodecs::imread(Self::path_str(path)?, imgcodecs::IMREAD_COLOR)?;
        if mat.empty() {
            return Err(anyhow::anyhow!("Could not decode image: {}", path.display()));
        }
        Ok(mat)
    }

    fn dimensions(&self, image: &Mat) -> ImageSize {
        ImageSize::new(image.cols().max(0) as u32, image.rows().max(0) as u32)
    }

    fn template_match(&self, haystack: &Mat, needle: &Mat) -> Result<TemplateMatch> {
        let (h, n) = (self.dimensions(haystack), self.dimensions(needle));
        if n.is_empty() || !n.fits_within(h) {
            return Err(anyhow::anyhow!("Template {} does not fit inside {}", n, h));
        }
        if haystack.channels() != needle.channels() {
            return Err(anyhow::anyhow!(
                "Channel mismatch: {} vs {}",
                haystack.channels(),
                needle.channels()
            ));
        }

        let mut response = Mat::default();
        imgproc::match_template(haystack, needle, &mut response, imgproc::TM_SQDIFF, &no_array())?;

        let mut min_val = 0.0;
        let mut min_loc = Point::default();
        core::min_max_loc(
            &response,
            Some(&mut min_val),
            None,
            Some(&mut min_loc),
            None,
            &no_array(),
        )?;
        if !min_val.is_finite() {
            return Err(anyhow::anyhow!("Template match produced no usable score"));
        }

        // FFT-based SQDIFF can dip slightly below zero on perfect matches.
        let samples = n.width as f64 * n.height as f64 * needle.channels() as f64;
        let score = (min_val.max(0.0) / samples).sqrt() * QUANTUM_SCALE;
        Ok(TemplateMatch {
            score,
            offset: Offset::new(min_loc.x, min_loc.y),
        })
    }

    fn edge_detect(&self, image: &Mat) -> Result<Mat> {
        let gray = Self::to_gray(image)?;
        let mut edges = Mat::default();
        imgproc::canny(&gray, &mut edges, self.canny_low, self.canny_high, 3, false)?;
        let mut inverted = Mat::default();
        core::bitwise_not(&edges, &mut inverted, &no_array())?;
        Ok(inverted)
    }

    fn resize(&self, image: &Mat, percent: f64) -> Result<Mat> {
        if !(percent.is_finite() && percent > 0.0) {
            return Err(anyhow::anyhow!("Invalid resize percentage: {}", percent));
        }
        let size = self.dimensions(image);
        let width = ((size.width as f64 * percent / 100.0).round() as i32).max(1);
        let height = ((size.height as f64 * percent / 100.0).round() as i32).max(1);

        let mut resized = Mat::default();
        imgproc::resize(
            image,
            &mut resized,
            Size::new(width, height),
            0.0,
            0.0,
            imgproc::INTER_AREA,
        )?;
        Ok(resized)
    }

    fn crop(&self, image: &Mat, rect: Region) -> Result<Mat> {
        let size = self.dimensions(image);
        let inside = rect.x >= 0
            && rect.y >= 0
            && rect.width > 0
            && rect.height > 0
            && rect.x as u64 + rect.width as u64 <= size.width as u64
            && rect.y as u64 + rect.height as u64 <= size.height as u64;
        if !inside {
            return Err(anyhow::anyhow!("Crop {:?} outside image {}", rect, size));
        }
        let roi = Mat::roi(
            image,
            Rect::new(rect.x, rect.y, rect.width as i32, rect.height as i32),
        )?;
        Ok(roi.try_clone()?)
    }

    fn composite(&self, canvas: ImageSize, image: &Mat, offset: Offset) -> Result<Mat> {
        let size = self.dimensions(image);
        let placed = Region::overlap(canvas, size, offset);
        if placed.area() == 0 {
            return Self::blank(canvas, image.typ());
        }

        // Part of the image that lands on the canvas, in image coordinates.
        let visible = Region::new(
            placed.x - offset.x,
            placed.y - offset.y,
            placed.width,
            placed.height,
        );
        let cropped = self.crop(image, visible)?;

        let top = placed.y;
        let left = placed.x;
        let bottom = canvas.height as i32 - placed.y - placed.height as i32;
        let right = canvas.width as i32 - placed.x - placed.width as i32;

        let mut out = Mat::default();
        core::copy_make_border(
            &cropped,
            &mut out,
            top,
            bottom,
            left,
            right,
            core::BORDER_CONSTANT,
            Scalar::all(0.0),
        )?;
        Ok(out)
    }

    fn with_opaque_alpha(&self, image: &Mat) -> Result<Mat> {
        if image.channels() == 4 {
            return Ok(image.try_clone()?);
        }

        let mut planes = Vector::<Mat>::new();
        core::split(image, &mut planes)?;
        if planes.len() == 1 {
            let gray = planes.get(0)?;
            planes.push(gray.try_clone()?);
            planes.push(gray);
        }
        if planes.len() != 3 {
            return Err(anyhow::anyhow!("Unsupported channel count: {}", planes.len()));
        }
        planes.push(Mat::new_rows_cols_with_default(
            image.rows(),
            image.cols(),
            core::CV_8UC1,
            Scalar::all(255.0),
        )?);

        let mut out = Mat::default();
        core::merge(&planes, &mut out)?;
        Ok(out)
    }

    fn grayscale_and_pad(&self, image: &Mat, size: ImageSize) -> Result<Mat> {
        let current = self.dimensions(image);
        if !current.fits_within(size) {
            return Err(anyhow::anyhow!("Cannot pad {} down to {}", current, size));
        }
        let gray = Self::to_gray(image)?;
        let mut padded = Mat::default();
        core::copy_make_border(
            &gray,
            &mut padded,
            0,
            (size.height - current.height) as i32,
            0,
            (size.width - current.width) as i32,
            core::BORDER_CONSTANT,
            Scalar::all(255.0),
        )?;
        Ok(padded)
    }

    fn normalized_cross_correlation(&self, a: &Mat, b: &Mat) -> Result<f64> {
        let (sa, sb) = (self.dimensions(a), self.dimensions(b));
        if sa != sb || a.channels() != b.channels() {
            return Err(anyhow::anyhow!("NCC needs identical shapes, got {} and {}", sa, sb));
        }
        let mut response = Mat::default();
        imgproc::match_template(a, b, &mut response, imgproc::TM_CCORR_NORMED, &no_array())?;
        let value = *response.at_2d::<f32>(0, 0)? as f64;
        if !value.is_finite() {
            return Err(anyhow::anyhow!("Correlation is undefined for these images"));
        }
        Ok(value)
    }

    fn save(&self, image: &Mat, path: &Path) -> Result<()> {
        let written = imgcodecs::imwrite(Self::path_str(path)?, image, &Vector::new())?;
        if !written {
            return Err(anyhow::anyhow!("Encoder refused to write {}", path.display()));
        }
        Ok(())
    }
}

impl FeatureEngine for OpenCvEngine {
    type Descriptors = Mat;

    fn detect_and_compute(
        &self,
        image: &Mat,
        detector: DetectorKind,
        max_features: usize,
    ) -> Result<FeatureSet<Mat>> {
        let gray = Self::to_gray(image)?;
        let mut keypoints = Vector::<KeyPoint>::new();
        let mut descriptors = Mat::default();
        let max_features = max_features.min(i32::MAX as usize) as i32;

        match detector {
            DetectorKind::Orb => {
                let mut orb = ORB::create(
                    max_features,
                    1.2,
                    8,
                    31,
                    0,
                    2,
                    ORB_ScoreType::HARRIS_SCORE,
                    31,
                    20,
                )?;
                orb.detect_and_compute(
                    &gray,
                    &no_array(),
                    &mut keypoints,
                    &mut descriptors,
                    false,
                )?;
            }
            DetectorKind::Akaze => {
                let mut akaze = AKAZE::create(
                    AKAZE_DescriptorType::DESCRIPTOR_MLDB,
                    0,
                    3,
                    0.001f32,
                    4,
                    4,
                    KAZE_DiffusivityType::DIFF_PM_G2,
                    max_features,
                )?;
                akaze.detect_and_compute(
                    &gray,
                    &no_array(),
                    &mut keypoints,
                    &mut descriptors,
                    false,
                )?;
            }
            DetectorKind::Brisk => {
                let mut brisk = BRISK::create(30, 3, 1.0)?;
                brisk.detect_and_compute(
                    &gray,
                    &no_array(),
                    &mut keypoints,
                    &mut descriptors,
                    false,
                )?;
            }
        }

        let points = keypoints
            .iter()
            .map(|kp| {
                let pt = kp.pt();
                (pt.x as f64, pt.y as f64)
            })
            .collect();
        Ok(FeatureSet {
            points,
            descriptors,
        })
    }

    fn match_descriptors(&self, query: &Mat, train: &Mat) -> Result<Vec<DescriptorMatch>> {
        if query.rows() == 0 || train.rows() == 0 {
            return Ok(Vec::new());
        }

        // All supported detectors emit binary descriptors.
        let matcher = BFMatcher::create(core::NORM_HAMMING, true)?;
        let mut matches = Vector::<DMatch>::new();
        matcher.train_match(query, train, &mut matches, &no_array())?;

        Ok(matches
            .iter()
            .filter(|m| m.query_idx >= 0 && m.train_idx >= 0)
            .map(|m| DescriptorMatch {
                query_idx: m.query_idx as usize,
                train_idx: m.train_idx as usize,
                distance: m.distance,
            })
            .collect())
    }

    fn estimate_homography(
        &self,
        src: &[(f64, f64)],
        dst: &[(f64, f64)],
        reproj_threshold: f64,
    ) -> Result<Option<HomographyMatrix>> {
        if src.len() != dst.len() || src.len() < 4 {
            return Ok(None);
        }
        let src_pts: Vector<Point2f> = src
            .iter()
            .map(|&(x, y)| Point2f::new(x as f32, y as f32))
            .collect();
        let dst_pts: Vector<Point2f> = dst
            .iter()
            .map(|&(x, y)| Point2f::new(x as f32, y as f32))
            .collect();

        let mut inlier_mask = Mat::default();
        let h = calib3d::find_homography(
            &src_pts,
            &dst_pts,
            &mut inlier_mask,
            calib3d::RANSAC,
            reproj_threshold,
        )?;
        if h.empty() || h.rows() != 3 || h.cols() != 3 {
            return Ok(None);
        }

        let mut rows = [[0.0f64; 3]; 3];
        for (r, row) in rows.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = *h.at_2d::<f64>(r as i32, c as i32)?;
            }
        }
        Ok(Some(HomographyMatrix::from_rows(rows)))
    }

    fn warp_perspective(
        &self,
        image: &Mat,
        homography: &HomographyMatrix,
        canvas: ImageSize,
    ) -> Result<Mat> {
        let m = Self::homography_to_mat(homography)?;
        let mut warped = Mat::default();
        imgproc::warp_perspective(
            image,
            &mut warped,
            &m,
            Size::new(canvas.width as i32, canvas.height as i32),
            imgproc::INTER_LINEAR,
            core::BORDER_CONSTANT,
            Scalar::all(0.0),
        )?;
        Ok(warped)
    }
}
