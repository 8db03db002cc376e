//! Cascade face detector.
//!
//! Wraps OpenCV's Haar `CascadeClassifier`, loaded from a bundled XML
//! classifier file, behind the [`FaceDetector`] trait.

use crate::types::Region;
use image::imageops::FilterType;
use image::GrayImage;
use opencv::core::{Mat, Rect, Scalar, Size, Vector, CV_8UC1};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const DEFAULT_SCALE_FACTOR: f64 = 1.1;
const DEFAULT_MIN_NEIGHBORS: i32 = 4;
const DEFAULT_MIN_FACE_SIZE: u32 = 30;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("classifier file not found: {0} — place haar_frontal_face.xml in classifiers/")]
    ClassifierNotFound(String),
    #[error("classifier file {0} holds no cascade")]
    EmptyClassifier(String),
    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// Anything that can locate faces in a grayscale image.
pub trait FaceDetector {
    /// Return face rectangles, clipped to the image bounds.
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<Region>, DetectorError>;
}

/// Multi-scale detection parameters.
#[derive(Debug, Clone, Copy)]
pub struct DetectorSettings {
    /// Size ratio between successive pyramid levels (> 1.0).
    pub scale_factor: f64,
    /// Overlapping candidate windows needed to keep a detection.
    pub min_neighbors: i32,
    /// Smallest face side, in pixels.
    pub min_face_size: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_face_size: DEFAULT_MIN_FACE_SIZE,
        }
    }
}

/// Haar cascade face detector.
pub struct CascadeDetector {
    classifier: CascadeClassifier,
    settings: DetectorSettings,
}

impl CascadeDetector {
    /// Load the classifier from the given path.
    pub fn load(classifier_path: &Path, settings: DetectorSettings) -> Result<Self, DetectorError> {
        let path = classifier_path.to_string_lossy().into_owned();
        if !classifier_path.is_file() {
            return Err(DetectorError::ClassifierNotFound(path));
        }

        let classifier = CascadeClassifier::new(&path)?;
        if classifier.empty()? {
            return Err(DetectorError::EmptyClassifier(path));
        }

        tracing::info!(
            path,
            scale_factor = settings.scale_factor,
            min_neighbors = settings.min_neighbors,
            min_face_size = settings.min_face_size,
            "loaded cascade classifier"
        );

        Ok(Self {
            classifier,
            settings,
        })
    }
}

impl FaceDetector for CascadeDetector {
    fn detect(&mut self, image: &GrayImage) -> Result<Vec<Region>, DetectorError> {
        let (width, height) = image.dimensions();
        let mat = to_mat(image)?;
        let min_side = self.settings.min_face_size as i32;

        let mut found = Vector::<Rect>::new();
        self.classifier.detect_multi_scale(
            &mat,
            &mut found,
            self.settings.scale_factor,
            self.settings.min_neighbors,
            0,
            Size::new(min_side, min_side),
            // 0x0 leaves the maximum size unbounded
            Size::new(0, 0),
        )?;

        let faces: Vec<Region> = found
            .iter()
            .filter_map(|r| {
                Region::clamped(
                    r.x as i64,
                    r.y as i64,
                    r.width as i64,
                    r.height as i64,
                    width,
                    height,
                )
            })
            .collect();

        tracing::debug!(width, height, faces = faces.len(), "cascade detection");
        Ok(faces)
    }
}

/// Copy a grayscale image into a single-channel 8-bit OpenCV matrix.
pub(crate) fn to_mat(image: &GrayImage) -> opencv::Result<Mat> {
    let (width, height) = image.dimensions();
    let mut mat =
        Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC1, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(image.as_raw());
    Ok(mat)
}

/// Resize to `width` pixels wide, keeping the aspect ratio.
///
/// Images already at that width are returned unchanged.
pub fn resize_to_width(image: &GrayImage, width: u32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || w == width {
        return image.clone();
    }
    let height = ((h as f64 * width as f64 / w as f64).round() as u32).max(1);
    image::imageops::resize(image, width, height, FilterType::Triangle)
}

/// Cut a region out of an image as an owned buffer.
pub fn crop(image: &GrayImage, region: &Region) -> GrayImage {
    image::imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image()
}
