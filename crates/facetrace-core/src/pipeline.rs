//! Face pipeline for one target: save crops, train, scan.
//!
//! The pipeline owns its detector and (when a model exists) its recognizer.
//! The caller decides whether a model exists; the pipeline never checks the
//! target folder on construction.

use crate::detector::{crop, resize_to_width, DetectorError, FaceDetector};
use crate::recognizer::{LbphParams, LbphRecognizer, RecognizerError};
use crate::target::Target;
use crate::types::{FaceMatch, Prediction, ScanReport, TARGET_LABEL, UNKNOWN_LABEL};
use std::path::PathBuf;
use thiserror::Error;

/// Working width for harvested images and training crops.
pub const DEFAULT_RESIZE_WIDTH: u32 = 200;
/// Distances below this are plausible matches.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 100.0;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("read face crop {path}: {source}")]
    ReadCrop {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("write face crop {path}: {source}")]
    WriteCrop {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("list face crops: {0}")]
    ListCrops(#[source] std::io::Error),
    #[error("no training samples: no faces detected in the crops under {0}")]
    NoTrainingSamples(PathBuf),
    #[error("no trained model for target {0} — run `train` first")]
    NotTrained(String),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Pipeline tuning.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub resize_width: u32,
    pub match_threshold: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            resize_width: DEFAULT_RESIZE_WIDTH,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

/// Outcome of saving faces for a batch of downloads.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SaveSummary {
    /// Downloads that produced no bytes (timeouts).
    pub missing: usize,
    /// Downloads that were not decodable images.
    pub undecodable: usize,
    /// Crop files written.
    pub faces_saved: usize,
}

/// Detector + recognizer bound to one target.
pub struct FacePipeline<D> {
    target: Target,
    detector: D,
    recognizer: Option<LbphRecognizer>,
    settings: PipelineSettings,
}

impl<D: FaceDetector> FacePipeline<D> {
    /// Build a pipeline; loads the target's model when `model_exists` is set.
    pub fn new(
        target: Target,
        detector: D,
        model_exists: bool,
        settings: PipelineSettings,
    ) -> Result<Self, PipelineError> {
        let recognizer = if model_exists {
            Some(LbphRecognizer::load(&target.model_path(), LbphParams::default())?)
        } else {
            None
        };

        Ok(Self {
            target,
            detector,
            recognizer,
            settings,
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn has_model(&self) -> bool {
        self.recognizer
            .as_ref()
            .is_some_and(LbphRecognizer::is_trained)
    }

    /// Detect faces in one downloaded image and write each as a JPEG crop.
    ///
    /// Returns the written paths; an image without faces writes nothing.
    pub fn save_faces(&mut self, index: usize, data: &[u8]) -> Result<Vec<PathBuf>, PipelineError> {
        let gray = image::load_from_memory(data)
            .map_err(PipelineError::Decode)?
            .to_luma8();
        let resized = resize_to_width(&gray, self.settings.resize_width);

        let faces = self.detector.detect(&resized)?;
        let mut written = Vec::with_capacity(faces.len());
        for (n, region) in faces.iter().enumerate() {
            let path = self.target.crop_path(index, n);
            crop(&resized, region)
                .save(&path)
                .map_err(|source| PipelineError::WriteCrop {
                    path: path.clone(),
                    source,
                })?;
            written.push(path);
        }

        tracing::debug!(index, faces = written.len(), "saved faces");
        Ok(written)
    }

    /// Save faces for every download, in order.
    ///
    /// Empty slots and undecodable bytes are logged and skipped; write
    /// failures abort.
    pub fn save_all(&mut self, images: &[Option<Vec<u8>>]) -> Result<SaveSummary, PipelineError> {
        let mut summary = SaveSummary::default();

        for (index, data) in images.iter().enumerate() {
            let Some(data) = data else {
                summary.missing += 1;
                continue;
            };
            match self.save_faces(index, data) {
                Ok(paths) => summary.faces_saved += paths.len(),
                Err(PipelineError::Decode(e)) => {
                    tracing::warn!(index, error = %e, "not an image, skipping");
                    summary.undecodable += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            target = self.target.name(),
            faces = summary.faces_saved,
            missing = summary.missing,
            undecodable = summary.undecodable,
            "face harvest finished"
        );
        Ok(summary)
    }

    /// Train the recognizer on every stored crop and write the model file.
    ///
    /// Returns the number of training samples.
    pub fn train(&mut self) -> Result<usize, PipelineError> {
        let crop_paths = self.target.crop_paths().map_err(PipelineError::ListCrops)?;
        tracing::info!(target = self.target.name(), crops = crop_paths.len(), "training");

        let mut samples = Vec::new();
        for path in &crop_paths {
            let gray = image::open(path)
                .map_err(|source| PipelineError::ReadCrop {
                    path: path.clone(),
                    source,
                })?
                .to_luma8();
            let resized = resize_to_width(&gray, self.settings.resize_width);

            let faces = self.detector.detect(&resized)?;
            if faces.is_empty() {
                tracing::debug!(path = %path.display(), "no face found in crop");
            }
            samples.extend(faces.iter().map(|region| crop(&resized, region)));
        }

        if samples.is_empty() {
            return Err(PipelineError::NoTrainingSamples(self.target.dir().to_path_buf()));
        }

        let labels = vec![TARGET_LABEL; samples.len()];
        let mut recognizer = LbphRecognizer::new(LbphParams::default())?;
        recognizer.train(&samples, &labels)?;
        recognizer.save(&self.target.model_path())?;

        let count = samples.len();
        self.recognizer = Some(recognizer);
        Ok(count)
    }

    /// Detect and classify every face in an image.
    pub fn scan(&mut self, data: &[u8]) -> Result<ScanReport, PipelineError> {
        let recognizer = self
            .recognizer
            .as_ref()
            .ok_or_else(|| PipelineError::NotTrained(self.target.name().to_string()))?;

        let color = image::load_from_memory(data)
            .map_err(PipelineError::Decode)?
            .to_rgb8();
        let gray = image::imageops::grayscale(&color);

        let regions = self.detector.detect(&gray)?;
        let mut predictions = Vec::with_capacity(regions.len());
        for region in &regions {
            let prediction = recognizer.predict(&crop(&gray, region))?;
            tracing::debug!(
                label = prediction.label,
                distance = prediction.distance,
                "face prediction"
            );
            predictions.push(prediction);
        }

        let decisions = classify(&predictions, self.settings.match_threshold);
        let faces = regions
            .into_iter()
            .zip(predictions)
            .zip(decisions)
            .map(|((region, prediction), is_target)| FaceMatch {
                region,
                prediction,
                is_target,
                label: if is_target {
                    self.target.name().to_string()
                } else {
                    UNKNOWN_LABEL.to_string()
                },
            })
            .collect();

        Ok(ScanReport { image: color, faces })
    }
}

/// Decide which faces are labelled as the target.
///
/// A face is the target when its distance is below `threshold` and it is
/// the first such face in the image or its confidence beats every earlier
/// match.
pub fn classify(predictions: &[Prediction], threshold: f64) -> Vec<bool> {
    let mut best_confidence: Option<i64> = None;
    predictions
        .iter()
        .map(|p| {
            let confidence = p.confidence_pct();
            let is_target = p.distance < threshold
                && best_confidence.map_or(true, |best| confidence > best);
            if is_target {
                best_confidence = Some(confidence);
            }
            is_target
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::testing::BrightRegionDetector;
    use crate::types::Region;
    use image::{GenericImageView, GrayImage, ImageFormat, Luma};
    use std::io::Cursor;
    use std::path::Path;

    fn png_bytes(img: &GrayImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    /// Dark canvas with one bright textured square.
    fn canvas_with_square(w: u32, h: u32, x0: u32, y0: u32, side: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y) {
                Luma([170 + ((x * 3 + y * 5) % 60) as u8])
            } else {
                Luma([10])
            }
        })
    }

    fn new_target(root: &Path) -> Target {
        let target = Target::resolve(root, "alice");
        std::fs::create_dir_all(target.dir()).unwrap();
        target
    }

    fn pipeline(target: Target, model_exists: bool) -> FacePipeline<BrightRegionDetector> {
        FacePipeline::new(
            target,
            BrightRegionDetector::default(),
            model_exists,
            PipelineSettings::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_save_faces_single_square_writes_one_crop() {
        let root = tempfile::tempdir().unwrap();
        let target = new_target(root.path());
        let mut p = pipeline(target.clone(), false);

        let img = canvas_with_square(400, 300, 100, 100, 80);
        let written = p.save_faces(0, &png_bytes(&img)).unwrap();

        assert_eq!(written, vec![target.crop_path(0, 0)]);
        assert_eq!(target.crop_paths().unwrap().len(), 1);
        // 400 → 200 wide halves the 80px square
        let (w, h) = image::open(&written[0]).unwrap().dimensions();
        assert!((38..=42).contains(&w) && (38..=42).contains(&h), "crop {w}x{h}");
    }

    #[test]
    fn test_save_faces_dark_image_writes_nothing() {
        let root = tempfile::tempdir().unwrap();
        let target = new_target(root.path());
        let mut p = pipeline(target.clone(), false);

        let written = p.save_faces(3, &png_bytes(&GrayImage::new(200, 100))).unwrap();
        assert!(written.is_empty());
        assert!(target.crop_paths().unwrap().is_empty());
    }

    #[test]
    fn test_save_faces_undecodable_is_decode_error() {
        let root = tempfile::tempdir().unwrap();
        let mut p = pipeline(new_target(root.path()), false);
        let err = p.save_faces(0, b"<html>not found</html>").unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn test_save_all_skips_missing_and_garbage() {
        let root = tempfile::tempdir().unwrap();
        let target = new_target(root.path());
        let mut p = pipeline(target.clone(), false);

        let face = png_bytes(&canvas_with_square(200, 200, 50, 50, 60));
        let images = vec![
            Some(face.clone()),
            None,
            Some(b"garbage".to_vec()),
            Some(face),
        ];
        let summary = p.save_all(&images).unwrap();

        assert_eq!(
            summary,
            SaveSummary {
                missing: 1,
                undecodable: 1,
                faces_saved: 2,
            }
        );
        assert_eq!(
            target.crop_paths().unwrap(),
            vec![target.crop_path(0, 0), target.crop_path(3, 0)]
        );
    }

    #[test]
    fn test_train_without_crops_fails_and_writes_no_model() {
        let root = tempfile::tempdir().unwrap();
        let target = new_target(root.path());
        let mut p = pipeline(target.clone(), false);

        let err = p.train().unwrap_err();
        assert!(matches!(err, PipelineError::NoTrainingSamples(_)));
        assert!(!target.model_path().exists());
        assert!(!p.has_model());
    }

    #[test]
    fn test_train_then_scan_recognizes_target() {
        let root = tempfile::tempdir().unwrap();
        let target = new_target(root.path());
        let mut p = pipeline(target.clone(), false);

        for (i, (x, y)) in [(40, 40), (60, 20), (20, 70)].into_iter().enumerate() {
            let img = canvas_with_square(200, 200, x, y, 70);
            assert_eq!(p.save_faces(i, &png_bytes(&img)).unwrap().len(), 1);
        }
        let samples = p.train().unwrap();
        assert_eq!(samples, 3);
        assert!(target.model_path().exists());

        // Paste a training crop, at training scale, onto a larger dark canvas.
        let stored = image::open(target.crop_path(0, 0)).unwrap().to_luma8();
        let face = resize_to_width(&stored, DEFAULT_RESIZE_WIDTH);
        let mut scene = GrayImage::from_pixel(320, 300, Luma([5]));
        image::imageops::replace(&mut scene, &face, 60, 40);

        // A fresh pipeline loads the model from disk.
        let mut p = pipeline(target.clone(), true);
        assert!(p.has_model());
        let report = p.scan(&png_bytes(&scene)).unwrap();

        assert_eq!(report.faces.len(), 1);
        let face = &report.faces[0];
        assert!(
            face.prediction.distance < DEFAULT_MATCH_THRESHOLD,
            "distance {}",
            face.prediction.distance
        );
        assert!(face.is_target);
        assert_eq!(face.label, "alice");
        assert!(report.found_target());
        assert_eq!(report.image.dimensions(), (320, 300));
    }

    #[test]
    fn test_scan_without_model_fails() {
        let root = tempfile::tempdir().unwrap();
        let mut p = pipeline(new_target(root.path()), false);
        let img = png_bytes(&canvas_with_square(100, 100, 10, 10, 40));
        assert!(matches!(p.scan(&img), Err(PipelineError::NotTrained(_))));
    }

    #[test]
    fn test_missing_model_file_with_flag_set_fails() {
        let root = tempfile::tempdir().unwrap();
        let result = FacePipeline::new(
            new_target(root.path()),
            BrightRegionDetector::default(),
            true,
            PipelineSettings::default(),
        );
        assert!(matches!(
            result.err(),
            Some(PipelineError::Recognizer(RecognizerError::ModelNotFound(_)))
        ));
    }

    #[test]
    fn test_scan_no_faces_reports_none() {
        let root = tempfile::tempdir().unwrap();
        let target = new_target(root.path());
        let mut p = pipeline(target, false);
        p.save_faces(0, &png_bytes(&canvas_with_square(200, 200, 10, 10, 60))).unwrap();
        p.train().unwrap();

        let report = p.scan(&png_bytes(&GrayImage::new(120, 80))).unwrap();
        assert!(report.faces.is_empty());
        assert!(!report.found_target());
    }

    fn pred(distance: f64) -> Prediction {
        Prediction { label: 0, distance }
    }

    #[test]
    fn test_classify_keeps_best_so_far() {
        let decisions = classify(&[pred(30.0), pred(20.0), pred(150.0)], 100.0);
        assert_eq!(decisions, vec![true, true, false]);

        let decisions = classify(&[pred(20.0), pred(30.0)], 100.0);
        assert_eq!(decisions, vec![true, false]);
    }

    #[test]
    fn test_classify_threshold() {
        assert_eq!(classify(&[pred(60.0)], 50.0), vec![false]);
        assert_eq!(classify(&[pred(100.0)], 100.0), vec![false]);
        assert!(classify(&[], 100.0).is_empty());
    }

    #[test]
    fn test_classify_lone_face_near_threshold_is_target() {
        // rounds to 0% confidence but is still below the threshold
        assert_eq!(classify(&[pred(99.6)], 100.0), vec![true]);
        assert_eq!(classify(&[pred(99.8), pred(150.0)], 100.0), vec![true, false]);
        // a later face at the same rounded confidence does not replace it
        assert_eq!(classify(&[pred(99.6), pred(99.9)], 100.0), vec![true, false]);
    }

    #[test]
    fn test_region_crop_matches_detector_output() {
        let img = canvas_with_square(200, 200, 30, 50, 40);
        let regions = BrightRegionDetector::default().detect(&img).unwrap();
        assert_eq!(
            regions,
            vec![Region { x: 30, y: 50, width: 40, height: 40 }]
        );
    }
}
