//! LBPH (local binary pattern histogram) face recognizer.
//!
//! Thin wrapper over OpenCV's `face::LBPHFaceRecognizer`. The model is
//! persisted with OpenCV's own YAML writer.

use crate::detector::to_mat;
use crate::types::Prediction;
use image::GrayImage;
use opencv::core::{Mat, Ptr, Vector};
use opencv::face::{FaceRecognizerTrait, FaceRecognizerTraitConst, LBPHFaceRecognizer};
use std::path::{Path, PathBuf};
use thiserror::Error;

// --- Named constants (classic LBPH parameterisation) ---
const LBPH_RADIUS: i32 = 1;
const LBPH_NEIGHBORS: i32 = 8;
const LBPH_GRID_X: i32 = 8;
const LBPH_GRID_Y: i32 = 8;
/// Label OpenCV reports when no sample is closer than the threshold.
pub const NO_MATCH_LABEL: i32 = -1;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("cannot train on an empty sample set")]
    EmptyTrainingSet,
    #[error("{samples} samples but {labels} labels")]
    LabelMismatch { samples: usize, labels: usize },
    #[error("recognizer has not been trained")]
    NotTrained,
    #[error("model file not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("model path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),
    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// Parameters passed to `LBPHFaceRecognizer::create`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LbphParams {
    pub radius: i32,
    pub neighbors: i32,
    pub grid_x: i32,
    pub grid_y: i32,
    /// Distances above this yield [`NO_MATCH_LABEL`].
    pub threshold: f64,
}

impl Default for LbphParams {
    fn default() -> Self {
        Self {
            radius: LBPH_RADIUS,
            neighbors: LBPH_NEIGHBORS,
            grid_x: LBPH_GRID_X,
            grid_y: LBPH_GRID_Y,
            threshold: f64::MAX,
        }
    }
}

/// Trained (or empty) LBPH model.
pub struct LbphRecognizer {
    inner: Ptr<LBPHFaceRecognizer>,
    trained: bool,
}

impl LbphRecognizer {
    pub fn new(params: LbphParams) -> Result<Self, RecognizerError> {
        let inner = LBPHFaceRecognizer::create(
            params.radius,
            params.neighbors,
            params.grid_x,
            params.grid_y,
            params.threshold,
        )?;
        Ok(Self {
            inner,
            trained: false,
        })
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Replace the model with one trained on `samples`.
    pub fn train(&mut self, samples: &[GrayImage], labels: &[i32]) -> Result<(), RecognizerError> {
        if samples.is_empty() {
            return Err(RecognizerError::EmptyTrainingSet);
        }
        if samples.len() != labels.len() {
            return Err(RecognizerError::LabelMismatch {
                samples: samples.len(),
                labels: labels.len(),
            });
        }

        let mats = samples
            .iter()
            .map(to_mat)
            .collect::<opencv::Result<Vector<Mat>>>()?;
        let labels = Vector::<i32>::from_slice(labels);
        FaceRecognizerTrait::train(&mut self.inner, &mats, &labels)?;

        self.trained = true;
        tracing::info!(samples = samples.len(), "LBPH model trained");
        Ok(())
    }

    /// Find the nearest training sample to `face`.
    pub fn predict(&self, face: &GrayImage) -> Result<Prediction, RecognizerError> {
        if !self.trained {
            return Err(RecognizerError::NotTrained);
        }
        let mat = to_mat(face)?;

        let mut label = NO_MATCH_LABEL;
        let mut distance = f64::MAX;
        FaceRecognizerTraitConst::predict(&self.inner, &mat, &mut label, &mut distance)?;

        Ok(Prediction { label, distance })
    }

    /// Write the model file.
    pub fn save(&self, path: &Path) -> Result<(), RecognizerError> {
        if !self.trained {
            return Err(RecognizerError::NotTrained);
        }
        FaceRecognizerTraitConst::write(&self.inner, utf8(path)?)?;
        tracing::info!(path = %path.display(), "saved LBPH model");
        Ok(())
    }

    /// Read a model written by [`save`](Self::save).
    pub fn load(path: &Path, params: LbphParams) -> Result<Self, RecognizerError> {
        if !path.is_file() {
            return Err(RecognizerError::ModelNotFound(path.to_path_buf()));
        }
        let mut model = Self::new(params)?;
        FaceRecognizerTrait::read(&mut model.inner, utf8(path)?)?;
        model.trained = true;
        tracing::info!(path = %path.display(), "loaded LBPH model");
        Ok(model)
    }
}

fn utf8(path: &Path) -> Result<&str, RecognizerError> {
    path.to_str()
        .ok_or_else(|| RecognizerError::InvalidPath(path.to_path_buf()))
}
