//! facetrace-core — HAR harvesting, image download and face pipeline.
//!
//! Faces are found with an OpenCV Haar cascade and recognized with an
//! OpenCV LBPH model trained per target.

pub mod annotate;
pub mod detector;
pub mod fetch;
pub mod har;
pub mod pipeline;
pub mod recognizer;
pub mod target;
pub mod types;

pub use detector::{CascadeDetector, DetectorSettings, FaceDetector};
pub use fetch::{FetchSettings, Fetcher};
pub use har::HarArchive;
pub use pipeline::{FacePipeline, PipelineSettings, SaveSummary};
pub use recognizer::LbphRecognizer;
pub use target::Target;
pub use types::{FaceMatch, Prediction, Region, ScanReport};
