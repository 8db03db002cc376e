use anyhow::{Context, Result};
use facetrace_core::{DetectorSettings, FetchSettings, PipelineSettings};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "facetrace.toml";

/// CLI configuration: defaults, then an optional TOML file, then
/// `FACETRACE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Folder that plain target names are resolved under.
    pub targets_dir: PathBuf,
    /// Folder scanned for new `*.har` captures.
    pub har_source_dir: PathBuf,
    /// Haar cascade classifier XML file.
    pub classifier_path: PathBuf,
    /// Extension of the media URLs harvested from HAR captures.
    pub media_type: String,
    /// Concurrent downloads.
    pub workers: usize,
    /// Per-request timeout in seconds.
    pub fetch_timeout_secs: u64,
    /// Recognizer distance below which a face may be the target.
    pub match_threshold: f64,
    /// Working width for harvested images and training crops.
    pub resize_width: u32,
    /// Font used for scan labels.
    pub font_path: PathBuf,
    /// Size ratio between detection pyramid levels.
    pub scale_factor: f64,
    /// Overlapping detections needed to keep a face.
    pub min_neighbors: i32,
    /// Smallest face side the detector reports, in pixels.
    pub min_face_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        let detector = DetectorSettings::default();
        Self {
            targets_dir: PathBuf::from("."),
            har_source_dir: PathBuf::from("."),
            classifier_path: PathBuf::from("classifiers/haar_frontal_face.xml"),
            media_type: "jpg".to_string(),
            workers: facetrace_core::fetch::DEFAULT_WORKERS,
            fetch_timeout_secs: facetrace_core::fetch::DEFAULT_TIMEOUT.as_secs(),
            match_threshold: facetrace_core::pipeline::DEFAULT_MATCH_THRESHOLD,
            resize_width: facetrace_core::pipeline::DEFAULT_RESIZE_WIDTH,
            font_path: PathBuf::from("/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf"),
            scale_factor: detector.scale_factor,
            min_neighbors: detector.min_neighbors,
            min_face_size: detector.min_face_size,
        }
    }
}

impl Config {
    /// Load the layered configuration.
    ///
    /// The file is `explicit` if given, else `$FACETRACE_CONFIG`, else
    /// `./facetrace.toml` when it exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let file = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("FACETRACE_CONFIG").ok().map(PathBuf::from))
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            });

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("parse config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Override fields from environment-style lookups.
    ///
    /// Values that fail to parse leave the field as it was.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACETRACE_TARGETS_DIR") {
            self.targets_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACETRACE_HAR_SOURCE_DIR") {
            self.har_source_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACETRACE_CLASSIFIER_PATH") {
            self.classifier_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACETRACE_MEDIA_TYPE") {
            self.media_type = v;
        }
        if let Some(v) = lookup("FACETRACE_FONT_PATH") {
            self.font_path = PathBuf::from(v);
        }
        self.workers = parsed(&lookup, "FACETRACE_WORKERS", self.workers);
        self.fetch_timeout_secs =
            parsed(&lookup, "FACETRACE_FETCH_TIMEOUT_SECS", self.fetch_timeout_secs);
        self.match_threshold = parsed(&lookup, "FACETRACE_MATCH_THRESHOLD", self.match_threshold);
        self.resize_width = parsed(&lookup, "FACETRACE_RESIZE_WIDTH", self.resize_width);
        self.scale_factor = parsed(&lookup, "FACETRACE_SCALE_FACTOR", self.scale_factor);
        self.min_neighbors = parsed(&lookup, "FACETRACE_MIN_NEIGHBORS", self.min_neighbors);
        self.min_face_size = parsed(&lookup, "FACETRACE_MIN_FACE_SIZE", self.min_face_size);
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            workers: self.workers,
            timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            resize_width: self.resize_width,
            match_threshold: self.match_threshold,
        }
    }

    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            scale_factor: self.scale_factor,
            min_neighbors: self.min_neighbors,
            min_face_size: self.min_face_size,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparseable setting");
                current
            }
        },
        None => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.workers, 6);
        assert_eq!(c.media_type, "jpg");
        assert_eq!(c.resize_width, 200);
        assert_eq!(c.match_threshold, 100.0);
        assert_eq!(c.fetch_settings().timeout, Duration::from_secs(30));
        assert_eq!(c.detector_settings().min_face_size, 30);
        assert_eq!(c.detector_settings().min_neighbors, 4);
        assert_eq!(c.classifier_path, PathBuf::from("classifiers/haar_frontal_face.xml"));
    }

    #[test]
    fn test_env_overrides() {
        let mut c = Config::default();
        c.apply_env(env(&[
            ("FACETRACE_WORKERS", "3"),
            ("FACETRACE_MEDIA_TYPE", "png"),
            ("FACETRACE_MATCH_THRESHOLD", "80.5"),
            ("FACETRACE_TARGETS_DIR", "/srv/targets"),
            ("FACETRACE_MIN_FACE_SIZE", "48"),
            ("FACETRACE_MIN_NEIGHBORS", "6"),
        ]));
        assert_eq!(c.detector_settings().min_face_size, 48);
        assert_eq!(c.detector_settings().min_neighbors, 6);
        assert_eq!(c.workers, 3);
        assert_eq!(c.media_type, "png");
        assert_eq!(c.match_threshold, 80.5);
        assert_eq!(c.targets_dir, PathBuf::from("/srv/targets"));
    }

    #[test]
    fn test_unparseable_env_keeps_previous() {
        let mut c = Config::default();
        c.workers = 4;
        c.apply_env(env(&[("FACETRACE_WORKERS", "many"), ("FACETRACE_RESIZE_WIDTH", "")]));
        assert_eq!(c.workers, 4);
        assert_eq!(c.resize_width, 200);
    }

    #[test]
    fn test_toml_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facetrace.toml");
        std::fs::write(
            &path,
            "workers = 2\nclassifier_path = \"/opt/models/haar.xml\"\n",
        )
        .unwrap();

        let c = Config::from_file(&path).unwrap();
        assert_eq!(c.workers, 2);
        assert_eq!(c.classifier_path, PathBuf::from("/opt/models/haar.xml"));
        assert_eq!(c.media_type, "jpg");
    }

    #[test]
    fn test_toml_file_unknown_key_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facetrace.toml");
        std::fs::write(&path, "wrokers = 2\n").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/facetrace.toml"))).is_err());
    }
}
