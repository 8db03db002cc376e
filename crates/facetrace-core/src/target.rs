//! On-disk layout of a target folder.
//!
//! ```text
//! <target>/
//!   capture-1.har     moved in by `init`
//!   0.jpg  0_1.jpg    face crops, numbered by source image
//!   target.yml        trained LBPH model (OpenCV YAML)
//! ```

use std::io;
use std::path::{Path, PathBuf};

const MODEL_FILE_NAME: &str = "target.yml";
const CROP_EXTENSION: &str = "jpg";
const HAR_EXTENSION: &str = "har";

/// A named person whose faces are collected and trained in one folder.
#[derive(Debug, Clone)]
pub struct Target {
    name: String,
    dir: PathBuf,
}

impl Target {
    /// Resolve a target name to its folder.
    ///
    /// Names starting with `.` or `/` are taken as paths; anything else is
    /// placed under `root`.
    pub fn resolve(root: &Path, name: &str) -> Self {
        let dir = if name.starts_with('.') || name.starts_with('/') {
            PathBuf::from(name)
        } else {
            root.join(name)
        };
        Self {
            name: name.to_string(),
            dir,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the serialized recognizer model.
    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE_NAME)
    }

    /// Path of the `face`-th crop taken from source image `index`.
    ///
    /// The first face keeps the bare index (`3.jpg`), later ones get a suffix
    /// (`3_1.jpg`, `3_2.jpg`) so several faces in one image do not collide.
    pub fn crop_path(&self, index: usize, face: usize) -> PathBuf {
        let file_name = if face == 0 {
            format!("{index}.{CROP_EXTENSION}")
        } else {
            format!("{index}_{face}.{CROP_EXTENSION}")
        };
        self.dir.join(file_name)
    }

    /// All face crops currently stored for this target, sorted by file name.
    pub fn crop_paths(&self) -> io::Result<Vec<PathBuf>> {
        list_with_extension(&self.dir, CROP_EXTENSION)
    }

    /// All HAR captures stored for this target, sorted by file name.
    pub fn har_paths(&self) -> io::Result<Vec<PathBuf>> {
        list_with_extension(&self.dir, HAR_EXTENSION)
    }
}

/// List regular files in `dir` with the given extension, sorted.
///
/// A missing directory lists as empty.
pub(crate) fn list_with_extension(dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
