use image::RgbImage;

/// Label assigned to every training sample. Only one target is ever trained.
pub const TARGET_LABEL: i32 = 0;

/// Label shown for faces that do not match the target.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Axis-aligned face rectangle in pixel coordinates of the image it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Clip a possibly out-of-bounds rectangle to a `bounds_w × bounds_h` image.
    ///
    /// Returns `None` when nothing of the rectangle is left inside the image.
    pub fn clamped(
        x: i64,
        y: i64,
        width: i64,
        height: i64,
        bounds_w: u32,
        bounds_h: u32,
    ) -> Option<Self> {
        let x0 = x.clamp(0, bounds_w as i64);
        let y0 = y.clamp(0, bounds_h as i64);
        let x1 = (x + width).clamp(0, bounds_w as i64);
        let y1 = (y + height).clamp(0, bounds_h as i64);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(Self {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

/// Output of a single recognizer prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Label of the nearest training sample, or -1 beyond the model threshold.
    pub label: i32,
    /// LBPH histogram distance to the nearest training sample. Lower = more similar.
    pub distance: f64,
}

impl Prediction {
    /// Confidence shown to the user: `100 - distance`, rounded. May be negative.
    pub fn confidence_pct(&self) -> i64 {
        (100.0 - self.distance).round() as i64
    }
}

/// One detected face in a scanned image and how it was classified.
#[derive(Debug, Clone)]
pub struct FaceMatch {
    pub region: Region,
    pub prediction: Prediction,
    /// True when this face was labelled as the target.
    pub is_target: bool,
    /// Target name or [`UNKNOWN_LABEL`].
    pub label: String,
}

/// Result of scanning one image for the target.
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// The decoded color image, unmodified.
    pub image: RgbImage,
    pub faces: Vec<FaceMatch>,
}

impl ScanReport {
    /// Whether any face in the image was labelled as the target.
    pub fn found_target(&self) -> bool {
        self.faces.iter().any(|f| f.is_target)
    }
}
