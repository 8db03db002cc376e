//! Draw scan results onto the scanned image.

use crate::types::ScanReport;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;

const BOX_COLOR: Rgb<u8> = Rgb([0, 225, 0]);
const BOX_THICKNESS: i32 = 2;
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const CONFIDENCE_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const TEXT_SCALE: f32 = 24.0;
const TEXT_MARGIN: i32 = 5;

/// Load a TrueType/OpenType font for labels.
///
/// Returns `None` (with a warning) when the file is missing or unreadable,
/// in which case only boxes are drawn.
pub fn load_font(path: &Path) -> Option<FontVec> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "label font unavailable, drawing boxes only");
            return None;
        }
    };
    match FontVec::try_from_vec(bytes) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "invalid label font, drawing boxes only");
            None
        }
    }
}

/// Copy of the scanned image with a box per face, the label above it and
/// the confidence inside its bottom edge.
pub fn annotate(report: &ScanReport, font: Option<&FontVec>) -> RgbImage {
    let mut canvas = report.image.clone();

    for face in &report.faces {
        let r = &face.region;
        for inset in 0..BOX_THICKNESS {
            let w = r.width as i32 - 2 * inset;
            let h = r.height as i32 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(r.x as i32 + inset, r.y as i32 + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
        }

        let Some(font) = font else {
            continue;
        };
        let scale = PxScale::from(TEXT_SCALE);
        let text_x = r.x as i32 + TEXT_MARGIN;
        let label_y = r.y as i32 - TEXT_MARGIN - TEXT_SCALE as i32;
        let confidence_y = (r.y + r.height) as i32 - TEXT_MARGIN - TEXT_SCALE as i32;

        draw_text_mut(&mut canvas, LABEL_COLOR, text_x, label_y, scale, font, &face.label);
        let confidence = format!(" {}%", face.prediction.confidence_pct());
        draw_text_mut(
            &mut canvas,
            CONFIDENCE_COLOR,
            text_x,
            confidence_y,
            scale,
            font,
            &confidence,
        );
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FaceMatch, Prediction, Region};

    fn report(region: Region) -> ScanReport {
        ScanReport {
            image: RgbImage::new(100, 100),
            faces: vec![FaceMatch {
                region,
                prediction: Prediction { label: 0, distance: 20.0 },
                is_target: true,
                label: "alice".into(),
            }],
        }
    }

    #[test]
    fn test_box_drawn_two_pixels_thick() {
        let region = Region { x: 10, y: 20, width: 30, height: 40 };
        let out = annotate(&report(region), None);

        assert_eq!(*out.get_pixel(10, 20), BOX_COLOR);
        assert_eq!(*out.get_pixel(11, 21), BOX_COLOR);
        assert_eq!(*out.get_pixel(39, 59), BOX_COLOR);
        assert_eq!(*out.get_pixel(25, 40), Rgb([0, 0, 0]), "interior untouched");
        assert_eq!(*out.get_pixel(12, 40), Rgb([0, 0, 0]), "third ring untouched");
    }

    #[test]
    fn test_source_image_unchanged() {
        let region = Region { x: 0, y: 0, width: 10, height: 10 };
        let r = report(region);
        let _ = annotate(&r, None);
        assert!(r.image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_tiny_region_does_not_panic() {
        let region = Region { x: 99, y: 99, width: 1, height: 1 };
        let out = annotate(&report(region), None);
        assert_eq!(*out.get_pixel(99, 99), BOX_COLOR);
    }

    #[test]
    fn test_missing_font_is_none() {
        assert!(load_font(Path::new("/nonexistent/font.ttf")).is_none());
    }

    #[test]
    fn test_invalid_font_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("font.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(load_font(&path).is_none());
    }
}
