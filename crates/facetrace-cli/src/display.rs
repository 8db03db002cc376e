use anyhow::{Context, Result};
use image::RgbImage;
use minifb::{KeyRepeat, Window, WindowOptions};

const TARGET_FPS: usize = 30;

/// Show `image` in a window until a key is pressed or the window is closed.
pub fn show(title: &str, image: &RgbImage) -> Result<()> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let buffer = to_rgb32(image);

    let mut window = Window::new(title, width, height, WindowOptions::default())
        .context("open display window")?;
    window.set_target_fps(TARGET_FPS);

    tracing::debug!(width, height, "showing scan result, press any key to close");
    while window.is_open() && window.get_keys_pressed(KeyRepeat::No).is_empty() {
        window
            .update_with_buffer(&buffer, width, height)
            .context("update display window")?;
    }
    Ok(())
}

/// Pack pixels as `0x00RRGGBB`, the layout minifb expects.
fn to_rgb32(image: &RgbImage) -> Vec<u32> {
    image
        .pixels()
        .map(|p| (u32::from(p[0]) << 16) | (u32::from(p[1]) << 8) | u32::from(p[2]))
        .collect()
}
