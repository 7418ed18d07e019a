//! Timestamp watermark drawn onto saved screenshots.

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use image::{DynamicImage, Rgb};
use imageproc::drawing::{draw_text_mut, text_size};
use log::debug;
use std::path::{Path, PathBuf};

const TEXT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Fonts tried in order when none is configured.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    r"C:\Windows\Fonts\arial.ttf",
];

/// Corner the watermark is drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    BottomLeft,
    BottomRight,
}

/// Where and how large the text is drawn. `x` is the horizontal middle of the text,
/// `baseline` the y of its baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: i32,
    pub baseline: i32,
    pub font_px: u32,
}

impl Position {
    pub fn placement(&self, width: u32, height: u32) -> Placement {
        let (w, h) = (width as f64, height as f64);
        let baseline = (h - h / 50.0) as i32;
        match self {
            Position::BottomLeft => Placement {
                x: (w / 4.0) as i32,
                baseline,
                font_px: ((h / 18.0) as u32).max(1),
            },
            Position::BottomRight => Placement {
                x: (w - w / 5.0) as i32,
                baseline,
                font_px: ((w / 20.0) as u32).max(1),
            },
        }
    }
}

/// Text of the watermark for a capture started at `time`.
pub fn label(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M").to_string()
}

/// Loads the configured font, or the first system font found.
pub fn load_font(configured: Option<&Path>) -> Result<FontVec> {
    let path: PathBuf = match configured {
        Some(path) => path.to_path_buf(),
        None => SYSTEM_FONTS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.is_file())
            .ok_or_else(|| anyhow!("No watermark font found. Set [browser] font"))?,
    };
    let data = std::fs::read(&path)
        .with_context(|| format!("Failed to read font {}", path.display()))?;
    debug!("watermark font {}", path.display());
    FontVec::try_from_vec(data).with_context(|| format!("Invalid font {}", path.display()))
}

/// Draws `text` in red, centered on `placement.x` with its baseline at `placement.baseline`.
pub fn draw(img: &DynamicImage, position: Position, text: &str, font: &impl Font) -> DynamicImage {
    let mut canvas = img.to_rgb8();
    let placement = position.placement(canvas.width(), canvas.height());
    let scale = PxScale::from(placement.font_px as f32);

    let (text_width, _) = text_size(scale, font, text);
    let ascent = font.as_scaled(scale).ascent();
    let x = placement.x - (text_width / 2) as i32;
    let y = placement.baseline - ascent.round() as i32;

    draw_text_mut(&mut canvas, TEXT_COLOR, x, y, scale, font, text);
    DynamicImage::ImageRgb8(canvas)
}

/// Rewrites the image at `path` with the capture time watermark.
pub fn apply(path: &Path, position: Position, time: DateTime<Utc>, font: &impl Font) -> Result<()> {
    let img = image::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    draw(&img, position, &label(time), font)
        .save(path)
        .with_context(|| format!("Failed to save watermarked {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::RgbImage;

    #[test]
    fn bottom_left_placement() {
        assert_eq!(
            Position::BottomLeft.placement(556, 600),
            Placement {
                x: 139,
                baseline: 588,
                font_px: 33,
            }
        );
    }

    #[test]
    fn bottom_right_placement() {
        assert_eq!(
            Position::BottomRight.placement(800, 740),
            Placement {
                x: 640,
                baseline: 725,
                font_px: 40,
            }
        );
    }

    #[test]
    fn tiny_images_keep_a_font_size() {
        assert_eq!(Position::BottomRight.placement(10, 10).font_px, 1);
    }

    #[test]
    fn label_format() {
        let t = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 59).unwrap();
        assert_eq!(label(t), "2025-01-02 03:04");
    }

    #[test]
    fn missing_configured_font() {
        assert!(load_font(Some(Path::new("/no/such/font.ttf"))).is_err());
    }

    #[test]
    fn draws_red_pixels_near_the_anchor() {
        let Ok(font) = load_font(None) else {
            // no system font on this machine
            return;
        };
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 300, Rgb([255, 255, 255])));
        let out = draw(&img, Position::BottomRight, "2025-01-02 03:04", &font).to_rgb8();
        assert_eq!(out.dimensions(), (400, 300));

        let red = out
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] > 200 && p[1] < 80 && p[2] < 80)
            .map(|(x, y, _)| (x, y))
            .collect::<Vec<_>>();
        assert!(!red.is_empty());
        assert!(red.iter().all(|(_, y)| *y > 200));
    }
}
