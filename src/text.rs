//! Text layout and drawing on the final raster.

use anyhow::{anyhow, Result};
use image::imageops;
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use rusttype::{Font, Scale};

/// Embedded font data - DejaVu Serif
const FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSerif.ttf");

pub fn load_font() -> Result<Font<'static>> {
    Font::try_from_bytes(FONT_DATA).ok_or_else(|| anyhow!("Failed to load embedded font"))
}

/// Which point of the text box sits on the label position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    TopLeft,
    TopCenter,
    CenterLeft,
    CenterRight,
    Center,
}

#[derive(Debug, Clone)]
pub struct Label {
    pub text: String,
    pub x: f32,
    pub y: f32,
    /// Font size in pixels.
    pub size: f32,
    pub anchor: Anchor,
    /// Rotated 90° counter-clockwise (reads bottom to top).
    pub vertical: bool,
    pub color: [u8; 3],
}

impl Label {
    pub fn new(text: impl Into<String>, x: f32, y: f32, size: f32, anchor: Anchor) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            size,
            anchor,
            vertical: false,
            color: [0, 0, 0],
        }
    }

    pub fn vertical(mut self) -> Self {
        self.vertical = true;
        self
    }
}

pub fn measure(font: &Font, size: f32, text: &str) -> (f32, f32) {
    let (w, h) = text_size(Scale::uniform(size), font, text);
    (w as f32, h.max(size.round() as i32) as f32)
}

/// Top-left corner of a `w`×`h` box anchored at (`x`, `y`).
fn origin(anchor: Anchor, x: f32, y: f32, w: f32, h: f32) -> (f32, f32) {
    match anchor {
        Anchor::TopLeft => (x, y),
        Anchor::TopCenter => (x - w / 2.0, y),
        Anchor::CenterLeft => (x, y - h / 2.0),
        Anchor::CenterRight => (x - w, y - h / 2.0),
        Anchor::Center => (x - w / 2.0, y - h / 2.0),
    }
}

pub fn draw_label(img: &mut RgbaImage, font: &Font, label: &Label) {
    let scale = Scale::uniform(label.size);
    let (w, h) = measure(font, label.size, &label.text);
    let [r, g, b] = label.color;
    let color = Rgba([r, g, b, 255]);

    if !label.vertical {
        let (x, y) = origin(label.anchor, label.x, label.y, w, h);
        draw_text_mut(img, color, x.round() as i32, y.round() as i32, scale, font, &label.text);
        return;
    }

    // Render horizontally on a white tile, then rotate into place.
    let mut tile = RgbaImage::from_pixel(w.ceil() as u32 + 2, h.ceil() as u32 + 2, Rgba([255, 255, 255, 255]));
    draw_text_mut(&mut tile, color, 1, 1, scale, font, &label.text);
    let rotated = imageops::rotate270(&tile);
    let (x, y) = origin(
        label.anchor,
        label.x,
        label.y,
        rotated.width() as f32,
        rotated.height() as f32,
    );
    imageops::replace(img, &rotated, x.round() as i64, y.round() as i64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_loads_and_measures() {
        let font = load_font().unwrap();
        let (w_short, h) = measure(&font, 20.0, "N");
        let (w_long, _) = measure(&font, 20.0, "Zona Condicionada");
        assert!(w_short > 0.0 && h >= 20.0);
        assert!(w_long > w_short * 5.0);
    }

    #[test]
    fn test_origin_anchors() {
        assert_eq!(origin(Anchor::TopLeft, 10.0, 10.0, 4.0, 2.0), (10.0, 10.0));
        assert_eq!(origin(Anchor::TopCenter, 10.0, 10.0, 4.0, 2.0), (8.0, 10.0));
        assert_eq!(origin(Anchor::CenterRight, 10.0, 10.0, 4.0, 2.0), (6.0, 9.0));
        assert_eq!(origin(Anchor::Center, 10.0, 10.0, 4.0, 2.0), (8.0, 9.0));
    }

    #[test]
    fn test_draw_label_marks_pixels() {
        let font = load_font().unwrap();
        let mut img = RgbaImage::from_pixel(200, 100, Rgba([255, 255, 255, 255]));
        draw_label(&mut img, &font, &Label::new("Ipiales", 100.0, 50.0, 24.0, Anchor::Center));
        assert!(img.pixels().any(|p| p.0[0] < 128));

        let mut img = RgbaImage::from_pixel(100, 200, Rgba([255, 255, 255, 255]));
        draw_label(&mut img, &font, &Label::new("Latitud", 50.0, 100.0, 20.0, Anchor::Center).vertical());
        assert!(img.pixels().any(|p| p.0[0] < 128));
    }
}
