use crate::cartography;
use crate::clip::{clip_layer, clip_points};
use crate::config::{CropConfig, Marker, RenderConfig, Window};
use crate::text::{self, Label};
use crate::types::{CropPoint, Layers};
use anyhow::{anyhow, bail, Context, Result};
use geo::MultiPolygon;
use image::{ImageFormat, Rgba, RgbaImage};
use rusttype::Font;
use std::fs;
use std::path::Path;
use tiny_skia::{FillRule, Paint, Path as SkPath, PathBuilder, Pixmap, Stroke, Transform};
use tracing::info;

/// Maps target CRS coordinates onto the plot area of the figure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
    pub window: Window,
}

impl Frame {
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn to_px(&self, x: f64, y: f64) -> (f32, f32) {
        let w = &self.window;
        let px = self.left as f64 + (x - w.xmin) / w.width() * self.width as f64;
        let py = self.top as f64 + (w.ymax - y) / w.height() * self.height as f64;
        (px as f32, py as f32)
    }

    /// Axes fraction (origin bottom-left) to pixels.
    pub fn fraction(&self, fx: f32, fy: f32) -> (f32, f32) {
        (self.left + fx * self.width, self.bottom() - fy * self.height)
    }

    /// Horizontal data length in pixels.
    pub fn scale_x(&self, length: f64) -> f32 {
        (length / self.window.width() * self.width as f64) as f32
    }

    pub fn scale_y(&self, length: f64) -> f32 {
        (length / self.window.height() * self.height as f64) as f32
    }
}

/// Canvas for one map. Shapes go to the pixmap immediately; text is queued and
/// drawn last, on top of everything.
pub struct Figure {
    pub pixmap: Pixmap,
    pub frame: Frame,
    /// Pixels per typographic point.
    pub pt: f32,
    pub font: Font<'static>,
    pub labels: Vec<Label>,
}

// Figure margins in pt, leaving room for tick labels and axis titles.
const MARGIN_LEFT: f32 = 80.0;
const MARGIN_RIGHT: f32 = 20.0;
const MARGIN_TOP: f32 = 20.0;
const MARGIN_BOTTOM: f32 = 60.0;

impl Figure {
    pub fn new(config: &RenderConfig) -> Result<Self> {
        let width = (config.width_in * config.dpi).round() as u32;
        let height = (config.height_in * config.dpi).round() as u32;
        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("Cannot allocate a {}x{} canvas", width, height))?;
        pixmap.fill(skia_color(parse_hex(&config.background)?, 1.0));

        let pt = config.dpi / 72.0;
        let frame = layout_frame(width as f32, height as f32, pt, config.window)?;

        Ok(Self {
            pixmap,
            frame,
            pt,
            font: text::load_font()?,
            labels: Vec::new(),
        })
    }

    pub fn fill_path(&mut self, path: &SkPath, color: [u8; 3], alpha: f32) {
        let paint = paint(color, alpha);
        self.pixmap
            .fill_path(path, &paint, FillRule::EvenOdd, Transform::identity(), None);
    }

    /// `width` in pt.
    pub fn stroke_path(&mut self, path: &SkPath, color: [u8; 3], alpha: f32, width: f32) {
        let stroke = Stroke {
            width: width * self.pt,
            ..Stroke::default()
        };
        self.stroke_with(path, color, alpha, &stroke);
    }

    pub fn stroke_with(&mut self, path: &SkPath, color: [u8; 3], alpha: f32, stroke: &Stroke) {
        let paint = paint(color, alpha);
        self.pixmap
            .stroke_path(path, &paint, stroke, Transform::identity(), None);
    }

    pub fn polygon_path(&self, geometry: &MultiPolygon<f64>) -> Option<SkPath> {
        let mut pb = PathBuilder::new();
        for polygon in geometry {
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                let mut coords = ring.coords();
                let Some(first) = coords.next() else { continue };
                let (x, y) = self.frame.to_px(first.x, first.y);
                pb.move_to(x, y);
                for c in coords {
                    let (x, y) = self.frame.to_px(c.x, c.y);
                    pb.line_to(x, y);
                }
                pb.close();
            }
        }
        pb.finish()
    }

    /// Draws a marker centred on (`x`, `y`) px; `size` is the marker area in pt².
    pub fn marker(&mut self, marker: Marker, x: f32, y: f32, size: f32, color: [u8; 3]) {
        let half = size.max(0.0).sqrt() / 2.0 * self.pt;
        if let Some(path) = marker_path(marker, x, y, half) {
            self.fill_path(&path, color, 1.0);
            self.stroke_path(&path, [255, 255, 255], 1.0, 0.3);
        }
    }

    pub fn label(&mut self, label: Label) {
        self.labels.push(label);
    }

    /// Pixel size of `text` at `size_pt`.
    pub fn measure(&self, size_pt: f32, content: &str) -> (f32, f32) {
        text::measure(&self.font, size_pt * self.pt, content)
    }

    pub fn into_image(self) -> RgbaImage {
        let mut img = RgbaImage::new(self.pixmap.width(), self.pixmap.height());
        for (dst, src) in img.pixels_mut().zip(self.pixmap.pixels()) {
            let c = src.demultiply();
            *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
        }
        for label in &self.labels {
            text::draw_label(&mut img, &self.font, label);
        }
        img
    }
}

/// Equal-aspect plot area centred in the space left by the margins.
pub fn layout_frame(width: f32, height: f32, pt: f32, window: Window) -> Result<Frame> {
    let avail_w = width - (MARGIN_LEFT + MARGIN_RIGHT) * pt;
    let avail_h = height - (MARGIN_TOP + MARGIN_BOTTOM) * pt;
    if avail_w <= 0.0 || avail_h <= 0.0 {
        bail!("Figure of {}x{} px is too small for the map frame", width, height);
    }

    let aspect = (window.width() / window.height()) as f32;
    let (w, h) = if avail_w / avail_h > aspect {
        (avail_h * aspect, avail_h)
    } else {
        (avail_w, avail_w / aspect)
    };

    Ok(Frame {
        left: MARGIN_LEFT * pt + (avail_w - w) / 2.0,
        top: MARGIN_TOP * pt + (avail_h - h) / 2.0,
        width: w,
        height: h,
        window,
    })
}

pub fn marker_path(marker: Marker, x: f32, y: f32, half: f32) -> Option<SkPath> {
    match marker {
        Marker::Circle => PathBuilder::from_circle(x, y, half),
        Marker::Square => {
            tiny_skia::Rect::from_xywh(x - half, y - half, 2.0 * half, 2.0 * half).map(PathBuilder::from_rect)
        }
        Marker::TriangleUp | Marker::TriangleDown => {
            let dir = if marker == Marker::TriangleUp { 1.0 } else { -1.0 };
            let mut pb = PathBuilder::new();
            pb.move_to(x, y - dir * half);
            pb.line_to(x + half, y + dir * half);
            pb.line_to(x - half, y + dir * half);
            pb.close();
            pb.finish()
        }
    }
}

pub fn parse_hex(hex: &str) -> Result<[u8; 3]> {
    let digits = hex.trim().trim_start_matches('#');
    let channel = |i: usize| {
        digits
            .get(i..i + 2)
            .and_then(|s| u8::from_str_radix(s, 16).ok())
            .ok_or_else(|| anyhow!("Invalid hex color: {:?}", hex))
    };
    if digits.len() != 6 {
        bail!("Invalid hex color: {:?}", hex);
    }
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

fn skia_color(rgb: [u8; 3], alpha: f32) -> tiny_skia::Color {
    let [r, g, b] = rgb;
    tiny_skia::Color::from_rgba8(r, g, b, (alpha.clamp(0.0, 1.0) * 255.0).round() as u8)
}

fn paint(color: [u8; 3], alpha: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(skia_color(color, alpha));
    paint.anti_alias = true;
    paint
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    pub width: u32,
    pub height: u32,
    pub boundary_parts: usize,
    pub zoning_parts: usize,
    pub points_drawn: usize,
}

/// Draws the complete map: layers clipped to the window, then axes, legend,
/// scale bar and north arrow.
pub fn draw_map(
    config: &RenderConfig,
    crops: &[CropConfig],
    layers: &Layers,
    points: &[CropPoint],
) -> Result<(RgbaImage, RenderStats)> {
    let window = config.window;
    let mut fig = Figure::new(config)?;

    let boundary = clip_layer(layers.boundary.iter().map(|m| &m.geometry), &window);
    let zoning = clip_layer(layers.zoning.iter().map(|z| &z.geometry), &window);
    let visible = clip_points(points, &window);

    let crop_colors = crops
        .iter()
        .map(|c| parse_hex(&c.color))
        .collect::<Result<Vec<_>>>()?;
    let zoning_fill = parse_hex(&config.zoning.fill)?;
    let zoning_edge = parse_hex(&config.zoning.edge)?;
    let boundary_color = parse_hex(&config.boundary.color)?;

    for geometry in &boundary {
        if let Some(path) = fig.polygon_path(geometry) {
            fig.stroke_path(&path, boundary_color, 1.0, config.boundary.line_width);
        }
    }
    for geometry in &zoning {
        if let Some(path) = fig.polygon_path(geometry) {
            fig.fill_path(&path, zoning_fill, config.zoning.alpha);
            fig.stroke_path(&path, zoning_edge, config.zoning.alpha, config.zoning.line_width);
        }
    }

    // Crop by crop, in configured order, so rarer crops sit on top.
    for (index, crop) in crops.iter().enumerate() {
        for p in visible.iter().filter(|p| p.crop == index) {
            let (x, y) = fig.frame.to_px(p.point.x(), p.point.y());
            fig.marker(crop.marker, x, y, crop.size, crop_colors[index]);
        }
    }

    cartography::draw_grid(&mut fig, config);
    cartography::draw_axes(&mut fig, config);
    cartography::draw_legend(&mut fig, config, crops)?;
    cartography::draw_scale_bar(&mut fig, config);
    cartography::draw_north_arrow(&mut fig);

    let stats = RenderStats {
        width: fig.pixmap.width(),
        height: fig.pixmap.height(),
        boundary_parts: boundary.len(),
        zoning_parts: zoning.len(),
        points_drawn: visible.len(),
    };
    Ok((fig.into_image(), stats))
}

pub fn render_map(
    config: &RenderConfig,
    crops: &[CropConfig],
    layers: &Layers,
    points: &[CropPoint],
) -> Result<RenderStats> {
    info!("Rendering map to {:?}...", config.output);
    let (img, stats) = draw_map(config, crops, layers, points)?;
    save_png(&img, &config.output)?;
    info!(
        "Wrote {}x{} image with {} boundary part(s), {} zoning part(s), {} point(s)",
        stats.width, stats.height, stats.boundary_parts, stats.zoning_parts, stats.points_drawn
    );
    Ok(stats)
}

pub fn save_png(img: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory: {:?}", dir))?;
    }
    img.save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to save map image: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_crops;
    use crate::types::{Municipality, ZoningArea};
    use geo::{polygon, Point};

    fn small_config() -> RenderConfig {
        RenderConfig {
            dpi: 30.0,
            ..RenderConfig::default()
        }
    }

    fn square(x: f64, y: f64, side: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + side, y: y),
            (x: x + side, y: y + side),
            (x: x, y: y + side),
        ]])
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("#4daf4a").unwrap(), [0x4d, 0xaf, 0x4a]);
        assert_eq!(parse_hex("FFFFFF").unwrap(), [255, 255, 255]);
        assert!(parse_hex("#12345").is_err());
        assert!(parse_hex("#zzzzzz").is_err());
    }

    #[test]
    fn test_frame_is_square_and_maps_corners() {
        let config = RenderConfig::default();
        let frame = layout_frame(4500.0, 3000.0, config.dpi / 72.0, config.window).unwrap();
        assert!((frame.width - frame.height).abs() < 1e-3);

        let (x0, y0) = frame.to_px(config.window.xmin, config.window.ymax);
        assert!((x0 - frame.left).abs() < 1e-3 && (y0 - frame.top).abs() < 1e-3);
        let (x1, y1) = frame.to_px(config.window.xmax, config.window.ymin);
        assert!((x1 - frame.right()).abs() < 1e-2 && (y1 - frame.bottom()).abs() < 1e-2);
        assert_eq!(frame.fraction(0.0, 0.0), (frame.left, frame.bottom()));
    }

    #[test]
    fn test_tiny_figure_is_rejected() {
        assert!(layout_frame(50.0, 50.0, 1.0, RenderConfig::default().window).is_err());
    }

    #[test]
    fn test_marker_paths() {
        for marker in [Marker::Circle, Marker::Square, Marker::TriangleUp, Marker::TriangleDown] {
            let path = marker_path(marker, 50.0, 50.0, 5.0).unwrap();
            let bounds = path.bounds();
            assert!((bounds.width() - 10.0).abs() < 0.5, "{:?}", marker);
        }
    }

    #[test]
    fn test_draw_map_paints_layers() {
        let config = small_config();
        let zone = square(590_000.0, 570_000.0, 10_000.0);
        let layers = Layers {
            boundary: vec![Municipality {
                name: "X".into(),
                geometry: square(570_000.0, 550_000.0, 60_000.0),
            }],
            zoning: vec![ZoningArea {
                municipality: "X".into(),
                category: "Condicionada".into(),
                geometry: zone,
            }],
        };
        let points = vec![
            CropPoint { point: Point::new(595_000.0, 575_000.0), crop: 0, zone: 0 },
            CropPoint { point: Point::new(700_000.0, 575_000.0), crop: 1, zone: 0 },
        ];

        let (img, stats) = draw_map(&config, &default_crops(), &layers, &points).unwrap();
        assert_eq!((img.width(), img.height()), (450, 300));
        assert_eq!(stats.points_drawn, 1);
        assert_eq!(stats.boundary_parts, 1);
        assert_eq!(stats.zoning_parts, 1);

        // Background stays white in the figure corner.
        assert_eq!(img.get_pixel(1, 1).0, [255, 255, 255, 255]);

        // Zoning fill tints the plot area green.
        let frame = layout_frame(450.0, 300.0, config.dpi / 72.0, config.window).unwrap();
        let (x, y) = frame.to_px(592_000.0, 578_000.0);
        let px = img.get_pixel(x as u32, y as u32).0;
        assert!(px[1] > px[0] && px[1] > px[2], "{:?}", px);

        // The papa marker is blue.
        let (x, y) = frame.to_px(595_000.0, 575_000.0);
        let px = img.get_pixel(x.round() as u32, y.round() as u32).0;
        assert!(px[2] > px[0], "{:?}", px);
    }

    #[test]
    fn test_render_map_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig {
            output: dir.path().join("nested").join("map.png"),
            ..small_config()
        };
        let layers = Layers { boundary: vec![], zoning: vec![] };

        let stats = render_map(&config, &default_crops(), &layers, &[]).unwrap();
        let written = image::open(&config.output).unwrap();
        assert_eq!((written.width(), written.height()), (stats.width, stats.height));
    }
}
