//! Map furniture: grid, axes with ticks, legend, scale bar and north arrow.
//!
//! Sizes follow typographic points and are converted with `Figure::pt`, so the
//! layout keeps its proportions at any dpi.

use crate::config::{CropConfig, Marker, RenderConfig, MAX_TICKS};
use crate::render::{parse_hex, Figure};
use crate::text::{Anchor, Label};
use anyhow::Result;
use tiny_skia::{PathBuilder, Rect, Stroke, StrokeDash};

const FONT_SIZE: f32 = 12.0;
const AXES_LINE_WIDTH: f32 = 0.8;
const TICK_LENGTH: f32 = 5.0;
const TICK_PAD: f32 = 3.5;
const LABEL_PAD: f32 = 10.0;
const GRID_COLOR: [u8; 3] = [0xb0, 0xb0, 0xb0];
const GRID_ALPHA: f32 = 0.3;
const GRID_LINE_WIDTH: f32 = 0.5;
const BLACK: [u8; 3] = [0, 0, 0];
const WHITE: [u8; 3] = [255, 255, 255];

/// Multiples of `interval` within `[min, max]`, at most `MAX_TICKS` of them.
pub fn tick_positions(min: f64, max: f64, interval: f64) -> Vec<f64> {
    let eps = interval * 1e-9;
    let first = (min / interval).ceil();
    let last = ((max + eps) / interval).floor();
    if !(last >= first) {
        return Vec::new();
    }
    let count = ((last - first) as usize).saturating_add(1).min(MAX_TICKS);
    (0..count).map(|k| (first + k as f64) * interval).collect()
}

/// Keeps the last digits of a large planar coordinate (`value mod modulus`)
/// and groups thousands with `'`, e.g. 580000 -> "80'000".
pub fn format_tick(value: f64, modulus: f64) -> String {
    let digits = (value.rem_euclid(modulus).trunc() as i64).to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('\'');
        }
        out.push(ch);
    }
    out
}

pub fn legend_label(crop: &CropConfig) -> String {
    format!("{} ({:.0}%)", crop.name, crop.probability * 100.0)
}

pub fn draw_grid(fig: &mut Figure, config: &RenderConfig) {
    let frame = fig.frame;
    let w = config.window;
    let lw = GRID_LINE_WIDTH * fig.pt;
    let dot = lw.max(1.0);
    let stroke = Stroke {
        width: lw,
        dash: StrokeDash::new(vec![dot, 1.65 * dot], 0.0),
        ..Stroke::default()
    };

    let mut pb = PathBuilder::new();
    for x in tick_positions(w.xmin, w.xmax, config.tick_interval) {
        let (px, _) = frame.to_px(x, w.ymin);
        pb.move_to(px, frame.top);
        pb.line_to(px, frame.bottom());
    }
    for y in tick_positions(w.ymin, w.ymax, config.tick_interval) {
        let (_, py) = frame.to_px(w.xmin, y);
        pb.move_to(frame.left, py);
        pb.line_to(frame.right(), py);
    }
    if let Some(path) = pb.finish() {
        fig.stroke_with(&path, GRID_COLOR, GRID_ALPHA, &stroke);
    }
}

pub fn draw_axes(fig: &mut Figure, config: &RenderConfig) {
    let frame = fig.frame;
    let w = config.window;
    let pt = fig.pt;

    if let Some(rect) = Rect::from_ltrb(frame.left, frame.top, frame.right(), frame.bottom()) {
        fig.stroke_path(&PathBuilder::from_rect(rect), BLACK, 1.0, AXES_LINE_WIDTH);
    }

    // Inward ticks on the bottom and left spines.
    let tick = TICK_LENGTH * pt;
    let xs = tick_positions(w.xmin, w.xmax, config.tick_interval);
    let ys = tick_positions(w.ymin, w.ymax, config.tick_interval);
    let mut pb = PathBuilder::new();
    for &x in &xs {
        let (px, _) = frame.to_px(x, w.ymin);
        pb.move_to(px, frame.bottom());
        pb.line_to(px, frame.bottom() - tick);
    }
    for &y in &ys {
        let (_, py) = frame.to_px(w.xmin, y);
        pb.move_to(frame.left, py);
        pb.line_to(frame.left + tick, py);
    }
    if let Some(path) = pb.finish() {
        fig.stroke_path(&path, BLACK, 1.0, AXES_LINE_WIDTH);
    }

    let size = FONT_SIZE * pt;
    let mut tick_label_h: f32 = 0.0;
    for &x in &xs {
        let text = format_tick(x, config.tick_modulus);
        tick_label_h = tick_label_h.max(fig.measure(FONT_SIZE, &text).1);
        let (px, _) = frame.to_px(x, w.ymin);
        fig.label(Label::new(text, px, frame.bottom() + TICK_PAD * pt, size, Anchor::TopCenter));
    }
    let mut tick_label_w: f32 = 0.0;
    for &y in &ys {
        let text = format_tick(y, config.tick_modulus);
        tick_label_w = tick_label_w.max(fig.measure(FONT_SIZE, &text).0);
        let (_, py) = frame.to_px(w.xmin, y);
        fig.label(Label::new(text, frame.left - TICK_PAD * pt, py, size, Anchor::CenterRight));
    }

    let center_x = frame.left + frame.width / 2.0;
    let center_y = frame.top + frame.height / 2.0;
    fig.label(Label::new(
        config.x_label.clone(),
        center_x,
        frame.bottom() + TICK_PAD * pt + tick_label_h + LABEL_PAD * pt,
        size,
        Anchor::TopCenter,
    ));
    fig.label(
        Label::new(
            config.y_label.clone(),
            frame.left - TICK_PAD * pt - tick_label_w - LABEL_PAD * pt,
            center_y,
            size,
            Anchor::CenterRight,
        )
        .vertical(),
    );
}

enum Handle {
    Outline([u8; 3]),
    Fill { fill: [u8; 3], edge: [u8; 3], alpha: f32 },
    Marker(Marker, [u8; 3]),
}

/// Legend in the upper-left corner: boundary, zoning, then one entry per crop
/// with its sampling probability.
pub fn draw_legend(fig: &mut Figure, config: &RenderConfig, crops: &[CropConfig]) -> Result<()> {
    let legend = &config.legend;
    let pt = fig.pt;
    let fs = legend.font_size;

    let mut entries = vec![
        (Handle::Outline(parse_hex(&config.boundary.color)?), config.boundary.label.clone()),
        (
            Handle::Fill {
                fill: parse_hex(&config.zoning.fill)?,
                edge: parse_hex(&config.zoning.edge)?,
                alpha: config.zoning.alpha,
            },
            config.zoning.label.clone(),
        ),
    ];
    for crop in crops {
        entries.push((Handle::Marker(crop.marker, parse_hex(&crop.color)?), legend_label(crop)));
    }

    let border = fs * pt;
    let spacing = 0.5 * fs * pt;
    let handle_w = 2.0 * fs * pt;
    let handle_h = 0.7 * fs * pt;
    let text_pad = 0.8 * fs * pt;

    let (title_w, title_h) = fig.measure(legend.title_font_size, &legend.title);
    let mut row_h = fs * pt;
    let mut label_w: f32 = 0.0;
    for (_, text) in &entries {
        let (w, h) = fig.measure(fs, text);
        label_w = label_w.max(w);
        row_h = row_h.max(h);
    }
    let n = entries.len() as f32;
    let width = 2.0 * border + title_w.max(handle_w + text_pad + label_w);
    let height = 2.0 * border + title_h + spacing + n * row_h + (n - 1.0) * spacing;

    let (left, top) = fig.frame.fraction(0.01, 0.99);
    if let Some(rect) = Rect::from_xywh(left, top, width, height) {
        let path = PathBuilder::from_rect(rect);
        fig.fill_path(&path, WHITE, 1.0);
        fig.stroke_path(&path, BLACK, 1.0, AXES_LINE_WIDTH);
    }

    fig.label(Label::new(
        legend.title.clone(),
        left + width / 2.0,
        top + border,
        legend.title_font_size * pt,
        Anchor::TopCenter,
    ));

    let x0 = left + border;
    let mut y = top + border + title_h + spacing;
    for (handle, text) in entries {
        let cy = y + row_h / 2.0;
        let patch = Rect::from_xywh(x0, cy - handle_h / 2.0, handle_w, handle_h).map(PathBuilder::from_rect);
        match handle {
            Handle::Outline(color) => {
                if let Some(path) = &patch {
                    fig.stroke_path(path, color, 1.0, AXES_LINE_WIDTH);
                }
            }
            Handle::Fill { fill, edge, alpha } => {
                if let Some(path) = &patch {
                    fig.fill_path(path, fill, alpha);
                    fig.stroke_path(path, edge, alpha, AXES_LINE_WIDTH);
                }
            }
            Handle::Marker(marker, color) => {
                // Legend markers are 10 pt across.
                fig.marker(marker, x0 + handle_w / 2.0, cy, 100.0, color);
            }
        }
        fig.label(Label::new(text, x0 + handle_w + text_pad, cy, fs * pt, Anchor::CenterLeft));
        y += row_h + spacing;
    }

    Ok(())
}

/// Solid bar of `scale_bar.length` map units in the lower-right corner with its
/// label underneath.
pub fn draw_scale_bar(fig: &mut Figure, config: &RenderConfig) {
    let bar = &config.scale_bar;
    let frame = fig.frame;
    let pt = fig.pt;
    let pad = 0.5 * 10.0 * pt;
    let sep = 2.0 * pt;

    let length = frame.scale_x(bar.length);
    let thickness = frame.scale_y(bar.thickness).max(1.0);
    let (_, label_h) = fig.measure(10.0, &bar.label);

    let right = frame.right() - pad;
    let bottom = frame.bottom() - pad - label_h - sep;
    if let Some(rect) = Rect::from_xywh(right - length, bottom - thickness, length, thickness) {
        fig.fill_path(&PathBuilder::from_rect(rect), BLACK, 1.0);
    }
    fig.label(Label::new(
        bar.label.clone(),
        right - length / 2.0,
        bottom + sep,
        10.0 * pt,
        Anchor::TopCenter,
    ));
}

/// Upward arrow from an "N" at the bottom spine (axes x 0.95) to 10% of the
/// axes height.
pub fn draw_north_arrow(fig: &mut Figure) {
    let pt = fig.pt;
    let (x, base) = fig.frame.fraction(0.95, 0.0);
    let (_, tip) = fig.frame.fraction(0.95, 0.1);
    let (_, n_h) = fig.measure(FONT_SIZE, "N");

    let shrink = 0.05 * (base - tip);
    let start = base - n_h / 2.0 - shrink;
    let end = tip + shrink;
    let half_shaft = 1.0 * pt;
    let half_head = 4.0 * pt;
    let head_len = (12.0 * pt).min(start - end);
    let neck = end + head_len;

    let mut pb = PathBuilder::new();
    pb.move_to(x, end);
    pb.line_to(x + half_head, neck);
    pb.line_to(x + half_shaft, neck);
    pb.line_to(x + half_shaft, start);
    pb.line_to(x - half_shaft, start);
    pb.line_to(x - half_shaft, neck);
    pb.line_to(x - half_head, neck);
    pb.close();
    if let Some(path) = pb.finish() {
        fig.fill_path(&path, BLACK, 1.0);
    }

    fig.label(Label::new("N", x, base, FONT_SIZE * pt, Anchor::Center));
}
