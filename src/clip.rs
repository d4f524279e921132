//! Clipping of map layers to the rendered window.

use crate::config::Window;
use crate::types::CropPoint;
use geo::bounding_rect::BoundingRect;
use geo::{coord, BooleanOps, MultiPolygon, Rect};

pub fn window_rect(window: &Window) -> Rect<f64> {
    Rect::new(
        coord! { x: window.xmin, y: window.ymin },
        coord! { x: window.xmax, y: window.ymax },
    )
}

/// Intersects `geometry` with the window. `None` when nothing is left.
pub fn clip_to_window(geometry: &MultiPolygon<f64>, window: &Window) -> Option<MultiPolygon<f64>> {
    let bbox = geometry.bounding_rect()?;

    // Cheap cases first: fully outside or fully inside.
    if bbox.max().x < window.xmin
        || bbox.min().x > window.xmax
        || bbox.max().y < window.ymin
        || bbox.min().y > window.ymax
    {
        return None;
    }
    if window.contains(bbox.min().x, bbox.min().y) && window.contains(bbox.max().x, bbox.max().y) {
        return Some(geometry.clone());
    }

    let window_mp = MultiPolygon::new(vec![window_rect(window).to_polygon()]);
    let clipped = geometry.intersection(&window_mp);
    if clipped.0.is_empty() {
        None
    } else {
        Some(clipped)
    }
}

pub fn clip_layer<'a, I>(geometries: I, window: &Window) -> Vec<MultiPolygon<f64>>
where
    I: IntoIterator<Item = &'a MultiPolygon<f64>>,
{
    geometries
        .into_iter()
        .filter_map(|g| clip_to_window(g, window))
        .collect()
}

/// Points inside the window, bounds inclusive.
pub fn clip_points<'a>(points: &'a [CropPoint], window: &Window) -> Vec<&'a CropPoint> {
    points
        .iter()
        .filter(|p| window.contains(p.point.x(), p.point.y()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area, Point};

    const WINDOW: Window = Window { xmin: 0.0, xmax: 100.0, ymin: 0.0, ymax: 100.0 };

    fn square(x: f64, y: f64, side: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + side, y: y),
            (x: x + side, y: y + side),
            (x: x, y: y + side),
        ]])
    }

    #[test]
    fn test_inside_is_unchanged() {
        let g = square(10.0, 10.0, 20.0);
        assert_eq!(clip_to_window(&g, &WINDOW), Some(g));
    }

    #[test]
    fn test_outside_is_dropped() {
        assert!(clip_to_window(&square(200.0, 200.0, 20.0), &WINDOW).is_none());
    }

    #[test]
    fn test_straddling_is_cut() {
        let clipped = clip_to_window(&square(80.0, 80.0, 40.0), &WINDOW).unwrap();
        assert!((clipped.unsigned_area() - 400.0).abs() < 1e-6);
    }

    #[test]
    fn test_clip_layer_keeps_only_visible() {
        let layer = vec![square(10.0, 10.0, 5.0), square(500.0, 0.0, 5.0), square(-5.0, -5.0, 10.0)];
        let clipped = clip_layer(&layer, &WINDOW);
        assert_eq!(clipped.len(), 2);
        assert!((clipped[1].unsigned_area() - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_clip_points_inclusive() {
        let points = vec![
            CropPoint { point: Point::new(0.0, 100.0), crop: 0, zone: 0 },
            CropPoint { point: Point::new(50.0, 50.0), crop: 1, zone: 0 },
            CropPoint { point: Point::new(100.1, 50.0), crop: 2, zone: 0 },
        ];
        let visible = clip_points(&points, &WINDOW);
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|p| p.crop < 2));
    }
}
