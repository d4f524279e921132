use crate::config::{CropConfig, SamplingConfig};
use crate::types::CropPoint;
use anyhow::{Context, Result};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::{EuclideanDistance, MultiPolygon, Point, Rect};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::index;
use rand::Rng;
use tracing::{debug, info, warn};

/// Result of one synthesis pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Synthesis {
    pub points: Vec<CropPoint>,
    /// Indices of the polygons that received a point budget, in visit order.
    pub selected: Vec<usize>,
    /// Sum of the per-polygon point budgets.
    pub requested: usize,
}

impl Synthesis {
    pub fn crop_counts(&self, crops: usize) -> Vec<usize> {
        let mut counts = vec![0; crops];
        for p in &self.points {
            counts[p.crop] += 1;
        }
        counts
    }
}

/// Places labelled crop points inside zoning polygons.
///
/// All randomness comes from the caller's generator, in this order: polygon
/// selection, then per polygon its point budget, then per point the crop label
/// followed by x/y pairs for every placement attempt.
pub struct Synthesizer<'a> {
    config: &'a SamplingConfig,
    crops: WeightedIndex<f64>,
}

impl<'a> Synthesizer<'a> {
    pub fn new(config: &'a SamplingConfig) -> Result<Self> {
        Ok(Self {
            config,
            crops: crop_distribution(&config.crops)?,
        })
    }

    pub fn draw_crop<R: Rng>(&self, rng: &mut R) -> usize {
        self.crops.sample(rng)
    }

    pub fn synthesize<R: Rng>(&self, rng: &mut R, polygons: &[MultiPolygon<f64>]) -> Synthesis {
        let selected = select_polygons(rng, polygons.len(), self.config.polygon_fraction);
        info!("Synthesizing crop points in {} of {} polygons...", selected.len(), polygons.len());

        let mut points: Vec<CropPoint> = Vec::new();
        let mut requested = 0;

        for &zone in &selected {
            let polygon = &polygons[zone];
            let budget = rng.gen_range(self.config.min_points..self.config.max_points) as usize;
            requested += budget;

            let bbox = match polygon.bounding_rect() {
                Some(b) if b.width() > 0.0 && b.height() > 0.0 => b,
                _ => {
                    warn!("Zoning polygon {} has no area, skipping {} point(s)", zone, budget);
                    continue;
                }
            };

            let before = points.len();
            for _ in 0..budget {
                let crop = self.draw_crop(rng);
                if let Some(point) = self.place_point(rng, polygon, &bbox, &points) {
                    points.push(CropPoint { point, crop, zone });
                }
            }

            let placed = points.len() - before;
            if placed < budget {
                warn!(
                    "Zoning polygon {}: placed {} of {} point(s) after {} attempts each",
                    zone, placed, budget, self.config.max_attempts
                );
            } else {
                debug!("Zoning polygon {}: placed {} point(s)", zone, placed);
            }
        }

        info!("Generated {} of {} requested points.", points.len(), requested);

        Synthesis {
            points,
            selected,
            requested,
        }
    }

    // Rejection sampling inside the bounding box. Gives up after `max_attempts`
    // (very thin polygons, or no room left next to the recent points).
    fn place_point<R: Rng>(
        &self,
        rng: &mut R,
        polygon: &MultiPolygon<f64>,
        bbox: &Rect<f64>,
        accepted: &[CropPoint],
    ) -> Option<Point<f64>> {
        let recent = &accepted[accepted.len().saturating_sub(self.config.spacing_window)..];
        for _ in 0..self.config.max_attempts {
            let x = rng.gen_range(bbox.min().x..bbox.max().x);
            let y = rng.gen_range(bbox.min().y..bbox.max().y);
            let pt = Point::new(x, y);
            if polygon.contains(&pt) && is_spaced(&pt, recent, self.config.min_spacing) {
                return Some(pt);
            }
        }
        None
    }
}

pub fn crop_distribution(crops: &[CropConfig]) -> Result<WeightedIndex<f64>> {
    WeightedIndex::new(crops.iter().map(|c| c.probability))
        .context("Invalid crop probability distribution")
}

/// Picks `round(fraction * count)` distinct polygon indices, in sampled order.
/// Ties round to even, so 15 polygons at 0.7 select 10.
pub fn select_polygons<R: Rng>(rng: &mut R, count: usize, fraction: f64) -> Vec<usize> {
    let amount = ((count as f64) * fraction).round_ties_even() as usize;
    index::sample(rng, count, amount.min(count)).into_vec()
}

fn is_spaced(candidate: &Point<f64>, recent: &[CropPoint], min_spacing: f64) -> bool {
    recent
        .iter()
        .all(|p| p.point.euclidean_distance(candidate) > min_spacing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn square(x: f64, y: f64, side: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + side, y: y),
            (x: x + side, y: y + side),
            (x: x, y: y + side),
        ]])
    }

    fn grid(n: usize, side: f64) -> Vec<MultiPolygon<f64>> {
        (0..n)
            .map(|i| square(580_000.0 + i as f64 * 5_000.0, 570_000.0, side))
            .collect()
    }

    #[test]
    fn test_same_seed_same_points() {
        let config = SamplingConfig::default();
        let synth = Synthesizer::new(&config).unwrap();
        let polygons = grid(6, 3_000.0);

        let a = synth.synthesize(&mut ChaCha8Rng::seed_from_u64(42), &polygons);
        let b = synth.synthesize(&mut ChaCha8Rng::seed_from_u64(42), &polygons);

        assert!(!a.points.is_empty());
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seed_different_points() {
        let config = SamplingConfig::default();
        let synth = Synthesizer::new(&config).unwrap();
        let polygons = grid(6, 3_000.0);

        let a = synth.synthesize(&mut ChaCha8Rng::seed_from_u64(1), &polygons);
        let b = synth.synthesize(&mut ChaCha8Rng::seed_from_u64(2), &polygons);
        assert_ne!(a.points, b.points);
    }

    #[test]
    fn test_points_inside_source_polygon() {
        let config = SamplingConfig::default();
        let synth = Synthesizer::new(&config).unwrap();
        // L-shaped zone so the bounding box has plenty of area outside it.
        let l_shape = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 4_000.0, y: 0.0),
            (x: 4_000.0, y: 1_000.0),
            (x: 1_000.0, y: 1_000.0),
            (x: 1_000.0, y: 4_000.0),
            (x: 0.0, y: 4_000.0),
        ]]);
        let polygons = vec![l_shape, square(10_000.0, 0.0, 2_500.0), square(20_000.0, 0.0, 2_500.0)];

        let result = synth.synthesize(&mut ChaCha8Rng::seed_from_u64(7), &polygons);
        assert!(!result.points.is_empty());
        for p in &result.points {
            assert!(result.selected.contains(&p.zone));
            assert!(polygons[p.zone].contains(&p.point), "{:?} outside zone {}", p.point, p.zone);
        }
    }

    #[test]
    fn test_spacing_against_recent_window() {
        let config = SamplingConfig::default();
        let synth = Synthesizer::new(&config).unwrap();
        let polygons = grid(10, 4_000.0);

        let points = synth.synthesize(&mut ChaCha8Rng::seed_from_u64(42), &polygons).points;
        assert!(points.len() > config.spacing_window);
        for (i, p) in points.iter().enumerate() {
            for q in &points[i.saturating_sub(config.spacing_window)..i] {
                assert!(p.point.euclidean_distance(&q.point) > config.min_spacing);
            }
        }
    }

    #[test]
    fn test_crop_frequencies_match_probabilities() {
        let config = SamplingConfig::default();
        let synth = Synthesizer::new(&config).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        let draws = 100_000;
        let mut counts = vec![0usize; config.crops.len()];
        for _ in 0..draws {
            counts[synth.draw_crop(&mut rng)] += 1;
        }

        for (crop, count) in config.crops.iter().zip(counts) {
            let freq = count as f64 / draws as f64;
            assert!(
                (freq - crop.probability).abs() < 0.01,
                "{}: {} vs {}",
                crop.name,
                freq,
                crop.probability
            );
        }
    }

    #[test]
    fn test_no_polygons_no_points() {
        let config = SamplingConfig::default();
        let synth = Synthesizer::new(&config).unwrap();
        let result = synth.synthesize(&mut ChaCha8Rng::seed_from_u64(42), &[]);
        assert_eq!(result, Synthesis::default());
    }

    #[test]
    fn test_polygon_smaller_than_spacing_gets_at_most_one_point() {
        let config = SamplingConfig {
            polygon_fraction: 1.0,
            ..SamplingConfig::default()
        };
        let synth = Synthesizer::new(&config).unwrap();
        let polygons = vec![square(0.0, 0.0, 100.0)];

        let result = synth.synthesize(&mut ChaCha8Rng::seed_from_u64(3), &polygons);
        assert!(result.requested >= 8);
        assert!(result.points.len() <= 1);
    }

    #[test]
    fn test_zero_area_polygon_is_skipped() {
        let config = SamplingConfig {
            polygon_fraction: 1.0,
            ..SamplingConfig::default()
        };
        let synth = Synthesizer::new(&config).unwrap();
        let sliver = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 20.0, y: 0.0),
        ]]);

        let result = synth.synthesize(&mut ChaCha8Rng::seed_from_u64(3), &[sliver]);
        assert!(result.points.is_empty());
        assert_eq!(result.selected, vec![0]);
    }

    #[test]
    fn test_select_seventy_percent() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut selected = select_polygons(&mut rng, 10, 0.7);
        assert_eq!(selected.len(), 7);
        selected.sort_unstable();
        selected.dedup();
        assert_eq!(selected.len(), 7);
        assert!(selected.iter().all(|&i| i < 10));

        assert_eq!(select_polygons(&mut rng, 1, 0.7).len(), 1);
        assert!(select_polygons(&mut rng, 0, 0.7).is_empty());
    }

    #[test]
    fn test_select_rounds_ties_to_even() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert_eq!(select_polygons(&mut rng, 15, 0.7).len(), 10);
        assert_eq!(select_polygons(&mut rng, 5, 0.5).len(), 2);
        assert_eq!(select_polygons(&mut rng, 7, 0.5).len(), 4);
    }

    fn accepted_at(coords: &[(f64, f64)]) -> Vec<CropPoint> {
        coords
            .iter()
            .map(|&(x, y)| CropPoint { point: Point::new(x, y), crop: 0, zone: 0 })
            .collect()
    }

    #[test]
    fn test_points_older_than_window_do_not_block() {
        let config = SamplingConfig::default();
        let synth = Synthesizer::new(&config).unwrap();
        let zone = square(0.0, 0.0, 100.0);
        let bbox = zone.bounding_rect().unwrap();

        // Every spot in the zone is within 200 of (50, 50); it is the 11th most recent.
        let mut coords = vec![(50.0, 50.0)];
        coords.extend((0..config.spacing_window).map(|i| (10_000.0 + i as f64 * 1_000.0, 10_000.0)));
        let accepted = accepted_at(&coords);

        let placed = synth.place_point(&mut ChaCha8Rng::seed_from_u64(42), &zone, &bbox, &accepted);
        let point = placed.expect("a point outside the spacing window must not block placement");
        assert!(zone.contains(&point));
    }

    #[test]
    fn test_points_inside_window_block() {
        let config = SamplingConfig::default();
        let synth = Synthesizer::new(&config).unwrap();
        let zone = square(0.0, 0.0, 100.0);
        let bbox = zone.bounding_rect().unwrap();

        let mut coords: Vec<(f64, f64)> = (0..config.spacing_window - 1)
            .map(|i| (10_000.0 + i as f64 * 1_000.0, 10_000.0))
            .collect();
        coords.push((50.0, 50.0));
        let accepted = accepted_at(&coords);

        let placed = synth.place_point(&mut ChaCha8Rng::seed_from_u64(42), &zone, &bbox, &accepted);
        assert_eq!(placed, None);
    }

    #[test]
    fn test_point_budget_bounds() {
        let config = SamplingConfig::default();
        let synth = Synthesizer::new(&config).unwrap();
        let polygons = grid(10, 4_000.0);

        let result = synth.synthesize(&mut ChaCha8Rng::seed_from_u64(11), &polygons);
        let n = result.selected.len();
        assert!(result.requested >= n * config.min_points as usize);
        assert!(result.requested < n * config.max_points as usize);
        assert!(result.points.len() <= result.requested);

        let counts = result.crop_counts(config.crops.len());
        assert_eq!(counts.iter().sum::<usize>(), result.points.len());
    }
}
