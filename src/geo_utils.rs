//! Geographic utilities: point-to-point distance, route length, and the
//! bounded point reduction applied before caching.
//!
//! Route lengths use great-circle (haversine) distance via the `geo` crate.
//! Station resolution works at sub-degree scale, where plain Euclidean
//! distance on lat/long is accurate enough and much cheaper; that variant
//! lives here too so both callers share one definition.

use geo::{Distance, Haversine, Point};

use crate::{GeoPoint, ResolveConfig};

/// Great-circle distance between two points in metres.
///
/// Symmetric and monotonic; this is the distance every route length is
/// accumulated from.
pub fn point_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    Haversine::distance(
        Point::new(a.longitude, a.latitude),
        Point::new(b.longitude, b.latitude),
    )
}

/// Euclidean distance on raw lat/long degrees.
///
/// Only meaningful for the short spans involved in nearest-station
/// resolution, where it ranks candidates identically to the spherical
/// distance at a fraction of the cost.
pub fn planar_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = a.latitude - b.latitude;
    let d_lng = a.longitude - b.longitude;
    (d_lat * d_lat + d_lng * d_lng).sqrt()
}

/// Total length of a route in whole metres, truncated.
///
/// A single-point route has length 0.
pub fn route_length(points: &[GeoPoint]) -> i64 {
    points
        .windows(2)
        .map(|w| point_distance(&w[0], &w[1]))
        .sum::<f64>() as i64
}

/// Reduction target for a raw track of `raw_len` points.
///
/// Dense recordings get a proportional target instead of the fixed one:
/// clamping an 8,000+ point track straight to 500 was measured to distort
/// the summed distance noticeably.
pub fn reduction_target(raw_len: usize, config: &ResolveConfig) -> usize {
    if raw_len > config.high_volume_threshold {
        raw_len / 10
    } else {
        config.reduce_target
    }
}

/// Uniformly sample a raw track down to at most `target` points.
///
/// The first and last raw points are always preserved, since the endpoints
/// feed nearest-station resolution.
pub fn reduce_points(points: &[GeoPoint], target: usize) -> Vec<GeoPoint> {
    if target == 0 || points.len() <= target {
        return points.to_vec();
    }

    let step = points.len() as f64 / target as f64;
    let mut reduced: Vec<GeoPoint> = (0..target)
        .map(|i| points[(i as f64 * step) as usize])
        .collect();

    if let (Some(last_out), Some(last_in)) = (reduced.last_mut(), points.last()) {
        *last_out = *last_in;
    }
    reduced
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_route() -> Vec<GeoPoint> {
        vec![
            GeoPoint::new(51.5074, -0.1278),
            GeoPoint::new(51.5080, -0.1290),
            GeoPoint::new(51.5090, -0.1300),
            GeoPoint::new(51.5100, -0.1310),
            GeoPoint::new(51.5110, -0.1320),
        ]
    }

    #[test]
    fn test_point_distance_symmetric() {
        let a = GeoPoint::new(51.5074, -0.1278);
        let b = GeoPoint::new(51.4856, -0.6068);
        assert!((point_distance(&a, &b) - point_distance(&b, &a)).abs() < 1e-9);
    }

    #[test]
    fn test_route_length_non_negative_and_symmetric() {
        let points = sample_route();
        let forward = route_length(&points);
        let mut reversed = points.clone();
        reversed.reverse();
        let backward = route_length(&reversed);

        assert!(forward > 0);
        // Truncation may differ by one metre between directions.
        assert!((forward - backward).abs() <= 1);
    }

    #[test]
    fn test_route_length_single_point_is_zero() {
        assert_eq!(route_length(&[GeoPoint::new(51.5, -0.1)]), 0);
    }

    #[test]
    fn test_reduction_target_default_and_high_volume() {
        let config = ResolveConfig::default();
        assert_eq!(reduction_target(3_000, &config), 500);
        assert_eq!(reduction_target(8_000, &config), 500);
        assert_eq!(reduction_target(9_000, &config), 900);
    }

    #[test]
    fn test_reduce_points_preserves_endpoints() {
        let points: Vec<GeoPoint> = (0..2_000)
            .map(|i| GeoPoint::new(51.0 + i as f64 * 1e-4, -0.1))
            .collect();
        let reduced = reduce_points(&points, 500);

        assert_eq!(reduced.len(), 500);
        assert_eq!(reduced[0], points[0]);
        assert_eq!(reduced.last(), points.last());
    }

    #[test]
    fn test_reduce_points_short_route_untouched() {
        let points = sample_route();
        assert_eq!(reduce_points(&points, 500), points);
    }
}
