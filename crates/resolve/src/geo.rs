//! Great-circle distance and the degree windows used to query the blocking index.

use crate::model::GeoPoint;

/// Mean Earth radius used by every distance in the engine.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Slack added to query windows so rounding never drops a boundary point.
const WINDOW_EPSILON_DEG: f64 = 1e-9;

/// Haversine distance in metres. Exactly symmetric in its arguments.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).abs().to_radians();
    let dlon = (b.lon - a.lon).abs().to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Axis-aligned `[lon, lat]` box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

/// Boxes that together cover every point within `radius_m` of `center`.
///
/// The box over-approximates the circle; callers re-filter with
/// [`haversine_m`]. Two boxes come back when the circle crosses the
/// antimeridian, and the full longitude range when it reaches a pole.
pub fn search_windows(center: GeoPoint, radius_m: f64) -> Vec<Window> {
    let angular = radius_m / EARTH_RADIUS_M;
    let dlat = angular.to_degrees() + WINDOW_EPSILON_DEG;
    let lat_min = (center.lat - dlat).max(-90.0);
    let lat_max = (center.lat + dlat).min(90.0);

    let full_lon = || {
        vec![Window {
            min: [-180.0, lat_min],
            max: [180.0, lat_max],
        }]
    };

    if lat_min <= -90.0 || lat_max >= 90.0 {
        return full_lon();
    }

    // Widest longitude offset of a spherical cap at this latitude.
    let ratio = angular.sin() / center.lat.to_radians().cos();
    if ratio.is_nan() || ratio >= 1.0 {
        return full_lon();
    }
    let dlon = ratio.asin().to_degrees() + WINDOW_EPSILON_DEG;
    if dlon >= 180.0 {
        return full_lon();
    }

    let lon_min = center.lon - dlon;
    let lon_max = center.lon + dlon;

    if lon_min < -180.0 {
        vec![
            Window { min: [lon_min + 360.0, lat_min], max: [180.0, lat_max] },
            Window { min: [-180.0, lat_min], max: [lon_max, lat_max] },
        ]
    } else if lon_max > 180.0 {
        vec![
            Window { min: [lon_min, lat_min], max: [180.0, lat_max] },
            Window { min: [-180.0, lat_min], max: [lon_max - 360.0, lat_max] },
        ]
    } else {
        vec![Window { min: [lon_min, lat_min], max: [lon_max, lat_max] }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon)
    }

    #[test]
    fn zero_for_same_point() {
        for point in [p(40.01, -75.01), p(0.0, 0.0), p(-33.9, 151.2), p(89.9, 179.9)] {
            assert_eq!(haversine_m(point, point), 0.0);
        }
    }

    #[test]
    fn symmetric() {
        let a = p(40.0100, -75.0100);
        let b = p(40.0101, -75.0099);
        assert_eq!(haversine_m(a, b), haversine_m(b, a));
        let c = p(-12.5, 179.95);
        let d = p(-12.4, -179.95);
        assert_eq!(haversine_m(c, d), haversine_m(d, c));
    }

    #[test]
    fn known_distances() {
        // One degree of latitude on a 6371 km sphere.
        let d = haversine_m(p(0.0, 0.0), p(1.0, 0.0));
        assert!((d - 111_194.93).abs() < 0.1, "got {d}");

        // Joe's pizza pair from the end-to-end fixture: ~14 m apart.
        let d = haversine_m(p(40.0100, -75.0100), p(40.0101, -75.0099));
        assert!(d > 13.0 && d < 15.0, "got {d}");
    }

    #[test]
    fn window_covers_radius() {
        let center = p(40.0, -75.0);
        let windows = search_windows(center, 100.0);
        assert_eq!(windows.len(), 1);
        let w = windows[0];
        // A point 99 m due east must fall inside.
        let east = p(40.0, -75.0 + 99.0 / (111_194.93 * 40f64.to_radians().cos()));
        assert!(haversine_m(center, east) < 100.0);
        assert!(east.lon >= w.min[0] && east.lon <= w.max[0]);
    }

    #[test]
    fn window_splits_at_antimeridian() {
        let windows = search_windows(p(10.0, 179.9999), 500.0);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].max[0], 180.0);
        assert_eq!(windows[1].min[0], -180.0);
        assert!(windows[1].max[0] > -180.0);
    }

    #[test]
    fn window_full_longitude_near_pole() {
        let windows = search_windows(p(89.9999, 10.0), 1_000.0);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].min[0], -180.0);
        assert_eq!(windows[0].max[0], 180.0);
        assert_eq!(windows[0].max[1], 90.0);
    }
}
