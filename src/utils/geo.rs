//! Geodesic helpers for geofence containment checks.

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in metres between two WGS84 coordinates
/// (haversine). Accurate to well under a metre at geofence scale.
pub fn distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_distance_for_same_point() {
        assert!(distance_m(45.0, 9.0, 45.0, 9.0) < 1e-6);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let d = distance_m(45.0, 9.0, 46.0, 9.0);
        assert!((d - 111_195.0).abs() < 100.0, "got {d}");
    }

    #[test]
    fn short_hop_is_metre_accurate() {
        // ~77.8 m north of the Milan Duomo.
        let d = distance_m(45.4642, 9.1900, 45.4649, 9.1900);
        assert!((d - 77.8).abs() < 1.0, "got {d}");
    }
}
