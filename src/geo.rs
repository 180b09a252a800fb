use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

pub const EARTH_RADIUS_MILES: f64 = 3958.8;
pub const METERS_PER_MILE: f64 = 1609.34;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn checked(latitude: f64, longitude: f64) -> AppResult<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(AppError::Validation(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(AppError::Validation(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        Ok(Self::new(latitude, longitude))
    }
}

pub fn distance_miles(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).abs().to_radians();
    let d_lon = (b.longitude - a.longitude).abs().to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_MILES * c
}

pub fn miles_to_meters(miles: f64) -> f64 {
    miles * METERS_PER_MILE
}

pub fn meters_to_miles(meters: f64) -> f64 {
    meters / METERS_PER_MILE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_points_are_zero_apart() {
        let point = Coordinate::new(37.0, -122.0);
        assert_eq!(distance_miles(point, point), 0.0);
    }

    #[test]
    fn distance_is_symmetric() {
        let pairs = [
            (Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 1.0)),
            (Coordinate::new(37.77, -122.42), Coordinate::new(40.71, -74.0)),
            (Coordinate::new(-33.86, 151.2), Coordinate::new(51.5, -0.12)),
            (Coordinate::new(89.9, 0.0), Coordinate::new(-89.9, 180.0)),
        ];
        for (a, b) in pairs {
            assert_eq!(distance_miles(a, b), distance_miles(b, a));
            assert!(distance_miles(a, b) >= 0.0);
        }
    }

    #[test]
    fn one_degree_of_longitude_at_equator() {
        let distance = distance_miles(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 1.0));
        assert!((distance - 69.17).abs() < 0.5, "got {distance}");
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(Coordinate::checked(91.0, 0.0).is_err());
        assert!(Coordinate::checked(0.0, -180.5).is_err());
        assert!(Coordinate::checked(f64::NAN, 0.0).is_err());
        assert!(Coordinate::checked(-90.0, 180.0).is_ok());
    }

    #[test]
    fn converts_between_miles_and_meters() {
        assert_eq!(miles_to_meters(2.0), 3218.68);
        assert!((meters_to_miles(miles_to_meters(1.5)) - 1.5).abs() < 1e-12);
    }
}
