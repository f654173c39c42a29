use geo::HaversineDistance;
use std::cmp::Ordering;

use crate::models::{ActivityOffer, BoundingBox, Coordinates, Profile};

/// Calculate the Haversine distance between two points in kilometers
///
/// # Arguments
/// * `lat1` - Latitude of first point in degrees
/// * `lon1` - Longitude of first point in degrees
/// * `lat2` - Latitude of second point in degrees
/// * `lon2` - Longitude of second point in degrees
#[inline]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    distance_km(Coordinates::new(lat1, lon1), Coordinates::new(lat2, lon2))
}

/// Great-circle distance between two coordinates in kilometers
#[inline]
pub fn distance_km(a: Coordinates, b: Coordinates) -> f64 {
    a.to_point().haversine_distance(&b.to_point()) / 1000.0
}

/// Anything that may carry a position
pub trait Locatable {
    fn coordinates(&self) -> Option<Coordinates>;
}

impl Locatable for Coordinates {
    fn coordinates(&self) -> Option<Coordinates> {
        Some(*self)
    }
}

impl Locatable for Profile {
    fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
    }
}

impl Locatable for ActivityOffer {
    fn coordinates(&self) -> Option<Coordinates> {
        self.coordinates
    }
}

/// A candidate annotated with its distance from the origin
#[derive(Debug, Clone)]
pub struct Located<T> {
    pub item: T,
    /// `None` when either side has no coordinates
    pub distance_km: Option<f64>,
}

/// Keep candidates within `max_km` of `origin`, nearest first.
///
/// Candidates without coordinates (or every candidate, if the origin has
/// none) are kept with an unknown distance and sorted last in their
/// original order.
pub fn filter_by_radius<T: Locatable>(
    origin: Option<Coordinates>,
    candidates: Vec<T>,
    max_km: f64,
) -> Vec<Located<T>> {
    let mut located: Vec<Located<T>> = candidates
        .into_iter()
        .map(|item| {
            let distance_km = match (origin, item.coordinates()) {
                (Some(from), Some(to)) => Some(distance_km(from, to)),
                _ => None,
            };
            Located { item, distance_km }
        })
        .filter(|c| c.distance_km.map_or(true, |d| d <= max_km))
        .collect();

    located.sort_by(|a, b| compare_distance(a.distance_km, b.distance_km));
    located
}

/// Known distances ascending, unknown last
pub fn compare_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Calculate a bounding box around a center point
///
/// This is much faster than Haversine for pre-filtering.
/// 1° latitude ≈ 111km, 1° longitude ≈ 111km * cos(latitude)
pub fn calculate_bounding_box(lat: f64, lon: f64, radius_km: f64) -> BoundingBox {
    let lat_delta = radius_km / 111.0;
    let lon_delta = radius_km / (111.0 * lat.to_radians().cos().abs());

    BoundingBox {
        min_lat: lat - lat_delta,
        max_lat: lat + lat_delta,
        min_lon: lon - lon_delta,
        max_lon: lon + lon_delta,
    }
}

/// Check if a point is within a bounding box
#[inline]
pub fn is_within_bounding_box(lat: f64, lon: f64, bbox: &BoundingBox) -> bool {
    lat >= bbox.min_lat && lat <= bbox.max_lat && lon >= bbox.min_lon && lon <= bbox.max_lon
}
