use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in kilometres (haversine)
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos()
                * other.lat.to_radians().cos()
                * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// Resolved requester location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timezone: Option<String>,
}

impl GeoLocation {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_unknown(&self) -> bool {
        self.coordinates().is_none() && self.country.is_none()
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Coordinates::new(lat, lon)),
            _ => None,
        }
    }
}

/// Centroid of a provider region tag
pub fn region_centroid(tag: &str) -> Option<Coordinates> {
    let coords = match tag.to_ascii_lowercase().as_str() {
        "us-east" => Coordinates::new(39.0, -77.5),
        "us-west" => Coordinates::new(37.4, -122.1),
        "us-central" => Coordinates::new(41.9, -93.1),
        "ca-central" => Coordinates::new(45.5, -73.6),
        "sa-east" => Coordinates::new(-23.5, -46.6),
        "eu-west" => Coordinates::new(51.5, -0.1),
        "eu-central" => Coordinates::new(50.1, 8.7),
        "eu-north" => Coordinates::new(59.3, 18.1),
        "me-central" => Coordinates::new(25.2, 55.3),
        "af-south" => Coordinates::new(-33.9, 18.4),
        "ap-south" => Coordinates::new(19.1, 72.9),
        "ap-southeast" => Coordinates::new(1.35, 103.8),
        "ap-northeast" => Coordinates::new(35.7, 139.7),
        "ap-east" => Coordinates::new(22.3, 114.2),
        "oceania" => Coordinates::new(-33.9, 151.2),
        _ => return None,
    };
    Some(coords)
}

/// Smallest distance from `origin` to any known centroid among `regions`
pub fn nearest_region_distance_km(origin: &Coordinates, regions: &[String]) -> Option<f64> {
    regions
        .iter()
        .filter_map(|r| region_centroid(r))
        .map(|c| origin.distance_km(&c))
        .min_by(|a, b| a.total_cmp(b))
}
