use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mean Earth radius in metres (IUGG)
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and inside their ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in metres (haversine)
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_M * c
    }
}

/// Where the audio bytes of a drop live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AudioRef {
    /// Portable file name, resolved against the audio storage directory
    File { filename: String },
    /// Bytes carried inside the record itself
    Inline {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
}

impl AudioRef {
    pub fn file(filename: impl Into<String>) -> Self {
        Self::File {
            filename: filename.into(),
        }
    }

    pub fn inline(data: Vec<u8>) -> Self {
        Self::Inline { data }
    }

    pub fn filename(&self) -> Option<&str> {
        match self {
            Self::File { filename } => Some(filename.as_str()),
            Self::Inline { .. } => None,
        }
    }
}

/// One geotagged audio clip
///
/// Drops are never mutated after creation. `id` is the merge key and
/// `created_at` the sort key for every collection of drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDrop {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub coordinate: Coordinate,
    pub duration_sec: f64,
    pub audio: AudioRef,
}

impl AudioDrop {
    /// Create a drop stamped with a fresh id and the current time
    pub fn new(coordinate: Coordinate, duration_sec: f64, audio: AudioRef) -> Self {
        Self::with_id(Uuid::new_v4(), Utc::now(), coordinate, duration_sec, audio)
    }

    pub fn with_id(
        id: Uuid,
        created_at: DateTime<Utc>,
        coordinate: Coordinate,
        duration_sec: f64,
        audio: AudioRef,
    ) -> Self {
        let duration_sec = if duration_sec.is_finite() && duration_sec > 0.0 {
            duration_sec
        } else {
            0.0
        };

        Self {
            id,
            created_at,
            coordinate,
            duration_sec,
            audio,
        }
    }

    pub fn distance_to(&self, center: &Coordinate) -> f64 {
        self.coordinate.distance_to(center)
    }
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_between_known_points() {
        // London -> Paris is roughly 344 km
        let london = Coordinate::new(51.5074, -0.1278);
        let paris = Coordinate::new(48.8566, 2.3522);

        let d = london.distance_to(&paris);
        assert!((d - 343_500.0).abs() < 2_000.0, "got {}", d);
        assert_eq!(london.distance_to(&london), 0.0);
    }

    #[test]
    fn coordinate_validity() {
        assert!(Coordinate::new(0.0, 0.0).is_valid());
        assert!(Coordinate::new(-90.0, 180.0).is_valid());
        assert!(!Coordinate::new(91.0, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, -180.5).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn negative_duration_is_clamped() {
        let drop = AudioDrop::new(Coordinate::new(0.0, 0.0), -3.0, AudioRef::file("a.wav"));
        assert_eq!(drop.duration_sec, 0.0);

        let origin = Coordinate::new(0.0, 0.0);
        let drop = AudioDrop::new(origin, f64::INFINITY, AudioRef::file("a.wav"));
        assert_eq!(drop.duration_sec, 0.0);
    }

    #[test]
    fn json_field_names_are_stable() {
        let drop = AudioDrop::new(Coordinate::new(1.5, 2.5), 4.0, AudioRef::file("drop-1.wav"));
        let json = serde_json::to_value(&drop).unwrap();

        assert!(json.get("createdAt").is_some());
        assert!(json.get("durationSec").is_some());
        assert_eq!(json["coordinate"]["latitude"], 1.5);
        assert_eq!(json["audio"]["kind"], "file");
        assert_eq!(json["audio"]["filename"], "drop-1.wav");
    }

    #[test]
    fn inline_audio_is_base64_in_json() {
        let drop = AudioDrop::new(Coordinate::new(0.0, 0.0), 1.0, AudioRef::inline(vec![1, 2, 3]));
        let json = serde_json::to_value(&drop).unwrap();

        assert_eq!(json["audio"]["kind"], "inline");
        assert_eq!(json["audio"]["data"], "AQID");

        let back: AudioDrop = serde_json::from_value(json).unwrap();
        assert_eq!(back, drop);
    }
}
