use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod ros;

pub use ros::{GoalStatusArray, GoalStatusEntry, HardwareStatus, NavSatFix, PathMsg};

/// Semantic state of the robot's assigned parking/docking spot as understood
/// by the fleet backend.
///
/// Unknown values coming from the backend are preserved verbatim so that they
/// can be reported back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum SpotStatus {
    #[default]
    Available,
    Dropoff,
    Occupied,
    Other(String),
}

impl SpotStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SpotStatus::Available => "available",
            SpotStatus::Dropoff => "dropoff",
            SpotStatus::Occupied => "occupied",
            SpotStatus::Other(s) => s,
        }
    }
}

impl From<String> for SpotStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "available" => SpotStatus::Available,
            "dropoff" => SpotStatus::Dropoff,
            "occupied" => SpotStatus::Occupied,
            _ => SpotStatus::Other(s),
        }
    }
}

impl From<SpotStatus> for String {
    fn from(s: SpotStatus) -> Self {
        match s {
            SpotStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for SpotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A WGS84 coordinate pair.
///
/// Deserialisation accepts JSON numbers as well as numeric strings
/// (`"30.1"`), because the fleet backend sends both. Non-finite values
/// (`"NaN"`, `"inf"`) are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(deserialize_with = "lenient_f64")]
    pub latitude: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n,
        NumberOrString::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid coordinate {s:?}: {e}")))?,
    };
    if !value.is_finite() {
        return Err(serde::de::Error::custom(format!(
            "coordinate must be finite, got {value}"
        )));
    }
    Ok(value)
}

/// Local view of the robot's reportable state.
///
/// Fields are updated independently; no cross-field consistency is implied.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotStatus {
    #[serde(flatten)]
    pub position: GeoPoint,
    pub spot_status: SpotStatus,
    /// Battery percentage, floored from the raw reading.
    pub charge_level: u8,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hardware_id: String,
}

/// One-shot 2D pose command for the navigation subsystem
/// (`geometry_msgs/Pose2D`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NavGoal {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl NavGoal {
    /// Goal pointing the robot at a dropoff location.
    pub fn from_dropoff(dropoff: GeoPoint) -> Self {
        Self {
            x: dropoff.latitude,
            y: dropoff.longitude,
            theta: 0.0,
        }
    }

    /// Neutral goal used to stop the robot where it stands. Both axes carry
    /// the current longitude.
    pub fn hold_position(current: GeoPoint) -> Self {
        Self {
            x: current.longitude,
            y: current.longitude,
            theta: 0.0,
        }
    }
}

/// Ordered waypoints of the most recently planned navigation path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavPath {
    pub location_points: Vec<GeoPoint>,
}

impl From<&PathMsg> for NavPath {
    fn from(msg: &PathMsg) -> Self {
        Self {
            location_points: msg
                .poses
                .iter()
                .map(|p| GeoPoint::new(p.pose.position.x, p.pose.position.y))
                .collect(),
        }
    }
}

/// Unified event wrapper for the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "spotlink-middleware::rosbridge/gps"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Localization(NavSatFix),
    HardwareStatus(HardwareStatus),
    PlannedPath(PathMsg),
    GoalStatus(GoalStatusArray),
    /// Outbound goal waiting to be forwarded to the navigation subsystem.
    NavGoal(NavGoal),
}

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpotError {
    #[error("Event Bus Channel Error: {0}")]
    Channel(String),

    #[error("Parsing Error: {0}")]
    Parsing(String),

    #[error("Middleware Serialization Error: {0}")]
    Serialization(String),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Navigation goal publisher is not available")]
    PublisherUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_status_known_values_map_to_variants() {
        assert_eq!(SpotStatus::from("dropoff".to_string()), SpotStatus::Dropoff);
        assert_eq!(SpotStatus::from("available".to_string()), SpotStatus::Available);
        assert_eq!(SpotStatus::from("occupied".to_string()), SpotStatus::Occupied);
    }

    #[test]
    fn spot_status_unknown_value_is_preserved() {
        let status: SpotStatus = serde_json::from_str("\"reserved\"").unwrap();
        assert_eq!(status, SpotStatus::Other("reserved".into()));
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"reserved\"");
    }

    #[test]
    fn geo_point_accepts_numeric_strings() {
        let p: GeoPoint =
            serde_json::from_str(r#"{"latitude":"30.1","longitude":-97.7}"#).unwrap();
        assert!((p.latitude - 30.1).abs() < f64::EPSILON);
        assert!((p.longitude + 97.7).abs() < f64::EPSILON);
    }

    #[test]
    fn geo_point_rejects_garbage_strings() {
        let res = serde_json::from_str::<GeoPoint>(r#"{"latitude":"north","longitude":1}"#);
        assert!(res.is_err());
    }

    #[test]
    fn geo_point_rejects_non_finite_strings() {
        for bad in ["NaN", "inf", "-inf", "infinity", " nan "] {
            let json = format!(r#"{{"latitude":"{bad}","longitude":-97.7}}"#);
            let err = serde_json::from_str::<GeoPoint>(&json).unwrap_err();
            assert!(err.to_string().contains("finite"), "{bad}: {err}");

            let json = format!(r#"{{"latitude":30.1,"longitude":"{bad}"}}"#);
            assert!(serde_json::from_str::<GeoPoint>(&json).is_err(), "{bad}");
        }
    }

    #[test]
    fn robot_status_serialises_flat_camel_case() {
        let status = RobotStatus {
            position: GeoPoint::new(1.5, -2.5),
            spot_status: SpotStatus::Dropoff,
            charge_level: 87,
            hardware_id: String::new(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["latitude"], 1.5);
        assert_eq!(json["longitude"], -2.5);
        assert_eq!(json["spotStatus"], "dropoff");
        assert_eq!(json["chargeLevel"], 87);
        assert!(json.get("hardwareId").is_none());
    }

    #[test]
    fn nav_goal_from_dropoff_uses_lat_as_x() {
        let goal = NavGoal::from_dropoff(GeoPoint::new(30.1, -97.7));
        assert_eq!(goal, NavGoal { x: 30.1, y: -97.7, theta: 0.0 });
    }

    #[test]
    fn hold_position_uses_longitude_on_both_axes() {
        let goal = NavGoal::hold_position(GeoPoint::new(30.1, -97.7));
        assert_eq!(goal, NavGoal { x: -97.7, y: -97.7, theta: 0.0 });
    }

    #[test]
    fn nav_path_from_path_msg_maps_xy() {
        let msg: PathMsg = serde_json::from_str(
            r#"{"poses":[{"pose":{"position":{"x":1.0,"y":2.0,"z":0.0}}},
                         {"pose":{"position":{"x":3.0,"y":4.0}}}]}"#,
        )
        .unwrap();
        let path = NavPath::from(&msg);
        assert_eq!(
            path.location_points,
            vec![GeoPoint::new(1.0, 2.0), GeoPoint::new(3.0, 4.0)]
        );
    }

    #[test]
    fn spot_error_display() {
        assert!(SpotError::PublisherUnavailable.to_string().contains("not available"));
        assert!(SpotError::Channel("x".into()).to_string().contains("Channel"));
    }
}
