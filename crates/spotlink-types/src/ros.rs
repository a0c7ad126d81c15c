//! Shapes of the ROS messages that cross the middleware boundary.
//!
//! Only the fields the bridge reads are modelled; everything else in the
//! rosbridge JSON is ignored. All fields default so that partially populated
//! messages still decode.

use serde::{Deserialize, Serialize};

/// `actionlib_msgs/GoalStatus` code for a goal that reached its target.
pub const GOAL_STATUS_SUCCEEDED: u8 = 3;

/// `sensor_msgs/NavSatFix`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NavSatFix {
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Robot hardware status (the `/status` topic of the base platform).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HardwareStatus {
    #[serde(default)]
    pub hardware_id: Option<String>,
    #[serde(default)]
    pub measured_battery: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    #[serde(default)]
    pub position: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseStamped {
    #[serde(default)]
    pub pose: Pose,
}

/// `nav_msgs/Path`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PathMsg {
    #[serde(default)]
    pub poses: Vec<PoseStamped>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GoalId {
    #[serde(default)]
    pub id: String,
}

/// `actionlib_msgs/GoalStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GoalStatusEntry {
    #[serde(default)]
    pub goal_id: GoalId,
    #[serde(default)]
    pub status: u8,
}

impl GoalStatusEntry {
    pub fn succeeded(&self) -> bool {
        self.status == GOAL_STATUS_SUCCEEDED
    }
}

/// `actionlib_msgs/GoalStatusArray`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GoalStatusArray {
    #[serde(default)]
    pub status_list: Vec<GoalStatusEntry>,
}

impl GoalStatusArray {
    /// The most recently reported goal, if any.
    pub fn latest(&self) -> Option<&GoalStatusEntry> {
        self.status_list.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_status_decodes_partial_message() {
        let msg: HardwareStatus = serde_json::from_str(r#"{"measured_battery":87.6}"#).unwrap();
        assert_eq!(msg.measured_battery, Some(87.6));
        assert!(msg.hardware_id.is_none());
    }

    #[test]
    fn goal_status_array_latest_is_last_entry() {
        let msg: GoalStatusArray = serde_json::from_str(
            r#"{"header":{},"status_list":[
                {"goal_id":{"id":"a"},"status":1},
                {"goal_id":{"id":"b"},"status":3}]}"#,
        )
        .unwrap();
        let latest = msg.latest().unwrap();
        assert_eq!(latest.goal_id.id, "b");
        assert!(latest.succeeded());
    }

    #[test]
    fn empty_goal_status_array_has_no_latest() {
        assert!(GoalStatusArray::default().latest().is_none());
    }
}
