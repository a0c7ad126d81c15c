//! [`StatusAggregator`] – the authoritative local view of robot state.
//!
//! Fed by middleware callbacks, read by the status reporter and the command
//! relay. Every field sits behind its own lock so updates are atomic per
//! field and last-write-wins across writers; nothing ties one field to
//! another.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, RwLock};

use spotlink_types::{GeoPoint, GoalStatusArray, HardwareStatus, NavSatFix, RobotStatus, SpotStatus};
use tracing::{debug, info};

/// A single independently-locked value.
///
/// A poisoned lock still holds a whole value (writes are plain assignments),
/// so poisoning is recovered rather than propagated.
#[derive(Debug, Default)]
pub(crate) struct Field<T>(RwLock<T>);

impl<T: Clone> Field<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(RwLock::new(value))
    }

    pub(crate) fn get(&self) -> T {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set(&self, value: T) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = value;
    }
}

/// A partial sensor reading. `None` fields leave the aggregated state alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorUpdate {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub hardware_id: Option<String>,
    pub measured_battery: Option<f64>,
}

impl From<&NavSatFix> for SensorUpdate {
    fn from(fix: &NavSatFix) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            ..Self::default()
        }
    }
}

impl From<&HardwareStatus> for SensorUpdate {
    fn from(status: &HardwareStatus) -> Self {
        Self {
            hardware_id: status.hardware_id.clone(),
            measured_battery: status.measured_battery,
            ..Self::default()
        }
    }
}

/// Zero and non-finite readings count as "not reported".
fn reported(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v != 0.0)
}

#[derive(Debug)]
pub struct StatusAggregator {
    latitude: Field<f64>,
    longitude: Field<f64>,
    spot_status: Field<SpotStatus>,
    charge_level: AtomicU8,
    hardware_id: Field<String>,
    active_trip: AtomicBool,
    /// Goal id that last produced the dropoff transition.
    last_succeeded_goal: Mutex<Option<String>>,
}

impl Default for StatusAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusAggregator {
    pub fn new() -> Self {
        Self {
            latitude: Field::new(0.0),
            longitude: Field::new(0.0),
            spot_status: Field::new(SpotStatus::Available),
            charge_level: AtomicU8::new(0),
            hardware_id: Field::new(String::new()),
            active_trip: AtomicBool::new(false),
            last_succeeded_goal: Mutex::new(None),
        }
    }

    /// Merge the fields present in `update`.
    pub fn on_sensor_update(&self, update: SensorUpdate) {
        if let Some(id) = update.hardware_id {
            self.hardware_id.set(id);
        }
        if let Some(lat) = reported(update.latitude) {
            self.latitude.set(lat);
        }
        if let Some(lon) = reported(update.longitude) {
            self.longitude.set(lon);
        }
        if let Some(raw) = reported(update.measured_battery).filter(|v| *v > 0.0) {
            let level = raw.floor().min(100.0) as u8;
            self.charge_level.store(level, Ordering::Relaxed);
        }
    }

    /// Inspect a goal-status notification and mark the spot as `dropoff` the
    /// first time a given goal id reports success.
    ///
    /// Returns `true` when the transition happened.
    pub fn on_nav_status_update(&self, msg: &GoalStatusArray) -> bool {
        let Some(latest) = msg.latest() else {
            return false;
        };
        if !latest.succeeded() {
            return false;
        }
        let mut last = self
            .last_succeeded_goal
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if last.as_deref() == Some(latest.goal_id.id.as_str()) {
            debug!(goal_id = %latest.goal_id.id, "duplicate goal success ignored");
            return false;
        }
        *last = Some(latest.goal_id.id.clone());
        drop(last);

        self.spot_status.set(SpotStatus::Dropoff);
        info!(goal_id = %latest.goal_id.id, "goal reached, spot set to dropoff");
        true
    }

    pub fn snapshot(&self) -> RobotStatus {
        RobotStatus {
            position: self.position(),
            spot_status: self.spot_status.get(),
            charge_level: self.charge_level.load(Ordering::Relaxed),
            hardware_id: self.hardware_id.get(),
        }
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.latitude.get(), self.longitude.get())
    }

    pub fn spot_status(&self) -> SpotStatus {
        self.spot_status.get()
    }

    pub fn set_spot_status(&self, status: SpotStatus) {
        self.spot_status.set(status);
    }

    pub fn trip_active(&self) -> bool {
        self.active_trip.load(Ordering::SeqCst)
    }

    pub fn set_trip_active(&self, active: bool) {
        self.active_trip.store(active, Ordering::SeqCst);
    }
}
