//! [`PathCache`] – last planned navigation path, served synchronously to the
//! command relay. Each update replaces the cached path wholesale.

use spotlink_types::{NavPath, PathMsg};
use tracing::debug;

use crate::status::Field;

#[derive(Debug, Default)]
pub struct PathCache {
    path: Field<NavPath>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_path_update(&self, msg: &PathMsg) {
        let path = NavPath::from(msg);
        debug!(waypoints = path.location_points.len(), "planned path replaced");
        self.path.set(path);
    }

    pub fn current(&self) -> NavPath {
        self.path.get()
    }
}
