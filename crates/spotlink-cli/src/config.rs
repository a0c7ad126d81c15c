//! Configuration – reads/writes `~/.spotlink/config.toml`.

use serde::{Deserialize, Serialize};
use spotlink_middleware::RosbridgeConfig;
use spotlink_runtime::{CoordinatorConfig, Credentials, ReporterConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroizing;

/// Persisted bridge configuration stored in `~/.spotlink/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the fleet backend.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Spot this robot reports for.
    #[serde(default = "default_spot_id")]
    pub spot_id: String,

    /// Login identifier for the backend.
    #[serde(default)]
    pub identifier: String,

    #[serde(default, skip_serializing_if = "is_blank")]
    pub password: Zeroizing<String>,

    /// Display name sent with the login request.
    #[serde(default)]
    pub robot_name: String,

    /// HTTP port for backend-originated commands.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// rosbridge WebSocket endpoint.
    #[serde(default = "default_rosbridge_url")]
    pub rosbridge_url: String,

    #[serde(default = "default_report_idle_ms")]
    pub report_idle_ms: u64,
    #[serde(default = "default_report_trip_ms")]
    pub report_trip_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_sensor_throttle_ms")]
    pub sensor_throttle_ms: u64,
    #[serde(default = "default_login_retry_ms")]
    pub login_retry_ms: u64,
    /// Startup login attempts; `0` retries until success.
    #[serde(default)]
    pub login_attempts: u32,

    #[serde(default = "default_gps_topic")]
    pub gps_topic: String,
    #[serde(default = "default_hardware_status_topic")]
    pub hardware_status_topic: String,
    #[serde(default = "default_hardware_status_type")]
    pub hardware_status_type: String,
    #[serde(default = "default_path_topic")]
    pub path_topic: String,
    #[serde(default = "default_goal_status_topic")]
    pub goal_status_topic: String,
    #[serde(default = "default_goal_topic")]
    pub goal_topic: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("backend_url", &self.backend_url)
            .field("spot_id", &self.spot_id)
            .field("identifier", &self.identifier)
            .field(
                "password",
                if self.password.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("robot_name", &self.robot_name)
            .field("listen_port", &self.listen_port)
            .field("rosbridge_url", &self.rosbridge_url)
            .field("report_idle_ms", &self.report_idle_ms)
            .field("report_trip_ms", &self.report_trip_ms)
            .field("poll_ms", &self.poll_ms)
            .field("sensor_throttle_ms", &self.sensor_throttle_ms)
            .field("login_retry_ms", &self.login_retry_ms)
            .field("login_attempts", &self.login_attempts)
            .finish_non_exhaustive()
    }
}

fn is_blank(s: &Zeroizing<String>) -> bool {
    s.is_empty()
}

fn default_backend_url() -> String {
    "http://localhost:3000".to_string()
}
fn default_spot_id() -> String {
    "0".to_string()
}
fn default_listen_port() -> u16 {
    9143
}
fn default_rosbridge_url() -> String {
    "ws://localhost:9090".to_string()
}
fn default_report_idle_ms() -> u64 {
    1000
}
fn default_report_trip_ms() -> u64 {
    10_000
}
fn default_poll_ms() -> u64 {
    1000
}
fn default_sensor_throttle_ms() -> u64 {
    1000
}
fn default_login_retry_ms() -> u64 {
    5000
}
fn default_gps_topic() -> String {
    "/gps/fix".to_string()
}
fn default_hardware_status_topic() -> String {
    "/status".to_string()
}
fn default_hardware_status_type() -> String {
    "jackal_msgs/Status".to_string()
}
fn default_path_topic() -> String {
    "/move_base/NavfnROS/plan".to_string()
}
fn default_goal_status_topic() -> String {
    "/move_base/status".to_string()
}
fn default_goal_topic() -> String {
    "/smads_waypoint/goal".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            spot_id: default_spot_id(),
            identifier: String::new(),
            password: Zeroizing::new(String::new()),
            robot_name: String::new(),
            listen_port: default_listen_port(),
            rosbridge_url: default_rosbridge_url(),
            report_idle_ms: default_report_idle_ms(),
            report_trip_ms: default_report_trip_ms(),
            poll_ms: default_poll_ms(),
            sensor_throttle_ms: default_sensor_throttle_ms(),
            login_retry_ms: default_login_retry_ms(),
            login_attempts: 0,
            gps_topic: default_gps_topic(),
            hardware_status_topic: default_hardware_status_topic(),
            hardware_status_type: default_hardware_status_type(),
            path_topic: default_path_topic(),
            goal_status_topic: default_goal_status_topic(),
            goal_topic: default_goal_topic(),
        }
    }
}

impl Config {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            identifier: self.identifier.clone(),
            password: self.password.to_string(),
            name: self.robot_name.clone(),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            reporter: ReporterConfig {
                idle_period: Duration::from_millis(self.report_idle_ms),
                trip_period: Duration::from_millis(self.report_trip_ms),
            },
            poll_period: Duration::from_millis(self.poll_ms),
        }
    }

    pub fn rosbridge_config(&self) -> RosbridgeConfig {
        RosbridgeConfig {
            url: self.rosbridge_url.clone(),
            gps_topic: self.gps_topic.clone(),
            hardware_status_topic: self.hardware_status_topic.clone(),
            hardware_status_type: self.hardware_status_type.clone(),
            path_topic: self.path_topic.clone(),
            goal_status_topic: self.goal_status_topic.clone(),
            goal_topic: self.goal_topic.clone(),
            sensor_throttle: Duration::from_millis(self.sensor_throttle_ms),
            ..RosbridgeConfig::default()
        }
    }

    pub fn login_retry(&self) -> Duration {
        Duration::from_millis(self.login_retry_ms)
    }
}

/// Return the config path: `SPOTLINK_CONFIG` if set, else
/// `~/.spotlink/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("SPOTLINK_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".spotlink").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    let mut cfg = read_from(path)?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Parse the file at `path` without applying environment overrides.
pub(crate) fn read_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `SPOTLINK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SPOTLINK_BACKEND_URL` | `backend_url` |
/// | `SPOTLINK_SPOT_ID` | `spot_id` |
/// | `SPOTLINK_IDENTIFIER` | `identifier` |
/// | `SPOTLINK_PASSWORD` | `password` |
/// | `SPOTLINK_LISTEN_PORT` | `listen_port` |
/// | `SPOTLINK_ROSBRIDGE_URL` | `rosbridge_url` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SPOTLINK_BACKEND_URL") {
        cfg.backend_url = v;
    }
    if let Ok(v) = std::env::var("SPOTLINK_SPOT_ID") {
        cfg.spot_id = v;
    }
    if let Ok(v) = std::env::var("SPOTLINK_IDENTIFIER") {
        cfg.identifier = v;
    }
    if let Ok(v) = std::env::var("SPOTLINK_PASSWORD") {
        cfg.password = Zeroizing::new(v);
    }
    if let Ok(v) = std::env::var("SPOTLINK_LISTEN_PORT")
        && let Ok(port) = v.parse::<u16>() {
            cfg.listen_port = port;
        }
    if let Ok(v) = std::env::var("SPOTLINK_ROSBRIDGE_URL") {
        cfg.rosbridge_url = v;
    }
}

/// Save the config to disk, creating the parent directory if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner-only (rwx------) on Unix: the file holds the backend password.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
