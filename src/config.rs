use core::error::Error;
use core::time::Duration;
use serde::Deserialize;
use std::path::PathBuf;

use crate::poller::PollTimings;

pub const ENV_PREFIX: &str = "VOLTRAP_";

/// Runtime settings, read from `VOLTRAP_*` environment variables (a `.env`
/// file is honoured by the binary).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Directory holding one subdirectory per terminal session.
    #[serde(default)]
    pub session_base_dir: Option<PathBuf>,
    #[serde(default = "default_control_file")]
    pub control_file: String,
    #[serde(default = "default_csv_file")]
    pub csv_file: String,
    #[serde(default = "default_auth_state_path")]
    pub auth_state_path: PathBuf,
    #[serde(default = "default_geckodriver")]
    pub geckodriver: String,
    #[serde(default)]
    pub webdriver_port: Option<u16>,
    #[serde(default)]
    pub driver_log: Option<PathBuf>,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_indicator_name")]
    pub indicator_name: String,
    #[serde(default = "default_chart_style")]
    pub chart_style: String,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    /// Abort instead of continuing when sign-in cannot be confirmed.
    #[serde(default)]
    pub require_login: bool,
}

fn default_control_file() -> String {
    "init.txt".to_string()
}

fn default_csv_file() -> String {
    "volume_data.csv".to_string()
}

fn default_auth_state_path() -> PathBuf {
    PathBuf::from("auth_state.json")
}

fn default_geckodriver() -> String {
    "geckodriver".to_string()
}

fn default_indicator_name() -> String {
    "Frank kyakusse Vol VIDYA".to_string()
}

fn default_chart_style() -> String {
    "Heikin Ashi".to_string()
}

fn default_settle_ms() -> u64 {
    3_000
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_monitor_interval_ms() -> u64 {
    3_000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed(ENV_PREFIX).from_env()
    }

    /// Explicit setting, else the terminal's shared files folder under
    /// `%APPDATA%`.
    pub fn session_base_dir(&self) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
        if let Some(dir) = &self.session_base_dir {
            return Ok(dir.clone());
        }
        let appdata = std::env::var_os("APPDATA").ok_or(
            "APPDATA is not set; set VOLTRAP_SESSION_BASE_DIR to the terminal's Common/Files folder",
        )?;
        Ok(PathBuf::from(appdata)
            .join("MetaQuotes")
            .join("Terminal")
            .join("Common")
            .join("Files"))
    }

    pub fn poll_timings(&self) -> PollTimings {
        PollTimings {
            settle: Duration::from_millis(self.settle_ms),
            interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> AppConfig {
        envy::prefixed(ENV_PREFIX)
            .from_iter(
                pairs
                    .iter()
                    .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string())),
            )
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let conf = from_pairs(&[]);
        assert_eq!(conf.control_file, "init.txt");
        assert_eq!(conf.csv_file, "volume_data.csv");
        assert_eq!(conf.auth_state_path, PathBuf::from("auth_state.json"));
        assert_eq!(conf.chart_style, "Heikin Ashi");
        assert!(!conf.headless);
        assert!(!conf.require_login);
        assert_eq!(conf.poll_timings().settle, Duration::from_secs(3));
        assert_eq!(conf.poll_timings().interval, Duration::from_secs(5));
        assert_eq!(conf.monitor_interval(), Duration::from_secs(3));
    }

    #[test]
    fn test_overrides() {
        let conf = from_pairs(&[
            ("SESSION_BASE_DIR", "/tmp/sessions"),
            ("HEADLESS", "true"),
            ("WEBDRIVER_PORT", "4444"),
            ("POLL_INTERVAL_MS", "250"),
            ("REQUIRE_LOGIN", "true"),
        ]);
        assert_eq!(conf.session_base_dir().unwrap(), PathBuf::from("/tmp/sessions"));
        assert!(conf.headless);
        assert_eq!(conf.webdriver_port, Some(4444));
        assert_eq!(conf.poll_timings().interval, Duration::from_millis(250));
        assert!(conf.require_login);
    }

    #[test]
    fn test_out_of_range_port_is_rejected() {
        let pairs = [(format!("{ENV_PREFIX}WEBDRIVER_PORT"), "70000".to_string())];
        assert!(envy::prefixed(ENV_PREFIX).from_iter::<_, AppConfig>(pairs).is_err());
    }
}
