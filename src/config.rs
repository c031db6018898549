use crate::layout::{DEFAULT_TOP_N_APS, DEFAULT_TOTAL_DEVICES, FeatureLayout};
use crate::store::DeviceId;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const CONFIG_PATH_ENV: &str = "CROWD_FOG_CONFIG";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_SERVER_PORT: u16 = 8000;
pub const DEFAULT_INTAKE_CAPACITY: usize = 64;
pub const DEFAULT_MODELS_DIR: &str = "models";
pub const DEFAULT_MODEL_NAME: &str = "linear";
pub const DEFAULT_PREDICTOR_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub layout: Option<LayoutSection>,
    #[serde(default)]
    pub predictor: Option<PredictorSection>,
    #[serde(default)]
    pub detector: Option<DetectorSection>,
    #[serde(default)]
    pub status_api: Option<StatusApiSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

/// Fixes the feature-vector layout. Changing either size requires a
/// predictor retrained on the new layout.
#[derive(Debug, Deserialize, Clone)]
pub struct LayoutSection {
    pub top_n_aps: Option<usize>,
    pub total_devices: Option<usize>,
    /// Sensor identity of this node, for scans it reports about itself.
    pub device_idx: Option<DeviceId>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PredictorSection {
    pub models_dir: Option<PathBuf>,
    /// Artifact file stem: `<models_dir>/<name>.json`
    pub name: Option<String>,
    pub timeout_ms: Option<u64>,
    /// Remote predictor URL; the local artifact becomes its fallback.
    pub endpoint: Option<String>,
    /// Input width of the remote predictor when no local artifact exists.
    pub feature_width: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectorSection {
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatusApiSection {
    pub forward_url: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8000)
    pub port: Option<u16>,
    /// Inbound messages buffered ahead of the receiver loop (default: 64)
    pub intake_capacity: Option<usize>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config path from `CROWD_FOG_CONFIG`, or the default.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(config_path())
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    pub fn log_level(&self) -> &str {
        non_empty(Some(self.logging.level.as_str())).unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn feature_layout(&self) -> Result<FeatureLayout, ConfigError> {
        let section = self.layout.as_ref();
        let top_n = section
            .and_then(|s| s.top_n_aps)
            .unwrap_or(DEFAULT_TOP_N_APS);
        let total_devices = section
            .and_then(|s| s.total_devices)
            .unwrap_or(DEFAULT_TOTAL_DEVICES);
        let layout = FeatureLayout::new(top_n, total_devices)
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;

        if let Some(device_idx) = self.local_device()
            && !layout.contains_device(device_idx as usize)
        {
            return Err(ConfigError::Invalid(format!(
                "device_idx {device_idx} outside fleet of {total_devices} devices"
            )));
        }
        Ok(layout)
    }

    pub fn local_device(&self) -> Option<DeviceId> {
        self.layout.as_ref().and_then(|s| s.device_idx)
    }

    pub fn models_dir(&self) -> &Path {
        self.predictor
            .as_ref()
            .and_then(|s| s.models_dir.as_deref())
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new(DEFAULT_MODELS_DIR))
    }

    pub fn model_name(&self) -> &str {
        non_empty(self.predictor.as_ref().and_then(|s| s.name.as_deref()))
            .unwrap_or(DEFAULT_MODEL_NAME)
    }

    pub fn predictor_timeout(&self) -> Duration {
        let ms = self
            .predictor
            .as_ref()
            .and_then(|s| s.timeout_ms)
            .unwrap_or(DEFAULT_PREDICTOR_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    pub fn predictor_endpoint(&self) -> Option<&str> {
        non_empty(self.predictor.as_ref().and_then(|s| s.endpoint.as_deref()))
    }

    pub fn remote_feature_width(&self) -> Option<usize> {
        self.predictor.as_ref().and_then(|s| s.feature_width)
    }

    pub fn detector_endpoint(&self) -> Option<&str> {
        non_empty(self.detector.as_ref().and_then(|s| s.endpoint.as_deref()))
    }

    pub fn detector_timeout(&self) -> Duration {
        let ms = self
            .detector
            .as_ref()
            .and_then(|s| s.timeout_ms)
            .unwrap_or(DEFAULT_COLLABORATOR_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    pub fn status_forward_url(&self) -> Option<&str> {
        non_empty(
            self.status_api
                .as_ref()
                .and_then(|s| s.forward_url.as_deref()),
        )
    }

    pub fn status_forward_timeout(&self) -> Duration {
        let ms = self
            .status_api
            .as_ref()
            .and_then(|s| s.timeout_ms)
            .unwrap_or(DEFAULT_COLLABORATOR_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    /// Returns the server port (default: 8000)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn intake_capacity(&self) -> usize {
        self.server
            .as_ref()
            .and_then(|s| s.intake_capacity)
            .unwrap_or(DEFAULT_INTAKE_CAPACITY)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_temp_config(label: &str, contents: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = std::env::temp_dir().join(format!("crowd-fog-{label}-{unique}.toml"));
        fs::write(&path, contents)?;
        Ok(path)
    }

    const MINIMAL: &str = r#"
[app]
name = "crowd-fog"

[logging]
level = "info"
"#;

    #[test]
    fn default_config_describes_default_layout() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_from_path(DEFAULT_CONFIG_PATH)?;
        let layout = config.feature_layout()?;
        assert_eq!(layout.top_n(), 5);
        assert_eq!(layout.total_devices(), 4);
        assert_eq!(layout.width(), 28);
        Ok(())
    }

    #[test]
    fn minimal_config_uses_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config("minimal", MINIMAL)?;

        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert_eq!(config.feature_layout()?, FeatureLayout::default());
        assert_eq!(config.local_device(), None);
        assert_eq!(config.models_dir(), Path::new("models"));
        assert_eq!(config.model_name(), "linear");
        assert_eq!(config.predictor_timeout(), Duration::from_secs(2));
        assert_eq!(config.predictor_endpoint(), None);
        assert_eq!(config.detector_endpoint(), None);
        assert_eq!(config.status_forward_url(), None);
        assert_eq!(config.server_port(), 8000);
        assert_eq!(config.intake_capacity(), 64);
        Ok(())
    }

    #[test]
    fn explicit_sections_override_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let contents = format!(
            "{MINIMAL}\n{}",
            r#"
[layout]
top_n_aps = 3
total_devices = 6
device_idx = 5

[predictor]
models_dir = "/srv/models"
name = "gpr"
timeout_ms = 750
endpoint = "http://127.0.0.1:9000/predict"

[status_api]
forward_url = "http://127.0.0.1:8000/api/update_crowd_status"

[server]
port = 9090
intake_capacity = 0
"#
        );
        let path = write_temp_config("explicit", &contents)?;

        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert_eq!(config.feature_layout()?.width(), 3 * 6 + 2 * 6);
        assert_eq!(config.local_device(), Some(5));
        assert_eq!(config.models_dir(), Path::new("/srv/models"));
        assert_eq!(config.model_name(), "gpr");
        assert_eq!(config.predictor_timeout(), Duration::from_millis(750));
        assert_eq!(
            config.predictor_endpoint(),
            Some("http://127.0.0.1:9000/predict")
        );
        assert!(config.status_forward_url().is_some());
        assert_eq!(config.server_port(), 9090);
        assert_eq!(config.intake_capacity(), 1);
        Ok(())
    }

    #[test]
    fn empty_strings_are_treated_as_missing() -> Result<(), Box<dyn std::error::Error>> {
        let contents = format!(
            "{MINIMAL}\n{}",
            r#"
[predictor]
name = ""
endpoint = " "

[detector]
endpoint = ""
"#
        );
        let path = write_temp_config("empty", &contents)?;

        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert_eq!(config.model_name(), "linear");
        assert_eq!(config.predictor_endpoint(), None);
        assert_eq!(config.detector_endpoint(), None);
        Ok(())
    }

    #[test]
    fn local_device_outside_fleet_is_invalid() -> Result<(), Box<dyn std::error::Error>> {
        let contents = format!("{MINIMAL}\n[layout]\ndevice_idx = 4\n");
        let path = write_temp_config("bad-device", &contents)?;

        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert!(matches!(config.feature_layout(), Err(ConfigError::Invalid(_))));
        Ok(())
    }

    #[test]
    fn missing_config_file_returns_read_error() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("crowd-fog-missing-{unique}.toml"));

        let result = load_from_path(&path);

        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn invalid_toml_returns_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp_config("invalid", "not = [valid")?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        Ok(())
    }
}
