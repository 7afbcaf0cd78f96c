//! Configuration – reads/writes `~/.platecam/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use platecam_hal::{FacingMode, StreamRequest};
use platecam_kernel::ControllerConfig;
use platecam_kernel::config::{DEFAULT_JPEG_QUALITY, DEFAULT_READINESS_TIMEOUT};

/// Persisted user configuration stored in `~/.platecam/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Seconds a granted camera may take to show its first frame.
    #[serde(default = "default_readiness_timeout_secs")]
    pub readiness_timeout_secs: u64,

    /// JPEG quality (1–100) for captured snapshots.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Preferred camera.
    #[serde(default)]
    pub facing: FacingMode,

    #[serde(default = "default_ideal_width")]
    pub ideal_width: u32,

    #[serde(default = "default_ideal_height")]
    pub ideal_height: u32,

    /// Where captured and uploaded snapshots are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_readiness_timeout_secs() -> u64 {
    DEFAULT_READINESS_TIMEOUT.as_secs()
}
fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}
fn default_ideal_width() -> u32 {
    StreamRequest::default().ideal_width
}
fn default_ideal_height() -> u32 {
    StreamRequest::default().ideal_height
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("platecam-snapshots")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            readiness_timeout_secs: default_readiness_timeout_secs(),
            jpeg_quality: default_jpeg_quality(),
            facing: FacingMode::default(),
            ideal_width: default_ideal_width(),
            ideal_height: default_ideal_height(),
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Build the controller configuration these settings describe.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig::default()
            .with_readiness_timeout(Duration::from_secs(self.readiness_timeout_secs))
            .with_jpeg_quality(self.jpeg_quality)
            .with_stream_request(StreamRequest {
                facing: self.facing,
                ideal_width: self.ideal_width,
                ideal_height: self.ideal_height,
            })
    }
}

/// Return the path to `~/.platecam/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".platecam").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `PLATECAM_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PLATECAM_READINESS_TIMEOUT_SECS` | `readiness_timeout_secs` |
/// | `PLATECAM_JPEG_QUALITY` | `jpeg_quality` |
/// | `PLATECAM_FACING` | `facing` (`environment`, `user`, `any`) |
/// | `PLATECAM_OUTPUT_DIR` | `output_dir` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PLATECAM_READINESS_TIMEOUT_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.readiness_timeout_secs = secs;
    }
    if let Ok(v) = std::env::var("PLATECAM_JPEG_QUALITY")
        && let Ok(q) = v.parse::<u8>()
    {
        cfg.jpeg_quality = q;
    }
    if let Ok(v) = std::env::var("PLATECAM_FACING") {
        match v.to_ascii_lowercase().as_str() {
            "environment" => cfg.facing = FacingMode::Environment,
            "user" => cfg.facing = FacingMode::User,
            "any" => cfg.facing = FacingMode::Any,
            _ => {}
        }
    }
    if let Ok(v) = std::env::var("PLATECAM_OUTPUT_DIR") {
        cfg.output_dir = PathBuf::from(v);
    }
}

/// Save the config to disk, creating `~/.platecam/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.readiness_timeout_secs, 10);
        assert_eq!(loaded.jpeg_quality, 90);
        assert_eq!(loaded.facing, FacingMode::Environment);
        assert_eq!(loaded.ideal_width, 1920);
    }

    #[cfg(unix)]
    #[test]
    fn saved_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        let dir_mode = fs::metadata(path.parent().unwrap()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[test]
    fn config_path_points_to_platecam_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".platecam"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "facing = \"user\"\njpeg_quality = 70\n").unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.facing, FacingMode::User);
        assert_eq!(cfg.jpeg_quality, 70);
        assert_eq!(cfg.readiness_timeout_secs, 10);
        assert_eq!(cfg.output_dir, PathBuf::from("platecam-snapshots"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "jpeg_quality = \"very high\"").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("Failed to parse config"));
    }

    #[test]
    fn controller_config_reflects_settings() {
        let cfg = Config {
            readiness_timeout_secs: 3,
            jpeg_quality: 0,
            facing: FacingMode::Any,
            ideal_width: 640,
            ideal_height: 480,
            output_dir: default_output_dir(),
        };
        let ctl = cfg.controller_config();
        assert_eq!(ctl.readiness_timeout(), Duration::from_secs(3));
        // Quality is clamped by the controller config.
        assert_eq!(ctl.jpeg_quality(), 1);
        assert_eq!(ctl.stream_request().facing, FacingMode::Any);
        assert_eq!(ctl.stream_request().ideal_height, 480);
    }

    #[test]
    fn apply_env_overrides_changes_facing() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("PLATECAM_FACING", "User") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.facing, FacingMode::User);
        unsafe { std::env::remove_var("PLATECAM_FACING") };
    }

    #[test]
    fn apply_env_overrides_changes_timeout() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("PLATECAM_READINESS_TIMEOUT_SECS", "25") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.readiness_timeout_secs, 25);
        unsafe { std::env::remove_var("PLATECAM_READINESS_TIMEOUT_SECS") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_quality() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("PLATECAM_JPEG_QUALITY", "max") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.jpeg_quality, 90);
        unsafe { std::env::remove_var("PLATECAM_JPEG_QUALITY") };
    }

    #[test]
    fn apply_env_overrides_changes_output_dir() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("PLATECAM_OUTPUT_DIR", "/tmp/meals") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.output_dir, PathBuf::from("/tmp/meals"));
        unsafe { std::env::remove_var("PLATECAM_OUTPUT_DIR") };
    }
}
