use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Engine-wide defaults, persisted as JSON. New regions copy their
/// search settings from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds `wait`/`exists`/`wait_vanish` poll when no timeout is given.
    pub auto_wait_timeout: f64,
    /// Polls per second for waits and observers.
    pub wait_scan_rate: f64,
    /// Default CHANGE sensitivity: changed pixels needed to fire.
    pub observe_min_changed_pixels: u32,
    /// Largest per-channel difference still treated as "unchanged".
    pub change_pixel_tolerance: u8,
    /// Default range for `nearby()`.
    pub nearby_range: i32,
    pub show_actions: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_wait_timeout: 3.0,
            wait_scan_rate: 3.0,
            observe_min_changed_pixels: 50,
            change_pixel_tolerance: 16,
            nearby_range: 50,
            show_actions: false,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidSetting(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_scan_rate(self.wait_scan_rate)?;
        validate_timeout(self.auto_wait_timeout)?;
        Ok(())
    }
}

pub(crate) fn validate_scan_rate(rate: f64) -> Result<()> {
    if !(rate.is_finite() && rate > 0.0) {
        return Err(Error::InvalidSetting(format!("scan rate must be positive, got {}", rate)));
    }
    Ok(())
}

pub(crate) fn validate_timeout(secs: f64) -> Result<()> {
    if secs.is_nan() || secs < 0.0 {
        return Err(Error::InvalidSetting(format!("timeout must not be negative, got {}", secs)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("nope.json"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_then_load_keeps_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glimpse.json");
        let settings = Settings { wait_scan_rate: 10.0, ..Settings::default() };
        settings.save(&path).unwrap();
        assert_eq!(Settings::load(&path).wait_scan_rate, 10.0);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glimpse.json");
        std::fs::write(&path, r#"{ "auto_wait_timeout": 0.5 }"#).unwrap();
        let settings = Settings::load(&path);
        assert_eq!(settings.auto_wait_timeout, 0.5);
        assert_eq!(settings.wait_scan_rate, 3.0);
    }

    #[test]
    fn test_validate_rejects_bad_rates() {
        assert!(Settings { wait_scan_rate: 0.0, ..Settings::default() }.validate().is_err());
        assert!(Settings { auto_wait_timeout: -1.0, ..Settings::default() }.validate().is_err());
        assert!(Settings::default().validate().is_ok());
    }
}
