//! Engine configuration.
//!
//! Read from a TOML file (usually `stagehand.toml`), then optionally
//! overridden from the environment:
//!
//! ```toml
//! fps = 60
//! turbo_mode = false
//! clone_limit = 300
//! random_seed = 7
//! ```
//!
//! | variable                | field         |
//! |-------------------------|---------------|
//! | `STAGEHAND_FPS`         | `fps`         |
//! | `STAGEHAND_TURBO`       | `turbo_mode`  |
//! | `STAGEHAND_CLONE_LIMIT` | `clone_limit` |

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_FPS: f64 = 30.0;
pub const DEFAULT_CLONE_LIMIT: i64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheduler passes per second.
    pub fps: f64,
    /// Keep running threads after a redraw request instead of ending the pass.
    pub turbo_mode: bool,
    /// Share of each frame that threads may use.
    pub work_fraction: f64,
    /// Maximum number of live clones; negative means unlimited.
    pub clone_limit: i64,
    pub random_seed: Option<u64>,
    pub stage_width: f64,
    pub stage_height: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            turbo_mode: false,
            work_fraction: 0.75,
            clone_limit: DEFAULT_CLONE_LIMIT,
            random_seed: None,
            stage_width: 480.0,
            stage_height: 360.0,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `STAGEHAND_*` overrides. Unparseable values are ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup("STAGEHAND_FPS") {
            match raw.parse::<f64>() {
                Ok(fps) if fps > 0.0 && fps.is_finite() => self.fps = fps,
                _ => warn!(value = %raw, "ignoring invalid STAGEHAND_FPS"),
            }
        }
        if let Some(raw) = lookup("STAGEHAND_TURBO") {
            match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.turbo_mode = true,
                "0" | "false" | "no" | "off" => self.turbo_mode = false,
                _ => warn!(value = %raw, "ignoring invalid STAGEHAND_TURBO"),
            }
        }
        if let Some(raw) = lookup("STAGEHAND_CLONE_LIMIT") {
            match raw.parse::<i64>() {
                Ok(limit) => self.clone_limit = limit,
                Err(_) => warn!(value = %raw, "ignoring invalid STAGEHAND_CLONE_LIMIT"),
            }
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fps > 0.0 && self.fps.is_finite()) {
            return Err(ConfigError::Invalid {
                key: "fps",
                reason: format!("must be a positive number, got {}", self.fps),
            });
        }
        if !(self.work_fraction > 0.0 && self.work_fraction <= 1.0) {
            return Err(ConfigError::Invalid {
                key: "work_fraction",
                reason: format!("must be in (0, 1], got {}", self.work_fraction),
            });
        }
        if self.stage_width <= 0.0 || self.stage_height <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "stage_width",
                reason: "stage dimensions must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Length of one frame. Falls back to the default rate when `fps` is
    /// unusable.
    pub fn frame_duration(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.fps)
            .unwrap_or_else(|_| Duration::from_secs_f64(1.0 / DEFAULT_FPS))
    }

    /// Portion of a frame threads may run before the pass ends.
    pub fn work_budget(&self) -> Duration {
        let seconds = self.frame_duration().as_secs_f64() * self.work_fraction.clamp(0.0, 1.0);
        Duration::try_from_secs_f64(seconds).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.fps, 30.0);
        assert!(!config.turbo_mode);
        assert_eq!(config.clone_limit, 300);
        let budget = config.work_budget().as_secs_f64();
        assert!((budget - 0.025).abs() < 1e-9);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("fps = 60\nturbo_mode = true\n").unwrap();
        assert_eq!(config.fps, 60.0);
        assert!(config.turbo_mode);
        assert_eq!(config.clone_limit, DEFAULT_CLONE_LIMIT);
        assert_eq!(config.random_seed, None);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("fps = 0"),
            Err(ConfigError::Invalid { key: "fps", .. })
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("fps = \"fast\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "clone_limit = -1\nrandom_seed = 9").unwrap();
        let config = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.clone_limit, -1);
        assert_eq!(config.random_seed, Some(9));

        let missing = EngineConfig::load_from(Path::new("/nonexistent/stagehand.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn overrides_apply_and_ignore_garbage() {
        let env: HashMap<&str, &str> = [
            ("STAGEHAND_FPS", "-5"),
            ("STAGEHAND_TURBO", "yes"),
            ("STAGEHAND_CLONE_LIMIT", "12"),
        ]
        .into_iter()
        .collect();
        let config = EngineConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.fps, DEFAULT_FPS);
        assert!(config.turbo_mode);
        assert_eq!(config.clone_limit, 12);
    }
}
