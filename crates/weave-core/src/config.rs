use serde::{Deserialize, Serialize};

use crate::error::{WeaveError, WeaveResult};
use crate::schema::RangePolicy;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FrameConfig {
    pub width: u32,
    pub height: u32,
    pub frames: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 36,
            frames: 1,
        }
    }
}

/// How stages are dispatched within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One stage at a time, in schedule order.
    #[default]
    Sequential,
    /// Stages of the same dependency level run concurrently.
    Parallel,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ExecutionMode,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub range_policy: RangePolicy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String, // tracing EnvFilter directive, e.g. "info" or "weave_graph=debug"
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct WeaveConfig {
    #[serde(default)]
    pub frame: FrameConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl WeaveConfig {
    pub fn from_toml_str(contents: &str) -> WeaveResult<Self> {
        let config: WeaveConfig = toml::from_str(contents)?;
        if config.frame.width == 0 || config.frame.height == 0 {
            return Err(WeaveError::Config(
                "frame width and height must be non-zero".into(),
            ));
        }
        Ok(config)
    }

    pub fn load_from_file(path: &std::path::Path) -> WeaveResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> WeaveResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| WeaveError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = WeaveConfig::from_toml_str("").unwrap();
        assert_eq!(config.frame.width, 64);
        assert_eq!(config.frame.frames, 1);
        assert_eq!(config.execution.mode, ExecutionMode::Sequential);
        assert_eq!(config.validation.range_policy, RangePolicy::Reject);
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn test_partial_sections() {
        let config = WeaveConfig::from_toml_str(
            "[frame]\nwidth = 128\n[execution]\nmode = \"parallel\"\n[validation]\nrange_policy = \"clamp\"\n",
        )
        .unwrap();
        assert_eq!(config.frame.width, 128);
        assert_eq!(config.frame.height, 36);
        assert_eq!(config.execution.mode, ExecutionMode::Parallel);
        assert_eq!(config.validation.range_policy, RangePolicy::Clamp);
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = WeaveConfig::from_toml_str("[frame]\nwidth = 0\n").unwrap_err();
        assert!(matches!(err, WeaveError::Config(_)));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let err = WeaveConfig::from_toml_str("[execution]\nmode = \"gpu\"\n").unwrap_err();
        assert!(matches!(err, WeaveError::Toml(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("weave-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("weave.toml");

        let mut config = WeaveConfig::default();
        config.frame.frames = 8;
        config.save_to_file(&path).unwrap();

        let loaded = WeaveConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.frame.frames, 8);
        std::fs::remove_dir_all(&dir).ok();
    }
}
