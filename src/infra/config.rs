// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::infra::paths;
use crate::plugins::LoadOptions;
use crate::scripting::{EngineOptions, HttpSettings, RuntimeLimits};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Directory scanned for plugin folders and `.tcplugin` archives.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Where per-plugin cache files are persisted.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Upper bound for a single supervised script call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_seconds: u64,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            cache_dir: None,
            call_timeout_seconds: default_call_timeout(),
        }
    }
}

fn default_call_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 5,
            user_agent: format!("totalcontrol/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_expr_depth: usize,
    pub max_function_expr_depth: usize,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let limits = RuntimeLimits::default();
        Self {
            max_expr_depth: limits.max_expr_depth,
            max_function_expr_depth: limits.max_function_expr_depth,
            max_call_levels: limits.max_call_levels,
            max_string_size: limits.max_string_size,
            max_array_size: limits.max_array_size,
            max_map_size: limits.max_map_size,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            file: None,
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.plugins.dir.clone().unwrap_or_else(paths::plugins_dir)
    }

    pub fn cache_dir(&self) -> PathBuf {
        match (&self.plugins.cache_dir, &self.plugins.dir) {
            (Some(dir), _) => dir.clone(),
            (None, Some(plugins)) => plugins.join(".cache"),
            (None, None) => paths::plugin_cache_dir(),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.plugins.call_timeout_seconds.max(1))
    }

    /// Options every engine built by this process starts from.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            cache_dir: Some(self.cache_dir()),
            http: HttpSettings {
                timeout: Duration::from_secs(self.http.timeout_seconds.max(1)),
                user_agent: self.http.user_agent.clone(),
            },
            limits: RuntimeLimits {
                max_expr_depth: self.limits.max_expr_depth,
                max_function_expr_depth: self.limits.max_function_expr_depth,
                max_call_levels: self.limits.max_call_levels,
                max_string_size: self.limits.max_string_size,
                max_array_size: self.limits.max_array_size,
                max_map_size: self.limits.max_map_size,
            },
            ..EngineOptions::default()
        }
    }

    /// Plugin load settings: engine options plus the per-call deadline.
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            engine: self.engine_options(),
            call_timeout: Some(self.call_timeout()),
        }
    }
}
