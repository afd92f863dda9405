// src/infra/paths.rs — XDG-compliant path management
//
// All paths respect the TOTALCONTROL_HOME environment variable for isolation.
// When TOTALCONTROL_HOME is set, config and data live under that directory.
// When unset, config uses the platform config dir and data uses XDG_DATA_HOME/totalcontrol.

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "totalcontrol")
}

/// Returns the TOTALCONTROL_HOME override, if set.
fn totalcontrol_home() -> Option<PathBuf> {
    std::env::var_os("TOTALCONTROL_HOME").map(PathBuf::from)
}

/// Configuration directory: $TOTALCONTROL_HOME/ or ~/.config/totalcontrol/
pub fn config_dir() -> PathBuf {
    if let Some(home) = totalcontrol_home() {
        return home;
    }
    match project_dirs() {
        Some(dirs) => dirs.config_dir().to_path_buf(),
        None => PathBuf::from(".totalcontrol"),
    }
}

/// Data directory: $TOTALCONTROL_HOME/data/ or ~/.local/share/totalcontrol/
pub fn data_dir() -> PathBuf {
    if let Some(home) = totalcontrol_home() {
        return home.join("data");
    }
    match project_dirs() {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => PathBuf::from(".totalcontrol").join("data"),
    }
}

/// Plugins directory (plugin folders and `.tcplugin` archives)
pub fn plugins_dir() -> PathBuf {
    data_dir().join("plugins")
}

/// Per-plugin cache files: one `<plugin id>.json` each
pub fn plugin_cache_dir() -> PathBuf {
    plugins_dir().join(".cache")
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}
