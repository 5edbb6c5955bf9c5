//! Config file location
//!
//! - Linux/macOS: XDG_CONFIG_HOME/composition-watcher or ~/.config/composition-watcher
//! - Windows: %APPDATA%\composition-watcher\config

use std::path::PathBuf;

const APP_NAME: &str = "composition-watcher";

/// Environment variable naming an explicit config file
pub const CONFIG_FILE_ENV: &str = "COMPOSITION_WATCHER_CONFIG";

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        use directories::ProjectDirs;
        ProjectDirs::from("", "", APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".").join(".config").join(APP_NAME))
    }
    #[cfg(not(windows))]
    {
        use directories::BaseDirs;
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                BaseDirs::new()
                    .map(|dirs| dirs.home_dir().join(".config"))
                    .unwrap_or_else(|| PathBuf::from(".").join(".config"))
            })
            .join(APP_NAME)
    }
}

/// Config file used when none is given: `$COMPOSITION_WATCHER_CONFIG`, else `config.yaml` in [`config_dir`]
pub fn default_config_path() -> PathBuf {
    std::env::var(CONFIG_FILE_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.yaml"))
}
