use directories::BaseDirs;
use std::path::PathBuf;

/// Application config directory (OS standard)
/// Linux: ~/.config/NS-USBloader
/// macOS: ~/Library/Application Support/NS-USBloader
/// Windows: %APPDATA%\\NS-USBloader
///
/// `NSUSBLOADER_CONFIG_DIR` overrides the location.
pub fn app_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("NSUSBLOADER_CONFIG_DIR") {
        let dir = dir.trim();
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    if let Some(base) = BaseDirs::new() {
        return base.config_dir().join("NS-USBloader");
    }
    // Fallback: current working directory
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Preference file used by the settings session
pub fn preferences_path() -> PathBuf {
    app_config_dir().join("preferences.toml")
}

/// Directory that contains the current executable
pub fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
}
