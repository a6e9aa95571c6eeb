//! Standard paths used by focusguard

use std::path::PathBuf;

/// Environment variable that points at an explicit config file
pub const CONFIG_ENV: &str = "FOCUSGUARD_CONFIG";

/// Standard focusguard paths
pub struct Paths {
    /// Config directory (~/.config/focusguard)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("focusguard");

        Self { config }
    }

    /// Path of the config file, honoring `FOCUSGUARD_CONFIG` first
    pub fn config_file(&self) -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }
        self.config.join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_namespaced() {
        let paths = Paths::new();
        assert!(paths.config.ends_with("focusguard"));
    }
}
