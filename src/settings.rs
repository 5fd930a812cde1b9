// Distributed under the GNU Affero General Public License v3.0 or later.
// See accompanying file LICENSE or https://www.gnu.org/licenses/agpl-3.0.html for details.
use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BroadPhaseSettings {
    /// Padding added to each side of a broad-phase box, as a fraction of its size.
    pub loose_margin: f32,
}

impl Default for BroadPhaseSettings {
    fn default() -> Self {
        Self { loose_margin: 0.1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObbSettings {
    /// Smallest full extent a box gets along any axis.
    pub min_thickness: f32,
}

impl Default for ObbSettings {
    fn default() -> Self {
        Self {
            min_thickness: 0.001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Appended to the mesh file name to form the cache file name.
    pub suffix: String,
    /// Directory for cache files. Next to the mesh when unset.
    pub directory: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            suffix: String::from(".obb.cache"),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TickSettings {
    /// A tick slower than this many milliseconds is logged as a warning. 0 disables.
    pub budget_ms: u64,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self { budget_ms: 16 }
    }
}

impl TickSettings {
    pub fn budget(&self) -> Option<Duration> {
        (self.budget_ms > 0).then(|| Duration::from_millis(self.budget_ms))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollisionSettings {
    pub broad_phase: BroadPhaseSettings,
    pub obb: ObbSettings,
    pub cache: CacheSettings,
    pub tick: TickSettings,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization/Deserialization Error: {0}")]
    Serde(#[from] toml::de::Error),

    #[error("Serialization Error: {0}")]
    SerdeSer(#[from] toml::ser::Error),

    #[error("Configuration Directory Not Found")]
    ConfigDirNotFound,
}

impl CollisionSettings {
    /// Retrieves the path to the default settings file.
    pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
        let config_dir = config_dir().ok_or(SettingsError::ConfigDirNotFound)?;
        Ok(config_dir.join("collide").join("collision_settings.toml"))
    }

    /// Loads settings from a specified file path.
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path)?;
        let settings: CollisionSettings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Saves settings to a specified file path, ensuring the directory exists.
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Loads the settings file from the user config directory, falling back to
    /// defaults when it is missing or unreadable.
    pub fn load_or_default() -> Self {
        let path = match Self::default_settings_path() {
            Ok(path) => path,
            Err(e) => {
                log::warn!("{}. Using default collision settings.", e);
                return Self::default();
            }
        };

        if !path.exists() {
            log::info!(
                "No collision settings at {}. Using defaults.",
                path.display()
            );
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!(
                    "Failed to load collision settings from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }
}
