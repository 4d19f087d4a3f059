//! User-facing playback settings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::storage::{PersistenceStore, StorageError};
use crate::typewriter::BASE_CHAR_DELAY;

/// Store key for the settings record.
pub const SETTINGS_KEY: &str = "settings";

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Typewriter speed multiplier, 1.0 = authored pace.
    pub text_speed_multiplier: f32,
    pub bgm_volume: f32,
    pub sfx_volume: f32,
    pub skip_tutorial: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            text_speed_multiplier: 1.0,
            bgm_volume: 0.4,
            sfx_volume: 0.3,
            skip_tutorial: false,
        }
    }
}

impl Settings {
    /// Clamps every field into its valid range.
    pub fn clamped(mut self) -> Self {
        self.text_speed_multiplier = self.text_speed_multiplier.clamp(0.25, 4.0);
        self.bgm_volume = self.bgm_volume.clamp(0.0, 1.0);
        self.sfx_volume = self.sfx_volume.clamp(0.0, 1.0);
        self
    }

    /// Per-character reveal delay derived from the speed multiplier.
    pub fn char_delay(&self) -> Duration {
        BASE_CHAR_DELAY.div_f32(self.text_speed_multiplier.clamp(0.25, 4.0))
    }

    pub fn load(store: &PersistenceStore) -> Self {
        store
            .get::<Settings>(SETTINGS_KEY)
            .map(Settings::clamped)
            .unwrap_or_default()
    }

    pub fn save(&self, store: &mut PersistenceStore) -> Result<(), StorageError> {
        store.set(SETTINGS_KEY, &self.clamped())
    }

    /// Desktop-host config file form.
    pub fn load_toml(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|err| EngineError::Persistence(err.to_string()))?;
        let settings: Settings =
            toml::from_str(&content).map_err(|err| EngineError::Persistence(err.to_string()))?;
        Ok(settings.clamped())
    }

    pub fn save_toml(&self, path: &Path) -> EngineResult<()> {
        let content = toml::to_string_pretty(&self.clamped())
            .map_err(|err| EngineError::Persistence(err.to_string()))?;
        std::fs::write(path, content).map_err(|err| EngineError::Persistence(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_delay_scales_with_multiplier() {
        let normal = Settings::default();
        assert_eq!(normal.char_delay(), Duration::from_millis(25));
        let fast = Settings {
            text_speed_multiplier: 2.0,
            ..Default::default()
        };
        assert!(fast.char_delay() < normal.char_delay());
    }

    #[test]
    fn clamping_bounds_every_field() {
        let wild = Settings {
            text_speed_multiplier: 100.0,
            bgm_volume: -3.0,
            sfx_volume: 2.0,
            skip_tutorial: true,
        }
        .clamped();
        assert_eq!(wild.text_speed_multiplier, 4.0);
        assert_eq!(wild.bgm_volume, 0.0);
        assert_eq!(wild.sfx_volume, 1.0);
        assert!(wild.skip_tutorial);
    }

    #[test]
    fn store_round_trip_with_missing_defaults() {
        let mut store = PersistenceStore::in_memory();
        assert_eq!(Settings::load(&store), Settings::default());
        let custom = Settings {
            text_speed_multiplier: 1.5,
            skip_tutorial: true,
            ..Default::default()
        };
        custom.save(&mut store).expect("save");
        assert_eq!(Settings::load(&store), custom);
    }

    #[test]
    fn toml_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.toml");
        let custom = Settings {
            bgm_volume: 0.8,
            ..Default::default()
        };
        custom.save_toml(&path).expect("save");
        let loaded = Settings::load_toml(&path).expect("load");
        assert_eq!(loaded, custom);
    }
}
