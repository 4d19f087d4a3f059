//! Achievement catalog, unlock tracking, and persistence.
//!
//! Unlocked flags persist independently of session saves, so a new game
//! never clears them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::storage::PersistenceStore;

/// Store key for the achievements record.
pub const ACHIEVEMENTS_KEY: &str = "achievements";

/// Hint detours needed for [`AchievementKey::HintMaster`].
pub const HINT_MASTER_THRESHOLD: u32 = 3;
/// Typewriter fast-forwards needed for [`AchievementKey::SpeedReader`].
pub const SPEED_READER_THRESHOLD: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AchievementKey {
    FirstChoice,
    PerfectRun,
    HintMaster,
    SpeedReader,
    Storyteller,
    Completionist,
}

impl AchievementKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementKey::FirstChoice => "first_choice",
            AchievementKey::PerfectRun => "perfect_run",
            AchievementKey::HintMaster => "hint_master",
            AchievementKey::SpeedReader => "speed_reader",
            AchievementKey::Storyteller => "storyteller",
            AchievementKey::Completionist => "completionist",
        }
    }
}

/// Static catalog entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AchievementDef {
    pub key: AchievementKey,
    pub title: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
}

/// The full catalog, in display order.
pub const CATALOG: [AchievementDef; 6] = [
    AchievementDef {
        key: AchievementKey::FirstChoice,
        title: "First Choice",
        description: "Make your first scored decision",
        icon: "🎯",
    },
    AchievementDef {
        key: AchievementKey::PerfectRun,
        title: "Perfect Harmony",
        description: "Finish the story without a single wrong call",
        icon: "🏆",
    },
    AchievementDef {
        key: AchievementKey::HintMaster,
        title: "Wise Counselor",
        description: "Ask for advice three times",
        icon: "☯",
    },
    AchievementDef {
        key: AchievementKey::SpeedReader,
        title: "Speed Reader",
        description: "Fast-forward the text ten times",
        icon: "⚡",
    },
    AchievementDef {
        key: AchievementKey::Storyteller,
        title: "Keeper of Stories",
        description: "Open the dialogue history",
        icon: "📜",
    },
    AchievementDef {
        key: AchievementKey::Completionist,
        title: "Finalist",
        description: "Reach an ending",
        icon: "🎬",
    },
];

/// One catalog entry with its unlocked flag, for UI listings.
#[derive(Clone, Debug)]
pub struct AchievementStatus {
    pub def: AchievementDef,
    pub unlocked: bool,
}

/// Persisted form: achievement key to unlocked flag.
pub type AchievementsRecord = BTreeMap<String, bool>;

#[derive(Debug, Default)]
pub struct Achievements {
    record: AchievementsRecord,
    /// Unlocks not yet shown to the player.
    pending: Vec<AchievementDef>,
}

impl Achievements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(store: &PersistenceStore) -> Self {
        let record = store
            .get::<AchievementsRecord>(ACHIEVEMENTS_KEY)
            .unwrap_or_default();
        Self {
            record,
            pending: Vec::new(),
        }
    }

    pub fn save(&self, store: &mut PersistenceStore) {
        if let Err(err) = store.set(ACHIEVEMENTS_KEY, &self.record) {
            tracing::warn!(%err, "failed to persist achievements");
        }
    }

    pub fn is_unlocked(&self, key: AchievementKey) -> bool {
        self.record.get(key.as_str()).copied().unwrap_or(false)
    }

    /// Unlocks once; returns true only on the first unlock.
    pub fn unlock(&mut self, key: AchievementKey) -> bool {
        if self.is_unlocked(key) {
            return false;
        }
        self.record.insert(key.as_str().to_string(), true);
        if let Some(def) = CATALOG.iter().find(|def| def.key == key) {
            tracing::info!(achievement = def.title, "achievement unlocked");
            self.pending.push(def.clone());
        }
        true
    }

    /// Unlock notifications accumulated since the last drain.
    pub fn drain_notifications(&mut self) -> Vec<AchievementDef> {
        std::mem::take(&mut self.pending)
    }

    pub fn all(&self) -> Vec<AchievementStatus> {
        CATALOG
            .iter()
            .map(|def| AchievementStatus {
                def: def.clone(),
                unlocked: self.is_unlocked(def.key),
            })
            .collect()
    }

    pub fn unlocked_count(&self) -> usize {
        CATALOG.iter().filter(|def| self.is_unlocked(def.key)).count()
    }

    pub fn reset_all(&mut self) {
        self.record.clear();
        self.pending.clear();
    }
}
