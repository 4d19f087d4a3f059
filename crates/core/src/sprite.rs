//! Frame-cycling driver for animated sprites.
//!
//! All registered sprites share one timing loop; there is no per-sprite
//! timer. Entries whose sprite has left the stage are pruned lazily on
//! their next scheduled tick.

use std::time::Duration;

use crate::content::SharedStr;
use crate::stage::Stage;

/// Delay between animation frames.
pub const FRAME_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug)]
struct AnimatedEntry {
    sprite: SharedStr,
    frames: u32,
    frame: u32,
    since_last: Duration,
}

#[derive(Debug)]
pub struct SpriteAnimator {
    entries: Vec<AnimatedEntry>,
    frame_delay: Duration,
}

impl Default for SpriteAnimator {
    fn default() -> Self {
        Self::new()
    }
}

impl SpriteAnimator {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            frame_delay: FRAME_DELAY,
        }
    }

    /// Registers (or restarts) the animation for a named stage sprite.
    pub fn start(&mut self, sprite: SharedStr, frames: u32) {
        if frames < 2 {
            return;
        }
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.sprite == sprite)
        {
            entry.frames = frames;
            entry.frame = 1;
            entry.since_last = Duration::ZERO;
            return;
        }
        self.entries.push(AnimatedEntry {
            sprite,
            frames,
            frame: 1,
            since_last: Duration::ZERO,
        });
    }

    pub fn stop(&mut self, sprite: &str) {
        self.entries.retain(|entry| entry.sprite.as_ref() != sprite);
    }

    /// Clears every animation; called on every scene transition so no
    /// orphaned animation outlives its sprite.
    pub fn stop_all(&mut self) {
        self.entries.clear();
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }

    /// Advances all animations and writes current frames to the stage.
    pub fn tick(&mut self, dt: Duration, stage: &mut Stage) {
        let frame_delay = self.frame_delay;
        self.entries.retain_mut(|entry| {
            let Some(sprite) = stage.sprite_mut(entry.sprite.as_ref()) else {
                // Sprite left the stage; prune on its scheduled tick.
                return false;
            };
            entry.since_last += dt;
            while entry.since_last >= frame_delay {
                entry.since_last -= frame_delay;
                entry.frame = if entry.frame >= entry.frames {
                    1
                } else {
                    entry.frame + 1
                };
            }
            sprite.frame = entry.frame;
            true
        });
    }
}
