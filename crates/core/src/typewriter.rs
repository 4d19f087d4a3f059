//! Cancellable character-by-character text reveal.
//!
//! One reveal is active per engine at a time: starting a new one
//! supersedes the previous reveal and drops its remaining schedule.
//! Cancelling (`skip`) completes the reveal immediately and is
//! idempotent. The engine drives the cadence from `tick`.

use std::time::Duration;

/// Delay per character at 1.0x text speed.
pub const BASE_CHAR_DELAY: Duration = Duration::from_millis(25);

#[derive(Debug, Default)]
pub struct Typewriter {
    chars: Vec<char>,
    revealed: usize,
    char_delay: Duration,
    carry: Duration,
    active: bool,
}

impl Typewriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins revealing `text`, superseding any reveal in progress.
    pub fn start(&mut self, text: &str, char_delay: Duration) {
        self.chars = text.chars().collect();
        self.revealed = 0;
        self.char_delay = char_delay.max(Duration::from_millis(1));
        self.carry = Duration::ZERO;
        self.active = !self.chars.is_empty();
    }

    /// Completes the reveal immediately. Returns the characters that were
    /// still pending; calling again is a no-op returning nothing.
    pub fn skip(&mut self) -> Vec<char> {
        if !self.active {
            return Vec::new();
        }
        let remaining = self.chars[self.revealed..].to_vec();
        self.revealed = self.chars.len();
        self.active = false;
        self.carry = Duration::ZERO;
        remaining
    }

    /// Drops the reveal without completing it (scene teardown).
    pub fn cancel(&mut self) {
        self.chars.clear();
        self.revealed = 0;
        self.active = false;
        self.carry = Duration::ZERO;
    }

    /// Advances the reveal by `dt`, returning the newly revealed
    /// characters at the scheduled cadence.
    pub fn tick(&mut self, dt: Duration) -> Vec<char> {
        if !self.active {
            return Vec::new();
        }
        self.carry += dt;
        let mut out = Vec::new();
        while self.carry >= self.char_delay && self.revealed < self.chars.len() {
            self.carry -= self.char_delay;
            out.push(self.chars[self.revealed]);
            self.revealed += 1;
        }
        if self.revealed >= self.chars.len() {
            self.active = false;
            self.carry = Duration::ZERO;
        }
        out
    }

    pub fn is_typing(&self) -> bool {
        self.active
    }

    pub fn revealed_count(&self) -> usize {
        self.revealed
    }
}
