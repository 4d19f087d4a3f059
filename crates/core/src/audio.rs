//! Playback controllers for the engine's sound cues and background
//! track, behind a device-agnostic sink seam.
//!
//! The background channel replaces its track outright (no cross-fade);
//! handing it the source it is already playing resumes it when paused
//! and otherwise leaves it alone. One-shot cues retrigger from the
//! start. A sink may refuse background playback (browser-style autoplay
//! policy); the channel remembers that and retries on the next user
//! gesture.

use serde::{Deserialize, Serialize};

/// Cue played per revealed typewriter character.
pub const TYPING_CUE: &str = "sound/typing.mp3";
/// Cue played when a scene transition starts.
pub const TRANSITION_CUE: &str = "sound/transition.mp3";
/// Cue played on menu/choice clicks.
pub const MENU_CLICK_CUE: &str = "sound/menu_click.mp3";

/// Fixed cue set every host should preload.
pub const UI_CUES: [&str; 3] = [TYPING_CUE, TRANSITION_CUE, MENU_CLICK_CUE];

/// Device seam. Implementations wrap the actual audio output; the engine
/// never touches a device directly.
pub trait AudioSink {
    /// Plays a one-shot cue. An already-playing instance of the same cue
    /// restarts from the beginning rather than overlapping itself.
    fn play_sfx(&mut self, cue: &str);
    fn stop_sfx(&mut self, cue: &str);
    /// Starts the background track. Returns `false` when the device
    /// refuses playback (autoplay policy); the caller may retry later.
    fn play_bgm(&mut self, source: &str, looped: bool) -> bool;
    fn pause_bgm(&mut self);
    /// Returns `false` when the device refuses to resume.
    fn resume_bgm(&mut self) -> bool;
    fn stop_bgm(&mut self);
    fn set_bgm_volume(&mut self, volume: f32);
    fn set_sfx_volume(&mut self, volume: f32);
}

/// No-op sink for headless hosts and tests.
#[derive(Debug, Default)]
pub struct SilentSink;

impl AudioSink for SilentSink {
    fn play_sfx(&mut self, _cue: &str) {}
    fn stop_sfx(&mut self, _cue: &str) {}
    fn play_bgm(&mut self, _source: &str, _looped: bool) -> bool {
        true
    }
    fn pause_bgm(&mut self) {}
    fn resume_bgm(&mut self) -> bool {
        true
    }
    fn stop_bgm(&mut self) {}
    fn set_bgm_volume(&mut self, _volume: f32) {}
    fn set_sfx_volume(&mut self, _volume: f32) {}
}

/// Everything a sink was asked to do, for assertions and diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AudioEvent {
    Sfx(String),
    SfxStopped(String),
    Bgm { source: String, looped: bool },
    BgmPaused,
    BgmResumed,
    BgmStopped,
    BgmVolume(f32),
    SfxVolume(f32),
}

/// Sink that records every request; `allow_bgm = false` simulates an
/// autoplay-blocking device. Clones share one log, so a handle kept
/// outside the engine still observes everything.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    inner: std::sync::Arc<std::sync::Mutex<RecordingInner>>,
}

#[derive(Debug)]
struct RecordingInner {
    events: Vec<AudioEvent>,
    allow_bgm: bool,
}

impl Default for RecordingInner {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            allow_bgm: true,
        }
    }
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocked() -> Self {
        let sink = Self::default();
        sink.set_allow_bgm(false);
        sink
    }

    pub fn set_allow_bgm(&self, allow: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.allow_bgm = allow;
        }
    }

    pub fn events(&self) -> Vec<AudioEvent> {
        self.inner
            .lock()
            .map(|inner| inner.events.clone())
            .unwrap_or_default()
    }

    pub fn sfx_count(&self, cue: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, AudioEvent::Sfx(c) if c == cue))
            .count()
    }

    fn record(&self, event: AudioEvent) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.events.push(event);
        }
    }

    fn bgm_allowed(&self) -> bool {
        self.inner.lock().map(|inner| inner.allow_bgm).unwrap_or(true)
    }
}

impl AudioSink for RecordingSink {
    fn play_sfx(&mut self, cue: &str) {
        self.record(AudioEvent::Sfx(cue.to_string()));
    }
    fn stop_sfx(&mut self, cue: &str) {
        self.record(AudioEvent::SfxStopped(cue.to_string()));
    }
    fn play_bgm(&mut self, source: &str, looped: bool) -> bool {
        let allowed = self.bgm_allowed();
        if allowed {
            self.record(AudioEvent::Bgm {
                source: source.to_string(),
                looped,
            });
        }
        allowed
    }
    fn pause_bgm(&mut self) {
        self.record(AudioEvent::BgmPaused);
    }
    fn resume_bgm(&mut self) -> bool {
        let allowed = self.bgm_allowed();
        if allowed {
            self.record(AudioEvent::BgmResumed);
        }
        allowed
    }
    fn stop_bgm(&mut self) {
        self.record(AudioEvent::BgmStopped);
    }
    fn set_bgm_volume(&mut self, volume: f32) {
        self.record(AudioEvent::BgmVolume(volume));
    }
    fn set_sfx_volume(&mut self, volume: f32) {
        self.record(AudioEvent::SfxVolume(volume));
    }
}

/// Looping background track with replace semantics.
#[derive(Debug, Default)]
pub struct BgmChannel {
    current: Option<String>,
    paused: bool,
    blocked: bool,
}

impl BgmChannel {
    /// Plays `source`. The same source resumes when paused and is left
    /// alone otherwise; a different source replaces the track.
    pub fn play(&mut self, sink: &mut dyn AudioSink, source: &str) {
        if self.current.as_deref() == Some(source) {
            if self.paused {
                self.resume(sink);
            }
            return;
        }
        self.current = Some(source.to_string());
        self.paused = false;
        self.blocked = !sink.play_bgm(source, true);
    }

    pub fn pause(&mut self, sink: &mut dyn AudioSink) {
        if self.current.is_some() && !self.paused {
            sink.pause_bgm();
            self.paused = true;
        }
    }

    pub fn resume(&mut self, sink: &mut dyn AudioSink) {
        if self.current.is_some() && self.paused {
            if sink.resume_bgm() {
                self.paused = false;
            } else {
                self.blocked = true;
            }
        }
    }

    pub fn stop(&mut self, sink: &mut dyn AudioSink) {
        if self.current.is_some() {
            sink.stop_bgm();
        }
        self.current = None;
        self.paused = false;
        self.blocked = false;
    }

    /// Retries playback that a refusing device blocked earlier.
    pub fn user_gesture(&mut self, sink: &mut dyn AudioSink) {
        if !self.blocked {
            return;
        }
        if let Some(source) = self.current.clone() {
            self.blocked = !sink.play_bgm(&source, true);
            if !self.blocked {
                self.paused = false;
            }
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked
    }
}

/// The engine's audio surface: the background channel plus its fixed
/// one-shot cues, bound to one sink.
pub struct AudioDirector {
    sink: Box<dyn AudioSink>,
    pub bgm: BgmChannel,
}

impl std::fmt::Debug for AudioDirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioDirector")
            .field("bgm", &self.bgm)
            .finish_non_exhaustive()
    }
}

impl AudioDirector {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        Self {
            sink,
            bgm: BgmChannel::default(),
        }
    }

    pub fn typing_tick(&mut self) {
        self.sink.play_sfx(TYPING_CUE);
    }

    pub fn stop_typing(&mut self) {
        self.sink.stop_sfx(TYPING_CUE);
    }

    pub fn transition(&mut self) {
        self.sink.play_sfx(TRANSITION_CUE);
    }

    pub fn menu_click(&mut self) {
        self.sink.play_sfx(MENU_CLICK_CUE);
    }

    pub fn play_bgm(&mut self, source: &str) {
        self.bgm.play(self.sink.as_mut(), source);
    }

    pub fn pause_bgm(&mut self) {
        self.bgm.pause(self.sink.as_mut());
    }

    pub fn resume_bgm(&mut self) {
        self.bgm.resume(self.sink.as_mut());
    }

    pub fn stop_bgm(&mut self) {
        self.bgm.stop(self.sink.as_mut());
    }

    pub fn user_gesture(&mut self) {
        self.bgm.user_gesture(self.sink.as_mut());
    }

    pub fn apply_volumes(&mut self, bgm_volume: f32, sfx_volume: f32) {
        self.sink.set_bgm_volume(bgm_volume.clamp(0.0, 1.0));
        self.sink.set_sfx_volume(sfx_volume.clamp(0.0, 1.0));
    }

    pub fn sink_mut(&mut self) -> &mut dyn AudioSink {
        self.sink.as_mut()
    }
}
