//! Deduplicated resource cache for the scene engine's media.
//!
//! `ResourceCache` memoizes three things per URL: a success (forever), an
//! in-flight load (so concurrent requests share one fetch), and a failure
//! (so a broken URL is never retried within the session). Fetching sits
//! behind the [`Fetcher`] seam; the shipped [`FileFetcher`] reads from
//! disk on a worker thread so loads never block playback, and
//! [`ManualFetcher`] gives tests and custom hosts full control.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use thiserror::Error;

use scene_novel_engine::{
    SpriteImage, Story, StoryStep, SPEAKER_OVERRIDE_FRAMES, UI_CUES,
};

/// Asset flavor, inferred from the URL suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Audio,
    Video,
}

/// Infers the asset kind from a URL's suffix. Anything unrecognized is
/// treated as an image, matching how scenes reference art.
pub fn asset_kind(url: &str) -> AssetKind {
    let lower = url.to_ascii_lowercase();
    if lower.ends_with(".mp3") || lower.ends_with(".wav") || lower.ends_with(".ogg") {
        AssetKind::Audio
    } else if lower.ends_with(".mp4") || lower.ends_with(".webm") {
        AssetKind::Video
    } else {
        AssetKind::Image
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("io error: {0}")]
    Io(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// One loaded asset.
#[derive(Clone, Debug)]
pub struct Asset {
    pub url: String,
    pub kind: AssetKind,
    pub bytes: Vec<u8>,
    /// Content fingerprint, hex-encoded.
    pub sha256: String,
    /// Pixel dimensions for decoded images.
    pub dimensions: Option<(u32, u32)>,
}

/// Completion of one underlying fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    pub url: String,
    pub result: Result<Vec<u8>, FetchError>,
}

/// Where bytes come from. `begin` must not block; completions surface
/// through `poll`.
pub trait Fetcher {
    fn begin(&mut self, url: &str);
    fn poll(&mut self) -> Vec<FetchOutcome>;
}

/// Disk-backed fetcher running on one worker thread.
pub struct FileFetcher {
    sender: Sender<String>,
    receiver: Receiver<FetchOutcome>,
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let (sender, request_rx) = mpsc::channel::<String>();
        let (result_tx, receiver) = mpsc::channel::<FetchOutcome>();
        let worker_root = root.clone();
        thread::spawn(move || {
            while let Ok(url) = request_rx.recv() {
                let result = std::fs::read(worker_root.join(&url))
                    .map_err(|err| FetchError::Io(err.to_string()));
                if result_tx.send(FetchOutcome { url, result }).is_err() {
                    break;
                }
            }
        });
        Self {
            sender,
            receiver,
            root,
        }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

impl Fetcher for FileFetcher {
    fn begin(&mut self, url: &str) {
        let _ = self.sender.send(url.to_string());
    }

    fn poll(&mut self) -> Vec<FetchOutcome> {
        let mut out = Vec::new();
        while let Ok(outcome) = self.receiver.try_recv() {
            out.push(outcome);
        }
        out
    }
}

/// Host-driven fetcher: requests queue up until the owner completes or
/// fails them. Clones share state, so a handle kept outside the cache
/// can deliver results and count fetches.
#[derive(Clone, Default)]
pub struct ManualFetcher {
    inner: Arc<Mutex<ManualInner>>,
}

#[derive(Default)]
struct ManualInner {
    begun: Vec<String>,
    ready: VecDeque<FetchOutcome>,
}

impl ManualFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `begin` was called for `url`.
    pub fn begin_count(&self, url: &str) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.begun.iter().filter(|u| u.as_str() == url).count())
            .unwrap_or(0)
    }

    pub fn total_begun(&self) -> usize {
        self.inner.lock().map(|inner| inner.begun.len()).unwrap_or(0)
    }

    pub fn complete(&self, url: &str, bytes: Vec<u8>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.ready.push_back(FetchOutcome {
                url: url.to_string(),
                result: Ok(bytes),
            });
        }
    }

    pub fn fail(&self, url: &str, message: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.ready.push_back(FetchOutcome {
                url: url.to_string(),
                result: Err(FetchError::Io(message.to_string())),
            });
        }
    }
}

impl Fetcher for ManualFetcher {
    fn begin(&mut self, url: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.begun.push(url.to_string());
        }
    }

    fn poll(&mut self) -> Vec<FetchOutcome> {
        match self.inner.lock() {
            Ok(mut inner) => inner.ready.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Load status of one URL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    Unrequested,
    Pending,
    Loaded,
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub loaded: usize,
    pub pending: usize,
    pub failed: usize,
    pub total_bytes: usize,
}

pub struct ResourceCache {
    fetcher: Box<dyn Fetcher>,
    loaded: HashMap<String, Asset>,
    pending: HashSet<String>,
    failed: HashMap<String, FetchError>,
}

impl ResourceCache {
    pub fn new(fetcher: Box<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            loaded: HashMap::new(),
            pending: HashSet::new(),
            failed: HashMap::new(),
        }
    }

    /// Requests a URL. Successes, in-flight loads, and recorded failures
    /// are all memoized, so at most one underlying fetch ever starts per
    /// key.
    pub fn request(&mut self, url: &str) -> LoadState {
        if url.is_empty() {
            return LoadState::Failed;
        }
        if self.loaded.contains_key(url) {
            return LoadState::Loaded;
        }
        if self.pending.contains(url) {
            return LoadState::Pending;
        }
        if self.failed.contains_key(url) {
            return LoadState::Failed;
        }
        self.pending.insert(url.to_string());
        self.fetcher.begin(url);
        LoadState::Pending
    }

    /// Requests a batch, deduplicated against everything already known.
    pub fn request_many<I, S>(&mut self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for url in urls {
            self.request(url.as_ref());
        }
    }

    /// Drains fetcher completions into the cache. Image payloads are
    /// decoded for dimensions; a payload that will not decode counts as
    /// a failed load.
    pub fn poll(&mut self) {
        for outcome in self.fetcher.poll() {
            if !self.pending.remove(&outcome.url) {
                // A completion for something we never asked for (or
                // already settled) is dropped.
                continue;
            }
            match outcome.result {
                Ok(bytes) => match finalize_asset(&outcome.url, bytes) {
                    Ok(asset) => {
                        self.loaded.insert(outcome.url, asset);
                    }
                    Err(err) => {
                        tracing::warn!(url = %outcome.url, %err, "asset failed to decode");
                        self.failed.insert(outcome.url, err);
                    }
                },
                Err(err) => {
                    tracing::warn!(url = %outcome.url, %err, "asset failed to load");
                    self.failed.insert(outcome.url, err);
                }
            }
        }
    }

    /// Polls until every requested load settles (success or recorded
    /// failure) or the timeout passes. Returns true when idle. The
    /// aggregate never fails as a whole.
    pub fn wait_settled(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.poll();
            if self.pending.is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    pub fn state(&self, url: &str) -> LoadState {
        if self.loaded.contains_key(url) {
            LoadState::Loaded
        } else if self.pending.contains(url) {
            LoadState::Pending
        } else if self.failed.contains_key(url) {
            LoadState::Failed
        } else {
            LoadState::Unrequested
        }
    }

    pub fn get(&self, url: &str) -> Option<&Asset> {
        self.loaded.get(url)
    }

    pub fn is_loaded(&self, url: &str) -> bool {
        self.loaded.contains_key(url)
    }

    pub fn failure(&self, url: &str) -> Option<&FetchError> {
        self.failed.get(url)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            loaded: self.loaded.len(),
            pending: self.pending.len(),
            failed: self.failed.len(),
            total_bytes: self.loaded.values().map(|asset| asset.bytes.len()).sum(),
        }
    }

    /// Drops loaded assets not on the keep list; failure records stay so
    /// broken URLs are still never retried.
    pub fn retain_loaded<S: AsRef<str>>(&mut self, keep: &[S]) {
        let keep: HashSet<&str> = keep.iter().map(AsRef::as_ref).collect();
        self.loaded.retain(|url, _| keep.contains(url.as_str()));
    }

    pub fn clear(&mut self) {
        self.loaded.clear();
        self.failed.clear();
    }
}

fn finalize_asset(url: &str, bytes: Vec<u8>) -> Result<Asset, FetchError> {
    let kind = asset_kind(url);
    let dimensions = match kind {
        AssetKind::Image => {
            let decoded = image::load_from_memory(&bytes)
                .map_err(|err| FetchError::Decode(err.to_string()))?;
            let rgba = decoded.to_rgba8();
            Some((rgba.width(), rgba.height()))
        }
        _ => None,
    };
    Ok(Asset {
        url: url.to_string(),
        kind,
        sha256: sha256_hex(&bytes),
        bytes,
        dimensions,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Every media reference the story can reach, deduplicated in stable
/// order: backgrounds, music, sprite frame sequences, per-line
/// overrides, and the engine's fixed UI cues. This is the critical
/// preload set.
pub fn preload_manifest(story: &Story) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut manifest = Vec::new();
    let push = |url: String, seen: &mut HashSet<String>, manifest: &mut Vec<String>| {
        if !url.is_empty() && seen.insert(url.clone()) {
            manifest.push(url);
        }
    };

    for scene in story.scenes() {
        if let Some(background) = &scene.background {
            push(background.to_string(), &mut seen, &mut manifest);
        }
        if let Some(bgm) = &scene.bgm {
            push(bgm.to_string(), &mut seen, &mut manifest);
        }
        for sprite in &scene.sprites {
            match &sprite.image {
                SpriteImage::Static(src) => {
                    push(src.to_string(), &mut seen, &mut manifest);
                }
                SpriteImage::Animated { base, frames } => {
                    for frame in 1..=*frames {
                        push(format!("{base}/{frame}.png"), &mut seen, &mut manifest);
                    }
                }
            }
        }
        for step in &scene.steps {
            if let StoryStep::Line {
                sprite_override,
                background_override,
                ..
            } = step
            {
                if let Some(base) = sprite_override {
                    for frame in 1..=SPEAKER_OVERRIDE_FRAMES {
                        push(format!("{base}/{frame}.png"), &mut seen, &mut manifest);
                    }
                }
                if let Some(background) = background_override {
                    push(background.to_string(), &mut seen, &mut manifest);
                }
            }
        }
    }

    for cue in UI_CUES {
        push(cue.to_string(), &mut seen, &mut manifest);
    }

    manifest
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
