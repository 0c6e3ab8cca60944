use crate::domain::{ArtworkHandle, Track};
use crate::player::PlaybackState;

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};

/// Shared playback state published by the engine's control thread and read
/// by the presenter/coordinator. Atomics for the hot fields, a mutex for
/// the track summary.
pub struct PlaybackMetrics {
    state: AtomicU8,
    elapsed_ms: AtomicU64,
    duration_ms: AtomicU64,
    speed_milli: AtomicU32,
    ducked: AtomicBool,
    now_playing: Mutex<Option<Arc<Track>>>,
    artwork: Mutex<Option<ArtworkHandle>>,
}

impl PlaybackMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(PlaybackMetrics {
            state: AtomicU8::new(PlaybackState::Stopped.into()),
            elapsed_ms: AtomicU64::new(0),
            duration_ms: AtomicU64::new(0),
            speed_milli: AtomicU32::new(1000),
            ducked: AtomicBool::new(false),
            now_playing: Mutex::new(None),
            artwork: Mutex::new(None),
        })
    }

    pub fn get_state(&self) -> PlaybackState {
        self.state
            .load(Ordering::Relaxed)
            .try_into()
            .unwrap_or(PlaybackState::Stopped)
    }

    pub fn set_playback_state(&self, state: PlaybackState) {
        self.state.store(state.into(), Ordering::Relaxed);
    }

    pub fn is_playing(&self) -> bool {
        self.get_state() == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.get_state() == PlaybackState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.get_state() == PlaybackState::Stopped
    }

    pub fn get_elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms.load(Ordering::Relaxed))
    }

    pub fn set_elapsed(&self, d: Duration) {
        self.elapsed_ms
            .store(d.as_millis() as u64, Ordering::Relaxed)
    }

    pub fn get_duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms.load(Ordering::Relaxed))
    }

    pub fn set_duration(&self, d: Duration) {
        self.duration_ms
            .store(d.as_millis() as u64, Ordering::Relaxed)
    }

    pub fn get_speed(&self) -> f32 {
        self.speed_milli.load(Ordering::Relaxed) as f32 / 1000.0
    }

    pub fn set_speed(&self, speed: f32) {
        self.speed_milli
            .store((speed * 1000.0) as u32, Ordering::Relaxed);
    }

    pub fn is_ducked(&self) -> bool {
        self.ducked.load(Ordering::Relaxed)
    }

    pub fn set_ducked(&self, ducked: bool) {
        self.ducked.store(ducked, Ordering::Relaxed);
    }

    pub fn get_now_playing(&self) -> Option<Arc<Track>> {
        self.now_playing.lock().ok().and_then(|t| t.clone())
    }

    pub fn set_now_playing(&self, track: Option<Arc<Track>>) {
        if let Ok(mut slot) = self.now_playing.lock() {
            *slot = track;
        }
    }

    pub fn get_artwork(&self) -> Option<ArtworkHandle> {
        self.artwork.lock().ok().and_then(|a| a.clone())
    }

    pub fn set_artwork(&self, artwork: Option<ArtworkHandle>) {
        if let Ok(mut slot) = self.artwork.lock() {
            *slot = artwork;
        }
    }

    pub fn reset(&self) {
        self.set_playback_state(PlaybackState::Stopped);
        self.set_elapsed(Duration::ZERO);
        self.set_duration(Duration::ZERO);
        self.set_now_playing(None);
        self.set_artwork(None);
    }
}
