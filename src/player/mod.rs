mod backend;
mod backend_dsp;
mod backend_stream;
mod core;
mod engine;
mod handle;
mod metrics;

pub use backend::{
    AudioBackend, BackendFactory, BackendKind, ChapterRange, LoadRequest, ReadinessSender,
    SystemBackendFactory, select_backend,
};
pub use self::core::EngineCore;
pub use engine::PlayerEngine;
pub use handle::EngineHandle;
pub use metrics::PlaybackMetrics;

use crate::domain::{ArtworkHandle, ChannelKind, Track};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

/// Outgoing positions closer to the track start than this are not worth a
/// resume point.
pub(crate) const MIN_SAVE_POSITION_SECS: f64 = 5.0;

/// Snapshot cadence while a channel is playing.
pub(crate) const POSITION_SAVE_INTERVAL: Duration = Duration::from_secs(10);

/// A boundary signal and a poll signal can both observe the same chapter
/// end; advances inside this window after a transition are duplicates.
pub(crate) const CHAPTER_ADVANCE_COOLDOWN: Duration = Duration::from_secs(1);

/// Volume multiplier applied to a ducked channel.
pub(crate) const DUCK_ATTENUATION: f32 = 0.3;

/// Restart-current-track threshold for the previous command.
pub(crate) const PREVIOUS_RESTART_THRESHOLD_SECS: f64 = 3.0;

pub enum PlayerCommand {
    LoadTrack(usize),
    PlayNow(Track),
    Enqueue(Vec<Track>),
    Play,
    Pause,
    TogglePlayback,
    Next,
    Previous,
    Seek(f64),
    SetVolume(f32),
    SetSpeed(f32),
    SetQualityMode(QualityMode),
    SetDucked(bool),
    ShuffleQueue,
    ClearQueue,
    SaveState,
    RestoreState,
}

pub enum PlayerEvent {
    TrackStarted(Arc<Track>),
    ChapterAdvanced(Arc<Track>),
    PlaybackStopped,
    StateChanged,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackState {
    Stopped = 0,
    Loading = 1,
    Playing = 2,
    Paused = 3,
}

impl From<PlaybackState> for u8 {
    fn from(state: PlaybackState) -> u8 {
        state as u8
    }
}

impl TryFrom<u8> for PlaybackState {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(PlaybackState::Stopped),
            1 => Ok(PlaybackState::Loading),
            2 => Ok(PlaybackState::Playing),
            3 => Ok(PlaybackState::Paused),
            _ => Err(()),
        }
    }
}

/// User-selected playback quality. Boost mode trades the streaming
/// backend's native rate handling for the buffered backend's gain boost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityMode {
    #[default]
    Standard,
    Boost,
}

/// Asynchronous results posted back to the engine's control thread.
/// Every completion carries the generation it was scheduled under.
pub(crate) enum Completion {
    Ready { generation: u64 },
    LoadFailed { generation: u64, message: String },
    DurationProbed { generation: u64, duration: Duration },
}

/// Read/command surface one engine exposes to the presenter and the
/// interruption coordinator. Both hold it weakly; the host owns the engine.
pub trait ChannelControl: Send + Sync {
    fn channel(&self) -> ChannelKind;
    fn is_audible(&self) -> bool;
    fn has_track(&self) -> bool;
    fn now_playing(&self) -> Option<Arc<Track>>;
    fn artwork(&self) -> Option<ArtworkHandle>;
    fn elapsed(&self) -> Duration;
    fn duration(&self) -> Duration;
    fn playback_rate(&self) -> f32;
    fn is_ducked(&self) -> bool;
    fn play(&self) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn next(&self) -> Result<()>;
    fn previous(&self) -> Result<()>;
    fn set_ducked(&self, ducked: bool) -> Result<()>;
}
