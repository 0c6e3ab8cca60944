use super::{
    BackendFactory, ChannelControl, EngineCore, PlaybackMetrics, PlaybackState, PlayerCommand,
    PlayerEvent, QualityMode, SystemBackendFactory,
};
use crate::config::PlaybackConfig;
use crate::domain::{ArtworkHandle, ArtworkResolver, ChannelKind, Track};
use crate::session::SessionStore;
use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::{
    sync::Arc,
    thread::JoinHandle,
    time::Duration,
};

/// Thread-safe face of one channel engine: commands go in over a channel,
/// state comes back out of the shared metrics, events drain on demand.
pub struct EngineHandle {
    channel: ChannelKind,
    commands: Sender<PlayerCommand>,
    events: Receiver<PlayerEvent>,
    metrics: Arc<PlaybackMetrics>,
    _thread_handle: JoinHandle<()>,
}

impl EngineHandle {
    pub fn spawn(
        channel: ChannelKind,
        settings: &PlaybackConfig,
        store: Option<SessionStore>,
        artwork_resolver: Option<Box<dyn ArtworkResolver>>,
    ) -> Self {
        Self::spawn_with_factory(
            channel,
            settings,
            store,
            artwork_resolver,
            Box::new(SystemBackendFactory),
        )
    }

    pub fn spawn_with_factory(
        channel: ChannelKind,
        settings: &PlaybackConfig,
        store: Option<SessionStore>,
        artwork_resolver: Option<Box<dyn ArtworkResolver>>,
        factory: Box<dyn BackendFactory>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = unbounded();
        let (evt_tx, evt_rx) = unbounded();
        let metrics = PlaybackMetrics::new();

        let thread_handle = EngineCore::spawn(
            channel,
            factory,
            store,
            artwork_resolver,
            settings.clone(),
            evt_tx,
            Arc::clone(&metrics),
            cmd_rx,
        );

        EngineHandle {
            channel,
            commands: cmd_tx,
            events: evt_rx,
            metrics,
            _thread_handle: thread_handle,
        }
    }

    pub fn metrics(&self) -> Arc<PlaybackMetrics> {
        Arc::clone(&self.metrics)
    }
}

// =====================
//    COMMAND HANDLER
// =====================
impl EngineHandle {
    pub fn load_track(&self, index: usize) -> Result<()> {
        self.commands.send(PlayerCommand::LoadTrack(index))?;
        Ok(())
    }

    pub fn play_now(&self, track: Track) -> Result<()> {
        self.commands.send(PlayerCommand::PlayNow(track))?;
        Ok(())
    }

    pub fn enqueue(&self, tracks: Vec<Track>) -> Result<()> {
        self.commands.send(PlayerCommand::Enqueue(tracks))?;
        Ok(())
    }

    pub fn toggle_playback(&self) -> Result<()> {
        self.commands.send(PlayerCommand::TogglePlayback)?;
        Ok(())
    }

    pub fn seek(&self, seconds: f64) -> Result<()> {
        self.commands.send(PlayerCommand::Seek(seconds))?;
        Ok(())
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.commands.send(PlayerCommand::SetVolume(volume))?;
        Ok(())
    }

    pub fn set_speed(&self, speed: f32) -> Result<()> {
        self.commands.send(PlayerCommand::SetSpeed(speed))?;
        Ok(())
    }

    pub fn set_quality_mode(&self, mode: QualityMode) -> Result<()> {
        self.commands.send(PlayerCommand::SetQualityMode(mode))?;
        Ok(())
    }

    pub fn shuffle_queue(&self) -> Result<()> {
        self.commands.send(PlayerCommand::ShuffleQueue)?;
        Ok(())
    }

    pub fn clear_queue(&self) -> Result<()> {
        self.commands.send(PlayerCommand::ClearQueue)?;
        Ok(())
    }

    pub fn save_state(&self) -> Result<()> {
        self.commands.send(PlayerCommand::SaveState)?;
        Ok(())
    }

    pub fn restore_state(&self) -> Result<()> {
        self.commands.send(PlayerCommand::RestoreState)?;
        Ok(())
    }
}

// ===============
//    ACCESSORS
// ===============
impl EngineHandle {
    pub fn get_playback_state(&self) -> PlaybackState {
        self.metrics.get_state()
    }

    pub fn is_playing(&self) -> bool {
        self.metrics.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.metrics.is_paused()
    }

    pub fn poll_events(&self) -> Vec<PlayerEvent> {
        self.events.try_iter().collect()
    }
}

impl ChannelControl for EngineHandle {
    fn channel(&self) -> ChannelKind {
        self.channel
    }

    fn is_audible(&self) -> bool {
        self.metrics.is_playing()
    }

    fn has_track(&self) -> bool {
        self.metrics.get_now_playing().is_some()
    }

    fn now_playing(&self) -> Option<Arc<Track>> {
        self.metrics.get_now_playing()
    }

    fn artwork(&self) -> Option<ArtworkHandle> {
        self.metrics.get_artwork()
    }

    fn elapsed(&self) -> Duration {
        self.metrics.get_elapsed()
    }

    fn duration(&self) -> Duration {
        self.metrics.get_duration()
    }

    fn playback_rate(&self) -> f32 {
        if self.metrics.is_playing() {
            self.metrics.get_speed()
        } else {
            0.0
        }
    }

    fn is_ducked(&self) -> bool {
        self.metrics.is_ducked()
    }

    fn play(&self) -> Result<()> {
        self.commands.send(PlayerCommand::Play)?;
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.commands.send(PlayerCommand::Pause)?;
        Ok(())
    }

    fn next(&self) -> Result<()> {
        self.commands.send(PlayerCommand::Next)?;
        Ok(())
    }

    fn previous(&self) -> Result<()> {
        self.commands.send(PlayerCommand::Previous)?;
        Ok(())
    }

    fn set_ducked(&self, ducked: bool) -> Result<()> {
        self.commands.send(PlayerCommand::SetDucked(ducked))?;
        Ok(())
    }
}
