use super::backend::{BackendFactory, ChapterRange, LoadRequest, ReadinessSender, select_backend};
use super::{
    CHAPTER_ADVANCE_COOLDOWN, Completion, DUCK_ATTENUATION, MIN_SAVE_POSITION_SECS,
    POSITION_SAVE_INTERVAL, PREVIOUS_RESTART_THRESHOLD_SECS, PlaybackState, PlayerCommand,
    PlayerEvent, QualityMode,
};
use crate::config::PlaybackConfig;
use crate::domain::{ArtworkResolver, ChannelKind, PlayQueue, Track};
use crate::player::{AudioBackend, PlaybackMetrics};
use crate::sanitize_seconds;
use crate::session::{PlaybackSnapshot, SessionStore, now_unix};
use crossbeam_channel::{Receiver, Sender, unbounded};
use lofty::file::AudioFile;
use log::{debug, warn};
use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

/// One channel's playback state machine. All mutation happens on the
/// control thread that owns this struct; asynchronous work posts back
/// through the completion channel, tagged with the generation that
/// scheduled it.
pub struct PlayerEngine {
    channel: ChannelKind,
    factory: Box<dyn BackendFactory>,
    backend: Option<Box<dyn AudioBackend>>,
    queue: PlayQueue,
    metrics: Arc<PlaybackMetrics>,
    events: Sender<PlayerEvent>,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    store: Option<SessionStore>,
    artwork_resolver: Option<Box<dyn ArtworkResolver>>,

    state: PlaybackState,
    /// Bumped before scheduling any load; completions carrying an older
    /// value are inert no matter when they fire.
    generation: u64,
    /// True only while a persisted snapshot is being re-applied.
    restoring: bool,
    pending_restore_position: Option<f64>,
    /// Explicit reload-at-position target (quality switches, seeks issued
    /// mid-load). Distinct from the restore gate.
    pending_seek: Option<f64>,
    /// Play once the in-flight load signals ready.
    pending_play: bool,
    chapter_end_in_progress: bool,
    last_transition: Instant,
    advance_cooldown: Duration,
    last_periodic_save: Instant,
    probed_duration: Option<Duration>,

    quality: QualityMode,
    volume: f32,
    speed: f32,
    boost_gain: f32,
    ducked: bool,
    artwork_locator: Option<String>,
}

impl PlayerEngine {
    pub fn new(
        channel: ChannelKind,
        factory: Box<dyn BackendFactory>,
        store: Option<SessionStore>,
        artwork_resolver: Option<Box<dyn ArtworkResolver>>,
        settings: &PlaybackConfig,
        events: Sender<PlayerEvent>,
        metrics: Arc<PlaybackMetrics>,
    ) -> Self {
        let (completion_tx, completion_rx) = unbounded();

        PlayerEngine {
            channel,
            factory,
            backend: None,
            queue: PlayQueue::new(),
            metrics,
            events,
            completion_tx,
            completion_rx,
            store,
            artwork_resolver,

            state: PlaybackState::Stopped,
            generation: 0,
            restoring: false,
            pending_restore_position: None,
            pending_seek: None,
            pending_play: false,
            chapter_end_in_progress: false,
            last_transition: Instant::now(),
            advance_cooldown: CHAPTER_ADVANCE_COOLDOWN,
            last_periodic_save: Instant::now(),
            probed_duration: None,

            quality: settings.quality_mode,
            volume: settings.volume,
            speed: settings.speed,
            boost_gain: settings.boost_gain,
            ducked: false,
            artwork_locator: None,
        }
    }

    pub fn channel(&self) -> ChannelKind {
        self.channel
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn queue(&self) -> &PlayQueue {
        &self.queue
    }

    pub fn handle_command(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::LoadTrack(index) => self.load_track(index),
            PlayerCommand::PlayNow(track) => self.play_now(track),
            PlayerCommand::Enqueue(tracks) => self.enqueue(tracks),
            PlayerCommand::Play => self.play_request(),
            PlayerCommand::Pause => self.pause_playback(),
            PlayerCommand::TogglePlayback => self.toggle_playback(),
            PlayerCommand::Next => self.next(),
            PlayerCommand::Previous => self.previous(),
            PlayerCommand::Seek(seconds) => self.seek(seconds),
            PlayerCommand::SetVolume(volume) => self.set_volume(volume),
            PlayerCommand::SetSpeed(speed) => self.set_speed(speed),
            PlayerCommand::SetQualityMode(mode) => self.set_quality_mode(mode),
            PlayerCommand::SetDucked(ducked) => self.set_ducked(ducked),
            PlayerCommand::ShuffleQueue => self.shuffle_queue(),
            PlayerCommand::ClearQueue => self.clear_queue(),
            PlayerCommand::SaveState => self.save_snapshot(),
            PlayerCommand::RestoreState => self.restore_state(),
        }
    }

    /// One control-loop tick: asynchronous completions first, then the
    /// boundary observers, then bookkeeping.
    pub fn poll(&mut self) {
        self.drain_completions();
        self.detect_chapter_end();
        self.detect_track_end();
        self.periodic_save();
        self.publish_metrics();
    }

    // =================
    //    LOAD / SEEK
    // =================

    fn load_track(&mut self, index: usize) {
        self.save_outgoing_position();

        if let Some(backend) = self.backend.as_mut() {
            backend.stop();
        }

        self.generation = self.generation.wrapping_add(1);
        self.chapter_end_in_progress = false;
        self.pending_play = false;
        self.pending_seek = None;
        self.restoring = false;
        self.pending_restore_position = None;
        self.probed_duration = None;

        if !self.queue.select(index) {
            debug!("{}: load index {index} out of range", self.channel);
            return;
        }
        let Some(track) = self.queue.get(index).cloned() else {
            return;
        };

        let kind = select_backend(&track.locator, self.quality);
        let reuse = self
            .backend
            .as_ref()
            .map(|b| b.kind() == kind)
            .unwrap_or(false);
        if !reuse {
            match self.factory.create(kind) {
                Ok(backend) => self.backend = Some(backend),
                Err(e) => {
                    warn!("{}: backend unavailable: {e}", self.channel);
                    self.backend = None;
                    self.set_state(PlaybackState::Stopped);
                    self.emit(PlayerEvent::Error(e.to_string()));
                    return;
                }
            }
        }

        let start_at = track.chapter_start_duration().unwrap_or(Duration::ZERO);
        let range = track.chapter_start_duration().map(|start| ChapterRange {
            start,
            end: track.chapter_end_duration(),
        });
        let request = LoadRequest {
            locator: track.locator.clone(),
            start_at,
            range,
        };
        let readiness = ReadinessSender::new(self.generation, self.completion_tx.clone());

        let volume = self.effective_volume();
        let speed = self.speed;
        let boost = self.boost_gain_value();
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        backend.set_volume(volume);
        backend.set_speed(speed);
        if backend.supports_boost() {
            backend.set_boost(boost);
        }

        if let Err(e) = backend.load(request, readiness) {
            warn!("{}: load failed: {e}", self.channel);
            self.set_state(PlaybackState::Stopped);
            self.emit(PlayerEvent::Error(e.to_string()));
            return;
        }

        self.last_transition = Instant::now();
        self.spawn_duration_probe(&track);
        self.set_state(PlaybackState::Loading);
        self.update_now_playing(track);
    }

    /// Readiness pipeline shared by every backend path. The saved-position
    /// gate lives here and only here: applying a saved position outside of
    /// restoration would seek a freshly picked chapter to its own saved
    /// end and cascade auto-advances through the chapters that follow.
    fn on_backend_ready(&mut self, generation: u64) {
        if generation != self.generation {
            debug!("{}: dropping stale readiness completion", self.channel);
            return;
        }
        let Some(track) = self.queue.current().cloned() else {
            return;
        };
        let is_chapter = track.has_chapter_bounds();
        let is_remote = track.is_remote();

        if let Some(start) = track.chapter_start_duration() {
            if let Some(backend) = self.backend.as_mut() {
                if let Err(e) = backend.seek(start) {
                    warn!("{}: chapter seek failed: {e}", self.channel);
                }
            }
        }

        let mut target = self.pending_seek.take();
        if self.restoring {
            if let Some(saved) = self.pending_restore_position.take() {
                target = Some(self.clamp_to_bounds(&track, sanitize_seconds(saved)));
            }
        }
        if let Some(position) = target {
            if let Some(backend) = self.backend.as_mut() {
                if let Err(e) = backend.seek(Duration::from_secs_f64(position)) {
                    warn!("{}: position restore failed: {e}", self.channel);
                }
            }
        }

        let should_auto_play = !self.restoring && (is_remote || is_chapter);
        // Cleared inside the readiness callback, never on a timer;
        // buffering latency is unbounded.
        self.restoring = false;
        self.pending_restore_position = None;

        if should_auto_play || self.pending_play {
            self.pending_play = false;
            self.start_playback();
        } else {
            self.pending_play = false;
            self.set_state(PlaybackState::Paused);
        }
        self.publish_metrics();
        self.emit(PlayerEvent::TrackStarted(track));
    }

    fn on_load_failed(&mut self, generation: u64, message: String) {
        if generation != self.generation {
            debug!("{}: dropping stale load failure", self.channel);
            return;
        }
        warn!("{}: load failed: {message}", self.channel);
        self.restoring = false;
        self.pending_restore_position = None;
        self.pending_seek = None;
        self.pending_play = false;
        self.set_state(PlaybackState::Stopped);
        self.emit(PlayerEvent::Error(message));
    }

    /// Seek within the current track. Chapter tracks take chapter-relative
    /// time; everything is clamped to the playable bounds, never rejected.
    fn seek(&mut self, seconds: f64) {
        let Some(track) = self.queue.current().cloned() else {
            return;
        };
        let relative = sanitize_seconds(seconds);
        let absolute = match track.chapter_start {
            Some(start) => start + relative,
            None => relative,
        };
        let clamped = self.clamp_to_bounds(&track, absolute);

        if self.state == PlaybackState::Loading {
            // The in-flight load stays the active operation; the seek
            // amends where it lands.
            self.pending_seek = Some(clamped);
            return;
        }

        self.generation = self.generation.wrapping_add(1);
        self.chapter_end_in_progress = false;

        let was_playing = self.state == PlaybackState::Playing;
        if let Some(backend) = self.backend.as_mut() {
            if let Err(e) = backend.seek(Duration::from_secs_f64(clamped)) {
                warn!("{}: seek failed: {e}", self.channel);
                return;
            }
        }
        if was_playing {
            self.start_playback();
        }
        self.publish_metrics();
        self.emit(PlayerEvent::StateChanged);
    }

    // ===================
    //    TRANSPORT OPS
    // ===================

    fn play_request(&mut self) {
        match self.state {
            PlaybackState::Playing => {}
            PlaybackState::Loading => self.pending_play = true,
            PlaybackState::Paused => self.start_playback(),
            PlaybackState::Stopped => {
                if let Some(index) = self.queue.current_index() {
                    self.load_track(index);
                    self.pending_play = true;
                }
            }
        }
    }

    fn start_playback(&mut self) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        match backend.play() {
            Ok(()) => self.set_state(PlaybackState::Playing),
            Err(e) => {
                // Play request becomes a no-op rather than a crash
                warn!("{}: backend failed to start: {e}", self.channel);
                self.set_state(PlaybackState::Paused);
            }
        }
    }

    fn pause_playback(&mut self) {
        self.pending_play = false;
        if let Some(backend) = self.backend.as_mut() {
            backend.pause();
        }
        if self.state == PlaybackState::Playing {
            self.set_state(PlaybackState::Paused);
            self.save_snapshot();
        }
    }

    fn toggle_playback(&mut self) {
        match self.state {
            PlaybackState::Playing => self.pause_playback(),
            _ => self.play_request(),
        }
    }

    fn next(&mut self) {
        let was_playing = self.state == PlaybackState::Playing || self.pending_play;
        if self.queue.has_next() {
            let index = self.queue.current_index().map(|i| i + 1).unwrap_or(0);
            self.load_track(index);
            self.pending_play = was_playing;
        } else {
            self.pause_playback();
        }
    }

    fn previous(&mut self) {
        let was_playing = self.state == PlaybackState::Playing || self.pending_play;
        if self.position_rel_secs() > PREVIOUS_RESTART_THRESHOLD_SECS || !self.queue.has_previous()
        {
            self.seek(0.0);
        } else {
            let index = self.queue.current_index().unwrap_or(0).saturating_sub(1);
            self.load_track(index);
            self.pending_play = was_playing;
        }
    }

    // ================
    //    QUEUE OPS
    // ================

    fn play_now(&mut self, track: Track) {
        self.queue.play_now(Arc::new(track));
        self.load_track(0);
        self.pending_play = true;
    }

    fn enqueue(&mut self, tracks: Vec<Track>) {
        let was_empty = self.queue.is_empty();
        for track in tracks {
            self.queue.append(Arc::new(track));
        }
        if was_empty && self.state == PlaybackState::Stopped {
            if let Some(index) = self.queue.current_index() {
                self.load_track(index);
            }
        }
        self.emit(PlayerEvent::StateChanged);
    }

    fn shuffle_queue(&mut self) {
        self.queue.shuffle();
        self.emit(PlayerEvent::StateChanged);
    }

    fn clear_queue(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.stop();
        }
        self.generation = self.generation.wrapping_add(1);
        self.queue.clear();
        self.pending_play = false;
        self.pending_seek = None;
        self.restoring = false;
        self.pending_restore_position = None;
        self.chapter_end_in_progress = false;
        self.artwork_locator = None;
        self.set_state(PlaybackState::Stopped);
        self.metrics.reset();
        self.emit(PlayerEvent::PlaybackStopped);
    }

    // ===============
    //    SETTINGS
    // ===============

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.apply_volume();
    }

    fn set_speed(&mut self, speed: f32) {
        self.speed = speed.clamp(0.5, 3.0);
        if let Some(backend) = self.backend.as_mut() {
            backend.set_speed(self.speed);
        }
        self.metrics.set_speed(self.speed);
        self.emit(PlayerEvent::StateChanged);
    }

    fn set_ducked(&mut self, ducked: bool) {
        self.ducked = ducked;
        self.metrics.set_ducked(ducked);
        self.apply_volume();
    }

    fn apply_volume(&mut self) {
        let volume = self.effective_volume();
        if let Some(backend) = self.backend.as_mut() {
            backend.set_volume(volume);
        }
    }

    fn effective_volume(&self) -> f32 {
        if self.ducked {
            self.volume * DUCK_ATTENUATION
        } else {
            self.volume
        }
    }

    fn boost_enabled(&self) -> bool {
        self.quality == QualityMode::Boost
    }

    fn boost_gain_value(&self) -> f32 {
        if self.boost_enabled() { self.boost_gain } else { 1.0 }
    }

    /// Switching quality while playing reloads the current track at the
    /// current position and resumes if it was playing.
    fn set_quality_mode(&mut self, mode: QualityMode) {
        if mode == self.quality {
            return;
        }
        self.quality = mode;

        let Some(index) = self.queue.current_index() else {
            return;
        };
        if self.state == PlaybackState::Stopped {
            return;
        }
        let resume = self.position_abs_secs();
        let was_playing = self.state == PlaybackState::Playing || self.pending_play;
        self.load_track(index);
        self.pending_seek = Some(resume);
        self.pending_play = was_playing;
    }

    // ====================
    //    END DETECTION
    // ====================

    /// Chapter ends have two independent, non-exclusive observers: the
    /// backend's scheduled-segment completion and the position poll.
    /// Either may also fire because of a user stop/seek, so confirmation
    /// goes through the re-entrancy guard and the transition cooldown.
    fn detect_chapter_end(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let Some(track) = self.queue.current().cloned() else {
            return;
        };
        let Some(end) = track.chapter_end else {
            return;
        };

        let boundary = self
            .backend
            .as_ref()
            .map(|b| b.segment_ended())
            .unwrap_or(false);
        let polled = self.position_abs_secs() >= end;

        if boundary || polled {
            self.try_advance_chapter();
        }
    }

    fn try_advance_chapter(&mut self) {
        if self.chapter_end_in_progress {
            return;
        }
        if self.last_transition.elapsed() < self.advance_cooldown {
            return;
        }
        self.chapter_end_in_progress = true;

        if self.queue.has_next() {
            let index = self.queue.current_index().map(|i| i + 1).unwrap_or(0);
            self.load_track(index);
            self.pending_play = true;
            if let Some(next) = self.queue.current().cloned() {
                self.emit(PlayerEvent::ChapterAdvanced(next));
            }
        } else {
            self.pause_playback();
            self.chapter_end_in_progress = false;
        }
    }

    fn detect_track_end(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let Some(track) = self.queue.current().cloned() else {
            return;
        };
        if track.chapter_end.is_some() {
            return;
        }
        let ended = self
            .backend
            .as_ref()
            .map(|b| b.segment_ended())
            .unwrap_or(false);
        if !ended {
            return;
        }

        if self.queue.has_next() {
            let index = self.queue.current_index().map(|i| i + 1).unwrap_or(0);
            self.load_track(index);
            self.pending_play = true;
        } else {
            self.set_state(PlaybackState::Paused);
            self.emit(PlayerEvent::PlaybackStopped);
        }
    }

    // ==================
    //    PERSISTENCE
    // ==================

    fn save_outgoing_position(&mut self) {
        if self.store.is_none() || self.queue.current().is_none() {
            return;
        }
        // Positions near the track start are not worth a resume point
        if self.position_rel_secs() > MIN_SAVE_POSITION_SECS {
            self.save_snapshot();
        }
    }

    fn periodic_save(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        if self.last_periodic_save.elapsed() >= POSITION_SAVE_INTERVAL {
            self.save_snapshot();
            self.last_periodic_save = Instant::now();
        }
    }

    fn save_snapshot(&mut self) {
        if self.store.is_none() || self.queue.current().is_none() {
            return;
        }
        let snapshot = PlaybackSnapshot {
            current_track: self.queue.current().map(|t| (**t).clone()),
            queue: self.queue.tracks().iter().map(|t| (**t).clone()).collect(),
            current_index: self.queue.current_index(),
            position_seconds: self.position_abs_secs(),
            volume: self.volume,
            speed: self.speed,
            boost_enabled: self.boost_enabled(),
            artwork_locator: self.artwork_locator.clone(),
            saved_at: now_unix(),
        };
        let channel = self.channel;
        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.save_snapshot(channel, &snapshot) {
                warn!("{channel}: failed to save snapshot: {e}");
            }
        }
    }

    fn restore_state(&mut self) {
        let channel = self.channel;
        let snapshot = {
            let Some(store) = self.store.as_mut() else {
                return;
            };
            match store.load_snapshot(channel) {
                Ok(Some(snapshot)) => {
                    if snapshot.is_stale() {
                        debug!(
                            "{channel}: discarding snapshot saved {}s ago",
                            snapshot.age_secs()
                        );
                        let _ = store.clear_snapshot(channel);
                        return;
                    }
                    snapshot
                }
                Ok(None) => return,
                Err(e) => {
                    warn!("{channel}: failed to load snapshot: {e}");
                    return;
                }
            }
        };

        self.volume = snapshot.volume.clamp(0.0, 1.0);
        self.speed = snapshot.speed.clamp(0.5, 3.0);
        self.quality = if snapshot.boost_enabled {
            QualityMode::Boost
        } else {
            QualityMode::Standard
        };
        self.metrics.set_speed(self.speed);

        let tracks = snapshot.queue.into_iter().map(Arc::new).collect();
        self.queue.replace(tracks, snapshot.current_index);

        if let Some(index) = self.queue.current_index() {
            self.load_track(index);
            // Set after load_track, which clears restore intent on entry;
            // the readiness callback consumes these exactly once.
            self.restoring = true;
            self.pending_restore_position = Some(snapshot.position_seconds);
        }
    }

    // ================
    //    INTERNALS
    // ================

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completion_rx.try_recv() {
            match completion {
                Completion::Ready { generation } => self.on_backend_ready(generation),
                Completion::LoadFailed {
                    generation,
                    message,
                } => self.on_load_failed(generation, message),
                Completion::DurationProbed {
                    generation,
                    duration,
                } => {
                    if generation == self.generation {
                        self.probed_duration = Some(duration);
                    }
                }
            }
        }
    }

    fn position_abs_secs(&self) -> f64 {
        let raw = self
            .backend
            .as_ref()
            .map(|b| b.position().as_secs_f64())
            .unwrap_or(0.0);
        sanitize_seconds(raw)
    }

    fn position_rel_secs(&self) -> f64 {
        let start = self
            .queue
            .current()
            .and_then(|t| t.chapter_start)
            .unwrap_or(0.0);
        (self.position_abs_secs() - start).max(0.0)
    }

    fn file_duration_secs(&self) -> Option<f64> {
        self.backend
            .as_ref()
            .and_then(|b| b.duration())
            .or(self.probed_duration)
            .map(|d| sanitize_seconds(d.as_secs_f64()))
    }

    fn clamp_to_bounds(&self, track: &Track, seconds: f64) -> f64 {
        let lower = track.chapter_start.map(sanitize_seconds).unwrap_or(0.0);
        let upper = track
            .chapter_end
            .map(sanitize_seconds)
            .or_else(|| self.file_duration_secs())
            .unwrap_or(f64::MAX);
        seconds.clamp(lower, upper.max(lower))
    }

    fn display_duration(&self) -> Duration {
        let Some(track) = self.queue.current() else {
            return Duration::ZERO;
        };
        if let (Some(start), Some(end)) = (track.chapter_start, track.chapter_end) {
            return Duration::from_secs_f64(sanitize_seconds((end - start).max(0.0)));
        }
        self.file_duration_secs()
            .map(Duration::from_secs_f64)
            .unwrap_or(Duration::ZERO)
    }

    fn publish_metrics(&self) {
        if self.queue.current().is_none() {
            return;
        }
        self.metrics
            .set_elapsed(Duration::from_secs_f64(self.position_rel_secs()));
        self.metrics.set_duration(self.display_duration());
    }

    fn update_now_playing(&mut self, track: Arc<Track>) {
        self.metrics.set_now_playing(Some(Arc::clone(&track)));

        // Re-resolve only when the artwork locator actually changes
        if track.artwork_locator != self.artwork_locator {
            self.artwork_locator = track.artwork_locator.clone();
            let artwork = match (&self.artwork_locator, &self.artwork_resolver) {
                (Some(locator), Some(resolver)) => resolver.resolve(locator),
                _ => None,
            };
            self.metrics.set_artwork(artwork);
        }
    }

    fn spawn_duration_probe(&self, track: &Track) {
        let Ok(path) = super::backend_stream::resolve_local_path(&track.locator) else {
            return;
        };
        let tx = self.completion_tx.clone();
        let generation = self.generation;
        thread::spawn(move || {
            if let Ok(tagged) = lofty::read_from_path(&path) {
                let _ = tx.send(Completion::DurationProbed {
                    generation,
                    duration: tagged.properties().duration(),
                });
            }
        });
    }

    fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            self.state = state;
            self.metrics.set_playback_state(state);
            self.emit(PlayerEvent::StateChanged);
        }
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    #[cfg(test)]
    pub(crate) fn set_advance_cooldown(&mut self, cooldown: Duration) {
        self.advance_cooldown = cooldown;
    }

    #[cfg(test)]
    pub(crate) fn backdate_last_transition(&mut self, by: Duration) {
        self.last_transition = Instant::now() - by;
    }

    #[cfg(test)]
    pub(crate) fn store_mut(&mut self) -> Option<&mut SessionStore> {
        self.store.as_mut()
    }
}
