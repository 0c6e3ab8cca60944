//! Reacts to system-level audio takeovers (calls, voice-assistant
//! announcements, accessory disconnects) by pausing both channels and later
//! restoring exactly what was interrupted.

use crate::player::ChannelControl;
use log::{debug, warn};
use std::sync::Weak;
use std::time::{Duration, Instant};

/// Lets the system's own audio vacate the output before either channel
/// resumes.
pub const RESUME_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteChangeReason {
    /// The previous output device disappeared (headphones unplugged).
    OldDeviceUnavailable,
    Other,
}

/// Host platform signals, consumed through one entry point regardless of
/// origin. Voice-assistant announcements arrive as secondary-audio hints
/// and do not come from this app's own audio context; a subscription
/// scoped to our context would silently miss them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemAudioSignal {
    InterruptionBegan,
    InterruptionEnded,
    SecondaryAudioBegan,
    SecondaryAudioEnded,
    RouteChanged(RouteChangeReason),
}

pub struct InterruptionCoordinator {
    music: Weak<dyn ChannelControl>,
    speech: Weak<dyn ChannelControl>,
    in_interruption: bool,
    resume_music: bool,
    resume_speech: bool,
    music_was_ducked: bool,
    pending_resume_at: Option<Instant>,
    grace: Duration,
}

impl InterruptionCoordinator {
    pub fn new(music: Weak<dyn ChannelControl>, speech: Weak<dyn ChannelControl>) -> Self {
        Self::with_grace(music, speech, RESUME_GRACE)
    }

    pub fn with_grace(
        music: Weak<dyn ChannelControl>,
        speech: Weak<dyn ChannelControl>,
        grace: Duration,
    ) -> Self {
        InterruptionCoordinator {
            music,
            speech,
            in_interruption: false,
            resume_music: false,
            resume_speech: false,
            music_was_ducked: false,
            pending_resume_at: None,
            grace,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.in_interruption
    }

    pub fn handle_signal(&mut self, signal: SystemAudioSignal) {
        match signal {
            SystemAudioSignal::InterruptionBegan | SystemAudioSignal::SecondaryAudioBegan => {
                self.begin_interruption()
            }
            SystemAudioSignal::InterruptionEnded | SystemAudioSignal::SecondaryAudioEnded => {
                self.end_interruption()
            }
            SystemAudioSignal::RouteChanged(RouteChangeReason::OldDeviceUnavailable) => {
                // Headphones pulled: pause regardless of interruption state
                debug!("output device went away, pausing both channels");
                self.pause_both();
            }
            SystemAudioSignal::RouteChanged(RouteChangeReason::Other) => {}
        }
    }

    /// Host tick; applies a due deferred resume.
    pub fn poll(&mut self) {
        let Some(due) = self.pending_resume_at else {
            return;
        };
        if Instant::now() < due {
            return;
        }
        self.pending_resume_at = None;

        if self.resume_music {
            if let Some(music) = self.music.upgrade() {
                if let Err(e) = music.play() {
                    warn!("music resume after interruption failed: {e}");
                }
            }
        }
        if self.resume_speech {
            if let Some(speech) = self.speech.upgrade() {
                if let Err(e) = speech.play() {
                    warn!("speech resume after interruption failed: {e}");
                }
            }
        }
        self.resume_music = false;
        self.resume_speech = false;
    }

    fn begin_interruption(&mut self) {
        // A begin while a resume is still pending is the same takeover
        // continuing; keep the original snapshot either way.
        let resume_pending = self.pending_resume_at.take().is_some();
        if !self.in_interruption && !resume_pending {
            self.resume_music = self
                .music
                .upgrade()
                .is_some_and(|c| c.is_audible());
            self.resume_speech = self
                .speech
                .upgrade()
                .is_some_and(|c| c.is_audible());
            self.music_was_ducked = self
                .music
                .upgrade()
                .is_some_and(|c| c.is_ducked());
            debug!(
                "interruption began (music: {}, speech: {})",
                self.resume_music, self.resume_speech
            );
        }
        self.in_interruption = true;
        self.pause_both();
    }

    fn end_interruption(&mut self) {
        if !self.in_interruption {
            return;
        }
        self.in_interruption = false;

        // Ducking first, so resumed audio comes back at the right level
        if let Some(music) = self.music.upgrade() {
            let _ = music.set_ducked(self.music_was_ducked);
        }
        self.pending_resume_at = Some(Instant::now() + self.grace);
    }

    fn pause_both(&self) {
        if let Some(music) = self.music.upgrade() {
            let _ = music.pause();
        }
        if let Some(speech) = self.speech.upgrade() {
            let _ = speech.pause();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtworkHandle, ChannelKind, Track};
    use anyhow::Result;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeState {
        audible: bool,
        ducked: bool,
        calls: Vec<String>,
    }

    struct FakeChannel {
        kind: ChannelKind,
        state: Mutex<FakeState>,
    }

    impl FakeChannel {
        fn new(kind: ChannelKind) -> Arc<Self> {
            Arc::new(FakeChannel {
                kind,
                state: Mutex::new(FakeState::default()),
            })
        }

        fn set_audible(&self, audible: bool) {
            self.state.lock().unwrap().audible = audible;
        }

        fn set_ducked_state(&self, ducked: bool) {
            self.state.lock().unwrap().ducked = ducked;
        }

        fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }
    }

    impl ChannelControl for FakeChannel {
        fn channel(&self) -> ChannelKind {
            self.kind
        }

        fn is_audible(&self) -> bool {
            self.state.lock().unwrap().audible
        }

        fn has_track(&self) -> bool {
            true
        }

        fn now_playing(&self) -> Option<Arc<Track>> {
            None
        }

        fn artwork(&self) -> Option<ArtworkHandle> {
            None
        }

        fn elapsed(&self) -> Duration {
            Duration::ZERO
        }

        fn duration(&self) -> Duration {
            Duration::ZERO
        }

        fn playback_rate(&self) -> f32 {
            0.0
        }

        fn is_ducked(&self) -> bool {
            self.state.lock().unwrap().ducked
        }

        fn play(&self) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.audible = true;
            state.calls.push("play".into());
            Ok(())
        }

        fn pause(&self) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.audible = false;
            state.calls.push("pause".into());
            Ok(())
        }

        fn next(&self) -> Result<()> {
            Ok(())
        }

        fn previous(&self) -> Result<()> {
            Ok(())
        }

        fn set_ducked(&self, ducked: bool) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.ducked = ducked;
            state.calls.push(format!("duck:{ducked}"));
            Ok(())
        }
    }

    struct Rig {
        music: Arc<FakeChannel>,
        speech: Arc<FakeChannel>,
        _music_dyn: Arc<dyn ChannelControl>,
        _speech_dyn: Arc<dyn ChannelControl>,
        coordinator: InterruptionCoordinator,
    }

    fn rig(grace: Duration) -> Rig {
        let music = FakeChannel::new(ChannelKind::Music);
        let speech = FakeChannel::new(ChannelKind::Speech);
        let music_dyn: Arc<dyn ChannelControl> = Arc::clone(&music) as _;
        let speech_dyn: Arc<dyn ChannelControl> = Arc::clone(&speech) as _;
        let coordinator = InterruptionCoordinator::with_grace(
            Arc::downgrade(&music_dyn),
            Arc::downgrade(&speech_dyn),
            grace,
        );
        Rig {
            music,
            speech,
            _music_dyn: music_dyn,
            _speech_dyn: speech_dyn,
            coordinator,
        }
    }

    #[test]
    fn interruption_restores_exactly_what_played() {
        let mut r = rig(Duration::ZERO);
        r.music.set_audible(true);
        r.music.set_ducked_state(true);

        r.coordinator.handle_signal(SystemAudioSignal::InterruptionBegan);
        assert!(r.coordinator.is_interrupted());
        assert_eq!(r.music.calls(), vec!["pause"]);
        assert_eq!(r.speech.calls(), vec!["pause"]);

        r.coordinator.handle_signal(SystemAudioSignal::InterruptionEnded);
        r.coordinator.poll();

        // Music resumes ducked, speech stays paused
        assert_eq!(r.music.calls(), vec!["pause", "duck:true", "play"]);
        assert_eq!(r.speech.calls(), vec!["pause"]);
    }

    #[test]
    fn repeated_begins_keep_the_original_snapshot() {
        let mut r = rig(Duration::ZERO);
        r.music.set_audible(true);

        r.coordinator.handle_signal(SystemAudioSignal::InterruptionBegan);
        // Channels are already silent now; a duplicate begin must not
        // overwrite the snapshot with "nothing was playing"
        r.coordinator.handle_signal(SystemAudioSignal::InterruptionBegan);

        r.coordinator.handle_signal(SystemAudioSignal::InterruptionEnded);
        r.coordinator.poll();
        assert!(r.music.calls().contains(&"play".to_string()));
    }

    #[test]
    fn begin_during_pending_resume_keeps_intent() {
        let mut r = rig(Duration::from_secs(60));
        r.music.set_audible(true);

        r.coordinator.handle_signal(SystemAudioSignal::InterruptionBegan);
        r.coordinator.handle_signal(SystemAudioSignal::InterruptionEnded);
        // The grace period has not elapsed; the takeover returns
        r.coordinator.handle_signal(SystemAudioSignal::InterruptionBegan);
        r.coordinator.handle_signal(SystemAudioSignal::InterruptionEnded);

        // Force the deadline so the test does not wait out the grace
        r.coordinator.pending_resume_at = Some(Instant::now());
        r.coordinator.poll();
        assert!(r.music.calls().contains(&"play".to_string()));
        assert!(!r.speech.calls().contains(&"play".to_string()));
    }

    #[test]
    fn end_without_begin_is_ignored() {
        let mut r = rig(Duration::ZERO);
        r.coordinator.handle_signal(SystemAudioSignal::InterruptionEnded);
        r.coordinator.poll();
        assert!(r.music.calls().is_empty());
        assert!(r.speech.calls().is_empty());
    }

    #[test]
    fn announcements_interrupt_like_calls() {
        let mut r = rig(Duration::ZERO);
        r.speech.set_audible(true);

        r.coordinator.handle_signal(SystemAudioSignal::SecondaryAudioBegan);
        assert_eq!(r.speech.calls(), vec!["pause"]);

        r.coordinator.handle_signal(SystemAudioSignal::SecondaryAudioEnded);
        r.coordinator.poll();
        assert!(r.speech.calls().contains(&"play".to_string()));
        assert!(!r.music.calls().contains(&"play".to_string()));
    }

    #[test]
    fn device_disconnect_pauses_without_resume() {
        let mut r = rig(Duration::ZERO);
        r.music.set_audible(true);
        r.speech.set_audible(true);

        r.coordinator
            .handle_signal(SystemAudioSignal::RouteChanged(
                RouteChangeReason::OldDeviceUnavailable,
            ));
        assert_eq!(r.music.calls(), vec!["pause"]);
        assert_eq!(r.speech.calls(), vec!["pause"]);
        assert!(!r.coordinator.is_interrupted());

        // No tracked interruption, so nothing ever resumes
        r.coordinator.poll();
        assert!(!r.music.calls().contains(&"play".to_string()));
    }

    #[test]
    fn unrelated_route_changes_are_ignored() {
        let mut r = rig(Duration::ZERO);
        r.music.set_audible(true);
        r.coordinator
            .handle_signal(SystemAudioSignal::RouteChanged(RouteChangeReason::Other));
        assert!(r.music.calls().is_empty());
    }

    #[test]
    fn grace_period_defers_the_resume() {
        let mut r = rig(Duration::from_millis(50));
        r.music.set_audible(true);

        r.coordinator.handle_signal(SystemAudioSignal::InterruptionBegan);
        r.coordinator.handle_signal(SystemAudioSignal::InterruptionEnded);

        r.coordinator.poll();
        assert!(!r.music.calls().contains(&"play".to_string()));

        std::thread::sleep(Duration::from_millis(60));
        r.coordinator.poll();
        assert!(r.music.calls().contains(&"play".to_string()));
    }
}
