//! Merges the two channel engines into one external now-playing surface.
//!
//! The update path is passive and runs on every engine state change; the
//! command path routes external transport controls to the right channel.

use crate::domain::{ArtworkHandle, ChannelKind};
use crate::player::ChannelControl;
use std::sync::Weak;
use std::time::Duration;

const IDLE_TITLE: &str = "Nothing playing";
const COMBINED_SEPARATOR: &str = " · ";

/// What the external surface should show for artwork.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NowPlayingArtwork {
    /// Generic app-identity image; used when combining channels or when a
    /// track has no artwork of its own.
    #[default]
    AppIdentity,
    Track(ArtworkHandle),
}

/// The merged external display.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NowPlayingInfo {
    pub title: String,
    pub artist: String,
    pub artwork: NowPlayingArtwork,
    pub elapsed: Duration,
    pub duration: Duration,
    pub rate: f32,
    pub is_playing: bool,
}

/// The observable inputs the precedence rules run on, per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelFacts {
    pub audible: bool,
    pub was_playing: bool,
    pub loaded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplaySource {
    Both,
    Music,
    Speech,
    Idle,
}

/// Display precedence. The evaluation order is load-bearing; reordering
/// these checks has broken the paused-state display in the past.
pub fn resolve_display(music: ChannelFacts, speech: ChannelFacts) -> DisplaySource {
    // 1. Both channels currently audible
    if music.audible && speech.audible {
        return DisplaySource::Both;
    }
    // 2. Exactly one audible
    if music.audible {
        return DisplaySource::Music;
    }
    if speech.audible {
        return DisplaySource::Speech;
    }
    // 3. Neither audible: sticky was-playing flags, intersected with
    //    "track still loaded", then any loaded channel, then idle
    let music_held = music.was_playing && music.loaded;
    let speech_held = speech.was_playing && speech.loaded;
    match (music_held, speech_held) {
        (true, true) => DisplaySource::Both,
        (true, false) => DisplaySource::Music,
        (false, true) => DisplaySource::Speech,
        (false, false) => {
            if music.loaded {
                DisplaySource::Music
            } else if speech.loaded {
                DisplaySource::Speech
            } else {
                DisplaySource::Idle
            }
        }
    }
}

/// The channel whose elapsed/duration/rate feed the external surface.
/// Same precedence as the display, music before speech on every tie.
pub fn primary_channel(music: ChannelFacts, speech: ChannelFacts) -> Option<ChannelKind> {
    if music.audible {
        return Some(ChannelKind::Music);
    }
    if speech.audible {
        return Some(ChannelKind::Speech);
    }
    if music.was_playing && music.loaded {
        return Some(ChannelKind::Music);
    }
    if speech.was_playing && speech.loaded {
        return Some(ChannelKind::Speech);
    }
    if music.loaded {
        return Some(ChannelKind::Music);
    }
    if speech.loaded {
        return Some(ChannelKind::Speech);
    }
    None
}

pub struct NowPlayingPresenter {
    music: Weak<dyn ChannelControl>,
    speech: Weak<dyn ChannelControl>,
    /// Sticky: set only by the passive update path when a channel is
    /// observed audible, cleared only by the pause/toggle handlers. The
    /// asymmetry distinguishes "paused because it was playing" from
    /// "never started" across any number of passive updates in between.
    music_was_playing: bool,
    speech_was_playing: bool,
    display: NowPlayingInfo,
}

impl NowPlayingPresenter {
    pub fn new(music: Weak<dyn ChannelControl>, speech: Weak<dyn ChannelControl>) -> Self {
        NowPlayingPresenter {
            music,
            speech,
            music_was_playing: false,
            speech_was_playing: false,
            display: NowPlayingInfo {
                title: IDLE_TITLE.into(),
                ..NowPlayingInfo::default()
            },
        }
    }

    pub fn display(&self) -> &NowPlayingInfo {
        &self.display
    }

    /// Passive refresh, called on every engine state-change event.
    pub fn update(&mut self) {
        let music = self.music.upgrade();
        let speech = self.speech.upgrade();

        if music.as_ref().is_some_and(|c| c.is_audible()) {
            self.music_was_playing = true;
        }
        if speech.as_ref().is_some_and(|c| c.is_audible()) {
            self.speech_was_playing = true;
        }

        let music_facts = facts(music.as_deref(), self.music_was_playing);
        let speech_facts = facts(speech.as_deref(), self.speech_was_playing);

        let source = resolve_display(music_facts, speech_facts);
        let mut info = match source {
            DisplaySource::Both => combined_info(music.as_deref(), speech.as_deref()),
            DisplaySource::Music => single_info(music.as_deref()),
            DisplaySource::Speech => single_info(speech.as_deref()),
            DisplaySource::Idle => NowPlayingInfo {
                title: IDLE_TITLE.into(),
                ..NowPlayingInfo::default()
            },
        };

        if let Some(primary) = primary_channel(music_facts, speech_facts) {
            let channel = match primary {
                ChannelKind::Music => music.as_deref(),
                ChannelKind::Speech => speech.as_deref(),
            };
            if let Some(channel) = channel {
                info.elapsed = channel.elapsed();
                info.duration = channel.duration();
                info.rate = channel.playback_rate();
            }
        }
        info.is_playing = music_facts.audible || speech_facts.audible;

        self.display = info;
    }

    // ========================
    //    TRANSPORT COMMANDS
    // ========================

    pub fn toggle_play_pause(&mut self) -> bool {
        let music_audible = audible(&self.music);
        let speech_audible = audible(&self.speech);
        if music_audible || speech_audible {
            self.pause()
        } else {
            self.resume_remembered()
        }
    }

    pub fn play(&mut self) -> bool {
        if audible(&self.music) || audible(&self.speech) {
            return true;
        }
        self.resume_remembered()
    }

    /// Snapshot audibility into the sticky flags *before* pausing, so the
    /// next resume knows exactly what was interrupted.
    pub fn pause(&mut self) -> bool {
        let music = self.music.upgrade();
        let speech = self.speech.upgrade();

        self.music_was_playing = music.as_ref().is_some_and(|c| c.is_audible());
        self.speech_was_playing = speech.as_ref().is_some_and(|c| c.is_audible());

        let mut routed = false;
        if let Some(channel) = &music {
            routed |= channel.pause().is_ok();
        }
        if let Some(channel) = &speech {
            routed |= channel.pause().is_ok();
        }
        routed
    }

    pub fn next(&mut self) -> bool {
        self.route_skip(|channel| channel.next().is_ok())
    }

    pub fn previous(&mut self) -> bool {
        self.route_skip(|channel| channel.previous().is_ok())
    }

    /// Each channel resumes independently; both can come back at once.
    fn resume_remembered(&mut self) -> bool {
        let mut routed = false;

        if self.music_was_playing {
            if let Some(channel) = self.music.upgrade() {
                if channel.has_track() {
                    routed |= channel.play().is_ok();
                }
            }
        }
        if self.speech_was_playing {
            if let Some(channel) = self.speech.upgrade() {
                if channel.has_track() {
                    routed |= channel.play().is_ok();
                }
            }
        }

        if !routed {
            // Fallback: a loaded channel nothing remembers is still resumable
            for weak in [&self.music, &self.speech] {
                if let Some(channel) = weak.upgrade() {
                    if channel.has_track() {
                        routed |= channel.play().is_ok();
                    }
                }
            }
        }
        routed
    }

    fn route_skip(&self, op: impl Fn(&dyn ChannelControl) -> bool) -> bool {
        let music = self.music.upgrade();
        let speech = self.speech.upgrade();

        if let Some(channel) = music.as_ref().filter(|c| c.is_audible()) {
            return op(channel.as_ref());
        }
        if let Some(channel) = speech.as_ref().filter(|c| c.is_audible()) {
            return op(channel.as_ref());
        }
        if self.music_was_playing {
            if let Some(channel) = music.as_ref().filter(|c| c.has_track()) {
                return op(channel.as_ref());
            }
        }
        if self.speech_was_playing {
            if let Some(channel) = speech.as_ref().filter(|c| c.has_track()) {
                return op(channel.as_ref());
            }
        }
        false
    }
}

fn audible(weak: &Weak<dyn ChannelControl>) -> bool {
    weak.upgrade().is_some_and(|c| c.is_audible())
}

fn facts(channel: Option<&dyn ChannelControl>, was_playing: bool) -> ChannelFacts {
    match channel {
        Some(channel) => ChannelFacts {
            audible: channel.is_audible(),
            was_playing,
            loaded: channel.has_track(),
        },
        None => ChannelFacts::default(),
    }
}

fn single_info(channel: Option<&dyn ChannelControl>) -> NowPlayingInfo {
    let Some(channel) = channel else {
        return NowPlayingInfo {
            title: IDLE_TITLE.into(),
            ..NowPlayingInfo::default()
        };
    };
    let Some(track) = channel.now_playing() else {
        return NowPlayingInfo {
            title: IDLE_TITLE.into(),
            ..NowPlayingInfo::default()
        };
    };
    NowPlayingInfo {
        title: track.title.clone(),
        artist: track.artist.clone(),
        artwork: channel
            .artwork()
            .map(NowPlayingArtwork::Track)
            .unwrap_or(NowPlayingArtwork::AppIdentity),
        ..NowPlayingInfo::default()
    }
}

fn combined_info(
    music: Option<&dyn ChannelControl>,
    speech: Option<&dyn ChannelControl>,
) -> NowPlayingInfo {
    let music_track = music.and_then(|c| c.now_playing());
    let speech_track = speech.and_then(|c| c.now_playing());

    let title = join_fields(
        music_track.as_ref().map(|t| t.title.as_str()),
        speech_track.as_ref().map(|t| t.title.as_str()),
    );
    let artist = join_fields(
        music_track.as_ref().map(|t| t.artist.as_str()),
        speech_track.as_ref().map(|t| t.artist.as_str()),
    );

    NowPlayingInfo {
        title: if title.is_empty() { IDLE_TITLE.into() } else { title },
        artist,
        artwork: NowPlayingArtwork::AppIdentity,
        ..NowPlayingInfo::default()
    }
}

fn join_fields(music: Option<&str>, speech: Option<&str>) -> String {
    match (music, speech) {
        (Some(m), Some(s)) if m == s => m.to_string(),
        (Some(m), Some(s)) => format!("{m}{COMBINED_SEPARATOR}{s}"),
        (Some(m), None) => m.to_string(),
        (None, Some(s)) => s.to_string(),
        (None, None) => String::new(),
    }
}
