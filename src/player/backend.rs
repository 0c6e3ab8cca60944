use super::{Completion, QualityMode};
use crate::domain::Locator;
use anyhow::Result;
use crossbeam_channel::Sender;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Decode-on-demand playback. Seeks natively, handles network
    /// buffering, no gain boost.
    Streaming,
    /// Whole-file decode into memory with gain boost applied at schedule
    /// time. Local files only; degrades at high speeds.
    BufferedDsp,
}

/// Backend choice is a pure function of the content kind and the selected
/// quality mode. Library references must stream (platform constraint) and
/// remote content needs the streaming path's network buffering, so only
/// local files ever reach the DSP backend.
pub fn select_backend(locator: &Locator, quality: QualityMode) -> BackendKind {
    match (locator, quality) {
        (Locator::LibraryRef(_), _) => BackendKind::Streaming,
        (Locator::RemoteUrl(_), _) => BackendKind::Streaming,
        (Locator::LocalFile(_), QualityMode::Standard) => BackendKind::Streaming,
        (Locator::LocalFile(_), QualityMode::Boost) => BackendKind::BufferedDsp,
    }
}

/// Chapter bounds in absolute file time.
#[derive(Debug, Clone, Copy)]
pub struct ChapterRange {
    pub start: Duration,
    pub end: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub locator: Locator,
    /// Absolute position playback should begin at.
    pub start_at: Duration,
    /// Present for virtual-chapter tracks.
    pub range: Option<ChapterRange>,
}

/// Single-fire readiness result handed to a backend at load time. Firing
/// consumes the sender, and the carried generation lets the engine reject
/// the completion if the load has been superseded by the time it arrives.
pub struct ReadinessSender {
    generation: u64,
    tx: Sender<Completion>,
}

impl ReadinessSender {
    pub(crate) fn new(generation: u64, tx: Sender<Completion>) -> Self {
        ReadinessSender { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ready(self) {
        let _ = self.tx.send(Completion::Ready {
            generation: self.generation,
        });
    }

    pub fn failed(self, message: String) {
        let _ = self.tx.send(Completion::LoadFailed {
            generation: self.generation,
            message,
        });
    }
}

/// One decode/output pipeline. The engine owns at most one at a time and
/// talks to it only from the control thread that created it (the audio
/// output cannot change threads); anything asynchronous comes back through
/// the `ReadinessSender` given at load time.
pub trait AudioBackend {
    fn kind(&self) -> BackendKind;

    /// Begin loading. Readiness fires when the backend can honor play();
    /// for remote content that is whenever buffering completes.
    fn load(&mut self, request: LoadRequest, readiness: ReadinessSender) -> Result<()>;

    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn stop(&mut self);

    /// Absolute file position.
    fn seek(&mut self, position: Duration) -> Result<()>;
    fn position(&self) -> Duration;
    fn duration(&self) -> Option<Duration>;
    fn is_paused(&self) -> bool;

    /// True once the scheduled audio has been fully consumed. For the DSP
    /// backend this doubles as the chapter-segment completion signal.
    fn segment_ended(&self) -> bool;

    fn set_volume(&mut self, volume: f32);
    fn set_speed(&mut self, speed: f32);

    fn supports_boost(&self) -> bool;
    fn set_boost(&mut self, gain: f32);
}

/// Seam for constructing backends, letting tests substitute mock pipelines.
pub trait BackendFactory: Send {
    fn create(&self, kind: BackendKind) -> Result<Box<dyn AudioBackend>>;
}

/// Production factory backed by the system audio output.
pub struct SystemBackendFactory;

impl BackendFactory for SystemBackendFactory {
    fn create(&self, kind: BackendKind) -> Result<Box<dyn AudioBackend>> {
        match kind {
            BackendKind::Streaming => Ok(Box::new(super::backend_stream::StreamBackend::new()?)),
            BackendKind::BufferedDsp => Ok(Box::new(super::backend_dsp::DspBackend::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn selection_follows_content_and_quality() {
        let local = Locator::LocalFile(PathBuf::from("a.mp3"));
        let library = Locator::LibraryRef("item/1".into());
        let remote = Locator::RemoteUrl("https://example.com/a.mp3".into());

        assert_eq!(
            select_backend(&local, QualityMode::Standard),
            BackendKind::Streaming
        );
        assert_eq!(
            select_backend(&local, QualityMode::Boost),
            BackendKind::BufferedDsp
        );

        // Library and remote content must stream in both modes
        for quality in [QualityMode::Standard, QualityMode::Boost] {
            assert_eq!(select_backend(&library, quality), BackendKind::Streaming);
            assert_eq!(select_backend(&remote, quality), BackendKind::Streaming);
        }
    }
}
