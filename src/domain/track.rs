use super::Locator;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::time::Duration;
use uuid::Uuid;

/// One playable unit: a whole file, a remote stream, or a virtual chapter
/// (a sub-range of a shared underlying file). Immutable once constructed;
/// identity, equality and hashing are by `id` only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub locator: Locator,
    /// Chapter bounds in seconds, absolute within the underlying file.
    pub chapter_start: Option<f64>,
    pub chapter_end: Option<f64>,
    pub artwork_locator: Option<String>,
}

impl Track {
    pub fn new(title: impl Into<String>, artist: impl Into<String>, locator: Locator) -> Self {
        Track {
            id: Uuid::new_v4(),
            title: title.into(),
            artist: artist.into(),
            locator,
            chapter_start: None,
            chapter_end: None,
            artwork_locator: None,
        }
    }

    pub fn with_chapter(mut self, start: f64, end: f64) -> Self {
        self.chapter_start = Some(start);
        self.chapter_end = Some(end);
        self
    }

    pub fn with_artwork(mut self, locator: impl Into<String>) -> Self {
        self.artwork_locator = Some(locator.into());
        self
    }

    pub fn has_chapter_bounds(&self) -> bool {
        self.chapter_start.is_some() && self.chapter_end.is_some()
    }

    pub fn chapter_start_duration(&self) -> Option<Duration> {
        self.chapter_start.map(Duration::from_secs_f64)
    }

    pub fn chapter_end_duration(&self) -> Option<Duration> {
        self.chapter_end.map(Duration::from_secs_f64)
    }

    pub fn is_remote(&self) -> bool {
        self.locator.is_remote()
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

impl Hash for Track {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_id_only() {
        let a = Track::new("Part One", "Narrator", Locator::parse("book.m4b"));
        let mut b = a.clone();
        b.title = "Renamed".into();
        assert_eq!(a, b);

        let c = Track::new("Part One", "Narrator", Locator::parse("book.m4b"));
        assert_ne!(a, c);
    }

    #[test]
    fn chapter_bounds_require_both_ends() {
        let plain = Track::new("t", "a", Locator::parse("f.mp3"));
        assert!(!plain.has_chapter_bounds());

        let mut half = plain.clone();
        half.chapter_start = Some(10.0);
        assert!(!half.has_chapter_bounds());

        let full = plain.with_chapter(120.0, 180.0);
        assert!(full.has_chapter_bounds());
        assert_eq!(full.chapter_start_duration(), Some(Duration::from_secs(120)));
    }
}
