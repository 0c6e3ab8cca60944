use super::Track;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Ordered queue of tracks owned by one playback engine. Mutated only
/// through engine operations; multiple entries may reference the same
/// underlying file (virtual chapters).
#[derive(Default)]
pub struct PlayQueue {
    tracks: Vec<Arc<Track>>,
    current_index: Option<usize>,
}

impl PlayQueue {
    pub fn new() -> Self {
        PlayQueue::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Arc<Track>] {
        &self.tracks
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current(&self) -> Option<&Arc<Track>> {
        self.current_index.and_then(|i| self.tracks.get(i))
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Track>> {
        self.tracks.get(index)
    }

    pub fn has_next(&self) -> bool {
        match self.current_index {
            Some(i) => i + 1 < self.tracks.len(),
            None => !self.tracks.is_empty(),
        }
    }

    pub fn has_previous(&self) -> bool {
        matches!(self.current_index, Some(i) if i > 0)
    }

    /// Insert at the front and make it current ("play now").
    pub fn play_now(&mut self, track: Arc<Track>) {
        self.tracks.insert(0, track);
        self.current_index = Some(0);
    }

    pub fn append(&mut self, track: Arc<Track>) {
        self.tracks.push(track);
        if self.current_index.is_none() {
            self.current_index = Some(0);
        }
    }

    pub fn select(&mut self, index: usize) -> bool {
        if index < self.tracks.len() {
            self.current_index = Some(index);
            true
        } else {
            false
        }
    }

    /// Shuffle the remainder of the queue. The current track is pinned to
    /// the front so playback position survives the reorder.
    pub fn shuffle(&mut self) {
        if self.tracks.len() < 2 {
            return;
        }
        if let Some(i) = self.current_index {
            self.tracks.swap(0, i);
            self.current_index = Some(0);
            self.tracks[1..].shuffle(&mut rand::rng());
        } else {
            self.tracks.shuffle(&mut rand::rng());
        }
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current_index = None;
    }

    pub fn replace(&mut self, tracks: Vec<Arc<Track>>, current_index: Option<usize>) {
        self.current_index = match current_index {
            Some(i) if i < tracks.len() => Some(i),
            _ if tracks.is_empty() => None,
            _ => Some(0),
        };
        self.tracks = tracks;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Locator;

    fn track(title: &str) -> Arc<Track> {
        Arc::new(Track::new(title, "artist", Locator::parse("file.mp3")))
    }

    #[test]
    fn play_now_inserts_at_front() {
        let mut q = PlayQueue::new();
        q.append(track("a"));
        q.append(track("b"));
        q.select(1);

        q.play_now(track("urgent"));
        assert_eq!(q.current().unwrap().title, "urgent");
        assert_eq!(q.len(), 3);
        assert_eq!(q.current_index(), Some(0));
    }

    #[test]
    fn shuffle_pins_current_to_front() {
        let mut q = PlayQueue::new();
        for i in 0..10 {
            q.append(track(&format!("t{i}")));
        }
        q.select(4);
        let playing = q.current().unwrap().id;

        q.shuffle();
        assert_eq!(q.current_index(), Some(0));
        assert_eq!(q.current().unwrap().id, playing);
        assert_eq!(q.len(), 10);
    }

    #[test]
    fn replace_clamps_bad_index() {
        let mut q = PlayQueue::new();
        q.replace(vec![track("a"), track("b")], Some(9));
        assert_eq!(q.current_index(), Some(0));

        q.replace(Vec::new(), Some(3));
        assert_eq!(q.current_index(), None);
    }

    #[test]
    fn has_next_tracks_the_tail() {
        let mut q = PlayQueue::new();
        assert!(!q.has_next());
        q.append(track("a"));
        q.append(track("b"));
        assert!(q.has_next());
        q.select(1);
        assert!(!q.has_next());
        assert!(q.has_previous());
    }
}
