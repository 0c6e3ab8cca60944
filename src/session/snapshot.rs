use crate::domain::Track;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Snapshots older than this are discarded on restore instead of applied.
pub const SNAPSHOT_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Everything needed to put one channel back where it was: queue, position,
/// and the knobs the user had set. Written on position-save events and on a
/// periodic timer while playing; consumed once, at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub current_track: Option<Track>,
    pub queue: Vec<Track>,
    pub current_index: Option<usize>,
    pub position_seconds: f64,
    pub volume: f32,
    pub speed: f32,
    pub boost_enabled: bool,
    pub artwork_locator: Option<String>,
    pub saved_at: u64,
}

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl PlaybackSnapshot {
    pub fn is_stale(&self) -> bool {
        self.age_secs() > SNAPSHOT_MAX_AGE_SECS
    }

    pub fn age_secs(&self) -> u64 {
        now_unix().saturating_sub(self.saved_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(saved_at: u64) -> PlaybackSnapshot {
        PlaybackSnapshot {
            current_track: None,
            queue: Vec::new(),
            current_index: None,
            position_seconds: 0.0,
            volume: 1.0,
            speed: 1.0,
            boost_enabled: false,
            artwork_locator: None,
            saved_at,
        }
    }

    #[test]
    fn eight_day_old_snapshot_is_stale() {
        let old = snapshot(now_unix() - 8 * 24 * 60 * 60);
        assert!(old.is_stale());
    }

    #[test]
    fn recent_snapshot_is_not_stale() {
        let fresh = snapshot(now_unix() - 60);
        assert!(!fresh.is_stale());

        let six_days = snapshot(now_unix() - 6 * 24 * 60 * 60);
        assert!(!six_days.is_stale());
    }
}
