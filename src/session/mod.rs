mod queries;
mod snapshot;

pub use snapshot::{PlaybackSnapshot, SNAPSHOT_MAX_AGE_SECS, now_unix};

use crate::domain::ChannelKind;
use anyhow::{Result, anyhow};
use rusqlite::{Connection, params};
use std::path::Path;

/// SQLite-backed key-value store holding one snapshot per channel.
/// Each engine owns its own connection; SQLite handles the file locking.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    pub fn open() -> Result<Self> {
        let dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory!"))?
            .join("counterpoint");
        std::fs::create_dir_all(&dir)?;
        Self::open_at(dir.join("session.db"))
    }

    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute(queries::CREATE_CHANNEL_STATE, [])?;
        Ok(SessionStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute(queries::CREATE_CHANNEL_STATE, [])?;
        Ok(SessionStore { conn })
    }

    fn snapshot_key(channel: ChannelKind) -> String {
        format!("snapshot_{channel}")
    }

    pub fn save_snapshot(&mut self, channel: ChannelKind, snapshot: &PlaybackSnapshot) -> Result<()> {
        let value = serde_json::to_string(snapshot)?;
        self.conn.execute(
            queries::SET_CHANNEL_STATE,
            params![Self::snapshot_key(channel), value],
        )?;
        Ok(())
    }

    pub fn load_snapshot(&mut self, channel: ChannelKind) -> Result<Option<PlaybackSnapshot>> {
        let raw = match self.conn.query_row(
            queries::GET_CHANNEL_STATE,
            params![Self::snapshot_key(channel)],
            |row| row.get::<_, String>(0),
        ) {
            Ok(value) => value,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn clear_snapshot(&mut self, channel: ChannelKind) -> Result<()> {
        self.conn.execute(
            queries::DELETE_CHANNEL_STATE,
            params![Self::snapshot_key(channel)],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Locator, Track};

    fn sample_snapshot() -> PlaybackSnapshot {
        let track = Track::new("Chapter 3", "Narrator", Locator::parse("book.m4b"))
            .with_chapter(120.0, 180.0);
        PlaybackSnapshot {
            current_track: Some(track.clone()),
            queue: vec![track],
            current_index: Some(0),
            position_seconds: 151.5,
            volume: 0.8,
            speed: 1.25,
            boost_enabled: true,
            artwork_locator: Some("covers/book.jpg".into()),
            saved_at: now_unix(),
        }
    }

    #[test]
    fn snapshot_round_trips_per_channel() {
        let mut store = SessionStore::open_in_memory().unwrap();
        let snapshot = sample_snapshot();

        store.save_snapshot(ChannelKind::Speech, &snapshot).unwrap();
        assert!(store.load_snapshot(ChannelKind::Music).unwrap().is_none());

        let loaded = store.load_snapshot(ChannelKind::Speech).unwrap().unwrap();
        assert_eq!(loaded.position_seconds, 151.5);
        assert_eq!(loaded.speed, 1.25);
        assert!(loaded.boost_enabled);
        let restored = loaded.current_track.unwrap();
        assert_eq!(restored.chapter_end, Some(180.0));
        assert_eq!(restored.id, snapshot.current_track.as_ref().unwrap().id);
    }

    #[test]
    fn clear_removes_only_that_channel() {
        let mut store = SessionStore::open_in_memory().unwrap();
        let snapshot = sample_snapshot();
        store.save_snapshot(ChannelKind::Music, &snapshot).unwrap();
        store.save_snapshot(ChannelKind::Speech, &snapshot).unwrap();

        store.clear_snapshot(ChannelKind::Music).unwrap();
        assert!(store.load_snapshot(ChannelKind::Music).unwrap().is_none());
        assert!(store.load_snapshot(ChannelKind::Speech).unwrap().is_some());
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let mut store = SessionStore::open_in_memory().unwrap();
        let mut snapshot = sample_snapshot();
        store.save_snapshot(ChannelKind::Music, &snapshot).unwrap();

        snapshot.position_seconds = 200.0;
        store.save_snapshot(ChannelKind::Music, &snapshot).unwrap();

        let loaded = store.load_snapshot(ChannelKind::Music).unwrap().unwrap();
        assert_eq!(loaded.position_seconds, 200.0);
    }
}
