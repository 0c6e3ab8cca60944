pub const CREATE_CHANNEL_STATE: &str = "
    CREATE TABLE IF NOT EXISTS channel_state (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const SET_CHANNEL_STATE: &str = "
    INSERT OR REPLACE INTO channel_state (key, value)
    VALUES (?1, ?2)
";

pub const GET_CHANNEL_STATE: &str = "
    SELECT value
    FROM channel_state
    WHERE key = ?1
";

pub const DELETE_CHANNEL_STATE: &str = "
    DELETE FROM channel_state
    WHERE key = ?1
";
