/// Turn log. `seq` preserves insertion order for turns sharing a timestamp;
/// `created_at` is unix milliseconds.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS turns (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
        guild_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        author_id TEXT,
        author_name TEXT,
        in_reply_to TEXT,
        content TEXT NOT NULL,
        vector BLOB,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_turns_guild_created ON turns (guild_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_turns_guild_author ON turns (guild_id, author_id);
    CREATE INDEX IF NOT EXISTS idx_turns_reply ON turns (in_reply_to);
";

pub const TURN_COLUMNS: &str =
    "id, role, author_id, author_name, in_reply_to, content, channel_id, guild_id, vector, created_at";
