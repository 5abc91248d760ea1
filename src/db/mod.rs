mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::StoreError;
use crate::store::{MessageStore, Scope, Statistics};
use crate::turn::{NewTurn, Speaker, Turn};

use schema::{SCHEMA, TURN_COLUMNS};

const MEMORY_PATH: &str = ":memory:";
const BUSY_TIMEOUT_MS: u32 = 5_000;

pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Runs on every new pooled connection.
#[derive(Debug)]
struct PragmaCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        // WAL lets readers proceed while a writer holds the lock.
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA synchronous = NORMAL;",
            BUSY_TIMEOUT_MS
        ))
    }
}

/// SQLite-backed turn log behind an `r2d2` pool. Connections are opened on
/// demand, so an unreachable file shows up as a failed connectivity check
/// rather than a construction error.
#[derive(Clone)]
pub struct Database {
    path: Arc<str>,
    pool: ConnectionPool,
}

impl Database {
    pub fn new(config: &Config) -> Self {
        Self::open(
            &config.database_url,
            config.database_pool_size,
            config.store_timeout(),
        )
    }

    pub fn at_path(path: &str) -> Self {
        Self::open(path, 4, Duration::from_secs(5))
    }

    /// `connect_timeout` bounds how long a caller waits for a free or newly
    /// opened connection.
    pub fn open(path: &str, pool_size: u32, connect_timeout: Duration) -> Self {
        let builder = ConnectionPool::builder()
            .connection_timeout(connect_timeout)
            .connection_customizer(Box::new(PragmaCustomizer));

        // Every `:memory:` connection is its own database, so the pool holds
        // exactly one and never recycles it.
        let pool = if path == MEMORY_PATH {
            builder
                .max_size(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .build_unchecked(SqliteConnectionManager::memory())
        } else {
            builder
                .max_size(pool_size.max(1))
                .min_idle(Some(0))
                .build_unchecked(SqliteConnectionManager::file(path))
        };

        Self {
            path: Arc::from(path),
            pool,
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.pool.get()?;
        f(&conn)
    }

    /// Runs blocking database work off the async runtime.
    pub async fn run_blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Unavailable(format!("blocking task failed: {}", e)))?
    }

    pub fn ping(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            // Touches the file header, unlike a bare SELECT 1.
            conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
                row.get::<_, i64>(0)
            })?;
            Ok(())
        })
    }

    pub fn execute_init(&self) -> Result<(), StoreError> {
        info!("Database: Initializing schema...");
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA)?;
            let found: Option<String> = conn
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'turns'",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            if found.is_none() {
                return Err(StoreError::Unavailable("turns table missing".to_string()));
            }
            debug!("Database: Schema initialized successfully");
            Ok(())
        })
    }

    pub fn insert_turn(&self, turn: &NewTurn) -> Result<Turn, StoreError> {
        debug!(
            "Database: Saving {} turn {} in channel {}",
            turn.speaker.role(),
            turn.id,
            turn.channel_id
        );
        let (author_id, author_name, in_reply_to) = match &turn.speaker {
            Speaker::User {
                author_id,
                author_name,
            } => (Some(author_id.as_str()), Some(author_name.as_str()), None),
            Speaker::Assistant { in_reply_to } => (None, None, Some(in_reply_to.as_str())),
        };
        let blob = turn.vector.as_deref().map(encode_vector);
        let now_ms = Utc::now().timestamp_millis();

        self.with_conn(|conn| {
            // Clamp to the newest stored timestamp so created_at never goes
            // backwards when the wall clock does.
            let created_ms: i64 = conn
                .query_row(
                    "INSERT INTO turns (id, role, guild_id, channel_id, author_id, author_name, in_reply_to, content, vector, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
                             MAX(?10, COALESCE((SELECT MAX(created_at) FROM turns), 0)))
                     RETURNING created_at",
                    params![
                        turn.id,
                        turn.speaker.role(),
                        turn.guild_id,
                        turn.channel_id,
                        author_id,
                        author_name,
                        in_reply_to,
                        turn.content,
                        blob,
                        now_ms,
                    ],
                    |row| row.get(0),
                )
                .map_err(|e| match e {
                    rusqlite::Error::SqliteFailure(err, _)
                        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                    {
                        StoreError::DuplicateId(turn.id.clone())
                    }
                    other => other.into(),
                })?;

            Ok(Turn {
                id: turn.id.clone(),
                speaker: turn.speaker.clone(),
                content: turn.content.clone(),
                channel_id: turn.channel_id.clone(),
                guild_id: turn.guild_id.clone(),
                vector: turn.vector.clone(),
                created_at: millis_to_utc(created_ms),
            })
        })
    }

    pub fn select_scope(
        &self,
        scope: &Scope,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Turn>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {TURN_COLUMNS} FROM turns
             WHERE guild_id = ?1
               AND (?2 IS NULL
                    OR author_id = ?2
                    OR in_reply_to IN (SELECT id FROM turns WHERE guild_id = ?1 AND author_id = ?2))
               AND (?3 IS NULL OR created_at < ?3)
             ORDER BY created_at DESC, seq DESC
             LIMIT ?4"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(
                params![
                    scope.guild_id,
                    scope.author_id,
                    before.map(|b| b.timestamp_millis()),
                    limit,
                ],
                row_to_turn,
            )?;

            let mut results = Vec::new();
            for row in rows {
                results.push(row?);
            }
            debug!(
                "Database: Scope query for guild {} returned {} turns",
                scope.guild_id,
                results.len()
            );
            Ok(results)
        })
    }

    pub fn select_statistics(&self) -> Result<Statistics, StoreError> {
        self.with_conn(|conn| {
            let (total, with_vectors, channels): (i64, i64, i64) = conn.query_row(
                "SELECT COUNT(*), COUNT(vector), COUNT(DISTINCT channel_id) FROM turns",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            Ok(Statistics {
                total_messages: total.max(0) as u64,
                messages_with_vectors: with_vectors.max(0) as u64,
                unique_channels: channels.max(0) as u64,
            })
        })
    }

    /// Removes turns written before `cutoff`. Returns the number deleted.
    pub fn cleanup_old_turns(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count = conn.execute(
                "DELETE FROM turns WHERE created_at < ?1",
                params![cutoff.timestamp_millis()],
            )?;
            Ok(count)
        })
    }

    pub fn purge_turns_by_author(&self, guild_id: &str, author_id: &str) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let replies = tx.execute(
                "DELETE FROM turns WHERE in_reply_to IN
                    (SELECT id FROM turns WHERE guild_id = ?1 AND author_id = ?2)",
                params![guild_id, author_id],
            )?;
            let own = tx.execute(
                "DELETE FROM turns WHERE guild_id = ?1 AND author_id = ?2",
                params![guild_id, author_id],
            )?;
            tx.commit()?;
            Ok(replies + own)
        })
    }
}

#[async_trait]
impl MessageStore for Database {
    async fn test_connection(&self) -> bool {
        match self.run_blocking(|db| db.ping()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Database: Connection test failed for {}: {}", self.path, e);
                false
            }
        }
    }

    async fn setup_schema(&self) -> bool {
        match self.run_blocking(|db| db.execute_init()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Database: Schema setup failed: {}", e);
                false
            }
        }
    }

    async fn append(&self, turn: &NewTurn) -> Result<Turn, StoreError> {
        let turn = turn.clone();
        self.run_blocking(move |db| db.insert_turn(&turn)).await
    }

    async fn query_scope(
        &self,
        scope: &Scope,
        limit: usize,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Turn>, StoreError> {
        let scope = scope.clone();
        self.run_blocking(move |db| db.select_scope(&scope, limit, before))
            .await
    }

    async fn statistics(&self) -> Result<Statistics, StoreError> {
        self.run_blocking(|db| db.select_statistics()).await
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.run_blocking(move |db| db.cleanup_old_turns(cutoff)).await
    }

    async fn purge_author(&self, guild_id: &str, author_id: &str) -> Result<usize, StoreError> {
        let guild_id = guild_id.to_string();
        let author_id = author_id.to_string();
        self.run_blocking(move |db| db.purge_turns_by_author(&guild_id, &author_id))
            .await
    }
}

fn row_to_turn(row: &Row<'_>) -> rusqlite::Result<Turn> {
    let id: String = row.get(0)?;
    let role: String = row.get(1)?;
    let author_id: Option<String> = row.get(2)?;
    let author_name: Option<String> = row.get(3)?;
    let in_reply_to: Option<String> = row.get(4)?;
    let blob: Option<Vec<u8>> = row.get(8)?;
    let created_ms: i64 = row.get(9)?;

    let speaker = if role == "assistant" {
        Speaker::Assistant {
            in_reply_to: in_reply_to.unwrap_or_default(),
        }
    } else {
        Speaker::User {
            author_id: author_id.unwrap_or_default(),
            author_name: author_name.unwrap_or_default(),
        }
    };

    let vector = blob.and_then(|bytes| {
        let decoded = decode_vector(&bytes);
        if decoded.is_none() {
            warn!("Database: Ignoring malformed vector on turn {}", id);
        }
        decoded
    });

    Ok(Turn {
        id,
        speaker,
        content: row.get(5)?,
        channel_id: row.get(6)?,
        guild_id: row.get(7)?,
        vector,
        created_at: millis_to_utc(created_ms),
    })
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Little-endian f32 packing.
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
