//! SQLite-backed store.
//!
//! One database file holds channels, model bindings, settings, counters and
//! chat history. Counter updates are single `UPSERT … RETURNING` statements,
//! so processes sharing the file see atomic increments.
//!
//! All SQL lives in `sql/*.sql` files, loaded via `include_str!`.

use crate::config::ConfigStore;
use crate::counter::CounterStore;
use crate::history::HistorySource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{types::Type, Connection, OptionalExtension, Row};
use std::path::Path;
use std::time::Duration;
use switchboard_core::{Channel, HistoryMessage, Provider, SwitchboardError, SwitchboardResult};
use tracing::info;

const SQL_SCHEMA: &str = include_str!("../sql/schema.sql");
const SQL_CHANNELS_FOR_MODEL: &str = include_str!("../sql/channels_for_model.sql");
const SQL_SELECT_CHANNEL: &str = include_str!("../sql/select_channel.sql");
const SQL_SELECT_CHANNELS: &str = include_str!("../sql/select_channels.sql");
const SQL_UPSERT_CHANNEL: &str = include_str!("../sql/upsert_channel.sql");
const SQL_BIND_MODEL: &str = include_str!("../sql/bind_model.sql");
const SQL_SELECT_SETTING: &str = include_str!("../sql/select_setting.sql");
const SQL_UPSERT_SETTING: &str = include_str!("../sql/upsert_setting.sql");
const SQL_COUNTER_GET: &str = include_str!("../sql/counter_get.sql");
const SQL_COUNTER_ADD: &str = include_str!("../sql/counter_add.sql");
const SQL_COUNTER_SET: &str = include_str!("../sql/counter_set.sql");
const SQL_MESSAGES_SINCE: &str = include_str!("../sql/messages_since.sql");
const SQL_LATEST_MESSAGES: &str = include_str!("../sql/latest_messages.sql");
const SQL_INSERT_MESSAGE: &str = include_str!("../sql/insert_message.sql");

fn store_err(e: rusqlite::Error) -> SwitchboardError {
    SwitchboardError::Store(e.to_string())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Configuration, counter and history store on a single SQLite file.
///
/// Wraps a `rusqlite::Connection` in a `Mutex`; every statement is short, so
/// calls run inline on the async worker.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> SwitchboardResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(store_err)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(store_err)?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "Opened SQLite store");
        Ok(store)
    }

    /// Create an in-memory database (useful for testing).
    pub fn in_memory() -> SwitchboardResult<Self> {
        let conn = Connection::open_in_memory().map_err(store_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> SwitchboardResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(store_err)?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(store_err)?;
        conn.execute_batch(SQL_SCHEMA).map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn add(&self, key: &str, delta: i64) -> SwitchboardResult<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            SQL_COUNTER_ADD,
            rusqlite::params![key, delta, now_millis()],
            |row| row.get(0),
        )
        .map_err(store_err)
    }

    fn select_channels(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> SwitchboardResult<Vec<Channel>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(store_err)?;
        let rows = stmt.query_map(params, read_channel).map_err(store_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(store_err)
    }

    fn select_messages(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> SwitchboardResult<Vec<HistoryMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql).map_err(store_err)?;
        let rows = stmt.query_map(params, read_message).map_err(store_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(store_err)
    }
}

fn read_channel(row: &Row<'_>) -> rusqlite::Result<Channel> {
    let provider: String = row.get(2)?;
    let provider: Provider = provider.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
    })?;
    let timeout_secs: i64 = row.get(8)?;
    Ok(Channel {
        id: row.get(0)?,
        name: row.get(1)?,
        provider,
        endpoint: row.get(3)?,
        api_key: row.get(4)?,
        parallelism: row.get(5)?,
        priority: row.get(6)?,
        proxy: row.get(7)?,
        timeout_secs: u64::try_from(timeout_secs).unwrap_or(60),
    })
}

fn read_message(row: &Row<'_>) -> rusqlite::Result<HistoryMessage> {
    let sent_at: i64 = row.get(4)?;
    Ok(HistoryMessage {
        message_id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_name: row.get(2)?,
        content: row.get(3)?,
        sent_at: DateTime::from_timestamp_millis(sent_at).unwrap_or_default(),
        reply_to: row.get(5)?,
        from_bot: row.get(6)?,
    })
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn channels_for_model(&self, model: &str) -> SwitchboardResult<Vec<Channel>> {
        self.select_channels(SQL_CHANNELS_FOR_MODEL, [model])
    }

    async fn channel(&self, id: i64) -> SwitchboardResult<Option<Channel>> {
        let conn = self.conn.lock();
        conn.query_row(SQL_SELECT_CHANNEL, [id], read_channel)
            .optional()
            .map_err(store_err)
    }

    async fn all_channels(&self) -> SwitchboardResult<Vec<Channel>> {
        self.select_channels(SQL_SELECT_CHANNELS, rusqlite::params![])
    }

    async fn get_setting(&self, key: &str) -> SwitchboardResult<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(SQL_SELECT_SETTING, [key], |row| row.get(0))
            .optional()
            .map_err(store_err)
    }

    async fn set_setting(&self, key: &str, value: &str) -> SwitchboardResult<()> {
        let conn = self.conn.lock();
        conn.execute(SQL_UPSERT_SETTING, [key, value])
            .map_err(store_err)?;
        Ok(())
    }

    async fn upsert_channel(&self, channel: &Channel) -> SwitchboardResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            SQL_UPSERT_CHANNEL,
            rusqlite::params![
                channel.id,
                channel.name,
                channel.provider.as_str(),
                channel.endpoint,
                channel.api_key,
                channel.parallelism,
                channel.priority,
                channel.proxy,
                i64::try_from(channel.timeout_secs).unwrap_or(i64::MAX),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn bind_model(&self, model: &str, channel_id: i64) -> SwitchboardResult<()> {
        let conn = self.conn.lock();
        conn.execute(SQL_BIND_MODEL, rusqlite::params![model, channel_id])
            .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl CounterStore for SqliteStore {
    async fn get(&self, key: &str) -> SwitchboardResult<Option<i64>> {
        let conn = self.conn.lock();
        conn.query_row(
            SQL_COUNTER_GET,
            rusqlite::params![key, now_millis()],
            |row| row.get(0),
        )
        .optional()
        .map_err(store_err)
    }

    async fn incr(&self, key: &str) -> SwitchboardResult<i64> {
        self.add(key, 1)
    }

    async fn decr(&self, key: &str) -> SwitchboardResult<i64> {
        self.add(key, -1)
    }

    async fn set(&self, key: &str, value: i64) -> SwitchboardResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            SQL_COUNTER_SET,
            rusqlite::params![key, value, Option::<i64>::None],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> SwitchboardResult<()> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = now_millis().saturating_add(ttl_ms);
        let conn = self.conn.lock();
        conn.execute(SQL_COUNTER_SET, rusqlite::params![key, value, expires_at])
            .map_err(store_err)?;
        Ok(())
    }
}

#[async_trait]
impl HistorySource for SqliteStore {
    async fn messages_since(
        &self,
        chat_id: i64,
        since: DateTime<Utc>,
    ) -> SwitchboardResult<Vec<HistoryMessage>> {
        self.select_messages(
            SQL_MESSAGES_SINCE,
            rusqlite::params![chat_id, since.timestamp_millis()],
        )
    }

    async fn latest_messages(
        &self,
        chat_id: i64,
        limit: usize,
    ) -> SwitchboardResult<Vec<HistoryMessage>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.select_messages(SQL_LATEST_MESSAGES, rusqlite::params![chat_id, limit])
    }

    async fn record(&self, message: &HistoryMessage) -> SwitchboardResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            SQL_INSERT_MESSAGE,
            rusqlite::params![
                message.chat_id,
                message.message_id,
                message.sender_name,
                message.content,
                message.sent_at.timestamp_millis(),
                message.reply_to,
                message.from_bot,
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }
}
