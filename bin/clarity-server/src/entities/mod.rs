//! Persistence on a sqlx `Any` pool.
//!
//! Each table gets a store trait ([`SessionStore`], [`ChatStore`], ...)
//! implemented for [`AnyStore`]. SQL sticks to the subset SQLite and Postgres
//! share: `$n` placeholders, RFC 3339 text timestamps, 0/1 integer flags and
//! JSON encoded as text.

pub mod corpus;
pub mod dao;
pub mod message;
pub mod profile;
pub mod session;
pub mod therapy;
pub mod topic;

pub use corpus::CorpusStore;
pub use dao::{ChatMessage, ChatSession, Conversation, NewMessage, Profile, TherapySession};
pub use message::ChatStore;
pub use profile::ProfileStore;
pub use session::SessionStore;
pub use therapy::TherapyStore;
pub use topic::TopicStore;

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::any::{AnyConnectOptions, AnyPoolOptions};

#[derive(Clone, Debug)]
pub struct AnyStore {
    pool: sqlx::Pool<sqlx::Any>,
}

impl AnyStore {
    /// Open the database at `url` and run pending migrations.
    ///
    /// `url` is any sqlx URL the `Any` driver understands, e.g.
    /// `"sqlite://clarity.db?mode=rwc"`, `"postgres://..."` or
    /// `"sqlite::memory:"` for tests (with a single connection).
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        sqlx::any::install_default_drivers();
        let options = AnyConnectOptions::from_str(url)?;
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Liveness probe used by the health endpoint.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Deletes every row, children first.
    pub async fn reset(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "chat_messages",
            "therapy_sessions",
            "chat_sessions",
            "profiles",
            "conversation_data",
            "topic_clusters",
        ] {
            sqlx::query(&format!("DELETE FROM {table}")).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// ── column helpers ───────────────────────────────────────────────────────────

/// Fixed-width RFC 3339 so text ordering matches time ordering.
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|e: chrono::ParseError| {
        tracing::warn!(raw = %raw, error = %e, "failed to parse timestamp; using now");
        Utc::now()
    })
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Decodes a JSON text column, falling back to `T::default()` on bad data.
pub(crate) fn from_json<T: DeserializeOwned + Default>(raw: &str) -> T {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to decode json column; using default");
        T::default()
    })
}
