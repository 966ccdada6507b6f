use std::future::Future;

use chrono::Utc;

use crate::entities::{AnyStore, dao::ChatSession, format_ts, parse_ts};

type SessionRow = (String, Option<String>, Option<String>, i64, i64, String, String);

const SESSION_COLUMNS: &str = "id, user_id, title, is_active, message_count, created_at, updated_at";

pub trait SessionStore: Send + Sync + 'static {
    fn get_session(&self, id: &str) -> impl Future<Output = Result<Option<ChatSession>, sqlx::Error>> + Send;
    /// Creates the session unless it exists; an existing owner is kept.
    fn create_session_if_missing(
        &self,
        id: &str,
        user_id: Option<&str>,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    /// Active sessions of `user_id`, most recently updated first.
    fn list_user_sessions(&self, user_id: &str) -> impl Future<Output = Result<Vec<ChatSession>, sqlx::Error>> + Send;
    /// Soft delete. Returns `false` when `user_id` owns no such session.
    fn deactivate_session(&self, id: &str, user_id: &str) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;
    /// Removes the session with its messages and summary.
    fn delete_session(&self, id: &str) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn count_active_sessions(&self) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;
}

fn from_row((id, user_id, title, is_active, message_count, created_at, updated_at): SessionRow) -> ChatSession {
    ChatSession {
        id,
        user_id,
        title,
        is_active: is_active != 0,
        message_count,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    }
}

impl SessionStore for AnyStore {
    async fn get_session(&self, id: &str) -> Result<Option<ChatSession>, sqlx::Error> {
        let row: Option<SessionRow> =
            sqlx::query_as(&format!("SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(from_row))
    }

    async fn create_session_if_missing(&self, id: &str, user_id: Option<&str>) -> Result<(), sqlx::Error> {
        let now = format_ts(&Utc::now());
        let result = sqlx::query(
            "INSERT INTO chat_sessions (id, user_id, is_active, message_count, created_at, updated_at) \
             VALUES ($1, $2, 1, 0, $3, $3) ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .bind(user_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            tracing::info!(session_id = %id, anonymous = user_id.is_none(), "created session");
        }
        Ok(())
    }

    async fn list_user_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>, sqlx::Error> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions \
             WHERE user_id = $1 AND is_active = 1 ORDER BY updated_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn deactivate_session(&self, id: &str, user_id: &str) -> Result<bool, sqlx::Error> {
        let now = format_ts(&Utc::now());
        let result = sqlx::query(
            "UPDATE chat_sessions SET is_active = 0, updated_at = $1 WHERE id = $2 AND user_id = $3",
        )
        .bind(&now)
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_session(&self, id: &str) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chat_messages WHERE session_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM therapy_sessions WHERE session_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chat_sessions WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn count_active_sessions(&self) -> Result<i64, sqlx::Error> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chat_sessions WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::test_support::memory_store;

    #[tokio::test]
    async fn first_owner_wins() {
        let store = memory_store().await;
        store.create_session_if_missing("s-1", Some("alice")).await.unwrap();
        store.create_session_if_missing("s-1", Some("bob")).await.unwrap();

        let session = store.get_session("s-1").await.unwrap().unwrap();
        assert_eq!(session.user_id.as_deref(), Some("alice"));
        assert!(session.is_active);
        assert_eq!(session.message_count, 0);
        assert!(session.is_visible_to(Some("alice")));
        assert!(!session.is_visible_to(Some("bob")));
        assert!(!session.is_visible_to(None));
    }

    #[tokio::test]
    async fn soft_delete_hides_from_listing() {
        let store = memory_store().await;
        store.create_session_if_missing("s-1", Some("alice")).await.unwrap();
        store.create_session_if_missing("s-2", Some("alice")).await.unwrap();
        store.create_session_if_missing("s-3", None).await.unwrap();

        assert!(!store.deactivate_session("s-1", "bob").await.unwrap());
        assert!(store.deactivate_session("s-1", "alice").await.unwrap());

        let listed = store.list_user_sessions("alice").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "s-2");
        assert_eq!(store.count_active_sessions().await.unwrap(), 2);
        // row is kept
        assert!(!store.get_session("s-1").await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = memory_store().await;
        store.create_session_if_missing("s-1", None).await.unwrap();
        store.delete_session("s-1").await.unwrap();
        store.delete_session("s-1").await.unwrap();
        assert!(store.get_session("s-1").await.unwrap().is_none());
    }
}
