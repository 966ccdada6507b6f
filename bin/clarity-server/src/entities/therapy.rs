use std::future::Future;

use crate::entities::{AnyStore, dao::TherapySession, format_ts, from_json, parse_ts, to_json};

type TherapyRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    String,
    Option<i64>,
    Option<i64>,
    i64,
    String,
    Option<String>,
);

const THERAPY_COLUMNS: &str = "id, session_id, user_id, session_name, session_summary, mood_before, mood_after, \
                               topics_discussed, insights_generated, session_duration, session_rating, \
                               is_completed, created_at, updated_at";

pub trait TherapyStore: Send + Sync + 'static {
    /// Inserts or replaces the summary row of `record.session_id`. The
    /// original `id` and `created_at` survive a replace.
    fn upsert_therapy_session(
        &self,
        record: &TherapySession,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn get_therapy_session(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<Option<TherapySession>, sqlx::Error>> + Send;
    /// Newest first.
    fn list_therapy_sessions(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<TherapySession>, sqlx::Error>> + Send;
}

fn from_row(
    (
        id,
        session_id,
        user_id,
        session_name,
        session_summary,
        mood_before,
        mood_after,
        topics,
        insights,
        session_duration,
        session_rating,
        is_completed,
        created_at,
        updated_at,
    ): TherapyRow,
) -> TherapySession {
    TherapySession {
        id,
        session_id,
        user_id,
        session_name,
        session_summary,
        mood_before,
        mood_after,
        topics_discussed: from_json(&topics),
        insights_generated: from_json(&insights),
        session_duration,
        session_rating,
        is_completed: is_completed != 0,
        created_at: parse_ts(&created_at),
        updated_at: updated_at.as_deref().map(parse_ts),
    }
}

impl TherapyStore for AnyStore {
    async fn upsert_therapy_session(&self, record: &TherapySession) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            "INSERT INTO therapy_sessions ({THERAPY_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (session_id) DO UPDATE SET \
                user_id = excluded.user_id, \
                session_name = excluded.session_name, \
                session_summary = excluded.session_summary, \
                mood_before = excluded.mood_before, \
                mood_after = excluded.mood_after, \
                topics_discussed = excluded.topics_discussed, \
                insights_generated = excluded.insights_generated, \
                session_duration = excluded.session_duration, \
                session_rating = excluded.session_rating, \
                is_completed = excluded.is_completed, \
                updated_at = excluded.updated_at"
        ))
        .bind(&record.id)
        .bind(&record.session_id)
        .bind(record.user_id.as_deref())
        .bind(record.session_name.as_deref())
        .bind(record.session_summary.as_deref())
        .bind(record.mood_before.as_deref())
        .bind(record.mood_after.as_deref())
        .bind(to_json(&record.topics_discussed)?)
        .bind(to_json(&record.insights_generated)?)
        .bind(record.session_duration)
        .bind(record.session_rating)
        .bind(i64::from(record.is_completed))
        .bind(format_ts(&record.created_at))
        .bind(record.updated_at.as_ref().map(format_ts))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_therapy_session(&self, session_id: &str) -> Result<Option<TherapySession>, sqlx::Error> {
        let row: Option<TherapyRow> =
            sqlx::query_as(&format!("SELECT {THERAPY_COLUMNS} FROM therapy_sessions WHERE session_id = $1"))
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(from_row))
    }

    async fn list_therapy_sessions(&self, user_id: &str) -> Result<Vec<TherapySession>, sqlx::Error> {
        let rows: Vec<TherapyRow> = sqlx::query_as(&format!(
            "SELECT {THERAPY_COLUMNS} FROM therapy_sessions WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::entities::test_support::memory_store;

    fn record(id: &str, summary: &str) -> TherapySession {
        TherapySession {
            id: id.into(),
            session_id: "s-1".into(),
            user_id: Some("alice".into()),
            session_name: None,
            session_summary: Some(summary.into()),
            mood_before: Some("anxiety".into()),
            mood_after: Some("neutral".into()),
            topics_discussed: vec!["work_stress".into()],
            insights_generated: vec!["catastrophizing".into()],
            session_duration: Some(120),
            session_rating: None,
            is_completed: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_summary_but_keeps_id() {
        let store = memory_store().await;
        store.upsert_therapy_session(&record("t-1", "first")).await.unwrap();
        store.upsert_therapy_session(&record("t-2", "second")).await.unwrap();

        let row = store.get_therapy_session("s-1").await.unwrap().unwrap();
        assert_eq!(row.id, "t-1");
        assert_eq!(row.session_summary.as_deref(), Some("second"));
        assert_eq!(row.topics_discussed, ["work_stress"]);
        assert!(row.is_completed);

        assert_eq!(store.list_therapy_sessions("alice").await.unwrap().len(), 1);
        assert!(store.list_therapy_sessions("bob").await.unwrap().is_empty());
    }
}
