use std::future::Future;
use std::str::FromStr;

use chrono::Utc;
use clarity_types::Sender;
use uuid::Uuid;

use crate::entities::dao::{ChatMessage, NewMessage};
use crate::entities::{AnyStore, format_ts, parse_ts, to_json};

type MessageRow = (
    String,
    String,
    i64,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<f64>,
    String,
);

const MESSAGE_COLUMNS: &str = "id, session_id, seq, sender, content, psychological_insight, \
                               emotional_state, topic_classification, confidence_score, created_at";

pub trait ChatStore: Send + Sync + 'static {
    /// Appends one user and one AI message with consecutive `seq` and bumps
    /// the session's `message_count` by two, atomically.
    fn append_exchange(
        &self,
        session_id: &str,
        user: NewMessage,
        ai: NewMessage,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    /// Whole transcript, oldest first.
    fn list_messages(&self, session_id: &str) -> impl Future<Output = Result<Vec<ChatMessage>, sqlx::Error>> + Send;
    /// The last `limit` messages, oldest first.
    fn recent_messages(
        &self,
        session_id: &str,
        limit: i64,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, sqlx::Error>> + Send;
    /// Replies that carried a psychological insight.
    fn count_insights(&self) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;
}

fn from_row(
    (id, session_id, seq, sender, content, insight, emotional_state, topic, confidence, created_at): MessageRow,
) -> ChatMessage {
    let sender = Sender::from_str(&sender).unwrap_or_else(|_| {
        tracing::warn!(raw = %sender, message_id = %id, "unknown sender; treating as user");
        Sender::User
    });
    let psychological_insight = insight.and_then(|raw| match serde_json::from_str(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(message_id = %id, error = %e, "failed to decode stored insight");
            None
        }
    });
    ChatMessage {
        id,
        session_id,
        seq,
        sender,
        content,
        psychological_insight,
        emotional_state,
        topic_classification: topic,
        confidence_score: confidence,
        created_at: parse_ts(&created_at),
    }
}

impl ChatStore for AnyStore {
    async fn append_exchange(&self, session_id: &str, user: NewMessage, ai: NewMessage) -> Result<(), sqlx::Error> {
        let now = format_ts(&Utc::now());
        let mut tx = self.pool.begin().await?;

        // Taking the session row first serialises concurrent appends.
        sqlx::query("UPDATE chat_sessions SET message_count = message_count + 2, updated_at = $1 WHERE id = $2")
            .bind(&now)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        let (last,): (i64,) = sqlx::query_as("SELECT COALESCE(MAX(seq), 0) FROM chat_messages WHERE session_id = $1")
            .bind(session_id)
            .fetch_one(&mut *tx)
            .await?;

        for (offset, msg) in [(1, user), (2, ai)] {
            let insight = msg.psychological_insight.as_ref().map(to_json).transpose()?;
            sqlx::query(&format!(
                "INSERT INTO chat_messages ({MESSAGE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
            ))
            .bind(Uuid::new_v4().to_string())
            .bind(session_id)
            .bind(last + offset)
            .bind(msg.sender.to_string())
            .bind(&msg.content)
            .bind(insight)
            .bind(msg.emotional_state.as_deref())
            .bind(msg.topic_classification.as_deref())
            .bind(msg.confidence_score)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE session_id = $1 ORDER BY seq ASC"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn recent_messages(&self, session_id: &str, limit: i64) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE session_id = $1 ORDER BY seq DESC LIMIT $2"
        ))
        .bind(session_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        let mut messages: Vec<ChatMessage> = rows.into_iter().map(from_row).collect();
        messages.reverse();
        Ok(messages)
    }

    async fn count_insights(&self) -> Result<i64, sqlx::Error> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chat_messages WHERE psychological_insight IS NOT NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod test {
    use clarity_types::PsychologicalInsight;

    use super::*;
    use crate::entities::SessionStore;
    use crate::entities::test_support::memory_store;

    fn reply(text: &str) -> NewMessage {
        NewMessage {
            psychological_insight: Some(PsychologicalInsight {
                pattern_detected: "catastrophizing".into(),
                confidence: 0.6,
                therapeutic_approach: "cognitive_restructuring".into(),
                suggested_response: "Consider the evidence".into(),
            }),
            confidence_score: Some(0.8),
            ..NewMessage::ai(text)
        }
    }

    #[tokio::test]
    async fn exchange_adds_one_user_and_one_ai_row() {
        let store = memory_store().await;
        store.create_session_if_missing("s-1", None).await.unwrap();
        store
            .append_exchange("s-1", NewMessage::user("hello"), reply("hi there"))
            .await
            .unwrap();

        let messages = store.list_messages("s-1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[0].seq, 1);
        assert_eq!(messages[1].sender, Sender::Ai);
        assert_eq!(messages[1].seq, 2);
        assert_eq!(
            messages[1].psychological_insight.as_ref().map(|i| i.pattern_detected.as_str()),
            Some("catastrophizing")
        );
        assert_eq!(store.get_session("s-1").await.unwrap().unwrap().message_count, 2);
        assert_eq!(store.count_insights().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn history_is_in_creation_order() {
        let store = memory_store().await;
        store.create_session_if_missing("s-1", None).await.unwrap();
        for n in 0..3 {
            store
                .append_exchange("s-1", NewMessage::user(format!("q{n}")), NewMessage::ai(format!("a{n}")))
                .await
                .unwrap();
        }

        let all: Vec<String> = store.list_messages("s-1").await.unwrap().into_iter().map(|m| m.content).collect();
        assert_eq!(all, ["q0", "a0", "q1", "a1", "q2", "a2"]);

        let recent: Vec<String> = store
            .recent_messages("s-1", 3)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(recent, ["a1", "q2", "a2"]);
        assert_eq!(store.get_session("s-1").await.unwrap().unwrap().message_count, 6);
    }

    #[tokio::test]
    async fn deleting_a_session_drops_its_messages() {
        let store = memory_store().await;
        store.create_session_if_missing("s-1", None).await.unwrap();
        store
            .append_exchange("s-1", NewMessage::user("hello"), NewMessage::ai("hi"))
            .await
            .unwrap();
        store.delete_session("s-1").await.unwrap();
        assert!(store.list_messages("s-1").await.unwrap().is_empty());
    }
}
