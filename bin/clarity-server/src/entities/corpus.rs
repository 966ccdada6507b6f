use std::future::Future;

use crate::entities::{AnyStore, dao::Conversation, format_ts, from_json, parse_ts, to_json};

type ConversationRow = (String, String, String, Option<i64>, Option<String>, Option<String>, String, String);

const CONVERSATION_COLUMNS: &str = "conversation_id, user_message, therapist_response, topic_id, topic, \
                                    emotional_tone, psychological_patterns, created_at";

/// Topic assigned to one corpus row by a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicAssignment {
    pub conversation_id: String,
    pub topic_id: Option<i64>,
    pub topic: Option<String>,
}

pub trait CorpusStore: Send + Sync + 'static {
    /// Inserts rows whose id is new; returns how many were inserted.
    fn insert_conversations(
        &self,
        conversations: &[Conversation],
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
    /// The whole corpus in id order.
    fn list_conversations(&self) -> impl Future<Output = Result<Vec<Conversation>, sqlx::Error>> + Send;
    fn assign_topics(&self, assignments: &[TopicAssignment]) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    fn count_conversations(&self) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;
}

fn from_row(
    (conversation_id, user_message, therapist_response, topic_id, topic, emotional_tone, patterns, created_at): ConversationRow,
) -> Conversation {
    Conversation {
        conversation_id,
        user_message,
        therapist_response,
        topic_id,
        topic,
        emotional_tone,
        patterns: from_json(&patterns),
        created_at: parse_ts(&created_at),
    }
}

impl CorpusStore for AnyStore {
    async fn insert_conversations(&self, conversations: &[Conversation]) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for c in conversations {
            let result = sqlx::query(&format!(
                "INSERT INTO conversation_data ({CONVERSATION_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                 ON CONFLICT (conversation_id) DO NOTHING"
            ))
            .bind(&c.conversation_id)
            .bind(&c.user_message)
            .bind(&c.therapist_response)
            .bind(c.topic_id)
            .bind(c.topic.as_deref())
            .bind(c.emotional_tone.as_deref())
            .bind(to_json(&c.patterns)?)
            .bind(format_ts(&c.created_at))
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, sqlx::Error> {
        let rows: Vec<ConversationRow> = sqlx::query_as(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversation_data ORDER BY conversation_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }

    async fn assign_topics(&self, assignments: &[TopicAssignment]) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for a in assignments {
            sqlx::query("UPDATE conversation_data SET topic_id = $1, topic = $2 WHERE conversation_id = $3")
                .bind(a.topic_id)
                .bind(a.topic.as_deref())
                .bind(&a.conversation_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn count_conversations(&self) -> Result<i64, sqlx::Error> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM conversation_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}
