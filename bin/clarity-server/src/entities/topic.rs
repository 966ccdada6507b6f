use std::future::Future;

use chrono::Utc;
use clarity_core::topics::Topic;

use crate::entities::{AnyStore, format_ts, from_json, to_json};

type TopicRow = (i64, String, String, String, String, i64);

pub trait TopicStore: Send + Sync + 'static {
    /// Replaces every cluster with `topics`.
    fn replace_topics(&self, topics: &[Topic]) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
    /// Stored clusters in id order; empty before the first training run.
    fn list_topics(&self) -> impl Future<Output = Result<Vec<Topic>, sqlx::Error>> + Send;
}

impl TopicStore for AnyStore {
    async fn replace_topics(&self, topics: &[Topic]) -> Result<(), sqlx::Error> {
        let now = format_ts(&Utc::now());
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM topic_clusters").execute(&mut *tx).await?;
        for t in topics {
            sqlx::query(
                "INSERT INTO topic_clusters \
                 (topic_id, topic_name, description, keywords, representative_docs, document_count, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(t.id)
            .bind(&t.name)
            .bind(&t.description)
            .bind(to_json(&t.keywords)?)
            .bind(to_json(&t.representative_docs)?)
            .bind(t.document_count)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_topics(&self) -> Result<Vec<Topic>, sqlx::Error> {
        let rows: Vec<TopicRow> = sqlx::query_as(
            "SELECT topic_id, topic_name, description, keywords, representative_docs, document_count \
             FROM topic_clusters ORDER BY topic_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, description, keywords, docs, document_count)| Topic {
                id,
                name,
                description,
                keywords: from_json(&keywords),
                representative_docs: from_json(&docs),
                document_count,
            })
            .collect())
    }
}
