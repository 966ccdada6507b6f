//! Retrieval store for past therapy conversations and session messages.
//!
//! Documents live in a single collection. Therapist responses carry
//! `message_type = therapist`, user questions `user`, and live chat messages
//! `session_message`. All searches rank by cosine similarity of embeddings
//! produced by one [`Embedder`].
//!
//! On disk the corpus lives in a JSON snapshot that is rewritten only when
//! the corpus changes. Session messages are appended to a JSON-lines log,
//! one line per message, and the log is rewritten only when messages are
//! evicted or deleted. At most `session_cap` session messages are kept.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::embedding::{Embedder, cosine};
use crate::error::Result;

pub const COLLECTION_NAME: &str = "therapy_conversations";
const SNAPSHOT_FILE: &str = "therapy_conversations.json";
const SESSION_LOG_FILE: &str = "session_messages.jsonl";
const SESSION_MESSAGE: &str = "session_message";

/// Session messages kept before the oldest are evicted.
pub const DEFAULT_SESSION_CAP: usize = 10_000;

pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub content: String,
    pub similarity: f64,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_documents: usize,
    pub collection_name: String,
}

/// One imported (user, therapist) exchange with its annotations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub user_message: String,
    pub therapist_response: String,
    pub topic: Option<String>,
    pub emotional_tone: Option<String>,
    pub patterns: Vec<String>,
}

impl ConversationRecord {
    fn metadata(&self) -> Metadata {
        let mut m = Metadata::new();
        if let Some(topic) = &self.topic {
            m.insert("topic".into(), topic.clone());
        }
        if let Some(tone) = &self.emotional_tone {
            m.insert("emotional_tone".into(), tone.clone());
        }
        if !self.patterns.is_empty() {
            m.insert("psychological_patterns".into(), self.patterns.join(","));
        }
        m
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Stores `{id}_user` and `{id}_therapist` documents.
    async fn add_conversation(
        &self,
        conversation_id: &str,
        user_message: &str,
        therapist_response: &str,
        metadata: Metadata,
    ) -> Result<()>;

    /// Therapist responses closest to `query`, optionally narrowed by
    /// exact-match metadata.
    async fn search_similar_responses(
        &self,
        query: &str,
        n_results: usize,
        filter: Option<Metadata>,
    ) -> Result<Vec<SearchHit>>;

    async fn search_by_topic(&self, query: &str, topic: &str, n_results: usize) -> Result<Vec<SearchHit>> {
        let filter = Metadata::from([("topic".to_string(), topic.to_string())]);
        self.search_similar_responses(query, n_results, Some(filter)).await
    }

    async fn search_by_emotional_tone(
        &self,
        query: &str,
        emotional_tone: &str,
        n_results: usize,
    ) -> Result<Vec<SearchHit>> {
        let filter = Metadata::from([("emotional_tone".to_string(), emotional_tone.to_string())]);
        self.search_similar_responses(query, n_results, Some(filter)).await
    }

    async fn add_session_message(
        &self,
        session_id: &str,
        message_id: &str,
        content: &str,
        sender: &str,
        metadata: Metadata,
    ) -> Result<()>;

    /// Earlier messages of `session_id` closest to `current_message`.
    async fn session_context(
        &self,
        session_id: &str,
        current_message: &str,
        n_results: usize,
    ) -> Result<Vec<SearchHit>>;

    /// Removes every document tagged with `session_id`; returns how many.
    async fn delete_session_data(&self, session_id: &str) -> Result<usize>;

    async fn stats(&self) -> StoreStats;

    /// Clears the collection and re-adds `conversations`.
    async fn reindex_conversations(&self, conversations: &[ConversationRecord]) -> Result<usize>;
}

#[derive(Debug, Deserialize)]
struct Snapshot {
    model: String,
    documents: Vec<StoredDocument>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    collection: &'a str,
    model: &'a str,
    documents: &'a [&'a StoredDocument],
}

#[derive(Debug, Deserialize)]
struct SessionLogEntry {
    model: String,
    document: StoredDocument,
}

#[derive(Serialize)]
struct SessionLogRef<'a> {
    model: &'a str,
    document: &'a StoredDocument,
}

fn is_session_message(doc: &StoredDocument) -> bool {
    doc.metadata.get("message_type").map(String::as_str) == Some(SESSION_MESSAGE)
}

fn upsert_document(docs: &mut Vec<StoredDocument>, doc: StoredDocument) {
    match docs.iter_mut().find(|d| d.id == doc.id) {
        Some(existing) => *existing = doc,
        None => docs.push(doc),
    }
}

/// Once there are more than `cap` session messages, drops the oldest down
/// to nine tenths of `cap`. Returns how many were dropped.
fn evict_session_messages(docs: &mut Vec<StoredDocument>, cap: usize) -> usize {
    let count = docs.iter().filter(|d| is_session_message(d)).count();
    if count <= cap {
        return 0;
    }
    let evicted = count - (cap - cap / 10);
    let mut left = evicted;
    docs.retain(|d| {
        if left > 0 && is_session_message(d) {
            left -= 1;
            false
        } else {
            true
        }
    });
    evicted
}

/// In-process store with an optional snapshot and session log on disk.
pub struct LocalVectorStore {
    embedder: Arc<dyn Embedder>,
    documents: RwLock<Vec<StoredDocument>>,
    snapshot_path: Option<PathBuf>,
    session_log: Option<PathBuf>,
    /// Lines in the session log. Held while the log is written.
    log_lines: Mutex<usize>,
    session_cap: usize,
}

impl LocalVectorStore {
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            documents: RwLock::new(Vec::new()),
            snapshot_path: None,
            session_log: None,
            log_lines: Mutex::new(0),
            session_cap: DEFAULT_SESSION_CAP,
        }
    }

    /// Caps how many session messages are kept.
    pub fn with_session_cap(mut self, cap: usize) -> Self {
        self.session_cap = cap;
        evict_session_messages(self.documents.get_mut(), cap);
        self
    }

    /// Opens (or creates) the store persisted under `dir`. A snapshot written
    /// with a different embedding model is discarded.
    pub async fn open(dir: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(SNAPSHOT_FILE);

        let mut documents = Vec::new();
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<Snapshot>(&bytes) {
                Ok(snap) if snap.model == embedder.model() => documents = snap.documents,
                Ok(snap) => tracing::warn!(
                    found = %snap.model,
                    expected = %embedder.model(),
                    "vector snapshot built with another embedding model; starting empty"
                ),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "unreadable vector snapshot; starting empty"),
            }
        }

        let log_path = dir.join(SESSION_LOG_FILE);
        let mut lines = 0;
        if tokio::fs::try_exists(&log_path).await.unwrap_or(false) {
            let bytes = tokio::fs::read(&log_path).await?;
            let raw = String::from_utf8_lossy(&bytes);
            let mut skipped = 0usize;
            for line in raw.lines().filter(|l| !l.trim().is_empty()) {
                lines += 1;
                match serde_json::from_str::<SessionLogEntry>(line) {
                    Ok(entry) if entry.model == embedder.model() => upsert_document(&mut documents, entry.document),
                    _ => skipped += 1,
                }
            }
            if skipped > 0 {
                tracing::warn!(skipped, path = %log_path.display(), "ignored unreadable session log entries");
            }
        }
        evict_session_messages(&mut documents, DEFAULT_SESSION_CAP);
        tracing::info!(documents = documents.len(), path = %path.display(), "vector store opened");

        Ok(Self {
            embedder,
            documents: RwLock::new(documents),
            snapshot_path: Some(path),
            session_log: Some(log_path),
            log_lines: Mutex::new(lines),
            session_cap: DEFAULT_SESSION_CAP,
        })
    }

    /// Rewrites the corpus snapshot. Session messages are not part of it.
    async fn persist(&self, documents: &[StoredDocument]) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let corpus: Vec<&StoredDocument> = documents.iter().filter(|d| !is_session_message(d)).collect();
        let snap = SnapshotRef {
            collection: COLLECTION_NAME,
            model: self.embedder.model(),
            documents: &corpus,
        };
        let bytes = serde_json::to_vec(&snap)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn upsert(&self, new_docs: Vec<StoredDocument>) -> Result<()> {
        let mut docs = self.documents.write().await;
        for doc in new_docs {
            upsert_document(&mut docs, doc);
        }
        self.persist(&docs).await
    }

    /// Appends one session message to the log; returns the log's length.
    async fn append_session_log(&self, doc: &StoredDocument) -> Result<usize> {
        let mut lines = self.log_lines.lock().await;
        let Some(path) = &self.session_log else {
            return Ok(*lines);
        };
        let mut line = serde_json::to_vec(&SessionLogRef {
            model: self.embedder.model(),
            document: doc,
        })?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        *lines += 1;
        Ok(*lines)
    }

    /// Rewrites the session log from the live session messages.
    async fn compact_session_log(&self) -> Result<()> {
        let mut lines = self.log_lines.lock().await;
        let Some(path) = &self.session_log else {
            return Ok(());
        };
        let model = self.embedder.model();
        let mut buf = Vec::new();
        let mut written = 0;
        {
            let docs = self.documents.read().await;
            for doc in docs.iter().filter(|d| is_session_message(d)) {
                serde_json::to_writer(&mut buf, &SessionLogRef { model, document: doc })?;
                buf.push(b'\n');
                written += 1;
            }
        }
        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, buf).await?;
        tokio::fs::rename(&tmp, path).await?;
        *lines = written;
        Ok(())
    }

    async fn query(&self, query: &str, n_results: usize, filter: &Metadata) -> Result<Vec<SearchHit>> {
        if n_results == 0 {
            return Ok(Vec::new());
        }
        let q = self.embedder.embed_one(query).await?;
        let docs = self.documents.read().await;
        let mut hits: Vec<SearchHit> = docs
            .iter()
            .filter(|d| filter.iter().all(|(k, v)| d.metadata.get(k) == Some(v)))
            .map(|d| SearchHit {
                content: d.content.clone(),
                similarity: f64::from(cosine(&q, &d.embedding)),
                metadata: d.metadata.clone(),
            })
            .collect();
        // stable sort keeps insertion order among equal scores
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn conversation_documents(
        &self,
        conversation_id: &str,
        user_message: &str,
        therapist_response: &str,
        metadata: Metadata,
    ) -> Result<Vec<StoredDocument>> {
        let embeddings = self
            .embedder
            .embed(&[user_message.to_string(), therapist_response.to_string()])
            .await?;
        let parts = [
            ("user", "question", user_message),
            ("therapist", "response", therapist_response),
        ];
        Ok(parts
            .into_iter()
            .zip(embeddings)
            .map(|((kind, content_type, content), embedding)| {
                let mut meta = metadata.clone();
                meta.insert("conversation_id".into(), conversation_id.to_string());
                meta.insert("message_type".into(), kind.into());
                meta.insert("content_type".into(), content_type.into());
                StoredDocument {
                    id: format!("{conversation_id}_{kind}"),
                    content: content.to_string(),
                    embedding,
                    metadata: meta,
                }
            })
            .collect())
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn add_conversation(
        &self,
        conversation_id: &str,
        user_message: &str,
        therapist_response: &str,
        metadata: Metadata,
    ) -> Result<()> {
        let docs = self
            .conversation_documents(conversation_id, user_message, therapist_response, metadata)
            .await?;
        self.upsert(docs).await
    }

    async fn search_similar_responses(
        &self,
        query: &str,
        n_results: usize,
        filter: Option<Metadata>,
    ) -> Result<Vec<SearchHit>> {
        let mut filter = filter.unwrap_or_default();
        filter.insert("message_type".into(), "therapist".into());
        self.query(query, n_results, &filter).await
    }

    async fn add_session_message(
        &self,
        session_id: &str,
        message_id: &str,
        content: &str,
        sender: &str,
        mut metadata: Metadata,
    ) -> Result<()> {
        let embedding = self.embedder.embed_one(content).await?;
        metadata.insert("session_id".into(), session_id.to_string());
        metadata.insert("sender".into(), sender.to_string());
        metadata.insert("message_type".into(), SESSION_MESSAGE.into());
        let doc = StoredDocument {
            id: message_id.to_string(),
            content: content.to_string(),
            embedding,
            metadata,
        };

        let evicted = {
            let mut docs = self.documents.write().await;
            upsert_document(&mut docs, doc.clone());
            evict_session_messages(&mut docs, self.session_cap)
        };
        if evicted > 0 {
            tracing::info!(evicted, cap = self.session_cap, "dropped oldest session messages");
            return self.compact_session_log().await;
        }
        let lines = self.append_session_log(&doc).await?;
        // replaced ids leave stale lines behind
        if lines > self.session_cap.max(1) * 2 {
            self.compact_session_log().await?;
        }
        Ok(())
    }

    async fn session_context(
        &self,
        session_id: &str,
        current_message: &str,
        n_results: usize,
    ) -> Result<Vec<SearchHit>> {
        let filter = Metadata::from([
            ("session_id".to_string(), session_id.to_string()),
            ("message_type".to_string(), SESSION_MESSAGE.to_string()),
        ]);
        self.query(current_message, n_results, &filter).await
    }

    async fn delete_session_data(&self, session_id: &str) -> Result<usize> {
        let removed = {
            let mut docs = self.documents.write().await;
            let before = docs.len();
            docs.retain(|d| d.metadata.get("session_id").map(String::as_str) != Some(session_id));
            before - docs.len()
        };
        if removed > 0 {
            self.compact_session_log().await?;
            tracing::info!(session_id, removed, "deleted session documents");
        }
        Ok(removed)
    }

    async fn stats(&self) -> StoreStats {
        StoreStats {
            total_documents: self.documents.read().await.len(),
            collection_name: COLLECTION_NAME.to_string(),
        }
    }

    async fn reindex_conversations(&self, conversations: &[ConversationRecord]) -> Result<usize> {
        let mut fresh = Vec::with_capacity(conversations.len() * 2);
        for conv in conversations {
            fresh.extend(
                self.conversation_documents(
                    &conv.conversation_id,
                    &conv.user_message,
                    &conv.therapist_response,
                    conv.metadata(),
                )
                .await?,
            );
        }
        {
            let mut docs = self.documents.write().await;
            *docs = fresh;
            self.persist(&docs).await?;
        }
        self.compact_session_log().await?;
        tracing::info!(conversations = conversations.len(), "reindexed conversations");
        Ok(conversations.len())
    }
}
