//! The chat pipeline and the corpus jobs built on it.
//!
//! One message goes through: session check, analysis, retrieval, recent
//! history, generation, persistence of the exchange, then indexing of the
//! user message. Retrieval and indexing failures only degrade the reply;
//! database failures abort the request.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use clarity_core::dataset::{DatasetCleaner, parse_records};
use clarity_core::generation::{GenerationContext, HistoryTurn, ResponseGenerator};
use clarity_core::text::truncate_chars;
use clarity_core::topics::TopicModel;
use clarity_core::vector_store::{Metadata, SearchHit, VectorStore};
use clarity_core::{Analysis, Analyzer};
use clarity_types::{ChatRequest, ChatResponse, ProcessingStats, SessionHistory};
use uuid::Uuid;

use crate::entities::corpus::TopicAssignment;
use crate::entities::{
    AnyStore, ChatMessage, ChatSession, ChatStore, Conversation, CorpusStore, NewMessage, SessionStore,
    TherapySession, TherapyStore, TopicStore, format_ts,
};
use crate::error::ServerError;
use crate::services::auth::AuthUser;

const SIMILAR_RESULTS: usize = 5;
const TOPIC_RESULTS: usize = 3;
const EMOTION_RESULTS: usize = 3;
const RETRIEVED_KEEP: usize = 5;
const DEDUP_PREFIX_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Recent messages fed back for continuity.
    pub history_window: i64,
    /// Cap on retrieved responses handed to generation.
    pub max_retrieved_documents: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            history_window: 10,
            max_retrieved_documents: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub records: usize,
    pub cleaned: usize,
    pub inserted: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainReport {
    pub documents: usize,
    pub topics: usize,
    pub assigned: usize,
}

pub struct TherapyService {
    store: AnyStore,
    analyzer: Analyzer,
    topics: RwLock<TopicModel>,
    vectors: Arc<dyn VectorStore>,
    generator: ResponseGenerator,
    settings: PipelineSettings,
}

impl TherapyService {
    pub fn new(
        store: AnyStore,
        analyzer: Analyzer,
        topics: TopicModel,
        vectors: Arc<dyn VectorStore>,
        generator: ResponseGenerator,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            analyzer,
            topics: RwLock::new(topics),
            vectors,
            generator,
            settings,
        }
    }

    pub fn store(&self) -> &AnyStore {
        &self.store
    }

    pub fn vectors(&self) -> &dyn VectorStore {
        self.vectors.as_ref()
    }

    pub fn llm_configured(&self) -> bool {
        self.generator.llm().is_configured()
    }

    pub fn topic_model(&self) -> TopicModel {
        self.topics.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_topic_model(&self, model: TopicModel) {
        *self.topics.write().unwrap_or_else(|e| e.into_inner()) = model;
    }

    /// Patterns, emotional state and topic of `text`.
    pub fn analyze(&self, text: &str) -> Analysis {
        let topics = self.topics.read().unwrap_or_else(|e| e.into_inner());
        self.analyzer.analyze(text, &topics)
    }

    /// Looks up a session and checks the caller may see it.
    pub async fn authorize(&self, session_id: &str, user: Option<&AuthUser>) -> Result<Option<ChatSession>, ServerError> {
        let caller = user.map(|u| u.user_id.as_str());
        match self.store.get_session(session_id).await? {
            Some(session) if !session.is_visible_to(caller) => {
                tracing::warn!(session_id = %session_id, "denied access to session owned by another user");
                Err(ServerError::Forbidden("Access denied to this session".into()))
            }
            other => Ok(other),
        }
    }

    async fn ensure_session(&self, session_id: &str, user: Option<&AuthUser>) -> Result<ChatSession, ServerError> {
        if let Some(session) = self.authorize(session_id, user).await? {
            return Ok(session);
        }
        self.store
            .create_session_if_missing(session_id, user.map(|u| u.user_id.as_str()))
            .await?;
        // Re-check: a concurrent request may have created it for someone else.
        self.authorize(session_id, user)
            .await?
            .ok_or_else(|| ServerError::Internal(format!("session {session_id} vanished after insert")))
    }

    pub async fn process_message(&self, req: &ChatRequest, user: Option<&AuthUser>) -> Result<ChatResponse, ServerError> {
        let session_id = req.session_id.as_str();
        self.ensure_session(session_id, user).await?;

        let analysis = self.analyze(&req.content);
        tracing::debug!(
            session_id = %session_id,
            patterns = analysis.patterns.len(),
            emotion = %analysis.emotional_state.primary_emotion,
            topic = %analysis.topic.topic_name,
            "message analysed"
        );

        let retrieved = self.retrieve(&req.content, &analysis).await;
        let history = self.recent_history(session_id).await;

        let ctx = GenerationContext {
            session_id: session_id.to_string(),
            emotional_state: Some(analysis.emotional_state.clone()),
            topic: Some(analysis.topic.clone()),
            patterns: analysis.patterns.clone(),
            retrieved,
            history,
        };
        let response = self.generator.generate(&req.content, &ctx).await;

        let user_msg = NewMessage {
            emotional_state: response.emotional_state.clone(),
            topic_classification: response.topic_classification.clone(),
            confidence_score: Some(1.0),
            ..NewMessage::user(&req.content)
        };
        let ai_msg = NewMessage {
            psychological_insight: response.psychological_insight.clone(),
            emotional_state: response.emotional_state.clone(),
            topic_classification: response.topic_classification.clone(),
            confidence_score: Some(response.confidence_score),
            ..NewMessage::ai(&response.content)
        };
        self.store.append_exchange(session_id, user_msg, ai_msg).await?;

        self.index_user_message(session_id, &req.content, &analysis).await;
        tracing::info!(
            session_id = %session_id,
            confidence = response.confidence_score,
            "reply generated"
        );
        Ok(response)
    }

    /// Content, topic and tone searches merged: de-duplicated on a content
    /// prefix, best first.
    async fn retrieve(&self, text: &str, analysis: &Analysis) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        let searches = async {
            hits.extend(self.vectors.search_similar_responses(text, SIMILAR_RESULTS, None).await?);
            if !analysis.topic.is_unknown() {
                hits.extend(
                    self.vectors
                        .search_by_topic(text, &analysis.topic.topic_name, TOPIC_RESULTS)
                        .await?,
                );
            }
            if !analysis.emotional_state.is_neutral() {
                hits.extend(
                    self.vectors
                        .search_by_emotional_tone(text, &analysis.emotional_state.primary_emotion, EMOTION_RESULTS)
                        .await?,
                );
            }
            Ok::<_, clarity_core::CoreError>(())
        };
        if let Err(e) = searches.await {
            tracing::warn!(error = %e, "retrieval failed; answering without references");
            return Vec::new();
        }

        let mut seen = HashSet::new();
        hits.retain(|h| seen.insert(truncate_chars(&h.content, DEDUP_PREFIX_CHARS).to_string()));
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(RETRIEVED_KEEP.min(self.settings.max_retrieved_documents));
        hits
    }

    async fn recent_history(&self, session_id: &str) -> Vec<HistoryTurn> {
        match self.store.recent_messages(session_id, self.settings.history_window).await {
            Ok(messages) => messages
                .into_iter()
                .map(|m| HistoryTurn {
                    sender: m.sender,
                    content: m.content,
                })
                .collect(),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "could not load history");
                Vec::new()
            }
        }
    }

    async fn index_user_message(&self, session_id: &str, content: &str, analysis: &Analysis) {
        let message_id = format!("{session_id}_{}", Utc::now().timestamp_micros());
        let patterns: Vec<&str> = analysis.patterns.iter().map(|p| p.pattern.as_str()).collect();
        let metadata = Metadata::from([
            ("emotional_state".to_string(), analysis.emotional_state.primary_emotion.clone()),
            ("topic".to_string(), analysis.topic.topic_name.clone()),
            ("patterns".to_string(), patterns.join(",")),
        ]);
        if let Err(e) = self
            .vectors
            .add_session_message(session_id, &message_id, content, "user", metadata)
            .await
        {
            tracing::warn!(session_id = %session_id, error = %e, "failed to index message");
        }
    }

    /// Full transcript; empty for a session that does not exist yet.
    pub async fn session_history(&self, session_id: &str, user: Option<&AuthUser>) -> Result<SessionHistory, ServerError> {
        let Some(session) = self.authorize(session_id, user).await? else {
            return Ok(SessionHistory::empty());
        };
        let history: Vec<_> = self
            .store
            .list_messages(session_id)
            .await?
            .iter()
            .map(ChatMessage::to_entry)
            .collect();
        Ok(SessionHistory {
            message_count: history.len() as i64,
            history,
            session_created: Some(format_ts(&session.created_at)),
        })
    }

    /// Removes the session, its messages and its indexed documents.
    /// Deleting an unknown session succeeds.
    pub async fn delete_session(&self, session_id: &str, user: Option<&AuthUser>) -> Result<(), ServerError> {
        self.authorize(session_id, user).await?;
        self.store.delete_session(session_id).await?;
        match self.vectors.delete_session_data(session_id).await {
            Ok(n) => tracing::info!(session_id = %session_id, documents = n, "session deleted"),
            Err(e) => tracing::warn!(session_id = %session_id, error = %e, "failed to drop indexed session data"),
        }
        Ok(())
    }

    /// Summarises the session and stores it as its therapy-session record.
    pub async fn summarize_session(&self, session_id: &str, user: Option<&AuthUser>) -> Result<TherapySession, ServerError> {
        let session = self
            .authorize(session_id, user)
            .await?
            .ok_or_else(|| ServerError::NotFound("Session not found".into()))?;
        let messages = self.store.list_messages(session_id).await?;
        let turns: Vec<HistoryTurn> = messages
            .iter()
            .map(|m| HistoryTurn {
                sender: m.sender,
                content: m.content.clone(),
            })
            .collect();
        let summary = self.generator.session_summary(&turns).await;

        let existing = self.store.get_therapy_session(session_id).await?;
        let now = Utc::now();
        let record = TherapySession {
            id: existing
                .as_ref()
                .map(|t| t.id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            session_id: session_id.to_string(),
            user_id: session.user_id.clone(),
            session_name: session.title.clone(),
            session_summary: Some(summary),
            mood_before: first_user_mood(messages.iter()),
            mood_after: first_user_mood(messages.iter().rev()),
            topics_discussed: distinct(messages.iter().filter_map(|m| m.topic_classification.as_deref())),
            insights_generated: distinct(
                messages
                    .iter()
                    .filter_map(|m| m.psychological_insight.as_ref())
                    .map(|i| i.pattern_detected.as_str()),
            ),
            session_duration: match (messages.first(), messages.last()) {
                (Some(first), Some(last)) => Some((last.created_at - first.created_at).num_seconds()),
                _ => None,
            },
            session_rating: existing.as_ref().and_then(|t| t.session_rating),
            is_completed: true,
            created_at: existing.as_ref().map(|t| t.created_at).unwrap_or(now),
            updated_at: Some(now),
        };
        self.store.upsert_therapy_session(&record).await?;
        Ok(record)
    }

    pub async fn stats(&self) -> Result<ProcessingStats, ServerError> {
        Ok(ProcessingStats {
            total_conversations: self.store.count_conversations().await?,
            active_sessions: self.store.count_active_sessions().await?,
            topics_identified: self.topic_model().topics().len() as i64,
            patterns_detected: self.store.count_insights().await?,
        })
    }

    /// Cleans and annotates a dataset, then stores the new conversations.
    pub async fn import_dataset(&self, raw: &str) -> Result<ImportReport, ServerError> {
        let records = parse_records(raw).map_err(|e| ServerError::BadRequest(format!("invalid dataset: {e}")))?;
        let cleaned = DatasetCleaner::new()?.preprocess(&records);
        let now = Utc::now();

        let conversations: Vec<Conversation> = cleaned
            .iter()
            .map(|c| {
                let analysis = self.analyze(&c.user_message);
                let known_topic = (!analysis.topic.is_unknown()).then_some(&analysis.topic);
                Conversation {
                    conversation_id: c.conversation_id.clone(),
                    user_message: c.user_message.clone(),
                    therapist_response: c.therapist_response.clone(),
                    topic_id: known_topic.map(|t| t.topic_id),
                    topic: known_topic.map(|t| t.topic_name.clone()),
                    emotional_tone: Some(analysis.emotional_state.primary_emotion.clone()),
                    patterns: analysis.patterns.iter().map(|p| p.pattern.clone()).collect(),
                    created_at: now,
                }
            })
            .collect();

        let inserted = self.store.insert_conversations(&conversations).await?;
        let report = ImportReport {
            records: records.len(),
            cleaned: cleaned.len(),
            inserted,
        };
        tracing::info!(?report, "dataset imported");
        Ok(report)
    }

    /// Fits topics on the stored corpus, persists clusters and assignments
    /// and swaps the live model.
    pub async fn train_topics(&self) -> Result<TrainReport, ServerError> {
        let corpus = self.store.list_conversations().await?;
        if corpus.is_empty() {
            return Err(ServerError::BadRequest("No conversations to train on; import a dataset first".into()));
        }
        let docs: Vec<&str> = corpus.iter().map(|c| c.user_message.as_str()).collect();
        let fit = TopicModel::seeded().fit(&docs);

        let assignments: Vec<TopicAssignment> = corpus
            .iter()
            .zip(&fit.assignments)
            .map(|(c, &topic_id)| {
                let topic = fit.model.topics().iter().find(|t| t.id == topic_id);
                TopicAssignment {
                    conversation_id: c.conversation_id.clone(),
                    topic_id: topic.map(|t| t.id),
                    topic: topic.map(|t| t.name.clone()),
                }
            })
            .collect();

        self.store.replace_topics(fit.model.topics()).await?;
        self.store.assign_topics(&assignments).await?;
        let report = TrainReport {
            documents: corpus.len(),
            topics: fit.model.topics().len(),
            assigned: assignments.iter().filter(|a| a.topic_id.is_some()).count(),
        };
        self.set_topic_model(fit.model);
        tracing::info!(?report, "topic model trained");
        Ok(report)
    }

    /// Rebuilds the vector store from the corpus.
    pub async fn reindex(&self) -> Result<usize, ServerError> {
        let records: Vec<_> = self
            .store
            .list_conversations()
            .await?
            .iter()
            .map(Conversation::to_record)
            .collect();
        let n = self.vectors.reindex_conversations(&records).await?;
        tracing::info!(conversations = n, "vector store reindexed");
        Ok(n)
    }
}

fn first_user_mood<'a>(mut messages: impl Iterator<Item = &'a ChatMessage>) -> Option<String> {
    messages
        .find(|m| m.sender == clarity_types::Sender::User)
        .and_then(|m| m.emotional_state.clone())
}

/// Values in first-seen order without repeats.
fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .filter(|v| seen.insert(*v))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::Arc;

    use clarity_core::embedding::HashingEmbedder;
    use clarity_core::generation::{FALLBACK_RESPONSE, GenerationSettings};
    use clarity_core::llm::OpenAiChat;
    use clarity_core::openai::OpenAiConfig;
    use clarity_core::vector_store::LocalVectorStore;
    use clarity_types::Sender;

    use super::*;
    use crate::entities::test_support::memory_store;

    /// Offline service: in-memory database and vectors, no LLM key.
    pub async fn offline_service() -> TherapyService {
        service_with_llm(OpenAiConfig::default()).await
    }

    pub async fn service_with_llm(openai: OpenAiConfig) -> TherapyService {
        let store = memory_store().await;
        let vectors = Arc::new(LocalVectorStore::in_memory(Arc::new(HashingEmbedder::default())));
        let llm = Arc::new(OpenAiChat::new(openai, "gpt-4"));
        TherapyService::new(
            store,
            Analyzer::new().unwrap(),
            TopicModel::seeded(),
            vectors,
            ResponseGenerator::new(llm, GenerationSettings::default()),
            PipelineSettings::default(),
        )
    }

    pub fn user(id: &str) -> AuthUser {
        AuthUser {
            user_id: id.into(),
            email: format!("{id}@example.com"),
            user_metadata: serde_json::Value::Null,
        }
    }

    const DATASET: &str = r#"[
        {"Context": "I feel so anxious about my job, my boss keeps adding deadlines", "Response": "Work pressure like that is exhausting. It might help to list what is urgent and talk with your boss about priorities."},
        {"Context": "My partner and I keep fighting about small things in our relationship", "Response": "Frequent small fights often point to unmet needs. Consider setting aside calm time to talk about what each of you needs."},
        {"Context": "short", "Response": "too short to keep"}
    ]"#;

    #[tokio::test]
    async fn message_is_answered_and_persisted() {
        let service = offline_service().await;
        let req = ChatRequest::new("s-1", "I'm so anxious about my job, everything will be a disaster");
        let resp = service.process_message(&req, None).await.unwrap();

        assert_eq!(resp.content, FALLBACK_RESPONSE);
        assert_eq!(resp.session_id, "s-1");
        assert_eq!(resp.emotional_state.as_deref(), Some("anxiety"));

        let history = service.session_history("s-1", None).await.unwrap();
        assert_eq!(history.message_count, 2);
        assert_eq!(history.history[0].sender, Sender::User);
        assert_eq!(history.history[0].confidence_score, Some(1.0));
        assert_eq!(history.history[1].sender, Sender::Ai);
        assert_eq!(history.history[1].content, FALLBACK_RESPONSE);
        assert!(history.session_created.is_some());

        // user message was indexed for the session
        assert_eq!(service.vectors().stats().await.total_documents, 1);
    }

    #[tokio::test]
    async fn owned_session_is_private() {
        let service = offline_service().await;
        let alice = user("alice");
        service
            .process_message(&ChatRequest::new("s-1", "hello there, I need to talk"), Some(&alice))
            .await
            .unwrap();

        let bob = user("bob");
        let err = service
            .process_message(&ChatRequest::new("s-1", "let me in"), Some(&bob))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Forbidden(_)));
        assert!(matches!(
            service.session_history("s-1", None).await,
            Err(ServerError::Forbidden(_))
        ));
        assert!(matches!(
            service.delete_session("s-1", Some(&bob)).await,
            Err(ServerError::Forbidden(_))
        ));
        assert_eq!(service.session_history("s-1", Some(&alice)).await.unwrap().message_count, 2);
    }

    #[tokio::test]
    async fn unknown_session_has_empty_history_and_deletes_cleanly() {
        let service = offline_service().await;
        let history = service.session_history("nope", None).await.unwrap();
        assert_eq!(history, SessionHistory::empty());
        service.delete_session("nope", None).await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_messages_and_vectors() {
        let service = offline_service().await;
        service
            .process_message(&ChatRequest::new("s-1", "I feel lonely lately"), None)
            .await
            .unwrap();
        service.delete_session("s-1", None).await.unwrap();
        assert_eq!(service.session_history("s-1", None).await.unwrap().message_count, 0);
        assert_eq!(service.vectors().stats().await.total_documents, 0);
    }

    #[tokio::test]
    async fn import_train_reindex_and_retrieve() {
        let service = offline_service().await;
        let report = service.import_dataset(DATASET).await.unwrap();
        assert_eq!(report.records, 3);
        assert_eq!(report.cleaned, 2);
        assert_eq!(report.inserted, 2);
        // re-import skips existing ids
        assert_eq!(service.import_dataset(DATASET).await.unwrap().inserted, 0);

        let trained = service.train_topics().await.unwrap();
        assert_eq!(trained.documents, 2);
        assert!(trained.topics > 0);
        assert_eq!(service.store().list_topics().await.unwrap().len(), trained.topics);

        assert_eq!(service.reindex().await.unwrap(), 2);
        let analysis = service.analyze("my boss keeps piling deadlines on my job");
        let hits = service.retrieve("my boss keeps piling deadlines on my job", &analysis).await;
        assert!(!hits.is_empty());
        assert!(hits.len() <= RETRIEVED_KEEP);
        assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));

        let stats = service.stats().await.unwrap();
        assert_eq!(stats.total_conversations, 2);
    }

    #[tokio::test]
    async fn training_needs_a_corpus() {
        let service = offline_service().await;
        assert!(matches!(service.train_topics().await, Err(ServerError::BadRequest(_))));
    }

    #[tokio::test]
    async fn summary_is_stored_with_moods() {
        let service = offline_service().await;
        service
            .process_message(&ChatRequest::new("s-1", "I'm terrified and anxious about tomorrow"), None)
            .await
            .unwrap();
        let record = service.summarize_session("s-1", None).await.unwrap();
        assert!(record.is_completed);
        assert!(record.session_summary.is_some());
        assert_eq!(record.mood_before.as_deref(), Some("anxiety"));
        assert_eq!(record.session_duration, Some(0));

        let again = service.summarize_session("s-1", None).await.unwrap();
        assert_eq!(again.id, record.id);
        assert!(matches!(
            service.summarize_session("missing", None).await,
            Err(ServerError::NotFound(_))
        ));
    }
}
