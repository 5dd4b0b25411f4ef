// Relational store for sessions, events, attempts, and attributions
//
// SQLite with WAL mode behind a tokio mutex. Every mutation goes through
// the single guarded connection, so same-session score increments are
// serialized; the increment itself is additive SQL
// (`engagement_score = engagement_score + ?`) rather than read-modify-write
// in application code, so a lost update cannot occur even if a second
// connection is ever pointed at the same file.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub topic_id: Option<String>,
    pub lesson_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub engagement_score: u32,
    pub quiz_triggered: bool,
    pub practice_triggered: bool,
    pub practice_required_at: Option<DateTime<Utc>>,
    pub practice_completed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessageRecord {
    pub message_id: String,
    pub session_id: String,
    pub role: String,
    pub provider: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptKind {
    Quiz,
    Practice,
}

impl AttemptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quiz => "quiz",
            Self::Practice => "practice",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub attempt_id: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub kind: AttemptKind,
    pub score: Option<f64>,
    pub passed: bool,
    pub time_spent_seconds: Option<i64>,
    pub attribution_chat_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Attribution row as persisted. The typed confidence tier lives in the
/// attribution module; the store keeps the string form.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAttribution {
    pub attempt_id: String,
    pub provider: String,
    pub confidence_tier: String,
    pub source_chat_message_id: Option<String>,
    pub delay_seconds: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of applying an engagement event to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum EventApply {
    Applied(SessionRecord),
    NotFound,
    /// Session is ended; no further score mutation is accepted.
    Ended,
}

pub struct Store {
    db: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        let schema = include_str!("schema.sql");
        conn.execute_batch(schema)?;
        tracing::info!("store initialized");
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    // ── sessions ─────────────────────────────────────────────────────────

    pub async fn create_session(
        &self,
        user_id: &str,
        topic_id: Option<&str>,
        lesson_id: Option<&str>,
    ) -> Result<SessionRecord> {
        let record = SessionRecord {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            topic_id: topic_id.map(str::to_string),
            lesson_id: lesson_id.map(str::to_string),
            started_at: Utc::now(),
            ended_at: None,
            engagement_score: 0,
            quiz_triggered: false,
            practice_triggered: false,
            practice_required_at: None,
            practice_completed: false,
        };
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO sessions (session_id, user_id, topic_id, lesson_id, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.session_id,
                record.user_id,
                record.topic_id,
                record.lesson_id,
                record.started_at.to_rfc3339(),
            ],
        )?;
        Ok(record)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let conn = self.db.lock().await;
        let record = conn
            .query_row(
                "SELECT session_id, user_id, topic_id, lesson_id, started_at, ended_at,
                        engagement_score, quiz_triggered, practice_triggered,
                        practice_required_at, practice_completed
                 FROM sessions WHERE session_id = ?1",
                params![session_id],
                row_to_session,
            )
            .optional()?;
        Ok(record)
    }

    /// Soft-end a session. Idempotent: an already-ended session keeps its
    /// original `ended_at`.
    pub async fn end_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        {
            let conn = self.db.lock().await;
            conn.execute(
                "UPDATE sessions SET ended_at = ?1
                 WHERE session_id = ?2 AND ended_at IS NULL",
                params![Utc::now().to_rfc3339(), session_id],
            )?;
        }
        self.get_session(session_id).await
    }

    /// Apply an engagement event: append the event row, bump the score
    /// additively, and latch any newly crossed threshold flags, all within
    /// one transaction.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_engagement_event(
        &self,
        session_id: &str,
        kind: &str,
        points: u32,
        metadata: Option<&str>,
        quiz_threshold: u32,
        practice_threshold: u32,
        marks_practice_completed: bool,
    ) -> Result<EventApply> {
        let now = Utc::now();
        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;

        let ended: Option<Option<String>> = tx
            .query_row(
                "SELECT ended_at FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        match ended {
            None => return Ok(EventApply::NotFound),
            Some(Some(_)) => return Ok(EventApply::Ended),
            Some(None) => {}
        }

        tx.execute(
            "INSERT INTO engagement_events (event_id, session_id, kind, points, occurred_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Uuid::new_v4().to_string(),
                session_id,
                kind,
                points,
                now.to_rfc3339(),
                metadata,
            ],
        )?;

        tx.execute(
            "UPDATE sessions SET engagement_score = engagement_score + ?1 WHERE session_id = ?2",
            params![points, session_id],
        )?;

        // Latch flags exactly once. Both thresholds are checked on every
        // event, so a single large event can cross both in one step.
        tx.execute(
            "UPDATE sessions SET quiz_triggered = 1
             WHERE session_id = ?1 AND quiz_triggered = 0 AND engagement_score >= ?2",
            params![session_id, quiz_threshold],
        )?;
        tx.execute(
            "UPDATE sessions SET practice_triggered = 1, practice_required_at = ?2
             WHERE session_id = ?1 AND practice_triggered = 0 AND engagement_score >= ?3",
            params![session_id, now.to_rfc3339(), practice_threshold],
        )?;

        if marks_practice_completed {
            tx.execute(
                "UPDATE sessions SET practice_completed = 1
                 WHERE session_id = ?1 AND practice_completed = 0",
                params![session_id],
            )?;
        }

        let record = tx.query_row(
            "SELECT session_id, user_id, topic_id, lesson_id, started_at, ended_at,
                    engagement_score, quiz_triggered, practice_triggered,
                    practice_required_at, practice_completed
             FROM sessions WHERE session_id = ?1",
            params![session_id],
            row_to_session,
        )?;

        tx.commit()?;
        Ok(EventApply::Applied(record))
    }

    // ── provider usage ───────────────────────────────────────────────────

    pub async fn record_provider_use(&self, session_id: &str, provider: &str) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO session_providers (session_id, provider) VALUES (?1, ?2)",
            params![session_id, provider],
        )?;
        Ok(())
    }

    pub async fn providers_used(&self, session_id: &str) -> Result<Vec<String>> {
        let conn = self.db.lock().await;
        let mut stmt = conn
            .prepare("SELECT provider FROM session_providers WHERE session_id = ?1 ORDER BY provider")?;
        let providers = stmt
            .query_map(params![session_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(providers)
    }

    // ── chat messages ────────────────────────────────────────────────────

    pub async fn insert_chat_message(
        &self,
        session_id: &str,
        role: &str,
        provider: Option<&str>,
        content: &str,
    ) -> Result<ChatMessageRecord> {
        let record = ChatMessageRecord {
            message_id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role: role.to_string(),
            provider: provider.map(str::to_string),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO chat_messages (message_id, session_id, role, provider, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.message_id,
                record.session_id,
                record.role,
                record.provider,
                record.content,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(record)
    }

    pub async fn get_chat_message(&self, message_id: &str) -> Result<Option<ChatMessageRecord>> {
        let conn = self.db.lock().await;
        let record = conn
            .query_row(
                "SELECT message_id, session_id, role, provider, content, created_at
                 FROM chat_messages WHERE message_id = ?1",
                params![message_id],
                row_to_message,
            )
            .optional()?;
        Ok(record)
    }

    /// Most recent assistant message at or before `cutoff` in the session.
    pub async fn latest_assistant_message_at_or_before(
        &self,
        session_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<ChatMessageRecord>> {
        let conn = self.db.lock().await;
        let record = conn
            .query_row(
                "SELECT message_id, session_id, role, provider, content, created_at
                 FROM chat_messages
                 WHERE session_id = ?1 AND role = 'assistant' AND created_at <= ?2
                 ORDER BY created_at DESC LIMIT 1",
                params![session_id, cutoff.to_rfc3339()],
                row_to_message,
            )
            .optional()?;
        Ok(record)
    }

    pub async fn session_has_chat_messages(&self, session_id: &str) -> Result<bool> {
        let conn = self.db.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chat_messages WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ── attempts & attributions ──────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_attempt(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        kind: AttemptKind,
        score: Option<f64>,
        passed: bool,
        time_spent_seconds: Option<i64>,
        attribution_chat_message_id: Option<&str>,
    ) -> Result<AttemptRecord> {
        let record = AttemptRecord {
            attempt_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.map(str::to_string),
            kind,
            score,
            passed,
            time_spent_seconds,
            attribution_chat_message_id: attribution_chat_message_id.map(str::to_string),
            created_at: Utc::now(),
        };
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO attempts (attempt_id, user_id, session_id, kind, score, passed,
                                   time_spent_seconds, attribution_chat_message_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.attempt_id,
                record.user_id,
                record.session_id,
                record.kind.as_str(),
                record.score,
                record.passed,
                record.time_spent_seconds,
                record.attribution_chat_message_id,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(record)
    }

    pub async fn get_attempt(&self, attempt_id: &str) -> Result<Option<AttemptRecord>> {
        let conn = self.db.lock().await;
        let record = conn
            .query_row(
                "SELECT attempt_id, user_id, session_id, kind, score, passed,
                        time_spent_seconds, attribution_chat_message_id, created_at
                 FROM attempts WHERE attempt_id = ?1",
                params![attempt_id],
                row_to_attempt,
            )
            .optional()?;
        Ok(record)
    }

    /// Append an attribution. The PRIMARY KEY on attempt_id enforces the
    /// once-per-attempt invariant at the storage layer.
    pub async fn insert_attribution(&self, attribution: &StoredAttribution) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO attributions (attempt_id, provider, confidence_tier,
                                       source_chat_message_id, delay_seconds, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                attribution.attempt_id,
                attribution.provider,
                attribution.confidence_tier,
                attribution.source_chat_message_id,
                attribution.delay_seconds,
                attribution.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_attribution(&self, attempt_id: &str) -> Result<Option<StoredAttribution>> {
        let conn = self.db.lock().await;
        let record = conn
            .query_row(
                "SELECT attempt_id, provider, confidence_tier, source_chat_message_id,
                        delay_seconds, created_at
                 FROM attributions WHERE attempt_id = ?1",
                params![attempt_id],
                |row| {
                    Ok(StoredAttribution {
                        attempt_id: row.get(0)?,
                        provider: row.get(1)?,
                        confidence_tier: row.get(2)?,
                        source_chat_message_id: row.get(3)?,
                        delay_seconds: row.get(4)?,
                        created_at: parse_ts(row, 5)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            }),
    }
}

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        session_id: row.get(0)?,
        user_id: row.get(1)?,
        topic_id: row.get(2)?,
        lesson_id: row.get(3)?,
        started_at: parse_ts(row, 4)?,
        ended_at: parse_opt_ts(row, 5)?,
        engagement_score: row.get::<_, i64>(6)? as u32,
        quiz_triggered: row.get::<_, i64>(7)? != 0,
        practice_triggered: row.get::<_, i64>(8)? != 0,
        practice_required_at: parse_opt_ts(row, 9)?,
        practice_completed: row.get::<_, i64>(10)? != 0,
    })
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<ChatMessageRecord> {
    Ok(ChatMessageRecord {
        message_id: row.get(0)?,
        session_id: row.get(1)?,
        role: row.get(2)?,
        provider: row.get(3)?,
        content: row.get(4)?,
        created_at: parse_ts(row, 5)?,
    })
}

fn row_to_attempt(row: &Row<'_>) -> rusqlite::Result<AttemptRecord> {
    let kind: String = row.get(3)?;
    Ok(AttemptRecord {
        attempt_id: row.get(0)?,
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        kind: if kind == "practice" {
            AttemptKind::Practice
        } else {
            AttemptKind::Quiz
        },
        score: row.get(4)?,
        passed: row.get::<_, i64>(5)? != 0,
        time_spent_seconds: row.get(6)?,
        attribution_chat_message_id: row.get(7)?,
        created_at: parse_ts(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_session() -> (Store, SessionRecord) {
        let store = Store::open_in_memory().unwrap();
        let session = store
            .create_session("learner-1", Some("topic-1"), None)
            .await
            .unwrap();
        (store, session)
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (store, session) = store_with_session().await;
        let loaded = store.get_session(&session.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.user_id, "learner-1");
        assert_eq!(loaded.engagement_score, 0);
        assert!(!loaded.quiz_triggered);
        assert!(loaded.ended_at.is_none());
    }

    #[tokio::test]
    async fn test_apply_event_increments_and_latches() {
        let (store, session) = store_with_session().await;
        let applied = store
            .apply_engagement_event(&session.session_id, "message", 29, None, 30, 70, false)
            .await
            .unwrap();
        let record = match applied {
            EventApply::Applied(r) => r,
            other => panic!("expected Applied, got {other:?}"),
        };
        assert_eq!(record.engagement_score, 29);
        assert!(!record.quiz_triggered && !record.practice_triggered);

        let applied = store
            .apply_engagement_event(&session.session_id, "message", 1, None, 30, 70, false)
            .await
            .unwrap();
        if let EventApply::Applied(record) = applied {
            assert_eq!(record.engagement_score, 30);
            assert!(record.quiz_triggered);
            assert!(!record.practice_triggered);
        } else {
            panic!("expected Applied");
        }
    }

    #[tokio::test]
    async fn test_single_large_event_crosses_both_thresholds() {
        let (store, session) = store_with_session().await;
        let applied = store
            .apply_engagement_event(&session.session_id, "interaction", 70, None, 30, 70, false)
            .await
            .unwrap();
        if let EventApply::Applied(record) = applied {
            assert!(record.quiz_triggered);
            assert!(record.practice_triggered);
            assert!(record.practice_required_at.is_some());
        } else {
            panic!("expected Applied");
        }
    }

    #[tokio::test]
    async fn test_events_rejected_after_end() {
        let (store, session) = store_with_session().await;
        store.end_session(&session.session_id).await.unwrap();
        let applied = store
            .apply_engagement_event(&session.session_id, "message", 5, None, 30, 70, false)
            .await
            .unwrap();
        assert_eq!(applied, EventApply::Ended);
    }

    #[tokio::test]
    async fn test_unknown_session_not_found() {
        let store = Store::open_in_memory().unwrap();
        let applied = store
            .apply_engagement_event("nope", "message", 5, None, 30, 70, false)
            .await
            .unwrap();
        assert_eq!(applied, EventApply::NotFound);
    }

    #[tokio::test]
    async fn test_end_session_is_idempotent() {
        let (store, session) = store_with_session().await;
        let first = store.end_session(&session.session_id).await.unwrap().unwrap();
        let second = store.end_session(&session.session_id).await.unwrap().unwrap();
        assert_eq!(first.ended_at, second.ended_at);
    }

    #[tokio::test]
    async fn test_provider_use_set_semantics() {
        let (store, session) = store_with_session().await;
        store
            .record_provider_use(&session.session_id, "gemini")
            .await
            .unwrap();
        store
            .record_provider_use(&session.session_id, "gemini")
            .await
            .unwrap();
        store
            .record_provider_use(&session.session_id, "together")
            .await
            .unwrap();
        let providers = store.providers_used(&session.session_id).await.unwrap();
        assert_eq!(providers, vec!["gemini".to_string(), "together".to_string()]);
    }

    #[tokio::test]
    async fn test_latest_assistant_message_query() {
        let (store, session) = store_with_session().await;
        store
            .insert_chat_message(&session.session_id, "user", None, "q1")
            .await
            .unwrap();
        let m1 = store
            .insert_chat_message(&session.session_id, "assistant", Some("gemini"), "a1")
            .await
            .unwrap();
        let found = store
            .latest_assistant_message_at_or_before(&session.session_id, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.message_id, m1.message_id);

        // A cutoff before the message finds nothing
        let early = m1.created_at - chrono::Duration::seconds(10);
        let none = store
            .latest_assistant_message_at_or_before(&session.session_id, early)
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_attribution_unique_per_attempt() {
        let (store, session) = store_with_session().await;
        let attempt = store
            .insert_attempt(
                "learner-1",
                Some(&session.session_id),
                AttemptKind::Quiz,
                Some(0.8),
                true,
                Some(120),
                None,
            )
            .await
            .unwrap();

        let attribution = StoredAttribution {
            attempt_id: attempt.attempt_id.clone(),
            provider: "gemini".to_string(),
            confidence_tier: "session".to_string(),
            source_chat_message_id: None,
            delay_seconds: None,
            created_at: Utc::now(),
        };
        store.insert_attribution(&attribution).await.unwrap();
        // Second insert violates the primary key
        assert!(store.insert_attribution(&attribution).await.is_err());

        let loaded = store
            .get_attribution(&attempt.attempt_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.provider, "gemini");
    }
}
