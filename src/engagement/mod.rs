// Engagement scoring and two-stage unlock progression
//
// Every learner activity event adds points to a per-session score. The
// score drives two independently-unlockable stages: quizzes at one
// threshold, practice problems at a higher one. Both flags are monotone and
// score-based (not event-count-based), so a single large event can unlock
// both in one step. The store serializes same-session increments; the
// DashMap here is a read cache so "points remaining" queries never touch
// SQLite.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ThresholdSettings;
use crate::error::{Error, Result};
use crate::store::{EventApply, SessionRecord, Store};

/// Typed engagement event kinds with their default point values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    CodeExecution,
    Scroll,
    Interaction,
    Time,
    QuizCompletion,
    PracticeCompletion,
}

impl EventKind {
    pub fn default_points(&self) -> u32 {
        match self {
            Self::Message => 5,
            Self::CodeExecution => 10,
            Self::Scroll => 2,
            Self::Interaction => 3,
            Self::Time => 1,
            Self::QuizCompletion => 15,
            Self::PracticeCompletion => 20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::CodeExecution => "code_execution",
            Self::Scroll => "scroll",
            Self::Interaction => "interaction",
            Self::Time => "time",
            Self::QuizCompletion => "quiz_completion",
            Self::PracticeCompletion => "practice_completion",
        }
    }
}

/// Lifecycle phase of a session, derived from its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Started,
    QuizUnlocked,
    PracticeUnlocked,
    Ended,
}

/// Pure per-session progression state. The store row is the authority;
/// this mirrors it for threshold math and phase derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    pub score: u32,
    pub quiz_triggered: bool,
    pub practice_triggered: bool,
    pub ended: bool,
}

impl SessionProgress {
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            score: record.engagement_score,
            quiz_triggered: record.quiz_triggered,
            practice_triggered: record.practice_triggered,
            ended: record.ended_at.is_some(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.ended {
            SessionPhase::Ended
        } else if self.practice_triggered {
            SessionPhase::PracticeUnlocked
        } else if self.quiz_triggered {
            SessionPhase::QuizUnlocked
        } else {
            SessionPhase::Started
        }
    }

    /// Apply points and latch thresholds. Idempotent on already-set flags.
    /// Returns which flags this application newly crossed.
    pub fn apply(&mut self, points: u32, thresholds: &ThresholdSettings) -> Transition {
        debug_assert!(!self.ended);
        self.score = self.score.saturating_add(points);
        let crossed_quiz = !self.quiz_triggered && self.score >= thresholds.quiz;
        let crossed_practice = !self.practice_triggered && self.score >= thresholds.practice;
        self.quiz_triggered |= crossed_quiz;
        self.practice_triggered |= crossed_practice;
        Transition {
            crossed_quiz,
            crossed_practice,
        }
    }

    pub fn points_to_quiz(&self, thresholds: &ThresholdSettings) -> u32 {
        thresholds.quiz.saturating_sub(self.score)
    }

    pub fn points_to_practice(&self, thresholds: &ThresholdSettings) -> u32 {
        thresholds.practice.saturating_sub(self.score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub crossed_quiz: bool,
    pub crossed_practice: bool,
}

/// Result of recording one engagement event, for the caller and telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventOutcome {
    pub score: u32,
    pub quiz_unlocked: bool,
    pub practice_unlocked: bool,
    /// Points still needed to the next threshold; 0 once crossed.
    pub points_to_quiz: u32,
    pub points_to_practice: u32,
}

pub struct EngagementEngine {
    store: Arc<Store>,
    thresholds: ThresholdSettings,
    cache: DashMap<String, SessionProgress>,
}

impl EngagementEngine {
    pub fn new(store: Arc<Store>, thresholds: ThresholdSettings) -> Self {
        Self {
            store,
            thresholds,
            cache: DashMap::new(),
        }
    }

    pub fn thresholds(&self) -> &ThresholdSettings {
        &self.thresholds
    }

    pub async fn start_session(
        &self,
        user_id: &str,
        topic_id: Option<&str>,
        lesson_id: Option<&str>,
    ) -> Result<SessionRecord> {
        let record = self
            .store
            .create_session(user_id, topic_id, lesson_id)
            .await?;
        self.cache.insert(
            record.session_id.clone(),
            SessionProgress::from_record(&record),
        );
        tracing::info!(session_id = %record.session_id, user_id, "session started");
        Ok(record)
    }

    /// Record one event: append it, bump the score, latch thresholds.
    /// `points` overrides the kind's default when given.
    pub async fn record_event(
        &self,
        session_id: &str,
        kind: EventKind,
        points: Option<u32>,
        metadata: Option<&str>,
    ) -> Result<EventOutcome> {
        let points = points.unwrap_or_else(|| kind.default_points());

        let applied = self
            .store
            .apply_engagement_event(
                session_id,
                kind.as_str(),
                points,
                metadata,
                self.thresholds.quiz,
                self.thresholds.practice,
                kind == EventKind::PracticeCompletion,
            )
            .await?;

        let record = match applied {
            EventApply::Applied(record) => record,
            EventApply::NotFound => {
                return Err(Error::validation(format!("unknown session: {session_id}")))
            }
            EventApply::Ended => {
                return Err(Error::validation(format!(
                    "session {session_id} has ended; events are no longer accepted"
                )))
            }
        };

        let progress = SessionProgress::from_record(&record);
        if progress.quiz_triggered && !self.cached_flag(session_id, |p| p.quiz_triggered) {
            tracing::info!(session_id, score = progress.score, "quiz unlocked");
        }
        if progress.practice_triggered && !self.cached_flag(session_id, |p| p.practice_triggered) {
            tracing::info!(session_id, score = progress.score, "practice unlocked");
        }
        self.cache.insert(session_id.to_string(), progress);

        Ok(EventOutcome {
            score: progress.score,
            quiz_unlocked: progress.quiz_triggered,
            practice_unlocked: progress.practice_triggered,
            points_to_quiz: progress.points_to_quiz(&self.thresholds),
            points_to_practice: progress.points_to_practice(&self.thresholds),
        })
    }

    pub async fn end_session(&self, session_id: &str) -> Result<SessionRecord> {
        let record = self
            .store
            .end_session(session_id)
            .await?
            .ok_or_else(|| Error::validation(format!("unknown session: {session_id}")))?;
        self.cache
            .insert(session_id.to_string(), SessionProgress::from_record(&record));
        tracing::info!(session_id, "session ended");
        Ok(record)
    }

    /// Cached progress, falling back to the store when the session was
    /// started by another process.
    pub async fn progress(&self, session_id: &str) -> Result<Option<SessionProgress>> {
        if let Some(progress) = self.cache.get(session_id) {
            return Ok(Some(*progress));
        }
        let record = self.store.get_session(session_id).await?;
        Ok(record.map(|r| {
            let progress = SessionProgress::from_record(&r);
            self.cache.insert(session_id.to_string(), progress);
            progress
        }))
    }

    fn cached_flag(&self, session_id: &str, f: impl Fn(&SessionProgress) -> bool) -> bool {
        self.cache.get(session_id).map(|p| f(&p)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> ThresholdSettings {
        ThresholdSettings::default()
    }

    fn fresh() -> SessionProgress {
        SessionProgress {
            score: 0,
            quiz_triggered: false,
            practice_triggered: false,
            ended: false,
        }
    }

    #[test]
    fn test_score_below_quiz_threshold_sets_nothing() {
        let mut p = fresh();
        for points in [5, 10, 10, 4] {
            p.apply(points, &thresholds());
        }
        assert_eq!(p.score, 29);
        assert!(!p.quiz_triggered && !p.practice_triggered);
        assert_eq!(p.points_to_quiz(&thresholds()), 1);
        assert_eq!(p.phase(), SessionPhase::Started);
    }

    #[test]
    fn test_exactly_quiz_threshold_unlocks_quiz_only() {
        let mut p = fresh();
        p.apply(29, &thresholds());
        let t = p.apply(1, &thresholds());
        assert!(t.crossed_quiz && !t.crossed_practice);
        assert!(p.quiz_triggered && !p.practice_triggered);
        assert_eq!(p.points_to_quiz(&thresholds()), 0);
        assert_eq!(p.points_to_practice(&thresholds()), 40);
        assert_eq!(p.phase(), SessionPhase::QuizUnlocked);
    }

    #[test]
    fn test_single_large_event_crosses_both() {
        let mut p = fresh();
        let t = p.apply(70, &thresholds());
        assert!(t.crossed_quiz && t.crossed_practice);
        assert!(p.quiz_triggered && p.practice_triggered);
        assert_eq!(p.phase(), SessionPhase::PracticeUnlocked);
    }

    #[test]
    fn test_flags_latch_exactly_once() {
        let mut p = fresh();
        p.apply(30, &thresholds());
        let t = p.apply(10, &thresholds());
        // Already above the quiz threshold; no re-crossing reported
        assert!(!t.crossed_quiz);
        assert!(p.quiz_triggered);
    }

    #[test]
    fn test_default_points_per_kind() {
        assert_eq!(EventKind::Message.default_points(), 5);
        assert_eq!(EventKind::CodeExecution.default_points(), 10);
        assert_eq!(EventKind::PracticeCompletion.default_points(), 20);
    }

    #[tokio::test]
    async fn test_engine_records_events_against_store() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let engine = EngagementEngine::new(store, thresholds());
        let session = engine.start_session("learner-1", None, None).await.unwrap();

        let outcome = engine
            .record_event(&session.session_id, EventKind::Message, None, None)
            .await
            .unwrap();
        assert_eq!(outcome.score, 5);
        assert!(!outcome.quiz_unlocked);
        assert_eq!(outcome.points_to_quiz, 25);

        let outcome = engine
            .record_event(&session.session_id, EventKind::Interaction, Some(65), None)
            .await
            .unwrap();
        assert_eq!(outcome.score, 70);
        assert!(outcome.quiz_unlocked && outcome.practice_unlocked);
    }

    #[tokio::test]
    async fn test_engine_rejects_events_after_end() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let engine = EngagementEngine::new(store, thresholds());
        let session = engine.start_session("learner-1", None, None).await.unwrap();
        engine.end_session(&session.session_id).await.unwrap();

        let result = engine
            .record_event(&session.session_id, EventKind::Message, None, None)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_engine_practice_completion_flag() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let engine = EngagementEngine::new(store.clone(), thresholds());
        let session = engine.start_session("learner-1", None, None).await.unwrap();

        engine
            .record_event(
                &session.session_id,
                EventKind::PracticeCompletion,
                None,
                None,
            )
            .await
            .unwrap();
        let record = store
            .get_session(&session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert!(record.practice_completed);
    }

    #[tokio::test]
    async fn test_engine_unknown_session_is_validation_error() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let engine = EngagementEngine::new(store, thresholds());
        let result = engine
            .record_event("missing", EventKind::Message, None, None)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
