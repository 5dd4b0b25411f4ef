// TutorService, the inbound operation surface
//
// Wires normalizer → prompt → adapter → resilient caller → fallback for the
// tutoring calls, and exposes the engagement and attribution entry points.
// The external HTTP layer owns routing/validation idioms and calls these
// methods directly.
//
// Availability policy: for the tutoring endpoints the learner always gets
// natural-language text. Configuration problems and exhausted transient
// failures degrade to the deterministic fallback; permanent provider
// failures are logged with full request diagnostics and then also degrade.
// `evaluate_code` is the exception: a permanent failure there propagates,
// since it signals a bug the operator must see.

use std::sync::Arc;

use serde_json::Value;

use crate::attribution::{Attribution, AttributionResolver};
use crate::config::Config;
use crate::conversation::{self, Role};
use crate::engagement::{EngagementEngine, EventKind, EventOutcome};
use crate::error::{Error, Result};
use crate::prompt::{
    build_code_eval_prompt, build_system_prompt, GenerationPreferences, LessonContext,
};
use crate::providers::{
    create_adapter, fallback_response, CallOutcome, ChatRequest, ProviderAdapter, ResilientCaller,
};
use crate::store::{SessionRecord, Store};

pub struct TutorService {
    adapter: Option<Arc<dyn ProviderAdapter>>,
    caller: ResilientCaller,
    engagement: EngagementEngine,
    resolver: AttributionResolver,
    store: Arc<Store>,
}

impl TutorService {
    pub fn new(config: Config) -> Result<Self> {
        let store = Arc::new(Store::open(&config.db_path).map_err(Error::Storage)?);
        Self::with_store(config, store)
    }

    /// Build against an existing store (tests use an in-memory one).
    pub fn with_store(config: Config, store: Arc<Store>) -> Result<Self> {
        // A broken provider configuration must not take the tutor down:
        // surface it in the log, then serve fallback text until fixed.
        let adapter = match config.providers.first() {
            Some(entry) => match create_adapter(entry) {
                Ok(adapter) => Some(adapter),
                Err(e) => {
                    tracing::error!(error = %e, "provider configuration unusable; serving fallback only");
                    None
                }
            },
            None => {
                tracing::error!("no providers configured; serving fallback only");
                None
            }
        };

        let caller = ResilientCaller::new(config.retry.to_policy())
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            adapter,
            caller,
            engagement: EngagementEngine::new(store.clone(), config.thresholds),
            resolver: AttributionResolver::new(store.clone()),
            store,
        })
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.adapter.as_deref().map(|a| a.name())
    }

    // ── tutoring ─────────────────────────────────────────────────────────

    pub async fn get_response(
        &self,
        question: &str,
        history: &[Value],
        prefs: &GenerationPreferences,
        topic: Option<&str>,
    ) -> Result<String> {
        self.respond(question, history, prefs, topic, None).await
    }

    pub async fn get_response_with_context(
        &self,
        question: &str,
        history: &[Value],
        prefs: &GenerationPreferences,
        topic: Option<&str>,
        lesson: &LessonContext,
    ) -> Result<String> {
        self.respond(question, history, prefs, topic, Some(lesson))
            .await
    }

    async fn respond(
        &self,
        question: &str,
        history: &[Value],
        prefs: &GenerationPreferences,
        topic: Option<&str>,
        lesson: Option<&LessonContext>,
    ) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::validation("question must be a non-empty string"));
        }

        let mut normalized = conversation::normalize(history);
        normalized.push_question(question);

        let system = build_system_prompt(prefs, topic, lesson);
        let request = ChatRequest::new(normalized.turns)
            .with_system(system)
            .with_max_tokens(prefs.response_length.max_tokens());

        let adapter = match &self.adapter {
            Some(adapter) => adapter,
            None => return Ok(fallback_response(question, topic)),
        };

        match self.caller.call(adapter.as_ref(), &request).await {
            Ok(CallOutcome::Success(text)) => Ok(text),
            Ok(CallOutcome::FallbackRequested) => Ok(fallback_response(question, topic)),
            Err(e) => {
                // Already logged with diagnostics by the caller; the learner
                // still gets prose.
                tracing::error!(error = %e, "tutoring call failed permanently; serving fallback");
                Ok(fallback_response(question, topic))
            }
        }
    }

    /// Feedback on learner code. The execution result (stdout/stderr) comes
    /// from the external sandbox collaborator. Unlike the tutoring calls,
    /// a permanent provider failure propagates here.
    pub async fn evaluate_code(
        &self,
        code: &str,
        stdout: Option<&str>,
        stderr: Option<&str>,
        topic: Option<&str>,
    ) -> Result<String> {
        if code.trim().is_empty() {
            return Err(Error::validation("code must be a non-empty string"));
        }

        let prompt = build_code_eval_prompt(code, stdout, stderr, topic);
        let request = ChatRequest::new(vec![crate::conversation::ConversationTurn::user(prompt)])
            .with_system(
                "You are a programming tutor reviewing a learner's code submission.".to_string(),
            )
            .with_max_tokens(800);

        let adapter = match &self.adapter {
            Some(adapter) => adapter,
            None => return Ok(fallback_response("", topic)),
        };

        match self.caller.call(adapter.as_ref(), &request).await? {
            CallOutcome::Success(text) => Ok(text),
            CallOutcome::FallbackRequested => Ok(fallback_response("", topic)),
        }
    }

    // ── engagement & progression ─────────────────────────────────────────

    pub async fn start_session(
        &self,
        user_id: &str,
        topic_id: Option<&str>,
        lesson_id: Option<&str>,
    ) -> Result<SessionRecord> {
        self.engagement.start_session(user_id, topic_id, lesson_id).await
    }

    pub async fn record_engagement_event(
        &self,
        session_id: &str,
        kind: EventKind,
        points: Option<u32>,
        metadata: Option<&str>,
    ) -> Result<EventOutcome> {
        self.engagement
            .record_event(session_id, kind, points, metadata)
            .await
    }

    pub async fn end_session(&self, session_id: &str) -> Result<SessionRecord> {
        self.engagement.end_session(session_id).await
    }

    /// Current progression snapshot for UI/telemetry, served from the
    /// engagement cache when warm.
    pub async fn session_progress(
        &self,
        session_id: &str,
    ) -> Result<Option<crate::engagement::SessionProgress>> {
        self.engagement.progress(session_id).await
    }

    /// Persist one chat turn. Assistant turns carrying a provider tag also
    /// update the session's providers-used set, which the attribution
    /// cascade reads later.
    pub async fn record_chat_message(
        &self,
        session_id: &str,
        role: Role,
        provider: Option<&str>,
        content: &str,
    ) -> Result<String> {
        let role_str = match role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        let message = self
            .store
            .insert_chat_message(session_id, role_str, provider, content)
            .await?;
        if role == Role::Assistant {
            if let Some(provider) = provider {
                self.store.record_provider_use(session_id, provider).await?;
            }
        }
        Ok(message.message_id)
    }

    // ── attribution ──────────────────────────────────────────────────────

    pub async fn resolve_attribution(&self, attempt_id: &str) -> Result<Attribution> {
        self.resolver.resolve(attempt_id).await
    }
}
