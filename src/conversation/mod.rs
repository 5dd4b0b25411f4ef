// Conversation history normalization
//
// Chat history arrives from several frontend generations and stores, each
// with its own record shape (`role`/`content`, `sender`/`message`, or ad hoc
// keys like `question`/`answer`). This module collapses all of them into an
// ordered sequence of (role, text) turns that every provider adapter can
// consume. Normalization is best-effort: records that match no known shape
// are skipped, never an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One normalized message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Result of normalizing a raw history.
#[derive(Debug, Clone, Default)]
pub struct NormalizedHistory {
    pub turns: Vec<ConversationTurn>,
    /// Records that matched no shape or had empty content. Diagnostic only.
    pub skipped: usize,
}

impl NormalizedHistory {
    /// Append the learner's current question unless it exactly duplicates
    /// the last user turn. Equality is checked post-normalization; fuzzy
    /// substring containment would silently drop genuinely new questions.
    pub fn push_question(&mut self, question: &str) {
        let question = question.trim();
        if question.is_empty() {
            return;
        }
        let duplicate = self
            .turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.text == question)
            .unwrap_or(false);
        if !duplicate {
            self.turns.push(ConversationTurn::user(question));
        }
    }
}

/// Normalize an arbitrary list of historical message records.
///
/// Shape matchers are tried in priority order; the first match wins.
/// After assembly, any leading run of assistant turns is trimmed because
/// providers commonly reject histories that do not open with a user turn.
pub fn normalize(records: &[Value]) -> NormalizedHistory {
    let mut history = NormalizedHistory::default();

    for record in records {
        match match_record(record) {
            Some(turn) => history.turns.push(turn),
            None => history.skipped += 1,
        }
    }

    // Trim leading assistant-only turns.
    let first_user = history
        .turns
        .iter()
        .position(|t| t.role == Role::User)
        .unwrap_or(history.turns.len());
    if first_user > 0 {
        history.turns.drain(..first_user);
    }

    if history.skipped > 0 {
        tracing::debug!(
            skipped = history.skipped,
            kept = history.turns.len(),
            "dropped unparseable history records"
        );
    }

    history
}

/// Shape matchers, tried in order. Each is a pure `record -> Option<turn>`.
fn match_record(record: &Value) -> Option<ConversationTurn> {
    let obj = record.as_object()?;

    for matcher in [by_role_field, by_sender_field, by_structural_keys] {
        if let Some(turn) = matcher(obj) {
            return Some(turn);
        }
    }
    None
}

type Object = serde_json::Map<String, Value>;

/// Shape 1: explicit `role` field. "user" (case-insensitive) maps to User,
/// anything else ("assistant", "model", "system", ...) to Assistant.
fn by_role_field(obj: &Object) -> Option<ConversationTurn> {
    let role = obj.get("role")?.as_str()?;
    let text = content_text(obj)?;
    let role = if role.eq_ignore_ascii_case("user") {
        Role::User
    } else {
        Role::Assistant
    };
    Some(ConversationTurn { role, text })
}

/// Shape 2: `sender` field with a fixed mapping table. Unknown senders
/// default to Assistant (a tutor frontend labels its own bot freely).
fn by_sender_field(obj: &Object) -> Option<ConversationTurn> {
    let sender = obj.get("sender")?.as_str()?;
    let text = content_text(obj)?;
    let role = match sender.to_ascii_lowercase().as_str() {
        "user" => Role::User,
        "assistant" | "ai" | "bot" | "gemini" | "together" => Role::Assistant,
        _ => Role::Assistant,
    };
    Some(ConversationTurn { role, text })
}

const USER_KEYS: &[&str] = &["user", "question", "query", "input"];
const ASSISTANT_KEYS: &[&str] = &["assistant", "ai", "bot", "answer", "response", "reply"];

/// Shape 3: structural inference. The presence of a user-ish or
/// assistant-ish key implies the role, and that key's value is the text.
fn by_structural_keys(obj: &Object) -> Option<ConversationTurn> {
    for key in USER_KEYS {
        if let Some(value) = obj.get(*key) {
            if let Some(text) = render_content(value) {
                return Some(ConversationTurn::user(text));
            }
        }
    }
    for key in ASSISTANT_KEYS {
        if let Some(value) = obj.get(*key) {
            if let Some(text) = render_content(value) {
                return Some(ConversationTurn::assistant(text));
            }
        }
    }
    None
}

/// Pull text out of the conventional content keys.
fn content_text(obj: &Object) -> Option<String> {
    for key in ["content", "message", "text"] {
        if let Some(value) = obj.get(key) {
            if let Some(text) = render_content(value) {
                return Some(text);
            }
        }
    }
    None
}

/// Render a content value to non-empty text. Structured content is encoded
/// as compact JSON rather than dropped; whitespace-only text drops the turn.
fn render_content(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => return None,
        other => serde_json::to_string(other).ok()?,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_content_shape() {
        let records = vec![
            json!({"role": "USER", "content": "hi"}),
            json!({"role": "assistant", "content": "hello"}),
        ];
        let history = normalize(&records);
        assert_eq!(history.turns.len(), 2);
        assert_eq!(history.turns[0], ConversationTurn::user("hi"));
        assert_eq!(history.turns[1].role, Role::Assistant);
    }

    #[test]
    fn test_sender_message_shape() {
        let records = vec![
            json!({"sender": "user", "message": "what is a loop?"}),
            json!({"sender": "gemini", "message": "a loop repeats"}),
            json!({"sender": "somebody-else", "text": "mystery"}),
        ];
        let history = normalize(&records);
        assert_eq!(history.turns[0].role, Role::User);
        assert_eq!(history.turns[1].role, Role::Assistant);
        // Unknown senders default to Assistant
        assert_eq!(history.turns[2].role, Role::Assistant);
    }

    #[test]
    fn test_structural_inference_shape() {
        let records = vec![
            json!({"question": "why rust?"}),
            json!({"answer": "memory safety"}),
            json!({"reply": "anything else?"}),
        ];
        let history = normalize(&records);
        assert_eq!(history.turns.len(), 3);
        assert_eq!(history.turns[0].role, Role::User);
        assert_eq!(history.turns[1].role, Role::Assistant);
        assert_eq!(history.turns[2].role, Role::Assistant);
    }

    #[test]
    fn test_unmatched_records_skipped_not_error() {
        let records = vec![
            json!({"weird": "shape"}),
            json!(42),
            json!({"role": "user", "content": "kept"}),
        ];
        let history = normalize(&records);
        assert_eq!(history.turns.len(), 1);
        assert_eq!(history.skipped, 2);
    }

    #[test]
    fn test_empty_and_whitespace_content_dropped() {
        let records = vec![
            json!({"role": "user", "content": ""}),
            json!({"role": "user", "content": "   "}),
            json!({"role": "user", "content": null}),
            json!({"sender": "user", "message": "real"}),
        ];
        let history = normalize(&records);
        assert_eq!(history.turns.len(), 1);
        assert_eq!(history.turns[0].text, "real");
        assert_eq!(history.skipped, 3);
    }

    #[test]
    fn test_structured_content_rendered_as_json() {
        let records = vec![json!({"role": "user", "content": {"parts": ["a", "b"]}})];
        let history = normalize(&records);
        assert_eq!(history.turns.len(), 1);
        assert!(history.turns[0].text.contains("parts"));
    }

    #[test]
    fn test_leading_assistant_turns_trimmed() {
        let records = vec![
            json!({"role": "assistant", "content": "welcome!"}),
            json!({"role": "assistant", "content": "ask me anything"}),
            json!({"role": "user", "content": "ok"}),
            json!({"role": "assistant", "content": "great"}),
        ];
        let history = normalize(&records);
        assert_eq!(history.turns.len(), 2);
        assert_eq!(history.turns[0].role, Role::User);
    }

    #[test]
    fn test_all_assistant_history_trims_to_empty() {
        let records = vec![json!({"role": "assistant", "content": "hello"})];
        let history = normalize(&records);
        assert!(history.turns.is_empty());
    }

    #[test]
    fn test_never_starts_with_assistant_across_shapes() {
        let records = vec![
            json!({"sender": "bot", "message": "greetings"}),
            json!({"answer": "the answer"}),
            json!({"question": "a question"}),
        ];
        let history = normalize(&records);
        assert_eq!(history.turns.first().map(|t| t.role), Some(Role::User));
        for turn in &history.turns {
            assert!(!turn.text.is_empty());
        }
    }

    #[test]
    fn test_push_question_appends() {
        let mut history = normalize(&[json!({"role": "user", "content": "first"})]);
        history.push_question("second");
        assert_eq!(history.turns.len(), 2);
        assert_eq!(history.turns[1], ConversationTurn::user("second"));
    }

    #[test]
    fn test_push_question_dedup_exact_only() {
        let mut history = normalize(&[
            json!({"role": "user", "content": "what is recursion?"}),
            json!({"role": "assistant", "content": "a function calling itself"}),
        ]);
        // Exact duplicate of the last user turn is suppressed
        history.push_question("what is recursion?");
        assert_eq!(history.turns.len(), 2);
        // A textually similar but different question is NOT suppressed
        history.push_question("what is recursion in Rust?");
        assert_eq!(history.turns.len(), 3);
    }

    #[test]
    fn test_push_question_ignores_blank() {
        let mut history = NormalizedHistory::default();
        history.push_question("   ");
        assert!(history.turns.is_empty());
    }
}
