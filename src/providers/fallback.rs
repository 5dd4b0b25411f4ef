// Deterministic fallback replies
//
// When every provider attempt is exhausted the learner still gets a
// topic-aware, natural-language reply. Categories are matched in a fixed
// order, first match wins, so identical (question, topic) pairs always
// produce the same template.

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Greeting,
    Explain,
    Interrogative,
    CodeRequest,
    ErrorDebug,
    Comparison,
    CreationRequest,
    BestPractice,
}

// Order matters: earlier categories shadow later ones.
static MATCHERS: Lazy<Vec<(Category, Regex)>> = Lazy::new(|| {
    vec![
        (
            Category::Greeting,
            Regex::new(r"(?i)^\s*(hi|hello|hey|good\s+(morning|afternoon|evening))\b").unwrap(),
        ),
        (
            Category::Explain,
            Regex::new(r"(?i)\b(explain|describe|elaborate|clarif(y|ies))\b").unwrap(),
        ),
        (
            Category::Interrogative,
            Regex::new(r"(?i)^\s*(how|what|why|when|where|who|which|can|could|does|do|is|are)\b")
                .unwrap(),
        ),
        (
            Category::CodeRequest,
            Regex::new(r"(?i)\b(write|show)\b.*\b(code|program|function|snippet)\b").unwrap(),
        ),
        (
            Category::ErrorDebug,
            Regex::new(r"(?i)\b(error|exception|bug|debug|crash|fail(s|ed|ing)?|not working)\b")
                .unwrap(),
        ),
        (
            Category::Comparison,
            Regex::new(r"(?i)\b(difference|versus|vs\.?|compare[ds]?|better than)\b").unwrap(),
        ),
        (
            Category::CreationRequest,
            Regex::new(r"(?i)\b(create|build|make|implement|develop)\b").unwrap(),
        ),
        (
            Category::BestPractice,
            Regex::new(r"(?i)\b(best\s+practices?|recommended|convention|idiomatic)\b").unwrap(),
        ),
    ]
});

/// Produce the fallback reply for a question. Pure and deterministic.
pub fn fallback_response(question: &str, topic: Option<&str>) -> String {
    let topic_phrase = topic
        .filter(|t| !t.trim().is_empty())
        .map(|t| format!(" about {}", t.trim()))
        .unwrap_or_default();

    let category = MATCHERS
        .iter()
        .find(|(_, re)| re.is_match(question))
        .map(|(cat, _)| *cat);

    match category {
        Some(Category::Greeting) => format!(
            "Hello! I'm having trouble reaching the AI service right now, but I'm still here \
             to help{topic_phrase}. Please try your question again in a moment."
        ),
        Some(Category::Explain) => format!(
            "I'd love to explain that{topic_phrase}, but the AI service is temporarily \
             unreachable. Please try again shortly; in the meantime, re-reading the lesson \
             material may help."
        ),
        Some(Category::Interrogative) => format!(
            "That's a good question{topic_phrase}. Unfortunately the AI service is temporarily \
             unavailable, so I can't give you a full answer right now. Please try again in a \
             minute."
        ),
        Some(Category::CodeRequest) => format!(
            "I can't generate code{topic_phrase} at the moment because the AI service is \
             unreachable. Please retry shortly; the lesson examples may be a useful starting \
             point meanwhile."
        ),
        Some(Category::ErrorDebug) => format!(
            "Debugging help{topic_phrase} is temporarily unavailable while the AI service is \
             down. Double-check the error message and line number, and try me again in a moment."
        ),
        Some(Category::Comparison) => format!(
            "Comparisons{topic_phrase} deserve a careful answer and the AI service is \
             temporarily unreachable. Please ask again shortly."
        ),
        Some(Category::CreationRequest) => format!(
            "I can't help build that{topic_phrase} right now; the AI service is temporarily \
             unavailable. Please try again in a few minutes."
        ),
        Some(Category::BestPractice) => format!(
            "Best-practice guidance{topic_phrase} is temporarily unavailable while the AI \
             service is unreachable. Please retry shortly."
        ),
        None => format!(
            "The AI tutoring service is temporarily unavailable{topic_phrase}. Please try \
             again in a few minutes."
        ),
    }
}
