// System prompt composition
//
// Pure string building: learner preferences, optional topic, and optional
// lesson context are rendered into a single system prompt with a fixed
// clause order, which keeps every preference combination unit-testable by
// substring assertion. No I/O happens here.

use serde::{Deserialize, Serialize};

/// Named response-length tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthTier {
    Brief,
    Medium,
    Detailed,
}

/// Requested response length: a named tier or an explicit token budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseLength {
    Tier(LengthTier),
    Tokens(u32),
}

impl ResponseLength {
    /// Map to a max-token budget. Named tiers are monotone
    /// (Brief < Medium < Detailed); raw numbers are clamped to [100, 2000].
    pub fn max_tokens(&self) -> u32 {
        match self {
            Self::Tier(LengthTier::Brief) => 300,
            Self::Tier(LengthTier::Medium) => 800,
            Self::Tier(LengthTier::Detailed) => 1500,
            Self::Tokens(n) => (*n).clamp(100, 2000),
        }
    }
}

impl Default for ResponseLength {
    fn default() -> Self {
        Self::Tier(LengthTier::Medium)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExpertiseLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationStyle {
    Analogy,
    StepByStep,
    Visual,
    #[default]
    None,
}

/// Learner-facing generation preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationPreferences {
    pub response_length: ResponseLength,
    pub include_code_examples: bool,
    pub explanation_detail: String,
    pub expertise_level: ExpertiseLevel,
    pub explanation_style: ExplanationStyle,
}

impl Default for GenerationPreferences {
    fn default() -> Self {
        Self {
            response_length: ResponseLength::default(),
            include_code_examples: true,
            explanation_detail: "balanced".to_string(),
            expertise_level: ExpertiseLevel::default(),
            explanation_style: ExplanationStyle::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StrugglePoint {
    pub concept: String,
    pub details: String,
}

/// Instructional context for the current lesson. Every field is optional;
/// whatever is present is rendered verbatim between sentinel markers so the
/// model can tell instruction apart from conversation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LessonContext {
    pub module_title: Option<String>,
    pub module_content: Option<String>,
    pub examples: Option<String>,
    pub key_points: Vec<String>,
    pub guidance_notes: Option<String>,
    pub teaching_strategy: Option<String>,
    pub common_misconceptions: Vec<String>,
    pub struggle_points: Vec<StrugglePoint>,
}

impl LessonContext {
    pub fn is_empty(&self) -> bool {
        self.module_title.is_none()
            && self.module_content.is_none()
            && self.examples.is_none()
            && self.key_points.is_empty()
            && self.guidance_notes.is_none()
            && self.teaching_strategy.is_none()
            && self.common_misconceptions.is_empty()
            && self.struggle_points.is_empty()
    }
}

pub const LESSON_CONTEXT_OPEN: &str = "=== LESSON CONTEXT ===";
pub const LESSON_CONTEXT_CLOSE: &str = "=== END LESSON CONTEXT ===";

/// Compose the system prompt. Clause order is fixed: role framing, topic,
/// lesson context, expertise level, code examples, explanation style,
/// closing redirect instruction.
pub fn build_system_prompt(
    prefs: &GenerationPreferences,
    topic: Option<&str>,
    lesson: Option<&LessonContext>,
) -> String {
    let mut prompt = String::from(
        "You are a patient programming tutor helping a learner build real understanding.",
    );

    if let Some(topic) = topic.filter(|t| !t.trim().is_empty()) {
        prompt.push_str(&format!(" The current topic is {}.", topic.trim()));
    }

    if let Some(lesson) = lesson.filter(|l| !l.is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(LESSON_CONTEXT_OPEN);
        prompt.push('\n');
        render_lesson(&mut prompt, lesson);
        prompt.push_str(LESSON_CONTEXT_CLOSE);
    }

    prompt.push_str(match prefs.expertise_level {
        ExpertiseLevel::Beginner => {
            "\n\nThe learner is a beginner: avoid jargon, define terms on first use."
        }
        ExpertiseLevel::Intermediate => {
            "\n\nThe learner is at an intermediate level: assume core concepts are familiar."
        }
        ExpertiseLevel::Advanced => {
            "\n\nThe learner is advanced: be precise and do not over-explain fundamentals."
        }
    });

    if prefs.include_code_examples {
        prompt.push_str(" Include short code examples where they clarify the point.");
    } else {
        prompt.push_str(" Explain in prose; do not include code examples.");
    }

    match prefs.explanation_style {
        ExplanationStyle::Analogy => {
            prompt.push_str(" Prefer explanations built on everyday analogies.")
        }
        ExplanationStyle::StepByStep => {
            prompt.push_str(" Explain step by step, numbering each stage.")
        }
        ExplanationStyle::Visual => {
            prompt.push_str(" Use diagrams or visual descriptions where possible.")
        }
        ExplanationStyle::None => {}
    }

    if !prefs.explanation_detail.trim().is_empty() {
        prompt.push_str(&format!(
            " Keep the level of detail {}.",
            prefs.explanation_detail.trim()
        ));
    }

    prompt.push_str(
        "\n\nStay within the scope of the current lesson. If the learner strays to an \
         unrelated subject, acknowledge the question briefly and redirect to the lesson.",
    );

    prompt
}

fn render_lesson(prompt: &mut String, lesson: &LessonContext) {
    if let Some(title) = &lesson.module_title {
        prompt.push_str(&format!("Module: {title}\n"));
    }
    if let Some(content) = &lesson.module_content {
        prompt.push_str(&format!("{content}\n"));
    }
    if let Some(examples) = &lesson.examples {
        prompt.push_str(&format!("Examples:\n{examples}\n"));
    }
    if !lesson.key_points.is_empty() {
        prompt.push_str("Key points:\n");
        for point in &lesson.key_points {
            prompt.push_str(&format!("- {point}\n"));
        }
    }
    if let Some(notes) = &lesson.guidance_notes {
        prompt.push_str(&format!("Guidance: {notes}\n"));
    }
    if let Some(strategy) = &lesson.teaching_strategy {
        prompt.push_str(&format!("Teaching strategy: {strategy}\n"));
    }
    if !lesson.common_misconceptions.is_empty() {
        prompt.push_str("Common misconceptions to watch for:\n");
        for item in &lesson.common_misconceptions {
            prompt.push_str(&format!("- {item}\n"));
        }
    }
    if !lesson.struggle_points.is_empty() {
        prompt.push_str("The learner previously struggled with:\n");
        for sp in &lesson.struggle_points {
            prompt.push_str(&format!("- {}: {}\n", sp.concept, sp.details));
        }
    }
}

/// Prompt for code-evaluation feedback. The execution result comes from an
/// external sandbox collaborator; this only assembles its output.
pub fn build_code_eval_prompt(
    code: &str,
    stdout: Option<&str>,
    stderr: Option<&str>,
    topic: Option<&str>,
) -> String {
    let mut prompt = String::from(
        "Review the learner's code and give concise, encouraging feedback. \
         Point out one improvement and one thing done well.",
    );
    if let Some(topic) = topic.filter(|t| !t.trim().is_empty()) {
        prompt.push_str(&format!(" The exercise topic is {}.", topic.trim()));
    }
    prompt.push_str(&format!("\n\nCode:\n```\n{code}\n```\n"));
    if let Some(out) = stdout.filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("\nProgram output:\n{out}\n"));
    }
    if let Some(err) = stderr.filter(|s| !s.trim().is_empty()) {
        prompt.push_str(&format!("\nErrors:\n{err}\n"));
    }
    prompt
}
