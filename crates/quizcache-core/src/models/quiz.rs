//! Domain models for quizzes.
//!
//! These types are the canonical, already-validated form. Transport payloads
//! are turned into them by [`crate::decode`]; serializing them produces the
//! shape written to the local cache, which the decoder accepts again.

use serde::Serialize;

/// Placeholder glyph for quizzes that arrive without an icon.
pub const DEFAULT_ICON: &str = "❓";

/// Ordered quizzes, in server (or cache) order. No deduplication.
pub type QuizCollection = Vec<Quiz>;

/// A single quiz topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quiz {
    title: String,
    description: String,
    icon: String,
    questions: Vec<Question>,
}

impl Quiz {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        icon: impl Into<String>,
        questions: Vec<Question>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            icon: icon.into(),
            questions,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn icon(&self) -> &str {
        &self.icon
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Description for list display, falling back to the question count.
    pub fn description_display(&self) -> String {
        if self.description.trim().is_empty() {
            match self.questions.len() {
                1 => "1 question".to_string(),
                n => format!("{} questions", n),
            }
        } else {
            self.description.clone()
        }
    }
}

/// A question with its answer options.
///
/// `correct_answer_index` is always a valid index into `answers`; the
/// decoder guarantees it and [`Question::new`] clamps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Question {
    text: String,
    answers: Vec<String>,
    #[serde(rename = "correctAnswerIndex")]
    correct_answer_index: usize,
}

impl Question {
    /// Build a question. An out-of-range index resolves to the first answer.
    pub fn new(text: impl Into<String>, answers: Vec<String>, correct_answer_index: usize) -> Self {
        let correct_answer_index = if correct_answer_index < answers.len() {
            correct_answer_index
        } else {
            0
        };
        Self {
            text: text.into(),
            answers,
            correct_answer_index,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    pub fn correct_answer_index(&self) -> usize {
        self.correct_answer_index
    }

    pub fn correct_answer(&self) -> Option<&str> {
        self.answers.get(self.correct_answer_index).map(String::as_str)
    }
}

/// Where the currently held collection came from.
///
/// Diagnostic only; nothing branches on it except logging and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Seed,
    Cache,
    Remote,
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataSource::Seed => write!(f, "seed"),
            DataSource::Cache => write!(f, "cache"),
            DataSource::Remote => write!(f, "remote"),
        }
    }
}
