// used to read and write catalogs as JSON
use serde::{Deserialize, Serialize};

// hashsets of names and titles do not need a DoS resistant hasher
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;

// our own stuff that we need
use crate::datatype::QuestionType;
use crate::error::{PollbookError, Result};

/// Positions are 1-based within their parent.
pub type Position = u32;

pub type OtherHasher = BuildHasherDefault<SeaHasher>;

// ------------- Choice -------------
/// One selectable answer of a multiple choice or checkbox question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    position: Position,
    label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    free_text_prompt: Option<String>,
}

impl Choice {
    pub fn new(position: Position, label: impl Into<String>) -> Self {
        Self {
            position,
            label: label.into(),
            free_text_prompt: None,
        }
    }
    /// A choice that, when selected, also captures a free-text value.
    pub fn with_free_text(
        position: Position,
        label: impl Into<String>,
        free_text_prompt: impl Into<String>,
    ) -> Self {
        Self {
            position,
            label: label.into(),
            free_text_prompt: Some(free_text_prompt.into()),
        }
    }
    pub fn position(&self) -> Position {
        self.position
    }
    pub fn label(&self) -> &str {
        &self.label
    }
    pub fn free_text_prompt(&self) -> Option<&str> {
        self.free_text_prompt.as_deref()
    }
    pub fn has_free_text(&self) -> bool {
        self.free_text_prompt.is_some()
    }
}

// ------------- Question -------------
/// The kind of question, which decides how its answer is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "choices", rename_all = "snake_case")]
pub enum QuestionKind {
    /// Free-text response.
    Writing,
    /// Exactly one of the choices.
    MultipleChoice(Vec<Choice>),
    /// Any number of the choices, each marked independently.
    Checkbox(Vec<Choice>),
}

impl QuestionKind {
    pub fn question_type(&self) -> QuestionType {
        match self {
            Self::Writing => QuestionType::Writing,
            Self::MultipleChoice(_) => QuestionType::MultipleChoice,
            Self::Checkbox(_) => QuestionType::Checkbox,
        }
    }
    pub fn choices(&self) -> &[Choice] {
        match self {
            Self::Writing => &[],
            Self::MultipleChoice(choices) | Self::Checkbox(choices) => choices,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: i64,
    position: Position,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    section: Option<String>,
    prompt: String,
    kind: QuestionKind,
}

impl Question {
    pub fn new(id: i64, position: Position, prompt: impl Into<String>, kind: QuestionKind) -> Self {
        Self {
            id,
            position,
            section: None,
            prompt: prompt.into(),
            kind,
        }
    }
    /// Places the question under a grouping header. Display only.
    pub fn in_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
    pub fn id(&self) -> i64 {
        self.id
    }
    pub fn position(&self) -> Position {
        self.position
    }
    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
    pub fn kind(&self) -> &QuestionKind {
        &self.kind
    }
}

// ------------- Survey -------------
/// An immutable survey: its questions ordered by a gapless 1-based position.
/// Deserializing goes through [`Survey::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SurveySeed")]
pub struct Survey {
    id: i64,
    title: String,
    intro_text: String,
    questions: Vec<Question>,
}

impl Survey {
    /// Builds a survey, ordering questions and choices by position.
    /// Positions must form exactly `1..=n` at both levels.
    pub fn new(
        id: i64,
        title: impl Into<String>,
        intro_text: impl Into<String>,
        mut questions: Vec<Question>,
    ) -> Result<Self> {
        let title = title.into();
        let malformed = |message: String| PollbookError::MalformedSurvey {
            survey: title.clone(),
            message,
        };
        if title.trim().is_empty() {
            return Err(malformed("the title is empty".to_string()));
        }
        questions.sort_by_key(|q| q.position);
        if let Some(message) = check_positions(questions.iter().map(|q| q.position)) {
            return Err(malformed(format!("question {message}")));
        }
        for question in questions.iter_mut() {
            if let QuestionKind::MultipleChoice(choices) | QuestionKind::Checkbox(choices) =
                &mut question.kind
            {
                choices.sort_by_key(|c| c.position);
                if let Some(message) = check_positions(choices.iter().map(|c| c.position)) {
                    return Err(malformed(format!(
                        "choice {message} in question {}",
                        question.position
                    )));
                }
            }
        }
        Ok(Self {
            id,
            title,
            intro_text: intro_text.into(),
            questions,
        })
    }
    pub fn id(&self) -> i64 {
        self.id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn intro_text(&self) -> &str {
        &self.intro_text
    }
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }
    pub fn len(&self) -> usize {
        self.questions.len()
    }
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

// Expects sorted input, reports the first position that breaks 1..=n.
fn check_positions(positions: impl Iterator<Item = Position>) -> Option<String> {
    let mut expected: Position = 1;
    for position in positions {
        if position < expected {
            return Some(format!("position {position} is duplicated or zero"));
        }
        if position > expected {
            return Some(format!("position {expected} is missing"));
        }
        expected += 1;
    }
    None
}

/// The unvalidated shape of a survey as it appears in a JSON catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct SurveySeed {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub intro_text: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl TryFrom<SurveySeed> for Survey {
    type Error = PollbookError;
    fn try_from(seed: SurveySeed) -> Result<Self> {
        Survey::new(seed.id, seed.title, seed.intro_text, seed.questions)
    }
}
