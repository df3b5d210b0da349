//! Derives the answer storage of a survey from its structure alone.
//!
//! Every question at position `n` fans out into text columns:
//! * writing: `q{n}`
//! * multiple choice: `q{n}`, then `q{n}_{m}_text_field` for each choice `m`
//!   with a free-text prompt
//! * checkbox: `q{n}_{m}` for each choice `m`, each directly followed by
//!   `q{n}_{m}_text_field` when that choice has a free-text prompt
//!
//! The identity column `user_id` always comes first. Columns are collected in
//! visiting order and only rendered to SQL when a [`TableDefinition`] is asked
//! for its `create table` statement.

use std::collections::HashSet;

// used to guard identifiers before they are spliced into SQL
use lazy_static::lazy_static;
use regex::Regex;

use serde::Serialize;

use crate::construct::{OtherHasher, Position, QuestionKind, Survey};
use crate::datatype::{Collation, ColumnKind};
use crate::error::{PollbookError, Result};

pub const IDENTITY_COLUMN: &str = "user_id";

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

// ------------- Naming -------------
/// The answer table of a survey is named after its position in the installed
/// catalog, not after the survey id. Reordering the catalog hands existing
/// tables to different surveys.
pub fn answer_table_name(catalog_index: usize) -> String {
    format!("answers_{catalog_index}")
}

fn selector_column(question: Position) -> String {
    format!("q{question}")
}

fn presence_column(question: Position, choice: Position) -> String {
    format!("q{question}_{choice}")
}

fn text_field_column(question: Position, choice: Position) -> String {
    format!("q{question}_{choice}_text_field")
}

// ------------- Columns -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Column {
    name: String,
    kind: ColumnKind,
    collation: Collation,
    unique: bool,
    not_null: bool,
}

impl Column {
    pub fn answer(name: String) -> Self {
        Self {
            name,
            kind: ColumnKind::Text,
            collation: Collation::Binary,
            unique: false,
            not_null: false,
        }
    }
    /// `user_id text unique not null collate nocase`
    pub fn identity() -> Self {
        Self {
            name: IDENTITY_COLUMN.to_string(),
            kind: ColumnKind::Text,
            collation: Collation::NoCase,
            unique: true,
            not_null: true,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn kind(&self) -> ColumnKind {
        self.kind
    }
    pub fn collation(&self) -> Collation {
        self.collation
    }
    pub fn is_unique(&self) -> bool {
        self.unique
    }
    fn definition(&self) -> Result<String> {
        check_identifier(&self.name)?;
        let mut definition = format!("{} {}", self.name, self.kind.sql_type());
        if self.unique {
            definition.push_str(" unique");
        }
        if self.not_null {
            definition.push_str(" not null");
        }
        if self.collation != Collation::Binary {
            definition.push_str(" collate ");
            definition.push_str(self.collation.sql_name());
        }
        Ok(definition)
    }
}

/// Ordered answer columns of one survey plus the identity column in front.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerTableSchema {
    identity: Column,
    columns: Vec<Column>,
}

impl AnswerTableSchema {
    pub fn identity(&self) -> &Column {
        &self.identity
    }
    /// Answer columns in visiting order, identity excluded.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
    /// All column names, identity first.
    pub fn column_names(&self) -> Vec<&str> {
        std::iter::once(self.identity.name())
            .chain(self.columns.iter().map(Column::name))
            .collect()
    }
    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
    pub fn len(&self) -> usize {
        self.columns.len()
    }
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
    /// Digest over the ordered `(name, kind)` pairs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for column in std::iter::once(&self.identity).chain(self.columns.iter()) {
            hasher.update(column.name.as_bytes());
            hasher.update(b"\0");
            hasher.update(column.kind.sql_type().as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}

// Refuses names already taken, the identity column included.
struct ColumnAccumulator<'s> {
    survey: &'s str,
    seen: HashSet<String, OtherHasher>,
    columns: Vec<Column>,
}

impl<'s> ColumnAccumulator<'s> {
    fn new(survey: &'s str) -> Self {
        let mut seen = HashSet::<String, OtherHasher>::default();
        seen.insert(IDENTITY_COLUMN.to_string());
        Self {
            survey,
            seen,
            columns: Vec::new(),
        }
    }
    fn push(&mut self, name: String) -> Result<()> {
        if !self.seen.insert(name.clone()) {
            return Err(PollbookError::DuplicateColumnName {
                survey: self.survey.to_string(),
                column: name,
            });
        }
        self.columns.push(Column::answer(name));
        Ok(())
    }
    fn finish(self) -> Result<AnswerTableSchema> {
        if self.columns.is_empty() {
            return Err(PollbookError::EmptySchema {
                survey: self.survey.to_string(),
            });
        }
        Ok(AnswerTableSchema {
            identity: Column::identity(),
            columns: self.columns,
        })
    }
}

// ------------- Compiler -------------
/// Derives the answer columns of a survey. Identical surveys give identical schemas.
pub fn compile(survey: &Survey) -> Result<AnswerTableSchema> {
    let mut accumulator = ColumnAccumulator::new(survey.title());
    for question in survey.questions() {
        let n = question.position();
        match question.kind() {
            QuestionKind::Writing => {
                accumulator.push(selector_column(n))?;
            }
            QuestionKind::MultipleChoice(choices) => {
                accumulator.push(selector_column(n))?;
                for choice in choices.iter().filter(|c| c.has_free_text()) {
                    accumulator.push(text_field_column(n, choice.position()))?;
                }
            }
            QuestionKind::Checkbox(choices) => {
                for choice in choices {
                    accumulator.push(presence_column(n, choice.position()))?;
                    if choice.has_free_text() {
                        accumulator.push(text_field_column(n, choice.position()))?;
                    }
                }
            }
        }
    }
    accumulator.finish()
}

// ------------- Table Definition -------------
/// What the storage backend is asked to create for one survey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    table: String,
    schema: AnswerTableSchema,
}

impl TableDefinition {
    pub fn new(catalog_index: usize, survey: &Survey) -> Result<Self> {
        Ok(Self {
            table: answer_table_name(catalog_index),
            schema: compile(survey)?,
        })
    }
    pub fn table(&self) -> &str {
        &self.table
    }
    pub fn schema(&self) -> &AnswerTableSchema {
        &self.schema
    }
    pub fn into_parts(self) -> (String, AnswerTableSchema) {
        (self.table, self.schema)
    }
    pub fn create_statement(&self) -> Result<String> {
        check_identifier(&self.table)?;
        let mut definitions = Vec::with_capacity(self.schema.len() + 1);
        definitions.push(self.schema.identity.definition()?);
        for column in &self.schema.columns {
            definitions.push(column.definition()?);
        }
        Ok(format!("create table {} ({})", self.table, definitions.join(", ")))
    }
}

pub(crate) fn check_identifier(name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(PollbookError::Invariant(format!("'{name}' is not a plain SQL identifier")))
    }
}
