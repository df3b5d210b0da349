// used for persistence
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Statement};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::construct::{Choice, OtherHasher, Question, QuestionKind, Survey};
use crate::datatype::QuestionType;
use crate::error::{PollbookError, Result};
use crate::schema::{check_identifier, TableDefinition, IDENTITY_COLUMN};

/// Stored in `PRAGMA user_version` once the catalog tables are populated.
pub const CATALOG_VERSION: i64 = 1;

/// One row of the answer table registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredTable {
    pub table: String,
    pub survey_id: i64,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

fn registered_table_from_row(row: &Row<'_>) -> rusqlite::Result<RegisteredTable> {
    Ok(RegisteredTable {
        table: row.get(0)?,
        survey_id: row.get(1)?,
        fingerprint: row.get(2)?,
        created_at: row.get(3)?,
    })
}

// ------------- Persistence -------------
pub struct Persistor<'db> {
    pub db: &'db Connection,
    // Adders
    add_survey: Statement<'db>,
    add_question: Statement<'db>,
    add_option: Statement<'db>,
    add_answer_table: Statement<'db>,
    // Get one answer table from the registry
    get_answer_table: Statement<'db>,
    // Get everything needed to rebuild the catalog
    all_surveys: Statement<'db>,
    questions_of_survey: Statement<'db>,
    options_of_question: Statement<'db>,
    all_answer_tables: Statement<'db>,
}
impl<'db> Persistor<'db> {
    pub fn new(connection: &'db Connection) -> Result<Persistor<'db>> {
        connection.execute_batch(
            "
            create table if not exists surveys (
                survey_id integer not null,
                catalog_index integer not null,
                title text not null,
                intro_text text,
                constraint referenceable_survey_id primary key (
                    survey_id
                ),
                constraint unique_catalog_index unique (
                    catalog_index
                ),
                constraint unique_title unique (
                    title
                )
            );
            create table if not exists questions (
                question_id integer not null,
                survey_id integer not null,
                section text,
                question_order integer not null,
                type text not null,
                prompt text not null,
                constraint question_in_survey foreign key (
                    survey_id
                ) references surveys(survey_id),
                constraint referenceable_question_id primary key (
                    question_id
                ),
                constraint unique_question_order unique (
                    survey_id,
                    question_order
                )
            );
            create table if not exists question_options (
                question_id integer not null,
                option_order integer not null,
                answer_text text not null,
                text_field_label text,
                constraint option_of_question foreign key (
                    question_id
                ) references questions(question_id),
                constraint unique_option_order primary key (
                    question_id,
                    option_order
                )
            );
            create table if not exists answer_tables (
                table_name text not null,
                survey_id integer not null,
                fingerprint text not null,
                created_at text not null,
                constraint referenceable_table_name primary key (
                    table_name
                )
            );
            ",
        )?;
        Ok(Persistor {
            db: connection,
            add_survey: connection.prepare(
                "
                insert into surveys (
                    survey_id,
                    catalog_index,
                    title,
                    intro_text
                ) values (?, ?, ?, ?)
            ",
            )?,
            add_question: connection.prepare(
                "
                insert into questions (
                    question_id,
                    survey_id,
                    section,
                    question_order,
                    type,
                    prompt
                ) values (?, ?, ?, ?, ?, ?)
            ",
            )?,
            add_option: connection.prepare(
                "
                insert into question_options (
                    question_id,
                    option_order,
                    answer_text,
                    text_field_label
                ) values (?, ?, ?, ?)
            ",
            )?,
            add_answer_table: connection.prepare(
                "
                insert into answer_tables (
                    table_name,
                    survey_id,
                    fingerprint,
                    created_at
                ) values (?, ?, ?, ?)
            ",
            )?,
            get_answer_table: connection.prepare(
                "
                select table_name, survey_id, fingerprint, created_at
                    from answer_tables
                    where table_name = ?
            ",
            )?,
            all_surveys: connection.prepare(
                "
                select survey_id, catalog_index, title, intro_text
                    from surveys
                    order by catalog_index
            ",
            )?,
            questions_of_survey: connection.prepare(
                "
                select question_id, section, question_order, type, prompt
                    from questions
                    where survey_id = ?
                    order by question_order
            ",
            )?,
            options_of_question: connection.prepare(
                "
                select option_order, answer_text, text_field_label
                    from question_options
                    where question_id = ?
                    order by option_order
            ",
            )?,
            all_answer_tables: connection.prepare(
                "
                select table_name, survey_id, fingerprint, created_at
                    from answer_tables
                    order by table_name
            ",
            )?,
        })
    }
    pub fn catalog_version(&self) -> Result<i64> {
        Ok(self.db.query_row("pragma user_version", [], |r| r.get(0))?)
    }
    /// Writes every survey of the catalog in one transaction, which also bumps
    /// the catalog version. Nothing is kept if any row is rejected.
    pub fn persist_catalog(&mut self, catalog: &Catalog) -> Result<()> {
        let db = self.db;
        let tx = db.unchecked_transaction()?;
        for (catalog_index, survey) in catalog.iter() {
            self.persist_survey(catalog_index, survey)?;
        }
        tx.execute_batch(&format!("pragma user_version = {CATALOG_VERSION}"))?;
        tx.commit()?;
        info!(surveys = catalog.len(), version = CATALOG_VERSION, "catalog persisted");
        Ok(())
    }
    fn persist_survey(&mut self, catalog_index: usize, survey: &Survey) -> Result<()> {
        self.add_survey.execute(params![
            survey.id(),
            catalog_index as i64,
            survey.title(),
            survey.intro_text()
        ])?;
        for question in survey.questions() {
            self.add_question.execute(params![
                question.id(),
                survey.id(),
                question.section(),
                question.position(),
                question.kind().question_type(),
                question.prompt()
            ])?;
            for choice in question.kind().choices() {
                self.add_option.execute(params![
                    question.id(),
                    choice.position(),
                    choice.label(),
                    choice.free_text_prompt()
                ])?;
            }
        }
        debug!(survey = survey.title(), catalog_index, "survey persisted");
        Ok(())
    }
    /// Rebuilds the catalog from its tables, in installation order.
    pub fn restore_catalog(&mut self) -> Result<Catalog> {
        let rows = self
            .all_surveys
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut surveys = Vec::with_capacity(rows.len());
        for (expected, row) in rows.into_iter().enumerate() {
            let (survey_id, catalog_index, title, intro_text) = row;
            if catalog_index != expected as i64 {
                return Err(PollbookError::MalformedCatalog(format!(
                    "survey '{title}' is stored at index {catalog_index}, expected {expected}"
                )));
            }
            let questions = self.restore_questions(survey_id, &title)?;
            surveys.push(Survey::new(survey_id, title, intro_text.unwrap_or_default(), questions)?);
        }
        Catalog::new(surveys)
    }
    fn restore_questions(&mut self, survey_id: i64, title: &str) -> Result<Vec<Question>> {
        let rows = self
            .questions_of_survey
            .query_map(params![survey_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, QuestionType>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut questions = Vec::with_capacity(rows.len());
        for (question_id, section, position, question_type, prompt) in rows {
            let choices = self
                .options_of_question
                .query_map(params![question_id], |row| {
                    let position: u32 = row.get(0)?;
                    let label: String = row.get(1)?;
                    Ok(match row.get::<_, Option<String>>(2)? {
                        Some(prompt) => Choice::with_free_text(position, label, prompt),
                        None => Choice::new(position, label),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            let kind = match question_type {
                QuestionType::Writing if !choices.is_empty() => {
                    return Err(PollbookError::MalformedSurvey {
                        survey: title.to_string(),
                        message: format!("writing question {position} has stored options"),
                    });
                }
                QuestionType::Writing => QuestionKind::Writing,
                QuestionType::MultipleChoice => QuestionKind::MultipleChoice(choices),
                QuestionType::Checkbox => QuestionKind::Checkbox(choices),
            };
            let question = Question::new(question_id, position, prompt, kind);
            questions.push(match section {
                Some(section) => question.in_section(section),
                None => question,
            });
        }
        Ok(questions)
    }
    /// Registry entry of an answer table, `None` if it was never created.
    pub fn registered_table(&mut self, table: &str) -> Result<Option<RegisteredTable>> {
        Ok(self
            .get_answer_table
            .query_row(params![table], registered_table_from_row)
            .optional()?)
    }
    /// Answers may only be recorded once the table has been created and registered.
    pub fn answer_table_ready(&mut self, table: &str) -> Result<bool> {
        Ok(self.registered_table(table)?.is_some())
    }
    pub fn answer_tables(&mut self) -> Result<Vec<RegisteredTable>> {
        Ok(self
            .all_answer_tables
            .query_map([], registered_table_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?)
    }
    /// Creates the answer table and registers it, both or neither.
    pub fn create_answer_table(
        &mut self,
        survey_id: i64,
        definition: &TableDefinition,
    ) -> Result<()> {
        let statement = definition.create_statement()?;
        let failed = |e: rusqlite::Error| PollbookError::StorageCreateFailed {
            table: definition.table().to_string(),
            message: e.to_string(),
        };
        let db = self.db;
        let tx = db.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(&statement).map_err(failed)?;
        self.add_answer_table
            .execute(params![
                definition.table(),
                survey_id,
                definition.schema().fingerprint(),
                Utc::now()
            ])
            .map_err(failed)?;
        tx.commit().map_err(failed)?;
        debug!(table = definition.table(), %statement, "answer table created");
        Ok(())
    }
    /// Stores one respondent's answers. Columns left out stay null.
    pub fn record_answers(
        &mut self,
        definition: &TableDefinition,
        user_id: &str,
        answers: &[(&str, &str)],
    ) -> Result<()> {
        let table = definition.table();
        if !self.answer_table_ready(table)? {
            return Err(PollbookError::SurveyNotReady { table: table.to_string() });
        }
        let mut seen = HashSet::<&str, OtherHasher>::default();
        for &(column, _) in answers {
            if !definition.schema().contains(column) {
                return Err(PollbookError::UnknownColumn {
                    table: table.to_string(),
                    column: column.to_string(),
                });
            }
            if !seen.insert(column) {
                return Err(PollbookError::Invariant(format!("column '{column}' answered twice")));
            }
        }
        let columns: Vec<&str> = std::iter::once(IDENTITY_COLUMN)
            .chain(answers.iter().map(|(column, _)| *column))
            .collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let insert = format!(
            "insert into {table} ({}) values ({placeholders})",
            columns.join(", ")
        );
        let values = std::iter::once(user_id).chain(answers.iter().map(|(_, value)| *value));
        self.db.execute(&insert, params_from_iter(values))?;
        debug!(table, user_id, answers = answers.len(), "answers recorded");
        Ok(())
    }
    pub fn response_count(&self, table: &str) -> Result<usize> {
        check_identifier(table)?;
        let count: i64 = self
            .db
            .query_row(&format!("select count(*) from {table}"), [], |r| r.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::{Choice, Question, QuestionKind};

    fn catalog() -> Catalog {
        let pre = Survey::new(
            10,
            "Pre-Trip",
            "Before you go",
            vec![
                Question::new(
                    100,
                    1,
                    "Travel was for",
                    QuestionKind::MultipleChoice(vec![
                        Choice::new(1, "Vacation"),
                        Choice::with_free_text(2, "Other", "Please explain"),
                    ]),
                ),
                Question::new(101, 2, "Hopes?", QuestionKind::Writing).in_section("Thoughts"),
            ],
        )
        .unwrap();
        let post = Survey::new(
            11,
            "Post-Trip",
            "",
            vec![Question::new(
                110,
                1,
                "Check all",
                QuestionKind::Checkbox(vec![Choice::new(1, "a"), Choice::new(2, "b")]),
            )],
        )
        .unwrap();
        Catalog::new(vec![pre, post]).unwrap()
    }

    #[test]
    fn catalog_round_trips_through_its_tables() {
        let conn = Connection::open_in_memory().unwrap();
        let mut persistor = Persistor::new(&conn).unwrap();
        assert_eq!(persistor.catalog_version().unwrap(), 0);
        let original = catalog();
        persistor.persist_catalog(&original).unwrap();
        assert_eq!(persistor.catalog_version().unwrap(), CATALOG_VERSION);
        let restored = persistor.restore_catalog().unwrap();
        assert_eq!(restored.surveys(), original.surveys());
    }

    #[test]
    fn rejected_catalog_leaves_nothing_behind() {
        let conn = Connection::open_in_memory().unwrap();
        let mut persistor = Persistor::new(&conn).unwrap();
        // a survey row already holding id 11 makes the second insert fail
        conn.execute(
            "insert into surveys (survey_id, catalog_index, title) values (11, 99, 'Squatter')",
            [],
        )
        .unwrap();
        assert!(persistor.persist_catalog(&catalog()).is_err());
        assert_eq!(persistor.catalog_version().unwrap(), 0);
        let count = |table: &str| -> i64 {
            conn.query_row(&format!("select count(*) from {table}"), [], |r| r.get(0))
                .unwrap()
        };
        let questions = count("questions");
        assert_eq!(questions, 0);
        let surveys = count("surveys");
        assert_eq!(surveys, 1);
    }

    #[test]
    fn writing_question_with_options_is_malformed_on_restore() {
        let conn = Connection::open_in_memory().unwrap();
        let mut persistor = Persistor::new(&conn).unwrap();
        persistor.persist_catalog(&catalog()).unwrap();
        conn.execute(
            "insert into question_options (question_id, option_order, answer_text) \
             values (101, 1, 'x')",
            [],
        )
        .unwrap();
        assert!(matches!(
            persistor.restore_catalog(),
            Err(PollbookError::MalformedSurvey { .. })
        ));
    }

    #[test]
    fn answers_need_a_registered_table() {
        let conn = Connection::open_in_memory().unwrap();
        let mut persistor = Persistor::new(&conn).unwrap();
        let catalog = catalog();
        let (_, survey) = catalog.iter().next().unwrap();
        let definition = TableDefinition::new(0, survey).unwrap();
        let err = persistor
            .record_answers(&definition, "alice", &[("q1", "Vacation")])
            .unwrap_err();
        assert!(matches!(err, PollbookError::SurveyNotReady { .. }), "{err}");

        persistor.create_answer_table(survey.id(), &definition).unwrap();
        assert!(persistor.answer_table_ready("answers_0").unwrap());
        persistor
            .record_answers(&definition, "alice", &[("q1", "Other"), ("q1_2_text_field", "Family")])
            .unwrap();
        assert_eq!(persistor.response_count("answers_0").unwrap(), 1);
        let stored: String = conn
            .query_row(
                "select q1_2_text_field from answers_0 where user_id = 'ALICE'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(stored, "Family");
    }

    #[test]
    fn answers_are_checked_against_the_schema() {
        let conn = Connection::open_in_memory().unwrap();
        let mut persistor = Persistor::new(&conn).unwrap();
        let catalog = catalog();
        let (_, survey) = catalog.iter().next().unwrap();
        let definition = TableDefinition::new(0, survey).unwrap();
        persistor.create_answer_table(survey.id(), &definition).unwrap();
        let err = persistor.record_answers(&definition, "bob", &[("q9", "x")]).unwrap_err();
        assert!(matches!(err, PollbookError::UnknownColumn { ref column, .. } if column == "q9"));
        let err = persistor.record_answers(&definition, "bob", &[("user_id", "x")]).unwrap_err();
        assert!(matches!(err, PollbookError::UnknownColumn { .. }));
        let err = persistor
            .record_answers(&definition, "bob", &[("q1", "a"), ("q1", "b")])
            .unwrap_err();
        assert!(matches!(err, PollbookError::Invariant(_)));
    }

    #[test]
    fn user_ids_are_unique_regardless_of_case() {
        let conn = Connection::open_in_memory().unwrap();
        let mut persistor = Persistor::new(&conn).unwrap();
        let catalog = catalog();
        let (_, survey) = catalog.iter().next().unwrap();
        let definition = TableDefinition::new(0, survey).unwrap();
        persistor.create_answer_table(survey.id(), &definition).unwrap();
        persistor.record_answers(&definition, "Carol", &[("q2", "peace")]).unwrap();
        let err = persistor.record_answers(&definition, "carol", &[("q2", "again")]).unwrap_err();
        assert!(matches!(err, PollbookError::Persistence(_)), "{err}");
    }

    #[test]
    fn existing_table_is_a_storage_failure_and_stays_unregistered() {
        let conn = Connection::open_in_memory().unwrap();
        let mut persistor = Persistor::new(&conn).unwrap();
        conn.execute_batch("create table answers_0 (user_id text)").unwrap();
        let catalog = catalog();
        let (_, survey) = catalog.iter().next().unwrap();
        let definition = TableDefinition::new(0, survey).unwrap();
        let err = persistor.create_answer_table(survey.id(), &definition).unwrap_err();
        assert!(matches!(
            err,
            PollbookError::StorageCreateFailed { ref table, .. } if table == "answers_0"
        ));
        assert!(!persistor.answer_table_ready("answers_0").unwrap());
        assert!(persistor.answer_tables().unwrap().is_empty());
    }

    #[test]
    fn registry_lists_created_tables() {
        let conn = Connection::open_in_memory().unwrap();
        let mut persistor = Persistor::new(&conn).unwrap();
        let catalog = catalog();
        for (index, survey) in catalog.iter() {
            let definition = TableDefinition::new(index, survey).unwrap();
            persistor.create_answer_table(survey.id(), &definition).unwrap();
        }
        let tables = persistor.answer_tables().unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(names, vec!["answers_0", "answers_1"]);
        assert_eq!(tables[1].survey_id, 11);
        assert!(tables[0].created_at <= Utc::now());
        assert_eq!(persistor.registered_table("answers_1").unwrap(), Some(tables[1].clone()));
        assert_eq!(persistor.registered_table("answers_9").unwrap(), None);
    }
}
