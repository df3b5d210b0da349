//! The canonical set of surveys and their one-time installation.
//!
//! Installation runs in two stages. The catalog tables are written in a single
//! transaction that either lands completely or not at all. Answer tables are
//! then created survey by survey, outside that transaction: a survey whose
//! answer table cannot be compiled or created is reported and skipped while the
//! remaining surveys are still processed.
//!
//! A JSON catalog is loaded the same way: an entry that does not form a valid
//! survey is set aside and reported, the others still make up the catalog.
//! A rejected entry takes no catalog index, so every survey after it moves up
//! by one, and its answer table name with it.

use std::collections::HashSet;
use std::path::Path;

// used to keep the one-to-one mapping between titles and catalog positions
use bimap::BiMap;
use serde::{Serialize, Serializer};
use tracing::{info, warn};

use crate::construct::{OtherHasher, Survey, SurveySeed};
use crate::error::{PollbookError, Result};
use crate::persist::{Persistor, CATALOG_VERSION};
use crate::schema::{answer_table_name, AnswerTableSchema, TableDefinition};

const SEED: &str = include_str!("../catalog/seed.json");

// ------------- Catalog -------------
/// Surveys in installation order. The position of a survey in this list is its
/// catalog index, which names its answer table.
#[derive(Debug, Clone)]
pub struct Catalog {
    surveys: Vec<Survey>,
    titles: BiMap<String, usize>,
    rejected: Vec<RejectedEntry>,
}

/// A catalog entry that could not be built into a survey.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedEntry {
    /// Position of the entry in the source list.
    pub entry: usize,
    pub title: String,
    #[serde(rename = "reason", serialize_with = "display")]
    pub error: PollbookError,
}

impl Catalog {
    pub fn new(surveys: Vec<Survey>) -> Result<Self> {
        let mut titles = BiMap::new();
        let mut survey_ids = HashSet::<i64, OtherHasher>::default();
        let mut question_ids = HashSet::<i64, OtherHasher>::default();
        for (index, survey) in surveys.iter().enumerate() {
            if titles.insert_no_overwrite(survey.title().to_string(), index).is_err() {
                return Err(PollbookError::MalformedCatalog(format!(
                    "the title '{}' is used more than once",
                    survey.title()
                )));
            }
            if !survey_ids.insert(survey.id()) {
                return Err(PollbookError::MalformedCatalog(format!(
                    "the survey id {} is used more than once",
                    survey.id()
                )));
            }
            for question in survey.questions() {
                if !question_ids.insert(question.id()) {
                    return Err(PollbookError::MalformedCatalog(format!(
                        "the question id {} is used more than once",
                        question.id()
                    )));
                }
            }
        }
        Ok(Self {
            surveys,
            titles,
            rejected: Vec::new(),
        })
    }
    /// The built-in catalog installed when no other is configured.
    pub fn seed() -> Result<Self> {
        Self::from_json_str(SEED)
    }
    /// Builds every entry it can. Malformed entries end up in [`Catalog::rejected`],
    /// while unreadable JSON or clashing titles and ids refuse the whole catalog.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let seeds: Vec<SurveySeed> = serde_json::from_str(json)?;
        let mut surveys = Vec::with_capacity(seeds.len());
        let mut rejected = Vec::new();
        for (entry, seed) in seeds.into_iter().enumerate() {
            let title = seed.title.clone();
            match Survey::try_from(seed) {
                Ok(survey) => surveys.push(survey),
                Err(error) => {
                    warn!(entry, survey = %title, %error, "catalog entry rejected");
                    rejected.push(RejectedEntry { entry, title, error });
                }
            }
        }
        let mut catalog = Self::new(surveys)?;
        catalog.rejected = rejected;
        Ok(catalog)
    }
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            PollbookError::MalformedCatalog(format!("could not read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }
    pub fn surveys(&self) -> &[Survey] {
        &self.surveys
    }
    pub fn rejected(&self) -> &[RejectedEntry] {
        &self.rejected
    }
    /// `(catalog_index, survey)` in installation order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Survey)> {
        self.surveys.iter().enumerate()
    }
    pub fn get(&self, catalog_index: usize) -> Option<&Survey> {
        self.surveys.get(catalog_index)
    }
    pub fn index_of(&self, title: &str) -> Option<usize> {
        self.titles.get_by_left(title).copied()
    }
    pub fn title_at(&self, catalog_index: usize) -> Option<&str> {
        self.titles.get_by_right(&catalog_index).map(String::as_str)
    }
    pub fn table_name_of(&self, title: &str) -> Option<String> {
        self.index_of(title).map(answer_table_name)
    }
    /// Table definition of the survey with the given title.
    pub fn definition_of(&self, title: &str) -> Result<Option<TableDefinition>> {
        match self.index_of(title) {
            Some(index) => Ok(Some(TableDefinition::new(index, &self.surveys[index])?)),
            None => Ok(None),
        }
    }
    pub fn len(&self) -> usize {
        self.surveys.len()
    }
    pub fn is_empty(&self) -> bool {
        self.surveys.is_empty()
    }
}

// ------------- Report -------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CatalogOutcome {
    Seeded { surveys: usize },
    AlreadyInstalled { version: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledTable {
    pub catalog_index: usize,
    pub title: String,
    pub table: String,
    pub schema: AnswerTableSchema,
}

/// A survey left without an answer table. Rejected catalog entries have
/// neither a catalog index nor a table.
#[derive(Debug, Serialize)]
pub struct SurveyFailure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_index: Option<usize>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(rename = "reason", serialize_with = "display")]
    pub error: PollbookError,
}

fn display<S: Serializer>(
    error: &PollbookError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

/// What one installation run did, survey by survey.
#[derive(Debug, Serialize)]
pub struct InstallReport {
    pub catalog: CatalogOutcome,
    pub created: Vec<InstalledTable>,
    pub existing: Vec<InstalledTable>,
    pub failed: Vec<SurveyFailure>,
}

impl InstallReport {
    fn new(catalog: CatalogOutcome) -> Self {
        Self {
            catalog,
            created: Vec::new(),
            existing: Vec::new(),
            failed: Vec::new(),
        }
    }
    /// True when every survey has a usable answer table.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
    pub fn failed_titles(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.title.as_str()).collect()
    }
}

enum TableState {
    Created(InstalledTable),
    Existing(InstalledTable),
}

// ------------- Loader -------------
pub struct CatalogLoader<'p, 'db> {
    persistor: &'p mut Persistor<'db>,
}

impl<'p, 'db> CatalogLoader<'p, 'db> {
    pub fn new(persistor: &'p mut Persistor<'db>) -> Self {
        Self { persistor }
    }
    /// Installs the catalog unless this database already holds one, then makes
    /// sure every survey has its answer table. Safe to run again: tables that
    /// exist with the expected schema are left alone, failed ones are retried.
    pub fn install(&mut self, catalog: &Catalog) -> Result<InstallReport> {
        let version = self.persistor.catalog_version()?;
        let outcome = if version >= CATALOG_VERSION {
            info!(version, "catalog already installed");
            CatalogOutcome::AlreadyInstalled { version }
        } else {
            self.persistor.persist_catalog(catalog)?;
            CatalogOutcome::Seeded { surveys: catalog.len() }
        };
        let mut report = InstallReport::new(outcome);
        for rejected in catalog.rejected() {
            report.failed.push(SurveyFailure {
                catalog_index: None,
                title: rejected.title.clone(),
                table: None,
                error: rejected.error.clone(),
            });
        }
        for (catalog_index, survey) in catalog.iter() {
            match self.install_answer_table(catalog_index, survey) {
                Ok(TableState::Created(table)) => {
                    info!(
                        table = %table.table,
                        survey = %table.title,
                        columns = table.schema.len(),
                        "answer table created"
                    );
                    report.created.push(table);
                }
                Ok(TableState::Existing(table)) => {
                    info!(table = %table.table, survey = %table.title, "answer table present");
                    report.existing.push(table);
                }
                Err(error) => {
                    let table = answer_table_name(catalog_index);
                    warn!(%table, survey = survey.title(), %error, "answer table skipped");
                    report.failed.push(SurveyFailure {
                        catalog_index: Some(catalog_index),
                        title: survey.title().to_string(),
                        table: Some(table),
                        error,
                    });
                }
            }
        }
        info!(
            created = report.created.len(),
            existing = report.existing.len(),
            failed = report.failed.len(),
            "catalog installation finished"
        );
        Ok(report)
    }
    // An answer table is only reused by the survey it was created for, with
    // the columns it was created with.
    fn install_answer_table(
        &mut self,
        catalog_index: usize,
        survey: &Survey,
    ) -> Result<TableState> {
        let definition = TableDefinition::new(catalog_index, survey)?;
        let mismatch = |detail: String| PollbookError::SchemaMismatch {
            table: definition.table().to_string(),
            detail,
        };
        match self.persistor.registered_table(definition.table())? {
            Some(registered) if registered.survey_id != survey.id() => Err(mismatch(format!(
                "registered to survey {}, not {}",
                registered.survey_id,
                survey.id()
            ))),
            Some(registered) if registered.fingerprint != definition.schema().fingerprint() => {
                Err(mismatch("the columns differ".to_string()))
            }
            Some(_) => Ok(TableState::Existing(installed(catalog_index, survey, definition))),
            None => {
                self.persistor.create_answer_table(survey.id(), &definition)?;
                Ok(TableState::Created(installed(catalog_index, survey, definition)))
            }
        }
    }
}

fn installed(catalog_index: usize, survey: &Survey, definition: TableDefinition) -> InstalledTable {
    let (table, schema) = definition.into_parts();
    InstalledTable {
        catalog_index,
        title: survey.title().to_string(),
        table,
        schema,
    }
}
