use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum PollbookError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Malformed survey '{survey}': {message}")]
    MalformedSurvey { survey: String, message: String },
    #[error("Malformed catalog: {0}")]
    MalformedCatalog(String),
    #[error("Survey '{survey}' yields no answer columns")]
    EmptySchema { survey: String },
    #[error("Survey '{survey}' yields the column '{column}' more than once")]
    DuplicateColumnName { survey: String, column: String },
    #[error("Could not create answer table '{table}': {message}")]
    StorageCreateFailed { table: String, message: String },
    #[error("Answer table '{table}' does not belong to this survey: {detail}")]
    SchemaMismatch { table: String, detail: String },
    #[error("Answer table '{table}' is not ready")]
    SurveyNotReady { table: String },
    #[error("Answer table '{table}' has no column '{column}'")]
    UnknownColumn { table: String, column: String },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, PollbookError>;

// Helper conversions
impl From<rusqlite::Error> for PollbookError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<config::ConfigError> for PollbookError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl From<serde_json::Error> for PollbookError {
    fn from(e: serde_json::Error) -> Self { Self::MalformedCatalog(e.to_string()) }
}
