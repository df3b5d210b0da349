//! Pollbook – survey catalogs and the answer tables derived from them.
//!
//! A survey is an ordered list of questions, each one of three kinds:
//! * [`construct::QuestionKind::Writing`] – a free-text response.
//! * [`construct::QuestionKind::MultipleChoice`] – exactly one of its choices.
//! * [`construct::QuestionKind::Checkbox`] – any number of its choices.
//!
//! Any choice may carry a free-text prompt, in which case selecting it also
//! captures an open-text value.
//!
//! ## Modules
//! * [`construct`] – The survey model. Surveys are validated on construction
//!   (gapless 1-based positions) and immutable afterwards.
//! * [`schema`] – The schema compiler: derives the answer columns of a survey
//!   and the `create table` statement that stores one respondent per row.
//! * [`catalog`] – The canonical survey set and its one-time installation.
//! * [`persist`] – SQLite storage of the catalog, the answer table registry
//!   and recorded answers.
//! * [`datatype`] – Column kinds and the stored question type tag.
//! * [`settings`] – Layered configuration for the `pollbook` binary.
//!
//! ## Quick Start
//! ```
//! use rusqlite::Connection;
//! use pollbook::{catalog::{Catalog, CatalogLoader}, persist::Persistor};
//! let conn = Connection::open_in_memory().unwrap();
//! let mut persistor = Persistor::new(&conn).unwrap();
//! let catalog = Catalog::seed().unwrap();
//! let report = CatalogLoader::new(&mut persistor).install(&catalog).unwrap();
//! assert!(report.is_complete());
//! assert!(persistor.answer_table_ready("answers_0").unwrap());
//! ```
//!
//! ## Answer table naming
//! Answer tables are named `answers_{catalog_index}` after the position of the
//! survey in the installed catalog, not after its id. Installing the same
//! surveys in another order hands the table names to different surveys; see
//! [`schema::answer_table_name`].

pub mod catalog;
pub mod construct;
pub mod datatype;
pub mod error;
pub mod persist;
pub mod schema;
pub mod settings;

pub use error::{PollbookError, Result};
