// used for persistence
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// used to write schemas into reports
use serde::Serialize;

// used to print out readable forms of a data type
use std::fmt;

// ------------- Question Types --------------
/// The tag stored in the catalog's `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionType {
    Writing,
    MultipleChoice,
    Checkbox,
}

impl QuestionType {
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Writing => "writing",
            Self::MultipleChoice => "multiple_choice",
            Self::Checkbox => "checkbox",
        }
    }
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "writing" => Some(Self::Writing),
            "multiple_choice" => Some(Self::MultipleChoice),
            "checkbox" => Some(Self::Checkbox),
            _ => None,
        }
    }
}
impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}
impl ToSql for QuestionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.tag()))
    }
}
impl FromSql for QuestionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let tag = value.as_str()?;
        Self::from_tag(tag)
            .ok_or_else(|| FromSqlError::Other(format!("unknown question type '{tag}'").into()))
    }
}

// ------------- Column Kinds --------------
/// Storage type of an answer column. Answers are captured as free-form text,
/// any further validation belongs to whoever collects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
}

impl ColumnKind {
    pub const fn sql_type(&self) -> &'static str {
        match self {
            Self::Text => "text",
        }
    }
}
impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.sql_type())
    }
}

/// Comparison rule for a text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collation {
    Binary,
    NoCase,
}

impl Collation {
    pub const fn sql_name(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::NoCase => "nocase",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn question_type_survives_a_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("create table t (type text not null);").unwrap();
        let all = [QuestionType::Writing, QuestionType::MultipleChoice, QuestionType::Checkbox];
        for question_type in all {
            conn.execute("delete from t", []).unwrap();
            conn.execute("insert into t (type) values (?)", [question_type]).unwrap();
            let restored: QuestionType =
                conn.query_row("select type from t", [], |r| r.get(0)).unwrap();
            assert_eq!(restored, question_type);
        }
    }

    #[test]
    fn unknown_tag_is_a_conversion_error() {
        let conn = Connection::open_in_memory().unwrap();
        let restored = conn.query_row("select 'QuestionMC'", [], |r| r.get::<_, QuestionType>(0));
        assert!(restored.is_err());
    }
}
