// Answer tables are named after catalog position, not survey id. These tests
// pin down what that means when the same surveys are installed in another order.

use pollbook::catalog::{Catalog, CatalogLoader};
use pollbook::construct::{Choice, Question, QuestionKind, Survey};
use pollbook::persist::Persistor;
use pollbook::schema::{compile, TableDefinition};
use pollbook::PollbookError;
use rusqlite::Connection;

fn pre_trip() -> Survey {
    Survey::new(
        0,
        "Pre-Trip",
        "",
        vec![Question::new(
            1,
            1,
            "Paid by",
            QuestionKind::Checkbox(vec![
                Choice::new(1, "Savings"),
                Choice::with_free_text(2, "Other", "Please comment"),
            ]),
        )],
    )
    .unwrap()
}

fn post_trip() -> Survey {
    let question = Question::new(2, 1, "Surprises?", QuestionKind::Writing);
    Survey::new(1, "Post-Trip", "", vec![question]).unwrap()
}

fn single_writing(id: i64, title: &str, question_id: i64) -> Survey {
    let question = Question::new(question_id, 1, "Anything else?", QuestionKind::Writing);
    Survey::new(id, title, "", vec![question]).unwrap()
}

fn all_mismatched(failed: &[pollbook::catalog::SurveyFailure]) -> bool {
    failed
        .iter()
        .all(|f| matches!(f.error, PollbookError::SchemaMismatch { .. }))
}

#[test]
fn reordering_moves_the_table_name_but_not_the_columns() {
    let forward = Catalog::new(vec![pre_trip(), post_trip()]).unwrap();
    let reversed = Catalog::new(vec![post_trip(), pre_trip()]).unwrap();

    assert_eq!(forward.table_name_of("Pre-Trip").as_deref(), Some("answers_0"));
    assert_eq!(reversed.table_name_of("Pre-Trip").as_deref(), Some("answers_1"));

    let a = forward.definition_of("Pre-Trip").unwrap().unwrap();
    let b = reversed.definition_of("Pre-Trip").unwrap().unwrap();
    assert_ne!(a.table(), b.table());
    assert_eq!(a.schema(), b.schema());
    assert_eq!(a.schema().fingerprint(), b.schema().fingerprint());
    assert_eq!(compile(&pre_trip()).unwrap(), *a.schema());
}

#[test]
fn survey_id_plays_no_part_in_the_table_name() {
    let survey = post_trip();
    assert_eq!(TableDefinition::new(5, &survey).unwrap().table(), "answers_5");
    assert_eq!(survey.id(), 1);
}

#[test]
fn reordered_catalog_against_installed_tables_is_refused() {
    let conn = Connection::open_in_memory().unwrap();
    let mut persistor = Persistor::new(&conn).unwrap();
    let forward = Catalog::new(vec![pre_trip(), post_trip()]).unwrap();
    assert!(CatalogLoader::new(&mut persistor).install(&forward).unwrap().is_complete());

    // answers_0 now belongs to Pre-Trip; a reordered catalog would hand it to Post-Trip
    let reversed = Catalog::new(vec![post_trip(), pre_trip()]).unwrap();
    let report = CatalogLoader::new(&mut persistor).install(&reversed).unwrap();
    assert!(report.created.is_empty());
    assert_eq!(report.failed.len(), 2);
    assert!(all_mismatched(&report.failed));
}

#[test]
fn swapped_surveys_with_identical_columns_are_refused() {
    let conn = Connection::open_in_memory().unwrap();
    let mut persistor = Persistor::new(&conn).unwrap();
    let forward = Catalog::new(vec![
        single_writing(10, "Arrival", 100),
        single_writing(11, "Departure", 110),
    ])
    .unwrap();
    assert!(CatalogLoader::new(&mut persistor).install(&forward).unwrap().is_complete());

    let swapped = Catalog::new(vec![
        single_writing(11, "Departure", 110),
        single_writing(10, "Arrival", 100),
    ])
    .unwrap();
    let report = CatalogLoader::new(&mut persistor).install(&swapped).unwrap();
    assert!(report.existing.is_empty());
    assert!(report.created.is_empty());
    assert_eq!(report.failed_titles(), vec!["Departure", "Arrival"]);
    assert!(all_mismatched(&report.failed));
    assert!(report.failed[0].error.to_string().contains("registered to survey 10, not 11"));

    let registered = persistor.registered_table("answers_0").unwrap().unwrap();
    assert_eq!(registered.survey_id, 10);
}
