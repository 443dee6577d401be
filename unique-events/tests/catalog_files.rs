//! Loading catalogs from a directory of TOML files.

use std::{fs, path::PathBuf};

use assert2::{check, let_assert};
use unique_events::{AggregationOperator, ConfigError, EventCatalog};

fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

const SEARCH: &str = r#"
[[event]]
name = "i_search_total"
category = "search"
redis_slot = "search"
aggregation = "weekly"

[[event]]
name = "i_search_advanced"
category = "search"
redis_slot = "search"
aggregation = "weekly"
"#;

const EDIT: &str = r#"
[[event]]
name = "g_edit_by_web_ide"
category = "ide_edit"
redis_slot = "edit"
aggregation = "daily"
expiry = 14
"#;

const UNIONS: &str = r#"
[[aggregated_metric]]
name = "search_union"
operator = "ANY"
events = ["i_search_total", "i_search_advanced"]
"#;

#[test]
fn files_are_merged_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let paths = [
        write(&dir, "search.toml", SEARCH),
        write(&dir, "edit.toml", EDIT),
        write(&dir, "unions.toml", UNIONS),
    ];
    let catalog = EventCatalog::from_paths(&paths).unwrap();

    let names: Vec<_> = catalog.known_events().iter().map(|e| e.name()).collect();
    check!(names == ["i_search_total", "i_search_advanced", "g_edit_by_web_ide"]);
    check!(catalog.categories() == ["search", "ide_edit"]);
    check!(catalog.find_event("g_edit_by_web_ide").unwrap().expiry_days() == 14);

    let union = catalog.find_aggregated_metric("search_union").unwrap();
    check!(union.operator() == AggregationOperator::Any);
    check!(union.source_events() == ["i_search_total", "i_search_advanced"]);
}

#[test]
fn duplicates_across_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let paths = [write(&dir, "a.toml", SEARCH), write(&dir, "b.toml", SEARCH)];
    let_assert!(Err(ConfigError::Invalid(err)) = EventCatalog::from_paths(&paths));
    check!(err.reasons().len() == 2);
}

#[test]
fn metrics_must_reference_loaded_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "unions.toml", UNIONS);
    let_assert!(Err(ConfigError::Invalid(err)) = EventCatalog::from_path(&path));
    check!(err.reasons().iter().all(|r| r.contains("unknown event")));
}

#[test]
fn missing_files_report_their_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let_assert!(Err(ConfigError::Io { path, .. }) = EventCatalog::from_path(&missing));
    check!(path == missing);
}

#[test]
fn malformed_files_are_parse_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(&dir, "bad.toml", "[[event]]\nname = \"x\"\n");
    let_assert!(Err(ConfigError::Parse(_)) = EventCatalog::from_path(&path));

    let path = write(
        &dir,
        "bad_operator.toml",
        &format!("{SEARCH}\n[[aggregated_metric]]\nname = \"m\"\noperator = \"AND\"\nevents = [\"i_search_total\"]\n"),
    );
    let_assert!(Err(ConfigError::UnknownAggregationOperator { operator, .. }) =
        EventCatalog::from_path(&path));
    check!(operator == "AND");
}

#[test]
fn out_of_range_expiries_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        &dir,
        "expiry.toml",
        r#"
[[event]]
name = "forever"
category = "c"
aggregation = "weekly"
expiry = 4294967295

[[event]]
name = "never"
category = "c"
aggregation = "daily"
expiry = 0
"#,
    );
    let_assert!(Err(ConfigError::Invalid(err)) = EventCatalog::from_path(&path));
    check!(err.reasons().len() == 2);
    check!(err.reasons()[0].contains("`forever`"));
    check!(err.reasons()[1].contains("`never`"));
}
