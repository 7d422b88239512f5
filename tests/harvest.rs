mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{Value, json};

use fos_harvest::domain::AuthorId;
use fos_harvest::error::HarvestError;
use fos_harvest::harvest::{FAILURE_COOLDOWN, Harvester};
use fos_harvest::paginate::CursorPaginator;
use fos_harvest::resolver::UnitResolver;

use common::{FnApi, RecordingSleeper, param};

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 1).unwrap()
}

fn single_page(results: Value) -> Result<Value, HarvestError> {
    Ok(json!({ "meta": { "next_cursor": null }, "results": results }))
}

fn vet_work() -> Value {
    json!({
        "id": "https://openalex.org/W1",
        "publication_date": "2021-04-01",
        "publication_year": 2021,
        "authorships": [
            {
                "author": { "id": "https://openalex.org/A999" },
                "raw_affiliation_string": "Elsewhere",
                "institutions": [{ "id": "I0", "ror": "https://ror.org/other", "display_name": "Somewhere Else Entirely" }]
            },
            {
                "author": { "id": "https://openalex.org/A123" },
                "raw_affiliation_string": "College of Vet Med",
                "institutions": [{ "id": "https://openalex.org/I1", "ror": "https://ror.org/cvm", "display_name": "College of Vet Med" }]
            }
        ],
        "concepts": [
            { "id": "https://openalex.org/C1", "level": 0, "display_name": "Medicine" },
            { "id": "https://openalex.org/C2", "level": 1, "display_name": "Veterinary medicine" }
        ]
    })
}

fn harvester(
    api: Arc<FnApi>,
    sleeper: Arc<RecordingSleeper>,
) -> Harvester<Arc<FnApi>, Arc<RecordingSleeper>> {
    let paginator = CursorPaginator::new(api, sleeper, Duration::ZERO);
    Harvester::new(paginator, UnitResolver::default(), start())
}

fn ids(values: &[&str]) -> Vec<AuthorId> {
    values.iter().map(|v| v.parse().unwrap()).collect()
}

#[test]
fn one_work_two_concepts_yields_two_rows_with_same_unit() {
    let api = Arc::new(FnApi::new(|_, _| single_page(json!([vet_work()]))));
    let harvester = harvester(api.clone(), Arc::new(RecordingSleeper::default()));

    let report = harvester.harvest(&ids(&["A123"]));

    assert!(report.failures.is_empty());
    assert_eq!(report.rows.len(), 2);
    for row in &report.rows {
        assert_eq!(row.unit_id_auto, "https://ror.org/cvm");
        assert_eq!(row.unit_name_auto, "College of Vet Med");
        assert_eq!(row.institution_ror.as_deref(), Some("https://ror.org/cvm"));
        assert_eq!(row.raw_affiliation.as_deref(), Some("College of Vet Med"));
        assert_eq!(row.author_openalex_id, "A123");
        assert_eq!(row.year, Some(2021));
        assert_eq!(row.work_id.as_deref(), Some("https://openalex.org/W1"));
    }
    assert_eq!(report.rows[0].concept_id, "https://openalex.org/C1");
    assert_eq!(report.rows[0].concept_level, 0);
    assert_eq!(report.rows[1].concept_id, "https://openalex.org/C2");
    assert_eq!(report.rows[1].concept_level, 1);

    let calls = api.calls();
    assert_eq!(
        param(&calls[0], "filter"),
        Some("authorships.author.id:A123,from_publication_date:2015-01-01")
    );
}

#[test]
fn concepts_without_id_or_level_are_skipped_and_labels_fall_back() {
    let work = json!({
        "id": "W2",
        "publication_date": "garbage",
        "publication_year": 2019,
        "concepts": [
            { "id": "https://openalex.org/C1", "level": null },
            { "id": "", "level": 2 },
            { "level": 3 },
            { "id": "https://openalex.org/animal_science", "level": 2 }
        ]
    });
    let api = Arc::new(FnApi::new(move |_, _| single_page(json!([work.clone()]))));
    let harvester = harvester(api, Arc::new(RecordingSleeper::default()));

    let report = harvester.harvest(&ids(&["A1"]));

    assert_eq!(report.rows.len(), 1);
    let row = &report.rows[0];
    assert_eq!(row.concept_label_openalex.as_deref(), Some("Animal Science"));
    assert_eq!(row.year, Some(2019));
    assert_eq!(row.published_date.as_deref(), Some("garbage"));
    assert_eq!(row.unit_id_auto, "author:A1");
}

#[test]
fn failing_author_is_skipped_and_the_rest_continue() {
    let api = Arc::new(FnApi::new(|_, params| {
        let filter = param(params, "filter").unwrap_or_default();
        if filter.contains("A_BAD") {
            return Err(HarvestError::AccessDenied {
                path: "works".to_string(),
                body: "forbidden".to_string(),
            });
        }
        single_page(json!([vet_work()]))
    }));
    let sleeper = Arc::new(RecordingSleeper::default());
    let harvester = harvester(api, sleeper.clone());

    let report = harvester.harvest(&ids(&["A_BAD", "A123"]));

    assert_eq!(report.authors_attempted, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].author_openalex_id, "A_BAD");
    assert_eq!(report.rows.len(), 2);
    assert!(report.rows.iter().all(|row| row.author_openalex_id == "A123"));
    assert_eq!(sleeper.sleeps(), vec![FAILURE_COOLDOWN]);
}

#[test]
fn custom_cooldown_follows_each_failure() {
    let api = Arc::new(FnApi::new(|_, _| {
        Err(HarvestError::ApiStatus {
            status: 400,
            message: "bad filter".to_string(),
        })
    }));
    let sleeper = Arc::new(RecordingSleeper::default());
    let cooldown = Duration::from_millis(10);
    let harvester = harvester(api, sleeper.clone()).with_cooldown(cooldown);

    let report = harvester.harvest(&ids(&["A1", "A2"]));

    assert!(report.rows.is_empty());
    assert_eq!(report.failures.len(), 2);
    assert_eq!(sleeper.sleeps(), vec![cooldown, cooldown]);
}

#[test]
fn duplicate_authorship_uses_the_first_entry() {
    let work = json!({
        "id": "W3",
        "publication_year": 2022,
        "authorships": [
            {
                "author": { "id": "https://openalex.org/A1" },
                "raw_affiliation_string": "First Lab",
                "institutions": [{ "id": "I1", "ror": "https://ror.org/first", "display_name": "First" }]
            },
            {
                "author": { "id": "https://openalex.org/A1" },
                "raw_affiliation_string": "Second Lab",
                "institutions": [{ "id": "I2", "ror": "https://ror.org/second", "display_name": "Second Institute Longer" }]
            }
        ],
        "concepts": [{ "id": "C1", "level": 0 }]
    });
    let api = Arc::new(FnApi::new(move |_, _| single_page(json!([work.clone()]))));
    let harvester = harvester(api, Arc::new(RecordingSleeper::default()));

    let report = harvester.harvest(&ids(&["A1"]));

    assert_eq!(report.rows.len(), 1);
    let row = &report.rows[0];
    assert_eq!(row.unit_id_auto, "https://ror.org/first");
    assert_eq!(row.unit_name_auto, "First");
    assert_eq!(row.raw_affiliation.as_deref(), Some("First Lab"));
}

#[test]
fn work_without_the_author_goes_to_the_author_bucket() {
    let work = json!({
        "id": "W4",
        "publication_year": 2023,
        "authorships": [
            {
                "author": { "id": "https://openalex.org/A999" },
                "raw_affiliation_string": "Elsewhere",
                "institutions": [{ "id": "I9", "ror": "https://ror.org/other", "display_name": "Other" }]
            }
        ],
        "concepts": [{ "id": "C1", "level": 0 }]
    });
    let api = Arc::new(FnApi::new(move |_, _| single_page(json!([work.clone()]))));
    let harvester = harvester(api, Arc::new(RecordingSleeper::default()));

    let report = harvester.harvest(&ids(&["A1"]));

    assert_eq!(report.rows.len(), 1);
    let row = &report.rows[0];
    assert_eq!(row.unit_id_auto, "author:A1");
    assert_eq!(row.unit_name_auto, "Author A1");
    assert_eq!(row.raw_affiliation, None);
    assert_eq!(row.institution_ror, None);
}

#[test]
fn malformed_work_is_skipped_not_fatal() {
    let api = Arc::new(FnApi::new(|_, _| {
        single_page(json!([
            { "id": "W_BAD", "concepts": "not-a-list" },
            vet_work()
        ]))
    }));
    let harvester = harvester(api, Arc::new(RecordingSleeper::default()));

    let report = harvester.harvest(&ids(&["A123"]));

    assert!(report.failures.is_empty());
    assert_eq!(report.rows.len(), 2);
}

#[test]
fn parallel_harvest_keeps_roster_order() {
    let api = Arc::new(FnApi::new(|_, params| {
        let filter = param(params, "filter").unwrap_or_default().to_string();
        let author = filter
            .trim_start_matches("authorships.author.id:")
            .split(',')
            .next()
            .unwrap_or_default()
            .to_string();
        single_page(json!([{
            "id": format!("W-{author}"),
            "publication_year": 2020,
            "concepts": [{ "id": "C1", "level": 0 }]
        }]))
    }));
    let harvester = harvester(api, Arc::new(RecordingSleeper::default()));
    let roster = ids(&["A1", "A2", "A3", "A4", "A5"]);

    let sequential = harvester.harvest(&roster);
    let parallel = harvester.harvest_parallel(&roster, 3);

    assert_eq!(sequential.rows, parallel.rows);
    let order: Vec<&str> = parallel
        .rows
        .iter()
        .map(|row| row.author_openalex_id.as_str())
        .collect();
    assert_eq!(order, vec!["A1", "A2", "A3", "A4", "A5"]);
}
