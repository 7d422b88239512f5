use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::publication_date_filter;
use crate::domain::{AuthorId, OutputRow, Work};
use crate::error::HarvestError;
use crate::openalex::{Sleeper, WorksApi};
use crate::paginate::CursorPaginator;
use crate::resolver::UnitResolver;

pub const WORKS_ENDPOINT: &str = "works";
pub const FAILURE_COOLDOWN: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Serialize)]
pub struct AuthorFailure {
    pub author_openalex_id: String,
    pub message: String,
}

type AuthorOutcome = Result<Vec<OutputRow>, AuthorFailure>;

/// Rows from every author that succeeded, plus the ones that did not.
#[derive(Debug, Default)]
pub struct HarvestReport {
    pub rows: Vec<OutputRow>,
    pub failures: Vec<AuthorFailure>,
    pub authors_attempted: usize,
}

pub struct Harvester<A: WorksApi, S: Sleeper> {
    paginator: CursorPaginator<A, S>,
    resolver: UnitResolver,
    start_date: NaiveDate,
    cooldown: Duration,
}

impl<A: WorksApi, S: Sleeper> Harvester<A, S> {
    pub fn new(
        paginator: CursorPaginator<A, S>,
        resolver: UnitResolver,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            paginator,
            resolver,
            start_date,
            cooldown: FAILURE_COOLDOWN,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn filter_for(&self, author: &AuthorId) -> String {
        format!(
            "authorships.author.id:{},from_publication_date:{}",
            author.as_str(),
            publication_date_filter(self.start_date)
        )
    }

    /// Harvests the roster in order. One author's failure never stops the rest.
    pub fn harvest(&self, authors: &[AuthorId]) -> HarvestReport {
        let outcomes = authors
            .iter()
            .enumerate()
            .map(|(index, author)| self.harvest_logged(index, authors.len(), author))
            .collect();
        assemble(authors, outcomes)
    }

    /// Like [`Harvester::harvest`], spreading authors over up to `workers` threads.
    /// Each worker has one request outstanding at a time; rows keep roster order.
    pub fn harvest_parallel(&self, authors: &[AuthorId], workers: usize) -> HarvestReport {
        let workers = workers.clamp(1, authors.len().max(1));
        if workers == 1 {
            return self.harvest(authors);
        }

        let next = AtomicUsize::new(0);
        let mut indexed: Vec<(usize, AuthorOutcome)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut local = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::Relaxed);
                            let Some(author) = authors.get(index) else {
                                break;
                            };
                            let outcome = self.harvest_logged(index, authors.len(), author);
                            local.push((index, outcome));
                        }
                        local
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
                })
                .collect()
        });
        indexed.sort_by_key(|(index, _)| *index);
        let outcomes = indexed.into_iter().map(|(_, outcome)| outcome).collect();
        assemble(authors, outcomes)
    }

    fn harvest_logged(&self, index: usize, total: usize, author: &AuthorId) -> AuthorOutcome {
        info!(
            "[{}/{}] Fetching works for {} since {}",
            index + 1,
            total,
            author,
            self.start_date
        );
        let started = Instant::now();
        match self.harvest_author(author) {
            Ok(rows) => {
                info!(
                    author = %author,
                    rows = rows.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "author harvested"
                );
                Ok(rows)
            }
            Err(err) => {
                error!(author = %author, error = %err, "harvest failed; skipping author");
                self.paginator.sleeper().sleep(self.cooldown);
                Err(AuthorFailure {
                    author_openalex_id: author.to_string(),
                    message: err.to_string(),
                })
            }
        }
    }

    pub fn harvest_author(&self, author: &AuthorId) -> Result<Vec<OutputRow>, HarvestError> {
        let works = self
            .paginator
            .fetch_all(WORKS_ENDPOINT, &self.filter_for(author))?;
        let mut rows = Vec::new();
        for raw in works {
            match serde_json::from_value::<Work>(raw) {
                Ok(work) => rows.extend(self.expand(author, &work)),
                Err(err) => warn!(author = %author, error = %err, "skipping malformed work"),
            }
        }
        Ok(rows)
    }

    /// One row per concept that has both an id and a level.
    pub fn expand(&self, author: &AuthorId, work: &Work) -> Vec<OutputRow> {
        let attribution = self.resolver.resolve(author, work.authorship_for(author));
        let published_date = work.published_date().map(str::to_string);
        let year = work.year();

        work.concepts()
            .iter()
            .filter_map(|concept| {
                let concept_id = concept.id.as_deref().filter(|id| !id.trim().is_empty())?;
                let level = concept.level?;
                Some(OutputRow {
                    work_id: work.id.clone(),
                    published_date: published_date.clone(),
                    year,
                    author_openalex_id: author.to_string(),
                    raw_affiliation: attribution.raw_affiliation.clone(),
                    unit_id_auto: attribution.unit_id.clone(),
                    unit_name_auto: attribution.unit_name.clone(),
                    institution_ror: attribution.institution_ror.clone(),
                    concept_id: concept_id.to_string(),
                    concept_level: level,
                    concept_label_openalex: concept.label(),
                })
            })
            .collect()
    }
}

fn assemble(authors: &[AuthorId], outcomes: Vec<AuthorOutcome>) -> HarvestReport {
    let mut report = HarvestReport {
        authors_attempted: authors.len(),
        ..HarvestReport::default()
    };
    for outcome in outcomes {
        match outcome {
            Ok(rows) => report.rows.extend(rows),
            Err(failure) => report.failures.push(failure),
        }
    }
    report
}
