use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::domain::{GlobalDenominatorRow, OutputRow};

/// Distinct works per (concept, year) across the whole row set.
///
/// Rows without a work id do not contribute a work. Output is ordered by
/// concept id, then period, with a missing period last.
pub fn aggregate(rows: &[OutputRow]) -> Vec<GlobalDenominatorRow> {
    let mut groups: HashMap<(&str, Option<i32>), HashSet<&str>> = HashMap::new();
    for row in rows {
        let works = groups.entry((row.concept_id.as_str(), row.year)).or_default();
        if let Some(work_id) = row.work_id.as_deref() {
            works.insert(work_id);
        }
    }

    let mut out: Vec<GlobalDenominatorRow> = groups
        .into_iter()
        .map(|((concept_id, period), works)| GlobalDenominatorRow {
            concept_id: concept_id.to_string(),
            period,
            global_works: works.len() as u64,
        })
        .collect();
    out.sort_by(|a, b| {
        a.concept_id
            .cmp(&b.concept_id)
            .then_with(|| compare_period(a.period, b.period))
    });
    out
}

fn compare_period(a: Option<i32>, b: Option<i32>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
