use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::HarvestError;
use crate::openalex::{Sleeper, WorksApi};

pub const PAGE_SIZE: u32 = 200;
pub const START_CURSOR: &str = "*";

/// Walks every page of a filtered query by following `meta.next_cursor`.
pub struct CursorPaginator<A: WorksApi, S: Sleeper> {
    api: A,
    sleeper: S,
    rate: Duration,
}

impl<A: WorksApi, S: Sleeper> CursorPaginator<A, S> {
    pub fn new(api: A, sleeper: S, rate: Duration) -> Self {
        Self { api, sleeper, rate }
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// All results for `filter`, concatenated in server order.
    pub fn fetch_all(&self, endpoint: &str, filter: &str) -> Result<Vec<Value>, HarvestError> {
        let mut out = Vec::new();
        let mut cursor = START_CURSOR.to_string();
        let mut page = 0usize;
        loop {
            if page > 0 {
                self.sleeper.sleep(self.rate);
            }
            let params = vec![
                ("per_page".to_string(), PAGE_SIZE.to_string()),
                ("cursor".to_string(), cursor.clone()),
                ("filter".to_string(), filter.to_string()),
            ];
            let mut body = self.api.get(endpoint, &params)?;
            page += 1;

            let next = next_cursor(&body);
            match body.get_mut("results").map(Value::take) {
                Some(Value::Array(items)) => {
                    debug!(endpoint, page, count = items.len(), "fetched page");
                    out.extend(items);
                }
                Some(Value::Null) | None => {}
                Some(_) => {
                    return Err(HarvestError::InvalidResponse(format!(
                        "{endpoint}: results is not an array"
                    )));
                }
            }

            match next {
                Some(next) => cursor = next,
                None => break,
            }
        }
        Ok(out)
    }
}

fn next_cursor(body: &Value) -> Option<String> {
    body.get("meta")
        .and_then(|meta| meta.get("next_cursor"))
        .and_then(Value::as_str)
        .filter(|cursor| !cursor.is_empty())
        .map(str::to_string)
}
