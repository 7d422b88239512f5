use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::HarvestConfig;
use crate::error::{HarvestError, is_retryable_status};

pub const MAX_ATTEMPTS: usize = 6;
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);
const ACCESS_DENIED_SNIPPET: usize = 500;

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// One GET round-trip. Transport failures map to `HarvestError::Transport`.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, HarvestError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, HarvestError> {
        (**self).get(url, query)
    }
}

/// Timed waits, replaceable in tests.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

impl<S: Sleeper + ?Sized> Sleeper for Arc<S> {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// JSON GET against the works API.
pub trait WorksApi: Send + Sync {
    fn get(&self, path: &str, params: &[(String, String)]) -> Result<Value, HarvestError>;
}

impl<A: WorksApi + ?Sized> WorksApi for Arc<A> {
    fn get(&self, path: &str, params: &[(String, String)]) -> Result<Value, HarvestError> {
        (**self).get(path, params)
    }
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(mailto: Option<&str>) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent(mailto))
                .map_err(|err| HarvestError::InvalidConfig(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| HarvestError::Transport {
                message: err.to_string(),
                transient: false,
            })?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, HarvestError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|err| HarvestError::Transport {
                transient: is_retryable_error(&err),
                message: err.to_string(),
            })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|err| HarvestError::Transport {
            transient: is_retryable_error(&err),
            message: err.to_string(),
        })?;
        Ok(HttpResponse { status, body })
    }
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

pub fn user_agent(mailto: Option<&str>) -> String {
    format!(
        "fos-harvest/{} (mailto:{})",
        env!("CARGO_PKG_VERSION"),
        mailto.unwrap_or("someone@example.com")
    )
}

/// Retrying client that merges the polite-pool identity into every query.
pub struct OpenAlexClient<T: HttpTransport, S: Sleeper> {
    transport: T,
    sleeper: S,
    base_url: String,
    identity: Vec<(String, String)>,
}

impl OpenAlexClient<ReqwestTransport, ThreadSleeper> {
    pub fn from_config(config: &HarvestConfig) -> Result<Self, HarvestError> {
        if config.mailto.is_none() {
            warn!("OPENALEX_MAILTO not set. Add your institutional email to avoid 403s.");
        }
        let transport = ReqwestTransport::new(config.mailto.as_deref())?;
        Ok(Self::new(transport, ThreadSleeper, config))
    }
}

impl<T: HttpTransport, S: Sleeper> OpenAlexClient<T, S> {
    pub fn new(transport: T, sleeper: S, config: &HarvestConfig) -> Self {
        let mut identity = Vec::new();
        if let Some(mailto) = &config.mailto {
            identity.push(("mailto".to_string(), mailto.clone()));
        }
        if let Some(api_key) = &config.api_key {
            identity.push(("api_key".to_string(), api_key.clone()));
        }
        Self {
            transport,
            sleeper,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            identity,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Caller params first; identity params only where the caller left them unset.
    fn merged_query(&self, params: &[(String, String)]) -> Vec<(String, String)> {
        let mut query = params.to_vec();
        for (key, value) in &self.identity {
            if !query.iter().any(|(existing, _)| existing == key) {
                query.push((key.clone(), value.clone()));
            }
        }
        query
    }

    fn send_with_retries(
        &self,
        path: &str,
        url: &str,
        query: &[(String, String)],
    ) -> Result<HttpResponse, HarvestError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 1usize;
        loop {
            let outcome = self
                .transport
                .get(url, query)
                .and_then(|response| classify(path, response));
            match outcome {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                    debug!(
                        attempt,
                        delay_ms = backoff.as_millis() as u64,
                        error = %err,
                        "retrying OpenAlex request"
                    );
                    self.sleeper.sleep(backoff);
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err(HarvestError::ApiStatus { status, message }) if is_retryable_status(status) => {
                    return Err(HarvestError::RetriesExhausted {
                        status,
                        attempts: attempt,
                        message,
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<T: HttpTransport, S: Sleeper> WorksApi for OpenAlexClient<T, S> {
    fn get(&self, path: &str, params: &[(String, String)]) -> Result<Value, HarvestError> {
        let url = self.url(path);
        let query = self.merged_query(params);
        let response = self.send_with_retries(path, &url, &query)?;
        serde_json::from_str(&response.body)
            .map_err(|err| HarvestError::InvalidResponse(format!("{path}: {err}")))
    }
}

fn classify(path: &str, response: HttpResponse) -> Result<HttpResponse, HarvestError> {
    match response.status {
        200..=299 => Ok(response),
        403 => Err(HarvestError::AccessDenied {
            path: path.to_string(),
            body: snippet(&response.body, ACCESS_DENIED_SNIPPET),
        }),
        status => Err(HarvestError::ApiStatus {
            status,
            message: snippet(&response.body, ACCESS_DENIED_SNIPPET),
        }),
    }
}

fn snippet(body: &str, max_chars: usize) -> String {
    body.chars()
        .take(max_chars)
        .map(|ch| if ch == '\n' || ch == '\r' { ' ' } else { ch })
        .collect()
}
