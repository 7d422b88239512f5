#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use fos_harvest::error::HarvestError;
use fos_harvest::openalex::{HttpResponse, HttpTransport, Sleeper, WorksApi};

#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub type Call = (String, Vec<(String, String)>);

/// Replays canned responses in order and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, HarvestError>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<HttpResponse, HarvestError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl HttpTransport for ScriptedTransport {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, HarvestError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), query.to_vec()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected request to {url}"))
    }
}

pub fn respond(status: u16, body: &str) -> Result<HttpResponse, HarvestError> {
    Ok(HttpResponse {
        status,
        body: body.to_string(),
    })
}

type Handler = dyn Fn(&str, &[(String, String)]) -> Result<Value, HarvestError> + Send + Sync;

/// Works API answered by a closure; records the params of every call.
pub struct FnApi {
    handler: Box<Handler>,
    calls: Mutex<Vec<Vec<(String, String)>>>,
}

impl FnApi {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &[(String, String)]) -> Result<Value, HarvestError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Vec<(String, String)>> {
        self.calls.lock().unwrap().clone()
    }
}

impl WorksApi for FnApi {
    fn get(&self, path: &str, params: &[(String, String)]) -> Result<Value, HarvestError> {
        self.calls.lock().unwrap().push(params.to_vec());
        (self.handler)(path, params)
    }
}

pub fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}
