#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use trait_census::client::{HttpResponse, MetadataClient};
use trait_census::domain::{HttpMethod, Task};
use trait_census::error::FetchFailure;

pub enum Reply {
    Json(String),
    Status(u16, String),
    Unreachable,
    Panic,
}

/// Serves canned replies by URL and counts how often each URL was hit.
#[derive(Default)]
pub struct MockClient {
    replies: HashMap<String, Reply>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reply(mut self, url: &str, reply: Reply) -> Self {
        self.replies.insert(url.to_string(), reply);
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

impl MetadataClient for MockClient {
    fn send(&self, method: HttpMethod, url: &str) -> Result<HttpResponse, FetchFailure> {
        assert_eq!(method, HttpMethod::Get);
        *self.calls.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        match self.replies.get(url) {
            Some(Reply::Json(body)) => Ok(HttpResponse {
                status: 200,
                body: body.clone(),
            }),
            Some(Reply::Status(status, body)) => Ok(HttpResponse {
                status: *status,
                body: body.clone(),
            }),
            Some(Reply::Unreachable) | None => Err(FetchFailure::transport("connection refused")),
            Some(Reply::Panic) => panic!("mock client asked to panic"),
        }
    }
}

pub fn url(id: u64) -> String {
    format!("http://metadata.test/{id}.json")
}

pub fn task(id: u64) -> Task {
    Task::new(id, url(id))
}

pub fn document(pairs: &[(&str, &str)]) -> String {
    let attributes: Vec<serde_json::Value> = pairs
        .iter()
        .map(|(trait_type, value)| serde_json::json!({"trait_type": trait_type, "value": value}))
        .collect();
    serde_json::json!({"name": "item", "attributes": attributes}).to_string()
}
