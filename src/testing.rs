//! Scripted in-memory `Api` used by the poller and view tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::api::{Api, ApiError};

struct Reply {
    delay: Option<Duration>,
    result: Result<Value, ApiError>,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// Replies are consumed in order per (method, path). An unscripted request
/// fails with HTTP 503.
#[derive(Default)]
pub struct FakeApi {
    script: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

pub fn unavailable(method: Method, path: &str) -> ApiError {
    ApiError::Status {
        method,
        path: path.to_string(),
        status: 503,
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, method: Method, path: &str, result: Result<Value, ApiError>) -> &Self {
        self.push(method, path, None, result)
    }

    pub fn reply_after(
        &self,
        method: Method,
        path: &str,
        delay: Duration,
        result: Result<Value, ApiError>,
    ) -> &Self {
        self.push(method, path, Some(delay), result)
    }

    pub fn fail(&self, method: Method, path: &str) -> &Self {
        let err = unavailable(method.clone(), path);
        self.push(method, path, None, Err(err))
    }

    fn push(&self, method: Method, path: &str, delay: Option<Duration>, result: Result<Value, ApiError>) -> &Self {
        self.script
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Reply { delay, result });
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    async fn answer(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push(Call {
            method: method.clone(),
            path: path.to_string(),
            body,
        });
        let reply = self
            .script
            .lock()
            .unwrap()
            .get_mut(&(method.clone(), path.to_string()))
            .and_then(|q| q.pop_front());
        match reply {
            Some(Reply { delay, result }) => {
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                result
            }
            None => Err(unavailable(method, path)),
        }
    }
}

#[async_trait]
impl Api for FakeApi {
    async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.answer(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.answer(Method::POST, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.answer(Method::DELETE, path, None).await
    }
}
