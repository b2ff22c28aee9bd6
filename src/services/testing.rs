// src/services/testing.rs

//! Scripted in-memory transport for crawler tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::services::fetcher::{FetchRequest, Transport};

type Reply = Result<String, FetchError>;

/// Replies are queued per request; the last queued reply repeats.
/// Unscripted requests answer with the fallback (404 unless set).
pub struct MockTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
    fallback: Reply,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            fallback: Err(FetchError::HttpStatus(404)),
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::new()
        }
    }

    /// Answer unscripted requests with `body`.
    pub fn with_fallback(mut self, body: &str) -> Self {
        self.fallback = Ok(body.to_string());
        self
    }

    pub fn push(&self, request: &FetchRequest, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .entry(request.describe())
            .or_default()
            .push_back(reply);
    }

    /// Replace every queued reply for `request`.
    pub fn set(&self, request: &FetchRequest, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .insert(request.describe(), VecDeque::from([reply]));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, request: &FetchRequest) -> usize {
        let wanted = request.describe();
        self.calls().iter().filter(|c| **c == wanted).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, key: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(key) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| self.fallback.clone()),
            None => self.fallback.clone(),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let key = request.describe();
        self.calls.lock().unwrap().push(key.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.next_reply(&key)
    }
}
