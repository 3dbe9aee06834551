//! In-process transport for tests

use crate::archive::{Interval, Record, StreamKey, StreamPattern};
use crate::retrieval::transport::{Transport, TransportError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// Scriptable transport that answers every request from memory
#[derive(Default)]
pub(crate) struct MockTransport {
    /// Added to the end of each returned record (last sample on the boundary)
    sample_period: i64,
    delay: Option<Duration>,
    unknown: HashSet<StreamKey>,
    empty: HashSet<StreamKey>,
    discovered: Vec<StreamKey>,
    scripted: Mutex<HashMap<StreamKey, VecDeque<TransportError>>>,
    calls: Mutex<Vec<(StreamKey, Interval)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_period(mut self, micros: i64) -> Self {
        self.sample_period = micros;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests for `key` fail with 404
    pub fn unknown(mut self, key: StreamKey) -> Self {
        self.unknown.insert(key);
        self
    }

    /// Requests for `key` return no data
    pub fn empty(mut self, key: StreamKey) -> Self {
        self.empty.insert(key);
        self
    }

    pub fn discovered(mut self, keys: Vec<StreamKey>) -> Self {
        self.discovered = keys;
        self
    }

    /// The next requests for `key` fail with these errors, in order
    pub fn fail_with(self, key: StreamKey, errors: Vec<TransportError>) -> Self {
        self.scripted.lock().unwrap().insert(key, errors.into());
        self
    }

    pub fn calls(&self) -> Vec<(StreamKey, Interval)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, key: &StreamKey, interval: Interval) -> Result<Vec<Record>, TransportError> {
        self.calls.lock().unwrap().push((key.clone(), interval));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unknown.contains(key) {
            return Err(TransportError::UnknownStream(key.to_string()));
        }
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(error);
        }
        if self.empty.contains(key) {
            return Ok(Vec::new());
        }

        let span = Interval::new(interval.start(), interval.end() + self.sample_period);
        Ok(vec![Record::new(span, format!("{} {}\n", key, interval).into_bytes())])
    }

    async fn discover(
        &self,
        pattern: &StreamPattern,
        _interval: Interval,
    ) -> Result<Vec<StreamKey>, TransportError> {
        Ok(self
            .discovered
            .iter()
            .filter(|key| pattern.matches(key))
            .cloned()
            .collect())
    }
}
