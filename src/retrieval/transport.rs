//! Transport seam between the Fetch Coordinator and a remote data service
//!
//! `HttpTransport` speaks a plain query-string protocol:
//!
//! ```text
//! GET <data_url>?net=IU&sta=ANMO&loc=00&cha=BHZ&start=...&end=...
//!   200 + body  → one Record spanning the request
//!   204 / empty → no data
//!   404         → unknown stream (permanent)
//!   429 / 5xx   → transient, retried
//! ```

use crate::archive::{format_timestamp, Interval, Record, StreamKey, StreamPattern, BLANK_LOCATION};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

/// User-Agent sent with every request
pub const USER_AGENT: &str = concat!("rover/", env!("CARGO_PKG_VERSION"));

/// Source of remote time-series data
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Fetch whatever the remote holds for `key` within `interval`
    async fn fetch(&self, key: &StreamKey, interval: Interval) -> Result<Vec<Record>, TransportError>;

    /// List remote streams matching `pattern` with data in `interval`
    async fn discover(
        &self,
        _pattern: &StreamPattern,
        _interval: Interval,
    ) -> Result<Vec<StreamKey>, TransportError> {
        Ok(Vec::new())
    }
}

/// Errors that can occur when talking to the remote service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Remote service unavailable: {0}")]
    Unavailable(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Remote error {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unknown stream {0}")]
    UnknownStream(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Request rejected {status}: {message}")]
    Rejected { status: u16, message: String },
}

impl TransportError {
    /// Whether a retry may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Unavailable(_) | TransportError::Timeout | TransportError::Status { .. }
        )
    }

    /// Map an unsuccessful HTTP status to an error
    pub fn from_status(status: u16, key: &str, message: String) -> Self {
        match status {
            404 => TransportError::UnknownStream(key.to_string()),
            429 | 500..=599 => TransportError::Status { status, message },
            _ => TransportError::Rejected { status, message },
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() || e.is_request() {
            TransportError::Unavailable(e.to_string())
        } else {
            TransportError::Malformed(e.to_string())
        }
    }
}

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Data (dataselect) endpoint
    pub data_url: String,
    /// Availability endpoint used for stream discovery
    pub availability_url: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Transport over HTTP with `reqwest`
///
/// The payload is never parsed, so each response becomes one `Record` whose
/// span is exactly the requested interval. Data the service returns past the
/// requested end (a last sample on the next midnight) is therefore never
/// attributed to the following day partition over this transport.
pub struct HttpTransport {
    client: Client,
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Malformed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn data_query(key: &StreamKey, interval: Interval) -> Vec<(&'static str, String)> {
        vec![
            ("net", key.network().to_string()),
            ("sta", key.station().to_string()),
            ("loc", key.location_code().to_string()),
            ("cha", key.channel().to_string()),
            ("start", format_timestamp(interval.start())),
            ("end", format_timestamp(interval.end())),
        ]
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, key: &StreamKey, interval: Interval) -> Result<Vec<Record>, TransportError> {
        let response = self
            .client
            .get(&self.config.data_url)
            .query(&Self::data_query(key, interval))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status.as_u16(), &key.to_string(), text));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!("Fetched {} bytes for {} {}", body.len(), key, interval);
        Ok(vec![Record::new(interval, body.to_vec())])
    }

    async fn discover(
        &self,
        pattern: &StreamPattern,
        interval: Interval,
    ) -> Result<Vec<StreamKey>, TransportError> {
        let Some(url) = &self.config.availability_url else {
            return Ok(Vec::new());
        };

        let response = self
            .client
            .get(url)
            .query(&[
                ("net", pattern.network().to_string()),
                ("sta", pattern.station().to_string()),
                ("loc", pattern.location().to_string()),
                ("cha", pattern.channel().to_string()),
                ("start", format_timestamp(interval.start())),
                ("end", format_timestamp(interval.end())),
                ("format", "text".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status.as_u16(), &pattern.to_string(), text));
        }

        let text = response.text().await?;
        Ok(parse_availability(&text))
    }
}

/// Parse `NET STA LOC CHA ...` lines into distinct keys, in key order
pub fn parse_availability(text: &str) -> Vec<StreamKey> {
    let keys: BTreeSet<StreamKey> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let net = fields.next()?;
            let sta = fields.next()?;
            let loc = fields.next()?;
            let cha = fields.next()?;
            let loc = if loc == BLANK_LOCATION { "" } else { loc };
            Some(StreamKey::new(net, sta, loc, cha))
        })
        .collect();
    keys.into_iter().collect()
}
