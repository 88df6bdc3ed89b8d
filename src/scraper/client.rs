//! Blocking HTTP client with a delay between requests, retries for transient failures,
//! and a second User-Agent to try when a site answers 403.

use crate::scraper::ScraperError;
use reqwest::StatusCode;
use std::time::{Duration, Instant};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; wepub/0.1; +https://github.com/wepub)";
/// Some serial hosts reject library User-Agents outright but accept anything else.
pub const DEFAULT_FALLBACK_USER_AGENT: &str = "not-Python";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DELAY_SECS: u64 = 2;
const MAX_REDIRECTS: usize = 10;

/// Default number of attempts for get_with_retry (initial plus retries).
const DEFAULT_RETRY_COUNT: u32 = 3;
/// Default backoff delays in seconds after each failed attempt.
const DEFAULT_BACKOFF_SECS: [u64; 2] = [1, 2];
/// Backoff for HTTP 429 (rate limit): wait longer so the server can recover.
const BACKOFF_429_SECS: [u64; 4] = [30, 60, 90, 120];

/// Blocking HTTP client that enforces a delay between requests.
#[derive(Debug)]
pub struct PoliteClient {
    inner: reqwest::blocking::Client,
    fallback_user_agent: Option<String>,
    delay: Duration,
    last_request: Option<Instant>,
    retry_count: u32,
    backoff_secs: Vec<u64>,
}

impl PoliteClient {
    /// Build a polite client with default User-Agent, timeout, and delay.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    /// GET with retries for timeouts, connection errors, HTTP 5xx and 429.
    ///
    /// Other statuses are returned as-is. After the last attempt the final response
    /// or error is returned.
    pub fn get_with_retry(&mut self, url: &str) -> Result<reqwest::blocking::Response, reqwest::Error> {
        let max_attempts = self.retry_count.max(1);
        let mut attempt: u32 = 0;
        loop {
            self.wait_delay();
            let result = self.inner.get(url).send();
            self.last_request = Some(Instant::now());
            let last = attempt + 1 >= max_attempts;
            let backoff = match result {
                Ok(response) => {
                    let status = response.status();
                    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS;
                    if last || !(status.is_server_error() || rate_limited) {
                        return Ok(response);
                    }
                    let backoff = if rate_limited {
                        BACKOFF_429_SECS
                            .get(attempt as usize)
                            .copied()
                            .unwrap_or(*BACKOFF_429_SECS.last().unwrap_or(&60))
                    } else {
                        self.backoff_for(attempt)
                    };
                    tracing::warn!(url, status = status.as_u16(), attempt = attempt + 1, backoff, "retrying request");
                    backoff
                }
                Err(e) => {
                    if last || !(e.is_timeout() || e.is_connect()) {
                        return Err(e);
                    }
                    let backoff = self.backoff_for(attempt);
                    tracing::warn!(url, error = %e, attempt = attempt + 1, backoff, "retrying request");
                    backoff
                }
            };
            std::thread::sleep(Duration::from_secs(backoff));
            attempt += 1;
        }
    }

    /// Fetch `url` and return its body. A 403 is retried once with the fallback
    /// User-Agent, if one is configured.
    pub fn fetch_text(&mut self, url: &str) -> Result<String, ScraperError> {
        let network = |source| ScraperError::Network {
            url: url.to_string(),
            source,
        };
        let mut response = self.get_with_retry(url).map_err(network)?;
        if response.status() == StatusCode::FORBIDDEN {
            if let Some(agent) = self.fallback_user_agent.clone() {
                tracing::warn!(url, user_agent = %agent, "HTTP 403; retrying with fallback User-Agent");
                self.wait_delay();
                response = self
                    .inner
                    .get(url)
                    .header(reqwest::header::USER_AGENT, agent)
                    .send()
                    .map_err(network)?;
                self.last_request = Some(Instant::now());
            }
        }
        check_response(response, url)
    }

    fn backoff_for(&self, attempt: u32) -> u64 {
        self.backoff_secs
            .get(attempt as usize)
            .copied()
            .unwrap_or_else(|| *self.backoff_secs.last().unwrap_or(&1))
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

/// Check response status and read the body as text.
fn check_response(response: reqwest::blocking::Response, url: &str) -> Result<String, ScraperError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ScraperError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    response
        .text()
        .map_err(|e| ScraperError::BodyRead { source: e })
}

/// Builder for PoliteClient with optional User-Agents, delay, timeout, and retry settings.
#[derive(Debug)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    fallback_user_agent: Option<String>,
    delay_secs: u64,
    timeout_secs: u64,
    retry_count: u32,
    retry_backoff_secs: Vec<u64>,
}

impl Default for PoliteClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            fallback_user_agent: Some(DEFAULT_FALLBACK_USER_AGENT.to_string()),
            delay_secs: DEFAULT_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
        }
    }
}

impl PoliteClientBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// User-Agent for the single retry after a 403. `None` disables the retry.
    pub fn fallback_user_agent(mut self, ua: Option<String>) -> Self {
        self.fallback_user_agent = ua;
        self
    }

    /// Set delay between requests in seconds. Default 2.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Set request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set number of HTTP attempts for transient failures (default 3).
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    /// Backoff delays in seconds before each retry. If shorter than retry_count - 1, the last value is reused.
    pub fn retry_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        self.retry_backoff_secs = secs;
        self
    }

    pub fn build(self) -> Result<PoliteClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        let backoff_secs = if self.retry_backoff_secs.is_empty() {
            // Exponential: 1, 2, 4, ... for (retry_count - 1) steps
            let n = self.retry_count.saturating_sub(1) as usize;
            (0..n).map(|i| 1u64 << i.min(4)).collect::<Vec<_>>()
        } else {
            self.retry_backoff_secs
        };
        Ok(PoliteClient {
            inner,
            fallback_user_agent: self.fallback_user_agent.filter(|ua| !ua.is_empty()),
            delay: Duration::from_secs(self.delay_secs),
            last_request: None,
            retry_count: self.retry_count,
            backoff_secs,
        })
    }
}
