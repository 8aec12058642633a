//! External link validation with bounded retries.
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// A link found in the document and whether it sat inside an ignore region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub url: String,
    pub ignored: bool,
}

/// Final classification of one link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Status below 400.
    Ok(u16),
    /// Last status observed after every attempt returned 400 or above.
    Failed(u16),
    ConnectionFailed,
    Ignored,
}

impl LinkStatus {
    pub fn success(self) -> bool {
        matches!(self, Self::Ok(_) | Self::Ignored)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkResult {
    pub url: String,
    pub status: LinkStatus,
}

/// Whether a link target is an external http(s) URL worth recording.
pub fn is_external(url: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^https?://").expect("regex for external links"))
        .is_match(url)
}

/// Issues the HTTP GET for one attempt.
pub trait Fetcher {
    /// Status code of the response, or `None` when no response arrived.
    fn get(&self, url: &str) -> Option<u16>;
}

/// Fetcher backed by a blocking `ureq` agent that reports 4xx/5xx as statuses.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(request_timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(request_timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Fetcher for HttpFetcher {
    fn get(&self, url: &str) -> Option<u16> {
        match self.agent.get(url).call() {
            Ok(response) => Some(response.status().as_u16()),
            Err(ureq::Error::StatusCode(code)) => Some(code),
            Err(err) => {
                tracing::debug!(url, error = %err, "link request failed");
                None
            }
        }
    }
}

/// Checks links in document order with a fixed pause between attempts.
pub struct LinkValidator<P> {
    fetcher: P,
    retries: u32,
    backoff: Duration,
}

impl<P: Fetcher> LinkValidator<P> {
    /// `retries` is the total attempt budget per link and is raised to at least one.
    pub fn new(fetcher: P, retries: u32, backoff: Duration) -> Self {
        Self {
            fetcher,
            retries: retries.max(1),
            backoff,
        }
    }

    pub fn validate(&self, records: &[LinkRecord]) -> (bool, Vec<LinkResult>) {
        let results: Vec<LinkResult> = records
            .iter()
            .map(|record| LinkResult {
                url: record.url.clone(),
                status: self.check(record),
            })
            .collect();
        let success = results.iter().all(|result| result.status.success());
        (success, results)
    }

    fn check(&self, record: &LinkRecord) -> LinkStatus {
        if record.ignored {
            return LinkStatus::Ignored;
        }
        let mut last = LinkStatus::ConnectionFailed;
        for attempt in 1..=self.retries {
            match self.fetcher.get(&record.url) {
                Some(code) if code < 400 => return LinkStatus::Ok(code),
                Some(code) => last = LinkStatus::Failed(code),
                None => last = LinkStatus::ConnectionFailed,
            }
            tracing::warn!(
                url = %record.url,
                attempt,
                retries = self.retries,
                status = ?last,
                "link check failed"
            );
            if attempt < self.retries {
                std::thread::sleep(self.backoff);
            }
        }
        last
    }
}
