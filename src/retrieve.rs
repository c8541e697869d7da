use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, debug, warn, error};
use crate::drive::LinkSource;
use crate::error::{LinkFailure, PipelineError};
use crate::record::{AudioRecord, TrackingRow};
use crate::workbook::TrackingStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkResult {
    Found(String),
    NotFound(LinkFailure),
    /// The lookup itself broke (driver gone, transport failure).
    Error(String),
}

impl LinkResult {
    pub fn link(&self) -> Option<&str> {
        match self {
            LinkResult::Found(link) => Some(link.as_str()),
            _ => None,
        }
    }
}

/// Looks up a share link with bounded retries and records exactly one row per file.
pub struct LinkRetriever<S: LinkSource> {
    source: S,
    attempts: u32,
    delay: Duration,
}

impl<S: LinkSource> LinkRetriever<S> {
    pub fn new(source: S, attempts: u32, delay: Duration) -> Self {
        Self {
            source,
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Returns `None` when the identifier is already tracked; nothing is looked up or written then.
    /// A failed save is returned as an error.
    pub async fn retrieve(
        &mut self,
        record: &AudioRecord,
        store: &mut dyn TrackingStore,
    ) -> Result<Option<LinkResult>, PipelineError> {
        if store.contains(record.identifier) {
            debug!("{} already tracked, not searching", record.identifier);
            return Ok(None);
        }

        let result = self.attempt_all(record).await;

        match &result {
            LinkResult::Found(link) => {
                warn!(identifier = record.identifier, "{} -> {}", record.filename, link);
            }
            LinkResult::NotFound(failure) => {
                warn!(identifier = record.identifier, "No link for {}: {}", record.filename, failure);
            }
            LinkResult::Error(reason) => {
                error!(identifier = record.identifier, "{},ERRO: {}", record.identifier, reason);
            }
        }

        store.append(TrackingRow::new(record.identifier, result.link()))?;
        store.save()?;

        Ok(Some(result))
    }

    async fn attempt_all(&mut self, record: &AudioRecord) -> LinkResult {
        let mut attempt = 1;
        loop {
            debug!("Searching for {} (attempt {}/{})", record.filename, attempt, self.attempts);
            let result = self.source.find_link(&record.filename).await;

            if let LinkResult::Found(_) = result {
                info!("Link found for {} on attempt {}", record.identifier, attempt);
                return result;
            }
            if attempt >= self.attempts {
                return result;
            }

            debug!("Attempt {} for {} gave {:?}, retrying", attempt, record.identifier, result);
            attempt += 1;
            sleep(self.delay).await;
        }
    }
}
