//! Progress events emitted while a crawl runs

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use crate::crawler::result::CrawlStatus;

/// A progress notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CrawlEvent {
    /// The seed was accepted and workers are starting
    Started { seed: String },

    /// A page result was recorded
    PageCompleted {
        url: String,
        depth: usize,
        success: bool,
        pages_fetched: usize,
        max_pages: usize,
    },

    /// The crawl reached a terminal status
    Finished {
        status: CrawlStatus,
        pages_fetched: usize,
    },
}

/// Optional, non-blocking event sink
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    sender: Option<mpsc::Sender<CrawlEvent>>,
}

impl EventSink {
    pub(crate) fn new(sender: mpsc::Sender<CrawlEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Deliver an event if there is room; a slow consumer never stalls the crawl
    pub(crate) fn emit(&self, event: CrawlEvent) {
        if let Some(sender) = &self.sender {
            if let Err(e) = sender.try_send(event) {
                trace!("Dropping crawl event: {}", e);
            }
        }
    }
}
