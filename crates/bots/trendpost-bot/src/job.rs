use std::fmt;

use tracing::{debug, error, info};

use crate::generator::TextGenerator;
use crate::publisher::Publisher;
use crate::scraper::{CandidateItem, SourceFetcher};
use crate::seen::{SeenSet, SeenStore};

const LOG_TARGET: &str = "trendpost_bot::job";

pub const DEFAULT_CANDIDATE_LIMIT: usize = 5;

/// How a single [`PublicationJob::run`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    FetchFailed,
    NothingNew,
    PublishFailed { id: String },
    /// `saved` is `false` if the seen set could not be persisted afterwards.
    Published { id: String, saved: bool },
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::FetchFailed => f.write_str("fetch failed"),
            JobOutcome::NothingNew => f.write_str("nothing new"),
            JobOutcome::PublishFailed { id } => write!(f, "publish of {id} failed"),
            JobOutcome::Published { id, saved: true } => write!(f, "published {id}"),
            JobOutcome::Published { id, saved: false } => {
                write!(f, "published {id} (seen set not saved)")
            }
        }
    }
}

/// Fetch, pick the first unseen candidate, generate, publish, record.
///
/// At most one item is published per [`Self::run`], even when several
/// candidates are new. An item is recorded as seen only after it was
/// published, so a failed publish is retried on the next run.
pub struct PublicationJob {
    fetcher: Box<dyn SourceFetcher>,
    generator: Box<dyn TextGenerator>,
    publisher: Box<dyn Publisher>,
    store: SeenStore,
    seen: SeenSet,
    candidate_limit: usize,
}

impl PublicationJob {
    pub fn new(
        fetcher: Box<dyn SourceFetcher>,
        generator: Box<dyn TextGenerator>,
        publisher: Box<dyn Publisher>,
        store: SeenStore,
        seen: SeenSet,
        candidate_limit: usize,
    ) -> Self {
        Self {
            fetcher,
            generator,
            publisher,
            store,
            seen,
            candidate_limit: candidate_limit.max(1),
        }
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub async fn run(&mut self) -> JobOutcome {
        debug!(target: LOG_TARGET, stage = "fetching", limit = self.candidate_limit, "Fetching candidates");
        let candidates = match self.fetcher.fetch_top(self.candidate_limit).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(target: LOG_TARGET, error = %e, "Failed to fetch candidates, skipping this run");
                return JobOutcome::FetchFailed;
            }
        };
        info!(target: LOG_TARGET, count = candidates.len(), "Fetched candidates");

        debug!(target: LOG_TARGET, stage = "filtering", "Filtering already published items");
        let Some(item) = self.first_unseen(candidates) else {
            info!(target: LOG_TARGET, "No unseen candidates");
            return JobOutcome::NothingNew;
        };

        debug!(target: LOG_TARGET, stage = "generating", id = %item.id, "Generating text");
        let text = self.generator.generate(&item.title, &item.link).await;

        debug!(target: LOG_TARGET, stage = "publishing", id = %item.id, "Publishing");
        if let Err(e) = self.publisher.publish(&text).await {
            error!(target: LOG_TARGET, error = %e, id = %item.id, "Failed to publish item");
            return JobOutcome::PublishFailed { id: item.id };
        }

        debug!(target: LOG_TARGET, stage = "recording", id = %item.id, "Recording as seen");
        self.seen.insert(item.id.clone());
        let saved = match self.store.save(&self.seen) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    target: LOG_TARGET,
                    error = %e,
                    id = %item.id,
                    path = %self.store.path().display(),
                    "Failed to persist seen set, item may be published again after restart"
                );
                false
            }
        };

        info!(target: LOG_TARGET, id = %item.id, title = %item.title, "Published item");
        JobOutcome::Published { id: item.id, saved }
    }

    fn first_unseen(&self, candidates: Vec<CandidateItem>) -> Option<CandidateItem> {
        candidates.into_iter().find(|item| {
            let seen = self.seen.contains(&item.id);
            if seen {
                debug!(target: LOG_TARGET, id = %item.id, title = %item.title, "Already published, skipping");
            }
            !seen
        })
    }
}
