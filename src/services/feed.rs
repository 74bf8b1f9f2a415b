use std::sync::Arc;
use tokio::task::JoinSet;

use crate::error::{AppError, Result};
use crate::models::{CandidatePost, Listing, ListingType};
use crate::services::CandidateQueue;

/// Fixed page size; follow-on pages are never requested.
const LISTING_LIMIT: u32 = 100;

/// Counters from one poll cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub pairs: usize,
    pub failed: usize,
    pub enqueued: usize,
    pub dropped: usize,
}

/// Fetches subreddit listings and feeds every post to the candidate queue
pub struct FeedPoller {
    client: reqwest::Client,
    api_base: String,
    subreddits: Vec<String>,
    listing_types: Vec<ListingType>,
    queue: Arc<CandidateQueue>,
}

impl FeedPoller {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        subreddits: Vec<String>,
        listing_types: Vec<ListingType>,
        queue: Arc<CandidateQueue>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            subreddits,
            listing_types,
            queue,
        }
    }

    pub fn listing_url(&self, subreddit: &str, listing_type: ListingType) -> String {
        format!(
            "{}/r/{}/{}.json?limit={}",
            self.api_base.trim_end_matches('/'),
            subreddit,
            listing_type,
            LISTING_LIMIT
        )
    }

    /// Fetch every (subreddit, listing type) pair concurrently.
    ///
    /// Posts are queued unfiltered as each fetch completes. A failed pair is
    /// logged and does not affect the others.
    pub async fn poll_once(&self) -> PollSummary {
        let mut fetches = JoinSet::new();

        for subreddit in &self.subreddits {
            for &listing_type in &self.listing_types {
                let client = self.client.clone();
                let url = self.listing_url(subreddit, listing_type);
                let subreddit = subreddit.clone();
                let queue = self.queue.clone();

                fetches.spawn(async move {
                    match fetch_listing(&client, &url, listing_type).await {
                        Ok(posts) => {
                            let count = posts.len();
                            tracing::info!(
                                "Got {} posts for r/{} ({})",
                                count,
                                subreddit,
                                listing_type
                            );
                            let dropped = queue.extend(posts);
                            Some((count, dropped))
                        }
                        Err(AppError::Unsuccessful(status)) => {
                            tracing::warn!(
                                "Got status code {} for r/{} ({})",
                                status,
                                subreddit,
                                listing_type
                            );
                            None
                        }
                        Err(e) => {
                            tracing::error!(
                                "Could not fetch r/{} ({}) from {}: {}",
                                subreddit,
                                listing_type,
                                url,
                                e
                            );
                            None
                        }
                    }
                });
            }
        }

        let mut summary = PollSummary::default();
        while let Some(joined) = fetches.join_next().await {
            summary.pairs += 1;
            match joined {
                Ok(Some((count, dropped))) => {
                    summary.enqueued += count;
                    summary.dropped += dropped;
                }
                Ok(None) => summary.failed += 1,
                Err(e) => {
                    tracing::error!("Listing fetch task failed: {}", e);
                    summary.failed += 1;
                }
            }
        }

        if summary.dropped > 0 {
            tracing::warn!("Candidate queue full, dropped {} posts", summary.dropped);
        }
        tracing::info!(
            "Polled {} listings ({} failed), queued {} posts; {} waiting",
            summary.pairs,
            summary.failed,
            summary.enqueued,
            self.queue.len()
        );
        summary
    }
}

/// Issue one listing request and decode its posts.
pub async fn fetch_listing(
    client: &reqwest::Client,
    url: &str,
    listing_type: ListingType,
) -> Result<Vec<CandidatePost>> {
    tracing::trace!("Requesting {}", url);
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(AppError::Unsuccessful(response.status()));
    }

    let body = response.bytes().await?;
    let listing: Listing = serde_json::from_slice(&body)?;
    Ok(listing.into_posts(listing_type))
}
