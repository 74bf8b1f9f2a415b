use reqwest::header::CONTENT_TYPE;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{CandidatePost, NewImage};
use crate::services::{CandidateQueue, ImageService, SafetyFilter, WorkerPool};
use crate::storage::{BlobStore, BlobWrite, Fingerprint};

/// Largest accepted image body, exclusive.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 16 * 1024 * 1024;

/// Why a download was abandoned without being an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Oversized,
    MissingContentType,
}

/// Result of fetching a post's media URL
#[derive(Debug)]
pub enum Download {
    Image { content_type: String, body: Vec<u8> },
    Rejected(Rejection),
}

/// Result of committing a downloaded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    Stored { id: i64, fingerprint: Fingerprint },
    Duplicate(Fingerprint),
}

/// Final state of one dispatched post
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Stored(i64),
    Duplicate,
    Rejected(Rejection),
    Failed,
}

/// Counters from one processor run
#[derive(Debug, Default)]
pub struct ProcessReport {
    pub processed: usize,
    pub dispatched: usize,
    /// One handle per dispatched post; dropping them detaches the jobs.
    pub jobs: Vec<JoinHandle<ImageOutcome>>,
}

/// Download → fingerprint → commit, run on the worker pool
#[derive(Clone)]
pub struct ImagePipeline {
    client: reqwest::Client,
    db: Database,
    blobs: Arc<dyn BlobStore>,
    workers: WorkerPool,
    max_image_bytes: u64,
}

impl ImagePipeline {
    pub fn new(
        client: reqwest::Client,
        db: Database,
        blobs: Arc<dyn BlobStore>,
        workers: WorkerPool,
        max_image_bytes: u64,
    ) -> Self {
        Self {
            client,
            db,
            blobs,
            workers,
            max_image_bytes,
        }
    }

    /// Start handling a post without waiting for any network I/O.
    pub fn dispatch(&self, post: CandidatePost) -> JoinHandle<ImageOutcome> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.handle(post).await })
    }

    async fn handle(self, post: CandidatePost) -> ImageOutcome {
        // The safety filter rejects URL-less posts; this only guards direct dispatch.
        let Some(url) = post.url.clone() else {
            tracing::warn!("Post {} has no media URL, skipping", post.permalink);
            return ImageOutcome::Failed;
        };

        let download = {
            let client = self.client.clone();
            let url = url.clone();
            let max = self.max_image_bytes;
            self.workers
                .spawn(async move { download(&client, &url, max).await })
        };

        let (content_type, body) = match download.await {
            Ok(Some(Ok(Download::Image { content_type, body }))) => (content_type, body),
            Ok(Some(Ok(Download::Rejected(rejection)))) => {
                match rejection {
                    Rejection::Oversized => {
                        tracing::info!("Post is over the size limit: {}", post.permalink)
                    }
                    Rejection::MissingContentType => {
                        tracing::info!("No content type found for {}", post.permalink)
                    }
                }
                return ImageOutcome::Rejected(rejection);
            }
            Ok(Some(Err(AppError::Unsuccessful(status)))) => {
                tracing::warn!(
                    "Post {} could not be fetched. HTTP status: {}",
                    post.permalink,
                    status
                );
                return ImageOutcome::Failed;
            }
            Ok(Some(Err(e))) => {
                tracing::error!("Could not request the image of post {}: {}", post.permalink, e);
                return ImageOutcome::Failed;
            }
            Ok(None) => return ImageOutcome::Failed,
            Err(e) => {
                tracing::error!("Download task for {} failed: {}", post.permalink, e);
                return ImageOutcome::Failed;
            }
        };

        let fingerprint = Fingerprint::of(&body);
        let image = NewImage {
            hash: fingerprint.to_vec(),
            permalink: post.permalink.clone(),
            source_url: url,
            content_type,
        };

        let commit = {
            let db = self.db.clone();
            let blobs = self.blobs.clone();
            self.workers
                .spawn(async move { commit(&db, blobs.as_ref(), fingerprint, &image, &body).await })
        };

        match commit.await {
            Ok(Some(Ok(Commit::Stored { id, fingerprint }))) => {
                tracing::info!("Stored image {} ({}) from {}", id, fingerprint, post.permalink);
                ImageOutcome::Stored(id)
            }
            Ok(Some(Ok(Commit::Duplicate(fingerprint)))) => {
                tracing::debug!("Image {} from {} is a duplicate", fingerprint, post.permalink);
                ImageOutcome::Duplicate
            }
            Ok(Some(Err(e))) => {
                tracing::error!(
                    "Could not save image of hash {} at {}: {}",
                    fingerprint,
                    post.permalink,
                    e
                );
                ImageOutcome::Failed
            }
            Ok(None) => ImageOutcome::Failed,
            Err(e) => {
                tracing::error!("Commit task for {} failed: {}", post.permalink, e);
                ImageOutcome::Failed
            }
        }
    }
}

/// Drains the candidate queue and hands image posts to the pipeline
pub struct PostProcessor {
    queue: Arc<CandidateQueue>,
    filter: SafetyFilter,
    pipeline: ImagePipeline,
}

impl PostProcessor {
    pub fn new(queue: Arc<CandidateQueue>, filter: SafetyFilter, pipeline: ImagePipeline) -> Self {
        Self {
            queue,
            filter,
            pipeline,
        }
    }

    /// Pop until the queue is empty, dispatching every safe image post.
    pub fn run_once(&self) -> ProcessReport {
        let mut report = ProcessReport::default();

        while let Some(post) = self.queue.pop() {
            report.processed += 1;
            if !self.filter.is_safe(&post) || !post.is_image() {
                tracing::trace!("Skipping post {}", post.permalink);
                continue;
            }

            report.jobs.push(self.pipeline.dispatch(post));
            report.dispatched += 1;
        }

        tracing::info!(
            "Processed {} posts, queued {} downloads.",
            report.processed,
            report.dispatched
        );
        report
    }
}

/// Fetch an image body, giving up once it reaches `max_bytes`.
pub async fn download(client: &reqwest::Client, url: &str, max_bytes: u64) -> Result<Download> {
    let mut response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(AppError::Unsuccessful(response.status()));
    }

    let content_type = match response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    {
        Some(value) if !value.trim().is_empty() => value.to_string(),
        _ => return Ok(Download::Rejected(Rejection::MissingContentType)),
    };

    if response.content_length().is_some_and(|len| len >= max_bytes) {
        return Ok(Download::Rejected(Rejection::Oversized));
    }

    let capacity = response.content_length().unwrap_or(0).min(max_bytes);
    let mut body = Vec::with_capacity(capacity as usize);
    while let Some(chunk) = response.chunk().await? {
        if (body.len() + chunk.len()) as u64 >= max_bytes {
            return Ok(Download::Rejected(Rejection::Oversized));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(Download::Image { content_type, body })
}

/// Persist an image: blob first, then its row.
///
/// An existing blob, or a row racing in for the same fingerprint, makes this
/// a duplicate rather than an error.
pub async fn commit(
    db: &Database,
    blobs: &dyn BlobStore,
    fingerprint: Fingerprint,
    image: &NewImage,
    body: &[u8],
) -> Result<Commit> {
    if blobs.exists(&fingerprint).await? {
        return Ok(Commit::Duplicate(fingerprint));
    }

    if blobs.put_if_absent(&fingerprint, body).await? == BlobWrite::AlreadyExists {
        return Ok(Commit::Duplicate(fingerprint));
    }

    match ImageService::insert(db, image).await {
        Ok(id) => Ok(Commit::Stored { id, fingerprint }),
        Err(e) if e.is_unique_violation() => Ok(Commit::Duplicate(fingerprint)),
        Err(e) => Err(e),
    }
}
