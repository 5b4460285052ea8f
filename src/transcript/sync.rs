//! Incremental channel sync.

use super::TranscriptProvider;
use crate::config::Settings;
use crate::error::{RagtubeError, Result};
use crate::store::{watch_url, Caption, Channel, CorpusStore, Video};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// What a channel sync did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub channel_id: String,
    /// Videos listed by the provider.
    pub discovered: usize,
    /// Videos not yet in the store.
    pub missing: usize,
    /// Videos stored with their captions during this run.
    pub transcribed: usize,
    /// Videos without captions (unavailable, failed or timed out).
    pub skipped: usize,
    /// Videos whose write lost a race with a concurrent sync.
    pub failed: usize,
}

/// Result of syncing one channel among several.
#[derive(Debug)]
pub struct ChannelSync {
    pub channel_id: String,
    pub result: Result<SyncReport>,
}

enum VideoOutcome {
    Transcribed,
    Skipped,
    Failed,
}

/// Derive a video's content: captions sorted by start, joined by spaces.
pub fn derive_content(captions: &mut [Caption]) -> String {
    captions.sort_by(|a, b| a.start.total_cmp(&b.start));
    captions
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Syncs channels from a transcript provider into the corpus store.
pub struct TranscriptSync {
    store: Arc<CorpusStore>,
    provider: Arc<dyn TranscriptProvider>,
    language: String,
    timeout: Duration,
    max_concurrent_fetches: usize,
}

impl TranscriptSync {
    pub fn new(
        store: Arc<CorpusStore>,
        provider: Arc<dyn TranscriptProvider>,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            provider,
            language: settings.sync.language.clone(),
            timeout: Duration::from_secs(settings.youtube.request_timeout_seconds),
            max_concurrent_fetches: settings.sync.max_concurrent_fetches.max(1),
        }
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T>(&self, what: String, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RagtubeError::Timeout {
                what,
                seconds: self.timeout.as_secs(),
            }),
        }
    }

    pub async fn fetch_channel_metadata(&self, channel_id: &str) -> Result<Channel> {
        self.bounded(
            format!("channel lookup {}", channel_id),
            self.provider.channel_metadata(channel_id),
        )
        .await
    }

    pub async fn fetch_channel_videos(&self, channel_id: &str) -> Result<Vec<Video>> {
        self.bounded(
            format!("video listing {}", channel_id),
            self.provider.channel_videos(channel_id),
        )
        .await
    }

    /// Videos not yet stored under the channel, in listing order.
    pub fn diff_against_store(&self, channel_id: &str, videos: Vec<Video>) -> Result<Vec<Video>> {
        let known = self.store.video_ids_for_channel(channel_id)?;
        let mut seen = HashSet::new();
        Ok(videos
            .into_iter()
            .filter(|v| !known.contains(&v.id) && seen.insert(v.id.clone()))
            .collect())
    }

    /// Captions of a video, or `None` when they cannot be had right now.
    ///
    /// Never fails: timeouts, unavailable transcripts and provider errors are
    /// logged and the video is retried on the next sync.
    pub async fn fetch_video_captions(&self, video_id: &str) -> Option<Vec<Caption>> {
        let call = self.provider.video_captions(video_id, &self.language);
        match self.bounded(format!("captions {}", video_id), call).await {
            Ok(captions) if !captions.is_empty() => Some(captions),
            Ok(_) => {
                warn!("No captions returned for {}", watch_url(video_id));
                None
            }
            Err(e) if e.is_item_recoverable() => {
                warn!("Could not retrieve a transcript for {}: {}", watch_url(video_id), e);
                None
            }
            Err(e) => {
                error!("Caption fetch failed for {}: {}", watch_url(video_id), e);
                None
            }
        }
    }

    async fn transcribe_video(&self, mut video: Video) -> Result<VideoOutcome> {
        let Some(mut captions) = self.fetch_video_captions(&video.id).await else {
            return Ok(VideoOutcome::Skipped);
        };

        let content = derive_content(&mut captions);
        if content.trim().is_empty() {
            warn!("Captions of {} are blank, skipping", video.id);
            return Ok(VideoOutcome::Skipped);
        }
        video.content = Some(content);

        match self.store.insert_transcribed_video(&video, &captions) {
            Ok(()) => Ok(VideoOutcome::Transcribed),
            Err(RagtubeError::ConstraintViolation(reason)) => {
                warn!("Video {} was not stored: {}", video.id, reason);
                Ok(VideoOutcome::Failed)
            }
            Err(e) => Err(e),
        }
    }

    /// Bring one channel up to date.
    #[instrument(skip(self))]
    pub async fn sync_channel(&self, channel_id: &str) -> Result<SyncReport> {
        let channel = self.fetch_channel_metadata(channel_id).await?;
        self.store.insert_channel_if_absent(&channel)?;

        let videos = self.fetch_channel_videos(channel_id).await?;
        let mut report = SyncReport {
            channel_id: channel_id.to_string(),
            discovered: videos.len(),
            ..Default::default()
        };

        let missing = self.diff_against_store(channel_id, videos)?;
        report.missing = missing.len();
        if missing.is_empty() {
            info!("Channel '{}' is up to date", channel.title);
            return Ok(report);
        }

        info!(
            "Fetching captions for {} new videos on '{}'",
            missing.len(),
            channel.title
        );

        let outcomes: Vec<Result<VideoOutcome>> = stream::iter(missing)
            .map(|video| self.transcribe_video(video))
            .buffer_unordered(self.max_concurrent_fetches)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome? {
                VideoOutcome::Transcribed => report.transcribed += 1,
                VideoOutcome::Skipped => report.skipped += 1,
                VideoOutcome::Failed => report.failed += 1,
            }
        }

        info!(
            "Channel '{}': {} transcribed, {} skipped, {} failed",
            channel.title, report.transcribed, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Sync several channels. A failure on one channel does not stop the
    /// others.
    pub async fn sync_channels(&self, channel_ids: &[String]) -> Vec<ChannelSync> {
        let mut results = Vec::with_capacity(channel_ids.len());
        for channel_id in channel_ids {
            let result = self.sync_channel(channel_id).await;
            if let Err(e) = &result {
                error!("Sync of channel {} failed: {}", channel_id, e);
            }
            results.push(ChannelSync {
                channel_id: channel_id.clone(),
                result,
            });
        }
        results
    }
}
