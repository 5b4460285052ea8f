//! Transcript sync for ragtube.
//!
//! Pulls channel metadata, video listings and captions from a transcript
//! provider into the corpus store.

mod captions;
mod sync;
mod youtube;

pub use captions::{caption_tracks_from_watch_page, parse_timedtext, select_track, CaptionTrack};
pub use sync::{derive_content, ChannelSync, SyncReport, TranscriptSync};
pub use youtube::{uploads_playlist_ids, YoutubeProvider};

#[cfg(test)]
pub(crate) use sync::tests;

use crate::error::Result;
use crate::store::{Caption, Channel, Video};
use async_trait::async_trait;

/// Source of channel metadata, video listings and captions.
#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    /// Look up a channel. Fails with `NotFound` when the provider has no
    /// such channel.
    async fn channel_metadata(&self, channel_id: &str) -> Result<Channel>;

    /// Every video published on a channel, without content. Fails with
    /// `NoVideosFound` when the channel is empty.
    async fn channel_videos(&self, channel_id: &str) -> Result<Vec<Video>>;

    /// Captions of a video in the given language, in provider order.
    async fn video_captions(&self, video_id: &str, language: &str) -> Result<Vec<Caption>>;
}
