//! YouTube transcript provider.
//!
//! Channel and playlist metadata come from the Data API v3; captions are
//! discovered through the watch page and downloaded as timed-text XML.

use super::captions::{caption_tracks_from_watch_page, parse_timedtext, select_track};
use super::TranscriptProvider;
use crate::config::YoutubeSettings;
use crate::error::{RagtubeError, Result};
use crate::store::{Caption, Channel, Video};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument};

const PAGE_SIZE: &str = "50";

#[derive(Deserialize)]
struct ChannelList {
    #[serde(default)]
    items: Vec<ChannelItem>,
}

#[derive(Deserialize)]
struct ChannelItem {
    snippet: ChannelSnippet,
}

#[derive(Deserialize)]
struct ChannelSnippet {
    title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistPage {
    #[serde(default)]
    items: Vec<PlaylistItem>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    snippet: PlaylistSnippet,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    title: String,
    published_at: DateTime<Utc>,
    resource_id: ResourceId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: String,
}

/// Uploads playlist IDs for a channel: the long-form videos playlist first,
/// then the catch-all uploads playlist.
pub fn uploads_playlist_ids(channel_id: &str) -> Result<(String, String)> {
    let suffix = channel_id
        .get(2..)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RagtubeError::InvalidInput(format!("invalid channel id: {}", channel_id)))?;
    Ok((format!("UULF{}", suffix), format!("UU{}", suffix)))
}

/// Transcript provider backed by YouTube.
pub struct YoutubeProvider {
    client: reqwest::Client,
    api_key: String,
    api_base_url: String,
    watch_base_url: String,
}

impl YoutubeProvider {
    /// Create a provider from settings. Requires an API key.
    pub fn new(settings: &YoutubeSettings) -> Result<Self> {
        let api_key = settings.resolved_api_key().ok_or_else(|| {
            RagtubeError::ConfigInvalid(format!(
                "YouTube API key not set (use youtube.api_key or {})",
                crate::config::YOUTUBE_API_KEY_ENV
            ))
        })?;

        for base in [&settings.api_base_url, &settings.watch_base_url] {
            url::Url::parse(base)
                .map_err(|e| RagtubeError::ConfigInvalid(format!("invalid URL '{}': {}", base, e)))?;
        }

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_seconds));
        if let Some(proxy) = &settings.https_proxy {
            builder = builder.proxy(reqwest::Proxy::https(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            api_key,
            api_base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            watch_base_url: settings.watch_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US")
            .send()
            .await
            .map_err(|e| RagtubeError::Upstream(format!("request to {} failed: {}", url, e)))?;
        Ok(response)
    }

    async fn fetch_playlist_page(
        &self,
        playlist_id: &str,
        page_token: Option<&str>,
    ) -> Result<std::result::Result<PlaylistPage, StatusCode>> {
        let url = format!("{}/playlistItems", self.api_base_url);
        let mut query = vec![
            ("part", "snippet"),
            ("playlistId", playlist_id),
            ("maxResults", PAGE_SIZE),
            ("key", self.api_key.as_str()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response = self.get(&url, &query).await?;
        let status = response.status();
        if !status.is_success() {
            return Ok(Err(status));
        }
        Ok(Ok(response.json().await?))
    }
}

#[async_trait]
impl TranscriptProvider for YoutubeProvider {
    #[instrument(skip(self))]
    async fn channel_metadata(&self, channel_id: &str) -> Result<Channel> {
        let url = format!("{}/channels", self.api_base_url);
        let response = self
            .get(&url, &[("part", "snippet"), ("id", channel_id), ("key", &self.api_key)])
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RagtubeError::NotFound(format!("channel {}", channel_id)));
        }
        if !status.is_success() {
            return Err(RagtubeError::Upstream(format!(
                "channel lookup for {} returned {}",
                channel_id, status
            )));
        }

        let list: ChannelList = response
            .json()
            .await
            .map_err(|e| RagtubeError::Upstream(format!("malformed channel response: {}", e)))?;
        let item = list
            .items
            .into_iter()
            .next()
            .ok_or_else(|| RagtubeError::NotFound(format!("channel {}", channel_id)))?;

        Ok(Channel::new(channel_id, item.snippet.title))
    }

    #[instrument(skip(self))]
    async fn channel_videos(&self, channel_id: &str) -> Result<Vec<Video>> {
        let (primary, fallback) = uploads_playlist_ids(channel_id)?;

        let mut playlist_id = primary;
        let mut page = match self.fetch_playlist_page(&playlist_id, None).await? {
            Ok(page) => page,
            Err(StatusCode::NOT_FOUND) => {
                debug!("Playlist {} not found, falling back to {}", playlist_id, fallback);
                playlist_id = fallback;
                self.fetch_playlist_page(&playlist_id, None)
                    .await?
                    .map_err(|status| playlist_error(&playlist_id, status))?
            }
            Err(status) => return Err(playlist_error(&playlist_id, status)),
        };

        let mut videos = Vec::new();
        loop {
            videos.extend(page.items.into_iter().map(|item| {
                Video::new(
                    item.snippet.resource_id.video_id,
                    item.snippet.title,
                    item.snippet.published_at,
                    channel_id,
                )
            }));

            let Some(token) = page.next_page_token.filter(|t| !t.is_empty()) else {
                break;
            };
            page = self
                .fetch_playlist_page(&playlist_id, Some(&token))
                .await?
                .map_err(|status| playlist_error(&playlist_id, status))?;
        }

        if videos.is_empty() {
            return Err(RagtubeError::NoVideosFound(channel_id.to_string()));
        }

        info!("Found {} videos on channel {}", videos.len(), channel_id);
        Ok(videos)
    }

    #[instrument(skip(self))]
    async fn video_captions(&self, video_id: &str, language: &str) -> Result<Vec<Caption>> {
        let url = format!("{}/watch", self.watch_base_url);
        let response = self.get(&url, &[("v", video_id)]).await?;
        if !response.status().is_success() {
            return Err(RagtubeError::Upstream(format!(
                "watch page for {} returned {}",
                video_id,
                response.status()
            )));
        }
        let html = response.text().await?;

        let tracks = caption_tracks_from_watch_page(&html, video_id)?;
        let track = select_track(&tracks, language)
            .ok_or_else(|| RagtubeError::TranscriptUnavailable(video_id.to_string()))?;

        let response = self.get(&track.timedtext_url(), &[]).await?;
        if !response.status().is_success() {
            return Err(RagtubeError::Upstream(format!(
                "timed text for {} returned {}",
                video_id,
                response.status()
            )));
        }
        let xml = response.text().await?;

        parse_timedtext(&xml, video_id)
    }
}

fn playlist_error(playlist_id: &str, status: StatusCode) -> RagtubeError {
    if status == StatusCode::NOT_FOUND {
        RagtubeError::NotFound(format!("uploads playlist {}", playlist_id))
    } else {
        RagtubeError::Upstream(format!("playlist {} returned {}", playlist_id, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    const CHANNEL: &str = "UC34rhn8Um7R18-BHjPklYlw";

    fn playlist_item(video_id: &str, title: &str) -> serde_json::Value {
        json!({"snippet": {
            "title": title,
            "publishedAt": "2024-08-09T16:03:23Z",
            "resourceId": {"kind": "youtube#video", "videoId": video_id}
        }})
    }

    async fn channels(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
        match query.get("id").map(String::as_str) {
            Some(CHANNEL) => Json(json!({"items": [{"snippet": {"title": "diego garrido"}}]})),
            _ => Json(json!({"items": []})),
        }
    }

    /// The long-form playlist is missing for the agile channel; its uploads
    /// playlist spans two pages.
    async fn playlist_items(Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
        let playlist = query.get("playlistId").map(String::as_str).unwrap_or_default();
        let page_token = query.get("pageToken").map(String::as_str);
        match (playlist, page_token) {
            ("UULF34rhn8Um7R18-BHjPklYlw", _) => {
                (StatusCode::NOT_FOUND, Json(json!({"error": {"code": 404}})))
            }
            ("UU34rhn8Um7R18-BHjPklYlw", None) => (
                StatusCode::OK,
                Json(json!({
                    "nextPageToken": "page-2",
                    "items": [playlist_item("Guy5D3PJlZk", "Agile Manifesto")]
                })),
            ),
            ("UU34rhn8Um7R18-BHjPklYlw", Some("page-2")) => (
                StatusCode::OK,
                Json(json!({"items": [playlist_item("second-video", "Scrum")]})),
            ),
            _ => (StatusCode::OK, Json(json!({"items": []}))),
        }
    }

    async fn watch(headers: HeaderMap, Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
        let host = headers
            .get(reqwest::header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default();
        let video_id = query.get("v").cloned().unwrap_or_default();
        format!(
            r#"<html><script>var ytInitialPlayerResponse = {{"captions":{{"playerCaptionsTracklistRenderer":{{"captionTracks":[{{"baseUrl":"http://{}/api/timedtext?v={}&lang=en","languageCode":"en"}}]}}}},"videoDetails":{{"videoId":"{}"}}}};</script></html>"#,
            host, video_id, video_id
        )
    }

    async fn timedtext() -> &'static str {
        r#"<?xml version="1.0" encoding="utf-8" ?><transcript><text start="0.199" dur="3.961">I often make this joke which is agile&amp;#39;s</text><text start="2.32" dur="4.8">a lot like communism</text></transcript>"#
    }

    async fn serve_youtube() -> YoutubeProvider {
        let app = Router::new()
            .route("/channels", get(channels))
            .route("/playlistItems", get(playlist_items))
            .route("/watch", get(watch))
            .route("/api/timedtext", get(timedtext));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let settings = YoutubeSettings {
            api_key: Some("test-key".to_string()),
            api_base_url: base.clone(),
            watch_base_url: base,
            request_timeout_seconds: 5,
            ..YoutubeSettings::default()
        };
        YoutubeProvider::new(&settings).unwrap()
    }

    #[tokio::test]
    async fn test_channel_metadata() {
        let provider = serve_youtube().await;

        let channel = provider.channel_metadata(CHANNEL).await.unwrap();
        assert_eq!(channel, Channel::new(CHANNEL, "diego garrido"));

        assert!(matches!(
            provider.channel_metadata("UCmissing").await,
            Err(RagtubeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_channel_videos_fall_back_and_follow_pages() {
        let provider = serve_youtube().await;

        let videos = provider.channel_videos(CHANNEL).await.unwrap();
        let ids: Vec<&str> = videos.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["Guy5D3PJlZk", "second-video"]);
        assert!(videos.iter().all(|v| v.channel_id == CHANNEL));
        assert_eq!(videos[0].title, "Agile Manifesto");
    }

    #[tokio::test]
    async fn test_channel_without_videos() {
        let provider = serve_youtube().await;
        assert!(matches!(
            provider.channel_videos("UCempty").await,
            Err(RagtubeError::NoVideosFound(_))
        ));
    }

    #[tokio::test]
    async fn test_video_captions_from_watch_page() {
        let provider = serve_youtube().await;

        let captions = provider.video_captions("Guy5D3PJlZk", "en").await.unwrap();
        assert_eq!(captions.len(), 2);
        assert_eq!(captions[0].text, "I often make this joke which is agile's");
        assert_eq!(captions[1].start, 2.32);

        assert!(matches!(
            provider.video_captions("Guy5D3PJlZk", "de").await,
            Err(RagtubeError::TranscriptUnavailable(_))
        ));
    }

    #[test]
    fn test_uploads_playlist_ids() {
        let (primary, fallback) = uploads_playlist_ids("UC34rhn8Um7R18-BHjPklYlw").unwrap();
        assert_eq!(primary, "UULF34rhn8Um7R18-BHjPklYlw");
        assert_eq!(fallback, "UU34rhn8Um7R18-BHjPklYlw");
        assert!(uploads_playlist_ids("UC").is_err());
    }

    #[test]
    fn test_playlist_page_deserializes() {
        let json = r#"{
            "nextPageToken": "CDIQAA",
            "items": [{"snippet": {
                "title": "Agile Manifesto",
                "publishedAt": "2024-08-09T16:03:23Z",
                "resourceId": {"kind": "youtube#video", "videoId": "Guy5D3PJlZk"}
            }}]
        }"#;
        let page: PlaylistPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("CDIQAA"));
        assert_eq!(page.items[0].snippet.resource_id.video_id, "Guy5D3PJlZk");
        assert_eq!(
            page.items[0].snippet.published_at.to_rfc3339(),
            "2024-08-09T16:03:23+00:00"
        );
    }

    #[test]
    fn test_provider_requires_api_key() {
        if std::env::var(crate::config::YOUTUBE_API_KEY_ENV).is_ok() {
            return;
        }
        let settings = YoutubeSettings::default();
        assert!(matches!(
            YoutubeProvider::new(&settings),
            Err(RagtubeError::ConfigInvalid(_))
        ));
    }
}
