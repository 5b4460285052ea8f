//! Caption track discovery and timed-text decoding.

use crate::error::{RagtubeError, Result};
use crate::store::Caption;
use scraper::{Html, Selector};
use serde::Deserialize;

/// A caption track advertised by a watch page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionTrack {
    pub base_url: String,
    pub language_code: String,
    /// `"asr"` for automatically generated tracks.
    #[serde(default)]
    pub kind: Option<String>,
}

impl CaptionTrack {
    pub fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }

    /// Timed-text URL in the default XML format.
    pub fn timedtext_url(&self) -> String {
        self.base_url.replace("&fmt=srv3", "")
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionsJson {
    player_captions_tracklist_renderer: Option<TracklistRenderer>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TracklistRenderer {
    #[serde(default)]
    caption_tracks: Vec<CaptionTrack>,
}

/// Extract the caption tracks embedded in a watch page.
pub fn caption_tracks_from_watch_page(html: &str, video_id: &str) -> Result<Vec<CaptionTrack>> {
    let Some((_, after)) = html.split_once("\"captions\":") else {
        if html.contains("class=\"g-recaptcha\"") {
            return Err(RagtubeError::Upstream(
                "too many requests, the provider is asking for a captcha".to_string(),
            ));
        }
        return Err(RagtubeError::TranscriptUnavailable(video_id.to_string()));
    };

    let json = after
        .split_once(",\"videoDetails")
        .map(|(captions, _)| captions)
        .ok_or_else(|| {
            RagtubeError::Upstream(format!("unexpected watch page layout for {}", video_id))
        })?;

    let captions: CaptionsJson = serde_json::from_str(json)?;
    let tracks = captions
        .player_captions_tracklist_renderer
        .map(|r| r.caption_tracks)
        .unwrap_or_default();

    if tracks.is_empty() {
        return Err(RagtubeError::TranscriptUnavailable(video_id.to_string()));
    }
    Ok(tracks)
}

/// Pick the track for `language`, preferring manually created ones.
pub fn select_track<'a>(tracks: &'a [CaptionTrack], language: &str) -> Option<&'a CaptionTrack> {
    let matching = || tracks.iter().filter(|t| t.language_code == language);
    matching()
        .find(|t| !t.is_generated())
        .or_else(|| matching().next())
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| RagtubeError::InvalidInput(format!("bad selector {}: {:?}", css, e)))
}

/// Decode a timed-text XML document into captions.
///
/// Empty lines are dropped. The provider escapes entities and inline markup
/// a second time inside the XML, so each line's text is parsed again as a
/// fragment and only its text nodes are kept.
pub fn parse_timedtext(xml: &str, video_id: &str) -> Result<Vec<Caption>> {
    let document = Html::parse_fragment(xml);
    let text_selector = selector("text")?;

    let mut captions = Vec::new();
    for line in document.select(&text_selector) {
        let start = line.value().attr("start").unwrap_or_default();
        let start: f64 = start.parse().map_err(|_| {
            RagtubeError::Upstream(format!("invalid caption start '{}' for {}", start, video_id))
        })?;
        let duration: f64 = line
            .value()
            .attr("dur")
            .and_then(|d| d.parse().ok())
            .unwrap_or(0.0);

        let text = fragment_text(&line.text().collect::<String>());
        if text.is_empty() {
            continue;
        }

        captions.push(Caption::new(text, start, duration, video_id));
    }

    Ok(captions)
}

/// Text content of an HTML fragment with entities decoded and tags dropped.
pub fn fragment_text(html: &str) -> String {
    Html::parse_fragment(html)
        .root_element()
        .text()
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WATCH_PAGE: &str = r#"<html><script>var ytInitialPlayerResponse = {"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[{"baseUrl":"https://www.youtube.com/api/timedtext?v=Guy5D3PJlZk&lang=en&kind=asr&fmt=srv3","languageCode":"en","kind":"asr"},{"baseUrl":"https://www.youtube.com/api/timedtext?v=Guy5D3PJlZk&lang=en","languageCode":"en"},{"baseUrl":"https://www.youtube.com/api/timedtext?v=Guy5D3PJlZk&lang=es","languageCode":"es"}]}},"videoDetails":{"videoId":"Guy5D3PJlZk"}};</script></html>"#;

    #[test]
    fn test_tracks_from_watch_page() {
        let tracks = caption_tracks_from_watch_page(WATCH_PAGE, "Guy5D3PJlZk").unwrap();
        assert_eq!(tracks.len(), 3);
        assert!(tracks[0].is_generated());
        assert_eq!(
            tracks[0].timedtext_url(),
            "https://www.youtube.com/api/timedtext?v=Guy5D3PJlZk&lang=en&kind=asr"
        );
    }

    #[test]
    fn test_manual_track_is_preferred() {
        let tracks = caption_tracks_from_watch_page(WATCH_PAGE, "Guy5D3PJlZk").unwrap();
        let track = select_track(&tracks, "en").unwrap();
        assert!(!track.is_generated());
        assert_eq!(select_track(&tracks, "es").unwrap().language_code, "es");
        assert!(select_track(&tracks, "de").is_none());
    }

    #[test]
    fn test_page_without_captions() {
        assert!(matches!(
            caption_tracks_from_watch_page("<html></html>", "abc"),
            Err(RagtubeError::TranscriptUnavailable(_))
        ));
        assert!(matches!(
            caption_tracks_from_watch_page(r#"<div class="g-recaptcha"></div>"#, "abc"),
            Err(RagtubeError::Upstream(_))
        ));
    }

    #[test]
    fn test_parse_timedtext() {
        let xml = r#"<?xml version="1.0" encoding="utf-8" ?><transcript><text start="0.199" dur="3.961">I often make this joke which is agile&amp;#39;s</text><text start="2.32" dur="4.8">a lot like &lt;i&gt;communism&lt;/i&gt; you know people</text><text start="5" dur="1"></text></transcript>"#;

        let captions = parse_timedtext(xml, "Guy5D3PJlZk").unwrap();
        assert_eq!(captions.len(), 2);
        assert_eq!(captions[0].text, "I often make this joke which is agile's");
        assert_eq!(captions[0].start, 0.199);
        assert_eq!(captions[0].duration, 3.961);
        assert_eq!(captions[1].text, "a lot like communism you know people");
        assert_eq!(captions[1].video_id, "Guy5D3PJlZk");
    }

    #[test]
    fn test_timedtext_without_duration() {
        let xml = r#"<transcript><text start="1.5">fish &amp;amp; chips</text></transcript>"#;
        let captions = parse_timedtext(xml, "abc").unwrap();
        assert_eq!(captions.len(), 1);
        assert_eq!(captions[0].text, "fish & chips");
        assert_eq!(captions[0].duration, 0.0);
    }

    #[test]
    fn test_invalid_start_is_upstream_error() {
        let xml = r#"<transcript><text start="soon" dur="1">hi</text></transcript>"#;
        assert!(matches!(
            parse_timedtext(xml, "abc"),
            Err(RagtubeError::Upstream(_))
        ));
    }

    #[test]
    fn test_fragment_text() {
        assert_eq!(fragment_text("a &amp; b &#39;c&#x27; &lt;"), "a & b 'c' <");
        assert_eq!(fragment_text("fish & chips"), "fish & chips");
        assert_eq!(fragment_text(" <b>bold</b> move "), "bold move");
    }
}
