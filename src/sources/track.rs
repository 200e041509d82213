use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::time::Duration;

use crate::error::ResolutionError;

/// A queued track whose streaming endpoint is not known yet.
///
/// Produced by [`TrackResolver::resolve_preview`](super::TrackResolver::resolve_preview)
/// when a user enqueues something, and promoted to a [`FullTrack`] right
/// before it is handed to the sink.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewTrack {
    title: Option<String>,
    url: String,
    requested_by: UserId,
    search_term: Option<String>,
    added_at: DateTime<Utc>,
}

impl PreviewTrack {
    pub fn new(url: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            title: None,
            url: url.into(),
            requested_by,
            search_term: None,
            added_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_search_term(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Title if known, canonical URL otherwise.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search_term.as_deref()
    }

    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }
}

/// A track with everything the sink needs to stream it.
///
/// Only constructible through [`FullTrack::promote`], which refuses to build
/// a track missing any of stream URL, duration or thumbnail.
#[derive(Debug, Clone, PartialEq)]
pub struct FullTrack {
    title: String,
    artist: Option<String>,
    url: String,
    stream_url: String,
    duration: Duration,
    thumbnail: String,
    requested_by: UserId,
    search_term: Option<String>,
}

/// Metadata returned by a full resolution pass.
#[derive(Debug, Clone, Default)]
pub struct ResolvedMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub stream_url: Option<String>,
    pub duration: Option<Duration>,
    pub thumbnail: Option<String>,
}

impl FullTrack {
    pub fn promote(
        preview: &PreviewTrack,
        metadata: ResolvedMetadata,
    ) -> Result<Self, ResolutionError> {
        let incomplete = |missing| ResolutionError::Incomplete {
            url: preview.url.clone(),
            missing,
        };

        let stream_url = metadata
            .stream_url
            .filter(|s| !s.is_empty())
            .ok_or_else(|| incomplete("a stream url"))?;
        let duration = metadata.duration.ok_or_else(|| incomplete("a duration"))?;
        let thumbnail = metadata
            .thumbnail
            .filter(|s| !s.is_empty())
            .ok_or_else(|| incomplete("a thumbnail"))?;

        let title = metadata
            .title
            .or_else(|| preview.title.clone())
            .unwrap_or_else(|| preview.url.clone());

        Ok(Self {
            title,
            artist: metadata.artist,
            url: preview.url.clone(),
            stream_url,
            duration,
            thumbnail,
            requested_by: preview.requested_by,
            search_term: preview.search_term.clone(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }
    pub fn url(&self) -> &str {
        &self.url
    }
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }
    pub fn duration(&self) -> Duration {
        self.duration
    }
    pub fn thumbnail(&self) -> &str {
        &self.thumbnail
    }
    pub fn requested_by(&self) -> UserId {
        self.requested_by
    }
    pub fn search_term(&self) -> Option<&str> {
        self.search_term.as_deref()
    }
}

impl std::fmt::Display for FullTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "**{}**", self.title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_metadata() -> ResolvedMetadata {
        ResolvedMetadata {
            title: Some("Resolved".to_string()),
            artist: Some("Uploader".to_string()),
            stream_url: Some("https://cdn.example/audio".to_string()),
            duration: Some(Duration::from_secs(215)),
            thumbnail: Some("https://img.example/t.jpg".to_string()),
        }
    }

    #[test]
    fn test_promote_keeps_identity_and_requester() {
        let preview = PreviewTrack::new("https://youtu.be/abc", UserId::new(7))
            .with_title("Preview title")
            .with_search_term("some song");

        let full = FullTrack::promote(&preview, complete_metadata()).unwrap();

        assert_eq!(full.url(), "https://youtu.be/abc");
        assert_eq!(full.title(), "Resolved");
        assert_eq!(full.requested_by(), UserId::new(7));
        assert_eq!(full.search_term(), Some("some song"));
        assert_eq!(full.duration(), Duration::from_secs(215));
    }

    #[test]
    fn test_promote_falls_back_to_preview_title() {
        let preview = PreviewTrack::new("https://youtu.be/abc", UserId::new(1)).with_title("Kept");
        let metadata = ResolvedMetadata {
            title: None,
            ..complete_metadata()
        };

        let full = FullTrack::promote(&preview, metadata).unwrap();
        assert_eq!(full.title(), "Kept");
    }

    #[test]
    fn test_promote_rejects_partial_metadata() {
        let preview = PreviewTrack::new("https://youtu.be/abc", UserId::new(1));

        let no_stream = ResolvedMetadata {
            stream_url: None,
            ..complete_metadata()
        };
        assert_eq!(
            FullTrack::promote(&preview, no_stream),
            Err(ResolutionError::Incomplete {
                url: "https://youtu.be/abc".to_string(),
                missing: "a stream url",
            })
        );

        let no_thumbnail = ResolvedMetadata {
            thumbnail: Some(String::new()),
            ..complete_metadata()
        };
        assert!(matches!(
            FullTrack::promote(&preview, no_thumbnail),
            Err(ResolutionError::Incomplete { missing: "a thumbnail", .. })
        ));

        let no_duration = ResolvedMetadata {
            duration: None,
            ..complete_metadata()
        };
        assert!(FullTrack::promote(&preview, no_duration).is_err());
    }

    #[test]
    fn test_display_title_falls_back_to_url() {
        let preview = PreviewTrack::new("https://example.com/x", UserId::new(1));
        assert_eq!(preview.display_title(), "https://example.com/x");
        assert_eq!(preview.with_title("Named").display_title(), "Named");
    }
}
