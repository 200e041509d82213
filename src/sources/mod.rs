//! # Sources Module
//!
//! Boundary to the external media resolver.
//!
//! Resolution happens in two phases:
//!
//! - **Preview**: raw user input (URL or free text) becomes one or more
//!   [`PreviewTrack`]s carrying only a title and canonical URL. Cheap, done
//!   at enqueue time.
//! - **Full**: a [`PreviewTrack`] is promoted to a [`FullTrack`] with stream
//!   URL, duration and thumbnail. Expensive, done lazily by the player loop
//!   right before playback.
//!
//! Both phases are network-bound and run as awaited futures so they never
//! block the task driving a session.

pub mod track;
pub mod ytdlp;

use async_trait::async_trait;
use serenity::model::id::UserId;
use url::Url;

use crate::error::ResolutionError;

pub use track::{FullTrack, PreviewTrack, ResolvedMetadata};
pub use ytdlp::YtDlpResolver;

/// Resolves user input and queued tracks into playable media.
///
/// Implementations must be safe to call repeatedly for the same track.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Turns a URL or search term into preview tracks. Never returns an
    /// empty list: no match is [`ResolutionError::NoMatches`].
    async fn resolve_preview(
        &self,
        input: &str,
        requested_by: UserId,
    ) -> Result<Vec<PreviewTrack>, ResolutionError>;

    /// Fetches the stream URL, duration and thumbnail for a preview track.
    async fn resolve_full(&self, track: &PreviewTrack) -> Result<FullTrack, ResolutionError>;
}

/// Classified user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Url(Url),
    Search(String),
}

impl Query {
    /// URL if the input has both a scheme and a host, search term otherwise.
    pub fn classify(input: &str) -> Result<Self, ResolutionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ResolutionError::NoMatches(input.to_string()));
        }

        match Url::parse(trimmed) {
            Ok(url) if !url.scheme().is_empty() && url.host_str().is_some() => Ok(Query::Url(url)),
            _ => Ok(Query::Search(trimmed.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_urls() {
        for input in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "  https://youtu.be/dQw4w9WgXcQ ",
            "http://example.com/song.mp3",
        ] {
            assert!(matches!(Query::classify(input), Ok(Query::Url(_))), "{}", input);
        }
    }

    #[test]
    fn test_classify_search_terms() {
        assert_eq!(
            Query::classify("never gonna give you up").unwrap(),
            Query::Search("never gonna give you up".to_string())
        );
        // scheme without a host is not a URL
        assert_eq!(
            Query::classify("artist:song").unwrap(),
            Query::Search("artist:song".to_string())
        );
        assert_eq!(
            Query::classify("mailto:someone").unwrap(),
            Query::Search("mailto:someone".to_string())
        );
    }

    #[test]
    fn test_classify_empty_input() {
        assert!(matches!(
            Query::classify("   "),
            Err(ResolutionError::NoMatches(_))
        ));
    }
}
