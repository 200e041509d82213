use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use serenity::model::id::UserId;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{FullTrack, PreviewTrack, Query, ResolvedMetadata, TrackResolver};
use crate::error::ResolutionError;

/// Resolver backed by the `yt-dlp` executable.
///
/// Search terms go through yt-dlp's default YouTube search (`ytsearch1:`).
/// Playlist URLs are expanded flat, so previews cost one process call no
/// matter how many entries the playlist has.
pub struct YtDlpResolver {
    executable: String,
    max_playlist_size: usize,
    timeout: Duration,
    rate_limiter: Semaphore,
}

/// Subset of yt-dlp's `--dump-json` output we care about.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
    url: Option<String>,
}

impl YtDlpInfo {
    /// Canonical page URL. Flat playlist entries only carry `url`.
    fn canonical_url(&self) -> Option<&str> {
        self.webpage_url
            .as_deref()
            .or(self.original_url.as_deref())
            .or(self.url.as_deref())
    }
}

impl YtDlpResolver {
    pub fn new(
        executable: impl Into<String>,
        max_playlist_size: usize,
        timeout: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            executable: executable.into(),
            max_playlist_size,
            timeout,
            rate_limiter: Semaphore::new(max_concurrent.max(1)),
        }
    }

    /// Checks that the executable runs at all.
    pub async fn verify(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.executable)
            .arg("--version")
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!("{} --version exited with {}", self.executable, output.status);
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, ResolutionError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolutionError::Backend(e.to_string()))?;

        let mut cmd = Command::new(&self.executable);
        cmd.args(args).kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ResolutionError::Backend(format!(
                "failed to run {}: {}",
                self.executable, e
            ))),
            Err(_) => Err(ResolutionError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve_preview(
        &self,
        input: &str,
        requested_by: UserId,
    ) -> Result<Vec<PreviewTrack>, ResolutionError> {
        let query = Query::classify(input)?;
        let playlist_end = self.max_playlist_size.max(1).to_string();

        let (target, search_term) = match &query {
            Query::Url(url) => (url.to_string(), None),
            Query::Search(term) => (format!("ytsearch1:{}", term), Some(term.as_str())),
        };
        info!("🔍 Resolving preview for {}", target);

        let output = self
            .run(&[
                "--flat-playlist",
                "--dump-json",
                "--no-warnings",
                "--playlist-end",
                &playlist_end,
                &target,
            ])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp preview failed for {}: {}", target, stderr.trim());
            return Err(ResolutionError::NoMatches(input.to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let tracks = parse_preview_lines(&stdout, requested_by, search_term);
        if tracks.is_empty() {
            return Err(ResolutionError::NoMatches(input.to_string()));
        }

        debug!("Preview for {} produced {} tracks", target, tracks.len());
        Ok(tracks)
    }

    async fn resolve_full(&self, track: &PreviewTrack) -> Result<FullTrack, ResolutionError> {
        info!("🎵 Resolving stream for {}", track.url());

        let output = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "--no-warnings",
                "-f",
                "bestaudio/best",
                track.url(),
            ])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolutionError::Unavailable {
                url: track.url().to_string(),
                reason: stderr.trim().to_string(),
            });
        }

        parse_full(&String::from_utf8_lossy(&output.stdout), track)
    }
}

/// One JSON object per line; lines that do not parse or carry no URL are skipped.
fn parse_preview_lines(
    stdout: &str,
    requested_by: UserId,
    search_term: Option<&str>,
) -> Vec<PreviewTrack> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<YtDlpInfo>(line) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("Skipping unparseable yt-dlp line: {}", e);
                None
            }
        })
        .filter_map(|info| {
            let url = info.canonical_url()?.to_string();
            let mut track = PreviewTrack::new(url, requested_by);
            if let Some(title) = info.title {
                track = track.with_title(title);
            }
            if let Some(term) = search_term {
                track = track.with_search_term(term);
            }
            Some(track)
        })
        .collect()
}

fn parse_full(stdout: &str, preview: &PreviewTrack) -> Result<FullTrack, ResolutionError> {
    let info: YtDlpInfo = serde_json::from_str(stdout.trim()).map_err(|e| {
        ResolutionError::Backend(format!("unexpected yt-dlp output for {}: {}", preview.url(), e))
    })?;

    let metadata = ResolvedMetadata {
        title: info.title,
        artist: info.uploader,
        stream_url: info.url,
        duration: info
            .duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(Duration::from_secs_f64),
        thumbnail: info.thumbnail,
    };

    FullTrack::promote(preview, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_flat_playlist_entries() {
        let stdout = r#"{"_type": "url", "url": "https://www.youtube.com/watch?v=aaa", "title": "First"}
{"_type": "url", "url": "https://www.youtube.com/watch?v=bbb", "title": "Second"}
not json at all
{"_type": "url", "title": "No url"}
"#;

        let tracks = parse_preview_lines(stdout, UserId::new(3), None);
        let urls: Vec<&str> = tracks.iter().map(|t| t.url()).collect();

        assert_eq!(
            urls,
            vec![
                "https://www.youtube.com/watch?v=aaa",
                "https://www.youtube.com/watch?v=bbb"
            ]
        );
        assert_eq!(tracks[0].title(), Some("First"));
        assert_eq!(tracks[1].requested_by(), UserId::new(3));
    }

    #[test]
    fn test_parse_preview_prefers_webpage_url() {
        let stdout = r#"{"title": "Video", "webpage_url": "https://www.youtube.com/watch?v=ccc", "url": "https://rr1.googlevideo.com/stream"}"#;

        let tracks = parse_preview_lines(stdout, UserId::new(1), Some("video"));

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].url(), "https://www.youtube.com/watch?v=ccc");
        assert_eq!(tracks[0].search_term(), Some("video"));
    }

    #[test]
    fn test_parse_full_promotes_preview() {
        let preview = PreviewTrack::new("https://www.youtube.com/watch?v=ccc", UserId::new(1));
        let stdout = r#"{"title": "Video", "uploader": "Channel", "duration": 212.0,
            "thumbnail": "https://i.ytimg.com/vi/ccc/hq.jpg",
            "webpage_url": "https://www.youtube.com/watch?v=ccc",
            "url": "https://rr1.googlevideo.com/stream"}"#;

        let full = parse_full(stdout, &preview).unwrap();

        assert_eq!(full.stream_url(), "https://rr1.googlevideo.com/stream");
        assert_eq!(full.duration(), Duration::from_secs(212));
        assert_eq!(full.artist(), Some("Channel"));
        assert_eq!(full.url(), "https://www.youtube.com/watch?v=ccc");
    }

    #[test]
    fn test_parse_full_rejects_missing_fields() {
        let preview = PreviewTrack::new("https://www.youtube.com/watch?v=ddd", UserId::new(1));
        let stdout = r#"{"title": "Live", "url": "https://rr1.googlevideo.com/stream"}"#;

        assert!(matches!(
            parse_full(stdout, &preview),
            Err(ResolutionError::Incomplete { .. })
        ));
        assert!(matches!(
            parse_full("garbage", &preview),
            Err(ResolutionError::Backend(_))
        ));
    }
}
