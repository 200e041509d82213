//! Error types shared by the queue, resolver, sink and player loop.
//!
//! The application layer (`bot`, `config`, `main`) works with `anyhow`; the
//! playback core keeps typed errors so callers can tell a bad index apart
//! from a track that went private between enqueue and playback.

use std::time::Duration;
use thiserror::Error;

/// Failure to turn user input or a queued track into something playable.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolutionError {
    #[error("no matches found for `{0}`")]
    NoMatches(String),

    #[error("`{url}` is no longer available: {reason}")]
    Unavailable { url: String, reason: String },

    #[error("`{url}` resolved without {missing}")]
    Incomplete { url: String, missing: &'static str },

    #[error("resolver timed out after {0:?}")]
    Timeout(Duration),

    #[error("resolver backend failed: {0}")]
    Backend(String),
}

/// Failure reported by the audio output.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SinkError {
    #[error("not connected to a voice channel")]
    NotConnected,

    #[error("could not start playback: {0}")]
    Start(String),

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("playback control failed: {0}")]
    Control(String),

    #[error("playback ended without a completion signal")]
    Abandoned,
}

/// Invalid queue operation. Indices are 0-based here.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("position {index} is out of range for a queue of {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("track is already at position {0}")]
    SamePosition(usize),

    #[error("the queue is empty")]
    Empty,
}

/// Rejected control operation on a playback session.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ControlError {
    #[error("nothing is playing right now")]
    NothingPlaying,

    #[error("playback is already paused")]
    AlreadyPaused,

    #[error("playback is not paused")]
    NotPaused,

    #[error("volume must be between 0.0 and 1.0, got {0}")]
    VolumeOutOfRange(f32),

    #[error("the session has been shut down")]
    SessionClosed,

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}
