//! Boundary to the audio output.
//!
//! A sink's completion notification is delivered through a
//! [`CompletionSignal`] / [`Completion`] pair: the sink side may fire the
//! signal from any number of event callbacks, only the first one counts, and
//! the player loop awaits the receiving half exactly once.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::{error::SinkError, sources::FullTrack};

/// How a playback ended. `Err` is a fault during playback, not a reason to
/// stop the player loop.
pub type PlaybackOutcome = Result<(), SinkError>;

/// A voice connection able to stream one track at a time.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Starts streaming `track`. The returned [`Completion`] resolves once
    /// playback has truly stopped, whether it ended, failed or was stopped.
    async fn start(&self, track: &FullTrack, volume: f32) -> Result<ActivePlayback, SinkError>;

    /// Releases the underlying connection. Must tolerate repeated calls.
    async fn release(&self);
}

/// Control surface for one playing track.
pub trait SinkHandle: Send + Sync {
    /// Stops playback; the completion fires as a normal end.
    fn stop(&self) -> Result<(), SinkError>;
    fn pause(&self) -> Result<(), SinkError>;
    fn resume(&self) -> Result<(), SinkError>;
    fn set_volume(&self, volume: f32) -> Result<(), SinkError>;
}

/// A started track: its control handle plus its completion rendezvous.
pub struct ActivePlayback {
    pub handle: Arc<dyn SinkHandle>,
    pub completion: Completion,
}

/// Sending half of the completion rendezvous. Cheap to clone; fires once.
#[derive(Clone)]
pub struct CompletionSignal {
    slot: Arc<Mutex<Option<oneshot::Sender<PlaybackOutcome>>>>,
}

impl CompletionSignal {
    /// Delivers `outcome` if nothing was delivered yet. Returns whether this
    /// call was the one that fired.
    pub fn fire(&self, outcome: PlaybackOutcome) -> bool {
        match self.slot.lock().take() {
            Some(tx) => {
                // receiver gone means the session was torn down already
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

/// Receiving half of the completion rendezvous.
pub struct Completion {
    rx: oneshot::Receiver<PlaybackOutcome>,
}

impl Completion {
    /// Resolves when the signal fires. If every sender is dropped without
    /// firing, playback is reported as [`SinkError::Abandoned`].
    pub async fn wait(self) -> PlaybackOutcome {
        self.rx.await.unwrap_or(Err(SinkError::Abandoned))
    }
}

pub fn completion_pair() -> (CompletionSignal, Completion) {
    let (tx, rx) = oneshot::channel();
    (
        CompletionSignal {
            slot: Arc::new(Mutex::new(Some(tx))),
        },
        Completion { rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_fires_exactly_once() {
        let (signal, completion) = completion_pair();
        let duplicate = signal.clone();

        assert!(signal.fire(Ok(())));
        assert!(!duplicate.fire(Err(SinkError::Playback("late error".into()))));
        assert!(!signal.fire(Ok(())));

        assert_eq!(completion.wait().await, Ok(()));
    }

    #[tokio::test]
    async fn test_error_outcome_is_delivered() {
        let (signal, completion) = completion_pair();

        signal.fire(Err(SinkError::Playback("decoder died".into())));

        assert_eq!(
            completion.wait().await,
            Err(SinkError::Playback("decoder died".into()))
        );
    }

    #[tokio::test]
    async fn test_dropped_signal_is_abandoned() {
        let (signal, completion) = completion_pair();
        drop(signal);

        assert_eq!(completion.wait().await, Err(SinkError::Abandoned));
    }
}
