use std::time::Duration;
use tokio::time::Instant;

/// Tracks how long the current track has actually been audible.
///
/// Time spent paused does not count.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl PlaybackClock {
    pub fn start() -> Self {
        Self {
            accumulated: Duration::ZERO,
            running_since: Some(Instant::now()),
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + since.elapsed(),
            None => self.accumulated,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.running_since.is_none()
    }

    /// Returns false if already paused.
    pub fn pause(&mut self) -> bool {
        match self.running_since.take() {
            Some(since) => {
                self.accumulated += since.elapsed();
                true
            }
            None => false,
        }
    }

    /// Returns false if not paused.
    pub fn resume(&mut self) -> bool {
        if self.running_since.is_some() {
            return false;
        }
        self.running_since = Some(Instant::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_paused_time_does_not_accrue() {
        let mut clock = PlaybackClock::start();

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(clock.pause());
        let at_pause = clock.elapsed();
        assert_eq!(at_pause, Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(clock.elapsed(), at_pause);

        assert!(clock.resume());
        assert_eq!(clock.elapsed(), at_pause);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(clock.elapsed(), Duration::from_secs(35));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_pause_and_resume_are_rejected() {
        let mut clock = PlaybackClock::start();

        assert!(!clock.resume());
        assert!(clock.pause());
        assert!(!clock.pause());
        assert!(clock.is_paused());
        assert!(clock.resume());
        assert!(!clock.is_paused());
    }
}
