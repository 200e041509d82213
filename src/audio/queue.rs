use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::{collections::VecDeque, ops::Range};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::{error::QueueError, sources::PreviewTrack};

/// FIFO queue of preview tracks shared between a session's player loop and
/// any number of command handlers.
///
/// Every operation takes the lock once and never holds it across an await,
/// so the queue can be mutated freely while the player loop is parked in
/// [`SongQueue::dequeue`].
#[derive(Debug, Default)]
pub struct SongQueue {
    items: Mutex<VecDeque<PreviewTrack>>,
    available: Notify,
}

impl SongQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a track and returns its 0-based index. Never blocks.
    pub fn enqueue(&self, track: PreviewTrack) -> usize {
        debug!("➕ Queued: {}", track.display_title());
        let index = {
            let mut items = self.items.lock();
            items.push_back(track);
            items.len() - 1
        };
        self.available.notify_one();
        index
    }

    /// Appends several tracks in order and wakes one waiter per track.
    pub fn extend(&self, tracks: impl IntoIterator<Item = PreviewTrack>) -> usize {
        let added = {
            let mut items = self.items.lock();
            let before = items.len();
            items.extend(tracks);
            items.len() - before
        };

        for _ in 0..added {
            self.available.notify_one();
        }
        added
    }

    /// Waits until a track is available and pops it from the front.
    ///
    /// Cancel safe: the pop happens synchronously after the wakeup, so
    /// dropping this future never loses a track. A wakeup that loses the
    /// race to another dequeuer simply waits again.
    pub async fn dequeue(&self) -> PreviewTrack {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(track) = self.items.lock().pop_front() {
                return track;
            }

            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, index: usize) -> Option<PreviewTrack> {
        self.items.lock().get(index).cloned()
    }

    /// Clones the tracks in `range`, clamped to the current length.
    pub fn slice(&self, range: Range<usize>) -> Vec<PreviewTrack> {
        let items = self.items.lock();
        let end = range.end.min(items.len());
        let start = range.start.min(end);
        items.range(start..end).cloned().collect()
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<PreviewTrack> {
        self.items.lock().iter().cloned().collect()
    }

    /// Removes and returns the track at `index`.
    pub fn remove(&self, index: usize) -> Result<PreviewTrack, QueueError> {
        let mut items = self.items.lock();
        let len = items.len();
        if len == 0 {
            return Err(QueueError::Empty);
        }
        let removed = items
            .remove(index)
            .ok_or(QueueError::IndexOutOfRange { index, len })?;

        debug!("❌ Removed position {}: {}", index, removed.display_title());
        Ok(removed)
    }

    /// Takes the track at `from` out and reinserts it at `to` of what remains.
    ///
    /// Both indices must be valid for the queue as it is before the move,
    /// and must differ.
    pub fn move_track(&self, from: usize, to: usize) -> Result<PreviewTrack, QueueError> {
        let mut items = self.items.lock();
        let len = items.len();
        if len == 0 {
            return Err(QueueError::Empty);
        }

        for index in [from, to] {
            if index >= len {
                return Err(QueueError::IndexOutOfRange { index, len });
            }
        }
        if from == to {
            return Err(QueueError::SamePosition(from));
        }

        let track = items
            .remove(from)
            .ok_or(QueueError::IndexOutOfRange { index: from, len })?;
        items.insert(to, track.clone());

        debug!("📍 Moved {} from {} to {}", track.display_title(), from, to);
        Ok(track)
    }

    /// Drops every queued track, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let cleared = {
            let mut items = self.items.lock();
            let cleared = items.len();
            items.clear();
            cleared
        };

        if cleared > 0 {
            info!("🗑️ Queue cleared: {} tracks removed", cleared);
        }
        cleared
    }

    /// Uniformly permutes the queued tracks in one critical section.
    pub fn shuffle(&self) -> Result<(), QueueError> {
        let mut items = self.items.lock();
        if items.is_empty() {
            return Err(QueueError::Empty);
        }

        items.make_contiguous().shuffle(&mut rand::thread_rng());
        info!("🔀 Queue shuffled ({} tracks)", items.len());
        Ok(())
    }

    /// Page `page` (1-based, clamped to at least 1) of `per_page` entries.
    pub fn page(&self, page: usize, per_page: usize) -> QueuePage {
        let per_page = per_page.max(1);
        let total_items = self.len();
        let total_pages = total_items.div_ceil(per_page).max(1);
        let current_page = page.max(1);

        let start = (current_page - 1).saturating_mul(per_page);

        QueuePage {
            items: self.slice(start..start.saturating_add(per_page)),
            first_index: start.min(total_items),
            current_page,
            total_pages,
            total_items,
        }
    }
}

/// One page of a queue listing.
#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<PreviewTrack>,
    /// 0-based queue index of `items[0]`.
    pub first_index: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;
    use std::{collections::HashSet, sync::Arc, time::Duration};

    fn track(n: usize) -> PreviewTrack {
        PreviewTrack::new(format!("https://example.com/{}", n), UserId::new(1))
            .with_title(format!("Track {}", n))
    }

    fn titles(queue: &SongQueue) -> Vec<String> {
        queue
            .snapshot()
            .iter()
            .map(|t| t.display_title().to_string())
            .collect()
    }

    fn filled(n: usize) -> SongQueue {
        let queue = SongQueue::new();
        for i in 0..n {
            queue.enqueue(track(i));
        }
        queue
    }

    #[tokio::test]
    async fn test_dequeue_is_fifo() {
        let queue = filled(5);

        for i in 0..5 {
            assert_eq!(queue.dequeue().await.url(), track(i).url());
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_enqueue() {
        let queue = Arc::new(SongQueue::new());

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        queue.enqueue(track(42));
        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("dequeue should wake up")
            .unwrap();
        assert_eq!(got.url(), "https://example.com/42");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_dequeue_loses_nothing() {
        let queue = SongQueue::new();

        let timed_out = tokio::time::timeout(Duration::from_secs(5), queue.dequeue()).await;
        assert!(timed_out.is_err());

        queue.enqueue(track(1));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue().await.url(), "https://example.com/1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enqueue_and_dequeue_delivers_each_once() {
        let queue = Arc::new(SongQueue::new());
        let producers = 4;
        let per_producer = 50;
        let total = producers * per_producer;

        let mut consumers = Vec::new();
        for _ in 0..3 {
            let queue = queue.clone();
            consumers.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Ok(track) =
                    tokio::time::timeout(Duration::from_millis(500), queue.dequeue()).await
                {
                    got.push(track.url().to_string());
                }
                got
            }));
        }

        let mut handles = Vec::new();
        for p in 0..producers {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..per_producer {
                    queue.enqueue(track(p * per_producer + i));
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut delivered = Vec::new();
        for consumer in consumers {
            delivered.extend(consumer.await.unwrap());
        }

        let unique: HashSet<_> = delivered.iter().cloned().collect();
        assert_eq!(delivered.len(), total);
        assert_eq!(unique.len(), total);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_shifts_following_items() {
        let queue = filled(4);

        let removed = queue.remove(1).unwrap();

        assert_eq!(removed.display_title(), "Track 1");
        assert_eq!(titles(&queue), vec!["Track 0", "Track 2", "Track 3"]);
        assert_eq!(queue.get(1).unwrap().display_title(), "Track 2");
    }

    #[test]
    fn test_remove_out_of_range() {
        let queue = filled(2);
        assert_eq!(
            queue.remove(2).unwrap_err(),
            QueueError::IndexOutOfRange { index: 2, len: 2 }
        );
        assert_eq!(queue.len(), 2);

        let empty = SongQueue::new();
        assert_eq!(empty.remove(0).unwrap_err(), QueueError::Empty);
        assert_eq!(empty.move_track(0, 1).unwrap_err(), QueueError::Empty);
    }

    #[test]
    fn test_move_uses_post_removal_index() {
        let queue = filled(5);

        queue.move_track(0, 3).unwrap();
        assert_eq!(
            titles(&queue),
            vec!["Track 1", "Track 2", "Track 3", "Track 0", "Track 4"]
        );

        queue.move_track(4, 0).unwrap();
        assert_eq!(
            titles(&queue),
            vec!["Track 4", "Track 1", "Track 2", "Track 3", "Track 0"]
        );
    }

    #[test]
    fn test_move_then_inverse_move_restores_order() {
        let queue = filled(5);
        let original = titles(&queue);

        queue.move_track(1, 3).unwrap();
        queue.move_track(3, 1).unwrap();

        assert_eq!(titles(&queue), original);
    }

    #[test]
    fn test_move_validation() {
        let queue = filled(3);

        assert_eq!(
            queue.move_track(0, 3).unwrap_err(),
            QueueError::IndexOutOfRange { index: 3, len: 3 }
        );
        assert_eq!(
            queue.move_track(5, 5).unwrap_err(),
            QueueError::IndexOutOfRange { index: 5, len: 3 }
        );
        assert_eq!(queue.move_track(1, 1).unwrap_err(), QueueError::SamePosition(1));
        assert_eq!(titles(&queue), vec!["Track 0", "Track 1", "Track 2"]);
    }

    #[test]
    fn test_shuffle_preserves_contents() {
        let queue = filled(20);
        let before: HashSet<String> = titles(&queue).into_iter().collect();

        queue.shuffle().unwrap();

        let after = titles(&queue);
        assert_eq!(after.len(), 20);
        assert_eq!(after.into_iter().collect::<HashSet<_>>(), before);
    }

    #[test]
    fn test_shuffle_has_no_positional_bias() {
        let trials = 3000;
        let mut first_position_counts = [0usize; 3];

        for _ in 0..trials {
            let queue = filled(3);
            queue.shuffle().unwrap();
            let position = titles(&queue)
                .iter()
                .position(|t| t == "Track 0")
                .unwrap();
            first_position_counts[position] += 1;
        }

        // expected 1000 each, standard deviation ~26
        for count in first_position_counts {
            assert!((850..=1150).contains(&count), "biased counts: {:?}", first_position_counts);
        }
    }

    #[test]
    fn test_shuffle_empty_queue() {
        assert_eq!(SongQueue::new().shuffle().unwrap_err(), QueueError::Empty);
    }

    #[test]
    fn test_clear_and_extend() {
        let queue = SongQueue::new();
        assert_eq!(queue.extend((0..3).map(track)), 3);
        assert_eq!(queue.clear(), 3);
        assert!(queue.is_empty());
        assert!(queue.get(0).is_none());
    }

    #[tokio::test]
    async fn test_enqueue_reports_index_at_insertion() {
        let queue = filled(2);
        assert_eq!(queue.enqueue(track(2)), 2);

        queue.dequeue().await;
        queue.dequeue().await;
        assert_eq!(queue.enqueue(track(3)), 1);
    }

    #[test]
    fn test_slice_is_clamped() {
        let queue = filled(4);
        assert_eq!(queue.slice(2..10).len(), 2);
        assert!(queue.slice(7..9).is_empty());
    }

    #[test]
    fn test_page() {
        let queue = filled(25);

        let page = queue.page(3, 10);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.first_index, 20);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items[0].display_title(), "Track 20");

        let clamped = queue.page(0, 10);
        assert_eq!(clamped.current_page, 1);
        assert_eq!(clamped.first_index, 0);

        let beyond = queue.page(9, 10);
        assert!(beyond.items.is_empty());

        assert_eq!(SongQueue::new().page(1, 10).total_pages, 1);
    }
}
