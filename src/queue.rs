//! Queue of subprocess announcements awaiting a session manager decision.
//!
//! Every dequeued [`PendingAnnouncement`] must be returned with
//! [`AnnouncementQueue::mark_done`], this is the only way to deliver the decision
//! to the descendant that sent the announcement. An entry dropped without
//! acknowledgment makes its [`Completion`] fail with [`Error::AcknowledgmentOmitted`].

use crate::error::Error;
use crate::protocol::{Announcement, AnnouncementResponse};
use crate::sd_debug;
use std::collections::VecDeque;
use std::sync::{mpsc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Queue entry: an announcement and the response that will be sent back.
#[derive(Debug)]
pub struct PendingAnnouncement {
    pub announcement: Announcement,
    /// Decision for the descendant, `incoming_connection` is false by default.
    pub response: AnnouncementResponse,
    done: mpsc::SyncSender<AnnouncementResponse>,
}

impl PendingAnnouncement {
    /// Create an entry and the completion handle that resolves when the entry is marked done.
    pub fn new(announcement: Announcement) -> (Self, Completion) {
        let (done, receiver) = mpsc::sync_channel(1);
        (
            Self {
                announcement,
                response: AnnouncementResponse::default(),
                done,
            },
            Completion { receiver },
        )
    }
}

/// Producer side handle of a queued announcement.
pub struct Completion {
    receiver: mpsc::Receiver<AnnouncementResponse>,
}

impl Completion {
    /// Block until the consumer marks the entry done.
    pub fn wait(&self) -> Result<AnnouncementResponse, Error> {
        self.receiver
            .recv()
            .map_err(|_| Error::AcknowledgmentOmitted)
    }

    /// Like [`Completion::wait`], fails with [`Error::Timeout`] if the entry
    /// isn't marked done in time.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<AnnouncementResponse, Error> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            mpsc::RecvTimeoutError::Timeout => Error::Timeout(timeout),
            mpsc::RecvTimeoutError::Disconnected => Error::AcknowledgmentOmitted,
        })
    }
}

/// Unbounded blocking FIFO queue, safe for many producers and consumers.
#[derive(Default)]
pub struct AnnouncementQueue {
    items: Mutex<VecDeque<PendingAnnouncement>>,
    available: Condvar,
}

impl AnnouncementQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, item: PendingAnnouncement) {
        let mut items = self.items.lock().expect("queue lock poisoned");
        items.push_back(item);
        self.available.notify_one();
    }

    /// Block until an entry is available.
    pub fn dequeue(&self) -> PendingAnnouncement {
        let mut items = self.items.lock().expect("queue lock poisoned");
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            items = self.available.wait(items).expect("queue lock poisoned");
        }
    }

    /// Like [`AnnouncementQueue::dequeue`] but return `None` if nothing arrives in time.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<PendingAnnouncement> {
        let deadline = Instant::now() + timeout;
        let mut items = self.items.lock().expect("queue lock poisoned");
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }
            let left = deadline.checked_duration_since(Instant::now())?;
            items = self
                .available
                .wait_timeout(items, left)
                .expect("queue lock poisoned")
                .0;
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finish processing of a dequeued entry, its response is released to the descendant.
    pub fn mark_done(&self, item: PendingAnnouncement) {
        sd_debug!(
            "subprocess {} decided: {:?}",
            item.announcement.subprocess.process_id,
            item.response
        );
        // receiver is gone if the descendant connection already dropped
        _ = item.done.send(item.response);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::SubprocessAnnouncement;
    use serde_json::Value;
    use std::sync::Arc;
    use std::thread;

    fn announcement(pid: u32) -> Announcement {
        Announcement::enrich(
            SubprocessAnnouncement {
                parent_process_id: 1,
                process_id: pid,
                port: 0,
            },
            1,
            Value::Null,
        )
    }

    #[test]
    fn test_fifo() {
        let queue = AnnouncementQueue::new();
        let mut completions = vec![];
        for pid in [10, 11, 12] {
            let (item, completion) = PendingAnnouncement::new(announcement(pid));
            queue.enqueue(item);
            completions.push(completion);
        }
        assert_eq!(queue.len(), 3);

        let pids: Vec<_> = (0..3)
            .map(|_| {
                let item = queue.dequeue();
                let pid = item.announcement.subprocess.process_id;
                queue.mark_done(item);
                pid
            })
            .collect();
        assert_eq!(pids, [10, 11, 12]);
        assert!(queue.is_empty());
        assert!(queue.dequeue_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_mark_done_releases_completion() {
        let queue = AnnouncementQueue::new();
        let (item, completion) = PendingAnnouncement::new(announcement(42));
        queue.enqueue(item);

        let mut item = queue.dequeue();
        assert!(matches!(
            completion.wait_timeout(Duration::from_millis(50)),
            Err(Error::Timeout(_))
        ));

        item.response.incoming_connection = true;
        queue.mark_done(item);
        assert_eq!(
            completion.wait().unwrap(),
            AnnouncementResponse {
                incoming_connection: true
            }
        );
    }

    #[test]
    fn test_omitted_acknowledgment() {
        let queue = AnnouncementQueue::new();
        let (item, completion) = PendingAnnouncement::new(announcement(42));
        queue.enqueue(item);

        let item = queue.dequeue();
        drop(item);
        assert!(matches!(completion.wait(), Err(Error::AcknowledgmentOmitted)));
    }

    #[test]
    fn test_blocking_dequeue() {
        let queue = Arc::new(AnnouncementQueue::new());
        let consumer = thread::spawn({
            let queue = queue.clone();
            move || {
                let item = queue.dequeue();
                let pid = item.announcement.subprocess.process_id;
                queue.mark_done(item);
                pid
            }
        });

        thread::sleep(Duration::from_millis(20));
        let (item, completion) = PendingAnnouncement::new(announcement(7));
        queue.enqueue(item);

        assert_eq!(consumer.join().unwrap(), 7);
        assert!(!completion.wait().unwrap().incoming_connection);
    }
}
