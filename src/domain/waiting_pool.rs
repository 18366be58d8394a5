//! Per-topic FIFO queues of connections awaiting a partner.
//!
//! [`WaitingPool`] holds no lock of its own: it lives inside the lobby state
//! and every call happens under the lobby's mutex, so FIFO order per topic
//! is preserved by construction.

use std::collections::{BTreeMap, VecDeque};

use super::{ConnectionId, Topic, TopicSet};

/// Topic-scoped waiting queues.
///
/// Topics are kept in a `BTreeMap` so the matchmaker scans them in a stable
/// (name) order. Queues that become empty are removed.
#[derive(Debug, Default)]
pub struct WaitingPool {
    queues: BTreeMap<Topic, VecDeque<ConnectionId>>,
}

impl WaitingPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `conn` to the back of every topic queue in `topics` that does
    /// not already contain it.
    pub fn enqueue(&mut self, conn: ConnectionId, topics: &TopicSet) {
        for topic in topics.iter() {
            let queue = self.queues.entry(topic.clone()).or_default();
            if !queue.contains(&conn) {
                queue.push_back(conn);
            }
        }
    }

    /// Pops two distinct connections from the front of `topic`'s queue.
    ///
    /// Returns `None` (leaving the queue untouched) when fewer than two
    /// distinct connections are waiting. An entry that resolves to the same
    /// connection as the first one is discarded and the pop retried.
    /// [`WaitingPool::enqueue`] and [`WaitingPool::push_front`] never queue
    /// a connection twice under one topic, so that path only guards against
    /// a corrupted queue.
    pub fn try_dequeue_pair(&mut self, topic: &Topic) -> Option<(ConnectionId, ConnectionId)> {
        let queue = self.queues.get_mut(topic)?;
        let first = *queue.front()?;
        if !queue.iter().any(|c| *c != first) {
            return None;
        }

        queue.pop_front();
        let mut second = None;
        while let Some(candidate) = queue.pop_front() {
            if candidate == first {
                tracing::warn!(connection_id = %first, %topic, "duplicate pool entry skipped");
                continue;
            }
            second = Some(candidate);
            break;
        }
        if queue.is_empty() {
            self.queues.remove(topic);
        }
        second.map(|second| (first, second))
    }

    /// Appends `conn` to `topic`'s queue even if it is already there.
    #[cfg(test)]
    fn push_back_unchecked(&mut self, topic: &Topic, conn: ConnectionId) {
        self.queues.entry(topic.clone()).or_default().push_back(conn);
    }

    /// Puts `conn` back at the head of `topic`'s queue.
    ///
    /// Used when a popped connection could not be paired and must keep its
    /// place in line. No-op if it is already queued under `topic`.
    pub fn push_front(&mut self, topic: &Topic, conn: ConnectionId) {
        let queue = self.queues.entry(topic.clone()).or_default();
        if !queue.contains(&conn) {
            queue.push_front(conn);
        }
    }

    /// Removes `conn` from every topic queue it occupies.
    ///
    /// Returns the number of queues it was removed from.
    pub fn remove_everywhere(&mut self, conn: ConnectionId) -> usize {
        let mut removed = 0;
        self.queues.retain(|_, queue| {
            let before = queue.len();
            queue.retain(|c| *c != conn);
            removed += before - queue.len();
            !queue.is_empty()
        });
        removed
    }

    /// Returns `true` if `conn` waits under any topic.
    #[must_use]
    pub fn contains(&self, conn: ConnectionId) -> bool {
        self.queues.values().any(|queue| queue.contains(&conn))
    }

    /// Topics that currently have at least two queued entries.
    #[must_use]
    pub fn pairable_topics(&self) -> Vec<Topic> {
        self.queues
            .iter()
            .filter(|(_, queue)| queue.len() >= 2)
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// Number of connections waiting under `topic`.
    #[must_use]
    pub fn len(&self, topic: &Topic) -> usize {
        self.queues.get(topic).map_or(0, VecDeque::len)
    }

    /// Returns `true` if no connection waits under any topic.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Queue lengths per topic, for the stats snapshot.
    #[must_use]
    pub fn sizes(&self) -> BTreeMap<String, usize> {
        self.queues
            .iter()
            .map(|(topic, queue)| (topic.to_string(), queue.len()))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn topic(name: &str) -> Topic {
        let Some(topic) = Topic::parse(name) else {
            panic!("valid topic");
        };
        topic
    }

    fn topics(names: &[&str]) -> TopicSet {
        TopicSet::from_names(names.iter().copied(), &topic("random"), 8)
    }

    #[test]
    fn single_entry_yields_no_pair() {
        let mut pool = WaitingPool::new();
        let a = ConnectionId::new();
        pool.enqueue(a, &topics(&["gaming"]));
        assert!(pool.try_dequeue_pair(&topic("gaming")).is_none());
        assert_eq!(pool.len(&topic("gaming")), 1);
    }

    #[test]
    fn dequeue_is_fifo() {
        let mut pool = WaitingPool::new();
        let ids: Vec<ConnectionId> = (0..4).map(|_| ConnectionId::new()).collect();
        for id in &ids {
            pool.enqueue(*id, &topics(&["gaming"]));
        }
        let gaming = topic("gaming");
        let expected: Vec<(ConnectionId, ConnectionId)> =
            ids.chunks(2).filter_map(|c| Some((*c.first()?, *c.get(1)?))).collect();
        assert_eq!(pool.try_dequeue_pair(&gaming), expected.first().copied());
        assert_eq!(pool.try_dequeue_pair(&gaming), expected.get(1).copied());
        assert!(pool.try_dequeue_pair(&gaming).is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn duplicate_head_entry_is_skipped() {
        let mut pool = WaitingPool::new();
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        let gaming = topic("gaming");
        pool.push_back_unchecked(&gaming, a);
        pool.push_back_unchecked(&gaming, a);
        pool.push_back_unchecked(&gaming, b);

        assert_eq!(pool.try_dequeue_pair(&gaming), Some((a, b)));
        assert!(pool.is_empty());
    }

    #[test]
    fn duplicates_alone_never_pair() {
        let mut pool = WaitingPool::new();
        let a = ConnectionId::new();
        let gaming = topic("gaming");
        pool.push_back_unchecked(&gaming, a);
        pool.push_back_unchecked(&gaming, a);

        assert!(pool.try_dequeue_pair(&gaming).is_none());
        assert_eq!(pool.len(&gaming), 2);
    }

    #[test]
    fn enqueue_is_idempotent_per_topic() {
        let mut pool = WaitingPool::new();
        let a = ConnectionId::new();
        pool.enqueue(a, &topics(&["gaming", "music"]));
        pool.enqueue(a, &topics(&["gaming"]));
        assert_eq!(pool.len(&topic("gaming")), 1);
        assert_eq!(pool.len(&topic("music")), 1);
        assert!(pool.try_dequeue_pair(&topic("gaming")).is_none());
    }

    #[test]
    fn remove_everywhere_purges_all_topics() {
        let mut pool = WaitingPool::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        pool.enqueue(a, &topics(&["gaming", "music", "tech"]));
        pool.enqueue(b, &topics(&["music"]));
        assert_eq!(pool.remove_everywhere(a), 3);
        assert!(!pool.contains(a));
        assert!(pool.contains(b));
        assert_eq!(pool.len(&topic("gaming")), 0);
        assert_eq!(pool.remove_everywhere(a), 0);
    }

    #[test]
    fn push_front_restores_head_position() {
        let mut pool = WaitingPool::new();
        let (a, b, c) = (ConnectionId::new(), ConnectionId::new(), ConnectionId::new());
        let gaming = topic("gaming");
        for id in [a, b, c] {
            pool.enqueue(id, &topics(&["gaming"]));
        }
        let Some((first, _)) = pool.try_dequeue_pair(&gaming) else {
            panic!("expected a pair");
        };
        pool.push_front(&gaming, first);
        assert_eq!(pool.try_dequeue_pair(&gaming), Some((a, c)));
    }

    #[test]
    fn pairable_topics_lists_only_queues_with_two() {
        let mut pool = WaitingPool::new();
        pool.enqueue(ConnectionId::new(), &topics(&["gaming", "music"]));
        pool.enqueue(ConnectionId::new(), &topics(&["music"]));
        assert_eq!(pool.pairable_topics(), vec![topic("music")]);
        assert_eq!(pool.sizes().get("gaming"), Some(&1));
    }
}
