//! Per-key-lifetime session state: dedup blooms and the producer queue.
//!
//! Owned by the orchestrator task; the crawler sees it only through the
//! mutable borrow of one fetch pass, so no locking is involved.

use crate::bloom::BloomFilter;
use crate::collector::hooks::SessionSummary;
use std::collections::VecDeque;
use std::time::Instant;

pub struct SessionState {
    seen_matches: BloomFilter,
    seen_participants: BloomFilter,
    producer_queue: VecDeque<String>,
    pub records_collected: u64,
    started_at: Instant,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            seen_matches: BloomFilter::with_defaults(),
            seen_participants: BloomFilter::with_defaults(),
            producer_queue: VecDeque::new(),
            records_collected: 0,
            started_at: Instant::now(),
        }
    }

    /// Marks a match id seen; returns whether it was (probably) seen before.
    pub fn mark_match_seen(&mut self, match_id: &str) -> bool {
        self.seen_matches.check_and_insert(match_id)
    }

    /// Appends a participant unless the session has (probably) crawled them
    /// already.
    pub fn enqueue_participant(&mut self, puuid: &str) {
        if !self.seen_participants.check_and_insert(puuid) {
            self.producer_queue.push_back(puuid.to_string());
        }
    }

    pub fn next_participant(&mut self) -> Option<String> {
        self.producer_queue.pop_front()
    }

    pub fn queue_len(&self) -> usize {
        self.producer_queue.len()
    }

    pub fn matches_seen(&self) -> u64 {
        self.seen_matches.approximate_len()
    }

    pub fn participants_seen(&self) -> u64 {
        self.seen_participants.approximate_len()
    }

    /// Periodic bloom maintenance within a session; queue and counters
    /// survive.
    pub fn reset_blooms(&mut self) {
        self.seen_matches.clear();
        self.seen_participants.clear();
        log::info!("🧹 Session blooms cleared (queue keeps {} entries)", self.producer_queue.len());
    }

    /// Fresh-restart wipe: blooms, queue, and counters all go.
    pub fn clear_for_restart(&mut self) {
        self.seen_matches.clear();
        self.seen_participants.clear();
        self.producer_queue.clear();
        self.records_collected = 0;
        self.started_at = Instant::now();
    }

    pub fn summary(&self, reduces_completed: u64) -> SessionSummary {
        SessionSummary {
            records_collected: self.records_collected,
            runtime: self.started_at.elapsed(),
            reduces_completed,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_queue_dedupes_within_session() {
        let mut session = SessionState::new();
        session.enqueue_participant("puuid-1");
        session.enqueue_participant("puuid-2");
        session.enqueue_participant("puuid-1");

        assert_eq!(session.queue_len(), 2);
        assert_eq!(session.next_participant().as_deref(), Some("puuid-1"));
        assert_eq!(session.next_participant().as_deref(), Some("puuid-2"));
        assert!(session.next_participant().is_none());

        // Dequeued participants stay known for the rest of the session
        session.enqueue_participant("puuid-1");
        assert_eq!(session.queue_len(), 0);
    }

    #[test]
    fn test_match_dedup() {
        let mut session = SessionState::new();
        assert!(!session.mark_match_seen("NA1_1"));
        assert!(session.mark_match_seen("NA1_1"));
        assert_eq!(session.matches_seen(), 1);
    }

    #[test]
    fn test_bloom_reset_preserves_queue() {
        let mut session = SessionState::new();
        session.enqueue_participant("puuid-1");
        session.enqueue_participant("puuid-2");
        session.next_participant();
        session.mark_match_seen("NA1_1");
        session.records_collected = 40;

        session.reset_blooms();

        assert_eq!(session.matches_seen(), 0);
        assert_eq!(session.participants_seen(), 0);
        assert_eq!(session.queue_len(), 1, "queue survives bloom maintenance");
        assert_eq!(session.records_collected, 40);

        // A reset bloom allows re-enqueue of an old participant
        session.enqueue_participant("puuid-1");
        assert_eq!(session.queue_len(), 2);
    }

    #[test]
    fn test_clear_for_restart_wipes_everything() {
        let mut session = SessionState::new();
        session.enqueue_participant("puuid-1");
        session.mark_match_seen("NA1_1");
        session.records_collected = 7;

        session.clear_for_restart();

        assert_eq!(session.queue_len(), 0);
        assert_eq!(session.matches_seen(), 0);
        assert_eq!(session.participants_seen(), 0);
        assert_eq!(session.records_collected, 0);
    }
}
