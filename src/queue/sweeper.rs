//! Drain poll loop
//!
//! Polls every configured party size on a fixed interval and publishes a
//! `MatchEvent` for each complete group. Multiple processes may run the same
//! loop; the drain's post-pop re-validation keeps concurrent polls from
//! emitting partial groups.

use crate::amqp::publisher::EventPublisher;
use crate::error::Result;
use crate::metrics::MetricsCollector;
use crate::queue::match_queue::MatchQueue;
use crate::types::{MatchEvent, PublicProfile, RoomKind, WaitingUser};
use crate::utils::{current_timestamp, generate_match_id};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info};

/// Poll-driven drain sweeper for the match queues
pub struct QueueSweeper {
    queue: Arc<MatchQueue>,
    publisher: Arc<dyn EventPublisher>,
    party_sizes: Vec<u32>,
    poll_interval: Duration,
    metrics: Arc<MetricsCollector>,
}

impl QueueSweeper {
    pub fn new(
        queue: Arc<MatchQueue>,
        publisher: Arc<dyn EventPublisher>,
        party_sizes: Vec<u32>,
        poll_interval: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            queue,
            publisher,
            party_sizes,
            poll_interval,
            metrics,
        }
    }

    /// Run the poll loop for the life of the process
    ///
    /// A failed tick is logged and retried on the next interval; the loop
    /// itself never propagates an error upward.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.poll_interval);
        info!(
            "Queue sweeper started - party_sizes: {:?}, interval: {:?}",
            self.party_sizes, self.poll_interval
        );

        loop {
            ticker.tick().await;
            for &party_size in &self.party_sizes {
                match self.tick_once(party_size).await {
                    Ok(Some(event)) => {
                        info!(
                            "Match formed - match_id: {}, party_size: {}",
                            event.match_id, party_size
                        );
                    }
                    Ok(None) => {
                        debug!("No complete group for party_size {}", party_size);
                    }
                    Err(e) => {
                        // Transient store/bus failure; next tick retries
                        error!("Drain tick failed for party_size {}: {}", party_size, e);
                    }
                }
            }
        }
    }

    /// One drain attempt for one party size
    pub async fn tick_once(&self, party_size: u32) -> Result<Option<MatchEvent>> {
        let Some(group) = self.queue.try_drain(party_size).await? else {
            return Ok(None);
        };

        let event = build_match_event(RoomKind::Group, &group);
        self.publisher.publish_match_event(event.clone()).await?;
        self.metrics.record_match_formed(party_size);
        Ok(Some(event))
    }
}

/// Assemble the match announcement for a drained group
pub fn build_match_event(kind: RoomKind, group: &[WaitingUser]) -> MatchEvent {
    MatchEvent {
        match_id: generate_match_id(),
        kind,
        users: group
            .iter()
            .map(|u| PublicProfile {
                user_id: u.user_id.clone(),
                gender: u.gender,
            })
            .collect(),
        timestamp: current_timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::messages::{EVENT_MATCH, MATCH_EVENTS_EXCHANGE};
    use crate::amqp::publisher::MockEventPublisher;
    use crate::store::MemoryStore;
    use crate::types::Gender;
    use chrono::NaiveDate;

    fn waiting_user(id: &str, gender: Gender, party_size: u32) -> WaitingUser {
        WaitingUser {
            user_id: id.to_string(),
            gender,
            birth_date: NaiveDate::from_ymd_opt(1999, 8, 21).unwrap(),
            address: "Incheon".to_string(),
            party_size,
        }
    }

    fn new_sweeper() -> (QueueSweeper, Arc<MatchQueue>, Arc<MockEventPublisher>) {
        let queue = Arc::new(MatchQueue::new(Arc::new(MemoryStore::new())));
        let publisher = Arc::new(MockEventPublisher::new());
        let sweeper = QueueSweeper::new(
            queue.clone(),
            publisher.clone(),
            vec![1],
            Duration::from_millis(100),
            Arc::new(MetricsCollector::new().unwrap()),
        );
        (sweeper, queue, publisher)
    }

    #[tokio::test]
    async fn test_tick_publishes_match_for_complete_group() {
        let (sweeper, queue, publisher) = new_sweeper();
        queue
            .enqueue(&waiting_user("m1", Gender::Male, 1))
            .await
            .unwrap();
        queue
            .enqueue(&waiting_user("f1", Gender::Female, 1))
            .await
            .unwrap();

        let event = sweeper.tick_once(1).await.unwrap().unwrap();
        assert_eq!(event.kind, RoomKind::Group);
        assert_eq!(event.users.len(), 2);

        let published = publisher.published_to(MATCH_EVENTS_EXCHANGE);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event_type, EVENT_MATCH);
    }

    #[tokio::test]
    async fn test_tick_is_quiet_without_a_group() {
        let (sweeper, queue, publisher) = new_sweeper();
        queue
            .enqueue(&waiting_user("m1", Gender::Male, 1))
            .await
            .unwrap();

        assert!(sweeper.tick_once(1).await.unwrap().is_none());
        assert_eq!(publisher.count_of(EVENT_MATCH), 0);
    }

    #[test]
    fn test_build_match_event_copies_profiles() {
        let group = vec![
            waiting_user("m1", Gender::Male, 1),
            waiting_user("f1", Gender::Female, 1),
        ];
        let event = build_match_event(RoomKind::Couple, &group);
        assert_eq!(event.kind, RoomKind::Couple);
        assert_eq!(event.users[0].user_id, "m1");
        assert_eq!(event.users[1].gender, Gender::Female);
    }
}
