//! Test fixtures for integration testing
//!
//! Builds a complete in-memory system: shared store, room store, mock
//! publisher and every component wired the way the service wires them.

use chrono::NaiveDate;
use mingle_room::amqp::publisher::MockEventPublisher;
use mingle_room::choice::FinalChoiceAggregator;
use mingle_room::metrics::MetricsCollector;
use mingle_room::presence::PresenceRegistry;
use mingle_room::queue::{MatchQueue, QueueSweeper};
use mingle_room::room::manager::{RoomLifecycleManager, RoomTimings};
use mingle_room::room::store::MemoryRoomStore;
use mingle_room::store::MemoryStore;
use mingle_room::types::{Gender, WaitingUser};
use std::sync::Arc;
use std::time::Duration;

/// A fully wired in-memory system
pub struct TestSystem {
    pub store: Arc<MemoryStore>,
    pub rooms: Arc<MemoryRoomStore>,
    pub publisher: Arc<MockEventPublisher>,
    pub queue: Arc<MatchQueue>,
    pub sweeper: QueueSweeper,
    pub manager: Arc<RoomLifecycleManager>,
    pub aggregator: Arc<FinalChoiceAggregator>,
    pub registry: Arc<PresenceRegistry>,
}

impl TestSystem {
    pub fn new() -> Self {
        Self::with_party_sizes(vec![1, 2, 3, 4])
    }

    pub fn with_party_sizes(party_sizes: Vec<u32>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let rooms = Arc::new(MemoryRoomStore::new());
        let publisher = Arc::new(MockEventPublisher::new());
        let metrics = Arc::new(MetricsCollector::new().unwrap());

        let queue = Arc::new(MatchQueue::new(store.clone()));
        let sweeper = QueueSweeper::new(
            queue.clone(),
            publisher.clone(),
            party_sizes,
            Duration::from_millis(50),
            metrics.clone(),
        );
        let aggregator = Arc::new(FinalChoiceAggregator::new(
            store.clone(),
            rooms.clone(),
            publisher.clone(),
            Duration::from_millis(10),
            metrics.clone(),
        ));
        let manager = Arc::new(RoomLifecycleManager::new(
            store.clone(),
            rooms.clone(),
            publisher.clone(),
            aggregator.clone(),
            RoomTimings::default(),
            metrics.clone(),
        ));
        let registry = Arc::new(PresenceRegistry::new(
            "test-proc".to_string(),
            store.clone(),
            Duration::from_millis(100),
            metrics,
        ));

        Self {
            store,
            rooms,
            publisher,
            queue,
            sweeper,
            manager,
            aggregator,
            registry,
        }
    }
}

/// Build a waiting user with plausible profile data
pub fn waiting_user(user_id: &str, gender: Gender, party_size: u32) -> WaitingUser {
    WaitingUser {
        user_id: user_id.to_string(),
        gender,
        birth_date: NaiveDate::from_ymd_opt(1996, 6, 15).unwrap(),
        address: "Seongdong-gu".to_string(),
        party_size,
    }
}

/// Enqueue `count` users per gender for the given party size
pub async fn fill_queues(system: &TestSystem, count: usize, party_size: u32) {
    for index in 0..count {
        system
            .queue
            .enqueue(&waiting_user(
                &format!("m{}-{}", party_size, index),
                Gender::Male,
                party_size,
            ))
            .await
            .unwrap();
        system
            .queue
            .enqueue(&waiting_user(
                &format!("f{}-{}", party_size, index),
                Gender::Female,
                party_size,
            ))
            .await
            .unwrap();
    }
}
