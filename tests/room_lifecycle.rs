//! Room lifecycle integration tests
//!
//! Covers the timed transitions: chat expiry, early promotion, the choice
//! deadline, exactly-once finalization across concurrent sweepers, and the
//! post-finalization cleanup cascade.

mod fixtures;

use fixtures::{fill_queues, TestSystem};
use mingle_room::amqp::messages::{EVENT_FINAL_CHOICE_RESULT, EVENT_ROOM_TIMEOUT, RK_ROOM_TIMEOUT};
use mingle_room::room::store::RoomStore;
use mingle_room::store::{keys, SharedStore};
use mingle_room::types::{Room, RoomStatus};
use std::time::Duration;

async fn chatting_room(system: &TestSystem) -> Room {
    fill_queues(system, 2, 2).await;
    let event = system.sweeper.tick_once(2).await.unwrap().unwrap();
    system.manager.create_room(event).await.unwrap()
}

#[tokio::test]
async fn test_chat_deadline_opens_choice_phase() {
    let system = TestSystem::new();
    let room = chatting_room(&system).await;

    // Nothing happens while the chat TTL is live
    assert_eq!(system.manager.sweep_chat_once().await.unwrap(), 0);

    system
        .store
        .expire_now(&keys::room_deadline_key(room.id))
        .await;
    assert_eq!(system.manager.sweep_chat_once().await.unwrap(), 1);

    let updated = system.rooms.get(room.id).await.unwrap().unwrap();
    assert_eq!(updated.status, RoomStatus::ChoicePending);
    assert_eq!(system.publisher.count_of(EVENT_ROOM_TIMEOUT), 1);
}

#[tokio::test]
async fn test_concurrent_sweeps_promote_once() {
    let system = TestSystem::new();
    let room = chatting_room(&system).await;
    system
        .store
        .expire_now(&keys::room_deadline_key(room.id))
        .await;

    // Two sweepers racing over the same store; the index removal gates them
    let (first, second) = tokio::join!(
        system.manager.sweep_chat_once(),
        system.manager.sweep_chat_once()
    );
    assert_eq!(first.unwrap() + second.unwrap(), 1);
    assert_eq!(system.publisher.count_of(EVENT_ROOM_TIMEOUT), 1);
}

#[tokio::test]
async fn test_unanimous_leave_promotes_before_deadline() {
    let system = TestSystem::new();
    let room = chatting_room(&system).await;

    for member in &room.members {
        system
            .manager
            .signal_ready(room.id, &member.user_id)
            .await
            .unwrap();
    }

    let updated = system.rooms.get(room.id).await.unwrap().unwrap();
    assert_eq!(updated.status, RoomStatus::ChoicePending);

    // The regular sweep later finds nothing left to promote
    assert_eq!(system.manager.sweep_chat_once().await.unwrap(), 0);
    assert_eq!(system.publisher.count_of(EVENT_ROOM_TIMEOUT), 1);
}

#[tokio::test]
async fn test_choice_deadline_finalizes_partial_votes() {
    let system = TestSystem::new();
    let room = chatting_room(&system).await;
    system.manager.promote_room(room.id).await.unwrap();

    // One vote arrives, then the choice window closes
    let voter = room.members[0].user_id.clone();
    let target = room
        .members
        .iter()
        .find(|m| m.gender != room.members[0].gender)
        .map(|m| m.user_id.clone())
        .unwrap();
    system
        .aggregator
        .submit_choice(room.id, &voter, Some(&target))
        .await
        .unwrap();

    system
        .store
        .expire_now(&keys::room_deadline_key(room.id))
        .await;
    assert_eq!(system.manager.sweep_choice_once().await.unwrap(), 1);

    let updated = system.rooms.get(room.id).await.unwrap().unwrap();
    assert_eq!(updated.status, RoomStatus::ChoiceComplete);
    assert_eq!(system.publisher.count_of(EVENT_FINAL_CHOICE_RESULT), 1);
}

#[tokio::test]
async fn test_vote_overwrite_changes_outcome() {
    let system = TestSystem::new();
    let room = chatting_room(&system).await;
    system.manager.promote_room(room.id).await.unwrap();

    let males: Vec<_> = room
        .members
        .iter()
        .filter(|m| m.gender == mingle_room::types::Gender::Male)
        .map(|m| m.user_id.clone())
        .collect();
    let females: Vec<_> = room
        .members
        .iter()
        .filter(|m| m.gender == mingle_room::types::Gender::Female)
        .map(|m| m.user_id.clone())
        .collect();

    // m0 first picks f0, then changes to f1 before the window closes
    system
        .aggregator
        .submit_choice(room.id, &males[0], Some(&females[0]))
        .await
        .unwrap();
    system
        .aggregator
        .submit_choice(room.id, &males[0], Some(&females[1]))
        .await
        .unwrap();
    system
        .aggregator
        .submit_choice(room.id, &males[1], None)
        .await
        .unwrap();
    system
        .aggregator
        .submit_choice(room.id, &females[0], Some(&males[0]))
        .await
        .unwrap();
    let outcome = system
        .aggregator
        .submit_choice(room.id, &females[1], Some(&males[0]))
        .await
        .unwrap()
        .unwrap();

    // The overwrite stands: the couple is (m0, f1), not (m0, f0)
    let mut expected = [males[0].clone(), females[1].clone()];
    expected.sort();
    assert_eq!(
        outcome.couples,
        vec![(expected[0].clone(), expected[1].clone())]
    );
}

#[tokio::test]
async fn test_cleanup_cascade_removes_room_state() {
    let system = TestSystem::new();
    let room = chatting_room(&system).await;
    system.manager.promote_room(room.id).await.unwrap();
    system.aggregator.finalize_room(room.id).await.unwrap();

    // Grace delay in the fixture is 10ms
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(system.rooms.get(room.id).await.unwrap().is_none());
    assert_eq!(
        system
            .store
            .set_len(&keys::room_members_key(room.id))
            .await
            .unwrap(),
        0
    );
    assert!(system
        .store
        .hash_get_all(&keys::room_choice_key(room.id))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_member_without_presence_is_reported_inactive() {
    let system = TestSystem::new();
    let room = chatting_room(&system).await;

    // Half the room holds sockets somewhere in the fleet
    for member in room.members.iter().take(2) {
        system
            .store
            .hash_set(keys::ACTIVE_CLIENTS, &member.user_id, "some-proc")
            .await
            .unwrap();
    }

    system.manager.promote_room(room.id).await.unwrap();

    let events = system.publisher.published_to(RK_ROOM_TIMEOUT);
    assert_eq!(events.len(), 1);
    let timeout: mingle_room::types::RoomTimeout = events[0].decode().unwrap();
    assert_eq!(timeout.inactive.len(), 2);
}
