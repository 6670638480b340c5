//! End-to-end gameplay scenarios driven through the tick.
//!
//! Each test builds a [`ServerState`] over a [`MemoryStore`] and a
//! [`RecordingTransport`], feeds it inbound events tick by tick, and
//! checks what each connection received and what the store holds.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::too_many_lines,
    clippy::missing_panics_doc
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use farmworld_core::activity::StateKind;
use farmworld_core::broadcast::RecordingTransport;
use farmworld_core::config::ServerConfig;
use farmworld_core::dispatch::InboundEvent;
use farmworld_core::store::{CasOutcome, MemoryStore, StoreError, Versioned, WorldStore};
use farmworld_core::tick::{ServerState, TickSummary, run_tick};
use farmworld_types::{
    ClientMessage, ConnectionId, InventoryItem, ItemName, Mineable, MineableSize,
    MineableSubType, MineableType, ObjectBody, ObjectId, ObjectKind, PlayerRecord, ServerMessage,
    Transform, WorldObject,
};

// =============================================================================
// Harness
// =============================================================================

/// [`MemoryStore`] wrapper whose next XP write can be made to fail.
struct FaultyStore {
    inner: Arc<MemoryStore>,
    fail_next_xp: AtomicBool,
}

impl WorldStore for FaultyStore {
    fn write_new_object(&self, object: &WorldObject) -> Result<ObjectId, StoreError> {
        self.inner.write_new_object(object)
    }

    fn read_object(&self, id: &ObjectId) -> Result<Option<Versioned<WorldObject>>, StoreError> {
        self.inner.read_object(id)
    }

    fn query_objects_by_type(&self, kind: ObjectKind) -> Result<Vec<WorldObject>, StoreError> {
        self.inner.query_objects_by_type(kind)
    }

    fn compare_and_swap(
        &self,
        id: &ObjectId,
        expected_version: u64,
        object: &WorldObject,
    ) -> Result<CasOutcome, StoreError> {
        self.inner.compare_and_swap(id, expected_version, object)
    }

    fn locked_objects(&self) -> Result<Vec<WorldObject>, StoreError> {
        self.inner.locked_objects()
    }

    fn force_unlock_all(&self) -> Result<usize, StoreError> {
        self.inner.force_unlock_all()
    }

    fn add_to_user_inventory(&self, item: &InventoryItem) -> Result<u32, StoreError> {
        self.inner.add_to_user_inventory(item)
    }

    fn user_inventory(&self, user_name: &str) -> Result<Vec<InventoryItem>, StoreError> {
        self.inner.user_inventory(user_name)
    }

    fn get_player(&self, user_name: &str) -> Result<Option<PlayerRecord>, StoreError> {
        self.inner.get_player(user_name)
    }

    fn add_player_xp(&self, user_name: &str, xp: u32) -> Result<u64, StoreError> {
        if self.fail_next_xp.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                message: "connection reset".to_owned(),
            });
        }
        self.inner.add_player_xp(user_name, xp)
    }
}

struct World {
    state: ServerState,
    recorder: RecordingTransport,
    store: Arc<MemoryStore>,
    faults: Arc<FaultyStore>,
}

impl World {
    fn new(config: &ServerConfig) -> Self {
        let recorder = RecordingTransport::new();
        let store = Arc::new(MemoryStore::new());
        let faults = Arc::new(FaultyStore {
            inner: Arc::clone(&store),
            fail_next_xp: AtomicBool::new(false),
        });
        let shared: Arc<dyn WorldStore> = Arc::clone(&faults) as Arc<dyn WorldStore>;
        let state = ServerState::new(config, shared, Box::new(recorder.clone()), 0).unwrap();
        Self {
            state,
            recorder,
            store,
            faults,
        }
    }

    fn tick(&mut self, at_ms: u64, events: Vec<InboundEvent>) -> TickSummary {
        run_tick(&mut self.state, at_ms, events).unwrap()
    }

    /// Log in alice on connection 1 and bob on connection 2, then forget
    /// the snapshot traffic.
    fn with_two_players(config: &ServerConfig) -> Self {
        let mut world = Self::new(config);
        world.tick(
            0,
            vec![
                message(1, ClientMessage::Login {
                    user_name: "alice".to_owned(),
                }),
                message(2, ClientMessage::Login {
                    user_name: "bob".to_owned(),
                }),
            ],
        );
        world.recorder.take();
        world
    }

    fn seed_rock(&self, sub: MineableSubType, size: MineableSize) -> ObjectId {
        self.store
            .write_new_object(&WorldObject::unplaced(ObjectBody::Mineable(Mineable {
                mineable_type: MineableType::Rock,
                sub_mineable_type: sub,
                size,
                quantity: 20,
                transform: pose(),
            })))
            .unwrap()
    }

    fn received(&self, conn: u64) -> Vec<ServerMessage> {
        self.recorder.sent_to(ConnectionId(conn))
    }

    fn activity(&self, user: &str) -> StateKind {
        let id = self.state.sessions.id_by_name(user).unwrap();
        self.state.sessions.get(id).unwrap().activity.kind()
    }

    fn locked_by(&self, id: &ObjectId) -> Option<String> {
        let object = self.store.read_object(id).unwrap().unwrap().value;
        object.lock.locked.then_some(object.lock.locked_by)
    }
}

const fn message(conn: u64, message: ClientMessage) -> InboundEvent {
    InboundEvent::Message {
        connection: ConnectionId(conn),
        message,
    }
}

fn pose() -> Transform {
    Transform {
        x: 10.0,
        z: -3.5,
        rot_w: 1.0,
        ..Transform::default()
    }
}

fn start_mining(conn: u64, user: &str, id: &ObjectId, sub: &str) -> InboundEvent {
    message(conn, ClientMessage::StartMining {
        id: id.clone(),
        user_name: user.to_owned(),
        mineable_type: "ROCK".to_owned(),
        sub_mineable_type: sub.to_owned(),
    })
}

fn end_mining(conn: u64, user: &str, id: &ObjectId) -> InboundEvent {
    message(conn, ClientMessage::EndMining {
        id: id.clone(),
        user_name: user.to_owned(),
        item: None,
    })
}

fn mined(conn: u64, user: &str, id: &ObjectId, quantity: u32) -> InboundEvent {
    message(conn, ClientMessage::MinedQuantity {
        id: id.clone(),
        user_name: user.to_owned(),
        item: InventoryItem {
            unique_name: ItemName::Ore,
            user_name: user.to_owned(),
            quantity,
        },
    })
}

fn ore(user: &str, quantity: u32) -> Vec<InventoryItem> {
    vec![InventoryItem {
        unique_name: ItemName::Ore,
        user_name: user.to_owned(),
        quantity,
    }]
}

fn fishing_config(delay_ms: u64) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.fishing.min_bite_delay_ms = delay_ms;
    config.fishing.max_bite_delay_ms = delay_ms;
    config
}

fn cast(conn: u64, user: &str) -> Vec<InboundEvent> {
    vec![
        message(conn, ClientMessage::FishThrowBobbler {
            user_name: user.to_owned(),
        }),
        message(conn, ClientMessage::FishBobblerInWater {
            user_name: user.to_owned(),
            zone: "StartingArea".to_owned(),
        }),
    ]
}

fn count_bites(messages: &[ServerMessage]) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m, ServerMessage::FishBiting { .. }))
        .count()
}

// =============================================================================
// Mining
// =============================================================================

#[test]
fn second_miner_is_refused_the_lock() {
    let mut world = World::with_two_players(&ServerConfig::default());
    let rock = world.seed_rock(MineableSubType::Stone, MineableSize::Small);

    world.tick(100, vec![
        start_mining(1, "alice", &rock, "STONE"),
        start_mining(2, "bob", &rock, "STONE"),
    ]);

    assert_eq!(world.locked_by(&rock).as_deref(), Some("alice"));
    assert_eq!(world.activity("alice"), StateKind::Mining);
    assert_eq!(world.activity("bob"), StateKind::Idle);

    let bob = world.received(2);
    assert!(bob.iter().any(|m| matches!(
        m,
        ServerMessage::StartMining { user_name, .. } if user_name == "alice"
    )));
    assert!(bob.iter().any(|m| matches!(
        m,
        ServerMessage::MiningLockFailed { user_name, id } if user_name == "bob" && *id == rock
    )));
    // The refusal goes to the requester only.
    assert!(
        !world
            .received(1)
            .iter()
            .any(|m| matches!(m, ServerMessage::MiningLockFailed { .. }))
    );
}

#[test]
fn lock_passes_to_next_player_after_end_mining() {
    let mut world = World::with_two_players(&ServerConfig::default());
    let rock = world.seed_rock(MineableSubType::Stone, MineableSize::Small);

    world.tick(100, vec![start_mining(1, "alice", &rock, "STONE")]);
    world.tick(200, vec![start_mining(2, "bob", &rock, "STONE")]);
    assert_eq!(world.activity("bob"), StateKind::Idle);

    world.tick(300, vec![end_mining(1, "alice", &rock)]);
    world.recorder.take();
    world.tick(400, vec![start_mining(2, "bob", &rock, "STONE")]);

    assert_eq!(world.locked_by(&rock).as_deref(), Some("bob"));
    assert_eq!(world.activity("bob"), StateKind::Mining);
    assert!(
        !world
            .received(2)
            .iter()
            .any(|m| matches!(m, ServerMessage::MiningLockFailed { .. }))
    );
}

#[test]
fn end_mining_grants_reward_and_xp() {
    let mut world = World::with_two_players(&ServerConfig::default());
    let rock = world.seed_rock(MineableSubType::Stone, MineableSize::Medium);

    world.tick(100, vec![start_mining(1, "alice", &rock, "STONE")]);
    world.tick(200, vec![message(1, ClientMessage::MinedQuantity {
        id: rock.clone(),
        user_name: "alice".to_owned(),
        item: InventoryItem {
            unique_name: ItemName::Ore,
            user_name: "alice".to_owned(),
            quantity: 3,
        },
    })]);
    world.recorder.take();
    let summary = world.tick(300, vec![end_mining(1, "alice", &rock)]);

    assert_eq!(summary.events_handled, 1);
    assert_eq!(world.activity("alice"), StateKind::Idle);
    assert_eq!(world.locked_by(&rock), None);
    assert_eq!(world.store.user_inventory("alice").unwrap(), vec![InventoryItem {
        unique_name: ItemName::Ore,
        user_name: "alice".to_owned(),
        quantity: 3,
    }]);
    assert_eq!(world.store.get_player("alice").unwrap().unwrap().xp, 2);

    let alice = world.received(1);
    assert!(alice.iter().any(|m| matches!(m, ServerMessage::UserInventory { .. })));
    assert!(alice.iter().any(|m| matches!(
        m,
        ServerMessage::ReceivedXp { xp: 2, total_xp: 2, .. }
    )));
    let bob = world.received(2);
    assert!(bob.iter().any(|m| matches!(m, ServerMessage::ReceivedXp { .. })));
    assert!(bob.iter().any(|m| matches!(
        m,
        ServerMessage::EndMining { item, .. } if item.quantity == 3 && item.unique_name == ItemName::Ore
    )));
}

#[test]
fn end_mining_nothing_mined_still_grants_xp() {
    let mut world = World::with_two_players(&ServerConfig::default());
    let rock = world.seed_rock(MineableSubType::Iron, MineableSize::Large);

    world.tick(100, vec![start_mining(1, "alice", &rock, "IRON")]);
    world.tick(200, vec![end_mining(1, "alice", &rock)]);

    assert!(world.store.user_inventory("alice").unwrap().is_empty());
    assert_eq!(world.store.get_player("alice").unwrap().unwrap().xp, 4);
}

#[test]
fn abort_mining_releases_lock_for_next_player() {
    let mut world = World::with_two_players(&ServerConfig::default());
    let rock = world.seed_rock(MineableSubType::Stone, MineableSize::Small);

    world.tick(100, vec![start_mining(1, "alice", &rock, "STONE")]);
    world.tick(200, vec![message(1, ClientMessage::AbortMining {
        id: rock.clone(),
        user_name: "alice".to_owned(),
    })]);
    assert_eq!(world.locked_by(&rock), None);
    assert!(
        world
            .received(2)
            .iter()
            .any(|m| matches!(m, ServerMessage::AbortMining { .. }))
    );

    world.tick(300, vec![start_mining(2, "bob", &rock, "STONE")]);
    assert_eq!(world.locked_by(&rock).as_deref(), Some("bob"));
}

#[test]
fn mismatched_end_mining_resets_session() {
    let mut world = World::with_two_players(&ServerConfig::default());
    let rock = world.seed_rock(MineableSubType::Stone, MineableSize::Small);
    let other = world.seed_rock(MineableSubType::Stone, MineableSize::Small);

    world.tick(100, vec![start_mining(1, "alice", &rock, "STONE")]);
    let summary = world.tick(200, vec![end_mining(1, "alice", &other)]);

    assert_eq!(summary.events_failed, 1);
    assert_eq!(world.activity("alice"), StateKind::Idle);
    assert_eq!(world.locked_by(&rock), None);
    assert!(world.store.get_player("alice").unwrap().is_none());
}

#[test]
fn failed_xp_write_is_not_replayed_and_spares_the_next_lock() {
    let mut world = World::with_two_players(&ServerConfig::default());
    let rock = world.seed_rock(MineableSubType::Stone, MineableSize::Small);

    world.tick(100, vec![start_mining(1, "alice", &rock, "STONE")]);
    world.tick(200, vec![mined(1, "alice", &rock, 5)]);
    world.faults.fail_next_xp.store(true, Ordering::SeqCst);
    let failed = world.tick(300, vec![end_mining(1, "alice", &rock)]);

    assert_eq!(failed.events_failed, 1);
    assert_eq!(world.activity("alice"), StateKind::Idle);
    assert_eq!(world.locked_by(&rock), None);
    assert_eq!(world.store.user_inventory("alice").unwrap(), ore("alice", 5));

    world.tick(400, vec![start_mining(2, "bob", &rock, "STONE")]);
    assert_eq!(world.locked_by(&rock).as_deref(), Some("bob"));

    // A client retry finds nothing to finish.
    let retry = world.tick(500, vec![end_mining(1, "alice", &rock)]);
    assert_eq!(retry.events_failed, 1);
    assert_eq!(world.store.user_inventory("alice").unwrap(), ore("alice", 5));
    assert_eq!(world.locked_by(&rock).as_deref(), Some("bob"));
    assert_eq!(world.activity("bob"), StateKind::Mining);
}

#[test]
fn abort_mining_with_wrong_id_releases_only_the_held_object() {
    let mut world = World::with_two_players(&ServerConfig::default());
    let rock = world.seed_rock(MineableSubType::Stone, MineableSize::Small);
    let other = world.seed_rock(MineableSubType::Iron, MineableSize::Small);

    world.tick(100, vec![
        start_mining(1, "alice", &rock, "STONE"),
        start_mining(2, "bob", &other, "IRON"),
    ]);
    world.recorder.take();
    let summary = world.tick(200, vec![message(1, ClientMessage::AbortMining {
        id: other.clone(),
        user_name: "alice".to_owned(),
    })]);

    assert_eq!(summary.events_handled, 1);
    assert_eq!(world.activity("alice"), StateKind::Idle);
    assert_eq!(world.locked_by(&rock), None);
    assert_eq!(world.locked_by(&other).as_deref(), Some("bob"));
    assert!(world.received(2).iter().any(|m| matches!(
        m,
        ServerMessage::AbortMining { id, user_name } if *id == rock && user_name == "alice"
    )));
}

#[test]
fn restarting_mining_moves_the_lock() {
    let mut world = World::with_two_players(&ServerConfig::default());
    let first = world.seed_rock(MineableSubType::Stone, MineableSize::Small);
    let second = world.seed_rock(MineableSubType::Iron, MineableSize::Small);

    world.tick(100, vec![start_mining(1, "alice", &first, "STONE")]);
    world.recorder.take();
    world.tick(200, vec![start_mining(1, "alice", &second, "IRON")]);

    assert_eq!(world.locked_by(&first), None);
    assert_eq!(world.locked_by(&second).as_deref(), Some("alice"));
    assert_eq!(world.activity("alice"), StateKind::Mining);

    let bob = world.received(2);
    let abort = bob.iter().position(|m| matches!(
        m,
        ServerMessage::AbortMining { id, .. } if *id == first
    ));
    let start = bob.iter().position(|m| matches!(
        m,
        ServerMessage::StartMining { id, .. } if *id == second
    ));
    assert!(abort.unwrap() < start.unwrap());
}

#[test]
fn start_mining_while_fishing_ends_fishing_for_everyone() {
    let mut world = World::with_two_players(&fishing_config(2_000));
    let rock = world.seed_rock(MineableSubType::Stone, MineableSize::Small);

    world.tick(1_000, cast(1, "alice"));
    let summary = world.tick(1_200, vec![start_mining(1, "alice", &rock, "STONE")]);

    assert_eq!(summary.events_failed, 1);
    assert_eq!(world.activity("alice"), StateKind::Idle);
    assert_eq!(world.locked_by(&rock), None);
    assert!(world.received(2).iter().any(|m| matches!(
        m,
        ServerMessage::AbortFishing { user_name } if user_name == "alice"
    )));
    assert_eq!(world.tick(3_500, Vec::new()).tasks_fired, 0);
    assert_eq!(count_bites(&world.received(2)), 0);
}

#[test]
fn unknown_material_is_rejected_without_locking() {
    let mut world = World::with_two_players(&ServerConfig::default());
    let rock = world.seed_rock(MineableSubType::Stone, MineableSize::Small);

    let summary = world.tick(100, vec![start_mining(1, "alice", &rock, "GOLD")]);

    assert_eq!(summary.events_rejected, 1);
    assert_eq!(world.locked_by(&rock), None);
}

// =============================================================================
// Fishing
// =============================================================================

#[test]
fn bite_fires_once_after_delay() {
    let mut world = World::with_two_players(&fishing_config(2_000));

    world.tick(1_000, cast(1, "alice"));
    assert_eq!(world.activity("alice"), StateKind::BobblerInWater);

    let early = world.tick(2_900, Vec::new());
    assert_eq!(early.tasks_fired, 0);
    assert_eq!(count_bites(&world.received(1)), 0);

    let due = world.tick(3_000, Vec::new());
    assert_eq!(due.tasks_fired, 1);
    assert_eq!(world.activity("alice"), StateKind::FishBiting);
    assert_eq!(count_bites(&world.received(1)), 1);
    assert_eq!(count_bites(&world.received(2)), 1);

    let later = world.tick(4_000, Vec::new());
    assert_eq!(later.tasks_fired, 0);
}

#[test]
fn abort_before_bite_cancels_it() {
    let mut world = World::with_two_players(&fishing_config(2_000));

    world.tick(1_000, cast(1, "alice"));
    world.tick(1_500, vec![message(1, ClientMessage::AbortFishing {
        user_name: "alice".to_owned(),
    })]);
    let summary = world.tick(3_500, Vec::new());

    assert_eq!(summary.tasks_fired, 0);
    assert_eq!(world.activity("alice"), StateKind::Idle);
    assert_eq!(count_bites(&world.received(1)), 0);
    assert!(world.state.events.is_empty());
}

#[test]
fn successful_catch_adds_herring() {
    let mut world = World::with_two_players(&fishing_config(1_000));

    world.tick(100, cast(1, "alice"));
    world.tick(1_100, Vec::new());
    world.recorder.take();
    world.tick(1_200, vec![message(1, ClientMessage::FishCaught {
        user_name: "alice".to_owned(),
        success: true,
    })]);

    assert_eq!(world.activity("alice"), StateKind::Idle);
    assert_eq!(world.store.user_inventory("alice").unwrap(), vec![InventoryItem {
        unique_name: ItemName::Herring,
        user_name: "alice".to_owned(),
        quantity: 1,
    }]);
    assert!(world.received(2).iter().any(|m| matches!(
        m,
        ServerMessage::FishCaught { success: true, item: Some(_), .. }
    )));
}

#[test]
fn catch_before_bite_is_refused() {
    let mut world = World::with_two_players(&fishing_config(5_000));

    world.tick(100, cast(1, "alice"));
    let summary = world.tick(200, vec![message(1, ClientMessage::FishCaught {
        user_name: "alice".to_owned(),
        success: true,
    })]);

    assert_eq!(summary.events_failed, 1);
    assert!(world.store.user_inventory("alice").unwrap().is_empty());
    // The session was reset and its pending bite dropped.
    assert_eq!(world.activity("alice"), StateKind::Idle);
    assert_eq!(world.tick(6_000, Vec::new()).tasks_fired, 0);
}

#[test]
fn unsuccessful_catch_returns_to_idle_without_reward() {
    let mut world = World::with_two_players(&fishing_config(1_000));

    world.tick(100, cast(1, "alice"));
    world.tick(1_100, Vec::new());
    assert_eq!(world.activity("alice"), StateKind::FishBiting);
    world.recorder.take();
    let summary = world.tick(1_200, vec![message(1, ClientMessage::FishCaught {
        user_name: "alice".to_owned(),
        success: false,
    })]);

    assert_eq!(summary.events_handled, 1);
    assert_eq!(world.activity("alice"), StateKind::Idle);
    assert!(world.store.user_inventory("alice").unwrap().is_empty());
    for conn in [1, 2] {
        assert!(world.received(conn).iter().any(|m| matches!(
            m,
            ServerMessage::FishCaught { success: false, item: None, user_name } if user_name == "alice"
        )));
    }
    assert!(
        !world
            .received(1)
            .iter()
            .any(|m| matches!(m, ServerMessage::UserInventory { .. }))
    );
}

#[test]
fn default_bite_delay_falls_within_bounds() {
    let mut world = World::with_two_players(&ServerConfig::default());

    world.tick(1_000, cast(1, "alice"));
    let mut fired_at = Vec::new();
    for now in (1_100..=17_000_u64).step_by(100) {
        if world.tick(now, Vec::new()).tasks_fired > 0 {
            fired_at.push(now);
        }
    }

    // Due somewhere in [4000, 16000]; seen on the first tick at or after.
    assert_eq!(fired_at.len(), 1);
    assert!((4_000..16_100).contains(&fired_at[0]), "bite at {}", fired_at[0]);
    assert_eq!(count_bites(&world.received(2)), 1);
}

#[test]
fn logout_while_waiting_cancels_the_bite() {
    let mut world = World::with_two_players(&fishing_config(2_000));

    world.tick(1_000, cast(1, "alice"));
    assert_eq!(world.state.events.len(), 1);
    world.tick(1_500, vec![InboundEvent::Disconnected(ConnectionId(1))]);

    assert!(world.state.events.is_empty());
    assert_eq!(world.tick(3_500, Vec::new()).tasks_fired, 0);
    let bob = world.received(2);
    assert_eq!(count_bites(&bob), 0);
    let abort = bob
        .iter()
        .position(|m| matches!(m, ServerMessage::AbortFishing { .. }));
    let exit = bob
        .iter()
        .position(|m| matches!(m, ServerMessage::PlayerExited { .. }));
    assert!(abort.unwrap() < exit.unwrap());
}

// =============================================================================
// Presence
// =============================================================================

#[test]
fn login_snapshot_lists_world_objects() {
    let mut world = World::new(&ServerConfig::default());
    let rock = world.seed_rock(MineableSubType::Oak, MineableSize::Small);

    world.tick(500, vec![message(7, ClientMessage::Login {
        user_name: "carol".to_owned(),
    })]);

    let received = world.received(7);
    match received.get(2) {
        Some(ServerMessage::WorldSnapshot { objects }) => {
            assert_eq!(objects.len(), 1);
            assert_eq!(objects[0].id, rock);
        }
        other => panic!("expected WorldSnapshot, got {other:?}"),
    }
    assert!(matches!(
        received.get(3),
        Some(ServerMessage::CurrentServerTime { time_ms: 500 })
    ));
}

#[test]
fn duplicate_login_is_rejected() {
    let mut world = World::with_two_players(&ServerConfig::default());

    let summary = world.tick(100, vec![message(3, ClientMessage::Login {
        user_name: "alice".to_owned(),
    })]);

    assert_eq!(summary.events_rejected, 1);
    assert_eq!(world.state.sessions.len(), 2);
    assert!(world.received(3).is_empty());
}

#[test]
fn disconnect_releases_lock_and_notifies_others() {
    let mut world = World::with_two_players(&ServerConfig::default());
    let rock = world.seed_rock(MineableSubType::Stone, MineableSize::Small);

    world.tick(100, vec![start_mining(1, "alice", &rock, "STONE")]);
    world.tick(200, vec![InboundEvent::Disconnected(ConnectionId(1))]);

    assert_eq!(world.locked_by(&rock), None);
    assert!(!world.state.sessions.contains_user("alice"));
    let bob = world.received(2);
    assert!(bob.iter().any(|m| matches!(
        m,
        ServerMessage::AbortMining { id, .. } if *id == rock
    )));
    assert!(bob.iter().any(|m| matches!(
        m,
        ServerMessage::PlayerExited { user_name } if user_name == "alice"
    )));
}

#[test]
fn disconnect_without_session_is_rejected() {
    let mut world = World::with_two_players(&ServerConfig::default());

    let summary = world.tick(100, vec![InboundEvent::Disconnected(ConnectionId(5))]);

    assert_eq!(summary.events_rejected, 1);
    assert_eq!(world.state.sessions.len(), 2);
    assert!(world.received(1).is_empty());
}

#[test]
fn message_for_another_user_is_rejected() {
    let mut world = World::with_two_players(&ServerConfig::default());
    let rock = world.seed_rock(MineableSubType::Stone, MineableSize::Small);

    let summary = world.tick(100, vec![start_mining(1, "bob", &rock, "STONE")]);

    assert_eq!(summary.events_rejected, 1);
    assert_eq!(world.locked_by(&rock), None);
    assert_eq!(world.activity("bob"), StateKind::Idle);
}

#[test]
fn message_before_login_is_ignored() {
    let mut world = World::new(&ServerConfig::default());

    let summary = world.tick(100, cast(9, "mallory"));

    assert_eq!(summary.events_rejected, 2);
    assert!(world.state.sessions.is_empty());
}

// =============================================================================
// Placement
// =============================================================================

fn placed_rock(quantity: u32) -> Mineable {
    Mineable {
        mineable_type: MineableType::Rock,
        sub_mineable_type: MineableSubType::Iron,
        size: MineableSize::Medium,
        quantity,
        transform: pose(),
    }
}

#[test]
fn standard_placement_uses_starting_quantity() {
    let mut world = World::with_two_players(&ServerConfig::default());

    world.tick(100, vec![message(1, ClientMessage::PlaceMinableObject {
        mineable: placed_rock(999),
    })]);

    let objects = world
        .store
        .query_objects_by_type(farmworld_types::ObjectKind::Mineable)
        .unwrap();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].as_mineable().unwrap().quantity, 10);
    assert!(
        world
            .received(2)
            .iter()
            .any(|m| matches!(m, ServerMessage::PlaceMinableObject { .. }))
    );
}

#[test]
fn developer_placement_is_gated_by_config() {
    let mut world = World::with_two_players(&ServerConfig::default());
    let summary = world.tick(100, vec![message(1, ClientMessage::DeveloperPlaceMinableObject {
        mineable: placed_rock(999),
    })]);
    assert_eq!(summary.events_rejected, 1);

    let mut config = ServerConfig::default();
    config.developer.allow_developer_placement = true;
    let mut world = World::with_two_players(&config);
    world.tick(100, vec![message(1, ClientMessage::DeveloperPlaceMinableObject {
        mineable: placed_rock(999),
    })]);
    let objects = world
        .store
        .query_objects_by_type(farmworld_types::ObjectKind::Mineable)
        .unwrap();
    assert_eq!(objects[0].as_mineable().unwrap().quantity, 999);
}

#[test]
fn player_transforms_reach_other_players() {
    let mut world = World::with_two_players(&ServerConfig::default());

    world.tick(100, vec![message(2, ClientMessage::PlayerTransform {
        user_name: "bob".to_owned(),
        transform: pose(),
    })]);

    assert!(world.received(1).iter().any(|m| matches!(
        m,
        ServerMessage::PlayerTransform { user_name, .. } if user_name == "bob"
    )));
    assert!(world.received(2).is_empty());
}
