//! Per-session activity state machine.
//!
//! A player is always in exactly one leaf state: idle, mining one object,
//! or at some stage of fishing. The fishing stages share a parent group so
//! a single rule ("any fishing state may abort") covers all of them.
//!
//! The legal moves live in a [`TransitionTable`] built once at startup from
//! a short rule list. Construction expands group rules into per-leaf edges
//! and rejects any rule set that assigns two targets to the same
//! `(state, trigger)` pair, so an ambiguous table can never be deployed.
//! Sessions share the table through an [`Arc`] and keep their own
//! [`ActivityState`], which carries the data each state needs (the object
//! being mined, the pending bite event).

use std::collections::BTreeMap;
use std::sync::Arc;

use farmworld_types::{MineableSubType, MineableType, ObjectId, Zone};

use crate::scheduler::EventHandle;

// ---------------------------------------------------------------------------
// States and triggers
// ---------------------------------------------------------------------------

/// Parent group of a leaf state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateGroup {
    /// Not doing anything.
    Idle,
    /// Mining a world object.
    Mining,
    /// Any stage of fishing.
    Fishing,
}

/// Leaf state without its payload, used as a table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StateKind {
    /// Not doing anything.
    Idle,
    /// Mining a world object.
    Mining,
    /// Casting animation in progress.
    ThrowingBobbler,
    /// Waiting for a bite.
    BobblerInWater,
    /// A fish is on the line.
    FishBiting,
}

impl StateKind {
    /// Every leaf state.
    pub const ALL: [Self; 5] = [
        Self::Idle,
        Self::Mining,
        Self::ThrowingBobbler,
        Self::BobblerInWater,
        Self::FishBiting,
    ];

    /// The group this leaf belongs to.
    pub const fn group(self) -> StateGroup {
        match self {
            Self::Idle => StateGroup::Idle,
            Self::Mining => StateGroup::Mining,
            Self::ThrowingBobbler | Self::BobblerInWater | Self::FishBiting => {
                StateGroup::Fishing
            }
        }
    }
}

/// Input that moves a session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Trigger {
    /// Lock acquired on a mineable.
    StartMining,
    /// Mining finished with a reward.
    EndMining,
    /// Mining stopped without a reward.
    AbortMining,
    /// Cast started.
    ThrowBobbler,
    /// Cast landed in a zone.
    BobblerInWater,
    /// Scheduled bite fired.
    FishBite,
    /// Catch minigame won.
    FishSuccessfulCatch,
    /// Catch minigame lost.
    FishUnsuccessfulCatch,
    /// Fishing abandoned at any stage.
    AbortFishing,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by the activity state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivityError {
    /// The trigger is not legal from the current state.
    #[error("illegal transition: {trigger:?} from {from:?}")]
    IllegalTransition {
        /// State the session was in.
        from: StateKind,
        /// Trigger that was fired.
        trigger: Trigger,
    },

    /// Two rules give the same `(state, trigger)` pair different targets.
    #[error("duplicate transition rule for {trigger:?} from {from:?}")]
    DuplicateRule {
        /// Leaf state the clash was detected on.
        from: StateKind,
        /// Trigger shared by both rules.
        trigger: Trigger,
    },

    /// The payload supplied for the new state does not match the table.
    #[error("{trigger:?} leads to {expected:?} but payload is {actual:?}")]
    PayloadMismatch {
        /// Trigger that was fired.
        trigger: Trigger,
        /// Target state according to the table.
        expected: StateKind,
        /// State the caller tried to enter.
        actual: StateKind,
    },
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Source side of a rule: one leaf, or every leaf of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    /// A single leaf state.
    State(StateKind),
    /// Every leaf state in a group.
    Group(StateGroup),
}

/// One declarative transition rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    /// Where the rule applies.
    pub from: RuleSource,
    /// What fires it.
    pub trigger: Trigger,
    /// Where it leads.
    pub to: StateKind,
}

const fn rule(from: RuleSource, trigger: Trigger, to: StateKind) -> Rule {
    Rule { from, trigger, to }
}

/// The gameplay rules for mining and fishing.
pub const STANDARD_RULES: &[Rule] = &[
    rule(RuleSource::State(StateKind::Idle), Trigger::StartMining, StateKind::Mining),
    rule(RuleSource::State(StateKind::Mining), Trigger::EndMining, StateKind::Idle),
    rule(RuleSource::State(StateKind::Mining), Trigger::AbortMining, StateKind::Idle),
    rule(RuleSource::State(StateKind::Idle), Trigger::ThrowBobbler, StateKind::ThrowingBobbler),
    rule(
        RuleSource::State(StateKind::ThrowingBobbler),
        Trigger::BobblerInWater,
        StateKind::BobblerInWater,
    ),
    rule(RuleSource::State(StateKind::BobblerInWater), Trigger::FishBite, StateKind::FishBiting),
    rule(
        RuleSource::State(StateKind::FishBiting),
        Trigger::FishSuccessfulCatch,
        StateKind::Idle,
    ),
    rule(
        RuleSource::State(StateKind::FishBiting),
        Trigger::FishUnsuccessfulCatch,
        StateKind::Idle,
    ),
    rule(RuleSource::Group(StateGroup::Fishing), Trigger::AbortFishing, StateKind::Idle),
];

/// Validated map from `(state, trigger)` to the next state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionTable {
    edges: BTreeMap<(StateKind, Trigger), StateKind>,
}

impl TransitionTable {
    /// Build the table for [`STANDARD_RULES`].
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::DuplicateRule`] if the rules are ambiguous.
    pub fn standard() -> Result<Self, ActivityError> {
        Self::from_rules(STANDARD_RULES)
    }

    /// Expand group rules into leaf edges and validate the result.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::DuplicateRule`] if two rules map the same
    /// leaf and trigger to different targets. Exact repeats are accepted.
    pub fn from_rules(rules: &[Rule]) -> Result<Self, ActivityError> {
        let mut edges = BTreeMap::new();
        for r in rules {
            let sources: Vec<StateKind> = match r.from {
                RuleSource::State(kind) => vec![kind],
                RuleSource::Group(group) => StateKind::ALL
                    .iter()
                    .copied()
                    .filter(|k| k.group() == group)
                    .collect(),
            };
            for from in sources {
                match edges.insert((from, r.trigger), r.to) {
                    Some(previous) if previous != r.to => {
                        return Err(ActivityError::DuplicateRule {
                            from,
                            trigger: r.trigger,
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(Self { edges })
    }

    /// Target state for `trigger` fired from `from`, if legal.
    pub fn next(&self, from: StateKind, trigger: Trigger) -> Option<StateKind> {
        self.edges.get(&(from, trigger)).copied()
    }

    /// Number of expanded leaf edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the table has no edges.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

// ---------------------------------------------------------------------------
// State payloads
// ---------------------------------------------------------------------------

/// Data held while a session mines an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MiningState {
    /// The locked object.
    pub object_id: ObjectId,
    /// Broad category reported by the client.
    pub mineable_type: MineableType,
    /// Material reported by the client.
    pub sub_mineable_type: MineableSubType,
    /// Simulation time mining started.
    pub session_start_time: u64,
    /// Total quantity reported via `MinedQuantity`.
    pub mined_quantity: u32,
}

/// Sub-state of the fishing group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FishingState {
    /// Casting animation in progress.
    ThrowingBobbler,
    /// Waiting for the scheduled bite.
    BobblerInWater {
        /// Zone the bobbler landed in.
        zone: Zone,
        /// Pending bite event; cancelled on abort.
        bite_event: EventHandle,
    },
    /// A fish is on the line.
    FishBiting,
}

/// Full per-session activity state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActivityState {
    /// Not doing anything.
    #[default]
    Idle,
    /// Mining a world object.
    Mining(MiningState),
    /// Fishing.
    Fishing(FishingState),
}

impl ActivityState {
    /// The leaf kind of this state.
    pub const fn kind(&self) -> StateKind {
        match self {
            Self::Idle => StateKind::Idle,
            Self::Mining(_) => StateKind::Mining,
            Self::Fishing(FishingState::ThrowingBobbler) => StateKind::ThrowingBobbler,
            Self::Fishing(FishingState::BobblerInWater { .. }) => StateKind::BobblerInWater,
            Self::Fishing(FishingState::FishBiting) => StateKind::FishBiting,
        }
    }

    /// The held object, when mining.
    pub const fn mining_object(&self) -> Option<&ObjectId> {
        match self {
            Self::Mining(m) => Some(&m.object_id),
            Self::Idle | Self::Fishing(_) => None,
        }
    }

    /// The pending bite event, when waiting in the water.
    pub const fn bite_event(&self) -> Option<EventHandle> {
        match self {
            Self::Fishing(FishingState::BobblerInWater { bite_event, .. }) => Some(*bite_event),
            Self::Idle | Self::Mining(_) | Self::Fishing(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// A session's current state plus the shared table that governs it.
#[derive(Debug, Clone)]
pub struct ActivityMachine {
    table: Arc<TransitionTable>,
    state: ActivityState,
}

impl ActivityMachine {
    /// A machine in [`ActivityState::Idle`].
    pub const fn new(table: Arc<TransitionTable>) -> Self {
        Self {
            table,
            state: ActivityState::Idle,
        }
    }

    /// Current state.
    pub const fn state(&self) -> &ActivityState {
        &self.state
    }

    /// Current leaf kind.
    pub const fn kind(&self) -> StateKind {
        self.state.kind()
    }

    /// Whether `trigger` is legal from the current state.
    pub fn can_fire(&self, trigger: Trigger) -> bool {
        self.table.next(self.kind(), trigger).is_some()
    }

    /// Fire `trigger`, entering `next`. Returns the state that was left.
    fn transition(
        &mut self,
        trigger: Trigger,
        next: ActivityState,
    ) -> Result<ActivityState, ActivityError> {
        let from = self.kind();
        let expected = self
            .table
            .next(from, trigger)
            .ok_or(ActivityError::IllegalTransition { from, trigger })?;
        if next.kind() != expected {
            return Err(ActivityError::PayloadMismatch {
                trigger,
                expected,
                actual: next.kind(),
            });
        }
        Ok(std::mem::replace(&mut self.state, next))
    }

    /// Idle → Mining.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::IllegalTransition`] unless idle.
    pub fn start_mining(&mut self, mining: MiningState) -> Result<(), ActivityError> {
        self.transition(Trigger::StartMining, ActivityState::Mining(mining))
            .map(drop)
    }

    /// Mining → Idle with a reward. Returns the finished mining data.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::IllegalTransition`] unless mining.
    pub fn end_mining(&mut self) -> Result<MiningState, ActivityError> {
        self.leave_mining(Trigger::EndMining)
    }

    /// Mining → Idle without a reward. Returns the abandoned mining data.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::IllegalTransition`] unless mining.
    pub fn abort_mining(&mut self) -> Result<MiningState, ActivityError> {
        self.leave_mining(Trigger::AbortMining)
    }

    fn leave_mining(&mut self, trigger: Trigger) -> Result<MiningState, ActivityError> {
        match self.transition(trigger, ActivityState::Idle)? {
            ActivityState::Mining(m) => Ok(m),
            other => {
                // Only reachable with a table that lets a non-mining state
                // take a mining exit; put the old state back.
                let from = other.kind();
                self.state = other;
                Err(ActivityError::IllegalTransition { from, trigger })
            }
        }
    }

    /// Add to the mined counter if currently mining `object_id`.
    ///
    /// Returns the new total, or `None` if not mining that object.
    pub fn record_mined(&mut self, object_id: &ObjectId, quantity: u32) -> Option<u32> {
        match &mut self.state {
            ActivityState::Mining(m) if m.object_id == *object_id => {
                m.mined_quantity = m.mined_quantity.saturating_add(quantity);
                Some(m.mined_quantity)
            }
            _ => None,
        }
    }

    /// Idle → `ThrowingBobbler`.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::IllegalTransition`] unless idle.
    pub fn throw_bobbler(&mut self) -> Result<(), ActivityError> {
        self.transition(
            Trigger::ThrowBobbler,
            ActivityState::Fishing(FishingState::ThrowingBobbler),
        )
        .map(drop)
    }

    /// `ThrowingBobbler` → `BobblerInWater`.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::IllegalTransition`] unless throwing.
    pub fn bobbler_in_water(
        &mut self,
        zone: Zone,
        bite_event: EventHandle,
    ) -> Result<(), ActivityError> {
        self.transition(
            Trigger::BobblerInWater,
            ActivityState::Fishing(FishingState::BobblerInWater { zone, bite_event }),
        )
        .map(drop)
    }

    /// `BobblerInWater` → `FishBiting`.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::IllegalTransition`] unless waiting.
    pub fn fish_bite(&mut self) -> Result<(), ActivityError> {
        self.transition(
            Trigger::FishBite,
            ActivityState::Fishing(FishingState::FishBiting),
        )
        .map(drop)
    }

    /// `FishBiting` → Idle.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::IllegalTransition`] unless a fish is biting.
    pub fn catch_fish(&mut self, success: bool) -> Result<(), ActivityError> {
        let trigger = if success {
            Trigger::FishSuccessfulCatch
        } else {
            Trigger::FishUnsuccessfulCatch
        };
        self.transition(trigger, ActivityState::Idle).map(drop)
    }

    /// Any fishing state → Idle. Returns the bite event that was pending,
    /// if any, so the caller can cancel it.
    ///
    /// # Errors
    ///
    /// Returns [`ActivityError::IllegalTransition`] unless fishing.
    pub fn abort_fishing(&mut self) -> Result<Option<EventHandle>, ActivityError> {
        self.transition(Trigger::AbortFishing, ActivityState::Idle)
            .map(|left| left.bite_event())
    }

    /// Force the machine back to idle, bypassing the table.
    ///
    /// Used only to recover a session after an invariant violation or on
    /// logout. Returns the state that was left.
    pub fn reset(&mut self) -> ActivityState {
        std::mem::take(&mut self.state)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn machine() -> ActivityMachine {
        ActivityMachine::new(Arc::new(TransitionTable::standard().unwrap()))
    }

    fn mining(id: &str) -> MiningState {
        MiningState {
            object_id: ObjectId::from(id),
            mineable_type: MineableType::Rock,
            sub_mineable_type: MineableSubType::Iron,
            session_start_time: 10,
            mined_quantity: 0,
        }
    }

    #[test]
    fn standard_table_expands_fishing_group() {
        let table = TransitionTable::standard().unwrap();
        for kind in [
            StateKind::ThrowingBobbler,
            StateKind::BobblerInWater,
            StateKind::FishBiting,
        ] {
            assert_eq!(table.next(kind, Trigger::AbortFishing), Some(StateKind::Idle));
        }
        assert_eq!(table.next(StateKind::Idle, Trigger::AbortFishing), None);
        assert_eq!(table.next(StateKind::Mining, Trigger::AbortFishing), None);
        // 8 leaf rules + 3 expanded abort edges
        assert_eq!(table.len(), 11);
    }

    #[test]
    fn conflicting_rules_are_rejected() {
        let rules = [
            rule(RuleSource::Group(StateGroup::Fishing), Trigger::AbortFishing, StateKind::Idle),
            rule(
                RuleSource::State(StateKind::FishBiting),
                Trigger::AbortFishing,
                StateKind::Mining,
            ),
        ];
        assert_eq!(
            TransitionTable::from_rules(&rules).unwrap_err(),
            ActivityError::DuplicateRule {
                from: StateKind::FishBiting,
                trigger: Trigger::AbortFishing,
            }
        );
    }

    #[test]
    fn mining_round_trip() {
        let mut m = machine();
        m.start_mining(mining("MINEABLE1")).unwrap();
        assert_eq!(m.kind(), StateKind::Mining);
        assert_eq!(m.record_mined(&ObjectId::from("MINEABLE1"), 3), Some(3));
        assert_eq!(m.record_mined(&ObjectId::from("MINEABLE2"), 3), None);
        let done = m.end_mining().unwrap();
        assert_eq!(done.mined_quantity, 3);
        assert_eq!(m.kind(), StateKind::Idle);
    }

    #[test]
    fn mining_and_fishing_are_exclusive() {
        let mut m = machine();
        m.start_mining(mining("MINEABLE1")).unwrap();
        assert_eq!(
            m.throw_bobbler().unwrap_err(),
            ActivityError::IllegalTransition {
                from: StateKind::Mining,
                trigger: Trigger::ThrowBobbler,
            }
        );
        assert_eq!(m.kind(), StateKind::Mining);
    }

    #[test]
    fn end_mining_when_idle_is_illegal() {
        let mut m = machine();
        assert!(matches!(
            m.end_mining(),
            Err(ActivityError::IllegalTransition { from: StateKind::Idle, .. })
        ));
        assert_eq!(m.kind(), StateKind::Idle);
    }

    #[test]
    fn fishing_sequence() {
        let mut m = machine();
        let handle = crate::scheduler::DelayedEventQueue::new()
            .schedule(0, 1, crate::scheduler::TaskKind::FishBite {
                session: crate::session::SessionId::from_parts(0, 0),
                user_name: "a".to_owned(),
            })
            .unwrap();
        m.throw_bobbler().unwrap();
        m.bobbler_in_water(Zone::StartingArea, handle).unwrap();
        assert_eq!(m.state().bite_event(), Some(handle));
        m.fish_bite().unwrap();
        m.catch_fish(true).unwrap();
        assert_eq!(m.kind(), StateKind::Idle);
    }

    #[test]
    fn abort_fishing_returns_pending_bite() {
        let mut m = machine();
        let mut queue = crate::scheduler::DelayedEventQueue::new();
        let handle = queue
            .schedule(0, 1, crate::scheduler::TaskKind::FishBite {
                session: crate::session::SessionId::from_parts(0, 0),
                user_name: "a".to_owned(),
            })
            .unwrap();
        m.throw_bobbler().unwrap();
        m.bobbler_in_water(Zone::StartingArea, handle).unwrap();
        assert_eq!(m.abort_fishing().unwrap(), Some(handle));
        m.throw_bobbler().unwrap();
        assert_eq!(m.abort_fishing().unwrap(), None);
    }

    #[test]
    fn reset_returns_previous_state() {
        let mut m = machine();
        m.start_mining(mining("MINEABLE9")).unwrap();
        let left = m.reset();
        assert_eq!(left.mining_object(), Some(&ObjectId::from("MINEABLE9")));
        assert_eq!(m.kind(), StateKind::Idle);
    }
}
