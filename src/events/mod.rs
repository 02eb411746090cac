//! Typed events and the pipeline that fans them out.
//!
//! Every externally observable table mutation publishes exactly one event
//! carrying an immutable snapshot captured before publication. Workers
//! drain the queue and run the notification broadcaster, the game-state
//! broadcaster, and the persistence writer, in that order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::game::engine::ShowdownSummary;
use crate::game::entities::{Chips, PlayerId, SeatIndex, TableId};
use crate::snapshot::TableSnapshot;

pub mod handlers;
pub mod pipeline;

pub use handlers::EventHandlers;
pub use pipeline::EventPipeline;

/// Capability handed to tables for publishing events; the owner wires it to
/// the pipeline. Unit tests pass a no-op or a channel-backed closure.
pub type EventSink = Arc<dyn Fn(Event) + Send + Sync>;

/// Capability for scheduling an out-of-band async state save (used for
/// mutations that have no event kind, like disconnect marking). The owner
/// wires it to the persistence writer.
pub type SaveSink = Arc<dyn Fn(TableSnapshot) + Send + Sync>;

/// A sink that discards everything.
pub fn noop_sink() -> EventSink {
    Arc::new(|_| {})
}

/// A save capability that discards everything.
pub fn noop_save() -> SaveSink {
    Arc::new(|_| {})
}

/// Event type tags.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    TableCreated,
    TableRemoved,
    PlayerJoined,
    PlayerLeft,
    PlayerReady,
    GameStarted,
    NewHandStarted,
    BetMade,
    CallMade,
    CheckMade,
    PlayerFolded,
    PlayerAllIn,
    ShowdownResult,
    GameEnded,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::TableCreated => "TABLE_CREATED",
            Self::TableRemoved => "TABLE_REMOVED",
            Self::PlayerJoined => "PLAYER_JOINED",
            Self::PlayerLeft => "PLAYER_LEFT",
            Self::PlayerReady => "PLAYER_READY",
            Self::GameStarted => "GAME_STARTED",
            Self::NewHandStarted => "NEW_HAND_STARTED",
            Self::BetMade => "BET_MADE",
            Self::CallMade => "CALL_MADE",
            Self::CheckMade => "CHECK_MADE",
            Self::PlayerFolded => "PLAYER_FOLDED",
            Self::PlayerAllIn => "PLAYER_ALL_IN",
            Self::ShowdownResult => "SHOWDOWN_RESULT",
            Self::GameEnded => "GAME_ENDED",
        };
        write!(f, "{repr}")
    }
}

/// Tagged payload union; exactly one variant per event kind. Handlers
/// pattern-match and skip events whose payload shape does not match the
/// kind tag.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum EventPayload {
    TableCreated { host_id: PlayerId },
    TableRemoved,
    PlayerJoined { player_id: PlayerId, seat: SeatIndex },
    PlayerLeft { player_id: PlayerId, new_host: Option<PlayerId> },
    PlayerReady { player_id: PlayerId, ready: bool },
    GameStarted { dealer: PlayerId },
    NewHandStarted { dealer: PlayerId },
    BetMade { player_id: PlayerId, amount: Chips },
    CallMade { player_id: PlayerId, amount: Chips },
    CheckMade { player_id: PlayerId },
    PlayerFolded { player_id: PlayerId },
    PlayerAllIn { player_id: PlayerId, amount: Chips },
    ShowdownResult { summary: ShowdownSummary },
    GameEnded,
}

impl EventPayload {
    /// The kind this payload variant belongs to.
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::TableCreated { .. } => EventKind::TableCreated,
            EventPayload::TableRemoved => EventKind::TableRemoved,
            EventPayload::PlayerJoined { .. } => EventKind::PlayerJoined,
            EventPayload::PlayerLeft { .. } => EventKind::PlayerLeft,
            EventPayload::PlayerReady { .. } => EventKind::PlayerReady,
            EventPayload::GameStarted { .. } => EventKind::GameStarted,
            EventPayload::NewHandStarted { .. } => EventKind::NewHandStarted,
            EventPayload::BetMade { .. } => EventKind::BetMade,
            EventPayload::CallMade { .. } => EventKind::CallMade,
            EventPayload::CheckMade { .. } => EventKind::CheckMade,
            EventPayload::PlayerFolded { .. } => EventKind::PlayerFolded,
            EventPayload::PlayerAllIn { .. } => EventKind::PlayerAllIn,
            EventPayload::ShowdownResult { .. } => EventKind::ShowdownResult,
            EventPayload::GameEnded => EventKind::GameEnded,
        }
    }
}

/// One published table event. The snapshot is the authoritative post-state
/// of the mutation that produced the event.
#[derive(Clone, Debug)]
pub struct Event {
    pub id: Uuid,
    pub kind: EventKind,
    pub table_id: TableId,
    /// Seated players at capture time; the notification broadcaster fans
    /// out to these.
    pub recipients: Vec<PlayerId>,
    pub created_at: DateTime<Utc>,
    pub snapshot: TableSnapshot,
    pub payload: EventPayload,
}

impl Event {
    /// Build an event from a captured snapshot; the kind tag is derived
    /// from the payload variant so the two cannot drift apart.
    pub fn new(snapshot: TableSnapshot, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: payload.kind(),
            table_id: snapshot.id.clone(),
            recipients: snapshot.user_ids(),
            created_at: Utc::now(),
            snapshot,
            payload,
        }
    }

    /// Whether the payload variant matches the kind tag.
    pub fn payload_matches_kind(&self) -> bool {
        self.payload.kind() == self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TableConfig;

    fn sample_snapshot() -> TableSnapshot {
        TableSnapshot {
            id: "t1".to_string(),
            host_id: "p1".to_string(),
            config: TableConfig::default(),
            created_at: Utc::now(),
            users: Vec::new(),
            game: None,
            seq: 1,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_event_kind_derived_from_payload() {
        let event = Event::new(
            sample_snapshot(),
            EventPayload::PlayerJoined {
                player_id: "p2".to_string(),
                seat: 1,
            },
        );
        assert_eq!(event.kind, EventKind::PlayerJoined);
        assert!(event.payload_matches_kind());
        assert_eq!(event.table_id, "t1");
    }

    #[test]
    fn test_mismatched_payload_detected() {
        let mut event = Event::new(sample_snapshot(), EventPayload::GameEnded);
        event.kind = EventKind::BetMade;
        assert!(!event.payload_matches_kind());
    }

    #[test]
    fn test_every_payload_maps_to_unique_kind() {
        let payloads = vec![
            EventPayload::TableCreated {
                host_id: "p".into(),
            },
            EventPayload::TableRemoved,
            EventPayload::PlayerJoined {
                player_id: "p".into(),
                seat: 0,
            },
            EventPayload::PlayerLeft {
                player_id: "p".into(),
                new_host: None,
            },
            EventPayload::PlayerReady {
                player_id: "p".into(),
                ready: true,
            },
            EventPayload::GameStarted { dealer: "p".into() },
            EventPayload::NewHandStarted { dealer: "p".into() },
            EventPayload::BetMade {
                player_id: "p".into(),
                amount: 1,
            },
            EventPayload::CallMade {
                player_id: "p".into(),
                amount: 1,
            },
            EventPayload::CheckMade {
                player_id: "p".into(),
            },
            EventPayload::PlayerFolded {
                player_id: "p".into(),
            },
            EventPayload::PlayerAllIn {
                player_id: "p".into(),
                amount: 1,
            },
            EventPayload::ShowdownResult {
                summary: ShowdownSummary {
                    pot: 0,
                    winners: vec![],
                    awards: vec![],
                    hands: vec![],
                },
            },
            EventPayload::GameEnded,
        ];
        let kinds: std::collections::HashSet<EventKind> =
            payloads.iter().map(EventPayload::kind).collect();
        assert_eq!(kinds.len(), payloads.len());
    }
}
