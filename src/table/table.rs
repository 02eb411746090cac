//! A running table: seat management, readiness, host transfer, turn and
//! auto-start timers, and the adapter between the game engine and the
//! publish capability.
//!
//! Lock order is seats then game, never the reverse. Every mutation
//! captures its snapshot while both locks are held and publishes only after
//! they are released; the snapshot sequence number keeps downstream
//! consumers ordered anyway.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use super::config::TableConfig;
use crate::errors::{Error, Result};
use crate::events::{Event, EventPayload, EventSink, SaveSink};
use crate::game::engine::{AppliedAction, Game, ShowdownSummary};
use crate::game::entities::{Chips, PlayerAction, PlayerId, SeatIndex, TableId};
use crate::snapshot::TableSnapshot;

/// Table-level seat record.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct User {
    pub id: PlayerId,
    pub name: String,
    pub seat: SeatIndex,
    /// Account balance observed at join time.
    pub dcr_balance: Chips,
    pub ready: bool,
    pub disconnected: bool,
}

/// What a removal did, so the owner can tear the table down once it
/// empties.
#[derive(Clone, Debug)]
pub struct LeaveOutcome {
    /// Seat freed immediately; false when the removal waits for hand end.
    pub removed_now: bool,
    pub new_host: Option<PlayerId>,
    pub table_empty: bool,
}

struct Seats {
    host_id: PlayerId,
    /// Seat-sorted.
    users: Vec<User>,
    /// Mid-hand leavers whose seats are freed when the hand ends.
    leaving: BTreeSet<PlayerId>,
    last_showdown: Option<ShowdownSummary>,
}

impl Seats {
    fn position(&self, player_id: &str) -> Option<usize> {
        self.users.iter().position(|u| u.id == player_id)
    }

    fn find_mut(&mut self, player_id: &str) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == player_id)
    }

    fn all_ready(&self) -> bool {
        !self.users.is_empty() && self.users.iter().all(|u| u.ready)
    }

    fn entries(&self) -> Vec<(PlayerId, SeatIndex)> {
        self.users.iter().map(|u| (u.id.clone(), u.seat)).collect()
    }

    fn lowest_free_seat(&self, max_players: usize) -> Option<SeatIndex> {
        (0..max_players).find(|seat| !self.users.iter().any(|u| u.seat == *seat))
    }
}

/// Deferred work decided under the locks, executed after release.
enum Followup {
    None,
    ArmTurn(u64),
    ScheduleHand(u64),
}

struct Plan {
    events: Vec<Event>,
    followup: Followup,
}

impl Plan {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            followup: Followup::None,
        }
    }
}

/// One running hand-host.
pub struct Table {
    id: TableId,
    config: TableConfig,
    created_at: DateTime<Utc>,
    publish: EventSink,
    save: SaveSink,
    seats: Mutex<Seats>,
    game: Mutex<Option<Game>>,
    /// Snapshot sequence; assigned under the locks.
    event_seq: AtomicU64,
    /// Cancels pending turn timers when it advances.
    turn_serial: AtomicU64,
    /// Cancels pending auto-start / next-hand timers when it advances.
    start_serial: AtomicU64,
}

impl Table {
    /// Create an empty table owned by `host_id`. The host still joins
    /// through [`Table::add_user`] like everyone else.
    pub fn new(
        id: TableId,
        config: TableConfig,
        host_id: PlayerId,
        publish: EventSink,
        save: SaveSink,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            config,
            created_at: Utc::now(),
            publish,
            save,
            seats: Mutex::new(Seats {
                host_id,
                users: Vec::new(),
                leaving: BTreeSet::new(),
                last_showdown: None,
            }),
            game: Mutex::new(None),
            event_seq: AtomicU64::new(0),
            turn_serial: AtomicU64::new(0),
            start_serial: AtomicU64::new(0),
        })
    }

    /// Rebuild a table from a persisted snapshot without re-dealing: seats,
    /// readiness, and the mid-hand game state come back exactly as saved.
    pub fn restore(snapshot: &TableSnapshot, publish: EventSink, save: SaveSink) -> Arc<Self> {
        let game = snapshot.game.as_ref().map(|g| {
            Game::from_snapshot(g, snapshot.config.small_blind, snapshot.config.big_blind)
        });
        Arc::new(Self {
            id: snapshot.id.clone(),
            config: snapshot.config.clone(),
            created_at: snapshot.created_at,
            publish,
            save,
            seats: Mutex::new(Seats {
                host_id: snapshot.host_id.clone(),
                users: snapshot.users.clone(),
                leaving: BTreeSet::new(),
                last_showdown: None,
            }),
            game: Mutex::new(game),
            event_seq: AtomicU64::new(0),
            turn_serial: AtomicU64::new(0),
            start_serial: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> &TableId {
        &self.id
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Capture an immutable deep copy of the full table state.
    pub async fn snapshot(&self) -> TableSnapshot {
        let seats = self.seats.lock().await;
        let game = self.game.lock().await;
        self.snapshot_locked(&seats, &game)
    }

    pub async fn users(&self) -> Vec<User> {
        self.seats.lock().await.users.clone()
    }

    pub async fn contains_user(&self, player_id: &str) -> bool {
        self.seats.lock().await.position(player_id).is_some()
    }

    pub async fn user_count(&self) -> usize {
        self.seats.lock().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.seats.lock().await.users.is_empty()
    }

    pub async fn host_id(&self) -> PlayerId {
        self.seats.lock().await.host_id.clone()
    }

    pub async fn game_running(&self) -> bool {
        self.game.lock().await.is_some()
    }

    /// Cached result of the most recent showdown at this table.
    pub async fn last_showdown(&self) -> Option<ShowdownSummary> {
        self.seats.lock().await.last_showdown.clone()
    }

    /// Announce the table to its creator; called once after construction.
    pub async fn publish_created(&self) {
        let snapshot = self.snapshot().await;
        let host_id = snapshot.host_id.clone();
        (self.publish)(Event::new(snapshot, EventPayload::TableCreated { host_id }));
    }

    /// Seat a player. With an explicit seat the exact seat is required;
    /// otherwise the lowest free seat is taken.
    pub async fn add_user(
        &self,
        player_id: &str,
        name: &str,
        dcr_balance: Chips,
        seat: Option<SeatIndex>,
    ) -> Result<SeatIndex> {
        let mut seats = self.seats.lock().await;
        let game = self.game.lock().await;

        if seats.position(player_id).is_some() {
            return Err(Error::DuplicateUser(player_id.to_string()));
        }
        if seats.users.len() >= self.config.max_players {
            return Err(Error::TableFull);
        }
        let seat = match seat {
            Some(seat) => {
                if seat >= self.config.max_players {
                    return Err(Error::InvalidArgument(format!(
                        "seat {seat} out of range 0..{}",
                        self.config.max_players
                    )));
                }
                if seats.users.iter().any(|u| u.seat == seat) {
                    return Err(Error::SeatOccupied(seat));
                }
                seat
            }
            None => seats
                .lowest_free_seat(self.config.max_players)
                .ok_or(Error::TableFull)?,
        };

        seats.users.push(User {
            id: player_id.to_string(),
            name: name.to_string(),
            seat,
            dcr_balance,
            ready: false,
            disconnected: false,
        });
        seats.users.sort_by_key(|u| u.seat);
        // Seat changes invalidate any pending auto-start.
        self.bump_start();

        let snapshot = self.snapshot_locked(&seats, &game);
        let event = Event::new(
            snapshot,
            EventPayload::PlayerJoined {
                player_id: player_id.to_string(),
                seat,
            },
        );
        drop(game);
        drop(seats);
        (self.publish)(event);
        Ok(seat)
    }

    /// Flag a player as disconnected. The seat is preserved; a running hand
    /// keeps their per-hand record live (the time bank will fold them).
    pub async fn mark_disconnected(&self, player_id: &str) -> Result<()> {
        let mut seats = self.seats.lock().await;
        let game = self.game.lock().await;
        let user = seats
            .find_mut(player_id)
            .ok_or_else(|| Error::PlayerNotFound(player_id.to_string()))?;
        user.disconnected = true;
        let snapshot = self.snapshot_locked(&seats, &game);
        drop(game);
        drop(seats);
        (self.save)(snapshot);
        Ok(())
    }

    /// Clear the disconnected flag on reconnection.
    pub async fn mark_connected(&self, player_id: &str) -> Result<()> {
        let mut seats = self.seats.lock().await;
        let game = self.game.lock().await;
        let user = seats
            .find_mut(player_id)
            .ok_or_else(|| Error::PlayerNotFound(player_id.to_string()))?;
        user.disconnected = false;
        let snapshot = self.snapshot_locked(&seats, &game);
        drop(game);
        drop(seats);
        (self.save)(snapshot);
        Ok(())
    }

    /// Toggle readiness. When every seated player is ready and the table
    /// holds at least `min_players`, the game starts after the auto-start
    /// delay unless readiness changes in between.
    pub async fn set_ready(self: &Arc<Self>, player_id: &str, ready: bool) -> Result<()> {
        let mut seats = self.seats.lock().await;
        let game = self.game.lock().await;
        let user = seats
            .find_mut(player_id)
            .ok_or_else(|| Error::PlayerNotFound(player_id.to_string()))?;
        user.ready = ready;

        let snapshot = self.snapshot_locked(&seats, &game);
        let event = Event::new(
            snapshot,
            EventPayload::PlayerReady {
                player_id: player_id.to_string(),
                ready,
            },
        );
        let serial = self.bump_start();
        let should_start = ready
            && game.is_none()
            && seats.users.len() >= self.config.min_players
            && seats.all_ready();
        drop(game);
        drop(seats);

        (self.publish)(event);
        if should_start {
            let table = Arc::clone(self);
            let delay = self.config.auto_start_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                table.auto_start_fired(serial).await;
            });
        }
        Ok(())
    }

    /// Remove a player. Mid-hand the engine folds them first and the seat
    /// is released when the hand ends; between hands the seat frees
    /// immediately. Host departure promotes the lowest-seated remaining
    /// player.
    pub async fn remove_user(self: &Arc<Self>, player_id: &str) -> Result<LeaveOutcome> {
        let mut seats = self.seats.lock().await;
        let mut game_guard = self.game.lock().await;
        if seats.position(player_id).is_none() {
            return Err(Error::PlayerNotFound(player_id.to_string()));
        }
        self.bump_start();

        let mut plan = Plan::new();
        let in_hand = game_guard
            .as_ref()
            .is_some_and(|g| g.hand_running() && g.player(player_id).is_some());
        let outcome;

        if in_hand {
            let (summary, was_current) = match game_guard.as_mut() {
                Some(game) => {
                    let was_current =
                        game.current_player_id().map(String::as_str) == Some(player_id);
                    (game.fold_out(player_id)?, was_current)
                }
                None => (None, false),
            };
            if let Some(user) = seats.find_mut(player_id) {
                user.disconnected = true;
                user.ready = false;
            }
            seats.leaving.insert(player_id.to_string());
            let new_host = transfer_host(&mut seats, player_id);

            let snapshot = self.snapshot_locked(&seats, &game_guard);
            plan.events.push(Event::new(
                snapshot,
                EventPayload::PlayerLeft {
                    player_id: player_id.to_string(),
                    new_host: new_host.clone(),
                },
            ));
            plan.followup = match summary {
                Some(summary) => {
                    self.finish_hand_locked(&mut seats, &mut game_guard, summary, &mut plan.events)
                }
                None if was_current => Followup::ArmTurn(self.bump_turn()),
                None => Followup::None,
            };
            // Hand-end cleanup above may have released every seat.
            outcome = LeaveOutcome {
                removed_now: false,
                new_host,
                table_empty: seats.users.is_empty(),
            };
        } else {
            seats.leaving.remove(player_id);
            seats.users.retain(|u| u.id != player_id);
            let new_host = transfer_host(&mut seats, player_id);
            if let Some(game) = game_guard.as_mut() {
                game.sync_seats(&seats.entries(), self.config.starting_chips);
            }
            let snapshot = self.snapshot_locked(&seats, &game_guard);
            plan.events.push(Event::new(
                snapshot,
                EventPayload::PlayerLeft {
                    player_id: player_id.to_string(),
                    new_host: new_host.clone(),
                },
            ));
            outcome = LeaveOutcome {
                removed_now: true,
                new_host,
                table_empty: seats.users.is_empty(),
            };
        }

        drop(game_guard);
        drop(seats);
        self.execute(plan);
        Ok(outcome)
    }

    /// Validate and apply a betting action from `player_id`.
    pub async fn take_action(
        self: &Arc<Self>,
        player_id: &str,
        action: PlayerAction,
    ) -> Result<()> {
        let mut seats = self.seats.lock().await;
        let mut game_guard = self.game.lock().await;
        let plan = self.apply_action_locked(&mut seats, &mut game_guard, player_id, action)?;
        drop(game_guard);
        drop(seats);
        self.execute(plan);
        Ok(())
    }

    /// Toggle a player's voluntary card reveal; returns the fresh snapshot
    /// so the caller can rebroadcast game updates.
    pub async fn set_show_cards(&self, player_id: &str, show: bool) -> Result<TableSnapshot> {
        let seats = self.seats.lock().await;
        let mut game_guard = self.game.lock().await;
        {
            let game = game_guard.as_mut().ok_or(Error::GameNotStarted)?;
            game.set_show_cards(player_id, show)?;
        }
        Ok(self.snapshot_locked(&seats, &game_guard))
    }

    /// Re-arm timers after a boot restore: a mid-hand table resumes its
    /// turn clock, a between-hands table schedules the next deal.
    pub async fn resume_timers(self: &Arc<Self>) {
        let game_guard = self.game.lock().await;
        let followup = match game_guard.as_ref() {
            Some(game) if game.hand_running() && game.current_player_id().is_some() => {
                Followup::ArmTurn(self.bump_turn())
            }
            Some(_) => Followup::ScheduleHand(self.bump_start()),
            None => Followup::None,
        };
        drop(game_guard);
        self.execute(Plan {
            events: Vec::new(),
            followup,
        });
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn snapshot_locked(&self, seats: &Seats, game: &Option<Game>) -> TableSnapshot {
        TableSnapshot {
            id: self.id.clone(),
            host_id: seats.host_id.clone(),
            config: self.config.clone(),
            created_at: self.created_at,
            users: seats.users.clone(),
            game: game.as_ref().map(|g| g.snapshot()),
            seq: self.event_seq.fetch_add(1, Ordering::SeqCst) + 1,
            captured_at: Utc::now(),
        }
    }

    fn bump_turn(&self) -> u64 {
        self.turn_serial.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn bump_start(&self) -> u64 {
        self.start_serial.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Publish collected events and spawn whatever timer the plan calls
    /// for. Runs strictly after the locks are released.
    fn execute(self: &Arc<Self>, plan: Plan) {
        for event in plan.events {
            (self.publish)(event);
        }
        match plan.followup {
            Followup::None => {}
            Followup::ArmTurn(serial) => {
                let table = Arc::clone(self);
                let delay = self.config.time_bank;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    table.turn_timer_fired(serial).await;
                });
            }
            Followup::ScheduleHand(serial) => {
                let table = Arc::clone(self);
                let delay = self.config.auto_start_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    table.next_hand_fired(serial).await;
                });
            }
        }
    }

    fn apply_action_locked(
        &self,
        seats: &mut Seats,
        game_guard: &mut Option<Game>,
        player_id: &str,
        action: PlayerAction,
    ) -> Result<Plan> {
        let outcome = {
            let game = game_guard.as_mut().ok_or(Error::GameNotStarted)?;
            game.take_action(player_id, action)?
        };

        let mut plan = Plan::new();
        let payload = match outcome.applied {
            AppliedAction::Fold => EventPayload::PlayerFolded {
                player_id: player_id.to_string(),
            },
            AppliedAction::Check => EventPayload::CheckMade {
                player_id: player_id.to_string(),
            },
            AppliedAction::Call { amount } => EventPayload::CallMade {
                player_id: player_id.to_string(),
                amount,
            },
            AppliedAction::Raise { to } => EventPayload::BetMade {
                player_id: player_id.to_string(),
                amount: to,
            },
            AppliedAction::AllIn { total } => EventPayload::PlayerAllIn {
                player_id: player_id.to_string(),
                amount: total,
            },
        };
        let snapshot = self.snapshot_locked(seats, game_guard);
        plan.events.push(Event::new(snapshot, payload));

        plan.followup = match outcome.showdown {
            Some(summary) => self.finish_hand_locked(seats, game_guard, summary, &mut plan.events),
            None => Followup::ArmTurn(self.bump_turn()),
        };
        Ok(plan)
    }

    /// Wrap up a finished hand: cache and publish the result, release
    /// deferred seats, and either schedule the next deal or end the game.
    fn finish_hand_locked(
        &self,
        seats: &mut Seats,
        game_guard: &mut Option<Game>,
        summary: ShowdownSummary,
        events: &mut Vec<Event>,
    ) -> Followup {
        // Any pending turn timer belongs to the finished hand.
        self.bump_turn();
        seats.last_showdown = Some(summary.clone());
        let snapshot = self.snapshot_locked(seats, game_guard);
        events.push(Event::new(snapshot, EventPayload::ShowdownResult { summary }));

        // Release queued leavers and clean up busted disconnects.
        let busted: BTreeSet<PlayerId> = game_guard
            .as_ref()
            .map(|g| {
                g.players()
                    .iter()
                    .filter(|p| p.balance == 0)
                    .map(|p| p.id.clone())
                    .collect()
            })
            .unwrap_or_default();
        let departing: Vec<(PlayerId, bool)> = seats
            .users
            .iter()
            .filter(|u| {
                seats.leaving.contains(&u.id) || (u.disconnected && busted.contains(&u.id))
            })
            .map(|u| (u.id.clone(), seats.leaving.contains(&u.id)))
            .collect();
        for (player_id, was_queued) in departing {
            seats.leaving.remove(&player_id);
            seats.users.retain(|u| u.id != player_id);
            let new_host = transfer_host(seats, &player_id);
            if !was_queued {
                // Queued leavers were announced when they left; busted
                // disconnects get their departure published here.
                if let Some(game) = game_guard.as_mut() {
                    game.sync_seats(&seats.entries(), self.config.starting_chips);
                }
                let snapshot = self.snapshot_locked(seats, game_guard);
                events.push(Event::new(
                    snapshot,
                    EventPayload::PlayerLeft {
                        player_id,
                        new_host,
                    },
                ));
            }
        }

        if let Some(game) = game_guard.as_mut() {
            game.sync_seats(&seats.entries(), self.config.starting_chips);
            if seats.users.len() >= self.config.min_players
                && game.players_with_chips() >= self.config.min_players
            {
                return Followup::ScheduleHand(self.bump_start());
            }
        }

        // Not enough funded players for another hand.
        *game_guard = None;
        for user in &mut seats.users {
            user.ready = false;
        }
        let snapshot = self.snapshot_locked(seats, game_guard);
        events.push(Event::new(snapshot, EventPayload::GameEnded));
        Followup::None
    }

    /// Auto-start timer expiry: start the game if readiness held.
    async fn auto_start_fired(self: Arc<Self>, serial: u64) {
        let mut seats = self.seats.lock().await;
        let mut game_guard = self.game.lock().await;
        if self.start_serial.load(Ordering::SeqCst) != serial {
            return;
        }
        if game_guard.is_some()
            || seats.users.len() < self.config.min_players
            || !seats.all_ready()
        {
            return;
        }

        let entries: Vec<(PlayerId, SeatIndex, Chips)> = seats
            .users
            .iter()
            .map(|u| (u.id.clone(), u.seat, self.config.starting_chips))
            .collect();
        let mut game = Game::new(self.config.small_blind, self.config.big_blind, entries);

        let mut plan = Plan::new();
        match game.start_hand() {
            Ok(maybe_summary) => {
                let dealer = game.dealer_id().cloned().unwrap_or_default();
                *game_guard = Some(game);
                let snapshot = self.snapshot_locked(&seats, &game_guard);
                plan.events
                    .push(Event::new(snapshot, EventPayload::GameStarted { dealer }));
                plan.followup = match maybe_summary {
                    Some(summary) => self.finish_hand_locked(
                        &mut seats,
                        &mut game_guard,
                        summary,
                        &mut plan.events,
                    ),
                    None => Followup::ArmTurn(self.bump_turn()),
                };
            }
            Err(err) => {
                warn!("table {}: could not start game: {err}", self.id);
                return;
            }
        }
        drop(game_guard);
        drop(seats);
        self.execute(plan);
    }

    /// Turn timer expiry: auto-act for the player on the clock.
    async fn turn_timer_fired(self: Arc<Self>, serial: u64) {
        let mut seats = self.seats.lock().await;
        let mut game_guard = self.game.lock().await;
        if self.turn_serial.load(Ordering::SeqCst) != serial {
            return;
        }
        let Some((player_id, action)) = game_guard
            .as_ref()
            .and_then(|g| g.auto_action_for_current())
        else {
            return;
        };
        debug!(
            "table {}: time bank expired for {player_id}, auto-{action}",
            self.id
        );
        match self.apply_action_locked(&mut seats, &mut game_guard, &player_id, action) {
            Ok(plan) => {
                drop(game_guard);
                drop(seats);
                self.execute(plan);
            }
            Err(err) => warn!("table {}: auto action failed: {err}", self.id),
        }
    }

    /// Auto-start timer between hands: deal the next hand, or end the game
    /// if too few funded players remain.
    async fn next_hand_fired(self: Arc<Self>, serial: u64) {
        let mut seats = self.seats.lock().await;
        let mut game_guard = self.game.lock().await;
        if self.start_serial.load(Ordering::SeqCst) != serial {
            return;
        }
        {
            let Some(game) = game_guard.as_mut() else {
                return;
            };
            if game.hand_running() {
                return;
            }
            game.sync_seats(&seats.entries(), self.config.starting_chips);
        }

        let mut plan = Plan::new();
        let enough = game_guard
            .as_ref()
            .is_some_and(|g| g.players_with_chips() >= self.config.min_players)
            && seats.users.len() >= self.config.min_players;
        if !enough {
            *game_guard = None;
            for user in &mut seats.users {
                user.ready = false;
            }
            let snapshot = self.snapshot_locked(&seats, &game_guard);
            plan.events
                .push(Event::new(snapshot, EventPayload::GameEnded));
        } else if let Some(game) = game_guard.as_mut() {
            match game.start_hand() {
                Ok(maybe_summary) => {
                    let dealer = game.dealer_id().cloned().unwrap_or_default();
                    let snapshot = self.snapshot_locked(&seats, &game_guard);
                    plan.events.push(Event::new(
                        snapshot,
                        EventPayload::NewHandStarted { dealer },
                    ));
                    plan.followup = match maybe_summary {
                        Some(summary) => self.finish_hand_locked(
                            &mut seats,
                            &mut game_guard,
                            summary,
                            &mut plan.events,
                        ),
                        None => Followup::ArmTurn(self.bump_turn()),
                    };
                }
                Err(err) => {
                    warn!("table {}: could not deal next hand: {err}", self.id);
                    return;
                }
            }
        }
        drop(game_guard);
        drop(seats);
        self.execute(plan);
    }
}

/// Promote the lowest-seated remaining player when the host departs.
fn transfer_host(seats: &mut Seats, departing: &str) -> Option<PlayerId> {
    if seats.host_id != departing {
        return None;
    }
    let next = seats
        .users
        .iter()
        .find(|u| u.id != departing && !seats.leaving.contains(&u.id))
        .map(|u| u.id.clone());
    if let Some(id) = &next {
        seats.host_id = id.clone();
    }
    next
}
