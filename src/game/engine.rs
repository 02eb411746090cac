//! Per-hand game state machine: dealing, blinds, betting rounds, turn
//! rotation, and showdown.
//!
//! The engine is a plain state holder behind the table's game lock. It never
//! calls out to streams, storage, or the event queue; callers mutate it,
//! capture a snapshot while still holding the lock, and publish afterwards.
//!
//! Single-pot model: simultaneous multi-way all-ins do not open side pots.
//! A short all-in caps nothing; every wager lands in the one pot.

use log::error;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

use super::entities::{
    Card, Chips, Deck, HOLE_CARDS, Phase, Player, PlayerAction, PlayerId, SeatIndex,
};
use super::eval::{HandValue, evaluate};
use crate::snapshot::{GameSnapshot, PlayerSnapshot};

/// Errors raised by game-engine operations.
#[derive(Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum GameError {
    #[error("no hand in progress")]
    HandNotRunning,
    #[error("a hand is already in progress")]
    HandInProgress,
    #[error("need at least {0} players with chips")]
    NotEnoughPlayers(usize),
    #[error("not your turn")]
    OutOfTurn,
    #[error("player {0} is not in the hand")]
    UnknownPlayer(String),
    #[error("cannot check facing a bet")]
    CheckFacingBet,
    #[error("invalid bet amount {0}")]
    InvalidBetAmount(Chips),
    #[error("bet of {attempted} is below the call of {required}")]
    BetBelowCall { attempted: Chips, required: Chips },
    #[error("raise to {attempted} is below the minimum raise to {minimum}")]
    RaiseBelowMinimum { attempted: Chips, minimum: Chips },
    #[error("deck exhausted while dealing")]
    DeckExhausted,
}

/// What a submitted action resolved to after the tie-break rules.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AppliedAction {
    Fold,
    Check,
    Call { amount: Chips },
    Raise { to: Chips },
    AllIn { total: Chips },
}

/// Result of applying one player action.
#[derive(Clone, Debug)]
pub struct ActionOutcome {
    pub applied: AppliedAction,
    /// The action completed the betting round.
    pub street_closed: bool,
    /// Present when the action ended the hand.
    pub showdown: Option<ShowdownSummary>,
}

/// Outcome of a completed hand: who won what, and the revealed hands.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ShowdownSummary {
    /// Total chips distributed.
    pub pot: Chips,
    /// Winner ids, ordered clockwise from the dealer.
    pub winners: Vec<PlayerId>,
    /// Per-winner payout. The integer-division remainder goes to the first
    /// tied winner clockwise from the dealer.
    pub awards: Vec<(PlayerId, Chips)>,
    /// Hand descriptions of the surviving players (empty on a fold-out win).
    pub hands: Vec<(PlayerId, String)>,
}

/// Per-hand game state for one table.
#[derive(Debug)]
pub struct Game {
    small_blind: Chips,
    big_blind: Chips,
    phase: Phase,
    /// Seat-sorted; index-based fields below refer to this vector.
    players: Vec<Player>,
    dealer_idx: usize,
    current_idx: Option<usize>,
    pot: Chips,
    current_bet: Chips,
    /// Minimum raise increment for the current street.
    min_raise: Chips,
    round: u32,
    bet_round: u32,
    community: Vec<Card>,
    deck: Deck,
    winners: Vec<PlayerId>,
}

impl Game {
    /// Create a game in `Waiting` with the given seated players.
    /// `entries` is (player id, seat, chips); seats must be unique.
    pub fn new(small_blind: Chips, big_blind: Chips, entries: Vec<(PlayerId, SeatIndex, Chips)>) -> Self {
        let mut players: Vec<Player> = entries
            .into_iter()
            .map(|(id, seat, chips)| Player::new(id, seat, chips))
            .collect();
        players.sort_by_key(|p| p.seat);
        let dealer_idx = players.len().saturating_sub(1);
        Self {
            small_blind,
            big_blind,
            phase: Phase::Waiting,
            players,
            dealer_idx,
            current_idx: None,
            pot: 0,
            current_bet: 0,
            min_raise: big_blind,
            round: 0,
            bet_round: 0,
            community: Vec::with_capacity(5),
            deck: Deck::new(),
            winners: Vec::new(),
        }
    }

    /// Rebuild a mid-hand game from a persisted snapshot without re-dealing
    /// or re-posting blinds.
    ///
    /// Per-street action tracking is not persisted and is reconstructed:
    /// facing a bet, everyone matching the call level has acted; on a
    /// checked-around street, the seats between the dealer and the current
    /// player have. The one case this cannot represent is the pre-flop big
    /// blind option across a restart, which is forfeited.
    pub fn from_snapshot(snapshot: &GameSnapshot, small_blind: Chips, big_blind: Chips) -> Self {
        let mut players: Vec<Player> = snapshot.players.iter().map(restore_player).collect();
        if let Some(current) = snapshot.current_idx
            && snapshot.phase.is_street()
            && current < players.len()
        {
            if snapshot.current_bet > 0 {
                for (idx, player) in players.iter_mut().enumerate() {
                    if idx != current && player.street_bet == snapshot.current_bet {
                        player.acted = true;
                    }
                }
            } else {
                let n = players.len();
                let mut idx = (snapshot.dealer_idx + 1) % n;
                while idx != current {
                    if players[idx].can_act() {
                        players[idx].acted = true;
                    }
                    idx = (idx + 1) % n;
                }
            }
        }
        Self {
            small_blind,
            big_blind,
            phase: snapshot.phase,
            players,
            dealer_idx: snapshot.dealer_idx,
            current_idx: snapshot.current_idx,
            pot: snapshot.pot,
            current_bet: snapshot.current_bet,
            min_raise: big_blind,
            round: snapshot.round,
            bet_round: snapshot.bet_round,
            community: snapshot.community.clone(),
            deck: Deck::from_remaining(snapshot.deck.clone()),
            winners: snapshot.winners.clone(),
        }
    }

    /// Deep-copy the current state.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            phase: self.phase,
            dealer_idx: self.dealer_idx,
            current_idx: self.current_idx,
            pot: self.pot,
            current_bet: self.current_bet,
            round: self.round,
            bet_round: self.bet_round,
            community: self.community.clone(),
            deck: self.deck.remaining().to_vec(),
            winners: self.winners.clone(),
            players: self.players.iter().map(PlayerSnapshot::from).collect(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pot(&self) -> Chips {
        self.pot
    }

    pub fn current_bet(&self) -> Chips {
        self.current_bet
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    /// Whether a hand is currently being played.
    pub fn hand_running(&self) -> bool {
        self.phase.in_hand()
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn current_player_id(&self) -> Option<&PlayerId> {
        self.current_idx.map(|idx| &self.players[idx].id)
    }

    pub fn community(&self) -> &[Card] {
        &self.community
    }

    pub fn dealer_id(&self) -> Option<&PlayerId> {
        self.players.get(self.dealer_idx).map(|p| &p.id)
    }

    /// Players still holding chips (eligible for the next deal).
    pub fn players_with_chips(&self) -> usize {
        self.players.iter().filter(|p| p.balance > 0).count()
    }

    /// Toggle the voluntary card-reveal flag.
    pub fn set_show_cards(&mut self, player_id: &str, show: bool) -> Result<(), GameError> {
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;
        player.show_cards = show;
        Ok(())
    }

    /// Shuffle, rotate the dealer, post blinds, deal hole cards, and open
    /// pre-flop betting. Players without chips sit the hand out.
    ///
    /// Returns a showdown summary in the degenerate case where the blinds
    /// put everyone all-in and the board runs out immediately.
    pub fn start_hand(&mut self) -> Result<Option<ShowdownSummary>, GameError> {
        if self.phase.in_hand() {
            return Err(GameError::HandInProgress);
        }
        if self.players_with_chips() < 2 {
            return Err(GameError::NotEnoughPlayers(2));
        }

        self.round += 1;
        self.bet_round = 0;
        self.winners.clear();
        self.community.clear();
        self.pot = 0;
        self.current_bet = 0;
        self.min_raise = self.big_blind;
        for player in &mut self.players {
            player.reset_for_hand();
            if player.balance == 0 {
                // Sitting out: busted players are dealt no cards.
                player.folded = true;
            }
        }
        self.phase = Phase::NewHandDealing;
        self.deck = Deck::new();
        self.deck.shuffle();

        let start = self.dealer_idx.min(self.players.len() - 1);
        self.dealer_idx = self
            .next_idx(start, |p| !p.folded)
            .ok_or(GameError::NotEnoughPlayers(2))?;
        self.players[self.dealer_idx].is_dealer = true;

        let in_hand = self.players.iter().filter(|p| !p.folded).count();
        let (small_blind_idx, big_blind_idx) = if in_hand == 2 {
            // Heads-up: the dealer posts the small blind.
            let other = self
                .next_idx(self.dealer_idx, |p| !p.folded)
                .ok_or(GameError::NotEnoughPlayers(2))?;
            (self.dealer_idx, other)
        } else {
            let sb = self
                .next_idx(self.dealer_idx, |p| !p.folded)
                .ok_or(GameError::NotEnoughPlayers(2))?;
            let bb = self
                .next_idx(sb, |p| !p.folded)
                .ok_or(GameError::NotEnoughPlayers(2))?;
            (sb, bb)
        };
        self.commit(small_blind_idx, self.small_blind);
        self.commit(big_blind_idx, self.big_blind);
        // A short big blind still owes the full amount to callers.
        self.current_bet = self.current_bet.max(self.big_blind);

        for idx in 0..self.players.len() {
            if self.players[idx].folded {
                continue;
            }
            for _ in 0..HOLE_CARDS {
                let card = self.deck.draw().ok_or(GameError::DeckExhausted)?;
                self.players[idx].hole_cards.push(card);
            }
        }

        self.phase = Phase::PreFlop;

        if self.actor_count() == 0 {
            // Blinds consumed every stack; run the board out.
            return Ok(self.close_street());
        }

        // Pre-flop action opens left of the big blind (heads-up: the
        // dealer); skip past anyone the blinds already put all-in.
        let first_actor = if in_hand == 2 && self.players[small_blind_idx].can_act() {
            Some(small_blind_idx)
        } else {
            self.next_idx(big_blind_idx, |p| p.can_act())
        };
        self.set_current(first_actor);
        Ok(None)
    }

    /// Validate and apply one action from the current player, then advance
    /// the turn, close the street, or end the hand as required.
    pub fn take_action(
        &mut self,
        player_id: &str,
        action: PlayerAction,
    ) -> Result<ActionOutcome, GameError> {
        if !self.phase.is_street() {
            return Err(GameError::HandNotRunning);
        }
        let idx = self.current_idx.ok_or(GameError::HandNotRunning)?;
        if self.players[idx].id != player_id {
            return Err(GameError::OutOfTurn);
        }

        let applied = self.apply(idx, action)?;
        self.players[idx].acted = true;
        let (street_closed, showdown) = self.progress_after_action(idx);
        Ok(ActionOutcome {
            applied,
            street_closed,
            showdown,
        })
    }

    /// Fold a player out of the running hand regardless of whose turn it is
    /// (disconnect or departure). Returns a summary if the fold ended the
    /// hand.
    pub fn fold_out(&mut self, player_id: &str) -> Result<Option<ShowdownSummary>, GameError> {
        if !self.phase.in_hand() {
            return Ok(None);
        }
        let idx = self
            .players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;
        if self.players[idx].folded {
            return Ok(None);
        }
        self.players[idx].folded = true;
        self.players[idx].acted = true;

        if self.current_idx == Some(idx) {
            let (_, showdown) = self.progress_after_action(idx);
            return Ok(showdown);
        }
        if self.non_folded_count() == 1 {
            self.collect_street_bets();
            return Ok(Some(self.showdown()));
        }
        if self.phase.is_street() && self.round_complete() {
            return Ok(self.close_street());
        }
        Ok(None)
    }

    /// The action the engine takes for the current player when their time
    /// bank expires: check when legal, otherwise fold.
    pub fn auto_action_for_current(&self) -> Option<(PlayerId, PlayerAction)> {
        let idx = self.current_idx?;
        let player = &self.players[idx];
        let action = if player.street_bet == self.current_bet {
            PlayerAction::Check
        } else {
            PlayerAction::Fold
        };
        Some((player.id.clone(), action))
    }

    /// Reconcile the player set with the table seats between hands: drop
    /// departed players, admit new ones with a fresh stack. No-op mid-hand.
    pub fn sync_seats(&mut self, seated: &[(PlayerId, SeatIndex)], starting_chips: Chips) {
        if self.phase.in_hand() {
            return;
        }
        let dealer_id = self.players.get(self.dealer_idx).map(|p| p.id.clone());
        self.players
            .retain(|p| seated.iter().any(|(id, _)| *id == p.id));
        for (id, seat) in seated {
            if !self.players.iter().any(|p| p.id == *id) {
                self.players.push(Player::new(id.clone(), *seat, starting_chips));
            }
        }
        self.players.sort_by_key(|p| p.seat);
        let fallback = self.dealer_idx.min(self.players.len().saturating_sub(1));
        self.dealer_idx = dealer_id
            .and_then(|id| self.players.iter().position(|p| p.id == id))
            .unwrap_or(fallback);
        self.current_idx = None;
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Resolve an action into chips moved, honoring the tie-break rules:
    /// a bet matching the call level is a call, above it a raise, and a
    /// wager beyond the stack collapses into an all-in.
    fn apply(&mut self, idx: usize, action: PlayerAction) -> Result<AppliedAction, GameError> {
        let street_bet = self.players[idx].street_bet;
        let balance = self.players[idx].balance;
        let owed = self.current_bet - street_bet;

        match action {
            PlayerAction::Fold => {
                self.players[idx].folded = true;
                Ok(AppliedAction::Fold)
            }
            PlayerAction::Check => {
                if owed != 0 {
                    return Err(GameError::CheckFacingBet);
                }
                Ok(AppliedAction::Check)
            }
            PlayerAction::Call => {
                if owed == 0 {
                    return Ok(AppliedAction::Check);
                }
                let wager = owed.min(balance);
                self.commit(idx, wager);
                if self.players[idx].all_in {
                    Ok(AppliedAction::AllIn {
                        total: self.players[idx].street_bet,
                    })
                } else {
                    Ok(AppliedAction::Call { amount: wager })
                }
            }
            PlayerAction::Bet(amount) => self.apply_bet(idx, amount),
        }
    }

    fn apply_bet(&mut self, idx: usize, amount: Chips) -> Result<AppliedAction, GameError> {
        let street_bet = self.players[idx].street_bet;
        let balance = self.players[idx].balance;

        if amount < 0 {
            return Err(GameError::InvalidBetAmount(amount));
        }
        // A zero wager while matched is a check.
        if amount == 0 || amount == street_bet {
            if street_bet == self.current_bet {
                return Ok(AppliedAction::Check);
            }
            return Err(GameError::BetBelowCall {
                attempted: amount,
                required: self.current_bet,
            });
        }

        let max_level = street_bet + balance;
        let target = amount.min(max_level);
        if target <= street_bet {
            return Err(GameError::InvalidBetAmount(amount));
        }

        if target < self.current_bet {
            if target < max_level {
                return Err(GameError::BetBelowCall {
                    attempted: target,
                    required: self.current_bet,
                });
            }
            // All-in for less than the call.
            self.commit(idx, balance);
            return Ok(AppliedAction::AllIn {
                total: self.players[idx].street_bet,
            });
        }

        if target == self.current_bet {
            self.commit(idx, target - street_bet);
            return if self.players[idx].all_in {
                Ok(AppliedAction::AllIn {
                    total: self.players[idx].street_bet,
                })
            } else {
                Ok(AppliedAction::Call {
                    amount: target - street_bet,
                })
            };
        }

        // Raise. The increment must meet the minimum unless the stack caps
        // the wager (short all-in raise).
        let increment = target - self.current_bet;
        let full_raise = increment >= self.min_raise;
        if !full_raise && target < max_level {
            return Err(GameError::RaiseBelowMinimum {
                attempted: target,
                minimum: self.current_bet + self.min_raise,
            });
        }
        self.commit(idx, target - street_bet);
        if full_raise {
            self.min_raise = increment;
        }
        // A raise reopens the action for everyone else.
        for (j, player) in self.players.iter_mut().enumerate() {
            if j != idx && player.can_act() {
                player.acted = false;
            }
        }
        if self.players[idx].all_in {
            Ok(AppliedAction::AllIn {
                total: self.players[idx].street_bet,
            })
        } else {
            Ok(AppliedAction::Raise { to: target })
        }
    }

    /// Move up to `amount` chips from the player's stack onto the street,
    /// flagging the all-in collapse and lifting the call level if exceeded.
    fn commit(&mut self, idx: usize, amount: Chips) {
        let player = &mut self.players[idx];
        let wager = amount.min(player.balance);
        player.balance -= wager;
        player.street_bet += wager;
        if player.balance == 0 {
            player.all_in = true;
        }
        if player.street_bet > self.current_bet {
            self.current_bet = player.street_bet;
        }
    }

    fn progress_after_action(&mut self, actor_idx: usize) -> (bool, Option<ShowdownSummary>) {
        if self.non_folded_count() == 1 {
            self.collect_street_bets();
            let summary = self.showdown();
            return (true, Some(summary));
        }
        if self.round_complete() {
            let summary = self.close_street();
            return (true, summary);
        }
        let next = self.next_idx(actor_idx, |p| p.can_act());
        self.set_current(next);
        (false, None)
    }

    /// A betting round ends once every player who can still act has acted
    /// since the last raise and matched the call level.
    fn round_complete(&self) -> bool {
        self.players
            .iter()
            .filter(|p| p.can_act())
            .all(|p| p.acted && p.street_bet == self.current_bet)
    }

    /// Close the current street and advance. When fewer than two players can
    /// act, the remaining streets run out back to back. Community cards are
    /// dealt straight off the deck with no burn.
    fn close_street(&mut self) -> Option<ShowdownSummary> {
        loop {
            self.collect_street_bets();
            self.bet_round += 1;
            self.current_bet = 0;
            self.min_raise = self.big_blind;
            for player in &mut self.players {
                player.acted = false;
            }

            match self.phase {
                Phase::PreFlop => {
                    self.deal_community(3);
                    self.phase = Phase::Flop;
                }
                Phase::Flop => {
                    self.deal_community(1);
                    self.phase = Phase::Turn;
                }
                Phase::Turn => {
                    self.deal_community(1);
                    self.phase = Phase::River;
                }
                Phase::River => {
                    return Some(self.showdown());
                }
                phase => {
                    error!(
                        "close_street in non-street phase {phase}; snapshot: {:?}",
                        self.snapshot()
                    );
                    return None;
                }
            }

            if self.actor_count() >= 2 {
                // Post-flop action opens at the first live seat left of the
                // dealer.
                let first = self.next_idx(self.dealer_idx, |p| p.can_act());
                self.set_current(first);
                return None;
            }
        }
    }

    /// Resolve the hand: evaluate survivors, pick winners, split the pot.
    fn showdown(&mut self) -> ShowdownSummary {
        self.collect_street_bets();

        let survivors: Vec<usize> = (0..self.players.len())
            .filter(|&i| !self.players[i].folded)
            .collect();
        let pot = self.pot;
        let mut hands: Vec<(PlayerId, String)> = Vec::new();

        let winner_idxs: Vec<usize> = if survivors.len() <= 1 {
            survivors.clone()
        } else {
            let mut evaluated: Vec<(usize, HandValue)> = Vec::with_capacity(survivors.len());
            for &idx in &survivors {
                let mut cards = self.players[idx].hole_cards.clone();
                cards.extend_from_slice(&self.community);
                let value = evaluate(&cards);
                self.players[idx].hand_desc = Some(value.description.clone());
                hands.push((self.players[idx].id.clone(), value.description.clone()));
                evaluated.push((idx, value));
            }
            let best = evaluated
                .iter()
                .map(|(_, v)| v)
                .max_by(|a, b| a.cmp_strength(b))
                .cloned();
            match best {
                Some(best) => evaluated
                    .into_iter()
                    .filter(|(_, v)| v.cmp_strength(&best) == Ordering::Equal)
                    .map(|(i, _)| i)
                    .collect(),
                None => Vec::new(),
            }
        };

        // Order winners clockwise from the dealer; the first one collects
        // any indivisible remainder.
        let n = self.players.len().max(1);
        let mut ordered: Vec<usize> = Vec::with_capacity(winner_idxs.len());
        for step in 1..=n {
            let idx = (self.dealer_idx + step) % n;
            if winner_idxs.contains(&idx) {
                ordered.push(idx);
            }
        }

        let mut awards: Vec<(PlayerId, Chips)> = Vec::with_capacity(ordered.len());
        if !ordered.is_empty() {
            let share = pot / ordered.len() as Chips;
            let remainder = pot % ordered.len() as Chips;
            for (k, &idx) in ordered.iter().enumerate() {
                let amount = share + if k == 0 { remainder } else { 0 };
                self.players[idx].balance += amount;
                awards.push((self.players[idx].id.clone(), amount));
            }
            self.pot = 0;
        }

        self.winners = ordered
            .iter()
            .map(|&idx| self.players[idx].id.clone())
            .collect();
        self.phase = Phase::Showdown;
        self.set_current(None);

        ShowdownSummary {
            pot,
            winners: self.winners.clone(),
            awards,
            hands,
        }
    }

    /// Fold the street wagers into the pot.
    fn collect_street_bets(&mut self) {
        for player in &mut self.players {
            self.pot += player.street_bet;
            player.street_bet = 0;
        }
    }

    fn deal_community(&mut self, count: usize) {
        for _ in 0..count {
            match self.deck.draw() {
                Some(card) => self.community.push(card),
                None => {
                    error!(
                        "deck exhausted while dealing the board; snapshot: {:?}",
                        self.snapshot()
                    );
                    return;
                }
            }
        }
    }

    fn set_current(&mut self, idx: Option<usize>) {
        for player in &mut self.players {
            player.is_turn = false;
        }
        self.current_idx = idx;
        if let Some(i) = idx {
            self.players[i].is_turn = true;
        }
    }

    /// First index after `start` (wrapping, `start` itself last) whose
    /// player satisfies the predicate.
    fn next_idx<F: Fn(&Player) -> bool>(&self, start: usize, pred: F) -> Option<usize> {
        let n = self.players.len();
        if n == 0 {
            return None;
        }
        for step in 1..=n {
            let idx = (start + step) % n;
            if pred(&self.players[idx]) {
                return Some(idx);
            }
        }
        None
    }

    fn non_folded_count(&self) -> usize {
        self.players.iter().filter(|p| !p.folded).count()
    }

    /// Players who can still make a betting decision this street.
    fn actor_count(&self) -> usize {
        self.players.iter().filter(|p| p.can_act()).count()
    }
}

fn restore_player(snapshot: &PlayerSnapshot) -> Player {
    Player {
        id: snapshot.id.clone(),
        seat: snapshot.seat,
        balance: snapshot.balance,
        starting_balance: snapshot.starting_balance,
        street_bet: snapshot.street_bet,
        folded: snapshot.folded,
        all_in: snapshot.all_in,
        is_dealer: snapshot.is_dealer,
        is_turn: snapshot.is_turn,
        acted: false,
        show_cards: snapshot.show_cards,
        hole_cards: snapshot.hole_cards.clone(),
        hand_desc: snapshot.hand_desc.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::entities::Suit;

    fn heads_up() -> Game {
        let mut game = Game::new(
            5,
            10,
            vec![("p1".to_string(), 0, 1000), ("p2".to_string(), 1, 1000)],
        );
        game.start_hand().unwrap();
        game
    }

    fn three_handed() -> Game {
        let mut game = Game::new(
            5,
            10,
            vec![
                ("p1".to_string(), 0, 1000),
                ("p2".to_string(), 1, 1000),
                ("p3".to_string(), 2, 1000),
            ],
        );
        game.start_hand().unwrap();
        game
    }

    fn total_chips(game: &Game) -> Chips {
        game.pot()
            + game
                .players()
                .iter()
                .map(|p| p.balance + p.street_bet)
                .sum::<Chips>()
    }

    #[test]
    fn test_heads_up_blinds_and_first_actor() {
        let game = heads_up();
        // Dealer rotates onto seat 0 for the first hand and posts the small
        // blind heads-up; action opens on the dealer.
        assert_eq!(game.phase(), Phase::PreFlop);
        assert_eq!(game.dealer_id().map(String::as_str), Some("p1"));
        assert_eq!(game.current_player_id().map(String::as_str), Some("p1"));
        assert_eq!(game.player("p1").unwrap().street_bet, 5);
        assert_eq!(game.player("p2").unwrap().street_bet, 10);
        assert_eq!(game.current_bet(), 10);
        assert_eq!(game.player("p1").unwrap().hole_cards.len(), 2);
        assert_eq!(game.player("p2").unwrap().hole_cards.len(), 2);
    }

    #[test]
    fn test_three_handed_positions() {
        let game = three_handed();
        // Dealer seat 0, blinds seats 1 and 2, action opens back on the
        // dealer (left of the big blind).
        assert_eq!(game.dealer_id().map(String::as_str), Some("p1"));
        assert_eq!(game.player("p2").unwrap().street_bet, 5);
        assert_eq!(game.player("p3").unwrap().street_bet, 10);
        assert_eq!(game.current_player_id().map(String::as_str), Some("p1"));
    }

    #[test]
    fn test_call_then_check_closes_preflop() {
        let mut game = heads_up();
        let outcome = game.take_action("p1", PlayerAction::Call).unwrap();
        assert_eq!(outcome.applied, AppliedAction::Call { amount: 5 });
        assert!(!outcome.street_closed);
        // Big blind has the option.
        assert_eq!(game.current_player_id().map(String::as_str), Some("p2"));

        let outcome = game.take_action("p2", PlayerAction::Check).unwrap();
        assert!(outcome.street_closed);
        assert_eq!(game.phase(), Phase::Flop);
        assert_eq!(game.pot(), 20);
        assert_eq!(game.community().len(), 3);
        assert_eq!(game.current_bet(), 0);
    }

    #[test]
    fn test_out_of_turn_rejected() {
        let mut game = heads_up();
        let err = game.take_action("p2", PlayerAction::Call).unwrap_err();
        assert_eq!(err, GameError::OutOfTurn);
    }

    #[test]
    fn test_check_facing_bet_rejected() {
        let mut game = heads_up();
        let err = game.take_action("p1", PlayerAction::Check).unwrap_err();
        assert_eq!(err, GameError::CheckFacingBet);
    }

    #[test]
    fn test_bet_equal_to_call_is_a_call() {
        let mut game = heads_up();
        let outcome = game.take_action("p1", PlayerAction::Bet(10)).unwrap();
        assert_eq!(outcome.applied, AppliedAction::Call { amount: 5 });
    }

    #[test]
    fn test_raise_reopens_action() {
        let mut game = three_handed();
        game.take_action("p1", PlayerAction::Call).unwrap();
        game.take_action("p2", PlayerAction::Call).unwrap();
        // Big blind raises; everyone must act again.
        let outcome = game.take_action("p3", PlayerAction::Bet(30)).unwrap();
        assert_eq!(outcome.applied, AppliedAction::Raise { to: 30 });
        assert!(!outcome.street_closed);
        assert_eq!(game.current_bet(), 30);

        game.take_action("p1", PlayerAction::Call).unwrap();
        let outcome = game.take_action("p2", PlayerAction::Call).unwrap();
        assert!(outcome.street_closed);
        assert_eq!(game.phase(), Phase::Flop);
        assert_eq!(game.pot(), 90);
    }

    #[test]
    fn test_raise_below_minimum_rejected() {
        let mut game = heads_up();
        // Min raise is the big blind, so raising to 15 is short of 20.
        let err = game.take_action("p1", PlayerAction::Bet(15)).unwrap_err();
        assert_eq!(
            err,
            GameError::RaiseBelowMinimum {
                attempted: 15,
                minimum: 20
            }
        );
    }

    #[test]
    fn test_oversized_bet_collapses_to_all_in() {
        let mut game = heads_up();
        let outcome = game.take_action("p1", PlayerAction::Bet(5000)).unwrap();
        assert_eq!(outcome.applied, AppliedAction::AllIn { total: 1000 });
        let p1 = game.player("p1").unwrap();
        assert!(p1.all_in);
        assert_eq!(p1.balance, 0);
        assert_eq!(game.current_bet(), 1000);
    }

    #[test]
    fn test_fold_awards_pot_to_last_player() {
        let mut game = heads_up();
        let outcome = game.take_action("p1", PlayerAction::Fold).unwrap();
        let summary = outcome.showdown.expect("hand should end");
        assert_eq!(summary.winners, vec!["p2".to_string()]);
        assert_eq!(summary.pot, 15);
        assert!(summary.hands.is_empty());
        assert_eq!(game.phase(), Phase::Showdown);
        // Blinds: p2 keeps their 990 plus the 15-chip pot.
        assert_eq!(game.player("p2").unwrap().balance, 1005);
        assert_eq!(game.player("p1").unwrap().balance, 995);
    }

    #[test]
    fn test_all_in_call_runs_board_out() {
        let mut game = heads_up();
        game.take_action("p1", PlayerAction::Bet(1000)).unwrap();
        let outcome = game.take_action("p2", PlayerAction::Call).unwrap();
        let summary = outcome.showdown.expect("all-in call ends the hand");
        assert_eq!(game.phase(), Phase::Showdown);
        assert_eq!(game.community().len(), 5);
        assert_eq!(summary.pot, 2000);
        // All chips end up with the winner(s).
        assert_eq!(total_chips(&game), 2000);
    }

    #[test]
    fn test_chip_conservation_through_betting() {
        let mut game = three_handed();
        assert_eq!(total_chips(&game), 3000);
        game.take_action("p1", PlayerAction::Bet(40)).unwrap();
        assert_eq!(total_chips(&game), 3000);
        game.take_action("p2", PlayerAction::Fold).unwrap();
        game.take_action("p3", PlayerAction::Call).unwrap();
        assert_eq!(total_chips(&game), 3000);
    }

    #[test]
    fn test_at_most_one_player_has_turn() {
        let mut game = three_handed();
        let turn_count = |game: &Game| {
            game.players()
                .iter()
                .filter(|p| p.is_turn)
                .count()
        };
        assert_eq!(turn_count(&game), 1);
        game.take_action("p1", PlayerAction::Call).unwrap();
        assert_eq!(turn_count(&game), 1);
        game.take_action("p2", PlayerAction::Fold).unwrap();
        assert_eq!(turn_count(&game), 1);
    }

    #[test]
    fn test_current_player_always_live() {
        let mut game = three_handed();
        game.take_action("p1", PlayerAction::Fold).unwrap();
        let current = game.current_player_id().unwrap().clone();
        let player = game.player(&current).unwrap();
        assert!(!player.folded && !player.all_in);
    }

    #[test]
    fn test_dealer_rotates_between_hands() {
        let mut game = heads_up();
        game.take_action("p1", PlayerAction::Fold).unwrap();
        assert_eq!(game.dealer_id().map(String::as_str), Some("p1"));
        game.start_hand().unwrap();
        assert_eq!(game.dealer_id().map(String::as_str), Some("p2"));
    }

    #[test]
    fn test_split_pot_remainder_goes_left_of_dealer() {
        // Craft a river spot where the board plays for both players and the
        // pot is odd.
        let board = vec![
            Card(14, Suit::Spade),
            Card(13, Suit::Spade),
            Card(12, Suit::Spade),
            Card(11, Suit::Spade),
            Card(10, Suit::Spade),
        ];
        let snapshot = GameSnapshot {
            phase: Phase::River,
            dealer_idx: 0,
            current_idx: Some(1),
            pot: 21,
            current_bet: 0,
            round: 1,
            bet_round: 3,
            community: board,
            deck: Vec::new(),
            winners: Vec::new(),
            players: vec![
                PlayerSnapshot {
                    id: "p1".to_string(),
                    seat: 0,
                    balance: 100,
                    starting_balance: 110,
                    street_bet: 0,
                    folded: false,
                    all_in: false,
                    is_dealer: true,
                    is_turn: false,
                    show_cards: false,
                    hole_cards: vec![Card(2, Suit::Heart), Card(3, Suit::Club)],
                    hand_desc: None,
                },
                PlayerSnapshot {
                    id: "p2".to_string(),
                    seat: 1,
                    balance: 100,
                    starting_balance: 111,
                    street_bet: 0,
                    folded: false,
                    all_in: false,
                    is_dealer: false,
                    is_turn: true,
                    show_cards: false,
                    hole_cards: vec![Card(4, Suit::Diamond), Card(6, Suit::Club)],
                    hand_desc: None,
                },
            ],
        };
        let mut game = Game::from_snapshot(&snapshot, 5, 10);
        // p1 checks, p2 checks: river closes into a board-play tie.
        game.set_current(Some(0));
        game.take_action("p1", PlayerAction::Check).unwrap();
        let outcome = game.take_action("p2", PlayerAction::Check).unwrap();
        let summary = outcome.showdown.expect("river check-down ends the hand");

        assert_eq!(summary.winners.len(), 2);
        // Seat 1 sits clockwise from the dealer and collects the odd chip.
        assert_eq!(
            summary.awards,
            vec![("p2".to_string(), 11), ("p1".to_string(), 10)]
        );
        assert_eq!(game.player("p1").unwrap().balance, 110);
        assert_eq!(game.player("p2").unwrap().balance, 111);
        assert_eq!(game.pot(), 0);
    }

    #[test]
    fn test_auto_action_checks_when_legal() {
        let mut game = heads_up();
        // Facing the blind, the small blind's auto action is a fold.
        let (id, action) = game.auto_action_for_current().unwrap();
        assert_eq!(id, "p1");
        assert_eq!(action, PlayerAction::Fold);

        game.take_action("p1", PlayerAction::Call).unwrap();
        // Matched, so the big blind auto-checks.
        let (id, action) = game.auto_action_for_current().unwrap();
        assert_eq!(id, "p2");
        assert_eq!(action, PlayerAction::Check);
    }

    #[test]
    fn test_fold_out_non_current_player() {
        let mut game = three_handed();
        // p3 (big blind) leaves out of turn.
        let summary = game.fold_out("p3").unwrap();
        assert!(summary.is_none());
        assert!(game.player("p3").unwrap().folded);
        assert_eq!(game.current_player_id().map(String::as_str), Some("p1"));

        // p1 folds; p2 wins at once.
        let outcome = game.take_action("p1", PlayerAction::Fold).unwrap();
        let summary = outcome.showdown.expect("two folds end the hand");
        assert_eq!(summary.winners, vec!["p2".to_string()]);
    }

    #[test]
    fn test_snapshot_round_trips_through_restore() {
        let mut game = three_handed();
        game.take_action("p1", PlayerAction::Call).unwrap();
        let saved = game.snapshot();

        let restored = Game::from_snapshot(&saved, 5, 10);
        assert_eq!(restored.snapshot(), saved);
    }

    #[test]
    fn test_restored_street_completes_normally() {
        let mut game = heads_up();
        game.take_action("p1", PlayerAction::Bet(40)).unwrap();
        let saved = game.snapshot();

        // The caller finishes the street in the restored game exactly as
        // they would have in the original.
        let mut restored = Game::from_snapshot(&saved, 5, 10);
        let current = restored.current_player_id().unwrap().clone();
        assert_eq!(current, "p2");
        let outcome = restored.take_action(&current, PlayerAction::Call).unwrap();
        assert!(outcome.street_closed);
        assert_eq!(restored.phase(), Phase::Flop);
    }

    #[test]
    fn test_sync_seats_admits_and_drops_players() {
        let mut game = heads_up();
        game.take_action("p1", PlayerAction::Fold).unwrap();

        game.sync_seats(
            &[
                ("p1".to_string(), 0),
                ("p3".to_string(), 2),
            ],
            1000,
        );
        assert!(game.player("p2").is_none());
        let p3 = game.player("p3").unwrap();
        assert_eq!(p3.balance, 1000);
        // Dealer id is preserved across the reshuffle of the player vector.
        assert_eq!(game.dealer_id().map(String::as_str), Some("p1"));
    }
}
