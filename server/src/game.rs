//! Table state and the intent transition rules. Every function here is a
//! plain state transition: rejected intents return an error without having
//! mutated anything observable, so the session can apply intents to a
//! working copy and commit only on success.

use playnine_protocol::{
    build_deck, deck_size_for, score_hand, ActionError, Card, DrawSource, Intent, LastAffected,
    Phase, PublicCard, PublicPlayer, TableSnapshot, FACE_DOWN_MASK, HAND_SIZE, MAX_PLAYERS,
    ROUNDS_PER_GAME,
};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatedPlayer {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub hand: Vec<Card>,
    #[serde(default)]
    pub revealed_count: u8,
    #[serde(default)]
    pub final_turn_taken: bool,
}

impl SeatedPlayer {
    pub fn new(id: Uuid, name: &str) -> Self {
        SeatedPlayer {
            id,
            name: name.to_string(),
            hand: Vec::new(),
            revealed_count: 0,
            final_turn_taken: false,
        }
    }

    pub fn face_down_count(&self) -> usize {
        self.hand.iter().filter(|c| !c.face_up).count()
    }
}

/// Authoritative state of one table. Serialized as-is for the on-disk
/// snapshot; `active_player_ids` is runtime-only and rebuilt from live
/// connections after a restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableState {
    pub name: String,
    #[serde(default)]
    pub phase: Phase,
    #[serde(default)]
    pub players: Vec<SeatedPlayer>,
    #[serde(default)]
    pub round_num: u8,
    #[serde(default)]
    pub current_player_idx: usize,
    #[serde(default)]
    pub dealer_idx: usize,
    #[serde(default)]
    pub draw_pile: Vec<Card>,
    #[serde(default)]
    pub discard_pile: Vec<Card>,
    #[serde(default)]
    pub drawn_card: Option<Card>,
    #[serde(default)]
    pub drawn_from: Option<DrawSource>,
    #[serde(default)]
    pub must_flip_after_discard: bool,
    #[serde(default)]
    pub last_affected_card: Option<LastAffected>,
    #[serde(default)]
    pub final_lap_trigger_idx: Option<usize>,
    #[serde(default)]
    pub round_scores: BTreeMap<Uuid, i32>,
    #[serde(default)]
    pub scores: BTreeMap<Uuid, i32>,
    #[serde(default)]
    pub restart_requested_by: Option<Uuid>,
    #[serde(default)]
    pub restart_requested_at: Option<i64>,
    #[serde(default)]
    pub restart_yes_votes: BTreeSet<Uuid>,
    #[serde(skip)]
    pub active_player_ids: BTreeSet<Uuid>,
    #[serde(default)]
    pub player_last_active: BTreeMap<Uuid, i64>,
}

impl TableState {
    pub fn new(name: &str) -> Self {
        TableState {
            name: name.to_string(),
            phase: Phase::Empty,
            players: Vec::new(),
            round_num: 0,
            current_player_idx: 0,
            dealer_idx: 0,
            draw_pile: Vec::new(),
            discard_pile: Vec::new(),
            drawn_card: None,
            drawn_from: None,
            must_flip_after_discard: false,
            last_affected_card: None,
            final_lap_trigger_idx: None,
            round_scores: BTreeMap::new(),
            scores: BTreeMap::new(),
            restart_requested_by: None,
            restart_requested_at: None,
            restart_yes_votes: BTreeSet::new(),
            active_player_ids: BTreeSet::new(),
            player_last_active: BTreeMap::new(),
        }
    }

    pub fn current_player(&self) -> Option<&SeatedPlayer> {
        self.players.get(self.current_player_idx)
    }
}

/// Outcome of a committed intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Observable change: persist and broadcast.
    Committed,
    /// Nothing observers can see changed (heartbeat, repeated leave).
    Quiet,
}

pub fn seat_of(table: &TableState, player_id: Uuid) -> Option<usize> {
    table.players.iter().position(|p| p.id == player_id)
}

pub fn find_player_by_name(table: &TableState, name: &str) -> Option<Uuid> {
    table.players.iter().find(|p| p.name == name).map(|p| p.id)
}

/// Seat a new player. Joins append only before a game is underway.
pub fn add_player(table: &mut TableState, name: &str, now: i64) -> Result<Uuid, ActionError> {
    if !matches!(table.phase, Phase::Empty | Phase::Waiting) {
        return Err(ActionError::GameAlreadyStarted);
    }
    if table.players.len() >= MAX_PLAYERS {
        return Err(ActionError::TableFull);
    }
    let id = Uuid::new_v4();
    table.players.push(SeatedPlayer::new(id, name));
    table.player_last_active.insert(id, now);
    if table.phase == Phase::Empty {
        table.phase = Phase::Waiting;
    }
    Ok(id)
}

/// Apply one intent on behalf of `actor` (None for spectators, who may only
/// heartbeat). On success the actor's presence stamp is refreshed.
pub fn apply(
    table: &mut TableState,
    actor: Option<Uuid>,
    intent: &Intent,
    now: i64,
    rng: &mut impl Rng,
) -> Result<Applied, ActionError> {
    if matches!(intent, Intent::Heartbeat) {
        if let Some(pid) = actor {
            if seat_of(table, pid).is_some() {
                table.player_last_active.insert(pid, now);
            }
        }
        return Ok(Applied::Quiet);
    }

    let pid = actor.ok_or(ActionError::NotAPlayer)?;
    let applied = match *intent {
        Intent::Start => start(table, pid, rng).map(|_| Applied::Committed),
        Intent::Reveal { card_index } => reveal(table, pid, card_index).map(|_| Applied::Committed),
        Intent::DrawFromDraw => draw_from_draw(table, pid, rng).map(|_| Applied::Committed),
        Intent::DrawFromDiscard => draw_from_discard(table, pid).map(|_| Applied::Committed),
        Intent::PlayReplace { card_index } => {
            play_replace(table, pid, card_index).map(|_| Applied::Committed)
        }
        Intent::PlayDiscardOnly => play_discard_only(table, pid).map(|_| Applied::Committed),
        Intent::PlayDiscardFlip { card_index } => {
            play_discard_flip(table, pid, card_index).map(|_| Applied::Committed)
        }
        Intent::PlayFlipAfterDiscard { card_index } => {
            play_flip_after_discard(table, pid, card_index).map(|_| Applied::Committed)
        }
        Intent::PlayPutBack => play_put_back(table, pid).map(|_| Applied::Committed),
        Intent::AdvanceScoring => advance_scoring(table, pid, rng).map(|_| Applied::Committed),
        Intent::RequestRestart => request_restart(table, pid, now).map(|_| Applied::Committed),
        Intent::VoteRestart => vote_restart(table, pid).map(|_| Applied::Committed),
        Intent::VoteRestartNo => vote_restart_no(table, pid).map(|_| Applied::Committed),
        Intent::Leave => leave(table, pid),
        Intent::Heartbeat => unreachable!("handled above"),
    }?;
    if seat_of(table, pid).is_some() {
        table.player_last_active.insert(pid, now);
    }
    Ok(applied)
}

fn current_seat(table: &TableState, actor: Uuid) -> Result<usize, ActionError> {
    let idx = seat_of(table, actor).ok_or(ActionError::NotAPlayer)?;
    if idx != table.current_player_idx {
        return Err(ActionError::NotYourTurn);
    }
    Ok(idx)
}

fn start(table: &mut TableState, actor: Uuid, rng: &mut impl Rng) -> Result<(), ActionError> {
    seat_of(table, actor).ok_or(ActionError::NotAPlayer)?;
    if table.phase != Phase::Waiting {
        return Err(ActionError::GameAlreadyStarted);
    }
    if table.players.len() < 2 {
        return Err(ActionError::IllegalTarget("Need at least 2 players"));
    }
    deal_round(table, 1, rng);
    Ok(())
}

/// Deal a fresh round: full deck, eight face-down cards each, one card
/// flipped to seed the discard pile. Round 1 hands the deal to the last
/// joiner; later rounds keep the rotation done by `advance_scoring`.
fn deal_round(table: &mut TableState, round_num: u8, rng: &mut impl Rng) {
    let n = table.players.len();
    let mut deck = build_deck(n, rng);
    for p in &mut table.players {
        p.hand = deck.split_off(deck.len() - HAND_SIZE);
        p.revealed_count = 0;
        p.final_turn_taken = false;
    }
    if let Some(mut top) = deck.pop() {
        top.face_up = true;
        table.discard_pile = vec![top];
    }
    table.draw_pile = deck;
    table.drawn_card = None;
    table.drawn_from = None;
    table.must_flip_after_discard = false;
    table.final_lap_trigger_idx = None;
    table.last_affected_card = None;
    table.round_scores.clear();
    if round_num == 1 {
        table.dealer_idx = n - 1;
    }
    table.current_player_idx = (table.dealer_idx + 1) % n;
    table.round_num = round_num;
    table.phase = Phase::Reveal;
}

fn reveal(table: &mut TableState, actor: Uuid, card_index: usize) -> Result<(), ActionError> {
    if table.phase != Phase::Reveal {
        return Err(ActionError::WrongPhase("Not in the reveal phase"));
    }
    let idx = seat_of(table, actor).ok_or(ActionError::NotAPlayer)?;
    if table.players[idx].revealed_count >= 2 {
        return Err(ActionError::IllegalTarget("Already revealed two cards"));
    }
    flip_hand_card(table, idx, card_index)?;
    table.players[idx].revealed_count += 1;
    if table.players.iter().all(|p| p.revealed_count >= 2) {
        table.phase = Phase::Play;
    }
    Ok(())
}

fn draw_from_draw(table: &mut TableState, actor: Uuid, rng: &mut impl Rng) -> Result<(), ActionError> {
    if table.phase != Phase::Play {
        return Err(ActionError::WrongPhase("Not in the play phase"));
    }
    current_seat(table, actor)?;
    if table.drawn_card.is_some() {
        return Err(ActionError::IllegalTarget("Already drew a card"));
    }
    if table.must_flip_after_discard {
        return Err(ActionError::IllegalTarget("Must flip a card first"));
    }
    if table.draw_pile.is_empty() {
        recycle_discards(table, rng)?;
    }
    let Some(mut card) = table.draw_pile.pop() else {
        return Err(ActionError::IllegalTarget("Draw pile empty"));
    };
    card.face_up = true;
    table.drawn_card = Some(card);
    table.drawn_from = Some(DrawSource::Draw);
    Ok(())
}

/// Rebuild an empty draw pile from everything under the discard top.
fn recycle_discards(table: &mut TableState, rng: &mut impl Rng) -> Result<(), ActionError> {
    if table.discard_pile.len() <= 1 {
        return Err(ActionError::IllegalTarget("Draw pile empty"));
    }
    let Some(top) = table.discard_pile.pop() else {
        return Err(ActionError::IllegalTarget("Draw pile empty"));
    };
    let mut recycled: Vec<Card> = table.discard_pile.drain(..).collect();
    for c in &mut recycled {
        c.face_up = false;
    }
    recycled.shuffle(rng);
    table.draw_pile = recycled;
    table.discard_pile.push(top);
    Ok(())
}

fn draw_from_discard(table: &mut TableState, actor: Uuid) -> Result<(), ActionError> {
    if table.phase != Phase::Play {
        return Err(ActionError::WrongPhase("Not in the play phase"));
    }
    current_seat(table, actor)?;
    if table.drawn_card.is_some() {
        return Err(ActionError::IllegalTarget("Already drew a card"));
    }
    if table.must_flip_after_discard {
        return Err(ActionError::IllegalTarget("Must flip a card first"));
    }
    let Some(card) = table.discard_pile.pop() else {
        return Err(ActionError::IllegalTarget("Discard pile empty"));
    };
    table.drawn_card = Some(card);
    table.drawn_from = Some(DrawSource::Discard);
    Ok(())
}

fn play_replace(table: &mut TableState, actor: Uuid, card_index: usize) -> Result<(), ActionError> {
    if table.phase != Phase::Play {
        return Err(ActionError::WrongPhase("Not in the play phase"));
    }
    let idx = current_seat(table, actor)?;
    if table.drawn_card.is_none() {
        return Err(ActionError::IllegalTarget("No card drawn"));
    }
    if card_index >= table.players[idx].hand.len() {
        return Err(ActionError::InvalidInput("card_index out of range"));
    }
    let Some(drawn) = table.drawn_card.take() else {
        return Err(ActionError::IllegalTarget("No card drawn"));
    };
    table.drawn_from = None;
    let mut old = std::mem::replace(&mut table.players[idx].hand[card_index], drawn);
    old.face_up = true;
    table.discard_pile.push(old);
    table.last_affected_card = Some(LastAffected {
        player_id: actor,
        card_index,
    });
    complete_turn(table);
    Ok(())
}

fn play_discard_only(table: &mut TableState, actor: Uuid) -> Result<(), ActionError> {
    if table.phase != Phase::Play {
        return Err(ActionError::WrongPhase("Not in the play phase"));
    }
    let idx = current_seat(table, actor)?;
    if table.drawn_card.is_none() {
        return Err(ActionError::IllegalTarget("No card drawn"));
    }
    if table.drawn_from != Some(DrawSource::Draw) {
        return Err(ActionError::IllegalTarget(
            "Must use a card taken from the discard pile",
        ));
    }
    let Some(drawn) = table.drawn_card.take() else {
        return Err(ActionError::IllegalTarget("No card drawn"));
    };
    table.drawn_from = None;
    table.discard_pile.push(drawn);
    if table.players[idx].face_down_count() > 0 {
        table.must_flip_after_discard = true;
    } else {
        complete_turn(table);
    }
    Ok(())
}

/// Discard the drawn card and flip a face-down card in one message.
fn play_discard_flip(table: &mut TableState, actor: Uuid, card_index: usize) -> Result<(), ActionError> {
    if table.phase != Phase::Play {
        return Err(ActionError::WrongPhase("Not in the play phase"));
    }
    let idx = current_seat(table, actor)?;
    if table.drawn_card.is_none() {
        return Err(ActionError::IllegalTarget("No card drawn"));
    }
    match table.players[idx].hand.get(card_index) {
        None => return Err(ActionError::InvalidInput("card_index out of range")),
        Some(card) if card.face_up => {
            return Err(ActionError::IllegalTarget("Card already face-up"))
        }
        Some(_) => {}
    }
    let Some(drawn) = table.drawn_card.take() else {
        return Err(ActionError::IllegalTarget("No card drawn"));
    };
    table.drawn_from = None;
    table.discard_pile.push(drawn);
    flip_hand_card(table, idx, card_index)?;
    complete_turn(table);
    Ok(())
}

fn play_flip_after_discard(
    table: &mut TableState,
    actor: Uuid,
    card_index: usize,
) -> Result<(), ActionError> {
    if table.phase != Phase::Play {
        return Err(ActionError::WrongPhase("Not in the play phase"));
    }
    if !table.must_flip_after_discard {
        return Err(ActionError::IllegalTarget("No flip required"));
    }
    let idx = current_seat(table, actor)?;
    flip_hand_card(table, idx, card_index)?;
    table.must_flip_after_discard = false;
    complete_turn(table);
    Ok(())
}

/// Return a card drawn from the discard pile without playing it. The turn
/// does not end; the player may still draw again.
fn play_put_back(table: &mut TableState, actor: Uuid) -> Result<(), ActionError> {
    if table.phase != Phase::Play {
        return Err(ActionError::WrongPhase("Not in the play phase"));
    }
    current_seat(table, actor)?;
    if table.drawn_card.is_none() {
        return Err(ActionError::IllegalTarget("No card drawn"));
    }
    if table.drawn_from != Some(DrawSource::Discard) {
        return Err(ActionError::IllegalTarget(
            "Can only put back a card taken from the discard pile",
        ));
    }
    let Some(card) = table.drawn_card.take() else {
        return Err(ActionError::IllegalTarget("No card drawn"));
    };
    table.drawn_from = None;
    table.discard_pile.push(card);
    Ok(())
}

fn advance_scoring(table: &mut TableState, actor: Uuid, rng: &mut impl Rng) -> Result<(), ActionError> {
    seat_of(table, actor).ok_or(ActionError::NotAPlayer)?;
    if table.phase != Phase::Scoring {
        return Err(ActionError::WrongPhase("Not in the scoring phase"));
    }
    if table.round_num >= ROUNDS_PER_GAME {
        reset_to_waiting(table, true);
    } else {
        let n = table.players.len();
        table.dealer_idx = (table.dealer_idx + 1) % n;
        let next = table.round_num + 1;
        deal_round(table, next, rng);
    }
    Ok(())
}

fn request_restart(table: &mut TableState, actor: Uuid, now: i64) -> Result<(), ActionError> {
    seat_of(table, actor).ok_or(ActionError::NotAPlayer)?;
    if table.restart_requested_by.is_some() {
        return Err(ActionError::IllegalTarget("Restart vote already pending"));
    }
    table.restart_requested_by = Some(actor);
    table.restart_requested_at = Some(now);
    table.restart_yes_votes = BTreeSet::from([actor]);
    maybe_complete_restart(table);
    Ok(())
}

fn vote_restart(table: &mut TableState, actor: Uuid) -> Result<(), ActionError> {
    seat_of(table, actor).ok_or(ActionError::NotAPlayer)?;
    if table.restart_requested_by.is_none() {
        return Err(ActionError::IllegalTarget("No restart vote pending"));
    }
    table.restart_yes_votes.insert(actor);
    maybe_complete_restart(table);
    Ok(())
}

fn vote_restart_no(table: &mut TableState, actor: Uuid) -> Result<(), ActionError> {
    seat_of(table, actor).ok_or(ActionError::NotAPlayer)?;
    if table.restart_requested_by.is_none() {
        return Err(ActionError::IllegalTarget("No restart vote pending"));
    }
    clear_restart(table);
    Ok(())
}

/// A restart goes through once every connected seated player has said yes.
/// Disconnected seats do not block the vote.
fn maybe_complete_restart(table: &mut TableState) {
    if table.restart_requested_by.is_none() {
        return;
    }
    let connected: Vec<Uuid> = table
        .players
        .iter()
        .map(|p| p.id)
        .filter(|id| table.active_player_ids.contains(id))
        .collect();
    if !connected.is_empty() && connected.iter().all(|id| table.restart_yes_votes.contains(id)) {
        reset_to_waiting(table, true);
    }
}

fn clear_restart(table: &mut TableState) {
    table.restart_requested_by = None;
    table.restart_requested_at = None;
    table.restart_yes_votes.clear();
}

pub fn leave(table: &mut TableState, actor: Uuid) -> Result<Applied, ActionError> {
    let Some(idx) = seat_of(table, actor) else {
        return Ok(Applied::Quiet);
    };
    let player = table.players.remove(idx);

    // Return the leaver's cards so the deck count stays intact mid-round.
    if matches!(table.phase, Phase::Reveal | Phase::Play) {
        if idx == table.current_player_idx {
            if let Some(mut drawn) = table.drawn_card.take() {
                drawn.face_up = true;
                table.discard_pile.push(drawn);
            }
            table.drawn_from = None;
            table.must_flip_after_discard = false;
        }
        for mut card in player.hand {
            card.face_up = false;
            table.draw_pile.insert(0, card);
        }
    }

    table.scores.remove(&player.id);
    table.round_scores.remove(&player.id);
    table.player_last_active.remove(&player.id);
    table.active_player_ids.remove(&player.id);
    table.restart_yes_votes.remove(&player.id);
    if table.restart_requested_by == Some(player.id) {
        clear_restart(table);
    }
    if table
        .last_affected_card
        .is_some_and(|la| la.player_id == player.id)
    {
        table.last_affected_card = None;
    }

    if table.players.is_empty() {
        reset_to_waiting(table, true);
        table.phase = Phase::Empty;
        return Ok(Applied::Committed);
    }

    let n = table.players.len();
    if table.dealer_idx > idx {
        table.dealer_idx -= 1;
    }
    table.dealer_idx %= n;
    if table.current_player_idx > idx {
        table.current_player_idx -= 1;
    }
    table.current_player_idx %= n;
    match table.final_lap_trigger_idx {
        Some(t) if t == idx => {
            // The finisher left; the lap is off and the round runs on.
            table.final_lap_trigger_idx = None;
            for p in &mut table.players {
                p.final_turn_taken = false;
            }
        }
        Some(t) if t > idx => table.final_lap_trigger_idx = Some(t - 1),
        _ => {}
    }

    if n < 2 && matches!(table.phase, Phase::Reveal | Phase::Play | Phase::Scoring) {
        // A round cannot continue alone; abort it but keep the total scores.
        reset_to_waiting(table, false);
        return Ok(Applied::Committed);
    }

    match table.phase {
        Phase::Reveal => {
            if table.players.iter().all(|p| p.revealed_count >= 2) {
                table.phase = Phase::Play;
            }
        }
        Phase::Play => {
            if let Some(t) = table.final_lap_trigger_idx {
                match next_eligible_from(table, table.current_player_idx, t) {
                    Some(i) => table.current_player_idx = i,
                    None => finish_hole(table),
                }
            }
        }
        _ => {}
    }
    maybe_complete_restart(table);
    Ok(Applied::Committed)
}

fn flip_hand_card(table: &mut TableState, seat: usize, card_index: usize) -> Result<(), ActionError> {
    let player = &mut table.players[seat];
    let card = player
        .hand
        .get_mut(card_index)
        .ok_or(ActionError::InvalidInput("card_index out of range"))?;
    if card.face_up {
        return Err(ActionError::IllegalTarget("Card already face-up"));
    }
    card.face_up = true;
    let pid = player.id;
    table.last_affected_card = Some(LastAffected {
        player_id: pid,
        card_index,
    });
    Ok(())
}

/// Next seat that still owes a final-lap turn, scanning from `start`
/// inclusive. The trigger seat never plays again; neither does a seat that
/// already took its turn or has nothing left face-down.
fn next_eligible_from(table: &TableState, start: usize, trigger: usize) -> Option<usize> {
    let n = table.players.len();
    for step in 0..n {
        let i = (start + step) % n;
        if i == trigger {
            continue;
        }
        let p = &table.players[i];
        if p.final_turn_taken || p.face_down_count() == 0 {
            continue;
        }
        return Some(i);
    }
    None
}

fn complete_turn(table: &mut TableState) {
    table.drawn_card = None;
    table.drawn_from = None;
    table.must_flip_after_discard = false;
    let n = table.players.len();
    let actor = table.current_player_idx;
    if table.players[actor].face_down_count() == 0 && table.final_lap_trigger_idx.is_none() {
        table.final_lap_trigger_idx = Some(actor);
    }
    match table.final_lap_trigger_idx {
        None => table.current_player_idx = (actor + 1) % n,
        Some(trigger) => {
            if actor != trigger {
                table.players[actor].final_turn_taken = true;
            }
            match next_eligible_from(table, (actor + 1) % n, trigger) {
                Some(i) => table.current_player_idx = i,
                None => finish_hole(table),
            }
        }
    }
}

/// Flip everything, tally the round, move to the scoring phase.
fn finish_hole(table: &mut TableState) {
    for p in &mut table.players {
        for c in &mut p.hand {
            c.face_up = true;
        }
    }
    table.round_scores = table
        .players
        .iter()
        .map(|p| (p.id, score_hand(&p.hand)))
        .collect();
    for p in &table.players {
        *table.scores.entry(p.id).or_insert(0) += table.round_scores[&p.id];
    }
    table.phase = Phase::Scoring;
    table.drawn_card = None;
    table.drawn_from = None;
    table.must_flip_after_discard = false;
    table.final_lap_trigger_idx = None;
    for p in &mut table.players {
        p.final_turn_taken = false;
    }
}

fn reset_to_waiting(table: &mut TableState, clear_scores: bool) {
    table.phase = Phase::Waiting;
    table.round_num = 0;
    for p in &mut table.players {
        p.hand.clear();
        p.revealed_count = 0;
        p.final_turn_taken = false;
    }
    table.draw_pile.clear();
    table.discard_pile.clear();
    table.drawn_card = None;
    table.drawn_from = None;
    table.must_flip_after_discard = false;
    table.final_lap_trigger_idx = None;
    table.last_affected_card = None;
    table.current_player_idx = 0;
    table.dealer_idx = 0;
    table.round_scores.clear();
    if clear_scores {
        table.scores.clear();
    }
    clear_restart(table);
}

/// ---- Observable state ----

/// Build the sanitized view broadcast to every observer. Face-down values
/// are masked for everyone, the owner included; the drawn card is public.
pub fn snapshot(table: &TableState, inactive_turn_name: Option<String>) -> TableSnapshot {
    let players = table
        .players
        .iter()
        .map(|p| PublicPlayer {
            id: p.id,
            name: p.name.clone(),
            hand: p
                .hand
                .iter()
                .map(|c| PublicCard {
                    value: if c.face_up { c.value } else { FACE_DOWN_MASK },
                    face_up: c.face_up,
                })
                .collect(),
            revealed_count: p.revealed_count,
            final_turn_taken: p.final_turn_taken,
        })
        .collect();
    let discard_pile_top = table
        .discard_pile
        .iter()
        .rev()
        .take(2)
        .map(|c| c.value)
        .collect();
    TableSnapshot {
        name: table.name.clone(),
        phase: table.phase,
        players,
        round_num: table.round_num,
        current_player_idx: table.current_player_idx,
        dealer_idx: table.dealer_idx,
        draw_pile_count: table.draw_pile.len(),
        discard_pile_count: table.discard_pile.len(),
        discard_pile_top,
        drawn_card: table.drawn_card.map(|c| PublicCard {
            value: c.value,
            face_up: true,
        }),
        drawn_from: table.drawn_from,
        must_flip_after_discard: table.must_flip_after_discard,
        last_affected_card: table.last_affected_card,
        final_lap_trigger_idx: table.final_lap_trigger_idx,
        round_scores: table.round_scores.clone(),
        scores: table.scores.clone(),
        restart_requested_by: table.restart_requested_by,
        restart_requested_at: table.restart_requested_at,
        restart_yes_votes: table.restart_yes_votes.clone(),
        active_player_ids: table.active_player_ids.clone(),
        player_last_active: table.player_last_active.clone(),
        inactive_turn_name,
    }
}

/// View of a table that has no state yet (or none any more).
pub fn empty_snapshot(name: &str) -> TableSnapshot {
    TableSnapshot {
        name: name.to_string(),
        phase: Phase::Empty,
        players: Vec::new(),
        round_num: 0,
        current_player_idx: 0,
        dealer_idx: 0,
        draw_pile_count: deck_size_for(2),
        discard_pile_count: 0,
        discard_pile_top: Vec::new(),
        drawn_card: None,
        drawn_from: None,
        must_flip_after_discard: false,
        last_affected_card: None,
        final_lap_trigger_idx: None,
        round_scores: BTreeMap::new(),
        scores: BTreeMap::new(),
        restart_requested_by: None,
        restart_requested_at: None,
        restart_yes_votes: BTreeSet::new(),
        active_player_ids: BTreeSet::new(),
        player_last_active: BTreeMap::new(),
        inactive_turn_name: None,
    }
}
