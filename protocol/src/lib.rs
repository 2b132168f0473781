use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// ---- Table limits ----

pub const HAND_SIZE: usize = 8;
pub const HAND_COLUMNS: usize = 4;
pub const MAX_PLAYERS: usize = 8;
/// Largest table that still plays with two packs.
pub const TWO_PACK_MAX_PLAYERS: usize = 6;
pub const ROUNDS_PER_GAME: u8 = 9;

/// Wire sentinel for a face-down card whose value is hidden from the
/// observer. Never stored server-side; emitted during serialization only.
pub const FACE_DOWN_MASK: i8 = -99;

/// ---- Cards ----

pub const HOLE_IN_ONE: i8 = -5;
pub const MIN_CARD_VALUE: i8 = -5;
pub const MAX_CARD_VALUE: i8 = 12;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Card {
    pub value: i8,
    #[serde(default)]
    pub face_up: bool,
}

impl Card {
    pub fn face_down(value: i8) -> Self {
        Card {
            value,
            face_up: false,
        }
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.face_up {
            write!(f, "{}", self.value)
        } else {
            write!(f, "??")
        }
    }
}

/// One pack: two Hole-in-One cards plus four of each value 0..=12 (54 cards).
/// Tables of 2-6 players use two packs (108), 7-8 players use three (162).
const HOLE_IN_ONE_PER_PACK: usize = 2;
const PER_VALUE_PER_PACK: usize = 4;
pub const PACK_SIZE: usize = HOLE_IN_ONE_PER_PACK + 13 * PER_VALUE_PER_PACK;

pub fn packs_for(player_count: usize) -> usize {
    if player_count <= TWO_PACK_MAX_PLAYERS {
        2
    } else {
        3
    }
}

pub fn deck_size_for(player_count: usize) -> usize {
    packs_for(player_count) * PACK_SIZE
}

/// Build a shuffled face-down deck sized for the table.
pub fn build_deck(player_count: usize, rng: &mut impl Rng) -> Vec<Card> {
    let packs = packs_for(player_count);
    let mut deck = Vec::with_capacity(packs * PACK_SIZE);
    for _ in 0..packs * HOLE_IN_ONE_PER_PACK {
        deck.push(Card::face_down(HOLE_IN_ONE));
    }
    for value in 0..=MAX_CARD_VALUE {
        for _ in 0..packs * PER_VALUE_PER_PACK {
            deck.push(Card::face_down(value));
        }
    }
    deck.shuffle(rng);
    deck
}

/// ---- Scoring ----

/// Score a fully revealed hand laid out as four columns of two
/// (indices `c` and `c + 4`). A matched column scores zero, except a pair
/// of Hole-in-Ones which scores -10; an unmatched column scores its sum.
/// Repeating the same pair across columns earns shaving strokes: -10 for
/// two columns, -15 for three or more.
pub fn score_hand(hand: &[Card]) -> i32 {
    if hand.len() != HAND_SIZE {
        // Partial hand (player left mid-round): face-up values only.
        return hand
            .iter()
            .filter(|c| c.face_up)
            .map(|c| i32::from(c.value))
            .sum();
    }

    let mut total = 0i32;
    let mut pair_counts: BTreeMap<i8, usize> = BTreeMap::new();
    for col in 0..HAND_COLUMNS {
        let top = hand[col].value;
        let bottom = hand[col + HAND_COLUMNS].value;
        if top == bottom {
            if top == HOLE_IN_ONE {
                total += -10;
            }
            *pair_counts.entry(top).or_insert(0) += 1;
        } else {
            total += i32::from(top) + i32::from(bottom);
        }
    }

    let max_same = pair_counts.values().copied().max().unwrap_or(0);
    if max_same >= 3 {
        total += -15;
    } else if max_same >= 2 {
        total += -10;
    }
    total
}

/// ---- Name validation ----

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct InvalidName(pub &'static str);

/// Lowercase letters, digits, `-`, `_`; 1..=20 chars. Input is lowercased
/// and trimmed before checking. Returns the sanitized name.
pub fn validate_table_name(raw: &str) -> Result<String, InvalidName> {
    let name = raw.trim().to_lowercase();
    let ok = !name.is_empty()
        && name.len() <= 20
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if ok {
        Ok(name)
    } else {
        Err(InvalidName(
            "Table name: lowercase letters, digits, -, _ only; max 20 characters",
        ))
    }
}

/// Letters, digits, space; 1..=20 chars after trimming.
pub fn validate_player_name(raw: &str) -> Result<String, InvalidName> {
    let name = raw.trim().to_string();
    let ok = !name.is_empty()
        && name.len() <= 20
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ');
    if ok {
        Ok(name)
    } else {
        Err(InvalidName(
            "Player name: letters, digits, space only; max 20 characters",
        ))
    }
}

/// ---- Phases ----

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Table exists but nobody is seated.
    #[default]
    Empty,
    Waiting,
    Reveal,
    Play,
    Scoring,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DrawSource {
    Draw,
    Discard,
}

/// ---- Inbound intents ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    Start,
    Reveal { card_index: usize },
    DrawFromDraw,
    DrawFromDiscard,
    PlayReplace { card_index: usize },
    PlayDiscardOnly,
    PlayDiscardFlip { card_index: usize },
    PlayFlipAfterDiscard { card_index: usize },
    PlayPutBack,
    AdvanceScoring,
    RequestRestart,
    VoteRestart,
    VoteRestartNo,
    Heartbeat,
    Leave,
}

/// ---- Rejections ----

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    InvalidName,
    AlreadyConnected,
    NotAPlayer,
    WrongPhase,
    NotYourTurn,
    IllegalTarget,
    TableFull,
    GameAlreadyStarted,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("{0}")]
    InvalidName(&'static str),
    #[error("Player already connected elsewhere")]
    AlreadyConnected,
    #[error("Not a player at this table")]
    NotAPlayer,
    #[error("{0}")]
    WrongPhase(&'static str),
    #[error("Not your turn")]
    NotYourTurn,
    #[error("{0}")]
    IllegalTarget(&'static str),
    #[error("Table is full")]
    TableFull,
    #[error("Game already started")]
    GameAlreadyStarted,
    #[error("Internal server error")]
    Internal,
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::InvalidInput(_) => ErrorKind::InvalidInput,
            ActionError::InvalidName(_) => ErrorKind::InvalidName,
            ActionError::AlreadyConnected => ErrorKind::AlreadyConnected,
            ActionError::NotAPlayer => ErrorKind::NotAPlayer,
            ActionError::WrongPhase(_) => ErrorKind::WrongPhase,
            ActionError::NotYourTurn => ErrorKind::NotYourTurn,
            ActionError::IllegalTarget(_) => ErrorKind::IllegalTarget,
            ActionError::TableFull => ErrorKind::TableFull,
            ActionError::GameAlreadyStarted => ErrorKind::GameAlreadyStarted,
            ActionError::Internal => ErrorKind::Internal,
        }
    }
}

impl From<InvalidName> for ActionError {
    fn from(e: InvalidName) -> Self {
        ActionError::InvalidName(e.0)
    }
}

/// Error payload sent to the originating connection only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMsg {
    pub error: ErrorKind,
    pub message: String,
}

impl ErrorMsg {
    pub fn from_action(err: &ActionError) -> Self {
        ErrorMsg {
            error: err.kind(),
            message: err.to_string(),
        }
    }
}

/// ---- Outbound snapshots ----

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicCard {
    pub value: i8,
    pub face_up: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicPlayer {
    pub id: Uuid,
    pub name: String,
    pub hand: Vec<PublicCard>,
    pub revealed_count: u8,
    pub final_turn_taken: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastAffected {
    pub player_id: Uuid,
    pub card_index: usize,
}

/// Full observable table state. Face-down hand values are masked for every
/// observer, including the hand's owner; the drawn card is always visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub name: String,
    pub phase: Phase,
    pub players: Vec<PublicPlayer>,
    pub round_num: u8,
    pub current_player_idx: usize,
    pub dealer_idx: usize,
    pub draw_pile_count: usize,
    pub discard_pile_count: usize,
    /// Top of the discard pile first, at most two values.
    pub discard_pile_top: Vec<i8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drawn_card: Option<PublicCard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drawn_from: Option<DrawSource>,
    #[serde(default)]
    pub must_flip_after_discard: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_affected_card: Option<LastAffected>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_lap_trigger_idx: Option<usize>,
    pub round_scores: BTreeMap<Uuid, i32>,
    pub scores: BTreeMap<Uuid, i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_requested_by: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_requested_at: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub restart_yes_votes: BTreeSet<Uuid>,
    pub active_player_ids: BTreeSet<Uuid>,
    pub player_last_active: BTreeMap<Uuid, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactive_turn_name: Option<String>,
}

/// ---- HTTP bodies ----

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub table_name: String,
    #[serde(default)]
    pub player_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub table_name: String,
    pub player_id: Uuid,
}
