//! Single-writer table sessions. Each table is owned by one task that pulls
//! commands off a bounded queue, applies intents to a working copy of the
//! state, persists on commit, and fans the resulting snapshot out to every
//! subscriber. At most one engine transition per table is ever in flight.

use crate::game::{self, Applied, TableState};
use crate::hub::{Outbound, Subscribers};
use crate::persistence::SnapshotStore;
use crate::registry::Registry;
use chrono::Utc;
use playnine_protocol::{ActionError, DrawSource, Intent, JoinResponse, Phase};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Bound on queued commands per table; senders back-pressure beyond this.
pub const COMMAND_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct SessionTuning {
    /// Forced-action deadline for the current player while in play.
    pub idle_turn: Duration,
    /// How long a restart vote stays open.
    pub restart_vote: Duration,
    /// Idle sweep for tables nobody is seated at.
    pub sweep: Duration,
}

impl Default for SessionTuning {
    fn default() -> Self {
        SessionTuning {
            idle_turn: Duration::from_secs(60),
            restart_vote: Duration::from_secs(30),
            sweep: Duration::from_secs(300),
        }
    }
}

pub enum SessionCmd {
    /// A connection attaches; player connections are refused while another
    /// live connection holds the same id.
    Subscribe {
        conn_id: u64,
        player_id: Option<Uuid>,
        tx: Outbound,
        reply: oneshot::Sender<Result<(), ActionError>>,
    },
    Unsubscribe {
        conn_id: u64,
    },
    Intent {
        conn_id: u64,
        intent: Intent,
    },
    /// HTTP join: seat a new player, or hand back the seat matching `name`.
    Join {
        player_name: Option<String>,
        reply: oneshot::Sender<Result<JoinResponse, ActionError>>,
    },
    /// HTTP leave; idempotent.
    Leave {
        player_id: Uuid,
        reply: oneshot::Sender<()>,
    },
    /// Current snapshot as a JSON frame (spectator polling).
    Snapshot {
        reply: oneshot::Sender<String>,
    },
}

pub type SessionHandle = mpsc::Sender<SessionCmd>;

pub struct TableSession {
    state: TableState,
    rx: mpsc::Receiver<SessionCmd>,
    subs: Subscribers,
    store: SnapshotStore,
    tuning: SessionTuning,
    registry: Registry,
    rng: StdRng,
    turn_deadline: Option<Instant>,
    restart_deadline: Option<Instant>,
    /// Name attached to snapshots after a turn had to be played for an
    /// inactive player; cleared by the next committed intent.
    inactive_turn_name: Option<String>,
    shutdown: bool,
}

impl TableSession {
    pub fn new(
        state: TableState,
        rx: mpsc::Receiver<SessionCmd>,
        store: SnapshotStore,
        tuning: SessionTuning,
        registry: Registry,
    ) -> Self {
        TableSession {
            state,
            rx,
            subs: Subscribers::new(),
            store,
            tuning,
            registry,
            rng: StdRng::from_entropy(),
            turn_deadline: None,
            restart_deadline: None,
            inactive_turn_name: None,
            shutdown: false,
        }
    }

    pub async fn run(mut self) {
        info!(table = %self.state.name, players = self.state.players.len(), "table session started");
        // A table restored mid-play (or mid-vote) gets its clocks armed
        // right away, not only after the next committed intent.
        self.reschedule(Phase::Empty, None, None);
        loop {
            let turn_at = self.turn_deadline;
            let restart_at = self.restart_deadline;
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
                _ = sleep_until(turn_at.unwrap_or_else(Instant::now)), if turn_at.is_some() => {
                    self.force_idle_turn().await;
                }
                _ = sleep_until(restart_at.unwrap_or_else(Instant::now)), if restart_at.is_some() => {
                    self.expire_restart_vote().await;
                }
                // Recreated on every command, so this only fires after a
                // full sweep interval of silence.
                _ = sleep(self.tuning.sweep) => {
                    if self.state.players.is_empty() {
                        info!(table = %self.state.name, "idle table swept");
                        self.shutdown = true;
                    }
                }
            }
            if self.shutdown {
                break;
            }
        }
        if self.shutdown {
            self.registry.remove(&self.state.name);
            if let Err(e) = self.store.delete(&self.state.name).await {
                warn!(table = %self.state.name, error = %e, "failed to delete table snapshot");
            }
            info!(table = %self.state.name, "table destroyed");
        }
    }

    async fn handle(&mut self, cmd: SessionCmd) {
        match cmd {
            SessionCmd::Subscribe {
                conn_id,
                player_id,
                tx,
                reply,
            } => self.handle_subscribe(conn_id, player_id, tx, reply),
            SessionCmd::Unsubscribe { conn_id } => self.handle_unsubscribe(conn_id),
            SessionCmd::Intent { conn_id, intent } => self.handle_intent(conn_id, intent).await,
            SessionCmd::Join { player_name, reply } => {
                let result = self.handle_join(player_name).await;
                let _ = reply.send(result);
            }
            SessionCmd::Leave { player_id, reply } => {
                // Idempotent: leaving an unknown seat is a quiet no-op.
                let _ = self
                    .apply_and_commit(Some(player_id), &Intent::Leave)
                    .await;
                let _ = reply.send(());
            }
            SessionCmd::Snapshot { reply } => {
                let _ = reply.send(self.snapshot_json());
            }
        }
    }

    fn handle_subscribe(
        &mut self,
        conn_id: u64,
        player_id: Option<Uuid>,
        tx: Outbound,
        reply: oneshot::Sender<Result<(), ActionError>>,
    ) {
        if let Some(pid) = player_id {
            if self.subs.has_player(pid) {
                let _ = reply.send(Err(ActionError::AlreadyConnected));
                return;
            }
        }
        self.subs.insert(conn_id, player_id, tx);
        let _ = reply.send(Ok(()));

        let seated = player_id.filter(|pid| game::seat_of(&self.state, *pid).is_some());
        if let Some(pid) = seated {
            self.state.active_player_ids.insert(pid);
            self.state
                .player_last_active
                .insert(pid, Utc::now().timestamp());
            // Presence changed: everyone sees it, the newcomer included.
            self.broadcast();
        } else {
            self.subs.send_to(conn_id, self.snapshot_json());
        }
    }

    fn handle_unsubscribe(&mut self, conn_id: u64) {
        if let Some(pid) = self.subs.remove(conn_id) {
            if self.state.active_player_ids.remove(&pid) {
                self.state
                    .player_last_active
                    .insert(pid, Utc::now().timestamp());
                self.broadcast();
            }
        }
    }

    async fn handle_intent(&mut self, conn_id: u64, intent: Intent) {
        let actor = self.subs.player_of(conn_id);
        // Spectator connections may only heartbeat.
        if actor.is_none() && !matches!(intent, Intent::Heartbeat) {
            self.subs.send_error(conn_id, &ActionError::NotAPlayer);
            return;
        }
        if let Err(e) = self.apply_and_commit(actor, &intent).await {
            self.subs.send_error(conn_id, &e);
        }
    }

    async fn handle_join(
        &mut self,
        player_name: Option<String>,
    ) -> Result<JoinResponse, ActionError> {
        let table_name = self.state.name.clone();
        let Some(name) = player_name else {
            // Table-view entry: no seat taken.
            return Ok(JoinResponse {
                table_name,
                player_id: None,
            });
        };
        if let Some(pid) = game::find_player_by_name(&self.state, &name) {
            // Same name rejoins its seat unless a live connection holds it.
            if self.subs.has_player(pid) {
                return Err(ActionError::AlreadyConnected);
            }
            return Ok(JoinResponse {
                table_name,
                player_id: Some(pid),
            });
        }
        let now = Utc::now().timestamp();
        let mut next = self.state.clone();
        let pid = game::add_player(&mut next, &name, now)?;
        if let Err(e) = self.store.save(&next).await {
            error!(table = %table_name, error = %e, "snapshot write failed on join");
            return Err(ActionError::Internal);
        }
        self.state = next;
        self.broadcast();
        Ok(JoinResponse {
            table_name,
            player_id: Some(pid),
        })
    }

    /// Run one intent against a working copy; only a successfully persisted
    /// result replaces the authoritative state. A failed snapshot write
    /// rejects the intent as `internal` and the session carries on.
    async fn apply_and_commit(
        &mut self,
        actor: Option<Uuid>,
        intent: &Intent,
    ) -> Result<Applied, ActionError> {
        let now = Utc::now().timestamp();
        let before_phase = self.state.phase;
        let before_current = self.state.current_player().map(|p| p.id);
        let mut next = self.state.clone();
        let applied = game::apply(&mut next, actor, intent, now, &mut self.rng)?;
        match applied {
            Applied::Quiet => {
                self.state = next;
            }
            Applied::Committed => {
                if let Err(e) = self.store.save(&next).await {
                    error!(table = %self.state.name, error = %e, "snapshot write failed; intent rejected");
                    return Err(ActionError::Internal);
                }
                self.state = next;
                self.inactive_turn_name = None;
                self.reschedule(before_phase, before_current, actor);
                self.broadcast();
                if self.state.players.is_empty() && self.state.phase == Phase::Empty {
                    self.shutdown = true;
                }
            }
        }
        Ok(applied)
    }

    /// Recompute both timers after a commit. The idle countdown restarts
    /// whenever the turn moved or the current player acted, so every turn
    /// gets the full window even for a long-disconnected seat. The turn is
    /// tracked by player id, not seat index: a leave can hand the same
    /// index to a different player.
    fn reschedule(&mut self, before_phase: Phase, before_current: Option<Uuid>, actor: Option<Uuid>) {
        if self.state.phase != Phase::Play || self.state.players.is_empty() {
            self.turn_deadline = None;
        } else {
            let current = self.state.current_player().map(|p| p.id);
            let turn_moved = before_phase != Phase::Play || before_current != current;
            let actor_is_current = actor.is_some() && actor == current;
            if turn_moved || actor_is_current || self.turn_deadline.is_none() {
                self.turn_deadline = Some(Instant::now() + self.tuning.idle_turn);
            }
        }
        self.restart_deadline = if self.state.restart_requested_by.is_some() {
            self.restart_deadline
                .or_else(|| Some(Instant::now() + self.tuning.restart_vote))
        } else {
            None
        };
    }

    /// The current player ran out their clock: play the minimum legal
    /// action for them and tell observers whose turn was forced.
    async fn force_idle_turn(&mut self) {
        self.turn_deadline = None;
        if self.state.phase != Phase::Play {
            return;
        }
        let Some(player) = self.state.current_player() else {
            return;
        };
        let pid = player.id;
        let name = player.name.clone();
        let now = Utc::now().timestamp();

        let mut next = self.state.clone();
        if let Err(e) = synthesize_idle_turn(&mut next, pid, now, &mut self.rng) {
            error!(table = %self.state.name, player = %name, error = %e, "forced turn failed");
            self.turn_deadline = Some(Instant::now() + self.tuning.idle_turn);
            return;
        }
        if let Err(e) = self.store.save(&next).await {
            error!(table = %self.state.name, error = %e, "snapshot write failed on forced turn");
            self.turn_deadline = Some(Instant::now() + self.tuning.idle_turn);
            return;
        }
        warn!(table = %self.state.name, player = %name, "idle turn forced");
        self.state = next;
        self.inactive_turn_name = Some(name);
        self.reschedule(Phase::Play, Some(pid), None);
        self.broadcast();
    }

    async fn expire_restart_vote(&mut self) {
        self.restart_deadline = None;
        if self.state.restart_requested_by.is_none() {
            return;
        }
        let mut next = self.state.clone();
        next.restart_requested_by = None;
        next.restart_requested_at = None;
        next.restart_yes_votes.clear();
        if let Err(e) = self.store.save(&next).await {
            error!(table = %self.state.name, error = %e, "snapshot write failed expiring restart vote");
            return;
        }
        info!(table = %self.state.name, "restart vote expired");
        self.state = next;
        self.broadcast();
    }

    fn snapshot_json(&self) -> String {
        let snap = game::snapshot(&self.state, self.inactive_turn_name.clone());
        serde_json::to_string(&snap).unwrap_or_else(|e| {
            error!(table = %self.state.name, error = %e, "failed to encode snapshot");
            "{}".to_string()
        })
    }

    fn broadcast(&mut self) {
        let frame = self.snapshot_json();
        self.subs.broadcast(&frame);
    }
}

/// Draw, discard, and flip if required; a card lifted from the discard pile
/// must be used, so that case replaces the first face-down slot instead.
fn synthesize_idle_turn(
    table: &mut TableState,
    pid: Uuid,
    now: i64,
    rng: &mut impl Rng,
) -> Result<(), ActionError> {
    if table.must_flip_after_discard {
        let i = first_face_down(table, pid)?;
        game::apply(
            table,
            Some(pid),
            &Intent::PlayFlipAfterDiscard { card_index: i },
            now,
            rng,
        )?;
        return Ok(());
    }
    if table.drawn_card.is_none() {
        game::apply(table, Some(pid), &Intent::DrawFromDraw, now, rng)?;
    }
    match table.drawn_from {
        Some(DrawSource::Draw) => {
            game::apply(table, Some(pid), &Intent::PlayDiscardOnly, now, rng)?;
            if table.must_flip_after_discard {
                let i = first_face_down(table, pid)?;
                game::apply(
                    table,
                    Some(pid),
                    &Intent::PlayFlipAfterDiscard { card_index: i },
                    now,
                    rng,
                )?;
            }
        }
        Some(DrawSource::Discard) => {
            let i = first_face_down(table, pid).unwrap_or(0);
            game::apply(
                table,
                Some(pid),
                &Intent::PlayReplace { card_index: i },
                now,
                rng,
            )?;
        }
        None => {}
    }
    Ok(())
}

fn first_face_down(table: &TableState, pid: Uuid) -> Result<usize, ActionError> {
    let idx = game::seat_of(table, pid).ok_or(ActionError::NotAPlayer)?;
    table.players[idx]
        .hand
        .iter()
        .position(|c| !c.face_up)
        .ok_or(ActionError::IllegalTarget("No face-down card left"))
}
