//! The move-lifecycle orchestrator.
//!
//! One arbiter runs per participant. It owns the match, polls piece
//! interaction state, translates drags into engine move submissions, applies
//! side effects (captures, castling rook relocation, en passant, delayed
//! promotion), and drives the replication protocol. Inbound replication
//! messages replay the same side-effect logic; legality is trusted from the
//! remote sender, not re-validated beyond the local engine accepting the
//! replayed move.
//!
//! Everything runs on one cooperative loop (`run`): poll tick, network
//! receipt and host commands are serialized, so no locking is needed.

use std::sync::Arc;

use shakmaty::{Rank, Square};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use chess_match::{Color, Match, MoveOutcome, MoveRequest, PieceKind};

use crate::config::ArbiterConfig;
use crate::error::ArbiterError;
use crate::events::{HostCommand, Notification};
use crate::piece::{initial_layout, PieceId, PieceRegistry, PieceState};
use crate::ports::{EventSink, GeometryMapper, InteractionSource, NetworkChannel};
use crate::protocol::{GameMode, NetMessage};
use crate::session::{ParticipantId, Players, Profile};

/// A scheduled promotion replacement, keyed by the pawn's identity so a
/// reset can cancel it before it materializes onto a fresh board.
#[derive(Debug)]
struct PendingPromotion {
    piece: PieceId,
    square: Square,
    due: Instant,
}

pub struct Arbiter {
    me: ParticipantId,
    profile: Profile,
    config: ArbiterConfig,

    game: Match,
    mode: GameMode,
    pieces: PieceRegistry,
    players: Players,
    /// The single tracked opponent; capture notices unicast here.
    opponent: Option<ParticipantId>,
    /// Announce our slot to late joiners only while we occupy one.
    announce_on_connect: bool,

    /// Piece-added announcements deferred to the next tick, so peers never
    /// reference a half-registered object.
    pending_adds: Vec<PieceId>,
    pending_promotions: Vec<PendingPromotion>,

    geometry: Arc<dyn GeometryMapper + Send + Sync>,
    interaction: Arc<dyn InteractionSource + Send + Sync>,
    net: Arc<dyn NetworkChannel + Send + Sync>,
    events: Arc<dyn EventSink + Send + Sync>,
}

impl Arbiter {
    pub fn new(
        me: ParticipantId,
        profile: Profile,
        config: ArbiterConfig,
        geometry: Arc<dyn GeometryMapper + Send + Sync>,
        interaction: Arc<dyn InteractionSource + Send + Sync>,
        net: Arc<dyn NetworkChannel + Send + Sync>,
        events: Arc<dyn EventSink + Send + Sync>,
    ) -> Self {
        Self {
            me,
            profile,
            config,
            game: Match::new(),
            mode: GameMode::Standard,
            pieces: PieceRegistry::new(),
            players: Players::new(),
            opponent: None,
            announce_on_connect: false,
            pending_adds: Vec::new(),
            pending_promotions: Vec::new(),
            geometry,
            interaction,
            net,
            events,
        }
    }

    pub fn participant_id(&self) -> &ParticipantId {
        &self.me
    }

    pub fn game(&self) -> &Match {
        &self.game
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn pieces(&self) -> &PieceRegistry {
        &self.pieces
    }

    pub fn players(&self) -> &Players {
        &self.players
    }

    pub fn opponent(&self) -> Option<&ParticipantId> {
        self.opponent.as_ref()
    }

    // ---- Game lifecycle ----

    /// Construct a new match from a FEN string or the standard start.
    pub fn start_game(&mut self, fen: Option<&str>) -> Result<(), ArbiterError> {
        self.game = match fen.map(str::trim).filter(|f| !f.is_empty()) {
            Some(fen) => Match::from_fen(fen)?,
            None => Match::new(),
        };
        Ok(())
    }

    /// Destroy all piece objects, emit the local reset notification,
    /// reconstruct the match and recenter the spawn point. Idempotent.
    pub fn reset_game(&mut self, fen: Option<&str>) {
        self.announce_on_connect = false;
        self.destroy_my_pieces();
        self.pending_adds.clear();
        self.pending_promotions.clear();
        self.players.clear();
        self.opponent = None;
        self.events.emit(Notification::GameReset);
        if let Err(e) = self.start_game(fen) {
            warn!(error = %e, "Reset with invalid FEN, falling back to standard start");
            self.game = Match::new();
        }
        self.events.emit(Notification::SpawnAt { color: None });
    }

    /// Broadcast reset intent, perform the local reset, re-broadcast the
    /// resulting game mode. Peers receiving the broadcast run the same
    /// local reset.
    pub fn reset_networked_game(&mut self, fen: Option<&str>) {
        self.net.broadcast(&NetMessage::ResetGame {
            fen: fen.map(String::from),
        });
        self.reset_game(fen);
        self.set_game_mode(fen);
    }

    /// Derive the mode from the presence of a FEN, broadcast and emit it.
    pub fn set_game_mode(&mut self, fen: Option<&str>) {
        let mode = match fen.map(str::trim).filter(|f| !f.is_empty()) {
            Some(_) => GameMode::Fen,
            None => GameMode::Standard,
        };
        self.mode = mode;
        self.net
            .broadcast(&NetMessage::SetGameMode { game_mode: mode });
        self.events.emit(Notification::GameModeSet { mode });
    }

    /// Whole-history PGN replacement. A failed load leaves the match
    /// untouched and is reported upward, never retried.
    pub fn load_pgn(&mut self, pgn: &str) -> Result<(), ArbiterError> {
        self.game.load_pgn(pgn)?;
        Ok(())
    }

    pub fn load_networked_pgn(&mut self, pgn: &str) -> Result<(), ArbiterError> {
        self.mode = GameMode::Pgn;
        self.net.broadcast(&NetMessage::SetGameMode {
            game_mode: GameMode::Pgn,
        });
        self.events.emit(Notification::GameModeSet {
            mode: GameMode::Pgn,
        });
        self.load_pgn(pgn)?;
        self.net.broadcast(&NetMessage::LoadPgn {
            pgn: pgn.to_string(),
        });
        Ok(())
    }

    pub fn copy_pgn(&self) {
        self.events.emit(Notification::PgnReady {
            pgn: self.game.pgn(),
        });
    }

    pub fn copy_fen(&self) {
        self.events.emit(Notification::FenReady {
            fen: self.game.fen(),
        });
    }

    // ---- Sessions ----

    /// Claim a color for a local participant. A claim for an occupied slot
    /// is a complete no-op: no mutation, no broadcast.
    pub fn play_as(&mut self, color: Color, participant_id: ParticipantId, profile: Profile) {
        if self.players.occupant(color).is_some() {
            debug!(%color, "Color already claimed, ignoring");
            return;
        }
        self.players
            .claim(color, participant_id.clone(), profile.clone());
        info!(%color, %participant_id, "Claimed color");
        self.events.emit(Notification::PlayerActive {
            color,
            participant_id: participant_id.clone(),
            profile: profile.clone(),
        });
        self.net.broadcast(&NetMessage::SetPlayer {
            color,
            participant_id,
            profile,
            pieces: None,
        });

        let ids = self.spawn_piece_set(color);
        self.players.set_pieces(color, ids);

        self.opponent = self
            .players
            .occupant(color.other())
            .map(|slot| slot.participant_id.clone());

        self.events.emit(Notification::SpawnAt { color: Some(color) });
        self.announce_on_connect = true;
    }

    /// Unicast our own color/profile/pieces to a newly connected
    /// participant — prior broadcasts are not replayed to late joiners.
    pub fn announce_current_player(&self, peer: &ParticipantId) {
        let Some(color) = self.players.color_of(&self.me) else {
            return;
        };
        let Some(slot) = self.players.occupant(color) else {
            return;
        };
        self.net.send_to(
            peer,
            &NetMessage::SetPlayer {
                color,
                participant_id: self.me.clone(),
                profile: slot.profile.clone(),
                pieces: Some(slot.pieces.clone()),
            },
        );
    }

    /// Chat dispatch: `play <color>`, `reset`, `w`/`b`, `fen ...`, `pgn ...`.
    /// Unrecognized tokens are ignored.
    pub fn handle_chat_command(
        &mut self,
        command: &str,
        args: &[String],
    ) -> Result<(), ArbiterError> {
        match command {
            "play" => {
                if let Some(color) = args.first().and_then(|a| Color::parse(a)) {
                    self.play_as(color, self.me.clone(), self.profile.clone());
                }
            }
            "reset" => self.reset_networked_game(None),
            "w" => self.play_as(Color::White, self.me.clone(), self.profile.clone()),
            "b" => self.play_as(Color::Black, self.me.clone(), self.profile.clone()),
            "fen" => {
                let fen = args.join(" ");
                self.reset_networked_game(Some(fen.as_str()));
            }
            "pgn" => {
                let pgn = args.join(" ");
                self.load_networked_pgn(&pgn)?;
            }
            _ => debug!(command, "Ignoring unknown chat command"),
        }
        Ok(())
    }

    /// Delete every piece-set object. Networked objects can only be
    /// destroyed by their current owner, so ownership transfers first.
    pub fn destroy_my_pieces(&mut self) {
        for id in self.pieces.ids() {
            self.pieces.take_ownership(&id, &self.me);
            if let Some(piece) = self.pieces.remove(&id) {
                self.events.emit(Notification::PieceRemoved {
                    id,
                    color: piece.color(),
                });
            }
        }
    }

    // ---- Host command entry point ----

    pub fn on_host_command(&mut self, command: HostCommand) -> Result<(), ArbiterError> {
        match command {
            HostCommand::PlayAs { color } => {
                self.play_as(color, self.me.clone(), self.profile.clone());
            }
            HostCommand::CopyPgn => self.copy_pgn(),
            HostCommand::CopyFen => self.copy_fen(),
            HostCommand::ResetNetworkedGame { fen } => self.reset_networked_game(fen.as_deref()),
            HostCommand::Chat { command, args } => self.handle_chat_command(&command, &args)?,
            HostCommand::PeerConnected { participant_id } => {
                if self.announce_on_connect {
                    self.announce_current_player(&participant_id);
                }
            }
        }
        Ok(())
    }

    // ---- Interaction polling ----

    /// One poll tick: flush deferred piece announcements, fire due
    /// promotions, then walk every piece's held/released transition.
    pub fn tick(&mut self, now: Instant) {
        self.flush_announcements();
        self.fire_due_promotions(now);
        self.poll_interaction(now);
    }

    fn flush_announcements(&mut self) {
        for id in std::mem::take(&mut self.pending_adds) {
            let Some(piece) = self.pieces.get(&id) else {
                continue;
            };
            self.events.emit(Notification::PieceAdded {
                id: id.clone(),
                kind: piece.kind(),
                color: piece.color(),
                square: piece.last_square(),
                visual: piece.visual().to_string(),
            });
            self.net.broadcast(&NetMessage::AddPiece {
                color: piece.color(),
                id,
                kind: piece.kind(),
                initial_square: piece.initial_square(),
                last_square: piece.last_square(),
            });
        }
    }

    fn fire_due_promotions(&mut self, now: Instant) {
        let mut due = Vec::new();
        self.pending_promotions.retain(|p| {
            if p.due <= now {
                due.push((p.piece.clone(), p.square));
                false
            } else {
                true
            }
        });
        for (piece, square) in due {
            self.promote_piece(&piece, square);
        }
    }

    fn poll_interaction(&mut self, now: Instant) {
        for id in self.pieces.ids() {
            let Some(was_held) = self.pieces.get(&id).map(PieceState::was_held) else {
                continue; // removed by an earlier capture this tick
            };
            if self.interaction.is_held(&id) {
                if self.players.color_of(&self.me).is_none() {
                    // Observers may grab pieces but never commit a move.
                    self.force_back(&id);
                } else {
                    self.on_piece_held(&id);
                }
            } else if was_held {
                let position = self.current_position(&id);
                if self.geometry.is_on_board(position) {
                    self.on_piece_dropped(&id, now);
                } else {
                    self.force_back(&id);
                }
                if let Some(piece) = self.pieces.get_mut(&id) {
                    piece.set_held(false);
                }
            }
        }
    }

    fn current_position(&self, id: &PieceId) -> crate::ports::Vec3 {
        self.interaction.position(id).unwrap_or_else(|| {
            self.pieces
                .get(id)
                .map(|p| p.current_position())
                .unwrap_or_default()
        })
    }

    fn on_piece_held(&mut self, id: &PieceId) {
        let position = self.current_position(id);
        if let Some(piece) = self.pieces.get_mut(id) {
            piece.set_current_position(position);
        }

        let needs_moves = self
            .pieces
            .get(id)
            .map(|p| p.moves().is_empty())
            .unwrap_or(false);
        if needs_moves {
            self.populate_moves(id);
        }

        let Some(piece) = self.pieces.get(id) else {
            return;
        };
        let valid = match self.geometry.square_at(position) {
            Some(square) => piece.moves().contains(&square) || square == piece.last_square(),
            None => false,
        };
        self.events.emit(Notification::Cursor {
            enabled: true,
            valid,
            position: Some(position),
        });
        self.events.emit(Notification::PieceHeld { id: id.clone() });
        if let Some(piece) = self.pieces.get_mut(id) {
            piece.set_held(true);
        }
    }

    /// Snap a piece back onto its last committed square.
    fn force_back(&mut self, id: &PieceId) {
        let Some(square) = self.pieces.get(id).map(PieceState::last_square) else {
            return;
        };
        self.move_piece_to(id, square);
        self.events.emit(Notification::Cursor {
            enabled: false,
            valid: false,
            position: None,
        });
    }

    /// Attempt to commit a drop as a move.
    fn on_piece_dropped(&mut self, id: &PieceId, now: Instant) {
        let Some((last_square, kind)) = self
            .pieces
            .get(id)
            .map(|p| (p.last_square(), p.kind()))
        else {
            return;
        };
        let position = self.current_position(id);
        let Some(destination) = self.geometry.square_at(position) else {
            self.force_back(id);
            return;
        };
        if destination == last_square {
            // Re-dropped on its own origin: snap back locally, nothing to
            // submit or replicate.
            self.place_piece(id, last_square, false);
            self.events.emit(Notification::Cursor {
                enabled: false,
                valid: false,
                position: None,
            });
            return;
        }

        let mut request = MoveRequest {
            from: last_square,
            to: destination,
            promotion: None,
        };
        // No promotion choice is offered: a pawn reaching the back rank
        // always becomes a queen.
        if kind == PieceKind::Pawn
            && (destination.rank() == Rank::First || destination.rank() == Rank::Eighth)
        {
            request.promotion = Some(PieceKind::Queen);
        }

        match self.game.submit(&request) {
            Some(outcome) => {
                self.net.broadcast(&NetMessage::SyncMove {
                    from: request.from,
                    to: request.to,
                    promotion: request.promotion,
                });
                self.do_move(&outcome, id, now);
                self.move_piece_to(id, destination);
                self.events.emit(Notification::PieceMoved { id: id.clone() });
                self.events.emit(Notification::Cursor {
                    enabled: false,
                    valid: false,
                    position: None,
                });
            }
            None => self.force_back(id),
        }
    }

    /// Place a piece on a square's centroid, commit its metadata, announce
    /// and replicate the placement, and refresh its cached legal moves.
    fn move_piece_to(&mut self, id: &PieceId, square: Square) {
        self.place_piece(id, square, true);
    }

    fn place_piece(&mut self, id: &PieceId, square: Square, replicate: bool) {
        let Some((piece_y, color, rotation)) = self.pieces.get(id).map(|p| {
            (
                p.piece_y(),
                p.color(),
                p.rest_rotation(self.config.invert_knights),
            )
        }) else {
            return;
        };
        let position = self.geometry.position_of(square, piece_y);
        if let Some(piece) = self.pieces.get_mut(id) {
            piece.place_at(square, position);
        }
        self.events.emit(Notification::PieceUpdated {
            id: id.clone(),
            color,
            square,
            position,
            rotation,
        });
        if replicate {
            self.net.broadcast(&NetMessage::UpdatePiece {
                id: id.clone(),
                last_square: square,
                color,
            });
        }
        self.populate_moves(id);
    }

    fn populate_moves(&mut self, id: &PieceId) {
        let Some(last_square) = self.pieces.get(id).map(PieceState::last_square) else {
            return;
        };
        let moves = self.game.destinations(last_square);
        if let Some(piece) = self.pieces.get_mut(id) {
            piece.set_moves(moves);
        }
    }

    // ---- Side effects ----

    /// Apply an accepted move's side effects from its engine flags. Castle
    /// rook relocation is trusted from engine legality, not re-validated.
    fn do_move(&mut self, outcome: &MoveOutcome, mover: &PieceId, now: Instant) {
        if outcome.flags.capture {
            self.square_captured(outcome.to);
        }
        if outcome.flags.queenside_castle {
            let (from, to) = match outcome.color {
                Color::Black => (Square::A8, Square::D8),
                Color::White => (Square::A1, Square::D1),
            };
            self.relocate_castle_rook(from, to);
        }
        if outcome.flags.kingside_castle {
            let (from, to) = match outcome.color {
                Color::Black => (Square::H8, Square::F8),
                Color::White => (Square::H1, Square::F1),
            };
            self.relocate_castle_rook(from, to);
        }
        if outcome.flags.en_passant {
            // The captured pawn sits on [destination file, origin rank],
            // not the move's nominal destination.
            let captured = Square::from_coords(outcome.to.file(), outcome.from.rank());
            self.square_captured(captured);
        }
        if outcome.flags.promotion {
            self.pending_promotions.retain(|p| &p.piece != mover);
            self.pending_promotions.push(PendingPromotion {
                piece: mover.clone(),
                square: outcome.to,
                due: now + self.config.promotion_delay,
            });
        }
    }

    fn relocate_castle_rook(&mut self, from: Square, to: Square) {
        let Some(rook) = self.pieces.piece_on(from).map(|p| p.id().clone()) else {
            warn!(%from, "Castle without a rook object on the home square");
            return;
        };
        self.move_piece_to(&rook, to);
    }

    /// Remove the occupant of a captured square: notify the tracked
    /// opponent (unicast), emit piece-died, delete the object.
    fn square_captured(&mut self, square: Square) {
        match &self.opponent {
            Some(opponent) => self
                .net
                .send_to(opponent, &NetMessage::CapturePiece { square }),
            None => warn!(%square, "No tracked opponent for capture notice"),
        }
        let Some(victim) = self.pieces.piece_on(square).map(|p| p.id().clone()) else {
            return;
        };
        self.events.emit(Notification::PieceDied {
            id: victim.clone(),
        });
        self.pieces.remove(&victim);
    }

    /// Destructively replace a promoted pawn with a queen object that keeps
    /// the original's color and initial-square identity.
    fn promote_piece(&mut self, id: &PieceId, square: Square) {
        let Some((color, owner, initial_square)) = self
            .pieces
            .get(id)
            .map(|p| (p.color(), p.owner().clone(), p.initial_square()))
        else {
            return;
        };
        self.net.broadcast(&NetMessage::RemovePiece {
            id: id.clone(),
            color,
        });
        self.events.emit(Notification::PieceRemoved {
            id: id.clone(),
            color,
        });
        self.pieces.remove(id);

        let queen_id = id.promoted();
        let mut queen = self.build_piece(queen_id.clone(), PieceKind::Queen, color, owner, initial_square);
        let resting = self.geometry.position_of(square, queen.piece_y());
        queen.place_at(square, resting);
        self.pieces.upsert(queen);
        self.pending_adds.push(queen_id);
    }

    // ---- Replication ----

    /// Replay an inbound replication message. Handlers are idempotent:
    /// delivery is at-least-once and unordered.
    pub fn on_remote_message(&mut self, from: &ParticipantId, msg: NetMessage, now: Instant) {
        match msg {
            NetMessage::ResetGame { fen } => {
                info!(%from, "Replicated game reset");
                self.reset_game(fen.as_deref());
            }
            NetMessage::SetGameMode { game_mode } => {
                self.mode = game_mode;
                self.events.emit(Notification::GameModeSet { mode: game_mode });
            }
            NetMessage::LoadPgn { pgn } => {
                if let Err(e) = self.load_pgn(&pgn) {
                    warn!(error = %e, "Failed to load replicated PGN");
                }
            }
            NetMessage::SetPlayer {
                color,
                participant_id,
                profile,
                pieces,
            } => {
                if !self.players.claim(color, participant_id.clone(), profile.clone()) {
                    debug!(%color, "Duplicate color claim ignored");
                    return;
                }
                if let Some(pieces) = pieces {
                    self.players.set_pieces(color, pieces);
                }
                if participant_id != self.me && self.players.color_of(&self.me) != Some(color) {
                    self.opponent = Some(participant_id.clone());
                }
                self.events.emit(Notification::PlayerActive {
                    color,
                    participant_id,
                    profile,
                });
            }
            NetMessage::SyncMove {
                from: origin,
                to,
                promotion,
            } => {
                let request = MoveRequest {
                    from: origin,
                    to,
                    promotion,
                };
                let Some(outcome) = self.game.submit(&request) else {
                    warn!(%origin, %to, "Replicated move rejected locally, boards may have diverged");
                    return;
                };
                let Some(mover) = self.pieces.piece_on(origin).map(|p| p.id().clone()) else {
                    warn!(%origin, "Replicated move has no piece object, engine state applied only");
                    return;
                };
                self.do_move(&outcome, &mover, now);
                self.move_piece_to(&mover, to);
                self.events.emit(Notification::PieceMoved { id: mover });
            }
            NetMessage::UpdatePiece {
                id,
                last_square,
                color,
            } => {
                let Some((piece_y, rotation)) = self.pieces.get(&id).map(|p| {
                    (
                        p.piece_y(),
                        p.rest_rotation(self.config.invert_knights),
                    )
                }) else {
                    debug!(%id, "Update for unknown piece");
                    return;
                };
                let position = self.geometry.position_of(last_square, piece_y);
                if let Some(piece) = self.pieces.get_mut(&id) {
                    piece.place_at(last_square, position);
                    piece.clear_moves();
                }
                self.events.emit(Notification::PieceUpdated {
                    id,
                    color,
                    square: last_square,
                    position,
                    rotation,
                });
            }
            NetMessage::AddPiece {
                color,
                id,
                kind,
                initial_square,
                last_square,
            } => {
                let mut piece =
                    self.build_piece(id.clone(), kind, color, from.clone(), initial_square);
                if last_square != initial_square {
                    let position = self.geometry.position_of(last_square, piece.piece_y());
                    piece.place_at(last_square, position);
                }
                let visual = piece.visual().to_string();
                self.pieces.upsert(piece);
                self.events.emit(Notification::PieceAdded {
                    id,
                    kind,
                    color,
                    square: last_square,
                    visual,
                });
            }
            NetMessage::CapturePiece { square } => {
                let Some(victim) = self.pieces.piece_on(square).map(|p| p.id().clone()) else {
                    return;
                };
                self.events.emit(Notification::PieceDied {
                    id: victim.clone(),
                });
                self.pieces.remove(&victim);
            }
            NetMessage::RemovePiece { id, color } => {
                if self.pieces.remove(&id).is_some() {
                    self.events.emit(Notification::PieceRemoved { id, color });
                }
            }
        }
    }

    // ---- Piece construction ----

    fn spawn_piece_set(&mut self, color: Color) -> Vec<PieceId> {
        let mut ids = Vec::with_capacity(16);
        for (kind, square) in initial_layout(color) {
            let id = self.pieces.mint_id(color, kind);
            let piece = self.build_piece(id.clone(), kind, color, self.me.clone(), square);
            self.pieces.upsert(piece);
            self.pending_adds.push(id.clone());
            ids.push(id);
        }
        ids
    }

    fn build_piece(
        &self,
        id: PieceId,
        kind: PieceKind,
        color: Color,
        owner: ParticipantId,
        initial_square: Square,
    ) -> PieceState {
        let piece_y = self.config.piece_height(kind);
        let position = self.geometry.position_of(initial_square, piece_y);
        let visual = format!(
            "{}/{}{}.glb",
            self.config.model_path_prefix,
            color.as_char(),
            kind.as_char()
        );
        PieceState::new(id, kind, color, owner, visual, initial_square, piece_y, position)
    }

    // ---- Cooperative loop ----

    /// Drive the arbiter: one task multiplexing the poll interval, inbound
    /// replication messages and host commands. Returns when both channels
    /// close.
    pub async fn run(
        mut self,
        mut inbound: UnboundedReceiver<(ParticipantId, NetMessage)>,
        mut commands: UnboundedReceiver<HostCommand>,
    ) {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut inbound_open = true;
        let mut commands_open = true;
        while inbound_open || commands_open {
            tokio::select! {
                _ = poll.tick() => self.tick(Instant::now()),
                msg = inbound.recv(), if inbound_open => match msg {
                    Some((from, msg)) => self.on_remote_message(&from, msg, Instant::now()),
                    None => inbound_open = false,
                },
                cmd = commands.recv(), if commands_open => match cmd {
                    Some(cmd) => {
                        if let Err(e) = self.on_host_command(cmd) {
                            warn!(error = %e, "Host command failed");
                        }
                    }
                    None => commands_open = false,
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    use crate::channel::LocalRoom;
    use crate::events::ChannelSink;
    use crate::geometry::PlanarBoard;
    use crate::ports::{GeometryMapper, Vec3};
    use crate::testing::ScriptedHands;

    struct Harness {
        arbiter: Arbiter,
        hands: ScriptedHands,
        board: PlanarBoard,
        notifications: UnboundedReceiver<Notification>,
        observer_rx: UnboundedReceiver<(ParticipantId, NetMessage)>,
        _inbound_rx: UnboundedReceiver<(ParticipantId, NetMessage)>,
    }

    fn harness() -> Harness {
        let room = LocalRoom::new();
        let (net, inbound_rx) = room.join("alice".into());
        let (_observer_net, observer_rx) = room.join("observer".into());
        let board = PlanarBoard::new(Vec3::default(), 0.25);
        let hands = ScriptedHands::new();
        let (tx, notifications) = unbounded_channel();
        let arbiter = Arbiter::new(
            "alice".into(),
            Profile::new("Alice"),
            ArbiterConfig::default(),
            Arc::new(board.clone()),
            Arc::new(hands.clone()),
            Arc::new(net),
            Arc::new(ChannelSink::new(tx)),
        );
        Harness {
            arbiter,
            hands,
            board,
            notifications,
            observer_rx,
            _inbound_rx: inbound_rx,
        }
    }

    fn sq(s: &str) -> Square {
        s.parse().unwrap()
    }

    fn drain_net(rx: &mut UnboundedReceiver<(ParticipantId, NetMessage)>) -> Vec<NetMessage> {
        let mut out = Vec::new();
        while let Ok((_, msg)) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn drain_notifications(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    fn add_remote_pawn(h: &mut Harness, id: &str, initial: &str, last: &str, now: Instant) {
        h.arbiter.on_remote_message(
            &"bob".into(),
            NetMessage::AddPiece {
                color: Color::White,
                id: id.into(),
                kind: PieceKind::Pawn,
                initial_square: sq(initial),
                last_square: sq(last),
            },
            now,
        );
    }

    #[test]
    fn test_chat_shorthand_claims_color_and_spawns_set() {
        let mut h = harness();
        h.arbiter.handle_chat_command("w", &[]).unwrap();

        let slot = h.arbiter.players().occupant(Color::White).unwrap();
        assert_eq!(slot.participant_id, "alice".into());
        assert_eq!(slot.pieces.len(), 16);
        assert_eq!(h.arbiter.pieces().len(), 16);

        // The claim broadcasts immediately; piece announcements are deferred
        // to the next tick.
        let msgs = drain_net(&mut h.observer_rx);
        assert_eq!(
            msgs.iter()
                .filter(|m| matches!(m, NetMessage::SetPlayer { .. }))
                .count(),
            1
        );
        assert!(!msgs.iter().any(|m| matches!(m, NetMessage::AddPiece { .. })));

        h.arbiter.tick(Instant::now());
        let msgs = drain_net(&mut h.observer_rx);
        assert_eq!(
            msgs.iter()
                .filter(|m| matches!(m, NetMessage::AddPiece { .. }))
                .count(),
            16
        );

        let notes = drain_notifications(&mut h.notifications);
        assert!(notes.contains(&Notification::SpawnAt {
            color: Some(Color::White)
        }));
    }

    #[test]
    fn test_occupied_color_claim_is_a_noop() {
        let mut h = harness();
        let now = Instant::now();
        h.arbiter.on_remote_message(
            &"bob".into(),
            NetMessage::SetPlayer {
                color: Color::White,
                participant_id: "bob".into(),
                profile: Profile::new("Bob"),
                pieces: None,
            },
            now,
        );
        drain_net(&mut h.observer_rx);
        drain_notifications(&mut h.notifications);

        h.arbiter
            .on_host_command(HostCommand::PlayAs { color: Color::White })
            .unwrap();

        assert!(drain_net(&mut h.observer_rx).is_empty());
        assert!(h.arbiter.pieces().is_empty());
        let slot = h.arbiter.players().occupant(Color::White).unwrap();
        assert_eq!(slot.participant_id, "bob".into());
    }

    #[test]
    fn test_unknown_chat_command_is_ignored() {
        let mut h = harness();
        h.arbiter
            .handle_chat_command("dance", &["party".to_string()])
            .unwrap();
        assert!(drain_net(&mut h.observer_rx).is_empty());
        assert!(drain_notifications(&mut h.notifications).is_empty());
    }

    #[test]
    fn test_promotion_replaces_pawn_after_delay() {
        let mut h = harness();
        let now = Instant::now();
        h.arbiter.handle_chat_command("w", &[]).unwrap();
        h.arbiter.tick(now);
        h.arbiter
            .start_game(Some("8/4P2k/8/8/8/8/8/4K3 w - - 0 1"))
            .unwrap();
        add_remote_pawn(&mut h, "w-p-77", "e2", "e7", now);
        drain_net(&mut h.observer_rx);

        let pawn: PieceId = "w-p-77".into();
        h.hands.grab(&pawn);
        h.hands.drag_to(&pawn, h.board.position_of(sq("e8"), 0.6));
        h.arbiter.tick(now);
        h.hands.release(&pawn);
        h.arbiter.tick(now);

        let msgs = drain_net(&mut h.observer_rx);
        assert!(msgs.contains(&NetMessage::SyncMove {
            from: sq("e7"),
            to: sq("e8"),
            promotion: Some(PieceKind::Queen),
        }));

        // Still a pawn before the delay elapses
        h.arbiter.tick(now + Duration::from_millis(100));
        assert!(h.arbiter.pieces().get(&pawn).is_some());

        // After the delay the pawn object is gone and a queen took over,
        // keeping the original color and initial square
        h.arbiter.tick(now + Duration::from_millis(800));
        assert!(h.arbiter.pieces().get(&pawn).is_none());
        let queen = h.arbiter.pieces().get(&pawn.promoted()).unwrap();
        assert_eq!(queen.kind(), PieceKind::Queen);
        assert_eq!(queen.color(), Color::White);
        assert_eq!(queen.last_square(), sq("e8"));
        assert_eq!(queen.initial_square(), sq("e2"));

        let msgs = drain_net(&mut h.observer_rx);
        assert!(msgs.contains(&NetMessage::RemovePiece {
            id: pawn.clone(),
            color: Color::White,
        }));

        // The replacement announcement flushes on the following tick
        h.arbiter.tick(now + Duration::from_millis(900));
        let msgs = drain_net(&mut h.observer_rx);
        assert!(msgs.contains(&NetMessage::AddPiece {
            color: Color::White,
            id: pawn.promoted(),
            kind: PieceKind::Queen,
            initial_square: sq("e2"),
            last_square: sq("e8"),
        }));
    }

    #[test]
    fn test_reset_cancels_pending_promotion() {
        let mut h = harness();
        let now = Instant::now();
        h.arbiter.handle_chat_command("w", &[]).unwrap();
        h.arbiter.tick(now);
        h.arbiter
            .start_game(Some("8/4P2k/8/8/8/8/8/4K3 w - - 0 1"))
            .unwrap();
        add_remote_pawn(&mut h, "w-p-77", "e2", "e7", now);

        let pawn: PieceId = "w-p-77".into();
        h.hands.grab(&pawn);
        h.hands.drag_to(&pawn, h.board.position_of(sq("e8"), 0.6));
        h.arbiter.tick(now);
        h.hands.release(&pawn);
        h.arbiter.tick(now);

        h.arbiter.reset_game(None);
        h.arbiter.tick(now + Duration::from_millis(800));

        // No stale queen materialized onto the fresh board
        assert!(h.arbiter.pieces().is_empty());
    }

    #[test]
    fn test_observer_grab_is_forced_back() {
        let mut h = harness();
        let now = Instant::now();
        add_remote_pawn(&mut h, "w-p-9", "e2", "e2", now);
        drain_net(&mut h.observer_rx);

        let pawn: PieceId = "w-p-9".into();
        h.hands.grab(&pawn);
        h.hands.drag_to(&pawn, h.board.position_of(sq("e4"), 0.6));
        h.arbiter.tick(now);
        h.hands.release(&pawn);
        h.arbiter.tick(now);

        let piece = h.arbiter.pieces().get(&pawn).unwrap();
        assert_eq!(piece.last_square(), sq("e2"));
        let msgs = drain_net(&mut h.observer_rx);
        assert!(!msgs.iter().any(|m| matches!(m, NetMessage::SyncMove { .. })));
    }

    #[test]
    fn test_destroy_my_pieces_takes_ownership_first() {
        let mut h = harness();
        let now = Instant::now();
        h.arbiter.handle_chat_command("w", &[]).unwrap();
        add_remote_pawn(&mut h, "b-p-1", "e7", "e7", now);
        assert_eq!(h.arbiter.pieces().len(), 17);

        h.arbiter.destroy_my_pieces();
        assert!(h.arbiter.pieces().is_empty());
    }

    #[test]
    fn test_late_joiner_gets_player_announcement() {
        let mut h = harness();
        h.arbiter.handle_chat_command("w", &[]).unwrap();
        h.arbiter.tick(Instant::now());
        drain_net(&mut h.observer_rx);

        h.arbiter
            .on_host_command(HostCommand::PeerConnected {
                participant_id: "observer".into(),
            })
            .unwrap();

        let msgs = drain_net(&mut h.observer_rx);
        match msgs.as_slice() {
            [NetMessage::SetPlayer {
                color,
                participant_id,
                pieces: Some(pieces),
                ..
            }] => {
                assert_eq!(*color, Color::White);
                assert_eq!(participant_id, &"alice".into());
                assert_eq!(pieces.len(), 16);
            }
            other => panic!("expected one set-player unicast, got {other:?}"),
        }
    }

    #[test]
    fn test_no_announcement_after_reset() {
        let mut h = harness();
        h.arbiter.handle_chat_command("w", &[]).unwrap();
        h.arbiter.reset_game(None);
        drain_net(&mut h.observer_rx);

        h.arbiter
            .on_host_command(HostCommand::PeerConnected {
                participant_id: "observer".into(),
            })
            .unwrap();
        assert!(drain_net(&mut h.observer_rx).is_empty());
    }
}
