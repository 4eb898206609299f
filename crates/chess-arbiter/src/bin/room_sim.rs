//! Two-peer room simulation over the in-process loopback transport.
//!
//! Spawns two arbiters, claims both colors, plays a short opening through
//! the scripted-hands interaction source, exports the PGN and resets the
//! room — logging the replication traffic along the way.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chess_arbiter::channel::LocalRoom;
use chess_arbiter::events::ChannelSink;
use chess_arbiter::geometry::PlanarBoard;
use chess_arbiter::testing::ScriptedHands;
use chess_arbiter::{
    Arbiter, ArbiterConfig, GeometryMapper, HostCommand, Notification, PieceId, Profile, Vec3,
};
use chess_match::Color;
use shakmaty::Square;

struct Peer {
    name: &'static str,
    commands: UnboundedSender<HostCommand>,
    notifications: UnboundedReceiver<Notification>,
    hands: ScriptedHands,
    /// Last known resting square of every piece object, from notifications.
    by_square: HashMap<Square, PieceId>,
    handle: tokio::task::JoinHandle<()>,
}

impl Peer {
    fn spawn(room: &Arc<LocalRoom>, name: &'static str, board: &PlanarBoard) -> Peer {
        let (net, inbound) = room.join(name.into());
        let (commands, command_rx) = unbounded_channel();
        let (note_tx, notifications) = unbounded_channel();
        let hands = ScriptedHands::new();
        let config = ArbiterConfig {
            poll_interval: Duration::from_millis(50),
            promotion_delay: Duration::from_millis(200),
            ..ArbiterConfig::from_env()
        };
        let arbiter = Arbiter::new(
            name.into(),
            Profile::new(name),
            config,
            Arc::new(board.clone()),
            Arc::new(hands.clone()),
            Arc::new(net),
            Arc::new(ChannelSink::new(note_tx)),
        );
        let handle = tokio::spawn(arbiter.run(inbound, command_rx));
        Peer {
            name,
            commands,
            notifications,
            hands,
            by_square: HashMap::new(),
            handle,
        }
    }

    /// Drain notifications, keeping the square→piece map current.
    fn pump(&mut self) {
        while let Ok(note) = self.notifications.try_recv() {
            match note {
                Notification::PieceAdded { id, square, .. } => {
                    self.by_square.insert(square, id);
                }
                Notification::PieceUpdated { id, square, .. } => {
                    self.by_square.retain(|_, v| v != &id);
                    self.by_square.insert(square, id);
                }
                Notification::PieceRemoved { id, .. } | Notification::PieceDied { id } => {
                    self.by_square.retain(|_, v| v != &id);
                }
                Notification::PieceMoved { id } => {
                    info!(peer = self.name, %id, "Piece moved");
                }
                Notification::PgnReady { pgn } => {
                    info!(peer = self.name, %pgn, "PGN exported");
                }
                Notification::GameReset => {
                    info!(peer = self.name, "Game reset");
                }
                _ => {}
            }
        }
    }

    /// Pick up the piece resting on `from`, carry it to `to`, release it,
    /// and give the poll a couple of intervals to commit the drop.
    async fn drag(&mut self, board: &PlanarBoard, from: &str, to: &str) -> Result<()> {
        self.pump();
        let from_square: Square = from.parse()?;
        let id = self
            .by_square
            .get(&from_square)
            .cloned()
            .with_context(|| format!("no piece object on {from}"))?;
        self.hands.grab(&id);
        self.hands
            .drag_to(&id, board.position_of(to.parse()?, 0.6));
        tokio::time::sleep(Duration::from_millis(120)).await;
        self.hands.release(&id);
        tokio::time::sleep(Duration::from_millis(120)).await;
        self.pump();
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let room = LocalRoom::new();
    let board = PlanarBoard::new(Vec3::default(), 0.25);

    let mut alice = Peer::spawn(&room, "alice", &board);
    let mut bob = Peer::spawn(&room, "bob", &board);

    info!("Claiming colors");
    alice.commands.send(HostCommand::PlayAs {
        color: Color::White,
    })?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    bob.commands.send(HostCommand::PlayAs {
        color: Color::Black,
    })?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    info!("Playing an opening");
    alice.drag(&board, "e2", "e4").await?;
    bob.drag(&board, "e7", "e5").await?;
    alice.drag(&board, "g1", "f3").await?;
    bob.drag(&board, "b8", "c6").await?;

    alice.commands.send(HostCommand::CopyPgn)?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    alice.pump();

    info!("Resetting the room");
    alice
        .commands
        .send(HostCommand::ResetNetworkedGame { fen: None })?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    alice.pump();
    bob.pump();

    info!("Simulation complete");
    alice.handle.abort();
    bob.handle.abort();
    Ok(())
}
