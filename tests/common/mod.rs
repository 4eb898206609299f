use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::Instant;

use chess_arbiter::channel::LocalRoom;
use chess_arbiter::events::ChannelSink;
use chess_arbiter::geometry::PlanarBoard;
use chess_arbiter::testing::ScriptedHands;
use chess_arbiter::{
    Arbiter, ArbiterConfig, GeometryMapper, HostCommand, NetMessage, Notification, ParticipantId,
    Profile, Vec3,
};
use chess_match::Color;
use shakmaty::Square;

pub const SQUARE_SIZE: f32 = 0.25;
pub const PIECE_DROP_HEIGHT: f32 = 0.6;

/// One participant: an arbiter plus the host-side ends of its ports.
pub struct Peer {
    pub arbiter: Arbiter,
    pub hands: ScriptedHands,
    pub inbound: UnboundedReceiver<(ParticipantId, NetMessage)>,
    pub notifications: UnboundedReceiver<Notification>,
}

pub fn board() -> PlanarBoard {
    PlanarBoard::new(Vec3::default(), SQUARE_SIZE)
}

pub fn sq(s: &str) -> Square {
    s.parse().unwrap()
}

pub fn join(room: &Arc<LocalRoom>, name: &str) -> Peer {
    let (net, inbound) = room.join(name.into());
    let (note_tx, notifications) = unbounded_channel();
    let hands = ScriptedHands::new();
    let arbiter = Arbiter::new(
        name.into(),
        Profile::new(name),
        ArbiterConfig::default(),
        Arc::new(board()),
        Arc::new(hands.clone()),
        Arc::new(net),
        Arc::new(ChannelSink::new(note_tx)),
    );
    Peer {
        arbiter,
        hands,
        inbound,
        notifications,
    }
}

/// A room with both colors claimed and every piece set replicated to both
/// sides: alice plays white, bob plays black.
pub fn two_player_room() -> (Peer, Peer, Instant) {
    let room = LocalRoom::new();
    let mut alice = join(&room, "alice");
    let mut bob = join(&room, "bob");
    let now = Instant::now();

    alice
        .arbiter
        .on_host_command(HostCommand::PlayAs {
            color: Color::White,
        })
        .unwrap();
    alice.arbiter.tick(now);
    bob.deliver(now);

    bob.arbiter
        .on_host_command(HostCommand::PlayAs {
            color: Color::Black,
        })
        .unwrap();
    bob.arbiter.tick(now);
    alice.deliver(now);

    (alice, bob, now)
}

impl Peer {
    /// Apply every queued inbound message, returning what was delivered.
    pub fn deliver(&mut self, now: Instant) -> Vec<NetMessage> {
        let mut delivered = Vec::new();
        while let Ok((from, msg)) = self.inbound.try_recv() {
            delivered.push(msg.clone());
            self.arbiter.on_remote_message(&from, msg, now);
        }
        delivered
    }

    /// Drop every queued inbound message without applying it.
    pub fn discard_inbound(&mut self) -> Vec<NetMessage> {
        let mut discarded = Vec::new();
        while let Ok((_, msg)) = self.inbound.try_recv() {
            discarded.push(msg);
        }
        discarded
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            out.push(n);
        }
        out
    }

    /// Grab the piece resting on `from`, carry it over `to`, release it.
    /// Runs the poll ticks a real host interval would.
    pub fn drag(&mut self, from: &str, to: &str, now: Instant) {
        let target = board().position_of(sq(to), PIECE_DROP_HEIGHT);
        self.drag_to_position(from, target, now);
    }

    /// Same as `drag`, but to an arbitrary scene position.
    pub fn drag_to_position(&mut self, from: &str, target: Vec3, now: Instant) {
        let id = self
            .arbiter
            .pieces()
            .piece_on(sq(from))
            .unwrap_or_else(|| panic!("no piece object on {from}"))
            .id()
            .clone();
        self.hands.grab(&id);
        self.hands.drag_to(&id, target);
        self.arbiter.tick(now);
        self.hands.release(&id);
        self.arbiter.tick(now);
    }
}
