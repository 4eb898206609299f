//! In-process loopback transport.
//!
//! `LocalRoom` fans messages out between participants in one process — the
//! transport used by the sim binary and the integration tests. Real hosts
//! bring their own `NetworkChannel`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::warn;

use crate::ports::NetworkChannel;
use crate::protocol::NetMessage;
use crate::session::ParticipantId;

type Inbound = (ParticipantId, NetMessage);

#[derive(Default)]
pub struct LocalRoom {
    peers: Mutex<HashMap<ParticipantId, UnboundedSender<Inbound>>>,
}

impl LocalRoom {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Join the room: returns this participant's outbound channel and the
    /// receiver their messages arrive on.
    pub fn join(
        self: &Arc<Self>,
        me: ParticipantId,
    ) -> (RoomChannel, UnboundedReceiver<Inbound>) {
        let (tx, rx) = unbounded_channel();
        self.peers.lock().unwrap().insert(me.clone(), tx);
        (
            RoomChannel {
                me,
                room: Arc::clone(self),
            },
            rx,
        )
    }

    fn deliver(&self, from: &ParticipantId, to: Option<&ParticipantId>, msg: &NetMessage) {
        // Messages cross the room as their JSON wire form, the same encoding
        // a real transport carries.
        let encoded = match serde_json::to_string(msg) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Dropping unencodable message");
                return;
            }
        };
        let peers = self.peers.lock().unwrap();
        match to {
            Some(peer) => {
                let Some(tx) = peers.get(peer) else {
                    warn!(%peer, "Dropping message to unknown peer");
                    return;
                };
                Self::push(from, tx, &encoded);
            }
            None => {
                for (peer, tx) in peers.iter() {
                    if peer != from {
                        Self::push(from, tx, &encoded);
                    }
                }
            }
        }
    }

    fn push(from: &ParticipantId, tx: &UnboundedSender<Inbound>, encoded: &str) {
        match serde_json::from_str::<NetMessage>(encoded) {
            Ok(decoded) => {
                let _ = tx.send((from.clone(), decoded));
            }
            Err(e) => warn!(error = %e, "Dropping undecodable message"),
        }
    }
}

/// One participant's handle on a `LocalRoom`.
#[derive(Clone)]
pub struct RoomChannel {
    me: ParticipantId,
    room: Arc<LocalRoom>,
}

impl NetworkChannel for RoomChannel {
    fn broadcast(&self, msg: &NetMessage) {
        self.room.deliver(&self.me, None, msg);
    }

    fn send_to(&self, peer: &ParticipantId, msg: &NetMessage) {
        self.room.deliver(&self.me, Some(peer), msg);
    }
}
