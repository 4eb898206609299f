//! Forced-queen promotion: delayed destructive replacement, replicated to
//! the peer, converging on the same derived queen id.

mod common;

use std::time::Duration;

use common::*;

use chess_arbiter::channel::LocalRoom;
use chess_arbiter::{HostCommand, NetMessage, PieceId};
use chess_match::{Color, PieceKind};
use tokio::time::Instant;

const PROMOTION_FEN: &str = "8/4P2k/8/8/8/8/8/4K3 w - - 0 1";

#[test]
fn test_promotion_scenario_across_peers() {
    let room = LocalRoom::new();
    let mut alice = join(&room, "alice");
    let mut bob = join(&room, "bob");
    let now = Instant::now();

    // Seed the room from the FEN, then claim white
    alice.arbiter.reset_networked_game(Some(PROMOTION_FEN));
    bob.deliver(now);
    alice
        .arbiter
        .on_host_command(HostCommand::PlayAs {
            color: Color::White,
        })
        .unwrap();
    alice.arbiter.tick(now);
    bob.deliver(now);

    // The pawn object about to promote, replicated to both sides
    let pawn: PieceId = "w-p-99".into();
    let add = NetMessage::AddPiece {
        color: Color::White,
        id: pawn.clone(),
        kind: PieceKind::Pawn,
        initial_square: sq("e2"),
        last_square: sq("e7"),
    };
    alice
        .arbiter
        .on_remote_message(&"bob".into(), add.clone(), now);
    bob.arbiter.on_remote_message(&"alice".into(), add, now);
    bob.discard_inbound();

    // e7 pawn dropped on the empty e8: accepted with forced queen promotion
    alice.drag("e7", "e8", now);
    let delivered = bob.deliver(now);
    assert!(delivered.contains(&NetMessage::SyncMove {
        from: sq("e7"),
        to: sq("e8"),
        promotion: Some(PieceKind::Queen),
    }));

    // Before the configured delay both sides still hold the pawn object
    assert!(alice.arbiter.pieces().get(&pawn).is_some());
    assert!(bob.arbiter.pieces().get(&pawn).is_some());

    // After the delay the pawn is destructively replaced on both sides
    let later = now + Duration::from_millis(800);
    alice.arbiter.tick(later);
    bob.arbiter.tick(later);
    for (name, peer) in [("alice", &alice), ("bob", &bob)] {
        assert!(peer.arbiter.pieces().get(&pawn).is_none(), "{name}");
        let queen = peer
            .arbiter
            .pieces()
            .get(&pawn.promoted())
            .unwrap_or_else(|| panic!("{name}: no queen object"));
        assert_eq!(queen.kind(), PieceKind::Queen, "{name}");
        assert_eq!(queen.color(), Color::White, "{name}");
        assert_eq!(queen.last_square(), sq("e8"), "{name}");
        // Bookkeeping identity survives the replacement
        assert_eq!(queen.initial_square(), sq("e2"), "{name}");
    }

    // Both peers announce the same derived queen id; the duplicate
    // broadcasts collapse via upsert instead of duplicating the object
    let flush = later + Duration::from_millis(50);
    alice.arbiter.tick(flush);
    bob.arbiter.tick(flush);
    let alice_count = alice.arbiter.pieces().len();
    alice.deliver(flush);
    bob.deliver(flush);
    assert_eq!(alice.arbiter.pieces().len(), alice_count);
    assert_eq!(
        alice.arbiter.pieces().piece_on(sq("e8")).unwrap().id(),
        &pawn.promoted()
    );
    assert_eq!(
        bob.arbiter.pieces().piece_on(sq("e8")).unwrap().id(),
        &pawn.promoted()
    );
}

#[test]
fn test_promotion_with_capture_keeps_nominal_destination() {
    let room = LocalRoom::new();
    let mut peer = join(&room, "alice");
    let now = Instant::now();

    // White pawn on b7 can capture the rook on a8 and promote
    peer.arbiter
        .start_game(Some("r3k3/1P6/8/8/8/8/8/4K3 w - - 0 1"))
        .unwrap();
    for (kind, color, id, square) in [
        (PieceKind::Pawn, Color::White, "wp", "b7"),
        (PieceKind::Rook, Color::Black, "br", "a8"),
    ] {
        peer.arbiter.on_remote_message(
            &"bob".into(),
            NetMessage::AddPiece {
                color,
                id: id.into(),
                kind,
                initial_square: sq(square),
                last_square: sq(square),
            },
            now,
        );
    }

    peer.arbiter.on_remote_message(
        &"bob".into(),
        NetMessage::SyncMove {
            from: sq("b7"),
            to: sq("a8"),
            promotion: Some(PieceKind::Queen),
        },
        now,
    );

    // The rook is captured immediately; the pawn is replaced after the delay
    assert!(peer.arbiter.pieces().get(&"br".into()).is_none());
    assert!(peer.arbiter.pieces().get(&"wp".into()).is_some());

    peer.arbiter.tick(now + Duration::from_millis(800));
    assert!(peer.arbiter.pieces().get(&"wp".into()).is_none());
    let queen = peer
        .arbiter
        .pieces()
        .piece_on(sq("a8"))
        .expect("promoted queen on a8");
    assert_eq!(queen.id(), &PieceId::from("wp").promoted());
    assert_eq!(queen.kind(), PieceKind::Queen);
}
