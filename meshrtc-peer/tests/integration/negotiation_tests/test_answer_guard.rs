use meshrtc_core::{IceCandidate, OutgoingKind, PeerId, SignalMessage};
use meshrtc_peer::{SdpKind, SessionState};

use crate::utils::{TestPeer, TransportOp, init_tracing, wait_for};

fn answer(sdp: &str) -> SignalMessage {
    SignalMessage::Answer {
        sdp: sdp.to_owned(),
        media_kind: OutgoingKind::Camera,
    }
}

fn remote_answers(peer: &TestPeer, remote: &str) -> usize {
    peer.transports.count(remote, |op| {
        *op == TransportOp::RemoteDescription(SdpKind::Answer)
    })
}

#[tokio::test]
async fn test_duplicate_answer_is_dropped() {
    init_tracing();

    let alice = TestPeer::spawn("alice", None);
    let bob = PeerId::from("bob");

    alice.joined("bob").await;
    wait_for("offer to bob", || {
        alice
            .signaling
            .log()
            .between("alice", "bob")
            .iter()
            .any(|m| matches!(m, SignalMessage::Offer { .. }))
    })
    .await;

    alice.handle.signal_message(bob.clone(), answer("first")).await.unwrap();
    alice.handle.signal_message(bob.clone(), answer("second")).await.unwrap();
    alice.wait_for_state("bob", SessionState::Connecting).await;

    alice
        .handle
        .signal_message(
            bob.clone(),
            SignalMessage::Candidate {
                candidate: IceCandidate::new("candidate:bob"),
            },
        )
        .await
        .unwrap();
    alice.wait_for_state("bob", SessionState::Connected).await;

    alice.handle.signal_message(bob.clone(), answer("late")).await.unwrap();
    // Round trip so the late answer has been handled.
    let status = alice.handle.peer(bob).await.unwrap().unwrap();

    assert_eq!(status.state, SessionState::Connected);
    assert_eq!(remote_answers(&alice, "bob"), 1);
    assert!(alice.transports.violations().is_empty());
}

#[tokio::test]
async fn test_answer_to_answering_side_is_dropped() {
    init_tracing();

    let alice = TestPeer::spawn("alice", None);
    let carol = PeerId::from("carol");

    alice
        .handle
        .signal_message(
            carol.clone(),
            SignalMessage::Offer {
                sdp: "offer-carol".to_owned(),
                media_kind: OutgoingKind::Camera,
            },
        )
        .await
        .unwrap();
    alice.wait_for_state("carol", SessionState::Connecting).await;

    alice.handle.signal_message(carol.clone(), answer("bogus")).await.unwrap();
    // Answer from a peer without any session.
    alice
        .handle
        .signal_message(PeerId::from("dave"), answer("stray"))
        .await
        .unwrap();

    let peers = alice.handle.peers().await.unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].peer_id, carol);
    assert_eq!(peers[0].state, SessionState::Connecting);
    assert_eq!(remote_answers(&alice, "carol"), 0);
    assert_eq!(alice.transports.connections_for("dave"), 0);
}

#[tokio::test]
async fn test_repeated_offer_keeps_running_session() {
    init_tracing();

    let alice = TestPeer::spawn("alice", None);
    let carol = PeerId::from("carol");
    let offer = SignalMessage::Offer {
        sdp: "offer-carol".to_owned(),
        media_kind: OutgoingKind::Camera,
    };

    alice.handle.signal_message(carol.clone(), offer.clone()).await.unwrap();
    alice.wait_for_state("carol", SessionState::Connecting).await;
    let before = alice.handle.view().peer(&carol).unwrap().session_id;

    alice.handle.signal_message(carol.clone(), offer).await.unwrap();
    let after = alice.handle.peer(carol).await.unwrap().unwrap();

    assert_eq!(after.session_id, before);
    assert_eq!(alice.transports.connections_for("carol"), 1);
    assert!(alice.transports.violations().is_empty());
}
