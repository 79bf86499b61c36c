use meshrtc_core::{PeerId, SignalMessage};
use meshrtc_peer::{Role, SdpKind, SessionEvent, SessionState};

use crate::utils::{SignalRouter, TestPeer, TransportOp, init_tracing, next_event};

fn state_changed(event: &SessionEvent, expected: SessionState) -> bool {
    matches!(event, SessionEvent::PeerStateChanged { state, .. } if *state == expected)
}

#[tokio::test]
async fn test_joining_peer_is_offered_and_both_connect() {
    init_tracing();

    let router = SignalRouter::new();
    let alice = TestPeer::spawn("alice", Some(&router));
    let bob = TestPeer::spawn("bob", Some(&router));
    let mut alice_events = alice.handle.subscribe();
    let mut bob_events = bob.handle.subscribe();

    alice.joined("bob").await;

    next_event(&mut alice_events, |e| state_changed(e, SessionState::Offering)).await;
    next_event(&mut bob_events, |e| state_changed(e, SessionState::Answering)).await;
    next_event(&mut bob_events, |e| state_changed(e, SessionState::Connecting)).await;
    next_event(&mut alice_events, |e| state_changed(e, SessionState::Connecting)).await;
    next_event(&mut alice_events, |e| matches!(e, SessionEvent::PeerConnected { .. })).await;
    next_event(&mut bob_events, |e| matches!(e, SessionEvent::PeerConnected { .. })).await;

    alice.wait_for_state("bob", SessionState::Connected).await;
    bob.wait_for_state("alice", SessionState::Connected).await;

    let alice_view = alice.handle.view().peer(&PeerId::from("bob")).unwrap();
    let bob_view = bob.handle.view().peer(&PeerId::from("alice")).unwrap();
    assert_eq!(alice_view.role, Role::Initiator);
    assert_eq!(bob_view.role, Role::Responder);
    assert_eq!(alice.handle.connected_count().await.unwrap(), 1);
    assert_eq!(bob.handle.view().connected_count(), 1);

    // Local candidates only follow the description they belong to.
    let to_bob = router.log().between("alice", "bob");
    assert!(matches!(to_bob[0], SignalMessage::Offer { .. }));
    assert!(matches!(to_bob[1], SignalMessage::Candidate { .. }));
    assert!(matches!(to_bob[2], SignalMessage::Candidate { .. }));
    let to_alice = router.log().between("bob", "alice");
    assert!(matches!(to_alice[0], SignalMessage::Answer { .. }));
    assert!(matches!(to_alice[1], SignalMessage::Candidate { .. }));
    assert!(matches!(to_alice[2], SignalMessage::Candidate { .. }));

    assert_eq!(
        alice.transports.ops_for("bob"),
        vec![
            TransportOp::Attach {
                audio: None,
                video: None
            },
            TransportOp::CreateOffer,
            TransportOp::RemoteDescription(SdpKind::Answer),
            TransportOp::Candidate("bob/c2/0".to_owned()),
            TransportOp::Candidate("bob/c2/1".to_owned()),
        ]
    );
    assert_eq!(
        bob.transports.ops_for("alice"),
        vec![
            TransportOp::Attach {
                audio: None,
                video: None
            },
            TransportOp::RemoteDescription(SdpKind::Offer),
            TransportOp::CreateAnswer,
            TransportOp::Candidate("alice/c2/0".to_owned()),
            TransportOp::Candidate("alice/c2/1".to_owned()),
        ]
    );

    assert!(alice.transports.violations().is_empty());
    assert!(bob.transports.violations().is_empty());
    assert_eq!(alice_view.last_error, None);
}

#[tokio::test]
async fn test_local_tracks_attached_on_creation() {
    init_tracing();

    let router = SignalRouter::new();
    let alice = TestPeer::spawn("alice", Some(&router)).with_camera().await;
    let bob = TestPeer::spawn("bob", Some(&router));

    crate::utils::connect(&alice, &bob).await;

    let camera = alice.capture.last_camera().unwrap();
    assert_eq!(
        alice.transports.ops_for("bob")[0],
        TransportOp::Attach {
            audio: camera.audio.as_ref().map(|t| t.id().to_owned()),
            video: camera.video.as_ref().map(|t| t.id().to_owned()),
        }
    );
    // Nothing to catch up on.
    assert_eq!(
        alice
            .transports
            .count("bob", |op| matches!(op, TransportOp::Replace { .. })),
        0
    );
}
