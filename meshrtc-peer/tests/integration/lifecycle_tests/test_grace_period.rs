use meshrtc_core::{PeerId, SignalMessage};
use meshrtc_peer::{
    CloseReason, LinkState, OrchestratorConfig, OrchestratorError, SessionEvent, SessionState,
    TransportEvent,
};
use std::time::Duration;

use crate::utils::{
    MockTransportFactory, SignalRouter, TestPeer, connect, init_tracing, next_event,
};

async fn lose_path(peer: &TestPeer, remote: &str) {
    peer.transports
        .emit(remote, TransportEvent::StateChanged(LinkState::Disconnected))
        .await;
    peer.wait_for_state(remote, SessionState::Disconnected).await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnected_session_closes_after_grace_period() {
    init_tracing();

    let router = SignalRouter::new();
    let alice = TestPeer::spawn("alice", Some(&router));
    let bob = TestPeer::spawn("bob", Some(&router));
    connect(&alice, &bob).await;
    let mut events = alice.handle.subscribe();

    lose_path(&alice, "bob").await;
    next_event(&mut events, |e| matches!(e, SessionEvent::PeerDisconnected { .. })).await;
    let status = alice.handle.view().peer(&PeerId::from("bob")).unwrap();
    assert!(status.last_error.unwrap().contains("connectivity lost"));
    assert_eq!(alice.handle.view().connected_count(), 0);

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(alice.state_of("bob"), Some(SessionState::Disconnected));

    tokio::time::sleep(Duration::from_millis(200)).await;
    alice.wait_for_gone("bob").await;

    let error = next_event(&mut events, |e| matches!(e, SessionEvent::Error { .. })).await;
    assert!(matches!(
        error,
        SessionEvent::Error {
            peer_id: Some(_),
            error: OrchestratorError::SessionFailed { .. }
        }
    ));
    let closed = next_event(&mut events, |e| matches!(e, SessionEvent::PeerClosed { .. })).await;
    let SessionEvent::PeerClosed { reason, .. } = closed else {
        unreachable!()
    };
    assert_eq!(reason, CloseReason::GraceExpired);
    assert!(alice.sink.detached("bob"));
}

#[tokio::test(start_paused = true)]
async fn test_recovery_cancels_grace_timer() {
    init_tracing();

    let router = SignalRouter::new();
    let alice = TestPeer::spawn("alice", Some(&router));
    let bob = TestPeer::spawn("bob", Some(&router));
    connect(&alice, &bob).await;
    let mut events = alice.handle.subscribe();

    lose_path(&alice, "bob").await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    alice
        .transports
        .emit("bob", TransportEvent::StateChanged(LinkState::Connected))
        .await;
    alice.wait_for_state("bob", SessionState::Connected).await;
    next_event(&mut events, |e| matches!(e, SessionEvent::PeerConnected { .. })).await;
    assert_eq!(alice.handle.view().connected_count(), 1);

    // A second loss starts a fresh timer; the first one must not fire.
    tokio::time::sleep(Duration::from_secs(1)).await;
    lose_path(&alice, "bob").await;
    tokio::time::sleep(Duration::from_millis(4_500)).await;
    assert_eq!(alice.state_of("bob"), Some(SessionState::Disconnected));

    tokio::time::sleep(Duration::from_secs(1)).await;
    alice.wait_for_gone("bob").await;

    // Recovery told bob our media state again.
    let audio_status = router
        .log()
        .between("alice", "bob")
        .into_iter()
        .filter(|m| matches!(m, SignalMessage::AudioStatus { .. }))
        .count();
    assert_eq!(audio_status, 2);
}

#[tokio::test(start_paused = true)]
async fn test_grace_period_is_configurable() {
    init_tracing();

    let router = SignalRouter::new();
    let config = OrchestratorConfig::default().with_grace_period(Duration::from_secs(1));
    let alice = TestPeer::spawn_with(
        "alice",
        Some(&router),
        MockTransportFactory::new("alice"),
        config,
    );
    let bob = TestPeer::spawn("bob", Some(&router));
    connect(&alice, &bob).await;

    lose_path(&alice, "bob").await;
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert_eq!(alice.state_of("bob"), Some(SessionState::Disconnected));

    tokio::time::sleep(Duration::from_millis(200)).await;
    alice.wait_for_gone("bob").await;
}

#[tokio::test(start_paused = true)]
async fn test_failure_during_grace_closes_at_once() {
    init_tracing();

    let router = SignalRouter::new();
    let alice = TestPeer::spawn("alice", Some(&router));
    let bob = TestPeer::spawn("bob", Some(&router));
    connect(&alice, &bob).await;
    let mut events = alice.handle.subscribe();

    lose_path(&alice, "bob").await;
    alice
        .transports
        .emit("bob", TransportEvent::StateChanged(LinkState::Failed))
        .await;

    // Well inside the grace period.
    let status = alice.handle.peer(PeerId::from("bob")).await.unwrap();
    assert!(status.is_none());

    let closed = next_event(&mut events, |e| matches!(e, SessionEvent::PeerClosed { .. })).await;
    let SessionEvent::PeerClosed { reason, .. } = closed else {
        unreachable!()
    };
    assert_eq!(reason, CloseReason::Failed("transport reported failed".to_owned()));
}
