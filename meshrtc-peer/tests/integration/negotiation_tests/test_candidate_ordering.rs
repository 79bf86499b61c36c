use meshrtc_core::{IceCandidate, PeerId, SignalMessage};
use meshrtc_peer::{OrchestratorConfig, SdpKind, SessionState};
use serde_json::json;

use crate::utils::{MockTransportFactory, TestPeer, TransportOp, init_tracing, wait_for};

const CANDIDATES: usize = 4;

/// Feeds `split` candidates before the remote description is applied and the
/// rest afterwards.
async fn run_split(split: usize) {
    // Held in Connecting so the wait below cannot miss the state.
    let alice = TestPeer::spawn_with(
        "alice",
        None,
        MockTransportFactory::new("alice").manual_connect(),
        OrchestratorConfig::default(),
    );
    let bob = PeerId::from("bob");
    let candidates: Vec<IceCandidate> = (0..CANDIDATES)
        .map(|i| IceCandidate::new(format!("candidate:bob:{i}")))
        .collect();

    alice
        .handle
        .signal(bob.clone(), "offer", &json!({"sdp": "offer-bob", "mediaKind": "camera"}))
        .await
        .unwrap();
    for candidate in &candidates[..split] {
        alice
            .handle
            .signal_message(
                bob.clone(),
                SignalMessage::Candidate {
                    candidate: candidate.clone(),
                },
            )
            .await
            .unwrap();
    }

    alice.wait_for_state("bob", SessionState::Connecting).await;
    for candidate in &candidates[split..] {
        let payload = json!({ "candidate": candidate });
        alice.handle.signal(bob.clone(), "candidate", &payload).await.unwrap();
    }

    let applied = || {
        alice
            .transports
            .ops_for("bob")
            .into_iter()
            .filter_map(|op| match op {
                TransportOp::Candidate(c) => Some(c),
                _ => None,
            })
            .collect::<Vec<_>>()
    };
    wait_for("all candidates applied", || applied().len() >= CANDIDATES).await;

    let expected: Vec<String> = candidates.iter().map(|c| c.candidate.clone()).collect();
    assert_eq!(applied(), expected, "split {split}");

    let ops = alice.transports.ops_for("bob");
    let description = ops
        .iter()
        .position(|op| *op == TransportOp::RemoteDescription(SdpKind::Offer))
        .unwrap();
    let first_candidate = ops
        .iter()
        .position(|op| matches!(op, TransportOp::Candidate(_)))
        .unwrap();
    assert!(description < first_candidate, "split {split}");

    assert!(alice.transports.violations().is_empty(), "split {split}");
    let status = alice.handle.peer(bob).await.unwrap().unwrap();
    assert_eq!(status.last_error, None, "split {split}");

    alice.handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_candidates_applied_once_in_receipt_order() {
    init_tracing();

    for split in 0..=CANDIDATES {
        run_split(split).await;
    }
}
