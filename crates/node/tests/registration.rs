//! Integration tests for startup: identity persistence, the registration
//! handshake, reject handling, heartbeat cadence, and losing the
//! coordinator after startup.

mod common;

use std::time::Duration;

use fsn_domain::config::RejectPolicy;
use fsn_domain::error::Error;
use fsn_node::{register, start, CoordinatorClient, NodeContext, RegistrationOutcome};

use fsn_protocol::{NodeRequest, NodeResponse, Session};

use common::{node_config, MiniCoordinator, NodeConn};

#[tokio::test]
async fn fresh_node_adopts_and_persists_assigned_id() {
    let coord = MiniCoordinator::start(&["n-42"]).await;
    let dir = tempfile::tempdir().unwrap();

    let node = start(node_config(coord.addr, dir.path()).build().unwrap())
        .await
        .unwrap();

    assert_eq!(node.outcome, RegistrationOutcome::Assigned("n-42".into()));
    assert_eq!(node.ctx.node_id(), "n-42");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("nodeID")).unwrap(),
        "n-42"
    );

    // The node presented an empty ID and its real listen address.
    let regs = coord.registrations();
    assert_eq!(regs.len(), 1);
    assert_eq!(regs[0].node_id, "");
    assert_eq!(regs[0].address, node.address.to_string());
    node.abort();

    // Restart without any coordinator: the ID comes from disk.
    let cfg = node_config(coord.addr, dir.path()).build().unwrap();
    let restarted = NodeContext::open(cfg).unwrap();
    assert_eq!(restarted.node_id(), "n-42");
    assert_eq!(coord.registrations().len(), 1);
}

#[tokio::test]
async fn restarted_node_registers_as_existing() {
    let coord = MiniCoordinator::start(&["n-1"]).await;
    let dir = tempfile::tempdir().unwrap();

    let first = start(node_config(coord.addr, dir.path()).build().unwrap())
        .await
        .unwrap();
    assert_eq!(first.outcome, RegistrationOutcome::Assigned("n-1".into()));
    first.abort();

    let second = start(node_config(coord.addr, dir.path()).build().unwrap())
        .await
        .unwrap();
    assert_eq!(second.outcome, RegistrationOutcome::Existing);
    assert_eq!(second.ctx.node_id(), "n-1");
    assert_eq!(coord.registrations()[1].node_id, "n-1");
    second.abort();
}

#[tokio::test]
async fn repeated_registration_is_idempotent() {
    let coord = MiniCoordinator::start(&["n-7"]).await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("nodeID"), "n-7").unwrap();

    let ctx = NodeContext::open(node_config(coord.addr, dir.path()).build().unwrap()).unwrap();
    let client = CoordinatorClient::connect(&ctx.config.coordinator_url)
        .await
        .unwrap();

    for _ in 0..2 {
        let outcome = register(&client, &ctx, "127.0.0.1:9").await.unwrap();
        assert_eq!(outcome, RegistrationOutcome::Existing);
        assert_eq!(ctx.node_id(), "n-7");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("nodeID")).unwrap(),
            "n-7"
        );
    }
}

#[tokio::test]
async fn rejected_node_keeps_heartbeating_by_default() {
    let coord = MiniCoordinator::start(&[]).await;
    coord.set_reject(true);
    let dir = tempfile::tempdir().unwrap();

    let node = start(node_config(coord.addr, dir.path()).build().unwrap())
        .await
        .unwrap();
    assert_eq!(node.outcome, RegistrationOutcome::Rejected);
    assert!(!dir.path().join("nodeID").exists());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(coord.heartbeat_count() >= 1);
    node.abort();
}

#[tokio::test]
async fn rejected_node_halts_when_configured() {
    let coord = MiniCoordinator::start(&[]).await;
    coord.set_reject(true);
    let dir = tempfile::tempdir().unwrap();

    let cfg = node_config(coord.addr, dir.path())
        .reject_policy(RejectPolicy::Halt)
        .build()
        .unwrap();
    let err = start(cfg).await.err().expect("startup should fail");
    assert!(matches!(err, Error::Rejected), "got {err:?}");

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(coord.heartbeat_count(), 0);
}

#[tokio::test]
async fn unreachable_coordinator_is_fatal() {
    // Grab a free port, then close it so nothing listens there.
    let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let dir = tempfile::tempdir().unwrap();
    let err = start(node_config(addr, dir.path()).build().unwrap())
        .await
        .err()
        .expect("dial should fail");
    assert!(matches!(err, Error::Connection(_)), "got {err:?}");
}

#[tokio::test]
async fn heartbeat_cadence_follows_interval() {
    let coord = MiniCoordinator::start(&["n-hb"]).await;
    let dir = tempfile::tempdir().unwrap();

    let node = start(node_config(coord.addr, dir.path()).build().unwrap())
        .await
        .unwrap();

    let before = coord.heartbeat_count();
    tokio::time::sleep(Duration::from_millis(600)).await;
    let observed = coord.heartbeat_count() - before;
    node.abort();

    // 50ms interval over 600ms: at most 13 (one sent immediately), and
    // comfortably more than a handful even on a loaded machine.
    assert!(
        (4..=13).contains(&observed),
        "observed {observed} heartbeats in 600ms"
    );

    let st = coord.state.lock();
    assert!(st.heartbeats.iter().all(|(id, _)| id == "n-hb"));
    for pair in st.heartbeats.windows(2) {
        assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(45));
    }
}

#[tokio::test]
async fn heartbeat_survives_coordinator_hang_up() {
    let coord = MiniCoordinator::start(&["n-lost"]).await;
    coord.set_hang_up_after_register(true);
    let dir = tempfile::tempdir().unwrap();

    let node = start(
        node_config(coord.addr, dir.path())
            .heartbeat_interval(Duration::from_millis(20))
            .build()
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(node.outcome, RegistrationOutcome::Assigned("n-lost".into()));

    // Many failed rounds later the loop is still alive and never reached
    // the coordinator.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(!node.heartbeat.is_finished(), "heartbeat loop exited");
    assert_eq!(coord.heartbeat_count(), 0);

    // The node keeps serving its stores.
    let mut conn = NodeConn::connect(node.address).await;
    let s = Session::new("after-hang-up");
    let resp = conn.call(NodeRequest::SaveSession { session: s.clone() }).await;
    assert_eq!(resp, NodeResponse::Saved { ok: true });
    let resp = conn
        .call(NodeRequest::GetSession {
            id: "after-hang-up".into(),
        })
        .await;
    assert_eq!(resp, NodeResponse::Session { session: Some(s) });
    assert!(!node.heartbeat.is_finished());

    node.abort();
}
