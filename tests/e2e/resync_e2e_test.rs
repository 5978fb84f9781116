//! Cold-start resync of a projection from the record owner
//!
//! A projection that starts with no history and pulls once must list exactly
//! what the event-driven projection lists for the same records.

use relay_core::{PersonId, RequestId, WorkflowSnapshot};
use relay_tests::{pending_ids, RelayHarness, Transport, APPROVER_A, APPROVER_B, APPROVER_C};

const APPROVERS: [u64; 3] = [APPROVER_A, APPROVER_B, APPROVER_C];

/// Leaves records in every state: untouched, advanced, approved and rejected
async fn mixed_history(relay: &RelayHarness) -> anyhow::Result<Vec<RequestId>> {
    let untouched = relay.submit(&[(1, APPROVER_A), (2, APPROVER_B)]).await?;
    let advanced = relay.submit(&[(1, APPROVER_A), (2, APPROVER_C)]).await?;
    let approved = relay.submit(&[(1, APPROVER_B)]).await?;
    let rejected = relay.submit(&[(1, APPROVER_C), (2, APPROVER_A)]).await?;
    let deep = relay.submit(&[(1, APPROVER_B), (2, APPROVER_A), (3, APPROVER_C)]).await?;

    relay.decide(APPROVER_A, advanced, "approved").await?;
    relay.decide(APPROVER_B, approved, "approved").await?;
    relay.decide(APPROVER_C, rejected, "rejected").await?;
    relay.decide(APPROVER_B, deep, "approved").await?;
    relay.decide(APPROVER_A, deep, "approved").await?;

    Ok(vec![untouched, advanced, approved, rejected, deep])
}

async fn listings(relay: &RelayHarness, approver: u64) -> anyhow::Result<Vec<WorkflowSnapshot>> {
    Ok(relay.projection.list_pending(PersonId(approver)).await?)
}

async fn resync_matches_steady_state(transport: Transport) -> anyhow::Result<()> {
    let relay = RelayHarness::start(transport)?;
    let ids = mixed_history(&relay).await?;

    let (restarted, coordinator) = relay.restarted_projection();
    for approver in APPROVERS {
        assert!(pending_ids(&restarted, approver).await?.is_empty());
    }

    let report = coordinator.resync().await?;
    assert_eq!(report.received, 3);
    assert_eq!(report.indexed, 3);

    for approver in APPROVERS {
        let rebuilt = restarted.list_pending(PersonId(approver)).await?;
        assert_eq!(rebuilt, listings(&relay, approver).await?, "approver {}", approver);
    }

    assert_eq!(pending_ids(&restarted, APPROVER_A).await?, vec![ids[0]]);
    assert_eq!(pending_ids(&restarted, APPROVER_B).await?, Vec::<RequestId>::new());
    assert_eq!(pending_ids(&restarted, APPROVER_C).await?, vec![ids[1], ids[4]]);
    assert_eq!(relay.metrics.snapshot().resyncs, 1);
    Ok(())
}

#[tokio::test]
async fn test_resync_matches_direct_projection() -> anyhow::Result<()> {
    resync_matches_steady_state(Transport::Direct).await
}

#[tokio::test]
async fn test_resync_matches_queued_projection() -> anyhow::Result<()> {
    resync_matches_steady_state(Transport::Queued).await
}

#[tokio::test]
async fn test_resync_replaces_stale_entries() -> anyhow::Result<()> {
    let relay = RelayHarness::start(Transport::Direct)?;
    let id = relay.submit(&[(1, APPROVER_A), (2, APPROVER_B)]).await?;
    let (restarted, coordinator) = relay.restarted_projection();

    // the restarted projection saw the creation, then missed the advance
    let created = relay.workflows.get(id).await?.snapshot();
    restarted.ingest_snapshot(created).await?;
    relay.decide(APPROVER_A, id, "approved").await?;
    assert_eq!(pending_ids(&restarted, APPROVER_A).await?, vec![id]);

    let run = coordinator.run_at_startup().await;
    assert!(run.is_some());

    assert_eq!(pending_ids(&restarted, APPROVER_A).await?, Vec::<RequestId>::new());
    assert_eq!(pending_ids(&restarted, APPROVER_B).await?, vec![id]);
    Ok(())
}

#[tokio::test]
async fn test_event_after_resync_keeps_newest_version() -> anyhow::Result<()> {
    let relay = RelayHarness::start(Transport::Direct)?;
    let id = relay.submit(&[(1, APPROVER_A), (2, APPROVER_B)]).await?;
    let stale = relay.workflows.get(id).await?.snapshot();
    relay.decide(APPROVER_A, id, "approved").await?;

    let (restarted, coordinator) = relay.restarted_projection();
    coordinator.resync().await?;

    // a late redelivery of the creation snapshot must not move the entry back
    restarted.ingest_snapshot(stale).await?;
    assert_eq!(pending_ids(&restarted, APPROVER_A).await?, Vec::<RequestId>::new());
    assert_eq!(pending_ids(&restarted, APPROVER_B).await?, vec![id]);
    Ok(())
}
