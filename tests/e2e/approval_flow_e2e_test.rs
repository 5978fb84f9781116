//! End-to-end approval flows across the record owner and the projection
//!
//! Each scenario runs once over the direct channel and once over the queued
//! bus. Both services are real; only the outcome notifier records instead of
//! sending.

use std::time::Duration;

use relay_core::{CoreError, FinalStatus, RequestId};
use relay_sync::{BusConfig, RetryPolicy};
use relay_tests::{RelayHarness, Transport, APPROVER_A, APPROVER_B, APPROVER_C};

const EMPTY: &[RequestId] = &[];

async fn two_step_approval(transport: Transport) -> anyhow::Result<()> {
    let relay = RelayHarness::start(transport)?;
    let id = relay.submit(&[(1, APPROVER_A), (2, APPROVER_B)]).await?;

    assert_eq!(relay.pending_ids(APPROVER_A).await?, vec![id]);
    assert_eq!(relay.pending_ids(APPROVER_B).await?, EMPTY);

    let event = relay.decide(APPROVER_A, id, "approved").await?;
    assert_eq!(event.step_number, 1);

    assert_eq!(relay.pending_ids(APPROVER_A).await?, EMPTY);
    assert_eq!(relay.pending_ids(APPROVER_B).await?, vec![id]);
    assert_eq!(relay.workflows.get(id).await?.final_status, FinalStatus::InProgress);

    let event = relay.decide(APPROVER_B, id, "approved").await?;
    assert_eq!(event.step_number, 2);

    let record = relay.workflows.get(id).await?;
    assert_eq!(record.final_status, FinalStatus::Approved);
    assert_eq!(relay.pending_ids(APPROVER_A).await?, EMPTY);
    assert_eq!(relay.pending_ids(APPROVER_B).await?, EMPTY);

    let outcomes: Vec<_> = relay.notifier.sent().await.into_iter().map(|n| n.outcome).collect();
    assert_eq!(outcomes, vec![FinalStatus::InProgress, FinalStatus::Approved]);

    let metrics = relay.metrics.snapshot();
    assert_eq!(metrics.reports_ok, 2);
    assert_eq!(metrics.pushes_ok, 2);
    assert_eq!(metrics.dead_letters, 0);
    Ok(())
}

async fn early_rejection(transport: Transport) -> anyhow::Result<()> {
    let relay = RelayHarness::start(transport)?;
    let id = relay.submit(&[(1, APPROVER_A), (2, APPROVER_B)]).await?;

    relay.decide(APPROVER_A, id, "rejected").await?;

    let record = relay.workflows.get(id).await?;
    assert_eq!(record.final_status, FinalStatus::Rejected);
    assert_eq!(relay.pending_ids(APPROVER_A).await?, EMPTY);
    assert_eq!(relay.pending_ids(APPROVER_B).await?, EMPTY);

    let sent = relay.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].outcome, FinalStatus::Rejected);
    assert_eq!(sent[0].actor_id.map(|p| p.0), Some(APPROVER_A));

    // B was never actionable, so nothing can be decided there
    let err = relay.decide(APPROVER_B, id, "approved").await.unwrap_err();
    assert!(matches!(err, CoreError::PendingEntryNotFound { .. }));
    Ok(())
}

async fn duplicate_submission(transport: Transport) -> anyhow::Result<()> {
    let relay = RelayHarness::start(transport)?;
    let id = relay.submit(&[(1, APPROVER_A), (2, APPROVER_B)]).await?;

    relay.decide(APPROVER_A, id, "approved").await?;
    let err = relay.decide(APPROVER_A, id, "approved").await.unwrap_err();
    assert!(matches!(err, CoreError::PendingEntryNotFound { .. }));

    let record = relay.workflows.get(id).await?;
    assert_eq!(record.final_status, FinalStatus::InProgress);
    assert_eq!(relay.pending_ids(APPROVER_B).await?, vec![id]);
    Ok(())
}

#[tokio::test]
async fn test_two_step_approval_direct() -> anyhow::Result<()> {
    two_step_approval(Transport::Direct).await
}

#[tokio::test]
async fn test_two_step_approval_queued() -> anyhow::Result<()> {
    two_step_approval(Transport::Queued).await
}

#[tokio::test]
async fn test_early_rejection_direct() -> anyhow::Result<()> {
    early_rejection(Transport::Direct).await
}

#[tokio::test]
async fn test_early_rejection_queued() -> anyhow::Result<()> {
    early_rejection(Transport::Queued).await
}

#[tokio::test]
async fn test_duplicate_submission_direct() -> anyhow::Result<()> {
    duplicate_submission(Transport::Direct).await
}

#[tokio::test]
async fn test_duplicate_submission_queued() -> anyhow::Result<()> {
    duplicate_submission(Transport::Queued).await
}

#[tokio::test]
async fn test_racing_decisions_only_one_wins() -> anyhow::Result<()> {
    let relay = RelayHarness::start(Transport::Direct)?;
    let id = relay.submit(&[(1, APPROVER_A), (2, APPROVER_B)]).await?;

    let (first, second) = tokio::join!(
        relay.decide(APPROVER_A, id, "approved"),
        relay.decide(APPROVER_A, id, "rejected"),
    );
    assert!(first.is_ok() != second.is_ok(), "exactly one decision must succeed");

    let record = relay.workflows.get(id).await?;
    assert_eq!(record.steps.iter().filter(|s| s.status.is_decision()).count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_independent_workflows_across_partitions() -> anyhow::Result<()> {
    let relay = RelayHarness::start(Transport::Queued)?;

    let mut ids = Vec::new();
    for _ in 0..6 {
        ids.push(relay.submit(&[(1, APPROVER_A), (2, APPROVER_B), (3, APPROVER_C)]).await?);
    }
    assert_eq!(relay.pending_ids(APPROVER_A).await?, ids);

    for id in &ids {
        relay.decide(APPROVER_A, *id, "approved").await?;
    }
    for (i, id) in ids.iter().enumerate() {
        let status = if i % 2 == 0 { "rejected" } else { "approved" };
        relay.decide(APPROVER_B, *id, status).await?;
    }

    assert_eq!(relay.pending_ids(APPROVER_A).await?, EMPTY);
    assert_eq!(relay.pending_ids(APPROVER_B).await?, EMPTY);
    let at_c: Vec<_> = ids.iter().skip(1).step_by(2).copied().collect();
    assert_eq!(relay.pending_ids(APPROVER_C).await?, at_c);

    for id in ids.iter().step_by(2) {
        assert_eq!(relay.workflows.get(*id).await?.final_status, FinalStatus::Rejected);
    }
    Ok(())
}

#[tokio::test]
async fn test_concurrent_decisions_on_a_single_slot_bus() -> anyhow::Result<()> {
    let relay = RelayHarness::start_queued(BusConfig { partitions: 1, capacity: 1, retry: RetryPolicy::none() })?;

    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(relay.submit(&[(1, APPROVER_A), (2, APPROVER_B)]).await?);
    }

    let decisions = async {
        tokio::join!(
            relay.decide(APPROVER_A, ids[0], "approved"),
            relay.decide(APPROVER_A, ids[1], "approved"),
            relay.decide(APPROVER_A, ids[2], "approved"),
            relay.decide(APPROVER_A, ids[3], "approved"),
        )
    };
    let (a, b, c, d) = tokio::time::timeout(Duration::from_secs(5), decisions).await?;
    for result in [a, b, c, d] {
        assert_eq!(result?.step_number, 1);
    }

    assert_eq!(relay.pending_ids(APPROVER_A).await?, EMPTY);
    assert_eq!(relay.pending_ids(APPROVER_B).await?, ids);
    assert_eq!(relay.metrics.snapshot().dead_letters, 0);
    Ok(())
}
