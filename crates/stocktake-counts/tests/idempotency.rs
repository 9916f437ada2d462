//! Exactly-once adjustment publication and transition races.

mod common;

use std::sync::Arc;

use stocktake_counts::error::CountError;
use stocktake_counts::types::CountStatus;

use common::{dec, TestContext};

/// Re-invoking the publisher on a completed session creates no duplicate
/// adjustments and changes no adjustment id already set.
#[tokio::test]
async fn test_retry_on_fully_published_session_is_noop() {
    let ctx = TestContext::new();
    let a = ctx.seed_item(10, 2).await;
    let b = ctx.seed_item(5, 3).await;
    let count = ctx.start_spot_count(&[a, b]).await;
    let id = count.id.into_inner();
    ctx.record(id, a, 8).await;
    ctx.record(id, b, 6).await;
    ctx.service
        .submit_for_review(ctx.tenant_id, id, ctx.actor)
        .await
        .unwrap();
    let outcome = ctx
        .service
        .approve(ctx.tenant_id, id, ctx.actor)
        .await
        .unwrap();
    assert_eq!(outcome.adjustments_created, 2);

    let ids_before: Vec<_> = ctx
        .service
        .list_items(ctx.tenant_id, id)
        .await
        .unwrap()
        .iter()
        .map(|i| i.adjustment_id)
        .collect();

    let retry = ctx
        .service
        .retry_adjustments(ctx.tenant_id, id, ctx.actor)
        .await
        .unwrap();
    assert_eq!(retry.adjustments_created, 0);
    assert_eq!(retry.adjustments_failed, 0);

    assert_eq!(ctx.ledger.adjustments().await.len(), 2);
    let ids_after: Vec<_> = ctx
        .service
        .list_items(ctx.tenant_id, id)
        .await
        .unwrap()
        .iter()
        .map(|i| i.adjustment_id)
        .collect();
    assert_eq!(ids_before, ids_after);
}

/// A partial ledger failure leaves the session completed, reports the
/// failure count, and the retry publishes only what is missing.
#[tokio::test]
async fn test_partial_failure_then_retry() {
    let ctx = TestContext::new();
    let good = ctx.seed_item(10, 2).await;
    let bad = ctx.seed_item(5, 3).await;
    let count = ctx.start_spot_count(&[good, bad]).await;
    let id = count.id.into_inner();
    ctx.record(id, good, 8).await;
    ctx.record(id, bad, 6).await;
    ctx.service
        .submit_for_review(ctx.tenant_id, id, ctx.actor)
        .await
        .unwrap();

    ctx.ledger.fail_item(bad).await;
    let outcome = ctx
        .service
        .approve(ctx.tenant_id, id, ctx.actor)
        .await
        .unwrap();

    // The count itself stands; the gap is explicit.
    assert_eq!(outcome.count.status, CountStatus::Completed);
    assert_eq!(outcome.adjustments_created, 1);
    assert_eq!(outcome.adjustments_failed, 1);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].stock_item_id, bad);

    ctx.ledger.heal_item(bad).await;
    let retry = ctx
        .service
        .retry_adjustments(ctx.tenant_id, id, ctx.actor)
        .await
        .unwrap();
    assert_eq!(retry.adjustments_created, 1);
    assert_eq!(retry.adjustments_failed, 0);
    assert_eq!(ctx.ledger.adjustments().await.len(), 2);

    // Every varying item now carries its guard.
    for item in ctx.service.list_items(ctx.tenant_id, id).await.unwrap() {
        assert!(item.adjustment_made);
        assert!(item.adjustment_id.is_some());
    }
}

/// Two simultaneous approvals: exactly one wins the status check-and-set
/// and the publisher runs once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_single_publisher_run() {
    let ctx = Arc::new(TestContext::new());
    let item = ctx.seed_item(10, 2).await;
    let count = ctx.start_spot_count(&[item]).await;
    let id = count.id.into_inner();
    ctx.record(id, item, 7).await;
    ctx.service
        .submit_for_review(ctx.tenant_id, id, ctx.actor)
        .await
        .unwrap();

    let first = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            ctx.service
                .approve(ctx.tenant_id, id, ctx.actor)
                .await
        })
    };
    let second = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            ctx.service
                .approve(ctx.tenant_id, id, ctx.actor)
                .await
        })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let wins = results.iter().filter(|r| r.is_ok()).count();
    let losses = results
        .iter()
        .filter(|r| matches!(r, Err(CountError::InvalidTransition { .. })))
        .count();
    assert_eq!(wins, 1);
    assert_eq!(losses, 1);

    // Exactly one adjustment exists for the one varying item.
    assert_eq!(ctx.ledger.adjustments().await.len(), 1);
}

/// Concurrent retries on a partially failed session never double-post:
/// the per-item claim admits a single publisher per item.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retries_never_double_post() {
    let ctx = Arc::new(TestContext::new());
    let a = ctx.seed_item(10, 2).await;
    let b = ctx.seed_item(5, 3).await;
    let count = ctx.start_spot_count(&[a, b]).await;
    let id = count.id.into_inner();
    ctx.record(id, a, 8).await;
    ctx.record(id, b, 6).await;
    ctx.service
        .submit_for_review(ctx.tenant_id, id, ctx.actor)
        .await
        .unwrap();

    // Fail everything so approval publishes nothing.
    ctx.ledger.fail_item(a).await;
    ctx.ledger.fail_item(b).await;
    let outcome = ctx
        .service
        .approve(ctx.tenant_id, id, ctx.actor)
        .await
        .unwrap();
    assert_eq!(outcome.adjustments_created, 0);
    assert_eq!(outcome.adjustments_failed, 2);

    ctx.ledger.heal_item(a).await;
    ctx.ledger.heal_item(b).await;

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.service
                    .retry_adjustments(ctx.tenant_id, id, ctx.actor)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        created += task.await.unwrap().adjustments_created;
    }
    assert_eq!(created, 2);
    assert_eq!(ctx.ledger.adjustments().await.len(), 2);
}

/// Two counters racing on different items both succeed; racing on the
/// same item serializes to last-committed-wins with consistent variance.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_count_recording() {
    let ctx = Arc::new(TestContext::new());
    let a = ctx.seed_item(10, 1).await;
    let b = ctx.seed_item(20, 1).await;
    let count = ctx.start_spot_count(&[a, b]).await;
    let id = count.id.into_inner();

    let ra = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.record(id, a, 9).await })
    };
    let rb = {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.record(id, b, 20).await })
    };
    ra.await.unwrap();
    rb.await.unwrap();

    let session = ctx.service.get_status(ctx.tenant_id, id).await.unwrap();
    assert_eq!(session.items_counted, 2);

    // Same-item race: whichever write lands last, its variance is paired
    // with its quantity.
    let writers: Vec<_> = [dec(5), dec(6), dec(7)]
        .into_iter()
        .map(|qty| {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                ctx.service
                    .record_count(
                        ctx.tenant_id,
                        id,
                        stocktake_counts::count::RecordCountInput {
                            stock_item_id: a,
                            batch_id: None,
                            quantity: qty,
                            notes: None,
                        },
                        ctx.actor,
                    )
                    .await
                    .unwrap()
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }

    let items = ctx.service.list_items(ctx.tenant_id, id).await.unwrap();
    let item_a = items.iter().find(|i| i.stock_item_id == a).unwrap();
    let counted = item_a.counted_quantity.unwrap();
    assert_eq!(item_a.variance.unwrap(), counted - dec(10));
}

/// The winner of a submit/cancel race determines the outcome; the loser
/// observes a typed invalid transition.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_submit_cancel_race_is_serialized() {
    let ctx = Arc::new(TestContext::new());
    let item = ctx.seed_item(10, 1).await;
    let count = ctx.start_spot_count(&[item]).await;
    let id = count.id.into_inner();
    ctx.record(id, item, 10).await;

    let submit = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            ctx.service
                .submit_for_review(ctx.tenant_id, id, ctx.actor)
                .await
        })
    };
    let cancel = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            ctx.service
                .cancel(ctx.tenant_id, id, None, ctx.actor)
                .await
        })
    };

    let submit = submit.await.unwrap();
    let cancel = cancel.await.unwrap();

    let session = ctx.service.get_status(ctx.tenant_id, id).await.unwrap();
    match (submit.is_ok(), cancel.is_ok()) {
        // Cancel can legally follow a successful submit (pending review is
        // cancellable); a cancelled session refuses the late submit.
        (true, true) => assert_eq!(session.status, CountStatus::Cancelled),
        (false, true) => {
            assert_eq!(session.status, CountStatus::Cancelled);
            assert!(matches!(
                submit.unwrap_err(),
                CountError::InvalidTransition { .. }
            ));
        }
        (true, false) => {
            assert_eq!(session.status, CountStatus::PendingReview);
            assert!(matches!(
                cancel.unwrap_err(),
                CountError::InvalidTransition { .. }
            ));
        }
        (false, false) => panic!("one of the racing transitions must win"),
    }
}
