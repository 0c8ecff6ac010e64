use super::*;
use crate::pipeline::dispatcher::Dispatcher;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

fn event_channel() -> tokio::sync::broadcast::Sender<Event> {
    tokio::sync::broadcast::channel(100).0
}

fn outcome_of(report: &[(ArticleId, ItemOutcome)], id: &str) -> ItemOutcome {
    report
        .iter()
        .find(|(article_id, _)| article_id.as_str() == id)
        .map(|(_, outcome)| *outcome)
        .unwrap_or_else(|| panic!("no outcome reported for {id}"))
}

#[tokio::test]
async fn test_batch_with_mixed_verdicts() {
    let (engine, store, _temp) = create_test_engine(chrono::Duration::seconds(60)).await;
    let processor = Arc::new(
        VerdictMap::publish_all()
            .with("reject-me", Verdict::Reject)
            .with("fail-me", Verdict::Fail("bad content".into())),
    );
    let dispatcher = Dispatcher::new(Arc::clone(&engine), processor, 3, event_channel());

    let mut batch = Vec::new();
    for id in ["publish-me", "reject-me", "fail-me"] {
        batch.push(stage_article(&store, id).await);
    }

    let report = dispatcher
        .run_batch(batch, 2, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(outcome_of(&report, "publish-me"), ItemOutcome::Published);
    assert_eq!(outcome_of(&report, "reject-me"), ItemOutcome::Rejected);
    assert_eq!(outcome_of(&report, "fail-me"), ItemOutcome::Failed);

    let failed = store
        .get_article(&ArticleId::new("fail-me"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.state, ArticleState::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("bad content"));

    store.close().await;
}

/// Processor that records the maximum number of concurrent invocations
struct ConcurrencyProbe {
    current: AtomicUsize,
    max: AtomicUsize,
}

#[async_trait]
impl ArticleProcessor for ConcurrencyProbe {
    async fn process(&self, _article: &Article) -> Verdict {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Verdict::Publish
    }
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let (engine, store, _temp) = create_test_engine(chrono::Duration::seconds(60)).await;
    let probe = Arc::new(ConcurrencyProbe {
        current: AtomicUsize::new(0),
        max: AtomicUsize::new(0),
    });
    let dispatcher = Dispatcher::new(Arc::clone(&engine), probe.clone(), 3, event_channel());

    let mut batch = Vec::new();
    for i in 0..6 {
        batch.push(stage_article(&store, &format!("doc-{i}")).await);
    }

    let report = dispatcher
        .run_batch(batch, 2, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.len(), 6);
    assert!(
        probe.max.load(Ordering::SeqCst) <= 2,
        "at most 2 articles may be in flight with concurrency=2"
    );

    store.close().await;
}

#[tokio::test]
async fn test_cancelled_batch_skips_everything() {
    let (engine, store, _temp) = create_test_engine(chrono::Duration::seconds(60)).await;
    let dispatcher = Dispatcher::new(
        Arc::clone(&engine),
        Arc::new(VerdictMap::publish_all()),
        3,
        event_channel(),
    );

    let mut batch = Vec::new();
    for i in 0..4 {
        batch.push(stage_article(&store, &format!("doc-{i}")).await);
    }

    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = dispatcher.run_batch(batch, 2, &cancel).await.unwrap();

    assert_eq!(report.len(), 4);
    assert!(
        report
            .iter()
            .all(|(_, outcome)| *outcome == ItemOutcome::Skipped)
    );

    // Nothing was claimed: every article is still staged at version 1
    for i in 0..4 {
        let article = store
            .get_article(&ArticleId::new(format!("doc-{i}")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(article.state, ArticleState::Staged);
        assert_eq!(article.version, 1);
    }

    store.close().await;
}

#[tokio::test]
async fn test_already_claimed_article_is_skipped() {
    let (engine, store, _temp) = create_test_engine(chrono::Duration::seconds(60)).await;
    let dispatcher = Dispatcher::new(
        Arc::clone(&engine),
        Arc::new(VerdictMap::publish_all()),
        3,
        event_channel(),
    );

    let contested = stage_article(&store, "contested").await;
    let free = stage_article(&store, "free").await;

    // Another worker holds a live lease on the contested article
    engine.claim(&contested.id).await.unwrap();

    let report = dispatcher
        .run_batch(vec![contested.clone(), free], 2, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome_of(&report, "contested"), ItemOutcome::Skipped);
    assert_eq!(outcome_of(&report, "free"), ItemOutcome::Published);

    // The skip left the other worker's lease untouched
    let current = store.get_article(&contested.id).await.unwrap().unwrap();
    assert_eq!(current.state, ArticleState::Processing);
    assert_eq!(current.attempt_count, 1);

    store.close().await;
}

#[tokio::test]
async fn test_transient_failure_within_budget_is_deferred() {
    let (engine, store, _temp) = create_test_engine(chrono::Duration::seconds(60)).await;
    let processor = Arc::new(
        VerdictMap::publish_all().with("flaky", Verdict::Transient("upstream timeout".into())),
    );
    let dispatcher = Dispatcher::new(Arc::clone(&engine), processor, 3, event_channel());

    let flaky = stage_article(&store, "flaky").await;

    let report = dispatcher
        .run_batch(vec![flaky.clone()], 1, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome_of(&report, "flaky"), ItemOutcome::Deferred);

    // No complete was called: the article stays Processing under its lease
    // until expiry, when a later cycle reclaims it
    let current = store.get_article(&flaky.id).await.unwrap().unwrap();
    assert_eq!(current.state, ArticleState::Processing);
    assert_eq!(current.attempt_count, 1);
    assert!(current.lease_expires_at.is_some());

    store.close().await;
}

#[tokio::test]
async fn test_transient_failure_over_budget_is_failed() {
    let (engine, store, _temp) = create_test_engine(chrono::Duration::seconds(60)).await;
    let processor = Arc::new(
        VerdictMap::publish_all().with("flaky", Verdict::Transient("upstream timeout".into())),
    );
    // max_attempts = 1: the first transient failure exhausts the budget
    let dispatcher = Dispatcher::new(Arc::clone(&engine), processor, 1, event_channel());

    let flaky = stage_article(&store, "flaky").await;

    let report = dispatcher
        .run_batch(vec![flaky.clone()], 1, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome_of(&report, "flaky"), ItemOutcome::Failed);

    let current = store.get_article(&flaky.id).await.unwrap().unwrap();
    assert_eq!(current.state, ArticleState::Failed);
    let reason = current.last_error.unwrap();
    assert!(reason.contains("retry budget exhausted"));
    assert!(reason.contains("upstream timeout"));

    store.close().await;
}

#[tokio::test]
async fn test_events_are_emitted_per_item() {
    let (engine, store, _temp) = create_test_engine(chrono::Duration::seconds(60)).await;
    let event_tx = event_channel();
    let mut events = event_tx.subscribe();
    let processor =
        Arc::new(VerdictMap::publish_all().with("fail-me", Verdict::Fail("bad".into())));
    let dispatcher = Dispatcher::new(Arc::clone(&engine), processor, 3, event_tx);

    let publish = stage_article(&store, "publish-me").await;
    let fail = stage_article(&store, "fail-me").await;

    dispatcher
        .run_batch(vec![publish, fail], 1, &CancellationToken::new())
        .await
        .unwrap();

    let mut claimed = 0;
    let mut published = 0;
    let mut failed = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            Event::Claimed { .. } => claimed += 1,
            Event::Published { .. } => published += 1,
            Event::Failed { .. } => failed += 1,
            _ => {}
        }
    }
    assert_eq!(claimed, 2);
    assert_eq!(published, 1);
    assert_eq!(failed, 1);

    store.close().await;
}
