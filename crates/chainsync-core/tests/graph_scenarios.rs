mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chainsync_core::{IndexerBuilder, IndexerGraph, IndexerStatus, RetryConfig};
use common::{settle, BlockedStart, Follower, HeadSource, Journal, UnboundedSource};

fn config(id: &str) -> chainsync_core::IndexerConfig {
    IndexerBuilder::new()
        .id(id)
        .retry(RetryConfig::exponential(3, 10))
        .build_config()
}

#[tokio::test]
async fn two_level_graph_reaches_root_height() {
    let journal = Arc::new(Journal::default());
    let root = HeadSource::new(100, journal.clone());
    let child = Arc::new(Follower::new("child", journal.clone()).stepping(30));
    let grandchild = Arc::new(Follower::new("grandchild", journal.clone()));

    let mut graph = IndexerGraph::new();
    let r = graph.add_root(root.clone(), config("root"));
    let c = graph.add_child(child.clone(), config("child"), &[r]).unwrap();
    let g = graph
        .add_child(grandchild.clone(), config("grandchild"), &[c])
        .unwrap();
    let running = graph.start();

    running.get(r).unwrap().request_tick().unwrap();

    let done = |s: &chainsync_core::IndexerState| s.status == IndexerStatus::Idle && s.height == 100;
    let grandchild_state = settle(running.get(g).unwrap(), done).await;
    let child_state = settle(running.get(c).unwrap(), done).await;

    assert_eq!(grandchild_state.safe_height, 100);
    assert_eq!(child_state.safe_height, 100);
    assert_eq!(child.height.load(Ordering::SeqCst), 100);
    assert_eq!(grandchild.height.load(Ordering::SeqCst), 100);
    // 0 → 30 → 60 → 90 → 100
    assert_eq!(child.update_calls.lock().unwrap().len(), 4);

    let all = tokio::time::timeout(std::time::Duration::from_secs(10), running.wait_all(done))
        .await
        .expect("graph did not settle")
        .unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|s| s.safe_height == 100));

    running.shutdown();
}

#[tokio::test]
async fn rollback_is_acknowledged_bottom_up() {
    let journal = Arc::new(Journal::default());
    let root = HeadSource::new(200, journal.clone());
    let child = Arc::new(Follower::new("child", journal.clone()));
    let grandchild = Arc::new(Follower::new("grandchild", journal.clone()));

    let mut graph = IndexerGraph::new();
    let r = graph.add_root(root.clone(), config("root"));
    let c = graph.add_child(child.clone(), config("child"), &[r]).unwrap();
    let g = graph
        .add_child(grandchild.clone(), config("grandchild"), &[c])
        .unwrap();
    let running = graph.start();
    let root_handle = running.get(r).unwrap().clone();

    root_handle.request_tick().unwrap();
    settle(running.get(g).unwrap(), |s| {
        s.status == IndexerStatus::Idle && s.height == 200
    })
    .await;
    settle(&root_handle, |s| s.status == IndexerStatus::Idle).await;
    journal.clear();

    // Record the moment the root has been acknowledged at the lower height.
    let mut root_updates = root_handle.subscribe();
    let watcher_journal = journal.clone();
    let watcher = tokio::spawn(async move {
        if root_updates
            .wait_for(|s| s.safe_height == 50 && !s.waiting)
            .await
            .is_ok()
        {
            watcher_journal.push("root:acknowledged");
        }
    });

    root.set_head(50);
    root_handle.request_tick().unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(10), watcher)
        .await
        .expect("root never saw the acknowledgement")
        .unwrap();

    let grandchild_state = settle(running.get(g).unwrap(), |s| {
        s.status == IndexerStatus::Idle && s.height == 50
    })
    .await;
    assert_eq!(grandchild_state.safe_height, 50);
    let child_state = settle(running.get(c).unwrap(), |s| {
        s.status == IndexerStatus::Idle && s.height == 50
    })
    .await;
    assert!(!child_state.waiting);

    let child_safe = journal.position("child:safe:50");
    let grandchild_invalidated = journal.position("grandchild:invalidate:50");
    let child_invalidated = journal.position("child:invalidate:50");
    let acknowledged = journal.position("root:acknowledged");
    assert!(child_safe < grandchild_invalidated, "{:?}", journal.entries());
    assert!(grandchild_invalidated < child_invalidated, "{:?}", journal.entries());
    assert!(child_invalidated < acknowledged, "{:?}", journal.entries());

    assert_eq!(child.height.load(Ordering::SeqCst), 50);
    assert_eq!(grandchild.height.load(Ordering::SeqCst), 50);
    running.shutdown();
}

#[tokio::test]
async fn child_with_two_parents_follows_the_slower_one() {
    let journal = Arc::new(Journal::default());
    let fast = HeadSource::new(500, journal.clone());
    let slow = HeadSource::new(120, journal.clone());
    let joined = Arc::new(Follower::new("joined", journal.clone()));

    let mut graph = IndexerGraph::new();
    let a = graph.add_root(fast, config("fast"));
    let b = graph.add_root(slow.clone(), config("slow"));
    let j = graph.add_child(joined.clone(), config("joined"), &[a, b]).unwrap();
    let running = graph.start();

    running.get(a).unwrap().request_tick().unwrap();
    running.get(b).unwrap().request_tick().unwrap();
    let state = settle(running.get(j).unwrap(), |s| {
        s.status == IndexerStatus::Idle && s.height == 120
    })
    .await;
    assert_eq!(state.parents.len(), 2);
    assert_eq!(state.safe_height, 120);

    slow.set_head(450);
    running.get(b).unwrap().request_tick().unwrap();
    settle(running.get(j).unwrap(), |s| {
        s.status == IndexerStatus::Idle && s.height == 450
    })
    .await;
    running.shutdown();
}

#[tokio::test]
async fn protocol_violation_errors_the_node() {
    let journal = Arc::new(Journal::default());
    let root = HeadSource::new(10, journal.clone());
    let broken = Arc::new(Follower::new("broken", journal.clone()).overshooting());

    let mut graph = IndexerGraph::new();
    let r = graph.add_root(root, config("root"));
    let b = graph.add_child(broken.clone(), config("broken"), &[r]).unwrap();
    let running = graph.start();

    running.get(r).unwrap().request_tick().unwrap();
    let state = settle(running.get(b).unwrap(), |s| s.status == IndexerStatus::Errored).await;
    assert_eq!(state.height, 0);
    // Never retried.
    assert_eq!(broken.update_calls.lock().unwrap().len(), 1);
    running.shutdown();
}

#[tokio::test]
async fn exhausted_retries_error_the_node() {
    let journal = Arc::new(Journal::default());
    let root = HeadSource::new(10, journal.clone());
    let flaky = Arc::new(Follower::new("flaky", journal.clone()).failing(100));

    let mut graph = IndexerGraph::new();
    let r = graph.add_root(root, config("root"));
    let f = graph.add_child(flaky.clone(), config("flaky"), &[r]).unwrap();
    let running = graph.start();

    running.get(r).unwrap().request_tick().unwrap();
    settle(running.get(f).unwrap(), |s| s.status == IndexerStatus::Errored).await;
    assert_eq!(flaky.update_calls.lock().unwrap().len(), 3);
    assert_eq!(running.get(r).unwrap().status(), IndexerStatus::Idle);
    running.shutdown();
}

#[tokio::test]
async fn failed_start_does_not_block_a_rollback() {
    let journal = Arc::new(Journal::default());
    let root = HeadSource::new(200, journal.clone());
    let middle = Arc::new(Follower::new("middle", journal.clone()));
    let failed = BlockedStart::new();

    let mut graph = IndexerGraph::new();
    let r = graph.add_root(root.clone(), config("root"));
    let m = graph.add_child(middle.clone(), config("middle"), &[r]).unwrap();
    let f = graph
        .add_child(
            failed.clone(),
            IndexerBuilder::new()
                .id("failed")
                .initialize_retry(RetryConfig::exponential(1, 10))
                .build_config(),
            &[m],
        )
        .unwrap();
    let running = graph.start();
    let root_handle = running.get(r).unwrap();

    root_handle.request_tick().unwrap();
    settle(running.get(m).unwrap(), |s| {
        s.status == IndexerStatus::Idle && s.height == 200 && s.safe_height == 200
    })
    .await;
    settle(running.get(f).unwrap(), |s| s.parents[0].safe_height == 200).await;

    root.set_head(50);
    root_handle.request_tick().unwrap();
    let pending = settle(running.get(f).unwrap(), |s| s.parents[0].waiting).await;
    assert_eq!(pending.status, IndexerStatus::Init);
    // Middle holds its data until the still-starting child answers.
    assert!(!journal.entries().contains(&"middle:invalidate:50".to_string()));

    failed.release.notify_one();
    settle(running.get(f).unwrap(), |s| s.status == IndexerStatus::Errored).await;
    let middle_state = settle(running.get(m).unwrap(), |s| {
        s.status == IndexerStatus::Idle && s.height == 50 && !s.waiting
    })
    .await;
    assert_eq!(middle_state.safe_height, 50);
    settle(root_handle, |s| s.safe_height == 50 && !s.waiting).await;

    journal.position("middle:invalidate:50");
    assert_eq!(middle.height.load(Ordering::SeqCst), 50);
    running.shutdown();
}

#[tokio::test]
async fn unbounded_root_is_errored() {
    let mut graph = IndexerGraph::new();
    let r = graph.add_root(Arc::new(UnboundedSource), config("unbounded"));
    let running = graph.start();

    let state = settle(running.get(r).unwrap(), |s| s.status == IndexerStatus::Errored).await;
    assert!(!state.initialized_self);
    running.shutdown();
}
