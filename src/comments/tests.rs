//! Tests for comment forest resolution.

use super::*;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory store that records every dispatched id and tracks how many
/// lookups are in flight at once
#[derive(Default)]
struct RecordingStore {
    items: HashMap<ItemId, Item>,
    failing: HashSet<ItemId>,
    delays: HashMap<ItemId, Duration>,
    dispatched: Mutex<Vec<ItemId>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingStore {
    fn with_comment(mut self, id: i64, children: impl IntoIterator<Item = i64>) -> Self {
        let item = Item::comment(id, "alice", &format!("comment {id}")).with_children(children);
        self.items.insert(ItemId(id), item);
        self
    }

    fn with_item(mut self, item: Item) -> Self {
        self.items.insert(item.id, item);
        self
    }

    fn failing(mut self, id: i64) -> Self {
        self.failing.insert(ItemId(id));
        self
    }

    fn delayed(mut self, id: i64, delay: Duration) -> Self {
        self.delays.insert(ItemId(id), delay);
        self
    }

    fn dispatched(&self) -> Vec<ItemId> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemStore for RecordingStore {
    async fn get(&self, id: ItemId) -> std::result::Result<Item, FetchError> {
        self.dispatched.lock().unwrap().push(id);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&id) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&id) {
            return Err(FetchError::Status { status: 500 });
        }
        self.items.get(&id).cloned().ok_or(FetchError::Missing)
    }
}

fn ids(range: impl IntoIterator<Item = i64>) -> Vec<ItemId> {
    range.into_iter().map(ItemId).collect()
}

fn fetcher(store: &Arc<RecordingStore>) -> CommentTreeFetcher {
    CommentTreeFetcher::new(store.clone())
}

fn node_ids(nodes: &[ResolvedNode]) -> Vec<i64> {
    nodes.iter().map(|n| n.id().get()).collect()
}

#[tokio::test]
async fn test_zero_depth_makes_no_calls() {
    let store = Arc::new(RecordingStore::default().with_comment(1, []));
    let budget = FetchBudget::uniform(0, 10).unwrap();

    let forest = fetcher(&store).fetch_forest(&ids([1, 2, 3]), budget).await;

    assert!(forest.is_empty());
    assert!(forest.dropped.is_empty());
    assert!(store.dispatched().is_empty(), "depth 0 must not reach the store");
}

#[tokio::test]
async fn test_single_failure_keeps_siblings() {
    // depth 1, cap 10, id 2 fails: nodes 1 and 3 come back as leaves
    let store = Arc::new(
        RecordingStore::default()
            .with_comment(1, [11, 12])
            .with_comment(2, [])
            .with_comment(3, [31])
            .failing(2),
    );
    let budget = FetchBudget::uniform(1, 10).unwrap();

    let forest = fetcher(&store).fetch_forest(&ids([1, 2, 3]), budget).await;

    assert_eq!(node_ids(&forest.nodes), vec![1, 3]);
    assert!(
        forest.nodes.iter().all(|n| n.children.is_empty()),
        "depth 1 returns leaves"
    );
    assert_eq!(
        forest.dropped,
        vec![DroppedItem {
            id: ItemId(2),
            reason: DropReason::Fetch(FetchError::Status { status: 500 }),
        }]
    );
    let mut dispatched = store.dispatched();
    dispatched.sort();
    assert_eq!(dispatched, ids([1, 2, 3]), "children of leaves are never fetched");
}

#[tokio::test]
async fn test_fan_out_caps_apply_per_level() {
    // 50 top-level ids, each with 10 replies; caps 20 then 5
    let mut store = RecordingStore::default();
    for id in 1..=50 {
        store = store.with_comment(id, (0..10).map(|k| id * 100 + k));
        for k in 0..10 {
            store = store.with_comment(id * 100 + k, [id * 10_000 + k]);
        }
    }
    let store = Arc::new(store);
    let budget = FetchBudget::new(2, 20, 5).unwrap();

    let forest = fetcher(&store).fetch_forest(&ids(1..=50), budget).await;

    assert_eq!(forest.nodes.len(), 20, "first level holds at most 20 nodes");
    assert_eq!(node_ids(&forest.nodes), (1..=20).collect::<Vec<_>>());
    for node in &forest.nodes {
        let expected: Vec<i64> = (0..5).map(|k| node.id().get() * 100 + k).collect();
        assert_eq!(
            node_ids(&node.children),
            expected,
            "node {} keeps its first five replies",
            node.id()
        );
        assert!(node.children.iter().all(|c| c.children.is_empty()));
    }

    let dispatched = store.dispatched();
    assert_eq!(dispatched.len(), 20 + 20 * 5);
    assert!(
        dispatched.iter().all(|id| id.get() <= 20 || id.get() >= 100),
        "ids past the top-level cap are never dispatched"
    );
    assert!(
        dispatched.iter().all(|id| id.get() < 10_000),
        "third level is never reached at depth 2"
    );
}

#[tokio::test]
async fn test_nested_failures_do_not_touch_parent() {
    let store = Arc::new(
        RecordingStore::default()
            .with_comment(1, [10, 11, 12])
            .with_comment(10, [])
            .with_comment(12, [])
            .failing(11),
    );
    let budget = FetchBudget::uniform(2, 10).unwrap();

    let forest = fetcher(&store).fetch_forest(&ids([1]), budget).await;

    assert_eq!(node_ids(&forest.nodes), vec![1]);
    assert_eq!(node_ids(&forest.nodes[0].children), vec![10, 12]);
    assert_eq!(forest.node_count(), 3);
    assert_eq!(forest.dropped.len(), 1);
    assert_eq!(forest.dropped[0].id, ItemId(11));
}

#[tokio::test]
async fn test_invalid_items_are_dropped_with_reasons() {
    let mut deleted = Item::comment(2, "", "");
    deleted.deleted = true;
    let mut dead = Item::comment(3, "troll", "[flagged]");
    dead.dead = true;
    let mut story = Item::comment(4, "pg", "a story body");
    story.kind = ItemKind::Story;
    let blank = Item::comment(5, "bob", "   ");

    let store = Arc::new(
        RecordingStore::default()
            .with_comment(1, [])
            .with_item(deleted)
            .with_item(dead)
            .with_item(story)
            .with_item(blank),
    );
    let budget = FetchBudget::uniform(1, 10).unwrap();

    let forest = fetcher(&store)
        .fetch_forest(&ids([1, 2, 3, 4, 5, 6]), budget)
        .await;

    assert_eq!(node_ids(&forest.nodes), vec![1]);
    let reasons: Vec<(i64, DropReason)> = forest
        .dropped
        .into_iter()
        .map(|d| (d.id.get(), d.reason))
        .collect();
    assert_eq!(
        reasons,
        vec![
            (2, DropReason::Deleted),
            (3, DropReason::Dead),
            (
                4,
                DropReason::NotRenderable {
                    kind: ItemKind::Story
                }
            ),
            (5, DropReason::EmptyText),
            (6, DropReason::Fetch(FetchError::Missing)),
        ]
    );
}

#[tokio::test]
async fn test_every_id_failing_yields_empty_forest() {
    let store = Arc::new(RecordingStore::default().failing(1).failing(2));
    let budget = FetchBudget::uniform(3, 10).unwrap();

    let forest = fetcher(&store).fetch_forest(&ids([1, 2]), budget).await;

    assert!(forest.is_empty());
    assert_eq!(forest.dropped.len(), 2);
}

#[tokio::test]
async fn test_siblings_run_concurrently_and_keep_source_order() {
    // The first id is the slowest; completion order is reversed
    let store = Arc::new(
        RecordingStore::default()
            .with_comment(1, [])
            .with_comment(2, [])
            .with_comment(3, [])
            .delayed(1, Duration::from_millis(150))
            .delayed(2, Duration::from_millis(75))
            .delayed(3, Duration::from_millis(10)),
    );
    let budget = FetchBudget::uniform(1, 10).unwrap();

    let forest = fetcher(&store).fetch_forest(&ids([1, 2, 3]), budget).await;

    assert_eq!(node_ids(&forest.nodes), vec![1, 2, 3]);
    assert_eq!(
        store.max_in_flight.load(Ordering::SeqCst),
        3,
        "all siblings should be in flight together"
    );
}

#[tokio::test]
async fn test_parent_waits_for_nested_subtrees() {
    let store = Arc::new(
        RecordingStore::default()
            .with_comment(1, [10])
            .with_comment(10, [100])
            .with_comment(100, [])
            .delayed(100, Duration::from_millis(50)),
    );
    let budget = FetchBudget::uniform(3, 10).unwrap();

    let forest = fetcher(&store).fetch_forest(&ids([1]), budget).await;

    let grandchild = &forest.nodes[0].children[0].children[0];
    assert_eq!(grandchild.id(), ItemId(100));
    assert_eq!(forest.node_count(), 3);
}

#[test]
fn test_budget_rejects_zero_caps() {
    assert!(matches!(FetchBudget::new(2, 0, 5), Err(Error::Config { .. })));
    assert!(matches!(FetchBudget::new(2, 20, 0), Err(Error::Config { .. })));
}

#[test]
fn test_budget_descend_switches_to_nested_cap() {
    let budget = FetchBudget::new(2, 20, 5).unwrap();
    let child = budget.descend();

    assert_eq!(child.remaining_depth(), 1);
    assert_eq!(child.fan_out_cap(), 5);
    assert_eq!(budget.fan_out_cap(), 20, "descend derives, never mutates");

    let exhausted = child.descend().descend();
    assert!(exhausted.is_exhausted());
    assert_eq!(exhausted.remaining_depth(), 0);
}
