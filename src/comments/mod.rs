//! Bounded-depth, bounded-fan-out comment tree fetching
//!
//! [`CommentTreeFetcher::fetch_forest`] resolves a list of comment ids
//! against an [`ItemStore`], then recursively resolves their replies until the
//! [`FetchBudget`] runs out of depth. Every sibling at a level is fetched
//! concurrently and the level completes only after every sibling, including
//! its own subtree, has completed.
//!
//! Failures are soft. An id that cannot be fetched, or that resolves to
//! something that cannot be rendered (a deleted placeholder, an empty body, a
//! non-comment), is left out of the forest and recorded in
//! [`Forest::dropped`]. Nothing a single id does can fail the call.
//!
//! # Fan-out
//!
//! Caps are local: each resolved node may dispatch up to the nested cap of its
//! own children, independently of its siblings. Total in-flight requests are
//! therefore bounded by `fan_out_cap * nested_fan_out_cap^(depth - 1)`, which
//! stays small for the configured defaults (20 top-level comments, 5 replies,
//! depth 2). Raise those settings with that product in mind; there is no
//! global request limit across the tree.

use crate::error::{Error, FetchError, Result};
use crate::item_store::{Item, ItemId, ItemKind, ItemStore};
use futures::future::{BoxFuture, FutureExt, join_all};
use std::sync::Arc;
use tracing::debug;

/// Remaining depth and fan-out caps for one recursion level
///
/// Passed by value. Each level derives the next one with [`FetchBudget::descend`]
/// instead of mutating shared state, so concurrent branches never race on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchBudget {
    remaining_depth: u32,
    fan_out_cap: usize,
    nested_fan_out_cap: usize,
}

impl FetchBudget {
    /// Create a budget
    ///
    /// `fan_out_cap` applies to the ids handed to
    /// [`CommentTreeFetcher::fetch_forest`]; `nested_fan_out_cap` applies to the
    /// children of every resolved node below that.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when either cap is zero
    pub fn new(remaining_depth: u32, fan_out_cap: usize, nested_fan_out_cap: usize) -> Result<Self> {
        if fan_out_cap == 0 {
            return Err(Error::config(
                "fan-out cap must be greater than zero",
                "fetch.max_top_level_comments",
            ));
        }
        if nested_fan_out_cap == 0 {
            return Err(Error::config(
                "nested fan-out cap must be greater than zero",
                "fetch.max_child_comments",
            ));
        }
        Ok(Self {
            remaining_depth,
            fan_out_cap,
            nested_fan_out_cap,
        })
    }

    /// Budget with the same cap at every level
    pub fn uniform(remaining_depth: u32, fan_out_cap: usize) -> Result<Self> {
        Self::new(remaining_depth, fan_out_cap, fan_out_cap)
    }

    /// Levels left to resolve, including the current one
    pub fn remaining_depth(&self) -> u32 {
        self.remaining_depth
    }

    /// Maximum ids dispatched at the current level
    pub fn fan_out_cap(&self) -> usize {
        self.fan_out_cap
    }

    /// Maximum ids dispatched under each resolved node
    pub fn nested_fan_out_cap(&self) -> usize {
        self.nested_fan_out_cap
    }

    /// True once no further levels may be resolved
    pub fn is_exhausted(&self) -> bool {
        self.remaining_depth == 0
    }

    /// Budget for the children of a node resolved under this budget
    #[must_use]
    pub fn descend(self) -> Self {
        Self {
            remaining_depth: self.remaining_depth.saturating_sub(1),
            fan_out_cap: self.nested_fan_out_cap,
            nested_fan_out_cap: self.nested_fan_out_cap,
        }
    }
}

/// A resolved item together with its resolved children
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedNode {
    /// The item itself
    pub item: Item,
    /// Children that resolved successfully, in source order
    pub children: Vec<ResolvedNode>,
}

impl ResolvedNode {
    /// Id of the underlying item
    pub fn id(&self) -> ItemId {
        self.item.id
    }

    /// Number of nodes in this subtree, itself included
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(ResolvedNode::len).sum::<usize>()
    }

    /// Always false; a node counts itself
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Why an id is missing from a forest
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The store lookup failed
    Fetch(FetchError),
    /// Deleted placeholder
    Deleted,
    /// Flagged or killed item
    Dead,
    /// Item without any text
    EmptyText,
    /// Item of a kind that is not rendered as a comment
    NotRenderable {
        /// Kind the store reported
        kind: ItemKind,
    },
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Fetch(e) => write!(f, "fetch failed: {e}"),
            DropReason::Deleted => f.write_str("deleted"),
            DropReason::Dead => f.write_str("dead"),
            DropReason::EmptyText => f.write_str("empty text"),
            DropReason::NotRenderable { kind } => write!(f, "not a comment ({kind})"),
        }
    }
}

/// An id left out of a forest, and why
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DroppedItem {
    /// The dropped id
    pub id: ItemId,
    /// Why it was dropped
    pub reason: DropReason,
}

/// Result of [`CommentTreeFetcher::fetch_forest`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Forest {
    /// Resolved top-level nodes, in source order
    pub nodes: Vec<ResolvedNode>,
    /// Every id dropped anywhere in the tree
    pub dropped: Vec<DroppedItem>,
}

impl Forest {
    /// Total resolved nodes across all levels
    pub fn node_count(&self) -> usize {
        self.nodes.iter().map(ResolvedNode::len).sum()
    }

    /// True when nothing resolved
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

enum Resolution {
    Resolved(ResolvedNode, Vec<DroppedItem>),
    Dropped(DroppedItem),
}

/// Resolves comment forests from an [`ItemStore`]
#[derive(Clone)]
pub struct CommentTreeFetcher {
    store: Arc<dyn ItemStore>,
}

impl CommentTreeFetcher {
    /// Create a fetcher over a shared store
    pub fn new(store: Arc<dyn ItemStore>) -> Self {
        Self { store }
    }

    /// Resolve `ids` and their descendants within `budget`
    ///
    /// - With zero remaining depth, returns an empty forest without touching the store.
    /// - Only the first `budget.fan_out_cap()` ids are considered; the rest are ignored.
    /// - With one level remaining, resolved nodes are leaves even if they have children.
    /// - Nodes come back in the order of `ids`, whatever order the lookups finish in.
    pub async fn fetch_forest(&self, ids: &[ItemId], budget: FetchBudget) -> Forest {
        let forest = self.fetch_level(ids, budget).await;
        if !forest.dropped.is_empty() {
            debug!(
                resolved = forest.node_count(),
                dropped = forest.dropped.len(),
                "Comment forest resolved with dropped items"
            );
        }
        forest
    }

    fn fetch_level<'a>(&'a self, ids: &'a [ItemId], budget: FetchBudget) -> BoxFuture<'a, Forest> {
        async move {
            if budget.is_exhausted() || ids.is_empty() {
                return Forest::default();
            }

            let selected = &ids[..ids.len().min(budget.fan_out_cap())];
            // join_all yields outcomes in input order
            let outcomes = join_all(selected.iter().map(|&id| self.resolve(id, budget))).await;

            let mut forest = Forest::default();
            for outcome in outcomes {
                match outcome {
                    Resolution::Resolved(node, dropped) => {
                        forest.nodes.push(node);
                        forest.dropped.extend(dropped);
                    }
                    Resolution::Dropped(dropped) => forest.dropped.push(dropped),
                }
            }
            forest
        }
        .boxed()
    }

    async fn resolve(&self, id: ItemId, budget: FetchBudget) -> Resolution {
        let item = match self.store.get(id).await {
            Ok(item) => item,
            Err(e) => {
                debug!(item_id = %id, error = %e, "Dropping comment after failed lookup");
                return Resolution::Dropped(DroppedItem {
                    id,
                    reason: DropReason::Fetch(e),
                });
            }
        };

        if let Some(reason) = unrenderable(&item) {
            debug!(item_id = %id, %reason, "Dropping unrenderable comment");
            return Resolution::Dropped(DroppedItem { id, reason });
        }

        if budget.remaining_depth() <= 1 || item.child_ids.is_empty() {
            return Resolution::Resolved(
                ResolvedNode {
                    item,
                    children: Vec::new(),
                },
                Vec::new(),
            );
        }

        let subtree = self.fetch_level(&item.child_ids, budget.descend()).await;
        Resolution::Resolved(
            ResolvedNode {
                item,
                children: subtree.nodes,
            },
            subtree.dropped,
        )
    }
}

fn unrenderable(item: &Item) -> Option<DropReason> {
    if item.deleted {
        Some(DropReason::Deleted)
    } else if item.dead {
        Some(DropReason::Dead)
    } else if item.kind != ItemKind::Comment {
        Some(DropReason::NotRenderable { kind: item.kind })
    } else if item.text.trim().is_empty() {
        Some(DropReason::EmptyText)
    } else {
        None
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
