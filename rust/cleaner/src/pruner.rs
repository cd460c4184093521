use crate::protection::ProtectionPolicy;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use trashcan_storage::{model, NodeRef, NodeStore, StorageError, TransactionRunner};

/// Result of one bounded pruning round over a single candidate tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneRound {
    /// Nodes actually removed this round.
    pub deleted: usize,
    /// Whether anything in the tree was left behind on purpose (protected
    /// node, missing archive marker, inconsistent metadata).
    pub skipped: bool,
}

impl PruneRound {
    fn untouched(skipped: bool) -> Self {
        PruneRound {
            deleted: 0,
            skipped,
        }
    }
}

struct RoundState {
    deleted: usize,
    skipped: bool,
    batch_limit: usize,
}

/// Deletes one candidate tree bottom-up in bounded batches. Each call to
/// [`TreePruner::prune_tree`] is one retryable transaction removing at most
/// `batch_limit` nodes; the caller repeats until a round deletes nothing.
#[derive(Debug)]
pub struct TreePruner {
    store: Arc<dyn NodeStore>,
    policy: Arc<ProtectionPolicy>,
    transactions: TransactionRunner,
}

impl TreePruner {
    pub fn new(
        store: Arc<dyn NodeStore>,
        policy: Arc<ProtectionPolicy>,
        transactions: TransactionRunner,
    ) -> Self {
        TreePruner {
            store,
            policy,
            transactions,
        }
    }

    pub async fn prune_tree(
        &self,
        root: NodeRef,
        cutoff: DateTime<Utc>,
        batch_limit: usize,
    ) -> Result<PruneRound, StorageError> {
        self.transactions
            .run_in_transaction(
                || async move { self.prune_round(root, cutoff, batch_limit).await },
                false,
                true,
            )
            .await
    }

    /// One transaction-sized round: re-check the candidate's eligibility,
    /// then delete depth-first until the batch budget runs out. Eligibility
    /// is re-checked every round because rounds of other candidates (or
    /// other actors) may have changed the tree in between.
    async fn prune_round(
        &self,
        root: NodeRef,
        cutoff: DateTime<Utc>,
        batch_limit: usize,
    ) -> Result<PruneRound, StorageError> {
        if !self.store.exists(&root).await? {
            return Ok(PruneRound::untouched(false));
        }
        if !self
            .store
            .has_aspect(&root, &model::aspect_archived())
            .await?
        {
            tracing::warn!("Candidate {} lost its archive marker, leaving it", root);
            return Ok(PruneRound::untouched(true));
        }
        match self.policy.must_protect(&root).await {
            Ok(true) => return Ok(PruneRound::untouched(true)),
            Ok(false) => {}
            // The candidate went away between the existence check and here;
            // another actor already did the work.
            Err(StorageError::NodeNotFound(_)) => return Ok(PruneRound::untouched(false)),
            Err(err) => return Err(err),
        }
        let archived_at = self
            .store
            .get_property(&root, &model::prop_archived_date())
            .await?
            .and_then(|value| value.as_timestamp());
        match archived_at {
            None => {
                tracing::warn!("Candidate {} has no archive timestamp, leaving it", root);
                return Ok(PruneRound::untouched(true));
            }
            Some(archived_at) if archived_at >= cutoff => {
                return Ok(PruneRound::untouched(true));
            }
            Some(_) => {}
        }

        let mut state = RoundState {
            deleted: 0,
            skipped: false,
            batch_limit,
        };
        self.prune_node(root, &mut state).await?;
        Ok(PruneRound {
            deleted: state.deleted,
            skipped: state.skipped,
        })
    }

    /// Post-order deletion. A node is deleted only once all of its children
    /// are gone, so the bottom of a large tree is consumed first and a
    /// partially-pruned tree is always a valid tree. Returns whether the
    /// node itself was deleted.
    fn prune_node<'a>(
        &'a self,
        node: NodeRef,
        state: &'a mut RoundState,
    ) -> BoxFuture<'a, Result<bool, StorageError>> {
        async move {
            // A node deleted by another actor mid-round reads as not found;
            // gone is exactly the outcome a delete would have produced, so
            // it is never an error and never counted.
            let children = match self.store.get_children(&node).await {
                Ok(children) => children,
                Err(StorageError::NodeNotFound(_)) => return Ok(true),
                Err(err) => return Err(err),
            };
            let mut subtree_clear = true;
            for child in children {
                if state.deleted >= state.batch_limit {
                    subtree_clear = false;
                    break;
                }
                if !self.prune_node(child, state).await? {
                    subtree_clear = false;
                }
            }
            // A surviving descendant (protected or out of budget) keeps
            // every ancestor alive for the next round.
            if !subtree_clear || state.deleted >= state.batch_limit {
                return Ok(false);
            }
            match self.policy.must_protect(&node).await {
                Ok(true) => {
                    state.skipped = true;
                    return Ok(false);
                }
                Ok(false) => {}
                Err(StorageError::NodeNotFound(_)) => return Ok(true),
                Err(err) => return Err(err),
            }
            self.store.delete_node(&node).await?;
            state.deleted += 1;
            Ok(true)
        }
        .boxed()
    }
}
