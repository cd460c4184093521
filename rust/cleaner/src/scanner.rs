use chrono::{DateTime, Utc};
use std::sync::Arc;
use trashcan_storage::{model, NodeRef, NodeStore, StorageError, TransactionRunner};

/// A direct child of the archive root, paired with its archive timestamp.
/// `archived_at` is `None` when the timestamp property is missing, which the
/// sweep treats as inconsistent metadata. The name is carried for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub node: NodeRef,
    pub name: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// Pages through the archive root's children, oldest first.
///
/// The scanner owns the ordering contract: candidates are sorted by archive
/// timestamp ascending with missing timestamps first. The sweep's early
/// exit on a too-young candidate is only sound because of this order, and
/// missing-timestamp candidates surface immediately instead of starving
/// behind it.
#[derive(Debug)]
pub struct CandidateScanner {
    store: Arc<dyn NodeStore>,
    transactions: TransactionRunner,
}

impl CandidateScanner {
    pub fn new(store: Arc<dyn NodeStore>, transactions: TransactionRunner) -> Self {
        CandidateScanner {
            store,
            transactions,
        }
    }

    /// One page of candidates after `skip_offset`, at most `page_size`
    /// entries, in a read-only transaction. An empty page means the archive
    /// is drained past the offset.
    pub async fn fetch_page(
        &self,
        skip_offset: usize,
        page_size: usize,
    ) -> Result<Vec<Candidate>, StorageError> {
        self.transactions
            .run_in_transaction(
                || async move {
                    let root = self.store.archive_root().await?;
                    let children = self.store.get_children(&root).await?;
                    let mut candidates = Vec::with_capacity(children.len());
                    for child in children {
                        let name = self
                            .store
                            .get_property(&child, &model::prop_name())
                            .await?
                            .and_then(|value| value.as_text().map(str::to_string));
                        let archived_at = self
                            .store
                            .get_property(&child, &model::prop_archived_date())
                            .await?
                            .and_then(|value| value.as_timestamp());
                        candidates.push(Candidate {
                            node: child,
                            name,
                            archived_at,
                        });
                    }
                    // None sorts before Some, putting inconsistent
                    // candidates at the front of the very first page.
                    candidates.sort_by_key(|candidate| candidate.archived_at);
                    Ok(candidates
                        .into_iter()
                        .skip(skip_offset)
                        .take(page_size)
                        .collect())
                },
                true,
                false,
            )
            .await
    }
}
