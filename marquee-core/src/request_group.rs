//! Cancellation scopes for in-flight network operations.
//!
//! Every network call made on behalf of one user-visible intent (one open
//! detail view, one prefetch target) runs under a named group. Cancelling the
//! group cancels every operation issued under it, including ones issued
//! after the group was created; late results for a cancelled group must be
//! discarded by their callers.

use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct GroupEntry {
    token: CancellationToken,
    live_ops: usize,
}

/// Registry of named cancellation groups.
///
/// Clone-cheap; all clones share the same groups.
#[derive(Clone, Default)]
pub struct RequestGroupRegistry {
    groups: Arc<DashMap<String, GroupEntry>>,
}

impl std::fmt::Debug for RequestGroupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGroupRegistry")
            .field("groups", &self.groups.len())
            .finish()
    }
}

impl RequestGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue an operation handle under `group_id`, creating the group on
    /// first use. The handle deregisters itself on drop.
    pub fn issue(&self, group_id: &str) -> OperationHandle {
        let token = {
            let mut entry = self
                .groups
                .entry(group_id.to_string())
                .or_insert_with(|| GroupEntry {
                    token: CancellationToken::new(),
                    live_ops: 0,
                });
            entry.live_ops += 1;
            entry.token.clone()
        };
        OperationHandle {
            token: token.child_token(),
            registry: self.clone(),
            group_id: group_id.to_string(),
        }
    }

    /// Cancel every operation in `group_id`. Later `issue` calls for the
    /// same id start a fresh, uncancelled group.
    pub fn cancel_group(&self, group_id: &str) {
        if let Some((_, entry)) = self.groups.remove(group_id) {
            debug!(target: "trailer::groups", group = %group_id, ops = entry.live_ops, "cancelling group");
            entry.token.cancel();
        }
    }

    /// Cancel everything. Used at subsystem teardown.
    pub fn cancel_all(&self) {
        let ids: Vec<String> = self.groups.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.cancel_group(&id);
        }
    }

    pub fn is_cancelled(&self, group_id: &str) -> bool {
        match self.groups.get(group_id) {
            Some(entry) => entry.token.is_cancelled(),
            // Removed means cancelled (or never issued, which callers treat
            // the same way: don't commit results).
            None => true,
        }
    }

    /// Number of live operations across all groups.
    pub fn live_operations(&self) -> usize {
        self.groups.iter().map(|e| e.live_ops).sum()
    }

    fn release(&self, group_id: &str) {
        self.groups.remove_if_mut(group_id, |_, entry| {
            entry.live_ops = entry.live_ops.saturating_sub(1);
            entry.live_ops == 0
        });
    }
}

/// One operation's membership in a group. Await [`cancelled`] in a `select!`
/// arm, or poll [`is_cancelled`] before committing results.
///
/// [`cancelled`]: OperationHandle::cancelled
/// [`is_cancelled`]: OperationHandle::is_cancelled
pub struct OperationHandle {
    token: CancellationToken,
    registry: RequestGroupRegistry,
    group_id: String,
}

impl OperationHandle {
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Token for passing into spawned sub-tasks of this operation.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}

impl Drop for OperationHandle {
    fn drop(&mut self) {
        self.registry.release(&self.group_id);
    }
}

impl std::fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationHandle")
            .field("group_id", &self.group_id)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
