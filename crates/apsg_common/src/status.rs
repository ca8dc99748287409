//! Move completion handles.
//!
//! A [`MoveStatus`] is a cloneable token for one or more issued axis moves.
//! The axis side resolves it through the paired [`StatusNotifier`]. Statuses
//! combine with [`MoveStatus::all`] (or `&`): the combination succeeds when
//! every part succeeds and fails as soon as any part fails. Combining never
//! cancels anything; the parts keep moving and their later outcomes are
//! simply not reported through the combined status.
//!
//! When several parts fail, the combination reports the one that failed
//! first in time, both when peeked and when waited on.

use std::ops::BitAnd;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::error::MoveFault;

/// Global order in which failures were recorded.
static FAILURE_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq)]
enum StatusState {
    Pending,
    Done,
    Failed { fault: MoveFault, seq: u64 },
}

impl StatusState {
    fn failed(fault: MoveFault) -> Self {
        StatusState::Failed {
            fault,
            seq: FAILURE_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn outcome(&self) -> Option<Result<(), MoveFault>> {
        match self {
            StatusState::Pending => None,
            StatusState::Done => Some(Ok(())),
            StatusState::Failed { fault, .. } => Some(Err(fault.clone())),
        }
    }
}

/// A single issued move.
#[derive(Debug, Clone)]
struct Leaf {
    axis: Arc<str>,
    rx: watch::Receiver<StatusState>,
}

impl Leaf {
    fn state(&self) -> StatusState {
        self.rx.borrow().clone()
    }

    async fn wait(mut self) -> Result<(), MoveFault> {
        loop {
            let current = self.rx.borrow_and_update().outcome();
            if let Some(outcome) = current {
                return outcome;
            }
            if self.rx.changed().await.is_err() {
                // Notifier gone; it may still have resolved right before dropping
                return self.state().outcome().unwrap_or_else(|| {
                    Err(MoveFault::Abandoned {
                        axis: self.axis.to_string(),
                    })
                });
            }
        }
    }
}

/// Completion handle for issued axis moves.
///
/// Combinations are kept flat, so waiting on nested combinations never
/// recurses.
#[derive(Debug, Clone, Default)]
pub struct MoveStatus {
    leaves: Vec<Leaf>,
}

/// Axis-side half of a pending [`MoveStatus`].
#[derive(Debug)]
pub struct StatusNotifier {
    axis: Arc<str>,
    tx: watch::Sender<StatusState>,
}

impl StatusNotifier {
    pub fn axis(&self) -> &str {
        &self.axis
    }

    pub fn finish(self) {
        self.tx.send_replace(StatusState::Done);
    }

    pub fn fail(self, message: impl Into<String>) {
        let fault = MoveFault::axis(self.axis.as_ref(), message);
        self.fail_with(fault);
    }

    pub fn fail_with(self, fault: MoveFault) {
        self.tx.send_replace(StatusState::failed(fault));
    }

    /// True once every handle for this move has been dropped.
    pub fn is_orphaned(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Drop for StatusNotifier {
    /// An unresolved move whose axis side goes away fails as abandoned.
    fn drop(&mut self) {
        let axis = &self.axis;
        self.tx.send_if_modified(|state| {
            if *state != StatusState::Pending {
                return false;
            }
            *state = StatusState::failed(MoveFault::Abandoned {
                axis: axis.to_string(),
            });
            true
        });
    }
}

impl MoveStatus {
    /// A status for a move that has been issued but not yet resolved.
    pub fn pending(axis: &str) -> (MoveStatus, StatusNotifier) {
        let (tx, rx) = watch::channel(StatusState::Pending);
        let axis: Arc<str> = Arc::from(axis);
        let status = MoveStatus {
            leaves: vec![Leaf {
                axis: axis.clone(),
                rx,
            }],
        };
        (status, StatusNotifier { axis, tx })
    }

    /// An already successful status. Also the identity for [`all`](Self::all).
    pub fn done() -> Self {
        Self::default()
    }

    pub fn failed(fault: MoveFault) -> Self {
        let axis: Arc<str> = match &fault {
            MoveFault::Axis { axis, .. }
            | MoveFault::OutOfRange { axis, .. }
            | MoveFault::Abandoned { axis } => Arc::from(axis.as_str()),
            MoveFault::TimedOut(_) => Arc::from("combined"),
        };
        let (_tx, rx) = watch::channel(StatusState::failed(fault));
        MoveStatus {
            leaves: vec![Leaf { axis, rx }],
        }
    }

    /// Logical AND of `statuses`.
    pub fn all(statuses: impl IntoIterator<Item = MoveStatus>) -> Self {
        MoveStatus {
            leaves: statuses.into_iter().flat_map(|s| s.leaves).collect(),
        }
    }

    /// Number of individual axis moves behind this status.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Non-blocking peek at the combined result.
    ///
    /// `Some(Err(_))` as soon as any part failed, `Some(Ok(()))` once all
    /// parts succeeded, `None` otherwise.
    pub fn outcome(&self) -> Option<Result<(), MoveFault>> {
        let mut pending = false;
        let mut first_failure: Option<(u64, MoveFault)> = None;
        for leaf in &self.leaves {
            match leaf.state() {
                StatusState::Failed { fault, seq } => {
                    if first_failure.as_ref().map_or(true, |(first, _)| seq < *first) {
                        first_failure = Some((seq, fault));
                    }
                }
                StatusState::Pending => pending = true,
                StatusState::Done => {}
            }
        }
        match first_failure {
            Some((_, fault)) => Some(Err(fault)),
            None if pending => None,
            None => Some(Ok(())),
        }
    }

    pub fn is_done(&self) -> bool {
        self.outcome().is_some()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome(), Some(Ok(())))
    }

    /// True once no part is still pending, even if the combined result
    /// already failed early.
    pub fn all_parts_resolved(&self) -> bool {
        self.leaves
            .iter()
            .all(|leaf| leaf.state() != StatusState::Pending)
    }

    /// Wait for the combined result.
    ///
    /// Returns without yielding when the status is already resolved.
    pub async fn wait(&self) -> Result<(), MoveFault> {
        if let Some(outcome) = self.outcome() {
            return outcome;
        }

        let mut pending: Vec<Leaf> = self
            .leaves
            .iter()
            .filter(|leaf| leaf.state() == StatusState::Pending)
            .cloned()
            .collect();

        if pending.len() == 1 {
            if let Some(leaf) = pending.pop() {
                return leaf.wait().await;
            }
        }

        let mut join_set = JoinSet::new();
        for leaf in pending {
            join_set.spawn(leaf.wait());
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                // Another part may have failed earlier than the one joined first
                Ok(Err(fault)) => {
                    return match self.outcome() {
                        Some(Err(first)) => Err(first),
                        _ => Err(fault),
                    }
                }
                Err(e) => {
                    return Err(MoveFault::axis(
                        "combined",
                        format!("waiter task failed: {}", e),
                    ))
                }
            }
        }
        Ok(())
    }

    /// [`wait`](Self::wait) with an upper bound. The moves themselves are not
    /// affected when the bound expires.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<(), MoveFault> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(MoveFault::TimedOut(timeout)),
        }
    }
}

impl BitAnd for MoveStatus {
    type Output = MoveStatus;

    fn bitand(self, rhs: MoveStatus) -> MoveStatus {
        MoveStatus::all([self, rhs])
    }
}
