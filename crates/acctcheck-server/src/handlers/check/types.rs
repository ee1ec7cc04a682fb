//! Data types for check coordination.

use acctcheck_domain::{Category, CheckReport};
use tokio_util::sync::CancellationToken;

/// Lifecycle of one category task.
///
/// `Pending → Running → (Completed | Failed) → Reported`. `Reported` is reached
/// only after the coordinator's join barrier has observed the task finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, not yet handed to the runtime.
    Pending,
    /// Spawned on the coordinator's join set.
    Running,
    /// Finished and every candidate was answered.
    Completed,
    /// Finished with at least one failed check, or the task itself did not
    /// complete (panic or abort).
    Failed,
    /// Observed by the join barrier and folded into the report.
    Reported,
}

impl TaskState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Failed)
                | (TaskState::Completed, TaskState::Reported)
                | (TaskState::Failed, TaskState::Reported)
        )
    }
}

/// Bookkeeping for one dispatched category task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    /// Category the task checked.
    pub category: Category,
    /// Number of candidates handed to the task.
    pub candidates: usize,
    /// Current state.
    pub state: TaskState,
    /// Terminal state reached before reporting (`Completed` or `Failed`).
    pub terminal: Option<TaskState>,
}

impl TaskRecord {
    pub(crate) fn new(category: Category, candidates: usize) -> Self {
        Self {
            category,
            candidates,
            state: TaskState::Pending,
            terminal: None,
        }
    }

    /// Moves to `next`. Illegal transitions are ignored and return false.
    pub(crate) fn advance(&mut self, next: TaskState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        if matches!(next, TaskState::Completed | TaskState::Failed) {
            self.terminal = Some(next);
        }
        self.state = next;
        true
    }
}

/// Per-call options for [`super::CheckCoordinator::check_with`].
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Correlation id; generated when absent.
    pub request_id: Option<String>,
    /// Caller-owned token. Cancelling it cancels the request.
    pub parent_cancel: Option<CancellationToken>,
}

impl CheckOptions {
    /// Sets the correlation id.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Links the request to a caller-owned cancellation token.
    pub fn with_parent_cancel(mut self, token: CancellationToken) -> Self {
        self.parent_cancel = Some(token);
        self
    }
}

/// Result of one coordinated check.
#[derive(Debug, Clone)]
pub struct CheckResponse {
    /// Correlation id of the request.
    pub request_id: String,
    /// Consolidated report.
    pub report: CheckReport,
    /// One record per dispatched category task.
    pub tasks: Vec<TaskRecord>,
}

/// Errors that fail a whole request.
///
/// Source failures never surface here; they are reported per category.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoordinatorError {
    /// Category tasks could not be run.
    #[error("dispatch error: {message}")]
    Dispatch { message: String },
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
