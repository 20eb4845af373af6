//! Closed vocabulary of remote stack and change-set states.
//!
//! The remote service owns these states; the orchestrator only reads them.
//! Every state maps totally onto the traits the orchestrator reacts to
//! ([`StatusTraits`]), so membership questions never consult ad hoc lists.
//! An absent stack is modelled as `Option::<StackStatus>::None`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use thiserror::Error;

/// Status of a remote stack.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum StackStatus {
    /// `CREATE_IN_PROGRESS`
    CreateInProgress,
    /// `CREATE_FAILED`
    CreateFailed,
    /// `CREATE_COMPLETE`
    CreateComplete,
    /// `ROLLBACK_IN_PROGRESS`
    RollbackInProgress,
    /// `ROLLBACK_FAILED`
    RollbackFailed,
    /// `ROLLBACK_COMPLETE`
    RollbackComplete,
    /// `DELETE_IN_PROGRESS`
    DeleteInProgress,
    /// `DELETE_FAILED`
    DeleteFailed,
    /// `DELETE_COMPLETE`
    DeleteComplete,
    /// `UPDATE_IN_PROGRESS`
    UpdateInProgress,
    /// `UPDATE_COMPLETE_CLEANUP_IN_PROGRESS`
    UpdateCompleteCleanupInProgress,
    /// `UPDATE_COMPLETE`
    UpdateComplete,
    /// `UPDATE_FAILED`
    UpdateFailed,
    /// `UPDATE_ROLLBACK_IN_PROGRESS`
    UpdateRollbackInProgress,
    /// `UPDATE_ROLLBACK_FAILED`
    UpdateRollbackFailed,
    /// `UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS`
    UpdateRollbackCompleteCleanupInProgress,
    /// `UPDATE_ROLLBACK_COMPLETE`
    UpdateRollbackComplete,
    /// `REVIEW_IN_PROGRESS`: a change set exists but was never applied.
    ReviewInProgress,
    /// `IMPORT_IN_PROGRESS`
    ImportInProgress,
    /// `IMPORT_COMPLETE`
    ImportComplete,
    /// `IMPORT_ROLLBACK_IN_PROGRESS`
    ImportRollbackInProgress,
    /// `IMPORT_ROLLBACK_FAILED`
    ImportRollbackFailed,
    /// `IMPORT_ROLLBACK_COMPLETE`
    ImportRollbackComplete,
}

/// What the orchestrator may do with a stack in a given state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusTraits {
    /// No remote operation is running against the stack.
    pub terminal: bool,
    /// Teardown may delete the stack without operator involvement.
    pub safely_deletable: bool,
    /// A new deployment must delete the stack and create it afresh.
    pub requires_recreate: bool,
    /// Waiter that blocks until the running operation settles.
    pub waiter: Option<WaiterKind>,
}

impl StatusTraits {
    const fn settled(safely_deletable: bool, requires_recreate: bool) -> Self {
        Self {
            terminal: true,
            safely_deletable,
            requires_recreate,
            waiter: None,
        }
    }

    const fn running(waiter: Option<WaiterKind>) -> Self {
        Self {
            terminal: false,
            safely_deletable: false,
            requires_recreate: false,
            waiter,
        }
    }
}

/// Every status except `DELETE_COMPLETE`, used to filter family listings.
pub static ALL_EXCEPT_DELETED: LazyLock<Vec<StackStatus>> = LazyLock::new(|| {
    StackStatus::ALL
        .into_iter()
        .filter(|status| !status.is_deleted())
        .collect()
});

impl StackStatus {
    /// Every status the service reports.
    pub const ALL: [Self; 23] = [
        Self::CreateInProgress,
        Self::CreateFailed,
        Self::CreateComplete,
        Self::RollbackInProgress,
        Self::RollbackFailed,
        Self::RollbackComplete,
        Self::DeleteInProgress,
        Self::DeleteFailed,
        Self::DeleteComplete,
        Self::UpdateInProgress,
        Self::UpdateCompleteCleanupInProgress,
        Self::UpdateComplete,
        Self::UpdateFailed,
        Self::UpdateRollbackInProgress,
        Self::UpdateRollbackFailed,
        Self::UpdateRollbackCompleteCleanupInProgress,
        Self::UpdateRollbackComplete,
        Self::ReviewInProgress,
        Self::ImportInProgress,
        Self::ImportComplete,
        Self::ImportRollbackInProgress,
        Self::ImportRollbackFailed,
        Self::ImportRollbackComplete,
    ];

    /// Returns the wire representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateFailed => "CREATE_FAILED",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            Self::RollbackFailed => "ROLLBACK_FAILED",
            Self::RollbackComplete => "ROLLBACK_COMPLETE",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Self::UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            Self::UpdateComplete => "UPDATE_COMPLETE",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS",
            Self::UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED",
            Self::UpdateRollbackCompleteCleanupInProgress => {
                "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            Self::UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            Self::ReviewInProgress => "REVIEW_IN_PROGRESS",
            Self::ImportInProgress => "IMPORT_IN_PROGRESS",
            Self::ImportComplete => "IMPORT_COMPLETE",
            Self::ImportRollbackInProgress => "IMPORT_ROLLBACK_IN_PROGRESS",
            Self::ImportRollbackFailed => "IMPORT_ROLLBACK_FAILED",
            Self::ImportRollbackComplete => "IMPORT_ROLLBACK_COMPLETE",
        }
    }

    /// Total mapping from status to the traits the orchestrator acts on.
    #[must_use]
    pub const fn traits(self) -> StatusTraits {
        match self {
            Self::CreateComplete
            | Self::UpdateComplete
            | Self::UpdateRollbackComplete
            | Self::UpdateRollbackFailed => StatusTraits::settled(true, false),
            Self::CreateFailed
            | Self::RollbackFailed
            | Self::RollbackComplete
            | Self::DeleteFailed => StatusTraits::settled(true, true),
            Self::DeleteComplete
            | Self::UpdateFailed
            | Self::ImportComplete
            | Self::ImportRollbackFailed
            | Self::ImportRollbackComplete => StatusTraits::settled(false, false),
            Self::ReviewInProgress => StatusTraits {
                terminal: false,
                safely_deletable: true,
                requires_recreate: true,
                waiter: Some(WaiterKind::ChangeSetCreateComplete),
            },
            Self::CreateInProgress => StatusTraits::running(Some(WaiterKind::StackCreateComplete)),
            Self::UpdateInProgress => StatusTraits::running(Some(WaiterKind::StackUpdateComplete)),
            Self::UpdateRollbackInProgress | Self::UpdateRollbackCompleteCleanupInProgress => {
                StatusTraits::running(Some(WaiterKind::StackRollbackComplete))
            }
            Self::DeleteInProgress => StatusTraits::running(Some(WaiterKind::StackDeleteComplete)),
            Self::RollbackInProgress
            | Self::UpdateCompleteCleanupInProgress
            | Self::ImportInProgress
            | Self::ImportRollbackInProgress => {
                StatusTraits::running(Some(WaiterKind::StackSettled))
            }
        }
    }

    /// Returns `true` when no remote operation is running.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.traits().terminal
    }

    /// Returns `true` when teardown may delete the stack automatically.
    #[must_use]
    pub const fn is_safely_deletable(self) -> bool {
        self.traits().safely_deletable
    }

    /// Returns `true` when a deployment must delete the stack first.
    #[must_use]
    pub const fn requires_recreate(self) -> bool {
        self.traits().requires_recreate
    }

    /// Waiter to block on before acting on a stack in this state.
    #[must_use]
    pub const fn in_progress_waiter(self) -> Option<WaiterKind> {
        self.traits().waiter
    }

    /// Returns `true` for `DELETE_COMPLETE`.
    #[must_use]
    pub const fn is_deleted(self) -> bool {
        matches!(self, Self::DeleteComplete)
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when the service reports a status outside the known vocabulary.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("unknown {kind} status: {value}")]
pub struct StatusParseError {
    /// Which vocabulary was being parsed (`stack` or `change set`).
    pub kind: &'static str,
    /// Raw value received.
    pub value: String,
}

impl FromStr for StackStatus {
    type Err = StatusParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| StatusParseError {
                kind: "stack",
                value: value.to_owned(),
            })
    }
}

/// Status of a change set.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ChangeSetStatus {
    /// `CREATE_PENDING`
    CreatePending,
    /// `CREATE_IN_PROGRESS`
    CreateInProgress,
    /// `CREATE_COMPLETE`
    CreateComplete,
    /// `DELETE_PENDING`
    DeletePending,
    /// `DELETE_IN_PROGRESS`
    DeleteInProgress,
    /// `DELETE_COMPLETE`
    DeleteComplete,
    /// `DELETE_FAILED`
    DeleteFailed,
    /// `FAILED`
    Failed,
}

impl ChangeSetStatus {
    /// Every change-set status the service reports.
    pub const ALL: [Self; 8] = [
        Self::CreatePending,
        Self::CreateInProgress,
        Self::CreateComplete,
        Self::DeletePending,
        Self::DeleteInProgress,
        Self::DeleteComplete,
        Self::DeleteFailed,
        Self::Failed,
    ];

    /// Returns the wire representation of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreatePending => "CREATE_PENDING",
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::DeletePending => "DELETE_PENDING",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ChangeSetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeSetStatus {
    type Err = StatusParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| StatusParseError {
                kind: "change set",
                value: value.to_owned(),
            })
    }
}

/// Bounded polling loops offered by the remote service.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum WaiterKind {
    /// Stack reaches `CREATE_COMPLETE`.
    StackCreateComplete,
    /// Stack reaches `UPDATE_COMPLETE`.
    StackUpdateComplete,
    /// Stack reaches `UPDATE_ROLLBACK_COMPLETE`.
    StackRollbackComplete,
    /// Stack reaches `DELETE_COMPLETE` or disappears.
    StackDeleteComplete,
    /// Change set reaches `CREATE_COMPLETE`.
    ChangeSetCreateComplete,
    /// Stack leaves a running state that has no dedicated service waiter.
    StackSettled,
}

/// Verdict of a waiter on one observation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Acceptance {
    /// The awaited condition holds.
    Success,
    /// The operation settled in a state the waiter treats as failure.
    Failure,
    /// Keep polling.
    Retry,
}

impl WaiterKind {
    /// Returns the service-side waiter name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StackCreateComplete => "stack_create_complete",
            Self::StackUpdateComplete => "stack_update_complete",
            Self::StackRollbackComplete => "stack_rollback_complete",
            Self::StackDeleteComplete => "stack_delete_complete",
            Self::ChangeSetCreateComplete => "change_set_create_complete",
            Self::StackSettled => "stack_settled",
        }
    }

    /// Maximum number of observations before the waiter times out.
    #[must_use]
    pub const fn max_attempts(self) -> u32 {
        match self {
            Self::ChangeSetCreateComplete => 20,
            _ => 45,
        }
    }

    /// Returns `true` for waiters that observe change sets, not stacks.
    #[must_use]
    pub const fn observes_change_set(self) -> bool {
        matches!(self, Self::ChangeSetCreateComplete)
    }

    /// Judges one observation of a stack status. `None` means the stack
    /// does not exist.
    #[must_use]
    pub const fn accept_stack(self, status: Option<StackStatus>) -> Acceptance {
        use StackStatus as S;

        let Some(status) = status else {
            return match self {
                Self::StackDeleteComplete | Self::StackSettled => Acceptance::Success,
                _ => Acceptance::Failure,
            };
        };
        match (self, status) {
            (Self::StackSettled, S::ReviewInProgress) => Acceptance::Success,
            (Self::StackSettled, _) if status.traits().terminal => Acceptance::Success,
            (Self::StackSettled, _) => Acceptance::Retry,
            (Self::StackCreateComplete, S::CreateComplete)
            | (Self::StackUpdateComplete, S::UpdateComplete)
            | (Self::StackRollbackComplete, S::UpdateRollbackComplete)
            | (Self::StackDeleteComplete, S::DeleteComplete) => Acceptance::Success,
            (
                Self::StackCreateComplete,
                S::CreateFailed
                | S::DeleteComplete
                | S::DeleteFailed
                | S::RollbackFailed
                | S::RollbackComplete,
            )
            | (
                Self::StackUpdateComplete,
                S::UpdateFailed | S::UpdateRollbackFailed | S::UpdateRollbackComplete,
            )
            | (
                Self::StackRollbackComplete,
                S::UpdateFailed | S::UpdateRollbackFailed | S::DeleteFailed,
            )
            | (
                Self::StackDeleteComplete,
                S::DeleteFailed
                | S::CreateFailed
                | S::RollbackFailed
                | S::UpdateRollbackInProgress
                | S::UpdateRollbackFailed
                | S::UpdateRollbackComplete
                | S::UpdateComplete,
            ) => Acceptance::Failure,
            (Self::ChangeSetCreateComplete, _) => Acceptance::Failure,
            _ => Acceptance::Retry,
        }
    }

    /// Judges one observation of a change-set status. `None` means the
    /// change set does not exist.
    #[must_use]
    pub const fn accept_change_set(self, status: Option<ChangeSetStatus>) -> Acceptance {
        match (self, status) {
            (Self::ChangeSetCreateComplete, Some(ChangeSetStatus::CreateComplete)) => {
                Acceptance::Success
            }
            (
                Self::ChangeSetCreateComplete,
                Some(ChangeSetStatus::CreatePending | ChangeSetStatus::CreateInProgress),
            ) => Acceptance::Retry,
            _ => Acceptance::Failure,
        }
    }
}

impl fmt::Display for WaiterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests;
