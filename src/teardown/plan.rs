//! Pure teardown planning.
//!
//! The plan is computed from a listing snapshot before anything is deleted,
//! so the ordering rules can be checked without a remote service. The
//! privileged IAM stack carries policies attached to roles inside the base
//! stacks; those policies must go before the roles can, hence the IAM stack
//! is always planned ahead of the first base stack removed in the home
//! region.

use std::collections::BTreeSet;

use tracing::debug;

use crate::naming::IAM_STACK_NAME;
use crate::remote::StackSummary;
use crate::status::StackStatus;

/// Inputs that shape a teardown pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TeardownScope {
    /// Only remove stacks whose names are no longer current.
    pub deprecated_only: bool,
    /// The pass runs in the deployment home region.
    pub home_region: bool,
    /// Names that are still current.
    pub valid_names: BTreeSet<String>,
    /// Wait for each planned deletion.
    pub wait_override: bool,
}

/// One planned action.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TeardownStep {
    /// Remove the privileged IAM stack if it exists when the step runs.
    DeleteIamStackIfPresent,
    /// Remove a stack whose status allows automated deletion.
    Delete {
        /// Stack to delete.
        stack_name: String,
        /// Status observed in the listing.
        status: StackStatus,
        /// Wait for the deletion to finish.
        wait: bool,
    },
    /// Leave a stack for an operator.
    ManualRemoval {
        /// Stack that needs manual removal.
        stack_name: String,
        /// Status that blocks automated deletion.
        status: StackStatus,
    },
}

/// Ordered list of teardown actions.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TeardownPlan {
    steps: Vec<TeardownStep>,
}

#[derive(Default)]
struct PassState {
    deleted_any: bool,
    bootstrap_found: bool,
    iam_handled: bool,
}

impl TeardownPlan {
    /// Plans a pass over `candidates`, in listing order.
    #[must_use]
    pub fn compute(candidates: &[StackSummary], scope: &TeardownScope) -> Self {
        let mut steps = Vec::new();
        let mut pass = PassState::default();

        for candidate in candidates {
            let name = candidate.name.as_str();
            let is_iam = name == IAM_STACK_NAME;
            if candidate.is_nested() {
                continue;
            }
            if is_iam && pass.iam_handled {
                continue;
            }
            if scope.deprecated_only && scope.valid_names.contains(name) {
                if !is_iam {
                    pass.bootstrap_found = true;
                }
                continue;
            }
            if candidate.status.is_deleted() {
                continue;
            }
            debug!(stack = name, "base stack should be deleted");

            if !pass.deleted_any && scope.home_region && !is_iam {
                steps.push(TeardownStep::DeleteIamStackIfPresent);
                pass.iam_handled = true;
            }
            steps.push(Self::step_for(candidate, scope.wait_override));
            if is_iam {
                pass.iam_handled = true;
            }
            pass.deleted_any = true;
        }

        if scope.deprecated_only && !pass.bootstrap_found && !pass.deleted_any {
            steps.push(TeardownStep::DeleteIamStackIfPresent);
        }
        Self { steps }
    }

    /// Step for a stack observed in `status`.
    #[must_use]
    pub fn step_for(candidate: &StackSummary, wait: bool) -> TeardownStep {
        if candidate.status.is_safely_deletable() {
            TeardownStep::Delete {
                stack_name: candidate.name.clone(),
                status: candidate.status,
                wait,
            }
        } else {
            TeardownStep::ManualRemoval {
                stack_name: candidate.name.clone(),
                status: candidate.status,
            }
        }
    }

    /// Planned steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[TeardownStep] {
        &self.steps
    }

    /// Returns `true` when nothing is planned.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl IntoIterator for TeardownPlan {
    type Item = TeardownStep;
    type IntoIter = std::vec::IntoIter<TeardownStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}
