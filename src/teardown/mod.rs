//! Removal of the base stack family in one region.
//!
//! A pass lists the family, plans the deletions with [`TeardownPlan`] and
//! then executes the plan in order. Stacks whose status forbids automated
//! deletion are reported for manual removal instead of being touched.

mod plan;

use futures::TryStreamExt;
use tracing::warn;

use crate::error::StackError;
use crate::lifecycle::StackLifecycle;
use crate::naming::IAM_STACK_NAME;
use crate::remote::{CloudFormationApi, FAMILY_PATTERN, RemoteStateReader, StackSummary};
use crate::status::{ALL_EXCEPT_DELETED, StackStatus};
use crate::store::TemplateStore;

pub use plan::{TeardownPlan, TeardownScope, TeardownStep};

/// Stack left in place because its status forbids automated deletion.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManualRemoval {
    /// Stack name.
    pub stack_name: String,
    /// Blocking status.
    pub status: StackStatus,
}

/// What a teardown pass did.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TeardownSummary {
    /// Stacks deleted, in order.
    pub deleted: Vec<String>,
    /// Stacks that need an operator.
    pub manual: Vec<ManualRemoval>,
}

/// Tears down the base stack family visible to a lifecycle.
#[derive(Debug)]
pub struct FleetTeardown<'a, A, S> {
    lifecycle: &'a StackLifecycle<A, S>,
}

impl<'a, A, S> FleetTeardown<'a, A, S>
where
    A: CloudFormationApi,
    S: TemplateStore,
{
    /// Creates a teardown bound to `lifecycle`'s account, region and names.
    #[must_use]
    pub const fn new(lifecycle: &'a StackLifecycle<A, S>) -> Self {
        Self { lifecycle }
    }

    /// Deletes every base stack in the region.
    ///
    /// # Errors
    ///
    /// Returns listing, status and deletion failures.
    pub async fn delete_all(&self, wait_override: bool) -> Result<TeardownSummary, StackError> {
        self.run(false, wait_override).await
    }

    /// Deletes base stacks whose names are no longer current, waiting for
    /// each deletion.
    ///
    /// # Errors
    ///
    /// Returns listing, status and deletion failures.
    pub async fn delete_deprecated_only(&self) -> Result<TeardownSummary, StackError> {
        self.run(true, true).await
    }

    /// Plans a pass without executing it.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Api`] when the family cannot be listed.
    pub async fn plan(
        &self,
        deprecated_only: bool,
        wait_override: bool,
    ) -> Result<TeardownPlan, StackError> {
        let identity = self.lifecycle.identity();
        let scope = TeardownScope {
            deprecated_only,
            home_region: identity.is_home_region(),
            valid_names: identity.valid_stack_names(),
            wait_override,
        };
        let candidates = self.list_family().await?;
        Ok(TeardownPlan::compute(&candidates, &scope))
    }

    async fn run(
        &self,
        deprecated_only: bool,
        wait_override: bool,
    ) -> Result<TeardownSummary, StackError> {
        let plan = self.plan(deprecated_only, wait_override).await?;
        self.execute(plan).await
    }

    async fn list_family(&self) -> Result<Vec<StackSummary>, StackError> {
        let scope = self.lifecycle.scope();
        RemoteStateReader::new(self.lifecycle.api(), scope)
            .list_family(&FAMILY_PATTERN, &ALL_EXCEPT_DELETED)
            .try_collect()
            .await
            .map_err(|source| StackError::Api {
                context: scope.context(self.lifecycle.identity().name()),
                operation: "list_stacks",
                source,
            })
    }

    /// Runs `plan` in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing deletion.
    pub async fn execute(&self, plan: TeardownPlan) -> Result<TeardownSummary, StackError> {
        let mut summary = TeardownSummary::default();
        for step in plan {
            match step {
                TeardownStep::DeleteIamStackIfPresent => {
                    self.delete_iam_stack_if_present(&mut summary).await?;
                }
                TeardownStep::Delete {
                    stack_name, wait, ..
                } => {
                    self.delete(stack_name, wait, &mut summary).await?;
                }
                TeardownStep::ManualRemoval { stack_name, status } => {
                    Self::instruct_operator(stack_name, status, &mut summary);
                }
            }
        }
        Ok(summary)
    }

    async fn delete_iam_stack_if_present(
        &self,
        summary: &mut TeardownSummary,
    ) -> Result<(), StackError> {
        let status = self.lifecycle.manager().status(IAM_STACK_NAME).await?;
        let Some(observed) = status else {
            return Ok(());
        };
        let candidate = StackSummary::new(IAM_STACK_NAME, observed);
        match TeardownPlan::step_for(&candidate, true) {
            TeardownStep::Delete {
                stack_name, wait, ..
            } => self.delete(stack_name, wait, summary).await,
            TeardownStep::ManualRemoval { stack_name, status } => {
                Self::instruct_operator(stack_name, status, summary);
                Ok(())
            }
            TeardownStep::DeleteIamStackIfPresent => Ok(()),
        }
    }

    async fn delete(
        &self,
        stack_name: String,
        wait: bool,
        summary: &mut TeardownSummary,
    ) -> Result<(), StackError> {
        let scope = self.lifecycle.scope();
        warn!(
            account = scope.account_label(),
            region = %scope.region,
            stack = %stack_name,
            "removing stack"
        );
        self.lifecycle.delete_stack(&stack_name, wait).await?;
        summary.deleted.push(stack_name);
        Ok(())
    }

    fn instruct_operator(stack_name: String, status: StackStatus, summary: &mut TeardownSummary) {
        warn!(
            stack = %stack_name,
            status = %status,
            "please remove this stack manually; its state implies it cannot be deleted automatically"
        );
        summary.manual.push(ManualRemoval { stack_name, status });
    }
}
