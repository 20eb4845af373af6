//! Staging, classifying and applying change sets for one stack.
//!
//! The manager re-reads remote status before acting, removes stale change
//! sets (or the whole stack when it cannot be updated), and treats an empty
//! diff as a benign "already up to date" outcome.

use tracing::{debug, error, info, warn};

use crate::error::{AccountScope, StackError};
use crate::remote::{
    Capability, ChangeSetRequest, ChangeSetType, CloudFormationApi, RemoteStateReader,
    ResourceTag,
};
use crate::status::{ChangeSetStatus, StackStatus, WaiterKind};
use crate::store::{StackParameter, TemplateStore};
use crate::types::{RoleArn, TemplateLocation};
use crate::wait::{self, CHANGE_SET_DELETE_ATTEMPTS, WaitPolicy};

/// Stack a change set is staged for, with the sources of its inputs.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StackTarget {
    /// Stack and change-set name.
    pub stack_name: String,
    /// Store key of the template, when it is looked up.
    pub template_key: Option<String>,
    /// Store key of the parameter file, when it is looked up.
    pub parameter_key: Option<String>,
    /// Explicit template location; the store is not consulted when set.
    pub template_location: Option<TemplateLocation>,
    /// Explicit parameters; the store is not consulted when set.
    pub parameters: Option<Vec<StackParameter>>,
}

impl StackTarget {
    /// Targets `stack_name` with no template sources yet.
    #[must_use]
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            ..Self::default()
        }
    }
}

/// Result of staging a change set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeSetOutcome {
    /// A change set is ready to execute.
    Staged,
    /// The candidate template produced an empty diff.
    NoChanges,
    /// No template is published for this stack.
    NoTemplate,
}

/// Drives change sets for stacks in one account and region.
#[derive(Debug)]
pub struct ChangeSetManager<'a, A: ?Sized, S: ?Sized> {
    api: &'a A,
    store: &'a S,
    scope: &'a AccountScope,
    policy: &'a WaitPolicy,
    role_arn: Option<&'a RoleArn>,
    wait: bool,
}

impl<'a, A, S> ChangeSetManager<'a, A, S>
where
    A: CloudFormationApi + ?Sized,
    S: TemplateStore + ?Sized,
{
    /// Creates a manager.
    #[must_use]
    pub const fn new(
        api: &'a A,
        store: &'a S,
        scope: &'a AccountScope,
        policy: &'a WaitPolicy,
    ) -> Self {
        Self {
            api,
            store,
            scope,
            policy,
            role_arn: None,
            wait: false,
        }
    }

    /// Passes `role_arn` to the service on every change set.
    #[must_use]
    pub const fn with_role_arn(mut self, role_arn: Option<&'a RoleArn>) -> Self {
        self.role_arn = role_arn;
        self
    }

    /// Blocks on executed change sets and stack deletions by default.
    #[must_use]
    pub const fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    fn reader(&self) -> RemoteStateReader<'a, A> {
        RemoteStateReader::new(self.api, self.scope)
    }

    /// Reads the current status of `stack_name`.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Api`] for any failure other than a missing
    /// stack.
    pub async fn status(&self, stack_name: &str) -> Result<Option<StackStatus>, StackError> {
        self.reader()
            .get_status(stack_name)
            .await
            .map_err(|source| {
                error!(
                    account = self.scope.account_label(),
                    region = %self.scope.region,
                    stack = stack_name,
                    error = %source,
                    "failed to read stack status"
                );
                StackError::Api {
                    context: self.scope.context(stack_name),
                    operation: "describe_stack",
                    source,
                }
            })
    }

    /// Waits for any running operation on `stack_name` to settle and
    /// returns the status observed afterwards.
    ///
    /// A stack in review is waited on through its change set. A failed
    /// change set at that point is tolerated: the stack is recreated by the
    /// next deployment anyway. Running states without a service waiter,
    /// such as `ROLLBACK_IN_PROGRESS`, are polled until the stack settles.
    ///
    /// # Errors
    ///
    /// Returns waiter timeouts, stack waiter failures and status read
    /// failures.
    pub async fn wait_if_in_progress(
        &self,
        stack_name: &str,
    ) -> Result<Option<StackStatus>, StackError> {
        let status = self.status(stack_name).await?;
        let Some(waiter) = status.and_then(StackStatus::in_progress_waiter) else {
            return Ok(status);
        };
        match wait::wait_for(self.api, self.scope, self.policy, stack_name, waiter).await {
            Ok(()) => {}
            Err(
                err @ StackError::WaiterFailed {
                    waiter: WaiterKind::ChangeSetCreateComplete,
                    ..
                },
            ) => {
                if !err.is_empty_change_set() {
                    warn!(
                        account = self.scope.account_label(),
                        region = %self.scope.region,
                        stack = stack_name,
                        error = %err,
                        "pending change set failed; the stack will be recreated"
                    );
                }
            }
            Err(err) => {
                error!(
                    account = self.scope.account_label(),
                    region = %self.scope.region,
                    stack = stack_name,
                    error = %err,
                    "failed to wait for stack"
                );
                return Err(err);
            }
        }
        self.status(stack_name).await
    }

    /// Picks create or update for a stack in `status`.
    #[must_use]
    pub const fn change_set_type(status: Option<StackStatus>) -> ChangeSetType {
        ChangeSetType::for_status(status)
    }

    /// Prepares `stack_name` for a new change set.
    ///
    /// A stack that must be recreated is deleted (waiting for completion).
    /// Otherwise a leftover change set is deleted and its disappearance
    /// confirmed.
    ///
    /// # Errors
    ///
    /// Returns deletion, waiter and status read failures.
    pub async fn clean_up_when_required(&self, stack_name: &str) -> Result<(), StackError> {
        let Some(status) = self.status(stack_name).await? else {
            return Ok(());
        };
        if status.requires_recreate() {
            info!(
                account = self.scope.account_label(),
                region = %self.scope.region,
                stack = stack_name,
                status = %status,
                "stack requires clean up before it can be modified; deleting it"
            );
            return self.delete_stack(stack_name, true).await;
        }
        if self.change_set_exists(stack_name).await {
            info!(
                account = self.scope.account_label(),
                region = %self.scope.region,
                stack = stack_name,
                "change set already exists; deleting it"
            );
            self.delete_change_set(stack_name).await;
            self.wait_until_change_set_deleted(stack_name).await?;
        }
        Ok(())
    }

    async fn change_set_exists(&self, stack_name: &str) -> bool {
        match self.api.describe_change_set(stack_name, stack_name).await {
            Ok(description) => description.status != ChangeSetStatus::DeleteComplete,
            Err(_) => false,
        }
    }

    /// Polls until the change set of `stack_name` is gone, backing off
    /// exponentially between checks.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::ChangeSetNotDeleted`] when it is still present
    /// after the final check.
    pub async fn wait_until_change_set_deleted(&self, stack_name: &str) -> Result<(), StackError> {
        for attempt in 0..CHANGE_SET_DELETE_ATTEMPTS {
            if !self.change_set_exists(stack_name).await {
                return Ok(());
            }
            if attempt.saturating_add(1) < CHANGE_SET_DELETE_ATTEMPTS {
                tokio::time::sleep(self.policy.backoff_delay(attempt)).await;
            }
        }
        Err(StackError::ChangeSetNotDeleted {
            context: self.scope.context(stack_name),
            attempts: CHANGE_SET_DELETE_ATTEMPTS,
        })
    }

    fn resolve_template(&self, target: &StackTarget) -> Result<Option<TemplateLocation>, StackError> {
        if let Some(location) = &target.template_location {
            return Ok(Some(location.clone()));
        }
        let Some(key) = target.template_key.as_deref() else {
            return Ok(None);
        };
        self.store
            .resolve(key)
            .map_err(|source| StackError::Store {
                context: self.scope.context(&target.stack_name),
                source,
            })
    }

    fn resolve_parameters(&self, target: &StackTarget) -> Vec<StackParameter> {
        if let Some(parameters) = &target.parameters {
            return parameters.clone();
        }
        let Some(key) = target.parameter_key.as_deref() else {
            return Vec::new();
        };
        self.store.read_parameters(key).unwrap_or_else(|err| {
            debug!(
                account = self.scope.account_label(),
                region = %self.scope.region,
                stack = %target.stack_name,
                error = %err,
                "no parameters found; using none"
            );
            Vec::new()
        })
    }

    async fn validate(&self, stack_name: &str, location: &TemplateLocation) -> Result<(), StackError> {
        self.api.validate_template(location).await.map_err(|source| {
            error!(
                account = self.scope.account_label(),
                region = %self.scope.region,
                stack = stack_name,
                template = %location,
                "template validation failed"
            );
            StackError::InvalidTemplate {
                context: self.scope.context(stack_name),
                location: location.clone(),
                message: source.to_string(),
            }
        })
    }

    /// Stages a change set for `target`.
    ///
    /// `change_set_type` must be computed from the status observed before
    /// clean-up, since clean-up may delete the stack.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::InvalidTemplate`] when validation fails,
    /// [`StackError::AccountConfiguration`] when clean-up is rejected or
    /// the change set cannot be created or fails for a reason other than an
    /// empty diff, and waiter timeouts unchanged.
    pub async fn stage(
        &self,
        target: &StackTarget,
        change_set_type: ChangeSetType,
    ) -> Result<ChangeSetOutcome, StackError> {
        let stack_name = target.stack_name.as_str();
        debug!(
            account = self.scope.account_label(),
            region = %self.scope.region,
            stack = stack_name,
            "creating change set"
        );
        let Some(location) = self.resolve_template(target)? else {
            debug!(
                account = self.scope.account_label(),
                region = %self.scope.region,
                stack = stack_name,
                "no template published; nothing to deploy"
            );
            return Ok(ChangeSetOutcome::NoTemplate);
        };
        self.validate(stack_name, &location).await?;

        let request = ChangeSetRequest {
            stack_name: stack_name.to_owned(),
            change_set_name: stack_name.to_owned(),
            template_location: location,
            parameters: self.resolve_parameters(target),
            capabilities: Capability::REQUIRED.to_vec(),
            tags: vec![ResourceTag::created_by()],
            change_set_type,
            role_arn: self.role_arn.cloned(),
        };
        self.clean_up_when_required(stack_name)
            .await
            .map_err(|err| match err {
                StackError::Api { context, source, .. } => StackError::AccountConfiguration {
                    context,
                    message: source.to_string(),
                },
                StackError::WaiterFailed {
                    context,
                    waiter,
                    status,
                    reason,
                } => StackError::AccountConfiguration {
                    context,
                    message: format!("{waiter} observed {status}: {reason}"),
                },
                other => other,
            })?;

        if let Err(source) = self.api.create_change_set(&request).await {
            error!(
                account = self.scope.account_label(),
                region = %self.scope.region,
                stack = stack_name,
                error = %source,
                "failed to create the change set"
            );
            self.delete_change_set(stack_name).await;
            return Err(StackError::AccountConfiguration {
                context: self.scope.context(stack_name),
                message: source.to_string(),
            });
        }

        match wait::wait_for_change_set(self.api, self.scope, self.policy, stack_name).await {
            Ok(()) => Ok(ChangeSetOutcome::Staged),
            Err(err) if err.is_empty_change_set() => {
                debug!(
                    account = self.scope.account_label(),
                    region = %self.scope.region,
                    stack = stack_name,
                    "change set does not contain changes"
                );
                self.delete_change_set(stack_name).await;
                Ok(ChangeSetOutcome::NoChanges)
            }
            Err(StackError::WaiterFailed { reason, status, .. }) => {
                error!(
                    account = self.scope.account_label(),
                    region = %self.scope.region,
                    stack = stack_name,
                    status = %status,
                    reason = %reason,
                    "change set creation failed"
                );
                self.delete_change_set(stack_name).await;
                Err(StackError::AccountConfiguration {
                    context: self.scope.context(stack_name),
                    message: format!("change set {status}: {reason}"),
                })
            }
            Err(err) => {
                error!(
                    account = self.scope.account_label(),
                    region = %self.scope.region,
                    stack = stack_name,
                    error = %err,
                    "failed to wait for change set"
                );
                self.delete_change_set(stack_name).await;
                Err(err)
            }
        }
    }

    /// Applies the staged change set, waiting on `waiter` when the manager
    /// waits by default.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::AccountConfiguration`] when the service rejects
    /// the execution, and waiter failures unchanged.
    pub async fn execute(&self, stack_name: &str, waiter: WaiterKind) -> Result<(), StackError> {
        info!(
            account = self.scope.account_label(),
            region = %self.scope.region,
            stack = stack_name,
            "executing change set"
        );
        self.api
            .execute_change_set(stack_name, stack_name)
            .await
            .map_err(|source| StackError::AccountConfiguration {
                context: self.scope.context(stack_name),
                message: source.to_string(),
            })?;
        if self.wait {
            wait::wait_for_stack(self.api, self.scope, self.policy, stack_name, waiter).await?;
        }
        Ok(())
    }

    /// Deletes the change set of `stack_name`, logging any failure.
    pub async fn delete_change_set(&self, stack_name: &str) {
        if let Err(err) = self.api.delete_change_set(stack_name, stack_name).await {
            info!(
                account = self.scope.account_label(),
                region = %self.scope.region,
                stack = stack_name,
                error = %err,
                "could not delete change set"
            );
        }
    }

    /// Deletes `stack_name`, waiting for completion when `wait_override` is
    /// set or the manager waits by default.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Api`] when the delete call fails and waiter
    /// failures unchanged.
    pub async fn delete_stack(&self, stack_name: &str, wait_override: bool) -> Result<(), StackError> {
        self.api.delete_stack(stack_name).await.map_err(|source| {
            error!(
                account = self.scope.account_label(),
                region = %self.scope.region,
                stack = stack_name,
                error = %source,
                "failed to delete stack"
            );
            StackError::Api {
                context: self.scope.context(stack_name),
                operation: "delete_stack",
                source,
            }
        })?;
        if self.wait || wait_override {
            wait::wait_for_stack(
                self.api,
                self.scope,
                self.policy,
                stack_name,
                WaiterKind::StackDeleteComplete,
            )
            .await?;
        }
        Ok(())
    }
}
