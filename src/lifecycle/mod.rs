//! Top-level stack orchestrator.
//!
//! [`StackLifecycle`] owns one stack identity in one account and region. A
//! deployment waits for running operations, stages a change set, executes
//! it when it carries changes and then applies the termination protection
//! policy. Fleet teardown of the base stack family lives in
//! [`crate::teardown`] and is reachable from here.

use tracing::{error, info};

use crate::changeset::{ChangeSetManager, ChangeSetOutcome, StackTarget};
use crate::config::LifecycleConfig;
use crate::error::{AccountScope, StackError};
use crate::naming::{IAM_STACK_NAME, IAM_TEMPLATE_NAME, StackIdentity};
use crate::remote::{ChangeSetType, CloudFormationApi, RemoteStateReader};
use crate::status::StackStatus;
use crate::store::{StackParameter, TemplateStore};
use crate::teardown::{FleetTeardown, TeardownSummary};
use crate::types::{RoleArn, TemplateLocation};
use crate::wait::WaitPolicy;

/// Output key holding the regional KMS key ARN.
pub const REGIONAL_KMS_OUTPUT: &str = "DeploymentFrameworkRegionalKMSKey";
/// Output key holding the regional artifact bucket name.
pub const REGIONAL_BUCKET_OUTPUT: &str = "DeploymentFrameworkRegionalS3Bucket";

/// Result of a create-or-update request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeployOutcome {
    /// A change set was executed.
    Applied {
        /// Whether the stack was created or updated.
        change_set_type: ChangeSetType,
    },
    /// The stack already matches the template.
    NoChanges,
    /// No template is published for the stack, so nothing was deployed.
    NoTemplate,
}

impl DeployOutcome {
    /// Returns `true` when a change set was executed.
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Advisory outputs of a regional base stack.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RegionalOutputs {
    /// ARN of the regional KMS key.
    pub kms_arn: Option<String>,
    /// Name of the regional artifact bucket.
    pub s3_bucket: Option<String>,
}

/// Orchestrates the lifecycle of one stack.
#[derive(Debug)]
pub struct StackLifecycle<A, S> {
    api: A,
    store: S,
    scope: AccountScope,
    identity: StackIdentity,
    policy: WaitPolicy,
    wait: bool,
    termination_protection: bool,
    template_location: Option<TemplateLocation>,
    parameters: Option<Vec<StackParameter>>,
    role_arn: Option<RoleArn>,
}

/// Builder for [`StackLifecycle`].
#[derive(Debug)]
pub struct StackLifecycleBuilder<A, S> {
    api: A,
    store: S,
    identity: StackIdentity,
    account_id: Option<String>,
    policy: WaitPolicy,
    wait: bool,
    termination_protection: bool,
    template_location: Option<TemplateLocation>,
    parameters: Option<Vec<StackParameter>>,
    role_arn: Option<RoleArn>,
}

impl<A, S> StackLifecycleBuilder<A, S> {
    /// Sets the account identifier used in logs and errors.
    #[must_use]
    pub fn account_id(mut self, value: Option<String>) -> Self {
        self.account_id = value;
        self
    }

    /// Replaces the wait policy.
    #[must_use]
    pub fn policy(mut self, value: WaitPolicy) -> Self {
        self.policy = value;
        self
    }

    /// Sets whether operations block until the stack settles.
    #[must_use]
    pub const fn wait(mut self, value: bool) -> Self {
        self.wait = value;
        self
    }

    /// Sets the termination protection applied after each deployment.
    #[must_use]
    pub const fn termination_protection(mut self, value: bool) -> Self {
        self.termination_protection = value;
        self
    }

    /// Deploys this template instead of resolving one from the store.
    #[must_use]
    pub fn template_location(mut self, value: Option<TemplateLocation>) -> Self {
        self.template_location = value;
        self
    }

    /// Deploys these parameters instead of reading them from the store.
    #[must_use]
    pub fn parameters(mut self, value: Option<Vec<StackParameter>>) -> Self {
        self.parameters = value;
        self
    }

    /// Passes a service role on every change set.
    #[must_use]
    pub fn role_arn(mut self, value: Option<RoleArn>) -> Self {
        self.role_arn = value;
        self
    }

    /// Finishes the builder.
    #[must_use]
    pub fn build(self) -> StackLifecycle<A, S> {
        StackLifecycle {
            scope: AccountScope::new(self.account_id, self.identity.region()),
            api: self.api,
            store: self.store,
            identity: self.identity,
            policy: self.policy,
            wait: self.wait,
            termination_protection: self.termination_protection,
            template_location: self.template_location,
            parameters: self.parameters,
            role_arn: self.role_arn,
        }
    }
}

impl<A, S> StackLifecycle<A, S>
where
    A: CloudFormationApi,
    S: TemplateStore,
{
    /// Starts a builder for a lifecycle managing `identity`.
    #[must_use]
    pub fn builder(api: A, store: S, identity: StackIdentity) -> StackLifecycleBuilder<A, S> {
        StackLifecycleBuilder {
            api,
            store,
            identity,
            account_id: None,
            policy: WaitPolicy::default(),
            wait: false,
            termination_protection: false,
            template_location: None,
            parameters: None,
            role_arn: None,
        }
    }

    /// Builds a lifecycle for `region` from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Naming`] when neither `logical_path` nor
    /// `stack_name` resolves a name, or a region is blank.
    pub fn from_config(
        api: A,
        store: S,
        config: &LifecycleConfig,
        region: &str,
        logical_path: Option<String>,
        stack_name: Option<String>,
    ) -> Result<Self, StackError> {
        Ok(
            Self::configured_builder(api, store, config, region, logical_path, stack_name)?
                .build(),
        )
    }

    /// Starts a builder seeded from loaded configuration, leaving room for
    /// per-invocation overrides such as an explicit template location.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Naming`] when neither `logical_path` nor
    /// `stack_name` resolves a name, or a region is blank.
    pub fn configured_builder(
        api: A,
        store: S,
        config: &LifecycleConfig,
        region: &str,
        logical_path: Option<String>,
        stack_name: Option<String>,
    ) -> Result<StackLifecycleBuilder<A, S>, StackError> {
        let identity = StackIdentity::resolve(
            region,
            config.deployment_account_region.as_str(),
            logical_path,
            stack_name,
        )?;
        Ok(Self::builder(api, store, identity)
            .account_id(config.account_id.clone())
            .wait(config.wait)
            .termination_protection(config.termination_protection_enabled())
            .role_arn(config.role_arn()))
    }

    /// Identity of the managed stack.
    #[must_use]
    pub const fn identity(&self) -> &StackIdentity {
        &self.identity
    }

    /// Account and region the lifecycle operates in.
    #[must_use]
    pub const fn scope(&self) -> &AccountScope {
        &self.scope
    }

    /// Remote service client.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Wait policy used by every waiter.
    #[must_use]
    pub const fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// Whether operations block until the stack settles by default.
    #[must_use]
    pub const fn waits_by_default(&self) -> bool {
        self.wait
    }

    pub(crate) fn manager(&self) -> ChangeSetManager<'_, A, S> {
        ChangeSetManager::new(&self.api, &self.store, &self.scope, &self.policy)
            .with_role_arn(self.role_arn.as_ref())
            .with_wait(self.wait)
    }

    fn target(&self) -> StackTarget {
        StackTarget {
            stack_name: self.identity.name().to_owned(),
            template_key: self.identity.template_key(None),
            parameter_key: self.identity.parameter_key(),
            template_location: self.template_location.clone(),
            parameters: self.parameters.clone(),
        }
    }

    fn iam_target(&self) -> StackTarget {
        StackTarget {
            stack_name: IAM_STACK_NAME.to_owned(),
            template_key: self.identity.template_key(Some(IAM_TEMPLATE_NAME)),
            parameter_key: self.identity.parameter_key(),
            template_location: None,
            parameters: self.parameters.clone(),
        }
    }

    /// Creates the stack or updates it in place.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::InvalidTemplate`] when the template is
    /// rejected, [`StackError::AccountConfiguration`] when staging or
    /// applying fails, and waiter or service errors unchanged.
    pub async fn create_or_update(&self) -> Result<DeployOutcome, StackError> {
        self.deploy(&self.target()).await
    }

    /// Creates or updates the privileged IAM stack from its fixed template.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::create_or_update`].
    pub async fn create_privileged_iam_stack(&self) -> Result<DeployOutcome, StackError> {
        self.deploy(&self.iam_target()).await
    }

    async fn deploy(&self, target: &StackTarget) -> Result<DeployOutcome, StackError> {
        let stack_name = target.stack_name.as_str();
        let result = self.deploy_inner(target).await;
        if let Err(err) = &result {
            error!(
                account = self.scope.account_label(),
                region = %self.scope.region,
                stack = stack_name,
                error = %err,
                "stack deployment failed"
            );
        }
        result
    }

    async fn deploy_inner(&self, target: &StackTarget) -> Result<DeployOutcome, StackError> {
        let manager = self.manager();
        let stack_name = target.stack_name.as_str();
        let status = manager.wait_if_in_progress(stack_name).await?;
        let change_set_type = ChangeSetType::for_status(status);
        match manager.stage(target, change_set_type).await? {
            ChangeSetOutcome::NoTemplate => Ok(DeployOutcome::NoTemplate),
            ChangeSetOutcome::NoChanges => Ok(DeployOutcome::NoChanges),
            ChangeSetOutcome::Staged => {
                manager
                    .execute(stack_name, change_set_type.waiter())
                    .await?;
                self.apply_termination_protection(stack_name).await;
                Ok(DeployOutcome::Applied { change_set_type })
            }
        }
    }

    async fn apply_termination_protection(&self, stack_name: &str) {
        if let Err(err) = self
            .api
            .update_termination_protection(stack_name, self.termination_protection)
            .await
        {
            error!(
                account = self.scope.account_label(),
                region = %self.scope.region,
                stack = stack_name,
                error = %err,
                "failed to update stack termination protection"
            );
        }
    }

    /// Deletes `stack_name`, waiting when `wait_override` is set or the
    /// lifecycle waits by default.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Api`] when the delete call fails and waiter
    /// errors unchanged.
    pub async fn delete_stack(&self, stack_name: &str, wait_override: bool) -> Result<(), StackError> {
        info!(
            account = self.scope.account_label(),
            region = %self.scope.region,
            stack = stack_name,
            "deleting stack"
        );
        self.manager().delete_stack(stack_name, wait_override).await
    }

    /// Current status of the managed stack, `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Api`] for service failures other than a
    /// missing stack.
    pub async fn status(&self) -> Result<Option<StackStatus>, StackError> {
        self.manager().status(self.identity.name()).await
    }

    /// Value of output `key` on the managed stack. Any failure yields `None`.
    pub async fn get_output(&self, key: &str) -> Option<String> {
        RemoteStateReader::new(&self.api, &self.scope)
            .get_output(self.identity.name(), key)
            .await
    }

    /// Regional KMS key and bucket outputs, each independently advisory.
    pub async fn get_regional_outputs(&self) -> RegionalOutputs {
        RegionalOutputs {
            kms_arn: self.get_output(REGIONAL_KMS_OUTPUT).await,
            s3_bucket: self.get_output(REGIONAL_BUCKET_OUTPUT).await,
        }
    }

    /// Deletes every base stack in the region.
    ///
    /// # Errors
    ///
    /// Returns listing, status and deletion failures.
    pub async fn delete_all_base_stacks(
        &self,
        wait_override: bool,
    ) -> Result<TeardownSummary, StackError> {
        FleetTeardown::new(self).delete_all(wait_override).await
    }

    /// Deletes base stacks whose names are no longer current, waiting for
    /// each deletion.
    ///
    /// # Errors
    ///
    /// Returns listing, status and deletion failures.
    pub async fn delete_deprecated_base_stacks(&self) -> Result<TeardownSummary, StackError> {
        FleetTeardown::new(self).delete_deprecated_only().await
    }
}
