//! BDD step definitions for base stack deployment.

use adf_stacks::test_support::{ApiCall, MemoryTemplateStore};
use adf_stacks::{ChangeSetStatus, DeployOutcome, StackError, StackStatus};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{DeployContext, DeployResult, STACK_NAME, TEMPLATE_KEY};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a published template for the deployment stack")]
fn published_template(mut deploy_context: DeployContext) -> DeployContext {
    deploy_context.store = deploy_context.store.clone().with_template(TEMPLATE_KEY);
    deploy_context
}

#[given("termination protection is enabled")]
fn protection_enabled(mut deploy_context: DeployContext) -> DeployContext {
    deploy_context.termination_protection = true;
    deploy_context
}

#[given("the stack exists in \"{status}\"")]
fn stack_exists(deploy_context: DeployContext, status: String) -> Result<DeployContext, StepError> {
    let parsed = status
        .trim()
        .parse::<StackStatus>()
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    deploy_context.api.insert_stack(STACK_NAME, parsed);
    Ok(deploy_context)
}

#[given("the service reports no changes")]
fn service_reports_no_changes(deploy_context: DeployContext) -> DeployContext {
    deploy_context.api.queue_change_set_result(
        ChangeSetStatus::Failed,
        Some("The submitted information didn't contain changes. Submit different information to create a change set."),
    );
    deploy_context
}

#[given("the service rejects the template")]
fn service_rejects_template(deploy_context: DeployContext) -> DeployContext {
    deploy_context.api.reject_template(
        MemoryTemplateStore::location_of(TEMPLATE_KEY).as_str(),
        "Template format error: YAML not well-formed",
    );
    deploy_context
}

#[when("I deploy the stack")]
fn deploy_stack(mut deploy_context: DeployContext) -> Result<DeployContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let lifecycle = deploy_context.lifecycle();
    let result = runtime.block_on(async { lifecycle.create_or_update().await });
    deploy_context.outcome = Some(match result {
        Ok(outcome) => DeployResult::Success(outcome),
        Err(err @ StackError::InvalidTemplate { .. }) => {
            DeployResult::InvalidTemplate(err.to_string())
        }
        Err(err) => DeployResult::Failure(err.to_string()),
    });
    Ok(deploy_context)
}

fn outcome(deploy_context: &DeployContext) -> Result<DeployOutcome, StepError> {
    match deploy_context.outcome.as_ref() {
        Some(DeployResult::Success(outcome)) => Ok(*outcome),
        Some(other) => Err(StepError::Assertion(format!(
            "expected a successful deployment, got {other:?}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("a \"{kind}\" change set is applied")]
fn change_set_applied(deploy_context: &DeployContext, kind: String) -> Result<(), StepError> {
    match outcome(deploy_context)? {
        DeployOutcome::Applied { change_set_type } if change_set_type.as_str() == kind.trim() => {
            Ok(())
        }
        other => Err(StepError::Assertion(format!(
            "expected a {kind} change set to be applied, got {other:?}"
        ))),
    }
}

#[then("termination protection is on")]
fn protection_is_on(deploy_context: &DeployContext) -> Result<(), StepError> {
    if deploy_context.api.termination_protection(STACK_NAME) {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from(
            "termination protection should be enabled",
        )))
    }
}

#[then("the deployment reports no changes")]
fn reports_no_changes(deploy_context: &DeployContext) -> Result<(), StepError> {
    match outcome(deploy_context)? {
        DeployOutcome::NoChanges => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected no changes, got {other:?}"
        ))),
    }
}

#[then("no change set is executed")]
fn no_change_set_executed(deploy_context: &DeployContext) -> Result<(), StepError> {
    let executed = deploy_context
        .api
        .calls()
        .iter()
        .any(|call| matches!(call, ApiCall::ExecuteChangeSet { .. }));
    if executed {
        Err(StepError::Assertion(String::from(
            "change set should not be executed",
        )))
    } else {
        Ok(())
    }
}

#[then("the stack is deleted before the change set is created")]
fn deleted_before_change_set(deploy_context: &DeployContext) -> Result<(), StepError> {
    let mutations = deploy_context.api.mutations();
    let expected = [
        format!("delete_stack {STACK_NAME}"),
        format!("create_change_set {STACK_NAME} CREATE"),
    ];
    if mutations.starts_with(&expected) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?} first, got {mutations:?}"
        )))
    }
}

#[then("the deployment fails with an invalid template error")]
fn fails_with_invalid_template(deploy_context: &DeployContext) -> Result<(), StepError> {
    match deploy_context.outcome.as_ref() {
        Some(DeployResult::InvalidTemplate(message)) if message.contains("Template format error") => {
            Ok(())
        }
        other => Err(StepError::Assertion(format!(
            "expected an invalid template error, got {other:?}"
        ))),
    }
}
