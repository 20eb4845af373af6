//! BDD step definitions for base stack teardown.

use adf_stacks::StackStatus;
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{HOME_REGION, OTHER_REGION, TeardownContext, TeardownOutcome};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a teardown in the home region")]
fn teardown_in_home_region(mut teardown_context: TeardownContext) -> TeardownContext {
    teardown_context.region = String::from(HOME_REGION);
    teardown_context
}

#[given("a teardown in another region")]
fn teardown_in_other_region(mut teardown_context: TeardownContext) -> TeardownContext {
    teardown_context.region = String::from(OTHER_REGION);
    teardown_context
}

#[given("stack \"{name}\" is \"{status}\"")]
fn stack_exists(
    teardown_context: TeardownContext,
    name: String,
    status: String,
) -> Result<TeardownContext, StepError> {
    let parsed = status
        .trim()
        .parse::<StackStatus>()
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    teardown_context.api.insert_stack(name.trim(), parsed);
    Ok(teardown_context)
}

fn run_teardown(
    mut teardown_context: TeardownContext,
    deprecated_only: bool,
) -> Result<TeardownContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let lifecycle = teardown_context.lifecycle();
    let result = runtime.block_on(async {
        if deprecated_only {
            lifecycle.delete_deprecated_base_stacks().await
        } else {
            lifecycle.delete_all_base_stacks(false).await
        }
    });
    teardown_context.outcome = Some(match result {
        Ok(summary) => TeardownOutcome::Success(summary),
        Err(err) => TeardownOutcome::Failure(err.to_string()),
    });
    Ok(teardown_context)
}

#[when("I remove deprecated base stacks")]
fn remove_deprecated(teardown_context: TeardownContext) -> Result<TeardownContext, StepError> {
    run_teardown(teardown_context, true)
}

#[when("I remove all base stacks")]
fn remove_all(teardown_context: TeardownContext) -> Result<TeardownContext, StepError> {
    run_teardown(teardown_context, false)
}

fn succeeded(teardown_context: &TeardownContext) -> Result<(), StepError> {
    match teardown_context.outcome.as_ref() {
        Some(TeardownOutcome::Success(_)) => Ok(()),
        Some(TeardownOutcome::Failure(message)) => Err(StepError::Assertion(format!(
            "expected teardown to succeed, got: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("no stack is deleted")]
fn no_stack_deleted(teardown_context: &TeardownContext) -> Result<(), StepError> {
    succeeded(teardown_context)?;
    let deleted = teardown_context.api.deleted_stacks();
    if deleted.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no deletions, got {deleted:?}"
        )))
    }
}

#[then("stacks are deleted in order \"{names}\"")]
fn stacks_deleted_in_order(
    teardown_context: &TeardownContext,
    names: String,
) -> Result<(), StepError> {
    succeeded(teardown_context)?;
    let expected: Vec<String> = names
        .split(',')
        .map(|name| name.trim().to_owned())
        .collect();
    let deleted = teardown_context.api.deleted_stacks();
    if deleted == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected deletions {expected:?}, got {deleted:?}"
        )))
    }
}

#[then("stack \"{name}\" needs manual removal")]
fn needs_manual_removal(teardown_context: &TeardownContext, name: String) -> Result<(), StepError> {
    let Some(TeardownOutcome::Success(summary)) = teardown_context.outcome.as_ref() else {
        return Err(StepError::Assertion(String::from(
            "expected a successful teardown",
        )));
    };
    if summary
        .manual
        .iter()
        .any(|manual| manual.stack_name == name.trim())
    {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {name} to need manual removal, got {:?}",
            summary.manual
        )))
    }
}
