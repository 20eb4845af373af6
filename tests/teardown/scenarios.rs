//! BDD scenarios for base stack teardown.

use rstest_bdd_macros::scenario;

use super::test_helpers::{TeardownContext, teardown_context};

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Keep current global stacks when removing deprecated ones"
)]
fn scenario_keep_current_stacks(teardown_context: TeardownContext) {
    let _ = teardown_context;
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Remove the IAM stack before a deprecated base stack"
)]
fn scenario_iam_stack_first(teardown_context: TeardownContext) {
    let _ = teardown_context;
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Leave busy stacks for an operator"
)]
fn scenario_busy_stacks_are_manual(teardown_context: TeardownContext) {
    let _ = teardown_context;
}

#[scenario(
    path = "tests/features/teardown.feature",
    name = "Remove an orphaned IAM stack"
)]
fn scenario_orphaned_iam_stack(teardown_context: TeardownContext) {
    let _ = teardown_context;
}
