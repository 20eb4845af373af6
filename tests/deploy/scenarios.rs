//! BDD scenarios for base stack deployment.

use rstest_bdd_macros::scenario;

use super::test_helpers::{DeployContext, deploy_context};

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Create a stack that does not exist yet"
)]
fn scenario_create_stack(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Treat an empty change set as already up to date"
)]
fn scenario_empty_change_set(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Recreate a stack that rolled back"
)]
fn scenario_recreate_rolled_back_stack(deploy_context: DeployContext) {
    let _ = deploy_context;
}

#[scenario(
    path = "tests/features/deploy.feature",
    name = "Reject an invalid template"
)]
fn scenario_invalid_template(deploy_context: DeployContext) {
    let _ = deploy_context;
}
