//! Shared fixtures and helpers for deployment BDD scenarios.

use adf_stacks::test_support::{FakeCloudFormation, MemoryTemplateStore};
use adf_stacks::{DeployOutcome, Jitter, StackIdentity, StackLifecycle, WaitPolicy};
use rstest::fixture;

pub const HOME_REGION: &str = "eu-west-1";
pub const STACK_NAME: &str = "adf-global-base-deployment";
pub const TEMPLATE_KEY: &str = "adf-bootstrap/deployment/global.yml";
const LOGICAL_PATH: &str = "adf-bootstrap/deployment";

#[derive(Clone, Debug)]
pub enum DeployResult {
    Success(DeployOutcome),
    InvalidTemplate(String),
    Failure(String),
}

#[derive(Clone, Debug)]
pub struct DeployContext {
    pub api: FakeCloudFormation,
    pub store: MemoryTemplateStore,
    pub termination_protection: bool,
    pub outcome: Option<DeployResult>,
}

impl DeployContext {
    pub fn lifecycle(&self) -> StackLifecycle<FakeCloudFormation, MemoryTemplateStore> {
        let identity = StackIdentity::resolve(
            HOME_REGION,
            HOME_REGION,
            Some(LOGICAL_PATH.to_owned()),
            None,
        )
        .unwrap_or_else(|err| panic!("deployment identity should resolve: {err}"));
        StackLifecycle::builder(self.api.clone(), self.store.clone(), identity)
            .policy(WaitPolicy::with_jitter(Jitter::zero()))
            .wait(true)
            .termination_protection(self.termination_protection)
            .build()
    }
}

#[fixture]
pub fn deploy_context() -> DeployContext {
    DeployContext {
        api: FakeCloudFormation::new(),
        store: MemoryTemplateStore::new(),
        termination_protection: false,
        outcome: None,
    }
}
