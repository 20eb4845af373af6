//! Shared fixtures and helpers for teardown BDD scenarios.

use adf_stacks::test_support::{FakeCloudFormation, MemoryTemplateStore};
use adf_stacks::{Jitter, StackIdentity, StackLifecycle, TeardownSummary, WaitPolicy};
use rstest::fixture;

pub const HOME_REGION: &str = "eu-west-1";
pub const OTHER_REGION: &str = "us-east-1";
const LOGICAL_PATH: &str = "adf-bootstrap/ou/team";

#[derive(Clone, Debug)]
pub enum TeardownOutcome {
    Success(TeardownSummary),
    Failure(String),
}

#[derive(Clone, Debug)]
pub struct TeardownContext {
    pub api: FakeCloudFormation,
    pub region: String,
    pub outcome: Option<TeardownOutcome>,
}

impl TeardownContext {
    pub fn lifecycle(&self) -> StackLifecycle<FakeCloudFormation, MemoryTemplateStore> {
        let identity = StackIdentity::resolve(
            self.region.as_str(),
            HOME_REGION,
            Some(LOGICAL_PATH.to_owned()),
            None,
        )
        .unwrap_or_else(|err| panic!("teardown identity should resolve: {err}"));
        StackLifecycle::builder(self.api.clone(), MemoryTemplateStore::new(), identity)
            .account_id(Some(String::from("123456789012")))
            .policy(WaitPolicy::with_jitter(Jitter::zero()))
            .build()
    }
}

#[fixture]
pub fn teardown_context() -> TeardownContext {
    TeardownContext {
        api: FakeCloudFormation::new(),
        region: String::from(HOME_REGION),
        outcome: None,
    }
}
