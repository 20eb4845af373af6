//! Unit tests for waiters and delay policies.

use std::sync::Mutex;
use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::status::{ChangeSetStatus, StackStatus};
use crate::test_support::FakeCloudFormation;

#[fixture]
fn scope() -> AccountScope {
    AccountScope::new(Some("111111111111".to_owned()), "eu-west-1")
}

#[fixture]
fn policy() -> WaitPolicy {
    WaitPolicy::with_jitter(Jitter::zero())
}

#[rstest]
fn poll_delay_samples_the_configured_range() {
    let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
    let recorder = std::sync::Arc::clone(&seen);
    let policy = WaitPolicy::with_jitter(Jitter::from_fn(move |min, max| {
        recorder
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((min, max));
        min
    }));

    assert_eq!(policy.poll_delay(), DEFAULT_POLL_MIN);
    let ranges = seen
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .clone();
    assert_eq!(ranges, vec![(DEFAULT_POLL_MIN, DEFAULT_POLL_MAX)]);
}

#[rstest]
#[case(0, Duration::from_secs(1))]
#[case(3, Duration::from_secs(8))]
#[case(10, Duration::from_secs(60))]
#[case(u32::MAX, Duration::from_secs(60))]
fn backoff_ceiling_grows_exponentially_and_is_capped(
    #[case] attempt: u32,
    #[case] expected: Duration,
) {
    let policy = WaitPolicy::with_jitter(Jitter::from_fn(|_, max| max));
    assert_eq!(policy.backoff_delay(attempt), expected);
}

#[rstest]
fn random_jitter_stays_within_bounds() {
    let jitter = Jitter::random();
    for _ in 0..50 {
        let delay = jitter.sample(DEFAULT_POLL_MIN, DEFAULT_POLL_MAX);
        assert!(delay >= DEFAULT_POLL_MIN && delay <= DEFAULT_POLL_MAX);
    }
    assert_eq!(
        jitter.sample(Duration::from_secs(5), Duration::from_secs(5)),
        Duration::from_secs(5)
    );
}

#[rstest]
#[tokio::test]
async fn stack_waiter_polls_until_success(scope: AccountScope, policy: WaitPolicy) {
    let api = FakeCloudFormation::new();
    api.insert_stack("stack", StackStatus::UpdateInProgress);
    api.script_statuses(
        "stack",
        &[
            Some(StackStatus::UpdateInProgress),
            Some(StackStatus::UpdateCompleteCleanupInProgress),
            Some(StackStatus::UpdateComplete),
        ],
    );

    wait_for_stack(&api, &scope, &policy, "stack", WaiterKind::StackUpdateComplete)
        .await
        .unwrap_or_else(|err| panic!("wait: {err}"));
    assert_eq!(api.calls().len(), 3);
}

#[rstest]
#[tokio::test]
async fn stack_waiter_reports_failure_states(scope: AccountScope, policy: WaitPolicy) {
    let api = FakeCloudFormation::new();
    api.insert_stack("stack", StackStatus::CreateInProgress);
    api.script_statuses("stack", &[Some(StackStatus::RollbackComplete)]);

    let err = wait_for_stack(&api, &scope, &policy, "stack", WaiterKind::StackCreateComplete)
        .await
        .expect_err("rollback is a failure state");
    match err {
        StackError::WaiterFailed { waiter, status, .. } => {
            assert_eq!(waiter, WaiterKind::StackCreateComplete);
            assert_eq!(status, "ROLLBACK_COMPLETE");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
#[tokio::test]
async fn delete_waiter_accepts_disappearance(scope: AccountScope, policy: WaitPolicy) {
    let api = FakeCloudFormation::new();
    api.insert_stack("stack", StackStatus::DeleteInProgress);
    api.script_statuses("stack", &[Some(StackStatus::DeleteInProgress), None]);

    wait_for_stack(&api, &scope, &policy, "stack", WaiterKind::StackDeleteComplete)
        .await
        .unwrap_or_else(|err| panic!("wait: {err}"));
}

#[rstest]
#[tokio::test]
async fn stack_waiter_times_out_after_attempt_cap(scope: AccountScope, policy: WaitPolicy) {
    let api = FakeCloudFormation::new();
    api.insert_stack("stack", StackStatus::UpdateInProgress);

    let err = wait_for_stack(&api, &scope, &policy, "stack", WaiterKind::StackUpdateComplete)
        .await
        .expect_err("stack never settles");
    assert_eq!(
        err,
        StackError::WaitTimeout {
            context: scope.context("stack"),
            waiter: WaiterKind::StackUpdateComplete,
            attempts: 45,
        }
    );
    assert_eq!(api.calls().len(), 45);
}

#[rstest]
#[tokio::test]
async fn change_set_waiter_surfaces_reason(scope: AccountScope, policy: WaitPolicy) {
    let api = FakeCloudFormation::new();
    api.insert_stack("stack", StackStatus::CreateComplete);
    api.insert_change_set("stack", ChangeSetStatus::Failed);
    api.fail_next(
        "describe_change_set",
        crate::remote::ApiError::new("Throttling", "slow down"),
    );

    let throttled = wait_for_change_set(&api, &scope, &policy, "stack")
        .await
        .expect_err("throttling propagates");
    assert!(matches!(throttled, StackError::Api { .. }));

    let err = wait_for_change_set(&api, &scope, &policy, "stack")
        .await
        .expect_err("failed change set");
    match err {
        StackError::WaiterFailed { status, reason, .. } => {
            assert_eq!(status, "FAILED");
            assert_eq!(reason, "");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
#[tokio::test]
async fn change_set_waiter_times_out_after_twenty_attempts(
    scope: AccountScope,
    policy: WaitPolicy,
) {
    let api = FakeCloudFormation::new();
    api.insert_stack("stack", StackStatus::ReviewInProgress);
    api.insert_change_set("stack", ChangeSetStatus::CreatePending);

    let err = wait_for(
        &api,
        &scope,
        &policy,
        "stack",
        WaiterKind::ChangeSetCreateComplete,
    )
    .await
    .expect_err("change set never settles");
    assert!(matches!(
        err,
        StackError::WaitTimeout {
            attempts: 20,
            waiter: WaiterKind::ChangeSetCreateComplete,
            ..
        }
    ));
}
