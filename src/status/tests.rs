//! Unit tests for the status tables.

use super::*;
use rstest::rstest;

#[rstest]
fn every_status_round_trips_through_its_wire_name() {
    for status in StackStatus::ALL {
        let parsed: StackStatus = status
            .as_str()
            .parse()
            .unwrap_or_else(|err| panic!("parse {status}: {err}"));
        assert_eq!(parsed, status);
    }
}

#[rstest]
fn unknown_status_is_rejected() {
    let err = "SOMETHING_ELSE"
        .parse::<StackStatus>()
        .expect_err("unknown status should not parse");
    assert_eq!(err.value, "SOMETHING_ELSE");
    assert_eq!(err.kind, "stack");
}

#[rstest]
#[case(StackStatus::UpdateInProgress, Some(WaiterKind::StackUpdateComplete))]
#[case(StackStatus::CreateInProgress, Some(WaiterKind::StackCreateComplete))]
#[case(StackStatus::UpdateRollbackInProgress, Some(WaiterKind::StackRollbackComplete))]
#[case(
    StackStatus::UpdateRollbackCompleteCleanupInProgress,
    Some(WaiterKind::StackRollbackComplete)
)]
#[case(StackStatus::DeleteInProgress, Some(WaiterKind::StackDeleteComplete))]
#[case(StackStatus::ReviewInProgress, Some(WaiterKind::ChangeSetCreateComplete))]
#[case(StackStatus::RollbackInProgress, Some(WaiterKind::StackSettled))]
#[case(
    StackStatus::UpdateCompleteCleanupInProgress,
    Some(WaiterKind::StackSettled)
)]
#[case(StackStatus::ImportInProgress, Some(WaiterKind::StackSettled))]
#[case(StackStatus::ImportRollbackInProgress, Some(WaiterKind::StackSettled))]
#[case(StackStatus::CreateComplete, None)]
#[case(StackStatus::UpdateComplete, None)]
fn in_progress_states_map_to_waiters(
    #[case] status: StackStatus,
    #[case] expected: Option<WaiterKind>,
) {
    assert_eq!(status.in_progress_waiter(), expected);
}

#[rstest]
fn recreate_set_matches_the_documented_states() {
    let recreate: Vec<_> = StackStatus::ALL
        .into_iter()
        .filter(|status| status.requires_recreate())
        .collect();
    assert_eq!(
        recreate,
        vec![
            StackStatus::CreateFailed,
            StackStatus::RollbackFailed,
            StackStatus::RollbackComplete,
            StackStatus::DeleteFailed,
            StackStatus::ReviewInProgress,
        ]
    );
}

#[rstest]
fn transient_states_are_never_safely_deletable() {
    for status in StackStatus::ALL {
        let transient = status.as_str().ends_with("_IN_PROGRESS")
            && status != StackStatus::ReviewInProgress;
        if transient {
            assert!(
                !status.is_safely_deletable(),
                "{status} should require manual removal"
            );
        }
    }
}

#[rstest]
fn listing_filter_excludes_only_deleted_stacks() {
    assert_eq!(ALL_EXCEPT_DELETED.len(), StackStatus::ALL.len() - 1);
    assert!(!ALL_EXCEPT_DELETED.contains(&StackStatus::DeleteComplete));
}

#[rstest]
#[case(WaiterKind::StackDeleteComplete, None, Acceptance::Success)]
#[case(WaiterKind::StackCreateComplete, None, Acceptance::Failure)]
#[case(
    WaiterKind::StackCreateComplete,
    Some(StackStatus::CreateInProgress),
    Acceptance::Retry
)]
#[case(
    WaiterKind::StackCreateComplete,
    Some(StackStatus::RollbackComplete),
    Acceptance::Failure
)]
#[case(
    WaiterKind::StackUpdateComplete,
    Some(StackStatus::UpdateComplete),
    Acceptance::Success
)]
#[case(
    WaiterKind::StackUpdateComplete,
    Some(StackStatus::UpdateCompleteCleanupInProgress),
    Acceptance::Retry
)]
#[case(
    WaiterKind::StackRollbackComplete,
    Some(StackStatus::UpdateRollbackComplete),
    Acceptance::Success
)]
#[case(
    WaiterKind::StackDeleteComplete,
    Some(StackStatus::DeleteFailed),
    Acceptance::Failure
)]
fn stack_waiters_judge_observations(
    #[case] waiter: WaiterKind,
    #[case] status: Option<StackStatus>,
    #[case] expected: Acceptance,
) {
    assert_eq!(waiter.accept_stack(status), expected);
}

#[rstest]
#[case(Some(ChangeSetStatus::CreateComplete), Acceptance::Success)]
#[case(Some(ChangeSetStatus::CreatePending), Acceptance::Retry)]
#[case(Some(ChangeSetStatus::CreateInProgress), Acceptance::Retry)]
#[case(Some(ChangeSetStatus::Failed), Acceptance::Failure)]
#[case(None, Acceptance::Failure)]
fn change_set_waiter_judges_observations(
    #[case] status: Option<ChangeSetStatus>,
    #[case] expected: Acceptance,
) {
    assert_eq!(
        WaiterKind::ChangeSetCreateComplete.accept_change_set(status),
        expected
    );
}

#[rstest]
fn attempt_caps_differ_by_waiter_family() {
    assert_eq!(WaiterKind::StackUpdateComplete.max_attempts(), 45);
    assert_eq!(WaiterKind::ChangeSetCreateComplete.max_attempts(), 20);
}

#[rstest]
#[case(Some(StackStatus::RollbackInProgress), Acceptance::Retry)]
#[case(Some(StackStatus::ImportInProgress), Acceptance::Retry)]
#[case(Some(StackStatus::RollbackComplete), Acceptance::Success)]
#[case(Some(StackStatus::UpdateComplete), Acceptance::Success)]
#[case(Some(StackStatus::ImportRollbackComplete), Acceptance::Success)]
#[case(None, Acceptance::Success)]
fn settled_waiter_polls_until_the_stack_stops_running(
    #[case] status: Option<StackStatus>,
    #[case] expected: Acceptance,
) {
    assert_eq!(WaiterKind::StackSettled.accept_stack(status), expected);
}
