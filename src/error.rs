//! Error taxonomy shared by the stack orchestrator.

use std::fmt;

use thiserror::Error;

use crate::naming::NamingError;
use crate::remote::ApiError;
use crate::status::WaiterKind;
use crate::store::StoreError;
use crate::types::TemplateLocation;

/// Account and region an orchestrator instance operates in.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AccountScope {
    /// Target account identifier, carried for log and error context only.
    pub account_id: Option<String>,
    /// Region whose stack namespace the orchestrator manages.
    pub region: String,
}

impl AccountScope {
    /// Creates a scope for the given region.
    #[must_use]
    pub fn new(account_id: Option<String>, region: impl Into<String>) -> Self {
        Self {
            account_id,
            region: region.into(),
        }
    }

    /// Returns the account identifier or `-` when none was supplied.
    #[must_use]
    pub fn account_label(&self) -> &str {
        self.account_id.as_deref().unwrap_or("-")
    }

    /// Builds the diagnostic context for a stack in this scope.
    #[must_use]
    pub fn context(&self, stack_name: &str) -> Box<StackContext> {
        Box::new(StackContext {
            account_id: self.account_label().to_owned(),
            region: self.region.clone(),
            stack_name: stack_name.to_owned(),
        })
    }
}

/// Diagnostic context attached to every orchestrator error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackContext {
    /// Account identifier, or `-` when unknown.
    pub account_id: String,
    /// Region of the stack.
    pub region: String,
    /// Stack the failing operation targeted.
    pub stack_name: String,
}

impl fmt::Display for StackContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in {} - {}",
            self.account_id, self.region, self.stack_name
        )
    }
}

/// Errors raised by stack lifecycle operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StackError {
    /// Raised when the remote service rejects a template during validation.
    #[error("{context} - template validation of {location} failed: {message}")]
    InvalidTemplate {
        /// Stack being deployed.
        context: Box<StackContext>,
        /// Template that failed validation.
        location: TemplateLocation,
        /// Message returned by the service.
        message: String,
    },
    /// Raised when staging or applying a change fails for a reason other
    /// than an empty diff.
    #[error("{context} - account configuration failed: {message}")]
    AccountConfiguration {
        /// Stack being deployed.
        context: Box<StackContext>,
        /// Underlying cause.
        message: String,
    },
    /// Wrapper for remote service failures that are not reclassified.
    #[error("{context} - {operation} failed: {source}")]
    Api {
        /// Stack the call targeted.
        context: Box<StackContext>,
        /// Remote operation that failed.
        operation: &'static str,
        /// Error returned by the service.
        source: ApiError,
    },
    /// Raised when a waiter exhausts its attempts.
    #[error("{context} - gave up waiting for {waiter} after {attempts} attempts")]
    WaitTimeout {
        /// Stack being waited on.
        context: Box<StackContext>,
        /// Waiter that timed out.
        waiter: WaiterKind,
        /// Attempts made before giving up.
        attempts: u32,
    },
    /// Raised when a waiter observes one of its failure states.
    #[error("{context} - {waiter} reached failure state {status}: {reason}")]
    WaiterFailed {
        /// Stack being waited on.
        context: Box<StackContext>,
        /// Waiter that failed.
        waiter: WaiterKind,
        /// Status reported by the service, or `MISSING`.
        status: String,
        /// Status reason reported by the service, if any.
        reason: String,
    },
    /// Raised when a deleted change set keeps showing up.
    #[error("{context} - change set still present after {attempts} deletion checks")]
    ChangeSetNotDeleted {
        /// Stack owning the change set.
        context: Box<StackContext>,
        /// Checks made before giving up.
        attempts: u32,
    },
    /// Raised when the template store cannot resolve a template.
    #[error("{context} - template store failed: {source}")]
    Store {
        /// Stack being deployed.
        context: Box<StackContext>,
        /// Error returned by the store.
        source: StoreError,
    },
    /// Raised when a stack identity cannot be resolved.
    #[error(transparent)]
    Naming(#[from] NamingError),
}

impl StackError {
    /// Returns the stack context, when the error carries one.
    #[must_use]
    pub fn context(&self) -> Option<&StackContext> {
        match self {
            Self::InvalidTemplate { context, .. }
            | Self::AccountConfiguration { context, .. }
            | Self::Api { context, .. }
            | Self::WaitTimeout { context, .. }
            | Self::WaiterFailed { context, .. }
            | Self::ChangeSetNotDeleted { context, .. }
            | Self::Store { context, .. } => Some(&**context),
            Self::Naming(_) => None,
        }
    }

    /// Reports whether a change-set wait failed only because the candidate
    /// template produced an empty diff.
    #[must_use]
    pub fn is_empty_change_set(&self) -> bool {
        match self {
            Self::WaiterFailed {
                waiter: WaiterKind::ChangeSetCreateComplete,
                status,
                reason,
                ..
            } => change_set_failed_due_to_empty(status, reason),
            _ => false,
        }
    }
}

/// Reason fragments the service uses when a change set has nothing to do.
pub const EMPTY_CHANGE_SET_REASONS: [&str; 2] = [
    "The submitted information didn't contain changes.",
    "No updates are to be performed",
];

/// Returns `true` when a change-set failure only signals an empty diff.
#[must_use]
pub fn change_set_failed_due_to_empty(status: &str, reason: &str) -> bool {
    status == "FAILED"
        && EMPTY_CHANGE_SET_REASONS
            .iter()
            .any(|fragment| reason.contains(fragment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("FAILED", "The submitted information didn't contain changes. Submit different information to create a change set.", true)]
    #[case("FAILED", "No updates are to be performed.", true)]
    #[case("FAILED", "Template format error: unsupported resource", false)]
    #[case("CREATE_COMPLETE", "No updates are to be performed.", false)]
    fn classifies_empty_change_sets(
        #[case] status: &str,
        #[case] reason: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(change_set_failed_due_to_empty(status, reason), expected);
    }

    #[rstest]
    fn context_renders_account_region_and_stack() {
        let scope = AccountScope::new(Some(String::from("111111111111")), "eu-west-1");
        let context = scope.context("adf-regional-base-bootstrap");
        assert_eq!(
            context.to_string(),
            "111111111111 in eu-west-1 - adf-regional-base-bootstrap"
        );
    }

    #[rstest]
    fn missing_account_renders_placeholder() {
        let scope = AccountScope::new(None, "us-east-1");
        assert_eq!(scope.account_label(), "-");
    }

    #[rstest]
    fn only_change_set_waiter_failures_count_as_empty() {
        let scope = AccountScope::new(None, "us-east-1");
        let stack_failure = StackError::WaiterFailed {
            context: scope.context("stack"),
            waiter: WaiterKind::StackUpdateComplete,
            status: String::from("FAILED"),
            reason: String::from("No updates are to be performed."),
        };
        assert!(!stack_failure.is_empty_change_set());

        let change_set_failure = StackError::WaiterFailed {
            context: scope.context("stack"),
            waiter: WaiterKind::ChangeSetCreateComplete,
            status: String::from("FAILED"),
            reason: String::from("No updates are to be performed."),
        };
        assert!(change_set_failure.is_empty_change_set());
    }
}
