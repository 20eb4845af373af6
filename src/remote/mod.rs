//! Boundary to the remote infrastructure service.
//!
//! [`CloudFormationApi`] is the only wire-protocol seam of the crate. The
//! orchestrator talks to it through request and response types defined
//! here, so adapters (the AWS SDK client, scripted test doubles) translate
//! at the edge and nothing else depends on a concrete client.

mod reader;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::status::{ChangeSetStatus, StackStatus, WaiterKind};
use crate::store::StackParameter;
use crate::types::{RoleArn, TemplateLocation};

pub use reader::{FAMILY_PATTERN, RemoteStateReader};

/// Future returned by remote service operations.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Error code the service uses for validation-class failures, including
/// "stack does not exist".
pub const VALIDATION_ERROR_CODE: &str = "ValidationError";

/// Failure reported by the remote service.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{code}: {message}")]
pub struct ApiError {
    /// Service error code.
    pub code: String,
    /// Human readable message.
    pub message: String,
}

impl ApiError {
    /// Creates an error from a code and message.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for validation-class failures.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(VALIDATION_ERROR_CODE, message)
    }

    /// Returns `true` for validation-class failures.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        self.code == VALIDATION_ERROR_CODE
    }
}

/// Named output exported by a stack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackOutput {
    /// Output key.
    pub key: String,
    /// Output value.
    pub value: String,
}

/// Result of describing a single stack.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackDescription {
    /// Stack name.
    pub name: String,
    /// Current status.
    pub status: StackStatus,
    /// Outputs exported by the stack.
    pub outputs: Vec<StackOutput>,
}

impl StackDescription {
    /// Looks up an output value by key.
    #[must_use]
    pub fn output(&self, key: &str) -> Option<&str> {
        self.outputs
            .iter()
            .find(|output| output.key == key)
            .map(|output| output.value.as_str())
    }
}

/// Entry returned by a stack listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackSummary {
    /// Stack name.
    pub name: String,
    /// Current status.
    pub status: StackStatus,
    /// Identifier of the parent stack for nested stacks.
    pub parent_id: Option<String>,
}

impl StackSummary {
    /// Creates a top-level stack summary.
    #[must_use]
    pub fn new(name: impl Into<String>, status: StackStatus) -> Self {
        Self {
            name: name.into(),
            status,
            parent_id: None,
        }
    }

    /// Returns `true` when the stack was created by another stack.
    #[must_use]
    pub const fn is_nested(&self) -> bool {
        self.parent_id.is_some()
    }
}

/// One page of a stack listing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StackPage {
    /// Stacks on this page.
    pub stacks: Vec<StackSummary>,
    /// Token for the next page, absent on the last page.
    pub next_token: Option<String>,
}

/// Kind of change a change set stages.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ChangeSetType {
    /// Creates the stack from scratch.
    Create,
    /// Updates an existing stack.
    Update,
}

impl ChangeSetType {
    /// Picks the change-set type for a stack in `status`.
    ///
    /// Missing stacks and stacks that must be recreated are created afresh;
    /// anything else is updated in place.
    #[must_use]
    pub const fn for_status(status: Option<StackStatus>) -> Self {
        match status {
            None => Self::Create,
            Some(value) if value.requires_recreate() => Self::Create,
            Some(_) => Self::Update,
        }
    }

    /// Waiter that confirms an executed change set of this type.
    #[must_use]
    pub const fn waiter(self) -> WaiterKind {
        match self {
            Self::Create => WaiterKind::StackCreateComplete,
            Self::Update => WaiterKind::StackUpdateComplete,
        }
    }

    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
        }
    }
}

/// Elevated capability acknowledged on every change set.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Capability {
    /// Allows the template to manage named IAM resources.
    NamedIam,
    /// Allows nested templates and macros to expand.
    AutoExpand,
}

impl Capability {
    /// Capabilities requested for every change set.
    pub const REQUIRED: [Self; 2] = [Self::NamedIam, Self::AutoExpand];

    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NamedIam => "CAPABILITY_NAMED_IAM",
            Self::AutoExpand => "CAPABILITY_AUTO_EXPAND",
        }
    }
}

/// Key/value tag applied to created resources.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourceTag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl ResourceTag {
    /// Tag marking resources created by the deployment framework.
    #[must_use]
    pub fn created_by() -> Self {
        Self {
            key: "createdBy".to_owned(),
            value: "ADF".to_owned(),
        }
    }
}

/// Request to stage a change set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeSetRequest {
    /// Target stack.
    pub stack_name: String,
    /// Change-set name; one change set per stack, so it mirrors the stack.
    pub change_set_name: String,
    /// Template to stage.
    pub template_location: TemplateLocation,
    /// Template parameters.
    pub parameters: Vec<StackParameter>,
    /// Acknowledged capabilities.
    pub capabilities: Vec<Capability>,
    /// Tags applied to the stack.
    pub tags: Vec<ResourceTag>,
    /// Create or update.
    pub change_set_type: ChangeSetType,
    /// Service role override.
    pub role_arn: Option<RoleArn>,
}

/// Result of describing a change set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeSetDescription {
    /// Current status.
    pub status: ChangeSetStatus,
    /// Reason attached to the status, if any.
    pub status_reason: Option<String>,
}

/// Operations the orchestrator consumes from the remote service.
///
/// Implementations must report a missing stack from
/// [`CloudFormationApi::describe_stack`] as a validation-class
/// [`ApiError`]; the orchestrator maps that signal to "missing".
pub trait CloudFormationApi: Send + Sync {
    /// Describes a single stack.
    fn describe_stack<'a>(&'a self, stack_name: &'a str) -> ApiFuture<'a, StackDescription>;

    /// Lists stacks whose status is in `status_filter`, one page at a time.
    fn list_stacks<'a>(
        &'a self,
        status_filter: &'a [StackStatus],
        next_token: Option<&'a str>,
    ) -> ApiFuture<'a, StackPage>;

    /// Validates a template remotely.
    fn validate_template<'a>(&'a self, location: &'a TemplateLocation) -> ApiFuture<'a, ()>;

    /// Stages a change set.
    fn create_change_set<'a>(&'a self, request: &'a ChangeSetRequest) -> ApiFuture<'a, ()>;

    /// Describes a change set by stack and change-set name.
    fn describe_change_set<'a>(
        &'a self,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ApiFuture<'a, ChangeSetDescription>;

    /// Deletes a change set.
    fn delete_change_set<'a>(
        &'a self,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ApiFuture<'a, ()>;

    /// Applies a staged change set.
    fn execute_change_set<'a>(
        &'a self,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ApiFuture<'a, ()>;

    /// Enables or disables termination protection.
    fn update_termination_protection<'a>(
        &'a self,
        stack_name: &'a str,
        enabled: bool,
    ) -> ApiFuture<'a, ()>;

    /// Starts deleting a stack.
    fn delete_stack<'a>(&'a self, stack_name: &'a str) -> ApiFuture<'a, ()>;
}
