//! Core library for orchestrating deployment framework base stacks.
//!
//! The crate drives a remote infrastructure-stack service through the full
//! lifecycle of one stack: it waits out running operations, stages a change
//! set, treats an empty diff as a no-op, executes real changes and applies
//! termination protection. It also tears down the base stack family of a
//! region in dependency-safe order. The remote service sits behind the
//! [`CloudFormationApi`] trait; the `aws` feature provides the SDK-backed
//! implementation and the `adf-stacks` binary.

#[cfg(feature = "aws")]
pub mod aws;
pub mod changeset;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod naming;
pub mod remote;
pub mod status;
pub mod store;
pub mod teardown;
pub mod test_support;
pub mod types;
pub mod wait;

#[cfg(feature = "aws")]
pub use aws::AwsCloudFormation;
pub use changeset::{ChangeSetManager, ChangeSetOutcome, StackTarget};
pub use config::{ConfigError, LifecycleConfig};
pub use error::{AccountScope, StackContext, StackError};
pub use lifecycle::{DeployOutcome, RegionalOutputs, StackLifecycle, StackLifecycleBuilder};
pub use naming::{GeoPrefix, NamingError, StackIdentity};
pub use remote::{ApiError, ChangeSetType, CloudFormationApi, RemoteStateReader, StackSummary};
pub use status::{ChangeSetStatus, StackStatus, WaiterKind};
pub use store::{DirTemplateStore, StackParameter, StoreError, TemplateStore};
pub use teardown::{FleetTeardown, ManualRemoval, TeardownPlan, TeardownSummary};
pub use types::{RoleArn, TemplateLocation};
pub use wait::{Jitter, WaitPolicy};
