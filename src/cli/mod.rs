//! Command-line interface definitions for the `adf-stacks` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page. It
//! depends on clap alone for that reason.

use clap::{Args, Parser};

/// Top-level CLI for the `adf-stacks` binary.
#[derive(Debug, Parser)]
#[command(
    name = "adf-stacks",
    about = "Create, update and tear down deployment framework base stacks",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Create or update the base stack for a logical template path.
    #[command(name = "deploy", about = "Create or update a base stack")]
    Deploy(DeployCommand),
    /// Create or update the privileged IAM stack in the home region.
    #[command(name = "deploy-iam", about = "Create or update the privileged IAM stack")]
    DeployIam(TargetArgs),
    /// Delete one stack by name.
    #[command(name = "delete", about = "Delete a stack")]
    Delete(DeleteCommand),
    /// Remove base stacks from a region.
    #[command(name = "teardown", about = "Remove base stacks from a region")]
    Teardown(TeardownCommand),
    /// Print the regional KMS key and bucket outputs of a base stack.
    #[command(name = "outputs", about = "Print regional base stack outputs")]
    Outputs(TargetArgs),
}

/// Region and stack a command acts on.
#[derive(Debug, Args)]
pub(crate) struct TargetArgs {
    /// Region whose stack namespace is managed.
    #[arg(long, env = "AWS_REGION", value_name = "REGION")]
    pub(crate) region: String,
    /// Logical template path, for example `adf-bootstrap/deployment`.
    ///
    /// The stack name, template and parameter file are derived from it.
    #[arg(long, value_name = "PATH")]
    pub(crate) path: Option<String>,
    /// Explicit stack name; takes precedence over the derived one.
    #[arg(long, value_name = "NAME")]
    pub(crate) stack_name: Option<String>,
}

/// Arguments for `adf-stacks deploy`.
#[derive(Debug, Args)]
pub(crate) struct DeployCommand {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Deploy this template URL instead of resolving it from the template
    /// directory.
    #[arg(long, value_name = "URL")]
    pub(crate) template_url: Option<String>,
}

/// Arguments for `adf-stacks delete`.
#[derive(Debug, Args)]
pub(crate) struct DeleteCommand {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Block until the deletion finishes.
    #[arg(long)]
    pub(crate) wait: bool,
}

/// Arguments for `adf-stacks teardown`.
#[derive(Debug, Args)]
pub(crate) struct TeardownCommand {
    #[command(flatten)]
    pub(crate) target: TargetArgs,
    /// Only remove stacks whose names are no longer current.
    #[arg(long)]
    pub(crate) deprecated_only: bool,
    /// Block until each deletion finishes.
    #[arg(long)]
    pub(crate) wait: bool,
}
