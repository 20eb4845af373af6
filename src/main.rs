//! Binary entry point for the `adf-stacks` CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8Path;
use clap::Parser;
use thiserror::Error;

use adf_stacks::{
    AwsCloudFormation, ConfigError, DeployOutcome, DirTemplateStore, LifecycleConfig,
    StackError, StackLifecycle, StackParameter, StoreError, TemplateLocation, TemplateStore,
    TeardownSummary,
};

mod cli;

use cli::{Cli, DeleteCommand, DeployCommand, TargetArgs, TeardownCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("template store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Stack(#[from] StackError),
    #[error("{0}")]
    Usage(String),
}

/// Template directory, when one is configured.
enum Templates {
    Dir(DirTemplateStore),
    Unconfigured,
}

impl Templates {
    fn from_config(config: &LifecycleConfig) -> Result<Self, CliError> {
        match (&config.template_root, &config.template_base_url) {
            (Some(root), Some(base_url)) => Ok(Self::Dir(DirTemplateStore::open(
                Utf8Path::new(root),
                base_url.as_str(),
            )?)),
            (None, None) => Ok(Self::Unconfigured),
            _ => Err(CliError::Usage(String::from(
                "set both ADF_TEMPLATE_ROOT and ADF_TEMPLATE_BASE_URL, or neither",
            ))),
        }
    }

    const fn is_configured_in(config: &LifecycleConfig) -> bool {
        config.template_root.is_some() && config.template_base_url.is_some()
    }
}

impl TemplateStore for Templates {
    fn resolve(&self, key: &str) -> Result<Option<TemplateLocation>, StoreError> {
        match self {
            Self::Dir(store) => store.resolve(key),
            Self::Unconfigured => Ok(None),
        }
    }

    fn read_parameters(&self, key: &str) -> Result<Vec<StackParameter>, StoreError> {
        match self {
            Self::Dir(store) => store.read_parameters(key),
            Self::Unconfigured => Err(StoreError::NotFound {
                key: key.to_owned(),
            }),
        }
    }
}

type Lifecycle = StackLifecycle<AwsCloudFormation, Templates>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("ADF_STACKS_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = LifecycleConfig::load_without_cli_args()?;
    config.validate()?;
    match cli {
        Cli::Deploy(command) => deploy(&config, command).await,
        Cli::DeployIam(target) => {
            let lifecycle = lifecycle(&config, target, None).await?;
            let outcome = lifecycle.create_privileged_iam_stack().await?;
            report_deploy(lifecycle.identity().name(), outcome);
            Ok(())
        }
        Cli::Delete(command) => delete(&config, command).await,
        Cli::Teardown(command) => teardown(&config, command).await,
        Cli::Outputs(target) => {
            let lifecycle = lifecycle(&config, target, None).await?;
            let outputs = lifecycle.get_regional_outputs().await;
            let mut stdout = io::stdout();
            writeln!(stdout, "kms_arn={}", outputs.kms_arn.unwrap_or_default()).ok();
            writeln!(stdout, "s3_bucket={}", outputs.s3_bucket.unwrap_or_default()).ok();
            Ok(())
        }
    }
}

async fn lifecycle(
    config: &LifecycleConfig,
    target: TargetArgs,
    template_location: Option<TemplateLocation>,
) -> Result<Lifecycle, CliError> {
    let templates = Templates::from_config(config)?;
    let api = AwsCloudFormation::from_env(&target.region).await;
    Ok(StackLifecycle::configured_builder(
        api,
        templates,
        config,
        &target.region,
        target.path,
        target.stack_name,
    )?
    .template_location(template_location)
    .build())
}

async fn deploy(config: &LifecycleConfig, command: DeployCommand) -> Result<(), CliError> {
    let template_location = command.template_url.map(TemplateLocation::from);
    if template_location.is_none() && !Templates::is_configured_in(config) {
        return Err(CliError::Usage(String::from(
            "no template source: pass --template-url or set ADF_TEMPLATE_ROOT and ADF_TEMPLATE_BASE_URL",
        )));
    }
    let lifecycle = lifecycle(config, command.target, template_location).await?;
    let outcome = lifecycle.create_or_update().await?;
    report_deploy(lifecycle.identity().name(), outcome);
    Ok(())
}

async fn delete(config: &LifecycleConfig, command: DeleteCommand) -> Result<(), CliError> {
    let lifecycle = lifecycle(config, command.target, None).await?;
    let stack_name = lifecycle.identity().name().to_owned();
    lifecycle.delete_stack(&stack_name, command.wait).await?;
    Ok(())
}

async fn teardown(config: &LifecycleConfig, command: TeardownCommand) -> Result<(), CliError> {
    let lifecycle = lifecycle(config, command.target, None).await?;
    let summary = if command.deprecated_only {
        lifecycle.delete_deprecated_base_stacks().await?
    } else {
        lifecycle.delete_all_base_stacks(command.wait).await?
    };
    report_teardown(&summary);
    Ok(())
}

fn report_deploy(stack_name: &str, outcome: DeployOutcome) {
    let message = match outcome {
        DeployOutcome::Applied { change_set_type } => {
            format!("{stack_name}: applied {} change set", change_set_type.as_str())
        }
        DeployOutcome::NoChanges => format!("{stack_name}: no changes"),
        DeployOutcome::NoTemplate => format!("{stack_name}: no template published"),
    };
    writeln!(io::stdout(), "{message}").ok();
}

fn report_teardown(summary: &TeardownSummary) {
    let mut stdout = io::stdout();
    for name in &summary.deleted {
        writeln!(stdout, "deleted {name}").ok();
    }
    for manual in &summary.manual {
        writeln!(
            stdout,
            "manual removal needed: {} ({})",
            manual.stack_name, manual.status
        )
        .ok();
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_error_writes_cli_error() {
        let mut buf = Vec::new();
        write_error(&mut buf, &CliError::Usage(String::from("bad flags")));
        let rendered = String::from_utf8(buf).unwrap_or_else(|err| panic!("utf8: {err}"));
        assert_eq!(rendered, "bad flags\n");
    }

    #[test]
    fn template_directory_needs_both_settings() {
        let mut config = LifecycleConfig {
            deployment_account_region: String::from("eu-west-1"),
            account_id: None,
            termination_protection: None,
            wait: false,
            role_arn: None,
            template_root: Some(String::from("/srv/templates")),
            template_base_url: None,
        };
        assert!(!Templates::is_configured_in(&config));
        config.template_base_url = Some(String::from("https://templates.example.com"));
        assert!(Templates::is_configured_in(&config));
    }

    #[test]
    fn half_configured_template_directory_is_rejected() {
        let config = LifecycleConfig {
            deployment_account_region: String::from("eu-west-1"),
            account_id: None,
            termination_protection: None,
            wait: false,
            role_arn: None,
            template_root: Some(String::from("/srv/templates")),
            template_base_url: None,
        };
        assert!(matches!(
            Templates::from_config(&config),
            Err(CliError::Usage(_))
        ));
    }
}
