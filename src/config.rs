//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::types::RoleArn;

/// Literal that enables termination protection.
pub const TERMINATION_PROTECTION_ENABLED: &str = "True";

/// Orchestrator settings derived from environment variables, configuration
/// files and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "ADF",
    discovery(
        app_name = "adf-stacks",
        env_var = "ADF_STACKS_CONFIG_PATH",
        config_file_name = "adf-stacks.toml",
        dotfile_name = ".adf-stacks.toml",
        project_file_name = "adf-stacks.toml"
    )
)]
pub struct LifecycleConfig {
    /// Home region of the deployment account. Stacks in this region are
    /// global, all others regional.
    pub deployment_account_region: String,
    /// Account the orchestrator targets, used for log and error context.
    pub account_id: Option<String>,
    /// Termination protection toggle. Only the exact literal `True` enables
    /// it; any other value, including `true`, disables it.
    #[serde(default, deserialize_with = "deserialize_toggle")]
    pub termination_protection: Option<String>,
    /// Whether operations block until the stack settles by default.
    #[ortho_config(default = false)]
    pub wait: bool,
    /// Service role the remote service assumes while applying change sets.
    pub role_arn: Option<String>,
    /// Local directory holding published templates and parameter files.
    pub template_root: Option<String>,
    /// URL the template directory is mirrored at.
    pub template_base_url: Option<String>,
}

/// Keeps the textual form of a toggle. Environment values such as `true`
/// or `1` arrive as booleans and numbers rather than strings.
fn deserialize_toggle<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawToggle {
        Text(String),
        Flag(bool),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(
        Option::<RawToggle>::deserialize(deserializer)?.map(|raw| match raw {
            RawToggle::Text(text) => text,
            RawToggle::Flag(flag) => flag.to_string(),
            RawToggle::Signed(number) => number.to_string(),
            RawToggle::Unsigned(number) => number.to_string(),
        }),
    )
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to adf-stacks.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

impl LifecycleConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(metadata.missing());
        }
        Ok(())
    }

    fn require_optional_field(
        value: Option<&str>,
        metadata: &FieldMetadata,
    ) -> Result<(), ConfigError> {
        match value {
            Some(raw) if raw.trim().is_empty() => Err(metadata.missing()),
            _ => Ok(()),
        }
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("adf-stacks")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns `true` only when termination protection is exactly `True`.
    #[must_use]
    pub fn termination_protection_enabled(&self) -> bool {
        self.termination_protection.as_deref() == Some(TERMINATION_PROTECTION_ENABLED)
    }

    /// Service role override, when configured.
    #[must_use]
    pub fn role_arn(&self) -> Option<RoleArn> {
        self.role_arn.as_deref().map(RoleArn::from)
    }

    /// Performs semantic validation. Error messages include guidance on how
    /// to provide missing values via environment variables or configuration
    /// files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// or an optional field is set to a blank value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.deployment_account_region,
            &FieldMetadata::new(
                "deployment account region",
                "ADF_DEPLOYMENT_ACCOUNT_REGION",
                "deployment_account_region",
            ),
        )?;
        Self::require_optional_field(
            self.role_arn.as_deref(),
            &FieldMetadata::new("service role ARN", "ADF_ROLE_ARN", "role_arn"),
        )?;
        Self::require_optional_field(
            self.template_root.as_deref(),
            &FieldMetadata::new("template directory", "ADF_TEMPLATE_ROOT", "template_root"),
        )?;
        Self::require_optional_field(
            self.template_base_url.as_deref(),
            &FieldMetadata::new(
                "template base URL",
                "ADF_TEMPLATE_BASE_URL",
                "template_base_url",
            ),
        )?;
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
