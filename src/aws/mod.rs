//! `CloudFormationApi` backed by the AWS SDK.
//!
//! The adapter translates between the crate's request and response types
//! and the SDK builders. Service errors keep their code and message so the
//! orchestrator can recognise the validation-class "does not exist" signal.

use std::str::FromStr;

use aws_sdk_cloudformation::Client;
use aws_sdk_cloudformation::config::Region;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cloudformation::types::{
    Capability as SdkCapability, ChangeSetType as SdkChangeSetType, Parameter,
    StackStatus as SdkStackStatus, Tag,
};

use crate::remote::{
    ApiError, ApiFuture, ChangeSetDescription, ChangeSetRequest, CloudFormationApi,
    StackDescription, StackOutput, StackPage, StackSummary,
};
use crate::status::{ChangeSetStatus, StackStatus};
use crate::types::TemplateLocation;

const UNKNOWN_ERROR_CODE: &str = "Unknown";
const MALFORMED_RESPONSE_CODE: &str = "MalformedResponse";

/// CloudFormation client for one region.
#[derive(Clone, Debug)]
pub struct AwsCloudFormation {
    client: Client,
}

impl AwsCloudFormation {
    /// Wraps an existing SDK client.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self { client }
    }

    /// Loads credentials from the default provider chain and targets
    /// `region`.
    pub async fn from_env(region: &str) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(region.to_owned()))
            .load()
            .await;
        Self::new(Client::new(&config))
    }
}

fn api_error<E>(err: &E) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let code = err.code().unwrap_or(UNKNOWN_ERROR_CODE);
    let message = err
        .message()
        .map_or_else(|| DisplayErrorContext(err).to_string(), str::to_owned);
    ApiError::new(code, message)
}

fn malformed(message: impl Into<String>) -> ApiError {
    ApiError::new(MALFORMED_RESPONSE_CODE, message)
}

fn parse_stack_status(raw: Option<&SdkStackStatus>) -> Result<StackStatus, ApiError> {
    let value = raw.ok_or_else(|| malformed("stack without status"))?;
    StackStatus::from_str(value.as_str()).map_err(|err| malformed(err.to_string()))
}

impl CloudFormationApi for AwsCloudFormation {
    fn describe_stack<'a>(&'a self, stack_name: &'a str) -> ApiFuture<'a, StackDescription> {
        Box::pin(async move {
            let output = self
                .client
                .describe_stacks()
                .stack_name(stack_name)
                .send()
                .await
                .map_err(|err| api_error(&err))?;
            let stack = output.stacks().first().ok_or_else(|| {
                ApiError::validation(format!("Stack with id {stack_name} does not exist"))
            })?;
            Ok(StackDescription {
                name: stack.stack_name().unwrap_or(stack_name).to_owned(),
                status: parse_stack_status(stack.stack_status())?,
                outputs: stack
                    .outputs()
                    .iter()
                    .filter_map(|output| {
                        Some(StackOutput {
                            key: output.output_key()?.to_owned(),
                            value: output.output_value()?.to_owned(),
                        })
                    })
                    .collect(),
            })
        })
    }

    fn list_stacks<'a>(
        &'a self,
        status_filter: &'a [StackStatus],
        next_token: Option<&'a str>,
    ) -> ApiFuture<'a, StackPage> {
        Box::pin(async move {
            let filter = status_filter
                .iter()
                .map(|status| SdkStackStatus::from(status.as_str()))
                .collect();
            let output = self
                .client
                .list_stacks()
                .set_stack_status_filter(Some(filter))
                .set_next_token(next_token.map(str::to_owned))
                .send()
                .await
                .map_err(|err| api_error(&err))?;
            let stacks = output
                .stack_summaries()
                .iter()
                .map(|summary| {
                    Ok(StackSummary {
                        name: summary
                            .stack_name()
                            .ok_or_else(|| malformed("stack summary without name"))?
                            .to_owned(),
                        status: parse_stack_status(summary.stack_status())?,
                        parent_id: summary.parent_id().map(str::to_owned),
                    })
                })
                .collect::<Result<Vec<_>, ApiError>>()?;
            Ok(StackPage {
                stacks,
                next_token: output.next_token().map(str::to_owned),
            })
        })
    }

    fn validate_template<'a>(&'a self, location: &'a TemplateLocation) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .validate_template()
                .template_url(location.as_str())
                .send()
                .await
                .map_err(|err| api_error(&err))?;
            Ok(())
        })
    }

    fn create_change_set<'a>(&'a self, request: &'a ChangeSetRequest) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let parameters = request
                .parameters
                .iter()
                .map(|parameter| {
                    Parameter::builder()
                        .parameter_key(&parameter.parameter_key)
                        .parameter_value(&parameter.parameter_value)
                        .build()
                })
                .collect();
            let capabilities = request
                .capabilities
                .iter()
                .map(|capability| SdkCapability::from(capability.as_str()))
                .collect();
            let tags = request
                .tags
                .iter()
                .map(|tag| Tag::builder().key(&tag.key).value(&tag.value).build())
                .collect();
            self.client
                .create_change_set()
                .stack_name(&request.stack_name)
                .change_set_name(&request.change_set_name)
                .template_url(request.template_location.as_str())
                .set_parameters(Some(parameters))
                .set_capabilities(Some(capabilities))
                .set_tags(Some(tags))
                .change_set_type(SdkChangeSetType::from(request.change_set_type.as_str()))
                .set_role_arn(request.role_arn.as_ref().map(ToString::to_string))
                .send()
                .await
                .map_err(|err| api_error(&err))?;
            Ok(())
        })
    }

    fn describe_change_set<'a>(
        &'a self,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ApiFuture<'a, ChangeSetDescription> {
        Box::pin(async move {
            let output = self
                .client
                .describe_change_set()
                .stack_name(stack_name)
                .change_set_name(change_set_name)
                .send()
                .await
                .map_err(|err| api_error(&err))?;
            let raw = output
                .status()
                .ok_or_else(|| malformed("change set without status"))?;
            Ok(ChangeSetDescription {
                status: ChangeSetStatus::from_str(raw.as_str())
                    .map_err(|err| malformed(err.to_string()))?,
                status_reason: output.status_reason().map(str::to_owned),
            })
        })
    }

    fn delete_change_set<'a>(
        &'a self,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .delete_change_set()
                .stack_name(stack_name)
                .change_set_name(change_set_name)
                .send()
                .await
                .map_err(|err| api_error(&err))?;
            Ok(())
        })
    }

    fn execute_change_set<'a>(
        &'a self,
        stack_name: &'a str,
        change_set_name: &'a str,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .execute_change_set()
                .stack_name(stack_name)
                .change_set_name(change_set_name)
                .send()
                .await
                .map_err(|err| api_error(&err))?;
            Ok(())
        })
    }

    fn update_termination_protection<'a>(
        &'a self,
        stack_name: &'a str,
        enabled: bool,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .update_termination_protection()
                .stack_name(stack_name)
                .enable_termination_protection(enabled)
                .send()
                .await
                .map_err(|err| api_error(&err))?;
            Ok(())
        })
    }

    fn delete_stack<'a>(&'a self, stack_name: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            self.client
                .delete_stack()
                .stack_name(stack_name)
                .send()
                .await
                .map_err(|err| api_error(&err))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(SdkStackStatus::UpdateRollbackComplete), Ok(StackStatus::UpdateRollbackComplete))]
    #[case(None, Err(MALFORMED_RESPONSE_CODE))]
    #[case(Some(SdkStackStatus::from("SOMETHING_NEW")), Err(MALFORMED_RESPONSE_CODE))]
    fn sdk_statuses_map_onto_the_closed_set(
        #[case] raw: Option<SdkStackStatus>,
        #[case] expected: Result<StackStatus, &str>,
    ) {
        let parsed = parse_stack_status(raw.as_ref()).map_err(|err| err.code);
        assert_eq!(parsed, expected.map_err(str::to_owned));
    }
}
