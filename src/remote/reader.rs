//! Read-only queries against the remote service.

use std::collections::VecDeque;
use std::sync::LazyLock;

use futures::stream::{self, BoxStream, StreamExt};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::AccountScope;
use crate::status::StackStatus;

use super::{ApiError, CloudFormationApi, StackSummary};

/// Names of the base stack family managed by teardown.
#[expect(
    clippy::expect_used,
    reason = "the pattern is a literal and is covered by unit tests"
)]
pub static FAMILY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("adf-(global|regional)-base").expect("family pattern compiles"));

/// Status and output lookups scoped to one account and region.
#[derive(Debug)]
pub struct RemoteStateReader<'a, A: ?Sized> {
    api: &'a A,
    scope: &'a AccountScope,
}

impl<'a, A> RemoteStateReader<'a, A>
where
    A: CloudFormationApi + ?Sized,
{
    /// Creates a reader over `api`.
    #[must_use]
    pub const fn new(api: &'a A, scope: &'a AccountScope) -> Self {
        Self { api, scope }
    }

    /// Returns the status of `stack_name`, or `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns the service error for any failure other than the
    /// validation-class "does not exist" signal.
    pub async fn get_status(&self, stack_name: &str) -> Result<Option<StackStatus>, ApiError> {
        match self.api.describe_stack(stack_name).await {
            Ok(description) => Ok(Some(description.status)),
            Err(err) if err.is_validation() => {
                debug!(
                    account = self.scope.account_label(),
                    region = %self.scope.region,
                    stack = stack_name,
                    "stack does not exist"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Returns the value of output `key` on `stack_name`.
    ///
    /// Any failure, including a missing stack or key, yields `None`.
    pub async fn get_output(&self, stack_name: &str, key: &str) -> Option<String> {
        match self.api.describe_stack(stack_name).await {
            Ok(description) => {
                let value = description.output(key).map(str::to_owned);
                if value.is_none() {
                    debug!(
                        account = self.scope.account_label(),
                        region = %self.scope.region,
                        stack = stack_name,
                        output = key,
                        "stack has no such output"
                    );
                }
                value
            }
            Err(err) => {
                warn!(
                    account = self.scope.account_label(),
                    region = %self.scope.region,
                    stack = stack_name,
                    output = key,
                    error = %err,
                    "could not read stack output"
                );
                None
            }
        }
    }

    /// Streams every stack whose name matches `pattern` and whose status is
    /// in `status_filter`.
    ///
    /// Pages are fetched on demand, so at most one page is buffered. Nested
    /// stacks are yielded as well; callers decide whether to skip them.
    #[must_use]
    pub fn list_family(
        &self,
        pattern: &'a Regex,
        status_filter: &'a [StackStatus],
    ) -> BoxStream<'a, Result<StackSummary, ApiError>> {
        let api = self.api;
        stream::try_unfold(PageCursor::default(), move |cursor| {
            next_matching(api, pattern, status_filter, cursor)
        })
        .boxed()
    }
}

#[derive(Debug, Default)]
struct PageCursor {
    buffered: VecDeque<StackSummary>,
    next_token: Option<String>,
    exhausted: bool,
}

async fn next_matching<A>(
    api: &A,
    pattern: &Regex,
    status_filter: &[StackStatus],
    mut cursor: PageCursor,
) -> Result<Option<(StackSummary, PageCursor)>, ApiError>
where
    A: CloudFormationApi + ?Sized,
{
    loop {
        if let Some(summary) = cursor.buffered.pop_front() {
            return Ok(Some((summary, cursor)));
        }
        if cursor.exhausted {
            return Ok(None);
        }
        let page = api
            .list_stacks(status_filter, cursor.next_token.as_deref())
            .await?;
        cursor.exhausted = page.next_token.is_none();
        cursor.next_token = page.next_token;
        cursor.buffered.extend(
            page.stacks
                .into_iter()
                .filter(|summary| pattern.is_match(&summary.name)),
        );
    }
}
