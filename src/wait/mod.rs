//! Bounded polling against the remote service.
//!
//! Each waiter observes the remote state immediately, then sleeps for a
//! jittered delay between observations until it succeeds, observes a
//! failure state, or exhausts [`WaiterKind::max_attempts`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::info;

use crate::error::{AccountScope, StackError};
use crate::remote::{CloudFormationApi, RemoteStateReader};
use crate::status::{Acceptance, WaiterKind};

/// Lower bound of the delay between waiter observations.
pub const DEFAULT_POLL_MIN: Duration = Duration::from_secs(11);
/// Upper bound of the delay between waiter observations.
pub const DEFAULT_POLL_MAX: Duration = Duration::from_secs(49);
/// Attempts made while confirming a change-set deletion.
pub const CHANGE_SET_DELETE_ATTEMPTS: u32 = 20;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(60);
const MISSING: &str = "MISSING";

type JitterFn = dyn Fn(Duration, Duration) -> Duration + Send + Sync;

/// Picks a delay within an inclusive range.
///
/// Production code samples uniformly; tests substitute a deterministic
/// function so polling never sleeps.
#[derive(Clone)]
pub struct Jitter(Arc<JitterFn>);

impl Jitter {
    /// Uniformly random delay with millisecond resolution.
    #[must_use]
    pub fn random() -> Self {
        Self(Arc::new(|min, max| {
            let low = millis(min);
            let high = millis(max);
            if high <= low {
                return min;
            }
            Duration::from_millis(rand::thread_rng().gen_range(low..=high))
        }))
    }

    /// Always returns a zero delay.
    #[must_use]
    pub fn zero() -> Self {
        Self::from_fn(|_, _| Duration::ZERO)
    }

    /// Wraps an arbitrary sampling function.
    #[must_use]
    pub fn from_fn(sample: impl Fn(Duration, Duration) -> Duration + Send + Sync + 'static) -> Self {
        Self(Arc::new(sample))
    }

    /// Samples a delay between `min` and `max`.
    #[must_use]
    pub fn sample(&self, min: Duration, max: Duration) -> Duration {
        (self.0)(min, max)
    }
}

impl Default for Jitter {
    fn default() -> Self {
        Self::random()
    }
}

impl fmt::Debug for Jitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Jitter(..)")
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Delays used by waiters and deletion confirmation.
#[derive(Clone, Debug)]
pub struct WaitPolicy {
    poll_min: Duration,
    poll_max: Duration,
    jitter: Jitter,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_min: DEFAULT_POLL_MIN,
            poll_max: DEFAULT_POLL_MAX,
            jitter: Jitter::random(),
        }
    }
}

impl WaitPolicy {
    /// Default delays with a custom jitter source.
    #[must_use]
    pub fn with_jitter(jitter: Jitter) -> Self {
        Self {
            jitter,
            ..Self::default()
        }
    }

    /// Overrides the poll delay range.
    #[must_use]
    pub const fn poll_range(mut self, min: Duration, max: Duration) -> Self {
        self.poll_min = min;
        self.poll_max = max;
        self
    }

    /// Delay before the next waiter observation.
    #[must_use]
    pub fn poll_delay(&self) -> Duration {
        self.jitter.sample(self.poll_min, self.poll_max)
    }

    /// Randomised exponential delay before deletion check `attempt`
    /// (zero-based), bounded by one minute.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let ceiling = BACKOFF_BASE
            .saturating_mul(2_u32.saturating_pow(attempt))
            .min(BACKOFF_CAP);
        self.jitter.sample(Duration::ZERO, ceiling)
    }
}

/// Blocks until `stack_name` satisfies `waiter`.
///
/// # Errors
///
/// Returns [`StackError::WaiterFailed`] when the stack settles in a failure
/// state, [`StackError::WaitTimeout`] when attempts run out and
/// [`StackError::Api`] when the status cannot be read.
pub async fn wait_for_stack<A>(
    api: &A,
    scope: &AccountScope,
    policy: &WaitPolicy,
    stack_name: &str,
    waiter: WaiterKind,
) -> Result<(), StackError>
where
    A: CloudFormationApi + ?Sized,
{
    let reader = RemoteStateReader::new(api, scope);
    let max_attempts = waiter.max_attempts();
    info!(
        account = scope.account_label(),
        region = %scope.region,
        stack = stack_name,
        waiter = %waiter,
        "waiting for stack"
    );
    for attempt in 1..=max_attempts {
        let status = reader
            .get_status(stack_name)
            .await
            .map_err(|source| StackError::Api {
                context: scope.context(stack_name),
                operation: "describe_stack",
                source,
            })?;
        match waiter.accept_stack(status) {
            Acceptance::Success => return Ok(()),
            Acceptance::Failure => {
                return Err(StackError::WaiterFailed {
                    context: scope.context(stack_name),
                    waiter,
                    status: status.map_or_else(|| MISSING.to_owned(), |value| value.to_string()),
                    reason: String::from("stack settled outside the awaited state"),
                });
            }
            Acceptance::Retry => {}
        }
        if attempt < max_attempts {
            sleep(policy.poll_delay()).await;
        }
    }
    Err(StackError::WaitTimeout {
        context: scope.context(stack_name),
        waiter,
        attempts: max_attempts,
    })
}

/// Blocks until the change set named after `stack_name` is ready.
///
/// # Errors
///
/// Returns [`StackError::WaiterFailed`] carrying the change-set status and
/// reason when creation fails, [`StackError::WaitTimeout`] when attempts run
/// out and [`StackError::Api`] for non-validation service errors.
pub async fn wait_for_change_set<A>(
    api: &A,
    scope: &AccountScope,
    policy: &WaitPolicy,
    stack_name: &str,
) -> Result<(), StackError>
where
    A: CloudFormationApi + ?Sized,
{
    let waiter = WaiterKind::ChangeSetCreateComplete;
    let max_attempts = waiter.max_attempts();
    for attempt in 1..=max_attempts {
        let description = match api.describe_change_set(stack_name, stack_name).await {
            Ok(description) => Some(description),
            Err(err) if err.is_validation() => None,
            Err(source) => {
                return Err(StackError::Api {
                    context: scope.context(stack_name),
                    operation: "describe_change_set",
                    source,
                });
            }
        };
        let status = description.as_ref().map(|value| value.status);
        match waiter.accept_change_set(status) {
            Acceptance::Success => return Ok(()),
            Acceptance::Failure => {
                return Err(StackError::WaiterFailed {
                    context: scope.context(stack_name),
                    waiter,
                    status: status.map_or_else(|| MISSING.to_owned(), |value| value.to_string()),
                    reason: description
                        .and_then(|value| value.status_reason)
                        .unwrap_or_default(),
                });
            }
            Acceptance::Retry => {}
        }
        if attempt < max_attempts {
            sleep(policy.poll_delay()).await;
        }
    }
    Err(StackError::WaitTimeout {
        context: scope.context(stack_name),
        waiter,
        attempts: max_attempts,
    })
}

/// Dispatches to the stack or change-set waiter for `waiter`.
///
/// # Errors
///
/// Propagates the errors of [`wait_for_stack`] and [`wait_for_change_set`].
pub async fn wait_for<A>(
    api: &A,
    scope: &AccountScope,
    policy: &WaitPolicy,
    stack_name: &str,
    waiter: WaiterKind,
) -> Result<(), StackError>
where
    A: CloudFormationApi + ?Sized,
{
    if waiter.observes_change_set() {
        wait_for_change_set(api, scope, policy, stack_name).await
    } else {
        wait_for_stack(api, scope, policy, stack_name, waiter).await
    }
}

#[cfg(test)]
mod tests;
