//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::env;
use std::ffi::OsString;
use std::future::ready;
use std::sync::{Arc, Mutex, MutexGuard as StdMutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::remote::{
    ApiError, ApiFuture, ChangeSetDescription, ChangeSetRequest, ChangeSetType,
    CloudFormationApi, StackDescription, StackOutput, StackPage, StackSummary,
};
use crate::status::{ChangeSetStatus, StackStatus};
use crate::store::{StackParameter, StoreError, TemplateStore};
use crate::types::TemplateLocation;

/// Base URL used by [`MemoryTemplateStore`] locations.
pub const MEMORY_BASE_URL: &str = "https://templates.example.com";

/// Records a single call made through [`FakeCloudFormation`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ApiCall {
    /// `describe_stack`
    DescribeStack {
        /// Stack described.
        stack_name: String,
    },
    /// `list_stacks`
    ListStacks {
        /// Pagination token supplied.
        next_token: Option<String>,
    },
    /// `validate_template`
    ValidateTemplate {
        /// Template validated.
        location: TemplateLocation,
    },
    /// `create_change_set`
    CreateChangeSet(Box<ChangeSetRequest>),
    /// `describe_change_set`
    DescribeChangeSet {
        /// Stack owning the change set.
        stack_name: String,
    },
    /// `delete_change_set`
    DeleteChangeSet {
        /// Stack owning the change set.
        stack_name: String,
    },
    /// `execute_change_set`
    ExecuteChangeSet {
        /// Stack owning the change set.
        stack_name: String,
    },
    /// `update_termination_protection`
    UpdateTerminationProtection {
        /// Stack updated.
        stack_name: String,
        /// Requested protection flag.
        enabled: bool,
    },
    /// `delete_stack`
    DeleteStack {
        /// Stack deleted.
        stack_name: String,
    },
}

impl ApiCall {
    /// Returns `true` for calls that change remote state.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::DescribeStack { .. }
                | Self::ListStacks { .. }
                | Self::DescribeChangeSet { .. }
                | Self::ValidateTemplate { .. }
        )
    }

    /// Compact label used in ordering assertions, for example
    /// `delete_stack adf-global-base-iam`.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::DescribeStack { stack_name } => format!("describe_stack {stack_name}"),
            Self::ListStacks { .. } => "list_stacks".to_owned(),
            Self::ValidateTemplate { location } => format!("validate_template {location}"),
            Self::CreateChangeSet(request) => format!(
                "create_change_set {} {}",
                request.stack_name,
                request.change_set_type.as_str()
            ),
            Self::DescribeChangeSet { stack_name } => format!("describe_change_set {stack_name}"),
            Self::DeleteChangeSet { stack_name } => format!("delete_change_set {stack_name}"),
            Self::ExecuteChangeSet { stack_name } => format!("execute_change_set {stack_name}"),
            Self::UpdateTerminationProtection {
                stack_name,
                enabled,
            } => format!("update_termination_protection {stack_name} {enabled}"),
            Self::DeleteStack { stack_name } => format!("delete_stack {stack_name}"),
        }
    }
}

#[derive(Clone, Debug)]
struct FakeStack {
    name: String,
    status: StackStatus,
    script: VecDeque<Option<StackStatus>>,
    outputs: Vec<StackOutput>,
    parent_id: Option<String>,
    termination_protection: bool,
}

#[derive(Clone, Debug)]
struct FakeChangeSet {
    description: ChangeSetDescription,
    change_set_type: ChangeSetType,
    pending_polls: u32,
    deleting: Option<u32>,
}

#[derive(Debug, Default)]
struct FakeState {
    stacks: Vec<FakeStack>,
    change_sets: BTreeMap<String, FakeChangeSet>,
    calls: Vec<ApiCall>,
    failures: HashMap<&'static str, VecDeque<ApiError>>,
    invalid_templates: BTreeMap<String, String>,
    change_set_results: VecDeque<ChangeSetDescription>,
    change_set_pending_polls: u32,
    change_set_delete_lag: u32,
    execute_results: VecDeque<Vec<Option<StackStatus>>>,
    page_size: Option<usize>,
}

impl FakeState {
    fn stack_mut(&mut self, name: &str) -> Option<&mut FakeStack> {
        self.stacks.iter_mut().find(|stack| stack.name == name)
    }

    fn take_failure(&mut self, operation: &'static str) -> Option<ApiError> {
        self.failures
            .get_mut(operation)
            .and_then(VecDeque::pop_front)
    }

    fn describe_stack(&mut self, name: &str) -> Result<StackDescription, ApiError> {
        if let Some(err) = self.take_failure("describe_stack") {
            return Err(err);
        }
        let Some(stack) = self.stack_mut(name) else {
            return Err(missing_stack(name));
        };
        match stack.script.pop_front() {
            Some(Some(next)) => stack.status = next,
            Some(None) => {
                self.stacks.retain(|candidate| candidate.name != name);
                return Err(missing_stack(name));
            }
            None => {}
        }
        let snapshot = self
            .stack_mut(name)
            .map(|current| StackDescription {
                name: current.name.clone(),
                status: current.status,
                outputs: current.outputs.clone(),
            });
        snapshot.ok_or_else(|| missing_stack(name))
    }

    fn list_stacks(
        &mut self,
        filter: &[StackStatus],
        next_token: Option<&str>,
    ) -> Result<StackPage, ApiError> {
        if let Some(err) = self.take_failure("list_stacks") {
            return Err(err);
        }
        let start = next_token
            .map(|token| {
                token
                    .parse::<usize>()
                    .map_err(|_| ApiError::validation(format!("bad token {token}")))
            })
            .transpose()?
            .unwrap_or_default();
        let matching: Vec<StackSummary> = self
            .stacks
            .iter()
            .filter(|stack| filter.contains(&stack.status))
            .map(|stack| StackSummary {
                name: stack.name.clone(),
                status: stack.status,
                parent_id: stack.parent_id.clone(),
            })
            .collect();
        let page_size = self.page_size.unwrap_or(usize::MAX).max(1);
        let stacks: Vec<StackSummary> =
            matching.iter().skip(start).take(page_size).cloned().collect();
        let end = start.saturating_add(stacks.len());
        let next = (end < matching.len()).then(|| end.to_string());
        Ok(StackPage {
            stacks,
            next_token: next,
        })
    }

    fn create_change_set(&mut self, request: &ChangeSetRequest) -> Result<(), ApiError> {
        if let Some(err) = self.take_failure("create_change_set") {
            return Err(err);
        }
        if self.change_sets.contains_key(&request.stack_name) {
            return Err(ApiError::new(
                "AlreadyExistsException",
                format!("ChangeSet {} already exists", request.change_set_name),
            ));
        }
        if self.stack_mut(&request.stack_name).is_none() {
            if request.change_set_type == ChangeSetType::Update {
                return Err(missing_stack(&request.stack_name));
            }
            self.stacks.push(FakeStack::new(
                &request.stack_name,
                StackStatus::ReviewInProgress,
            ));
        }
        let description = self
            .change_set_results
            .pop_front()
            .unwrap_or(ChangeSetDescription {
                status: ChangeSetStatus::CreateComplete,
                status_reason: None,
            });
        self.change_sets.insert(
            request.stack_name.clone(),
            FakeChangeSet {
                description,
                change_set_type: request.change_set_type,
                pending_polls: self.change_set_pending_polls,
                deleting: None,
            },
        );
        Ok(())
    }

    fn describe_change_set(&mut self, stack_name: &str) -> Result<ChangeSetDescription, ApiError> {
        if let Some(err) = self.take_failure("describe_change_set") {
            return Err(err);
        }
        let Some(change_set) = self.change_sets.get_mut(stack_name) else {
            return Err(missing_change_set(stack_name));
        };
        match change_set.deleting {
            Some(0) => {
                self.change_sets.remove(stack_name);
                return Err(missing_change_set(stack_name));
            }
            Some(remaining) => {
                change_set.deleting = Some(remaining.saturating_sub(1));
                return Ok(ChangeSetDescription {
                    status: ChangeSetStatus::DeleteInProgress,
                    status_reason: None,
                });
            }
            None => {}
        }
        if change_set.pending_polls > 0 {
            change_set.pending_polls = change_set.pending_polls.saturating_sub(1);
            return Ok(ChangeSetDescription {
                status: ChangeSetStatus::CreateInProgress,
                status_reason: None,
            });
        }
        Ok(change_set.description.clone())
    }

    fn delete_change_set(&mut self, stack_name: &str) -> Result<(), ApiError> {
        if let Some(err) = self.take_failure("delete_change_set") {
            return Err(err);
        }
        let lag = self.change_set_delete_lag;
        let Some(change_set) = self.change_sets.get_mut(stack_name) else {
            return Err(missing_change_set(stack_name));
        };
        if lag == 0 {
            self.change_sets.remove(stack_name);
        } else {
            change_set.deleting = Some(lag);
        }
        Ok(())
    }

    fn execute_change_set(&mut self, stack_name: &str) -> Result<(), ApiError> {
        if let Some(err) = self.take_failure("execute_change_set") {
            return Err(err);
        }
        let Some(change_set) = self.change_sets.remove(stack_name) else {
            return Err(missing_change_set(stack_name));
        };
        let script = self.execute_results.pop_front();
        let settled = match change_set.change_set_type {
            ChangeSetType::Create => StackStatus::CreateComplete,
            ChangeSetType::Update => StackStatus::UpdateComplete,
        };
        let Some(stack) = self.stack_mut(stack_name) else {
            return Err(missing_stack(stack_name));
        };
        stack.status = settled;
        if let Some(statuses) = script {
            stack.script = statuses.into();
        }
        Ok(())
    }

    fn delete_stack(&mut self, stack_name: &str) -> Result<(), ApiError> {
        if let Some(err) = self.take_failure("delete_stack") {
            return Err(err);
        }
        self.stacks.retain(|stack| stack.name != stack_name);
        self.change_sets.remove(stack_name);
        Ok(())
    }
}

impl FakeStack {
    fn new(name: &str, status: StackStatus) -> Self {
        Self {
            name: name.to_owned(),
            status,
            script: VecDeque::new(),
            outputs: Vec::new(),
            parent_id: None,
            termination_protection: false,
        }
    }
}

fn missing_stack(name: &str) -> ApiError {
    ApiError::validation(format!("Stack with id {name} does not exist"))
}

fn missing_change_set(stack_name: &str) -> ApiError {
    ApiError::new(
        "ChangeSetNotFound",
        format!("ChangeSet [{stack_name}] does not exist"),
    )
}

/// Scripted, in-memory stand-in for the remote stack service.
///
/// Stacks keep insertion order so listings are deterministic. Every call is
/// recorded, which makes the ordering of remote mutations observable.
#[derive(Clone, Debug, Default)]
pub struct FakeCloudFormation {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCloudFormation {
    /// Creates a service with no stacks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StdMutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record<T>(
        &self,
        call: ApiCall,
        op: impl FnOnce(&mut FakeState) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut state = self.lock();
        state.calls.push(call);
        op(&mut *state)
    }

    /// Adds a top-level stack.
    pub fn insert_stack(&self, name: &str, status: StackStatus) {
        self.lock().stacks.push(FakeStack::new(name, status));
    }

    /// Adds a stack created by `parent`.
    pub fn insert_nested_stack(&self, name: &str, status: StackStatus, parent: &str) {
        let mut stack = FakeStack::new(name, status);
        stack.parent_id = Some(parent.to_owned());
        self.lock().stacks.push(stack);
    }

    /// Queues statuses reported by successive `describe_stack` calls.
    /// `None` makes the stack disappear.
    pub fn script_statuses(&self, name: &str, statuses: &[Option<StackStatus>]) {
        if let Some(stack) = self.lock().stack_mut(name) {
            stack.script.extend(statuses.iter().copied());
        }
    }

    /// Queues statuses reported after the next `execute_change_set`.
    pub fn script_after_execute(&self, statuses: &[Option<StackStatus>]) {
        self.lock().execute_results.push_back(statuses.to_vec());
    }

    /// Sets an output on an existing stack.
    pub fn set_output(&self, name: &str, key: &str, value: &str) {
        if let Some(stack) = self.lock().stack_mut(name) {
            stack.outputs.push(StackOutput {
                key: key.to_owned(),
                value: value.to_owned(),
            });
        }
    }

    /// Seeds an existing change set for `stack_name`.
    pub fn insert_change_set(&self, stack_name: &str, status: ChangeSetStatus) {
        self.lock().change_sets.insert(
            stack_name.to_owned(),
            FakeChangeSet {
                description: ChangeSetDescription {
                    status,
                    status_reason: None,
                },
                change_set_type: ChangeSetType::Update,
                pending_polls: 0,
                deleting: None,
            },
        );
    }

    /// Queues the final state of the next created change set.
    pub fn queue_change_set_result(&self, status: ChangeSetStatus, reason: Option<&str>) {
        self.lock().change_set_results.push_back(ChangeSetDescription {
            status,
            status_reason: reason.map(str::to_owned),
        });
    }

    /// Number of `CREATE_IN_PROGRESS` observations before a created change
    /// set settles.
    pub fn set_change_set_pending_polls(&self, polls: u32) {
        self.lock().change_set_pending_polls = polls;
    }

    /// Number of observations a deleted change set stays visible for.
    pub fn set_change_set_delete_lag(&self, lag: u32) {
        self.lock().change_set_delete_lag = lag;
    }

    /// Makes the next call of `operation` fail with `err`.
    pub fn fail_next(&self, operation: &'static str, err: ApiError) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(err);
    }

    /// Makes template validation of `location` fail.
    pub fn reject_template(&self, location: &str, message: &str) {
        self.lock()
            .invalid_templates
            .insert(location.to_owned(), message.to_owned());
    }

    /// Limits listing pages to `size` entries.
    pub fn set_page_size(&self, size: usize) {
        self.lock().page_size = Some(size);
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// Labels of recorded calls that change remote state, in order.
    #[must_use]
    pub fn mutations(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .map(ApiCall::label)
            .collect()
    }

    /// Names passed to `delete_stack`, in order.
    #[must_use]
    pub fn deleted_stacks(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ApiCall::DeleteStack { stack_name } => Some(stack_name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Change-set requests received, in order.
    #[must_use]
    pub fn change_set_requests(&self) -> Vec<ChangeSetRequest> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ApiCall::CreateChangeSet(request) => Some((**request).clone()),
                _ => None,
            })
            .collect()
    }

    /// Current status of a stack, without consuming scripted statuses.
    #[must_use]
    pub fn status_of(&self, name: &str) -> Option<StackStatus> {
        self.lock().stack_mut(name).map(|stack| stack.status)
    }

    /// Returns `true` when a change set is recorded for `stack_name`.
    #[must_use]
    pub fn has_change_set(&self, stack_name: &str) -> bool {
        self.lock().change_sets.contains_key(stack_name)
    }

    /// Current termination protection flag of a stack.
    #[must_use]
    pub fn termination_protection(&self, name: &str) -> bool {
        self.lock()
            .stack_mut(name)
            .is_some_and(|stack| stack.termination_protection)
    }
}

impl CloudFormationApi for FakeCloudFormation {
    fn describe_stack<'a>(&'a self, stack_name: &'a str) -> ApiFuture<'a, StackDescription> {
        let result = self.record(
            ApiCall::DescribeStack {
                stack_name: stack_name.to_owned(),
            },
            |state| state.describe_stack(stack_name),
        );
        Box::pin(ready(result))
    }

    fn list_stacks<'a>(
        &'a self,
        status_filter: &'a [StackStatus],
        next_token: Option<&'a str>,
    ) -> ApiFuture<'a, StackPage> {
        let result = self.record(
            ApiCall::ListStacks {
                next_token: next_token.map(str::to_owned),
            },
            |state| state.list_stacks(status_filter, next_token),
        );
        Box::pin(ready(result))
    }

    fn validate_template<'a>(&'a self, location: &'a TemplateLocation) -> ApiFuture<'a, ()> {
        let result = self.record(
            ApiCall::ValidateTemplate {
                location: location.clone(),
            },
            |state| {
                if let Some(err) = state.take_failure("validate_template") {
                    return Err(err);
                }
                match state.invalid_templates.get(location.as_str()) {
                    Some(message) => Err(ApiError::validation(message.clone())),
                    None => Ok(()),
                }
            },
        );
        Box::pin(ready(result))
    }

    fn create_change_set<'a>(&'a self, request: &'a ChangeSetRequest) -> ApiFuture<'a, ()> {
        let result = self.record(ApiCall::CreateChangeSet(Box::new(request.clone())), |state| {
            state.create_change_set(request)
        });
        Box::pin(ready(result))
    }

    fn describe_change_set<'a>(
        &'a self,
        stack_name: &'a str,
        _change_set_name: &'a str,
    ) -> ApiFuture<'a, ChangeSetDescription> {
        let result = self.record(
            ApiCall::DescribeChangeSet {
                stack_name: stack_name.to_owned(),
            },
            |state| state.describe_change_set(stack_name),
        );
        Box::pin(ready(result))
    }

    fn delete_change_set<'a>(
        &'a self,
        stack_name: &'a str,
        _change_set_name: &'a str,
    ) -> ApiFuture<'a, ()> {
        let result = self.record(
            ApiCall::DeleteChangeSet {
                stack_name: stack_name.to_owned(),
            },
            |state| state.delete_change_set(stack_name),
        );
        Box::pin(ready(result))
    }

    fn execute_change_set<'a>(
        &'a self,
        stack_name: &'a str,
        _change_set_name: &'a str,
    ) -> ApiFuture<'a, ()> {
        let result = self.record(
            ApiCall::ExecuteChangeSet {
                stack_name: stack_name.to_owned(),
            },
            |state| state.execute_change_set(stack_name),
        );
        Box::pin(ready(result))
    }

    fn update_termination_protection<'a>(
        &'a self,
        stack_name: &'a str,
        enabled: bool,
    ) -> ApiFuture<'a, ()> {
        let result = self.record(
            ApiCall::UpdateTerminationProtection {
                stack_name: stack_name.to_owned(),
                enabled,
            },
            |state| {
                if let Some(err) = state.take_failure("update_termination_protection") {
                    return Err(err);
                }
                let stack = state
                    .stack_mut(stack_name)
                    .ok_or_else(|| missing_stack(stack_name))?;
                stack.termination_protection = enabled;
                Ok(())
            },
        );
        Box::pin(ready(result))
    }

    fn delete_stack<'a>(&'a self, stack_name: &'a str) -> ApiFuture<'a, ()> {
        let result = self.record(
            ApiCall::DeleteStack {
                stack_name: stack_name.to_owned(),
            },
            |state| state.delete_stack(stack_name),
        );
        Box::pin(ready(result))
    }
}

/// In-memory template store keyed by logical template path.
#[derive(Clone, Debug, Default)]
pub struct MemoryTemplateStore {
    templates: BTreeSet<String>,
    parameters: BTreeMap<String, Vec<StackParameter>>,
}

impl MemoryTemplateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a template under `key`.
    #[must_use]
    pub fn with_template(mut self, key: &str) -> Self {
        self.templates.insert(key.to_owned());
        self
    }

    /// Stores a parameter list under `key`.
    #[must_use]
    pub fn with_parameters(mut self, key: &str, parameters: Vec<StackParameter>) -> Self {
        self.parameters.insert(key.to_owned(), parameters);
        self
    }

    /// Location a published template resolves to.
    #[must_use]
    pub fn location_of(key: &str) -> TemplateLocation {
        TemplateLocation::new(format!("{MEMORY_BASE_URL}/{key}"))
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn resolve(&self, key: &str) -> Result<Option<TemplateLocation>, StoreError> {
        Ok(self
            .templates
            .contains(key)
            .then(|| Self::location_of(key)))
    }

    fn read_parameters(&self, key: &str) -> Result<Vec<StackParameter>, StoreError> {
        self.parameters
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_owned(),
            })
    }
}

/// Serialises tests that read or write `ADF_*` environment variables.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Holds [`ENV_LOCK`] while environment overrides are in place and restores
/// the previous values on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets `pairs` for the guard's lifetime.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        Self::override_vars(pairs, &[]).await
    }

    /// Sets `pairs` and removes `removed` under a single lock acquisition.
    pub async fn override_vars(pairs: &[(&str, &str)], removed: &[&str]) -> Self {
        let guard = ENV_LOCK.lock().await;
        let changes = pairs
            .iter()
            .map(|(key, value)| (*key, Some(*value)))
            .chain(removed.iter().map(|key| (*key, None)));
        let mut seen = BTreeSet::new();
        let mut previous = Vec::new();
        for (key, value) in changes {
            if !seen.insert(key) {
                continue;
            }
            previous.push((key.to_owned(), env::var_os(key)));
            write_var(key, value.map(OsString::from).as_ref());
        }
        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            write_var(key, old.as_ref());
        }
    }
}

fn write_var(key: &str, value: Option<&OsString>) {
    // SAFETY: callers hold `ENV_LOCK`, so no other test mutates the
    // environment concurrently.
    unsafe {
        match value {
            Some(val) => env::set_var(key, val),
            None => env::remove_var(key),
        }
    }
}
