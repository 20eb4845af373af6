//! Canonical stack names derived from a logical template path.
//!
//! Names are pure string derivations: no I/O happens here. A stack deployed
//! in the deployment home region is `global`, anywhere else `regional`.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

/// Name of the privileged stack holding cross-stack IAM policies.
pub const IAM_STACK_NAME: &str = "adf-global-base-iam";

/// Name of the global bootstrap base stack.
pub const BOOTSTRAP_STACK_NAME: &str = "adf-global-base-bootstrap";

/// Name of the global build base stack.
pub const ADF_BUILD_STACK_NAME: &str = "adf-global-base-adf-build";

/// Template filename used for the privileged IAM stack.
pub const IAM_TEMPLATE_NAME: &str = "global-iam";

const DEDICATED_SUFFIXES: [&str; 2] = ["deployment", "adf-build"];
const DEFAULT_SUFFIX: &str = "bootstrap";

/// Deployment topology of a stack relative to the home region.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum GeoPrefix {
    /// The stack lives in the deployment home region.
    Global,
    /// The stack lives in any other region.
    Regional,
}

impl GeoPrefix {
    /// Returns the prefix used in names and template paths.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Regional => "regional",
        }
    }
}

impl fmt::Display for GeoPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selects `global` when `region` is the home region, else `regional`.
#[must_use]
pub fn resolve_geo_prefix(region: &str, home_region: &str) -> GeoPrefix {
    if region == home_region {
        GeoPrefix::Global
    } else {
        GeoPrefix::Regional
    }
}

/// Replaces every character outside `[A-Za-z0-9-]` with `-`.
#[must_use]
pub fn sanitize_stack_name(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' {
                ch
            } else {
                '-'
            }
        })
        .collect()
}

/// Derives the base stack name for a logical path.
///
/// The last path segment selects the suffix: `deployment` and `adf-build`
/// are kept, anything else collapses to `bootstrap`.
#[must_use]
pub fn build_stack_name(logical_path: &str, geo: GeoPrefix) -> String {
    let last_segment = logical_path.rsplit('/').next().unwrap_or_default();
    let suffix = DEDICATED_SUFFIXES
        .into_iter()
        .find(|candidate| *candidate == last_segment)
        .unwrap_or(DEFAULT_SUFFIX);
    sanitize_stack_name(&format!("adf-{geo}-base-{suffix}"))
}

/// Returns `<logical_path>/<filename>.yml`, where the filename defaults to
/// the geo prefix.
#[must_use]
pub fn template_key(logical_path: &str, geo: GeoPrefix, filename_override: Option<&str>) -> String {
    let filename = filename_override.unwrap_or(geo.as_str());
    format!("{logical_path}/{filename}.yml")
}

/// Returns `<logical_path>/<geo>-params.json`.
#[must_use]
pub fn parameter_key(logical_path: &str, geo: GeoPrefix) -> String {
    format!("{logical_path}/{geo}-params.json")
}

/// Errors raised while resolving a stack identity.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum NamingError {
    /// Neither a logical path nor an explicit name was supplied.
    #[error("a logical path or an explicit stack name is required")]
    MissingName,
    /// A required region was blank.
    #[error("missing {field}")]
    MissingRegion {
        /// Name of the blank field.
        field: &'static str,
    },
}

/// Resolved identity of the stack an orchestrator manages.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackIdentity {
    logical_path: Option<String>,
    region: String,
    home_region: String,
    name: String,
}

impl StackIdentity {
    /// Resolves the identity, preferring an explicit name over the
    /// path-derived one.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError::MissingRegion`] when a region is blank and
    /// [`NamingError::MissingName`] when neither a path nor a name is given.
    pub fn resolve(
        region: impl Into<String>,
        home_region: impl Into<String>,
        logical_path: Option<String>,
        explicit_name: Option<String>,
    ) -> Result<Self, NamingError> {
        let trimmed_region = region.into().trim().to_owned();
        let trimmed_home_region = home_region.into().trim().to_owned();
        if trimmed_region.is_empty() {
            return Err(NamingError::MissingRegion { field: "region" });
        }
        if trimmed_home_region.is_empty() {
            return Err(NamingError::MissingRegion {
                field: "home_region",
            });
        }
        let path = logical_path.filter(|value| !value.trim().is_empty());
        let geo = resolve_geo_prefix(&trimmed_region, &trimmed_home_region);
        let name = match (explicit_name, path.as_deref()) {
            (Some(name), _) => name,
            (None, Some(value)) => build_stack_name(value, geo),
            (None, None) => return Err(NamingError::MissingName),
        };
        Ok(Self {
            logical_path: path,
            region: trimmed_region,
            home_region: trimmed_home_region,
            name,
        })
    }

    /// Returns the same identity pinned to another stack name.
    #[must_use]
    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    /// Resolved stack name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Region the stack lives in.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Deployment home region.
    #[must_use]
    pub fn home_region(&self) -> &str {
        &self.home_region
    }

    /// Logical template path, when one was supplied.
    #[must_use]
    pub fn logical_path(&self) -> Option<&str> {
        self.logical_path.as_deref()
    }

    /// Returns `true` when the region is the deployment home region.
    #[must_use]
    pub fn is_home_region(&self) -> bool {
        self.region == self.home_region
    }

    /// Geo prefix of this identity.
    #[must_use]
    pub fn geo_prefix(&self) -> GeoPrefix {
        resolve_geo_prefix(&self.region, &self.home_region)
    }

    /// Name the logical path maps to today, ignoring any explicit name.
    #[must_use]
    pub fn derived_name(&self) -> Option<String> {
        self.logical_path
            .as_deref()
            .map(|path| build_stack_name(path, self.geo_prefix()))
    }

    /// Template key for this identity, optionally with another filename.
    #[must_use]
    pub fn template_key(&self, filename_override: Option<&str>) -> Option<String> {
        self.logical_path
            .as_deref()
            .map(|path| template_key(path, self.geo_prefix(), filename_override))
    }

    /// Parameter file key for this identity.
    #[must_use]
    pub fn parameter_key(&self) -> Option<String> {
        self.logical_path
            .as_deref()
            .map(|path| parameter_key(path, self.geo_prefix()))
    }

    /// Names of base stacks that are still current for this identity.
    ///
    /// The current name always comes from the logical path; without one it
    /// is the bootstrap stack of this geography, whatever explicit name was
    /// supplied. In the home region this includes the privileged IAM stack
    /// and the two fixed global base stacks.
    #[must_use]
    pub fn valid_stack_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        names.insert(build_stack_name(
            self.logical_path.as_deref().unwrap_or_default(),
            self.geo_prefix(),
        ));
        if self.is_home_region() {
            names.extend(
                [IAM_STACK_NAME, BOOTSTRAP_STACK_NAME, ADF_BUILD_STACK_NAME]
                    .into_iter()
                    .map(str::to_owned),
            );
        }
        names
    }
}
