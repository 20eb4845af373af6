//! Template and parameter store consulted before staging a change set.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TemplateLocation;

/// Template parameter in the service's wire shape.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackParameter {
    /// Parameter name.
    pub parameter_key: String,
    /// Parameter value.
    pub parameter_value: String,
}

impl StackParameter {
    /// Creates a parameter.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            parameter_key: key.into(),
            parameter_value: value.into(),
        }
    }
}

/// Errors raised by a template store.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StoreError {
    /// Raised when a key does not exist.
    #[error("{key} was not found")]
    NotFound {
        /// Missing key.
        key: String,
    },
    /// Raised when the backing storage cannot be read.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: String,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a parameter file is not a valid parameter list.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Resolves logical template keys and reads parameter files.
pub trait TemplateStore: Send + Sync {
    /// Resolves `key` to a location the remote service can fetch, or `None`
    /// when no template was published under it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store itself cannot be queried.
    fn resolve(&self, key: &str) -> Result<Option<TemplateLocation>, StoreError>;

    /// Reads the parameter list stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the file is missing, unreadable or
    /// malformed. Callers fall back to an empty list.
    fn read_parameters(&self, key: &str) -> Result<Vec<StackParameter>, StoreError>;
}

/// Parses a JSON parameter file.
///
/// # Errors
///
/// Returns [`StoreError::Parse`] when `contents` is not a JSON array of
/// `{"ParameterKey", "ParameterValue"}` objects.
pub fn parse_parameters(path: &str, contents: &str) -> Result<Vec<StackParameter>, StoreError> {
    serde_json::from_str(contents).map_err(|err| StoreError::Parse {
        path: path.to_owned(),
        message: err.to_string(),
    })
}

/// Store backed by a local directory mirrored at `base_url`.
///
/// Keys are paths relative to the root directory; resolved locations are
/// `<base_url>/<key>`.
#[derive(Debug)]
pub struct DirTemplateStore {
    root: Dir,
    root_path: Utf8PathBuf,
    base_url: String,
}

impl DirTemplateStore {
    /// Opens `root` as a template store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the directory cannot be opened.
    pub fn open(root: &Utf8Path, base_url: impl Into<String>) -> Result<Self, StoreError> {
        let dir = Dir::open_ambient_dir(root, ambient_authority()).map_err(|err| {
            StoreError::Io {
                path: root.to_string(),
                message: err.to_string(),
            }
        })?;
        Ok(Self {
            root: dir,
            root_path: root.to_path_buf(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    fn display_path(&self, key: &str) -> String {
        self.root_path.join(key).to_string()
    }
}

impl TemplateStore for DirTemplateStore {
    fn resolve(&self, key: &str) -> Result<Option<TemplateLocation>, StoreError> {
        let exists = self.root.try_exists(key).map_err(|err| StoreError::Io {
            path: self.display_path(key),
            message: err.to_string(),
        })?;
        Ok(exists.then(|| TemplateLocation::new(format!("{}/{key}", self.base_url))))
    }

    fn read_parameters(&self, key: &str) -> Result<Vec<StackParameter>, StoreError> {
        let contents = match self.root.read_to_string(key) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    key: key.to_owned(),
                });
            }
            Err(err) => {
                return Err(StoreError::Io {
                    path: self.display_path(key),
                    message: err.to_string(),
                });
            }
        };
        parse_parameters(&self.display_path(key), &contents)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    const BASE_URL: &str = "https://templates.example.com/adf";

    struct StoreFixture {
        _tmp: TempDir,
        store: DirTemplateStore,
        root: Utf8PathBuf,
    }

    #[fixture]
    fn fixture() -> StoreFixture {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("utf8 path: {}", path.display()));
        fs::create_dir_all(root.join("adf-bootstrap/ou"))
            .unwrap_or_else(|err| panic!("mkdir: {err}"));
        let store = DirTemplateStore::open(&root, format!("{BASE_URL}/"))
            .unwrap_or_else(|err| panic!("open store: {err}"));
        StoreFixture {
            _tmp: tmp,
            store,
            root,
        }
    }

    fn write(root: &Utf8Path, key: &str, contents: &str) {
        fs::write(root.join(key), contents).unwrap_or_else(|err| panic!("write {key}: {err}"));
    }

    #[rstest]
    fn resolves_published_templates(fixture: StoreFixture) {
        write(&fixture.root, "adf-bootstrap/ou/regional.yml", "Resources: {}\n");
        let location = fixture
            .store
            .resolve("adf-bootstrap/ou/regional.yml")
            .unwrap_or_else(|err| panic!("resolve: {err}"));
        assert_eq!(
            location.as_ref().map(TemplateLocation::as_str),
            Some("https://templates.example.com/adf/adf-bootstrap/ou/regional.yml")
        );
    }

    #[rstest]
    fn unpublished_templates_resolve_to_none(fixture: StoreFixture) {
        let location = fixture
            .store
            .resolve("adf-bootstrap/ou/global.yml")
            .unwrap_or_else(|err| panic!("resolve: {err}"));
        assert_eq!(location, None);
    }

    #[rstest]
    fn reads_parameter_lists(fixture: StoreFixture) {
        write(
            &fixture.root,
            "adf-bootstrap/ou/global-params.json",
            r#"[{"ParameterKey": "OrganizationId", "ParameterValue": "o-123"}]"#,
        );
        let parameters = fixture
            .store
            .read_parameters("adf-bootstrap/ou/global-params.json")
            .unwrap_or_else(|err| panic!("read: {err}"));
        assert_eq!(parameters, vec![StackParameter::new("OrganizationId", "o-123")]);
    }

    #[rstest]
    fn missing_parameter_file_is_not_found(fixture: StoreFixture) {
        let err = fixture
            .store
            .read_parameters("adf-bootstrap/ou/regional-params.json")
            .expect_err("file is absent");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[rstest]
    fn malformed_parameter_file_is_a_parse_error(fixture: StoreFixture) {
        write(
            &fixture.root,
            "adf-bootstrap/ou/regional-params.json",
            r#"{"OrganizationId": "o-123"}"#,
        );
        let err = fixture
            .store
            .read_parameters("adf-bootstrap/ou/regional-params.json")
            .expect_err("object is not a parameter list");
        assert!(matches!(err, StoreError::Parse { .. }));
    }
}
