//! Creation of the `ostack-backup.toml` configuration file.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::ConfigDiscovery;
use ortho_config::toml;
use thiserror::Error;

use crate::config::{APP_NAME, CONFIG_ENV_VAR, CONFIG_FILE_NAME, DOTFILE_NAME};

/// Commented configuration written by `ostack-backup init`.
pub const CONFIG_TEMPLATE: &str = r#"# ostack-backup configuration.
# Every key can also be set through an OSTACK_<KEY> environment variable.

# Keystone v3 endpoint and credentials (required).
keystone_url = ""
project = ""
user = ""
password = ""
domain = "Default"
region = "RegionOne"

# Endpoint overrides; leave unset to use the service catalog.
# compute_url = "https://nova.example.com:8774/v2.1"
# volume_url = "https://cinder.example.com:8776/v3/<project id>"
# image_url = "https://glance.example.com:9292"

# Output.
backup_dir = "/backup/openstack"
disk_format = "qcow2"

# Selection: discover every ACTIVE, SHUTOFF, PAUSED or SUSPENDED server,
# optionally narrowed by a name glob and key[:value] tag predicates, or list
# server names explicitly with discover_all = false.
discover_all = true
# vm_filter = "prod-*"
# vm_tags = "backup:true"
# vm_list = "web-01,db-01"

# Concurrency; 0 means unbounded. The volume limit applies per VM.
max_parallel_vms = 0
max_parallel_volumes = 0

# Timing, in seconds.
status_timeout_secs = 1800
status_interval_secs = 5
cleanup_grace_secs = 120
request_timeout_secs = 60
"#;

/// Errors raised while locating or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    /// Raised when no configuration candidates are available.
    #[error("no configuration file candidates were discovered")]
    NoCandidates,
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when parsing existing TOML content fails.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the target path cannot name a file.
    #[error("invalid configuration path {path}: {message}")]
    InvalidPath {
        /// Offending path.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when a configuration file exists and overwrite is disabled.
    #[error("configuration already exists at {path}; rerun with --force to replace it")]
    AlreadyExists {
        /// Existing configuration file.
        path: Utf8PathBuf,
    },
}

/// Abstraction over configuration writers for dependency injection.
pub trait ConfigWriter {
    /// Returns the first existing configuration file, after checking that it
    /// parses as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError`] when the file cannot be read or parsed.
    fn existing_config(&self) -> Result<Option<Utf8PathBuf>, ConfigStoreError>;

    /// Writes [`CONFIG_TEMPLATE`] and returns the path written.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError::AlreadyExists`] when a file exists and
    /// `force` is off, or another [`ConfigStoreError`] when writing fails.
    fn write_template(&self, force: bool) -> Result<Utf8PathBuf, ConfigStoreError>;
}

/// Locates `ostack-backup.toml` using `OrthoConfig`'s discovery search order.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    discovery: ConfigDiscovery,
}

impl ConfigStore {
    /// Builds a config store using the standard discovery settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            discovery: ConfigDiscovery::builder(APP_NAME)
                .env_var(CONFIG_ENV_VAR)
                .config_file_name(CONFIG_FILE_NAME)
                .dotfile_name(DOTFILE_NAME)
                .project_file_name(CONFIG_FILE_NAME)
                .build(),
        }
    }

    /// Builds a config store using an explicit discovery configuration.
    #[must_use]
    pub const fn with_discovery(discovery: ConfigDiscovery) -> Self {
        Self { discovery }
    }

    /// Writes the template when no configuration file exists yet.
    ///
    /// Returns the path written, or `None` when a file was already present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigStoreError`] when discovery or writing fails.
    pub fn ensure_template(&self) -> Result<Option<Utf8PathBuf>, ConfigStoreError> {
        if self.resolve_target()?.exists {
            return Ok(None);
        }
        self.write_template(false).map(Some)
    }

    fn resolve_target(&self) -> Result<ConfigTarget, ConfigStoreError> {
        let candidates = self.discovery.utf8_candidates();
        if candidates.is_empty() {
            return Err(ConfigStoreError::NoCandidates);
        }

        for candidate in &candidates {
            if path_exists(candidate)? {
                return Ok(ConfigTarget {
                    path: candidate.clone(),
                    exists: true,
                });
            }
        }

        let fallback = explicit_path()
            .or_else(|| candidates.last().cloned())
            .ok_or(ConfigStoreError::NoCandidates)?;
        Ok(ConfigTarget {
            path: fallback,
            exists: false,
        })
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigWriter for ConfigStore {
    fn existing_config(&self) -> Result<Option<Utf8PathBuf>, ConfigStoreError> {
        let target = self.resolve_target()?;
        if !target.exists {
            return Ok(None);
        }
        let contents = read_config(&target.path)?;
        parse_toml(&target.path, &contents)?;
        Ok(Some(target.path))
    }

    fn write_template(&self, force: bool) -> Result<Utf8PathBuf, ConfigStoreError> {
        let target = self.resolve_target()?;
        if target.exists && !force {
            return Err(ConfigStoreError::AlreadyExists { path: target.path });
        }
        write_config(&target.path, CONFIG_TEMPLATE)?;
        Ok(target.path)
    }
}

/// Path named by the config path environment variable, when set.
fn explicit_path() -> Option<Utf8PathBuf> {
    std::env::var(CONFIG_ENV_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(Utf8PathBuf::from)
}

#[derive(Clone, Debug)]
struct ConfigTarget {
    path: Utf8PathBuf,
    exists: bool,
}

fn split_path(path: &Utf8Path) -> Result<(&Utf8Path, &str), ConfigStoreError> {
    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| ConfigStoreError::InvalidPath {
            path: path.to_path_buf(),
            message: String::from("configuration file path is missing a filename"),
        })?;
    Ok((parent, file_name))
}

fn path_exists(path: &Utf8Path) -> Result<bool, ConfigStoreError> {
    let (parent, file_name) = split_path(path)?;
    match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => dir
            .try_exists(file_name)
            .map_err(|err| ConfigStoreError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(ConfigStoreError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }),
    }
}

fn read_config(path: &Utf8Path) -> Result<String, ConfigStoreError> {
    let (parent, file_name) = split_path(path)?;
    let dir =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| ConfigStoreError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        })?;

    dir.read_to_string(file_name)
        .map_err(|err| ConfigStoreError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

fn parse_toml(path: &Utf8Path, contents: &str) -> Result<toml::Value, ConfigStoreError> {
    if contents.trim().is_empty() {
        return Ok(toml::Value::Table(toml::value::Table::new()));
    }

    toml::from_str(contents).map_err(|err| ConfigStoreError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn write_config(path: &Utf8Path, contents: &str) -> Result<(), ConfigStoreError> {
    let (parent, file_name) = split_path(path)?;
    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| {
        ConfigStoreError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }
    })?;
    let dir =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| ConfigStoreError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        })?;

    dir.write(file_name, contents)
        .map_err(|err| ConfigStoreError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests;
