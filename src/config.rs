//! Configuration loading via `ortho-config`.
//!
//! Values merge defaults, `ostack-backup.toml` (located through the usual
//! discovery order or `OSTACK_BACKUP_CONFIG_PATH`), and `OSTACK_*`
//! environment variables. Flags given to `ostack-backup backup` are layered
//! on top through [`BackupOverrides`].

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::resource::DiskFormat;
use crate::selection::{VmFilter, VmSelection};
use crate::settings::{BackupSettings, DEFAULT_BACKUP_DIR};
use crate::waiter::WaitPolicy;

/// Name used for discovery and as `argv[0]` when loading.
pub const APP_NAME: &str = "ostack-backup";
/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "OSTACK_BACKUP_CONFIG_PATH";
/// Configuration file name searched in the XDG and project directories.
pub const CONFIG_FILE_NAME: &str = "ostack-backup.toml";
/// Dotfile name searched in the home directory.
pub const DOTFILE_NAME: &str = ".ostack-backup.toml";

/// OpenStack credentials and backup run parameters.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "OSTACK",
    discovery(
        app_name = "ostack-backup",
        env_var = "OSTACK_BACKUP_CONFIG_PATH",
        config_file_name = "ostack-backup.toml",
        dotfile_name = ".ostack-backup.toml",
        project_file_name = "ostack-backup.toml"
    )
)]
pub struct BackupConfig {
    /// Keystone v3 endpoint, for example `https://keystone.example.com:5000/v3`.
    #[ortho_config(default = String::new())]
    pub keystone_url: String,
    /// Project the token is scoped to.
    #[ortho_config(default = String::new())]
    pub project: String,
    /// User name.
    #[ortho_config(default = String::new())]
    pub user: String,
    /// User password.
    #[ortho_config(default = String::new())]
    pub password: String,
    /// Domain of the user and project. Defaults to `Default`.
    #[ortho_config(default = "Default".to_owned())]
    pub domain: String,
    /// Catalog region preferred during endpoint discovery.
    #[ortho_config(default = "RegionOne".to_owned())]
    pub region: String,
    /// Compute endpoint override; skips catalog discovery for Nova.
    pub compute_url: Option<String>,
    /// Block-storage endpoint override; skips catalog discovery for Cinder.
    pub volume_url: Option<String>,
    /// Image endpoint override; skips catalog discovery for Glance.
    pub image_url: Option<String>,
    /// Root of the backup tree.
    #[ortho_config(default = DEFAULT_BACKUP_DIR.to_owned())]
    pub backup_dir: String,
    /// Image disk format: `qcow2`, `raw`, `vmdk`, or `vdi`.
    #[ortho_config(default = "qcow2".to_owned())]
    pub disk_format: String,
    /// Back up every discovered VM instead of `vm_list`.
    #[ortho_config(default = true)]
    pub discover_all: bool,
    /// Glob applied to server names during discovery (for example `prod-*`).
    pub vm_filter: Option<String>,
    /// Comma-separated `key[:value]` tag and metadata predicates.
    pub vm_tags: Option<String>,
    /// Comma-separated server names used when discovery is off.
    pub vm_list: Option<String>,
    /// Maximum VMs backed up at once; `0` means unbounded.
    #[ortho_config(default = 0)]
    pub max_parallel_vms: usize,
    /// Maximum volumes exported at once per VM; `0` means unbounded.
    #[ortho_config(default = 0)]
    pub max_parallel_volumes: usize,
    /// Upper bound on each status wait, in seconds.
    #[ortho_config(default = 1800)]
    pub status_timeout_secs: u64,
    /// Pause between status polls, in seconds.
    #[ortho_config(default = 5)]
    pub status_interval_secs: u64,
    /// Time allowed for each deletion of a temporary resource, in seconds.
    #[ortho_config(default = 120)]
    pub cleanup_grace_secs: u64,
    /// Timeout applied to each API request except image downloads, in seconds.
    #[ortho_config(default = 60)]
    pub request_timeout_secs: u64,
}

/// Per-invocation values that take precedence over loaded configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BackupOverrides {
    /// Keystone endpoint.
    pub keystone_url: Option<String>,
    /// Project name.
    pub project: Option<String>,
    /// User name.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Domain name.
    pub domain: Option<String>,
    /// Region name.
    pub region: Option<String>,
    /// Backup root.
    pub backup_dir: Option<String>,
    /// Disk format.
    pub disk_format: Option<String>,
    /// Discovery toggle.
    pub discover_all: Option<bool>,
    /// Name glob.
    pub vm_filter: Option<String>,
    /// Tag predicates.
    pub vm_tags: Option<String>,
    /// Explicit server names; non-empty implies manual selection.
    pub vm_list: Vec<String>,
    /// VM concurrency.
    pub max_parallel_vms: Option<usize>,
    /// Per-VM volume concurrency.
    pub max_parallel_volumes: Option<usize>,
    /// Wait timeout in seconds.
    pub status_timeout_secs: Option<u64>,
    /// Poll interval in seconds.
    pub status_interval_secs: Option<u64>,
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
            "missing {}: set {} or add {} to {CONFIG_FILE_NAME}",
            self.description, self.env_var, self.toml_key
        ))
    }

    fn invalid(&self, problem: &str) -> ConfigError {
        ConfigError::Invalid(format!(
            "{} {problem}: check {} or {} in {CONFIG_FILE_NAME}",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const KEYSTONE_URL: FieldMetadata =
    FieldMetadata::new("Keystone URL", "OSTACK_KEYSTONE_URL", "keystone_url");
const PROJECT: FieldMetadata = FieldMetadata::new("project name", "OSTACK_PROJECT", "project");
const USER: FieldMetadata = FieldMetadata::new("user name", "OSTACK_USER", "user");
const PASSWORD: FieldMetadata = FieldMetadata::new("password", "OSTACK_PASSWORD", "password");
const DOMAIN: FieldMetadata = FieldMetadata::new("domain", "OSTACK_DOMAIN", "domain");
const BACKUP_DIR: FieldMetadata =
    FieldMetadata::new("backup directory", "OSTACK_BACKUP_DIR", "backup_dir");
const DISK_FORMAT: FieldMetadata =
    FieldMetadata::new("disk format", "OSTACK_DISK_FORMAT", "disk_format");
const STATUS_TIMEOUT: FieldMetadata = FieldMetadata::new(
    "status timeout",
    "OSTACK_STATUS_TIMEOUT_SECS",
    "status_timeout_secs",
);
const STATUS_INTERVAL: FieldMetadata = FieldMetadata::new(
    "status interval",
    "OSTACK_STATUS_INTERVAL_SECS",
    "status_interval_secs",
);
const CLEANUP_GRACE: FieldMetadata = FieldMetadata::new(
    "cleanup grace period",
    "OSTACK_CLEANUP_GRACE_SECS",
    "cleanup_grace_secs",
);
const REQUEST_TIMEOUT: FieldMetadata = FieldMetadata::new(
    "request timeout",
    "OSTACK_REQUEST_TIMEOUT_SECS",
    "request_timeout_secs",
);
const VM_LIST: FieldMetadata = FieldMetadata::new("VM list", "OSTACK_VM_LIST", "vm_list");
const VM_SELECTION: FieldMetadata =
    FieldMetadata::new("VM selection filter", "OSTACK_VM_FILTER/OSTACK_VM_TAGS", "vm_filter/vm_tags");

impl BackupConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from(APP_NAME)])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies per-invocation overrides. A non-empty VM list switches
    /// selection to those names.
    pub fn apply_overrides(&mut self, overrides: &BackupOverrides) {
        let BackupOverrides {
            keystone_url,
            project,
            user,
            password,
            domain,
            region,
            backup_dir,
            disk_format,
            discover_all,
            vm_filter,
            vm_tags,
            vm_list,
            max_parallel_vms,
            max_parallel_volumes,
            status_timeout_secs,
            status_interval_secs,
        } = overrides;

        override_string(&mut self.keystone_url, keystone_url.as_ref());
        override_string(&mut self.project, project.as_ref());
        override_string(&mut self.user, user.as_ref());
        override_string(&mut self.password, password.as_ref());
        override_string(&mut self.domain, domain.as_ref());
        override_string(&mut self.region, region.as_ref());
        override_string(&mut self.backup_dir, backup_dir.as_ref());
        override_string(&mut self.disk_format, disk_format.as_ref());
        if let Some(flag) = discover_all {
            self.discover_all = *flag;
        }
        if vm_filter.is_some() {
            self.vm_filter.clone_from(vm_filter);
        }
        if vm_tags.is_some() {
            self.vm_tags.clone_from(vm_tags);
        }
        if !vm_list.is_empty() {
            self.vm_list = Some(vm_list.join(","));
            self.discover_all = false;
        }
        if let Some(limit) = max_parallel_vms {
            self.max_parallel_vms = *limit;
        }
        if let Some(limit) = max_parallel_volumes {
            self.max_parallel_volumes = *limit;
        }
        if let Some(secs) = status_timeout_secs {
            self.status_timeout_secs = *secs;
        }
        if let Some(secs) = status_interval_secs {
            self.status_interval_secs = *secs;
        }
    }

    /// Checks that credentials are present and every value parses. Error
    /// messages name the environment variable and TOML key to fix.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for empty required values and
    /// [`ConfigError::Invalid`] for values that do not parse or zero
    /// durations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, field) in [
            (&self.keystone_url, &KEYSTONE_URL),
            (&self.project, &PROJECT),
            (&self.user, &USER),
            (&self.password, &PASSWORD),
            (&self.domain, &DOMAIN),
            (&self.backup_dir, &BACKUP_DIR),
        ] {
            require_field(value, field)?;
        }
        if self.request_timeout_secs == 0 {
            return Err(REQUEST_TIMEOUT.invalid("must be greater than zero"));
        }
        self.settings()?;
        self.selection()?;
        Ok(())
    }

    /// Resolves the engine settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unsupported disk format or a
    /// zero timeout, interval, or cleanup grace period.
    pub fn settings(&self) -> Result<BackupSettings, ConfigError> {
        require_field(&self.backup_dir, &BACKUP_DIR)?;
        let disk_format: DiskFormat = self
            .disk_format
            .parse()
            .map_err(|err| DISK_FORMAT.invalid(&format!("is not supported ({err})")))?;
        if self.status_timeout_secs == 0 {
            return Err(STATUS_TIMEOUT.invalid("must be greater than zero"));
        }
        if self.status_interval_secs == 0 {
            return Err(STATUS_INTERVAL.invalid("must be greater than zero"));
        }
        if self.cleanup_grace_secs == 0 {
            return Err(CLEANUP_GRACE.invalid("must be greater than zero"));
        }
        Ok(BackupSettings {
            backup_dir: Utf8PathBuf::from(self.backup_dir.trim()),
            disk_format,
            wait: WaitPolicy::new(
                Duration::from_secs(self.status_timeout_secs),
                Duration::from_secs(self.status_interval_secs),
            ),
            cleanup_grace: Duration::from_secs(self.cleanup_grace_secs),
            max_parallel_vms: self.max_parallel_vms,
            max_parallel_volumes: self.max_parallel_volumes,
        })
    }

    /// Resolves which VMs the run covers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a filter does not parse or when
    /// discovery is off and no names are listed.
    pub fn selection(&self) -> Result<VmSelection, ConfigError> {
        if self.discover_all {
            let filter = VmFilter::new(self.vm_filter.as_deref(), self.vm_tags.as_deref())
                .map_err(|err| VM_SELECTION.invalid(&format!("is invalid ({err})")))?;
            return Ok(VmSelection::Discover(filter));
        }
        let names: Vec<String> = self
            .vm_list
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect();
        if names.is_empty() {
            return Err(VM_LIST.invalid("is empty while discover_all is off"));
        }
        Ok(VmSelection::Named(names))
    }

    /// Per-request timeout for API calls.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(metadata.missing());
    }
    Ok(())
}

fn override_string(target: &mut String, value: Option<&String>) {
    if let Some(text) = value {
        target.clone_from(text);
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
