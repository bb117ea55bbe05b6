//! Command-line interface definitions for the `ostack-backup` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `ostack-backup` binary.
#[derive(Debug, Parser)]
#[command(
    name = "ostack-backup",
    about = "Back up OpenStack VMs and their attached Cinder volumes",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Export every attached volume of the selected VMs to local disk images.
    #[command(name = "backup", about = "Back up the selected VMs and their volumes")]
    Backup(BackupCommand),
    /// Write a commented configuration file.
    #[command(name = "init", about = "Write a commented configuration file")]
    Init(InitCommand),
}

/// Arguments for the `ostack-backup backup` subcommand.
///
/// Every flag overrides the matching configuration file or environment value.
#[derive(Debug, Default, Parser)]
pub(crate) struct BackupCommand {
    /// Keystone v3 endpoint, for example `https://keystone.example.com:5000/v3`.
    #[arg(long, value_name = "URL")]
    pub(crate) keystone_url: Option<String>,
    /// Project to scope the token to.
    #[arg(long, value_name = "NAME")]
    pub(crate) project: Option<String>,
    /// User name to authenticate as.
    #[arg(long, value_name = "NAME")]
    pub(crate) user: Option<String>,
    /// Password for the user. Prefer `OSTACK_PASSWORD` in shared environments.
    #[arg(long, value_name = "PASSWORD")]
    pub(crate) password: Option<String>,
    /// Keystone domain of the user and project.
    #[arg(long, value_name = "NAME")]
    pub(crate) domain: Option<String>,
    /// Region whose catalog endpoints are used.
    #[arg(long, value_name = "NAME")]
    pub(crate) region: Option<String>,
    /// Directory that receives `<vm>/<timestamp>/` backup trees.
    #[arg(long, value_name = "DIR")]
    pub(crate) backup_dir: Option<String>,
    /// Disk format of exported images: qcow2, raw, vmdk, or vdi.
    #[arg(long, value_name = "FORMAT")]
    pub(crate) disk_format: Option<String>,
    /// Maximum VMs backed up at once (0 means unbounded).
    #[arg(long, value_name = "N", alias = "max-parallel-snap")]
    pub(crate) max_parallel_vms: Option<usize>,
    /// Maximum volumes exported at once within one VM (0 means unbounded).
    #[arg(long, value_name = "N", alias = "max-parallel-vol")]
    pub(crate) max_parallel_volumes: Option<usize>,
    /// Back up every VM matching the filters.
    #[arg(long, conflicts_with = "no_discover_all")]
    pub(crate) discover_all: bool,
    /// Disable discovery; requires `--vm-list`.
    #[arg(long)]
    pub(crate) no_discover_all: bool,
    /// Glob applied to VM names during discovery, for example `prod-*`.
    #[arg(long, value_name = "GLOB")]
    pub(crate) vm_filter: Option<String>,
    /// Tag or metadata predicates, `key[:value]` separated by commas.
    #[arg(long, value_name = "PREDICATES")]
    pub(crate) vm_tags: Option<String>,
    /// Explicit VM names to back up; disables discovery.
    #[arg(long, value_name = "NAME", num_args = 1.., value_delimiter = ',')]
    pub(crate) vm_list: Vec<String>,
    /// Seconds to wait for each snapshot, volume, or image to become ready.
    #[arg(long, value_name = "SECONDS")]
    pub(crate) status_timeout: Option<u64>,
    /// Seconds between status polls.
    #[arg(long, value_name = "SECONDS")]
    pub(crate) status_interval: Option<u64>,
}

/// Arguments for the `ostack-backup init` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct InitCommand {
    /// Overwrite an existing configuration file.
    #[arg(long)]
    pub(crate) force: bool,
}
