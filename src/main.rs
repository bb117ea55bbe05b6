//! Binary entry point for the `ostack-backup` CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ostack_backup::shutdown::cancel_on_signal;
use ostack_backup::{
    BackupConfig, BackupOrchestrator, BackupOverrides, ConfigError, ConfigStore, ConfigStoreError,
    ConfigWriter, OpenStackBackend, OpenStackError, OrchestratorError,
};

mod cli;

use cli::{BackupCommand, Cli, InitCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("configuration file error: {0}")]
    Store(#[from] ConfigStoreError),
    #[error("openstack error: {0}")]
    Backend(#[from] OpenStackError),
    #[error("VM discovery failed: {0}")]
    Discovery(OpenStackError),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Backup(command) => run_backup(command).await,
        Cli::Init(command) => run_init(&command, &ConfigStore::new()),
    }
}

fn run_init(command: &InitCommand, store: &impl ConfigWriter) -> Result<i32, CliError> {
    let path = store.write_template(command.force)?;
    writeln!(io::stdout(), "wrote configuration template to {path}").ok();
    Ok(0)
}

async fn run_backup(command: BackupCommand) -> Result<i32, CliError> {
    if let Some(path) = ConfigStore::new().ensure_template()? {
        info!(%path, "wrote default configuration template");
    }

    let mut config = BackupConfig::load_without_cli_args()?;
    config.apply_overrides(&overrides_from(command));
    config.validate()?;
    let settings = config.settings()?;
    let selection = config.selection()?;

    let backend = OpenStackBackend::connect(&config).await?;
    let orchestrator = BackupOrchestrator::new(backend, settings);

    let cancel = CancellationToken::new();
    let watcher = cancel_on_signal(cancel.clone());
    let outcome = orchestrator.run(&selection, &cancel).await;
    watcher.abort();

    match outcome {
        Ok(summary) => {
            writeln!(io::stdout(), "{}", summary.render()).ok();
            Ok(0)
        }
        Err(OrchestratorError::Failed { summary }) => {
            writeln!(io::stdout(), "{}", summary.render()).ok();
            Ok(1)
        }
        Err(OrchestratorError::Discovery { source }) => Err(CliError::Discovery(source)),
        Err(err @ OrchestratorError::Cancelled) => {
            warn!("{err}");
            Ok(1)
        }
    }
}

fn overrides_from(command: BackupCommand) -> BackupOverrides {
    let discover_all = if command.no_discover_all {
        Some(false)
    } else if command.discover_all {
        Some(true)
    } else {
        None
    };
    BackupOverrides {
        keystone_url: command.keystone_url,
        project: command.project,
        user: command.user,
        password: command.password,
        domain: command.domain,
        region: command.region,
        backup_dir: command.backup_dir,
        disk_format: command.disk_format,
        discover_all,
        vm_filter: command.vm_filter,
        vm_tags: command.vm_tags,
        vm_list: command.vm_list,
        max_parallel_vms: command.max_parallel_vms,
        max_parallel_volumes: command.max_parallel_volumes,
        status_timeout_secs: command.status_timeout,
        status_interval_secs: command.status_interval,
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;

    #[rstest]
    #[case(false, false, None)]
    #[case(true, false, Some(true))]
    #[case(false, true, Some(false))]
    fn discover_flags_map_to_an_optional_override(
        #[case] discover_all: bool,
        #[case] no_discover_all: bool,
        #[case] expected: Option<bool>,
    ) {
        let command = BackupCommand {
            discover_all,
            no_discover_all,
            ..BackupCommand::default()
        };
        assert_eq!(overrides_from(command).discover_all, expected);
    }

    #[test]
    fn aliases_and_vm_lists_parse_into_overrides() {
        let cli = Cli::try_parse_from([
            "ostack-backup",
            "backup",
            "--max-parallel-snap",
            "3",
            "--max-parallel-vol",
            "2",
            "--vm-list",
            "web-01,db-01",
            "--status-interval",
            "10",
        ])
        .unwrap_or_else(|err| panic!("parse: {err}"));
        let Cli::Backup(command) = cli else {
            panic!("expected the backup subcommand");
        };

        let overrides = overrides_from(command);

        assert_eq!(overrides.max_parallel_vms, Some(3));
        assert_eq!(overrides.max_parallel_volumes, Some(2));
        assert_eq!(overrides.vm_list, vec!["web-01", "db-01"]);
        assert_eq!(overrides.status_interval_secs, Some(10));
    }

    #[test]
    fn conflicting_discovery_flags_are_rejected() {
        let parsed =
            Cli::try_parse_from(["ostack-backup", "backup", "--discover-all", "--no-discover-all"]);
        assert!(parsed.is_err());
    }

    struct RecordingWriter {
        path: Utf8PathBuf,
    }

    impl ConfigWriter for RecordingWriter {
        fn existing_config(&self) -> Result<Option<Utf8PathBuf>, ConfigStoreError> {
            Ok(None)
        }

        fn write_template(&self, force: bool) -> Result<Utf8PathBuf, ConfigStoreError> {
            if force {
                Ok(self.path.clone())
            } else {
                Err(ConfigStoreError::AlreadyExists {
                    path: self.path.clone(),
                })
            }
        }
    }

    #[test]
    fn init_reports_existing_configuration() {
        let writer = RecordingWriter {
            path: Utf8PathBuf::from("/tmp/ostack-backup.toml"),
        };

        let err = run_init(&InitCommand { force: false }, &writer)
            .expect_err("existing file should be reported");
        assert!(matches!(err, CliError::Store(ConfigStoreError::AlreadyExists { .. })));

        let code = run_init(&InitCommand { force: true }, &writer)
            .unwrap_or_else(|err| panic!("forced init: {err}"));
        assert_eq!(code, 0);
    }

    #[test]
    fn write_error_renders_the_message() {
        let mut buf = Vec::new();
        write_error(
            &mut buf,
            &CliError::Config(ConfigError::MissingField("user".to_owned())),
        );
        let rendered = String::from_utf8(buf).unwrap_or_else(|err| panic!("utf8: {err}"));
        assert!(rendered.contains("missing configuration field: user"), "rendered: {rendered}");
    }
}
