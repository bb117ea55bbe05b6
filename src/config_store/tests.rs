//! Tests for configuration store helpers.

use super::*;
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct ConfigFixture {
    _tmp: TempDir,
    path: Utf8PathBuf,
    store: ConfigStore,
}

#[fixture]
fn config_fixture() -> ConfigFixture {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = Utf8PathBuf::from_path_buf(tmp.path().join(CONFIG_FILE_NAME))
        .unwrap_or_else(|err| panic!("temp path should be utf8: {}", err.display()));
    let root = path
        .parent()
        .unwrap_or_else(|| panic!("temp path should have a parent directory"));
    let discovery = ConfigDiscovery::builder(APP_NAME)
        .env_var("OSTACK_BACKUP_TEST_UNUSED_CONFIG_PATH")
        .config_file_name(CONFIG_FILE_NAME)
        .dotfile_name(DOTFILE_NAME)
        .project_file_name(CONFIG_FILE_NAME)
        .clear_project_roots()
        .add_project_root(root)
        .build();
    ConfigFixture {
        _tmp: tmp,
        path,
        store: ConfigStore::with_discovery(discovery),
    }
}

#[test]
fn template_is_valid_toml_with_every_key() {
    let value = parse_toml(Utf8Path::new("template"), CONFIG_TEMPLATE)
        .unwrap_or_else(|err| panic!("template should parse: {err}"));
    let table = value
        .as_table()
        .unwrap_or_else(|| panic!("template root should be a table"));
    for key in [
        "keystone_url",
        "project",
        "user",
        "password",
        "domain",
        "region",
        "backup_dir",
        "disk_format",
        "discover_all",
        "max_parallel_vms",
        "max_parallel_volumes",
        "status_timeout_secs",
        "status_interval_secs",
        "cleanup_grace_secs",
    ] {
        assert!(table.contains_key(key), "template should set {key}");
    }
}

#[rstest]
fn write_template_creates_the_file(config_fixture: ConfigFixture) {
    let ConfigFixture { path, store, .. } = config_fixture;

    let written = store
        .write_template(false)
        .unwrap_or_else(|err| panic!("write template: {err}"));

    assert_eq!(written, path);
    let contents = read_config(&path).unwrap_or_else(|err| panic!("read config: {err}"));
    assert_eq!(contents, CONFIG_TEMPLATE);
}

#[rstest]
fn write_template_refuses_to_overwrite_without_force(config_fixture: ConfigFixture) {
    write_config(&config_fixture.path, "region = \"Custom\"\n")
        .unwrap_or_else(|err| panic!("seed config: {err}"));

    let Err(err) = config_fixture.store.write_template(false) else {
        panic!("overwrite should fail without force");
    };
    let ConfigStoreError::AlreadyExists { path } = err else {
        panic!("expected AlreadyExists error");
    };
    assert_eq!(path, config_fixture.path);

    config_fixture
        .store
        .write_template(true)
        .unwrap_or_else(|err| panic!("forced overwrite: {err}"));
    let contents =
        read_config(&config_fixture.path).unwrap_or_else(|err| panic!("read config: {err}"));
    assert_eq!(contents, CONFIG_TEMPLATE);
}

#[rstest]
fn ensure_template_leaves_existing_files_alone(config_fixture: ConfigFixture) {
    let created = config_fixture
        .store
        .ensure_template()
        .unwrap_or_else(|err| panic!("first ensure: {err}"));
    assert_eq!(created, Some(config_fixture.path.clone()));

    let again = config_fixture
        .store
        .ensure_template()
        .unwrap_or_else(|err| panic!("second ensure: {err}"));
    assert_eq!(again, None);
}

#[rstest]
fn existing_config_rejects_invalid_toml(config_fixture: ConfigFixture) {
    write_config(&config_fixture.path, "not = [").unwrap_or_else(|err| panic!("seed: {err}"));

    let Err(err) = config_fixture.store.existing_config() else {
        panic!("invalid TOML should be reported");
    };
    assert!(
        matches!(err, ConfigStoreError::Parse { ref path, .. } if *path == config_fixture.path),
        "unexpected error: {err}"
    );
}

#[rstest]
fn existing_config_is_none_before_init(config_fixture: ConfigFixture) {
    let found = config_fixture
        .store
        .existing_config()
        .unwrap_or_else(|err| panic!("lookup: {err}"));
    assert_eq!(found, None);
}
