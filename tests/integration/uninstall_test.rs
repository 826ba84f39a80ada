use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use aim::config::Config;
use aim::elevate::ElevationRunner;
use aim::error::{AimError, Result};
use aim::install::{self, InstallOutcome, InstallRequest};
use aim::registry::AppRegistry;
use aim::resolve::InstallMode;
use aim::uninstall;

fn test_config(base: &Path) -> Config {
    let mut config = Config::default();
    config.general.user_install_dir = base.join("apps");
    config.general.system_install_dir = base.join("sys/apps");
    config.general.library_dir = base.join("library");
    config.general.user_bin_dir = base.join("bin");
    config.general.user_desktop_dir = base.join("applications");
    config.general.user_icon_dir = base.join("icons");
    config.general.registry_path = base.join("installed.json");
    config.extraction.selective_timeout_secs = 5;
    config.extraction.full_timeout_secs = 5;
    config.extraction.poll_interval_ms = 20;
    config
}

fn stub_archive(dir: &Path, file_name: &str) -> PathBuf {
    let script = "#!/bin/sh\n\
        mkdir -p squashfs-root\n\
        printf '[Desktop Entry]\\nName=Foo\\nX-AppImage-Version=1.0\\nIcon=foo\\nExec=AppRun\\n' > squashfs-root/foo.desktop\n\
        case \"$1\" in\n\
        --appimage-extract=*) ;;\n\
        *)\n\
        printf '#!/bin/sh\\nexit 0\\n' > squashfs-root/AppRun\n\
        chmod +x squashfs-root/AppRun\n\
        printf 'png' > squashfs-root/foo.png\n\
        ;;\n\
        esac\n";
    let path = dir.join(file_name);
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

struct NoElevation;
impl ElevationRunner for NoElevation {
    fn run_batch(&self, _script: &str) -> Result<String> {
        panic!("elevation must not be attempted");
    }
}

fn installed_record(config: &Config, registry: &mut AppRegistry, archive: PathBuf) -> String {
    let request = InstallRequest {
        archive,
        mode: InstallMode::User,
        custom_prefix: None,
        dry_run: false,
    };
    match install::install_archive(config, registry, &request, &NoElevation).unwrap() {
        InstallOutcome::Installed(record) => record.id,
        InstallOutcome::DryRun(_) => unreachable!(),
    }
}

#[test]
fn uninstall_reverses_an_install_completely() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let mut registry = AppRegistry::open(&config.general.registry_path).unwrap();
    let archive = stub_archive(base.path(), "Foo.AppImage");
    let id = installed_record(&config, &mut registry, archive);

    let install_dir = base.path().join("apps/foo_1.0");
    let link = base.path().join("bin/foo");
    let desktop = base.path().join("applications/foo.desktop");
    assert!(install_dir.is_dir());
    assert!(link.symlink_metadata().is_ok());
    assert!(desktop.is_file());

    let report = uninstall::uninstall_app(&config, &mut registry, &id, &NoElevation).unwrap();
    assert!(report.warnings.is_empty());
    assert!(!install_dir.exists());
    assert!(link.symlink_metadata().is_err());
    assert!(!desktop.exists());
    assert!(registry.list().is_empty());
}

#[test]
fn uninstall_by_name_works_and_second_attempt_reports_not_found() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let mut registry = AppRegistry::open(&config.general.registry_path).unwrap();
    let archive = stub_archive(base.path(), "Foo.AppImage");
    installed_record(&config, &mut registry, archive);

    uninstall::uninstall_app(&config, &mut registry, "Foo", &NoElevation).unwrap();
    assert!(matches!(
        uninstall::uninstall_app(&config, &mut registry, "Foo", &NoElevation),
        Err(AimError::AppNotFound(_))
    ));
}

#[test]
fn half_removed_install_is_cleaned_up_without_errors() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let mut registry = AppRegistry::open(&config.general.registry_path).unwrap();
    let archive = stub_archive(base.path(), "Foo.AppImage");
    let id = installed_record(&config, &mut registry, archive);

    // Someone already deleted the payload and the symlink by hand.
    fs::remove_dir_all(base.path().join("apps/foo_1.0")).unwrap();
    fs::remove_file(base.path().join("bin/foo")).unwrap();

    let report = uninstall::uninstall_app(&config, &mut registry, &id, &NoElevation).unwrap();
    assert!(report.warnings.is_empty());
    assert!(registry.list().is_empty());
    assert!(!base.path().join("applications/foo.desktop").exists());
}

#[test]
fn uninstalling_a_registered_app_removes_only_its_own_files() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let mut registry = AppRegistry::open(&config.general.registry_path).unwrap();
    let archive = stub_archive(base.path(), "Foo.AppImage");

    let record = install::register_archive(&config, &mut registry, &archive).unwrap();
    let library_copy = record.install_path.clone();
    let other = base.path().join("library/Other.AppImage");
    fs::write(&other, "x").unwrap();

    let report =
        uninstall::uninstall_app(&config, &mut registry, &record.id, &NoElevation).unwrap();
    assert!(report.warnings.is_empty());

    // The library copy, launcher and menu entry are gone.
    assert!(!library_copy.exists());
    assert!(base.path().join("bin/foo").symlink_metadata().is_err());
    assert!(!base
        .path()
        .join("applications/appimagekit_foo.desktop")
        .exists());
    // The library itself and unrelated archives survive.
    assert!(base.path().join("library").is_dir());
    assert!(other.is_file());
    // The source archive outside the library is never touched.
    assert!(archive.is_file());
}
