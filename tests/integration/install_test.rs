use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use aim::config::{Config, MANAGED_MARKER, SENTINEL_FILE};
use aim::elevate::ElevationRunner;
use aim::error::{AimError, Result};
use aim::install::{self, InstallOutcome, InstallRequest};
use aim::registry::AppRegistry;
use aim::resolve::InstallMode;

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

/// Shell stub standing in for an AppImage runtime: extracts a desktop
/// manifest on the selective pass and the full tree otherwise.
fn stub_archive(dir: &Path, file_name: &str, with_manifest: bool) -> PathBuf {
    let manifest_part = if with_manifest {
        "mkdir -p squashfs-root\n\
         printf '[Desktop Entry]\\nName=Foo\\nX-AppImage-Version=1.2.3-beta\\nIcon=foo\\nExec=AppRun %%U\\nCategories=Utility;\\n' > squashfs-root/foo.desktop\n"
    } else {
        "mkdir -p squashfs-root\n"
    };
    let script = format!(
        "#!/bin/sh\ncase \"$1\" in\n--appimage-extract=*)\n{sel};;\n*)\n{sel}printf '#!/bin/sh\\nexit 0\\n' > squashfs-root/AppRun\nchmod +x squashfs-root/AppRun\nprintf 'png' > squashfs-root/foo.png\n;;\nesac\n",
        sel = manifest_part
    );
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

struct FailingElevation;
impl ElevationRunner for FailingElevation {
    fn run_batch(&self, _script: &str) -> Result<String> {
        Err(AimError::ElevationError {
            step: "copy application files to /opt".into(),
            output: "==> copy application files to /opt\ncp: no space".into(),
        })
    }
}

#[test]
fn user_install_places_payload_symlink_and_desktop_entry() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let mut registry = AppRegistry::open(&config.general.registry_path).unwrap();
    let archive = stub_archive(base.path(), "Foo.AppImage", true);

    let request = InstallRequest {
        archive,
        mode: InstallMode::User,
        custom_prefix: None,
        dry_run: false,
    };
    let outcome =
        install::install_archive(&config, &mut registry, &request, &NoElevation).unwrap();
    let record = match outcome {
        InstallOutcome::Installed(record) => record,
        InstallOutcome::DryRun(_) => panic!("expected a real install"),
    };

    // Versioned install directory under the user prefix, with the sentinel.
    let install_dir = base.path().join("apps/foo_1.2.3-beta");
    assert_eq!(record.install_path, install_dir);
    assert!(install_dir.join("AppRun").exists());
    assert!(install_dir.join(SENTINEL_FILE).is_file());

    // Launcher symlink named after the sanitized app name.
    let link = base.path().join("bin/foo");
    assert!(link.symlink_metadata().unwrap().is_symlink());
    assert_eq!(fs::canonicalize(&link).unwrap(), fs::canonicalize(install_dir.join("AppRun")).unwrap());

    // Desktop entry rewritten to point at the symlink and marked as ours.
    let desktop = base.path().join("applications/foo.desktop");
    let text = fs::read_to_string(&desktop).unwrap();
    assert!(text.contains(&format!("Exec={}", link.display())));
    assert!(text.contains("Icon=foo\n"));
    assert_eq!(text.matches(MANAGED_MARKER).count(), 1);
    assert!(text.contains("Categories=Utility;\n"));

    // Registry reflects all of it.
    assert_eq!(record.version.as_deref(), Some("1.2.3-beta"));
    assert_eq!(record.sanitized_name, "foo");
    assert_eq!(record.desktop_file_path.as_deref(), Some(desktop.as_path()));
    assert!(!record.requires_root);

    let reopened = AppRegistry::open(&config.general.registry_path).unwrap();
    assert_eq!(reopened.list().len(), 1);
}

#[test]
fn manifestless_archive_installs_with_degraded_integration() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let mut registry = AppRegistry::open(&config.general.registry_path).unwrap();
    let archive = stub_archive(base.path(), "Bare-v2.0-x86_64.AppImage", false);

    let request = InstallRequest {
        archive,
        mode: InstallMode::User,
        custom_prefix: None,
        dry_run: false,
    };
    let outcome =
        install::install_archive(&config, &mut registry, &request, &NoElevation).unwrap();
    let record = match outcome {
        InstallOutcome::Installed(record) => record,
        InstallOutcome::DryRun(_) => panic!("expected a real install"),
    };

    // Name recovered from the file name, version suffix stripped.
    assert_eq!(record.name, "Bare");
    assert_eq!(record.sanitized_name, "bare");
    assert!(record.install_path.ends_with("apps/bare"));
    assert!(record.install_path.join("AppRun").exists());

    // Launcher still works; there is just no menu entry to patch.
    assert!(base.path().join("bin/bare").symlink_metadata().unwrap().is_symlink());
    assert!(record.desktop_file_path.is_none());
}

#[test]
fn blocked_desktop_dir_degrades_but_records_the_symlink() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let mut registry = AppRegistry::open(&config.general.registry_path).unwrap();
    let archive = stub_archive(base.path(), "Foo.AppImage", true);
    // Occupy the desktop dir path with a plain file so the entry cannot land.
    fs::write(base.path().join("applications"), "in the way").unwrap();

    let request = InstallRequest {
        archive,
        mode: InstallMode::User,
        custom_prefix: None,
        dry_run: false,
    };
    let outcome =
        install::install_archive(&config, &mut registry, &request, &NoElevation).unwrap();
    let record = match outcome {
        InstallOutcome::Installed(record) => record,
        InstallOutcome::DryRun(_) => panic!("expected a real install"),
    };

    // The launcher symlink was created and must survive into the record,
    // or uninstall could never clean it up.
    let link = base.path().join("bin/foo");
    assert!(link.symlink_metadata().unwrap().is_symlink());
    assert_eq!(record.executable_symlink.as_deref(), Some(link.as_path()));
    assert!(record.desktop_file_path.is_none());
}

#[test]
fn reinstall_replaces_payload_and_keeps_one_record() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let mut registry = AppRegistry::open(&config.general.registry_path).unwrap();
    let archive = stub_archive(base.path(), "Foo.AppImage", true);

    let request = InstallRequest {
        archive,
        mode: InstallMode::User,
        custom_prefix: None,
        dry_run: false,
    };
    install::install_archive(&config, &mut registry, &request, &NoElevation).unwrap();
    let stale = base.path().join("apps/foo_1.2.3-beta/stale-file");
    fs::write(&stale, "x").unwrap();

    install::install_archive(&config, &mut registry, &request, &NoElevation).unwrap();
    assert!(!stale.exists());
    assert_eq!(registry.list().len(), 1);
}

#[test]
fn custom_mode_requires_prefix_and_uses_it() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let mut registry = AppRegistry::open(&config.general.registry_path).unwrap();
    let archive = stub_archive(base.path(), "Foo.AppImage", true);

    let missing = InstallRequest {
        archive: archive.clone(),
        mode: InstallMode::Custom,
        custom_prefix: None,
        dry_run: false,
    };
    assert!(matches!(
        install::install_archive(&config, &mut registry, &missing, &NoElevation),
        Err(AimError::PathResolutionError(_))
    ));

    let target = base.path().join("drive");
    let request = InstallRequest {
        archive,
        mode: InstallMode::Custom,
        custom_prefix: Some(target.clone()),
        dry_run: false,
    };
    let outcome =
        install::install_archive(&config, &mut registry, &request, &NoElevation).unwrap();
    let record = match outcome {
        InstallOutcome::Installed(record) => record,
        InstallOutcome::DryRun(_) => panic!("expected a real install"),
    };
    // Payload under the custom prefix, links under the user's own dirs.
    assert!(record
        .install_path
        .starts_with(target.join("appimage-manager-apps")));
    assert_eq!(
        record.executable_symlink.as_deref(),
        Some(base.path().join("bin/foo").as_path())
    );
}

#[test]
fn system_dry_run_renders_script_without_touching_anything() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let mut registry = AppRegistry::open(&config.general.registry_path).unwrap();
    let archive = stub_archive(base.path(), "Foo.AppImage", true);

    let request = InstallRequest {
        archive,
        mode: InstallMode::System,
        custom_prefix: None,
        dry_run: true,
    };
    let outcome =
        install::install_archive(&config, &mut registry, &request, &NoElevation).unwrap();
    let script = match outcome {
        InstallOutcome::DryRun(script) => script,
        InstallOutcome::Installed(_) => panic!("dry run must not install"),
    };

    assert!(script.starts_with("#!/bin/sh\nset -e\n"));
    assert!(script.contains("sys/apps/foo_1.2.3-beta"));
    assert!(script.contains("ln -sf"));
    assert!(registry.list().is_empty());
    assert!(!base.path().join("sys/apps").exists());
}

#[test]
fn failed_elevation_leaves_no_record_behind() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let mut registry = AppRegistry::open(&config.general.registry_path).unwrap();
    let archive = stub_archive(base.path(), "Foo.AppImage", true);

    let request = InstallRequest {
        archive,
        mode: InstallMode::System,
        custom_prefix: None,
        dry_run: false,
    };
    let err = install::install_archive(&config, &mut registry, &request, &FailingElevation)
        .unwrap_err();
    match err {
        AimError::ElevationError { step, .. } => {
            assert_eq!(step, "copy application files to /opt");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(registry.list().is_empty());
    assert!(AppRegistry::open(&config.general.registry_path)
        .unwrap()
        .list()
        .is_empty());
}

#[test]
fn register_keeps_archive_whole_and_synthesizes_launcher() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let mut registry = AppRegistry::open(&config.general.registry_path).unwrap();
    let archive = stub_archive(base.path(), "Foo.AppImage", true);

    let record = install::register_archive(&config, &mut registry, &archive).unwrap();

    let library_copy = base.path().join("library/Foo.AppImage");
    assert!(library_copy.is_file());
    assert_eq!(record.install_path, library_copy);
    // Original archive is untouched.
    assert!(archive.is_file());

    let link = base.path().join("bin/foo");
    assert_eq!(fs::read_link(&link).unwrap(), library_copy);

    let desktop = base.path().join("applications/appimagekit_foo.desktop");
    let text = fs::read_to_string(&desktop).unwrap();
    assert!(text.contains(&format!("Exec={} %U", link.display())));
    assert!(text.contains(MANAGED_MARKER));
}
