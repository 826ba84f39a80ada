use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use aim::config::{Config, MANAGED_MARKER, SENTINEL_FILE};
use aim::elevate::ElevationRunner;
use aim::error::Result;
use aim::install::{self, InstallOutcome, InstallRequest};
use aim::leftover::{self, LeftoverKind};
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
    config.general.system_desktop_dir = base.join("sys/applications");
    config.general.registry_path = base.join("installed.json");
    config.extraction.selective_timeout_secs = 5;
    config.extraction.full_timeout_secs = 5;
    config.extraction.poll_interval_ms = 20;
    config
}

fn stub_archive(dir: &Path) -> PathBuf {
    let script = "#!/bin/sh\n\
        mkdir -p squashfs-root\n\
        printf '[Desktop Entry]\\nName=Foo\\nIcon=foo\\nExec=AppRun\\n' > squashfs-root/foo.desktop\n\
        case \"$1\" in\n\
        --appimage-extract=*) ;;\n\
        *)\n\
        printf '#!/bin/sh\\nexit 0\\n' > squashfs-root/AppRun\n\
        chmod +x squashfs-root/AppRun\n\
        ;;\n\
        esac\n";
    let path = dir.join("Foo.AppImage");
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

#[test]
fn scan_reports_strays_but_not_tracked_installs() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let mut registry = AppRegistry::open(&config.general.registry_path).unwrap();
    let archive = stub_archive(base.path());

    let request = InstallRequest {
        archive,
        mode: InstallMode::User,
        custom_prefix: None,
        dry_run: false,
    };
    match install::install_archive(&config, &mut registry, &request, &NoElevation).unwrap() {
        InstallOutcome::Installed(_) => {}
        InstallOutcome::DryRun(_) => unreachable!(),
    }

    // A stray from a lost registry, still carrying our sentinel.
    let stray = base.path().join("apps/oldapp_2.0");
    fs::create_dir_all(&stray).unwrap();
    fs::write(stray.join(SENTINEL_FILE), "installed\n").unwrap();
    fs::write(
        stray.join("oldapp.desktop"),
        "[Desktop Entry]\nName=Old App\nExec=AppRun\n",
    )
    .unwrap();
    // A directory somebody else put in our install root.
    let foreign = base.path().join("apps/not-ours");
    fs::create_dir_all(&foreign).unwrap();

    let mut found = leftover::scan_untracked_installs(&config, &registry);
    found.sort_by(|a, b| a.path.cmp(&b.path));
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].path, foreign);
    assert_eq!(found[0].kind, LeftoverKind::UnmarkedLeftover);
    assert_eq!(found[1].path, stray);
    assert_eq!(found[1].kind, LeftoverKind::MarkedLeftover);
    assert_eq!(found[1].display_name, "Old App");
}

#[test]
fn orphan_scan_spares_entries_owned_by_any_record() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let mut registry = AppRegistry::open(&config.general.registry_path).unwrap();
    let archive = stub_archive(base.path());

    let request = InstallRequest {
        archive,
        mode: InstallMode::User,
        custom_prefix: None,
        dry_run: false,
    };
    install::install_archive(&config, &mut registry, &request, &NoElevation).unwrap();

    // An entry we once wrote for an app whose record is gone.
    let orphan = base.path().join("applications/appimagekit_gone.desktop");
    fs::write(
        &orphan,
        format!("[Desktop Entry]\nName=Gone\nComment={MANAGED_MARKER}\nExec=/nowhere/gone %U\n"),
    )
    .unwrap();
    // Someone else's entry, no marker.
    fs::write(
        base.path().join("applications/vendor.desktop"),
        "[Desktop Entry]\nName=Vendor\nExec=/usr/bin/vendor\n",
    )
    .unwrap();

    let found = leftover::scan_orphaned_desktop_files(&config, &registry);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].path, orphan);
    assert_eq!(found[0].kind, LeftoverKind::OrphanedIntegration);
    assert_eq!(found[0].display_name, "Gone");
}

#[test]
fn user_data_scan_finds_name_variants_under_home() {
    let home = tempfile::tempdir().unwrap();

    fs::create_dir_all(home.path().join(".config/myapp")).unwrap();
    fs::create_dir_all(home.path().join(".config/.my-app")).unwrap();
    fs::create_dir_all(home.path().join(".cache/My App")).unwrap();
    fs::create_dir_all(home.path().join(".myapp")).unwrap();
    fs::create_dir_all(home.path().join(".config/unrelated")).unwrap();

    let mut found = leftover::scan_user_data(home.path(), "My App");
    found.sort_by(|a, b| a.path.cmp(&b.path));
    let paths: Vec<_> = found.iter().map(|c| c.path.clone()).collect();

    assert!(paths.contains(&home.path().join(".config/myapp")));
    // Dot-hidden dirs match inside the XDG roots too.
    assert!(paths.contains(&home.path().join(".config/.my-app")));
    assert!(paths.contains(&home.path().join(".myapp")));
    assert!(!paths.iter().any(|p| p.ends_with("unrelated")));
    assert!(found
        .iter()
        .all(|c| c.kind == LeftoverKind::UserDataLeftover));
}

#[test]
fn clean_removes_reported_candidates() {
    let base = tempfile::tempdir().unwrap();
    let config = test_config(base.path());
    let registry = AppRegistry::open(&config.general.registry_path).unwrap();

    let stray = base.path().join("apps/stray");
    fs::create_dir_all(&stray).unwrap();
    fs::write(stray.join(SENTINEL_FILE), "installed\n").unwrap();

    let found = leftover::scan_untracked_installs(&config, &registry);
    assert_eq!(found.len(), 1);
    let (removed, failed) = leftover::remove_candidates(&found);
    assert_eq!((removed, failed), (1, 0));
    assert!(!stray.exists());
    assert!(leftover::scan_untracked_installs(&config, &registry).is_empty());
}
