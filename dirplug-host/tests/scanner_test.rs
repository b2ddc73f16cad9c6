//! Integration tests for directory scanning, staleness and conflict resolution

use dirplug_host::formats::NameSegmentFormat;
use dirplug_host::{
    ArtifactFormat, DirChangeListener, DirPluginScanner, LoadError, ManualDirProvider,
    PluginDirProvider, ProviderIdent, ProviderInstance, ProviderLoadError, ProviderLoader,
    ScanError, ScannerConfig,
};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn scanner_with<F: ArtifactFormat>(
    dir: &Path,
    format: F,
    interval: Duration,
) -> (Arc<ManualDirProvider>, DirPluginScanner<F>) {
    let provider = Arc::new(ManualDirProvider::new(dir));
    let scanner = DirPluginScanner::new(
        provider.clone(),
        format,
        ScannerConfig::default().with_rescan_interval(interval),
    );
    (provider, scanner)
}

fn touch(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, "test").unwrap();
    path
}

fn bump_mtime(path: &Path) {
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(10))
        .unwrap();
}

#[test]
fn test_resolve_tracks_directory() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path().join("plugins");
    let (provider, scanner) = scanner_with(&basedir, NameSegmentFormat::new(), Duration::ZERO);

    // directory does not exist
    assert!(!basedir.exists());
    assert_eq!(scanner.resolve(&ProviderIdent::new("test1", "test")).unwrap(), None);

    // empty directory
    fs::create_dir_all(&basedir).unwrap();
    assert_eq!(scanner.resolve(&ProviderIdent::new("test1", "test")).unwrap(), None);

    let file = touch(&basedir, "service_provider");
    provider.fire_change();

    assert_eq!(scanner.resolve(&ProviderIdent::new("test1", "test")).unwrap(), None);
    assert_eq!(
        scanner
            .resolve(&ProviderIdent::new("service", "provider"))
            .unwrap(),
        Some(file.clone())
    );

    fs::remove_file(&file).unwrap();
    provider.fire_change();
    assert_eq!(
        scanner
            .resolve(&ProviderIdent::new("service", "provider"))
            .unwrap(),
        None
    );

    // not a plugin file
    touch(&basedir, "service-provider");
    provider.fire_change();
    assert_eq!(
        scanner
            .resolve(&ProviderIdent::new("service", "provider"))
            .unwrap(),
        None
    );
}

#[test]
fn test_list_identities() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path();
    let (provider, scanner) = scanner_with(basedir, NameSegmentFormat::new(), Duration::ZERO);

    assert!(scanner.list_identities().unwrap().is_empty());

    let file1 = touch(basedir, "service_provider");
    provider.fire_change();
    let idents = scanner.list_identities().unwrap();
    assert_eq!(idents.len(), 1);
    assert!(idents.contains(&ProviderIdent::new("service", "provider")));

    let file2 = touch(basedir, "a_b-c_d");
    provider.fire_change();
    let idents = scanner.list_identities().unwrap();
    let expected: HashSet<_> = [
        ProviderIdent::new("service", "provider"),
        ProviderIdent::new("a", "b"),
        ProviderIdent::new("c", "d"),
    ]
    .into_iter()
    .collect();
    assert_eq!(idents, expected);

    fs::remove_file(file1).unwrap();
    fs::remove_file(file2).unwrap();
    provider.fire_change();
    assert!(scanner.list_identities().unwrap().is_empty());

    touch(basedir, "service-provider");
    provider.fire_change();
    assert!(scanner.list_identities().unwrap().is_empty());
}

#[test]
fn test_is_expired() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path();
    let (_provider, scanner) = scanner_with(basedir, NameSegmentFormat::new(), Duration::ZERO);

    let file1 = touch(basedir, "service_provider");
    let file2 = touch(basedir, "service2_provider");
    let ident1 = ProviderIdent::new("service", "provider");
    let ident2 = ProviderIdent::new("service2", "provider");

    assert_eq!(scanner.resolve(&ident1).unwrap(), Some(file1.clone()));
    assert_eq!(scanner.resolve(&ident2).unwrap(), Some(file2.clone()));

    assert!(!scanner.is_expired(&ident1, &file1));
    assert!(!scanner.is_expired(&ident2, &file2));

    // delete
    fs::remove_file(&file1).unwrap();
    assert!(scanner.is_expired(&ident1, &file1));
    assert!(!scanner.is_expired(&ident2, &file2));

    // modify
    fs::write(&file2, "blah").unwrap();
    bump_mtime(&file2);
    assert!(scanner.is_expired(&ident2, &file2));
    assert_eq!(scanner.resolve(&ident2).unwrap(), Some(file2.clone()));
    assert!(!scanner.is_expired(&ident2, &file2));

    // wrong file for the identity
    assert!(scanner.is_expired(&ident1, &file2));
}

#[test]
fn test_is_expired_when_another_file_wins() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path();
    let old = basedir.join("a-service_provider");
    let new = basedir.join("b-service_provider");
    let format = NameSegmentFormat::new()
        .with_version(&old, "1.0")
        .with_version(&new, "2.0");
    let (provider, scanner) = scanner_with(basedir, format, Duration::from_secs(60));

    touch(basedir, "a-service_provider");
    let ident = ProviderIdent::new("service", "provider");
    assert_eq!(scanner.resolve(&ident).unwrap(), Some(old.clone()));
    assert!(!scanner.is_expired(&ident, &old));

    touch(basedir, "b-service_provider");
    // no notification yet, inside the throttle window
    assert!(!scanner.is_expired(&ident, &old));

    provider.fire_change();
    assert!(scanner.is_expired(&ident, &old));
    assert!(!scanner.is_expired(&ident, &new));
}

#[test]
fn test_resolve_conflict_by_numeric_version() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path();

    let file1 = basedir.join("test1-service_provider1");
    let file2 = basedir.join("test2-service_provider1");
    let file3 = basedir.join("test3-service_provider1");
    let format = NameSegmentFormat::new()
        .with_version(&file1, "1.6")
        .with_version(&file2, "1.22")
        .with_version(&file3, "1.8");
    let (_provider, scanner) = scanner_with(basedir, format, Duration::from_secs(60));

    for name in [
        "test1-service_provider1",
        "test2-service_provider1",
        "test3-service_provider1",
    ] {
        touch(basedir, name);
    }

    assert_eq!(
        scanner
            .resolve(&ProviderIdent::new("service", "provider1"))
            .unwrap(),
        Some(file2)
    );
}

#[test]
fn test_conflict_tie_goes_to_last_listed() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path();

    let names = [
        "test1-service_provider1",
        "test2-service_provider1",
        "test3-service_provider1",
        "test4-service_provider1",
    ];
    let mut format = NameSegmentFormat::new();
    for (name, version) in names.iter().zip(["1.6", "1.22", "1.22", "1.8"]) {
        format = format.with_version(basedir.join(name), version);
        touch(basedir, name);
    }
    let (_provider, scanner) = scanner_with(basedir, format, Duration::from_secs(60));

    for _ in 0..3 {
        scanner.mark_dirty();
        assert_eq!(
            scanner
                .resolve(&ProviderIdent::new("service", "provider1"))
                .unwrap(),
            Some(basedir.join("test3-service_provider1"))
        );
    }
}

#[test]
fn test_throttle_and_notification() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path();
    let (provider, scanner) =
        scanner_with(basedir, NameSegmentFormat::new(), Duration::from_secs(60));

    touch(basedir, "service_provider");
    let first = scanner.list_identities().unwrap();
    assert_eq!(scanner.scan_count(), 1);

    // repeated queries inside the window do not walk the directory again
    assert_eq!(scanner.list_identities().unwrap(), first);
    assert!(scanner
        .resolve(&ProviderIdent::new("service", "provider"))
        .unwrap()
        .is_some());
    assert_eq!(scanner.scan_count(), 1);

    // unnoticed change stays invisible until notified
    touch(basedir, "other_provider");
    assert_eq!(scanner.list_identities().unwrap().len(), 1);
    assert_eq!(scanner.scan_count(), 1);

    provider.fire_change();
    assert_eq!(scanner.list_identities().unwrap().len(), 2);
    assert_eq!(scanner.scan_count(), 2);
}

#[test]
fn test_zero_interval_rescans_every_query() {
    let temp = TempDir::new().unwrap();
    let (_provider, scanner) =
        scanner_with(temp.path(), NameSegmentFormat::new(), Duration::ZERO);

    scanner.list_identities().unwrap();
    scanner.list_identities().unwrap();
    scanner
        .resolve(&ProviderIdent::new("service", "provider"))
        .unwrap();
    assert_eq!(scanner.scan_count(), 3);
}

#[test]
fn test_short_interval_expires() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path();
    let (_provider, scanner) =
        scanner_with(basedir, NameSegmentFormat::new(), Duration::from_millis(50));

    assert!(scanner.list_identities().unwrap().is_empty());
    touch(basedir, "service_provider");
    thread::sleep(Duration::from_millis(120));
    assert_eq!(scanner.list_identities().unwrap().len(), 1);
    assert_eq!(scanner.scan_count(), 2);
}

/// Format reading the identity list from the file contents, failing on "broken"
#[derive(Default)]
struct ContentFormat {
    parses: AtomicUsize,
}

struct ContentLoader {
    idents: Vec<ProviderIdent>,
}

impl ProviderLoader for ContentLoader {
    fn provider_idents(&self) -> Vec<ProviderIdent> {
        self.idents.clone()
    }

    fn supports(&self, _service: &str) -> bool {
        true
    }

    fn load(&self, service: &str, name: &str) -> Result<ProviderInstance, ProviderLoadError> {
        Err(ProviderLoadError::UnknownProvider(ProviderIdent::new(
            service, name,
        )))
    }
}

impl ArtifactFormat for ContentFormat {
    type Loader = ContentLoader;

    fn is_valid_file(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "plugin")
    }

    fn create_loader(&self, path: &Path) -> Result<ContentLoader, LoadError> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        let contents = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if contents.trim() == "broken" {
            return Err(LoadError::invalid(path, "broken artifact"));
        }
        let idents = contents
            .lines()
            .map(|line| line.parse())
            .collect::<Result<Vec<ProviderIdent>, _>>()
            .map_err(|e| LoadError::invalid(path, e.to_string()))?;
        Ok(ContentLoader { idents })
    }
}

#[test]
fn test_bad_file_is_skipped() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path();
    fs::write(basedir.join("bad.plugin"), "broken").unwrap();
    fs::write(basedir.join("good.plugin"), "Step:copy\nStep:move").unwrap();

    let (_provider, scanner) = scanner_with(basedir, ContentFormat::default(), Duration::ZERO);
    let idents = scanner.list_identities().unwrap();
    assert_eq!(idents.len(), 2);
    assert_eq!(
        scanner.resolve(&ProviderIdent::new("Step", "copy")).unwrap(),
        Some(basedir.join("good.plugin"))
    );
}

#[test]
fn test_unchanged_files_are_not_parsed_again() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path();
    let good = basedir.join("good.plugin");
    fs::write(&good, "Step:copy").unwrap();
    fs::write(basedir.join("other.plugin"), "Step:move").unwrap();

    let (_provider, scanner) = scanner_with(basedir, ContentFormat::default(), Duration::ZERO);
    scanner.list_identities().unwrap();
    scanner.list_identities().unwrap();
    scanner.list_identities().unwrap();
    assert_eq!(scanner.scan_count(), 3);
    assert_eq!(scanner.format().parses.load(Ordering::SeqCst), 2);

    fs::write(&good, "Step:copy\nStep:link").unwrap();
    bump_mtime(&good);
    assert_eq!(scanner.list_identities().unwrap().len(), 3);
    assert_eq!(scanner.format().parses.load(Ordering::SeqCst), 3);
}

/// Provider whose directory can be switched by the test
struct SwitchableDirProvider {
    dir: Mutex<PathBuf>,
    inner: ManualDirProvider,
}

impl SwitchableDirProvider {
    fn switch_to(&self, dir: &Path) {
        *self.dir.lock().unwrap() = dir.to_path_buf();
        self.inner.fire_change();
    }
}

impl PluginDirProvider for SwitchableDirProvider {
    fn plugin_dir(&self) -> PathBuf {
        self.dir.lock().unwrap().clone()
    }

    fn subscribe(&self, listener: DirChangeListener) {
        self.inner.subscribe(listener);
    }
}

#[test]
fn test_unavailable_directory_keeps_previous_index() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path().join("plugins");
    fs::create_dir(&basedir).unwrap();
    let file = touch(&basedir, "service_provider");
    let not_a_dir = touch(temp.path(), "plain-file");

    let provider = Arc::new(SwitchableDirProvider {
        dir: Mutex::new(basedir.clone()),
        inner: ManualDirProvider::new(&basedir),
    });
    let scanner = DirPluginScanner::new(
        provider.clone(),
        NameSegmentFormat::new(),
        ScannerConfig::default().with_rescan_interval(Duration::from_secs(60)),
    );

    let ident = ProviderIdent::new("service", "provider");
    assert_eq!(scanner.resolve(&ident).unwrap(), Some(file.clone()));

    provider.switch_to(&not_a_dir);
    assert!(matches!(
        scanner.resolve(&ident),
        Err(ScanError::DirectoryUnavailable { .. })
    ));
    // the previous index is still in place
    assert!(!scanner.is_expired(&ident, &file));

    provider.switch_to(&basedir);
    assert_eq!(scanner.resolve(&ident).unwrap(), Some(file));
}

#[test]
fn test_concurrent_queries_and_notifications() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path().to_path_buf();
    let (provider, scanner) =
        scanner_with(&basedir, NameSegmentFormat::new(), Duration::from_millis(5));
    let scanner = Arc::new(scanner);

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let scanner = scanner.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    let idents = scanner.list_identities().unwrap();
                    for ident in &idents {
                        // every listed identity maps to a file of the last complete scan
                        assert!(scanner.resolve(ident).unwrap().is_some());
                    }
                }
            })
        })
        .collect();

    for i in 0..20 {
        touch(&basedir, &format!("svc_provider{}", i));
        provider.fire_change();
    }

    for reader in readers {
        reader.join().unwrap();
    }

    provider.fire_change();
    assert_eq!(scanner.list_identities().unwrap().len(), 20);
}

#[test]
fn test_vanished_file_within_interval() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path();
    let (_provider, scanner) =
        scanner_with(basedir, NameSegmentFormat::new(), Duration::from_secs(60));

    let file = touch(basedir, "service_provider");
    let ident = ProviderIdent::new("service", "provider");
    assert_eq!(scanner.resolve(&ident).unwrap(), Some(file.clone()));
    assert!(scanner.loader_for(&ident).unwrap().is_some());

    // deleted without a notification, inside the rescan interval
    fs::remove_file(&file).unwrap();
    assert!(matches!(scanner.loader_for(&ident), Ok(None)));
    assert!(scanner.list_identities().unwrap().is_empty());
    assert!(matches!(
        scanner.load_provider(&ident),
        Err(ScanError::NotFound(_))
    ));
}

#[test]
fn test_vanished_file_falls_back_to_other_provider() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path();
    let newer = basedir.join("test2-service_provider");
    let format = NameSegmentFormat::new()
        .with_version(basedir.join("test1-service_provider"), "1.0")
        .with_version(&newer, "2.0");
    let (_provider, scanner) = scanner_with(basedir, format, Duration::from_secs(60));

    let older = touch(basedir, "test1-service_provider");
    touch(basedir, "test2-service_provider");
    let ident = ProviderIdent::new("service", "provider");
    assert_eq!(scanner.resolve(&ident).unwrap(), Some(newer.clone()));

    fs::remove_file(&newer).unwrap();
    assert!(scanner.loader_for(&ident).unwrap().is_some());
    assert_eq!(scanner.resolve(&ident).unwrap(), Some(older));
}

#[test]
fn test_snapshot_uses_one_scan() {
    let temp = TempDir::new().unwrap();
    let basedir = temp.path();
    let (_provider, scanner) = scanner_with(basedir, NameSegmentFormat::new(), Duration::ZERO);

    let file = touch(basedir, "c_d-a_b");
    touch(basedir, "service_provider");

    let snapshot = scanner.snapshot().unwrap();
    assert_eq!(scanner.scan_count(), 1);

    let idents: Vec<_> = snapshot.iter().map(|(ident, _, _)| ident.clone()).collect();
    assert_eq!(
        idents,
        vec![
            ProviderIdent::new("a", "b"),
            ProviderIdent::new("c", "d"),
            ProviderIdent::new("service", "provider"),
        ]
    );
    assert_eq!(snapshot[0].1, file);
    assert!(snapshot[0].2.is_loader_for(&ProviderIdent::new("a", "b")));
}
