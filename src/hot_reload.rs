//! Asset Hot-Reload
//!
//! Polls the source files of watched assets and re-imports the loaded ones
//! whose file changed, through [`AssetManager::request_reload`].

use crate::assets::{AssetManager, AssetState};
use crate::ulid::Ulid;
use ahash::AHashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Clock and file timestamps, replaceable in tests
pub trait FileClock: Send + Sync {
    fn now(&self) -> SystemTime;
    fn modified(&self, path: &Path) -> std::io::Result<SystemTime>;
}

/// Wall clock and filesystem timestamps
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemFileClock;

impl FileClock for SystemFileClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn modified(&self, path: &Path) -> std::io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }
}

#[derive(Debug)]
struct WatchedFile {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

/// Polling watcher for asset source files
pub struct AssetWatcher {
    watched: AHashMap<Ulid, WatchedFile>,
    clock: Box<dyn FileClock>,
    last_check: Option<SystemTime>,
    /// Minimum time between two polls
    pub check_interval: Duration,
    pub enabled: bool,
}

impl AssetWatcher {
    pub fn new() -> Self {
        Self::with_clock(Box::new(SystemFileClock))
    }

    pub fn with_clock(clock: Box<dyn FileClock>) -> Self {
        Self {
            watched: AHashMap::new(),
            clock,
            last_check: None,
            check_interval: Duration::from_millis(500),
            enabled: true,
        }
    }

    /// Track the source file of `id`. Returns false if it has no metadata.
    pub fn watch(&mut self, manager: &AssetManager, id: Ulid) -> bool {
        let Some(metadata) = manager.metadata(id) else {
            tracing::warn!("Cannot watch asset {id}: no metadata");
            return false;
        };
        let last_modified = self.clock.modified(&metadata.path).ok();
        self.watched.insert(
            id,
            WatchedFile {
                path: metadata.path.clone(),
                last_modified,
            },
        );
        true
    }

    pub fn unwatch(&mut self, id: Ulid) -> bool {
        self.watched.remove(&id).is_some()
    }

    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }

    /// Poll watched files if the interval elapsed, requesting a reload for
    /// every modified asset that is currently loaded. Returns the number of
    /// reloads requested.
    pub fn check(&mut self, manager: &AssetManager) -> usize {
        if !self.enabled {
            return 0;
        }
        let now = self.clock.now();
        if let Some(last) = self.last_check {
            if now.duration_since(last).unwrap_or_default() < self.check_interval {
                return 0;
            }
        }
        self.last_check = Some(now);

        let mut reloaded = 0;
        for (id, file) in &mut self.watched {
            let modified = match self.clock.modified(&file.path) {
                Ok(modified) => modified,
                Err(e) => {
                    tracing::trace!("Cannot stat {}: {e}", file.path.display());
                    continue;
                }
            };
            if file.last_modified.is_some_and(|last| modified <= last) {
                continue;
            }

            match manager.state_of(*id) {
                // the next load reads the new file
                None => file.last_modified = Some(modified),
                Some(AssetState::Loaded) => {
                    let Some(asset) = manager.cache().get(*id) else {
                        continue;
                    };
                    if manager.request_reload(&asset) {
                        tracing::info!("Hot-reloading asset {id} from {}", file.path.display());
                        file.last_modified = Some(modified);
                        reloaded += 1;
                    }
                }
                // picked up once the asset settles
                Some(_) => {}
            }
        }
        reloaded
    }
}

impl Default for AssetWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AssetWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetWatcher")
            .field("watched", &self.watched)
            .field("check_interval", &self.check_interval)
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{
        Asset, AssetLoadResult, AssetManagerSettings, AssetMetadata, AssetType,
        AssetTypeRegistry, LoadContext, Texture2D,
    };
    use crate::gpu::MockUploadDevice;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct ClockState {
        now: SystemTime,
        files: AHashMap<PathBuf, SystemTime>,
    }

    #[derive(Clone)]
    struct FakeClock {
        state: Arc<Mutex<ClockState>>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(ClockState {
                    now: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000),
                    files: AHashMap::new(),
                })),
            }
        }

        fn advance(&self, by: Duration) {
            self.state.lock().now += by;
        }

        fn touch(&self, path: &Path) {
            let mut state = self.state.lock();
            let now = state.now;
            state.files.insert(path.to_path_buf(), now);
        }
    }

    impl FileClock for FakeClock {
        fn now(&self) -> SystemTime {
            self.state.lock().now
        }

        fn modified(&self, path: &Path) -> std::io::Result<SystemTime> {
            self.state
                .lock()
                .files
                .get(path)
                .copied()
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
        }
    }

    fn setup() -> (AssetManager, Ulid, Arc<AtomicU32>) {
        setup_with_retries(0)
    }

    /// Texture importer answering `TryAgain` for the first `retries` attempts
    fn setup_with_retries(retries: u32) -> (AssetManager, Ulid, Arc<AtomicU32>) {
        let imports = Arc::new(AtomicU32::new(0));
        let counter = imports.clone();
        let mut registry = AssetTypeRegistry::new();
        registry.register::<Texture2D>(move |_: &dyn Asset, ctx: &mut LoadContext<'_, '_>| {
            counter.fetch_add(1, Ordering::SeqCst);
            if ctx.attempt() < retries {
                AssetLoadResult::TryAgain
            } else {
                AssetLoadResult::Success
            }
        });
        let manager = AssetManager::new(
            AssetManagerSettings::default(),
            registry,
            Arc::new(MockUploadDevice::new()),
        );
        let id = Ulid::generate();
        manager.add_metadata(AssetMetadata {
            id,
            name: "grass".into(),
            asset_type: AssetType::Texture2D,
            path: PathBuf::from("assets/grass.png"),
            offset: 0,
        });
        (manager, id, imports)
    }

    #[test]
    fn test_modified_loaded_asset_is_reloaded() {
        let (manager, id, imports) = setup();
        let clock = FakeClock::new();
        let path = manager.metadata(id).unwrap().path.clone();
        clock.touch(&path);

        let mut watcher = AssetWatcher::with_clock(Box::new(clock.clone()));
        assert!(watcher.watch(&manager, id));
        let texture = manager.get_asset(id, AssetType::Texture2D);
        manager.update();
        assert_eq!(imports.load(Ordering::SeqCst), 1);

        assert_eq!(watcher.check(&manager), 0);

        clock.advance(Duration::from_secs(1));
        clock.touch(&path);
        assert_eq!(watcher.check(&manager), 1);
        assert_eq!(texture.state(), AssetState::Loading);
        manager.update();
        assert_eq!(texture.state(), AssetState::Loaded);
        assert_eq!(imports.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_check_interval_and_disabled() {
        let (manager, id, _) = setup();
        let clock = FakeClock::new();
        let path = manager.metadata(id).unwrap().path.clone();
        clock.touch(&path);
        let mut watcher = AssetWatcher::with_clock(Box::new(clock.clone()));
        watcher.watch(&manager, id);
        let _texture = manager.get_asset(id, AssetType::Texture2D);
        manager.update();

        assert_eq!(watcher.check(&manager), 0);
        clock.advance(Duration::from_millis(100));
        clock.touch(&path);
        // interval not elapsed yet
        assert_eq!(watcher.check(&manager), 0);

        watcher.enabled = false;
        clock.advance(Duration::from_secs(1));
        assert_eq!(watcher.check(&manager), 0);

        watcher.enabled = true;
        assert_eq!(watcher.check(&manager), 1);
    }

    #[test]
    fn test_unloaded_assets_are_not_reloaded() {
        let (manager, id, imports) = setup();
        let clock = FakeClock::new();
        let mut watcher = AssetWatcher::with_clock(Box::new(clock.clone()));
        assert!(watcher.watch(&manager, id));
        assert!(!watcher.watch(&manager, Ulid::generate()));
        assert_eq!(watcher.watched_count(), 1);

        clock.touch(&manager.metadata(id).unwrap().path);
        assert_eq!(watcher.check(&manager), 0);
        assert_eq!(imports.load(Ordering::SeqCst), 0);
        assert!(watcher.unwatch(id));
    }

    #[test]
    fn test_edit_while_loading_is_kept() {
        let (manager, id, imports) = setup_with_retries(1);
        let clock = FakeClock::new();
        let path = manager.metadata(id).unwrap().path.clone();
        clock.touch(&path);
        let mut watcher = AssetWatcher::with_clock(Box::new(clock.clone()));
        watcher.watch(&manager, id);

        let texture = manager.get_asset(id, AssetType::Texture2D);
        manager.update();
        assert_eq!(texture.state(), AssetState::Loading);

        clock.advance(Duration::from_secs(1));
        clock.touch(&path);
        assert_eq!(watcher.check(&manager), 0);

        manager.update();
        assert_eq!(texture.state(), AssetState::Loaded);
        assert_eq!(imports.load(Ordering::SeqCst), 2);

        // the edit made during the wait still triggers a reload
        clock.advance(Duration::from_secs(1));
        assert_eq!(watcher.check(&manager), 1);
        assert_eq!(watcher.check(&manager), 0);
    }

    #[test]
    fn test_check_does_not_revive_unloading_asset() {
        let (manager, id, _) = setup();
        let clock = FakeClock::new();
        let path = manager.metadata(id).unwrap().path.clone();
        clock.touch(&path);
        let mut watcher = AssetWatcher::with_clock(Box::new(clock.clone()));
        watcher.watch(&manager, id);

        let texture = manager.get_asset(id, AssetType::Texture2D);
        manager.update();
        drop(texture);
        assert_eq!(manager.state_of(id), Some(AssetState::Unloading));

        clock.advance(Duration::from_secs(1));
        clock.touch(&path);
        let hits = manager.stats().hits;
        assert_eq!(watcher.check(&manager), 0);
        assert_eq!(manager.state_of(id), Some(AssetState::Unloading));
        assert_eq!(manager.stats().hits, hits);

        manager.update();
        assert!(!manager.contains(id));
    }
}
