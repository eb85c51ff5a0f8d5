use crate::assets::{
    Asset, AssetCache, AssetLoadRequest, AssetLoader, AssetMetadata, AssetRef, AssetState,
    AssetType, AssetTypeRegistry, BankImporter, CacheStats, LoaderSettings, MetadataBank,
    TypedAsset,
};
use crate::error::{AssetError, Result};
use crate::gpu::UploadDevice;
use crate::ulid::Ulid;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Asset manager configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetManagerSettings {
    /// Directory containing the metadata bank, asset paths are relative to it
    pub asset_root: PathBuf,
    pub loader: LoaderSettings,
}

impl Default for AssetManagerSettings {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("assets"),
            loader: LoaderSettings::default(),
        }
    }
}

impl AssetManagerSettings {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

/// Entry point of the asset subsystem.
///
/// Owns the metadata bank, the identity map of live assets and the loader.
/// Lookups never fail loudly: errors are logged and an empty handle returned.
pub struct AssetManager {
    settings: AssetManagerSettings,
    registry: AssetTypeRegistry,
    bank: RwLock<MetadataBank>,
    cache: AssetCache,
    loader: AssetLoader,
}

impl AssetManager {
    pub fn new(
        settings: AssetManagerSettings,
        registry: AssetTypeRegistry,
        device: Arc<dyn UploadDevice>,
    ) -> Self {
        tracing::info!(
            "Asset manager using {} upload device, root {}",
            device.backend_name(),
            settings.asset_root.display()
        );
        let loader = AssetLoader::new(device, settings.loader.clone());
        Self {
            settings,
            registry,
            bank: RwLock::new(MetadataBank::new()),
            cache: AssetCache::new(),
            loader,
        }
    }

    /// Fill the metadata bank from the asset root
    pub fn import_metadata_bank(&self, importer: &dyn BankImporter) -> Result<()> {
        let mut bank = self.bank.write();
        importer.import(&self.settings.asset_root, &mut bank)?;
        tracing::info!("Metadata bank holds {} assets", bank.len());
        Ok(())
    }

    /// Register metadata directly, first entry wins
    pub fn add_metadata(&self, metadata: AssetMetadata) -> bool {
        self.bank.write().insert(metadata)
    }

    pub fn metadata(&self, id: Ulid) -> Option<Arc<AssetMetadata>> {
        self.bank.read().get(id).cloned()
    }

    /// Get the asset for `id`, creating it and queueing its load on first use.
    ///
    /// Returns an empty handle if the id is unknown, the type has no
    /// importer, or the cached instance has another type.
    pub fn get_asset(&self, id: Ulid, asset_type: AssetType) -> AssetRef {
        self.get_or_create(id, asset_type, None)
    }

    /// Like [`AssetManager::get_asset`], calling `callback` once the asset
    /// finished loading. Fires immediately if it already has.
    pub fn get_asset_with_callback(
        &self,
        id: Ulid,
        asset_type: AssetType,
        callback: impl FnOnce(&dyn Asset) + Send + 'static,
    ) -> AssetRef {
        self.get_or_create(id, asset_type, Some(Box::new(callback)))
    }

    /// Typed [`AssetManager::get_asset`]
    pub fn get<A: TypedAsset>(&self, id: Ulid) -> AssetRef<A> {
        match self.get_asset(id, A::ASSET_TYPE).downcast::<A>() {
            Ok(asset) => asset,
            Err(other) => {
                if !other.is_null() {
                    tracing::error!(
                        "Asset {id} is registered as {} but was built with another concrete type",
                        A::ASSET_TYPE
                    );
                }
                AssetRef::null()
            }
        }
    }

    fn get_or_create(
        &self,
        id: Ulid,
        asset_type: AssetType,
        callback: Option<Box<dyn FnOnce(&dyn Asset) + Send>>,
    ) -> AssetRef {
        if let Some(asset) = self.cache.get(id) {
            return self.existing(asset, asset_type, callback);
        }

        let Some(metadata) = self.metadata(id) else {
            tracing::error!("{}", AssetError::NotFound(id));
            return AssetRef::null();
        };
        if metadata.asset_type != asset_type {
            tracing::error!(
                "{}",
                AssetError::TypeMismatch {
                    id,
                    actual: metadata.asset_type,
                    expected: asset_type
                }
            );
            return AssetRef::null();
        }
        let Some(info) = self.registry.get(asset_type) else {
            tracing::error!("{}", AssetError::TypeNotImplemented(asset_type));
            return AssetRef::null();
        };

        let constructor = info.constructor;
        let Some((asset, created)) = self
            .cache
            .get_or_insert_with(id, || Some(constructor(id)))
        else {
            return AssetRef::null();
        };
        if !created {
            return self.existing(asset, asset_type, callback);
        }

        tracing::debug!("Loading asset {} ({id})", metadata.name);
        let mut request = AssetLoadRequest::new(asset.clone(), info.importer.clone(), metadata);
        if let Some(callback) = callback {
            request = request.with_callback(callback);
        }
        self.loader.add_request(request);
        asset
    }

    fn existing(
        &self,
        asset: AssetRef,
        asset_type: AssetType,
        callback: Option<Box<dyn FnOnce(&dyn Asset) + Send>>,
    ) -> AssetRef {
        let actual = asset.asset_type();
        if actual != asset_type {
            tracing::error!(
                "{}",
                AssetError::TypeMismatch {
                    id: asset.id(),
                    actual,
                    expected: asset_type
                }
            );
            return AssetRef::null();
        }
        if let Some(callback) = callback {
            if asset.is_loading() {
                self.loader
                    .add_request(AssetLoadRequest::notify(asset.clone(), callback));
            } else {
                callback(&*asset);
            }
        }
        asset
    }

    /// Re-import a loaded asset without disturbing its handles.
    ///
    /// A scratch instance is loaded from the same metadata and its payload
    /// swapped into `asset` once done. Returns false if nothing was queued.
    pub fn request_reload(&self, asset: &AssetRef) -> bool {
        let Some(target) = asset.get() else {
            return false;
        };
        let id = target.id();
        if !target.is_loaded() {
            tracing::warn!("Requested reload for asset {id}, but asset is not loaded");
            return false;
        }
        let Some(metadata) = self.metadata(id) else {
            tracing::error!("{}", AssetError::NotFound(id));
            return false;
        };
        let Some(info) = self.registry.get(target.asset_type()) else {
            tracing::error!("{}", AssetError::TypeNotImplemented(target.asset_type()));
            return false;
        };

        let Some(scratch) = self.cache.insert((info.constructor)(Ulid::generate())) else {
            return false;
        };
        target.base().set_state(AssetState::Loading);
        tracing::debug!("Reloading asset {} ({id})", metadata.name);

        let original = asset.clone();
        let request = AssetLoadRequest::new(scratch, info.importer.clone(), metadata).with_callback(
            move |scratch: &dyn Asset| {
                if scratch.is_loaded() && !original.swap_payload(scratch) {
                    tracing::error!("Reloaded asset {} could not be swapped in", original.id());
                }
                original.base().set_state(AssetState::Loaded);
            },
        );
        self.loader.add_request(request);
        true
    }

    /// Per-tick update: run one load batch, then free released assets
    pub fn update(&self) {
        let _span = tracing::info_span!("asset_update").entered();
        self.loader.process_requests(self);
        let freed = self.cache.drain_unloads();
        if freed > 0 {
            tracing::debug!("Unloaded {freed} assets");
        }
    }

    pub fn loader(&self) -> &AssetLoader {
        &self.loader
    }

    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    pub fn registry(&self) -> &AssetTypeRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &AssetManagerSettings {
        &self.settings
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of instances in the identity map
    pub fn live_assets(&self) -> usize {
        self.cache.len()
    }

    pub fn contains(&self, id: Ulid) -> bool {
        self.cache.contains(id)
    }

    pub fn state_of(&self, id: Ulid) -> Option<AssetState> {
        self.cache.state_of(id)
    }
}

impl fmt::Debug for AssetManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetManager")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("metadata", &self.bank.read().len())
            .field("live_assets", &self.live_assets())
            .field("loader", &self.loader)
            .finish()
    }
}

impl Drop for AssetManager {
    fn drop(&mut self) {
        self.loader.clear();
        self.cache.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssetLoadResult, LoadContext, Mesh, Texture2D};
    use crate::gpu::MockUploadDevice;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn manager_with(registry: AssetTypeRegistry) -> (AssetManager, Ulid) {
        let manager = AssetManager::new(
            AssetManagerSettings::default(),
            registry,
            Arc::new(MockUploadDevice::new()),
        );
        let id = Ulid::generate();
        manager.add_metadata(AssetMetadata {
            id,
            name: "bricks".into(),
            asset_type: AssetType::Texture2D,
            path: PathBuf::from("bricks.png"),
            offset: 0,
        });
        (manager, id)
    }

    fn texture_registry(calls: Arc<AtomicU32>) -> AssetTypeRegistry {
        let mut registry = AssetTypeRegistry::new();
        registry.register::<Texture2D>(move |asset: &dyn Asset, _: &mut LoadContext<'_, '_>| {
            let generation = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(texture) = asset.downcast_ref::<Texture2D>() {
                texture.write().width = generation;
            }
            AssetLoadResult::Success
        });
        registry
    }

    #[test]
    fn test_get_asset_loads_on_update() {
        let calls = Arc::new(AtomicU32::new(0));
        let (manager, id) = manager_with(texture_registry(calls.clone()));

        let texture = manager.get::<Texture2D>(id);
        assert_eq!(texture.state(), AssetState::Loading);
        manager.update();
        assert_eq!(texture.state(), AssetState::Loaded);
        assert_eq!(texture.read().width, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_id_and_type_mismatch() {
        let (manager, id) = manager_with(texture_registry(Arc::new(AtomicU32::new(0))));
        assert!(manager.get_asset(Ulid::generate(), AssetType::Texture2D).is_null());
        assert!(manager.get_asset(id, AssetType::Mesh).is_null());
        assert!(manager.get::<Mesh>(id).is_null());
        assert_eq!(manager.loader().pending(), 0);

        let _texture = manager.get_asset(id, AssetType::Texture2D);
        assert!(manager.get_asset(id, AssetType::Mesh).is_null());
        assert_eq!(manager.loader().pending(), 1);
    }

    #[test]
    fn test_callback_on_loaded_asset_fires_immediately() {
        let (manager, id) = manager_with(texture_registry(Arc::new(AtomicU32::new(0))));
        let _texture = manager.get_asset(id, AssetType::Texture2D);
        manager.update();

        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();
        let _again = manager.get_asset_with_callback(id, AssetType::Texture2D, move |asset| {
            assert!(asset.is_loaded());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_waits_for_inflight_load() {
        let (manager, id) = manager_with(texture_registry(Arc::new(AtomicU32::new(0))));
        let fired = Arc::new(AtomicU32::new(0));
        let counter = fired.clone();

        let _first = manager.get_asset(id, AssetType::Texture2D);
        let _second = manager.get_asset_with_callback(id, AssetType::Texture2D, move |asset| {
            assert!(asset.is_loaded());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(manager.loader().pending(), 2);
        manager.update();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reload_swaps_payload() {
        let calls = Arc::new(AtomicU32::new(0));
        let (manager, id) = manager_with(texture_registry(calls.clone()));

        let texture = manager.get::<Texture2D>(id);
        manager.update();
        assert_eq!(texture.read().width, 1);

        let handle = texture.clone().into_dyn();
        assert!(manager.request_reload(&handle));
        assert_eq!(texture.state(), AssetState::Loading);
        assert_eq!(manager.live_assets(), 2);

        manager.update();
        assert_eq!(texture.state(), AssetState::Loaded);
        assert_eq!(texture.read().width, 2);
        assert_eq!(texture.id(), id);
        assert_eq!(manager.live_assets(), 1);
    }

    #[test]
    fn test_reload_requires_loaded_asset() {
        let (manager, id) = manager_with(texture_registry(Arc::new(AtomicU32::new(0))));
        let texture = manager.get_asset(id, AssetType::Texture2D);
        assert!(!manager.request_reload(&texture));
        assert!(!manager.request_reload(&AssetRef::null()));
    }

    #[test]
    fn test_released_asset_unloads_on_update() {
        let (manager, id) = manager_with(texture_registry(Arc::new(AtomicU32::new(0))));
        let texture = manager.get_asset(id, AssetType::Texture2D);
        manager.update();
        drop(texture);
        assert!(manager.contains(id));
        assert_eq!(manager.state_of(id), Some(AssetState::Unloading));

        manager.update();
        assert!(!manager.contains(id));
        assert_eq!(manager.stats().unloaded, 1);
    }

    #[test]
    fn test_handles_outlive_manager() {
        let (manager, id) = manager_with(texture_registry(Arc::new(AtomicU32::new(0))));
        let texture = manager.get::<Texture2D>(id);
        manager.update();
        drop(manager);
        assert_eq!(texture.count(), 1);
        assert_eq!(texture.read().width, 1);
    }

    #[test]
    fn test_settings_from_json() {
        let settings =
            AssetManagerSettings::from_json_str(r#"{"assetRoot": "data", "loader": {"maxRetries": 8}}"#)
                .unwrap();
        assert_eq!(settings.asset_root, PathBuf::from("data"));
        assert_eq!(settings.loader.max_retries, Some(8));

        let settings = AssetManagerSettings::from_json_str("{}").unwrap();
        assert_eq!(settings, AssetManagerSettings::default());
    }
}
