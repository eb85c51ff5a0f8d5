// Asset Lifecycle Module
//
// Provides the asset core:
// - Identity-keyed cache with at most one instance per id
// - Queued loading with retry on unready dependencies
// - Intrusive handles with deferred destruction

pub mod cache;
pub mod json;
pub mod loader;
pub mod manager;
pub mod material;
pub mod metadata;
pub mod registry;
pub mod types;

pub use cache::{AssetCache, CacheStats, UnloadQueue};
pub use loader::{
    AssetImporter, AssetLoadRequest, AssetLoader, BatchCallbackId, LoadCallback, LoadContext,
    LoaderSettings,
};
pub use manager::{AssetManager, AssetManagerSettings};
pub use material::{MaterialImporter, MaterialInstanceImporter};
pub use metadata::{AssetMetadata, BankImporter, CsvBankImporter, MetadataBank};
pub use registry::{AssetConstructor, AssetTypeInfo, AssetTypeRegistry};
pub use types::*;

use crate::retain::{RetainPtr, RetainTraits};
use crate::ulid::Ulid;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Closed set of asset kinds known to the registry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetType {
    #[serde(rename = "texture2d")]
    Texture2D,
    VertexShader,
    FragmentShader,
    Material,
    MaterialInstance,
    Mesh,
    FontAtlas,
    Scene,
}

impl AssetType {
    /// Number of asset types
    pub const COUNT: usize = 8;

    pub const ALL: [AssetType; Self::COUNT] = [
        AssetType::Texture2D,
        AssetType::VertexShader,
        AssetType::FragmentShader,
        AssetType::Material,
        AssetType::MaterialInstance,
        AssetType::Mesh,
        AssetType::FontAtlas,
        AssetType::Scene,
    ];

    /// Tag used in metadata tables
    pub fn name(self) -> &'static str {
        match self {
            AssetType::Texture2D => "texture2d",
            AssetType::VertexShader => "vertexShader",
            AssetType::FragmentShader => "fragmentShader",
            AssetType::Material => "material",
            AssetType::MaterialInstance => "materialInstance",
            AssetType::Mesh => "mesh",
            AssetType::FontAtlas => "fontAtlas",
            AssetType::Scene => "scene",
        }
    }

    /// Parse a metadata tag
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.name() == name)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Load state of an asset
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetState {
    Invalid = 0,
    /// Queued or waiting on a dependency
    Loading = 1,
    Loaded = 2,
    /// Last handle dropped, destroyed on the next drain
    Unloading = 3,
    LoadingFailed = 4,
}

impl AssetState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => AssetState::Loading,
            2 => AssetState::Loaded,
            3 => AssetState::Unloading,
            4 => AssetState::LoadingFailed,
            _ => AssetState::Invalid,
        }
    }

    pub fn is_loading(self) -> bool {
        self == AssetState::Loading
    }
}

/// Outcome of one import attempt
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetLoadResult {
    /// Asset is ready
    Success,
    /// Asset cannot be loaded, do not retry
    Failure,
    /// A dependency is not ready yet, retry in a later batch
    TryAgain,
}

/// Header shared by every asset: identity, state and intrusive count
pub struct AssetBase {
    id: Ulid,
    state: AtomicU8,
    /// State to restore when an unload request is cancelled
    resume_state: AtomicU8,
    ref_count: AtomicU32,
    /// Bumped for each unload request, only the latest one may destroy
    unload_generation: AtomicU32,
    owner: OnceLock<Weak<UnloadQueue>>,
}

impl AssetBase {
    pub fn new(id: Ulid) -> Self {
        Self {
            id,
            state: AtomicU8::new(AssetState::Invalid as u8),
            resume_state: AtomicU8::new(AssetState::Invalid as u8),
            ref_count: AtomicU32::new(0),
            unload_generation: AtomicU32::new(0),
            owner: OnceLock::new(),
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn state(&self) -> AssetState {
        AssetState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: AssetState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    pub(crate) fn unload_generation(&self) -> u32 {
        self.unload_generation.load(Ordering::Acquire)
    }

    /// Mark for unload. Caller holds the unload queue lock.
    pub(crate) fn begin_unload(&self) -> u32 {
        let previous = self.state.swap(AssetState::Unloading as u8, Ordering::AcqRel);
        if previous != AssetState::Unloading as u8 {
            self.resume_state.store(previous, Ordering::Release);
        }
        self.unload_generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Cancel a pending unload. Caller holds the unload queue lock.
    pub(crate) fn cancel_unload(&self) {
        let resume = self.resume_state.load(Ordering::Acquire);
        let _ = self.state.compare_exchange(
            AssetState::Unloading as u8,
            resume,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub(crate) fn counter(&self) -> &AtomicU32 {
        &self.ref_count
    }

    pub(crate) fn set_owner(&self, queue: &Arc<UnloadQueue>) {
        let _ = self.owner.set(Arc::downgrade(queue));
    }

    fn owner(&self) -> Option<Arc<UnloadQueue>> {
        self.owner.get().and_then(Weak::upgrade)
    }
}

impl fmt::Debug for AssetBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetBase")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}

/// Trait implemented by every cached asset
pub trait Asset: Any + Send + Sync {
    /// Identity, state and reference count
    fn base(&self) -> &AssetBase;

    fn asset_type(&self) -> AssetType;

    fn as_any(&self) -> &dyn Any;

    /// Exchange loaded payloads with another instance of the same concrete type.
    ///
    /// Used by reload to move freshly imported data into the live instance.
    fn swap_payload(&self, _other: &dyn Asset) -> bool {
        false
    }

    /// Get approximate memory size in bytes
    fn memory_size(&self) -> usize {
        std::mem::size_of_val(self)
    }

    fn id(&self) -> Ulid {
        self.base().id()
    }

    fn state(&self) -> AssetState {
        self.base().state()
    }

    fn is_loaded(&self) -> bool {
        self.state() == AssetState::Loaded
    }

    fn is_loading(&self) -> bool {
        self.state().is_loading()
    }
}

/// Asset with a statically known type tag
pub trait TypedAsset: Asset + Sized {
    const ASSET_TYPE: AssetType;

    /// Construct an empty instance for `id`
    fn create(id: Ulid) -> Self;
}

impl dyn Asset {
    pub fn downcast_ref<A: Asset>(&self) -> Option<&A> {
        self.as_any().downcast_ref::<A>()
    }

    pub fn is<A: Asset>(&self) -> bool {
        self.as_any().is::<A>()
    }
}

impl fmt::Debug for dyn Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("type", &self.asset_type())
            .field("base", self.base())
            .finish()
    }
}

/// Retain policy for assets.
///
/// The last reference never frees an asset owned by a cache: it is queued for
/// unload instead and the cache frees it on its next update. Assets without a
/// live cache are freed by their last reference.
pub struct AssetRetainTraits;

impl<T: ?Sized + Asset> RetainTraits<T> for AssetRetainTraits {
    fn increment(value: &T) {
        value.base().counter().fetch_add(1, Ordering::Relaxed);
    }

    unsafe fn decrement(ptr: NonNull<T>) {
        let base = ptr.as_ref().base();
        let counter = base.counter();
        let mut current = counter.load(Ordering::Acquire);
        loop {
            debug_assert!(current > 0, "asset {} reference count underflow", base.id());
            if current <= 1 {
                break;
            }
            match counter.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }

        if let Some(queue) = base.owner() {
            if queue.release(base) {
                return;
            }
        }

        if counter.fetch_sub(1, Ordering::AcqRel) == 1 {
            tracing::trace!("Destroying unowned asset {}", base.id());
            drop(Box::from_raw(ptr.as_ptr()));
        }
    }

    fn count(value: &T) -> u32 {
        value.base().ref_count()
    }
}

/// Shared handle to an asset, untyped by default
pub type AssetRef<A = dyn Asset> = RetainPtr<A, AssetRetainTraits>;

impl AssetRef {
    /// Convert into a typed handle if the concrete type matches
    pub fn downcast<A: Asset>(self) -> std::result::Result<AssetRef<A>, AssetRef> {
        let matches = self.get().is_some_and(|asset| asset.is::<A>());
        if !matches {
            return Err(self);
        }
        match self.release() {
            // Safety: the type was checked above and the released reference moves over
            Some(ptr) => Ok(unsafe { AssetRef::<A>::adopt(ptr.cast::<A>()) }),
            None => Err(AssetRef::null()),
        }
    }

    /// Take ownership of a standalone asset not managed by any cache
    pub fn from_box(asset: Box<dyn Asset>) -> Self {
        asset.base().counter().store(1, Ordering::Release);
        let ptr = NonNull::from(Box::leak(asset));
        // Safety: the count was set to the single reference handed over here
        unsafe { AssetRef::adopt(ptr) }
    }
}

impl<A: Asset> AssetRef<A> {
    /// Forget the concrete type
    pub fn into_dyn(self) -> AssetRef {
        match self.release() {
            Some(ptr) => {
                let ptr: NonNull<dyn Asset> = ptr;
                // Safety: the released reference moves over unchanged
                unsafe { AssetRef::adopt(ptr) }
            }
            None => AssetRef::null(),
        }
    }
}
