//! Scene switching
//!
//! A switch request fetches the scene asset and waits for the loader to report
//! a finished batch. The scene is then instantiated into a scratch world which
//! is swapped into the live world in one step, from the thread that owns it.

use crate::assets::json;
use crate::assets::{
    Asset, AssetImporter, AssetLoadResult, AssetManager, AssetRef, BatchCallbackId, LoadContext,
    Scene,
};
use crate::ulid::Ulid;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// World a scene is instantiated into
pub trait SceneWorld: Default {
    /// Instantiate a loaded scene
    fn instantiate(&mut self, scene: &AssetRef<Scene>);

    /// Remove everything
    fn clear(&mut self);
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneLoadState {
    Default = 0,
    Loading = 1,
    Finished = 2,
}

impl SceneLoadState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SceneLoadState::Loading,
            2 => SceneLoadState::Finished,
            _ => SceneLoadState::Default,
        }
    }
}

/// Drives scene switches requested with [`SceneLoader::request_switch`]
pub struct SceneLoader<W: SceneWorld> {
    state: Arc<AtomicU8>,
    callback: BatchCallbackId,
    requests: Vec<Ulid>,
    current: AssetRef<Scene>,
    pending: AssetRef<Scene>,
    scratch: W,
    finished: bool,
}

impl<W: SceneWorld> SceneLoader<W> {
    /// Create a loader notified by `manager`'s batches. The notification
    /// stays registered until [`SceneLoader::detach`] is called with the same
    /// manager.
    pub fn new(manager: &AssetManager) -> Self {
        let state = Arc::new(AtomicU8::new(SceneLoadState::Default as u8));
        let flag = state.clone();
        let callback = manager.loader().register_batch_callback(move || {
            let _ = flag.compare_exchange(
                SceneLoadState::Loading as u8,
                SceneLoadState::Finished as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        });
        Self {
            state,
            callback,
            requests: Vec::new(),
            current: AssetRef::null(),
            pending: AssetRef::null(),
            scratch: W::default(),
            finished: false,
        }
    }

    /// Stop listening to `manager`'s batches
    pub fn detach(&self, manager: &AssetManager) {
        manager.loader().unregister_batch_callback(self.callback);
    }

    /// Ask for a switch on a later update. Only the first request queued
    /// before an update is honoured.
    pub fn request_switch(&mut self, id: Ulid) {
        self.requests.push(id);
    }

    pub fn state(&self) -> SceneLoadState {
        SceneLoadState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SceneLoadState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Scene currently instantiated in the live world
    pub fn current(&self) -> &AssetRef<Scene> {
        &self.current
    }

    /// True during the update following a completed switch
    pub fn scene_finished(&self) -> bool {
        self.finished
    }

    pub fn update(&mut self, world: &mut W, manager: &AssetManager) {
        self.finished = false;

        if self.state() == SceneLoadState::Finished {
            self.finish_loading(world);
        }
        if self.state() == SceneLoadState::Loading {
            return;
        }

        if self.requests.is_empty() {
            return;
        }
        let request = self.requests[0];
        self.requests.clear();
        if request.is_nil() {
            tracing::error!("Received scene switch request with invalid scene id");
            return;
        }
        self.start_loading(world, manager, request);
    }

    fn start_loading(&mut self, world: &mut W, manager: &AssetManager, id: Ulid) {
        let scene = if !self.current.is_null() && self.current.id() == id {
            let handle = self.current.clone().into_dyn();
            if !manager.request_reload(&handle) {
                tracing::error!("Cannot reload scene {id}");
                return;
            }
            self.current.clone()
        } else {
            let scene = manager.get::<Scene>(id);
            if scene.is_null() {
                tracing::error!("Cannot switch to scene {id}: no such scene");
                return;
            }
            scene
        };

        tracing::info!("Switching to scene {id}");
        let loaded = scene.is_loaded();
        self.pending = scene;
        if loaded {
            self.finish_loading(world);
        } else {
            self.set_state(SceneLoadState::Loading);
        }
    }

    fn finish_loading(&mut self, world: &mut W) {
        if self.pending.is_loading() {
            // another batch finished first
            self.set_state(SceneLoadState::Loading);
            return;
        }
        self.set_state(SceneLoadState::Default);

        let scene = std::mem::take(&mut self.pending);
        if !scene.is_loaded() {
            tracing::error!("Scene {} failed to load, switch abandoned", scene.id());
            return;
        }

        tracing::info!("Scene {} loaded successfully", scene.id());
        self.scratch.instantiate(&scene);
        std::mem::swap(world, &mut self.scratch);
        self.scratch.clear();
        self.current = scene;
        self.finished = true;
    }
}

/// Imports JSON scenes, keeping the assets listed under `"assets"` alive.
///
/// Waits for those assets to leave the loading states; assets that failed are
/// logged and do not fail the scene.
#[derive(Clone, Copy, Debug, Default)]
pub struct SceneImporter;

impl AssetImporter for SceneImporter {
    fn import(&self, asset: &dyn Asset, ctx: &mut LoadContext<'_, '_>) -> AssetLoadResult {
        let Some(scene) = asset.downcast_ref::<Scene>() else {
            return AssetLoadResult::Failure;
        };

        if !ctx.is_retry() {
            let document = match json::read_document(ctx.metadata()) {
                Ok(document) => document,
                Err(e) => {
                    tracing::error!("Failed to read scene {}: {e}", ctx.metadata().name);
                    return AssetLoadResult::Failure;
                }
            };
            let manager = ctx.manager();
            let dependencies = json::asset_ids(&document, "assets")
                .into_iter()
                .filter_map(|id| {
                    let asset_type = manager.metadata(id)?.asset_type;
                    let dependency = manager.get_asset(id, asset_type);
                    (!dependency.is_null()).then_some(dependency)
                })
                .collect();
            let mut data = scene.write();
            data.document = document;
            data.dependencies = dependencies;
        }

        let data = scene.read();
        if data.dependencies.iter().any(|dependency| dependency.is_loading()) {
            return AssetLoadResult::TryAgain;
        }
        for dependency in data.dependencies.iter().filter(|d| !d.is_loaded()) {
            tracing::warn!(
                "Scene {} dependency {} is in state {:?}",
                ctx.metadata().name,
                dependency.id(),
                dependency.state()
            );
        }
        AssetLoadResult::Success
    }
}
