use crate::assets::AssetManager;
use crate::hot_reload::AssetWatcher;
use crate::scene::{SceneLoader, SceneWorld};
use crate::ulid::Ulid;
use std::time::Duration;

/// Main application entry point: owns the asset manager, the live world and
/// the scene loader, and advances them once per frame.
pub struct App<W: SceneWorld> {
    pub world: W,
    assets: AssetManager,
    scenes: SceneLoader<W>,
    watcher: Option<AssetWatcher>,
    frame: u64,
}

impl<W: SceneWorld> App<W> {
    /// Create new application
    pub fn new(assets: AssetManager) -> Self {
        let scenes = SceneLoader::new(&assets);
        Self {
            world: W::default(),
            assets,
            scenes,
            watcher: None,
            frame: 0,
        }
    }

    /// Enable hot-reload of watched assets
    pub fn with_watcher(mut self, watcher: AssetWatcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn assets(&self) -> &AssetManager {
        &self.assets
    }

    pub fn scenes(&self) -> &SceneLoader<W> {
        &self.scenes
    }

    pub fn watcher_mut(&mut self) -> Option<&mut AssetWatcher> {
        self.watcher.as_mut()
    }

    /// Switch scene on a later frame
    pub fn request_scene(&mut self, id: Ulid) {
        self.scenes.request_switch(id);
    }

    /// Number of frames run so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Run the application (one frame)
    pub fn update(&mut self) {
        let _span = tracing::trace_span!("frame", frame = self.frame).entered();
        self.assets.update();
        self.scenes.update(&mut self.world, &self.assets);
        if let Some(watcher) = &mut self.watcher {
            watcher.check(&self.assets);
        }
        self.frame += 1;
    }

    /// Run frames until `done` returns true or `max_frames` ran.
    /// Returns whether `done` was reached.
    pub fn run_until(
        &mut self,
        max_frames: u64,
        frame_time: Duration,
        mut done: impl FnMut(&Self) -> bool,
    ) -> bool {
        for _ in 0..max_frames {
            self.update();
            if done(self) {
                return true;
            }
            if !frame_time.is_zero() {
                std::thread::sleep(frame_time);
            }
        }
        false
    }
}

impl<W: SceneWorld> Drop for App<W> {
    fn drop(&mut self) {
        self.scenes.detach(&self.assets);
    }
}
