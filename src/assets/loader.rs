use crate::assets::{Asset, AssetLoadResult, AssetManager, AssetMetadata, AssetRef, AssetState};
use crate::gpu::{UploadDevice, UploadScope};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Context provided to asset importers
pub struct LoadContext<'a, 's> {
    metadata: &'a AssetMetadata,
    scope: &'a mut UploadScope<'s>,
    manager: &'a AssetManager,
    attempt: u32,
}

impl<'a, 's> LoadContext<'a, 's> {
    pub fn metadata(&self) -> &AssetMetadata {
        self.metadata
    }

    /// Upload scope shared by every request of the current batch
    pub fn scope(&mut self) -> &mut UploadScope<'s> {
        self.scope
    }

    /// Manager used to resolve sub-assets
    pub fn manager(&self) -> &AssetManager {
        self.manager
    }

    /// Zero-based attempt number of this request
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether a previous attempt returned [`AssetLoadResult::TryAgain`]
    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }
}

/// Fills an asset from its metadata.
///
/// Called by the loader inside an upload scope. May resolve dependencies
/// through [`LoadContext::manager`] and return
/// [`AssetLoadResult::TryAgain`] while they are loading.
pub trait AssetImporter: Send + Sync {
    fn import(&self, asset: &dyn Asset, ctx: &mut LoadContext<'_, '_>) -> AssetLoadResult;
}

impl<F> AssetImporter for F
where
    F: Fn(&dyn Asset, &mut LoadContext<'_, '_>) -> AssetLoadResult + Send + Sync,
{
    fn import(&self, asset: &dyn Asset, ctx: &mut LoadContext<'_, '_>) -> AssetLoadResult {
        self(asset, ctx)
    }
}

/// Called once when a request finishes, successfully or not. Check the
/// asset state before using it.
pub type LoadCallback = Box<dyn FnOnce(&dyn Asset) + Send>;

type BatchCallback = Arc<dyn Fn() + Send + Sync>;

/// Token returned by [`AssetLoader::register_batch_callback`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BatchCallbackId(u64);

struct ImportJob {
    importer: Arc<dyn AssetImporter>,
    metadata: Arc<AssetMetadata>,
}

/// One queued load job
pub struct AssetLoadRequest {
    asset: AssetRef,
    job: Option<ImportJob>,
    callback: Option<LoadCallback>,
    attempt: u32,
}

impl AssetLoadRequest {
    /// Import `asset` from `metadata`
    pub fn new(
        asset: AssetRef,
        importer: Arc<dyn AssetImporter>,
        metadata: Arc<AssetMetadata>,
    ) -> Self {
        Self {
            asset,
            job: Some(ImportJob { importer, metadata }),
            callback: None,
            attempt: 0,
        }
    }

    /// Wait for an asset loaded by another request, then call `callback`
    pub fn notify(asset: AssetRef, callback: LoadCallback) -> Self {
        Self {
            asset,
            job: None,
            callback: Some(callback),
            attempt: 0,
        }
    }

    pub fn with_callback(mut self, callback: impl FnOnce(&dyn Asset) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn asset(&self) -> &AssetRef {
        &self.asset
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl fmt::Debug for AssetLoadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetLoadRequest")
            .field("asset", &self.asset.get().map(|asset| asset.id()))
            .field("import", &self.job.is_some())
            .field("callback", &self.callback.is_some())
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Loader configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderSettings {
    /// Give up on a request after this many `TryAgain` results.
    /// `None` retries until the dependency resolves.
    pub max_retries: Option<u32>,
}

enum Outcome {
    Done,
    Requeue,
}

/// FIFO queue of load requests, processed in batches
pub struct AssetLoader {
    queue: Mutex<VecDeque<AssetLoadRequest>>,
    batch_callbacks: RwLock<SmallVec<[(BatchCallbackId, BatchCallback); 4]>>,
    next_callback: AtomicU64,
    device: Arc<dyn UploadDevice>,
    settings: LoaderSettings,
    batches: AtomicU64,
}

impl AssetLoader {
    pub fn new(device: Arc<dyn UploadDevice>, settings: LoaderSettings) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            batch_callbacks: RwLock::new(SmallVec::new()),
            next_callback: AtomicU64::new(0),
            device,
            settings,
            batches: AtomicU64::new(0),
        }
    }

    /// Append a request. Never blocks on a running batch.
    pub fn add_request(&self, request: AssetLoadRequest) {
        if let Some(asset) = request.asset.get() {
            tracing::trace!("Queued load request for asset {}", asset.id());
        }
        self.queue.lock().push_back(request);
    }

    /// Call `callback` after every batch that processed at least one request,
    /// until it is unregistered or the loader is dropped.
    pub fn register_batch_callback(
        &self,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> BatchCallbackId {
        let id = BatchCallbackId(self.next_callback.fetch_add(1, Ordering::Relaxed));
        self.batch_callbacks.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a batch callback. Returns false if it was already removed.
    pub fn unregister_batch_callback(&self, id: BatchCallbackId) -> bool {
        let mut callbacks = self.batch_callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(registered, _)| *registered != id);
        callbacks.len() != before
    }

    /// Run one batch: the requests queued when the call starts, inside a single
    /// upload scope. Returns the number of requests processed.
    pub fn process_requests(&self, manager: &AssetManager) -> usize {
        let batch_len = self.queue.lock().len();
        if batch_len == 0 {
            return 0;
        }

        let _span = tracing::info_span!("asset_batch", requests = batch_len).entered();
        let mut scope = match UploadScope::begin(self.device.as_ref()) {
            Ok(scope) => scope,
            Err(e) => {
                tracing::error!("Failed to open upload scope, postponing {batch_len} requests: {e}");
                return 0;
            }
        };

        let mut processed = 0;
        for _ in 0..batch_len {
            let Some(mut request) = self.queue.lock().pop_front() else {
                break;
            };
            processed += 1;
            if let Outcome::Requeue = self.process_one(&mut request, &mut scope, manager) {
                self.queue.lock().push_back(request);
            }
        }

        if let Err(e) = scope.finish() {
            tracing::error!("Failed to submit asset uploads: {e}");
        }
        self.batches.fetch_add(1, Ordering::Relaxed);

        let callbacks: SmallVec<[BatchCallback; 4]> = self
            .batch_callbacks
            .read()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in callbacks {
            callback();
        }
        processed
    }

    fn process_one(
        &self,
        request: &mut AssetLoadRequest,
        scope: &mut UploadScope<'_>,
        manager: &AssetManager,
    ) -> Outcome {
        let Some(asset) = request.asset.get() else {
            return Outcome::Done;
        };

        let Some(job) = &request.job else {
            // waiting on another request for the same asset
            if asset.is_loading() {
                return Outcome::Requeue;
            }
            complete(asset, &mut request.callback);
            return Outcome::Done;
        };

        let mut ctx = LoadContext {
            metadata: &job.metadata,
            scope,
            manager,
            attempt: request.attempt,
        };
        match job.importer.import(asset, &mut ctx) {
            AssetLoadResult::Success => {
                tracing::debug!("Loaded asset {} ({})", job.metadata.name, asset.id());
                asset.base().set_state(AssetState::Loaded);
                complete(asset, &mut request.callback);
                Outcome::Done
            }
            AssetLoadResult::Failure => {
                tracing::error!(
                    "Failed to load asset {} ({}) from {}",
                    job.metadata.name,
                    asset.id(),
                    job.metadata.path.display()
                );
                fail(asset, &mut request.callback);
                Outcome::Done
            }
            AssetLoadResult::TryAgain => {
                request.attempt += 1;
                match self.settings.max_retries {
                    Some(max) if request.attempt > max => {
                        tracing::error!(
                            "Giving up on asset {} ({}) after {max} retries",
                            job.metadata.name,
                            asset.id()
                        );
                        fail(asset, &mut request.callback);
                        Outcome::Done
                    }
                    _ => {
                        tracing::trace!("Asset {} not ready, retrying next batch", asset.id());
                        Outcome::Requeue
                    }
                }
            }
        }
    }

    /// Drop every pending request
    pub fn clear(&self) {
        let pending = std::mem::take(&mut *self.queue.lock());
        if !pending.is_empty() {
            tracing::debug!("Dropping {} pending load requests", pending.len());
        }
        drop(pending);
    }

    /// Number of queued requests
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Number of non-empty batches processed so far
    pub fn batches_run(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }

    pub fn device(&self) -> &dyn UploadDevice {
        self.device.as_ref()
    }
}

fn complete(asset: &dyn Asset, callback: &mut Option<LoadCallback>) {
    if let Some(callback) = callback.take() {
        callback(asset);
    }
}

fn fail(asset: &dyn Asset, callback: &mut Option<LoadCallback>) {
    asset.base().set_state(AssetState::LoadingFailed);
    complete(asset, callback);
}

impl fmt::Debug for AssetLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetLoader")
            .field("pending", &self.pending())
            .field("batches", &self.batches_run())
            .field("settings", &self.settings)
            .finish()
    }
}
