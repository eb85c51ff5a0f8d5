// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Archetype Assets - Asset lifecycle for a real-time engine
//!
//! ULID-keyed asset cache with shared intrusive handles, batched loading with
//! retry on unready dependencies, deferred destruction and scene switching.

pub mod app;
pub mod assets;
pub mod error;
pub mod gpu;
pub mod hot_reload;
#[cfg(feature = "profiling")]
pub mod profiling;
pub mod retain;
pub mod scene;
pub mod thread_pool;
pub mod ulid;

pub use app::App;
pub use assets::{
    Asset, AssetBase, AssetLoadResult, AssetManager, AssetManagerSettings, AssetMetadata,
    AssetRef, AssetState, AssetType, AssetTypeRegistry, TypedAsset,
};
pub use error::{AssetError, Result};
pub use gpu::{MockUploadDevice, UploadDevice, UploadScope};
pub use hot_reload::AssetWatcher;
pub use retain::{RetainMode, RetainPtr, RetainTraits};
pub use scene::{SceneImporter, SceneLoadState, SceneLoader, SceneWorld};
pub use thread_pool::{TaskHandle, WorkerPool};
pub use ulid::Ulid;
