use archetype_assets::assets::{
    Asset, AssetLoadResult, AssetManager, AssetManagerSettings, AssetMetadata, AssetType,
    AssetTypeRegistry, LoadContext, Texture2D,
};
use archetype_assets::gpu::MockUploadDevice;
use archetype_assets::Ulid;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::path::PathBuf;
use std::sync::Arc;

fn create_manager(count: usize) -> (AssetManager, Vec<Ulid>) {
    let mut registry = AssetTypeRegistry::new();
    registry.register::<Texture2D>(|_: &dyn Asset, _: &mut LoadContext<'_, '_>| {
        AssetLoadResult::Success
    });
    let manager = AssetManager::new(
        AssetManagerSettings::default(),
        registry,
        Arc::new(MockUploadDevice::new()),
    );
    let ids: Vec<Ulid> = (0..count).map(|_| Ulid::generate()).collect();
    for (i, id) in ids.iter().enumerate() {
        manager.add_metadata(AssetMetadata {
            id: *id,
            name: format!("texture_{i}"),
            asset_type: AssetType::Texture2D,
            path: PathBuf::from(format!("texture_{i}.png")),
            offset: 0,
        });
    }
    (manager, ids)
}

fn bench_load_100_assets(c: &mut Criterion) {
    c.bench_function("load_and_unload_100_assets", |b| {
        let (manager, ids) = create_manager(100);
        b.iter(|| {
            let handles: Vec<_> = ids
                .iter()
                .map(|id| manager.get_asset(*id, AssetType::Texture2D))
                .collect();
            manager.update();
            drop(black_box(handles));
            manager.update();
        });
    });
}

fn bench_cache_hit(c: &mut Criterion) {
    let (manager, ids) = create_manager(1000);
    // Keep everything resident
    let _resident: Vec<_> = ids
        .iter()
        .map(|id| manager.get_asset(*id, AssetType::Texture2D))
        .collect();
    manager.update();

    c.bench_function("asset_cache_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            let handle = manager.get::<Texture2D>(ids[i % ids.len()]);
            i += 1;
            black_box(handle);
        });
    });
}

fn bench_concurrent_get(c: &mut Criterion) {
    let (manager, ids) = create_manager(256);
    let _resident: Vec<_> = ids
        .iter()
        .map(|id| manager.get_asset(*id, AssetType::Texture2D))
        .collect();
    manager.update();

    c.bench_function("asset_concurrent_get_4_threads", |b| {
        b.iter(|| {
            std::thread::scope(|scope| {
                for t in 0..4 {
                    let manager = &manager;
                    let ids = &ids;
                    scope.spawn(move || {
                        for id in ids.iter().skip(t).step_by(4) {
                            black_box(manager.get_asset(*id, AssetType::Texture2D));
                        }
                    });
                }
            });
        });
    });
}

fn bench_handle_clone(c: &mut Criterion) {
    let (manager, ids) = create_manager(1);
    let handle = manager.get_asset(ids[0], AssetType::Texture2D);
    manager.update();

    c.bench_function("asset_handle_clone_drop", |b| {
        b.iter(|| black_box(handle.clone()));
    });
}

criterion_group!(
    benches,
    bench_load_100_assets,
    bench_cache_hit,
    bench_concurrent_get,
    bench_handle_clone
);
criterion_main!(benches);
