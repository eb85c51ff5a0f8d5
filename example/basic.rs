//! Example: Basic asset loading
//!
//! Writes a small project to a temporary directory, imports its metadata bank
//! and loads a texture whose importer waits one batch for its source bytes.

use archetype_assets::assets::{
    Asset, AssetLoadResult, AssetManager, AssetManagerSettings, AssetTypeRegistry,
    CsvBankImporter, LoadContext, Texture2D, TextureFormat,
};
use archetype_assets::gpu::{BufferUsage, MockUploadDevice};
use archetype_assets::Ulid;
use std::sync::Arc;

fn import_texture(asset: &dyn Asset, ctx: &mut LoadContext<'_, '_>) -> AssetLoadResult {
    let Some(texture) = asset.downcast_ref::<Texture2D>() else {
        return AssetLoadResult::Failure;
    };
    // pretend decoding takes a frame
    if !ctx.is_retry() {
        return AssetLoadResult::TryAgain;
    }
    let pixels = match std::fs::read(&ctx.metadata().path) {
        Ok(pixels) => pixels,
        Err(e) => {
            tracing::error!("Cannot read {}: {e}", ctx.metadata().path.display());
            return AssetLoadResult::Failure;
        }
    };
    let Ok(buffer) = ctx.scope().upload(BufferUsage::Texture, &pixels) else {
        return AssetLoadResult::Failure;
    };
    let mut data = texture.write();
    data.width = 4;
    data.height = (pixels.len() / 16) as u32;
    data.format = TextureFormat::Rgba8Unorm;
    data.gpu = Some(buffer);
    AssetLoadResult::Success
}

fn main() -> archetype_assets::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let root = std::env::temp_dir().join(format!("archetype_assets_basic_{}", Ulid::generate()));
    std::fs::create_dir_all(&root)?;
    let id = Ulid::generate();
    std::fs::write(root.join("checker.rgba"), vec![255u8; 4 * 4 * 4])?;
    std::fs::write(
        root.join("metadata.csv"),
        format!("id,type,name,path\n{id},texture2d,checker,checker.rgba\n"),
    )?;

    let mut registry = AssetTypeRegistry::new();
    registry.register::<Texture2D>(import_texture);
    let device = MockUploadDevice::new();
    let manager = AssetManager::new(
        AssetManagerSettings::new(&root),
        registry,
        Arc::new(device.clone()),
    );
    manager.import_metadata_bank(&CsvBankImporter::new())?;

    let texture = manager.get::<Texture2D>(id);
    let mut frame = 0;
    while texture.is_loading() {
        manager.update();
        frame += 1;
        println!("Frame {frame}: texture is {:?}", texture.state());
    }

    {
        let data = texture.read();
        println!(
            "Loaded {}x{} texture ({} bytes on device)",
            data.width,
            data.height,
            data.gpu.as_ref().map_or(0, |gpu| gpu.size)
        );
    }
    println!("Upload stats: {:?}", device.stats());

    drop(texture);
    manager.update();
    println!("Live assets after release: {}", manager.live_assets());
    println!("Cache stats: {:?}", manager.stats());

    std::fs::remove_dir_all(&root)?;
    Ok(())
}
