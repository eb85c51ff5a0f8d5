//! Example: Switching scenes
//!
//! Two scenes share a font atlas; switching from one to the other swaps the
//! world in one frame and frees the scene left behind.

use archetype_assets::assets::{
    Asset, AssetLoadResult, AssetManager, AssetManagerSettings, AssetRef, AssetTypeRegistry,
    CsvBankImporter, FontAtlas, LoadContext, Scene,
};
use archetype_assets::gpu::MockUploadDevice;
use archetype_assets::{App, SceneImporter, SceneWorld, Ulid};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct World {
    name: String,
    dependencies: usize,
}

impl SceneWorld for World {
    fn instantiate(&mut self, scene: &AssetRef<Scene>) {
        let data = scene.read();
        self.name = data.document["name"].as_str().unwrap_or("unnamed").to_string();
        self.dependencies = data.dependencies.len();
    }

    fn clear(&mut self) {
        self.name.clear();
        self.dependencies = 0;
    }
}

fn main() -> archetype_assets::Result<()> {
    tracing_subscriber::fmt().init();

    let root = std::env::temp_dir().join(format!("archetype_assets_scenes_{}", Ulid::generate()));
    std::fs::create_dir_all(&root)?;
    let (menu, level, font) = (Ulid::generate(), Ulid::generate(), Ulid::generate());
    std::fs::write(
        root.join("menu.json"),
        format!(r#"{{"name":"Main menu","assets":["{font}"]}}"#),
    )?;
    std::fs::write(
        root.join("level.json"),
        format!(r#"{{"name":"Level 1","assets":["{font}"]}}"#),
    )?;
    std::fs::write(
        root.join("metadata.csv"),
        format!(
            "id,type,name,path\n{menu},scene,menu,menu.json\n{level},scene,level,level.json\n{font},fontAtlas,ui,ui.font\n"
        ),
    )?;

    let mut registry = AssetTypeRegistry::new();
    registry
        .register::<Scene>(SceneImporter)
        .register::<FontAtlas>(|_: &dyn Asset, _: &mut LoadContext<'_, '_>| {
            AssetLoadResult::Success
        });
    let manager = AssetManager::new(
        AssetManagerSettings::new(&root),
        registry,
        Arc::new(MockUploadDevice::new()),
    );
    manager.import_metadata_bank(&CsvBankImporter::new())?;

    let mut app = App::<World>::new(manager);
    for scene in [menu, level] {
        app.request_scene(scene);
        let switched = app.run_until(10, Duration::from_millis(16), |app| {
            app.scenes().scene_finished()
        });
        println!(
            "Frame {}: switched={switched}, world={:?}, live assets={}",
            app.frame(),
            app.world,
            app.assets().live_assets()
        );
    }

    app.update();
    println!("After cleanup: live assets={}", app.assets().live_assets());

    drop(app);
    std::fs::remove_dir_all(&root)?;
    Ok(())
}
