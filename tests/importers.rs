use archetype_assets::assets::{
    Asset, AssetLoadResult, AssetManager, AssetManagerSettings, AssetState, AssetType,
    AssetTypeRegistry, CsvBankImporter, FragmentShader, LoadContext, Material, MaterialImporter,
    MaterialInstance, MaterialInstanceImporter, Scene, Texture2D, VertexShader,
};
use archetype_assets::gpu::{MockUploadDevice, UploadDevice};
use archetype_assets::{SceneImporter, Ulid};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

struct Project {
    dir: TempDir,
    rows: Vec<String>,
}

impl Project {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            rows: vec!["id,type,name,path,offset".to_string()],
        }
    }

    fn add(&mut self, asset_type: AssetType, name: &str, file: &str, contents: &str) -> Ulid {
        let id = Ulid::generate();
        fs::write(self.dir.path().join(file), contents).unwrap();
        self.rows.push(format!("{id},{},{name},{file},", asset_type.name()));
        id
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn manager(&self, registry: AssetTypeRegistry, device: MockUploadDevice) -> AssetManager {
        fs::write(self.root().join("metadata.csv"), self.rows.join("\n")).unwrap();
        let manager = AssetManager::new(
            AssetManagerSettings::new(self.root()),
            registry,
            Arc::new(device),
        );
        manager
            .import_metadata_bank(&CsvBankImporter::new())
            .unwrap();
        manager
    }
}

/// Shader importer needing `retries` extra batches, failing for "broken" files
fn shader_importer(retries: u32) -> impl Fn(&dyn Asset, &mut LoadContext<'_, '_>) -> AssetLoadResult + Send + Sync {
    move |_: &dyn Asset, ctx: &mut LoadContext<'_, '_>| {
        if ctx.metadata().name == "broken" {
            AssetLoadResult::Failure
        } else if ctx.attempt() < retries {
            AssetLoadResult::TryAgain
        } else {
            AssetLoadResult::Success
        }
    }
}

fn material_registry(vertex_retries: u32) -> AssetTypeRegistry {
    let mut registry = AssetTypeRegistry::new();
    registry
        .register::<VertexShader>(shader_importer(vertex_retries))
        .register::<FragmentShader>(shader_importer(0))
        .register::<Texture2D>(|_: &dyn Asset, _: &mut LoadContext<'_, '_>| {
            AssetLoadResult::Success
        })
        .register::<Material>(MaterialImporter)
        .register::<MaterialInstance>(MaterialInstanceImporter);
    registry
}

#[test]
fn test_material_waits_for_shaders() {
    let mut project = Project::new();
    let vs = project.add(AssetType::VertexShader, "lit_vs", "lit.vert", "");
    let fs_id = project.add(AssetType::FragmentShader, "lit_fs", "lit.frag", "");
    let albedo = project.add(AssetType::Texture2D, "albedo", "albedo.png", "");
    let material_id = project.add(
        AssetType::Material,
        "lit",
        "lit.material.json",
        &format!(
            r#"{{"vertexShader":"{vs}","fragmentShader":"{fs_id}","textures":["{albedo}"],"depthTest":true}}"#
        ),
    );
    let device = MockUploadDevice::new();
    let manager = project.manager(material_registry(1), device.clone());

    let material = manager.get::<Material>(material_id);
    assert!(!material.is_null());

    manager.update();
    assert_eq!(material.state(), AssetState::Loading);
    assert_eq!(manager.loader().pending(), 4);
    manager.update();
    assert_eq!(material.state(), AssetState::Loading);
    manager.update();
    assert_eq!(material.state(), AssetState::Loaded);

    let data = material.read();
    assert!(data.vertex_shader.is_loaded());
    assert!(data.fragment_shader.is_loaded());
    assert_eq!(data.textures.len(), 1);
    assert!(data.pipeline.is_some());
    assert!(data.pending.is_none());

    let stats = device.stats();
    assert_eq!(stats.uploads, 1);
    assert_eq!(stats.command_buffers_acquired, 3);
    assert_eq!(stats.open_scopes(), 0);
    assert_eq!(device.backend_name(), "Mock");
}

#[test]
fn test_material_fails_with_broken_shader() {
    let mut project = Project::new();
    let vs = project.add(AssetType::VertexShader, "broken", "broken.vert", "");
    let fs_id = project.add(AssetType::FragmentShader, "flat_fs", "flat.frag", "");
    let material_id = project.add(
        AssetType::Material,
        "flat",
        "flat.material.json",
        &format!(r#"{{"vertexShader":"{vs}","fragmentShader":"{fs_id}"}}"#),
    );
    let manager = project.manager(material_registry(0), MockUploadDevice::new());

    let material = manager.get::<Material>(material_id);
    for _ in 0..3 {
        manager.update();
    }
    assert_eq!(material.state(), AssetState::LoadingFailed);
    assert_eq!(manager.state_of(vs), Some(AssetState::LoadingFailed));
}

#[test]
fn test_material_with_invalid_document_fails() {
    let mut project = Project::new();
    let material_id = project.add(AssetType::Material, "bad", "bad.material.json", "{ not json");
    let missing = project.add(AssetType::Material, "gone", "gone.material.json", "{}");
    fs::remove_file(project.root().join("gone.material.json")).unwrap();
    let manager = project.manager(material_registry(0), MockUploadDevice::new());

    let bad = manager.get::<Material>(material_id);
    let gone = manager.get::<Material>(missing);
    manager.update();
    assert_eq!(bad.state(), AssetState::LoadingFailed);
    assert_eq!(gone.state(), AssetState::LoadingFailed);
}

#[test]
fn test_material_instance_waits_for_material() {
    let mut project = Project::new();
    let vs = project.add(AssetType::VertexShader, "vs", "unlit.vert", "");
    let fs_id = project.add(AssetType::FragmentShader, "fs", "unlit.frag", "");
    let material_id = project.add(
        AssetType::Material,
        "unlit",
        "unlit.material.json",
        &format!(r#"{{"vertexShader":"{vs}","fragmentShader":"{fs_id}"}}"#),
    );
    let instance_id = project.add(
        AssetType::MaterialInstance,
        "red",
        "red.instance.json",
        &format!(r#"{{"material":"{material_id}","parameters":{{"tint":[1.0,0.0,0.0]}}}}"#),
    );
    let manager = project.manager(material_registry(0), MockUploadDevice::new());

    let instance = manager.get::<MaterialInstance>(instance_id);
    let mut batches = 0;
    while instance.is_loading() && batches < 10 {
        manager.update();
        batches += 1;
    }
    assert_eq!(instance.state(), AssetState::Loaded);
    assert!(batches > 1);

    let data = instance.read();
    assert_eq!(data.material.id(), material_id);
    assert!(data.material.is_loaded());
    assert_eq!(data.parameters["tint"][0], 1.0);
}

#[test]
fn test_scene_keeps_dependencies_alive() {
    let mut project = Project::new();
    let texture = project.add(AssetType::Texture2D, "sky", "sky.png", "");
    let unknown = Ulid::generate();
    let scene_id = project.add(
        AssetType::Scene,
        "intro",
        "intro.scene.json",
        &format!(r#"{{"name":"intro","assets":["{texture}","{unknown}","not-an-id"]}}"#),
    );
    let mut registry = material_registry(0);
    registry.register::<Scene>(SceneImporter);
    let manager = project.manager(registry, MockUploadDevice::new());

    let scene = manager.get::<Scene>(scene_id);
    manager.update();
    assert_eq!(scene.state(), AssetState::Loading);
    manager.update();
    assert_eq!(scene.state(), AssetState::Loaded);

    {
        let data = scene.read();
        assert_eq!(data.document["name"], "intro");
        assert_eq!(data.dependencies.len(), 1);
        assert_eq!(data.dependencies[0].id(), texture);
    }
    assert!(manager.contains(texture));

    drop(scene);
    manager.update();
    manager.update();
    assert!(!manager.contains(scene_id));
    assert!(!manager.contains(texture));
}

#[test]
fn test_document_offset_is_honoured() {
    let mut project = Project::new();
    let texture = project.add(AssetType::Texture2D, "rock", "rock.png", "");
    let scene_id = Ulid::generate();
    let body = format!(r#"{{"assets":["{texture}"]}}"#);
    fs::write(project.root().join("pack.bin"), format!("HEADER{body}")).unwrap();
    project.rows.push(format!("{scene_id},scene,packed,pack.bin,6"));

    let mut registry = material_registry(0);
    registry.register::<Scene>(SceneImporter);
    let manager = project.manager(registry, MockUploadDevice::new());
    assert_eq!(manager.metadata(scene_id).unwrap().offset, 6);

    let scene = manager.get::<Scene>(scene_id);
    manager.update();
    manager.update();
    assert!(scene.is_loaded());
    assert_eq!(scene.read().dependencies.len(), 1);
}
