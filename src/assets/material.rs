use crate::assets::json;
use crate::assets::{
    Asset, AssetImporter, AssetLoadResult, AssetRef, AssetState, FragmentShader, LoadContext,
    Material, MaterialInstance, PipelineDesc, Texture2D, VertexShader,
};
use crate::gpu::BufferUsage;

/// Imports materials from a JSON pipeline description.
///
/// The first attempt parses the description and requests the shaders and
/// textures; the pipeline is built once both shaders are loaded, returning
/// `TryAgain` until then.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaterialImporter;

fn dependency_result(state: AssetState) -> AssetLoadResult {
    match state {
        AssetState::Loaded => AssetLoadResult::Success,
        AssetState::Loading => AssetLoadResult::TryAgain,
        _ => AssetLoadResult::Failure,
    }
}

impl MaterialImporter {
    fn resolve(&self, material: &Material, ctx: &mut LoadContext<'_, '_>) -> AssetLoadResult {
        let document = match json::read_document(ctx.metadata()) {
            Ok(document) => document,
            Err(e) => {
                tracing::error!("Failed to read material {}: {e}", ctx.metadata().name);
                return AssetLoadResult::Failure;
            }
        };
        let desc: PipelineDesc = match serde_json::from_value(document) {
            Ok(desc) => desc,
            Err(e) => {
                tracing::error!("Invalid material description {}: {e}", ctx.metadata().name);
                return AssetLoadResult::Failure;
            }
        };

        let manager = ctx.manager();
        let mut data = material.write();
        data.vertex_shader = manager.get::<VertexShader>(desc.vertex_shader);
        data.fragment_shader = manager.get::<FragmentShader>(desc.fragment_shader);
        data.textures = desc
            .textures
            .iter()
            .map(|id| manager.get::<Texture2D>(*id))
            .filter(|texture| !texture.is_null())
            .collect();
        data.pending = Some(desc);
        AssetLoadResult::Success
    }

    fn build_pipeline(&self, material: &Material, ctx: &mut LoadContext<'_, '_>) -> AssetLoadResult {
        let mut data = material.write();
        let (Some(vertex), Some(fragment)) = (data.vertex_shader.get(), data.fragment_shader.get())
        else {
            tracing::error!("Material {} is missing a shader", ctx.metadata().name);
            return AssetLoadResult::Failure;
        };

        match (dependency_result(vertex.state()), dependency_result(fragment.state())) {
            (AssetLoadResult::Failure, _) | (_, AssetLoadResult::Failure) => {
                tracing::error!("Material {} has a shader that failed to load", ctx.metadata().name);
                return AssetLoadResult::Failure;
            }
            (AssetLoadResult::TryAgain, _) | (_, AssetLoadResult::TryAgain) => {
                return AssetLoadResult::TryAgain;
            }
            _ => {}
        }

        let Some(desc) = data.pending.take() else {
            return AssetLoadResult::Failure;
        };
        let bytes = match serde_json::to_vec(&desc) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Failed to encode pipeline for {}: {e}", ctx.metadata().name);
                return AssetLoadResult::Failure;
            }
        };
        match ctx.scope().upload(BufferUsage::Uniform, &bytes) {
            Ok(buffer) => {
                data.pipeline = Some(buffer.id);
                AssetLoadResult::Success
            }
            Err(e) => {
                tracing::error!("Failed to create graphics pipeline: {e}");
                AssetLoadResult::Failure
            }
        }
    }
}

impl AssetImporter for MaterialImporter {
    fn import(&self, asset: &dyn Asset, ctx: &mut LoadContext<'_, '_>) -> AssetLoadResult {
        let Some(material) = asset.downcast_ref::<Material>() else {
            return AssetLoadResult::Failure;
        };
        if !ctx.is_retry() {
            let result = self.resolve(material, ctx);
            if result != AssetLoadResult::Success {
                return result;
            }
        }
        self.build_pipeline(material, ctx)
    }
}

/// Imports material instances: a material id plus parameter overrides.
/// Waits for the material to load.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaterialInstanceImporter;

impl AssetImporter for MaterialInstanceImporter {
    fn import(&self, asset: &dyn Asset, ctx: &mut LoadContext<'_, '_>) -> AssetLoadResult {
        let Some(instance) = asset.downcast_ref::<MaterialInstance>() else {
            return AssetLoadResult::Failure;
        };

        if !ctx.is_retry() {
            let document = match json::read_document(ctx.metadata()) {
                Ok(document) => document,
                Err(e) => {
                    tracing::error!("Failed to read material instance {}: {e}", ctx.metadata().name);
                    return AssetLoadResult::Failure;
                }
            };
            let Some(material_id) = json::asset_id(&document, "material") else {
                tracing::error!("Material instance {} has no material", ctx.metadata().name);
                return AssetLoadResult::Failure;
            };
            let mut data = instance.write();
            data.material = ctx.manager().get::<Material>(material_id);
            data.parameters = json::field(&document, "parameters").unwrap_or_default();
        }

        let data = instance.read();
        let material: &AssetRef<Material> = &data.material;
        match material.get() {
            Some(material) => dependency_result(material.state()),
            None => AssetLoadResult::Failure,
        }
    }
}
